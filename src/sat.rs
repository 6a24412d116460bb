//! SAT backends for the conquer stage

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use log::warn;
use rustsat::solvers::{Solve, SolverResult};
use rustsat::types::TernaryVal;

use crate::cnf::{Cnf, Lit};
use crate::io::dimacs::write_dimacs;

/// Answer of a backend for one formula
///
/// `Unknown` covers solver failures and timeouts; a single unknown cube does
/// not abort the conquer stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SatAnswer {
    /// Satisfiable, with the model over CNF variables (index `v - 1`)
    Sat(Vec<Lit>),
    /// Unsatisfiable
    Unsat,
    /// The backend could not decide
    Unknown,
}

/// A CDCL solver the conquer stage can dispatch a formula to
pub trait SatSolver {
    /// Decide satisfiability of the formula
    fn solve(&mut self, cnf: &Cnf) -> SatAnswer;
}

/// In-process kissat backend
#[derive(Debug, Default)]
pub struct Kissat;

impl SatSolver for Kissat {
    fn solve(&mut self, cnf: &Cnf) -> SatAnswer {
        let mut solver = rustsat_kissat::Kissat::default();
        for clause in cnf.clauses() {
            let clause: rustsat::types::Clause = clause.iter().map(|&l| sat_lit(l)).collect();
            if let Err(e) = solver.add_clause(clause) {
                warn!("kissat rejected a clause: {e}");
                return SatAnswer::Unknown;
            }
        }
        match solver.solve() {
            Ok(SolverResult::Sat) => {
                let mut model = Vec::with_capacity(cnf.nb_vars() as usize);
                for v in 1..=cnf.nb_vars() {
                    let value = match solver.lit_val(sat_lit(v)) {
                        Ok(TernaryVal::True) => v,
                        Ok(TernaryVal::False) => -v,
                        _ => 0,
                    };
                    model.push(value);
                }
                SatAnswer::Sat(model)
            }
            Ok(SolverResult::Unsat) => SatAnswer::Unsat,
            Ok(SolverResult::Interrupted) => SatAnswer::Unknown,
            Err(e) => {
                warn!("kissat failed: {e}");
                SatAnswer::Unknown
            }
        }
    }
}

fn sat_lit(l: Lit) -> rustsat::types::Lit {
    rustsat::types::Lit::from_ipasir(l).expect("literals are nonzero")
}

/// Backend invoking an external solver executable on a DIMACS file
///
/// The solver is called as `<exe> <path>` with its output discarded; the
/// decision is taken from the exit code following the SAT-competition
/// convention (10 is SAT, 20 is UNSAT, anything else is unknown). Formulas
/// are written as `cube_NNNN.cnf` into the given directory.
#[derive(Debug)]
pub struct ExternalSolver {
    exe: PathBuf,
    dir: PathBuf,
    timeout: Option<Duration>,
    counter: usize,
}

impl ExternalSolver {
    /// Create a backend writing its formulas into `dir`
    pub fn new(exe: PathBuf, dir: PathBuf, timeout: Option<Duration>) -> Self {
        ExternalSolver {
            exe,
            dir,
            timeout,
            counter: 0,
        }
    }

    fn run(&self, cnf_path: &PathBuf) -> Result<Option<i32>, String> {
        let mut child = Command::new(&self.exe)
            .arg(cnf_path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| format!("cannot run {}: {e}", self.exe.display()))?;
        let start = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status.code()),
                Ok(None) => (),
                Err(e) => return Err(format!("wait failed: {e}")),
            }
            if let Some(timeout) = self.timeout {
                if start.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Ok(None);
                }
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}

impl SatSolver for ExternalSolver {
    fn solve(&mut self, cnf: &Cnf) -> SatAnswer {
        let path = self.dir.join(format!("cube_{:04}.cnf", self.counter));
        self.counter += 1;

        let file = match File::create(&path) {
            Ok(f) => f,
            Err(e) => {
                warn!("cannot write {}: {e}", path.display());
                return SatAnswer::Unknown;
            }
        };
        if let Err(e) = write_dimacs(&mut BufWriter::new(file), cnf) {
            warn!("cannot write {}: {e}", path.display());
            return SatAnswer::Unknown;
        }

        match self.run(&path) {
            // The exit-code contract carries no model
            Ok(Some(10)) => SatAnswer::Sat(Vec::new()),
            Ok(Some(20)) => SatAnswer::Unsat,
            Ok(Some(code)) => {
                warn!("solver returned unexpected exit code {code}");
                SatAnswer::Unknown
            }
            Ok(None) => {
                warn!("solver timed out on {}", path.display());
                SatAnswer::Unknown
            }
            Err(e) => {
                warn!("{e}");
                SatAnswer::Unknown
            }
        }
    }
}
