//! Command line interface

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use kdam::{tqdm, BarExt};
use log::warn;

use aigsat::circuit::stats::stats;
use aigsat::circuit::Circuit;
use aigsat::cube::{CubeAndConquerSolver, CubeResult, SolveStatus};
use aigsat::io::{read_circuit_file, write_dimacs};
use aigsat::sat::{ExternalSolver, Kissat, SatAnswer, SatSolver};

/// Command line arguments
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Command line arguments
#[derive(Subcommand)]
pub enum Commands {
    /// Show statistics about a circuit
    ///
    /// Will print the number of inputs, outputs and gates in the circuit.
    #[clap()]
    Show(ShowArgs),

    /// Build cubes from a circuit and save each sub-problem as DIMACS CNF
    ///
    /// Runs only the cube stage and writes one cube_NNNN.cnf file per
    /// sub-problem, to be dispatched to any CDCL solver later.
    #[clap(alias = "build-cubes")]
    Cube(CubeArgs),

    /// Solve a circuit with the built-in kissat backend
    #[clap()]
    Solve(SolveArgs),

    /// Solve a circuit with an external CDCL solver
    ///
    /// The solver executable is invoked on each cube as `<exe> <cnf>` and
    /// must follow the SAT-competition convention: exit code 10 for SAT,
    /// 20 for UNSAT.
    #[clap(alias = "external")]
    SolveExternal(SolveExternalArgs),
}

/// Command arguments for circuit informations
#[derive(Args)]
pub struct ShowArgs {
    /// Circuit to show
    file: PathBuf,
}

impl ShowArgs {
    pub fn run(&self) {
        let circuit = read_or_exit(&self.file);
        println!("Circuit stats:\n{}", stats(&circuit));
    }
}

/// Command arguments for cube generation
#[derive(Args)]
pub struct CubeArgs {
    /// Circuit to split
    file: PathBuf,

    /// Directory for the cube CNF files
    #[arg(short = 'o', long)]
    output_dir: PathBuf,

    /// Maximum cube depth
    #[arg(short = 'd', long, default_value_t = CubeAndConquerSolver::DEFAULT_MAX_DEPTH)]
    depth: usize,

    /// Lookahead candidate set size
    #[arg(short = 'k', long, default_value_t = CubeAndConquerSolver::DEFAULT_CANDIDATES_LIMIT)]
    candidates: usize,
}

impl CubeArgs {
    pub fn run(&self) {
        let circuit = read_or_exit(&self.file);
        let solver = CubeAndConquerSolver::new(self.depth, self.candidates);

        let start = Instant::now();
        let result = solver.cube(&circuit);
        let cube_time = start.elapsed().as_secs_f64();

        match result {
            CubeResult::Trivial(answer) => {
                println!(
                    "Trivially {} (no cubes to write)",
                    if answer { "SAT" } else { "UNSAT" }
                );
                println!("Cube time: {cube_time:.2}s");
            }
            CubeResult::Cubes(cubes) => {
                std::fs::create_dir_all(&self.output_dir).unwrap_or_else(|e| {
                    eprintln!("cannot create {}: {e}", self.output_dir.display());
                    std::process::exit(1);
                });
                println!("Generated {} cubes in {cube_time:.2}s", cubes.len());
                for (i, instance) in cubes.iter().enumerate() {
                    let path = self.output_dir.join(format!("cube_{i:04}.cnf"));
                    let file = File::create(&path).unwrap_or_else(|e| {
                        eprintln!("cannot write {}: {e}", path.display());
                        std::process::exit(1);
                    });
                    write_dimacs(&mut BufWriter::new(file), instance.cnf()).unwrap();
                }
                println!("Saved to {}/", self.output_dir.display());
            }
        }
    }
}

/// Command arguments for solving with the built-in backend
#[derive(Args)]
pub struct SolveArgs {
    /// Circuit to solve
    file: PathBuf,

    /// Maximum cube depth
    #[arg(short = 'd', long, default_value_t = CubeAndConquerSolver::DEFAULT_MAX_DEPTH)]
    depth: usize,

    /// Lookahead candidate set size
    #[arg(short = 'k', long, default_value_t = CubeAndConquerSolver::DEFAULT_CANDIDATES_LIMIT)]
    candidates: usize,

    /// Write a CSV result line to this file
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,
}

impl SolveArgs {
    pub fn run(&self) {
        let circuit = read_or_exit(&self.file);
        let solver = CubeAndConquerSolver::new(self.depth, self.candidates);

        let start = Instant::now();
        let result = solver.solve(&circuit, &mut Kissat);
        let total_time = start.elapsed().as_secs_f64();

        let status = status_str(result.status);
        println!("Answer: {status}");
        println!("Total time: {total_time:.2}s");

        if let Some(path) = &self.output {
            let mut f = File::create(path).unwrap_or_else(|e| {
                eprintln!("cannot write {}: {e}", path.display());
                std::process::exit(1);
            });
            writeln!(f, "filename,answer,total_time").unwrap();
            writeln!(f, "{},{status},{total_time:.6}", file_name(&self.file)).unwrap();
            println!("Results written to {}", path.display());
        }
    }
}

/// Command arguments for solving with an external solver
#[derive(Args)]
pub struct SolveExternalArgs {
    /// Circuit to solve
    file: PathBuf,

    /// Path to the external solver executable
    #[arg(short = 's', long)]
    solver: PathBuf,

    /// Maximum cube depth
    #[arg(short = 'd', long, default_value_t = CubeAndConquerSolver::DEFAULT_MAX_DEPTH)]
    depth: usize,

    /// Lookahead candidate set size
    #[arg(short = 'k', long, default_value_t = CubeAndConquerSolver::DEFAULT_CANDIDATES_LIMIT)]
    candidates: usize,

    /// Per-cube timeout in seconds
    #[arg(long)]
    timeout: Option<f64>,

    /// Write a CSV result line to this file
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Directory to keep the cube CNFs (otherwise a temporary one is used)
    #[arg(long)]
    keep_cnfs: Option<PathBuf>,
}

impl SolveExternalArgs {
    pub fn run(&self) {
        let circuit = read_or_exit(&self.file);
        let cnc = CubeAndConquerSolver::new(self.depth, self.candidates);

        let start = Instant::now();
        let result = cnc.cube(&circuit);
        let cube_time = start.elapsed().as_secs_f64();

        let cubes = match result {
            CubeResult::Trivial(answer) => {
                println!("Trivially {}", if answer { "SAT" } else { "UNSAT" });
                println!("Cube: {cube_time:.2}s | Conquer: 0.00s | Total: {cube_time:.2}s");
                return;
            }
            CubeResult::Cubes(cubes) => cubes,
        };

        println!("Cubes: {} (cube time: {cube_time:.2}s)", cubes.len());
        println!("Solver: {}", self.solver.display());

        let (cnf_dir, is_temp) = match &self.keep_cnfs {
            Some(dir) => (dir.clone(), false),
            None => (
                std::env::temp_dir().join(format!("aigsat_{}", std::process::id())),
                true,
            ),
        };
        std::fs::create_dir_all(&cnf_dir).unwrap_or_else(|e| {
            eprintln!("cannot create {}: {e}", cnf_dir.display());
            std::process::exit(1);
        });

        let timeout = self.timeout.map(Duration::from_secs_f64);
        let mut backend = ExternalSolver::new(self.solver.clone(), cnf_dir.clone(), timeout);

        let conquer_start = Instant::now();
        let mut status = SolveStatus::Unsat;
        let mut pb = tqdm!(total = cubes.len(), desc = "conquer");
        for instance in &cubes {
            let answer = backend.solve(instance.cnf());
            let _ = pb.update(1);
            match answer {
                SatAnswer::Sat(_) => {
                    status = SolveStatus::Sat;
                    break;
                }
                SatAnswer::Unsat => (),
                SatAnswer::Unknown => {
                    if status == SolveStatus::Unsat {
                        status = SolveStatus::Unknown;
                    }
                }
            }
        }
        eprintln!();
        let conquer_time = conquer_start.elapsed().as_secs_f64();
        let total_time = cube_time + conquer_time;

        let final_status = status_str(status);
        println!("Answer: {final_status}");
        println!(
            "Cube: {cube_time:.2}s | Conquer: {conquer_time:.2}s | Total: {total_time:.2}s"
        );

        if let Some(path) = &self.output {
            let mut f = File::create(path).unwrap_or_else(|e| {
                eprintln!("cannot write {}: {e}", path.display());
                std::process::exit(1);
            });
            writeln!(f, "filename,answer,cubes,cube_time,conquer_time,total_time").unwrap();
            writeln!(
                f,
                "{},{final_status},{},{cube_time:.6},{conquer_time:.6},{total_time:.6}",
                file_name(&self.file),
                cubes.len()
            )
            .unwrap();
            println!("Results written to {}", path.display());
        }

        if is_temp {
            if let Err(e) = std::fs::remove_dir_all(&cnf_dir) {
                warn!("cannot remove {}: {e}", cnf_dir.display());
            }
        }
    }
}

fn read_or_exit(path: &Path) -> Circuit {
    read_circuit_file(path).unwrap_or_else(|e| {
        eprintln!("Error reading {}: {e}", path.display());
        std::process::exit(1);
    })
}

fn status_str(status: SolveStatus) -> &'static str {
    match status {
        SolveStatus::Sat => "SAT",
        SolveStatus::Unsat => "UNSAT",
        SolveStatus::Unknown => "UNKNOWN",
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
