//! The Cube-and-Conquer driver
//!
//! The cube stage recursively splits a circuit instance into sub-problems by
//! branching on a well-chosen gate, the conquer stage hands each residual
//! formula to a CDCL backend. Gate selection happens in two stages: a cheap
//! structural ranking keeps the most connected gates, then a lookahead pass
//! measures how much each candidate actually shrinks the circuit.

use itertools::Itertools;
use log::{debug, info};

use crate::circuit::{Circuit, GateType, Label};
use crate::cnf::Lit;
use crate::instance::{AssignmentStatus, CircuitSatInstance};
use crate::sat::{SatAnswer, SatSolver};
use crate::simplify::{apply_all, MergeInverters, PropagateConstants};

/// Outcome of the cube stage
#[derive(Debug)]
pub enum CubeResult {
    /// The output simplified to a constant; no cubes are needed
    Trivial(bool),
    /// Leaf sub-problems, empty when the root instance already conflicts
    Cubes(Vec<CircuitSatInstance>),
}

/// Final answer of a solve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// A satisfying assignment exists
    Sat,
    /// No satisfying assignment exists
    Unsat,
    /// At least one cube could not be decided by the backend
    Unknown,
}

/// Answer together with a partial model
///
/// The model has one slot per CNF variable at index `v - 1`: `+v` or `-v`
/// for the inputs decided during cubing, `0` elsewhere.
#[derive(Debug, Clone)]
pub struct SolveResult {
    /// The answer
    pub status: SolveStatus,
    /// Partial certificate for a satisfiable answer
    pub model: Option<Vec<Lit>>,
}

/// Choice of a branching gate
struct GateSelection {
    label: Label,
    /// Set when one polarity conflicts and the other is thereby forced
    forced_value: Option<bool>,
}

/// Result of weighing one candidate
enum GateWeight {
    Forced(bool),
    Weight(u64),
}

/// Cube-and-Conquer solver operating natively on AIG circuits
#[derive(Debug, Clone)]
pub struct CubeAndConquerSolver {
    max_depth: usize,
    candidates_limit: usize,
}

impl Default for CubeAndConquerSolver {
    fn default() -> Self {
        CubeAndConquerSolver::new(Self::DEFAULT_MAX_DEPTH, Self::DEFAULT_CANDIDATES_LIMIT)
    }
}

impl CubeAndConquerSolver {
    /// Default recursion depth of the cube stage
    pub const DEFAULT_MAX_DEPTH: usize = 4;
    /// Default number of top-ranked gates to weigh by lookahead
    pub const DEFAULT_CANDIDATES_LIMIT: usize = 10;

    /// Create a solver with the given cube depth and candidate set size
    pub fn new(max_depth: usize, candidates_limit: usize) -> Self {
        CubeAndConquerSolver {
            max_depth,
            candidates_limit,
        }
    }

    /// Run full Cube-and-Conquer on a single-output circuit
    pub fn solve(&self, circuit: &Circuit, backend: &mut dyn SatSolver) -> SolveResult {
        match self.cube(circuit) {
            CubeResult::Trivial(answer) => SolveResult {
                status: if answer {
                    SolveStatus::Sat
                } else {
                    SolveStatus::Unsat
                },
                model: None,
            },
            CubeResult::Cubes(cubes) => self.conquer(&cubes, backend),
        }
    }

    /// Cube stage: decompose the circuit into sub-problems
    pub fn cube(&self, circuit: &Circuit) -> CubeResult {
        assert_eq!(
            circuit.output_size(),
            1,
            "cube-and-conquer expects a single-output circuit, got {} outputs",
            circuit.output_size()
        );
        let simplified = apply_all(circuit, &[&PropagateConstants, &MergeInverters]);
        info!("cube stage: circuit has {} gates", simplified.size());
        if simplified.output_size() == 0 {
            // The output folded to a constant; read it off the original
            let zero_inputs = vec![false; circuit.input_size()];
            let answer = circuit.evaluate(&zero_inputs)[0];
            info!(
                "output is constant, trivially {}",
                if answer { "SAT" } else { "UNSAT" }
            );
            return CubeResult::Trivial(answer);
        }
        let Some(instance) = CircuitSatInstance::from_circuit(simplified) else {
            return CubeResult::Cubes(Vec::new());
        };
        info!(
            "root instance: {} gates, {} clauses",
            instance.circuit().size(),
            instance.cnf().nb_clauses()
        );
        let mut cubes = Vec::new();
        self.cube_rec(instance, 0, &mut cubes);
        CubeResult::Cubes(cubes)
    }

    /// Conquer stage: solve each sub-problem with CDCL, first SAT wins
    pub fn conquer(
        &self,
        cubes: &[CircuitSatInstance],
        backend: &mut dyn SatSolver,
    ) -> SolveResult {
        let mut unknown = false;
        for (i, instance) in cubes.iter().enumerate() {
            match backend.solve(instance.cnf()) {
                SatAnswer::Sat(_) => {
                    debug!("cube {i}: SAT");
                    return SolveResult {
                        status: SolveStatus::Sat,
                        model: Some(extract_model(instance)),
                    };
                }
                SatAnswer::Unsat => debug!("cube {i}: UNSAT"),
                SatAnswer::Unknown => {
                    debug!("cube {i}: UNKNOWN");
                    unknown = true;
                }
            }
        }
        SolveResult {
            status: if unknown {
                SolveStatus::Unknown
            } else {
                SolveStatus::Unsat
            },
            model: None,
        }
    }

    /// Recursive cubing
    fn cube_rec(
        &self,
        instance: CircuitSatInstance,
        depth: usize,
        out: &mut Vec<CircuitSatInstance>,
    ) {
        if self.should_stop(&instance, depth) {
            debug!(
                "leaf at depth {depth}: {} gates, {} clauses",
                instance.circuit().size(),
                instance.cnf().nb_clauses()
            );
            out.push(instance);
            return;
        }

        let Some(selection) = self.select_gate(&instance) else {
            out.push(instance);
            return;
        };

        if let Some(value) = selection.forced_value {
            debug!("forced {}={} (other branch conflicts)", selection.label, value);
            let mut instance = instance;
            instance.assign(&selection.label, value);
            self.cube_rec(instance, depth + 1, out);
            return;
        }

        for value in [false, true] {
            let mut branch = instance.clone();
            branch.assign(&selection.label, value);
            self.cube_rec(branch, depth + 1, out);
        }
    }

    fn should_stop(&self, instance: &CircuitSatInstance, depth: usize) -> bool {
        instance.circuit().input_size() == 0 || depth >= self.max_depth
    }

    /// Select the best branching gate, or nothing when no gate qualifies
    fn select_gate(&self, instance: &CircuitSatInstance) -> Option<GateSelection> {
        let candidates = self.rank_candidates(instance);
        if candidates.is_empty() {
            return None;
        }

        let mut best: Option<(Label, u64)> = None;
        for label in candidates {
            match self.weight_gate(instance, &label) {
                GateWeight::Forced(value) => {
                    return Some(GateSelection {
                        label,
                        forced_value: Some(value),
                    });
                }
                GateWeight::Weight(weight) => {
                    // Strict comparison keeps the first of equally-weighted
                    // candidates, stable with respect to the ranking order
                    if best.as_ref().map_or(true, |(_, w)| weight > *w) {
                        best = Some((label, weight));
                    }
                }
            }
        }

        let (label, _) = best.expect("at least one candidate was weighed");
        Some(GateSelection {
            label,
            forced_value: None,
        })
    }

    /// Stage 1: structural ranking by connectivity
    ///
    /// Inverters are transparent: a user that is a Not gate contributes its
    /// own user count instead of one.
    fn rank_candidates(&self, instance: &CircuitSatInstance) -> Vec<Label> {
        let circuit = instance.circuit();
        let mut scores: Vec<(usize, Label)> = Vec::new();
        for gate in circuit.gates() {
            match gate.gate_type() {
                GateType::AlwaysTrue | GateType::AlwaysFalse | GateType::Not => continue,
                GateType::And | GateType::Input => (),
            }
            if instance.gates_config()[gate.label()].idx.is_none() {
                // Unreachable from every output: branching on it cannot help
                continue;
            }
            let indegree = gate.operands().len();
            let mut outdegree = 0;
            for user in circuit.users(gate.label()) {
                if circuit.get_gate(user).gate_type() == GateType::Not {
                    outdegree += circuit.users(user).len();
                } else {
                    outdegree += 1;
                }
            }
            scores.push(((indegree + 1) * (outdegree + 1), gate.label().to_string()));
        }
        scores
            .into_iter()
            .sorted_by_key(|(score, _)| std::cmp::Reverse(*score))
            .take(self.candidates_limit)
            .map(|(_, label)| label)
            .collect()
    }

    /// Stage 2: lookahead weighting on a deep-copied probe per polarity
    ///
    /// The weight is the product of the circuit shrinkage under both
    /// assignments. A conflicting polarity makes the branch forced.
    fn weight_gate(&self, instance: &CircuitSatInstance, label: &str) -> GateWeight {
        let start_size = instance.circuit().size();
        let mut weight: u64 = 1;
        for value in [false, true] {
            let mut probe = instance.clone();
            if probe.assign(label, value) == AssignmentStatus::Conflict {
                return GateWeight::Forced(!value);
            }
            assert!(
                probe.circuit().size() < start_size,
                "lookahead assignment did not shrink the circuit"
            );
            weight *= (start_size - probe.circuit().size()) as u64;
        }
        GateWeight::Weight(weight)
    }
}

/// Partial model of a satisfiable cube, from the recorded input decisions
fn extract_model(instance: &CircuitSatInstance) -> Vec<Lit> {
    let mut model = vec![0; instance.cnf().nb_vars() as usize];
    for config in instance.gates_config().values() {
        if !config.is_input {
            continue;
        }
        if let (Some(idx), Some(value)) = (config.idx, config.value) {
            model[(idx - 1) as usize] = if value { idx } else { -idx };
        }
    }
    model
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::generators::testcases::{and2, contradiction, random_aig, xor2};
    use crate::circuit::generators::{miter, CircuitBuilder};
    use crate::circuit::{Circuit, GateType};
    use crate::cnf::Cnf;
    use crate::sat::Kissat;

    /// Ground truth by exhaustive enumeration, for up to 10 inputs
    fn enumerate(circuit: &Circuit) -> bool {
        let n = circuit.input_size();
        assert!(n <= 10);
        (0u32..1 << n).any(|bits| {
            let inputs: Vec<bool> = (0..n).map(|i| bits >> i & 1 == 1).collect();
            circuit.evaluate(&inputs)[0]
        })
    }

    fn solve(circuit: &Circuit) -> SolveResult {
        CubeAndConquerSolver::default().solve(circuit, &mut Kissat)
    }

    #[test]
    fn test_and_is_sat() {
        let result = solve(&and2());
        assert_eq!(result.status, SolveStatus::Sat);
        // the model satisfies a and b
        let model = result.model.unwrap();
        let instance = CircuitSatInstance::new(and2());
        for label in ["a", "b"] {
            let idx = instance.gates_config()[label].idx.unwrap();
            assert_eq!(model[(idx - 1) as usize], idx);
        }
    }

    #[test]
    fn test_contradiction_is_unsat() {
        assert_eq!(solve(&contradiction()).status, SolveStatus::Unsat);
    }

    #[test]
    fn test_xor_self_miter_is_unsat() {
        let m = miter(&xor2(), &xor2());
        assert_eq!(solve(&m).status, SolveStatus::Unsat);
    }

    #[test]
    fn test_xor_vs_and_miter_is_sat() {
        let m = miter(&xor2(), &and2());
        let result = solve(&m);
        assert_eq!(result.status, SolveStatus::Sat);
        // the partial model places +-v at slot v - 1 and only decides inputs
        let model = result.model.unwrap();
        for (slot, &lit) in model.iter().enumerate() {
            assert!(lit == 0 || lit.unsigned_abs() as usize == slot + 1);
        }
        // the shared inputs are variables 1 and 2; if both are decided they
        // must make xor and and differ
        let decided: Vec<Lit> = model.iter().copied().filter(|&l| l != 0).collect();
        if decided.len() == 2 {
            let a = decided.contains(&1);
            let b = decided.contains(&2);
            assert_eq!(m.evaluate(&[a, b]), vec![true]);
        }
    }

    #[test]
    fn test_stuck_at_one_miter() {
        // not(x) against constant one differs exactly at x = 1
        let mut builder = CircuitBuilder::new();
        builder.input("x");
        let out = builder.not("x");
        builder.output(&out);
        let lhs = builder.finish();

        let mut builder = CircuitBuilder::new();
        builder.input("x");
        let t = builder.constant(true);
        builder.output(&t);
        let rhs = builder.finish();

        let m = miter(&lhs, &rhs);
        let result = solve(&m);
        assert_eq!(result.status, SolveStatus::Sat);
        let model = result.model.unwrap();
        // the only input variable is 1 and must be assigned true
        assert_eq!(model[0], 1);
    }

    #[test]
    fn test_trivial_constant_output() {
        let mut c = Circuit::new();
        c.emplace_gate("x", GateType::Input, &[]);
        c.emplace_gate("__true__", GateType::AlwaysTrue, &[]);
        c.emplace_gate("out", GateType::And, &["__true__", "__true__"]);
        c.mark_as_output("out");
        let solver = CubeAndConquerSolver::default();
        match solver.cube(&c) {
            CubeResult::Trivial(answer) => assert!(answer),
            CubeResult::Cubes(_) => panic!("expected a trivial result"),
        }
        assert_eq!(solve(&c).status, SolveStatus::Sat);

        let mut c = Circuit::new();
        c.emplace_gate("x", GateType::Input, &[]);
        c.emplace_gate("__false__", GateType::AlwaysFalse, &[]);
        c.emplace_gate("out", GateType::And, &["x", "__false__"]);
        c.mark_as_output("out");
        assert_eq!(solve(&c).status, SolveStatus::Unsat);
    }

    #[test]
    fn test_depth_zero_single_cube() {
        let solver = CubeAndConquerSolver::new(0, 10);
        match solver.cube(&xor2()) {
            CubeResult::Cubes(cubes) => assert_eq!(cubes.len(), 1),
            CubeResult::Trivial(_) => panic!("expected cubes"),
        }
    }

    #[test]
    fn test_depth_is_monotone() {
        let circuit = random_aig(6, 30, 7);
        let mut previous = 0;
        for depth in [0, 1, 2, 4, 8] {
            let solver = CubeAndConquerSolver::new(depth, 10);
            let CubeResult::Cubes(cubes) = solver.cube(&circuit) else {
                continue;
            };
            assert!(cubes.len() >= previous);
            previous = cubes.len();
        }
    }

    #[test]
    fn test_natural_termination() {
        // once the inputs are exhausted, more depth changes nothing
        let a = CubeAndConquerSolver::new(100, 10);
        let b = CubeAndConquerSolver::new(1000, 10);
        let na = match a.cube(&and2()) {
            CubeResult::Cubes(c) => c.len(),
            CubeResult::Trivial(_) => panic!(),
        };
        let nb = match b.cube(&and2()) {
            CubeResult::Cubes(c) => c.len(),
            CubeResult::Trivial(_) => panic!(),
        };
        assert_eq!(na, nb);
    }

    #[test]
    fn test_candidate_limit_does_not_change_answer() {
        for seed in 0..5 {
            let circuit = random_aig(5, 20, seed);
            let expected = enumerate(&circuit);
            for k in [1, 3, 10] {
                let solver = CubeAndConquerSolver::new(3, k);
                let result = solver.solve(&circuit, &mut Kissat);
                let sat = result.status == SolveStatus::Sat;
                assert_eq!(sat, expected, "seed {seed}, k {k}");
            }
        }
    }

    #[test]
    fn test_matches_enumeration() {
        for seed in 0..20 {
            let circuit = random_aig(6, 40, seed);
            let expected = enumerate(&circuit);
            let result = solve(&circuit);
            let sat = result.status == SolveStatus::Sat;
            assert_eq!(sat, expected, "seed {seed}");
        }
    }

    #[test]
    fn test_deterministic() {
        let circuit = random_aig(6, 30, 3);
        let solver = CubeAndConquerSolver::default();
        let count = |r: CubeResult| match r {
            CubeResult::Cubes(c) => c
                .iter()
                .map(|i| (i.circuit().size(), i.cnf().nb_clauses()))
                .collect::<Vec<_>>(),
            CubeResult::Trivial(_) => Vec::new(),
        };
        let first = count(solver.cube(&circuit));
        let second = count(solver.cube(&circuit));
        assert_eq!(first, second);
    }

    #[test]
    fn test_unknown_propagation() {
        struct AlwaysUnknown;
        impl SatSolver for AlwaysUnknown {
            fn solve(&mut self, _cnf: &Cnf) -> SatAnswer {
                SatAnswer::Unknown
            }
        }
        let solver = CubeAndConquerSolver::default();
        let CubeResult::Cubes(cubes) = solver.cube(&xor2()) else {
            panic!("expected cubes");
        };
        let result = solver.conquer(&cubes, &mut AlwaysUnknown);
        assert_eq!(result.status, SolveStatus::Unknown);
    }
}
