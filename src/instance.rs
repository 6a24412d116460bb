//! Mutable (circuit, CNF) bundle used during cubing

use fxhash::FxHashMap;

use crate::circuit::{Circuit, GateType, Label};
use crate::cnf::{tseytin, Cnf, Lit};
use crate::simplify::{PropagateConstants, Transform};

/// Outcome of an assignment
///
/// A conflict is not an error: the cube driver uses it to detect forced
/// branches and trivially unsatisfiable sub-problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentStatus {
    /// The assignment was applied
    Ok,
    /// The assignment contradicts an already-known constant
    Conflict,
}

/// Per-gate bookkeeping that survives simplification
///
/// `idx` is the CNF variable of the gate, fixed at construction; it is the
/// identity used to talk to the SAT backend and never changes afterwards.
/// It is `None` only for gates no output reaches, which the encoder skips.
/// `value` is set exactly when the gate is an input assigned during cubing,
/// so that a satisfying model can be reconstructed.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// CNF variable of the gate
    pub idx: Option<Lit>,
    /// Whether the gate is a primary input
    pub is_input: bool,
    /// Input decision taken during cubing
    pub value: Option<bool>,
}

/// A mutable circuit/CNF pair supporting constant-propagating assignments
///
/// Branching clones the whole instance, so sibling branches never observe
/// each other's assignments.
#[derive(Debug, Clone)]
pub struct CircuitSatInstance {
    circuit: Circuit,
    cnf: Cnf,
    gates_config: FxHashMap<Label, GateConfig>,
}

impl CircuitSatInstance {
    /// Build an instance from a circuit, without constraining the outputs
    pub fn new(circuit: Circuit) -> Self {
        circuit.check();
        let cnf = tseytin(&circuit);
        let gates_config = circuit
            .gates()
            .map(|g| {
                let config = GateConfig {
                    idx: cnf.var(g.label()),
                    is_input: g.gate_type() == GateType::Input,
                    value: None,
                };
                (g.label().to_string(), config)
            })
            .collect();
        CircuitSatInstance {
            circuit,
            cnf,
            gates_config,
        }
    }

    /// Build an instance for a single-output circuit and fix its output true
    ///
    /// Returns `None` when the assignment conflicts, in which case the
    /// problem is trivially unsatisfiable.
    pub fn from_circuit(circuit: Circuit) -> Option<Self> {
        assert_eq!(
            circuit.output_size(),
            1,
            "instance expects a single-output circuit, got {}",
            circuit.output_size()
        );
        let output = circuit.outputs()[0].clone();
        let mut instance = Self::new(circuit);
        match instance.assign(&output, true) {
            AssignmentStatus::Ok => Some(instance),
            AssignmentStatus::Conflict => None,
        }
    }

    /// Current circuit
    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    /// Current formula
    pub fn cnf(&self) -> &Cnf {
        &self.cnf
    }

    /// Per-gate configuration
    pub fn gates_config(&self) -> &FxHashMap<Label, GateConfig> {
        &self.gates_config
    }

    /// Assign a value to a gate and propagate the consequences
    ///
    /// Appends the corresponding unit clause, replaces the gate by a
    /// constant, follows the assignments this forces through the structure,
    /// and finally re-runs constant propagation to compact the circuit.
    pub fn assign(&mut self, label: &str, value: bool) -> AssignmentStatus {
        if self.propagate(label, value) == AssignmentStatus::Conflict {
            return AssignmentStatus::Conflict;
        }
        self.simplify();
        AssignmentStatus::Ok
    }

    /// Re-run constant propagation on the circuit
    fn simplify(&mut self) {
        self.circuit = PropagateConstants.run(&self.circuit);
    }

    /// Structural propagation of an assignment, without simplification
    ///
    /// Iterative worklist rather than recursion: a chain of inverters can be
    /// as long as the circuit is deep.
    fn propagate(&mut self, label: &str, value: bool) -> AssignmentStatus {
        let mut work: Vec<(Label, bool)> = vec![(label.to_string(), value)];
        while let Some((label, value)) = work.pop() {
            let gate = self.circuit.get_gate(&label).clone();

            if let Some(known) = gate.constant_value() {
                if known != value {
                    return AssignmentStatus::Conflict;
                }
                continue;
            }

            let lit = self.var_of(&label);
            self.cnf.add_clause(vec![if value { lit } else { -lit }]);

            match gate.gate_type() {
                GateType::Input => {
                    if value {
                        self.circuit.replace_inputs(&[label.clone()], &[]);
                    } else {
                        self.circuit.replace_inputs(&[], &[label.clone()]);
                    }
                    self.gates_config
                        .get_mut(&label)
                        .expect("every gate has a config")
                        .value = Some(value);
                }
                GateType::Not => {
                    self.circuit
                        .replace_gate(&label, GateType::constant(value), &[]);
                    work.push((gate.operands()[0].clone(), !value));
                }
                GateType::And if value => {
                    self.circuit.replace_gate(&label, GateType::AlwaysTrue, &[]);
                    // Both operands are forced true; keep the first one on top
                    // of the stack so it is fully processed first
                    work.push((gate.operands()[1].clone(), true));
                    work.push((gate.operands()[0].clone(), true));
                }
                GateType::And => {
                    self.circuit
                        .replace_gate(&label, GateType::AlwaysFalse, &[]);
                    // Neither operand is individually forced; record that they
                    // cannot both be true
                    let lit0 = self.var_of(&gate.operands()[0]);
                    let lit1 = self.var_of(&gate.operands()[1]);
                    self.cnf.add_clause(vec![-lit0, -lit1]);
                }
                GateType::AlwaysTrue | GateType::AlwaysFalse => unreachable!(),
            }
        }
        AssignmentStatus::Ok
    }

    fn var_of(&self, label: &str) -> Lit {
        self.gates_config[label]
            .idx
            .unwrap_or_else(|| panic!("gate {label} has no CNF variable"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::generators::testcases::{and2, contradiction, random_aig, xor2};

    /// Brute-force satisfiability for tiny formulas
    fn brute_force_sat(cnf: &Cnf) -> bool {
        let n = cnf.nb_vars() as u32;
        assert!(n <= 16);
        (0u64..1 << n).any(|bits| {
            cnf.clauses().iter().all(|clause| {
                clause.iter().any(|&lit| {
                    let value = bits >> (lit.unsigned_abs() - 1) & 1 == 1;
                    if lit > 0 {
                        value
                    } else {
                        !value
                    }
                })
            })
        })
    }

    #[test]
    fn test_from_circuit_seeds_output() {
        let instance = CircuitSatInstance::from_circuit(and2()).unwrap();
        let out = instance.gates_config()["and0"].idx.unwrap();
        assert!(instance.cnf().clauses().contains(&vec![out]));
        // and(a, b) = 1 forces both inputs
        let a = instance.gates_config()["a"].idx.unwrap();
        let b = instance.gates_config()["b"].idx.unwrap();
        assert!(instance.cnf().clauses().contains(&vec![a]));
        assert!(instance.cnf().clauses().contains(&vec![b]));
        assert_eq!(instance.gates_config()["a"].value, Some(true));
        assert_eq!(instance.gates_config()["b"].value, Some(true));
        // Everything is decided, the circuit is fully simplified away
        assert_eq!(instance.circuit().input_size(), 0);
    }

    #[test]
    fn test_contradiction_conflicts() {
        // and(x, not(x)) = 1 forces x both ways
        assert!(CircuitSatInstance::from_circuit(contradiction()).is_none());
    }

    #[test]
    fn test_and_false_learns_binary_clause() {
        let mut instance = CircuitSatInstance::new(and2());
        let a = instance.gates_config()["a"].idx.unwrap();
        let b = instance.gates_config()["b"].idx.unwrap();
        let out = instance.gates_config()["and0"].idx.unwrap();
        let status = instance.assign("and0", false);
        assert_eq!(status, AssignmentStatus::Ok);
        assert!(instance.cnf().clauses().contains(&vec![-out]));
        assert!(instance.cnf().clauses().contains(&vec![-a, -b]));
        // No operand is forced, the inputs survive
        assert_eq!(instance.circuit().input_size(), 2);
    }

    #[test]
    fn test_input_assignment() {
        let mut instance = CircuitSatInstance::from_circuit(xor2()).unwrap();
        let status = instance.assign("a", false);
        assert_eq!(status, AssignmentStatus::Ok);
        assert_eq!(instance.gates_config()["a"].value, Some(false));
        // the gates fed by a are folded away, only b survives
        assert_eq!(instance.circuit().input_size(), 1);
        assert_eq!(instance.gates_config()["b"].value, None);
    }

    #[test]
    fn test_clone_isolation() {
        let original = CircuitSatInstance::from_circuit(xor2()).unwrap();
        let clauses_before = original.cnf().nb_clauses();
        let size_before = original.circuit().size();
        let mut branch = original.clone();
        branch.assign("a", true);
        assert_eq!(original.cnf().nb_clauses(), clauses_before);
        assert_eq!(original.circuit().size(), size_before);
        assert_eq!(original.gates_config()["a"].value, None);
        assert_ne!(branch.circuit().size(), size_before);
    }

    #[test]
    fn test_assign_matches_conjoined_unit() {
        // assigning a gate decides SAT exactly like conjoining the unit
        // clause onto the untouched formula
        for seed in 0..5 {
            let circuit = random_aig(3, 10, seed);
            let instance = CircuitSatInstance::new(circuit);
            let label = instance.circuit().outputs()[0].clone();
            for value in [false, true] {
                let mut reference = instance.cnf().clone();
                let lit = instance.gates_config()[&label].idx.unwrap();
                reference.add_clause(vec![if value { lit } else { -lit }]);

                let mut assigned = instance.clone();
                match assigned.assign(&label, value) {
                    AssignmentStatus::Ok => assert_eq!(
                        brute_force_sat(assigned.cnf()),
                        brute_force_sat(&reference),
                        "seed {seed}, value {value}"
                    ),
                    // a conflict means the constrained formula has no model
                    AssignmentStatus::Conflict => {
                        assert!(!brute_force_sat(&reference), "seed {seed}, value {value}")
                    }
                }
            }
        }
    }

    #[test]
    fn test_variable_indices_stable() {
        let mut instance = CircuitSatInstance::from_circuit(xor2()).unwrap();
        let before: Vec<_> = instance
            .circuit()
            .gates()
            .map(|g| (g.label().to_string(), instance.gates_config()[g.label()].idx))
            .collect();
        instance.assign("a", true);
        for (label, idx) in before {
            assert_eq!(instance.gates_config()[&label].idx, idx);
        }
    }
}
