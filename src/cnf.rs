//! CNF formulas and the Tseytin encoding of a circuit

use fxhash::FxHashMap;

use crate::circuit::{Circuit, GateType, Label};

/// A literal: a signed, nonzero variable index
pub type Lit = i32;

/// A clause, the disjunction of its literals
pub type Clause = Vec<Lit>;

/// CNF formula together with the gate-label-to-variable mapping
///
/// Variables are assigned densely starting at 1. Clauses are append-only;
/// a branch of the cube tree owns its formula, so nothing is ever retracted.
#[derive(Debug, Clone, Default)]
pub struct Cnf {
    clauses: Vec<Clause>,
    var_map: FxHashMap<Label, Lit>,
    nb_vars: Lit,
}

impl Cnf {
    /// Create an empty formula
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a clause
    pub fn add_clause(&mut self, clause: Clause) {
        for lit in &clause {
            assert_ne!(*lit, 0, "literals are nonzero");
            self.nb_vars = self.nb_vars.max(lit.abs());
        }
        self.clauses.push(clause);
    }

    /// All clauses, in insertion order
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Number of clauses
    pub fn nb_clauses(&self) -> usize {
        self.clauses.len()
    }

    /// Highest variable index in use
    pub fn nb_vars(&self) -> Lit {
        self.nb_vars
    }

    /// Variable of a gate label, if the encoder reached it
    pub fn var(&self, label: &str) -> Option<Lit> {
        self.var_map.get(label).copied()
    }

    /// Assign the next fresh variable to a label
    fn fresh_var(&mut self, label: &str) -> Lit {
        debug_assert!(!self.var_map.contains_key(label));
        self.nb_vars += 1;
        self.var_map.insert(label.to_string(), self.nb_vars);
        self.nb_vars
    }
}

/// Convert a circuit to CNF via the Tseytin transformation
///
/// The formula is equisatisfiable with all circuit outputs being true: each
/// reachable gate gets a fresh variable and a small clause set, and a unit
/// clause asserts every output.
///
/// Inputs are numbered first so that the variable layout does not depend on
/// which outputs reach them. The traversal is an iterative post-order with
/// an explicit stack; circuits with hundreds of thousands of gates must not
/// overflow the call stack.
pub fn tseytin(circuit: &Circuit) -> Cnf {
    let mut cnf = Cnf::new();
    for label in circuit.inputs() {
        cnf.fresh_var(label);
    }
    for output in circuit.outputs() {
        let lit = encode_from_root(circuit, &mut cnf, output);
        cnf.add_clause(vec![lit]);
    }
    cnf
}

/// Encode every not-yet-encoded gate reachable from `root`
fn encode_from_root(circuit: &Circuit, cnf: &mut Cnf, root: &str) -> Lit {
    let mut stack: Vec<(usize, bool)> = vec![(circuit.slot(root), false)];
    while let Some((slot, expanded)) = stack.pop() {
        let gate = circuit.gate_at(slot);
        if cnf.var(gate.label()).is_some() {
            // Shared sub-expressions may be pushed twice; the first visit wins
            continue;
        }
        if !expanded {
            stack.push((slot, true));
            for op in gate.operands().iter().rev() {
                if cnf.var(op).is_none() {
                    stack.push((circuit.slot(op), false));
                }
            }
            continue;
        }
        let lits: Vec<Lit> = gate
            .operands()
            .iter()
            .map(|op| cnf.var(op).expect("operands are encoded before their gate"))
            .collect();
        let top = cnf.fresh_var(gate.label());
        match gate.gate_type() {
            GateType::Input => (),
            GateType::AlwaysTrue => cnf.add_clause(vec![top]),
            GateType::AlwaysFalse => cnf.add_clause(vec![-top]),
            GateType::Not => {
                cnf.add_clause(vec![lits[0], top]);
                cnf.add_clause(vec![-lits[0], -top]);
            }
            GateType::And => {
                let mut common = vec![top];
                for &lit in &lits {
                    cnf.add_clause(vec![lit, -top]);
                    common.push(-lit);
                }
                cnf.add_clause(common);
            }
        }
    }
    cnf.var(root).expect("root is encoded")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::generators::testcases::{and2, xor2};
    use crate::circuit::GateType;

    /// Brute-force satisfiability for tiny formulas
    fn brute_force_sat(cnf: &Cnf) -> bool {
        let n = cnf.nb_vars() as u32;
        assert!(n <= 20);
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
    fn test_inputs_numbered_first() {
        let cnf = tseytin(&xor2());
        assert_eq!(cnf.var("a"), Some(1));
        assert_eq!(cnf.var("b"), Some(2));
        assert_eq!(cnf.nb_vars(), 9);
    }

    #[test]
    fn test_and_clauses() {
        let cnf = tseytin(&and2());
        let (a, b) = (cnf.var("a").unwrap(), cnf.var("b").unwrap());
        let t = cnf.var("and0").unwrap();
        assert_eq!(
            cnf.clauses(),
            &[
                vec![a, -t],
                vec![b, -t],
                vec![t, -a, -b],
                // output asserted true
                vec![t],
            ]
        );
    }

    #[test]
    fn test_shared_gates_encoded_once() {
        let mut c = Circuit::new();
        c.emplace_gate("a", GateType::Input, &[]);
        c.emplace_gate("b", GateType::Input, &[]);
        c.emplace_gate("shared", GateType::And, &["a", "b"]);
        c.emplace_gate("l", GateType::Not, &["shared"]);
        c.emplace_gate("out", GateType::And, &["l", "shared"]);
        c.mark_as_output("out");
        let cnf = tseytin(&c);
        // 3 clauses for each And, 2 for the Not, 1 output unit
        assert_eq!(cnf.nb_clauses(), 9);
        assert_eq!(cnf.nb_vars(), 5);
    }

    #[test]
    fn test_constants() {
        let mut c = Circuit::new();
        c.emplace_gate("__true__", GateType::AlwaysTrue, &[]);
        c.emplace_gate("x", GateType::Input, &[]);
        c.emplace_gate("out", GateType::And, &["x", "__true__"]);
        c.mark_as_output("out");
        let cnf = tseytin(&c);
        let t = cnf.var("__true__").unwrap();
        assert!(cnf.clauses().contains(&vec![t]));
        assert!(brute_force_sat(&cnf));
    }

    #[test]
    fn test_equisatisfiable() {
        // xor is satisfiable, and so must be its encoding
        assert!(brute_force_sat(&tseytin(&xor2())));
        // x and not(x) is unsatisfiable
        let c = crate::circuit::generators::testcases::contradiction();
        assert!(!brute_force_sat(&tseytin(&c)));
    }

    #[test]
    fn test_multi_output_roots() {
        let mut c = Circuit::new();
        c.emplace_gate("a", GateType::Input, &[]);
        c.emplace_gate("n", GateType::Not, &["a"]);
        c.mark_as_output("a");
        c.mark_as_output("n");
        let cnf = tseytin(&c);
        // both outputs asserted: a and not(a), unsatisfiable
        assert!(!brute_force_sat(&cnf));
    }
}
