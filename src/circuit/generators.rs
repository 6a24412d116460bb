//! Circuit generators and templates

use fxhash::FxHashMap;

use crate::circuit::gate::{GateType, Label};
use crate::circuit::Circuit;

/// Incremental construction of AIGs with automatic gate naming
///
/// Or and Xor are expanded into And/Not trees, so the result is always a
/// pure AIG.
#[derive(Debug, Default)]
pub struct CircuitBuilder {
    circuit: Circuit,
    next_id: usize,
}

impl CircuitBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a primary input
    pub fn input(&mut self, label: &str) -> Label {
        self.circuit.emplace_gate(label, GateType::Input, &[]);
        label.to_string()
    }

    /// Add a gate with an explicit label
    pub fn gate(&mut self, label: &str, gate_type: GateType, operands: &[&str]) -> Label {
        self.circuit.emplace_gate(label, gate_type, operands);
        label.to_string()
    }

    /// Add an And gate
    pub fn and(&mut self, a: &str, b: &str) -> Label {
        let label = self.fresh("and");
        self.circuit.emplace_gate(&label, GateType::And, &[a, b]);
        label
    }

    /// Add a Not gate
    pub fn not(&mut self, a: &str) -> Label {
        let label = self.fresh("not");
        self.circuit.emplace_gate(&label, GateType::Not, &[a]);
        label
    }

    /// Build an Or from And/Not
    pub fn or(&mut self, a: &str, b: &str) -> Label {
        let na = self.not(a);
        let nb = self.not(b);
        let n = self.and(&na, &nb);
        self.not(&n)
    }

    /// Build a Xor from And/Not
    pub fn xor(&mut self, a: &str, b: &str) -> Label {
        let both = self.and(a, b);
        let nboth = self.not(&both);
        let either = self.or(a, b);
        self.and(&nboth, &either)
    }

    /// Constant gate, created on first use
    pub fn constant(&mut self, value: bool) -> Label {
        let label = if value { "__true__" } else { "__false__" };
        if !self.circuit.contains_gate(label) {
            self.circuit.emplace_gate(label, GateType::constant(value), &[]);
        }
        label.to_string()
    }

    /// Mark a gate as an observable output
    pub fn output(&mut self, label: &str) {
        self.circuit.mark_as_output(label);
    }

    /// Finish construction and return the circuit
    pub fn finish(self) -> Circuit {
        self.circuit.check();
        self.circuit
    }

    fn fresh(&mut self, stem: &str) -> Label {
        let label = format!("{}{}", stem, self.next_id);
        self.next_id += 1;
        label
    }
}

/// Build a miter of two circuits with matching signatures
///
/// The miter shares the primary inputs by position, xors the corresponding
/// outputs and ors the differences into a single output. The output is
/// satisfiable exactly when the two circuits differ on some input.
pub fn miter(a: &Circuit, b: &Circuit) -> Circuit {
    assert_eq!(a.input_size(), b.input_size(), "different input counts");
    assert_eq!(a.output_size(), b.output_size(), "different output counts");
    assert!(a.output_size() > 0, "miter needs at least one output");

    let mut builder = CircuitBuilder::new();
    let shared: Vec<Label> = (0..a.input_size())
        .map(|k| builder.input(&format!("x{k}")))
        .collect();
    let map_a = embed(&mut builder, a, "a_", &shared);
    let map_b = embed(&mut builder, b, "b_", &shared);

    let mut diff: Option<Label> = None;
    for (oa, ob) in a.outputs().iter().zip(b.outputs()) {
        let x = builder.xor(&map_a[oa], &map_b[ob]);
        diff = Some(match diff {
            None => x,
            Some(acc) => builder.or(&acc, &x),
        });
    }
    let out = diff.unwrap();
    builder.output(&out);
    builder.finish()
}

/// Copy the gates of a circuit into the builder under prefixed labels
fn embed(
    builder: &mut CircuitBuilder,
    circuit: &Circuit,
    prefix: &str,
    shared_inputs: &[Label],
) -> FxHashMap<Label, Label> {
    let input_pos: FxHashMap<&str, usize> = circuit
        .inputs()
        .iter()
        .enumerate()
        .map(|(i, l)| (l.as_str(), i))
        .collect();
    let mut map: FxHashMap<String, Label> = FxHashMap::default();
    for gate in circuit.top_sort(true) {
        let new_label = match gate.gate_type() {
            GateType::Input => shared_inputs[input_pos[gate.label()]].clone(),
            GateType::AlwaysTrue => builder.constant(true),
            GateType::AlwaysFalse => builder.constant(false),
            tp => {
                let ops: Vec<Label> = gate.operands().iter().map(|op| map[op].clone()).collect();
                let op_refs: Vec<&str> = ops.iter().map(|s| s.as_str()).collect();
                builder.gate(&format!("{}{}", prefix, gate.label()), tp, &op_refs)
            }
        };
        map.insert(gate.label().to_string(), new_label);
    }
    map
}

/// Simple generators to exercise the solver
pub mod testcases {
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    use super::CircuitBuilder;
    use crate::circuit::Circuit;

    /// A random single-output AIG
    ///
    /// Operands are drawn uniformly from the inputs and the gates created so
    /// far, with roughly one inverter for every two And gates.
    pub fn random_aig(nb_inputs: usize, nb_gates: usize, seed: u64) -> Circuit {
        assert!(nb_inputs > 0 && nb_gates > 0);
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut builder = CircuitBuilder::new();
        let mut pool: Vec<String> = (0..nb_inputs)
            .map(|k| builder.input(&format!("x{k}")))
            .collect();
        let mut last = pool[0].clone();
        for _ in 0..nb_gates {
            last = if rng.gen_range(0..3) == 0 {
                let a = pool[rng.gen_range(0..pool.len())].clone();
                builder.not(&a)
            } else {
                let a = pool[rng.gen_range(0..pool.len())].clone();
                let b = pool[rng.gen_range(0..pool.len())].clone();
                builder.and(&a, &b)
            };
            pool.push(last.clone());
        }
        builder.output(&last);
        builder.finish()
    }

    /// The two-input And circuit used across the tests
    pub fn and2() -> Circuit {
        let mut builder = CircuitBuilder::new();
        builder.input("a");
        builder.input("b");
        let out = builder.and("a", "b");
        builder.output(&out);
        builder.finish()
    }

    /// A contradiction: and(x, not(x))
    pub fn contradiction() -> Circuit {
        let mut builder = CircuitBuilder::new();
        builder.input("x");
        let nx = builder.not("x");
        let out = builder.and("x", &nx);
        builder.output(&out);
        builder.finish()
    }

    /// A single-output Xor circuit
    pub fn xor2() -> Circuit {
        let mut builder = CircuitBuilder::new();
        builder.input("a");
        builder.input("b");
        let out = builder.xor("a", "b");
        builder.output(&out);
        builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::testcases::{and2, random_aig, xor2};
    use super::miter;

    #[test]
    fn test_xor_truth_table() {
        let c = xor2();
        for a in [false, true] {
            for b in [false, true] {
                assert_eq!(c.evaluate(&[a, b]), vec![a != b]);
            }
        }
    }

    #[test]
    fn test_miter_function() {
        let m = miter(&xor2(), &and2());
        for a in [false, true] {
            for b in [false, true] {
                let expected = (a != b) != (a && b);
                assert_eq!(m.evaluate(&[a, b]), vec![expected]);
            }
        }
    }

    #[test]
    fn test_self_miter_is_constant_false() {
        let m = miter(&xor2(), &xor2());
        for a in [false, true] {
            for b in [false, true] {
                assert_eq!(m.evaluate(&[a, b]), vec![false]);
            }
        }
    }

    #[test]
    fn test_random_aig() {
        for seed in 0..8 {
            let c = random_aig(4, 20, seed);
            assert_eq!(c.input_size(), 4);
            assert_eq!(c.output_size(), 1);
            c.evaluate(&[false, true, false, true]);
        }
    }
}
