//! Rewrite passes over circuits

use fxhash::FxHashMap;

use crate::circuit::{Circuit, Gate, GateType, Label};

/// A rewrite pass producing a new circuit
///
/// Passes never mutate their argument; the caller replaces the old circuit
/// with the result.
pub trait Transform {
    /// Apply the pass
    fn run(&self, circuit: &Circuit) -> Circuit;
}

/// Apply several passes in sequence
pub fn apply_all(circuit: &Circuit, passes: &[&dyn Transform]) -> Circuit {
    let mut ret = circuit.clone();
    for pass in passes {
        ret = pass.run(&ret);
    }
    ret
}

/// Constant propagation
///
/// Walks the circuit from inputs to outputs and folds every gate whose value
/// becomes known, forwarding gates that reduce to one of their operands.
/// Constant gates are dropped from the result; outputs that reduce to a
/// constant are dropped from the output list, which is how a trivially
/// determined circuit becomes zero-output.
///
/// The pass is idempotent: running it on its own result is a no-op.
pub struct PropagateConstants;

impl Transform for PropagateConstants {
    fn run(&self, circuit: &Circuit) -> Circuit {
        for gate in circuit.gates() {
            assert!(
                gate.operands().len() <= 2,
                "gate {} has {} operands, only binary gates are supported",
                gate.label(),
                gate.operands().len()
            );
        }

        let mut ret = Circuit::new();
        let mut const_map: FxHashMap<Label, bool> = FxHashMap::default();
        let mut label_remap: FxHashMap<Label, Label> = FxHashMap::default();

        for gate in circuit.top_sort(true) {
            match gate.gate_type() {
                GateType::Input => {
                    ret.add_gate(gate.clone());
                    continue;
                }
                GateType::AlwaysTrue => {
                    const_map.insert(gate.label().to_string(), true);
                    continue;
                }
                GateType::AlwaysFalse => {
                    const_map.insert(gate.label().to_string(), false);
                    continue;
                }
                GateType::And | GateType::Not => (),
            }

            let ops: Vec<Label> = gate
                .operands()
                .iter()
                .map(|op| resolve(&label_remap, op))
                .collect();
            let const_vals: Vec<Option<bool>> =
                ops.iter().map(|op| const_map.get(op).copied()).collect();
            let nb_const = const_vals.iter().filter(|v| v.is_some()).count();

            if nb_const == 0 {
                ret.add_gate(Gate::new(gate.label(), gate.gate_type(), ops));
                continue;
            }

            if nb_const == ops.len() {
                let args: Vec<bool> = const_vals.into_iter().flatten().collect();
                const_map.insert(gate.label().to_string(), gate.eval(&args));
                continue;
            }

            // Exactly one constant operand of a binary gate: evaluate the
            // operator for both polarities of the surviving operand
            assert_eq!(ops.len(), 2);
            let const_idx = const_vals.iter().position(|v| v.is_some()).unwrap();
            let const_val = const_vals[const_idx].unwrap();
            let other = ops[1 - const_idx].clone();

            let mut args = [false, false];
            args[const_idx] = const_val;
            let val0 = gate.eval(&args);
            args[1 - const_idx] = true;
            let val1 = gate.eval(&args);

            if val0 == val1 {
                const_map.insert(gate.label().to_string(), val0);
            } else if !val0 {
                // The gate follows the surviving operand
                label_remap.insert(gate.label().to_string(), other);
            } else {
                // The gate is the negation of the surviving operand: reuse an
                // existing inverter chain or create a fresh Not
                let inverted = match ret.contains_gate(&other) {
                    true if ret.get_gate(&other).gate_type() == GateType::Not => {
                        Some(ret.get_gate(&other).operands()[0].clone())
                    }
                    _ => None,
                };
                match inverted {
                    Some(target) => {
                        label_remap.insert(gate.label().to_string(), target);
                    }
                    None => ret.emplace_gate(gate.label(), GateType::Not, &[&other]),
                }
            }
        }

        let inputs: Vec<Label> = circuit
            .inputs()
            .iter()
            .filter(|l| !const_map.contains_key(*l))
            .cloned()
            .collect();
        ret.set_inputs(inputs);

        let outputs: Vec<Label> = circuit
            .outputs()
            .iter()
            .map(|o| resolve(&label_remap, o))
            .filter(|o| !const_map.contains_key(o))
            .collect();
        ret.set_outputs(outputs);
        ret
    }
}

/// Collapse chains of inverters
///
/// A Not gate whose operand is itself a surviving Not is forwarded to the
/// inner operand. Used once at solve entry, mainly to dissolve the named
/// passthrough gates the AIGER reader creates for output symbols.
pub struct MergeInverters;

impl Transform for MergeInverters {
    fn run(&self, circuit: &Circuit) -> Circuit {
        let mut ret = Circuit::new();
        let mut label_remap: FxHashMap<Label, Label> = FxHashMap::default();

        for gate in circuit.top_sort(true) {
            if gate.gate_type() == GateType::Input {
                ret.add_gate(gate.clone());
                continue;
            }
            let ops: Vec<Label> = gate
                .operands()
                .iter()
                .map(|op| resolve(&label_remap, op))
                .collect();
            if gate.gate_type() == GateType::Not
                && ret.contains_gate(&ops[0])
                && ret.get_gate(&ops[0]).gate_type() == GateType::Not
            {
                let inner = ret.get_gate(&ops[0]).operands()[0].clone();
                label_remap.insert(gate.label().to_string(), inner);
                continue;
            }
            ret.add_gate(Gate::new(gate.label(), gate.gate_type(), ops));
        }

        ret.set_inputs(circuit.inputs().to_vec());
        let outputs: Vec<Label> = circuit
            .outputs()
            .iter()
            .map(|o| resolve(&label_remap, o))
            .collect();
        ret.set_outputs(outputs);
        ret
    }
}

fn resolve(label_remap: &FxHashMap<Label, Label>, label: &str) -> Label {
    label_remap
        .get(label)
        .cloned()
        .unwrap_or_else(|| label.to_string())
}
