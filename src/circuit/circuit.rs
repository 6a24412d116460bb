use core::fmt;

use fxhash::FxHashMap;

use crate::circuit::gate::{Gate, GateType, Label};

/// Representation of a combinational logic circuit as an And-Inverter Graph
///
/// Gates are stored densely in insertion order and addressed by label.
/// The structure maintains the ordered input and output lists and a reverse
/// index from each gate to its users, which rewrites keep consistent with
/// the forward operand edges.
#[derive(Debug, Clone, Default)]
pub struct Circuit {
    gates: Vec<Gate>,
    index: FxHashMap<Label, usize>,
    users: Vec<Vec<Label>>,
    inputs: Vec<Label>,
    outputs: Vec<Label>,
}

impl Circuit {
    /// Create an empty circuit
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the number of gates
    pub fn size(&self) -> usize {
        self.gates.len()
    }

    /// Return the number of primary inputs
    pub fn input_size(&self) -> usize {
        self.inputs.len()
    }

    /// Return the number of primary outputs
    pub fn output_size(&self) -> usize {
        self.outputs.len()
    }

    /// Ordered primary input labels
    pub fn inputs(&self) -> &[Label] {
        &self.inputs
    }

    /// Ordered primary output labels
    pub fn outputs(&self) -> &[Label] {
        &self.outputs
    }

    /// Iterate over the gates in insertion order
    pub fn gates(&self) -> impl Iterator<Item = &Gate> {
        self.gates.iter()
    }

    /// Return whether a gate with this label exists
    pub fn contains_gate(&self, label: &str) -> bool {
        self.index.contains_key(label)
    }

    /// Get the gate with the given label
    pub fn get_gate(&self, label: &str) -> &Gate {
        &self.gates[self.slot(label)]
    }

    /// Labels of the gates that use this gate as an operand
    ///
    /// A gate referencing the same operand twice appears twice.
    pub fn users(&self, label: &str) -> &[Label] {
        &self.users[self.slot(label)]
    }

    /// Insert a new gate
    ///
    /// The label must be unused and all operands must already be defined.
    pub fn add_gate(&mut self, gate: Gate) {
        assert!(
            !self.contains_gate(gate.label()),
            "gate {} is defined twice",
            gate.label()
        );
        for op in gate.operands() {
            assert!(
                self.contains_gate(op),
                "operand {} of gate {} is not defined",
                op,
                gate.label()
            );
        }
        let slot = self.gates.len();
        self.index.insert(gate.label().to_string(), slot);
        for op in gate.operands() {
            let op_slot = self.slot(op);
            self.users[op_slot].push(gate.label().to_string());
        }
        if gate.gate_type() == GateType::Input {
            self.inputs.push(gate.label().to_string());
        }
        self.gates.push(gate);
        self.users.push(Vec::new());
    }

    /// Build and insert a new gate
    pub fn emplace_gate(&mut self, label: &str, gate_type: GateType, operands: &[&str]) {
        let ops = operands.iter().map(|s| s.to_string()).collect();
        self.add_gate(Gate::new(label, gate_type, ops));
    }

    /// Replace an existing gate by a new record under the same label
    ///
    /// Operand edges of the old record are severed and the user index is
    /// updated. Inputs can be replaced (and leave the input list) but the
    /// replacement itself may not be an input.
    pub fn replace_gate(&mut self, label: &str, gate_type: GateType, operands: &[&str]) {
        assert_ne!(gate_type, GateType::Input, "cannot replace a gate by an input");
        let slot = self.slot(label);
        let old_ops: Vec<Label> = self.gates[slot].operands().to_vec();
        for op in &old_ops {
            self.remove_user(op, label);
        }
        if self.gates[slot].gate_type() == GateType::Input {
            self.inputs.retain(|l| l != label);
        }
        for op in operands {
            assert!(
                self.contains_gate(op),
                "operand {} of gate {} is not defined",
                op,
                label
            );
        }
        let ops = operands.iter().map(|s| s.to_string()).collect();
        self.gates[slot] = Gate::new(label, gate_type, ops);
        for op in operands {
            let op_slot = self.slot(op);
            self.users[op_slot].push(label.to_string());
        }
    }

    /// Remove one user edge from the reverse index
    pub fn remove_user(&mut self, label: &str, user: &str) {
        let slot = self.slot(label);
        let users = &mut self.users[slot];
        let pos = users
            .iter()
            .position(|u| u == user)
            .unwrap_or_else(|| panic!("{user} is not a user of {label}"));
        users.remove(pos);
    }

    /// Replace the named input gates by constants
    ///
    /// The labels leave the input list but keep their user edges, so that
    /// constant propagation can fold the users afterwards.
    pub fn replace_inputs(&mut self, true_labels: &[Label], false_labels: &[Label]) {
        for label in true_labels {
            assert_eq!(self.get_gate(label).gate_type(), GateType::Input);
            self.replace_gate(label, GateType::AlwaysTrue, &[]);
        }
        for label in false_labels {
            assert_eq!(self.get_gate(label).gate_type(), GateType::Input);
            self.replace_gate(label, GateType::AlwaysFalse, &[]);
        }
    }

    /// Reset the ordered input list
    ///
    /// Used by rewrites that rebuild a circuit gate by gate and need to
    /// restore the original input order. The list must name exactly the
    /// input gates of the circuit.
    pub fn set_inputs(&mut self, labels: Vec<Label>) {
        for label in &labels {
            assert_eq!(
                self.get_gate(label).gate_type(),
                GateType::Input,
                "{label} is not an input"
            );
        }
        assert_eq!(
            labels.len(),
            self.gates
                .iter()
                .filter(|g| g.gate_type() == GateType::Input)
                .count(),
            "input list does not cover all input gates"
        );
        self.inputs = labels;
    }

    /// Designate the observable outputs
    pub fn set_outputs(&mut self, labels: Vec<Label>) {
        for label in &labels {
            assert!(self.contains_gate(label), "output {label} is not defined");
        }
        self.outputs = labels;
    }

    /// Add a single label to the outputs
    pub fn mark_as_output(&mut self, label: &str) {
        assert!(self.contains_gate(label), "output {label} is not defined");
        self.outputs.push(label.to_string());
    }

    /// Yield the gates in topological order
    ///
    /// By default the order goes from the outputs towards the inputs;
    /// `inverse` yields inputs and constants first, the order a forward
    /// rewrite needs. Panics if the graph has a combinational loop.
    pub fn top_sort(&self, inverse: bool) -> impl Iterator<Item = &Gate> {
        let mut order = self.top_sort_slots();
        if !inverse {
            order.reverse();
        }
        order.into_iter().map(move |slot| &self.gates[slot])
    }

    /// Kahn worklist over dependency counts, inputs first
    fn top_sort_slots(&self) -> Vec<usize> {
        let mut count_deps: Vec<usize> = self.gates.iter().map(|g| g.operands().len()).collect();
        let mut order: Vec<usize> = (0..self.size()).filter(|s| count_deps[*s] == 0).collect();
        let mut next = 0;
        while next < order.len() {
            let slot = order[next];
            next += 1;
            for user in &self.users[slot] {
                let user_slot = self.slot(user);
                count_deps[user_slot] -= 1;
                if count_deps[user_slot] == 0 {
                    order.push(user_slot);
                }
            }
        }
        if order.len() != self.size() {
            panic!("unable to find a valid topological sort: there must be a combinational loop");
        }
        order
    }

    /// Evaluate the circuit on concrete input values
    ///
    /// Values are given in input-list order; the result is in output-list
    /// order.
    pub fn evaluate(&self, input_values: &[bool]) -> Vec<bool> {
        assert_eq!(input_values.len(), self.input_size());
        let input_pos: FxHashMap<&str, usize> = self
            .inputs
            .iter()
            .enumerate()
            .map(|(i, l)| (l.as_str(), i))
            .collect();
        let mut values = vec![false; self.size()];
        for slot in self.top_sort_slots() {
            let gate = &self.gates[slot];
            values[slot] = if gate.gate_type() == GateType::Input {
                input_values[input_pos[gate.label()]]
            } else {
                let args: Vec<bool> = gate
                    .operands()
                    .iter()
                    .map(|op| values[self.slot(op)])
                    .collect();
                gate.eval(&args)
            };
        }
        self.outputs.iter().map(|o| values[self.slot(o)]).collect()
    }

    /// Check consistency of the datastructure
    pub fn check(&self) {
        for gate in &self.gates {
            for op in gate.operands() {
                assert!(
                    self.contains_gate(op),
                    "operand {} of gate {} is not defined",
                    op,
                    gate.label()
                );
                assert!(
                    self.users(op).iter().any(|u| u == gate.label()),
                    "user index misses edge {} -> {}",
                    op,
                    gate.label()
                );
            }
        }
        for (slot, users) in self.users.iter().enumerate() {
            let label = self.gates[slot].label();
            for user in users {
                assert!(
                    self.get_gate(user).operands().iter().any(|op| op == label),
                    "stale user edge {label} -> {user}"
                );
            }
        }
        for label in &self.inputs {
            assert_eq!(self.get_gate(label).gate_type(), GateType::Input);
        }
        for label in &self.outputs {
            assert!(self.contains_gate(label), "output {label} is not defined");
        }
        // A loop would already make top_sort panic
        let _ = self.top_sort_slots();
    }

    pub(crate) fn slot(&self, label: &str) -> usize {
        *self
            .index
            .get(label)
            .unwrap_or_else(|| panic!("gate {label} is not defined"))
    }

    pub(crate) fn gate_at(&self, slot: usize) -> &Gate {
        &self.gates[slot]
    }
}

impl fmt::Display for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Circuit with {} inputs, {} outputs:",
            self.input_size(),
            self.output_size()
        )?;
        for gate in &self.gates {
            writeln!(f, "\t{} = {}", gate.label(), gate)?;
        }
        for (i, o) in self.outputs.iter().enumerate() {
            writeln!(f, "\to{i} = {o}")?;
        }
        Ok(())
    }
}
