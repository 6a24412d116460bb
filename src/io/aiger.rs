//! AIGER input, both the textual `aag` and the binary `aig` variant
//!
//! Latches are rejected: the solver only handles combinational circuits.
//! The two AIGER constants become gates labelled `__true__` and `__false__`,
//! inputs are labelled `i<n>`, And gates `n<lhs/2>`, and negated literals
//! materialize a `not_<base>` gate on demand. Symbol table entries rename
//! inputs and give outputs a named passthrough gate.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use fxhash::{FxHashMap, FxHashSet};

use crate::circuit::{Circuit, GateType, Label};

/// Sections of an AIGER file before gate construction
#[derive(Default)]
struct RawAig {
    inputs: Vec<u64>,
    outputs: Vec<u64>,
    ands: Vec<(u64, u64, u64)>,
    input_symbols: FxHashMap<usize, String>,
    output_symbols: FxHashMap<usize, String>,
}

/// Read an AIGER file, choosing the variant from the extension
pub fn read_aiger_file(path: &Path) -> Result<Circuit, String> {
    let file = File::open(path).map_err(|e| format!("cannot open {}: {e}", path.display()))?;
    match path.extension().and_then(|s| s.to_str()) {
        Some("aag") => read_aiger_ascii(file),
        Some("aig") => read_aiger_binary(file),
        _ => Err(format!("unknown file extension for {}", path.display())),
    }
}

/// Read the textual AIGER variant
pub fn read_aiger_ascii<R: Read>(mut r: R) -> Result<Circuit, String> {
    let mut text = String::new();
    r.read_to_string(&mut text)
        .map_err(|e| format!("error during file IO: {e}"))?;
    let mut lines = text.lines();

    let header = lines.next().ok_or("empty file")?;
    let (_m, i, _l, o, a) = parse_header(header, "aag")?;

    let mut raw = RawAig::default();
    for _ in 0..i {
        let line = lines.next().ok_or("unexpected end of file in inputs")?;
        raw.inputs.push(parse_num(line.trim())?);
    }
    for _ in 0..o {
        let line = lines.next().ok_or("unexpected end of file in outputs")?;
        raw.outputs.push(parse_num(line.trim())?);
    }
    for _ in 0..a {
        let line = lines.next().ok_or("unexpected end of file in and gates")?;
        let nums: Vec<&str> = line.split_whitespace().collect();
        if nums.len() != 3 {
            return Err(format!("invalid and gate line: {line}"));
        }
        raw.ands
            .push((parse_num(nums[0])?, parse_num(nums[1])?, parse_num(nums[2])?));
    }
    parse_symbol_section(lines, &mut raw);
    build_circuit(raw)
}

/// Read the binary AIGER variant
pub fn read_aiger_binary<R: Read>(mut r: R) -> Result<Circuit, String> {
    let mut data = Vec::new();
    r.read_to_end(&mut data)
        .map_err(|e| format!("error during file IO: {e}"))?;
    let mut pos = 0;

    let header = read_line(&data, &mut pos).ok_or("unexpected end of file in header")?;
    let (_m, i, l, o, a) = parse_header(&header, "aig")?;

    let mut raw = RawAig::default();
    // Binary input literals are implicit
    for idx in 0..i {
        raw.inputs.push(2 * (idx + 1));
    }
    for _ in 0..o {
        let line = read_line(&data, &mut pos).ok_or("unexpected end of file in outputs")?;
        raw.outputs.push(parse_num(line.trim())?);
    }
    for idx in 0..a {
        let lhs = 2 * (i + l + idx + 1);
        let delta0 = decode_delta(&data, &mut pos)?;
        let delta1 = decode_delta(&data, &mut pos)?;
        let rhs0 = lhs
            .checked_sub(delta0)
            .ok_or_else(|| format!("invalid delta encoding for literal {lhs}"))?;
        let rhs1 = rhs0
            .checked_sub(delta1)
            .ok_or_else(|| format!("invalid delta encoding for literal {lhs}"))?;
        raw.ands.push((lhs, rhs0, rhs1));
    }
    let tail = String::from_utf8_lossy(&data[pos..]).into_owned();
    parse_symbol_section(tail.lines(), &mut raw);
    build_circuit(raw)
}

fn parse_header(line: &str, keyword: &str) -> Result<(u64, u64, u64, u64, u64), String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 6 || parts[0] != keyword {
        return Err(format!("invalid {} header: {line}", keyword.to_uppercase()));
    }
    let m = parse_num(parts[1])?;
    let i = parse_num(parts[2])?;
    let l = parse_num(parts[3])?;
    let o = parse_num(parts[4])?;
    let a = parse_num(parts[5])?;
    if l != 0 {
        return Err("latches are not supported (L must be 0)".to_string());
    }
    Ok((m, i, l, o, a))
}

fn parse_num(s: &str) -> Result<u64, String> {
    s.parse::<u64>().map_err(|_| format!("invalid number: {s}"))
}

fn read_line(data: &[u8], pos: &mut usize) -> Option<String> {
    let end = data[*pos..].iter().position(|&b| b == b'\n')?;
    let line = String::from_utf8_lossy(&data[*pos..*pos + end]).into_owned();
    *pos += end + 1;
    Some(line)
}

/// 7-bit little-endian groups, high bit marking continuation
fn decode_delta(data: &[u8], pos: &mut usize) -> Result<u64, String> {
    let mut result: u64 = 0;
    let mut shift = 0;
    loop {
        let byte = *data
            .get(*pos)
            .ok_or("unexpected end of file in delta encoding")?;
        *pos += 1;
        result |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
}

/// Parse `i <n> <name>` and `o <n> <name>` entries until a comment or blank
fn parse_symbol_section<'a>(lines: impl Iterator<Item = &'a str>, raw: &mut RawAig) {
    for line in lines {
        let line = line.trim();
        if line.is_empty() || line.starts_with('c') {
            break;
        }
        let Some(rest) = line.get(1..) else { continue };
        let Some((pos, name)) = rest.trim_start().split_once(' ') else {
            continue;
        };
        let Ok(pos) = pos.parse::<usize>() else { continue };
        match line.as_bytes()[0] {
            b'i' => {
                raw.input_symbols.insert(pos, name.to_string());
            }
            b'o' => {
                raw.output_symbols.insert(pos, name.to_string());
            }
            _ => (),
        }
    }
}

/// Materialize the circuit from the parsed sections
fn build_circuit(raw: RawAig) -> Result<Circuit, String> {
    let mut circuit = Circuit::new();
    let mut lit_label: FxHashMap<u64, Label> = FxHashMap::default();
    circuit.emplace_gate("__false__", GateType::AlwaysFalse, &[]);
    circuit.emplace_gate("__true__", GateType::AlwaysTrue, &[]);
    lit_label.insert(0, "__false__".to_string());
    lit_label.insert(1, "__true__".to_string());

    // Default labels the construction below will claim; a symbol colliding
    // with one of them (or with an already-named gate) is ignored rather
    // than renamed onto another gate
    let mut reserved: FxHashSet<Label> = FxHashSet::default();
    for idx in 0..raw.inputs.len() {
        reserved.insert(format!("i{idx}"));
    }
    for &(lhs, _, _) in &raw.ands {
        reserved.insert(format!("n{}", lhs / 2));
    }

    for (idx, &lit) in raw.inputs.iter().enumerate() {
        if lit % 2 == 1 || lit_label.contains_key(&lit) {
            return Err(format!("invalid input literal {lit}"));
        }
        let label = match raw.input_symbols.get(&idx) {
            Some(name) if !circuit.contains_gate(name) && !reserved.contains(name) => name.clone(),
            _ => format!("i{idx}"),
        };
        circuit.emplace_gate(&label, GateType::Input, &[]);
        lit_label.insert(lit, label);
    }

    // Register every And label upfront so operands may reference gates
    // defined later in the file
    let mut and_defs: FxHashMap<u64, (u64, u64)> = FxHashMap::default();
    for &(lhs, rhs0, rhs1) in &raw.ands {
        if lhs % 2 == 1 {
            return Err(format!("and gate defined on negated literal {lhs}"));
        }
        if lit_label.contains_key(&lhs) {
            return Err(format!("literal {lhs} is defined twice"));
        }
        and_defs.insert(lhs, (rhs0, rhs1));
        lit_label.insert(lhs, format!("n{}", lhs / 2));
    }

    // Create the gates in dependency order, iteratively: files with
    // hundreds of thousands of gates must not overflow the call stack
    let mut created: FxHashSet<u64> = FxHashSet::default();
    let mut in_progress: FxHashSet<u64> = FxHashSet::default();
    for &(root, _, _) in &raw.ands {
        let mut stack: Vec<(u64, bool)> = vec![(root, false)];
        while let Some((lhs, expanded)) = stack.pop() {
            if expanded {
                in_progress.remove(&lhs);
                let (rhs0, rhs1) = and_defs[&lhs];
                let op0 = literal_label(&mut circuit, &mut lit_label, rhs0)?;
                let op1 = literal_label(&mut circuit, &mut lit_label, rhs1)?;
                let label = lit_label[&lhs].clone();
                circuit.emplace_gate(&label, GateType::And, &[&op0, &op1]);
                created.insert(lhs);
                continue;
            }
            if created.contains(&lhs) {
                continue;
            }
            if !in_progress.insert(lhs) {
                return Err(format!("cyclic definition of literal {lhs}"));
            }
            stack.push((lhs, true));
            let (rhs0, rhs1) = and_defs[&lhs];
            for rhs in [rhs1, rhs0] {
                let base = rhs & !1;
                if and_defs.contains_key(&base) && !created.contains(&base) {
                    stack.push((base, false));
                }
            }
        }
    }

    let mut output_labels = Vec::new();
    for (idx, &lit) in raw.outputs.iter().enumerate() {
        let mut label = literal_label(&mut circuit, &mut lit_label, lit)?;
        if let Some(name) = raw.output_symbols.get(&idx) {
            if !circuit.contains_gate(name) {
                // Named passthrough: an inverter pair keeps the graph a pure
                // AIG; inverter merging dissolves it at solve entry
                if lit % 2 == 1 {
                    let base = lit_label[&(lit - 1)].clone();
                    circuit.emplace_gate(name, GateType::Not, &[&base]);
                } else {
                    let inverted = literal_label(&mut circuit, &mut lit_label, lit ^ 1)?;
                    circuit.emplace_gate(name, GateType::Not, &[&inverted]);
                }
                label = name.clone();
            }
        }
        output_labels.push(label);
    }
    circuit.set_outputs(output_labels);
    circuit.check();
    Ok(circuit)
}

/// Label of a literal, creating the `not_<base>` gate for odd literals
fn literal_label(
    circuit: &mut Circuit,
    lit_label: &mut FxHashMap<u64, Label>,
    lit: u64,
) -> Result<Label, String> {
    if let Some(label) = lit_label.get(&lit) {
        return Ok(label.clone());
    }
    if lit % 2 == 0 {
        return Err(format!("undefined literal {lit}"));
    }
    let base_label = lit_label
        .get(&(lit - 1))
        .ok_or_else(|| format!("undefined literal {}", lit - 1))?
        .clone();
    let not_label = format!("not_{base_label}");
    if !circuit.contains_gate(&not_label) {
        circuit.emplace_gate(&not_label, GateType::Not, &[&base_label]);
    }
    lit_label.insert(lit, not_label.clone());
    Ok(not_label)
}
