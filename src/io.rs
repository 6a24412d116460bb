//! Read circuits and write formulas to files

pub mod aiger;
pub mod dimacs;

use std::path::Path;

pub use aiger::{read_aiger_ascii, read_aiger_binary, read_aiger_file};
pub use dimacs::write_dimacs;

use crate::circuit::Circuit;

/// Parse a circuit from a file
///
/// Following extensions are supported: .aag, .aig
pub fn read_circuit_file(path: &Path) -> Result<Circuit, String> {
    read_aiger_file(path)
}
