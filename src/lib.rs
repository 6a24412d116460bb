//! Cube-and-Conquer SAT solving natively on And-Inverter Graphs (AIG).
//!
//! Given a single-output combinational circuit, this crate decides whether
//! some input assignment makes the output true. The cube stage repeatedly
//! branches on a well-chosen gate and propagates constants through the
//! circuit, producing a list of residual CNF sub-problems; the conquer stage
//! dispatches each of them to a CDCL backend (the bundled kissat or any
//! external solver following the SAT-competition conventions).
//!
//! Circuits are read from AIGER files, both the textual and the binary
//! variant; sub-problems are written as DIMACS CNF.

#![warn(missing_docs)]

pub mod circuit;
pub mod cnf;
pub mod cube;
pub mod instance;
pub mod io;
pub mod sat;
pub mod simplify;

pub use circuit::{Circuit, Gate, GateType, Label};
pub use cube::{CubeAndConquerSolver, CubeResult, SolveResult, SolveStatus};
pub use instance::{AssignmentStatus, CircuitSatInstance};
