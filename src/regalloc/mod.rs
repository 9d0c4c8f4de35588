//! Passes that run on lowered LIR before code emission: control-flow
//! cleanup, critical-edge splitting for phi correctness, and the stack
//! slot allocator used to spill virtual registers and track outgoing
//! call argument space.

mod support;

pub mod clean;
pub mod phi_inversion;
pub mod stack;
