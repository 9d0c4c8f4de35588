//! x64 code generation: HIR-to-LIR translation, target-specific lowering,
//! control-flow cleanup, stack allocation, and machine code emission.
//!
//! The pipeline a caller drives is [`translate::translate`] (scheduled HIR
//! to a [`ir::function::Function`]), [`isa::x64::lower::lower_function`]
//! (three-address to two-address rewriting and fixed-register pinning),
//! [`regalloc::phi_inversion::split_critical_edges`] and
//! [`regalloc::clean::clean_function`] (control-flow simplification),
//! [`regalloc::stack::StackAllocator`] (frame-slot assignment), and
//! finally [`binemit::emit_function`] against an [`api::MachineCodeBuilder`]
//! implementation.

#![deny(trivial_numeric_casts, unused_extern_crates)]
#![warn(unused_import_braces, missing_docs)]

pub mod api;
pub mod binemit;
pub mod ir;
pub mod isa;
pub mod regalloc;
pub mod translate;
pub mod value;

mod result;

pub use crate::result::{CodegenError, CodegenResult};

/// Version number of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
