//! ISA-specific target descriptors.
//!
//! This crate supports exactly one target, so there is no `settings`
//! flags builder the way a multi-architecture codegen crate would have
//! one: [`x64::Target`] is a zero-sized type whose associated functions
//! are the whole interface.

pub mod x64;
