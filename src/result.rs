//! Crate-wide error type.
//!
//! Structural problems found by the validator (missing terminators, phi
//! input mismatches, and the like) are *not* represented here — those
//! accumulate as `ValidationError`s and are returned as a `Vec`, never
//! thrown. `CodegenError` is for conditions that stop a pass outright:
//! an HIR opcode the translator has no lowering for, or a precondition
//! violated by the caller.

use core::fmt;
use failure_derive::Fail;

/// Failure modes that can abort a codegen pass.
#[derive(Fail, Debug)]
pub enum CodegenError {
    /// The translator has no lowering for this HIR construct. Carries the
    /// opcode name; these are hard errors rather than a silent
    /// miscompile.
    #[fail(display = "unsupported HIR construct: {}", opcode)]
    UnsupportedHir { opcode: &'static str },

    /// The target-lowering pass found an instruction shape it doesn't know
    /// how to rewrite to two-address form.
    #[fail(display = "unsupported lowering for {} on this target", mnemonic)]
    UnsupportedLowering { mnemonic: &'static str },

    /// A caller-supplied precondition was violated (e.g. committing an
    /// editor with no active edit scope).
    #[fail(display = "invariant violated: {}", message)]
    InvariantViolated { message: String },

    /// The code buffer could not resolve every jump within the maximum
    /// number of relaxation passes.
    #[fail(display = "jump resolution did not converge")]
    JumpResolutionDidNotConverge,
}

/// The `Result` type threaded through every fallible pass in this crate.
pub type CodegenResult<T> = Result<T, CodegenError>;

/// One structural inconsistency found while validating a `Function`.
///
/// Unlike `CodegenError`, these never stop a pass: `Validator::validate`
/// keeps walking the graph and returns every violation it finds so a
/// caller can report them all at once.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// The block the violation was found in, if any.
    pub block_id: Option<i32>,
    /// The instruction the violation was found at, if any.
    pub instruction_id: Option<i32>,
    /// Human-readable description of the violation.
    pub message: String,
}

impl ValidationError {
    /// A violation with no block or instruction attached yet.
    pub fn new(message: impl Into<String>) -> ValidationError {
        ValidationError {
            block_id: None,
            instruction_id: None,
            message: message.into(),
        }
    }

    /// Attaches the block this violation was found in.
    pub fn at_block(mut self, block_id: i32) -> ValidationError {
        self.block_id = Some(block_id);
        self
    }

    /// Attaches the instruction this violation was found at.
    pub fn at_instruction(mut self, instruction_id: i32) -> ValidationError {
        self.instruction_id = Some(instruction_id);
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.block_id, self.instruction_id) {
            (Some(b), Some(i)) => write!(f, "block{} inst{}: {}", b, i, self.message),
            (Some(b), None) => write!(f, "block{}: {}", b, self.message),
            _ => write!(f, "{}", self.message),
        }
    }
}
