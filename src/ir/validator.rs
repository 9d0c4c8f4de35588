//! Structural validation of a `Function`'s LIR.
//!
//! Mirrors `Editor::Validate(BasicBlock*)`/`Validate(Function*)`: no
//! single violation aborts the walk, every one found is appended to the
//! returned list. Debug builds call `validate_function` after every
//! `Editor::commit`.

use crate::ir::function::{Block, Function};
use crate::ir::instructions::Opcode;
use crate::result::ValidationError;

/// Checks the non-emptiness and single-terminator invariants for one
/// block. Used both standalone (by `Editor::commit`) and as part of
/// `validate_function`.
pub fn validate_block(function: &Function, block: Block) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let data = function.block(block);

    if data.id == 0 {
        errors.push(ValidationError::new("block has no id").at_block(data.id));
    }
    if data.instructions.is_empty() {
        errors.push(ValidationError::new("block is empty").at_block(data.id));
        return errors;
    }

    let last_position = data.instructions.len() - 1;
    for (position, instruction) in data.instructions.iter().enumerate() {
        if instruction.is_terminator() && position != last_position {
            errors.push(
                ValidationError::new("terminator found before end of block")
                    .at_block(data.id)
                    .at_instruction(instruction.id.0),
            );
        }
    }
    if !data.instructions[last_position].is_terminator() {
        errors.push(ValidationError::new("block has no terminator").at_block(data.id));
    }

    errors
}

/// Full structural validation: every block's invariants, entry/exit
/// exactness, predecessor/successor consistency, phi input coverage, and
/// operand type/size compatibility.
pub fn validate_function(function: &Function) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if function.layout().is_empty() {
        errors.push(ValidationError::new("function has no blocks"));
        return errors;
    }

    let entry = function.entry_block();
    if !matches!(function.block(entry).first_instruction().map(|i| &i.opcode), Some(Opcode::Entry)) {
        errors.push(ValidationError::new("entry block does not start with `entry`"));
    }

    let mut exit_count = 0;
    for &block in function.layout() {
        errors.extend(validate_block(function, block));
        if matches!(function.block(block).last_instruction().map(|i| &i.opcode), Some(Opcode::Exit)) {
            exit_count += 1;
        }
    }
    match exit_count {
        0 => errors.push(ValidationError::new("function has no exit block")),
        1 => {}
        _ => errors.push(ValidationError::new("function has more than one exit block")),
    }

    for &block in function.layout() {
        for predecessor in function.predecessors_of(block) {
            let successors = function.successors_of(predecessor);
            if !successors.contains(&block) {
                errors.push(
                    ValidationError::new("predecessor/successor edge is not reciprocal")
                        .at_block(function.block(block).id),
                );
            }
        }
        for instruction in &function.block(block).instructions {
            if let Opcode::Phi { inputs, .. } = &instruction.opcode {
                let predecessors = function.predecessors_of(block);
                if inputs.len() != predecessors.len() {
                    errors.push(
                        ValidationError::new(
                            "phi does not have exactly one input per predecessor",
                        )
                        .at_block(function.block(block).id)
                        .at_instruction(instruction.id.0),
                    );
                    continue;
                }
                for predecessor in &predecessors {
                    if !inputs.iter().any(|p| p.block == *predecessor) {
                        errors.push(
                            ValidationError::new("phi is missing an input for a predecessor")
                                .at_block(function.block(block).id)
                                .at_instruction(instruction.id.0),
                        );
                    }
                }
            }
            if let Some(mismatch) = binary_operand_mismatch(&instruction.opcode) {
                errors.push(
                    ValidationError::new(mismatch)
                        .at_block(function.block(block).id)
                        .at_instruction(instruction.id.0),
                );
            }
        }
    }

    errors
}

/// For plain two-input arithmetic opcodes, both inputs and the output
/// must agree on type and size (the target-lowering pass relies on this
/// to pick a single encoding per instruction). Comparisons are exempt:
/// their output is always an 8-bit conditional regardless of operand
/// width, and immediates on shift counts are not required to match the
/// shifted operand's size.
fn binary_operand_mismatch(opcode: &Opcode) -> Option<&'static str> {
    use Opcode::*;
    let (output, left, right) = match opcode {
        IntAdd { output, left, right }
        | IntSub { output, left, right }
        | IntMul { output, left, right }
        | IntDiv { output, left, right }
        | IntMod { output, left, right }
        | UIntDiv { output, left, right }
        | UIntMod { output, left, right }
        | IntBitAnd { output, left, right }
        | IntBitOr { output, left, right }
        | IntBitXor { output, left, right }
        | FloatAdd { output, left, right }
        | FloatSub { output, left, right }
        | FloatMul { output, left, right }
        | FloatDiv { output, left, right } => (output, left, right),
        _ => return None,
    };
    if output.ty != left.ty || left.ty != right.ty {
        return Some("arithmetic instruction mixes integer and float operands");
    }
    if !right.is_immediate() && (output.size != left.size || left.size != right.size) {
        return Some("arithmetic instruction operands have mismatched sizes");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::editor::Editor;
    use crate::value::Value;

    #[test]
    fn fresh_function_has_no_validation_errors() {
        let mut function = Function::new(Value::int_ptr_type(), Vec::new());
        let _editor = Editor::new(&mut function);
        assert!(validate_function(&function).is_empty());
    }
}
