//! Target-lowering pass: rewrites generic three-address LIR into the
//! two-address, fixed-register shapes x64 encodes directly.
//!
//! Runs once per function, block by block, after translation and before
//! the clean pass. Each rewritten instruction is replaced by a short
//! sequence; nothing here mutates an instruction in place, the whole
//! block's instruction list is rebuilt.

use crate::ir::function::{Block, Function};
use crate::ir::instructions::{Instruction, InstructionId, Opcode};
use crate::ir::literals::LiteralData;
use crate::isa::x64::registers::{DIVIDEND_HIGH, DIVIDEND_LOW, SHIFT_COUNT};
use crate::isa::x64::Target;
use crate::value::Value;

/// Runs the lowering pass over every block of `function`.
pub fn lower_function(function: &mut Function) {
    let blocks: Vec<Block> = function.layout().to_vec();
    for block in blocks {
        let instructions = std::mem::take(&mut function.block_mut(block).instructions);
        let mut out = Vec::with_capacity(instructions.len());
        for instr in instructions {
            lower_instruction(function, block, instr, &mut out);
        }
        function.block_mut(block).instructions = out;
    }
}

fn push(function: &mut Function, block: Block, out: &mut Vec<Instruction>, opcode: Opcode) -> InstructionId {
    let id = function.next_instruction_id();
    out.push(Instruction { id, block: Some(block), opcode });
    id
}

fn lower_instruction(function: &mut Function, block: Block, instr: Instruction, out: &mut Vec<Instruction>) {
    if let Some((template, output, left, right)) = binary_template_parts(&instr.opcode) {
        if matches!(template, BinaryTemplate::IntMul) && can_be_32bit_immediate(function, right) {
            push(function, block, out, Opcode::IntMul { output, left, right });
            return;
        }
        if matches!(template, BinaryTemplate::IntShl | BinaryTemplate::IntShr | BinaryTemplate::UIntShr) {
            rewrite_shift(function, block, out, template, output, left, right);
        } else {
            rewrite_to_two_operands(function, block, out, template, output, left, right);
        }
        return;
    }

    match instr.opcode {
        Opcode::IntDiv { output, left, right } => {
            rewrite_int_div(function, block, out, output, left, right, true)
        }
        Opcode::IntMod { output, left, right } => {
            rewrite_int_div(function, block, out, output, left, right, false)
        }
        Opcode::UIntDiv { output, left, right } => {
            rewrite_uint_div(function, block, out, output, left, right, true)
        }
        Opcode::UIntMod { output, left, right } => {
            rewrite_uint_div(function, block, out, output, left, right, false)
        }
        other => {
            push(function, block, out, other);
        }
    }
}

/// Which binary opcode an instruction is, so the rewrite helpers below can
/// reconstruct the same variant with new operands after classifying it.
#[derive(Copy, Clone, PartialEq, Eq)]
enum BinaryTemplate {
    IntAdd,
    IntSub,
    IntMul,
    IntBitAnd,
    IntBitOr,
    IntBitXor,
    IntShl,
    IntShr,
    UIntShr,
    FloatAdd,
    FloatSub,
    FloatMul,
    FloatDiv,
}

/// Classifies `opcode` as one of the plain binary arithmetic shapes this
/// pass rewrites, returning its template tag and copied-out operands.
/// `None` for anything else (divide/modulo, comparisons, loads, calls...),
/// which either get their own dedicated rewrite below or pass through
/// untouched.
fn binary_template_parts(opcode: &Opcode) -> Option<(BinaryTemplate, Value, Value, Value)> {
    use Opcode::*;
    Some(match opcode {
        IntAdd { output, left, right } => (BinaryTemplate::IntAdd, *output, *left, *right),
        IntSub { output, left, right } => (BinaryTemplate::IntSub, *output, *left, *right),
        IntMul { output, left, right } => (BinaryTemplate::IntMul, *output, *left, *right),
        IntBitAnd { output, left, right } => (BinaryTemplate::IntBitAnd, *output, *left, *right),
        IntBitOr { output, left, right } => (BinaryTemplate::IntBitOr, *output, *left, *right),
        IntBitXor { output, left, right } => (BinaryTemplate::IntBitXor, *output, *left, *right),
        IntShl { output, left, right } => (BinaryTemplate::IntShl, *output, *left, *right),
        IntShr { output, left, right } => (BinaryTemplate::IntShr, *output, *left, *right),
        UIntShr { output, left, right } => (BinaryTemplate::UIntShr, *output, *left, *right),
        FloatAdd { output, left, right } => (BinaryTemplate::FloatAdd, *output, *left, *right),
        FloatSub { output, left, right } => (BinaryTemplate::FloatSub, *output, *left, *right),
        FloatMul { output, left, right } => (BinaryTemplate::FloatMul, *output, *left, *right),
        FloatDiv { output, left, right } => (BinaryTemplate::FloatDiv, *output, *left, *right),
        _ => return None,
    })
}

fn build(template: BinaryTemplate, output: Value, left: Value, right: Value) -> Opcode {
    match template {
        BinaryTemplate::IntAdd => Opcode::IntAdd { output, left, right },
        BinaryTemplate::IntSub => Opcode::IntSub { output, left, right },
        BinaryTemplate::IntMul => Opcode::IntMul { output, left, right },
        BinaryTemplate::IntBitAnd => Opcode::IntBitAnd { output, left, right },
        BinaryTemplate::IntBitOr => Opcode::IntBitOr { output, left, right },
        BinaryTemplate::IntBitXor => Opcode::IntBitXor { output, left, right },
        BinaryTemplate::IntShl => Opcode::IntShl { output, left, right },
        BinaryTemplate::IntShr => Opcode::IntShr { output, left, right },
        BinaryTemplate::UIntShr => Opcode::UIntShr { output, left, right },
        BinaryTemplate::FloatAdd => Opcode::FloatAdd { output, left, right },
        BinaryTemplate::FloatSub => Opcode::FloatSub { output, left, right },
        BinaryTemplate::FloatMul => Opcode::FloatMul { output, left, right },
        BinaryTemplate::FloatDiv => Opcode::FloatDiv { output, left, right },
    }
}

/// `out = left OP right` becomes: materialize `left` into a register if it
/// isn't already virtual, copy it into a fresh temp, compute the op
/// two-address into another fresh register, then copy that back to `out`.
/// Returns the position of the rewritten binary instruction in `out`, so
/// shift lowering can pin its count operand afterwards.
fn rewrite_to_two_operands(
    function: &mut Function,
    block: Block,
    out: &mut Vec<Instruction>,
    template: BinaryTemplate,
    output: Value,
    left: Value,
    right: Value,
) -> usize {
    let left = if !left.is_virtual() {
        let materialized = function.next_virtual_register(left);
        push(function, block, out, Opcode::Assign { output: materialized, input: left });
        materialized
    } else {
        left
    };

    let temp = function.next_virtual_register(left);
    push(function, block, out, Opcode::Copy { output: temp, input: left });

    let new_output = function.next_virtual_register(output);
    let binary_position = out.len();
    push(function, block, out, build(template, new_output, temp, right));

    push(function, block, out, Opcode::Copy { output, input: new_output });
    binary_position
}

/// Shifts are two-address like the other binary ops, but x64 additionally
/// requires the shift count to sit in CL when it isn't an immediate.
fn rewrite_shift(
    function: &mut Function,
    block: Block,
    out: &mut Vec<Instruction>,
    template: BinaryTemplate,
    output: Value,
    left: Value,
    right: Value,
) {
    let binary_position = rewrite_to_two_operands(function, block, out, template, output, left, right);
    if !right.is_register() {
        return;
    }
    let count_register = Target::register_of(SHIFT_COUNT, right.size);
    push(function, block, out, Opcode::Copy { output: count_register, input: right });
    set_binary_right(&mut out[binary_position].opcode, count_register);
}

fn set_binary_right(opcode: &mut Opcode, value: Value) {
    match opcode {
        Opcode::IntAdd { right, .. }
        | Opcode::IntSub { right, .. }
        | Opcode::IntMul { right, .. }
        | Opcode::IntBitAnd { right, .. }
        | Opcode::IntBitOr { right, .. }
        | Opcode::IntBitXor { right, .. }
        | Opcode::IntShl { right, .. }
        | Opcode::IntShr { right, .. }
        | Opcode::UIntShr { right, .. }
        | Opcode::FloatAdd { right, .. }
        | Opcode::FloatSub { right, .. }
        | Opcode::FloatMul { right, .. }
        | Opcode::FloatDiv { right, .. } => *right = value,
        _ => unreachable!("set_binary_right called on a non-binary opcode"),
    }
}

/// `o = idiv a, b` / `o = imod a, b` both lower to the same sequence;
/// `want_quotient` selects which x64 output feeds the final copy.
fn rewrite_int_div(
    function: &mut Function,
    block: Block,
    out: &mut Vec<Instruction>,
    output: Value,
    left: Value,
    right: Value,
    want_quotient: bool,
) {
    let rax = Target::register_of(DIVIDEND_LOW, output.size);
    let rdx = Target::register_of(DIVIDEND_HIGH, output.size);
    push(function, block, out, Opcode::Copy { output: rax, input: left });
    push(function, block, out, Opcode::IntSignX64 { output: rdx, input: rax });
    push(
        function,
        block,
        out,
        Opcode::IntDivX64 { div_output: rax, mod_output: rdx, high_left: rdx, low_left: rax, right },
    );
    let result = if want_quotient { rax } else { rdx };
    push(function, block, out, Opcode::Copy { output, input: result });
}

/// Same shape as `rewrite_int_div`, but the high half is zeroed with an
/// `xor` instead of sign-extended, since unsigned division never needs
/// the sign bit smeared across the high register.
fn rewrite_uint_div(
    function: &mut Function,
    block: Block,
    out: &mut Vec<Instruction>,
    output: Value,
    left: Value,
    right: Value,
    want_quotient: bool,
) {
    let rax = Target::register_of(DIVIDEND_LOW, output.size);
    let rdx = Target::register_of(DIVIDEND_HIGH, output.size);
    push(function, block, out, Opcode::Copy { output: rax, input: left });
    push(function, block, out, Opcode::IntBitXor { output: rdx, left: rdx, right: rdx });
    push(
        function,
        block,
        out,
        Opcode::UIntDivX64 { div_output: rax, mod_output: rdx, high_left: rdx, low_left: rax, right },
    );
    let result = if want_quotient { rax } else { rdx };
    push(function, block, out, Opcode::Copy { output, input: result });
}

/// True if `value` fits in a sign-extended 32-bit immediate, the largest
/// immediate x64's `imul r, r/m, imm32` form accepts — letting
/// multiplication stay three-address instead of being rewritten.
fn can_be_32bit_immediate(function: &Function, value: Value) -> bool {
    if value.is_immediate() {
        return true;
    }
    if !value.is_literal() {
        return false;
    }
    match function.literals.resolve(value) {
        Some(LiteralData::Int32(_)) => true,
        Some(LiteralData::Int64(data)) => *data >= 0 && *data <= u32::max_value() as i64,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::editor::Editor;
    use crate::isa::x64::registers::GeneralRegister;
    use crate::value::ValueSize;

    fn seeded_function() -> Function {
        let mut function = Function::new(Value::int_ptr_type(), Vec::new());
        Editor::new(&mut function);
        function
    }

    #[test]
    fn three_address_add_becomes_two_address_with_copies() {
        let mut function = seeded_function();
        let entry = function.entry_block();
        let left = Value::register(Value::int32_type(), 1);
        let right = Value::register(Value::int32_type(), 2);
        let out_val = Value::register(Value::int32_type(), 3);
        function
            .block_mut(entry)
            .instructions
            .insert(1, Instruction::new(Opcode::IntAdd { output: out_val, left, right }));

        lower_function(&mut function);

        let ops: Vec<&Opcode> = function.block(entry).instructions.iter().map(|i| &i.opcode).collect();
        assert!(ops.iter().filter(|o| matches!(o, Opcode::Copy { .. })).count() >= 2);
        assert!(ops.iter().any(|o| matches!(o, Opcode::IntAdd { .. })));
    }

    #[test]
    fn small_immediate_multiply_stays_three_address() {
        let mut function = seeded_function();
        let entry = function.entry_block();
        let left = Value::register(Value::int32_type(), 1);
        let out_val = Value::register(Value::int32_type(), 2);
        function.block_mut(entry).instructions.insert(
            1,
            Instruction::new(Opcode::IntMul { output: out_val, left, right: Value::int32(7) }),
        );

        lower_function(&mut function);

        let has_unrewritten_mul = function
            .block(entry)
            .instructions
            .iter()
            .any(|i| matches!(&i.opcode, Opcode::IntMul { right, .. } if right.is_immediate()));
        assert!(has_unrewritten_mul);
    }

    #[test]
    fn signed_division_pins_rax_and_rdx() {
        let mut function = seeded_function();
        let entry = function.entry_block();
        let left = Value::register(Value::int32_type(), 1);
        let right = Value::register(Value::int32_type(), 2);
        let out_val = Value::register(Value::int32_type(), 3);
        function
            .block_mut(entry)
            .instructions
            .insert(1, Instruction::new(Opcode::IntDiv { output: out_val, left, right }));

        lower_function(&mut function);

        let rax = Target::register_of(GeneralRegister::Rax, ValueSize::Size32);
        let rdx = Target::register_of(GeneralRegister::Rdx, ValueSize::Size32);
        let instructions = &function.block(entry).instructions;
        assert!(instructions.iter().any(|i| matches!(&i.opcode, Opcode::Copy { output, .. } if *output == rax)));
        assert!(instructions
            .iter()
            .any(|i| matches!(&i.opcode, Opcode::IntSignX64 { output, .. } if *output == rdx)));
        assert!(instructions.iter().any(|i| matches!(&i.opcode, Opcode::IntDivX64 { .. })));
    }

    #[test]
    fn shift_by_register_pins_count_to_cl() {
        let mut function = seeded_function();
        let entry = function.entry_block();
        let left = Value::register(Value::int32_type(), 1);
        let right = Value::register(Value::int32_type(), 2);
        let out_val = Value::register(Value::int32_type(), 3);
        function
            .block_mut(entry)
            .instructions
            .insert(1, Instruction::new(Opcode::IntShl { output: out_val, left, right }));

        lower_function(&mut function);

        let rcx = Target::register_of(GeneralRegister::Rcx, ValueSize::Size32);
        let instructions = &function.block(entry).instructions;
        assert!(instructions.iter().any(|i| matches!(&i.opcode, Opcode::Copy { output, .. } if *output == rcx)));
        assert!(instructions
            .iter()
            .any(|i| matches!(&i.opcode, Opcode::IntShl { right, .. } if *right == rcx)));
    }
}
