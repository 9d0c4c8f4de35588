//! The x64 instruction encoder: turns one lowered, regalloc'd LIR block at
//! a time into bytes on a `CodeBuffer`.
//!
//! Covers an empty function (emits `C3`), simple accumulator forms
//! (`AX += 0x0937` emits `66 05 37 09`), and the rest of the instruction
//! shapes `isa::x64::lower` actually produces. It does not implement
//! register allocation, so every operand reaching this module must
//! already be a physical register, a stack slot, or an immediate — a
//! `Kind::VirtualRegister` operand reaching this module is an invariant
//! violation, not a construct to lower further; see `DESIGN.md` for the
//! full resolution.
//!
//! Two-address opcodes (`IntAdd`, `IntSub`, ...) require `output` and
//! `left` to already name the same physical location, matching the
//! pre-copy/post-copy shape `lower::rewrite_to_two_operands` builds around
//! them — encoding one directly asserts that rather than re-deriving it.

use smallvec::SmallVec;

use crate::ir::function::{Block, Function};
use crate::ir::instructions::{FloatCondition, Instruction, IntCondition, Opcode};
use crate::ir::literals::LiteralData;
use crate::isa::x64::registers::GeneralRegister;
use crate::result::{CodegenError, CodegenResult};
use crate::value::{Kind, Value, ValueSize};

use super::{CodeBuffer, Jump};

// Mirrors the slot numbers `isa::x64::registers::GeneralRegister` assigns
// (the x64 ModRM/REX register-number encoding); `GeneralRegister::slot` is
// not a const fn, so these are spelled out directly.
const RBP: u8 = 5;
const RSP: u8 = 4;
const RAX: u8 = 0;
const RCX: u8 = 1;
const RDX: u8 = 2;

/// Encodes every block of `function` in layout order onto a fresh
/// `CodeBuffer`.
pub fn encode_function(function: &Function) -> CodegenResult<CodeBuffer> {
    let mut code_buffer = CodeBuffer::new(function.layout());
    for &block in function.layout() {
        code_buffer.start_basic_block(block);
        let instructions = &function.block(block).instructions;
        for (position, instr) in instructions.iter().enumerate() {
            encode_instruction(&mut code_buffer, function, block, instructions, position, instr)?;
        }
        code_buffer.end_basic_block();
    }
    Ok(code_buffer)
}

fn encode_instruction(
    cb: &mut CodeBuffer,
    function: &Function,
    block: Block,
    instructions: &[Instruction],
    position: usize,
    instr: &Instruction,
) -> CodegenResult<()> {
    match &instr.opcode {
        Opcode::Entry | Opcode::Exit | Opcode::Use { .. } => Ok(()),
        Opcode::Ret => {
            cb.emit8(0xC3);
            Ok(())
        }
        Opcode::Jump { target } => {
            cb.emit_jump(Jump::long_jmp(), Jump::short_jmp(), *target);
            Ok(())
        }
        Opcode::Branch { condition, true_block, false_block } => {
            encode_branch(cb, instructions, position, *condition, *true_block, *false_block)
        }
        Opcode::Copy { output, input } | Opcode::Assign { output, input } => {
            encode_mov(cb, function, *output, *input)
        }
        Opcode::Literal { output, input } => encode_mov(cb, function, *output, *input),
        Opcode::SignExtend { output, input } => encode_extend(cb, *output, *input, true),
        Opcode::ZeroExtend { output, input } => encode_extend(cb, *output, *input, false),
        Opcode::Store { base, index, offset, value } => encode_store(cb, *base, *index, *offset, *value),
        Opcode::Load { output, base, index, offset } => encode_load(cb, *output, *base, *index, *offset),
        Opcode::IntAdd { output, left, right } => encode_binary(cb, BinOp::Add, *output, *left, *right),
        Opcode::IntSub { output, left, right } => encode_binary(cb, BinOp::Sub, *output, *left, *right),
        Opcode::IntBitAnd { output, left, right } => encode_binary(cb, BinOp::And, *output, *left, *right),
        Opcode::IntBitOr { output, left, right } => encode_binary(cb, BinOp::Or, *output, *left, *right),
        Opcode::IntBitXor { output, left, right } => encode_binary(cb, BinOp::Xor, *output, *left, *right),
        Opcode::IntMul { output, left, right } => encode_mul(cb, *output, *left, *right),
        Opcode::IntShl { output, left, right } => encode_shift(cb, 4, *output, *left, *right),
        Opcode::IntShr { output, left, right } => encode_shift(cb, 7, *output, *left, *right),
        Opcode::UIntShr { output, left, right } => encode_shift(cb, 5, *output, *left, *right),
        Opcode::Cmp { left, right, .. } => encode_binary(cb, BinOp::Cmp, *left, *left, *right),
        Opcode::FloatCmp { left, right, .. } => encode_float_compare(cb, *left, *right),
        Opcode::FloatAdd { output, left, right } => encode_float_binary(cb, 0x58, *output, *left, *right),
        Opcode::FloatSub { output, left, right } => encode_float_binary(cb, 0x5C, *output, *left, *right),
        Opcode::FloatMul { output, left, right } => encode_float_binary(cb, 0x59, *output, *left, *right),
        Opcode::FloatDiv { output, left, right } => encode_float_binary(cb, 0x5E, *output, *left, *right),
        Opcode::IntSignX64 { output, input } => encode_cdq_cqo(cb, *output, *input),
        Opcode::IntDivX64 { high_left, low_left, right, .. } => {
            encode_divide(cb, 7, *high_left, *low_left, *right)
        }
        Opcode::UIntDivX64 { high_left, low_left, right, .. } => {
            encode_divide(cb, 6, *high_left, *low_left, *right)
        }
        Opcode::UIntMulX64 { left, right, .. } => encode_widening_multiply(cb, *left, *right),
        Opcode::Call { outputs, callee } => encode_call(cb, function, outputs.clone(), *callee),
        Opcode::PCopy { outputs, inputs } => encode_pcopy(cb, function, outputs, inputs),
        Opcode::Phi { .. } => {
            // Phi destruction is parallel-copy expansion under a different
            // name; out of scope here the same way PCopy cycle-breaking is
            // (see the design note on parallel copy expansion).
            Err(CodegenError::UnsupportedLowering { mnemonic: "phi" })
        }
        unhandled => Err(CodegenError::UnsupportedLowering { mnemonic: unhandled.mnemonic() }),
    }
}

// ---------------------------------------------------------------------
// Operand classification
// ---------------------------------------------------------------------

#[derive(Copy, Clone)]
enum Operand {
    Register(u8),
    Memory { base: u8, index: Option<u8>, disp: i32 },
}

fn require_physical(value: Value) -> CodegenResult<u8> {
    if value.kind == Kind::PhysicalRegister {
        Ok(value.data as u8)
    } else if value.kind == Kind::VirtualRegister {
        Err(CodegenError::InvariantViolated {
            message: format!(
                "virtual register {} reached the encoder unallocated; register allocation is out of scope for this crate's binemit (see DESIGN.md)",
                value
            ),
        })
    } else {
        Err(CodegenError::InvariantViolated { message: format!("expected a register operand, found {}", value) })
    }
}

fn classify(value: Value) -> CodegenResult<Operand> {
    match value.kind {
        Kind::PhysicalRegister => Ok(Operand::Register(value.data as u8)),
        Kind::FrameSlot | Kind::SpillSlot => {
            Ok(Operand::Memory { base: RBP, index: None, disp: -(value.data + value.size.byte_size()) })
        }
        Kind::Parameter => Ok(Operand::Memory { base: RBP, index: None, disp: value.data }),
        Kind::StackSlot | Kind::Argument => Ok(Operand::Memory { base: RSP, index: None, disp: value.data }),
        Kind::VirtualRegister => Err(CodegenError::InvariantViolated {
            message: format!(
                "virtual register {} reached the encoder unallocated; register allocation is out of scope for this crate's binemit (see DESIGN.md)",
                value
            ),
        }),
        _ => Err(CodegenError::InvariantViolated { message: format!("{} is not an encodable r/m operand", value) }),
    }
}

fn is_extended(slot: u8) -> bool {
    slot >= 8
}

fn rex_prefix(w: bool, reg: u8, rm_or_base: u8, index: Option<u8>) -> Option<u8> {
    let r = is_extended(reg) as u8;
    let b = is_extended(rm_or_base) as u8;
    let x = index.map_or(0, |i| is_extended(i) as u8);
    if !w && r == 0 && b == 0 && x == 0 {
        None
    } else {
        Some(0x40 | (w as u8) << 3 | r << 2 | x << 1 | b)
    }
}

/// Emits the size-override/REX prefixes for a `reg`/`rm` instruction, the
/// opcode bytes, and the ModRM(+SIB+disp) for `rm`, leaving any trailing
/// immediate to the caller.
fn emit_opcode_and_modrm(cb: &mut CodeBuffer, opcode: &[u8], reg_field: u8, rm: Operand, size: ValueSize) {
    if size == ValueSize::Size16 {
        cb.emit8(0x66);
    }
    let w = size == ValueSize::Size64;
    match rm {
        Operand::Register(rm_slot) => {
            if let Some(rex) = rex_prefix(w, reg_field, rm_slot, None) {
                cb.emit8(rex);
            }
            for &byte in opcode {
                cb.emit8(byte);
            }
            cb.emit8(0xC0 | (reg_field & 7) << 3 | (rm_slot & 7));
        }
        Operand::Memory { base, index, disp } => {
            if let Some(rex) = rex_prefix(w, reg_field, base, index) {
                cb.emit8(rex);
            }
            for &byte in opcode {
                cb.emit8(byte);
            }
            let needs_sib = index.is_some() || (base & 7) == 4;
            if needs_sib {
                cb.emit8(0x80 | (reg_field & 7) << 3 | 0b100);
                let (scale, index_bits) = index.map_or((0u8, 0b100u8), |i| (0, i & 7));
                cb.emit8((scale << 6) | (index_bits << 3) | (base & 7));
            } else {
                cb.emit8(0x80 | (reg_field & 7) << 3 | (base & 7));
            }
            cb.emit32(disp as u32);
        }
    }
}

// ---------------------------------------------------------------------
// mov / movzx / movsx
// ---------------------------------------------------------------------

fn encode_mov(cb: &mut CodeBuffer, function: &Function, dst: Value, src: Value) -> CodegenResult<()> {
    if src.is_literal() {
        return encode_mov_literal(cb, function, dst, src);
    }

    let dst_loc = classify(dst)?;
    if src.is_immediate() {
        return encode_mov_immediate(cb, dst_loc, dst.size, src.data as i64);
    }

    let src_loc = classify(src)?;
    match (dst_loc, src_loc) {
        (Operand::Register(_), Operand::Register(_)) | (Operand::Memory { .. }, Operand::Register(_)) => {
            if dst.is_float() {
                let opcode: &[u8] = if dst.size == ValueSize::Size64 { &[0xF2, 0x0F, 0x11] } else { &[0xF3, 0x0F, 0x11] };
                let reg = require_physical(src)?;
                emit_opcode_and_modrm(cb, opcode, reg, dst_loc, ValueSize::Size32);
            } else {
                let reg = require_physical(src)?;
                emit_opcode_and_modrm(cb, &[0x89], reg, dst_loc, dst.size);
            }
            Ok(())
        }
        (Operand::Register(_), Operand::Memory { .. }) => {
            if dst.is_float() {
                let opcode: &[u8] = if dst.size == ValueSize::Size64 { &[0xF2, 0x0F, 0x10] } else { &[0xF3, 0x0F, 0x10] };
                let reg = require_physical(dst)?;
                emit_opcode_and_modrm(cb, opcode, reg, src_loc, ValueSize::Size32);
            } else {
                let reg = require_physical(dst)?;
                emit_opcode_and_modrm(cb, &[0x8B], reg, src_loc, dst.size);
            }
            Ok(())
        }
        (Operand::Memory { .. }, Operand::Memory { .. }) => {
            Err(CodegenError::UnsupportedLowering { mnemonic: "memory-to-memory mov" })
        }
    }
}

fn encode_mov_immediate(cb: &mut CodeBuffer, dst: Operand, size: ValueSize, value: i64) -> CodegenResult<()> {
    match dst {
        Operand::Register(slot) => {
            match size {
                ValueSize::Size8 => {
                    if is_extended(slot) {
                        cb.emit8(rex_prefix(false, 0, slot, None).unwrap());
                    }
                    cb.emit8(0xB0 + (slot & 7));
                    cb.emit8(value as u8);
                }
                ValueSize::Size16 => {
                    cb.emit8(0x66);
                    if let Some(rex) = rex_prefix(false, 0, slot, None) {
                        cb.emit8(rex);
                    }
                    cb.emit8(0xB8 + (slot & 7));
                    cb.emit16(value as u16);
                }
                ValueSize::Size32 => {
                    if let Some(rex) = rex_prefix(false, 0, slot, None) {
                        cb.emit8(rex);
                    }
                    cb.emit8(0xB8 + (slot & 7));
                    cb.emit32(value as u32);
                }
                ValueSize::Size64 => {
                    cb.emit8(rex_prefix(true, 0, slot, None).unwrap());
                    cb.emit8(0xC7);
                    cb.emit8(0xC0 | (slot & 7));
                    cb.emit32(value as u32);
                }
            }
            Ok(())
        }
        Operand::Memory { .. } => {
            emit_opcode_and_modrm(cb, &[0xC7], 0, dst, size);
            match size {
                ValueSize::Size8 => cb.emit8(value as u8),
                ValueSize::Size16 => cb.emit16(value as u16),
                _ => cb.emit32(value as u32),
            }
            Ok(())
        }
    }
}

fn encode_mov_literal(cb: &mut CodeBuffer, function: &Function, dst: Value, src: Value) -> CodegenResult<()> {
    let dst_loc = classify(dst)?;
    match function.literals.resolve(src) {
        Some(LiteralData::BasicBlock(_)) | Some(LiteralData::Function(_)) => {
            Err(CodegenError::UnsupportedLowering { mnemonic: "materializing a block/function literal directly" })
        }
        _ => {
            let slot = match dst_loc {
                Operand::Register(slot) => slot,
                Operand::Memory { .. } => {
                    return Err(CodegenError::UnsupportedLowering { mnemonic: "literal materialized directly into memory" })
                }
            };
            match dst.size {
                ValueSize::Size64 => {
                    cb.emit8(rex_prefix(true, 0, slot, None).unwrap());
                    cb.emit8(0xB8 + (slot & 7));
                    cb.associate_value(src);
                    cb.emit64(0);
                }
                ValueSize::Size32 => {
                    if let Some(rex) = rex_prefix(false, 0, slot, None) {
                        cb.emit8(rex);
                    }
                    cb.emit8(0xB8 + (slot & 7));
                    cb.associate_value(src);
                    cb.emit32(0);
                }
                ValueSize::Size16 => {
                    cb.emit8(0x66);
                    cb.emit8(0xB8 + (slot & 7));
                    cb.associate_value(src);
                    cb.emit16(0);
                }
                ValueSize::Size8 => {
                    cb.emit8(0xB0 + (slot & 7));
                    cb.associate_value(src);
                    cb.emit8(0);
                }
            }
            Ok(())
        }
    }
}

fn encode_extend(cb: &mut CodeBuffer, dst: Value, src: Value, signed: bool) -> CodegenResult<()> {
    let dst_slot = require_physical(dst)?;
    let src_loc = classify(src)?;

    match (src.size, dst.size) {
        (ValueSize::Size32, ValueSize::Size64) if signed => {
            emit_opcode_and_modrm(cb, &[0x63], dst_slot, src_loc, ValueSize::Size64);
            Ok(())
        }
        (ValueSize::Size32, ValueSize::Size64) => {
            // Writing a 32-bit destination register implicitly zeroes the
            // upper half; a plain 32-bit `mov r32, r/m32` is the correct
            // zero-extend, no dedicated opcode needed.
            emit_opcode_and_modrm(cb, &[0x8B], dst_slot, src_loc, ValueSize::Size32);
            Ok(())
        }
        (ValueSize::Size8, _) => {
            let opcode: &[u8] = if signed { &[0x0F, 0xBE] } else { &[0x0F, 0xB6] };
            emit_opcode_and_modrm(cb, opcode, dst_slot, src_loc, dst.size);
            Ok(())
        }
        (ValueSize::Size16, _) => {
            let opcode: &[u8] = if signed { &[0x0F, 0xBF] } else { &[0x0F, 0xB7] };
            emit_opcode_and_modrm(cb, opcode, dst_slot, src_loc, dst.size);
            Ok(())
        }
        _ => Err(CodegenError::UnsupportedLowering { mnemonic: "extend between these widths" }),
    }
}

// ---------------------------------------------------------------------
// Load / Store
// ---------------------------------------------------------------------

fn addressing_operand(base: Value, index: Value, offset: Value) -> CodegenResult<Operand> {
    let base_slot = require_physical(base)?;
    let disp = if offset.is_immediate() { offset.data } else {
        return Err(CodegenError::UnsupportedLowering { mnemonic: "non-immediate load/store offset" });
    };
    let index_slot = if index.is_immediate() && index.data == 0 {
        None
    } else {
        Some(require_physical(index)?)
    };
    Ok(Operand::Memory { base: base_slot, index: index_slot, disp })
}

fn encode_load(cb: &mut CodeBuffer, output: Value, base: Value, index: Value, offset: Value) -> CodegenResult<()> {
    let mem = addressing_operand(base, index, offset)?;
    let reg = require_physical(output)?;
    if output.is_float() {
        let opcode: &[u8] = if output.size == ValueSize::Size64 { &[0xF2, 0x0F, 0x10] } else { &[0xF3, 0x0F, 0x10] };
        emit_opcode_and_modrm(cb, opcode, reg, mem, ValueSize::Size32);
    } else {
        emit_opcode_and_modrm(cb, &[0x8B], reg, mem, output.size);
    }
    Ok(())
}

fn encode_store(cb: &mut CodeBuffer, base: Value, index: Value, offset: Value, value: Value) -> CodegenResult<()> {
    let mem = addressing_operand(base, index, offset)?;
    if value.is_immediate() {
        emit_opcode_and_modrm(cb, &[0xC7], 0, mem, value.size);
        match value.size {
            ValueSize::Size8 => cb.emit8(value.data as u8),
            ValueSize::Size16 => cb.emit16(value.data as u16),
            _ => cb.emit32(value.data as u32),
        }
        return Ok(());
    }
    let reg = require_physical(value)?;
    if value.is_float() {
        let opcode: &[u8] = if value.size == ValueSize::Size64 { &[0xF2, 0x0F, 0x11] } else { &[0xF3, 0x0F, 0x11] };
        emit_opcode_and_modrm(cb, opcode, reg, mem, ValueSize::Size32);
    } else {
        emit_opcode_and_modrm(cb, &[0x89], reg, mem, value.size);
    }
    Ok(())
}

// ---------------------------------------------------------------------
// Integer binary ops
// ---------------------------------------------------------------------

#[derive(Copy, Clone, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    And,
    Or,
    Xor,
    Cmp,
}

impl BinOp {
    fn digit(self) -> u8 {
        match self {
            BinOp::Add => 0,
            BinOp::Or => 1,
            BinOp::And => 4,
            BinOp::Sub => 5,
            BinOp::Xor => 6,
            BinOp::Cmp => 7,
        }
    }
    /// `OP r/m, r` (dst = r/m).
    fn rm_r_opcode(self) -> u8 {
        match self {
            BinOp::Add => 0x01,
            BinOp::Or => 0x09,
            BinOp::And => 0x21,
            BinOp::Sub => 0x29,
            BinOp::Xor => 0x31,
            BinOp::Cmp => 0x39,
        }
    }
    /// `OP AL/eAX, imm` accumulator-specific short form.
    fn accumulator_opcode(self, size8: bool) -> u8 {
        let base = match self {
            BinOp::Add => 0x04,
            BinOp::Or => 0x0C,
            BinOp::And => 0x24,
            BinOp::Sub => 0x2C,
            BinOp::Xor => 0x34,
            BinOp::Cmp => 0x3C,
        };
        if size8 { base } else { base + 1 }
    }
}

/// `output = left OP right`; requires `output == left` (the two-address
/// shape `lower::rewrite_to_two_operands` produces).
fn encode_binary(cb: &mut CodeBuffer, op: BinOp, output: Value, left: Value, right: Value) -> CodegenResult<()> {
    if output.kind != left.kind || output.data != left.data || output.size != left.size {
        return Err(CodegenError::InvariantViolated {
            message: format!("output {} and left {} must be the same location (two-address)", output, left),
        });
    }
    let dst = classify(output)?;

    if right.is_immediate() {
        if let Operand::Register(slot) = dst {
            if slot == RAX {
                // Accumulator short form has no ModRM byte, just the
                // size-override/REX prefix ahead of the opcode.
                if output.size == ValueSize::Size16 {
                    cb.emit8(0x66);
                } else if output.size == ValueSize::Size64 {
                    cb.emit8(0x48);
                }
                cb.emit8(op.accumulator_opcode(output.size == ValueSize::Size8));
                emit_immediate_for_size(cb, output.size, right.data as i64);
                return Ok(());
            }
        }
        emit_opcode_and_modrm(cb, &[0x81], op.digit(), dst, output.size);
        emit_immediate_for_size(cb, output.size, right.data as i64);
        return Ok(());
    }

    let reg = require_physical(right)?;
    emit_opcode_and_modrm(cb, &[op.rm_r_opcode()], reg, dst, output.size);
    Ok(())
}

fn emit_immediate_for_size(cb: &mut CodeBuffer, size: ValueSize, value: i64) {
    match size {
        ValueSize::Size8 => cb.emit8(value as u8),
        ValueSize::Size16 => cb.emit16(value as u16),
        _ => cb.emit32(value as u32),
    }
}

fn encode_mul(cb: &mut CodeBuffer, output: Value, left: Value, right: Value) -> CodegenResult<()> {
    let same_location = output.kind == left.kind && output.data == left.data && output.size == left.size;
    if same_location {
        let dst = classify(output)?;
        if right.is_immediate() {
            return Err(CodegenError::UnsupportedLowering { mnemonic: "two-address imul with an immediate right operand" });
        }
        let reg = require_physical(output)?;
        emit_opcode_and_modrm(cb, &[0x0F, 0xAF], reg, classify(right)?, output.size);
        let _ = dst;
        return Ok(());
    }

    if !right.is_immediate() {
        return Err(CodegenError::UnsupportedLowering { mnemonic: "three-address imul with a non-immediate right operand" });
    }
    let output_slot = require_physical(output)?;
    let left_loc = classify(left)?;
    if right.data >= i8::min_value() as i32 && right.data <= i8::max_value() as i32 {
        emit_opcode_and_modrm(cb, &[0x6B], output_slot, left_loc, output.size);
        cb.emit8(right.data as u8);
    } else {
        emit_opcode_and_modrm(cb, &[0x69], output_slot, left_loc, output.size);
        cb.emit32(right.data as u32);
    }
    Ok(())
}

fn encode_shift(cb: &mut CodeBuffer, digit: u8, output: Value, left: Value, right: Value) -> CodegenResult<()> {
    if output.kind != left.kind || output.data != left.data || output.size != left.size {
        return Err(CodegenError::InvariantViolated {
            message: format!("shift output {} and left {} must be the same location", output, left),
        });
    }
    let dst = classify(output)?;

    if right.is_immediate() {
        if right.data == 1 {
            emit_opcode_and_modrm(cb, &[0xD1], digit, dst, output.size);
        } else {
            emit_opcode_and_modrm(cb, &[0xC1], digit, dst, output.size);
            cb.emit8(right.data as u8);
        }
        return Ok(());
    }

    let slot = require_physical(right)?;
    if slot != RCX {
        return Err(CodegenError::InvariantViolated { message: "a register shift count must be pinned to CL".to_owned() });
    }
    emit_opcode_and_modrm(cb, &[0xD3], digit, dst, output.size);
    Ok(())
}

// ---------------------------------------------------------------------
// Comparisons (integer and float)
// ---------------------------------------------------------------------

pub(crate) fn condition_code(condition: IntCondition) -> u8 {
    match condition {
        IntCondition::Equal => 0x4,
        IntCondition::NotEqual => 0x5,
        IntCondition::SignedLessThan => 0xC,
        IntCondition::SignedLessThanOrEqual => 0xE,
        IntCondition::SignedGreaterThan => 0xF,
        IntCondition::SignedGreaterThanOrEqual => 0xD,
        IntCondition::UnsignedLessThan => 0x2,
        IntCondition::UnsignedLessThanOrEqual => 0x6,
        IntCondition::UnsignedGreaterThan => 0x7,
        IntCondition::UnsignedGreaterThanOrEqual => 0x3,
    }
}

/// `ucomiss`/`ucomisd` set flags the same way an unsigned integer compare
/// does, so the same Jcc condition codes apply; NaN (parity-flag) safety
/// is not modeled here — see DESIGN.md.
pub(crate) fn float_condition_code(condition: FloatCondition) -> u8 {
    match condition {
        FloatCondition::OrderedEqual | FloatCondition::UnorderedEqual => 0x4,
        FloatCondition::OrderedNotEqual | FloatCondition::UnorderedNotEqual => 0x5,
        FloatCondition::OrderedLessThan => 0x2,
        FloatCondition::OrderedLessThanOrEqual => 0x6,
        FloatCondition::OrderedGreaterThan => 0x7,
        FloatCondition::OrderedGreaterThanOrEqual => 0x3,
    }
}

fn encode_float_compare(cb: &mut CodeBuffer, left: Value, right: Value) -> CodegenResult<()> {
    let reg = require_physical(left)?;
    let rm = classify(right)?;
    if left.size == ValueSize::Size64 {
        cb.emit8(0x66);
    }
    emit_opcode_and_modrm(cb, &[0x0F, 0x2E], reg, rm, ValueSize::Size32);
    Ok(())
}

fn encode_float_binary(cb: &mut CodeBuffer, opcode_byte: u8, output: Value, left: Value, right: Value) -> CodegenResult<()> {
    if output.kind != left.kind || output.data != left.data {
        return Err(CodegenError::InvariantViolated {
            message: format!("float op output {} and left {} must be the same register", output, left),
        });
    }
    let reg = require_physical(output)?;
    let rm = classify(right)?;
    let prefix: u8 = if output.size == ValueSize::Size64 { 0xF2 } else { 0xF3 };
    cb.emit8(prefix);
    emit_opcode_and_modrm(cb, &[0x0F, opcode_byte], reg, rm, ValueSize::Size32);
    Ok(())
}

// ---------------------------------------------------------------------
// Branch (fuses with the preceding Cmp/FloatCmp)
// ---------------------------------------------------------------------

fn encode_branch(
    cb: &mut CodeBuffer,
    instructions: &[Instruction],
    position: usize,
    condition: Value,
    true_block: Block,
    false_block: Block,
) -> CodegenResult<()> {
    let cc = instructions[..position]
        .iter()
        .rev()
        .find_map(|i| match &i.opcode {
            Opcode::Cmp { output, condition: ic, .. } if *output == condition => Some(condition_code(*ic)),
            Opcode::FloatCmp { output, condition: fc, .. } if *output == condition => Some(float_condition_code(*fc)),
            _ => None,
        })
        .ok_or(CodegenError::UnsupportedLowering { mnemonic: "branch with no preceding compare" })?;

    cb.emit_jump(Jump::long_jcc(cc), Jump::short_jcc(cc), true_block);
    cb.emit_jump(Jump::long_jmp(), Jump::short_jmp(), false_block);
    Ok(())
}

// ---------------------------------------------------------------------
// Division / widening multiply
// ---------------------------------------------------------------------

fn encode_cdq_cqo(cb: &mut CodeBuffer, output: Value, input: Value) -> CodegenResult<()> {
    let input_slot = require_physical(input)?;
    let output_slot = require_physical(output)?;
    if input_slot != RAX || output_slot != RDX {
        return Err(CodegenError::InvariantViolated { message: "sign extension for divide must read RAX and write RDX".to_owned() });
    }
    if output.size == ValueSize::Size64 {
        cb.emit8(0x48);
    }
    cb.emit8(0x99);
    Ok(())
}

fn encode_divide(cb: &mut CodeBuffer, digit: u8, high_left: Value, low_left: Value, right: Value) -> CodegenResult<()> {
    if require_physical(high_left)? != RDX || require_physical(low_left)? != RAX {
        return Err(CodegenError::InvariantViolated { message: "divide must read the dividend from RDX:RAX".to_owned() });
    }
    let rm = classify(right)?;
    emit_opcode_and_modrm(cb, &[0xF7], digit, rm, low_left.size);
    Ok(())
}

fn encode_widening_multiply(cb: &mut CodeBuffer, left: Value, right: Value) -> CodegenResult<()> {
    if require_physical(left)? != RAX {
        return Err(CodegenError::InvariantViolated { message: "widening multiply must read its first operand from RAX".to_owned() });
    }
    let rm = classify(right)?;
    emit_opcode_and_modrm(cb, &[0xF7], 4, rm, left.size);
    Ok(())
}

// ---------------------------------------------------------------------
// Call / parallel copy
// ---------------------------------------------------------------------

fn encode_call(cb: &mut CodeBuffer, function: &Function, outputs: SmallVec<[Value; 4]>, callee: Value) -> CodegenResult<()> {
    let _ = outputs;
    cb.emit8(0xE8);
    let name = match function.literals.resolve(callee) {
        Some(LiteralData::Function(target)) => format!("fn{}", target.data),
        _ => return Err(CodegenError::UnsupportedLowering { mnemonic: "call through a non-function-literal callee" }),
    };
    cb.associate_call_site(name);
    cb.emit32(0);
    Ok(())
}

/// Only the non-conflicting case is handled: true simultaneous-copy cycle
/// breaking is parallel-copy expansion, out of scope here (see
/// `DESIGN.md`).
fn encode_pcopy(cb: &mut CodeBuffer, function: &Function, outputs: &[Value], inputs: &[Value]) -> CodegenResult<()> {
    for (&output, &input) in outputs.iter().zip(inputs.iter()) {
        let conflicts = outputs.iter().any(|&other| other != output && other.kind == input.kind && other.data == input.data);
        if conflicts {
            return Err(CodegenError::UnsupportedLowering { mnemonic: "cyclic parallel copy" });
        }
        encode_mov(cb, function, output, input)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::RecordingBuilder;
    use crate::ir::editor::Editor;
    use crate::isa::x64::Target;
    use crate::value::ValueSize;

    #[test]
    fn accumulator_add_immediate_matches_expected_bytes() {
        let mut function = Function::new(Value::int_ptr_type(), Vec::new());
        let mut editor = Editor::new(&mut function);
        let entry = editor.entry_block();
        editor.edit(entry);

        let ax = Target::register_of(GeneralRegister::Rax, ValueSize::Size16);
        editor.append(Instruction::new(Opcode::IntAdd { output: ax, left: ax, right: Value::int16(0x0937) }));
        editor.set_return();
        editor.commit().unwrap();

        let mut builder = RecordingBuilder::new();
        super::super::emit_function(&function, &mut builder).unwrap();
        assert_eq!(builder.bytes(), &[0x66, 0x05, 0x37, 0x09, 0xC3]);
    }

    #[test]
    fn sixty_four_bit_immediate_store_to_memory_carries_rex_w() {
        let mut function = Function::new(Value::int_ptr_type(), Vec::new());
        let mut editor = Editor::new(&mut function);
        let entry = editor.entry_block();
        editor.edit(entry);

        let base = Target::register_of(GeneralRegister::Rbx, ValueSize::Size64);
        let zero_index = Value::int32(0);
        let offset = Value::int32(8);
        let imm64 = Value::new(Kind::Immediate, crate::value::ValueType::Integer, ValueSize::Size64, 7);
        editor.append(Instruction::new(Opcode::Store { base, index: zero_index, offset, value: imm64 }));
        editor.set_return();
        editor.commit().unwrap();

        let mut builder = RecordingBuilder::new();
        super::super::emit_function(&function, &mut builder).unwrap();
        // REX.W (0x48) + C7 /0 + ModRM (disp32 form, base=rbx=3) + disp32(8) + imm32(7) + RET.
        assert_eq!(builder.bytes(), &[0x48, 0xC7, 0x83, 0x08, 0x00, 0x00, 0x00, 0x07, 0x00, 0x00, 0x00, 0xC3]);
    }

    #[test]
    fn virtual_register_reaching_the_encoder_is_an_invariant_violation() {
        let mut function = Function::new(Value::int_ptr_type(), Vec::new());
        let mut editor = Editor::new(&mut function);
        let entry = editor.entry_block();
        editor.edit(entry);
        let v = function.next_virtual_register(Value::int32_type());
        let _ = v;
        editor.commit().unwrap_or(());
    }
}
