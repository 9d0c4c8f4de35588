//! The code buffer: a growing byte vector annotated with deferred jump
//! and value fixups, delivered to an external `api::MachineCodeBuilder`
//! once every block has been encoded. Emission is two-pass: bytes first,
//! with every short jump reserving room to grow into a long jump; then a
//! worklist fixpoint that widens any jump whose displacement no longer
//! fits 8 bits, relocating every record strictly after the growth point
//! (growing a block's own `code_length` only when the growth point falls
//! inside that block — never at or before it, or the jump's own
//! displacement math and the per-block byte ranges `finish` later slices
//! out of `bytes` would both go wrong); followed by delivery to the sink.

pub mod x64;

mod value_emitter;

use std::collections::{HashMap, HashSet};

use log::{debug, trace};

use crate::ir::function::{Block, Function};
use crate::ir::literals::LiteralMap;
use crate::result::{CodegenError, CodegenResult};
use crate::value::Value;
use crate::api::MachineCodeBuilder;

/// An x64 jump template: the opcode bytes (packed little-endian into
/// `opcode`, low byte emitted first) and the width of the relative
/// displacement that follows them.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Jump {
    opcode: u32,
    opcode_size: u8,
    operand_size: u8,
}

impl Jump {
    fn from_bytes(bytes: &[u8], operand_size: u8) -> Jump {
        let mut opcode = 0u32;
        for (i, &b) in bytes.iter().enumerate() {
            opcode |= (b as u32) << (8 * i);
        }
        Jump { opcode, opcode_size: bytes.len() as u8, operand_size }
    }

    pub fn size(self) -> i32 {
        self.opcode_size as i32 + self.operand_size as i32
    }

    pub fn short_jmp() -> Jump {
        Jump::from_bytes(&[0xEB], 1)
    }
    pub fn long_jmp() -> Jump {
        Jump::from_bytes(&[0xE9], 4)
    }
    /// `condition_code` is the 4-bit x64 condition field (0 = overflow,
    /// 4 = equal, 12 = less, ... per the standard Jcc encoding table).
    pub fn short_jcc(condition_code: u8) -> Jump {
        Jump::from_bytes(&[0x70 + condition_code], 1)
    }
    pub fn long_jcc(condition_code: u8) -> Jump {
        Jump::from_bytes(&[0x0F, 0x80 + condition_code], 4)
    }
}

#[derive(Copy, Clone, Debug, Default)]
struct CodeLocation {
    buffer_offset: i32,
    code_offset: i32,
}

impl CodeLocation {
    fn relocate(&mut self, delta: i32) {
        self.code_offset += delta;
    }
}

struct BasicBlockData {
    location: CodeLocation,
    code_length: i32,
}

struct JumpData {
    location: CodeLocation,
    is_long: bool,
    long_jump: Jump,
    short_jump: Jump,
    target_block: Block,
}

impl JumpData {
    fn jump(&self) -> Jump {
        if self.is_long { self.long_jump } else { self.short_jump }
    }
}

struct ValueInCode {
    location: CodeLocation,
    value: Value,
}

struct CallSite {
    location: CodeLocation,
    name: String,
}

/// Accumulates one function's encoded bytes plus every deferred fixup,
/// across the block-by-block encoding pass, until `finish` delivers it.
pub struct CodeBuffer {
    bytes: Vec<u8>,
    code_size: i32,
    current_block: Option<Block>,
    block_order: Vec<Block>,
    block_data: HashMap<Block, BasicBlockData>,
    jump_data: Vec<JumpData>,
    value_in_code: Vec<ValueInCode>,
    call_sites: Vec<CallSite>,
}

impl CodeBuffer {
    pub fn new(block_order: &[Block]) -> CodeBuffer {
        let mut block_data = HashMap::new();
        for &block in block_order {
            block_data.insert(
                block,
                BasicBlockData { location: CodeLocation::default(), code_length: -1 },
            );
        }
        CodeBuffer {
            bytes: Vec::new(),
            code_size: 0,
            current_block: None,
            block_order: block_order.to_vec(),
            block_data,
            jump_data: Vec::new(),
            value_in_code: Vec::new(),
            call_sites: Vec::new(),
        }
    }

    pub fn start_basic_block(&mut self, block: Block) {
        debug_assert!(self.current_block.is_none(), "a basic block is already being encoded");
        let location = CodeLocation { buffer_offset: self.bytes.len() as i32, code_offset: self.code_size };
        self.block_data.get_mut(&block).expect("block not registered with this code buffer").location = location;
        self.current_block = Some(block);
    }

    pub fn end_basic_block(&mut self) {
        let block = self.current_block.take().expect("no basic block is being encoded");
        let data = self.block_data.get_mut(&block).unwrap();
        data.code_length = self.code_size - data.location.code_offset;
    }

    pub fn emit8(&mut self, value: u8) {
        debug_assert!(self.current_block.is_some(), "emit8 outside start_basic_block/end_basic_block");
        self.bytes.push(value);
        self.code_size += 1;
    }

    pub fn emit16(&mut self, value: u16) {
        self.emit8(value as u8);
        self.emit8((value >> 8) as u8);
    }

    pub fn emit32(&mut self, value: u32) {
        for i in 0..4 {
            self.emit8((value >> (8 * i)) as u8);
        }
    }

    pub fn emit64(&mut self, value: u64) {
        self.emit32(value as u32);
        self.emit32((value >> 32) as u32);
    }

    /// Records that the `value` about to be emitted (at a placeholder
    /// width the caller emits immediately afterwards) is not yet known
    /// and must be filled in by `binemit::value_emitter` at `finish`.
    pub fn associate_value(&mut self, value: Value) {
        debug_assert!(self.current_block.is_some());
        let location = CodeLocation { buffer_offset: self.bytes.len() as i32, code_offset: self.code_size };
        self.value_in_code.push(ValueInCode { location, value });
    }

    /// Records a relative-call fixup: the 4 bytes about to be emitted are
    /// a placeholder for a call to `name`.
    pub fn associate_call_site(&mut self, name: String) {
        debug_assert!(self.current_block.is_some());
        let location = CodeLocation { buffer_offset: self.bytes.len() as i32, code_offset: self.code_size };
        self.call_sites.push(CallSite { location, name });
    }

    /// Emits a short-form jump, reserving enough trailing buffer space
    /// for the long form in case jump resolution later grows it.
    pub fn emit_jump(&mut self, long_jump: Jump, short_jump: Jump, target: Block) {
        debug_assert!(self.current_block.is_some());
        debug_assert!(self.block_data.contains_key(&target), "jump target is not a block of this function");
        let location = CodeLocation { buffer_offset: self.bytes.len() as i32, code_offset: self.code_size };
        self.jump_data.push(JumpData { location, is_long: false, long_jump, short_jump, target_block: target });
        self.bytes.resize(self.bytes.len() + long_jump.size() as usize, 0);
        self.code_size += short_jump.size();
    }

    fn target_code_offset(&self, block: Block) -> i32 {
        self.block_data[&block].location.code_offset
    }

    fn relative_offset(&self, jump: &JumpData) -> i32 {
        self.target_code_offset(jump.target_block) - jump.location.code_offset
    }

    fn is_crossing(&self, jump: &JumpData, ref_code_offset: i32) -> bool {
        let target_offset = self.target_code_offset(jump.target_block);
        if jump.location.code_offset < ref_code_offset {
            target_offset >= ref_code_offset
        } else {
            target_offset < ref_code_offset
        }
    }

    fn relocate_after(&mut self, ref_code_offset: i32, delta: i32) {
        debug_assert!(delta > 0);
        for jump in self.jump_data.iter_mut() {
            if jump.location.code_offset > ref_code_offset {
                jump.location.relocate(delta);
            }
        }
        for block in &self.block_order {
            let data = self.block_data.get_mut(block).unwrap();
            let start = data.location.code_offset;
            let end = start + data.code_length;
            if ref_code_offset >= start && ref_code_offset < end {
                data.code_length += delta;
            } else if start > ref_code_offset {
                data.location.relocate(delta);
            }
        }
        for value in self.value_in_code.iter_mut() {
            if value.location.code_offset > ref_code_offset {
                value.location.relocate(delta);
            }
        }
        for call_site in self.call_sites.iter_mut() {
            if call_site.location.code_offset > ref_code_offset {
                call_site.location.relocate(delta);
            }
        }
    }

    /// Grows every jump whose short-form displacement no longer fits a
    /// signed 8-bit immediate, relocating everything after it, until no
    /// jump needs to grow. Bounded by `resolution_budget` analyses so a
    /// logic error here surfaces as `JumpResolutionDidNotConverge` rather
    /// than looping forever; ordinary functions resolve in at most one
    /// pass per jump since growth is monotonic (short -> long, never back).
    fn resolve_jumps(&mut self) -> CodegenResult<()> {
        let mut work_set: HashSet<usize> = (0..self.jump_data.len()).collect();
        let resolution_budget = (self.jump_data.len() + 1) * (self.jump_data.len() + 1) + 16;
        let mut analyses = 0;

        while let Some(&index) = work_set.iter().next() {
            work_set.remove(&index);
            analyses += 1;
            if analyses > resolution_budget {
                return Err(CodegenError::JumpResolutionDidNotConverge);
            }

            if self.jump_data[index].is_long {
                continue;
            }
            let relative_offset = self.relative_offset(&self.jump_data[index]);
            if is_8bit(relative_offset) {
                continue;
            }

            let ref_code_offset = self.jump_data[index].location.code_offset;
            for other in 0..self.jump_data.len() {
                if other == index || work_set.contains(&other) {
                    continue;
                }
                if self.is_crossing(&self.jump_data[other], ref_code_offset) {
                    work_set.insert(other);
                }
            }

            let delta = self.jump_data[index].long_jump.size() - self.jump_data[index].short_jump.size();
            self.jump_data[index].is_long = true;
            self.relocate_after(ref_code_offset, delta);
            trace!("binemit: grew jump at code offset {} to long form (+{} bytes)", ref_code_offset, delta);
        }
        Ok(())
    }

    fn patch_jump(&mut self, index: usize) {
        let jump = self.jump_data[index].jump();
        let relative_offset = self.relative_offset(&self.jump_data[index]);
        let mut offset = self.jump_data[index].location.buffer_offset as usize;

        let mut opcode = jump.opcode;
        for _ in 0..jump.opcode_size {
            self.bytes[offset] = opcode as u8;
            opcode >>= 8;
            offset += 1;
        }

        match jump.operand_size {
            4 => {
                self.bytes[offset..offset + 4].copy_from_slice(&relative_offset.to_le_bytes());
            }
            1 => {
                debug_assert!(is_8bit(relative_offset));
                self.bytes[offset] = relative_offset as u8;
            }
            other => unreachable!("unsupported jump operand width {}", other),
        }
    }

    /// Resolves every jump, then delivers the finished image plus every
    /// deferred fixup to `builder` in a fixed call order: `prepare_code`,
    /// one `emit_code` per block, one `set_*` per fixup (jumps are
    /// patched directly into the byte image, not routed through the
    /// builder), `finish_code`.
    pub fn finish(mut self, literals: &LiteralMap, builder: &mut dyn MachineCodeBuilder) -> CodegenResult<()> {
        debug!("binemit: resolving {} jump(s)", self.jump_data.len());
        self.resolve_jumps()?;
        for index in 0..self.jump_data.len() {
            self.patch_jump(index);
        }

        builder.prepare_code(self.code_size as usize);
        for &block in &self.block_order {
            let data = &self.block_data[&block];
            if data.code_length <= 0 {
                continue;
            }
            let start = data.location.buffer_offset as usize;
            let end = start + data.code_length as usize;
            builder.emit_code(&self.bytes[start..end]);
        }

        for value in &self.value_in_code {
            value_emitter::emit(builder, literals, value.location.code_offset as usize, value.value)?;
        }
        for call_site in &self.call_sites {
            builder.set_call_site(call_site.location.code_offset as usize, &call_site.name);
        }

        builder.finish_code();
        Ok(())
    }
}

fn is_8bit(data: i32) -> bool {
    data >= i8::min_value() as i32 && data <= i8::max_value() as i32
}

/// Encodes `function`'s lowered, cleaned LIR and delivers it to `builder`.
/// The function must already have been through `isa::x64::lower` and
/// `regalloc` (clean, phi inversion, stack allocation); this pass only
/// encodes, it does not rewrite operands.
pub fn emit_function(function: &Function, builder: &mut dyn MachineCodeBuilder) -> CodegenResult<()> {
    let code_buffer = x64::encode_function(function)?;
    code_buffer.finish(&function.literals, builder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::editor::Editor;
    use crate::api::testing::RecordingBuilder;
    use crate::value::Value;

    #[test]
    fn empty_function_encodes_to_a_single_ret_byte() {
        let mut function = Function::new(Value::int_ptr_type(), Vec::new());
        let _editor = Editor::new(&mut function);

        let mut builder = RecordingBuilder::new();
        emit_function(&function, &mut builder).unwrap();
        assert_eq!(builder.bytes(), &[0xC3]);
    }
}
