//! The stack slot allocator.
//!
//! Spilled virtual registers and the outgoing-argument area both live in
//! the current function's frame; this module owns the bookkeeping for
//! both. It hands out `Kind::SpillSlot` values at a monotonically growing
//! offset, reusing a freed slot of the same size before growing the frame
//! further, via a free-list bucketed by slot size, and separately tracks
//! the largest outgoing-argument footprint any call in the function requires,
//! so the prologue can reserve it once for the whole function rather than
//! per call site.

use std::collections::HashMap;

use crate::ir::function::{Block, Function};
use crate::ir::instructions::{InstructionId, Opcode};
use crate::value::{Kind, Value, ValueSize};

/// The two high-water marks the allocator accumulates over a function:
/// how much frame space its spilled virtual registers need, and how much
/// stack space the widest outgoing call needs for arguments that don't
/// fit in registers. Both feed the prologue/epilogue emitted by `binemit`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StackAssignments {
    maximum_variables_size: i32,
    maximum_arguments_size: i32,
}

impl StackAssignments {
    pub fn new() -> StackAssignments {
        StackAssignments::default()
    }

    /// Bytes of frame space needed for every spill slot live at once,
    /// measured at the high-water mark across the whole function.
    pub fn maximum_variables_size(&self) -> i32 {
        self.maximum_variables_size
    }

    /// Bytes of stack space the widest outgoing call needs for arguments
    /// beyond the first four (those travel in registers; see
    /// `isa::x64::Target::argument_at`).
    pub fn maximum_arguments_size(&self) -> i32 {
        self.maximum_arguments_size
    }
}

/// Hands out and reclaims `SpillSlot` operands for one function, and folds
/// each call's outgoing-argument footprint into `StackAssignments`.
///
/// Slots are bucketed by byte size: freeing a slot pushes its offset onto
/// that size's free list, and the next allocation of the same size pops
/// from it before advancing the frame offset. A virtual register's size
/// never changes between allocate/free, so buckets never need merging.
pub struct StackAllocator<'a> {
    assignments: &'a mut StackAssignments,
    offset: i32,
    free_by_size: HashMap<i32, Vec<i32>>,
}

impl<'a> StackAllocator<'a> {
    pub fn new(assignments: &'a mut StackAssignments) -> StackAllocator<'a> {
        StackAllocator { assignments, offset: 0, free_by_size: HashMap::new() }
    }

    /// Assigns a spill slot for `vreg` (a virtual register, used only for
    /// its type/size), reusing a freed slot of the same size if one is
    /// available.
    pub fn allocate(&mut self, vreg: Value) -> Value {
        let size = vreg.size.byte_size();

        if let Some(offset) = self.free_by_size.get_mut(&size).and_then(Vec::pop) {
            return Value::spill_slot(vreg, offset);
        }

        let alignment = size.min(ValueSize::pointer_size().byte_size());
        let aligned = align_up(self.offset, alignment);
        self.offset = aligned + size;
        self.assignments.maximum_variables_size = self.assignments.maximum_variables_size.max(self.offset);
        Value::spill_slot(vreg, aligned)
    }

    /// Returns `slot` (as produced by a prior `allocate` call) to the free
    /// list, making its offset available to a future allocation of the
    /// same size.
    pub fn free(&mut self, slot: Value) {
        debug_assert_eq!(slot.kind, Kind::SpillSlot);
        self.free_by_size.entry(slot.size.byte_size()).or_insert_with(Vec::new).push(slot.data);
    }

    /// Scans the parallel copy that stages `call`'s stack-passed arguments
    /// (the `PCopy` immediately preceding it in `block`, by the convention
    /// the translator always follows when it lowers a call with more than
    /// four arguments) and folds the resulting footprint into
    /// `maximum_arguments_size`.
    pub fn track_call(&mut self, function: &Function, block: Block, call: InstructionId) {
        let instructions = &function.block(block).instructions;
        let position = match instructions.iter().position(|i| i.id == call) {
            Some(p) if p > 0 => p,
            _ => return,
        };
        let outputs = match &instructions[position - 1].opcode {
            Opcode::PCopy { outputs, .. } => outputs,
            _ => return,
        };
        let mut footprint = 0;
        for output in outputs {
            if output.kind == Kind::Argument {
                footprint = footprint.max(output.data + output.size.byte_size());
            }
        }
        self.assignments.maximum_arguments_size = self.assignments.maximum_arguments_size.max(footprint);
    }
}

fn align_up(offset: i32, alignment: i32) -> i32 {
    if alignment <= 1 {
        return offset;
    }
    (offset + alignment - 1) / alignment * alignment
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::editor::Editor;
    use crate::ir::instructions::Instruction;
    use crate::isa::x64::Target;
    use crate::value::ValueSize;

    #[test]
    fn packs_slots_by_natural_alignment() {
        let mut assignments = StackAssignments::new();
        let mut allocator = StackAllocator::new(&mut assignments);

        let a = allocator.allocate(Value::int_type(ValueSize::Size8));
        let b = allocator.allocate(Value::int_type(ValueSize::Size16));
        let c = allocator.allocate(Value::int_type(ValueSize::Size32));
        let d = allocator.allocate(Value::int_type(ValueSize::Size64));
        let e = allocator.allocate(Value::int_type(ValueSize::Size64));

        assert_eq!(a.data, 0);
        assert_eq!(b.data, 2);
        assert_eq!(c.data, 4);
        assert_eq!(d.data, 8);
        assert_eq!(e.data, 16);
        assert_eq!(assignments.maximum_variables_size(), 24);
    }

    #[test]
    fn freeing_a_slot_lets_a_same_sized_allocation_reuse_it() {
        let mut assignments = StackAssignments::new();
        let mut allocator = StackAllocator::new(&mut assignments);

        let first = allocator.allocate(Value::int32_type());
        allocator.free(first);
        let second = allocator.allocate(Value::int32_type());

        assert_eq!(first.data, second.data);
        assert_eq!(assignments.maximum_variables_size(), 4);
    }

    #[test]
    fn tracks_the_widest_outgoing_call_footprint() {
        let mut function = Function::new(Value::int_ptr_type(), Vec::new());
        let mut editor = Editor::new(&mut function);
        let entry = editor.entry_block();
        editor.edit(entry);

        let callee = Value::int_ptr_type();
        let arg4 = Target::argument_at(Value::int32_type(), 4);
        let arg5 = Target::argument_at(Value::int32_type(), 5);
        let pcopy = editor.append(Instruction::new(Opcode::PCopy {
            outputs: [arg4, arg5].into_iter().collect(),
            inputs: [Value::int32(1), Value::int32(2)].into_iter().collect(),
        }));
        let call = editor.append(Instruction::new(Opcode::Call {
            outputs: Default::default(),
            callee,
        }));
        editor.set_return();
        editor.commit().unwrap();
        let _ = pcopy;

        let mut assignments = StackAssignments::new();
        let mut allocator = StackAllocator::new(&mut assignments);
        allocator.track_call(&function, entry, call);

        assert_eq!(assignments.maximum_arguments_size(), arg5.data + 4);
    }
}
