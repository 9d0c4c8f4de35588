//! Small block-editing helpers shared by the control-flow passes in this
//! module. Unlike `ir::editor::Editor`, these operate directly on a
//! `Function` and are not scoped to a single "current" block — each whole-
//! function pass here touches many blocks per iteration.

use crate::ir::function::{Block, Function};
use crate::ir::instructions::{Instruction, Opcode};

/// Replaces `block`'s terminator with `opcode`, removing the existing one
/// first if there is one. Mirrors `Editor::SetTerminator` without the
/// single-block editing scope.
pub(super) fn set_terminator(function: &mut Function, block: Block, opcode: Opcode) {
    if let Some(last) = function.block(block).last_instruction() {
        if last.is_terminator() {
            let id = last.id;
            function.block_mut(block).instructions.retain(|i| i.id != id);
        }
    }
    let id = function.next_instruction_id();
    function.block_mut(block).instructions.push(Instruction { id, block: Some(block), opcode });
}

/// Rewrites `predecessor`'s terminator so that any edge to `old_target`
/// instead points at `new_target`. Used when a block is removed or
/// spliced into an existing edge.
pub(super) fn redirect_successor(function: &mut Function, predecessor: Block, old_target: Block, new_target: Block) {
    let rewritten = match function.block(predecessor).last_instruction().map(|i| &i.opcode) {
        Some(Opcode::Jump { target }) if *target == old_target => Some(Opcode::Jump { target: new_target }),
        Some(Opcode::Branch { condition, true_block, false_block }) => {
            let true_block = if *true_block == old_target { new_target } else { *true_block };
            let false_block = if *false_block == old_target { new_target } else { *false_block };
            Some(Opcode::Branch { condition: *condition, true_block, false_block })
        }
        _ => None,
    };
    if let Some(opcode) = rewritten {
        let last_id = function.block(predecessor).last_instruction().unwrap().id;
        for instr in function.block_mut(predecessor).instructions.iter_mut() {
            if instr.id == last_id {
                instr.opcode = opcode;
                break;
            }
        }
    }
}
