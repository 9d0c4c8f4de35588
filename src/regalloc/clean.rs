//! Control-flow cleanup: folds a branch whose both arms jump to the same
//! phi-free target, removes empty trampoline blocks, combines a block
//! into its sole predecessor edge, and hoists a branch through an
//! intermediate jump. Iterates to a fixpoint since each rewrite can
//! expose another.

use crate::ir::function::{Block, Function};
use crate::ir::instructions::Opcode;
use crate::regalloc::support::{redirect_successor, set_terminator};

/// Runs the clean pass on `function` until no rewrite applies.
pub fn clean_function(function: &mut Function) {
    loop {
        if !clean_once(function) {
            break;
        }
    }
}

fn clean_once(function: &mut Function) -> bool {
    let mut changed = false;
    for block in function.layout().to_vec() {
        if !function.layout().contains(&block) {
            // Removed by an earlier rewrite this round.
            continue;
        }
        match function.block(block).last_instruction().map(|i| i.opcode.clone()) {
            Some(Opcode::Branch { condition, true_block, false_block }) => {
                if clean_branch(function, block, condition, true_block, false_block) {
                    changed = true;
                }
            }
            Some(Opcode::Jump { target }) => {
                if clean_jump(function, block, target) {
                    changed = true;
                }
            }
            _ => {}
        }
    }
    changed
}

/// Folds `br cond, true, false` into `jmp target` when both arms
/// immediately jump to the same phi-free target.
fn clean_branch(
    function: &mut Function,
    block: Block,
    _condition: crate::value::Value,
    true_block: Block,
    false_block: Block,
) -> bool {
    let target = match function.block(false_block).first_instruction().map(|i| &i.opcode) {
        Some(Opcode::Jump { target }) => *target,
        _ => return false,
    };
    match function.block(true_block).first_instruction().map(|i| &i.opcode) {
        Some(Opcode::Jump { target: t }) if *t == target => {}
        _ => return false,
    }
    if function.block(target).phi_instructions().next().is_some() {
        return false;
    }
    set_terminator(function, block, Opcode::Jump { target });
    clean_jump(function, block, target);
    true
}

fn clean_jump(function: &mut Function, block: Block, target: Block) -> bool {
    let is_empty_trampoline = function.block(block).instructions.len() == 1;

    if is_empty_trampoline && function.block(target).phi_instructions().next().is_none() {
        let predecessors = function.predecessors_of(block);
        function.remove_block_from_layout(block);
        for predecessor in predecessors {
            redirect_successor(function, predecessor, block, target);
        }
        return true;
    }

    // Never fold the exit block into a predecessor: the function must keep
    // exactly one exit block (see `ir::validator`), even though nothing
    // else about this rewrite is unsound for an ordinary target.
    if target != function.exit_block()
        && function.predecessors_of(target).len() == 1
        && function.block(target).phi_instructions().next().is_none()
    {
        combine_blocks(function, block, target);
        function.remove_block_from_layout(target);
        return true;
    }

    if let Some(Opcode::Branch { condition, true_block, false_block }) =
        function.block(target).first_instruction().map(|i| i.opcode.clone())
    {
        let no_phis = function.block(true_block).phi_instructions().next().is_none()
            && function.block(false_block).phi_instructions().next().is_none();
        if no_phis {
            set_terminator(function, block, Opcode::Branch { condition, true_block, false_block });
            return true;
        }
    }

    false
}

/// Appends `target`'s instructions onto `block` in place of `block`'s jump
/// terminator, since `target` has exactly one predecessor and can be
/// inlined without affecting any other path.
fn combine_blocks(function: &mut Function, block: Block, target: Block) {
    let jump_id = function.block(block).last_instruction().unwrap().id;
    function.block_mut(block).instructions.retain(|i| i.id != jump_id);

    let mut moved = std::mem::take(&mut function.block_mut(target).instructions);
    for instr in &mut moved {
        instr.block = Some(block);
    }
    function.block_mut(block).instructions.append(&mut moved);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::editor::Editor;
    use crate::ir::instructions::Instruction;
    use crate::value::Value;

    #[test]
    fn removes_empty_trampoline_block() {
        let mut function = Function::new(Value::int_ptr_type(), Vec::new());
        let mut editor = Editor::new(&mut function);
        let exit = editor.exit_block();
        let trampoline = editor.new_basic_block(exit);

        editor.edit(trampoline);
        editor.set_jump(exit);
        editor.commit().unwrap();

        let entry = editor.entry_block();
        editor.edit(entry);
        editor.set_jump(trampoline);
        editor.commit().unwrap();

        clean_function(&mut function);

        assert!(!function.layout().contains(&trampoline));
        let entry = function.entry_block();
        assert!(matches!(function.block(entry).last_instruction().unwrap().opcode, Opcode::Jump { target } if target == function.exit_block()));
    }

    #[test]
    fn combines_block_with_single_predecessor() {
        let mut function = Function::new(Value::int_ptr_type(), Vec::new());
        let mut editor = Editor::new(&mut function);
        let exit = editor.exit_block();
        let middle = editor.new_basic_block(exit);

        editor.edit(middle);
        let v = Value::register(Value::int32_type(), 1);
        editor.append(Instruction::new(Opcode::Assign { output: v, input: Value::int32(1) }));
        editor.set_return();
        editor.commit().unwrap();

        let entry = editor.entry_block();
        editor.edit(entry);
        editor.set_jump(middle);
        editor.commit().unwrap();

        clean_function(&mut function);

        assert!(!function.layout().contains(&middle));
        let entry = function.entry_block();
        assert!(function.block(entry).instructions.iter().any(|i| matches!(i.opcode, Opcode::Assign { .. })));
    }
}
