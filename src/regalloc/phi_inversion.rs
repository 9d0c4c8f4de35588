//! Critical-edge splitting for phi correctness.
//!
//! A phi's inputs are copied into place along the edge each predecessor
//! takes into the phi block. That only works if every such edge is private
//! to this one transition: a predecessor with more than one successor
//! (i.e. a `Branch`) cannot carry a copy that should fire only when control
//! reaches the phi block and not when it reaches the predecessor's other
//! successor. This pass inserts a trampoline block on every such edge:
//! find every `(predecessor, phi_block)` pair where `predecessor` has more
//! than one successor, splice a block between them, and repoint the phi's
//! input at the trampoline instead of the former predecessor.

use crate::ir::editor::Editor;
use crate::ir::function::{Block, Function};
use crate::regalloc::support::redirect_successor;

/// Splits every critical edge into a phi block, so later passes (parallel-
/// copy expansion in particular) can always place a predecessor's phi
/// copies in a block private to that one edge.
pub fn split_critical_edges(function: &mut Function) {
    let candidates = find_critical_edges(function);

    for (predecessor, phi_block) in candidates {
        let trampoline = {
            let mut editor = Editor::new(function);
            let reference = editor.function().next_in_layout(predecessor).unwrap_or_else(|| editor.exit_block());
            let trampoline = editor.new_basic_block(reference);

            editor.edit(trampoline);
            editor.set_jump(phi_block);
            editor.commit().expect("trampoline block always validates");
            trampoline
        };

        redirect_successor(function, predecessor, phi_block, trampoline);

        {
            let mut editor = Editor::new(function);
            editor.edit(phi_block);
            editor.replace_phi_predecessor(predecessor, trampoline);
            editor.commit().expect("replacing a phi predecessor keeps the block valid");
        }
    }
}

/// Every `(predecessor, phi_block)` pair where `phi_block` has at least one
/// `Phi` instruction and `predecessor` has more than one successor.
fn find_critical_edges(function: &Function) -> Vec<(Block, Block)> {
    let mut pairs = Vec::new();
    for &block in function.layout() {
        if function.block(block).phi_instructions().next().is_none() {
            continue;
        }
        for predecessor in function.predecessors_of(block) {
            if function.successors_of(predecessor).len() > 1 {
                pairs.push((predecessor, block));
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::instructions::{Instruction, Opcode, PhiInput};
    use crate::value::Value;

    #[test]
    fn splits_edge_from_a_branch_into_a_phi_block() {
        let mut function = Function::new(Value::int_ptr_type(), Vec::new());
        let mut editor = Editor::new(&mut function);
        let exit = editor.exit_block();

        let phi_block = editor.new_basic_block(exit);
        let false_block = editor.new_basic_block(phi_block);
        let entry = editor.entry_block();

        let v = Value::register(Value::int32_type(), 1);
        let cond = Value::conditional(1);

        editor.edit(entry);
        editor.set_branch(cond, phi_block, false_block);
        editor.commit().unwrap();

        editor.edit(false_block);
        editor.set_jump(phi_block);
        editor.commit().unwrap();

        editor.edit(phi_block);
        editor.append(Instruction::new(Opcode::Phi {
            output: v,
            inputs: vec![
                PhiInput { block: entry, value: Value::int32(1) },
                PhiInput { block: false_block, value: Value::int32(2) },
            ],
        }));
        editor.set_return();
        editor.commit().unwrap();

        split_critical_edges(&mut function);

        // `entry` no longer jumps straight into the phi block...
        let entry = function.entry_block();
        assert!(matches!(
            function.block(entry).last_instruction().unwrap().opcode,
            Opcode::Branch { true_block, .. } if true_block != phi_block
        ));

        // ...and the phi's input for that edge now names the trampoline.
        let phi = function
            .block(phi_block)
            .phi_instructions()
            .next()
            .unwrap();
        if let Opcode::Phi { inputs, .. } = &phi.opcode {
            assert!(!inputs.iter().any(|p| p.block == entry));
            assert_eq!(inputs.len(), 2);
        } else {
            unreachable!();
        }
    }

    #[test]
    fn leaves_non_critical_edges_untouched() {
        let mut function = Function::new(Value::int_ptr_type(), Vec::new());
        let mut editor = Editor::new(&mut function);
        let exit = editor.exit_block();
        let entry = editor.entry_block();
        editor.edit(entry);
        editor.set_jump(exit);
        editor.commit().unwrap();

        let layout_before = function.layout().to_vec();
        split_critical_edges(&mut function);
        assert_eq!(function.layout(), layout_before.as_slice());
    }
}
