//! The basic-block/function graph.
//!
//! Blocks and instructions are addressed by stable `cranelift_entity`
//! indices rather than pointers into an arena. Predecessors are not
//! stored; they are derived on demand by scanning every block's
//! terminator for ones that name this block as a successor — `Ret`'s
//! target (the exit block) is implicit rather than an operand, so it
//! needs no such scan.

use cranelift_entity::{entity_impl, PrimaryMap};
use smallvec::SmallVec;

use crate::ir::instructions::{Instruction, InstructionId, Opcode};
use crate::ir::literals::LiteralMap;
use crate::value::Value;

/// A basic block, identified by a stable index into `Function::blocks`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block(u32);
entity_impl!(Block, "block");

/// Up to two successors without a heap allocation; `Branch` is the only
/// opcode that produces two.
pub type Successors = SmallVec<[Block; 2]>;

pub struct BasicBlockData {
    /// Debug-facing identifier; assigned by the editor when the block is
    /// spliced into the function, reset to 0 when removed.
    pub id: i32,
    /// The `Value` (kind `Literal`) other instructions use to name this
    /// block as a jump/branch/phi-predecessor target.
    pub value: Value,
    pub instructions: Vec<Instruction>,
}

impl BasicBlockData {
    pub fn first_instruction(&self) -> Option<&Instruction> {
        self.instructions.first()
    }

    pub fn last_instruction(&self) -> Option<&Instruction> {
        self.instructions.last()
    }

    pub fn is_empty_of_instructions(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn phi_instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter().filter(|i| matches!(i.opcode, Opcode::Phi { .. }))
    }

    /// Successors of this block, read off its terminator. Empty if the
    /// block has no terminator yet (mid-edit) or ends in `Exit`.
    pub fn successors(&self, exit_block: Block) -> Successors {
        match self.last_instruction().map(|i| &i.opcode) {
            Some(Opcode::Jump { target }) => {
                let mut v = Successors::new();
                v.push(*target);
                v
            }
            Some(Opcode::Branch { true_block, false_block, .. }) => {
                let mut v = Successors::new();
                v.push(*true_block);
                v.push(*false_block);
                v
            }
            Some(Opcode::Ret) => {
                let mut v = Successors::new();
                v.push(exit_block);
                v
            }
            _ => Successors::new(),
        }
    }
}

/// A function: an ordered list of basic blocks (first = entry, last =
/// exit), a parameter-value vector, and the literal map shared by every
/// instruction operand that names a constant or block.
pub struct Function {
    pub value: Value,
    pub parameters: Vec<Value>,
    blocks: PrimaryMap<Block, BasicBlockData>,
    /// Layout order; distinct from `blocks`' allocation order because
    /// `new_basic_block` splices a block before a reference block.
    layout: Vec<Block>,
    pub literals: LiteralMap,
    next_instruction_id: i32,
    next_block_id: i32,
    next_vreg_id: i32,
}

impl Function {
    pub fn new(value: Value, parameters: Vec<Value>) -> Function {
        Function {
            value,
            parameters,
            blocks: PrimaryMap::new(),
            layout: Vec::new(),
            literals: LiteralMap::new(),
            next_instruction_id: 1,
            next_block_id: 1,
            next_vreg_id: 1,
        }
    }

    pub fn id(&self) -> i32 {
        self.value.data
    }

    pub fn next_instruction_id(&mut self) -> InstructionId {
        let id = self.next_instruction_id;
        self.next_instruction_id += 1;
        InstructionId(id)
    }

    pub fn next_block_id(&mut self) -> i32 {
        let id = self.next_block_id;
        self.next_block_id += 1;
        id
    }

    pub fn next_virtual_register(&mut self, model: Value) -> Value {
        let id = self.next_vreg_id;
        self.next_vreg_id += 1;
        Value::register(model, id)
    }

    /// A fresh condition-code pseudo-register, sharing the virtual-register
    /// id counter so a `Cmp` output never collides with an ordinary vreg.
    pub fn next_conditional(&mut self) -> Value {
        let id = self.next_vreg_id;
        self.next_vreg_id += 1;
        Value::conditional(id)
    }

    pub fn entry_block(&self) -> Block {
        *self.layout.first().expect("function has no blocks yet")
    }

    pub fn exit_block(&self) -> Block {
        *self.layout.last().expect("function has no blocks yet")
    }

    pub fn layout(&self) -> &[Block] {
        &self.layout
    }

    /// The block immediately following `block` in layout order, if any.
    /// Used by the critical-edge splitter to place a trampoline right
    /// after the predecessor it is splitting, rather than at a fixed
    /// position relative to the function's exit block.
    pub fn next_in_layout(&self, block: Block) -> Option<Block> {
        let position = self.layout.iter().position(|&b| b == block)?;
        self.layout.get(position + 1).copied()
    }

    pub fn block(&self, block: Block) -> &BasicBlockData {
        &self.blocks[block]
    }

    pub fn block_mut(&mut self, block: Block) -> &mut BasicBlockData {
        &mut self.blocks[block]
    }

    pub fn successors_of(&self, block: Block) -> Successors {
        self.block(block).successors(self.exit_block())
    }

    /// Every block reachable as a successor of `block`, i.e. `block`'s
    /// predecessors scanned in reverse: returns the blocks `P` such that
    /// `block` is a successor of `P`.
    pub fn predecessors_of(&self, block: Block) -> Vec<Block> {
        self.layout
            .iter()
            .copied()
            .filter(|&candidate| self.successors_of(candidate).contains(&block))
            .collect()
    }

    /// Allocates a fresh, empty block and appends it to the internal
    /// entity table; does not splice it into the layout. Used by the
    /// editor, which controls layout placement.
    pub(crate) fn allocate_block(&mut self) -> Block {
        let block = self.blocks.push(BasicBlockData {
            id: 0,
            value: Value::int_ptr_type(),
            instructions: Vec::new(),
        });
        // The literal is registered only once the block's entity index is
        // known, so the `Literal -> BasicBlock` binding names the real block.
        self.blocks[block].value = self.literals.block_value(block.as_u32());
        block
    }

    pub(crate) fn insert_block_before(&mut self, block: Block, reference: Block) {
        let position = self
            .layout
            .iter()
            .position(|&b| b == reference)
            .expect("reference block must already be in the layout");
        self.layout.insert(position, block);
    }

    pub(crate) fn push_block_to_layout(&mut self, block: Block) {
        self.layout.push(block);
    }

    pub(crate) fn remove_block_from_layout(&mut self, block: Block) {
        self.layout.retain(|&b| b != block);
        self.blocks[block].id = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocating_blocks_assigns_distinct_values() {
        let mut function = Function::new(Value::int_ptr_type(), Vec::new());
        let a = function.allocate_block();
        let b = function.allocate_block();
        assert_ne!(a, b);
        assert_ne!(function.block(a).value.data, function.block(b).value.data);
    }

    #[test]
    fn layout_insertion_before_reference_works() {
        let mut function = Function::new(Value::int_ptr_type(), Vec::new());
        let entry = function.allocate_block();
        let exit = function.allocate_block();
        function.push_block_to_layout(entry);
        function.push_block_to_layout(exit);
        let middle = function.allocate_block();
        function.insert_block_before(middle, exit);
        assert_eq!(function.layout(), &[entry, middle, exit]);
    }
}
