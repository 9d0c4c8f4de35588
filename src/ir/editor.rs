//! The sole mutator of a `Function`'s LIR.
//!
//! Mutation is scoped: `edit(block)` opens the block, every `append`/
//! `insert_before`/`remove`/`set_*` call targets it, and `commit()`
//! closes it again. Nothing outside that scope may touch instructions:
//! every mutator asserts an edit is active before it does anything.

use log::{debug, trace};

use crate::ir::function::{Block, Function};
use crate::ir::instructions::{Instruction, InstructionId, Opcode};
use crate::result::{CodegenError, CodegenResult};
use crate::value::Value;

pub struct Editor<'f> {
    function: &'f mut Function,
    current: Option<Block>,
}

impl<'f> Editor<'f> {
    /// Wraps `function` for editing, seeding entry/exit scaffolding on
    /// first use: an entry block with an `entry` instruction, an exit
    /// block with an `exit` instruction, and a `ret` back to exit so even
    /// an empty function validates.
    pub fn new(function: &'f mut Function) -> Editor<'f> {
        let mut editor = Editor { function, current: None };
        editor.initialize_if_needed();
        editor
    }

    pub fn function(&self) -> &Function {
        self.function
    }

    /// Mutable access to the wrapped function for id/literal/register
    /// bookkeeping that isn't instruction editing (`translate` needs this
    /// to allocate virtual registers and intern literals while a block is
    /// being populated). Instruction mutation still only happens through
    /// `append`/`insert_before`/`set_input`/`set_output`/`remove`.
    pub(crate) fn function_mut(&mut self) -> &mut Function {
        self.function
    }

    pub fn entry_block(&self) -> Block {
        self.function.entry_block()
    }

    pub fn exit_block(&self) -> Block {
        self.function.exit_block()
    }

    fn initialize_if_needed(&mut self) {
        if !self.function.layout().is_empty() {
            return;
        }
        debug!("editor: seeding entry/exit blocks for a fresh function");

        let entry = self.function.allocate_block();
        self.function.push_block_to_layout(entry);
        self.function.block_mut(entry).id = self.function.next_block_id();

        let exit = self.function.allocate_block();
        self.function.push_block_to_layout(exit);
        self.function.block_mut(exit).id = self.function.next_block_id();

        self.current = Some(exit);
        self.raw_append(Instruction::new(Opcode::Exit));

        self.current = Some(entry);
        self.raw_append(Instruction::new(Opcode::Entry));
        self.raw_append(Instruction::new(Opcode::Ret));

        self.current = None;
    }

    /// Enters `block` for editing. Mutation methods panic unless a block
    /// is currently being edited.
    pub fn edit(&mut self, block: Block) {
        assert!(self.current.is_none(), "editor: a block is already being edited");
        self.current = Some(block);
    }

    fn current(&self) -> Block {
        self.current.expect("editor: no block is being edited")
    }

    fn raw_append(&mut self, mut instruction: Instruction) -> InstructionId {
        let block = self.current();
        let id = self.function.next_instruction_id();
        instruction.id = id;
        instruction.block = Some(block);
        self.function.block_mut(block).instructions.push(instruction);
        id
    }

    pub fn append(&mut self, instruction: Instruction) -> InstructionId {
        self.raw_append(instruction)
    }

    pub fn insert_before(&mut self, instruction: Instruction, ref_id: InstructionId) -> InstructionId {
        let block = self.current();
        let position = self
            .function
            .block(block)
            .instructions
            .iter()
            .position(|i| i.id == ref_id)
            .expect("insert_before: reference instruction not in the block being edited");
        let mut instruction = instruction;
        let id = self.function.next_instruction_id();
        instruction.id = id;
        instruction.block = Some(block);
        self.function.block_mut(block).instructions.insert(position, instruction);
        id
    }

    pub fn insert_after(&mut self, instruction: Instruction, ref_id: InstructionId) -> InstructionId {
        let block = self.current();
        let position = self
            .function
            .block(block)
            .instructions
            .iter()
            .position(|i| i.id == ref_id)
            .expect("insert_after: reference instruction not in the block being edited");
        let mut instruction = instruction;
        let id = self.function.next_instruction_id();
        instruction.id = id;
        instruction.block = Some(block);
        self.function.block_mut(block).instructions.insert(position + 1, instruction);
        id
    }

    pub fn remove(&mut self, id: InstructionId) {
        let block = self.current();
        self.function.block_mut(block).instructions.retain(|i| i.id != id);
    }

    pub fn set_input(&mut self, id: InstructionId, index: usize, new_value: Value) {
        let block = self.current();
        let instr = self
            .function
            .block_mut(block)
            .instructions
            .iter_mut()
            .find(|i| i.id == id)
            .expect("set_input: instruction not in the block being edited");
        set_opcode_input(&mut instr.opcode, index, new_value);
    }

    pub fn set_output(&mut self, id: InstructionId, index: usize, new_value: Value) {
        let block = self.current();
        let instr = self
            .function
            .block_mut(block)
            .instructions
            .iter_mut()
            .find(|i| i.id == id)
            .expect("set_output: instruction not in the block being edited");
        set_opcode_output(&mut instr.opcode, index, new_value);
    }

    fn set_terminator(&mut self, instruction: Instruction) {
        debug_assert!(instruction.is_terminator());
        let block = self.current();
        let last_is_terminator =
            self.function.block(block).last_instruction().map_or(false, Instruction::is_terminator);
        if last_is_terminator {
            let last_id = self.function.block(block).last_instruction().unwrap().id;
            self.remove(last_id);
        }
        self.append(instruction);
    }

    /// Ensures the current block ends in an unconditional jump to
    /// `target`, replacing any existing terminator unless it is already
    /// exactly this jump.
    pub fn set_jump(&mut self, target: Block) {
        let block = self.current();
        if let Some(Opcode::Jump { target: existing }) =
            self.function.block(block).last_instruction().map(|i| &i.opcode)
        {
            if *existing == target {
                return;
            }
        }
        self.set_terminator(Instruction::new(Opcode::Jump { target }));
    }

    pub fn set_branch(&mut self, condition: Value, true_block: Block, false_block: Block) {
        self.set_terminator(Instruction::new(Opcode::Branch { condition, true_block, false_block }));
    }

    /// Ensures the current block ends in a `ret`; the exit block is the
    /// implicit target, not an explicit operand.
    pub fn set_return(&mut self) {
        let block = self.current();
        if let Some(Opcode::Ret) = self.function.block(block).last_instruction().map(|i| &i.opcode) {
            return;
        }
        self.set_terminator(Instruction::new(Opcode::Ret));
    }

    /// Allocates a new block and splices it into the layout immediately
    /// before `reference`, keeping the exit block last by convention.
    pub fn new_basic_block(&mut self, reference: Block) -> Block {
        let block = self.function.allocate_block();
        self.function.block_mut(block).id = self.function.next_block_id();
        self.function.insert_block_before(block, reference);
        block
    }

    /// Rewrites every `Phi` in the block currently being edited so that the
    /// input previously associated with `old_predecessor` is now associated
    /// with `new_predecessor`. Used after splicing a trampoline block onto
    /// an edge: the phi still needs exactly one input per actual
    /// predecessor, and the trampoline is now that predecessor.
    pub fn replace_phi_predecessor(&mut self, old_predecessor: Block, new_predecessor: Block) {
        let block = self.current();
        for instr in self.function.block_mut(block).instructions.iter_mut() {
            if let Opcode::Phi { inputs, .. } = &mut instr.opcode {
                for input in inputs.iter_mut() {
                    if input.block == old_predecessor {
                        input.block = new_predecessor;
                    }
                }
            }
        }
    }

    /// Exits the edit scope. In debug builds, revalidates the block (and,
    /// transitively, the function) before returning.
    pub fn commit(&mut self) -> CodegenResult<()> {
        let block = self.current.take().ok_or_else(|| CodegenError::InvariantViolated {
            message: "commit() called with no block being edited".to_owned(),
        })?;
        trace!("editor: committing block {:?}", block.as_u32());
        if cfg!(debug_assertions) {
            let errors = crate::ir::validator::validate_block(self.function, block);
            if !errors.is_empty() {
                return Err(CodegenError::InvariantViolated {
                    message: format!("block failed validation on commit: {:?}", errors),
                });
            }
        }
        Ok(())
    }
}

fn set_opcode_input(opcode: &mut Opcode, index: usize, new_value: Value) {
    use Opcode::*;
    match (opcode, index) {
        (Branch { condition, .. }, 0) => *condition = new_value,
        (Use { input }, 0) => *input = new_value,
        (Store { base, .. }, 0) => *base = new_value,
        (Store { index: i, .. }, 1) => *i = new_value,
        (Store { offset, .. }, 2) => *offset = new_value,
        (Store { value, .. }, 3) => *value = new_value,
        (Copy { input, .. }, 0)
        | (Literal { input, .. }, 0)
        | (Assign { input, .. }, 0)
        | (SignExtend { input, .. }, 0)
        | (ZeroExtend { input, .. }, 0)
        | (IntSignX64 { input, .. }, 0) => *input = new_value,
        (IntAdd { left, .. }, 0)
        | (IntSub { left, .. }, 0)
        | (IntMul { left, .. }, 0)
        | (IntDiv { left, .. }, 0)
        | (IntMod { left, .. }, 0)
        | (UIntDiv { left, .. }, 0)
        | (UIntMod { left, .. }, 0)
        | (IntBitAnd { left, .. }, 0)
        | (IntBitOr { left, .. }, 0)
        | (IntBitXor { left, .. }, 0)
        | (IntShl { left, .. }, 0)
        | (IntShr { left, .. }, 0)
        | (UIntShr { left, .. }, 0)
        | (FloatAdd { left, .. }, 0)
        | (FloatSub { left, .. }, 0)
        | (FloatMul { left, .. }, 0)
        | (FloatDiv { left, .. }, 0)
        | (Cmp { left, .. }, 0)
        | (FloatCmp { left, .. }, 0)
        | (UIntMulX64 { left, .. }, 0) => *left = new_value,
        (IntAdd { right, .. }, 1)
        | (IntSub { right, .. }, 1)
        | (IntMul { right, .. }, 1)
        | (IntDiv { right, .. }, 1)
        | (IntMod { right, .. }, 1)
        | (UIntDiv { right, .. }, 1)
        | (UIntMod { right, .. }, 1)
        | (IntBitAnd { right, .. }, 1)
        | (IntBitOr { right, .. }, 1)
        | (IntBitXor { right, .. }, 1)
        | (IntShl { right, .. }, 1)
        | (IntShr { right, .. }, 1)
        | (UIntShr { right, .. }, 1)
        | (FloatAdd { right, .. }, 1)
        | (FloatSub { right, .. }, 1)
        | (FloatMul { right, .. }, 1)
        | (FloatDiv { right, .. }, 1)
        | (Cmp { right, .. }, 1)
        | (FloatCmp { right, .. }, 1)
        | (UIntMulX64 { right, .. }, 1) => *right = new_value,
        (Load { base, .. }, 0) => *base = new_value,
        (Load { index, .. }, 1) => *index = new_value,
        (Load { offset, .. }, 2) => *offset = new_value,
        (Call { callee, .. }, 0) => *callee = new_value,
        (PCopy { inputs, .. }, i) => inputs[i] = new_value,
        (Phi { inputs, .. }, i) => inputs[i].value = new_value,
        (IntDivX64 { high_left, .. }, 0) | (UIntDivX64 { high_left, .. }, 0) => *high_left = new_value,
        (IntDivX64 { low_left, .. }, 1) | (UIntDivX64 { low_left, .. }, 1) => *low_left = new_value,
        (IntDivX64 { right, .. }, 2) | (UIntDivX64 { right, .. }, 2) => *right = new_value,
        (opcode, index) => panic!("set_input: index {} out of range for {:?}", index, opcode),
    }
}

fn set_opcode_output(opcode: &mut Opcode, index: usize, new_value: Value) {
    use Opcode::*;
    match (opcode, index) {
        (Copy { output, .. }, 0)
        | (Literal { output, .. }, 0)
        | (Assign { output, .. }, 0)
        | (SignExtend { output, .. }, 0)
        | (ZeroExtend { output, .. }, 0)
        | (IntAdd { output, .. }, 0)
        | (IntSub { output, .. }, 0)
        | (IntMul { output, .. }, 0)
        | (IntDiv { output, .. }, 0)
        | (IntMod { output, .. }, 0)
        | (UIntDiv { output, .. }, 0)
        | (UIntMod { output, .. }, 0)
        | (IntBitAnd { output, .. }, 0)
        | (IntBitOr { output, .. }, 0)
        | (IntBitXor { output, .. }, 0)
        | (IntShl { output, .. }, 0)
        | (IntShr { output, .. }, 0)
        | (UIntShr { output, .. }, 0)
        | (FloatAdd { output, .. }, 0)
        | (FloatSub { output, .. }, 0)
        | (FloatMul { output, .. }, 0)
        | (FloatDiv { output, .. }, 0)
        | (Cmp { output, .. }, 0)
        | (FloatCmp { output, .. }, 0)
        | (Load { output, .. }, 0)
        | (Phi { output, .. }, 0)
        | (IntSignX64 { output, .. }, 0) => *output = new_value,
        (Call { outputs, .. }, i) | (PCopy { outputs, .. }, i) => outputs[i] = new_value,
        (IntDivX64 { div_output, .. }, 0) | (UIntDivX64 { div_output, .. }, 0) => *div_output = new_value,
        (IntDivX64 { mod_output, .. }, 1) | (UIntDivX64 { mod_output, .. }, 1) => *mod_output = new_value,
        (UIntMulX64 { high_output, .. }, 0) => *high_output = new_value,
        (UIntMulX64 { low_output, .. }, 1) => *low_output = new_value,
        (opcode, index) => panic!("set_output: index {} out of range for {:?}", index, opcode),
    }
}
