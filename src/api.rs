//! External collaborator interfaces: the machine-code sink the code
//! buffer delivers bytes and fixups to, and the scheduled-HIR input the
//! translator consumes. Both are producers this crate never constructs
//! itself — a front end and a linker do — but it must agree on their
//! shape.

pub mod testing;

use crate::ir::instructions::{FloatCondition, IntCondition};
use crate::value::Value;

/// A source line-table entry id, opaque to this crate; carried through to
/// `MachineCodeBuilder::set_source_code_location` unexamined.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SourceCodeLocation(pub i32);

/// The sink a completed code buffer delivers bytes and fixups to, in the
/// fixed call order: one `prepare_code`, any number
/// of `emit_code` calls whose lengths sum to the prepared size, any number
/// of `set_*` calls (order matches occurrence in the code buffer, not
/// grouped by kind), then exactly one `finish_code`.
///
/// Two implementations exist in this crate: `binemit` drives a real one to
/// produce a loadable image, and `api::testing::RecordingBuilder` drives a
/// fake one so tests can assert on the call sequence without a linker.
pub trait MachineCodeBuilder {
    /// Reserves `code_length` bytes for the whole function's code image.
    fn prepare_code(&mut self, code_length: usize);

    /// Appends `codes` to the image; the concatenation of every call this
    /// function receives is the full code image.
    fn emit_code(&mut self, codes: &[u8]);

    /// No further calls follow.
    fn finish_code(&mut self);

    /// At `offset`, the 4-byte relative displacement is a call to the
    /// named external symbol.
    fn set_call_site(&mut self, offset: usize, name: &str);

    /// At `offset`, the 4-byte relative displacement targets
    /// `target_offset` within this same code image.
    fn set_code_offset(&mut self, offset: usize, target_offset: usize);

    fn set_float32(&mut self, offset: usize, value: f32);
    fn set_float64(&mut self, offset: usize, value: f64);
    fn set_int32(&mut self, offset: usize, value: i32);
    fn set_int64(&mut self, offset: usize, value: i64);

    /// At `offset`, write (or refer to) a string constant as UTF-16 code
    /// units, matching the wire format a linker expects for a string
    /// literal section.
    fn set_string(&mut self, offset: usize, utf16_bytes: &[u16]);

    fn set_source_code_location(&mut self, offset: usize, location: SourceCodeLocation);
}

/// Identifies one node of a `Schedule`; stable for the schedule's lifetime.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// The opcode of one scheduled HIR node. Block-start nodes
/// (`Entry`/`Merge`/`Loop`) each open a LIR block; block-end nodes
/// (`Jump`/`If`/`Ret`/`Exit`) each close one. Everything else is a plain
/// data or effect node.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HirOpcode {
    // Block-start.
    Entry,
    Merge,
    Loop,
    // Block-end.
    Jump,
    If,
    Ret,
    Exit,
    // Data.
    Phi,
    Parameter,
    IntLiteral,
    Float32Literal,
    Float64Literal,
    StringLiteral,
    /// `sizeof(T)`, already resolved by the front end to an integer
    /// immediate equal to the byte size of `T`.
    SizeOf,
    Void,
    IntAdd,
    IntSub,
    IntMul,
    IntDiv,
    IntMod,
    UIntDiv,
    UIntMod,
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
    Cmp(IntCondition),
    FloatCmp(FloatCondition),
    SignExtend,
    ZeroExtend,
    Load,
    Store,
    /// Single-dimension array element access (`array[index]`); see
    /// `NodePayload::ElementSize`. Multi-dimensional element access has no
    /// lowering — the translator surfaces `CodegenError::UnsupportedHir`
    /// rather than inventing one.
    Element,
    Length,
    Call,
    /// Reads the fixed return-value register(s) after a preceding `Call`.
    GetData,
}

/// Payload carried by a literal or parameter node, keyed by `NodeId` in
/// `Schedule::literal`.
#[derive(Clone, Debug, PartialEq)]
pub enum NodePayload {
    Int(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    /// 0-based parameter position, for `HirOpcode::Parameter` nodes.
    ParameterIndex(i32),
    /// Element byte size, for `HirOpcode::Element` nodes.
    ElementSize(i32),
}

/// One node of a scheduled HIR graph.
///
/// `inputs` holds plain data/effect dependencies in opcode-defined order
/// (e.g. `IntAdd`'s `[left, right]`); control-transfer targets are *not*
/// inputs, since a target is a block-start node the translator has
/// already placed rather than a value the node computes from. Those live
/// in `targets`, again in an opcode-defined order: `Jump`/`Loop`-edge
/// nodes carry one target, `If` carries `[true_target, false_target]`,
/// `Phi` pairs up with its own `inputs` position-for-position (the
/// predecessor block-start node for `inputs[i]` is `targets[i]`).
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduleNode {
    pub opcode: HirOpcode,
    pub ty: Value,
    pub inputs: Vec<NodeId>,
    pub targets: Vec<NodeId>,
    pub payload: Option<NodePayload>,
}

impl ScheduleNode {
    pub fn new(opcode: HirOpcode, ty: Value) -> ScheduleNode {
        ScheduleNode { opcode, ty, inputs: Vec::new(), targets: Vec::new(), payload: None }
    }

    pub fn with_inputs(mut self, inputs: Vec<NodeId>) -> ScheduleNode {
        self.inputs = inputs;
        self
    }

    pub fn with_targets(mut self, targets: Vec<NodeId>) -> ScheduleNode {
        self.targets = targets;
        self
    }

    pub fn with_payload(mut self, payload: NodePayload) -> ScheduleNode {
        self.payload = Some(payload);
        self
    }
}

/// A total order on HIR nodes: every node appears after all of its
/// inputs, and a block-start node appears before every node whose block
/// it starts.
#[derive(Default)]
pub struct Schedule {
    nodes: Vec<ScheduleNode>,
}

impl Schedule {
    pub fn new() -> Schedule {
        Schedule::default()
    }

    pub fn push(&mut self, node: ScheduleNode) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: NodeId) -> &ScheduleNode {
        &self.nodes[id.0 as usize]
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn pushed_nodes_keep_insertion_order() {
        let mut schedule = Schedule::new();
        let entry = schedule.push(ScheduleNode::new(HirOpcode::Entry, Value::int_ptr_type()));
        let exit = schedule.push(ScheduleNode::new(HirOpcode::Exit, Value::int_ptr_type()));
        assert_eq!(entry, NodeId(0));
        assert_eq!(exit, NodeId(1));
        assert_eq!(schedule.node(entry).opcode, HirOpcode::Entry);
    }
}
