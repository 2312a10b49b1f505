//! Instructions, operands, labels, and the function container.

use std::sync::Arc;

use crate::hir::{Opcode, Value, ValueId};
use crate::runtime::FunctionInfo;

/// `CALL`/`CALL_INDIRECT` flag: tear down the frame and jump.
pub const CALL_TAIL: u16 = 1 << 0;

/// Arithmetic flag: record the carry-out in the thread's carry cell.
pub const ARITHMETIC_SET_CARRY: u16 = 1 << 1;

/// Arithmetic flag: treat operands as unsigned (`MUL_HI`).
pub const ARITHMETIC_UNSIGNED: u16 = 1 << 2;

/// Index of a label within its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelId(pub u32);

/// A jump target.
///
/// `tag` belongs to the active backend during lowering: the high bit means
/// "assigned", the low bits carry the backend address. Unresolved forward
/// references are tracked by the backend itself and patched once the whole
/// function is lowered.
#[derive(Debug, Clone)]
pub struct Label {
    /// Index of the instruction this label anchors to, once marked.
    pub instr_index: Option<u32>,
    /// Backend scratch; high bit set means assigned.
    pub tag: u32,
}

/// One operand slot.
#[derive(Debug, Clone, Default)]
pub enum Operand {
    /// Empty slot.
    #[default]
    None,
    /// An SSA value.
    Value(ValueId),
    /// A jump label.
    Label(LabelId),
    /// A 64-bit immediate (context offsets, source offsets).
    Offset(u64),
    /// A function symbol for direct calls.
    Symbol(Arc<FunctionInfo>),
}

impl Operand {
    /// The value id, panicking if the slot holds something else.
    pub fn value(&self) -> ValueId {
        match self {
            Operand::Value(v) => *v,
            other => panic!("operand is not a value: {other:?}"),
        }
    }

    /// The label id, panicking if the slot holds something else.
    pub fn label(&self) -> LabelId {
        match self {
            Operand::Label(l) => *l,
            other => panic!("operand is not a label: {other:?}"),
        }
    }

    /// The offset immediate, panicking if the slot holds something else.
    pub fn offset(&self) -> u64 {
        match self {
            Operand::Offset(o) => *o,
            other => panic!("operand is not an offset: {other:?}"),
        }
    }

    /// The symbol, panicking if the slot holds something else.
    pub fn symbol(&self) -> &Arc<FunctionInfo> {
        match self {
            Operand::Symbol(s) => s,
            other => panic!("operand is not a symbol: {other:?}"),
        }
    }
}

/// One HIR instruction.
#[derive(Debug, Clone)]
pub struct Instr {
    /// The opcode.
    pub opcode: Opcode,
    /// Opcode-specific modifiers: `CALL_TAIL`, `ARITHMETIC_*`, a vector
    /// element type, or a swizzle control byte.
    pub flags: u16,
    /// Destination value, present iff the signature says so.
    pub dest: Option<ValueId>,
    /// First operand.
    pub src1: Operand,
    /// Second operand.
    pub src2: Operand,
    /// Third operand.
    pub src3: Operand,
}

/// A translated function's HIR: flat instruction list over value and label
/// arenas, plus the side table for comment text.
#[derive(Debug, Default)]
pub struct HirFunction {
    pub(crate) values: Vec<Value>,
    pub(crate) instrs: Vec<Instr>,
    pub(crate) labels: Vec<Label>,
    pub(crate) comments: Vec<Box<str>>,
}

impl HirFunction {
    /// The instruction list.
    pub fn instrs(&self) -> &[Instr] {
        &self.instrs
    }

    /// One value.
    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id.0 as usize]
    }

    /// Mutable access for backend tag writes.
    pub(crate) fn value_mut(&mut self, id: ValueId) -> &mut Value {
        &mut self.values[id.0 as usize]
    }

    /// One label.
    pub fn label(&self, id: LabelId) -> &Label {
        &self.labels[id.0 as usize]
    }

    /// Mutable access for backend tag writes.
    pub(crate) fn label_mut(&mut self, id: LabelId) -> &mut Label {
        &mut self.labels[id.0 as usize]
    }

    /// All labels.
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// Comment text by side-table index.
    pub fn comment(&self, index: u64) -> &str {
        &self.comments[index as usize]
    }

    /// Resets backend scratch tags so another backend can lower the same
    /// function.
    pub fn reset_tags(&mut self) {
        for v in &mut self.values {
            v.tag = 0;
        }
        for l in &mut self.labels {
            l.tag = 0;
        }
    }
}
