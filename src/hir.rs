//! Typed strict-SSA intermediate representation.
//!
//! Functions are flat instruction lists over id-indexed value and label
//! arenas. Every opcode carries static [`OpcodeInfo`] with a packed 4-slot
//! signature describing what each operand slot holds; backends drive their
//! lowering entirely off that table.

mod builder;
mod instr;
mod opcode;
mod value;

pub use builder::FunctionBuilder;
pub use instr::{
    HirFunction, Instr, Label, LabelId, Operand, ARITHMETIC_SET_CARRY, ARITHMETIC_UNSIGNED,
    CALL_TAIL,
};
pub use opcode::{sig_dest, sig_src1, sig_src2, sig_src3, Opcode, OpcodeFlags, OpcodeInfo, SigType};
pub use value::{Value, ValueFlags, ValueId, ValueType, MAX_TYPENAME};
