//! Opcode enumeration and static metadata.

use bitflags::bitflags;

bitflags! {
    /// Static per-opcode flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpcodeFlags: u16 {
        /// Operands may be reassociated by backends.
        const COMMUTATIVE = 1 << 0;
        /// Control flow leaves the instruction stream.
        const TERMINATOR = 1 << 1;
    }
}

/// What an operand slot of an instruction holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SigType {
    /// Nothing.
    X = 0,
    /// A jump label.
    L = 1,
    /// A 64-bit offset immediate.
    O = 2,
    /// A symbol (function) reference.
    S = 3,
    /// An SSA value.
    V = 4,
}

const fn sig(d: SigType, s1: SigType, s2: SigType, s3: SigType) -> u16 {
    d as u16 | ((s1 as u16) << 4) | ((s2 as u16) << 8) | ((s3 as u16) << 12)
}

const fn sig_at(signature: u16, slot: u32) -> SigType {
    match (signature >> (slot * 4)) & 0xF {
        0 => SigType::X,
        1 => SigType::L,
        2 => SigType::O,
        3 => SigType::S,
        _ => SigType::V,
    }
}

/// Signature slot for the destination.
pub const fn sig_dest(signature: u16) -> SigType {
    sig_at(signature, 0)
}

/// Signature slot for src1.
pub const fn sig_src1(signature: u16) -> SigType {
    sig_at(signature, 1)
}

/// Signature slot for src2.
pub const fn sig_src2(signature: u16) -> SigType {
    sig_at(signature, 2)
}

/// Signature slot for src3.
pub const fn sig_src3(signature: u16) -> SigType {
    sig_at(signature, 3)
}

/// Static metadata for one opcode.
#[derive(Debug, Clone, Copy)]
pub struct OpcodeInfo {
    /// The opcode this entry describes.
    pub num: Opcode,
    /// Lowercase mnemonic for traces.
    pub name: &'static str,
    /// Static flags.
    pub flags: OpcodeFlags,
    /// Packed 4-nibble signature: dest, src1, src2, src3.
    pub signature: u16,
}

macro_rules! opcodes {
    ($( $variant:ident => $name:literal, $flags:expr, ($d:ident, $s1:ident, $s2:ident, $s3:ident); )*) => {
        /// HIR opcode set.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
        #[allow(missing_docs)] // names mirror the mnemonic table below
        #[repr(u16)]
        pub enum Opcode {
            $( $variant, )*
        }

        /// Static metadata table, indexed by `Opcode as usize`.
        static OPCODE_INFO: &[OpcodeInfo] = &[
            $( OpcodeInfo {
                num: Opcode::$variant,
                name: $name,
                flags: $flags,
                signature: sig(SigType::$d, SigType::$s1, SigType::$s2, SigType::$s3),
            }, )*
        ];

        impl Opcode {
            /// Static metadata for this opcode.
            pub fn info(self) -> &'static OpcodeInfo {
                &OPCODE_INFO[self as usize]
            }
        }
    };
}

use OpcodeFlags as F;

const NONE: OpcodeFlags = F::empty();
const COMM: OpcodeFlags = F::COMMUTATIVE;
const TERM: OpcodeFlags = F::TERMINATOR;

opcodes! {
    Comment          => "comment",              NONE, (X, O, X, X);
    Nop              => "nop",                  NONE, (X, X, X, X);
    SourceOffset     => "source_offset",        NONE, (X, O, X, X);
    DebugBreak       => "debug_break",          NONE, (X, X, X, X);
    DebugBreakTrue   => "debug_break_true",     NONE, (X, V, X, X);
    Trap             => "trap",                 NONE, (X, X, X, X);
    TrapTrue         => "trap_true",            NONE, (X, V, X, X);
    Call             => "call",                 NONE, (X, S, X, X);
    CallTrue         => "call_true",            NONE, (X, V, S, X);
    CallIndirect     => "call_indirect",        NONE, (X, V, X, X);
    CallIndirectTrue => "call_indirect_true",   NONE, (X, V, V, X);
    Return           => "return",               TERM, (X, X, X, X);
    ReturnTrue       => "return_true",          NONE, (X, V, X, X);
    Branch           => "branch",               TERM, (X, L, X, X);
    BranchIf         => "branch_if",            TERM, (X, V, L, L);
    BranchTrue       => "branch_true",          NONE, (X, V, L, X);
    BranchFalse      => "branch_false",         NONE, (X, V, L, X);
    Assign           => "assign",               NONE, (V, V, X, X);
    Cast             => "cast",                 NONE, (V, V, X, X);
    ZeroExtend       => "zero_extend",          NONE, (V, V, X, X);
    SignExtend       => "sign_extend",          NONE, (V, V, X, X);
    Truncate         => "truncate",             NONE, (V, V, X, X);
    Convert          => "convert",              NONE, (V, V, X, X);
    VectorConvertI2F => "vector_convert_i2f",   NONE, (V, V, X, X);
    VectorConvertF2I => "vector_convert_f2i",   NONE, (V, V, X, X);
    LoadContext      => "load_context",         NONE, (V, O, X, X);
    StoreContext     => "store_context",        NONE, (X, O, V, X);
    Load             => "load",                 NONE, (V, V, X, X);
    Store            => "store",                NONE, (X, V, V, X);
    Prefetch         => "prefetch",             NONE, (X, V, O, X);
    Max              => "max",                  NONE, (V, V, V, X);
    Min              => "min",                  NONE, (V, V, V, X);
    Select           => "select",               NONE, (V, V, V, V);
    IsTrue           => "is_true",              NONE, (V, V, X, X);
    IsFalse          => "is_false",             NONE, (V, V, X, X);
    CompareEq        => "compare_eq",           COMM, (V, V, V, X);
    CompareNe        => "compare_ne",           COMM, (V, V, V, X);
    CompareSlt       => "compare_slt",          NONE, (V, V, V, X);
    CompareSle       => "compare_sle",          NONE, (V, V, V, X);
    CompareSgt       => "compare_sgt",          NONE, (V, V, V, X);
    CompareSge       => "compare_sge",          NONE, (V, V, V, X);
    CompareUlt       => "compare_ult",          NONE, (V, V, V, X);
    CompareUle       => "compare_ule",          NONE, (V, V, V, X);
    CompareUgt       => "compare_ugt",          NONE, (V, V, V, X);
    CompareUge       => "compare_uge",          NONE, (V, V, V, X);
    DidCarry         => "did_carry",            NONE, (V, V, X, X);
    DidOverflow      => "did_overflow",         NONE, (V, V, X, X);
    VectorCompareEq  => "vector_compare_eq",    COMM, (V, V, V, X);
    VectorCompareSgt => "vector_compare_sgt",   NONE, (V, V, V, X);
    VectorCompareSge => "vector_compare_sge",   NONE, (V, V, V, X);
    VectorCompareUgt => "vector_compare_ugt",   NONE, (V, V, V, X);
    VectorCompareUge => "vector_compare_uge",   NONE, (V, V, V, X);
    Add              => "add",                  COMM, (V, V, V, X);
    AddCarry         => "add_carry",            NONE, (V, V, V, V);
    Sub              => "sub",                  NONE, (V, V, V, X);
    Mul              => "mul",                  COMM, (V, V, V, X);
    MulHi            => "mul_hi",               COMM, (V, V, V, X);
    Div              => "div",                  NONE, (V, V, V, X);
    MulAdd           => "mul_add",              NONE, (V, V, V, V);
    MulSub           => "mul_sub",              NONE, (V, V, V, V);
    Neg              => "neg",                  NONE, (V, V, X, X);
    Abs              => "abs",                  NONE, (V, V, X, X);
    Sqrt             => "sqrt",                 NONE, (V, V, X, X);
    Rsqrt            => "rsqrt",                NONE, (V, V, X, X);
    DotProduct3      => "dot_product_3",        NONE, (V, V, V, X);
    DotProduct4      => "dot_product_4",        NONE, (V, V, V, X);
    And              => "and",                  COMM, (V, V, V, X);
    Or               => "or",                   COMM, (V, V, V, X);
    Xor              => "xor",                  COMM, (V, V, V, X);
    Not              => "not",                  NONE, (V, V, X, X);
    Shl              => "shl",                  NONE, (V, V, V, X);
    VectorShl        => "vector_shl",           NONE, (V, V, V, X);
    Shr              => "shr",                  NONE, (V, V, V, X);
    VectorShr        => "vector_shr",           NONE, (V, V, V, X);
    Sha              => "sha",                  NONE, (V, V, V, X);
    VectorSha        => "vector_sha",           NONE, (V, V, V, X);
    RotateLeft       => "rotate_left",          NONE, (V, V, V, X);
    ByteSwap         => "byte_swap",            NONE, (V, V, X, X);
    Cntlz            => "cntlz",                NONE, (V, V, X, X);
    Insert           => "insert",               NONE, (V, V, V, V);
    Extract          => "extract",              NONE, (V, V, V, X);
    Splat            => "splat",                NONE, (V, V, X, X);
    Permute          => "permute",              NONE, (V, V, V, V);
    Swizzle          => "swizzle",              NONE, (V, V, X, X);
    Pack             => "pack",                 NONE, (V, V, X, X);
    Unpack           => "unpack",               NONE, (V, V, X, X);
    CompareExchange  => "compare_exchange",     NONE, (V, V, V, V);
    AtomicExchange   => "atomic_exchange",      NONE, (V, V, V, X);
    AtomicAdd        => "atomic_add",           NONE, (V, V, V, X);
    AtomicSub        => "atomic_sub",           NONE, (V, V, V, X);
    LoadVectorShl    => "load_vector_shl",      NONE, (V, V, X, X);
    LoadVectorShr    => "load_vector_shr",      NONE, (V, V, X, X);
    LoadClock        => "load_clock",           NONE, (V, X, X, X);
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn info_table_is_aligned_with_the_enum() {
        for op in Opcode::iter() {
            assert_eq!(op.info().num, op, "metadata row out of order for {op:?}");
        }
    }

    #[test]
    fn signatures_unpack() {
        let s = Opcode::Store.info().signature;
        assert_eq!(sig_dest(s), SigType::X);
        assert_eq!(sig_src1(s), SigType::V);
        assert_eq!(sig_src2(s), SigType::V);
        assert_eq!(sig_src3(s), SigType::X);

        let s = Opcode::Call.info().signature;
        assert_eq!(sig_src1(s), SigType::S);

        let s = Opcode::BranchIf.info().signature;
        assert_eq!(sig_src2(s), SigType::L);
        assert_eq!(sig_src3(s), SigType::L);
    }

    #[test]
    fn commutativity_marks() {
        assert!(Opcode::Add.info().flags.contains(OpcodeFlags::COMMUTATIVE));
        assert!(!Opcode::Sub.info().flags.contains(OpcodeFlags::COMMUTATIVE));
    }
}
