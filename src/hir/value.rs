//! SSA values.

use bitflags::bitflags;

use crate::vec128::Vec128;

/// Number of value types; handler tables in the backends are this wide.
pub const MAX_TYPENAME: usize = 7;

/// Type of an SSA value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ValueType {
    /// 8-bit integer.
    I8 = 0,
    /// 16-bit integer.
    I16 = 1,
    /// 32-bit integer.
    I32 = 2,
    /// 64-bit integer.
    I64 = 3,
    /// 32-bit float.
    F32 = 4,
    /// 64-bit float.
    F64 = 5,
    /// 128-bit vector.
    V128 = 6,
}

impl ValueType {
    /// Width in bits for the integer types (128 for V128).
    pub const fn bits(self) -> u32 {
        match self {
            ValueType::I8 => 8,
            ValueType::I16 => 16,
            ValueType::I32 => 32,
            ValueType::I64 => 64,
            ValueType::F32 => 32,
            ValueType::F64 => 64,
            ValueType::V128 => 128,
        }
    }

    /// Whether this is one of the integer types.
    pub const fn is_int(self) -> bool {
        matches!(self, ValueType::I8 | ValueType::I16 | ValueType::I32 | ValueType::I64)
    }
}

bitflags! {
    /// Per-value flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ValueFlags: u8 {
        /// The value is a compile-time constant; `constant` is immutable.
        const CONSTANT = 1 << 0;
    }
}

/// Index of a value within its function's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueId(pub u32);

/// A typed SSA value.
///
/// `tag` is backend scratch: zero means unassigned; the interpreter stores
/// its register slot plus one so slot zero remains distinguishable.
#[derive(Debug, Clone)]
pub struct Value {
    /// Value type.
    pub ty: ValueType,
    /// Flags; once `CONSTANT` is set the payload never changes.
    pub flags: ValueFlags,
    /// Constant payload, meaningful only when `CONSTANT` is set. Scalar
    /// constants occupy the low lanes of the vector cell.
    pub constant: Vec128,
    /// Backend scratch.
    pub tag: u32,
}

impl Value {
    pub(crate) fn new(ty: ValueType) -> Self {
        Self {
            ty,
            flags: ValueFlags::empty(),
            constant: Vec128::ZERO,
            tag: 0,
        }
    }

    pub(crate) fn constant(ty: ValueType, payload: Vec128) -> Self {
        Self {
            ty,
            flags: ValueFlags::CONSTANT,
            constant: payload,
            tag: 0,
        }
    }

    /// Whether this value is a compile-time constant.
    pub fn is_constant(&self) -> bool {
        self.flags.contains(ValueFlags::CONSTANT)
    }

    /// Whether this is a constant equal to zero in its type.
    pub fn is_constant_zero(&self) -> bool {
        self.is_constant()
            && match self.ty {
                ValueType::V128 => self.constant == Vec128::ZERO,
                _ => self.as_u64() == 0,
            }
    }

    /// The constant zero-extended to 64 bits (float types: raw bits).
    pub fn as_u64(&self) -> u64 {
        match self.ty {
            ValueType::I8 => self.constant.u8(0) as u64,
            ValueType::I16 => self.constant.u16(0) as u64,
            ValueType::I32 | ValueType::F32 => self.constant.u32(0) as u64,
            ValueType::I64 | ValueType::F64 => self.constant.low(),
            ValueType::V128 => self.constant.low(),
        }
    }

    /// The constant sign-extended to 64 bits.
    pub fn as_i64(&self) -> i64 {
        match self.ty {
            ValueType::I8 => self.constant.u8(0) as i8 as i64,
            ValueType::I16 => self.constant.u16(0) as i16 as i64,
            ValueType::I32 => self.constant.u32(0) as i32 as i64,
            _ => self.as_u64() as i64,
        }
    }

    /// The constant as `f32`.
    pub fn as_f32(&self) -> f32 {
        self.constant.f32(0)
    }

    /// The constant as `f64`.
    pub fn as_f64(&self) -> f64 {
        f64::from_bits(self.constant.low())
    }
}
