//! Function builder with build-time constant folding.
//!
//! Every arithmetic/logical constructor first checks whether all inputs are
//! constants and, if so, materializes the folded result directly instead of
//! emitting the instruction. This stands in for a separate optimizer pass.

use std::sync::Arc;

use crate::hir::instr::{HirFunction, Instr, Label, LabelId, Operand};
use crate::hir::opcode::Opcode;
use crate::hir::value::{Value, ValueId, ValueType};
use crate::hir::ARITHMETIC_UNSIGNED;
use crate::runtime::FunctionInfo;
use crate::vec128::Vec128;

/// Types that can be loaded as HIR constants.
pub trait IntoConstant {
    /// The value type of the constant.
    const TYPE: ValueType;
    /// The 128-bit payload (scalars occupy the low lanes).
    fn payload(self) -> Vec128;
}

macro_rules! scalar_constant {
    ($($t:ty => $ty:ident, $conv:ty;)*) => {
        $(impl IntoConstant for $t {
            const TYPE: ValueType = ValueType::$ty;
            fn payload(self) -> Vec128 {
                Vec128::from_u64x2(self as $conv as u64, 0)
            }
        })*
    };
}

scalar_constant! {
    i8 => I8, u8;
    u8 => I8, u8;
    i16 => I16, u16;
    u16 => I16, u16;
    i32 => I32, u32;
    u32 => I32, u32;
    i64 => I64, u64;
    u64 => I64, u64;
}

impl IntoConstant for f32 {
    const TYPE: ValueType = ValueType::F32;
    fn payload(self) -> Vec128 {
        Vec128::from_u64x2(self.to_bits() as u64, 0)
    }
}

impl IntoConstant for f64 {
    const TYPE: ValueType = ValueType::F64;
    fn payload(self) -> Vec128 {
        Vec128::from_u64x2(self.to_bits(), 0)
    }
}

impl IntoConstant for Vec128 {
    const TYPE: ValueType = ValueType::V128;
    fn payload(self) -> Vec128 {
        self
    }
}

fn trunc(bits: u32, v: u64) -> u64 {
    if bits >= 64 {
        v
    } else {
        v & ((1u64 << bits) - 1)
    }
}

fn sext(bits: u32, v: u64) -> i64 {
    let shift = 64 - bits;
    ((v << shift) as i64) >> shift
}

/// Builds one function's HIR.
#[derive(Debug, Default)]
pub struct FunctionBuilder {
    f: HirFunction,
}

impl FunctionBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Finishes the function.
    pub fn finish(self) -> HirFunction {
        self.f
    }

    /// The function built so far (tests inspect emitted instructions).
    pub fn hir(&self) -> &HirFunction {
        &self.f
    }

    /// Looks up a value.
    pub fn value(&self, id: ValueId) -> &Value {
        self.f.value(id)
    }

    fn alloc(&mut self, ty: ValueType) -> ValueId {
        let id = ValueId(self.f.values.len() as u32);
        self.f.values.push(Value::new(ty));
        id
    }

    fn alloc_constant(&mut self, ty: ValueType, payload: Vec128) -> ValueId {
        let id = ValueId(self.f.values.len() as u32);
        self.f.values.push(Value::constant(ty, payload));
        id
    }

    fn push(&mut self, instr: Instr) {
        self.f.instrs.push(instr);
    }

    fn emit(
        &mut self,
        opcode: Opcode,
        flags: u16,
        dest: Option<ValueId>,
        src1: Operand,
        src2: Operand,
        src3: Operand,
    ) {
        self.push(Instr {
            opcode,
            flags,
            dest,
            src1,
            src2,
            src3,
        });
    }

    fn unary(&mut self, opcode: Opcode, flags: u16, ty: ValueType, a: ValueId) -> ValueId {
        let dest = self.alloc(ty);
        self.emit(opcode, flags, Some(dest), Operand::Value(a), Operand::None, Operand::None);
        dest
    }

    fn binary(
        &mut self,
        opcode: Opcode,
        flags: u16,
        ty: ValueType,
        a: ValueId,
        b: ValueId,
    ) -> ValueId {
        let dest = self.alloc(ty);
        self.emit(
            opcode,
            flags,
            Some(dest),
            Operand::Value(a),
            Operand::Value(b),
            Operand::None,
        );
        dest
    }

    fn ternary(
        &mut self,
        opcode: Opcode,
        flags: u16,
        ty: ValueType,
        a: ValueId,
        b: ValueId,
        c: ValueId,
    ) -> ValueId {
        let dest = self.alloc(ty);
        self.emit(
            opcode,
            flags,
            Some(dest),
            Operand::Value(a),
            Operand::Value(b),
            Operand::Value(c),
        );
        dest
    }

    // Folding helpers. `f` sees operands zero-extended to u64 and must
    // return the raw result; the width is re-applied on store.

    fn both_const(&self, a: ValueId, b: ValueId) -> bool {
        self.f.value(a).is_constant() && self.f.value(b).is_constant()
    }

    fn fold_int2(&mut self, ty: ValueType, a: ValueId, b: ValueId, f: impl Fn(u64, u64) -> u64) -> ValueId {
        let av = self.f.value(a).as_u64();
        let bv = self.f.value(b).as_u64();
        let r = trunc(ty.bits(), f(av, bv));
        self.alloc_constant(ty, Vec128::from_u64x2(r, 0))
    }

    fn fold_int1(&mut self, ty: ValueType, a: ValueId, f: impl Fn(u64) -> u64) -> ValueId {
        let av = self.f.value(a).as_u64();
        let r = trunc(ty.bits(), f(av));
        self.alloc_constant(ty, Vec128::from_u64x2(r, 0))
    }

    fn fold_float2(&mut self, ty: ValueType, a: ValueId, b: ValueId, f: impl Fn(f64, f64) -> f64) -> ValueId {
        let (av, bv) = if ty == ValueType::F32 {
            (self.f.value(a).as_f32() as f64, self.f.value(b).as_f32() as f64)
        } else {
            (self.f.value(a).as_f64(), self.f.value(b).as_f64())
        };
        let r = f(av, bv);
        let payload = if ty == ValueType::F32 {
            Vec128::from_u64x2((r as f32).to_bits() as u64, 0)
        } else {
            Vec128::from_u64x2(r.to_bits(), 0)
        };
        self.alloc_constant(ty, payload)
    }

    // Labels.

    /// Allocates a fresh, unmarked label.
    pub fn new_label(&mut self) -> LabelId {
        let id = LabelId(self.f.labels.len() as u32);
        self.f.labels.push(Label {
            instr_index: None,
            tag: 0,
        });
        id
    }

    /// Anchors `label` at the next emitted instruction.
    pub fn mark_label(&mut self, label: LabelId) {
        let index = self.f.instrs.len() as u32;
        self.f.labels[label.0 as usize].instr_index = Some(index);
    }

    // Misc.

    /// Emits a translation comment.
    pub fn comment(&mut self, text: impl Into<String>) {
        let index = self.f.comments.len() as u64;
        self.f.comments.push(text.into().into_boxed_str());
        self.emit(
            Opcode::Comment,
            0,
            None,
            Operand::Offset(index),
            Operand::None,
            Operand::None,
        );
    }

    /// Records the guest address the next instructions translate.
    pub fn source_offset(&mut self, address: u64) {
        self.emit(
            Opcode::SourceOffset,
            0,
            None,
            Operand::Offset(address),
            Operand::None,
            Operand::None,
        );
    }

    /// No-op.
    pub fn nop(&mut self) {
        self.emit(Opcode::Nop, 0, None, Operand::None, Operand::None, Operand::None);
    }

    /// Unconditional debug break.
    pub fn debug_break(&mut self) {
        self.emit(Opcode::DebugBreak, 0, None, Operand::None, Operand::None, Operand::None);
    }

    /// Debug break when `cond` is truthy.
    pub fn debug_break_true(&mut self, cond: ValueId) {
        self.emit(
            Opcode::DebugBreakTrue,
            0,
            None,
            Operand::Value(cond),
            Operand::None,
            Operand::None,
        );
    }

    /// Unconditional trap.
    pub fn trap(&mut self) {
        self.emit(Opcode::Trap, 0, None, Operand::None, Operand::None, Operand::None);
    }

    /// Trap when `cond` is truthy.
    pub fn trap_true(&mut self, cond: ValueId) {
        self.emit(
            Opcode::TrapTrue,
            0,
            None,
            Operand::Value(cond),
            Operand::None,
            Operand::None,
        );
    }

    // Calls and branches.

    /// Direct call to a declared symbol.
    pub fn call(&mut self, symbol: Arc<FunctionInfo>, flags: u16) {
        self.emit(
            Opcode::Call,
            flags,
            None,
            Operand::Symbol(symbol),
            Operand::None,
            Operand::None,
        );
    }

    /// Direct call when `cond` is truthy.
    pub fn call_true(&mut self, cond: ValueId, symbol: Arc<FunctionInfo>, flags: u16) {
        self.emit(
            Opcode::CallTrue,
            flags,
            None,
            Operand::Value(cond),
            Operand::Symbol(symbol),
            Operand::None,
        );
    }

    /// Indirect call through a guest address value.
    pub fn call_indirect(&mut self, target: ValueId, flags: u16) {
        self.emit(
            Opcode::CallIndirect,
            flags,
            None,
            Operand::Value(target),
            Operand::None,
            Operand::None,
        );
    }

    /// Indirect call when `cond` is truthy.
    pub fn call_indirect_true(&mut self, cond: ValueId, target: ValueId, flags: u16) {
        self.emit(
            Opcode::CallIndirectTrue,
            flags,
            None,
            Operand::Value(cond),
            Operand::Value(target),
            Operand::None,
        );
    }

    /// Function return.
    pub fn return_(&mut self) {
        self.emit(Opcode::Return, 0, None, Operand::None, Operand::None, Operand::None);
    }

    /// Return when `cond` is truthy.
    pub fn return_true(&mut self, cond: ValueId) {
        self.emit(
            Opcode::ReturnTrue,
            0,
            None,
            Operand::Value(cond),
            Operand::None,
            Operand::None,
        );
    }

    /// Unconditional branch.
    pub fn branch(&mut self, label: LabelId) {
        self.emit(Opcode::Branch, 0, None, Operand::Label(label), Operand::None, Operand::None);
    }

    /// Branch when `cond` is truthy.
    pub fn branch_true(&mut self, cond: ValueId, label: LabelId) {
        self.emit(
            Opcode::BranchTrue,
            0,
            None,
            Operand::Value(cond),
            Operand::Label(label),
            Operand::None,
        );
    }

    /// Branch when `cond` is falsy.
    pub fn branch_false(&mut self, cond: ValueId, label: LabelId) {
        self.emit(
            Opcode::BranchFalse,
            0,
            None,
            Operand::Value(cond),
            Operand::Label(label),
            Operand::None,
        );
    }

    /// Two-way branch.
    pub fn branch_if(&mut self, cond: ValueId, if_true: LabelId, if_false: LabelId) {
        self.emit(
            Opcode::BranchIf,
            0,
            None,
            Operand::Value(cond),
            Operand::Label(if_true),
            Operand::Label(if_false),
        );
    }

    // Constants and conversions.

    /// Loads a typed constant.
    pub fn load_constant<T: IntoConstant>(&mut self, v: T) -> ValueId {
        self.alloc_constant(T::TYPE, v.payload())
    }

    /// The zero of `ty`.
    pub fn load_zero(&mut self, ty: ValueType) -> ValueId {
        self.alloc_constant(ty, Vec128::ZERO)
    }

    /// Copy.
    pub fn assign(&mut self, a: ValueId) -> ValueId {
        let ty = self.f.value(a).ty;
        if self.f.value(a).is_constant() {
            return a;
        }
        self.unary(Opcode::Assign, 0, ty, a)
    }

    /// Bit-reinterpreting cast.
    pub fn cast(&mut self, a: ValueId, ty: ValueType) -> ValueId {
        if self.f.value(a).ty == ty {
            return a;
        }
        self.unary(Opcode::Cast, 0, ty, a)
    }

    /// Zero extension.
    pub fn zero_extend(&mut self, a: ValueId, ty: ValueType) -> ValueId {
        let src = self.f.value(a);
        if src.ty == ty {
            return a;
        }
        if src.is_constant() {
            let v = src.as_u64();
            return self.fold_int1(ty, a, |_| v);
        }
        self.unary(Opcode::ZeroExtend, 0, ty, a)
    }

    /// Sign extension.
    pub fn sign_extend(&mut self, a: ValueId, ty: ValueType) -> ValueId {
        let src = self.f.value(a);
        if src.ty == ty {
            return a;
        }
        if src.is_constant() {
            let v = src.as_i64() as u64;
            return self.fold_int1(ty, a, |_| v);
        }
        self.unary(Opcode::SignExtend, 0, ty, a)
    }

    /// Truncation to a narrower integer type.
    pub fn truncate(&mut self, a: ValueId, ty: ValueType) -> ValueId {
        let src = self.f.value(a);
        if src.ty == ty {
            return a;
        }
        if src.is_constant() {
            let v = src.as_u64();
            return self.fold_int1(ty, a, |_| v);
        }
        self.unary(Opcode::Truncate, 0, ty, a)
    }

    /// Numeric int/float conversion.
    pub fn convert(&mut self, a: ValueId, ty: ValueType) -> ValueId {
        if self.f.value(a).ty == ty {
            return a;
        }
        self.unary(Opcode::Convert, 0, ty, a)
    }

    /// Per-lane I32 → F32 conversion (flags: `ARITHMETIC_UNSIGNED`).
    pub fn vector_convert_i2f(&mut self, a: ValueId, flags: u16) -> ValueId {
        self.unary(Opcode::VectorConvertI2F, flags, ValueType::V128, a)
    }

    /// Per-lane F32 → I32 conversion (flags: `ARITHMETIC_UNSIGNED`).
    pub fn vector_convert_f2i(&mut self, a: ValueId, flags: u16) -> ValueId {
        self.unary(Opcode::VectorConvertF2I, flags, ValueType::V128, a)
    }

    // Context and memory.

    /// Typed load from the guest context block.
    pub fn load_context(&mut self, offset: usize, ty: ValueType) -> ValueId {
        let dest = self.alloc(ty);
        self.emit(
            Opcode::LoadContext,
            0,
            Some(dest),
            Operand::Offset(offset as u64),
            Operand::None,
            Operand::None,
        );
        dest
    }

    /// Typed store into the guest context block.
    pub fn store_context(&mut self, offset: usize, value: ValueId) {
        self.emit(
            Opcode::StoreContext,
            0,
            None,
            Operand::Offset(offset as u64),
            Operand::Value(value),
            Operand::None,
        );
    }

    /// Typed load from guest memory at `address` (low 32 bits used).
    pub fn load(&mut self, address: ValueId, ty: ValueType) -> ValueId {
        let dest = self.alloc(ty);
        self.emit(
            Opcode::Load,
            0,
            Some(dest),
            Operand::Value(address),
            Operand::None,
            Operand::None,
        );
        dest
    }

    /// Typed store to guest memory.
    pub fn store(&mut self, address: ValueId, value: ValueId) {
        self.emit(
            Opcode::Store,
            0,
            None,
            Operand::Value(address),
            Operand::Value(value),
            Operand::None,
        );
    }

    // Selection and comparison.

    /// `cond ? a : b`.
    pub fn select(&mut self, cond: ValueId, a: ValueId, b: ValueId) -> ValueId {
        let ty = self.f.value(a).ty;
        self.ternary(Opcode::Select, 0, ty, cond, a, b)
    }

    /// Boolean truthiness of any value.
    pub fn is_true(&mut self, a: ValueId) -> ValueId {
        if self.f.value(a).is_constant() {
            let nz = !self.f.value(a).is_constant_zero() as u64;
            return self.fold_int1(ValueType::I8, a, |_| nz);
        }
        self.unary(Opcode::IsTrue, 0, ValueType::I8, a)
    }

    /// Boolean falsiness of any value.
    pub fn is_false(&mut self, a: ValueId) -> ValueId {
        if self.f.value(a).is_constant() {
            let z = self.f.value(a).is_constant_zero() as u64;
            return self.fold_int1(ValueType::I8, a, |_| z);
        }
        self.unary(Opcode::IsFalse, 0, ValueType::I8, a)
    }

    fn compare(&mut self, opcode: Opcode, a: ValueId, b: ValueId) -> ValueId {
        if self.both_const(a, b) {
            let ty = self.f.value(a).ty;
            let (au, bu) = (self.f.value(a).as_u64(), self.f.value(b).as_u64());
            let (ai, bi) = (self.f.value(a).as_i64(), self.f.value(b).as_i64());
            let r = if ty.is_int() {
                (match opcode {
                    Opcode::CompareEq => au == bu,
                    Opcode::CompareNe => au != bu,
                    Opcode::CompareSlt => ai < bi,
                    Opcode::CompareSle => ai <= bi,
                    Opcode::CompareSgt => ai > bi,
                    Opcode::CompareSge => ai >= bi,
                    Opcode::CompareUlt => au < bu,
                    Opcode::CompareUle => au <= bu,
                    Opcode::CompareUgt => au > bu,
                    Opcode::CompareUge => au >= bu,
                    _ => unreachable!(),
                }) as u64
            } else {
                return self.binary(opcode, 0, ValueType::I8, a, b);
            };
            return self.fold_int1(ValueType::I8, a, |_| r);
        }
        self.binary(opcode, 0, ValueType::I8, a, b)
    }

    /// `a == b`.
    pub fn compare_eq(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.compare(Opcode::CompareEq, a, b)
    }

    /// `a != b`.
    pub fn compare_ne(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.compare(Opcode::CompareNe, a, b)
    }

    /// Signed `a < b`.
    pub fn compare_slt(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.compare(Opcode::CompareSlt, a, b)
    }

    /// Signed `a <= b`.
    pub fn compare_sle(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.compare(Opcode::CompareSle, a, b)
    }

    /// Signed `a > b`.
    pub fn compare_sgt(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.compare(Opcode::CompareSgt, a, b)
    }

    /// Signed `a >= b`.
    pub fn compare_sge(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.compare(Opcode::CompareSge, a, b)
    }

    /// Unsigned `a < b`.
    pub fn compare_ult(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.compare(Opcode::CompareUlt, a, b)
    }

    /// Unsigned `a <= b`.
    pub fn compare_ule(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.compare(Opcode::CompareUle, a, b)
    }

    /// Unsigned `a > b`.
    pub fn compare_ugt(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.compare(Opcode::CompareUgt, a, b)
    }

    /// Unsigned `a >= b`.
    pub fn compare_uge(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.compare(Opcode::CompareUge, a, b)
    }

    /// The carry recorded by the last flagged arithmetic op.
    pub fn did_carry(&mut self, a: ValueId) -> ValueId {
        self.unary(Opcode::DidCarry, 0, ValueType::I8, a)
    }

    /// The overflow recorded by the last flagged arithmetic op.
    pub fn did_overflow(&mut self, a: ValueId) -> ValueId {
        self.unary(Opcode::DidOverflow, 0, ValueType::I8, a)
    }

    fn vector_compare(&mut self, opcode: Opcode, a: ValueId, b: ValueId, elem: ValueType) -> ValueId {
        self.binary(opcode, elem as u16, ValueType::V128, a, b)
    }

    /// Per-lane `a == b` mask.
    pub fn vector_compare_eq(&mut self, a: ValueId, b: ValueId, elem: ValueType) -> ValueId {
        self.vector_compare(Opcode::VectorCompareEq, a, b, elem)
    }

    /// Per-lane signed `a > b` mask.
    pub fn vector_compare_sgt(&mut self, a: ValueId, b: ValueId, elem: ValueType) -> ValueId {
        self.vector_compare(Opcode::VectorCompareSgt, a, b, elem)
    }

    /// Per-lane signed `a >= b` mask.
    pub fn vector_compare_sge(&mut self, a: ValueId, b: ValueId, elem: ValueType) -> ValueId {
        self.vector_compare(Opcode::VectorCompareSge, a, b, elem)
    }

    /// Per-lane unsigned `a > b` mask.
    pub fn vector_compare_ugt(&mut self, a: ValueId, b: ValueId, elem: ValueType) -> ValueId {
        self.vector_compare(Opcode::VectorCompareUgt, a, b, elem)
    }

    /// Per-lane unsigned `a >= b` mask.
    pub fn vector_compare_uge(&mut self, a: ValueId, b: ValueId, elem: ValueType) -> ValueId {
        self.vector_compare(Opcode::VectorCompareUge, a, b, elem)
    }

    // Arithmetic.

    /// `a + b`; flags may request carry recording.
    pub fn add(&mut self, a: ValueId, b: ValueId, flags: u16) -> ValueId {
        let ty = self.f.value(a).ty;
        if flags == 0 && self.both_const(a, b) {
            return match ty {
                ValueType::F32 | ValueType::F64 => self.fold_float2(ty, a, b, |x, y| x + y),
                ValueType::V128 => self.binary(Opcode::Add, flags, ty, a, b),
                _ => self.fold_int2(ty, a, b, |x, y| x.wrapping_add(y)),
            };
        }
        self.binary(Opcode::Add, flags, ty, a, b)
    }

    /// `a + b + c` where `c` is a previous carry bit.
    pub fn add_carry(&mut self, a: ValueId, b: ValueId, c: ValueId, flags: u16) -> ValueId {
        let ty = self.f.value(a).ty;
        self.ternary(Opcode::AddCarry, flags, ty, a, b, c)
    }

    /// `a - b`; flags may request carry recording.
    pub fn sub(&mut self, a: ValueId, b: ValueId, flags: u16) -> ValueId {
        let ty = self.f.value(a).ty;
        if flags == 0 && self.both_const(a, b) {
            return match ty {
                ValueType::F32 | ValueType::F64 => self.fold_float2(ty, a, b, |x, y| x - y),
                ValueType::V128 => self.binary(Opcode::Sub, flags, ty, a, b),
                _ => self.fold_int2(ty, a, b, |x, y| x.wrapping_sub(y)),
            };
        }
        self.binary(Opcode::Sub, flags, ty, a, b)
    }

    /// `a * b` (low half).
    pub fn mul(&mut self, a: ValueId, b: ValueId) -> ValueId {
        let ty = self.f.value(a).ty;
        if self.both_const(a, b) {
            return match ty {
                ValueType::F32 | ValueType::F64 => self.fold_float2(ty, a, b, |x, y| x * y),
                ValueType::V128 => self.binary(Opcode::Mul, 0, ty, a, b),
                _ => self.fold_int2(ty, a, b, |x, y| x.wrapping_mul(y)),
            };
        }
        self.binary(Opcode::Mul, 0, ty, a, b)
    }

    /// High half of the widened product; flags may select unsigned.
    pub fn mul_hi(&mut self, a: ValueId, b: ValueId, flags: u16) -> ValueId {
        let ty = self.f.value(a).ty;
        self.binary(Opcode::MulHi, flags, ty, a, b)
    }

    /// `a / b`; flags may select unsigned. Division by zero is left to the
    /// backend (tests must not rely on it).
    pub fn div(&mut self, a: ValueId, b: ValueId, flags: u16) -> ValueId {
        let ty = self.f.value(a).ty;
        if self.both_const(a, b) && !self.f.value(b).is_constant_zero() {
            return match ty {
                ValueType::F32 | ValueType::F64 => self.fold_float2(ty, a, b, |x, y| x / y),
                ValueType::V128 => self.binary(Opcode::Div, flags, ty, a, b),
                _ => {
                    if flags & ARITHMETIC_UNSIGNED != 0 {
                        self.fold_int2(ty, a, b, |x, y| x / y)
                    } else {
                        let bits = ty.bits();
                        self.fold_int2(ty, a, b, move |x, y| {
                            sext(bits, x).wrapping_div(sext(bits, y)) as u64
                        })
                    }
                }
            };
        }
        self.binary(Opcode::Div, flags, ty, a, b)
    }

    /// `(a * b) + c`.
    pub fn mul_add(&mut self, a: ValueId, b: ValueId, c: ValueId) -> ValueId {
        let ty = self.f.value(a).ty;
        self.ternary(Opcode::MulAdd, 0, ty, a, b, c)
    }

    /// `(a * b) - c`.
    pub fn mul_sub(&mut self, a: ValueId, b: ValueId, c: ValueId) -> ValueId {
        let ty = self.f.value(a).ty;
        self.ternary(Opcode::MulSub, 0, ty, a, b, c)
    }

    /// `-a`.
    pub fn neg(&mut self, a: ValueId) -> ValueId {
        let ty = self.f.value(a).ty;
        if self.f.value(a).is_constant() && ty.is_int() {
            return self.fold_int1(ty, a, |x| x.wrapping_neg());
        }
        self.unary(Opcode::Neg, 0, ty, a)
    }

    /// `|a|`.
    pub fn abs(&mut self, a: ValueId) -> ValueId {
        let ty = self.f.value(a).ty;
        self.unary(Opcode::Abs, 0, ty, a)
    }

    /// `sqrt(a)`.
    pub fn sqrt(&mut self, a: ValueId) -> ValueId {
        let ty = self.f.value(a).ty;
        self.unary(Opcode::Sqrt, 0, ty, a)
    }

    /// Per-lane `1 / sqrt(a)`.
    pub fn rsqrt(&mut self, a: ValueId) -> ValueId {
        let ty = self.f.value(a).ty;
        self.unary(Opcode::Rsqrt, 0, ty, a)
    }

    /// 3-lane dot product, scalar F32 result.
    pub fn dot_product_3(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.binary(Opcode::DotProduct3, 0, ValueType::F32, a, b)
    }

    /// 4-lane dot product, scalar F32 result.
    pub fn dot_product_4(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.binary(Opcode::DotProduct4, 0, ValueType::F32, a, b)
    }

    // Bitwise.

    /// `a & b`.
    pub fn and(&mut self, a: ValueId, b: ValueId) -> ValueId {
        let ty = self.f.value(a).ty;
        if ty.is_int() && self.both_const(a, b) {
            return self.fold_int2(ty, a, b, |x, y| x & y);
        }
        self.binary(Opcode::And, 0, ty, a, b)
    }

    /// `a | b`.
    pub fn or(&mut self, a: ValueId, b: ValueId) -> ValueId {
        let ty = self.f.value(a).ty;
        if ty.is_int() && self.both_const(a, b) {
            return self.fold_int2(ty, a, b, |x, y| x | y);
        }
        self.binary(Opcode::Or, 0, ty, a, b)
    }

    /// `a ^ b`.
    pub fn xor(&mut self, a: ValueId, b: ValueId) -> ValueId {
        let ty = self.f.value(a).ty;
        if ty.is_int() && self.both_const(a, b) {
            return self.fold_int2(ty, a, b, |x, y| x ^ y);
        }
        self.binary(Opcode::Xor, 0, ty, a, b)
    }

    /// `!a`.
    pub fn not(&mut self, a: ValueId) -> ValueId {
        let ty = self.f.value(a).ty;
        if ty.is_int() && self.f.value(a).is_constant() {
            return self.fold_int1(ty, a, |x| !x);
        }
        self.unary(Opcode::Not, 0, ty, a)
    }

    /// `a << b` (count taken from the low byte of `b`).
    pub fn shl(&mut self, a: ValueId, b: ValueId) -> ValueId {
        let ty = self.f.value(a).ty;
        if self.both_const(a, b) {
            let bits = ty.bits();
            return self.fold_int2(ty, a, b, move |x, y| x << ((y as u32) & (bits - 1)));
        }
        self.binary(Opcode::Shl, 0, ty, a, b)
    }

    /// Logical `a >> b`.
    pub fn shr(&mut self, a: ValueId, b: ValueId) -> ValueId {
        let ty = self.f.value(a).ty;
        if self.both_const(a, b) {
            let bits = ty.bits();
            return self.fold_int2(ty, a, b, move |x, y| x >> ((y as u32) & (bits - 1)));
        }
        self.binary(Opcode::Shr, 0, ty, a, b)
    }

    /// Arithmetic `a >> b`.
    pub fn sha(&mut self, a: ValueId, b: ValueId) -> ValueId {
        let ty = self.f.value(a).ty;
        if self.both_const(a, b) {
            let bits = ty.bits();
            return self.fold_int2(ty, a, b, move |x, y| {
                (sext(bits, x) >> ((y as u32) & (bits - 1))) as u64
            });
        }
        self.binary(Opcode::Sha, 0, ty, a, b)
    }

    /// Per-lane `a << b`, lane width from `elem`.
    pub fn vector_shl(&mut self, a: ValueId, b: ValueId, elem: ValueType) -> ValueId {
        self.binary(Opcode::VectorShl, elem as u16, ValueType::V128, a, b)
    }

    /// Per-lane logical `a >> b`.
    pub fn vector_shr(&mut self, a: ValueId, b: ValueId, elem: ValueType) -> ValueId {
        self.binary(Opcode::VectorShr, elem as u16, ValueType::V128, a, b)
    }

    /// Per-lane arithmetic `a >> b`.
    pub fn vector_sha(&mut self, a: ValueId, b: ValueId, elem: ValueType) -> ValueId {
        self.binary(Opcode::VectorSha, elem as u16, ValueType::V128, a, b)
    }

    /// Rotate left by the low byte of `b`, modulo the width.
    pub fn rotate_left(&mut self, a: ValueId, b: ValueId) -> ValueId {
        let ty = self.f.value(a).ty;
        if self.both_const(a, b) {
            let bits = ty.bits();
            return self.fold_int2(ty, a, b, move |x, y| {
                let n = (y as u32) & (bits - 1);
                if n == 0 {
                    x
                } else {
                    trunc(bits, x << n) | (trunc(bits, x) >> (bits - n))
                }
            });
        }
        self.binary(Opcode::RotateLeft, 0, ty, a, b)
    }

    /// Endianness swap within the type.
    pub fn byte_swap(&mut self, a: ValueId) -> ValueId {
        let ty = self.f.value(a).ty;
        if self.f.value(a).is_constant() {
            match ty {
                ValueType::I16 => return self.fold_int1(ty, a, |x| (x as u16).swap_bytes() as u64),
                ValueType::I32 => return self.fold_int1(ty, a, |x| (x as u32).swap_bytes() as u64),
                ValueType::I64 => return self.fold_int1(ty, a, |x| x.swap_bytes()),
                ValueType::V128 => {
                    let v = self.f.value(a).constant.byte_swap();
                    return self.alloc_constant(ty, v);
                }
                _ => {}
            }
        }
        self.unary(Opcode::ByteSwap, 0, ty, a)
    }

    /// Count of leading zero bits; a zero input yields the type width.
    pub fn cntlz(&mut self, a: ValueId) -> ValueId {
        let ty = self.f.value(a).ty;
        if self.f.value(a).is_constant() && ty.is_int() {
            let bits = ty.bits();
            let v = self.f.value(a).as_u64();
            let r = if v == 0 {
                bits as u64
            } else {
                (v.leading_zeros() - (64 - bits)) as u64
            };
            return self.fold_int1(ValueType::I8, a, |_| r);
        }
        self.unary(Opcode::Cntlz, 0, ValueType::I8, a)
    }

    // Vector data movement.

    /// Extracts lane `lane` of `a` as `ty`.
    pub fn extract(&mut self, a: ValueId, lane: ValueId, ty: ValueType) -> ValueId {
        let dest = self.alloc(ty);
        self.emit(
            Opcode::Extract,
            0,
            Some(dest),
            Operand::Value(a),
            Operand::Value(lane),
            Operand::None,
        );
        dest
    }

    /// Extracts a constant lane.
    pub fn extract_imm(&mut self, a: ValueId, lane: u8, ty: ValueType) -> ValueId {
        let lane = self.load_constant(lane);
        self.extract(a, lane, ty)
    }

    /// Broadcasts scalar `a` into every lane of `ty`.
    pub fn splat(&mut self, a: ValueId, ty: ValueType) -> ValueId {
        self.unary(Opcode::Splat, 0, ty, a)
    }

    /// Lane permute: `control` selects lanes out of the concatenation of
    /// `a` then `b`. Element type I8 means "permute by byte indices".
    pub fn permute(&mut self, control: ValueId, a: ValueId, b: ValueId, elem: ValueType) -> ValueId {
        self.ternary(Opcode::Permute, elem as u16, ValueType::V128, control, a, b)
    }

    /// Fixed 2-bit-per-lane swizzle of the four 32-bit lanes.
    pub fn swizzle(&mut self, a: ValueId, elem: ValueType, control: u8) -> ValueId {
        debug_assert!(matches!(elem, ValueType::I32 | ValueType::F32));
        self.unary(Opcode::Swizzle, control as u16, ValueType::V128, a)
    }

    // Atomics.

    /// Atomic compare-exchange on guest memory; yields the previous value.
    pub fn compare_exchange(&mut self, address: ValueId, cmp: ValueId, new: ValueId) -> ValueId {
        let ty = self.f.value(cmp).ty;
        self.ternary(Opcode::CompareExchange, 0, ty, address, cmp, new)
    }

    /// Atomic exchange on guest memory; yields the previous value.
    pub fn atomic_exchange(&mut self, address: ValueId, new: ValueId) -> ValueId {
        let ty = self.f.value(new).ty;
        self.binary(Opcode::AtomicExchange, 0, ty, address, new)
    }

    /// Atomic add on guest memory; yields the previous value.
    pub fn atomic_add(&mut self, address: ValueId, v: ValueId) -> ValueId {
        let ty = self.f.value(v).ty;
        self.binary(Opcode::AtomicAdd, 0, ty, address, v)
    }

    /// Atomic subtract on guest memory; yields the previous value.
    pub fn atomic_sub(&mut self, address: ValueId, v: ValueId) -> ValueId {
        let ty = self.f.value(v).ty;
        self.binary(Opcode::AtomicSub, 0, ty, address, v)
    }

    // Misc vector/system.

    /// The `lvsl` shift-permute vector for a 0..15 byte offset.
    pub fn load_vector_shl(&mut self, sh: ValueId) -> ValueId {
        self.unary(Opcode::LoadVectorShl, 0, ValueType::V128, sh)
    }

    /// The `lvsr` shift-permute vector for a 0..15 byte offset.
    pub fn load_vector_shr(&mut self, sh: ValueId) -> ValueId {
        self.unary(Opcode::LoadVectorShr, 0, ValueType::V128, sh)
    }

    /// Host clock value.
    pub fn load_clock(&mut self) -> ValueId {
        let dest = self.alloc(ValueType::I64);
        self.emit(Opcode::LoadClock, 0, Some(dest), Operand::None, Operand::None, Operand::None);
        dest
    }

    /// `max(a, b)`.
    pub fn max(&mut self, a: ValueId, b: ValueId) -> ValueId {
        let ty = self.f.value(a).ty;
        self.binary(Opcode::Max, 0, ty, a, b)
    }

    /// `min(a, b)`.
    pub fn min(&mut self, a: ValueId, b: ValueId) -> ValueId {
        let ty = self.f.value(a).ty;
        self.binary(Opcode::Min, 0, ty, a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_constant_inputs_emit_no_instruction() {
        let mut b = FunctionBuilder::new();
        let x = b.load_constant(40u32);
        let y = b.load_constant(2u32);
        let r = b.add(x, y, 0);
        assert!(b.hir().instrs().is_empty());
        assert!(b.value(r).is_constant());
        assert_eq!(b.value(r).as_u64(), 42);
    }

    #[test]
    fn fold_truncates_to_width() {
        let mut b = FunctionBuilder::new();
        let x = b.load_constant(0xFFu8);
        let y = b.load_constant(1u8);
        let r = b.add(x, y, 0);
        assert_eq!(b.value(r).as_u64(), 0);
    }

    #[test]
    fn fold_signed_shift() {
        let mut b = FunctionBuilder::new();
        let x = b.load_constant(-8i32);
        let y = b.load_constant(2i8);
        // Widths differ between operands; count comes from the low byte.
        let r = b.sha(x, y);
        assert_eq!(b.value(r).as_i64(), -2);
    }

    #[test]
    fn byte_swap_fold_is_involutive() {
        let mut b = FunctionBuilder::new();
        let x = b.load_constant(0x1234_5678u32);
        let y = b.byte_swap(x);
        let z = b.byte_swap(y);
        assert_eq!(b.value(y).as_u64(), 0x7856_3412);
        assert_eq!(b.value(z).as_u64(), 0x1234_5678);
        assert!(b.hir().instrs().is_empty());
    }

    #[test]
    fn cntlz_of_zero_is_the_width(){
        let mut b = FunctionBuilder::new();
        let x = b.load_constant(0u16);
        let r = b.cntlz(x);
        assert_eq!(b.value(r).as_u64(), 16);
        let x = b.load_constant(1u64);
        let r = b.cntlz(x);
        assert_eq!(b.value(r).as_u64(), 63);
    }

    #[test]
    fn non_constant_inputs_emit() {
        let mut b = FunctionBuilder::new();
        let x = b.load_context(0x10, ValueType::I64);
        let y = b.load_constant(1u64);
        let _ = b.add(x, y, 0);
        // load_context + add
        assert_eq!(b.hir().instrs().len(), 2);
    }

    #[test]
    fn labels_mark_positions() {
        let mut b = FunctionBuilder::new();
        let l = b.new_label();
        b.nop();
        b.mark_label(l);
        b.return_();
        assert_eq!(b.hir().label(l).instr_index, Some(1));
    }
}
