//! Intcode handlers and the per-opcode lowering dispatch.
//!
//! Each HIR opcode lowers through a table of typed handlers; combinations
//! with no handler get the `invalid_type` sentinel, which faults the
//! thread instead of silently continuing.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use tracing::trace;

use crate::backend::interp::{IntCode, IntCodeFn, IntCodeState, TranslationContext, IA_NEXT, IA_RETURN};
use crate::backend::vector::{self, CompareOp};
use crate::error::ExecError;
use crate::hir::{Instr, Opcode, ValueType, ARITHMETIC_SET_CARRY, ARITHMETIC_UNSIGNED, CALL_TAIL};
use crate::vec128::Vec128;

const INVALID_TYPE: IntCodeFn = invalid_type;

fn elem_from_flags(flags: u16) -> ValueType {
    match flags & 0x7 {
        0 => ValueType::I8,
        1 => ValueType::I16,
        2 => ValueType::I32,
        3 => ValueType::I64,
        4 => ValueType::F32,
        5 => ValueType::F64,
        _ => ValueType::V128,
    }
}

// Sentinels.

pub(super) fn invalid(s: &mut IntCodeState<'_>, _i: &IntCode) -> u32 {
    s.fault = Some(ExecError::InvalidOpcode);
    IA_RETURN
}

pub(super) fn invalid_type(s: &mut IntCodeState<'_>, _i: &IntCode) -> u32 {
    s.fault = Some(ExecError::InvalidType);
    IA_RETURN
}

// Constants, comments, no-ops.

pub(super) fn load_constant(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
    s.set(i.dest_reg, i.constant);
    IA_NEXT
}

fn comment(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
    trace!(target: "intcode", "{}", s.function.comment(i.constant.low()));
    IA_NEXT
}

fn nop(_s: &mut IntCodeState<'_>, _i: &IntCode) -> u32 {
    IA_NEXT
}

// Traps and breaks.

fn debug_break(s: &mut IntCodeState<'_>, _i: &IntCode) -> u32 {
    s.fault = Some(ExecError::DebugBreak);
    IA_RETURN
}

fn trap(s: &mut IntCodeState<'_>, _i: &IntCode) -> u32 {
    s.fault = Some(ExecError::Trap);
    IA_RETURN
}

macro_rules! truthy_fns {
    ($( $name:ident, $get:ident, $zero:expr; )*) => {
        $( #[inline] fn $name(s: &IntCodeState<'_>, r: u32) -> bool {
            s.$get(r) != $zero
        } )*
    };
}

truthy_fns! {
    truthy_i8, get_u8, 0;
    truthy_i16, get_u16, 0;
    truthy_i32, get_u32, 0;
    truthy_i64, get_u64, 0;
    truthy_f32, get_f32, 0.0;
    truthy_f64, get_f64, 0.0;
}

#[inline]
fn truthy_v128(s: &IntCodeState<'_>, r: u32) -> bool {
    let v = s.get(r);
    v.low() != 0 || v.high() != 0
}

macro_rules! cond_family {
    ($table:ident, $($name:ident, $truthy:ident);* => |$s:ident, $i:ident| $then:expr, $else_:expr) => {
        $( fn $name($s: &mut IntCodeState<'_>, $i: &IntCode) -> u32 {
            if $truthy($s, $i.src1_reg) {
                $then
            } else {
                $else_
            }
        } )*
        const $table: [IntCodeFn; 7] = [$($name),*];
    };
}

cond_family! {
    DEBUG_BREAK_TRUE,
    debug_break_true_i8, truthy_i8;
    debug_break_true_i16, truthy_i16;
    debug_break_true_i32, truthy_i32;
    debug_break_true_i64, truthy_i64;
    debug_break_true_f32, truthy_f32;
    debug_break_true_f64, truthy_f64;
    debug_break_true_v128, truthy_v128
    => |s, i| debug_break(s, i), IA_NEXT
}

cond_family! {
    TRAP_TRUE,
    trap_true_i8, truthy_i8;
    trap_true_i16, truthy_i16;
    trap_true_i32, truthy_i32;
    trap_true_i64, truthy_i64;
    trap_true_f32, truthy_f32;
    trap_true_f64, truthy_f64;
    trap_true_v128, truthy_v128
    => |s, i| trap(s, i), IA_NEXT
}

// Calls.

fn call_resolved(s: &mut IntCodeState<'_>, address: u32, flags: u16) -> u32 {
    let runtime = s.thread.runtime().clone();
    match runtime.resolve_function(address) {
        Ok(function) => {
            if let Err(fault) = function.call(s.thread) {
                s.fault = Some(fault);
                return IA_RETURN;
            }
        }
        Err(e) => {
            s.fault = Some(e.into());
            return IA_RETURN;
        }
    }
    if flags & CALL_TAIL != 0 {
        IA_RETURN
    } else {
        IA_NEXT
    }
}

fn call(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
    let symbol = s.function.symbol(s.get_u64(i.src1_reg));
    let address = symbol.address();
    call_resolved(s, address, i.flags)
}

cond_family! {
    CALL_TRUE,
    call_true_i8, truthy_i8;
    call_true_i16, truthy_i16;
    call_true_i32, truthy_i32;
    call_true_i64, truthy_i64;
    call_true_f32, truthy_f32;
    call_true_f64, truthy_f64;
    call_true_v128, truthy_v128
    => |s, i| {
        let address = s.function.symbol(s.get_u64(i.src2_reg)).address();
        call_resolved(s, address, i.flags)
    }, IA_NEXT
}

fn call_indirect(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
    let target = s.get_u32(i.src1_reg);
    call_resolved(s, target, i.flags)
}

cond_family! {
    CALL_INDIRECT_TRUE,
    call_indirect_true_i8, truthy_i8;
    call_indirect_true_i16, truthy_i16;
    call_indirect_true_i32, truthy_i32;
    call_indirect_true_i64, truthy_i64;
    call_indirect_true_f32, truthy_f32;
    call_indirect_true_f64, truthy_f64;
    call_indirect_true_v128, truthy_v128
    => |s, i| {
        let target = s.get_u32(i.src2_reg);
        call_resolved(s, target, i.flags)
    }, IA_NEXT
}

fn ret(_s: &mut IntCodeState<'_>, _i: &IntCode) -> u32 {
    IA_RETURN
}

cond_family! {
    RETURN_TRUE,
    return_true_i8, truthy_i8;
    return_true_i16, truthy_i16;
    return_true_i32, truthy_i32;
    return_true_i64, truthy_i64;
    return_true_f32, truthy_f32;
    return_true_f64, truthy_f64;
    return_true_v128, truthy_v128
    => |_s, _i| IA_RETURN, IA_NEXT
}

// Branches: the target register holds the intcode index.

fn branch(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
    s.get_u32(i.src1_reg)
}

cond_family! {
    BRANCH_TRUE,
    branch_true_i8, truthy_i8;
    branch_true_i16, truthy_i16;
    branch_true_i32, truthy_i32;
    branch_true_i64, truthy_i64;
    branch_true_f32, truthy_f32;
    branch_true_f64, truthy_f64;
    branch_true_v128, truthy_v128
    => |s, i| s.get_u32(i.src2_reg), IA_NEXT
}

cond_family! {
    BRANCH_FALSE,
    branch_false_i8, truthy_i8;
    branch_false_i16, truthy_i16;
    branch_false_i32, truthy_i32;
    branch_false_i64, truthy_i64;
    branch_false_f32, truthy_f32;
    branch_false_f64, truthy_f64;
    branch_false_v128, truthy_v128
    => |s, i| IA_NEXT, s.get_u32(i.src2_reg)
}

cond_family! {
    BRANCH_IF,
    branch_if_i8, truthy_i8;
    branch_if_i16, truthy_i16;
    branch_if_i32, truthy_i32;
    branch_if_i64, truthy_i64;
    branch_if_f32, truthy_f32;
    branch_if_f64, truthy_f64;
    branch_if_v128, truthy_v128
    => |s, i| s.get_u32(i.src2_reg), s.get_u32(i.src3_reg)
}

// Copies and conversions.

macro_rules! unop {
    ($name:ident, $get:ident, $set:ident, |$a:ident| $e:expr) => {
        fn $name(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
            let $a = s.$get(i.src1_reg);
            let r = $e;
            s.$set(i.dest_reg, r);
            IA_NEXT
        }
    };
}

macro_rules! binop {
    ($name:ident, $get:ident, $set:ident, |$a:ident, $b:ident| $e:expr) => {
        fn $name(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
            let $a = s.$get(i.src1_reg);
            let $b = s.$get(i.src2_reg);
            let r = $e;
            s.$set(i.dest_reg, r);
            IA_NEXT
        }
    };
}

macro_rules! triop {
    ($name:ident, $get:ident, $set:ident, |$a:ident, $b:ident, $c:ident| $e:expr) => {
        fn $name(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
            let $a = s.$get(i.src1_reg);
            let $b = s.$get(i.src2_reg);
            let $c = s.$get(i.src3_reg);
            let r = $e;
            s.$set(i.dest_reg, r);
            IA_NEXT
        }
    };
}

unop!(assign_i8, get_u8, set_u8, |a| a);
unop!(assign_i16, get_u16, set_u16, |a| a);
unop!(assign_i32, get_u32, set_u32, |a| a);
unop!(assign_i64, get_u64, set_u64, |a| a);
unop!(assign_f32, get_f32, set_f32, |a| a);
unop!(assign_f64, get_f64, set_f64, |a| a);
unop!(assign_v128, get, set, |a| a);

const ASSIGN: [IntCodeFn; 7] = [
    assign_i8, assign_i16, assign_i32, assign_i64, assign_f32, assign_f64, assign_v128,
];

/// Bit reinterpretation is a full cell copy.
fn cast(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
    let v = s.get(i.src1_reg);
    s.set(i.dest_reg, v);
    IA_NEXT
}

unop!(zx_i8_i16, get_u8, set_u16, |a| a as u16);
unop!(zx_i8_i32, get_u8, set_u32, |a| a as u32);
unop!(zx_i8_i64, get_u8, set_u64, |a| a as u64);
unop!(zx_i16_i32, get_u16, set_u32, |a| a as u32);
unop!(zx_i16_i64, get_u16, set_u64, |a| a as u64);
unop!(zx_i32_i64, get_u32, set_u64, |a| a as u64);

unop!(sx_i8_i16, get_u8, set_u16, |a| a as i8 as u16);
unop!(sx_i8_i32, get_u8, set_u32, |a| a as i8 as u32);
unop!(sx_i8_i64, get_u8, set_u64, |a| a as i8 as u64);
unop!(sx_i16_i32, get_u16, set_u32, |a| a as i16 as u32);
unop!(sx_i16_i64, get_u16, set_u64, |a| a as i16 as u64);
unop!(sx_i32_i64, get_u32, set_u64, |a| a as i32 as u64);

unop!(tr_i16_i8, get_u16, set_u8, |a| a as u8);
unop!(tr_i32_i8, get_u32, set_u8, |a| a as u8);
unop!(tr_i32_i16, get_u32, set_u16, |a| a as u16);
unop!(tr_i64_i8, get_u64, set_u8, |a| a as u8);
unop!(tr_i64_i16, get_u64, set_u16, |a| a as u16);
unop!(tr_i64_i32, get_u64, set_u32, |a| a as u32);

unop!(cv_i32_f32, get_u32, set_f32, |a| a as i32 as f32);
unop!(cv_f32_i32, get_f32, set_u32, |a| a as i32 as u32);
unop!(cv_i64_f64, get_u64, set_f64, |a| a as i64 as f64);
unop!(cv_f64_i64, get_f64, set_u64, |a| a as i64 as u64);
unop!(cv_f32_f64, get_f32, set_f64, |a| a as f64);
unop!(cv_f64_f32, get_f64, set_f32, |a| a as f32);

fn vector_convert_i2f(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
    let unsigned = i.flags & ARITHMETIC_UNSIGNED != 0;
    let r = vector::convert_i2f(s.get(i.src1_reg), unsigned);
    s.set(i.dest_reg, r);
    IA_NEXT
}

fn vector_convert_f2i(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
    let unsigned = i.flags & ARITHMETIC_UNSIGNED != 0;
    let r = vector::convert_f2i(s.get(i.src1_reg), unsigned);
    s.set(i.dest_reg, r);
    IA_NEXT
}

// Context block access: src1 holds the byte offset.

macro_rules! ctx_ops {
    ($( $load:ident / $store:ident, $t:ty, $get:ident, $set:ident; )*) => {
        $(
            fn $load(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
                let off = s.get_u64(i.src1_reg);
                // Safety: offsets originate from published context offsets.
                let v = unsafe { s.ctx_read::<$t>(off) };
                s.$set(i.dest_reg, v);
                IA_NEXT
            }
            fn $store(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
                let off = s.get_u64(i.src1_reg);
                let v = s.$get(i.src2_reg);
                // Safety: as above.
                unsafe { s.ctx_write::<$t>(off, v) };
                IA_NEXT
            }
        )*
    };
}

ctx_ops! {
    load_ctx_i8 / store_ctx_i8, u8, get_u8, set_u8;
    load_ctx_i16 / store_ctx_i16, u16, get_u16, set_u16;
    load_ctx_i32 / store_ctx_i32, u32, get_u32, set_u32;
    load_ctx_i64 / store_ctx_i64, u64, get_u64, set_u64;
    load_ctx_f32 / store_ctx_f32, f32, get_f32, set_f32;
    load_ctx_f64 / store_ctx_f64, f64, get_f64, set_f64;
    load_ctx_v128 / store_ctx_v128, Vec128, get, set;
}

const LOAD_CONTEXT: [IntCodeFn; 7] = [
    load_ctx_i8, load_ctx_i16, load_ctx_i32, load_ctx_i64, load_ctx_f32, load_ctx_f64,
    load_ctx_v128,
];

const STORE_CONTEXT: [IntCodeFn; 7] = [
    store_ctx_i8, store_ctx_i16, store_ctx_i32, store_ctx_i64, store_ctx_f32, store_ctx_f64,
    store_ctx_v128,
];

// Guest memory access: src1 holds the guest address in its low 32 bits.

macro_rules! mem_ops {
    ($( $load:ident / $store:ident, $t:ty, $get:ident, $set:ident, $mask:expr; )*) => {
        $(
            fn $load(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
                let address = s.get_u32(i.src1_reg) & $mask;
                // Safety: raw guest access per the memory collaborator's
                // contract.
                let v = unsafe { std::ptr::read_unaligned(s.mem(address) as *const $t) };
                s.$set(i.dest_reg, v);
                IA_NEXT
            }
            fn $store(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
                let address = s.get_u32(i.src1_reg) & $mask;
                let v = s.$get(i.src2_reg);
                // Safety: as above.
                unsafe { std::ptr::write_unaligned(s.mem(address) as *mut $t, v) };
                IA_NEXT
            }
        )*
    };
}

mem_ops! {
    load_i8 / store_i8, u8, get_u8, set_u8, !0;
    load_i16 / store_i16, u16, get_u16, set_u16, !0;
    load_i32 / store_i32, u32, get_u32, set_u32, !0;
    load_i64 / store_i64, u64, get_u64, set_u64, !0;
    load_f32 / store_f32, f32, get_f32, set_f32, !0;
    load_f64 / store_f64, f64, get_f64, set_f64, !0;
    load_v128 / store_v128, Vec128, get, set, !0xFu32;
}

const LOAD: [IntCodeFn; 7] = [
    load_i8, load_i16, load_i32, load_i64, load_f32, load_f64, load_v128,
];

const STORE: [IntCodeFn; 7] = [
    store_i8, store_i16, store_i32, store_i64, store_f32, store_f64, store_v128,
];

// Select / truthiness.

macro_rules! select_ops {
    ($( $name:ident, $get:ident, $set:ident; )*) => {
        $( fn $name(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
            let cond = s.get_u8(i.src1_reg) != 0;
            let v = if cond { s.$get(i.src2_reg) } else { s.$get(i.src3_reg) };
            s.$set(i.dest_reg, v);
            IA_NEXT
        } )*
    };
}

select_ops! {
    select_i8, get_u8, set_u8;
    select_i16, get_u16, set_u16;
    select_i32, get_u32, set_u32;
    select_i64, get_u64, set_u64;
    select_f32, get_f32, set_f32;
    select_f64, get_f64, set_f64;
    select_v128, get, set;
}

const SELECT: [IntCodeFn; 7] = [
    select_i8, select_i16, select_i32, select_i64, select_f32, select_f64, select_v128,
];

macro_rules! is_ops {
    ($table:ident, $invert:expr, $( $name:ident, $truthy:ident; )*) => {
        $( fn $name(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
            let t = $truthy(s, i.src1_reg) ^ $invert;
            s.set_u8(i.dest_reg, t as u8);
            IA_NEXT
        } )*
        const $table: [IntCodeFn; 7] = [$($name),*];
    };
}

is_ops! {
    IS_TRUE, false,
    is_true_i8, truthy_i8;
    is_true_i16, truthy_i16;
    is_true_i32, truthy_i32;
    is_true_i64, truthy_i64;
    is_true_f32, truthy_f32;
    is_true_f64, truthy_f64;
    is_true_v128, truthy_v128;
}

is_ops! {
    IS_FALSE, true,
    is_false_i8, truthy_i8;
    is_false_i16, truthy_i16;
    is_false_i32, truthy_i32;
    is_false_i64, truthy_i64;
    is_false_f32, truthy_f32;
    is_false_f64, truthy_f64;
    is_false_v128, truthy_v128;
}

// Scalar comparisons; destination is always I8.

macro_rules! cmp_family {
    ($table:ident, $op:tt, signed) => {
        cmp_family!(@table $table, $op,
            (get_u8, i8), (get_u16, i16), (get_u32, i32), (get_u64, i64));
    };
    ($table:ident, $op:tt, unsigned) => {
        cmp_family!(@table $table, $op,
            (get_u8, u8), (get_u16, u16), (get_u32, u32), (get_u64, u64));
    };
    (@table $table:ident, $op:tt, ($g8:ident, $t8:ty), ($g16:ident, $t16:ty), ($g32:ident, $t32:ty), ($g64:ident, $t64:ty)) => {
        paste_cmp!($table, $op, $g8, $t8, $g16, $t16, $g32, $t32, $g64, $t64);
    };
}

macro_rules! paste_cmp {
    ($table:ident, $op:tt, $g8:ident, $t8:ty, $g16:ident, $t16:ty, $g32:ident, $t32:ty, $g64:ident, $t64:ty) => {
        #[allow(non_snake_case)]
        mod $table {
            use super::*;
            pub(super) fn c8(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
                let r = (s.$g8(i.src1_reg) as $t8) $op (s.$g8(i.src2_reg) as $t8);
                s.set_u8(i.dest_reg, r as u8);
                IA_NEXT
            }
            pub(super) fn c16(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
                let r = (s.$g16(i.src1_reg) as $t16) $op (s.$g16(i.src2_reg) as $t16);
                s.set_u8(i.dest_reg, r as u8);
                IA_NEXT
            }
            pub(super) fn c32(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
                let r = (s.$g32(i.src1_reg) as $t32) $op (s.$g32(i.src2_reg) as $t32);
                s.set_u8(i.dest_reg, r as u8);
                IA_NEXT
            }
            pub(super) fn c64(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
                let r = (s.$g64(i.src1_reg) as $t64) $op (s.$g64(i.src2_reg) as $t64);
                s.set_u8(i.dest_reg, r as u8);
                IA_NEXT
            }
            pub(super) fn cf32(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
                let r = s.get_f32(i.src1_reg) $op s.get_f32(i.src2_reg);
                s.set_u8(i.dest_reg, r as u8);
                IA_NEXT
            }
            pub(super) fn cf64(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
                let r = s.get_f64(i.src1_reg) $op s.get_f64(i.src2_reg);
                s.set_u8(i.dest_reg, r as u8);
                IA_NEXT
            }
            pub(super) const TABLE: [IntCodeFn; 7] =
                [c8, c16, c32, c64, cf32, cf64, super::invalid_type];
        }
    };
}

cmp_family!(CMP_EQ, ==, unsigned);
cmp_family!(CMP_NE, !=, unsigned);
cmp_family!(CMP_SLT, <, signed);
cmp_family!(CMP_SLE, <=, signed);
cmp_family!(CMP_SGT, >, signed);
cmp_family!(CMP_SGE, >=, signed);
cmp_family!(CMP_ULT, <, unsigned);
cmp_family!(CMP_ULE, <=, unsigned);
cmp_family!(CMP_UGT, >, unsigned);
cmp_family!(CMP_UGE, >=, unsigned);

fn did_carry(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
    s.set_u8(i.dest_reg, s.did_carry as u8);
    IA_NEXT
}

// Vector comparisons dispatch on the element type in the flags.

macro_rules! vcmp {
    ($name:ident, $op:expr) => {
        fn $name(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
            let elem = elem_from_flags(i.flags);
            let r = vector::compare($op, elem, s.get(i.src1_reg), s.get(i.src2_reg));
            s.set(i.dest_reg, r);
            IA_NEXT
        }
    };
}

vcmp!(vector_compare_eq, CompareOp::Eq);
vcmp!(vector_compare_sgt, CompareOp::Sgt);
vcmp!(vector_compare_sge, CompareOp::Sge);
vcmp!(vector_compare_ugt, CompareOp::Ugt);
vcmp!(vector_compare_uge, CompareOp::Uge);

// Integer and float arithmetic.

macro_rules! add_family {
    ($( $name:ident, $get:ident, $set:ident; )*) => {
        $( fn $name(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
            let a = s.$get(i.src1_reg);
            let b = s.$get(i.src2_reg);
            if i.flags == ARITHMETIC_SET_CARRY {
                s.did_carry = b > !a;
            }
            s.$set(i.dest_reg, a.wrapping_add(b));
            IA_NEXT
        } )*
    };
}

add_family! {
    add_i8, get_u8, set_u8;
    add_i16, get_u16, set_u16;
    add_i32, get_u32, set_u32;
    add_i64, get_u64, set_u64;
}

binop!(add_f32, get_f32, set_f32, |a, b| a + b);
binop!(add_f64, get_f64, set_f64, |a, b| a + b);

fn add_v128(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
    let (a, b) = (s.get(i.src1_reg), s.get(i.src2_reg));
    let mut dest = Vec128::ZERO;
    for n in 0..4 {
        dest.set_f32(n, a.f32(n) + b.f32(n));
    }
    s.set(i.dest_reg, dest);
    IA_NEXT
}

const ADD: [IntCodeFn; 7] = [
    add_i8, add_i16, add_i32, add_i64, add_f32, add_f64, add_v128,
];

macro_rules! add_carry_family {
    ($( $name:ident, $get:ident, $set:ident, $t:ty; )*) => {
        $( fn $name(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
            let a = s.$get(i.src1_reg);
            let b = s.$get(i.src2_reg);
            let c = s.get_u8(i.src3_reg) as $t;
            if i.flags == ARITHMETIC_SET_CARRY {
                let sum = a.wrapping_add(b);
                s.did_carry = (b > !a) || (c != 0 && c > !sum);
            }
            s.$set(i.dest_reg, a.wrapping_add(b).wrapping_add(c));
            IA_NEXT
        } )*
    };
}

add_carry_family! {
    add_carry_i8, get_u8, set_u8, u8;
    add_carry_i16, get_u16, set_u16, u16;
    add_carry_i32, get_u32, set_u32, u32;
    add_carry_i64, get_u64, set_u64, u64;
}

const ADD_CARRY: [IntCodeFn; 7] = [
    add_carry_i8, add_carry_i16, add_carry_i32, add_carry_i64, INVALID_TYPE, INVALID_TYPE,
    INVALID_TYPE,
];

macro_rules! sub_family {
    ($( $name:ident, $get:ident, $set:ident; )*) => {
        $( fn $name(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
            let a = s.$get(i.src1_reg);
            let b = s.$get(i.src2_reg);
            if i.flags == ARITHMETIC_SET_CARRY {
                s.did_carry = b == 0 || b.wrapping_neg() > !a;
            }
            s.$set(i.dest_reg, a.wrapping_sub(b));
            IA_NEXT
        } )*
    };
}

sub_family! {
    sub_i8, get_u8, set_u8;
    sub_i16, get_u16, set_u16;
    sub_i32, get_u32, set_u32;
    sub_i64, get_u64, set_u64;
}

binop!(sub_f32, get_f32, set_f32, |a, b| a - b);
binop!(sub_f64, get_f64, set_f64, |a, b| a - b);

fn sub_v128(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
    let (a, b) = (s.get(i.src1_reg), s.get(i.src2_reg));
    let mut dest = Vec128::ZERO;
    for n in 0..4 {
        dest.set_f32(n, a.f32(n) - b.f32(n));
    }
    s.set(i.dest_reg, dest);
    IA_NEXT
}

const SUB: [IntCodeFn; 7] = [
    sub_i8, sub_i16, sub_i32, sub_i64, sub_f32, sub_f64, sub_v128,
];

binop!(mul_i8, get_u8, set_u8, |a, b| a.wrapping_mul(b));
binop!(mul_i16, get_u16, set_u16, |a, b| a.wrapping_mul(b));
binop!(mul_i32, get_u32, set_u32, |a, b| a.wrapping_mul(b));
binop!(mul_i64, get_u64, set_u64, |a, b| a.wrapping_mul(b));
binop!(mul_f32, get_f32, set_f32, |a, b| a * b);
binop!(mul_f64, get_f64, set_f64, |a, b| a * b);

fn mul_v128(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
    let (a, b) = (s.get(i.src1_reg), s.get(i.src2_reg));
    let mut dest = Vec128::ZERO;
    for n in 0..4 {
        dest.set_f32(n, a.f32(n) * b.f32(n));
    }
    s.set(i.dest_reg, dest);
    IA_NEXT
}

const MUL: [IntCodeFn; 7] = [
    mul_i8, mul_i16, mul_i32, mul_i64, mul_f32, mul_f64, mul_v128,
];

macro_rules! mul_hi_family {
    ($( $name:ident, $get:ident, $set:ident, $u:ty, $s_:ty, $wide_u:ty, $wide_s:ty, $sh:expr; )*) => {
        $( fn $name(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
            let a = s.$get(i.src1_reg);
            let b = s.$get(i.src2_reg);
            let r = if i.flags & ARITHMETIC_UNSIGNED != 0 {
                ((a as $wide_u * b as $wide_u) >> $sh) as $u
            } else {
                (((a as $s_ as $wide_s).wrapping_mul(b as $s_ as $wide_s)) >> $sh) as $u
            };
            s.$set(i.dest_reg, r);
            IA_NEXT
        } )*
    };
}

mul_hi_family! {
    mul_hi_i8, get_u8, set_u8, u8, i8, u16, i16, 8;
    mul_hi_i16, get_u16, set_u16, u16, i16, u32, i32, 16;
    mul_hi_i32, get_u32, set_u32, u32, i32, u64, i64, 32;
    mul_hi_i64, get_u64, set_u64, u64, i64, u128, i128, 64;
}

const MUL_HI: [IntCodeFn; 7] = [
    mul_hi_i8, mul_hi_i16, mul_hi_i32, mul_hi_i64, INVALID_TYPE, INVALID_TYPE, INVALID_TYPE,
];

macro_rules! div_family {
    ($( $name:ident, $get:ident, $set:ident, $u:ty, $s_:ty; )*) => {
        $( fn $name(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
            let a = s.$get(i.src1_reg);
            let b = s.$get(i.src2_reg);
            let r = if b == 0 {
                // Division by zero is architecturally undefined; produce
                // zero rather than faulting the host.
                0
            } else if i.flags & ARITHMETIC_UNSIGNED != 0 {
                (a as $u).wrapping_div(b as $u)
            } else {
                (a as $s_).wrapping_div(b as $s_) as $u
            };
            s.$set(i.dest_reg, r);
            IA_NEXT
        } )*
    };
}

div_family! {
    div_i8, get_u8, set_u8, u8, i8;
    div_i16, get_u16, set_u16, u16, i16;
    div_i32, get_u32, set_u32, u32, i32;
    div_i64, get_u64, set_u64, u64, i64;
}

binop!(div_f32, get_f32, set_f32, |a, b| a / b);
binop!(div_f64, get_f64, set_f64, |a, b| a / b);

fn div_v128(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
    let (a, b) = (s.get(i.src1_reg), s.get(i.src2_reg));
    let mut dest = Vec128::ZERO;
    for n in 0..4 {
        dest.set_f32(n, a.f32(n) / b.f32(n));
    }
    s.set(i.dest_reg, dest);
    IA_NEXT
}

const DIV: [IntCodeFn; 7] = [
    div_i8, div_i16, div_i32, div_i64, div_f32, div_f64, div_v128,
];

triop!(mul_add_i8, get_u8, set_u8, |a, b, c| a.wrapping_mul(b).wrapping_add(c));
triop!(mul_add_i16, get_u16, set_u16, |a, b, c| a.wrapping_mul(b).wrapping_add(c));
triop!(mul_add_i32, get_u32, set_u32, |a, b, c| a.wrapping_mul(b).wrapping_add(c));
triop!(mul_add_i64, get_u64, set_u64, |a, b, c| a.wrapping_mul(b).wrapping_add(c));
triop!(mul_add_f32, get_f32, set_f32, |a, b, c| a * b + c);
triop!(mul_add_f64, get_f64, set_f64, |a, b, c| a * b + c);

fn mul_add_v128(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
    let (a, b, c) = (s.get(i.src1_reg), s.get(i.src2_reg), s.get(i.src3_reg));
    let mut dest = Vec128::ZERO;
    for n in 0..4 {
        dest.set_f32(n, a.f32(n) * b.f32(n) + c.f32(n));
    }
    s.set(i.dest_reg, dest);
    IA_NEXT
}

const MUL_ADD: [IntCodeFn; 7] = [
    mul_add_i8, mul_add_i16, mul_add_i32, mul_add_i64, mul_add_f32, mul_add_f64, mul_add_v128,
];

triop!(mul_sub_i8, get_u8, set_u8, |a, b, c| a.wrapping_mul(b).wrapping_sub(c));
triop!(mul_sub_i16, get_u16, set_u16, |a, b, c| a.wrapping_mul(b).wrapping_sub(c));
triop!(mul_sub_i32, get_u32, set_u32, |a, b, c| a.wrapping_mul(b).wrapping_sub(c));
triop!(mul_sub_i64, get_u64, set_u64, |a, b, c| a.wrapping_mul(b).wrapping_sub(c));
triop!(mul_sub_f32, get_f32, set_f32, |a, b, c| a * b - c);
triop!(mul_sub_f64, get_f64, set_f64, |a, b, c| a * b - c);

fn mul_sub_v128(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
    let (a, b, c) = (s.get(i.src1_reg), s.get(i.src2_reg), s.get(i.src3_reg));
    let mut dest = Vec128::ZERO;
    for n in 0..4 {
        dest.set_f32(n, a.f32(n) * b.f32(n) - c.f32(n));
    }
    s.set(i.dest_reg, dest);
    IA_NEXT
}

const MUL_SUB: [IntCodeFn; 7] = [
    mul_sub_i8, mul_sub_i16, mul_sub_i32, mul_sub_i64, mul_sub_f32, mul_sub_f64, mul_sub_v128,
];

unop!(neg_i8, get_u8, set_u8, |a| a.wrapping_neg());
unop!(neg_i16, get_u16, set_u16, |a| a.wrapping_neg());
unop!(neg_i32, get_u32, set_u32, |a| a.wrapping_neg());
unop!(neg_i64, get_u64, set_u64, |a| a.wrapping_neg());
unop!(neg_f32, get_f32, set_f32, |a| -a);
unop!(neg_f64, get_f64, set_f64, |a| -a);

fn neg_v128(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
    let a = s.get(i.src1_reg);
    let mut dest = Vec128::ZERO;
    for n in 0..4 {
        dest.set_f32(n, -a.f32(n));
    }
    s.set(i.dest_reg, dest);
    IA_NEXT
}

const NEG: [IntCodeFn; 7] = [
    neg_i8, neg_i16, neg_i32, neg_i64, neg_f32, neg_f64, neg_v128,
];

unop!(abs_i8, get_u8, set_u8, |a| (a as i8).wrapping_abs() as u8);
unop!(abs_i16, get_u16, set_u16, |a| (a as i16).wrapping_abs() as u16);
unop!(abs_i32, get_u32, set_u32, |a| (a as i32).wrapping_abs() as u32);
unop!(abs_i64, get_u64, set_u64, |a| (a as i64).wrapping_abs() as u64);
unop!(abs_f32, get_f32, set_f32, |a| a.abs());
unop!(abs_f64, get_f64, set_f64, |a| a.abs());

fn abs_v128(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
    let a = s.get(i.src1_reg);
    let mut dest = Vec128::ZERO;
    for n in 0..4 {
        dest.set_f32(n, a.f32(n).abs());
    }
    s.set(i.dest_reg, dest);
    IA_NEXT
}

const ABS: [IntCodeFn; 7] = [
    abs_i8, abs_i16, abs_i32, abs_i64, abs_f32, abs_f64, abs_v128,
];

unop!(sqrt_f32, get_f32, set_f32, |a| a.sqrt());
unop!(sqrt_f64, get_f64, set_f64, |a| a.sqrt());

fn sqrt_v128(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
    let a = s.get(i.src1_reg);
    let mut dest = Vec128::ZERO;
    for n in 0..4 {
        dest.set_f32(n, a.f32(n).sqrt());
    }
    s.set(i.dest_reg, dest);
    IA_NEXT
}

const SQRT: [IntCodeFn; 7] = [
    INVALID_TYPE, INVALID_TYPE, INVALID_TYPE, INVALID_TYPE, sqrt_f32, sqrt_f64, sqrt_v128,
];

fn rsqrt_v128(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
    let r = vector::rsqrt(s.get(i.src1_reg));
    s.set(i.dest_reg, r);
    IA_NEXT
}

const RSQRT: [IntCodeFn; 7] = [
    INVALID_TYPE, INVALID_TYPE, INVALID_TYPE, INVALID_TYPE, INVALID_TYPE, INVALID_TYPE,
    rsqrt_v128,
];

fn dot_product_3(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
    let r = vector::dot3(s.get(i.src1_reg), s.get(i.src2_reg));
    s.set_f32(i.dest_reg, r);
    IA_NEXT
}

fn dot_product_4(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
    let r = vector::dot4(s.get(i.src1_reg), s.get(i.src2_reg));
    s.set_f32(i.dest_reg, r);
    IA_NEXT
}

// Bitwise.

macro_rules! bitwise_family {
    ($table:ident, $op:tt, $n8:ident, $n16:ident, $n32:ident, $n64:ident, $nv:ident) => {
        binop!($n8, get_u8, set_u8, |a, b| a $op b);
        binop!($n16, get_u16, set_u16, |a, b| a $op b);
        binop!($n32, get_u32, set_u32, |a, b| a $op b);
        binop!($n64, get_u64, set_u64, |a, b| a $op b);
        fn $nv(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
            let (a, b) = (s.get(i.src1_reg), s.get(i.src2_reg));
            let r = Vec128::from_u64x2(a.low() $op b.low(), a.high() $op b.high());
            s.set(i.dest_reg, r);
            IA_NEXT
        }
        const $table: [IntCodeFn; 7] =
            [$n8, $n16, $n32, $n64, INVALID_TYPE, INVALID_TYPE, $nv];
    };
}

bitwise_family!(AND, &, and_i8, and_i16, and_i32, and_i64, and_v128);
bitwise_family!(OR, |, or_i8, or_i16, or_i32, or_i64, or_v128);
bitwise_family!(XOR, ^, xor_i8, xor_i16, xor_i32, xor_i64, xor_v128);

unop!(not_i8, get_u8, set_u8, |a| !a);
unop!(not_i16, get_u16, set_u16, |a| !a);
unop!(not_i32, get_u32, set_u32, |a| !a);
unop!(not_i64, get_u64, set_u64, |a| !a);

fn not_v128(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
    let a = s.get(i.src1_reg);
    s.set(i.dest_reg, Vec128::from_u64x2(!a.low(), !a.high()));
    IA_NEXT
}

const NOT: [IntCodeFn; 7] = [
    not_i8, not_i16, not_i32, not_i64, INVALID_TYPE, INVALID_TYPE, not_v128,
];

// Shifts take their count from the low byte of src2; counts at or beyond
// the width drain to zero (sign fill for arithmetic shifts).

macro_rules! shift_family {
    ($table:ident, $( $name:ident, $get:ident, $set:ident, $u:ty, $s_:ty, $bits:expr, $kind:tt; )*) => {
        $( fn $name(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
            let a = s.$get(i.src1_reg);
            let n = s.get_u8(i.src2_reg) as u32;
            let r = shift_family!(@apply $kind, a, n, $u, $s_, $bits);
            s.$set(i.dest_reg, r);
            IA_NEXT
        } )*
        const $table: [IntCodeFn; 7] = [
            $($name,)* INVALID_TYPE, INVALID_TYPE, INVALID_TYPE,
        ];
    };
    (@apply shl, $a:ident, $n:ident, $u:ty, $s_:ty, $bits:expr) => {
        if $n >= $bits { 0 } else { ($a as $u) << $n }
    };
    (@apply shr, $a:ident, $n:ident, $u:ty, $s_:ty, $bits:expr) => {
        if $n >= $bits { 0 } else { ($a as $u) >> $n }
    };
    (@apply sha, $a:ident, $n:ident, $u:ty, $s_:ty, $bits:expr) => {
        if $n >= $bits {
            (($a as $s_) >> ($bits - 1)) as $u
        } else {
            (($a as $s_) >> $n) as $u
        }
    };
}

shift_family! {
    SHL,
    shl_i8, get_u8, set_u8, u8, i8, 8, shl;
    shl_i16, get_u16, set_u16, u16, i16, 16, shl;
    shl_i32, get_u32, set_u32, u32, i32, 32, shl;
    shl_i64, get_u64, set_u64, u64, i64, 64, shl;
}

shift_family! {
    SHR,
    shr_i8, get_u8, set_u8, u8, i8, 8, shr;
    shr_i16, get_u16, set_u16, u16, i16, 16, shr;
    shr_i32, get_u32, set_u32, u32, i32, 32, shr;
    shr_i64, get_u64, set_u64, u64, i64, 64, shr;
}

shift_family! {
    SHA,
    sha_i8, get_u8, set_u8, u8, i8, 8, sha;
    sha_i16, get_u16, set_u16, u16, i16, 16, sha;
    sha_i32, get_u32, set_u32, u32, i32, 32, sha;
    sha_i64, get_u64, set_u64, u64, i64, 64, sha;
}

macro_rules! vshift {
    ($name:ident, $f:path) => {
        fn $name(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
            let elem = elem_from_flags(i.flags);
            let r = $f(elem, s.get(i.src1_reg), s.get(i.src2_reg));
            s.set(i.dest_reg, r);
            IA_NEXT
        }
    };
}

vshift!(vector_shl, vector::shl);
vshift!(vector_shr, vector::shr);
vshift!(vector_sha, vector::sha);

binop!(rotate_left_i8, get_u8, set_u8, |a, b| a.rotate_left(b as u32 % 8));
binop!(rotate_left_i16, get_u16, set_u16, |a, b| a.rotate_left(b as u32 % 16));
binop!(rotate_left_i32, get_u32, set_u32, |a, b| a.rotate_left(b as u32 % 32));
binop!(rotate_left_i64, get_u64, set_u64, |a, b| a.rotate_left(b as u32 % 64));

const ROTATE_LEFT: [IntCodeFn; 7] = [
    rotate_left_i8, rotate_left_i16, rotate_left_i32, rotate_left_i64, INVALID_TYPE,
    INVALID_TYPE, INVALID_TYPE,
];

unop!(byte_swap_i16, get_u16, set_u16, |a| a.swap_bytes());
unop!(byte_swap_i32, get_u32, set_u32, |a| a.swap_bytes());
unop!(byte_swap_i64, get_u64, set_u64, |a| a.swap_bytes());
unop!(byte_swap_v128, get, set, |a| a.byte_swap());

const BYTE_SWAP: [IntCodeFn; 7] = [
    INVALID_TYPE, byte_swap_i16, byte_swap_i32, byte_swap_i64, INVALID_TYPE, INVALID_TYPE,
    byte_swap_v128,
];

// Leading-zero counts produce an I8; a zero input yields the width.

unop!(cntlz_i8, get_u8, set_u8, |a| a.leading_zeros() as u8);
unop!(cntlz_i16, get_u16, set_u8, |a| a.leading_zeros() as u8);
unop!(cntlz_i32, get_u32, set_u8, |a| a.leading_zeros() as u8);
unop!(cntlz_i64, get_u64, set_u8, |a| a.leading_zeros() as u8);

const CNTLZ: [IntCodeFn; 7] = [
    cntlz_i8, cntlz_i16, cntlz_i32, cntlz_i64, INVALID_TYPE, INVALID_TYPE, INVALID_TYPE,
];

// Vector data movement.

macro_rules! extract_family {
    ($( $name:ident, $lane:ident, $set:ident; )*) => {
        $( fn $name(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
            let v = s.get(i.src1_reg);
            let lane = s.get_u64(i.src2_reg) as usize;
            let r = v.$lane(lane);
            s.$set(i.dest_reg, r);
            IA_NEXT
        } )*
    };
}

extract_family! {
    extract_i8, u8, set_u8;
    extract_i16, u16, set_u16;
    extract_i32, u32, set_u32;
}

macro_rules! splat_family {
    ($( $name:ident, $get:ident, $lanes:expr, $set_lane:ident; )*) => {
        $( fn $name(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
            let v = s.$get(i.src1_reg);
            let mut dest = Vec128::ZERO;
            for n in 0..$lanes {
                dest.$set_lane(n, v);
            }
            s.set(i.dest_reg, dest);
            IA_NEXT
        } )*
    };
}

splat_family! {
    splat_i8, get_u8, 16, set_u8;
    splat_i16, get_u16, 8, set_u16;
    splat_i32, get_u32, 4, set_u32;
    splat_f32, get_f32, 4, set_f32;
}

fn permute_by_u32(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
    let control = s.get_u32(i.src1_reg);
    let r = vector::permute_by_u32(control, s.get(i.src2_reg), s.get(i.src3_reg));
    s.set(i.dest_reg, r);
    IA_NEXT
}

fn permute_by_v128(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
    let r = vector::permute_bytes(s.get(i.src1_reg), s.get(i.src2_reg), s.get(i.src3_reg));
    s.set(i.dest_reg, r);
    IA_NEXT
}

fn swizzle(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
    let r = vector::swizzle_u32(i.flags as u8, s.get(i.src1_reg));
    s.set(i.dest_reg, r);
    IA_NEXT
}

// Atomics operate host-order on the guest cell.

macro_rules! atomic_family {
    ($( $name:ident, $atomic:ident, $get:ident, $set:ident, $t:ty, $body:ident; )*) => {
        $( fn $name(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
            let address = s.get_u32(i.src1_reg);
            debug_assert_eq!(address as usize % std::mem::size_of::<$t>(), 0);
            // Safety: aligned guest cell; atomics give the locked-sequence
            // semantics the interpreter owes the native backend.
            let cell = unsafe { &*(s.mem(address) as *const $atomic) };
            atomic_family!(@body $body, s, i, cell, $get, $set);
            IA_NEXT
        } )*
    };
    (@body xchg, $s:ident, $i:ident, $cell:ident, $get:ident, $set:ident) => {
        let old = $cell.swap($s.$get($i.src2_reg), Ordering::SeqCst);
        $s.$set($i.dest_reg, old);
    };
    (@body add, $s:ident, $i:ident, $cell:ident, $get:ident, $set:ident) => {
        let old = $cell.fetch_add($s.$get($i.src2_reg), Ordering::SeqCst);
        $s.$set($i.dest_reg, old);
    };
    (@body sub, $s:ident, $i:ident, $cell:ident, $get:ident, $set:ident) => {
        let old = $cell.fetch_sub($s.$get($i.src2_reg), Ordering::SeqCst);
        $s.$set($i.dest_reg, old);
    };
    (@body cas, $s:ident, $i:ident, $cell:ident, $get:ident, $set:ident) => {
        let cmp = $s.$get($i.src2_reg);
        let new = $s.$get($i.src3_reg);
        let old = match $cell.compare_exchange(cmp, new, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(v) | Err(v) => v,
        };
        $s.$set($i.dest_reg, old);
    };
}

atomic_family! {
    compare_exchange_i32, AtomicU32, get_u32, set_u32, u32, cas;
    compare_exchange_i64, AtomicU64, get_u64, set_u64, u64, cas;
    atomic_exchange_i32, AtomicU32, get_u32, set_u32, u32, xchg;
    atomic_exchange_i64, AtomicU64, get_u64, set_u64, u64, xchg;
    atomic_add_i32, AtomicU32, get_u32, set_u32, u32, add;
    atomic_add_i64, AtomicU64, get_u64, set_u64, u64, add;
    atomic_sub_i32, AtomicU32, get_u32, set_u32, u32, sub;
    atomic_sub_i64, AtomicU64, get_u64, set_u64, u64, sub;
}

const COMPARE_EXCHANGE: [IntCodeFn; 7] = [
    INVALID_TYPE, INVALID_TYPE, compare_exchange_i32, compare_exchange_i64, INVALID_TYPE,
    INVALID_TYPE, INVALID_TYPE,
];

const ATOMIC_EXCHANGE: [IntCodeFn; 7] = [
    INVALID_TYPE, INVALID_TYPE, atomic_exchange_i32, atomic_exchange_i64, INVALID_TYPE,
    INVALID_TYPE, INVALID_TYPE,
];

const ATOMIC_ADD: [IntCodeFn; 7] = [
    INVALID_TYPE, INVALID_TYPE, atomic_add_i32, atomic_add_i64, INVALID_TYPE, INVALID_TYPE,
    INVALID_TYPE,
];

const ATOMIC_SUB: [IntCodeFn; 7] = [
    INVALID_TYPE, INVALID_TYPE, atomic_sub_i32, atomic_sub_i64, INVALID_TYPE, INVALID_TYPE,
    INVALID_TYPE,
];

// Min/max.

macro_rules! minmax_family {
    ($table:ident, $pick:tt, $( $name:ident, $get:ident, $set:ident, $s_:ty; )* => $fname:ident, $fget:ident, $fset:ident; $dname:ident, $dget:ident, $dset:ident; $vname:ident) => {
        $( binop!($name, $get, $set, |a, b| {
            if (a as $s_) $pick (b as $s_) { a } else { b }
        }); )*
        binop!($fname, $fget, $fset, |a, b| if a $pick b { a } else { b });
        binop!($dname, $dget, $dset, |a, b| if a $pick b { a } else { b });
        fn $vname(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
            let (a, b) = (s.get(i.src1_reg), s.get(i.src2_reg));
            let mut dest = Vec128::ZERO;
            for n in 0..4 {
                let (x, y) = (a.f32(n), b.f32(n));
                dest.set_f32(n, if x $pick y { x } else { y });
            }
            s.set(i.dest_reg, dest);
            IA_NEXT
        }
        const $table: [IntCodeFn; 7] = [
            minmax_family!(@first $($name),*), minmax_family!(@second $($name),*),
            minmax_family!(@third $($name),*), minmax_family!(@fourth $($name),*),
            $fname, $dname, $vname,
        ];
    };
    (@first $a:ident, $b:ident, $c:ident, $d:ident) => { $a };
    (@second $a:ident, $b:ident, $c:ident, $d:ident) => { $b };
    (@third $a:ident, $b:ident, $c:ident, $d:ident) => { $c };
    (@fourth $a:ident, $b:ident, $c:ident, $d:ident) => { $d };
}

minmax_family! {
    MAX, >,
    max_i8, get_u8, set_u8, i8;
    max_i16, get_u16, set_u16, i16;
    max_i32, get_u32, set_u32, i32;
    max_i64, get_u64, set_u64, i64;
    => max_f32, get_f32, set_f32; max_f64, get_f64, set_f64; max_v128
}

minmax_family! {
    MIN, <,
    min_i8, get_u8, set_u8, i8;
    min_i16, get_u16, set_u16, i16;
    min_i32, get_u32, set_u32, i32;
    min_i64, get_u64, set_u64, i64;
    => min_f32, get_f32, set_f32; min_f64, get_f64, set_f64; min_v128
}

// lvsl/lvsr helper vectors.

fn load_vector_shl(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
    let r = vector::load_shl_vector(s.get_u8(i.src1_reg));
    s.set(i.dest_reg, r);
    IA_NEXT
}

fn load_vector_shr(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
    let r = vector::load_shr_vector(s.get_u8(i.src1_reg));
    s.set(i.dest_reg, r);
    IA_NEXT
}

fn load_clock(s: &mut IntCodeState<'_>, i: &IntCode) -> u32 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    s.set_u64(i.dest_reg, nanos);
    IA_NEXT
}

// Lowering dispatch.

fn by_type(tx: &mut TranslationContext<'_>, i: &Instr, ty: ValueType, fns: [IntCodeFn; 7]) {
    tx.emit(i, fns[ty as usize]);
}

fn dest_ty(tx: &TranslationContext<'_>, i: &Instr) -> ValueType {
    tx.hir.value(i.dest.expect("dest required")).ty
}

fn src1_ty(tx: &TranslationContext<'_>, i: &Instr) -> ValueType {
    tx.hir.value(i.src1.value()).ty
}

fn src2_ty(tx: &TranslationContext<'_>, i: &Instr) -> ValueType {
    tx.hir.value(i.src2.value()).ty
}

/// Lowers one HIR instruction, appending intcodes to the context.
pub(super) fn translate_instr(tx: &mut TranslationContext<'_>, i: &Instr) {
    use Opcode::*;
    use ValueType::*;

    match i.opcode {
        Comment => {
            // The comment index rides in the record's inline constant.
            let index = i.src1.offset();
            tx.intcodes.push(IntCode {
                fun: comment,
                flags: i.flags,
                dest_reg: 0,
                src1_reg: 0,
                src2_reg: 0,
                src3_reg: 0,
                constant: Vec128::from_u64x2(index, 0),
            });
        }
        SourceOffset => {}
        Nop => tx.emit(i, nop),
        DebugBreak => tx.emit(i, debug_break),
        DebugBreakTrue => by_type(tx, i, src1_ty(tx, i), DEBUG_BREAK_TRUE),
        Trap => tx.emit(i, trap),
        TrapTrue => by_type(tx, i, src1_ty(tx, i), TRAP_TRUE),
        Call => tx.emit(i, call),
        CallTrue => by_type(tx, i, src1_ty(tx, i), CALL_TRUE),
        CallIndirect => tx.emit(i, call_indirect),
        CallIndirectTrue => by_type(tx, i, src1_ty(tx, i), CALL_INDIRECT_TRUE),
        Return => tx.emit(i, ret),
        ReturnTrue => by_type(tx, i, src1_ty(tx, i), RETURN_TRUE),
        Branch => tx.emit(i, branch),
        BranchIf => by_type(tx, i, src1_ty(tx, i), BRANCH_IF),
        BranchTrue => by_type(tx, i, src1_ty(tx, i), BRANCH_TRUE),
        BranchFalse => by_type(tx, i, src1_ty(tx, i), BRANCH_FALSE),
        Assign => by_type(tx, i, dest_ty(tx, i), ASSIGN),
        Cast => tx.emit(i, cast),
        ZeroExtend => {
            let fun = match (src1_ty(tx, i), dest_ty(tx, i)) {
                (I8, I16) => zx_i8_i16,
                (I8, I32) => zx_i8_i32,
                (I8, I64) => zx_i8_i64,
                (I16, I32) => zx_i16_i32,
                (I16, I64) => zx_i16_i64,
                (I32, I64) => zx_i32_i64,
                (a, b) if a == b => ASSIGN[a as usize],
                _ => invalid_type,
            };
            tx.emit(i, fun);
        }
        SignExtend => {
            let fun = match (src1_ty(tx, i), dest_ty(tx, i)) {
                (I8, I16) => sx_i8_i16,
                (I8, I32) => sx_i8_i32,
                (I8, I64) => sx_i8_i64,
                (I16, I32) => sx_i16_i32,
                (I16, I64) => sx_i16_i64,
                (I32, I64) => sx_i32_i64,
                (a, b) if a == b => ASSIGN[a as usize],
                _ => invalid_type,
            };
            tx.emit(i, fun);
        }
        Truncate => {
            let fun = match (src1_ty(tx, i), dest_ty(tx, i)) {
                (I16, I8) => tr_i16_i8,
                (I32, I8) => tr_i32_i8,
                (I32, I16) => tr_i32_i16,
                (I64, I8) => tr_i64_i8,
                (I64, I16) => tr_i64_i16,
                (I64, I32) => tr_i64_i32,
                (a, b) if a == b => ASSIGN[a as usize],
                _ => invalid_type,
            };
            tx.emit(i, fun);
        }
        Convert => {
            let fun = match (src1_ty(tx, i), dest_ty(tx, i)) {
                (I32, F32) => cv_i32_f32,
                (F32, I32) => cv_f32_i32,
                (I64, F64) => cv_i64_f64,
                (F64, I64) => cv_f64_i64,
                (F32, F64) => cv_f32_f64,
                (F64, F32) => cv_f64_f32,
                _ => invalid_type,
            };
            tx.emit(i, fun);
        }
        VectorConvertI2F => tx.emit(i, vector_convert_i2f),
        VectorConvertF2I => tx.emit(i, vector_convert_f2i),
        LoadContext => by_type(tx, i, dest_ty(tx, i), LOAD_CONTEXT),
        StoreContext => by_type(tx, i, src2_ty(tx, i), STORE_CONTEXT),
        Load => by_type(tx, i, dest_ty(tx, i), LOAD),
        Store => by_type(tx, i, src2_ty(tx, i), STORE),
        Prefetch => tx.emit(i, nop),
        Max => by_type(tx, i, dest_ty(tx, i), MAX),
        Min => by_type(tx, i, dest_ty(tx, i), MIN),
        Select => by_type(tx, i, dest_ty(tx, i), SELECT),
        IsTrue => by_type(tx, i, src1_ty(tx, i), IS_TRUE),
        IsFalse => by_type(tx, i, src1_ty(tx, i), IS_FALSE),
        CompareEq => by_type(tx, i, src1_ty(tx, i), CMP_EQ::TABLE),
        CompareNe => by_type(tx, i, src1_ty(tx, i), CMP_NE::TABLE),
        CompareSlt => by_type(tx, i, src1_ty(tx, i), CMP_SLT::TABLE),
        CompareSle => by_type(tx, i, src1_ty(tx, i), CMP_SLE::TABLE),
        CompareSgt => by_type(tx, i, src1_ty(tx, i), CMP_SGT::TABLE),
        CompareSge => by_type(tx, i, src1_ty(tx, i), CMP_SGE::TABLE),
        CompareUlt => by_type(tx, i, src1_ty(tx, i), CMP_ULT::TABLE),
        CompareUle => by_type(tx, i, src1_ty(tx, i), CMP_ULE::TABLE),
        CompareUgt => by_type(tx, i, src1_ty(tx, i), CMP_UGT::TABLE),
        CompareUge => by_type(tx, i, src1_ty(tx, i), CMP_UGE::TABLE),
        DidCarry => tx.emit(i, did_carry),
        DidOverflow => tx.emit(i, invalid),
        VectorCompareEq => tx.emit(i, vector_compare_eq),
        VectorCompareSgt => tx.emit(i, vector_compare_sgt),
        VectorCompareSge => tx.emit(i, vector_compare_sge),
        VectorCompareUgt => tx.emit(i, vector_compare_ugt),
        VectorCompareUge => tx.emit(i, vector_compare_uge),
        Add => by_type(tx, i, dest_ty(tx, i), ADD),
        AddCarry => by_type(tx, i, dest_ty(tx, i), ADD_CARRY),
        Sub => by_type(tx, i, dest_ty(tx, i), SUB),
        Mul => by_type(tx, i, dest_ty(tx, i), MUL),
        MulHi => by_type(tx, i, dest_ty(tx, i), MUL_HI),
        Div => by_type(tx, i, dest_ty(tx, i), DIV),
        MulAdd => by_type(tx, i, dest_ty(tx, i), MUL_ADD),
        MulSub => by_type(tx, i, dest_ty(tx, i), MUL_SUB),
        Neg => by_type(tx, i, dest_ty(tx, i), NEG),
        Abs => by_type(tx, i, dest_ty(tx, i), ABS),
        Sqrt => by_type(tx, i, dest_ty(tx, i), SQRT),
        Rsqrt => by_type(tx, i, src1_ty(tx, i), RSQRT),
        DotProduct3 => tx.emit(i, dot_product_3),
        DotProduct4 => tx.emit(i, dot_product_4),
        And => by_type(tx, i, dest_ty(tx, i), AND),
        Or => by_type(tx, i, dest_ty(tx, i), OR),
        Xor => by_type(tx, i, dest_ty(tx, i), XOR),
        Not => by_type(tx, i, dest_ty(tx, i), NOT),
        Shl => by_type(tx, i, dest_ty(tx, i), SHL),
        VectorShl => tx.emit(i, vector_shl),
        Shr => by_type(tx, i, dest_ty(tx, i), SHR),
        VectorShr => tx.emit(i, vector_shr),
        Sha => by_type(tx, i, dest_ty(tx, i), SHA),
        VectorSha => tx.emit(i, vector_sha),
        RotateLeft => by_type(tx, i, dest_ty(tx, i), ROTATE_LEFT),
        ByteSwap => by_type(tx, i, dest_ty(tx, i), BYTE_SWAP),
        Cntlz => by_type(tx, i, src1_ty(tx, i), CNTLZ),
        Insert => tx.emit(i, invalid),
        Extract => {
            let fun = match (src1_ty(tx, i), dest_ty(tx, i)) {
                (V128, I8) => extract_i8,
                (V128, I16) => extract_i16,
                (V128, I32) => extract_i32,
                _ => invalid_type,
            };
            tx.emit(i, fun);
        }
        Splat => {
            let fun = match (src1_ty(tx, i), dest_ty(tx, i)) {
                (I8, V128) => splat_i8,
                (I16, V128) => splat_i16,
                (I32, V128) => splat_i32,
                (F32, V128) => splat_f32,
                _ => invalid_type,
            };
            tx.emit(i, fun);
        }
        Permute => {
            let fun = match (src1_ty(tx, i), dest_ty(tx, i)) {
                (I32, V128) => permute_by_u32,
                (V128, V128) => permute_by_v128,
                _ => invalid_type,
            };
            tx.emit(i, fun);
        }
        Swizzle => tx.emit(i, swizzle),
        Pack | Unpack => tx.emit(i, invalid),
        CompareExchange => by_type(tx, i, dest_ty(tx, i), COMPARE_EXCHANGE),
        AtomicExchange => by_type(tx, i, dest_ty(tx, i), ATOMIC_EXCHANGE),
        AtomicAdd => by_type(tx, i, dest_ty(tx, i), ATOMIC_ADD),
        AtomicSub => by_type(tx, i, dest_ty(tx, i), ATOMIC_SUB),
        LoadVectorShl => tx.emit(i, load_vector_shl),
        LoadVectorShr => tx.emit(i, load_vector_shr),
        LoadClock => tx.emit(i, load_clock),
    }
}
