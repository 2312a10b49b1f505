//! Scalar load/store emitters.
//!
//! The guest is big-endian: every halfword/word/doubleword round-trip
//! through guest memory carries an explicit byte swap, except the
//! byte-reversed forms which are already in host order.

use xenon_asm::{Instr, PpcOp};

use crate::error::TranslationError;
use crate::frontend::PpcHirBuilder;
use crate::hir::{ValueId, ValueType};

fn ea_d(b: &mut PpcHirBuilder, i: Instr) -> ValueId {
    let disp = b.f.load_constant(i.d().simm() as i64 as u64);
    if i.d().ra() == 0 {
        disp
    } else {
        let ra = b.load_gpr(i.d().ra());
        b.f.add(ra, disp, 0)
    }
}

fn ea_ds(b: &mut PpcHirBuilder, i: Instr) -> ValueId {
    let disp = b.f.load_constant(i.d().ds() as i64 as u64);
    if i.d().ra() == 0 {
        disp
    } else {
        let ra = b.load_gpr(i.d().ra());
        b.f.add(ra, disp, 0)
    }
}

fn ea_x(b: &mut PpcHirBuilder, i: Instr) -> ValueId {
    let ra = b.load_gpr0(i.x().ra());
    let rb = b.load_gpr(i.x().rb());
    b.f.add(ra, rb, 0)
}

/// Update-form EA: RA must name a register and is written back.
fn ea_d_update(b: &mut PpcHirBuilder, i: Instr) -> ValueId {
    let ra = b.load_gpr(i.d().ra());
    let disp = b.f.load_constant(i.d().simm() as i64 as u64);
    b.f.add(ra, disp, 0)
}

fn load_swapped(b: &mut PpcHirBuilder, ea: ValueId, ty: ValueType) -> ValueId {
    let raw = b.f.load(ea, ty);
    if ty == ValueType::I8 {
        raw
    } else {
        b.f.byte_swap(raw)
    }
}

fn store_swapped(b: &mut PpcHirBuilder, ea: ValueId, v: ValueId) {
    let ty = b.f.value(v).ty;
    let v = if ty == ValueType::I8 { v } else { b.f.byte_swap(v) };
    b.f.store(ea, v);
}

fn emit_load(b: &mut PpcHirBuilder, i: Instr, ea: ValueId, ty: ValueType, signed: bool) {
    let v = load_swapped(b, ea, ty);
    let v = if signed {
        b.f.sign_extend(v, ValueType::I64)
    } else {
        b.f.zero_extend(v, ValueType::I64)
    };
    b.store_gpr(i.d().rt(), v);
}

fn emit_store(b: &mut PpcHirBuilder, i: Instr, ea: ValueId, ty: ValueType) {
    let rs = b.load_gpr(i.d().rt());
    let v = b.f.truncate(rs, ty);
    store_swapped(b, ea, v);
}

pub(super) fn emit(b: &mut PpcHirBuilder, i: Instr, op: PpcOp) -> Result<(), TranslationError> {
    use PpcOp::*;
    match op {
        Lbz => {
            let ea = ea_d(b, i);
            emit_load(b, i, ea, ValueType::I8, false);
        }
        Lbzu => {
            let ea = ea_d_update(b, i);
            emit_load(b, i, ea, ValueType::I8, false);
            b.store_gpr(i.d().ra(), ea);
        }
        Lhz => {
            let ea = ea_d(b, i);
            emit_load(b, i, ea, ValueType::I16, false);
        }
        Lhzu => {
            let ea = ea_d_update(b, i);
            emit_load(b, i, ea, ValueType::I16, false);
            b.store_gpr(i.d().ra(), ea);
        }
        Lha => {
            let ea = ea_d(b, i);
            emit_load(b, i, ea, ValueType::I16, true);
        }
        Lhau => {
            let ea = ea_d_update(b, i);
            emit_load(b, i, ea, ValueType::I16, true);
            b.store_gpr(i.d().ra(), ea);
        }
        Lwz => {
            let ea = ea_d(b, i);
            emit_load(b, i, ea, ValueType::I32, false);
        }
        Lwzu => {
            let ea = ea_d_update(b, i);
            emit_load(b, i, ea, ValueType::I32, false);
            b.store_gpr(i.d().ra(), ea);
        }
        Lwa => {
            let ea = ea_ds(b, i);
            emit_load(b, i, ea, ValueType::I32, true);
        }
        Ld => {
            let ea = ea_ds(b, i);
            let v = load_swapped(b, ea, ValueType::I64);
            b.store_gpr(i.d().rt(), v);
        }
        Ldu => {
            let ra = b.load_gpr(i.d().ra());
            let disp = b.f.load_constant(i.d().ds() as i64 as u64);
            let ea = b.f.add(ra, disp, 0);
            let v = load_swapped(b, ea, ValueType::I64);
            b.store_gpr(i.d().rt(), v);
            b.store_gpr(i.d().ra(), ea);
        }
        Stb => {
            let ea = ea_d(b, i);
            emit_store(b, i, ea, ValueType::I8);
        }
        Stbu => {
            let ea = ea_d_update(b, i);
            emit_store(b, i, ea, ValueType::I8);
            b.store_gpr(i.d().ra(), ea);
        }
        Sth => {
            let ea = ea_d(b, i);
            emit_store(b, i, ea, ValueType::I16);
        }
        Sthu => {
            let ea = ea_d_update(b, i);
            emit_store(b, i, ea, ValueType::I16);
            b.store_gpr(i.d().ra(), ea);
        }
        Stw => {
            let ea = ea_d(b, i);
            emit_store(b, i, ea, ValueType::I32);
        }
        Stwu => {
            let ea = ea_d_update(b, i);
            emit_store(b, i, ea, ValueType::I32);
            b.store_gpr(i.d().ra(), ea);
        }
        Std => {
            let ea = ea_ds(b, i);
            let rs = b.load_gpr(i.d().rt());
            store_swapped(b, ea, rs);
        }
        Stdu => {
            let ra = b.load_gpr(i.d().ra());
            let disp = b.f.load_constant(i.d().ds() as i64 as u64);
            let ea = b.f.add(ra, disp, 0);
            let rs = b.load_gpr(i.d().rt());
            store_swapped(b, ea, rs);
            b.store_gpr(i.d().ra(), ea);
        }

        Lbzx => {
            let ea = ea_x(b, i);
            emit_load(b, i, ea, ValueType::I8, false);
        }
        Lbzux => {
            let ea = ea_x(b, i);
            emit_load(b, i, ea, ValueType::I8, false);
            b.store_gpr(i.x().ra(), ea);
        }
        Lhzx => {
            let ea = ea_x(b, i);
            emit_load(b, i, ea, ValueType::I16, false);
        }
        Lhzux => {
            let ea = ea_x(b, i);
            emit_load(b, i, ea, ValueType::I16, false);
            b.store_gpr(i.x().ra(), ea);
        }
        Lhax => {
            let ea = ea_x(b, i);
            emit_load(b, i, ea, ValueType::I16, true);
        }
        Lwzx => {
            let ea = ea_x(b, i);
            emit_load(b, i, ea, ValueType::I32, false);
        }
        Lwzux => {
            let ea = ea_x(b, i);
            emit_load(b, i, ea, ValueType::I32, false);
            b.store_gpr(i.x().ra(), ea);
        }
        Ldx => {
            let ea = ea_x(b, i);
            let v = load_swapped(b, ea, ValueType::I64);
            b.store_gpr(i.x().rt(), v);
        }
        Ldux => {
            let ea = ea_x(b, i);
            let v = load_swapped(b, ea, ValueType::I64);
            b.store_gpr(i.x().rt(), v);
            b.store_gpr(i.x().ra(), ea);
        }
        Stbx => {
            let ea = ea_x(b, i);
            emit_store(b, i, ea, ValueType::I8);
        }
        Stbux => {
            let ea = ea_x(b, i);
            emit_store(b, i, ea, ValueType::I8);
            b.store_gpr(i.x().ra(), ea);
        }
        Sthx => {
            let ea = ea_x(b, i);
            emit_store(b, i, ea, ValueType::I16);
        }
        Stwx => {
            let ea = ea_x(b, i);
            emit_store(b, i, ea, ValueType::I32);
        }
        Stwux => {
            let ea = ea_x(b, i);
            emit_store(b, i, ea, ValueType::I32);
            b.store_gpr(i.x().ra(), ea);
        }
        Stdx => {
            let ea = ea_x(b, i);
            let rs = b.load_gpr(i.x().rt());
            store_swapped(b, ea, rs);
        }

        // Byte-reversed forms are host-order already.
        Lhbrx => {
            let ea = ea_x(b, i);
            let v = b.f.load(ea, ValueType::I16);
            let v = b.f.zero_extend(v, ValueType::I64);
            b.store_gpr(i.x().rt(), v);
        }
        Lwbrx => {
            let ea = ea_x(b, i);
            let v = b.f.load(ea, ValueType::I32);
            let v = b.f.zero_extend(v, ValueType::I64);
            b.store_gpr(i.x().rt(), v);
        }
        Sthbrx => {
            let ea = ea_x(b, i);
            let rs = b.load_gpr(i.x().rt());
            let v = b.f.truncate(rs, ValueType::I16);
            b.f.store(ea, v);
        }
        Stwbrx => {
            let ea = ea_x(b, i);
            let rs = b.load_gpr(i.x().rt());
            let v = b.f.truncate(rs, ValueType::I32);
            b.f.store(ea, v);
        }

        // Reservation pairs: loads ignore the reservation, conditional
        // stores always succeed (single guest-thread interleaving model;
        // CR0 reports success).
        Lwarx => {
            let ea = ea_x(b, i);
            emit_load(b, i, ea, ValueType::I32, false);
        }
        Ldarx => {
            let ea = ea_x(b, i);
            let v = load_swapped(b, ea, ValueType::I64);
            b.store_gpr(i.x().rt(), v);
        }
        Stwcx => {
            let ea = ea_x(b, i);
            emit_store(b, i, ea, ValueType::I32);
            emit_store_conditional_cr0(b);
        }
        Stdcx => {
            let ea = ea_x(b, i);
            let rs = b.load_gpr(i.x().rt());
            store_swapped(b, ea, rs);
            emit_store_conditional_cr0(b);
        }

        Lfs => {
            let ea = ea_d(b, i);
            let raw = load_swapped(b, ea, ValueType::I32);
            let f = b.f.cast(raw, ValueType::F32);
            let v = b.f.convert(f, ValueType::F64);
            b.store_fpr(i.d().rt(), v);
        }
        Lfd => {
            let ea = ea_d(b, i);
            let raw = load_swapped(b, ea, ValueType::I64);
            let v = b.f.cast(raw, ValueType::F64);
            b.store_fpr(i.d().rt(), v);
        }
        Stfs => {
            let ea = ea_d(b, i);
            let frs = b.load_fpr(i.d().rt());
            let f = b.f.convert(frs, ValueType::F32);
            let bits = b.f.cast(f, ValueType::I32);
            store_swapped(b, ea, bits);
        }
        Stfd => {
            let ea = ea_d(b, i);
            let frs = b.load_fpr(i.d().rt());
            let bits = b.f.cast(frs, ValueType::I64);
            store_swapped(b, ea, bits);
        }

        _ => {
            return Err(TranslationError::Unimplemented {
                address: b.address(),
                op,
            })
        }
    }
    Ok(())
}

/// CR0 after a conditional store that (always) succeeded: EQ set, LT/GT
/// clear, SO copied.
fn emit_store_conditional_cr0(b: &mut PpcHirBuilder) {
    let zero = b.f.load_zero(ValueType::I8);
    let one = b.f.load_constant(1u8);
    b.store_cr_cmp(0, zero, zero, one);
}
