//! Integer arithmetic, logical, shift, rotate, and compare emitters.

use xenon_asm::{Instr, PpcOp};

use crate::error::TranslationError;
use crate::frontend::PpcHirBuilder;
use crate::hir::{ValueId, ValueType, ARITHMETIC_SET_CARRY, ARITHMETIC_UNSIGNED};

/// 32-bit rotate mask from PPC mb/me bit numbers (bit 0 = MSB).
fn mask32(mb: u32, me: u32) -> u32 {
    let head = u32::MAX >> mb;
    let tail = u32::MAX << (31 - me);
    if mb <= me {
        head & tail
    } else {
        head | tail
    }
}

pub(super) fn emit(b: &mut PpcHirBuilder, i: Instr, op: PpcOp) -> Result<(), TranslationError> {
    use PpcOp::*;
    match op {
        Addi => {
            let imm = b.f.load_constant(i.d().simm() as i64 as u64);
            let v = if i.d().ra() == 0 {
                imm
            } else {
                let ra = b.load_gpr(i.d().ra());
                b.f.add(ra, imm, 0)
            };
            b.store_gpr(i.d().rt(), v);
        }
        Addis => {
            let imm = b.f.load_constant(((i.d().simm() as i64) << 16) as u64);
            let v = if i.d().ra() == 0 {
                imm
            } else {
                let ra = b.load_gpr(i.d().ra());
                b.f.add(ra, imm, 0)
            };
            b.store_gpr(i.d().rt(), v);
        }
        Addic | AddicRc => {
            let ra = b.load_gpr(i.d().ra());
            let imm = b.f.load_constant(i.d().simm() as i64 as u64);
            let v = b.f.add(ra, imm, ARITHMETIC_SET_CARRY);
            let ca = b.f.did_carry(v);
            b.store_ca(ca);
            b.store_gpr(i.d().rt(), v);
            if op == AddicRc {
                b.update_cr0(v);
            }
        }
        Add => {
            let (ra, rb) = load_pair(b, i);
            let v = b.f.add(ra, rb, 0);
            b.store_gpr(i.xo().rt(), v);
            record(b, i, v);
        }
        Addc => {
            let (ra, rb) = load_pair(b, i);
            let v = b.f.add(ra, rb, ARITHMETIC_SET_CARRY);
            let ca = b.f.did_carry(v);
            b.store_ca(ca);
            b.store_gpr(i.xo().rt(), v);
            record(b, i, v);
        }
        Adde => {
            let (ra, rb) = load_pair(b, i);
            let ca = b.load_ca();
            let v = b.f.add_carry(ra, rb, ca, ARITHMETIC_SET_CARRY);
            let ca = b.f.did_carry(v);
            b.store_ca(ca);
            b.store_gpr(i.xo().rt(), v);
            record(b, i, v);
        }
        Addze => {
            let ra = b.load_gpr(i.xo().ra());
            let zero = b.f.load_zero(ValueType::I64);
            let ca = b.load_ca();
            let v = b.f.add_carry(ra, zero, ca, ARITHMETIC_SET_CARRY);
            let ca = b.f.did_carry(v);
            b.store_ca(ca);
            b.store_gpr(i.xo().rt(), v);
            record(b, i, v);
        }
        Subf => {
            let (ra, rb) = load_pair(b, i);
            let v = b.f.sub(rb, ra, 0);
            b.store_gpr(i.xo().rt(), v);
            record(b, i, v);
        }
        Subfc => {
            let (ra, rb) = load_pair(b, i);
            let v = b.f.sub(rb, ra, ARITHMETIC_SET_CARRY);
            let ca = b.f.did_carry(v);
            b.store_ca(ca);
            b.store_gpr(i.xo().rt(), v);
            record(b, i, v);
        }
        Subfe => {
            let (ra, rb) = load_pair(b, i);
            let nra = b.f.not(ra);
            let ca = b.load_ca();
            let v = b.f.add_carry(nra, rb, ca, ARITHMETIC_SET_CARRY);
            let ca = b.f.did_carry(v);
            b.store_ca(ca);
            b.store_gpr(i.xo().rt(), v);
            record(b, i, v);
        }
        Subfze => {
            let ra = b.load_gpr(i.xo().ra());
            let nra = b.f.not(ra);
            let zero = b.f.load_zero(ValueType::I64);
            let ca = b.load_ca();
            let v = b.f.add_carry(nra, zero, ca, ARITHMETIC_SET_CARRY);
            let ca = b.f.did_carry(v);
            b.store_ca(ca);
            b.store_gpr(i.xo().rt(), v);
            record(b, i, v);
        }
        Subfic => {
            let ra = b.load_gpr(i.d().ra());
            let imm = b.f.load_constant(i.d().simm() as i64 as u64);
            let v = b.f.sub(imm, ra, ARITHMETIC_SET_CARRY);
            let ca = b.f.did_carry(v);
            b.store_ca(ca);
            b.store_gpr(i.d().rt(), v);
        }
        Neg => {
            let ra = b.load_gpr(i.xo().ra());
            let v = b.f.neg(ra);
            b.store_gpr(i.xo().rt(), v);
            record(b, i, v);
        }
        Mulli => {
            let ra = b.load_gpr(i.d().ra());
            let imm = b.f.load_constant(i.d().simm() as i64 as u64);
            let v = b.f.mul(ra, imm);
            b.store_gpr(i.d().rt(), v);
        }
        Mullw => {
            let (ra, rb) = load_pair32_signed(b, i);
            let v = b.f.mul(ra, rb);
            b.store_gpr(i.xo().rt(), v);
            record(b, i, v);
        }
        Mulld => {
            let (ra, rb) = load_pair(b, i);
            let v = b.f.mul(ra, rb);
            b.store_gpr(i.xo().rt(), v);
            record(b, i, v);
        }
        Mulhw | Mulhwu => {
            let flags = if op == Mulhwu { ARITHMETIC_UNSIGNED } else { 0 };
            let ra = b.load_gpr(i.xo().ra());
            let rb = b.load_gpr(i.xo().rb());
            let ra = b.f.truncate(ra, ValueType::I32);
            let rb = b.f.truncate(rb, ValueType::I32);
            let hi = b.f.mul_hi(ra, rb, flags);
            let v = b.f.sign_extend(hi, ValueType::I64);
            b.store_gpr(i.xo().rt(), v);
            record(b, i, v);
        }
        Divw | Divwu => {
            let flags = if op == Divwu { ARITHMETIC_UNSIGNED } else { 0 };
            let ra = b.load_gpr(i.xo().ra());
            let rb = b.load_gpr(i.xo().rb());
            let ra = b.f.truncate(ra, ValueType::I32);
            let rb = b.f.truncate(rb, ValueType::I32);
            let q = b.f.div(ra, rb, flags);
            let v = if op == Divwu {
                b.f.zero_extend(q, ValueType::I64)
            } else {
                b.f.sign_extend(q, ValueType::I64)
            };
            b.store_gpr(i.xo().rt(), v);
            record(b, i, v);
        }
        Divd | Divdu => {
            let flags = if op == Divdu { ARITHMETIC_UNSIGNED } else { 0 };
            let (ra, rb) = load_pair(b, i);
            let v = b.f.div(ra, rb, flags);
            b.store_gpr(i.xo().rt(), v);
            record(b, i, v);
        }

        // X-form logicals: RT field is the source, RA the destination.
        And => logical(b, i, |f, rs, rb| f.and(rs, rb)),
        Andc => logical(b, i, |f, rs, rb| {
            let nrb = f.not(rb);
            f.and(rs, nrb)
        }),
        Or => logical(b, i, |f, rs, rb| f.or(rs, rb)),
        Orc => logical(b, i, |f, rs, rb| {
            let nrb = f.not(rb);
            f.or(rs, nrb)
        }),
        Xor => logical(b, i, |f, rs, rb| f.xor(rs, rb)),
        Nand => logical(b, i, |f, rs, rb| {
            let v = f.and(rs, rb);
            f.not(v)
        }),
        Nor => logical(b, i, |f, rs, rb| {
            let v = f.or(rs, rb);
            f.not(v)
        }),
        Eqv => logical(b, i, |f, rs, rb| {
            let v = f.xor(rs, rb);
            f.not(v)
        }),

        Andi => {
            let rs = b.load_gpr(i.d().rt());
            let imm = b.f.load_constant(i.d().uimm() as u64);
            let v = b.f.and(rs, imm);
            b.store_gpr(i.d().ra(), v);
            b.update_cr0(v);
        }
        Andis => {
            let rs = b.load_gpr(i.d().rt());
            let imm = b.f.load_constant((i.d().uimm() as u64) << 16);
            let v = b.f.and(rs, imm);
            b.store_gpr(i.d().ra(), v);
            b.update_cr0(v);
        }
        Ori => {
            let rs = b.load_gpr(i.d().rt());
            let imm = b.f.load_constant(i.d().uimm() as u64);
            let v = b.f.or(rs, imm);
            b.store_gpr(i.d().ra(), v);
        }
        Oris => {
            let rs = b.load_gpr(i.d().rt());
            let imm = b.f.load_constant((i.d().uimm() as u64) << 16);
            let v = b.f.or(rs, imm);
            b.store_gpr(i.d().ra(), v);
        }
        Xori => {
            let rs = b.load_gpr(i.d().rt());
            let imm = b.f.load_constant(i.d().uimm() as u64);
            let v = b.f.xor(rs, imm);
            b.store_gpr(i.d().ra(), v);
        }
        Xoris => {
            let rs = b.load_gpr(i.d().rt());
            let imm = b.f.load_constant((i.d().uimm() as u64) << 16);
            let v = b.f.xor(rs, imm);
            b.store_gpr(i.d().ra(), v);
        }

        Extsb | Extsh | Extsw => {
            let narrow = match op {
                Extsb => ValueType::I8,
                Extsh => ValueType::I16,
                _ => ValueType::I32,
            };
            let rs = b.load_gpr(i.x().rt());
            let t = b.f.truncate(rs, narrow);
            let v = b.f.sign_extend(t, ValueType::I64);
            b.store_gpr(i.x().ra(), v);
            record_x(b, i, v);
        }
        Cntlzw => {
            let rs = b.load_gpr(i.x().rt());
            let t = b.f.truncate(rs, ValueType::I32);
            let n = b.f.cntlz(t);
            let v = b.f.zero_extend(n, ValueType::I64);
            b.store_gpr(i.x().ra(), v);
            record_x(b, i, v);
        }
        Cntlzd => {
            let rs = b.load_gpr(i.x().rt());
            let n = b.f.cntlz(rs);
            let v = b.f.zero_extend(n, ValueType::I64);
            b.store_gpr(i.x().ra(), v);
            record_x(b, i, v);
        }

        Slw => {
            let rs = b.load_gpr(i.x().rt());
            let rb = b.load_gpr(i.x().rb());
            let low = b.f.truncate(rs, ValueType::I32);
            let low = b.f.zero_extend(low, ValueType::I64);
            let mask = b.f.load_constant(0x3Fu64);
            let sh = b.f.and(rb, mask);
            let shifted = b.f.shl(low, sh);
            let t = b.f.truncate(shifted, ValueType::I32);
            let v = b.f.zero_extend(t, ValueType::I64);
            b.store_gpr(i.x().ra(), v);
            record_x(b, i, v);
        }
        Srw => {
            let rs = b.load_gpr(i.x().rt());
            let rb = b.load_gpr(i.x().rb());
            let low = b.f.truncate(rs, ValueType::I32);
            let low = b.f.zero_extend(low, ValueType::I64);
            let mask = b.f.load_constant(0x3Fu64);
            let sh = b.f.and(rb, mask);
            let shifted = b.f.shr(low, sh);
            let v = b.f.truncate(shifted, ValueType::I32);
            let v = b.f.zero_extend(v, ValueType::I64);
            b.store_gpr(i.x().ra(), v);
            record_x(b, i, v);
        }
        Sraw => {
            let rs = b.load_gpr(i.x().rt());
            let rb = b.load_gpr(i.x().rb());
            let val = b.f.truncate(rs, ValueType::I32);
            let val = b.f.sign_extend(val, ValueType::I64);
            let mask = b.f.load_constant(0x3Fu64);
            let sh = b.f.and(rb, mask);
            let v = b.f.sha(val, sh);
            b.store_gpr(i.x().ra(), v);
            emit_shift_carry(b, val, sh);
            record_x(b, i, v);
        }
        Srawi => {
            let sh_imm = i.x().rb();
            let rs = b.load_gpr(i.x().rt());
            let val = b.f.truncate(rs, ValueType::I32);
            let val = b.f.sign_extend(val, ValueType::I64);
            let v = if sh_imm == 0 {
                let ca = b.f.load_zero(ValueType::I8);
                b.store_ca(ca);
                val
            } else {
                let sh = b.f.load_constant(sh_imm as u64);
                let v = b.f.sha(val, sh);
                emit_shift_carry(b, val, sh);
                v
            };
            b.store_gpr(i.x().ra(), v);
            record_x(b, i, v);
        }
        Sld => {
            let rs = b.load_gpr(i.x().rt());
            let rb = b.load_gpr(i.x().rb());
            let mask = b.f.load_constant(0x7Fu64);
            let sh = b.f.and(rb, mask);
            let v = b.f.shl(rs, sh);
            b.store_gpr(i.x().ra(), v);
            record_x(b, i, v);
        }
        Srd => {
            let rs = b.load_gpr(i.x().rt());
            let rb = b.load_gpr(i.x().rb());
            let mask = b.f.load_constant(0x7Fu64);
            let sh = b.f.and(rb, mask);
            let v = b.f.shr(rs, sh);
            b.store_gpr(i.x().ra(), v);
            record_x(b, i, v);
        }
        Srad => {
            let rs = b.load_gpr(i.x().rt());
            let rb = b.load_gpr(i.x().rb());
            let mask = b.f.load_constant(0x7Fu64);
            let sh = b.f.and(rb, mask);
            let v = b.f.sha(rs, sh);
            b.store_gpr(i.x().ra(), v);
            emit_shift_carry(b, rs, sh);
            record_x(b, i, v);
        }
        Sradi => {
            let sh_imm = i.xs().sh();
            let rs = b.load_gpr(i.xs().rs());
            let v = if sh_imm == 0 {
                let ca = b.f.load_zero(ValueType::I8);
                b.store_ca(ca);
                rs
            } else {
                let sh = b.f.load_constant(sh_imm as u64);
                let v = b.f.sha(rs, sh);
                emit_shift_carry(b, rs, sh);
                v
            };
            b.store_gpr(i.xs().ra(), v);
            if i.xs().rc() {
                b.update_cr0(v);
            }
        }

        Rlwinm => {
            let m = i.m();
            let rs = b.load_gpr(m.rs());
            let t = b.f.truncate(rs, ValueType::I32);
            let sh = b.f.load_constant(m.sh() as u8);
            let rot = b.f.rotate_left(t, sh);
            let mask = b.f.load_constant(mask32(m.mb(), m.me()));
            let v32 = b.f.and(rot, mask);
            let v = b.f.zero_extend(v32, ValueType::I64);
            b.store_gpr(m.ra(), v);
            if m.rc() {
                b.update_cr0(v);
            }
        }
        Rlwimi => {
            let m = i.m();
            let rs = b.load_gpr(m.rs());
            let t = b.f.truncate(rs, ValueType::I32);
            let sh = b.f.load_constant(m.sh() as u8);
            let rot = b.f.rotate_left(t, sh);
            let mask = mask32(m.mb(), m.me());
            let mask_v = b.f.load_constant(mask);
            let nmask_v = b.f.load_constant(!mask);
            let ins = b.f.and(rot, mask_v);
            let ra = b.load_gpr(m.ra());
            let ra32 = b.f.truncate(ra, ValueType::I32);
            let keep = b.f.and(ra32, nmask_v);
            let v32 = b.f.or(ins, keep);
            let v = b.f.zero_extend(v32, ValueType::I64);
            b.store_gpr(m.ra(), v);
            if m.rc() {
                b.update_cr0(v);
            }
        }
        Rlwnm => {
            let m = i.m();
            let rs = b.load_gpr(m.rs());
            let rb = b.load_gpr(m.sh());
            let t = b.f.truncate(rs, ValueType::I32);
            let shmask = b.f.load_constant(0x1Fu64);
            let sh = b.f.and(rb, shmask);
            let rot = b.f.rotate_left(t, sh);
            let mask = b.f.load_constant(mask32(m.mb(), m.me()));
            let v32 = b.f.and(rot, mask);
            let v = b.f.zero_extend(v32, ValueType::I64);
            b.store_gpr(m.ra(), v);
            if m.rc() {
                b.update_cr0(v);
            }
        }
        Rldicl => {
            let md = i.md();
            let rs = b.load_gpr(md.rs());
            let sh = b.f.load_constant(md.sh() as u8);
            let rot = b.f.rotate_left(rs, sh);
            let mask = b.f.load_constant(u64::MAX >> md.mb());
            let v = b.f.and(rot, mask);
            b.store_gpr(md.ra(), v);
            if md.rc() {
                b.update_cr0(v);
            }
        }
        Rldicr => {
            let md = i.md();
            let rs = b.load_gpr(md.rs());
            let sh = b.f.load_constant(md.sh() as u8);
            let rot = b.f.rotate_left(rs, sh);
            let mask = b.f.load_constant(u64::MAX << (63 - md.mb()));
            let v = b.f.and(rot, mask);
            b.store_gpr(md.ra(), v);
            if md.rc() {
                b.update_cr0(v);
            }
        }

        Cmp | Cmpl => {
            let x = i.x();
            let ra = b.load_gpr(x.ra());
            let rb = b.load_gpr(x.rb());
            let (a, c) = if x.cmp_l() {
                (ra, rb)
            } else {
                let a = b.f.truncate(ra, ValueType::I32);
                let c = b.f.truncate(rb, ValueType::I32);
                (a, c)
            };
            emit_compare(b, x.crfd(), a, c, op == Cmpl);
        }
        Cmpi | Cmpli => {
            let d = i.d();
            let ra = b.load_gpr(d.ra());
            let (a, c) = if op == Cmpi {
                if d.cmp_l() {
                    (ra, b.f.load_constant(d.simm() as i64 as u64))
                } else {
                    let a = b.f.truncate(ra, ValueType::I32);
                    (a, b.f.load_constant(d.simm() as u32))
                }
            } else if d.cmp_l() {
                (ra, b.f.load_constant(d.uimm() as u64))
            } else {
                let a = b.f.truncate(ra, ValueType::I32);
                (a, b.f.load_constant(d.uimm()))
            };
            emit_compare(b, d.crfd(), a, c, op == Cmpli);
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

fn load_pair(b: &mut PpcHirBuilder, i: Instr) -> (ValueId, ValueId) {
    let ra = b.load_gpr(i.xo().ra());
    let rb = b.load_gpr(i.xo().rb());
    (ra, rb)
}

fn load_pair32_signed(b: &mut PpcHirBuilder, i: Instr) -> (ValueId, ValueId) {
    let (ra, rb) = load_pair(b, i);
    let ra = b.f.truncate(ra, ValueType::I32);
    let ra = b.f.sign_extend(ra, ValueType::I64);
    let rb = b.f.truncate(rb, ValueType::I32);
    let rb = b.f.sign_extend(rb, ValueType::I64);
    (ra, rb)
}

fn record(b: &mut PpcHirBuilder, i: Instr, v: ValueId) {
    if i.xo().rc() {
        b.update_cr0(v);
    }
}

fn record_x(b: &mut PpcHirBuilder, i: Instr, v: ValueId) {
    if i.x().rc() {
        b.update_cr0(v);
    }
}

fn logical(
    b: &mut PpcHirBuilder,
    i: Instr,
    f: impl FnOnce(&mut crate::hir::FunctionBuilder, ValueId, ValueId) -> ValueId,
) {
    let rs = b.load_gpr(i.x().rt());
    let rb = b.load_gpr(i.x().rb());
    let v = f(&mut b.f, rs, rb);
    b.store_gpr(i.x().ra(), v);
    record_x(b, i, v);
}

/// CA for arithmetic right shifts: set when the input is negative and any
/// one bit was shifted out.
fn emit_shift_carry(b: &mut PpcHirBuilder, val: ValueId, sh: ValueId) {
    let one = b.f.load_constant(1u64);
    let shifted = b.f.shl(one, sh);
    let mask = b.f.sub(shifted, one, 0);
    let lost = b.f.and(val, mask);
    let zero = b.f.load_zero(ValueType::I64);
    let neg = b.f.compare_slt(val, zero);
    let any = b.f.is_true(lost);
    let ca = b.f.and(neg, any);
    b.store_ca(ca);
}

fn emit_compare(b: &mut PpcHirBuilder, field: u32, a: ValueId, c: ValueId, unsigned: bool) {
    let (lt, gt) = if unsigned {
        (b.f.compare_ult(a, c), b.f.compare_ugt(a, c))
    } else {
        (b.f.compare_slt(a, c), b.f.compare_sgt(a, c))
    };
    let eq = b.f.compare_eq(a, c);
    b.store_cr_cmp(field, lt, gt, eq);
}
