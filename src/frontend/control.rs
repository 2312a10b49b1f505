//! Branch, condition-register, SPR, and system emitters.

use xenon_asm::{Instr, PpcOp};

use crate::context::PpcContext;
use crate::error::TranslationError;
use crate::frontend::{branch_target_b, branch_target_i, PpcHirBuilder};
use crate::hir::{ValueId, ValueType};

/// SPR numbers the translator recognizes.
const SPR_XER: u32 = 1;
const SPR_LR: u32 = 8;
const SPR_CTR: u32 = 9;

pub(super) fn emit(b: &mut PpcHirBuilder, i: Instr, op: PpcOp) -> Result<(), TranslationError> {
    use PpcOp::*;
    match op {
        B => {
            let target = branch_target_i(i, b.address());
            if i.i().lk() {
                b.update_lr_for_call();
                let symbol = b.declare_call_target(target)?;
                b.f.call(symbol, 0);
            } else if let Some(label) = b.label_for(target) {
                b.f.branch(label);
            } else {
                // Unconditional transfer out of the function: a tail call.
                let symbol = b.declare_call_target(target)?;
                b.f.call(symbol, PpcHirBuilder::tail_flags());
                b.f.return_();
            }
        }
        Bc => {
            let target = branch_target_b(i, b.address());
            let cond = emit_branch_condition(b, i.b().bo(), i.b().bi());
            if i.b().lk() {
                b.update_lr_for_call();
                let symbol = b.declare_call_target(target)?;
                match cond {
                    Some(cond) => b.f.call_true(cond, symbol, 0),
                    None => b.f.call(symbol, 0),
                }
            } else if let Some(label) = b.label_for(target) {
                match cond {
                    Some(cond) => b.f.branch_true(cond, label),
                    None => b.f.branch(label),
                }
            } else {
                let symbol = b.declare_call_target(target)?;
                match cond {
                    Some(cond) => b.f.call_true(cond, symbol, PpcHirBuilder::tail_flags()),
                    None => {
                        b.f.call(symbol, PpcHirBuilder::tail_flags());
                        b.f.return_();
                    }
                }
            }
        }
        Bclr => {
            if i.xl().lk() {
                return Err(TranslationError::Unimplemented {
                    address: b.address(),
                    op,
                });
            }
            match emit_branch_condition(b, i.xl().bt(), i.xl().ba()) {
                Some(cond) => b.f.return_true(cond),
                None => b.f.return_(),
            }
        }
        Bcctr => {
            // CTR branches never test CTR (BO bit 2 is required set).
            let cond = emit_branch_condition(b, i.xl().bt() | 0b00100, i.xl().ba());
            let ctr = b.load_ctr();
            let mask = b.f.load_constant(!0x3u64);
            let target = b.f.and(ctr, mask);
            if i.xl().lk() {
                b.update_lr_for_call();
                match cond {
                    Some(cond) => b.f.call_indirect_true(cond, target, 0),
                    None => b.f.call_indirect(target, 0),
                }
            } else {
                match cond {
                    Some(cond) => {
                        b.f.call_indirect_true(cond, target, PpcHirBuilder::tail_flags())
                    }
                    None => {
                        b.f.call_indirect(target, PpcHirBuilder::tail_flags());
                        b.f.return_();
                    }
                }
            }
        }
        Sc | Twi => {
            b.f.trap();
        }

        Mcrf => {
            let src = i.xl().ba() >> 2;
            let dst = i.xl().bt() >> 2;
            for n in 0..4 {
                let bit = b.load_cr_bit(src * 4 + n);
                b.store_cr_bit(dst * 4 + n, bit);
            }
        }
        Crand | Crandc | Creqv | Crnand | Crnor | Cror | Crorc | Crxor => {
            let ba = b.load_cr_bit(i.xl().ba());
            let bb = b.load_cr_bit(i.xl().bb());
            let v = match op {
                Crand => b.f.and(ba, bb),
                Cror => b.f.or(ba, bb),
                Crxor => b.f.xor(ba, bb),
                Crandc => {
                    let one = b.f.load_constant(1u8);
                    let nbb = b.f.xor(bb, one);
                    b.f.and(ba, nbb)
                }
                Crorc => {
                    let one = b.f.load_constant(1u8);
                    let nbb = b.f.xor(bb, one);
                    b.f.or(ba, nbb)
                }
                Crnand => {
                    let one = b.f.load_constant(1u8);
                    let v = b.f.and(ba, bb);
                    b.f.xor(v, one)
                }
                Crnor => {
                    let one = b.f.load_constant(1u8);
                    let v = b.f.or(ba, bb);
                    b.f.xor(v, one)
                }
                _ => {
                    let one = b.f.load_constant(1u8);
                    let v = b.f.xor(ba, bb);
                    b.f.xor(v, one)
                }
            };
            b.store_cr_bit(i.xl().bt(), v);
        }

        Mfcr => {
            // Assemble the architectural CR from the per-bit bytes.
            let mut acc = b.f.load_zero(ValueType::I32);
            for bit in 0..32u32 {
                let byte = b.load_cr_bit(bit);
                let wide = b.f.zero_extend(byte, ValueType::I32);
                let sh = b.f.load_constant((31 - bit) as u8);
                let placed = b.f.shl(wide, sh);
                acc = b.f.or(acc, placed);
            }
            let v = b.f.zero_extend(acc, ValueType::I64);
            b.store_gpr(i.xfx().rt(), v);
        }
        Mtcrf => {
            let rs = b.load_gpr(i.xfx().rt());
            let rs32 = b.f.truncate(rs, ValueType::I32);
            let crm = i.xfx().crm();
            for field in 0..8u32 {
                if crm & (0x80 >> field) == 0 {
                    continue;
                }
                for n in 0..4u32 {
                    let bit = field * 4 + n;
                    let sh = b.f.load_constant((31 - bit) as u8);
                    let moved = b.f.shr(rs32, sh);
                    let one = b.f.load_constant(1u32);
                    let isolated = b.f.and(moved, one);
                    let v = b.f.truncate(isolated, ValueType::I8);
                    b.store_cr_bit(bit, v);
                }
            }
        }

        Mfspr => match i.xfx().spr() {
            SPR_LR => {
                let v = b.load_lr();
                b.store_gpr(i.xfx().rt(), v);
            }
            SPR_CTR => {
                let v = b.load_ctr();
                b.store_gpr(i.xfx().rt(), v);
            }
            SPR_XER => {
                let v = emit_assemble_xer(b);
                b.store_gpr(i.xfx().rt(), v);
            }
            _ => {
                return Err(TranslationError::Unimplemented {
                    address: b.address(),
                    op,
                })
            }
        },
        Mtspr => {
            let rs = b.load_gpr(i.xfx().rt());
            match i.xfx().spr() {
                SPR_LR => b.store_lr(rs),
                SPR_CTR => b.store_ctr(rs),
                SPR_XER => emit_scatter_xer(b, rs),
                _ => {
                    return Err(TranslationError::Unimplemented {
                        address: b.address(),
                        op,
                    })
                }
            }
        }
        Mftb => {
            let v = b.f.load_clock();
            b.store_gpr(i.xfx().rt(), v);
        }

        // Barriers order guest memory; translated code executes them in
        // program order already.
        Sync | Eieio | Isync | Dcbt | Dcbtst | Dcbf | Dcbst | Icbi | Dst | Dstst | Dss => {
            b.f.nop();
        }
        Dcbz => {
            // Zeroes the 32-byte block containing EA.
            let ea = emit_indexed_ea(b, i);
            let mask = b.f.load_constant(!0x1Fu64);
            let base = b.f.and(ea, mask);
            let zero = b.f.load_zero(ValueType::V128);
            b.f.store(base, zero);
            let sixteen = b.f.load_constant(16u64);
            let upper = b.f.add(base, sixteen, 0);
            b.f.store(upper, zero);
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

fn emit_indexed_ea(b: &mut PpcHirBuilder, i: Instr) -> ValueId {
    let ra = b.load_gpr0(i.x().ra());
    let rb = b.load_gpr(i.x().rb());
    b.f.add(ra, rb, 0)
}

/// Builds the combined branch condition for a BO/BI pair, or `None` when
/// the branch is unconditional. Decrements CTR when BO asks for it.
fn emit_branch_condition(b: &mut PpcHirBuilder, bo: u32, bi: u32) -> Option<ValueId> {
    let ctr_ok = if bo & 0b00100 == 0 {
        let ctr = b.load_ctr();
        let one = b.f.load_constant(1u64);
        let ctr = b.f.sub(ctr, one, 0);
        b.store_ctr(ctr);
        let test = b.f.is_false(ctr);
        Some(if bo & 0b00010 != 0 {
            test
        } else {
            let one = b.f.load_constant(1u8);
            b.f.xor(test, one)
        })
    } else {
        None
    };

    let cond_ok = if bo & 0b10000 == 0 {
        let bit = b.load_cr_bit(bi);
        Some(if bo & 0b01000 != 0 {
            bit
        } else {
            let one = b.f.load_constant(1u8);
            b.f.xor(bit, one)
        })
    } else {
        None
    };

    match (ctr_ok, cond_ok) {
        (Some(c), Some(d)) => Some(b.f.and(c, d)),
        (Some(c), None) => Some(c),
        (None, Some(d)) => Some(d),
        (None, None) => None,
    }
}

/// `so << 31 | ov << 30 | ca << 29` in a GPR.
fn emit_assemble_xer(b: &mut PpcHirBuilder) -> ValueId {
    let so = b.f.load_context(PpcContext::XER_SO_OFFSET, ValueType::I8);
    let ov = b.f.load_context(PpcContext::XER_OV_OFFSET, ValueType::I8);
    let ca = b.f.load_context(PpcContext::XER_CA_OFFSET, ValueType::I8);
    let mut acc = b.f.load_zero(ValueType::I64);
    for (bit, flag) in [(31u8, so), (30, ov), (29, ca)] {
        let wide = b.f.zero_extend(flag, ValueType::I64);
        let sh = b.f.load_constant(bit);
        let placed = b.f.shl(wide, sh);
        acc = b.f.or(acc, placed);
    }
    acc
}

fn emit_scatter_xer(b: &mut PpcHirBuilder, rs: ValueId) {
    for (bit, offset) in [
        (31u8, PpcContext::XER_SO_OFFSET),
        (30, PpcContext::XER_OV_OFFSET),
        (29, PpcContext::XER_CA_OFFSET),
    ] {
        let sh = b.f.load_constant(bit);
        let moved = b.f.shr(rs, sh);
        let one = b.f.load_constant(1u64);
        let isolated = b.f.and(moved, one);
        let v = b.f.truncate(isolated, ValueType::I8);
        b.f.store_context(offset, v);
    }
}
