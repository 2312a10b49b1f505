//! Opcode identity and the two-level decoder.
//!
//! Decode is a dispatch on the primary 6-bit opcode followed by a masked
//! match on the extended opcode field of the form the primary selects. The
//! VMX128 extension reuses extended-opcode bits as register-number bits, so
//! each VMX128 sub-form carries its own compound mask; the groups below are
//! matched in an order that keeps the sub-forms from shadowing each other.

/// Shift distance of the primary opcode field.
pub const OPCD_SHIFT: u32 = 26;

const fn op(o: u32) -> u32 {
    (o & 0x3F) << OPCD_SHIFT
}

/// `VX128(op, xop)` compound pattern.
pub const fn vx128(o: u32, xop: u32) -> u32 {
    op(o) | (xop & 0x3D0)
}

/// `VX128_1(op, xop)` compound pattern (vector load/store forms).
pub const fn vx128_1(o: u32, xop: u32) -> u32 {
    op(o) | (xop & 0x7F3)
}

/// `VX128_2(op, xop)` compound pattern (`vperm128`).
pub const fn vx128_2(o: u32, xop: u32) -> u32 {
    op(o) | (xop & 0x210)
}

/// `VX128_3(op, xop)` compound pattern (unary/immediate forms).
pub const fn vx128_3(o: u32, xop: u32) -> u32 {
    op(o) | (xop & 0x7F0)
}

/// `VX128_4(op, xop)` compound pattern (`vrlimi128`).
pub const fn vx128_4(o: u32, xop: u32) -> u32 {
    op(o) | (xop & 0x730)
}

/// `VX128_5(op, xop)` compound pattern (`vsldoi128`).
pub const fn vx128_5(o: u32, xop: u32) -> u32 {
    op(o) | (xop & 0x010)
}

/// `VX128_P(op, xop)` compound pattern (`vpermwi128`, pack forms).
pub const fn vx128_p(o: u32, xop: u32) -> u32 {
    op(o) | (xop & 0x630)
}

/// `VX128_R(op, xop)` compound pattern (compare forms with Rc).
pub const fn vx128_r(o: u32, xop: u32) -> u32 {
    op(o) | (xop & 0x390)
}

/// Fieldless opcode identity for every instruction the frontend knows.
///
/// Anything that does not decode lands on [`PpcOp::Invalid`]; the frontend
/// turns that into a failed translation rather than guessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)] // variants are PPC mnemonics
pub enum PpcOp {
    // D-form integer.
    Twi,
    Mulli,
    Subfic,
    Cmpli,
    Cmpi,
    Addic,
    AddicRc,
    Addi,
    Addis,
    Andi,
    Andis,
    Ori,
    Oris,
    Xori,
    Xoris,

    // Rotates.
    Rlwimi,
    Rlwinm,
    Rlwnm,
    Rldicl,
    Rldicr,
    Rldic,
    Rldimi,

    // XO-form arithmetic.
    Add,
    Addc,
    Adde,
    Addze,
    Subf,
    Subfc,
    Subfe,
    Subfze,
    Neg,
    Mullw,
    Mulld,
    Mulhw,
    Mulhwu,
    Divw,
    Divwu,
    Divd,
    Divdu,

    // X-form logical / shifts / extends.
    Cmp,
    Cmpl,
    And,
    Andc,
    Or,
    Orc,
    Xor,
    Nand,
    Nor,
    Eqv,
    Slw,
    Srw,
    Sraw,
    Srawi,
    Sld,
    Srd,
    Srad,
    Sradi,
    Cntlzw,
    Cntlzd,
    Extsb,
    Extsh,
    Extsw,

    // Loads/stores (D-form).
    Lbz,
    Lbzu,
    Lhz,
    Lhzu,
    Lha,
    Lhau,
    Lwz,
    Lwzu,
    Stb,
    Stbu,
    Sth,
    Sthu,
    Stw,
    Stwu,
    Ld,
    Ldu,
    Lwa,
    Std,
    Stdu,
    Lfs,
    Lfd,
    Stfs,
    Stfd,

    // Loads/stores (X-form indexed).
    Lbzx,
    Lbzux,
    Lhzx,
    Lhzux,
    Lhax,
    Lwzx,
    Lwzux,
    Ldx,
    Ldux,
    Stbx,
    Stbux,
    Sthx,
    Stwx,
    Stwux,
    Stdx,
    Lhbrx,
    Lwbrx,
    Sthbrx,
    Stwbrx,
    Lwarx,
    Stwcx,
    Ldarx,
    Stdcx,

    // Branch / system.
    B,
    Bc,
    Bclr,
    Bcctr,
    Sc,

    // CR logic and moves.
    Mcrf,
    Crand,
    Crandc,
    Creqv,
    Crnand,
    Crnor,
    Cror,
    Crorc,
    Crxor,
    Mfcr,
    Mtcrf,
    Mfspr,
    Mtspr,
    Mftb,

    // Barriers / cache hints (decoded, mostly no-ops for translation).
    Sync,
    Eieio,
    Isync,
    Dcbt,
    Dcbtst,
    Dcbf,
    Dcbst,
    Dcbz,
    Icbi,
    Dst,
    Dstst,
    Dss,

    // AltiVec loads/stores (X-form, primary 31).
    Lvebx,
    Lvehx,
    Lvewx,
    Lvx,
    Lvxl,
    Lvsl,
    Lvsr,
    Lvlx,
    Lvrx,
    Stvebx,
    Stvehx,
    Stvewx,
    Stvx,
    Stvxl,
    Stvlx,
    Stvrx,

    // AltiVec arithmetic (VX/VXR/VXA).
    Vaddfp,
    Vsubfp,
    Vmaddfp,
    Vnmsubfp,
    Vmaxfp,
    Vminfp,
    Vand,
    Vandc,
    Vor,
    Vxor,
    Vnor,
    Vsel,
    Vperm,
    Vsldoi,
    Vrefp,
    Vrsqrtefp,
    Vcfsx,
    Vcfux,
    Vctsxs,
    Vctuxs,
    Vmrghw,
    Vmrglw,
    Vrlw,
    Vslb,
    Vslh,
    Vslw,
    Vsrb,
    Vsrh,
    Vsrw,
    Vsrab,
    Vsrah,
    Vsraw,
    Vspltb,
    Vsplth,
    Vspltw,
    Vspltisb,
    Vspltish,
    Vspltisw,
    Vaddubm,
    Vadduhm,
    Vadduwm,
    Vsububm,
    Vsubuhm,
    Vsubuwm,
    Vcmpequb,
    Vcmpequh,
    Vcmpequw,
    Vcmpeqfp,
    Vcmpgefp,
    Vcmpgtfp,
    Vcmpbfp,
    Vcmpgtsb,
    Vcmpgtsh,
    Vcmpgtsw,
    Vcmpgtub,
    Vcmpgtuh,
    Vcmpgtuw,
    Mfvscr,
    Mtvscr,

    // VMX128 loads/stores (VX128_1, primary 4).
    Lvsl128,
    Lvsr128,
    Lvewx128,
    Lvx128,
    Lvxl128,
    Stvewx128,
    Stvx128,
    Stvxl128,

    // VMX128 arithmetic (primary 5).
    Vaddfp128,
    Vsubfp128,
    Vmulfp128,
    Vmaddfp128,
    Vmaddcfp128,
    Vnmsubfp128,
    Vmsum3fp128,
    Vmsum4fp128,
    Vand128,
    Vandc128,
    Vnor128,
    Vor128,
    Vxor128,
    Vsel128,
    Vperm128,

    // VMX128 misc (primary 6).
    Vcmpeqfp128,
    Vcmpgefp128,
    Vcmpgtfp128,
    Vcmpbfp128,
    Vcmpequw128,
    Vrlw128,
    Vslw128,
    Vsrw128,
    Vmaxfp128,
    Vminfp128,
    Vmrghw128,
    Vmrglw128,
    Vcfpsxws128,
    Vcfpuxws128,
    Vcsxwfp128,
    Vcuxwfp128,
    Vrefp128,
    Vrsqrtefp128,
    Vspltw128,
    Vspltisw128,
    Vrlimi128,
    Vpermwi128,
    Vupkd3d128,

    /// Unrecognized bit pattern.
    Invalid,
}

impl PpcOp {
    /// Two-level decode of a host-order instruction word.
    pub fn decode(w: u32) -> Self {
        use PpcOp::*;
        match w >> OPCD_SHIFT {
            3 => Twi,
            4 => decode_group4(w),
            5 => decode_group5(w),
            6 => decode_group6(w),
            7 => Mulli,
            8 => Subfic,
            10 => Cmpli,
            11 => Cmpi,
            12 => Addic,
            13 => AddicRc,
            14 => Addi,
            15 => Addis,
            16 => Bc,
            17 => Sc,
            18 => B,
            19 => decode_group19(w),
            20 => Rlwimi,
            21 => Rlwinm,
            23 => Rlwnm,
            24 => Ori,
            25 => Oris,
            26 => Xori,
            27 => Xoris,
            28 => Andi,
            29 => Andis,
            30 => match (w >> 2) & 0x7 {
                0 => Rldicl,
                1 => Rldicr,
                2 => Rldic,
                3 => Rldimi,
                _ => Invalid,
            },
            31 => decode_group31(w),
            32 => Lwz,
            33 => Lwzu,
            34 => Lbz,
            35 => Lbzu,
            36 => Stw,
            37 => Stwu,
            38 => Stb,
            39 => Stbu,
            40 => Lhz,
            41 => Lhzu,
            42 => Lha,
            43 => Lhau,
            44 => Sth,
            45 => Sthu,
            48 => Lfs,
            50 => Lfd,
            52 => Stfs,
            54 => Stfd,
            58 => match w & 0x3 {
                0 => Ld,
                1 => Ldu,
                2 => Lwa,
                _ => Invalid,
            },
            62 => match w & 0x3 {
                0 => Std,
                1 => Stdu,
                _ => Invalid,
            },
            _ => Invalid,
        }
    }
}

fn decode_group4(w: u32) -> PpcOp {
    use PpcOp::*;
    // VXA six-bit sub-opcodes occupy 32..=47; none of the VX/VXR/VX128_1
    // encodings in this group land there.
    if (32..=47).contains(&(w & 0x3F)) {
        return match w & 0x3F {
            42 => Vsel,
            43 => Vperm,
            44 => Vsldoi,
            46 => Vmaddfp,
            47 => Vnmsubfp,
            _ => Invalid,
        };
    }
    match w & 0x7F3 {
        0x003 => return Lvsl128,
        0x043 => return Lvsr128,
        0x083 => return Lvewx128,
        0x0C3 => return Lvx128,
        0x2C3 => return Lvxl128,
        0x183 => return Stvewx128,
        0x1C3 => return Stvx128,
        0x3C3 => return Stvxl128,
        _ => {}
    }
    match w & 0x3FF {
        0x006 => return Vcmpequb,
        0x046 => return Vcmpequh,
        0x086 => return Vcmpequw,
        0x0C6 => return Vcmpeqfp,
        0x1C6 => return Vcmpgefp,
        0x2C6 => return Vcmpgtfp,
        0x3C6 => return Vcmpbfp,
        0x206 => return Vcmpgtub,
        0x246 => return Vcmpgtuh,
        0x286 => return Vcmpgtuw,
        0x306 => return Vcmpgtsb,
        0x346 => return Vcmpgtsh,
        0x386 => return Vcmpgtsw,
        _ => {}
    }
    match w & 0x7FF {
        0x000 => Vaddubm,
        0x040 => Vadduhm,
        0x080 => Vadduwm,
        0x400 => Vsububm,
        0x440 => Vsubuhm,
        0x480 => Vsubuwm,
        0x00A => Vaddfp,
        0x04A => Vsubfp,
        0x40A => Vmaxfp,
        0x44A => Vminfp,
        0x084 => Vrlw,
        0x08C => Vmrghw,
        0x18C => Vmrglw,
        0x104 => Vslb,
        0x144 => Vslh,
        0x184 => Vslw,
        0x204 => Vsrb,
        0x244 => Vsrh,
        0x284 => Vsrw,
        0x304 => Vsrab,
        0x344 => Vsrah,
        0x384 => Vsraw,
        0x10A => Vrefp,
        0x14A => Vrsqrtefp,
        0x30A => Vcfux,
        0x34A => Vcfsx,
        0x38A => Vctuxs,
        0x3CA => Vctsxs,
        0x20C => Vspltb,
        0x24C => Vsplth,
        0x28C => Vspltw,
        0x30C => Vspltisb,
        0x34C => Vspltish,
        0x38C => Vspltisw,
        0x404 => Vand,
        0x444 => Vandc,
        0x484 => Vor,
        0x4C4 => Vxor,
        0x504 => Vnor,
        0x604 => Mfvscr,
        0x644 => Mtvscr,
        _ => Invalid,
    }
}

fn decode_group5(w: u32) -> PpcOp {
    use PpcOp::*;
    match w & 0x3D0 {
        0x010 => Vaddfp128,
        0x050 => Vsubfp128,
        0x090 => Vmulfp128,
        0x0D0 => Vmaddfp128,
        0x110 => Vmaddcfp128,
        0x150 => Vnmsubfp128,
        0x190 => Vmsum3fp128,
        0x1D0 => Vmsum4fp128,
        0x210 => Vand128,
        0x250 => Vandc128,
        0x290 => Vnor128,
        0x2D0 => Vor128,
        0x310 => Vxor128,
        0x350 => Vsel128,
        _ => {
            if w & 0x210 == 0 {
                Vperm128
            } else {
                Invalid
            }
        }
    }
}

fn decode_group6(w: u32) -> PpcOp {
    use PpcOp::*;
    // The Rc compare family is matched first; none of the other encodings
    // in this group collide with its patterns under the 0x390 mask.
    match w & 0x390 {
        0x000 => return Vcmpeqfp128,
        0x080 => return Vcmpgefp128,
        0x100 => return Vcmpgtfp128,
        0x180 => return Vcmpbfp128,
        0x200 => return Vcmpequw128,
        _ => {}
    }
    match w & 0x7F0 {
        0x230 => return Vcfpsxws128,
        0x270 => return Vcfpuxws128,
        0x2B0 => return Vcsxwfp128,
        0x2F0 => return Vcuxwfp128,
        0x630 => return Vrefp128,
        0x670 => return Vrsqrtefp128,
        0x730 => return Vspltw128,
        0x770 => return Vspltisw128,
        0x7F0 => return Vupkd3d128,
        _ => {}
    }
    if w & 0x730 == 0x710 {
        return Vrlimi128;
    }
    if w & 0x630 == 0x210 {
        return Vpermwi128;
    }
    match w & 0x3D0 {
        0x050 => Vrlw128,
        0x0D0 => Vslw128,
        0x1D0 => Vsrw128,
        0x280 => Vmaxfp128,
        0x2C0 => Vminfp128,
        0x300 => Vmrghw128,
        0x340 => Vmrglw128,
        _ => Invalid,
    }
}

fn decode_group19(w: u32) -> PpcOp {
    use PpcOp::*;
    match (w >> 1) & 0x3FF {
        0 => Mcrf,
        16 => Bclr,
        33 => Crnor,
        129 => Crandc,
        150 => Isync,
        193 => Crxor,
        225 => Crnand,
        257 => Crand,
        289 => Creqv,
        417 => Crorc,
        449 => Cror,
        528 => Bcctr,
        _ => Invalid,
    }
}

fn decode_group31(w: u32) -> PpcOp {
    use PpcOp::*;
    // XO-form arithmetic ignores the OE bit for identity.
    match (w >> 1) & 0x1FF {
        8 => return Subfc,
        10 => return Addc,
        11 => return Mulhwu,
        40 => return Subf,
        75 => return Mulhw,
        104 => return Neg,
        136 => return Subfe,
        138 => return Adde,
        200 => return Subfze,
        202 => return Addze,
        233 => return Mulld,
        235 => return Mullw,
        457 => return Divdu,
        459 => return Divwu,
        489 => return Divd,
        491 => return Divw,
        _ => {}
    }
    if (w >> 2) & 0x1FF == 413 {
        return Sradi;
    }
    match (w >> 1) & 0x3FF {
        0 => Cmp,
        32 => Cmpl,
        19 => Mfcr,
        144 => Mtcrf,
        339 => Mfspr,
        371 => Mftb,
        467 => Mtspr,
        20 => Lwarx,
        84 => Ldarx,
        150 => Stwcx,
        214 => Stdcx,
        21 => Ldx,
        23 => Lwzx,
        53 => Ldux,
        55 => Lwzux,
        87 => Lbzx,
        119 => Lbzux,
        279 => Lhzx,
        311 => Lhzux,
        343 => Lhax,
        149 => Stdx,
        151 => Stwx,
        183 => Stwux,
        215 => Stbx,
        247 => Stbux,
        407 => Sthx,
        534 => Lwbrx,
        662 => Stwbrx,
        790 => Lhbrx,
        918 => Sthbrx,
        24 => Slw,
        26 => Cntlzw,
        27 => Sld,
        28 => And,
        58 => Cntlzd,
        60 => Andc,
        124 => Nor,
        284 => Eqv,
        316 => Xor,
        412 => Orc,
        444 => Or,
        476 => Nand,
        536 => Srw,
        539 => Srd,
        792 => Sraw,
        794 => Srad,
        824 => Srawi,
        922 => Extsh,
        954 => Extsb,
        986 => Extsw,
        6 => Lvsl,
        7 => Lvebx,
        38 => Lvsr,
        39 => Lvehx,
        71 => Lvewx,
        103 => Lvx,
        359 => Lvxl,
        135 => Stvebx,
        167 => Stvehx,
        199 => Stvewx,
        231 => Stvx,
        487 => Stvxl,
        519 => Lvlx,
        551 => Lvrx,
        647 => Stvlx,
        679 => Stvrx,
        598 => Sync,
        854 => Eieio,
        54 => Dcbst,
        86 => Dcbf,
        246 => Dcbtst,
        278 => Dcbt,
        982 => Icbi,
        1014 => Dcbz,
        342 => Dst,
        374 => Dstst,
        822 => Dss,
        _ => Invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Instr;

    #[test]
    fn scalar_decode() {
        assert_eq!(Instr(0x3864_FFFE).op(), PpcOp::Addi);
        assert_eq!(Instr(0x7C64_2A14).op(), PpcOp::Add); // add r3, r4, r5
        assert_eq!(Instr(0x7C64_2A15).op(), PpcOp::Add); // add. keeps identity
        assert_eq!(Instr(0x7C64_2814).op(), PpcOp::Addc);
        assert_eq!(Instr(0x7C64_2C14).op(), PpcOp::Addc); // OE variant too
        assert_eq!(Instr(0x4E80_0020).op(), PpcOp::Bclr); // blr
        assert_eq!(Instr(0x4E80_0420).op(), PpcOp::Bcctr); // bctr
        assert_eq!(Instr(0x5463_103A).op(), PpcOp::Rlwinm);
        assert_eq!(Instr(0x7D88_02A6).op(), PpcOp::Mfspr);
        assert_eq!(Instr(0x4800_0001).op(), PpcOp::B);
    }

    #[test]
    fn altivec_decode() {
        // vaddfp v3, v1, v2 = 0x10 03 0A relocated: opcd 4, vd 3, va 1, vb 2, xo 0x00A
        let w = (4 << 26) | (3 << 21) | (1 << 16) | (2 << 11) | 0x00A;
        assert_eq!(PpcOp::decode(w), PpcOp::Vaddfp);

        let w = (4 << 26) | (3 << 21) | (1 << 16) | (2 << 11) | 0x4C4;
        assert_eq!(PpcOp::decode(w), PpcOp::Vxor);

        // vperm vd, va, vb, vc is VXA xo 43.
        let w = (4 << 26) | (3 << 21) | (1 << 16) | (2 << 11) | (5 << 6) | 43;
        assert_eq!(PpcOp::decode(w), PpcOp::Vperm);

        // vcmpeqfp. (Rc set) keeps the same identity.
        let w = (4 << 26) | (1 << 10) | 0x0C6;
        assert_eq!(PpcOp::decode(w), PpcOp::Vcmpeqfp);

        // lvx is primary 31 xo 103.
        let w = (31 << 26) | (103 << 1);
        assert_eq!(PpcOp::decode(w), PpcOp::Lvx);
    }

    #[test]
    fn vmx128_decode() {
        // lvx128 with high register bits set still decodes.
        let w = vx128_1(4, 195) | (7 << 21) | (0x3 << 2) | (1 << 16) | (2 << 11);
        assert_eq!(PpcOp::decode(w), PpcOp::Lvx128);
        assert_eq!(Instr(w).vx128().vd128(), 7 | (3 << 5));

        let w = vx128(5, 16) | (1 << 21) | (2 << 16) | (3 << 11);
        assert_eq!(PpcOp::decode(w), PpcOp::Vaddfp128);

        let w = vx128(5, 784);
        assert_eq!(PpcOp::decode(w), PpcOp::Vxor128);

        let w = vx128_2(5, 0) | (1 << 6);
        assert_eq!(PpcOp::decode(w), PpcOp::Vperm128);

        // Compare with Rc bit set decodes through the _R mask.
        let w = vx128_r(6, 0) | (1 << 6);
        assert_eq!(PpcOp::decode(w), PpcOp::Vcmpeqfp128);

        let w = vx128_3(6, 1840) | (2 << 16);
        assert_eq!(PpcOp::decode(w), PpcOp::Vspltw128);

        let w = vx128_4(6, 1808) | (0x3 << 6) | (0xF << 16);
        assert_eq!(PpcOp::decode(w), PpcOp::Vrlimi128);

        let w = vx128_p(6, 528) | (0x1F << 16) | (0x7 << 6);
        assert_eq!(PpcOp::decode(w), PpcOp::Vpermwi128);
        assert_eq!(Instr(w).vx128_p().perm(), 0xFF);

        let w = vx128(6, 768);
        assert_eq!(PpcOp::decode(w), PpcOp::Vmrghw128);

        let w = vx128_3(6, 2032) | (0x8 << 16);
        assert_eq!(PpcOp::decode(w), PpcOp::Vupkd3d128);
    }

    #[test]
    fn unknown_words_are_invalid() {
        assert_eq!(PpcOp::decode(0xFFFF_FFFF), PpcOp::Invalid);
        assert_eq!(PpcOp::decode(0x0000_0000), PpcOp::Invalid);
        // Primary 4 with an unassigned VX extended opcode.
        assert_eq!(PpcOp::decode((4 << 26) | 0x7FE), PpcOp::Invalid);
    }
}
