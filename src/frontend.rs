//! PPC → HIR frontend.
//!
//! `declare` scans guest code from the entry address until it can prove a
//! terminator, establishing the function bounds; `define` decodes every
//! word in those bounds and emits HIR through the per-opcode emitters.

mod altivec;
mod alu;
mod control;
mod memory_ops;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};
use xenon_asm::{Instr, PpcOp};

use crate::context::PpcContext;
use crate::error::TranslationError;
use crate::hir::{FunctionBuilder, HirFunction, LabelId, ValueId, ValueType, CALL_TAIL};
use crate::memory::Memory;
use crate::runtime::{FunctionInfo, Runtime};

/// Upper bound on function size during bound scanning.
const MAX_FUNCTION_BYTES: u32 = 0x1_0000;

/// Forward unconditional branches further than this are treated as tail
/// calls rather than intra-function control flow.
const MAX_FORWARD_BRANCH: u32 = 0x1_0000;

/// The PPC frontend.
#[derive(Debug, Default)]
pub struct PpcFrontend;

impl PpcFrontend {
    /// Creates the frontend.
    pub fn new() -> Self {
        Self
    }

    /// Establishes `info`'s bounds by scanning for a terminator.
    pub fn declare_function(
        &self,
        memory: &Arc<Memory>,
        info: &Arc<FunctionInfo>,
    ) -> Result<(), TranslationError> {
        let start = info.address();
        let mut furthest = start;
        let mut pc = start;
        loop {
            if pc - start >= MAX_FUNCTION_BYTES {
                return Err(TranslationError::MissingTerminator { address: start });
            }
            let word = memory.load32(pc);
            let instr = Instr(word);
            let op = instr.op();
            if op == PpcOp::Invalid {
                return Err(TranslationError::InvalidInstruction { address: pc, word });
            }
            match op {
                PpcOp::Bclr if is_unconditional_bo(instr.xl().bt()) && !instr.xl().lk() => {
                    if pc >= furthest {
                        break;
                    }
                }
                PpcOp::Bcctr if is_unconditional_bo(instr.xl().bt()) && !instr.xl().lk() => {
                    if pc >= furthest {
                        break;
                    }
                }
                PpcOp::B if !instr.i().lk() => {
                    let target = branch_target_i(instr, pc);
                    let internal_forward =
                        target > pc && target.wrapping_sub(pc) < MAX_FORWARD_BRANCH;
                    if internal_forward {
                        furthest = furthest.max(target);
                    } else if pc >= furthest {
                        break;
                    }
                }
                PpcOp::Bc => {
                    let target = branch_target_b(instr, pc);
                    if target >= start && target.wrapping_sub(start) < MAX_FUNCTION_BYTES {
                        furthest = furthest.max(target);
                    }
                }
                _ => {}
            }
            pc += 4;
        }
        info.set_end_address(pc + 4);
        debug!(
            start = %format_args!("{start:08X}"),
            end = %format_args!("{:08X}", pc + 4),
            "declared function"
        );
        Ok(())
    }

    /// Translates the declared range into HIR.
    pub fn define_function(
        &self,
        runtime: &Arc<Runtime>,
        info: &Arc<FunctionInfo>,
        debug_info_flags: u32,
    ) -> Result<HirFunction, TranslationError> {
        let memory = runtime.memory().clone();
        let start = info.address();
        let end = info.end_address();
        debug_assert!(end > start, "function must be declared before definition");

        let mut b = PpcHirBuilder::new(runtime.clone(), start, debug_info_flags);

        // First pass: labels for every in-range branch target.
        let mut pc = start;
        while pc < end {
            let instr = Instr(memory.load32(pc));
            let target = match instr.op() {
                PpcOp::B => Some(branch_target_i(instr, pc)),
                PpcOp::Bc => Some(branch_target_b(instr, pc)),
                _ => None,
            };
            if let Some(target) = target {
                if target >= start && target < end {
                    b.label_at(target);
                }
            }
            pc += 4;
        }

        // Second pass: emit.
        let mut pc = start;
        while pc < end {
            let instr = Instr(memory.load32(pc));
            b.begin_instr(pc);
            if let Err(e) = emit_instr(&mut b, instr) {
                warn!(
                    address = %format_args!("{pc:08X}"),
                    word = %format_args!("{:08X}", instr.0),
                    error = %e,
                    "translation failed"
                );
                return Err(e);
            }
            pc += 4;
        }
        b.f.return_();
        Ok(b.finish())
    }
}

fn is_unconditional_bo(bo: u32) -> bool {
    bo & 0b10100 == 0b10100
}

fn branch_target_i(instr: Instr, pc: u32) -> u32 {
    if instr.i().aa() {
        instr.i().li() as u32
    } else {
        pc.wrapping_add(instr.i().li() as u32)
    }
}

fn branch_target_b(instr: Instr, pc: u32) -> u32 {
    if instr.b().aa() {
        instr.b().bd() as u32
    } else {
        pc.wrapping_add(instr.b().bd() as u32)
    }
}

fn emit_instr(b: &mut PpcHirBuilder, i: Instr) -> Result<(), TranslationError> {
    use PpcOp::*;
    let op = i.op();
    match op {
        // Integer arithmetic and logic.
        Addi | Addis | Addic | AddicRc | Add | Addc | Adde | Addze | Subf | Subfc | Subfe
        | Subfze | Subfic | Neg | Mulli | Mullw | Mulld | Mulhw | Mulhwu | Divw | Divwu | Divd
        | Divdu | And | Andc | Or | Orc | Xor | Nand | Nor | Eqv | Andi | Andis | Ori | Oris
        | Xori | Xoris | Extsb | Extsh | Extsw | Cntlzw | Cntlzd | Slw | Srw | Sraw | Srawi
        | Sld | Srd | Srad | Sradi | Rlwinm | Rlwimi | Rlwnm | Rldicl | Rldicr | Cmp | Cmpl
        | Cmpi | Cmpli => alu::emit(b, i, op),

        // Branches, CR logic, SPR moves, system.
        B | Bc | Bclr | Bcctr | Sc | Twi | Mcrf | Crand | Crandc | Creqv | Crnand | Crnor
        | Cror | Crorc | Crxor | Mfcr | Mtcrf | Mfspr | Mtspr | Mftb | Sync | Eieio | Isync
        | Dcbt | Dcbtst | Dcbf | Dcbst | Dcbz | Icbi | Dst | Dstst | Dss => control::emit(b, i, op),

        // Scalar loads and stores.
        Lbz | Lbzu | Lhz | Lhzu | Lha | Lhau | Lwz | Lwzu | Stb | Stbu | Sth | Sthu | Stw
        | Stwu | Ld | Ldu | Lwa | Std | Stdu | Lfs | Lfd | Stfs | Stfd | Lbzx | Lbzux | Lhzx
        | Lhzux | Lhax | Lwzx | Lwzux | Ldx | Ldux | Stbx | Stbux | Sthx | Stwx | Stwux | Stdx
        | Lhbrx | Lwbrx | Sthbrx | Stwbrx | Lwarx | Stwcx | Ldarx | Stdcx => {
            memory_ops::emit(b, i, op)
        }

        // AltiVec / VMX128.
        _ if is_vector_op(op) => altivec::emit(b, i, op),

        Invalid => Err(TranslationError::InvalidInstruction {
            address: b.address(),
            word: i.0,
        }),
        _ => Err(TranslationError::Unimplemented {
            address: b.address(),
            op,
        }),
    }
}

fn is_vector_op(op: PpcOp) -> bool {
    use PpcOp::*;
    matches!(
        op,
        Lvebx
            | Lvehx | Lvewx | Lvx | Lvxl | Lvsl | Lvsr | Lvlx | Lvrx | Stvebx | Stvehx | Stvewx
            | Stvx | Stvxl | Stvlx | Stvrx | Vaddfp | Vsubfp | Vmaddfp | Vnmsubfp | Vmaxfp
            | Vminfp | Vand | Vandc | Vor | Vxor | Vnor | Vsel | Vperm | Vsldoi | Vrefp
            | Vrsqrtefp | Vcfsx | Vcfux | Vctsxs | Vctuxs | Vmrghw | Vmrglw | Vrlw | Vslb | Vslh
            | Vslw | Vsrb | Vsrh | Vsrw | Vsrab | Vsrah | Vsraw | Vspltb | Vsplth | Vspltw
            | Vspltisb | Vspltish | Vspltisw | Vaddubm | Vadduhm | Vadduwm | Vsububm | Vsubuhm
            | Vsubuwm | Vcmpequb | Vcmpequh | Vcmpequw | Vcmpeqfp | Vcmpgefp | Vcmpgtfp
            | Vcmpbfp | Vcmpgtsb | Vcmpgtsh | Vcmpgtsw | Vcmpgtub | Vcmpgtuh | Vcmpgtuw
            | Mfvscr | Mtvscr | Lvsl128 | Lvsr128 | Lvewx128 | Lvx128 | Lvxl128 | Stvewx128
            | Stvx128 | Stvxl128 | Vaddfp128 | Vsubfp128 | Vmulfp128 | Vmaddfp128 | Vmaddcfp128
            | Vnmsubfp128 | Vmsum3fp128 | Vmsum4fp128 | Vand128 | Vandc128 | Vnor128 | Vor128
            | Vxor128 | Vsel128 | Vperm128 | Vcmpeqfp128 | Vcmpgefp128 | Vcmpgtfp128
            | Vcmpbfp128 | Vcmpequw128 | Vrlw128 | Vslw128 | Vsrw128 | Vmaxfp128 | Vminfp128
            | Vmrghw128 | Vmrglw128 | Vcfpsxws128 | Vcfpuxws128 | Vcsxwfp128 | Vcuxwfp128
            | Vrefp128 | Vrsqrtefp128 | Vspltw128 | Vspltisw128 | Vrlimi128 | Vpermwi128
            | Vupkd3d128
    )
}

/// HIR builder with PPC register-file helpers layered on top.
pub(crate) struct PpcHirBuilder {
    pub(crate) f: FunctionBuilder,
    runtime: Arc<Runtime>,
    address: u32,
    debug_info_flags: u32,
    labels: HashMap<u32, LabelId>,
}

impl PpcHirBuilder {
    fn new(runtime: Arc<Runtime>, start: u32, debug_info_flags: u32) -> Self {
        Self {
            f: FunctionBuilder::new(),
            runtime,
            address: start,
            debug_info_flags,
            labels: HashMap::new(),
        }
    }

    fn finish(self) -> HirFunction {
        self.f.finish()
    }

    /// Ensures a label exists for a guest address.
    fn label_at(&mut self, address: u32) -> LabelId {
        if let Some(&label) = self.labels.get(&address) {
            return label;
        }
        let label = self.f.new_label();
        self.labels.insert(address, label);
        label
    }

    /// The label for `address`, if this function branches there.
    pub(crate) fn label_for(&self, address: u32) -> Option<LabelId> {
        self.labels.get(&address).copied()
    }

    fn begin_instr(&mut self, address: u32) {
        self.address = address;
        if let Some(&label) = self.labels.get(&address) {
            self.f.mark_label(label);
        }
        if self.debug_info_flags & 1 != 0 {
            self.f.source_offset(address as u64);
        }
    }

    /// Guest address of the instruction being emitted.
    pub(crate) fn address(&self) -> u32 {
        self.address
    }

    /// Declares (without translating) the callee symbol for a direct call.
    pub(crate) fn declare_call_target(
        &mut self,
        target: u32,
    ) -> Result<Arc<FunctionInfo>, TranslationError> {
        self.runtime
            .declare_function_at(target)
            .ok_or(TranslationError::Unimplemented {
                address: self.address,
                op: PpcOp::B,
            })
    }

    // Register file access.

    /// `GPR[n]` as I64; GPR0 still reads the register (callers that need
    /// the "0 means literal zero" addressing rule use [`Self::load_gpr0`]).
    pub(crate) fn load_gpr(&mut self, n: u32) -> ValueId {
        self.f
            .load_context(PpcContext::gpr_offset(n as usize), ValueType::I64)
    }

    /// `GPR[n]`, with `n == 0` meaning constant zero (EA computation).
    pub(crate) fn load_gpr0(&mut self, n: u32) -> ValueId {
        if n == 0 {
            self.f.load_zero(ValueType::I64)
        } else {
            self.load_gpr(n)
        }
    }

    pub(crate) fn store_gpr(&mut self, n: u32, v: ValueId) {
        self.f.store_context(PpcContext::gpr_offset(n as usize), v);
    }

    pub(crate) fn load_fpr(&mut self, n: u32) -> ValueId {
        self.f
            .load_context(PpcContext::fpr_offset(n as usize), ValueType::F64)
    }

    pub(crate) fn store_fpr(&mut self, n: u32, v: ValueId) {
        self.f.store_context(PpcContext::fpr_offset(n as usize), v);
    }

    pub(crate) fn load_vr(&mut self, n: u32) -> ValueId {
        self.f
            .load_context(PpcContext::vr_offset(n as usize), ValueType::V128)
    }

    pub(crate) fn store_vr(&mut self, n: u32, v: ValueId) {
        self.f.store_context(PpcContext::vr_offset(n as usize), v);
    }

    pub(crate) fn load_lr(&mut self) -> ValueId {
        self.f.load_context(PpcContext::LR_OFFSET, ValueType::I64)
    }

    pub(crate) fn store_lr(&mut self, v: ValueId) {
        self.f.store_context(PpcContext::LR_OFFSET, v);
    }

    pub(crate) fn load_ctr(&mut self) -> ValueId {
        self.f.load_context(PpcContext::CTR_OFFSET, ValueType::I64)
    }

    pub(crate) fn store_ctr(&mut self, v: ValueId) {
        self.f.store_context(PpcContext::CTR_OFFSET, v);
    }

    /// XER carry bit as an I8.
    pub(crate) fn load_ca(&mut self) -> ValueId {
        self.f.load_context(PpcContext::XER_CA_OFFSET, ValueType::I8)
    }

    pub(crate) fn store_ca(&mut self, v: ValueId) {
        self.f.store_context(PpcContext::XER_CA_OFFSET, v);
    }

    /// One CR bit (0..31, architectural numbering) as an I8.
    pub(crate) fn load_cr_bit(&mut self, bit: u32) -> ValueId {
        self.f
            .load_context(PpcContext::cr_offset(bit as usize), ValueType::I8)
    }

    pub(crate) fn store_cr_bit(&mut self, bit: u32, v: ValueId) {
        self.f.store_context(PpcContext::cr_offset(bit as usize), v);
    }

    /// Writes a CR field's lt/gt/eq from a signed compare of `v` against
    /// zero, with SO copied from XER.
    pub(crate) fn update_cr0(&mut self, v: ValueId) {
        self.update_cr_field_signed(0, v);
    }

    /// Signed compare of `v` against zero into CR field `field`.
    pub(crate) fn update_cr_field_signed(&mut self, field: u32, v: ValueId) {
        let zero = self.f.load_zero(self.f.value(v).ty);
        let lt = self.f.compare_slt(v, zero);
        let gt = self.f.compare_sgt(v, zero);
        let eq = self.f.compare_eq(v, zero);
        self.store_cr_cmp(field, lt, gt, eq);
    }

    /// Writes a CR field from explicit lt/gt/eq bits plus XER SO.
    pub(crate) fn store_cr_cmp(&mut self, field: u32, lt: ValueId, gt: ValueId, eq: ValueId) {
        let base = field * 4;
        self.store_cr_bit(base, lt);
        self.store_cr_bit(base + 1, gt);
        self.store_cr_bit(base + 2, eq);
        let so = self
            .f
            .load_context(PpcContext::XER_SO_OFFSET, ValueType::I8);
        self.store_cr_bit(base + 3, so);
    }

    /// CR6 update from a vector compare mask: bit 24 = all lanes set,
    /// bit 26 = no lane set.
    pub(crate) fn update_cr6(&mut self, mask: ValueId) {
        let inverted = self.f.not(mask);
        let all = self.f.is_false(inverted);
        let none = self.f.is_false(mask);
        let zero = self.f.load_zero(ValueType::I8);
        self.store_cr_bit(24, all);
        self.store_cr_bit(25, zero);
        self.store_cr_bit(26, none);
        self.store_cr_bit(27, zero);
    }

    /// Emits the link-register update for a `bl`-style instruction.
    pub(crate) fn update_lr_for_call(&mut self) {
        let ret = self.f.load_constant((self.address + 4) as u64);
        self.store_lr(ret);
    }

    /// Tail flag for calls leaving the function.
    pub(crate) fn tail_flags() -> u16 {
        CALL_TAIL
    }
}
