//! Interpreter backend: HIR → intcode.
//!
//! Lowering produces a dense array of fixed-size records, each holding a
//! handler pointer and four register slots. Registers live in a flat file
//! of 128-bit cells; constants become ephemeral `load_constant` records
//! that write their slot before the consuming record runs. Labels resolve
//! to intcode indices through a patch pass once the whole function is
//! lowered.

mod handlers;

use std::sync::Arc;

use crate::backend::Backend;
use crate::error::{ExecError, TranslationError};
use crate::hir::{sig_dest, sig_src1, sig_src2, sig_src3, HirFunction, LabelId, Operand, SigType, ValueId};
use crate::runtime::{Function, FunctionBody, FunctionInfo};
use crate::thread_state::ThreadState;
use crate::vec128::Vec128;

/// Handler result: advance to the next record.
pub(crate) const IA_NEXT: u32 = u32::MAX;

/// Handler result: return from this function.
pub(crate) const IA_RETURN: u32 = u32::MAX - 1;

/// Label tag bit marking "address assigned".
const TAG_ASSIGNED: u32 = 0x8000_0000;

/// One interpreter instruction.
pub(crate) struct IntCode {
    pub(crate) fun: IntCodeFn,
    pub(crate) flags: u16,
    pub(crate) dest_reg: u32,
    pub(crate) src1_reg: u32,
    pub(crate) src2_reg: u32,
    pub(crate) src3_reg: u32,
    /// Inline payload, meaningful only for `load_constant` and `comment`.
    pub(crate) constant: Vec128,
}

pub(crate) type IntCodeFn = fn(&mut IntCodeState<'_>, &IntCode) -> u32;

/// Execution state for one activation of an intcode function.
pub(crate) struct IntCodeState<'a> {
    pub(crate) rf: Vec<Vec128>,
    pub(crate) did_carry: bool,
    pub(crate) fault: Option<ExecError>,
    pub(crate) ctx: *mut u8,
    pub(crate) membase: *mut u8,
    pub(crate) thread: &'a mut ThreadState,
    pub(crate) function: &'a IntCodeFunction,
}

impl IntCodeState<'_> {
    #[inline]
    pub(crate) fn get(&self, r: u32) -> Vec128 {
        self.rf[r as usize]
    }

    #[inline]
    pub(crate) fn set(&mut self, r: u32, v: Vec128) {
        self.rf[r as usize] = v;
    }

    #[inline]
    pub(crate) fn get_u8(&self, r: u32) -> u8 {
        self.rf[r as usize].u8(0)
    }

    #[inline]
    pub(crate) fn get_u16(&self, r: u32) -> u16 {
        self.rf[r as usize].u16(0)
    }

    #[inline]
    pub(crate) fn get_u32(&self, r: u32) -> u32 {
        self.rf[r as usize].u32(0)
    }

    #[inline]
    pub(crate) fn get_u64(&self, r: u32) -> u64 {
        self.rf[r as usize].low()
    }

    #[inline]
    pub(crate) fn get_f32(&self, r: u32) -> f32 {
        self.rf[r as usize].f32(0)
    }

    #[inline]
    pub(crate) fn get_f64(&self, r: u32) -> f64 {
        f64::from_bits(self.rf[r as usize].low())
    }

    #[inline]
    pub(crate) fn set_u8(&mut self, r: u32, v: u8) {
        self.rf[r as usize].set_u8(0, v);
    }

    #[inline]
    pub(crate) fn set_u16(&mut self, r: u32, v: u16) {
        self.rf[r as usize].set_u16(0, v);
    }

    #[inline]
    pub(crate) fn set_u32(&mut self, r: u32, v: u32) {
        self.rf[r as usize].set_u32(0, v);
    }

    #[inline]
    pub(crate) fn set_u64(&mut self, r: u32, v: u64) {
        let high = self.rf[r as usize].high();
        self.rf[r as usize] = Vec128::from_u64x2(v, high);
    }

    #[inline]
    pub(crate) fn set_f32(&mut self, r: u32, v: f32) {
        self.rf[r as usize].set_f32(0, v);
    }

    #[inline]
    pub(crate) fn set_f64(&mut self, r: u32, v: f64) {
        self.set_u64(r, v.to_bits());
    }

    /// Reads a typed cell out of the guest context block.
    ///
    /// # Safety
    ///
    /// `offset` must come from a frontend-published context offset.
    #[inline]
    pub(crate) unsafe fn ctx_read<T: Copy>(&self, offset: u64) -> T {
        std::ptr::read_unaligned(self.ctx.add(offset as usize) as *const T)
    }

    /// Writes a typed cell into the guest context block.
    ///
    /// # Safety
    ///
    /// As [`IntCodeState::ctx_read`].
    #[inline]
    pub(crate) unsafe fn ctx_write<T: Copy>(&mut self, offset: u64, v: T) {
        std::ptr::write_unaligned(self.ctx.add(offset as usize) as *mut T, v)
    }

    /// Host pointer for a guest address.
    #[inline]
    pub(crate) fn mem(&self, address: u32) -> *mut u8 {
        // Safety: the memory collaborator owns bounds policy; translated
        // code performs the same raw access the guest would.
        unsafe { self.membase.add(address as usize) }
    }
}

/// A function lowered to intcode.
pub struct IntCodeFunction {
    intcodes: Vec<IntCode>,
    register_count: u32,
    symbols: Vec<Arc<FunctionInfo>>,
    comments: Vec<Box<str>>,
}

impl IntCodeFunction {
    /// Number of intcode records (tests and tooling).
    pub fn len(&self) -> usize {
        self.intcodes.len()
    }

    /// Whether the body is empty.
    pub fn is_empty(&self) -> bool {
        self.intcodes.is_empty()
    }

    pub(crate) fn symbol(&self, index: u64) -> &Arc<FunctionInfo> {
        &self.symbols[index as usize]
    }

    pub(crate) fn comment(&self, index: u64) -> &str {
        &self.comments[index as usize]
    }

    /// Runs the dispatch loop against a thread's state.
    pub(crate) fn call(&self, thread: &mut ThreadState) -> Result<(), ExecError> {
        let ctx = thread.context_mut().as_mut_ptr();
        let membase = thread.memory().base_ptr();
        let mut state = IntCodeState {
            rf: vec![Vec128::ZERO; self.register_count as usize],
            did_carry: false,
            fault: None,
            ctx,
            membase,
            thread,
            function: self,
        };
        let mut ia = 0u32;
        while (ia as usize) < self.intcodes.len() {
            let ic = &self.intcodes[ia as usize];
            let next = (ic.fun)(&mut state, ic);
            if let Some(fault) = state.fault.take() {
                return Err(fault);
            }
            ia = match next {
                IA_NEXT => ia + 1,
                IA_RETURN => break,
                target => target,
            };
        }
        Ok(())
    }
}

/// Translation state while lowering one function.
pub(crate) struct TranslationContext<'h> {
    pub(crate) hir: &'h mut HirFunction,
    pub(crate) intcodes: Vec<IntCode>,
    pub(crate) register_count: u32,
    label_refs: Vec<(LabelId, usize)>,
    symbols: Vec<Arc<FunctionInfo>>,
}

impl<'h> TranslationContext<'h> {
    fn new(hir: &'h mut HirFunction) -> Self {
        Self {
            hir,
            intcodes: Vec::new(),
            register_count: 0,
            label_refs: Vec::new(),
            symbols: Vec::new(),
        }
    }

    /// Emits an ephemeral constant record and returns its slot.
    pub(crate) fn alloc_constant(&mut self, value: Vec128) -> u32 {
        let reg = self.register_count;
        self.register_count += 1;
        self.intcodes.push(IntCode {
            fun: handlers::load_constant,
            flags: 0,
            dest_reg: reg,
            src1_reg: 0,
            src2_reg: 0,
            src3_reg: 0,
            constant: value,
        });
        reg
    }

    fn alloc_constant_u64(&mut self, value: u64) -> u32 {
        self.alloc_constant(Vec128::from_u64x2(value, 0))
    }

    /// Resolves a label operand to a slot holding the target index. An
    /// already-assigned label reads its tag directly; otherwise a zero
    /// placeholder is emitted and queued for the patch pass.
    fn alloc_label(&mut self, label: LabelId) -> u32 {
        let tag = self.hir.label(label).tag;
        if tag & TAG_ASSIGNED != 0 {
            return self.alloc_constant_u64((tag & !TAG_ASSIGNED) as u64);
        }
        let reg = self.alloc_constant_u64(0);
        let at = self.intcodes.len() - 1;
        self.label_refs.push((label, at));
        reg
    }

    /// Stable slot for a non-constant value, assigned on first use.
    /// `tag` stores slot + 1 so zero means unassigned.
    fn alloc_dynamic(&mut self, value: ValueId) -> u32 {
        let tag = self.hir.value(value).tag;
        if tag != 0 {
            return tag - 1;
        }
        let reg = self.register_count;
        self.register_count += 1;
        self.hir.value_mut(value).tag = reg + 1;
        reg
    }

    fn alloc_op(&mut self, sig: SigType, op: &Operand) -> u32 {
        match sig {
            SigType::X => 0,
            SigType::L => self.alloc_label(op.label()),
            SigType::O => self.alloc_constant_u64(op.offset()),
            SigType::S => {
                let index = self.symbols.len() as u64;
                self.symbols.push(op.symbol().clone());
                self.alloc_constant_u64(index)
            }
            SigType::V => {
                let id = op.value();
                if self.hir.value(id).is_constant() {
                    let payload = self.hir.value(id).constant;
                    self.alloc_constant(payload)
                } else {
                    self.alloc_dynamic(id)
                }
            }
        }
    }

    /// Allocates operand slots per the opcode signature and appends the
    /// record last, after any constant setup records.
    pub(crate) fn emit(&mut self, i: &crate::hir::Instr, fun: IntCodeFn) {
        let signature = i.opcode.info().signature;
        let dest_reg = if sig_dest(signature) == SigType::V {
            self.alloc_dynamic(i.dest.expect("signature promises a dest"))
        } else {
            0
        };
        let src1_reg = self.alloc_op(sig_src1(signature), &i.src1);
        let src2_reg = self.alloc_op(sig_src2(signature), &i.src2);
        let src3_reg = self.alloc_op(sig_src3(signature), &i.src3);
        self.intcodes.push(IntCode {
            fun,
            flags: i.flags,
            dest_reg,
            src1_reg,
            src2_reg,
            src3_reg,
            constant: Vec128::ZERO,
        });
    }
}

/// The interpreter backend.
#[derive(Debug, Default)]
pub struct InterpBackend;

impl InterpBackend {
    /// Creates the backend.
    pub fn new() -> Self {
        Self
    }
}

impl Backend for InterpBackend {
    fn name(&self) -> &'static str {
        "interp"
    }

    fn assemble(
        &self,
        info: &Arc<FunctionInfo>,
        hir: &mut HirFunction,
        _trace_flags: u32,
    ) -> Result<Function, TranslationError> {
        hir.reset_tags();
        let instrs = hir.instrs().to_vec();
        let comments = std::mem::take(&mut hir.comments);

        // Labels sorted by anchor; tags are assigned as lowering reaches
        // each anchor so back-branches read them directly.
        let mut anchors: Vec<(u32, LabelId)> = hir
            .labels()
            .iter()
            .enumerate()
            .filter_map(|(n, l)| l.instr_index.map(|idx| (idx, LabelId(n as u32))))
            .collect();
        anchors.sort_by_key(|&(idx, _)| idx);

        let mut tx = TranslationContext::new(hir);
        let mut anchor_at = 0;
        for (idx, instr) in instrs.iter().enumerate() {
            while anchor_at < anchors.len() && anchors[anchor_at].0 as usize == idx {
                let label = anchors[anchor_at].1;
                tx.hir.label_mut(label).tag = tx.intcodes.len() as u32 | TAG_ASSIGNED;
                anchor_at += 1;
            }
            handlers::translate_instr(&mut tx, instr);
        }
        while anchor_at < anchors.len() {
            let label = anchors[anchor_at].1;
            tx.hir.label_mut(label).tag = tx.intcodes.len() as u32 | TAG_ASSIGNED;
            anchor_at += 1;
        }

        // Patch pass: rewrite every queued placeholder with the final
        // intcode index of its label.
        for (label, at) in std::mem::take(&mut tx.label_refs) {
            let tag = tx.hir.label(label).tag;
            debug_assert!(tag & TAG_ASSIGNED != 0, "label never anchored");
            tx.intcodes[at].constant = Vec128::from_u64x2((tag & !TAG_ASSIGNED) as u64, 0);
        }

        let body = IntCodeFunction {
            intcodes: tx.intcodes,
            register_count: tx.register_count,
            symbols: tx.symbols,
            comments,
        };
        Ok(Function::new(info.address(), FunctionBody::IntCode(body)))
    }
}
