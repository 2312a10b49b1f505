//! Per-opcode lowering sequences and the host helpers they call into.

use std::sync::Arc;

use tracing::trace;

use crate::backend::vector::{self, CompareOp};
use crate::backend::x64::emitter::{Cc, CodeLabel, Emitter, Gp, Width, Xmm};
use crate::error::ExecError;
use crate::hir::{
    HirFunction, Instr, LabelId, Opcode, Operand, ValueId, ValueType, ARITHMETIC_SET_CARRY,
    ARITHMETIC_UNSIGNED, CALL_TAIL,
};
use crate::context::PpcContext;
use crate::runtime::{FunctionInfo, FunctionType};
use crate::thread_state::ThreadState;
use crate::vec128::Vec128;

/// Start of the value slot area in the frame (below is the call scratch
/// region and the context home slot).
const SLOT_BASE: i32 = 0x40;

/// Result of lowering one function.
pub(super) struct Lowered {
    pub code: Vec<u8>,
    pub symbols: Vec<Arc<FunctionInfo>>,
    pub comments: Vec<Box<str>>,
}

// Host helpers. All are `extern "sysv64"` so generated code can call them
// directly; non-zero returns indicate a fault recorded on the thread.

unsafe extern "sysv64" fn host_call_symbol(raw_ctx: *mut u8, symbol: *const FunctionInfo) -> u32 {
    let thread = ThreadState::from_raw_context(raw_ctx);
    let address = (*symbol).address();
    host_call_common(thread, address)
}

unsafe extern "sysv64" fn host_call_address(raw_ctx: *mut u8, address: u64) -> u32 {
    let thread = ThreadState::from_raw_context(raw_ctx);
    host_call_common(thread, address as u32)
}

fn host_call_common(thread: &mut ThreadState, address: u32) -> u32 {
    let runtime = thread.runtime().clone();
    match runtime.resolve_function(address) {
        Ok(function) => {
            debug_assert!(matches!(
                function.function_type(),
                FunctionType::User | FunctionType::Extern
            ));
            match function.call(thread) {
                Ok(()) => 0,
                Err(fault) => {
                    thread.set_fault(fault);
                    1
                }
            }
        }
        Err(e) => {
            thread.set_fault(e.into());
            1
        }
    }
}

unsafe extern "sysv64" fn host_fault(raw_ctx: *mut u8, kind: u32) -> u32 {
    let thread = ThreadState::from_raw_context(raw_ctx);
    thread.set_fault(match kind {
        0 => ExecError::Trap,
        1 => ExecError::DebugBreak,
        _ => ExecError::InvalidOpcode,
    });
    1
}

unsafe extern "sysv64" fn host_comment(_raw_ctx: *mut u8, ptr: *const u8, len: u64) {
    let text = std::str::from_utf8_unchecked(std::slice::from_raw_parts(ptr, len as usize));
    trace!(target: "x64", "{}", text);
}

unsafe extern "sysv64" fn host_trace_context_load(_raw_ctx: *mut u8, offset: u64, value: u64) {
    trace!(target: "x64", "ctx +{offset} -> {value:X}");
}

unsafe extern "sysv64" fn host_trace_context_store(_raw_ctx: *mut u8, offset: u64, value: u64) {
    trace!(target: "x64", "ctx +{offset} <- {value:X}");
}

fn sext(bits: u32, v: u64) -> i64 {
    let shift = 64 - bits;
    ((v << shift) as i64) >> shift
}

unsafe extern "sysv64" fn host_div(a: u64, b: u64, bits: u32, unsigned: u32) -> u64 {
    // Division by zero yields zero, matching the interpreter.
    if b & (u64::MAX >> (64 - bits)) == 0 {
        return 0;
    }
    if unsigned != 0 {
        a.wrapping_div(b)
    } else {
        sext(bits, a).wrapping_div(sext(bits, b)) as u64
    }
}

unsafe extern "sysv64" fn host_mul_hi(a: u64, b: u64, bits: u32, unsigned: u32) -> u64 {
    if unsigned != 0 {
        (((a as u128) * (b as u128)) >> bits) as u64
    } else {
        ((sext(bits, a) as i128 * sext(bits, b) as i128) >> bits) as u64
    }
}

unsafe extern "sysv64" fn host_vec_compare(
    op: u32,
    elem: u32,
    dest: *mut Vec128,
    a: *const Vec128,
    b: *const Vec128,
) {
    let op = match op {
        0 => CompareOp::Eq,
        1 => CompareOp::Sgt,
        2 => CompareOp::Sge,
        3 => CompareOp::Ugt,
        _ => CompareOp::Uge,
    };
    *dest = vector::compare(op, elem_of(elem), *a, *b);
}

unsafe extern "sysv64" fn host_vec_shift(
    kind: u32,
    elem: u32,
    dest: *mut Vec128,
    a: *const Vec128,
    b: *const Vec128,
) {
    *dest = match kind {
        0 => vector::shl(elem_of(elem), *a, *b),
        1 => vector::shr(elem_of(elem), *a, *b),
        _ => vector::sha(elem_of(elem), *a, *b),
    };
}

unsafe extern "sysv64" fn host_vec_cvt(kind: u32, dest: *mut Vec128, a: *const Vec128) {
    *dest = match kind {
        0 => vector::convert_i2f(*a, false),
        1 => vector::convert_i2f(*a, true),
        2 => vector::convert_f2i(*a, false),
        _ => vector::convert_f2i(*a, true),
    };
}

unsafe extern "sysv64" fn host_permute_u32(
    dest: *mut Vec128,
    control: u32,
    a: *const Vec128,
    b: *const Vec128,
) {
    *dest = vector::permute_by_u32(control, *a, *b);
}

unsafe extern "sysv64" fn host_permute_bytes(
    dest: *mut Vec128,
    control: *const Vec128,
    a: *const Vec128,
    b: *const Vec128,
) {
    *dest = vector::permute_bytes(*control, *a, *b);
}

unsafe extern "sysv64" fn host_swizzle(dest: *mut Vec128, a: *const Vec128, control: u32) {
    *dest = vector::swizzle_u32(control as u8, *a);
}

unsafe extern "sysv64" fn host_dot(lanes: u32, dest: *mut f32, a: *const Vec128, b: *const Vec128) {
    *dest = if lanes == 3 {
        vector::dot3(*a, *b)
    } else {
        vector::dot4(*a, *b)
    };
}

unsafe extern "sysv64" fn host_rsqrt(dest: *mut Vec128, a: *const Vec128) {
    *dest = vector::rsqrt(*a);
}

unsafe extern "sysv64" fn host_neg_abs_v128(kind: u32, dest: *mut Vec128, a: *const Vec128) {
    let mut out = Vec128::ZERO;
    for n in 0..4 {
        let v = (*a).f32(n);
        out.set_f32(n, if kind == 0 { -v } else { v.abs() });
    }
    *dest = out;
}

unsafe extern "sysv64" fn host_extract(dest: *mut u8, a: *const Vec128, lane: u64, width: u32) {
    match width {
        8 => *dest = (*a).u8(lane as usize),
        16 => *(dest as *mut u16) = (*a).u16(lane as usize),
        _ => *(dest as *mut u32) = (*a).u32(lane as usize),
    }
}

unsafe extern "sysv64" fn host_splat(dest: *mut Vec128, src: *const u8, width: u32) {
    let mut out = Vec128::ZERO;
    match width {
        8 => {
            for n in 0..16 {
                out.set_u8(n, *src);
            }
        }
        16 => {
            for n in 0..8 {
                out.set_u16(n, *(src as *const u16));
            }
        }
        _ => {
            for n in 0..4 {
                out.set_u32(n, *(src as *const u32));
            }
        }
    }
    *dest = out;
}

unsafe extern "sysv64" fn host_lvs(left: u32, dest: *mut Vec128, sh: u64) {
    *dest = if left != 0 {
        vector::load_shl_vector(sh as u8)
    } else {
        vector::load_shr_vector(sh as u8)
    };
}

unsafe extern "sysv64" fn host_load_clock() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

fn elem_of(raw: u32) -> ValueType {
    match raw & 0x7 {
        0 => ValueType::I8,
        1 => ValueType::I16,
        2 => ValueType::I32,
        3 => ValueType::I64,
        4 => ValueType::F32,
        5 => ValueType::F64,
        _ => ValueType::V128,
    }
}

fn width_of(ty: ValueType) -> Width {
    match ty {
        ValueType::I8 => Width::B8,
        ValueType::I16 => Width::B16,
        ValueType::I32 | ValueType::F32 => Width::B32,
        _ => Width::B64,
    }
}

struct Seq<'h> {
    e: Emitter,
    hir: &'h HirFunction,
    epilog: CodeLabel,
    labels: Vec<CodeLabel>,
    symbols: Vec<Arc<FunctionInfo>>,
    trace_flags: u32,
}

impl<'h> Seq<'h> {
    fn slot(&self, v: ValueId) -> i32 {
        SLOT_BASE + v.0 as i32 * 16
    }

    fn ty(&self, v: ValueId) -> ValueType {
        self.hir.value(v).ty
    }

    fn dest(&self, i: &Instr) -> ValueId {
        i.dest.expect("dest required")
    }

    /// Loads an operand into a GPR at `width`, folding constants to
    /// immediates (64-bit constants stage through a full move).
    fn load_op(&mut self, op: &Operand, width: Width, dst: Gp) {
        match op {
            Operand::Value(v) => {
                let value = self.hir.value(*v);
                if value.is_constant() {
                    let raw = value.constant.low();
                    match width {
                        Width::B64 if raw > u32::MAX as u64 => self.e.mov_ri64(dst, raw),
                        Width::B64 => self.e.mov_ri32(dst, raw as u32),
                        _ => self.e.mov_ri32(dst, (raw & ((1u64 << width.bits()) - 1)) as u32),
                    }
                } else {
                    let slot = self.slot(*v);
                    self.e.load(width, dst, Gp::Rsp, slot);
                }
            }
            Operand::Offset(o) => {
                if *o > u32::MAX as u64 {
                    self.e.mov_ri64(dst, *o);
                } else {
                    self.e.mov_ri32(dst, *o as u32);
                }
            }
            other => panic!("operand not loadable into a register: {other:?}"),
        }
    }

    /// Ensures an operand's 128-bit payload is in its slot and returns the
    /// slot displacement (constants are materialized on demand).
    fn slot_ptr(&mut self, op: &Operand) -> i32 {
        let v = op.value();
        let value = self.hir.value(v);
        let slot = self.slot(v);
        if value.is_constant() {
            let (low, high) = (value.constant.low(), value.constant.high());
            self.e.mov_ri64(Gp::Rax, low);
            self.e.store(Width::B64, Gp::Rsp, slot, Gp::Rax);
            self.e.mov_ri64(Gp::Rax, high);
            self.e.store(Width::B64, Gp::Rsp, slot + 8, Gp::Rax);
        }
        slot
    }

    fn store_dest(&mut self, i: &Instr, width: Width, src: Gp) {
        let slot = self.slot(self.dest(i));
        self.e.store(width, Gp::Rsp, slot, src);
    }

    fn load_xmm(&mut self, op: &Operand, dst: Xmm) {
        let slot = self.slot_ptr(op);
        self.e.movups_load(dst, Gp::Rsp, slot);
    }

    fn store_xmm_dest(&mut self, i: &Instr, src: Xmm) {
        let slot = self.slot(self.dest(i));
        self.e.movups_store(Gp::Rsp, slot, src);
    }

    /// Restores `rcx`/`rdx` after any host call.
    fn reload_context(&mut self) {
        self.e.load(Width::B64, Gp::Rcx, Gp::Rsp, 0);
        self.e.load(Width::B64, Gp::Rdx, Gp::Rcx, PpcContext::MEMBASE_OFFSET as i32);
    }

    fn call_host(&mut self, target: usize) {
        self.e.mov_ri64(Gp::Rax, target as u64);
        self.e.call_r(Gp::Rax);
        self.reload_context();
    }

    /// Evaluates the truthiness of `op` into the flags (ZF clear = true).
    /// Constants are resolved statically. Float booleans are reserved.
    fn check_boolean(&mut self, op: &Operand) -> Option<bool> {
        let v = op.value();
        let value = self.hir.value(v);
        if value.is_constant() {
            return Some(!value.is_constant_zero());
        }
        match value.ty {
            ValueType::V128 => {
                let slot = self.slot(v);
                self.e.load(Width::B64, Gp::R10, Gp::Rsp, slot);
                self.e.load(Width::B64, Gp::Rax, Gp::Rsp, slot + 8);
                self.e.or_rr(Width::B64, Gp::R10, Gp::Rax);
            }
            ValueType::F32 | ValueType::F64 => {
                // Reserved, as in the interpreter's scalar-boolean model.
                self.e.int3();
                self.e.xor_rr(Width::B32, Gp::R10, Gp::R10);
                self.e.test_rr(Width::B32, Gp::R10, Gp::R10);
            }
            ty => {
                let w = width_of(ty);
                self.load_op(op, w, Gp::R10);
                self.e.test_rr(w, Gp::R10, Gp::R10);
            }
        }
        None
    }

    /// Emits the carry write-back for flagged arithmetic.
    fn store_carry(&mut self, cc: Cc) {
        self.e.setcc(cc, Gp::Rax);
        self.e
            .store(Width::B8, Gp::Rcx, PpcContext::DID_CARRY_OFFSET as i32, Gp::Rax);
    }

    /// `jmp`/branch target for an HIR label.
    fn code_label(&self, label: LabelId) -> CodeLabel {
        self.labels[label.0 as usize]
    }

    /// Shift with the interpreter's saturation semantics: counts at or
    /// past the width drain to zero (or the sign for arithmetic shifts).
    fn shift(&mut self, i: &Instr, kind: ShiftKind) {
        let ty = self.ty(self.dest(i));
        let w = width_of(ty);
        let bits = w.bits();
        self.load_op(&i.src1, w, Gp::R10);
        self.load_op(&i.src2, Width::B8, Gp::R11);
        // cl is the low byte of the context register; park it in rax.
        self.e.mov_rr(Gp::Rax, Gp::Rcx);
        self.e.movzx(Width::B32, Gp::Rcx, Gp::R11);
        let done = self.e.new_label();
        let ok = self.e.new_label();
        self.e.cmp_ri(Width::B32, Gp::Rcx, bits as i32);
        self.e.jcc(Cc::B, ok);
        match kind {
            ShiftKind::Shl | ShiftKind::Shr => {
                self.e.xor_rr(Width::B32, Gp::R10, Gp::R10);
                self.e.jmp(done);
            }
            ShiftKind::Sar => {
                self.e.mov_ri32(Gp::Rcx, bits - 1);
            }
            ShiftKind::Rol => {
                // rol masks its count; nothing to clamp.
            }
        }
        self.e.bind(ok);
        match kind {
            ShiftKind::Shl => self.e.shl_cl(w, Gp::R10),
            ShiftKind::Shr => self.e.shr_cl(w, Gp::R10),
            ShiftKind::Sar => self.e.sar_cl(w, Gp::R10),
            ShiftKind::Rol => self.e.rol_cl(w, Gp::R10),
        }
        self.e.bind(done);
        self.e.mov_rr(Gp::Rcx, Gp::Rax);
        self.store_dest(i, w, Gp::R10);
    }

    /// Copies a value-sized payload between slots through scratch.
    fn copy_slots(&mut self, ty: ValueType, from: i32, to: i32) {
        if ty == ValueType::V128 {
            self.e.movups_load(Xmm::Xmm0, Gp::Rsp, from);
            self.e.movups_store(Gp::Rsp, to, Xmm::Xmm0);
        } else {
            let w = width_of(ty);
            self.e.load(w, Gp::Rax, Gp::Rsp, from);
            self.e.store(w, Gp::Rsp, to, Gp::Rax);
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ShiftKind {
    Shl,
    Shr,
    Sar,
    Rol,
}

/// Lowers a whole function to machine code.
pub(super) fn lower(hir: &mut HirFunction, trace_flags: u32) -> Lowered {
    let comments = std::mem::take(&mut hir.comments);
    let instrs = hir.instrs().to_vec();
    let value_count = hir.values.len() as i32;
    let frame = 0x48 + value_count * 16;

    let mut e = Emitter::new();
    let labels: Vec<CodeLabel> = hir.labels().iter().map(|_| e.new_label()).collect();
    let epilog = e.new_label();

    // Prologue: move the SysV argument into the context register, carve
    // the frame, home the context, cache the memory base.
    e.mov_rr(Gp::Rcx, Gp::Rdi);
    e.sub_ri(Width::B64, Gp::Rsp, frame);
    e.store(Width::B64, Gp::Rsp, 0, Gp::Rcx);
    e.load(Width::B64, Gp::Rdx, Gp::Rcx, PpcContext::MEMBASE_OFFSET as i32);

    let mut anchors: Vec<(u32, LabelId)> = hir
        .labels()
        .iter()
        .enumerate()
        .filter_map(|(n, l)| l.instr_index.map(|idx| (idx, LabelId(n as u32))))
        .collect();
    anchors.sort_by_key(|&(idx, _)| idx);

    let mut seq = Seq {
        e,
        hir,
        epilog,
        labels,
        symbols: Vec::new(),
        trace_flags,
    };

    let mut anchor_at = 0;
    for (idx, instr) in instrs.iter().enumerate() {
        while anchor_at < anchors.len() && anchors[anchor_at].0 as usize == idx {
            let label = seq.code_label(anchors[anchor_at].1);
            seq.e.bind(label);
            anchor_at += 1;
        }
        lower_instr(&mut seq, instr, &comments);
    }
    while anchor_at < anchors.len() {
        let label = seq.code_label(anchors[anchor_at].1);
        seq.e.bind(label);
        anchor_at += 1;
    }

    // Shared epilog.
    seq.e.bind(epilog);
    seq.e.add_ri(Width::B64, Gp::Rsp, frame);
    seq.e.ret();

    Lowered {
        code: seq.e.finish(),
        symbols: seq.symbols,
        comments,
    }
}

fn lower_instr(s: &mut Seq<'_>, i: &Instr, comments: &[Box<str>]) {
    use Opcode::*;
    match i.opcode {
        Comment => {
            let text = &comments[i.src1.offset() as usize];
            let (ptr, len) = (text.as_ptr() as u64, text.len() as u64);
            s.e.mov_rr(Gp::Rdi, Gp::Rcx);
            s.e.mov_ri64(Gp::Rsi, ptr);
            s.e.mov_ri64(Gp::Rdx, len);
            s.call_host(host_comment as usize);
        }
        Nop | SourceOffset | Prefetch => {}
        DebugBreak => emit_fault(s, 1, true),
        Trap => emit_fault(s, 0, true),
        DebugBreakTrue | TrapTrue => {
            let kind = if i.opcode == DebugBreakTrue { 1 } else { 0 };
            match s.check_boolean(&i.src1) {
                Some(false) => {}
                Some(true) => emit_fault(s, kind, true),
                None => {
                    let skip = s.e.new_label();
                    s.e.jcc(Cc::E, skip);
                    emit_fault(s, kind, true);
                    s.e.bind(skip);
                }
            }
        }
        Call => emit_call_symbol(s, i.src1.symbol().clone(), i.flags),
        CallTrue => match s.check_boolean(&i.src1) {
            Some(false) => {}
            Some(true) => emit_call_symbol(s, i.src2.symbol().clone(), i.flags),
            None => {
                let skip = s.e.new_label();
                s.e.jcc(Cc::E, skip);
                emit_call_symbol(s, i.src2.symbol().clone(), i.flags);
                s.e.bind(skip);
            }
        },
        CallIndirect => emit_call_indirect(s, &i.src1, i.flags),
        CallIndirectTrue => match s.check_boolean(&i.src1) {
            Some(false) => {}
            Some(true) => emit_call_indirect(s, &i.src2, i.flags),
            None => {
                let skip = s.e.new_label();
                s.e.jcc(Cc::E, skip);
                emit_call_indirect(s, &i.src2, i.flags);
                s.e.bind(skip);
            }
        },
        Return => s.e.jmp(s.epilog),
        ReturnTrue => match s.check_boolean(&i.src1) {
            Some(false) => {}
            Some(true) => s.e.jmp(s.epilog),
            None => s.e.jcc(Cc::Ne, s.epilog),
        },
        Branch => {
            let target = s.code_label(i.src1.label());
            s.e.jmp(target);
        }
        BranchTrue => {
            let target = s.code_label(i.src2.label());
            match s.check_boolean(&i.src1) {
                Some(false) => {}
                Some(true) => s.e.jmp(target),
                None => s.e.jcc(Cc::Ne, target),
            }
        }
        BranchFalse => {
            let target = s.code_label(i.src2.label());
            match s.check_boolean(&i.src1) {
                Some(true) => {}
                Some(false) => s.e.jmp(target),
                None => s.e.jcc(Cc::E, target),
            }
        }
        BranchIf => {
            let t = s.code_label(i.src2.label());
            let f = s.code_label(i.src3.label());
            match s.check_boolean(&i.src1) {
                Some(true) => s.e.jmp(t),
                Some(false) => s.e.jmp(f),
                None => {
                    s.e.jcc(Cc::Ne, t);
                    s.e.jmp(f);
                }
            }
        }

        Assign | Cast => {
            let dest = s.dest(i);
            let ty = s.ty(dest);
            let from = s.slot_ptr(&i.src1);
            let to = s.slot(dest);
            // Cast re-interprets the full cell; assign copies it too.
            let copy_ty = if ty == ValueType::V128 || s.ty(i.src1.value()) == ValueType::V128 {
                ValueType::V128
            } else {
                ValueType::I64
            };
            s.copy_slots(copy_ty, from, to);
        }
        ZeroExtend | Truncate => {
            let from_w = width_of(s.ty(i.src1.value()));
            let to_w = width_of(s.ty(s.dest(i)));
            let w = if i.opcode == Truncate { to_w } else { from_w };
            s.load_op(&i.src1, w, Gp::R10);
            s.store_dest(i, to_w, Gp::R10);
        }
        SignExtend => {
            let from_w = width_of(s.ty(i.src1.value()));
            let to_w = width_of(s.ty(s.dest(i)));
            s.load_op(&i.src1, from_w, Gp::R10);
            s.e.movsx(from_w, Gp::R10, Gp::R10);
            s.store_dest(i, to_w, Gp::R10);
        }
        Convert => emit_convert(s, i),
        VectorConvertI2F | VectorConvertF2I => {
            let unsigned = i.flags & ARITHMETIC_UNSIGNED != 0;
            let kind = match (i.opcode, unsigned) {
                (VectorConvertI2F, false) => 0,
                (VectorConvertI2F, true) => 1,
                (VectorConvertF2I, false) => 2,
                _ => 3,
            };
            let a = s.slot_ptr(&i.src1);
            let dest = s.slot(s.dest(i));
            s.e.mov_ri32(Gp::Rdi, kind);
            s.e.lea(Gp::Rsi, Gp::Rsp, dest);
            s.e.lea(Gp::Rdx, Gp::Rsp, a);
            s.call_host(host_vec_cvt as usize);
        }

        LoadContext => {
            let dest = s.dest(i);
            let ty = s.ty(dest);
            let off = i.src1.offset() as i32;
            if ty == ValueType::V128 {
                s.e.movups_load(Xmm::Xmm0, Gp::Rcx, off);
                s.store_xmm_dest(i, Xmm::Xmm0);
            } else {
                let w = width_of(ty);
                s.e.load(w, Gp::R10, Gp::Rcx, off);
                s.store_dest(i, w, Gp::R10);
                if s.trace_flags & 1 != 0 {
                    s.e.mov_rr(Gp::Rdi, Gp::Rcx);
                    s.e.mov_ri32(Gp::Rsi, off as u32);
                    s.e.mov_rr(Gp::Rdx, Gp::R10);
                    s.call_host(host_trace_context_load as usize);
                }
            }
        }
        StoreContext => {
            let ty = s.ty(i.src2.value());
            let off = i.src1.offset() as i32;
            if ty == ValueType::V128 {
                let from = s.slot_ptr(&i.src2);
                s.e.movups_load(Xmm::Xmm0, Gp::Rsp, from);
                s.e.movups_store(Gp::Rcx, off, Xmm::Xmm0);
            } else {
                let w = width_of(ty);
                s.load_op(&i.src2, w, Gp::R10);
                s.e.store(w, Gp::Rcx, off, Gp::R10);
                if s.trace_flags & 1 != 0 {
                    s.e.mov_rr(Gp::Rdi, Gp::Rcx);
                    s.e.mov_ri32(Gp::Rsi, off as u32);
                    s.e.mov_rr(Gp::Rdx, Gp::R10);
                    s.call_host(host_trace_context_store as usize);
                }
            }
        }
        Load => {
            let dest = s.dest(i);
            let ty = s.ty(dest);
            // Guest address: low 32 bits only.
            s.load_op(&i.src1, Width::B32, Gp::Rax);
            if ty == ValueType::V128 {
                s.e.and_ri(Width::B32, Gp::Rax, -16);
            }
            s.e.add_rr(Width::B64, Gp::Rax, Gp::Rdx);
            if ty == ValueType::V128 {
                s.e.movups_load(Xmm::Xmm0, Gp::Rax, 0);
                s.store_xmm_dest(i, Xmm::Xmm0);
            } else {
                let w = width_of(ty);
                s.e.load(w, Gp::R10, Gp::Rax, 0);
                s.store_dest(i, w, Gp::R10);
            }
        }
        Store => {
            let ty = s.ty(i.src2.value());
            s.load_op(&i.src1, Width::B32, Gp::Rax);
            if ty == ValueType::V128 {
                s.e.and_ri(Width::B32, Gp::Rax, -16);
            }
            s.e.add_rr(Width::B64, Gp::Rax, Gp::Rdx);
            if ty == ValueType::V128 {
                let from = s.slot_ptr(&i.src2);
                s.e.movups_load(Xmm::Xmm0, Gp::Rsp, from);
                s.e.movups_store(Gp::Rax, 0, Xmm::Xmm0);
            } else {
                let w = width_of(ty);
                s.load_op(&i.src2, w, Gp::R10);
                s.e.store(w, Gp::Rax, 0, Gp::R10);
            }
        }

        Select => {
            let dest = s.dest(i);
            let ty = s.ty(dest);
            let a = s.slot_ptr(&i.src2);
            let b = s.slot_ptr(&i.src3);
            let to = s.slot(dest);
            match s.check_boolean(&i.src1) {
                Some(true) => s.copy_slots(ty, a, to),
                Some(false) => s.copy_slots(ty, b, to),
                None => {
                    let use_b = s.e.new_label();
                    let done = s.e.new_label();
                    s.e.jcc(Cc::E, use_b);
                    s.copy_slots(ty, a, to);
                    s.e.jmp(done);
                    s.e.bind(use_b);
                    s.copy_slots(ty, b, to);
                    s.e.bind(done);
                }
            }
        }
        IsTrue | IsFalse => {
            let invert = i.opcode == IsFalse;
            match s.check_boolean(&i.src1) {
                Some(t) => {
                    s.e.mov_ri32(Gp::R10, (t ^ invert) as u32);
                }
                None => {
                    s.e.setcc(if invert { Cc::E } else { Cc::Ne }, Gp::R10);
                }
            }
            s.store_dest(i, Width::B8, Gp::R10);
        }

        CompareEq => emit_compare(s, i, Cc::E),
        CompareNe => emit_compare(s, i, Cc::Ne),
        CompareSlt => emit_compare(s, i, Cc::L),
        CompareSle => emit_compare(s, i, Cc::Le),
        CompareSgt => emit_compare(s, i, Cc::G),
        CompareSge => emit_compare(s, i, Cc::Ge),
        CompareUlt => emit_compare(s, i, Cc::B),
        CompareUle => emit_compare(s, i, Cc::Be),
        CompareUgt => emit_compare(s, i, Cc::A),
        CompareUge => emit_compare(s, i, Cc::Ae),

        DidCarry => {
            s.e.load(Width::B8, Gp::R10, Gp::Rcx, PpcContext::DID_CARRY_OFFSET as i32);
            s.store_dest(i, Width::B8, Gp::R10);
        }
        DidOverflow => s.e.int3(),

        VectorCompareEq | VectorCompareSgt | VectorCompareSge | VectorCompareUgt
        | VectorCompareUge => {
            let op = match i.opcode {
                VectorCompareEq => 0,
                VectorCompareSgt => 1,
                VectorCompareSge => 2,
                VectorCompareUgt => 3,
                _ => 4,
            };
            let a = s.slot_ptr(&i.src1);
            let b = s.slot_ptr(&i.src2);
            let dest = s.slot(s.dest(i));
            s.e.mov_ri32(Gp::Rdi, op);
            s.e.mov_ri32(Gp::Rsi, i.flags as u32 & 0x7);
            s.e.lea(Gp::Rdx, Gp::Rsp, dest);
            s.e.lea(Gp::Rcx, Gp::Rsp, a);
            s.e.lea(Gp::R8, Gp::Rsp, b);
            s.call_host(host_vec_compare as usize);
        }
        VectorShl | VectorShr | VectorSha => {
            let kind = match i.opcode {
                VectorShl => 0,
                VectorShr => 1,
                _ => 2,
            };
            let a = s.slot_ptr(&i.src1);
            let b = s.slot_ptr(&i.src2);
            let dest = s.slot(s.dest(i));
            s.e.mov_ri32(Gp::Rdi, kind);
            s.e.mov_ri32(Gp::Rsi, i.flags as u32 & 0x7);
            s.e.lea(Gp::Rdx, Gp::Rsp, dest);
            s.e.lea(Gp::Rcx, Gp::Rsp, a);
            s.e.lea(Gp::R8, Gp::Rsp, b);
            s.call_host(host_vec_shift as usize);
        }

        Add | Sub => emit_add_sub(s, i),
        AddCarry => emit_add_carry(s, i),
        Mul => emit_mul(s, i),
        MulHi | Div => {
            let ty = s.ty(s.dest(i));
            if !matches!(
                ty,
                ValueType::I8 | ValueType::I16 | ValueType::I32 | ValueType::I64
            ) {
                emit_float_binary(s, i);
                return;
            }
            let w = width_of(ty);
            s.load_op(&i.src1, w, Gp::Rdi);
            s.load_op(&i.src2, w, Gp::Rsi);
            s.e.mov_ri32(Gp::Rdx, w.bits());
            s.e
                .mov_ri32(Gp::Rcx, (i.flags & ARITHMETIC_UNSIGNED != 0) as u32);
            let helper = if i.opcode == Div {
                host_div as usize
            } else {
                host_mul_hi as usize
            };
            s.call_host(helper);
            s.store_dest(i, w, Gp::Rax);
        }
        MulAdd | MulSub => emit_mul_add_sub(s, i),
        Neg | Abs => emit_neg_abs(s, i),
        Sqrt => emit_sqrt(s, i),
        Rsqrt => {
            let a = s.slot_ptr(&i.src1);
            let dest = s.slot(s.dest(i));
            s.e.lea(Gp::Rdi, Gp::Rsp, dest);
            s.e.lea(Gp::Rsi, Gp::Rsp, a);
            s.call_host(host_rsqrt as usize);
        }
        DotProduct3 | DotProduct4 => {
            let lanes = if i.opcode == DotProduct3 { 3 } else { 4 };
            let a = s.slot_ptr(&i.src1);
            let b = s.slot_ptr(&i.src2);
            let dest = s.slot(s.dest(i));
            s.e.mov_ri32(Gp::Rdi, lanes);
            s.e.lea(Gp::Rsi, Gp::Rsp, dest);
            s.e.lea(Gp::Rdx, Gp::Rsp, a);
            s.e.lea(Gp::Rcx, Gp::Rsp, b);
            s.call_host(host_dot as usize);
        }

        And | Or | Xor => emit_bitwise(s, i),
        Not => emit_not(s, i),
        Shl => s.shift(i, ShiftKind::Shl),
        Shr => s.shift(i, ShiftKind::Shr),
        Sha => s.shift(i, ShiftKind::Sar),
        RotateLeft => s.shift(i, ShiftKind::Rol),
        ByteSwap => emit_byte_swap(s, i),
        Cntlz => emit_cntlz(s, i),

        Insert | Pack | Unpack => s.e.int3(),
        Extract => {
            let width = width_of(s.ty(s.dest(i))).bits();
            let a = s.slot_ptr(&i.src1);
            let dest = s.slot(s.dest(i));
            s.e.lea(Gp::Rdi, Gp::Rsp, dest);
            s.e.lea(Gp::Rsi, Gp::Rsp, a);
            s.load_op(&i.src2, Width::B64, Gp::Rdx);
            s.e.mov_ri32(Gp::Rcx, width);
            s.call_host(host_extract as usize);
        }
        Splat => {
            let width = width_of(s.ty(i.src1.value())).bits();
            let a = s.slot_ptr(&i.src1);
            let dest = s.slot(s.dest(i));
            s.e.lea(Gp::Rdi, Gp::Rsp, dest);
            s.e.lea(Gp::Rsi, Gp::Rsp, a);
            s.e.mov_ri32(Gp::Rdx, width);
            s.call_host(host_splat as usize);
        }
        Permute => {
            let dest = s.slot(s.dest(i));
            if s.ty(i.src1.value()) == ValueType::I32 {
                let a = s.slot_ptr(&i.src2);
                let b = s.slot_ptr(&i.src3);
                s.e.lea(Gp::Rdi, Gp::Rsp, dest);
                s.load_op(&i.src1, Width::B32, Gp::Rsi);
                s.e.lea(Gp::Rdx, Gp::Rsp, a);
                s.e.lea(Gp::Rcx, Gp::Rsp, b);
                s.call_host(host_permute_u32 as usize);
            } else {
                let c = s.slot_ptr(&i.src1);
                let a = s.slot_ptr(&i.src2);
                let b = s.slot_ptr(&i.src3);
                s.e.lea(Gp::Rdi, Gp::Rsp, dest);
                s.e.lea(Gp::Rsi, Gp::Rsp, c);
                s.e.lea(Gp::Rdx, Gp::Rsp, a);
                s.e.lea(Gp::Rcx, Gp::Rsp, b);
                s.call_host(host_permute_bytes as usize);
            }
        }
        Swizzle => {
            let a = s.slot_ptr(&i.src1);
            let dest = s.slot(s.dest(i));
            s.e.lea(Gp::Rdi, Gp::Rsp, dest);
            s.e.lea(Gp::Rsi, Gp::Rsp, a);
            s.e.mov_ri32(Gp::Rdx, i.flags as u32 & 0xFF);
            s.call_host(host_swizzle as usize);
        }

        CompareExchange => {
            let w = width_of(s.ty(s.dest(i)));
            s.load_op(&i.src1, Width::B32, Gp::R10);
            s.e.add_rr(Width::B64, Gp::R10, Gp::Rdx);
            s.load_op(&i.src2, w, Gp::Rax);
            s.load_op(&i.src3, w, Gp::R11);
            s.e.lock_cmpxchg(w, Gp::R10, 0, Gp::R11);
            s.store_dest(i, w, Gp::Rax);
        }
        AtomicExchange => {
            let w = width_of(s.ty(s.dest(i)));
            s.load_op(&i.src1, Width::B32, Gp::R10);
            s.e.add_rr(Width::B64, Gp::R10, Gp::Rdx);
            s.load_op(&i.src2, w, Gp::R11);
            s.e.xchg_mem(w, Gp::R10, 0, Gp::R11);
            s.store_dest(i, w, Gp::R11);
        }
        AtomicAdd | AtomicSub => {
            let w = width_of(s.ty(s.dest(i)));
            s.load_op(&i.src1, Width::B32, Gp::R10);
            s.e.add_rr(Width::B64, Gp::R10, Gp::Rdx);
            s.load_op(&i.src2, w, Gp::R11);
            if i.opcode == AtomicSub {
                s.e.neg_r(w, Gp::R11);
            }
            s.e.lock_xadd(w, Gp::R10, 0, Gp::R11);
            s.store_dest(i, w, Gp::R11);
        }

        LoadVectorShl | LoadVectorShr => {
            let left = (i.opcode == LoadVectorShl) as u32;
            let dest = s.slot(s.dest(i));
            s.e.mov_ri32(Gp::Rdi, left);
            s.e.lea(Gp::Rsi, Gp::Rsp, dest);
            s.load_op(&i.src1, Width::B8, Gp::Rdx);
            s.call_host(host_lvs as usize);
        }
        LoadClock => {
            s.call_host(host_load_clock as usize);
            s.store_dest(i, Width::B64, Gp::Rax);
        }
        Max | Min => emit_min_max(s, i),
    }
}


fn emit_fault(s: &mut Seq<'_>, kind: u32, jump_epilog: bool) {
    s.e.mov_rr(Gp::Rdi, Gp::Rcx);
    s.e.mov_ri32(Gp::Rsi, kind);
    s.call_host(host_fault as usize);
    if jump_epilog {
        s.e.jmp(s.epilog);
    }
}

fn emit_call_symbol(s: &mut Seq<'_>, symbol: Arc<FunctionInfo>, flags: u16) {
    let raw = Arc::as_ptr(&symbol) as u64;
    s.symbols.push(symbol);
    s.e.mov_rr(Gp::Rdi, Gp::Rcx);
    s.e.mov_ri64(Gp::Rsi, raw);
    s.call_host(host_call_symbol as usize);
    finish_call(s, flags);
}

fn emit_call_indirect(s: &mut Seq<'_>, target: &Operand, flags: u16) {
    s.load_op(target, Width::B32, Gp::Rsi);
    s.e.mov_rr(Gp::Rdi, Gp::Rcx);
    s.call_host(host_call_address as usize);
    finish_call(s, flags);
}

fn finish_call(s: &mut Seq<'_>, flags: u16) {
    // Non-zero return means a fault was recorded; unwind. Tail calls
    // unwind unconditionally once the callee returns.
    s.e.test_rr(Width::B32, Gp::Rax, Gp::Rax);
    s.e.jcc(Cc::Ne, s.epilog);
    if flags & CALL_TAIL != 0 {
        s.e.jmp(s.epilog);
    }
}

fn emit_compare(s: &mut Seq<'_>, i: &Instr, cc: Cc) {
    let ty = s.ty(i.src1.value());
    match ty {
        ValueType::F32 | ValueType::F64 | ValueType::V128 => {
            // Scalar float compares are reserved at this tier.
            s.e.int3();
        }
        _ => {
            let w = width_of(ty);
            s.load_op(&i.src1, w, Gp::R10);
            s.load_op(&i.src2, w, Gp::R11);
            s.e.cmp_rr(w, Gp::R10, Gp::R11);
            s.e.setcc(cc, Gp::R10);
            s.store_dest(i, Width::B8, Gp::R10);
        }
    }
}

fn emit_add_sub(s: &mut Seq<'_>, i: &Instr) {
    let ty = s.ty(s.dest(i));
    match ty {
        ValueType::F32 | ValueType::F64 => emit_float_binary(s, i),
        ValueType::V128 => {
            s.load_xmm(&i.src1, Xmm::Xmm0);
            s.load_xmm(&i.src2, Xmm::Xmm1);
            let op = if i.opcode == Opcode::Add { 0x58 } else { 0x5C };
            s.e.ps_op(op, Xmm::Xmm0, Xmm::Xmm1);
            s.store_xmm_dest(i, Xmm::Xmm0);
        }
        _ => {
            let w = width_of(ty);
            s.load_op(&i.src1, w, Gp::R10);
            s.load_op(&i.src2, w, Gp::R11);
            if i.opcode == Opcode::Add {
                s.e.add_rr(w, Gp::R10, Gp::R11);
                if i.flags == ARITHMETIC_SET_CARRY {
                    s.store_carry(Cc::B);
                }
            } else {
                s.e.sub_rr(w, Gp::R10, Gp::R11);
                if i.flags == ARITHMETIC_SET_CARRY {
                    // PPC subtract carry is the complement of the borrow.
                    s.store_carry(Cc::Ae);
                }
            }
            s.store_dest(i, w, Gp::R10);
        }
    }
}

fn emit_add_carry(s: &mut Seq<'_>, i: &Instr) {
    let ty = s.ty(s.dest(i));
    let w = width_of(ty);
    s.load_op(&i.src1, w, Gp::R10);
    s.load_op(&i.src2, w, Gp::R11);
    s.load_op(&i.src3, Width::B8, Gp::Rax);
    // Fold the incoming carry into CF, then let adc chain it.
    s.e.add_ri(Width::B8, Gp::Rax, -1);
    s.e.adc_rr(w, Gp::R10, Gp::R11);
    if i.flags == ARITHMETIC_SET_CARRY {
        s.store_carry(Cc::B);
    }
    s.store_dest(i, w, Gp::R10);
}

fn emit_mul(s: &mut Seq<'_>, i: &Instr) {
    let ty = s.ty(s.dest(i));
    match ty {
        ValueType::F32 | ValueType::F64 => emit_float_binary(s, i),
        ValueType::V128 => {
            s.load_xmm(&i.src1, Xmm::Xmm0);
            s.load_xmm(&i.src2, Xmm::Xmm1);
            s.e.ps_op(0x59, Xmm::Xmm0, Xmm::Xmm1);
            s.store_xmm_dest(i, Xmm::Xmm0);
        }
        _ => {
            let w = width_of(ty);
            // Narrow products are computed at 32 bits; only the low part
            // of the destination is stored.
            let mw = if matches!(w, Width::B8 | Width::B16) {
                Width::B32
            } else {
                w
            };
            s.load_op(&i.src1, w, Gp::R10);
            s.load_op(&i.src2, w, Gp::R11);
            s.e.imul_rr(mw, Gp::R10, Gp::R11);
            s.store_dest(i, w, Gp::R10);
        }
    }
}

fn emit_float_binary(s: &mut Seq<'_>, i: &Instr) {
    let ty = s.ty(s.dest(i));
    let (prefix, op) = match (ty, i.opcode) {
        (ValueType::F32, Opcode::Add) => (0xF3, 0x58),
        (ValueType::F32, Opcode::Sub) => (0xF3, 0x5C),
        (ValueType::F32, Opcode::Mul) => (0xF3, 0x59),
        (ValueType::F32, Opcode::Div) => (0xF3, 0x5E),
        (ValueType::F64, Opcode::Add) => (0xF2, 0x58),
        (ValueType::F64, Opcode::Sub) => (0xF2, 0x5C),
        (ValueType::F64, Opcode::Mul) => (0xF2, 0x59),
        (ValueType::F64, Opcode::Div) => (0xF2, 0x5E),
        (ValueType::V128, Opcode::Div) => {
            s.load_xmm(&i.src1, Xmm::Xmm0);
            s.load_xmm(&i.src2, Xmm::Xmm1);
            s.e.ps_op(0x5E, Xmm::Xmm0, Xmm::Xmm1);
            s.store_xmm_dest(i, Xmm::Xmm0);
            return;
        }
        _ => {
            s.e.int3();
            return;
        }
    };
    let a = s.slot_ptr(&i.src1);
    let b = s.slot_ptr(&i.src2);
    s.e.ss_load(prefix, Xmm::Xmm0, Gp::Rsp, a);
    s.e.ss_load(prefix, Xmm::Xmm1, Gp::Rsp, b);
    s.e.ss_op(prefix, op, Xmm::Xmm0, Xmm::Xmm1);
    let dest = s.slot(s.dest(i));
    s.e.ss_store(prefix, Gp::Rsp, dest, Xmm::Xmm0);
}

fn emit_mul_add_sub(s: &mut Seq<'_>, i: &Instr) {
    let ty = s.ty(s.dest(i));
    let add = i.opcode == Opcode::MulAdd;
    match ty {
        ValueType::V128 => {
            s.load_xmm(&i.src1, Xmm::Xmm0);
            s.load_xmm(&i.src2, Xmm::Xmm1);
            s.load_xmm(&i.src3, Xmm::Xmm2);
            s.e.ps_op(0x59, Xmm::Xmm0, Xmm::Xmm1);
            s.e.ps_op(if add { 0x58 } else { 0x5C }, Xmm::Xmm0, Xmm::Xmm2);
            s.store_xmm_dest(i, Xmm::Xmm0);
        }
        ValueType::F32 | ValueType::F64 => {
            let prefix = if ty == ValueType::F32 { 0xF3 } else { 0xF2 };
            let a = s.slot_ptr(&i.src1);
            let b = s.slot_ptr(&i.src2);
            let c = s.slot_ptr(&i.src3);
            s.e.ss_load(prefix, Xmm::Xmm0, Gp::Rsp, a);
            s.e.ss_load(prefix, Xmm::Xmm1, Gp::Rsp, b);
            s.e.ss_load(prefix, Xmm::Xmm2, Gp::Rsp, c);
            s.e.ss_op(prefix, 0x59, Xmm::Xmm0, Xmm::Xmm1);
            s.e.ss_op(prefix, if add { 0x58 } else { 0x5C }, Xmm::Xmm0, Xmm::Xmm2);
            let dest = s.slot(s.dest(i));
            s.e.ss_store(prefix, Gp::Rsp, dest, Xmm::Xmm0);
        }
        _ => {
            let w = width_of(ty);
            let mw = if matches!(w, Width::B8 | Width::B16) {
                Width::B32
            } else {
                w
            };
            s.load_op(&i.src1, w, Gp::R10);
            s.load_op(&i.src2, w, Gp::R11);
            s.load_op(&i.src3, w, Gp::R8);
            s.e.imul_rr(mw, Gp::R10, Gp::R11);
            if add {
                s.e.add_rr(mw, Gp::R10, Gp::R8);
            } else {
                s.e.sub_rr(mw, Gp::R10, Gp::R8);
            }
            s.store_dest(i, w, Gp::R10);
        }
    }
}

fn emit_neg_abs(s: &mut Seq<'_>, i: &Instr) {
    let ty = s.ty(s.dest(i));
    let neg = i.opcode == Opcode::Neg;
    match ty {
        ValueType::V128 => {
            let a = s.slot_ptr(&i.src1);
            let dest = s.slot(s.dest(i));
            s.e.mov_ri32(Gp::Rdi, (!neg) as u32);
            s.e.lea(Gp::Rsi, Gp::Rsp, dest);
            s.e.lea(Gp::Rdx, Gp::Rsp, a);
            s.call_host(host_neg_abs_v128 as usize);
        }
        ValueType::F32 => {
            s.load_op(&i.src1, Width::B32, Gp::R10);
            if neg {
                s.e.xor_ri(Width::B32, Gp::R10, i32::MIN);
            } else {
                s.e.and_ri(Width::B32, Gp::R10, i32::MAX);
            }
            s.store_dest(i, Width::B32, Gp::R10);
        }
        ValueType::F64 => {
            s.load_op(&i.src1, Width::B64, Gp::R10);
            s.e.mov_ri64(Gp::Rax, if neg { 1u64 << 63 } else { !(1u64 << 63) });
            if neg {
                s.e.xor_rr(Width::B64, Gp::R10, Gp::Rax);
            } else {
                s.e.and_rr(Width::B64, Gp::R10, Gp::Rax);
            }
            s.store_dest(i, Width::B64, Gp::R10);
        }
        _ => {
            let w = width_of(ty);
            s.load_op(&i.src1, w, Gp::R10);
            if neg {
                s.e.neg_r(w, Gp::R10);
            } else {
                // Integer abs: mask = v >> (bits-1); (v ^ mask) - mask.
                s.e.movsx(w, Gp::Rax, Gp::R10);
                s.e.sar_i(Width::B64, Gp::Rax, 63);
                s.e.xor_rr(Width::B64, Gp::R10, Gp::Rax);
                s.e.sub_rr(Width::B64, Gp::R10, Gp::Rax);
            }
            s.store_dest(i, w, Gp::R10);
        }
    }
}

fn emit_sqrt(s: &mut Seq<'_>, i: &Instr) {
    let ty = s.ty(s.dest(i));
    match ty {
        ValueType::V128 => {
            s.load_xmm(&i.src1, Xmm::Xmm0);
            s.e.ps_op(0x51, Xmm::Xmm0, Xmm::Xmm0);
            s.store_xmm_dest(i, Xmm::Xmm0);
        }
        ValueType::F32 | ValueType::F64 => {
            let prefix = if ty == ValueType::F32 { 0xF3 } else { 0xF2 };
            let a = s.slot_ptr(&i.src1);
            s.e.ss_load(prefix, Xmm::Xmm0, Gp::Rsp, a);
            s.e.ss_op(prefix, 0x51, Xmm::Xmm0, Xmm::Xmm0);
            let dest = s.slot(s.dest(i));
            s.e.ss_store(prefix, Gp::Rsp, dest, Xmm::Xmm0);
        }
        _ => s.e.int3(),
    }
}

fn emit_bitwise(s: &mut Seq<'_>, i: &Instr) {
    let ty = s.ty(s.dest(i));
    if ty == ValueType::V128 {
        s.load_xmm(&i.src1, Xmm::Xmm0);
        s.load_xmm(&i.src2, Xmm::Xmm1);
        let op = match i.opcode {
            Opcode::And => 0xDB,
            Opcode::Or => 0xEB,
            _ => 0xEF,
        };
        s.e.pi_op(op, Xmm::Xmm0, Xmm::Xmm1);
        s.store_xmm_dest(i, Xmm::Xmm0);
        return;
    }
    let w = width_of(ty);
    s.load_op(&i.src1, w, Gp::R10);
    s.load_op(&i.src2, w, Gp::R11);
    match i.opcode {
        Opcode::And => s.e.and_rr(w, Gp::R10, Gp::R11),
        Opcode::Or => s.e.or_rr(w, Gp::R10, Gp::R11),
        _ => s.e.xor_rr(w, Gp::R10, Gp::R11),
    }
    s.store_dest(i, w, Gp::R10);
}

fn emit_not(s: &mut Seq<'_>, i: &Instr) {
    let ty = s.ty(s.dest(i));
    if ty == ValueType::V128 {
        s.load_xmm(&i.src1, Xmm::Xmm0);
        // All-ones via pcmpeqd, then xor.
        s.e.pi_op(0x76, Xmm::Xmm1, Xmm::Xmm1);
        s.e.pi_op(0xEF, Xmm::Xmm0, Xmm::Xmm1);
        s.store_xmm_dest(i, Xmm::Xmm0);
        return;
    }
    let w = width_of(ty);
    s.load_op(&i.src1, w, Gp::R10);
    s.e.not_r(w, Gp::R10);
    s.store_dest(i, w, Gp::R10);
}

fn emit_byte_swap(s: &mut Seq<'_>, i: &Instr) {
    let ty = s.ty(s.dest(i));
    match ty {
        ValueType::I16 => {
            s.load_op(&i.src1, Width::B16, Gp::R10);
            s.e.rol_i(Width::B16, Gp::R10, 8);
            s.store_dest(i, Width::B16, Gp::R10);
        }
        ValueType::I32 => {
            s.load_op(&i.src1, Width::B32, Gp::R10);
            s.e.bswap(Width::B32, Gp::R10);
            s.store_dest(i, Width::B32, Gp::R10);
        }
        ValueType::I64 => {
            s.load_op(&i.src1, Width::B64, Gp::R10);
            s.e.bswap(Width::B64, Gp::R10);
            s.store_dest(i, Width::B64, Gp::R10);
        }
        ValueType::V128 => {
            // Swap halves, byte-swap each.
            let from = s.slot_ptr(&i.src1);
            let to = s.slot(s.dest(i));
            s.e.load(Width::B64, Gp::R10, Gp::Rsp, from);
            s.e.load(Width::B64, Gp::R11, Gp::Rsp, from + 8);
            s.e.bswap(Width::B64, Gp::R10);
            s.e.bswap(Width::B64, Gp::R11);
            s.e.store(Width::B64, Gp::Rsp, to, Gp::R11);
            s.e.store(Width::B64, Gp::Rsp, to + 8, Gp::R10);
        }
        _ => s.e.int3(),
    }
}

fn emit_cntlz(s: &mut Seq<'_>, i: &Instr) {
    let ty = s.ty(i.src1.value());
    let bits = width_of(ty).bits();
    // Zero-extended operand, bsr at 32/64 bits, xor-fold to a count.
    let w = if ty == ValueType::I64 { Width::B64 } else { Width::B32 };
    s.load_op(&i.src1, width_of(ty), Gp::R10);
    let zero = s.e.new_label();
    let done = s.e.new_label();
    s.e.test_rr(w, Gp::R10, Gp::R10);
    s.e.jcc(Cc::E, zero);
    s.e.bsr(w, Gp::R10, Gp::R10);
    s.e.xor_ri(Width::B32, Gp::R10, bits as i32 - 1);
    s.e.jmp(done);
    s.e.bind(zero);
    s.e.mov_ri32(Gp::R10, bits);
    s.e.bind(done);
    s.store_dest(i, Width::B8, Gp::R10);
}

fn emit_min_max(s: &mut Seq<'_>, i: &Instr) {
    let ty = s.ty(s.dest(i));
    let is_max = i.opcode == Opcode::Max;
    match ty {
        ValueType::V128 => {
            s.load_xmm(&i.src1, Xmm::Xmm0);
            s.load_xmm(&i.src2, Xmm::Xmm1);
            s.e.ps_op(if is_max { 0x5F } else { 0x5D }, Xmm::Xmm0, Xmm::Xmm1);
            s.store_xmm_dest(i, Xmm::Xmm0);
        }
        ValueType::F32 | ValueType::F64 => {
            let prefix = if ty == ValueType::F32 { 0xF3 } else { 0xF2 };
            let a = s.slot_ptr(&i.src1);
            let b = s.slot_ptr(&i.src2);
            s.e.ss_load(prefix, Xmm::Xmm0, Gp::Rsp, a);
            s.e.ss_load(prefix, Xmm::Xmm1, Gp::Rsp, b);
            s.e.ss_op(prefix, if is_max { 0x5F } else { 0x5D }, Xmm::Xmm0, Xmm::Xmm1);
            let dest = s.slot(s.dest(i));
            s.e.ss_store(prefix, Gp::Rsp, dest, Xmm::Xmm0);
        }
        _ => {
            let w = width_of(ty);
            // Signed compare at 64-bit on sign-extended operands.
            s.load_op(&i.src1, w, Gp::R10);
            s.load_op(&i.src2, w, Gp::R11);
            s.e.movsx(w, Gp::Rax, Gp::R10);
            s.e.movsx(w, Gp::R8, Gp::R11);
            s.e.cmp_rr(Width::B64, Gp::Rax, Gp::R8);
            let cc = if is_max { Cc::L } else { Cc::G };
            // Replace r10 with r11 when r10 loses.
            s.e.cmovcc(Width::B64, cc, Gp::R10, Gp::R11);
            s.store_dest(i, w, Gp::R10);
        }
    }
}

fn emit_convert(s: &mut Seq<'_>, i: &Instr) {
    use ValueType::*;
    let from = s.ty(i.src1.value());
    let to = s.ty(s.dest(i));
    match (from, to) {
        (I32, F32) => {
            s.load_op(&i.src1, Width::B32, Gp::R10);
            s.e.cvtsi2fp(0xF3, false, Xmm::Xmm0, Gp::R10);
            let dest = s.slot(s.dest(i));
            s.e.ss_store(0xF3, Gp::Rsp, dest, Xmm::Xmm0);
        }
        (F32, I32) => {
            let a = s.slot_ptr(&i.src1);
            s.e.ss_load(0xF3, Xmm::Xmm0, Gp::Rsp, a);
            s.e.cvtfp2si(0xF3, false, Gp::R10, Xmm::Xmm0);
            s.store_dest(i, Width::B32, Gp::R10);
        }
        (I64, F64) => {
            s.load_op(&i.src1, Width::B64, Gp::R10);
            s.e.cvtsi2fp(0xF2, true, Xmm::Xmm0, Gp::R10);
            let dest = s.slot(s.dest(i));
            s.e.ss_store(0xF2, Gp::Rsp, dest, Xmm::Xmm0);
        }
        (F64, I64) => {
            let a = s.slot_ptr(&i.src1);
            s.e.ss_load(0xF2, Xmm::Xmm0, Gp::Rsp, a);
            s.e.cvtfp2si(0xF2, true, Gp::R10, Xmm::Xmm0);
            s.store_dest(i, Width::B64, Gp::R10);
        }
        (F32, F64) => {
            let a = s.slot_ptr(&i.src1);
            s.e.ss_load(0xF3, Xmm::Xmm0, Gp::Rsp, a);
            s.e.cvtfp2fp(0xF3, Xmm::Xmm0, Xmm::Xmm0);
            let dest = s.slot(s.dest(i));
            s.e.ss_store(0xF2, Gp::Rsp, dest, Xmm::Xmm0);
        }
        (F64, F32) => {
            let a = s.slot_ptr(&i.src1);
            s.e.ss_load(0xF2, Xmm::Xmm0, Gp::Rsp, a);
            s.e.cvtfp2fp(0xF2, Xmm::Xmm0, Xmm::Xmm0);
            let dest = s.slot(s.dest(i));
            s.e.ss_store(0xF3, Gp::Rsp, dest, Xmm::Xmm0);
        }
        _ => s.e.int3(),
    }
}
