//! Native x86-64 backend.
//!
//! Lowering is single-pass: every HIR value owns a 16-byte stack slot,
//! operands are loaded into scratch registers (constants folded to
//! immediates where the encoding allows), and complex vector operations
//! call into the host routines shared with the interpreter so the two
//! backends cannot diverge.
//!
//! Register conventions inside a translated body:
//! - `rcx` holds the guest context pointer, with a home copy at `[rsp]`
//!   restored after every host call.
//! - `rdx` caches the guest memory base (`[rcx + 8]`), reloaded after
//!   every host call.
//! - `rax`, `r8`-`r11` are scratch; `rax` stages 64-bit immediates and
//!   shift counts.
//! - The frame reserves 0x40 bytes of call scratch below the value slots.

mod code;
mod emitter;
mod seq;

use std::sync::Arc;

use tracing::trace;

use crate::backend::Backend;
use crate::error::{ExecError, TranslationError};
use crate::hir::HirFunction;
use crate::runtime::{Function, FunctionBody, FunctionInfo};
use crate::thread_state::ThreadState;

pub use code::CodeBuffer;

/// A function lowered to native code.
pub struct X64Function {
    code: CodeBuffer,
    /// Symbols whose raw pointers are baked into the code.
    #[allow(dead_code)]
    symbols: Vec<Arc<FunctionInfo>>,
    /// Comment text whose pointers are baked into the code.
    #[allow(dead_code)]
    comments: Vec<Box<str>>,
}

impl X64Function {
    /// Host entry point.
    pub fn machine_code(&self) -> *const u8 {
        self.code.entry()
    }

    /// Executes the body against a thread's guest state.
    pub(crate) fn call(&self, thread: &mut ThreadState) -> Result<(), ExecError> {
        let ctx = thread.context_mut().as_mut_ptr();
        // Safety: the buffer holds a complete function emitted for exactly
        // this entry convention, and `ctx` is the live bound context.
        unsafe {
            let entry: extern "sysv64" fn(*mut u8) = std::mem::transmute(self.code.entry());
            entry(ctx);
        }
        match thread.take_fault() {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }
}

/// The native backend.
#[derive(Debug, Default)]
pub struct X64Backend;

impl X64Backend {
    /// Creates the backend.
    pub fn new() -> Self {
        Self
    }
}

impl Backend for X64Backend {
    fn name(&self) -> &'static str {
        "x64"
    }

    fn assemble(
        &self,
        info: &Arc<FunctionInfo>,
        hir: &mut HirFunction,
        trace_flags: u32,
    ) -> Result<Function, TranslationError> {
        let lowered = seq::lower(hir, trace_flags);
        trace!(
            address = %format_args!("{:08X}", info.address()),
            bytes = lowered.code.len(),
            "emitted native body"
        );
        let body = X64Function {
            code: CodeBuffer::publish(&lowered.code),
            symbols: lowered.symbols,
            comments: lowered.comments,
        };
        Ok(Function::new(info.address(), FunctionBody::X64(body)))
    }
}
