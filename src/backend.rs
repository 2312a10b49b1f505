//! Lowering backends.
//!
//! Both backends consume the same HIR and agree on observable semantics:
//! the interpreter lowers to a flat array of handler pointers, the native
//! backend emits x86-64. Complex vector operations share one set of host
//! routines ([`vector`]) so the two can never drift apart.

pub mod interp;
pub mod vector;
#[cfg(all(target_arch = "x86_64", unix))]
pub mod x64;

use std::sync::Arc;

use crate::error::TranslationError;
use crate::hir::HirFunction;
use crate::runtime::{Function, FunctionInfo};

/// Backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Prefer native when the host supports it.
    #[default]
    Any,
    /// Portable interpreter.
    Interpreter,
    /// Native x86-64.
    X64,
}

/// A code generator for translated functions.
pub trait Backend: Send + Sync {
    /// Backend name for traces.
    fn name(&self) -> &'static str;

    /// Lowers a function's HIR into a callable body.
    fn assemble(
        &self,
        info: &Arc<FunctionInfo>,
        hir: &mut HirFunction,
        trace_flags: u32,
    ) -> Result<Function, TranslationError>;
}

/// Instantiates the backend for `kind`.
pub fn create(kind: BackendKind) -> Box<dyn Backend> {
    match kind {
        BackendKind::Interpreter => Box::new(interp::InterpBackend::new()),
        #[cfg(all(target_arch = "x86_64", unix))]
        BackendKind::X64 => Box::new(x64::X64Backend::new()),
        #[cfg(not(all(target_arch = "x86_64", unix)))]
        BackendKind::X64 => {
            tracing::warn!("native backend unavailable on this host, using interpreter");
            Box::new(interp::InterpBackend::new())
        }
        BackendKind::Any => {
            #[cfg(all(target_arch = "x86_64", unix))]
            {
                Box::new(x64::X64Backend::new())
            }
            #[cfg(not(all(target_arch = "x86_64", unix)))]
            {
                Box::new(interp::InterpBackend::new())
            }
        }
    }
}
