//! Per-thread guest state.

use std::sync::Arc;

use crate::context::PpcContext;
use crate::memory::Memory;
use crate::runtime::Runtime;

/// Owns the guest register file for one host thread executing translated
/// code, together with the handles translated code needs to re-enter the
/// runtime (call resolution, extern dispatch).
pub struct ThreadState {
    runtime: Arc<Runtime>,
    memory: Arc<Memory>,
    ctx: Box<PpcContext>,
    thread_id: u32,
    /// Execution fault raised by a host helper while native code ran.
    fault: Option<crate::error::ExecError>,
}

// The context block holds raw pointers into guest memory and back at the
// thread state; both are rebound before execution on whichever thread calls.
unsafe impl Send for ThreadState {}

impl ThreadState {
    /// Creates a thread state bound to the runtime's memory.
    pub fn new(runtime: Arc<Runtime>, thread_id: u32) -> Self {
        let memory = runtime.memory().clone();
        let mut ctx = Box::new(PpcContext::new());
        ctx.membase = memory.base_ptr();
        Self {
            runtime,
            memory,
            ctx,
            thread_id,
            fault: None,
        }
    }

    /// Records a fault for the active native body to surface on return.
    pub(crate) fn set_fault(&mut self, fault: crate::error::ExecError) {
        if self.fault.is_none() {
            self.fault = Some(fault);
        }
    }

    /// Takes a recorded fault, if any.
    pub(crate) fn take_fault(&mut self) -> Option<crate::error::ExecError> {
        self.fault.take()
    }

    /// Refreshes the context header pointers. Called on entry to every
    /// translated body so the block always names its current owner.
    pub(crate) fn bind(&mut self) {
        self.ctx.thread_state = self as *mut ThreadState as *mut u8;
        self.ctx.membase = self.memory.base_ptr();
    }

    /// Recovers the thread state from a raw context-block pointer.
    ///
    /// # Safety
    ///
    /// `raw` must be the context block of a live, bound `ThreadState`, and
    /// the caller must hold the only active reference.
    pub(crate) unsafe fn from_raw_context<'a>(raw: *mut u8) -> &'a mut ThreadState {
        let ts = *(raw as *const *mut ThreadState);
        &mut *ts
    }

    /// The owning runtime.
    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// The guest memory.
    pub fn memory(&self) -> &Arc<Memory> {
        &self.memory
    }

    /// Host-side identifier for traces.
    pub fn thread_id(&self) -> u32 {
        self.thread_id
    }

    /// Guest register file.
    pub fn context(&self) -> &PpcContext {
        &self.ctx
    }

    /// Mutable guest register file.
    pub fn context_mut(&mut self) -> &mut PpcContext {
        &mut self.ctx
    }
}
