//! Function symbols and their lifecycle.

use std::sync::{Arc, Condvar, Mutex};

use crate::runtime::function::{ExternHandler, Function, FunctionBody};

/// Lifecycle of a function symbol.
///
/// `New → Declared → Defining → Defined | Failed`; `Defining` is only
/// observable by threads racing the winner of the define lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolStatus {
    /// Created, bounds unknown.
    New,
    /// Bounds declared, not yet translated.
    Declared,
    /// A thread is translating right now.
    Defining,
    /// Translated; `function()` is available.
    Defined,
    /// Declaration or translation failed; permanent.
    Failed,
}

#[derive(Default)]
struct SymbolState {
    status: Option<SymbolStatus>,
    end_address: u32,
    name: Option<String>,
    function: Option<Arc<Function>>,
    ext: Option<(ExternHandler, u64, u64)>,
}

/// Metadata for one guest function address.
pub struct FunctionInfo {
    address: u32,
    state: Mutex<SymbolState>,
    cond: Condvar,
}

impl FunctionInfo {
    pub(crate) fn new(address: u32) -> Self {
        let state = SymbolState {
            status: Some(SymbolStatus::New),
            ..Default::default()
        };
        Self {
            address,
            state: Mutex::new(state),
            cond: Condvar::new(),
        }
    }

    /// Guest entry address.
    pub fn address(&self) -> u32 {
        self.address
    }

    /// Exclusive end address, meaningful once declared.
    pub fn end_address(&self) -> u32 {
        self.state.lock().unwrap().end_address
    }

    /// Sets the exclusive end address.
    pub fn set_end_address(&self, end: u32) {
        self.state.lock().unwrap().end_address = end;
    }

    /// Optional symbol name.
    pub fn name(&self) -> Option<String> {
        self.state.lock().unwrap().name.clone()
    }

    /// Names the symbol.
    pub fn set_name(&self, name: impl Into<String>) {
        self.state.lock().unwrap().name = Some(name.into());
    }

    /// Current lifecycle status.
    pub fn status(&self) -> SymbolStatus {
        self.state.lock().unwrap().status.unwrap_or(SymbolStatus::New)
    }

    /// Moves the lifecycle forward (declaration bookkeeping).
    pub fn set_status(&self, status: SymbolStatus) {
        self.state.lock().unwrap().status = Some(status);
    }

    /// The translated function, if defined.
    pub fn function(&self) -> Option<Arc<Function>> {
        self.state.lock().unwrap().function.clone()
    }

    /// Binds a host handler; resolution will produce an extern function
    /// instead of translating guest code.
    pub fn setup_extern(&self, handler: ExternHandler, arg0: u64, arg1: u64) {
        self.state.lock().unwrap().ext = Some((handler, arg0, arg1));
    }

    /// Whether this symbol dispatches to host code.
    pub fn is_extern(&self) -> bool {
        self.state.lock().unwrap().ext.is_some()
    }

    /// Builds the extern function object, if this symbol is extern.
    pub(crate) fn extern_function(&self) -> Option<Function> {
        let state = self.state.lock().unwrap();
        state.ext.map(|(handler, arg0, arg1)| {
            Function::new(
                self.address,
                FunctionBody::Extern {
                    handler,
                    arg0,
                    arg1,
                },
            )
        })
    }

    /// Takes the define lock. Returns true when the caller must translate
    /// and then call [`FunctionInfo::finish_define`]; otherwise blocks
    /// until a concurrent definition settles and returns false.
    pub(crate) fn begin_define(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        loop {
            match state.status.unwrap_or(SymbolStatus::New) {
                SymbolStatus::New | SymbolStatus::Declared => {
                    state.status = Some(SymbolStatus::Defining);
                    return true;
                }
                SymbolStatus::Defining => {
                    state = self.cond.wait(state).unwrap();
                }
                SymbolStatus::Defined | SymbolStatus::Failed => return false,
            }
        }
    }

    /// Publishes the definition result and wakes waiting threads.
    pub(crate) fn finish_define(&self, function: Option<Arc<Function>>) {
        let mut state = self.state.lock().unwrap();
        state.status = Some(if function.is_some() {
            SymbolStatus::Defined
        } else {
            SymbolStatus::Failed
        });
        state.function = function;
        drop(state);
        self.cond.notify_all();
    }
}

impl std::fmt::Debug for FunctionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionInfo")
            .field("address", &format_args!("{:08X}", self.address))
            .field("status", &self.status())
            .finish()
    }
}
