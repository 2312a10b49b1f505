//! Runtime function registry.
//!
//! Owns modules and the guest-address → function cache, resolves addresses
//! to translated bodies on demand (translating at most once per address),
//! and hosts the extern-function plumbing that lets translated code call
//! into host services.

mod entry_table;
mod function;
mod module;
mod symbol;

pub use entry_table::{EntryLookup, EntryTable};
pub use function::{ExternHandler, Function, FunctionBody, FunctionType};
pub use module::Module;
pub use symbol::{FunctionInfo, SymbolStatus};

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::backend::{self, Backend, BackendKind};
use crate::error::ResolveError;
use crate::frontend::PpcFrontend;
use crate::memory::Memory;

/// Base of the synthetic address range handed to builtins.
pub const BUILTIN_ADDRESS_BASE: u32 = 0xFFFF_0000;

/// Construction options.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeOptions {
    /// Which backend lowers HIR. `Any` prefers native when available.
    pub backend: BackendKind,
    /// Opaque flags handed through to the frontend (source offsets etc).
    pub debug_info_flags: u32,
    /// Opaque flags handed through to the backends (context tracing etc).
    pub trace_flags: u32,
}

/// The translation runtime.
pub struct Runtime {
    memory: Arc<Memory>,
    options: RuntimeOptions,
    frontend: PpcFrontend,
    backend: Box<dyn Backend>,
    modules: Mutex<Vec<Arc<Module>>>,
    builtin_module: Arc<Module>,
    next_builtin_address: AtomicU32,
    entry_table: EntryTable,
}

impl Runtime {
    /// Creates a runtime over `memory` with the selected backend.
    pub fn new(memory: Arc<Memory>, options: RuntimeOptions) -> Arc<Self> {
        let backend = backend::create(options.backend);
        let builtin_module = Arc::new(Module::builtin());
        let runtime = Self {
            memory,
            options,
            frontend: PpcFrontend::new(),
            backend,
            modules: Mutex::new(vec![builtin_module.clone()]),
            builtin_module,
            next_builtin_address: AtomicU32::new(BUILTIN_ADDRESS_BASE),
            entry_table: EntryTable::new(),
        };
        Arc::new(runtime)
    }

    /// The guest memory.
    pub fn memory(&self) -> &Arc<Memory> {
        &self.memory
    }

    /// The construction options.
    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    /// Registers a module.
    pub fn add_module(&self, module: Arc<Module>) {
        let mut modules = self.modules.lock().unwrap();
        modules.push(module);
    }

    /// Finds a module by name (case-sensitive).
    pub fn module(&self, name: &str) -> Option<Arc<Module>> {
        let modules = self.modules.lock().unwrap();
        modules.iter().find(|m| m.name() == name).cloned()
    }

    /// Snapshot of all registered modules.
    pub fn modules(&self) -> Vec<Arc<Module>> {
        self.modules.lock().unwrap().clone()
    }

    /// Registers a host-implemented function under a fresh synthetic
    /// address and returns its symbol.
    pub fn define_builtin(
        &self,
        name: impl Into<String>,
        handler: ExternHandler,
        arg0: u64,
        arg1: u64,
    ) -> Arc<FunctionInfo> {
        let address = self.next_builtin_address.fetch_add(4, Ordering::Relaxed);
        let (info, _) = self.builtin_module.declare_function(address);
        let name = name.into();
        debug!(address = %format_args!("{address:08X}"), name = %name, "defining builtin");
        info.set_name(name);
        info.set_end_address(address + 4);
        info.setup_extern(handler, arg0, arg1);
        info.set_status(SymbolStatus::Declared);
        info
    }

    /// Resolves a guest address to a callable function, translating it on
    /// first use. Concurrent resolutions of the same address block until
    /// the winning thread publishes, and translation runs at most once.
    pub fn resolve_function(self: &Arc<Self>, address: u32) -> Result<Arc<Function>, ResolveError> {
        match self.entry_table.get_or_create(address) {
            EntryLookup::Ready(function) => Ok(function),
            EntryLookup::Failed => Err(ResolveError::Failed(address)),
            EntryLookup::New => {
                // This thread owns generation for the address now.
                let result = self
                    .lookup_function_info(address)
                    .and_then(|info| self.demand_function(&info));
                match result {
                    Ok(function) => {
                        self.entry_table.publish(address, Some(function.clone()));
                        Ok(function)
                    }
                    Err(e) => {
                        warn!(address = %format_args!("{address:08X}"), error = %e, "resolve failed");
                        self.entry_table.publish(address, None);
                        Err(e)
                    }
                }
            }
        }
    }

    /// Finds (declaring if necessary) the symbol for an address.
    fn lookup_function_info(&self, address: u32) -> Result<Arc<FunctionInfo>, ResolveError> {
        let module = {
            let modules = self.modules.lock().unwrap();
            modules
                .iter()
                .find(|m| m.contains_address(address))
                .cloned()
        }
        .ok_or(ResolveError::NoModule(address))?;

        let (info, _) = module.declare_function(address);
        if info.status() == SymbolStatus::New && !info.is_extern() {
            match self.frontend.declare_function(&self.memory, &info) {
                Ok(()) => info.set_status(SymbolStatus::Declared),
                Err(e) => {
                    info.set_status(SymbolStatus::Failed);
                    return Err(ResolveError::Translation { address, source: e });
                }
            }
        }
        Ok(info)
    }

    /// Produces the translated body for a declared symbol, translating at
    /// most once even under races.
    fn demand_function(self: &Arc<Self>, info: &Arc<FunctionInfo>) -> Result<Arc<Function>, ResolveError> {
        let address = info.address();
        if info.begin_define() {
            let defined = self.translate(info);
            match defined {
                Ok(function) => {
                    let function = Arc::new(function);
                    info.finish_define(Some(function.clone()));
                    debug!(
                        address = %format_args!("{address:08X}"),
                        end = %format_args!("{:08X}", info.end_address()),
                        "function defined"
                    );
                    return Ok(function);
                }
                Err(e) => {
                    info.finish_define(None);
                    return Err(ResolveError::Translation { address, source: e });
                }
            }
        }
        match info.status() {
            SymbolStatus::Defined => Ok(info.function().expect("defined symbol has a function")),
            _ => Err(ResolveError::Failed(address)),
        }
    }

    fn translate(self: &Arc<Self>, info: &Arc<FunctionInfo>) -> Result<Function, crate::error::TranslationError> {
        if let Some(function) = info.extern_function() {
            return Ok(function);
        }
        let mut hir = self
            .frontend
            .define_function(self, info, self.options.debug_info_flags)?;
        self.backend
            .assemble(info, &mut hir, self.options.trace_flags)
    }

    /// Declares (without translating) the symbol for a direct-call target
    /// during frontend emission. Returns `None` when no module owns the
    /// address.
    pub(crate) fn declare_function_at(&self, address: u32) -> Option<Arc<FunctionInfo>> {
        let module = {
            let modules = self.modules.lock().unwrap();
            modules
                .iter()
                .find(|m| m.contains_address(address))
                .cloned()
        }?;
        let (info, is_new) = module.declare_function(address);
        if is_new {
            match self.frontend.declare_function(&self.memory, &info) {
                Ok(()) => info.set_status(SymbolStatus::Declared),
                Err(_) => {
                    // Bounds can be re-scanned when the call is resolved;
                    // the callee symbol still names a valid target.
                    info.set_status(SymbolStatus::New);
                }
            }
        }
        Some(info)
    }

    /// All cached functions at an address (tooling hook).
    pub fn find_functions_with_address(&self, address: u32) -> Vec<Arc<Function>> {
        self.entry_table.find_with_address(address)
    }
}
