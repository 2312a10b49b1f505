//! Modules: named address ranges owning function symbols.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::runtime::symbol::FunctionInfo;
use crate::runtime::BUILTIN_ADDRESS_BASE;

enum Bounds {
    /// A loaded guest image.
    Range { base: u32, size: u32 },
    /// The synthetic range for host builtins.
    Builtin,
}

/// A named owner of function symbols over an address range.
pub struct Module {
    name: String,
    bounds: Bounds,
    functions: Mutex<HashMap<u32, Arc<FunctionInfo>>>,
}

impl Module {
    /// A user module covering `[base, base + size)`.
    pub fn new(name: impl Into<String>, base: u32, size: u32) -> Self {
        Self {
            name: name.into(),
            bounds: Bounds::Range { base, size },
            functions: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn builtin() -> Self {
        Self {
            name: "builtin".into(),
            bounds: Bounds::Builtin,
            functions: Mutex::new(HashMap::new()),
        }
    }

    /// Module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether `address` belongs to this module.
    pub fn contains_address(&self, address: u32) -> bool {
        match self.bounds {
            Bounds::Range { base, size } => {
                address >= base && (address - base) < size
            }
            Bounds::Builtin => address >= BUILTIN_ADDRESS_BASE,
        }
    }

    /// Atomically looks up or creates the symbol for an address. The
    /// second return is true when this call created it and the caller is
    /// responsible for declaring it.
    pub fn declare_function(&self, address: u32) -> (Arc<FunctionInfo>, bool) {
        let mut functions = self.functions.lock().unwrap();
        if let Some(info) = functions.get(&address) {
            return (info.clone(), false);
        }
        let info = Arc::new(FunctionInfo::new(address));
        functions.insert(address, info.clone());
        (info, true)
    }

    /// Looks up an already-declared symbol.
    pub fn lookup_function(&self, address: u32) -> Option<Arc<FunctionInfo>> {
        self.functions.lock().unwrap().get(&address).cloned()
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module").field("name", &self.name).finish()
    }
}
