//! Callable translated bodies.

use crate::backend::interp::IntCodeFunction;
#[cfg(all(target_arch = "x86_64", unix))]
use crate::backend::x64::X64Function;
use crate::error::ExecError;
use crate::thread_state::ThreadState;

/// Host handler for an extern (kernel-service) function.
pub type ExternHandler = fn(&mut ThreadState, u64, u64);

/// Classification mirrored to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionType {
    /// Translated guest code.
    User,
    /// Host-implemented service.
    Extern,
}

/// The executable payload of a function.
pub enum FunctionBody {
    /// Interpreter intcode.
    IntCode(IntCodeFunction),
    /// Native x86-64 machine code.
    #[cfg(all(target_arch = "x86_64", unix))]
    X64(X64Function),
    /// Host extern dispatch.
    Extern {
        /// The host handler.
        handler: ExternHandler,
        /// First opaque argument.
        arg0: u64,
        /// Second opaque argument.
        arg1: u64,
    },
}

/// A callable function at a guest address.
pub struct Function {
    address: u32,
    body: FunctionBody,
}

impl Function {
    pub(crate) fn new(address: u32, body: FunctionBody) -> Self {
        Self { address, body }
    }

    /// Guest entry address.
    pub fn address(&self) -> u32 {
        self.address
    }

    /// User or extern.
    pub fn function_type(&self) -> FunctionType {
        match self.body {
            FunctionBody::Extern { .. } => FunctionType::Extern,
            _ => FunctionType::User,
        }
    }

    /// Host entry point of the native body, when the native backend
    /// produced this function.
    pub fn machine_code(&self) -> Option<*const u8> {
        match &self.body {
            #[cfg(all(target_arch = "x86_64", unix))]
            FunctionBody::X64(f) => Some(f.machine_code()),
            _ => None,
        }
    }

    /// Executes against a thread's guest state.
    pub fn call(&self, thread: &mut ThreadState) -> Result<(), ExecError> {
        thread.bind();
        match &self.body {
            FunctionBody::IntCode(f) => f.call(thread),
            #[cfg(all(target_arch = "x86_64", unix))]
            FunctionBody::X64(f) => f.call(thread),
            FunctionBody::Extern {
                handler,
                arg0,
                arg1,
            } => {
                handler(thread, *arg0, *arg1);
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function")
            .field("address", &format_args!("{:08X}", self.address))
            .field("type", &self.function_type())
            .finish()
    }
}
