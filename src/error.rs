//! Error taxonomy for translation, resolution, and execution.

use thiserror::Error;
use xenon_asm::PpcOp;

/// Failures while turning guest machine code into a translated body.
///
/// Any of these mark the function's symbol as failed; later resolutions of
/// the same address observe the failed state and return immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TranslationError {
    /// The 32-bit word is not a recognized instruction encoding.
    #[error("invalid instruction word {word:08X} at {address:08X}")]
    InvalidInstruction {
        /// Guest address of the word.
        address: u32,
        /// The raw word.
        word: u32,
    },

    /// The instruction decodes but has no emitter.
    #[error("unimplemented instruction {op:?} at {address:08X}")]
    Unimplemented {
        /// Guest address of the word.
        address: u32,
        /// Decoded identity.
        op: PpcOp,
    },

    /// Bound scanning ran off the declared limit without a terminator.
    #[error("no terminator found for function at {address:08X}")]
    MissingTerminator {
        /// Guest entry address.
        address: u32,
    },
}

/// Failures of [`crate::runtime::Runtime::resolve_function`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// No registered module contains the address.
    #[error("no module contains address {0:08X}")]
    NoModule(u32),

    /// Translation failed now.
    #[error("translation failed for {address:08X}: {source}")]
    Translation {
        /// Guest entry address.
        address: u32,
        /// Underlying translation failure.
        source: TranslationError,
    },

    /// A previous attempt already failed; the entry is poisoned.
    #[error("address {0:08X} previously failed translation")]
    Failed(u32),
}

/// Faults raised while executing a translated body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    /// An `INVALID` sentinel was reached (unrecognized guest instruction).
    #[error("invalid-instruction sentinel executed")]
    InvalidOpcode,

    /// An operation was built with an operand type no handler covers.
    #[error("invalid operand type for operation")]
    InvalidType,

    /// Guest `TRAP` (or trap-true with a satisfied condition).
    #[error("guest trap")]
    Trap,

    /// Guest debug break.
    #[error("guest debug break")]
    DebugBreak,

    /// A call target could not be resolved.
    #[error("call target resolution failed: {0}")]
    Resolve(#[from] ResolveError),
}
