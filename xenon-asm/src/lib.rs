//! PowerPC instruction words for the Xenon translation core.
//!
//! The crate is split the same way execution is: [`Instr`] is a raw
//! big-endian 32-bit word with per-form field views (D, X, XO, B, I, M, MD,
//! VX, VXR, VXA and the VMX128 compound forms), while [`PpcOp`] is the
//! fieldless identity produced by the two-level decoder. Everything above
//! this crate (HIR emission, backends, runtime) lives in `xenon-cpu`.

#![warn(missing_docs)]

mod forms;
mod opcode;

pub use forms::{
    BForm, DForm, IForm, Instr, MdForm, MForm, Vx128Form, Vx128PForm, Vx128RForm, VxaForm,
    VxForm, VxrForm, XfxForm, XForm, XlForm, XoForm, XsForm,
};
pub use opcode::{PpcOp, OPCD_SHIFT};

/// Register selector within the 32-entry GPR/FPR files or a CR field index.
pub type Reg = u32;

/// Selector within the 128-entry VMX128 vector register file.
pub type VReg = u32;
