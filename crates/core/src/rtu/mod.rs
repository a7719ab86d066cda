//! Register transfer unit.
//!
//! Three operations move the whole CPU register file between the processor
//! and a [`RegisterSnapshot`]: capture, restore-and-jump, restore-and-call.
//! None of them can be written in a high-level language; compiled code may
//! touch any register and any flag between two statements. They are
//! instruction sequences, defined once in [`routines`] and executed either on
//! the device (`hw`) or inside the host machine model (`sim`).
//!
//! [`RegisterTransfer`] is the seam. Restoring is `unsafe`: the target runs
//! with an arbitrary register file, and nothing here can undo that.

pub mod routines;

use crate::addr::JumpTarget;
use crate::regs::RegisterSnapshot;

/// Capture and restore of the register file.
///
/// Implementations are not re-entrant; `&mut self` carries that.
pub trait RegisterTransfer {
    /// Failure the implementation can observe. The device cannot observe any.
    type Fault;
    /// What a restore-and-jump returns, if anything ever does.
    type Landing;

    /// Copy all 32 registers and SREG, as they were on entry, into `snapshot`.
    /// The caller sees its registers and flags unchanged afterwards.
    fn capture(&mut self, snapshot: &mut RegisterSnapshot) -> Result<(), Self::Fault>;

    /// Load the register file from `snapshot` and continue at `target`.
    /// Control does not come back; the stack at the target is the caller's
    /// stack before the call.
    ///
    /// # Safety
    ///
    /// The target runs with every register, including the stack pointer's
    /// neighbours and the interrupt flag, taken from `snapshot`. The caller
    /// must accept that the program may never return to a sane state.
    unsafe fn restore_and_transfer(
        &mut self,
        snapshot: &RegisterSnapshot,
        target: JumpTarget,
    ) -> Result<Self::Landing, Self::Fault>;

    /// Load the register file from `snapshot` and call `target`; when it
    /// returns, control comes back here.
    ///
    /// # Safety
    ///
    /// As for [`restore_and_transfer`](Self::restore_and_transfer), and the
    /// target must end with `ret` on a balanced stack.
    unsafe fn restore_and_call(
        &mut self,
        snapshot: &RegisterSnapshot,
        target: JumpTarget,
    ) -> Result<(), Self::Fault>;
}
