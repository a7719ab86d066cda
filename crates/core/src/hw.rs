//! Device backend for AVR targets.
//!
//! Emits the register transfer routines into flash with `global_asm!`, using
//! the same text the host tests check against the instruction sequences.
//! Data-space access is volatile; program-space reads use `lpm`.

use core::arch::{asm, global_asm};
use core::cell::UnsafeCell;
use core::convert::Infallible;

use crate::access::Bus;
use crate::regs::RegisterSnapshot;
use crate::rtu::routines::{capture_asm, restore_and_call_asm, restore_and_transfer_asm};
use crate::addr::JumpTarget;
use crate::rtu::RegisterTransfer;
use crate::{GPIOR0_ADDR, IO_OFFSET, SREG_ADDR, SREG_I, STATUS_SLOT};

global_asm!(
    ".section .text.avrmon_rtu,\"ax\",@progbits",
    ".global avrmon_capture",
    "avrmon_capture:",
    capture_asm!(),
    ".global avrmon_restore_and_transfer",
    "avrmon_restore_and_transfer:",
    restore_and_transfer_asm!(),
    // avr-gcc expects r2-r17 and r28-r29 back, and r1 zero, after a call.
    // The target may use them freely, so the call goes through a frame
    // that saves and restores them around the routine.
    ".global avrmon_restore_and_call",
    "avrmon_restore_and_call:",
    "push r2", "push r3", "push r4", "push r5", "push r6", "push r7",
    "push r8", "push r9", "push r10", "push r11", "push r12", "push r13",
    "push r14", "push r15", "push r16", "push r17", "push r28", "push r29",
    "rcall 1f",
    "pop r29", "pop r28", "pop r17", "pop r16", "pop r15", "pop r14",
    "pop r13", "pop r12", "pop r11", "pop r10", "pop r9", "pop r8",
    "pop r7", "pop r6", "pop r5", "pop r4", "pop r3", "pop r2",
    "clr r1",
    "ret",
    "1:",
    restore_and_call_asm!(),
    sreg = const SREG_ADDR - IO_OFFSET,
    gpior = const GPIOR0_ADDR - IO_OFFSET,
    slot = const STATUS_SLOT,
    mask = const !(1u8 << SREG_I),
    ibit = const SREG_I,
);

extern "C" {
    fn avrmon_capture(buf: *mut RegisterSnapshot);
    fn avrmon_restore_and_transfer(buf: *const RegisterSnapshot, target: u16) -> !;
    fn avrmon_restore_and_call(buf: *const RegisterSnapshot, target: u16);
}

struct SnapshotCell(UnsafeCell<RegisterSnapshot>);

// SAFETY: one thread; access goes through the unique `Device`.
unsafe impl Sync for SnapshotCell {}

static SNAPSHOT: SnapshotCell = SnapshotCell(UnsafeCell::new(RegisterSnapshot::new()));

/// The running part.
pub struct Device {
    _private: (),
}

impl Device {
    /// # Safety
    ///
    /// At most one `Device` may exist; it owns the snapshot cell and the bus.
    pub unsafe fn steal() -> Self {
        Device { _private: () }
    }

    /// The process-wide snapshot, overwritten in place by each capture.
    pub fn snapshot(&mut self) -> &mut RegisterSnapshot {
        // SAFETY: `&mut self` on the only Device.
        unsafe { &mut *SNAPSHOT.0.get() }
    }

    /// Capture into the process-wide snapshot.
    pub fn capture_in_place(&mut self) {
        // SAFETY: the routine writes exactly SNAPSHOT_LEN bytes.
        unsafe { avrmon_capture(SNAPSHOT.0.get()) }
    }
}

unsafe impl Bus for Device {
    unsafe fn read_data(&mut self, addr: u16) -> u8 {
        core::ptr::read_volatile(addr as *const u8)
    }

    unsafe fn write_data(&mut self, addr: u16, value: u8) {
        core::ptr::write_volatile(addr as *mut u8, value)
    }

    unsafe fn read_program(&mut self, addr: u16) -> u8 {
        let value: u8;
        asm!("lpm {0}, Z", out(reg) value, in("Z") addr, options(nostack, readonly, preserves_flags));
        value
    }
}

impl RegisterTransfer for Device {
    type Fault = Infallible;
    type Landing = Infallible;

    fn capture(&mut self, snapshot: &mut RegisterSnapshot) -> Result<(), Infallible> {
        // SAFETY: `snapshot` is a valid, exclusive 33-byte buffer.
        unsafe { avrmon_capture(snapshot) };
        Ok(())
    }

    unsafe fn restore_and_transfer(
        &mut self,
        snapshot: &RegisterSnapshot,
        target: JumpTarget,
    ) -> Result<Infallible, Infallible> {
        avrmon_restore_and_transfer(snapshot, target.byte().0)
    }

    unsafe fn restore_and_call(&mut self, snapshot: &RegisterSnapshot, target: JumpTarget) -> Result<(), Infallible> {
        avrmon_restore_and_call(snapshot, target.byte().0);
        Ok(())
    }
}
