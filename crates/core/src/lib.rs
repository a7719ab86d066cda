//! # avrmon-core
//!
//! Register capture/restore and guarded memory access for an on-device
//! inspector running on 8-bit AVR parts (ATmega328P, ATmega32u4).
//!
//! The operator, through a line-oriented console, can snapshot the CPU
//! register file, edit it, read and write data memory, and transfer control
//! to any program-memory address with the edited registers in place. This
//! crate is the engine under that console.
//!
//! ## Architecture
//!
//! - [`regs`]: [`RegisterSnapshot`], the 33-byte register file image
//! - [`addr`]: byte and word address newtypes and the [`JumpTarget`] capability
//! - [`region`]: the address validator ([`MemoryMap`], [`Region`], [`Decision`])
//! - [`access`]: the guarded accessor and the [`Bus`] seam it drives
//! - [`rtu`]: the register transfer unit; capture, restore-and-jump and
//!   restore-and-call, defined once as AVR instruction sequences
//! - [`opcodes`]: the AVR instruction subset the routines are written in
//! - [`input`]: bounded waits for console input with an injectable clock
//! - [`hex`]: Intel HEX loading into program memory
//! - `sim` (feature `std`): a host-side ATmega that executes the routines
//! - `hw` (AVR targets only): the routines emitted for the real device
//!
//! ## Data space (ATmega328P)
//!
//! | Address Range | Content                     |
//! |---------------|-----------------------------|
//! | 0x0000–0x001F | General registers R0–R31    |
//! | 0x0020–0x00FF | I/O + extended I/O          |
//! | 0x0100–0x08FF | SRAM (2048 bytes)           |
//!
//! Flash (32 KB) is a separate address space, addressed in 16-bit words by
//! the program counter.

#![cfg_attr(not(feature = "std"), no_std)]
#![cfg_attr(target_arch = "avr", feature(asm_experimental_arch))]

pub mod access;
pub mod addr;
pub mod error;
pub mod hex;
pub mod input;
pub mod opcodes;
pub mod region;
pub mod regs;
pub mod rtu;

#[cfg(feature = "std")]
pub mod sim;

#[cfg(target_arch = "avr")]
pub mod hw;

pub use access::{Bus, Bytes, GuardedAccessor};
pub use error::{Error, Result};
pub use addr::{ByteAddr, JumpTarget, WordAddr};
pub use region::{
    Chip, Decision, Grant, MemoryMap, Operation, PendingGrant, PendingJump, Region, Space,
};
pub use regs::RegisterSnapshot;
pub use rtu::RegisterTransfer;

/// Number of general-purpose registers (R0–R31)
pub const REG_COUNT: usize = 32;
/// Index of the status byte inside a register snapshot.
///
/// Every producer and consumer of the snapshot format, including the
/// machine-code routines, takes the slot from here.
pub const STATUS_SLOT: usize = REG_COUNT;
/// Size of a register snapshot in bytes
pub const SNAPSHOT_LEN: usize = STATUS_SLOT + 1;
/// Stack bytes a routine needs below its caller: the return address plus
/// the deepest push sequence.
pub const ROUTINE_STACK_DEPTH: u16 = 6;

/// Flash size shared by both supported parts: 32 KB
pub const FLASH_SIZE: usize = 32 * 1024;
/// Bytes per program-memory word
pub const WORD_SIZE: u16 = 2;

// SREG bit positions
pub const SREG_C: u8 = 0;
pub const SREG_Z: u8 = 1;
pub const SREG_N: u8 = 2;
pub const SREG_V: u8 = 3;
pub const SREG_S: u8 = 4;
pub const SREG_H: u8 = 5;
pub const SREG_T: u8 = 6;
pub const SREG_I: u8 = 7;

// I/O register addresses (data space addresses, not I/O addresses)
pub const SREG_ADDR: u16 = 0x5F;
pub const SPH_ADDR: u16 = 0x5E;
pub const SPL_ADDR: u16 = 0x5D;
/// General purpose I/O register 0. The restore routines park the snapshot's
/// status byte here so the final interrupt-enable decision needs no GPR.
pub const GPIOR0_ADDR: u16 = 0x3E;

/// Offset between data-space and I/O-space addresses for `in`/`out`/`sbic`.
pub const IO_OFFSET: u16 = 0x20;
