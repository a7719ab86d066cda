//! Error kinds reported to the command dispatcher.
//!
//! Every variant is recoverable at the dispatcher. An authorized jump to a bad
//! code address is deliberately absent: once the register transfer unit runs,
//! failure is physical (hang or crash), not a value anyone can observe.

use thiserror::Error;

use crate::region::{Operation, Region};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("address span 0x{address:04X}+{len} is outside the addressable space")]
    OutOfRange { address: u32, len: u32 },

    #[error("{operation} is not permitted in the {region} region (0x{address:04X})")]
    RegionDenied {
        address: u16,
        region: Region,
        operation: Operation,
    },

    #[error("{operation} at 0x{address:04X} in the {region} region requires confirmation")]
    ConfirmationRequired {
        address: u16,
        region: Region,
        operation: Operation,
    },

    #[error("write to 0x{address:04X} did not stick: wrote 0x{written:02X}, read back 0x{read_back:02X}")]
    VerificationFailed {
        address: u16,
        written: u8,
        read_back: u8,
    },

    #[error("timed out waiting for input")]
    InputTimeout,

    #[error("invalid HEX record on line {line}: {reason}")]
    InvalidHex { line: usize, reason: &'static str },

    #[error("invalid memory map: {0}")]
    InvalidMemoryMap(&'static str),

    #[error("unknown chip (expected atmega328p or atmega32u4)")]
    UnknownChip,
}

pub type Result<T> = core::result::Result<T, Error>;
