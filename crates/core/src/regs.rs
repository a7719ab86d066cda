//! Register file snapshot.
//!
//! A [`RegisterSnapshot`] is the in-memory image the register transfer unit
//! writes on capture and reads on restore. Its layout is the wire format the
//! machine-code routines index into: R0–R31 at offsets 0–31, SREG at
//! [`STATUS_SLOT`].

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::{REG_COUNT, SNAPSHOT_LEN, STATUS_SLOT};

/// CPU register file image: R0–R31 followed by the status register.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegisterSnapshot {
    /// General-purpose registers, index = register number
    pub r: [u8; REG_COUNT],
    /// Status register: I T H S V N Z C (bits 7..0)
    pub sreg: u8,
}

const _: () = assert!(core::mem::size_of::<RegisterSnapshot>() == SNAPSHOT_LEN);
const _: () = assert!(core::mem::offset_of!(RegisterSnapshot, sreg) == STATUS_SLOT);

impl RegisterSnapshot {
    pub const fn new() -> Self {
        RegisterSnapshot { r: [0; REG_COUNT], sreg: 0 }
    }

    /// Rebuild a snapshot from its 33-byte buffer form.
    pub fn from_bytes(buf: &[u8; SNAPSHOT_LEN]) -> Self {
        let mut r = [0u8; REG_COUNT];
        r.copy_from_slice(&buf[..REG_COUNT]);
        RegisterSnapshot { r, sreg: buf[STATUS_SLOT] }
    }

    pub fn to_bytes(&self) -> [u8; SNAPSHOT_LEN] {
        let mut buf = [0u8; SNAPSHOT_LEN];
        buf[..REG_COUNT].copy_from_slice(&self.r);
        buf[STATUS_SLOT] = self.sreg;
        buf
    }

    #[inline(always)]
    pub fn flag(&self, bit: u8) -> bool {
        self.sreg & (1 << bit) != 0
    }

    /// Read a 16-bit register pair (little-endian: low register first).
    #[inline(always)]
    pub fn pair(&self, low: u8) -> u16 {
        let base = low as usize;
        self.r[base] as u16 | ((self.r[base + 1] as u16) << 8)
    }

    #[inline(always)]
    pub fn set_pair(&mut self, low: u8, v: u16) {
        let base = low as usize;
        self.r[base] = v as u8;
        self.r[base + 1] = (v >> 8) as u8;
    }

    /// X register (R26:R27)
    pub fn x(&self) -> u16 { self.pair(26) }
    /// Y register (R28:R29)
    pub fn y(&self) -> u16 { self.pair(28) }
    /// Z register (R30:R31)
    pub fn z(&self) -> u16 { self.pair(30) }
}

/// A register the operator can name: `r0`..`r31` or `sreg`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegName {
    Gpr(u8),
    Sreg,
}

impl RegName {
    pub fn parse(s: &str) -> Option<RegName> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("sreg") {
            return Some(RegName::Sreg);
        }
        let digits = s.strip_prefix('r').or_else(|| s.strip_prefix('R'))?;
        let n: u8 = digits.parse().ok()?;
        if (n as usize) < REG_COUNT { Some(RegName::Gpr(n)) } else { None }
    }

    pub fn get(self, snap: &RegisterSnapshot) -> u8 {
        match self {
            RegName::Gpr(n) => snap.r[n as usize],
            RegName::Sreg => snap.sreg,
        }
    }

    pub fn set(self, snap: &mut RegisterSnapshot, v: u8) {
        match self {
            RegName::Gpr(n) => snap.r[n as usize] = v,
            RegName::Sreg => snap.sreg = v,
        }
    }
}

/// Format SREG as `ITHSVNZC`, upper case for set bits.
pub fn format_sreg(sreg: u8) -> [char; 8] {
    let flags = ['I', 'T', 'H', 'S', 'V', 'N', 'Z', 'C'];
    let mut out = ['-'; 8];
    for (i, &f) in flags.iter().enumerate() {
        let bit = 7 - i;
        out[i] = if sreg & (1 << bit) != 0 { f } else { f.to_ascii_lowercase() };
    }
    out
}

impl fmt::Display for RegisterSnapshot {
    /// Register dump: eight registers per row, then SREG and the pointer pairs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.r.iter().enumerate() {
            if i % 8 == 0 && i > 0 { writeln!(f)?; }
            write!(f, "R{:<2}={:02X} ", i, v)?;
        }
        write!(f, "\nSREG=")?;
        for c in format_sreg(self.sreg) {
            write!(f, "{}", c)?;
        }
        write!(f, " (0x{:02X})", self.sreg)?;
        write!(f, "\nX={:04X} Y={:04X} Z={:04X}", self.x(), self.y(), self.z())
    }
}
