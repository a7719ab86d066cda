//! Address units shared by the validator and the register transfer unit.
//!
//! Data space and dumps use byte addresses; the program counter counts
//! 16-bit words. They are distinct types so one cannot stand in for the other.

use core::fmt;

use crate::WORD_SIZE;

/// Byte address (data space, I/O, program-memory dumps, jump targets).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteAddr(pub u16);

/// Word address in program memory: the unit the program counter counts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WordAddr(pub u16);

impl fmt::Display for ByteAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

impl fmt::Display for WordAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}w", self.0)
    }
}

/// An authorized, confirmed code address.
///
/// Only a confirmed [`PendingJump`](crate::region::PendingJump) produces one,
/// so holding a `JumpTarget` means the address is in the code region, even,
/// and the operator said yes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpTarget {
    byte: ByteAddr,
}

impl JumpTarget {
    pub(crate) fn new(byte: ByteAddr) -> Self {
        JumpTarget { byte }
    }

    pub fn byte(&self) -> ByteAddr {
        self.byte
    }

    /// Program counter value at the target.
    pub fn word(&self) -> WordAddr {
        WordAddr(self.byte.0 / WORD_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jump_target_word() {
        let t = JumpTarget::new(ByteAddr(0x0200));
        assert_eq!(t.byte(), ByteAddr(0x0200));
        assert_eq!(t.word(), WordAddr(0x0100));
    }

    #[test]
    fn test_display_units() {
        assert_eq!(ByteAddr(0x25).to_string(), "0x0025");
        assert_eq!(WordAddr(0x100).to_string(), "0x0100w");
    }
}
