//! Address validator.
//!
//! Classifies 16-bit addresses against the part's memory map and decides,
//! per operation, whether access is allowed, allowed after the operator
//! confirms, or denied. Approved accesses come back as capabilities
//! ([`Grant`], [`JumpTarget`]) that the guarded accessor and the register
//! transfer unit require, so nothing downstream can touch an address that was
//! never classified.
//!
//! Byte and word addresses are separate types ([`crate::addr`]); only
//! [`MemoryMap::to_byte_address`] converts between them.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::addr::{ByteAddr, JumpTarget, WordAddr};
use crate::error::{Error, Result};
use crate::{GPIOR0_ADDR, ROUTINE_STACK_DEPTH, SNAPSHOT_LEN, SPH_ADDR, SPL_ADDR, SREG_ADDR, WORD_SIZE};

/// Which of the two AVR address spaces an access targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Space {
    /// Unified data space: registers, I/O and SRAM
    Data,
    /// Flash, byte addressed for reads
    Program,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read(Space),
    Write(Space),
    /// Transfer of control to a program-memory address
    Jump,
}

impl Operation {
    pub fn space(self) -> Space {
        match self {
            Operation::Read(s) | Operation::Write(s) => s,
            Operation::Jump => Space::Program,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Read(Space::Data) => "data read",
            Operation::Write(Space::Data) => "data write",
            Operation::Read(Space::Program) => "program read",
            Operation::Write(Space::Program) => "program write",
            Operation::Jump => "jump",
        };
        f.write_str(s)
    }
}

/// Memory region an address span falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// R0–R31 mapped into data space; not independently addressable
    Registers,
    /// I/O and extended I/O registers; access has side effects
    Io,
    /// SRAM
    Data,
    /// Flash
    Code,
    OutOfRange,
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Region::Registers => "register file",
            Region::Io => "I/O",
            Region::Data => "data",
            Region::Code => "code",
            Region::OutOfRange => "out-of-range",
        };
        f.write_str(s)
    }
}

/// Outcome of [`MemoryMap::authorize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// The dispatcher must obtain an explicit yes from the operator first
    AllowWithConfirmation,
    Deny,
}

/// Inclusive address interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub start: u16,
    pub end: u16,
}

impl Bounds {
    pub const fn new(start: u16, end: u16) -> Self {
        Bounds { start, end }
    }

    #[inline]
    pub fn contains(&self, addr: u16) -> bool {
        addr >= self.start && addr <= self.end
    }

    pub fn len(&self) -> u32 {
        self.end as u32 - self.start as u32 + 1
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}-0x{:04X}", self.start, self.end)
    }
}

/// Last address of `[address, address + width)`, or `None` for an empty span
/// or one that runs past 0xFFFF.
fn span_last(address: u16, width: u16) -> Option<u16> {
    if width == 0 {
        return None;
    }
    address.checked_add(width - 1)
}

/// Region boundaries of one part. Data-space regions must be ordered and
/// disjoint; flash is its own space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryMap {
    pub registers: Bounds,
    pub io: Bounds,
    pub data: Bounds,
    pub code: Bounds,
}

impl MemoryMap {
    /// ATmega328P (Arduino Uno): 2 KB SRAM
    pub const ATMEGA328P: MemoryMap = MemoryMap {
        registers: Bounds::new(0x0000, 0x001F),
        io: Bounds::new(0x0020, 0x00FF),
        data: Bounds::new(0x0100, 0x08FF),
        code: Bounds::new(0x0000, 0x7FFF),
    };

    /// ATmega32u4 (Leonardo, Arduboy): 2.5 KB SRAM
    pub const ATMEGA32U4: MemoryMap = MemoryMap {
        registers: Bounds::new(0x0000, 0x001F),
        io: Bounds::new(0x0020, 0x00FF),
        data: Bounds::new(0x0100, 0x0AFF),
        code: Bounds::new(0x0000, 0x7FFF),
    };

    /// Check that a (possibly user-supplied) map is usable.
    pub fn validate(&self) -> Result<()> {
        for b in [self.registers, self.io, self.data, self.code] {
            if b.start > b.end {
                return Err(Error::InvalidMemoryMap("region start above its end"));
            }
        }
        if self.registers.end >= self.io.start || self.io.end >= self.data.start {
            return Err(Error::InvalidMemoryMap(
                "data-space regions must be ordered registers < io < data and disjoint",
            ));
        }
        if self.code.start % WORD_SIZE != 0 || self.code.end % WORD_SIZE != 1 {
            return Err(Error::InvalidMemoryMap("code region must cover whole words"));
        }
        // the routines address these directly
        if ![SREG_ADDR, SPL_ADDR, SPH_ADDR, GPIOR0_ADDR].iter().all(|&a| self.io.contains(a)) {
            return Err(Error::InvalidMemoryMap("io region must cover SREG, SPL, SPH and GPIOR0"));
        }
        // snapshot buffer at the bottom of SRAM, routine stack at the top
        if self.data.len() < SNAPSHOT_LEN as u32 + ROUTINE_STACK_DEPTH as u32 {
            return Err(Error::InvalidMemoryMap("data region too small for the snapshot buffer and stack"));
        }
        Ok(())
    }

    /// Classify a data-space span of `width` bytes starting at `address`.
    ///
    /// A span counts as belonging to a region only when it lies wholly inside
    /// it. Empty spans, spans past 0xFFFF and spans straddling two regions are
    /// [`Region::OutOfRange`].
    pub fn classify(&self, address: u16, width: u16) -> Region {
        let Some(last) = span_last(address, width) else {
            return Region::OutOfRange;
        };
        let regions = [
            (Region::Registers, self.registers),
            (Region::Io, self.io),
            (Region::Data, self.data),
        ];
        for (region, bounds) in regions {
            if bounds.contains(address) {
                return if bounds.contains(last) { region } else { Region::OutOfRange };
            }
        }
        Region::OutOfRange
    }

    /// Classify a program-space span of `width` bytes.
    pub fn classify_code(&self, address: u16, width: u16) -> Region {
        match span_last(address, width) {
            Some(last) if self.code.contains(address) && self.code.contains(last) => Region::Code,
            _ => Region::OutOfRange,
        }
    }

    fn region_for(&self, address: u16, width: u16, space: Space) -> Region {
        match space {
            Space::Data => self.classify(address, width),
            Space::Program => self.classify_code(address, width),
        }
    }

    /// Policy decision for a single-byte access (or a jump) at `address`.
    pub fn authorize(&self, address: u16, operation: Operation) -> Decision {
        let width = if operation == Operation::Jump { WORD_SIZE } else { 1 };
        self.authorize_span(address, width, operation)
    }

    /// Policy decision for a whole span.
    pub fn authorize_span(&self, address: u16, width: u16, operation: Operation) -> Decision {
        let region = self.region_for(address, width, operation.space());
        match (operation, region) {
            (Operation::Read(Space::Data) | Operation::Write(Space::Data), Region::Data) => Decision::Allow,
            (Operation::Read(Space::Data) | Operation::Write(Space::Data), Region::Io) => {
                Decision::AllowWithConfirmation
            }
            (Operation::Read(Space::Program), Region::Code) => Decision::Allow,
            (Operation::Jump, Region::Code) if address % WORD_SIZE == 0 => Decision::AllowWithConfirmation,
            _ => Decision::Deny,
        }
    }

    /// Convert a program-counter word address to the byte address of the
    /// instruction, rejecting results that overflow or leave the code region.
    pub fn to_byte_address(&self, word: WordAddr) -> Result<ByteAddr> {
        let out_of_range = Error::OutOfRange {
            address: word.0 as u32 * WORD_SIZE as u32,
            len: WORD_SIZE as u32,
        };
        let byte = word.0.checked_mul(WORD_SIZE).ok_or(out_of_range.clone())?;
        if self.classify_code(byte, WORD_SIZE) != Region::Code {
            return Err(out_of_range);
        }
        Ok(ByteAddr(byte))
    }

    /// Turn a decision into a capability for the guarded accessor.
    pub fn grant(&self, address: u16, len: u16, operation: Operation) -> Result<Authorization> {
        let region = self.region_for(address, len, operation.space());
        let grant = Grant { start: address, len, region, operation };
        match self.authorize_span(address, len, operation) {
            Decision::Allow => {
                debug!(address, len, %region, %operation, "access granted");
                Ok(Authorization::Granted(grant))
            }
            Decision::AllowWithConfirmation => {
                debug!(address, len, %region, %operation, "access needs confirmation");
                Ok(Authorization::NeedsConfirmation(PendingGrant(grant)))
            }
            Decision::Deny if region == Region::OutOfRange => {
                warn!(address, len, %operation, "access out of range");
                Err(Error::OutOfRange { address: address as u32, len: len as u32 })
            }
            Decision::Deny => {
                warn!(address, len, %region, %operation, "access denied");
                Err(Error::RegionDenied { address, region, operation })
            }
        }
    }

    /// Validate a jump to a program-counter word address. Jumps always need
    /// the operator's confirmation, so success yields a [`PendingJump`].
    pub fn jump(&self, word: WordAddr) -> Result<PendingJump> {
        let byte = self.to_byte_address(word)?;
        match self.authorize(byte.0, Operation::Jump) {
            Decision::Deny => Err(Error::RegionDenied {
                address: byte.0,
                region: self.classify_code(byte.0, WORD_SIZE),
                operation: Operation::Jump,
            }),
            _ => {
                debug!(word = word.0, byte = byte.0, "jump target validated");
                Ok(PendingJump { word, byte })
            }
        }
    }
}

impl Default for MemoryMap {
    fn default() -> Self {
        MemoryMap::ATMEGA328P
    }
}

/// Proof that a span was classified and authorized. Only [`MemoryMap::grant`]
/// (directly or through [`PendingGrant::confirm`]) creates one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grant {
    start: u16,
    len: u16,
    region: Region,
    operation: Operation,
}

impl Grant {
    pub fn start(&self) -> u16 { self.start }
    pub fn len(&self) -> u16 { self.len }
    pub fn is_empty(&self) -> bool { self.len == 0 }
    pub fn region(&self) -> Region { self.region }
    pub fn operation(&self) -> Operation { self.operation }
}

/// A grant waiting on the operator's yes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingGrant(Grant);

impl PendingGrant {
    pub fn address(&self) -> u16 { self.0.start }
    pub fn region(&self) -> Region { self.0.region }
    pub fn operation(&self) -> Operation { self.0.operation }

    /// Record the operator's explicit consent.
    pub fn confirm(self) -> Grant {
        debug!(address = self.0.start, "access confirmed");
        self.0
    }

    /// The error to report when the operator declines or never answers.
    pub fn into_error(self) -> Error {
        Error::ConfirmationRequired {
            address: self.0.start,
            region: self.0.region,
            operation: self.0.operation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Granted(Grant),
    NeedsConfirmation(PendingGrant),
}

impl Authorization {
    /// Use the grant only when no confirmation is needed.
    pub fn granted(self) -> Result<Grant> {
        match self {
            Authorization::Granted(g) => Ok(g),
            Authorization::NeedsConfirmation(p) => Err(p.into_error()),
        }
    }
}

/// A validated jump awaiting confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingJump {
    word: WordAddr,
    byte: ByteAddr,
}

impl PendingJump {
    pub fn word(&self) -> WordAddr { self.word }
    pub fn byte(&self) -> ByteAddr { self.byte }

    pub fn confirm(self) -> JumpTarget {
        debug!(byte = self.byte.0, "jump confirmed");
        JumpTarget::new(self.byte)
    }

    pub fn into_error(self) -> Error {
        Error::ConfirmationRequired {
            address: self.byte.0,
            region: Region::Code,
            operation: Operation::Jump,
        }
    }
}

/// Supported parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chip {
    /// ATmega328P (Arduino Uno)
    #[default]
    Atmega328p,
    /// ATmega32u4 (Leonardo, Arduboy)
    Atmega32u4,
}

impl Chip {
    pub fn memory_map(self) -> MemoryMap {
        match self {
            Chip::Atmega328p => MemoryMap::ATMEGA328P,
            Chip::Atmega32u4 => MemoryMap::ATMEGA32U4,
        }
    }

    pub fn io_names(self) -> &'static [(u16, &'static str)] {
        match self {
            Chip::Atmega328p => IO_NAMES_328P,
            Chip::Atmega32u4 => IO_NAMES_32U4,
        }
    }

    /// Resolve an I/O address to its register name (if known).
    pub fn io_name(self, addr: u16) -> Option<&'static str> {
        self.io_names().iter().find(|(a, _)| *a == addr).map(|(_, n)| *n)
    }
}

impl fmt::Display for Chip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Chip::Atmega328p => "atmega328p",
            Chip::Atmega32u4 => "atmega32u4",
        })
    }
}

impl FromStr for Chip {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("atmega328p") || s.eq_ignore_ascii_case("328p") {
            Ok(Chip::Atmega328p)
        } else if s.eq_ignore_ascii_case("atmega32u4") || s.eq_ignore_ascii_case("32u4") {
            Ok(Chip::Atmega32u4)
        } else {
            Err(Error::UnknownChip)
        }
    }
}

/// Named I/O registers for ATmega328P (data-space addresses).
const IO_NAMES_328P: &[(u16, &str)] = &[
    (0x23, "PINB"), (0x24, "DDRB"), (0x25, "PORTB"),
    (0x26, "PINC"), (0x27, "DDRC"), (0x28, "PORTC"),
    (0x29, "PIND"), (0x2A, "DDRD"), (0x2B, "PORTD"),
    (0x35, "TIFR0"), (0x36, "TIFR1"), (0x37, "TIFR2"),
    (0x3B, "PCIFR"), (0x3C, "EIFR"), (0x3D, "EIMSK"),
    (0x3E, "GPIOR0"), (0x3F, "EECR"), (0x40, "EEDR"),
    (0x41, "EEARL"), (0x42, "EEARH"),
    (0x44, "TCCR0A"), (0x45, "TCCR0B"), (0x46, "TCNT0"),
    (0x4C, "SPCR"), (0x4D, "SPSR"), (0x4E, "SPDR"),
    (0x53, "SMCR"), (0x55, "MCUCR"),
    (0x5D, "SPL"), (0x5E, "SPH"), (0x5F, "SREG"),
    (0x60, "WDTCSR"), (0x64, "PRR"),
    (0x6E, "TIMSK0"), (0x6F, "TIMSK1"), (0x70, "TIMSK2"),
    (0x7A, "ADCSRA"), (0x7C, "ADMUX"),
    (0x80, "TCCR1A"), (0x81, "TCCR1B"),
    (0xC0, "UCSR0A"), (0xC1, "UCSR0B"), (0xC2, "UCSR0C"),
    (0xC4, "UBRR0L"), (0xC5, "UBRR0H"), (0xC6, "UDR0"),
];

/// Named I/O registers for ATmega32u4 (data-space addresses).
const IO_NAMES_32U4: &[(u16, &str)] = &[
    (0x23, "PINB"), (0x24, "DDRB"), (0x25, "PORTB"),
    (0x26, "PINC"), (0x27, "DDRC"), (0x28, "PORTC"),
    (0x29, "PIND"), (0x2A, "DDRD"), (0x2B, "PORTD"),
    (0x2C, "PINE"), (0x2D, "DDRE"), (0x2E, "PORTE"),
    (0x2F, "PINF"), (0x30, "DDRF"), (0x31, "PORTF"),
    (0x3E, "GPIOR0"), (0x3F, "EECR"), (0x40, "EEDR"),
    (0x44, "TCCR0A"), (0x45, "TCCR0B"), (0x46, "TCNT0"),
    (0x4C, "SPCR"), (0x4D, "SPSR"), (0x4E, "SPDR"),
    (0x53, "SMCR"), (0x55, "MCUCR"),
    (0x5D, "SPL"), (0x5E, "SPH"), (0x5F, "SREG"),
    (0x60, "WDTCSR"), (0x64, "PRR0"), (0x65, "PRR1"),
    (0x6E, "TIMSK0"), (0x6F, "TIMSK1"),
    (0x80, "TCCR1A"), (0x81, "TCCR1B"),
    (0xC8, "UCSR1A"), (0xC9, "UCSR1B"), (0xCE, "UDR1"),
    (0xD8, "USBCON"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MAP: MemoryMap = MemoryMap::ATMEGA328P;

    #[test]
    fn test_reference_classification() {
        assert_eq!(MAP.classify(0x0050, 1), Region::Io);
        assert_eq!(MAP.authorize(0x0050, Operation::Write(Space::Data)), Decision::AllowWithConfirmation);
        assert_eq!(MAP.classify(0x0900, 1), Region::OutOfRange);
        assert_eq!(MAP.authorize(0x0900, Operation::Read(Space::Data)), Decision::Deny);
        assert_eq!(MAP.classify(0x0200, 1), Region::Data);
        assert_eq!(MAP.authorize(0x0200, Operation::Write(Space::Data)), Decision::Allow);
    }

    #[test]
    fn test_register_file_denied() {
        assert_eq!(MAP.classify(0x001F, 1), Region::Registers);
        assert_eq!(MAP.authorize(0x0010, Operation::Read(Space::Data)), Decision::Deny);
        assert!(matches!(
            MAP.grant(0x0010, 1, Operation::Read(Space::Data)),
            Err(Error::RegionDenied { region: Region::Registers, .. })
        ));
    }

    #[test]
    fn test_span_rules() {
        // wholly inside
        assert_eq!(MAP.classify(0x0100, 0x0800), Region::Data);
        // straddles I/O and SRAM
        assert_eq!(MAP.classify(0x00F0, 0x20), Region::OutOfRange);
        // runs off the end of SRAM
        assert_eq!(MAP.classify(0x08FF, 2), Region::OutOfRange);
        // overflows the 16-bit space
        assert_eq!(MAP.classify(0xFFFF, 2), Region::OutOfRange);
        assert_eq!(MAP.classify_code(0xFFFF, 2), Region::OutOfRange);
        // empty span
        assert_eq!(MAP.classify(0x0200, 0), Region::OutOfRange);
    }

    #[test]
    fn test_code_policy() {
        assert_eq!(MAP.authorize(0x1000, Operation::Read(Space::Program)), Decision::Allow);
        assert_eq!(MAP.authorize(0x1000, Operation::Write(Space::Program)), Decision::Deny);
        assert_eq!(MAP.authorize(0x1000, Operation::Jump), Decision::AllowWithConfirmation);
        assert_eq!(MAP.authorize(0x1001, Operation::Jump), Decision::Deny);
        assert_eq!(MAP.authorize(0x8000, Operation::Read(Space::Program)), Decision::Deny);
    }

    #[test]
    fn test_grant_errors() {
        assert_eq!(
            MAP.grant(0x0900, 1, Operation::Read(Space::Data)),
            Err(Error::OutOfRange { address: 0x0900, len: 1 })
        );
        assert!(matches!(
            MAP.grant(0x0100, 1, Operation::Write(Space::Program)),
            Err(Error::RegionDenied { region: Region::Code, .. })
        ));
    }

    #[test]
    fn test_io_grant_needs_confirmation() {
        let auth = MAP.grant(0x0025, 1, Operation::Write(Space::Data)).unwrap();
        let Authorization::NeedsConfirmation(pending) = auth else {
            panic!("I/O write should need confirmation");
        };
        assert_eq!(pending.region(), Region::Io);
        assert!(matches!(auth.granted(), Err(Error::ConfirmationRequired { address: 0x0025, .. })));
        let grant = pending.confirm();
        assert_eq!(grant.start(), 0x0025);
        assert_eq!(grant.region(), Region::Io);
    }

    #[test]
    fn test_to_byte_address_bounds() {
        assert_eq!(MAP.to_byte_address(WordAddr(0)), Ok(ByteAddr(0)));
        assert_eq!(MAP.to_byte_address(WordAddr(0x3FFF)), Ok(ByteAddr(0x7FFE)));
        assert!(MAP.to_byte_address(WordAddr(0x4000)).is_err());
        // multiplication itself overflows 16 bits
        assert_eq!(
            MAP.to_byte_address(WordAddr(0x8001)),
            Err(Error::OutOfRange { address: 0x1_0002, len: 2 })
        );
    }

    #[test]
    fn test_jump_flow() {
        let pending = MAP.jump(WordAddr(0x0100)).unwrap();
        assert_eq!(pending.byte(), ByteAddr(0x0200));
        let target = pending.confirm();
        assert_eq!(target.byte(), ByteAddr(0x0200));
        assert_eq!(target.word(), WordAddr(0x0100));
        assert!(MAP.jump(WordAddr(0x4000)).is_err());
    }

    #[test]
    fn test_validate() {
        assert!(MemoryMap::ATMEGA328P.validate().is_ok());
        assert!(MemoryMap::ATMEGA32U4.validate().is_ok());
        let mut bad = MAP;
        bad.io = Bounds::new(0x0010, 0x00FF);
        assert!(bad.validate().is_err());
        let mut bad = MAP;
        bad.code = Bounds::new(0x0000, 0x7FFE);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_sram_without_room_for_routines() {
        let mut small = MAP;
        small.data = Bounds::new(0x0100, 0x011F);
        assert_eq!(
            small.validate(),
            Err(Error::InvalidMemoryMap("data region too small for the snapshot buffer and stack"))
        );
        // exactly the buffer plus the routines' stack
        small.data = Bounds::new(0x0100, 0x0100 + SNAPSHOT_LEN as u16 + ROUTINE_STACK_DEPTH - 1);
        assert!(small.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_core_io_registers() {
        let mut bad = MAP;
        bad.io = Bounds::new(0x0020, 0x0050);
        assert!(matches!(bad.validate(), Err(Error::InvalidMemoryMap(_))));
    }

    #[test]
    fn test_chip() {
        assert_eq!("atmega32u4".parse::<Chip>(), Ok(Chip::Atmega32u4));
        assert_eq!("attiny85".parse::<Chip>(), Err(Error::UnknownChip));
        assert_eq!(Chip::Atmega32u4.memory_map().data.end, 0x0AFF);
        assert_eq!(Chip::Atmega328p.io_name(0x5F), Some("SREG"));
        assert_eq!(Chip::Atmega328p.io_name(0xC6), Some("UDR0"));
        assert_eq!(Chip::Atmega32u4.io_name(0x31), Some("PORTF"));
    }

    proptest! {
        #[test]
        fn test_outside_every_region_is_denied(addr in 0x0900u16..=0xFFFF) {
            prop_assert_eq!(MAP.classify(addr, 1), Region::OutOfRange);
            prop_assert_eq!(MAP.authorize(addr, Operation::Read(Space::Data)), Decision::Deny);
            prop_assert_eq!(MAP.authorize(addr, Operation::Write(Space::Data)), Decision::Deny);
        }

        #[test]
        fn test_word_to_byte_doubles(w in 0u16..=0x3FFF) {
            prop_assert_eq!(MAP.to_byte_address(WordAddr(w)), Ok(ByteAddr(w * 2)));
        }

        #[test]
        fn test_word_to_byte_rejects_above_code(w in 0x4000u16..=0xFFFF) {
            prop_assert!(MAP.to_byte_address(WordAddr(w)).is_err());
        }
    }
}
