//! Guarded accessor.
//!
//! The only code that touches memory on the operator's behalf. Every access
//! takes a [`Grant`] from the address validator, so the span was classified
//! and authorized before the first byte moves; writes are read back and
//! compared.

use tracing::{trace, warn};

use crate::error::{Error, Result};
use crate::region::{Grant, MemoryMap, Operation, Space};

/// Raw memory bus.
///
/// # Safety
///
/// Implementors must touch exactly the addressed location and nothing else,
/// and must be sound for every address inside the memory map they are used
/// with. Callers of the methods must only pass addresses a [`Grant`] covers;
/// in this crate only [`GuardedAccessor`] calls them.
pub unsafe trait Bus {
    /// # Safety
    /// `addr` is covered by a data-space grant.
    unsafe fn read_data(&mut self, addr: u16) -> u8;
    /// # Safety
    /// `addr` is covered by a data-space write grant.
    unsafe fn write_data(&mut self, addr: u16, value: u8);
    /// # Safety
    /// `addr` is a byte address covered by a program-space grant.
    unsafe fn read_program(&mut self, addr: u16) -> u8;
}

/// Performs validated reads and verified writes over a [`Bus`].
pub struct GuardedAccessor<'b, B: Bus + ?Sized> {
    bus: &'b mut B,
}

impl<'b, B: Bus + ?Sized> GuardedAccessor<'b, B> {
    pub fn new(bus: &'b mut B) -> Self {
        GuardedAccessor { bus }
    }

    /// Bytes of the granted span, in increasing address order. Nothing is
    /// read until the iterator is advanced.
    pub fn read(&mut self, grant: Grant) -> Result<Bytes<'_, B>> {
        let space = match grant.operation() {
            Operation::Read(space) => space,
            operation => {
                return Err(Error::RegionDenied { address: grant.start(), region: grant.region(), operation })
            }
        };
        Ok(Bytes { bus: &mut *self.bus, space, next: grant.start(), remaining: grant.len() })
    }

    /// Write one byte at the start of a data-space write grant, then read it
    /// back. A mismatch is [`Error::VerificationFailed`]: the write reached
    /// the bus but the location did not keep the value.
    pub fn write(&mut self, grant: Grant, value: u8) -> Result<()> {
        let address = grant.start();
        if grant.operation() != Operation::Write(Space::Data) {
            return Err(Error::RegionDenied { address, region: grant.region(), operation: grant.operation() });
        }
        if grant.len() != 1 {
            return Err(Error::OutOfRange { address: address as u32, len: grant.len() as u32 });
        }
        // SAFETY: the grant covers `address` for a data-space write.
        let read_back = unsafe {
            self.bus.write_data(address, value);
            self.bus.read_data(address)
        };
        trace!(address, value, read_back, "write");
        if read_back != value {
            warn!(address, written = value, read_back, "write verification failed");
            return Err(Error::VerificationFailed { address, written: value, read_back });
        }
        Ok(())
    }

    /// Authorize and read a span that needs no confirmation.
    pub fn read_span(&mut self, map: &MemoryMap, space: Space, address: u16, len: u16) -> Result<Bytes<'_, B>> {
        let grant = map.grant(address, len, Operation::Read(space))?.granted()?;
        self.read(grant)
    }

    /// Authorize and write a byte that needs no confirmation.
    pub fn write_byte(&mut self, map: &MemoryMap, address: u16, value: u8) -> Result<()> {
        let grant = map.grant(address, 1, Operation::Write(Space::Data))?.granted()?;
        self.write(grant, value)
    }
}

/// Lazy iterator over a granted span.
pub struct Bytes<'a, B: Bus + ?Sized> {
    bus: &'a mut B,
    space: Space,
    next: u16,
    remaining: u16,
}

impl<B: Bus + ?Sized> Iterator for Bytes<'_, B> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        if self.remaining == 0 {
            return None;
        }
        let addr = self.next;
        // SAFETY: `addr` lies inside the span the grant was issued for.
        let value = unsafe {
            match self.space {
                Space::Data => self.bus.read_data(addr),
                Space::Program => self.bus.read_program(addr),
            }
        };
        self.remaining -= 1;
        self.next = addr.wrapping_add(1);
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining as usize, Some(self.remaining as usize))
    }
}

impl<B: Bus + ?Sized> ExactSizeIterator for Bytes<'_, B> {}
