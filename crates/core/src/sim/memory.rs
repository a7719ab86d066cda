//! Backing store for the machine model.
//!
//! Unified data space, sized to the part:
//!
//! | Address Range      | Content                      |
//! |--------------------|------------------------------|
//! | 0x0000–0x001F      | General registers R0–R31     |
//! | 0x0020–0x00FF      | I/O + extended I/O registers |
//! | 0x0100–`data.end`  | SRAM                         |
//!
//! Flash is a separate, byte-addressed array. Accesses outside either array
//! read as zero and are dropped on write; the validator keeps the operator
//! away from them, and runaway code only needs to not crash the host.

use crate::region::MemoryMap;
use crate::{FLASH_SIZE, REG_COUNT};

pub struct Memory {
    /// Registers, I/O and SRAM
    pub data: Vec<u8>,
    /// Program memory
    pub flash: Vec<u8>,
}

impl Memory {
    pub fn new(map: &MemoryMap) -> Self {
        Memory {
            data: vec![0u8; map.data.end as usize + 1],
            // erased flash reads as 0xFF
            flash: vec![0xFFu8; FLASH_SIZE],
        }
    }

    #[inline(always)]
    pub fn reg(&self, r: u8) -> u8 {
        self.data[r as usize]
    }

    #[inline(always)]
    pub fn set_reg(&mut self, r: u8, v: u8) {
        self.data[r as usize] = v;
    }

    /// Register pair starting at `low` (little-endian: low register first)
    #[inline(always)]
    pub fn pair(&self, low: u8) -> u16 {
        self.data[low as usize] as u16 | ((self.data[low as usize + 1] as u16) << 8)
    }

    #[inline(always)]
    pub fn set_pair(&mut self, low: u8, v: u16) {
        self.data[low as usize] = v as u8;
        self.data[low as usize + 1] = (v >> 8) as u8;
    }

    /// Z register (R30:R31)
    #[inline(always)]
    pub fn z(&self) -> u16 {
        self.pair(30)
    }

    pub fn registers(&self) -> [u8; REG_COUNT] {
        let mut r = [0u8; REG_COUNT];
        r.copy_from_slice(&self.data[..REG_COUNT]);
        r
    }

    pub fn set_registers(&mut self, r: &[u8; REG_COUNT]) {
        self.data[..REG_COUNT].copy_from_slice(r);
    }

    // --- Program memory ---

    /// 16-bit word at a word address; past the end reads as an erased word.
    #[inline(always)]
    pub fn read_program_word(&self, word_addr: u16) -> u16 {
        let b = word_addr as usize * 2;
        match self.flash.get(b..b + 2) {
            Some(w) => u16::from_le_bytes([w[0], w[1]]),
            None => 0xFFFF,
        }
    }

    #[inline(always)]
    pub fn write_program_word(&mut self, word_addr: u16, w: u16) {
        let b = word_addr as usize * 2;
        if let Some(slot) = self.flash.get_mut(b..b + 2) {
            slot.copy_from_slice(&w.to_le_bytes());
        }
    }

    #[inline(always)]
    pub fn read_flash_byte(&self, byte_addr: u16) -> u8 {
        self.flash.get(byte_addr as usize).copied().unwrap_or(0xFF)
    }

    // --- Data space ---

    #[inline(always)]
    pub fn read_raw(&self, addr: u16) -> u8 {
        self.data.get(addr as usize).copied().unwrap_or(0)
    }

    #[inline(always)]
    pub fn write_raw(&mut self, addr: u16, v: u8) {
        if let Some(slot) = self.data.get_mut(addr as usize) {
            *slot = v;
        }
    }
}
