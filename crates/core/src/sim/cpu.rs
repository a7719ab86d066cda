//! CPU state and instruction execution for the machine model.
//!
//! Covers the instruction subset in [`crate::opcodes`]. Flag results follow
//! the datasheet; data-space accesses go through the machine's
//! [`load_data`](Machine::load_data) / [`store_data`](Machine::store_data) so
//! I/O side effects apply to executed code and to the operator alike.

use super::memory::Memory;
use super::{Fault, Machine};
use crate::opcodes::{is_two_word, Instruction};
use crate::{SREG_C, SREG_I};

/// Program counter, stack pointer, status register. R0–R31 live in
/// [`Memory::data`].
pub struct Cpu {
    /// Program counter (word address)
    pub pc: u16,
    /// Stack pointer (byte address in data space)
    pub sp: u16,
    /// I T H S V N Z C (bits 7..0)
    pub sreg: u8,
    /// Cycle counter
    pub tick: u64,
    /// Set by `sei` and `reti`: the next instruction runs before any
    /// pending interrupt is taken.
    pub irq_shadow: bool,
}

impl Cpu {
    pub fn new(sp: u16) -> Self {
        Cpu { pc: 0, sp, sreg: 0, tick: 0, irq_shadow: false }
    }

    #[inline(always)]
    pub fn flag(&self, bit: u8) -> bool {
        self.sreg & (1 << bit) != 0
    }

    #[inline(always)]
    pub fn set_flag(&mut self, bit: u8, v: bool) {
        if v { self.sreg |= 1 << bit; } else { self.sreg &= !(1 << bit); }
    }
}

/// Flags for AND/OR/EOR. V is cleared.
pub fn flags_logic(cpu: &mut Cpu, r: u8) {
    let n = (r >> 7) & 1;
    let z = (r == 0) as u8;
    let s = n;
    cpu.sreg = (cpu.sreg & 0b1110_0001) | (s << 4) | (n << 2) | (z << 1);
}

/// Flags for INC (`overflow_at` = 0x7F) and DEC (0x80). C is untouched.
fn flags_step(cpu: &mut Cpu, rd: u8, res: u8, overflow_at: u8) {
    let n = (res >> 7) & 1;
    let v = (rd == overflow_at) as u8;
    let z = (res == 0) as u8;
    let s = n ^ v;
    cpu.sreg = (cpu.sreg & 0b1110_0001) | (s << 4) | (v << 3) | (n << 2) | (z << 1);
}

/// Flags for LSR/ROR: C is the bit shifted out, V = N ^ C.
fn flags_shift(cpu: &mut Cpu, res: u8, carry: u8) {
    let n = (res >> 7) & 1;
    let z = (res == 0) as u8;
    let v = n ^ carry;
    let s = n ^ v;
    cpu.sreg = (cpu.sreg & 0b1110_0000) | (s << 4) | (v << 3) | (n << 2) | (z << 1) | carry;
}

/// Skip the next instruction (SBRC, SBRS, SBIC, SBIS), one or two words.
pub fn skip_next(cpu: &mut Cpu, mem: &Memory) -> u8 {
    let words = if is_two_word(mem.read_program_word(cpu.pc)) { 2 } else { 1 };
    cpu.pc = cpu.pc.wrapping_add(words);
    1 + words as u8
}

impl Machine {
    /// Execute one decoded instruction; returns its cycle cost.
    pub(super) fn execute_inst(&mut self, inst: Instruction, size: u8) -> Result<u8, Fault> {
        let at = self.cpu.pc;
        self.cpu.pc = self.cpu.pc.wrapping_add(size as u16);

        let cycles = match inst {
            Instruction::Nop => 1,
            Instruction::Break => {
                self.halted = Some(at);
                1
            }

            // -- Arithmetic and logic --
            Instruction::Eor { d, r } => {
                let res = self.mem.reg(d) ^ self.mem.reg(r);
                self.mem.set_reg(d, res);
                flags_logic(&mut self.cpu, res); 1
            }
            Instruction::Andi { d, k } => {
                let res = self.mem.reg(d) & k;
                self.mem.set_reg(d, res);
                flags_logic(&mut self.cpu, res); 1
            }
            Instruction::Ori { d, k } => {
                let res = self.mem.reg(d) | k;
                self.mem.set_reg(d, res);
                flags_logic(&mut self.cpu, res); 1
            }
            Instruction::Inc { d } => {
                let rd = self.mem.reg(d);
                let res = rd.wrapping_add(1);
                self.mem.set_reg(d, res);
                flags_step(&mut self.cpu, rd, res, 0x7F); 1
            }
            Instruction::Dec { d } => {
                let rd = self.mem.reg(d);
                let res = rd.wrapping_sub(1);
                self.mem.set_reg(d, res);
                flags_step(&mut self.cpu, rd, res, 0x80); 1
            }
            Instruction::Lsr { d } => {
                let rd = self.mem.reg(d);
                let res = rd >> 1;
                self.mem.set_reg(d, res);
                flags_shift(&mut self.cpu, res, rd & 1); 1
            }
            Instruction::Ror { d } => {
                let rd = self.mem.reg(d);
                let res = (rd >> 1) | ((self.cpu.flag(SREG_C) as u8) << 7);
                self.mem.set_reg(d, res);
                flags_shift(&mut self.cpu, res, rd & 1); 1
            }

            // -- Data transfer --
            Instruction::Mov { d, r } => { let v = self.mem.reg(r); self.mem.set_reg(d, v); 1 }
            Instruction::Movw { d, r } => { let v = self.mem.pair(r); self.mem.set_pair(d, v); 1 }
            Instruction::Ldi { d, k } => { self.mem.set_reg(d, k); 1 }
            Instruction::Lds { d, k } => { let v = self.load_data(k); self.mem.set_reg(d, v); 2 }
            Instruction::Sts { k, r } => { let v = self.mem.reg(r); self.store_data(k, v); 2 }
            Instruction::LdZQ { d, q } => {
                let v = self.load_data(self.mem.z().wrapping_add(q as u16));
                self.mem.set_reg(d, v); 2
            }
            Instruction::StZQ { r, q } => {
                let v = self.mem.reg(r);
                self.store_data(self.mem.z().wrapping_add(q as u16), v); 2
            }
            Instruction::Push { r } => { let v = self.mem.reg(r); self.push_byte(v)?; 2 }
            Instruction::Pop { d } => { let v = self.pop_byte()?; self.mem.set_reg(d, v); 2 }
            Instruction::In { d, a } => { let v = self.load_data(a as u16); self.mem.set_reg(d, v); 1 }
            Instruction::Out { a, r } => { let v = self.mem.reg(r); self.store_data(a as u16, v); 1 }

            // -- Skips --
            Instruction::Sbrc { r, b } => {
                if self.mem.reg(r) & (1 << b) == 0 { skip_next(&mut self.cpu, &self.mem) } else { 1 }
            }
            Instruction::Sbrs { r, b } => {
                if self.mem.reg(r) & (1 << b) != 0 { skip_next(&mut self.cpu, &self.mem) } else { 1 }
            }
            Instruction::Sbic { a, b } => {
                if self.load_data(a as u16) & (1 << b) == 0 { skip_next(&mut self.cpu, &self.mem) } else { 1 }
            }
            Instruction::Sbis { a, b } => {
                if self.load_data(a as u16) & (1 << b) != 0 { skip_next(&mut self.cpu, &self.mem) } else { 1 }
            }

            // -- Control flow --
            Instruction::Rjmp { k } => { self.cpu.pc = self.cpu.pc.wrapping_add(k as u16); 2 }
            Instruction::Rcall { k } => {
                self.push_word(self.cpu.pc)?;
                self.cpu.pc = self.cpu.pc.wrapping_add(k as u16); 3
            }
            Instruction::Jmp { k } => { self.cpu.pc = k; 3 }
            Instruction::Call { k } => {
                self.push_word(self.cpu.pc)?;
                self.cpu.pc = k; 4
            }
            Instruction::Ijmp => { self.cpu.pc = self.mem.z(); 2 }
            Instruction::Icall => {
                self.push_word(self.cpu.pc)?;
                self.cpu.pc = self.mem.z(); 3
            }
            Instruction::Ret => { self.cpu.pc = self.pop_word()?; 4 }
            Instruction::Reti => {
                self.cpu.pc = self.pop_word()?;
                self.cpu.set_flag(SREG_I, true);
                self.cpu.irq_shadow = true; 4
            }

            Instruction::Sei => {
                self.cpu.set_flag(SREG_I, true);
                self.cpu.irq_shadow = true; 1
            }
            Instruction::Cli => { self.cpu.set_flag(SREG_I, false); 1 }

            Instruction::Unknown(word) => return Err(Fault::UnknownOpcode { pc: at, word }),
        };
        Ok(cycles)
    }

    pub(super) fn push_byte(&mut self, v: u8) -> Result<(), Fault> {
        let sp = self.cpu.sp;
        if !self.map.data.contains(sp) {
            return Err(Fault::StackOverflow { sp });
        }
        self.mem.write_raw(sp, v);
        self.cpu.sp = sp.wrapping_sub(1);
        Ok(())
    }

    pub(super) fn pop_byte(&mut self) -> Result<u8, Fault> {
        let sp = self.cpu.sp.wrapping_add(1);
        if !self.map.data.contains(sp) {
            return Err(Fault::StackOverflow { sp });
        }
        self.cpu.sp = sp;
        Ok(self.mem.read_raw(sp))
    }

    /// Push a return address: low byte first, so the high byte ends up at
    /// the lower address.
    pub(super) fn push_word(&mut self, val: u16) -> Result<(), Fault> {
        self.push_byte(val as u8)?;
        self.push_byte((val >> 8) as u8)
    }

    pub(super) fn pop_word(&mut self) -> Result<u16, Fault> {
        let hi = self.pop_byte()?;
        let lo = self.pop_byte()?;
        Ok((hi as u16) << 8 | lo as u16)
    }
}
