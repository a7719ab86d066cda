//! Host-side machine model.
//!
//! An ATmega core small enough to run the register transfer routines from
//! flash exactly as the device does, so their stack, flag and interrupt
//! behaviour can be tested without hardware. The console also uses it as its
//! default target.
//!
//! ## Flash layout
//!
//! | Word range       | Content                                   |
//! |------------------|-------------------------------------------|
//! | 0x0000–0x3EFF    | program image (Intel HEX)                 |
//! | 0x3F00–0x3FFE    | capture, restore-and-jump, restore-and-call |
//! | 0x3FFF           | halt stub (`break`), the routines' caller |
//!
//! The snapshot buffer the routines use lives at the first SRAM byte.
//!
//! ## Interrupts
//!
//! One interrupt line. A raised interrupt is taken before the next
//! instruction when I is set, except in the shadow of `sei`/`reti`. Each
//! entry is recorded with the register file at that moment.

mod cpu;
mod memory;

use core::fmt;

use thiserror::Error;
use tracing::{debug, info, warn};

pub use cpu::Cpu;
pub use memory::Memory;

use crate::access::Bus;
use crate::error::Result;
use crate::hex::{load_hex, HexImage};
use crate::opcodes::{decode, encode, Instruction};
use crate::addr::WordAddr;
use crate::region::{Chip, MemoryMap};
use crate::regs::RegisterSnapshot;
use crate::rtu::routines::Routine;
use crate::addr::JumpTarget;
use crate::rtu::RegisterTransfer;
use crate::{SNAPSHOT_LEN, SPH_ADDR, SPL_ADDR, SREG_ADDR, SREG_I};

/// First word of the routine area.
pub const ROUTINE_BASE: u16 = 0x3F00;
/// Word holding the halt stub.
pub const HALT_ADDR: u16 = 0x3FFF;
/// Default bound on instructions per run.
pub const DEFAULT_STEP_LIMIT: u64 = 1_000_000;

/// Ways execution can go wrong on the model. The device has no equivalent;
/// there these are hangs and resets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("no halt after {steps} instructions")]
    Runaway { steps: u64 },

    #[error("unknown opcode 0x{word:04X} at word 0x{pc:04X}")]
    UnknownOpcode { pc: u16, word: u16 },

    #[error("stack pointer 0x{sp:04X} left SRAM")]
    StackOverflow { sp: u16 },

    #[error("break at word 0x{pc:04X} before returning to the caller")]
    StrayBreak { pc: u16 },
}

/// Where a restore-and-jump came to rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Landing {
    /// Word address of the `break` that stopped execution
    pub halted_at: WordAddr,
}

impl fmt::Display for Landing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "halted at {}", self.halted_at)
    }
}

/// One interrupt entry, as the handler would have found the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptEntry {
    /// Address the interrupt returns to
    pub at: WordAddr,
    pub registers: RegisterSnapshot,
}

/// Entry points of the installed routines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutineTable {
    pub capture: u16,
    pub restore_and_transfer: u16,
    pub restore_and_call: u16,
}

pub struct Machine {
    pub cpu: Cpu,
    pub mem: Memory,
    chip: Chip,
    map: MemoryMap,
    routines: RoutineTable,
    pending_interrupt: Option<u16>,
    interrupts: Vec<InterruptEntry>,
    step_limit: u64,
    /// Set by `break`: the word it sits at
    halted: Option<u16>,
    /// External level on input pins
    pub pin_input: u8,
}

impl Machine {
    pub fn new(chip: Chip) -> Self {
        Self::with_memory_map(chip, chip.memory_map())
    }

    /// A machine with custom region bounds (validated by the caller).
    pub fn with_memory_map(chip: Chip, map: MemoryMap) -> Self {
        let mut m = Machine {
            cpu: Cpu::new(map.data.end),
            mem: Memory::new(&map),
            chip,
            map,
            routines: RoutineTable { capture: 0, restore_and_transfer: 0, restore_and_call: 0 },
            pending_interrupt: None,
            interrupts: Vec::new(),
            step_limit: DEFAULT_STEP_LIMIT,
            halted: None,
            pin_input: 0,
        };
        m.install_routines();
        m
    }

    pub fn with_step_limit(mut self, steps: u64) -> Self {
        self.step_limit = steps;
        self
    }

    fn install_routines(&mut self) {
        let mut at = ROUTINE_BASE;
        let mut entries = [0u16; 3];
        for (slot, routine) in entries.iter_mut().zip(Routine::ALL) {
            *slot = at;
            let mut seq = Vec::new();
            routine.emit(|inst| seq.push(inst));
            at = self.place(at, seq);
            debug!(routine = routine.name(), entry = *slot, end = at, "routine installed");
        }
        debug_assert!(at <= HALT_ADDR);
        self.routines = RoutineTable {
            capture: entries[0],
            restore_and_transfer: entries[1],
            restore_and_call: entries[2],
        };
        self.place(HALT_ADDR, [Instruction::Break]);
    }

    /// Encode `code` into flash from word `at`; returns the next free word.
    pub fn place(&mut self, at: u16, code: impl IntoIterator<Item = Instruction>) -> u16 {
        let mut pc = at;
        for inst in code {
            let (w0, w1) = encode(inst);
            self.mem.write_program_word(pc, w0);
            pc += 1;
            if let Some(w1) = w1 {
                self.mem.write_program_word(pc, w1);
                pc += 1;
            }
        }
        pc
    }

    /// Load a program image below the routine area.
    pub fn load_hex(&mut self, text: &str) -> Result<HexImage> {
        let limit = ROUTINE_BASE as usize * 2;
        let image = load_hex(text, &mut self.mem.flash[..limit])?;
        info!(end = image.end, bytes = image.bytes, "program loaded");
        Ok(image)
    }

    pub fn chip(&self) -> Chip { self.chip }
    pub fn memory_map(&self) -> &MemoryMap { &self.map }
    pub fn routines(&self) -> RoutineTable { self.routines }

    /// SRAM address of the routines' snapshot buffer.
    pub fn snapshot_addr(&self) -> u16 {
        self.map.data.start
    }

    pub fn registers(&self) -> RegisterSnapshot {
        RegisterSnapshot { r: self.mem.registers(), sreg: self.cpu.sreg }
    }

    pub fn set_registers(&mut self, snap: &RegisterSnapshot) {
        self.mem.set_registers(&snap.r);
        self.cpu.sreg = snap.sreg;
    }

    /// External reset: PC, SP and SREG back to their power-on values and any
    /// pending interrupt dropped. SRAM and flash keep their contents.
    pub fn reset(&mut self) {
        self.cpu = Cpu::new(self.map.data.end);
        self.pending_interrupt = None;
        self.halted = None;
        info!("machine reset");
    }

    /// A faulted target leaves PC and SP wherever it stopped; the only way
    /// back is a reset.
    fn reset_on_fault<T>(&mut self, r: core::result::Result<T, Fault>) -> core::result::Result<T, Fault> {
        if let Err(fault) = &r {
            warn!(%fault, "target faulted, resetting");
            self.reset();
        }
        r
    }

    /// Request an interrupt through the vector at word `vector`.
    pub fn raise_interrupt(&mut self, vector: u16) {
        self.pending_interrupt = Some(vector);
    }

    /// Interrupt entries since the last [`clear_interrupts`](Self::clear_interrupts).
    pub fn interrupts(&self) -> &[InterruptEntry] {
        &self.interrupts
    }

    pub fn clear_interrupts(&mut self) {
        self.interrupts.clear();
    }

    // --- Data space with I/O side effects ---

    fn pin_registers(&self) -> &'static [u16] {
        match self.chip {
            Chip::Atmega328p => &[0x23, 0x26, 0x29],
            Chip::Atmega32u4 => &[0x23, 0x26, 0x29, 0x2C, 0x2F],
        }
    }

    pub(crate) fn load_data(&mut self, addr: u16) -> u8 {
        match addr {
            SREG_ADDR => self.cpu.sreg,
            SPL_ADDR => self.cpu.sp as u8,
            SPH_ADDR => (self.cpu.sp >> 8) as u8,
            // PINx: outputs read back from PORTx, inputs from the pin
            a if self.pin_registers().contains(&a) => {
                let ddr = self.mem.read_raw(a + 1);
                let port = self.mem.read_raw(a + 2);
                (port & ddr) | (self.pin_input & !ddr)
            }
            _ => self.mem.read_raw(addr),
        }
    }

    pub(crate) fn store_data(&mut self, addr: u16, v: u8) {
        match addr {
            SREG_ADDR => self.cpu.sreg = v,
            SPL_ADDR => self.cpu.sp = (self.cpu.sp & 0xFF00) | v as u16,
            SPH_ADDR => self.cpu.sp = (self.cpu.sp & 0x00FF) | ((v as u16) << 8),
            // writing 1 to a PINx bit toggles PORTx
            a if self.pin_registers().contains(&a) => {
                let port = self.mem.read_raw(a + 2);
                self.mem.write_raw(a + 2, port ^ v);
            }
            _ => self.mem.write_raw(addr, v),
        }
    }

    // --- Execution ---

    /// Take a pending interrupt or execute one instruction.
    pub fn step(&mut self) -> core::result::Result<(), Fault> {
        if self.cpu.flag(SREG_I) && !self.cpu.irq_shadow {
            if let Some(vector) = self.pending_interrupt.take() {
                return self.enter_interrupt(vector);
            }
        }
        self.cpu.irq_shadow = false;

        let pc = self.cpu.pc;
        let word = self.mem.read_program_word(pc);
        let next_word = self.mem.read_program_word(pc.wrapping_add(1));
        let (inst, size) = decode(word, next_word);
        let cycles = self.execute_inst(inst, size)?;
        self.cpu.tick += cycles as u64;
        Ok(())
    }

    fn enter_interrupt(&mut self, vector: u16) -> core::result::Result<(), Fault> {
        let pc = self.cpu.pc;
        self.interrupts.push(InterruptEntry { at: WordAddr(pc), registers: self.registers() });
        self.push_word(pc)?;
        self.cpu.set_flag(SREG_I, false);
        self.cpu.pc = vector;
        self.cpu.tick += 5;
        debug!(vector, from = pc, "interrupt taken");
        Ok(())
    }

    /// Run until a `break`. Returns the word it sits at.
    pub fn run(&mut self) -> core::result::Result<WordAddr, Fault> {
        self.halted = None;
        for _ in 0..self.step_limit {
            self.step()?;
            if let Some(pc) = self.halted.take() {
                return Ok(WordAddr(pc));
            }
        }
        Err(Fault::Runaway { steps: self.step_limit })
    }

    /// Call `entry` the way compiled code would: buffer pointer in r25:r24,
    /// optional target byte address in r23:r22, return address on the stack.
    fn enter(&mut self, entry: u16, target: Option<u16>) -> core::result::Result<(), Fault> {
        self.mem.set_pair(24, self.snapshot_addr());
        if let Some(target) = target {
            self.mem.set_pair(22, target);
        }
        self.push_word(HALT_ADDR)?;
        self.cpu.pc = entry;
        Ok(())
    }

    /// Call `entry` and require it to come back to the halt stub.
    fn invoke(&mut self, entry: u16, target: Option<u16>) -> core::result::Result<(), Fault> {
        self.enter(entry, target)?;
        match self.run()? {
            WordAddr(HALT_ADDR) => Ok(()),
            WordAddr(pc) => Err(Fault::StrayBreak { pc }),
        }
    }

    fn write_snapshot_buffer(&mut self, snap: &RegisterSnapshot) {
        let base = self.snapshot_addr();
        for (i, b) in snap.to_bytes().into_iter().enumerate() {
            self.mem.write_raw(base + i as u16, b);
        }
    }

    fn read_snapshot_buffer(&self) -> RegisterSnapshot {
        let base = self.snapshot_addr();
        let mut buf = [0u8; SNAPSHOT_LEN];
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self.mem.read_raw(base + i as u16);
        }
        RegisterSnapshot::from_bytes(&buf)
    }
}

// SAFETY: every access is bounds-checked against the backing vectors.
unsafe impl Bus for Machine {
    unsafe fn read_data(&mut self, addr: u16) -> u8 {
        self.load_data(addr)
    }

    unsafe fn write_data(&mut self, addr: u16, value: u8) {
        self.store_data(addr, value)
    }

    unsafe fn read_program(&mut self, addr: u16) -> u8 {
        self.mem.read_flash_byte(addr)
    }
}

impl RegisterTransfer for Machine {
    type Fault = Fault;
    type Landing = Landing;

    fn capture(&mut self, snapshot: &mut RegisterSnapshot) -> core::result::Result<(), Fault> {
        let r = self.invoke(self.routines.capture, None);
        self.reset_on_fault(r)?;
        *snapshot = self.read_snapshot_buffer();
        debug!(sreg = snapshot.sreg, "registers captured");
        Ok(())
    }

    unsafe fn restore_and_transfer(
        &mut self,
        snapshot: &RegisterSnapshot,
        target: JumpTarget,
    ) -> core::result::Result<Landing, Fault> {
        self.write_snapshot_buffer(snapshot);
        info!(word = %target.word(), "restore and jump");
        let r = self
            .enter(self.routines.restore_and_transfer, Some(target.byte().0))
            .and_then(|()| self.run());
        let halted_at = self.reset_on_fault(r)?;
        Ok(Landing { halted_at })
    }

    unsafe fn restore_and_call(
        &mut self,
        snapshot: &RegisterSnapshot,
        target: JumpTarget,
    ) -> core::result::Result<(), Fault> {
        self.write_snapshot_buffer(snapshot);
        info!(word = %target.word(), "restore and call");
        let r = self.invoke(self.routines.restore_and_call, Some(target.byte().0));
        self.reset_on_fault(r)
    }
}
