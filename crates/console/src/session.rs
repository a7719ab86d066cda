//! Command dispatcher.
//!
//! Reads one command per line, asks the validator, asks the operator when
//! the validator says so, and runs the accessor or the register transfer
//! unit. Command errors are printed and the loop goes on.

use std::fmt::Display;
use std::io::Write;
use std::time::Duration;

use anyhow::Context;
use avrmon_core::input::{self, Clock, LineSource, TIMEOUT_SENTINEL};
use avrmon_core::region::Authorization;
use avrmon_core::{
    Bus, Chip, Error, Grant, GuardedAccessor, MemoryMap, Operation, PendingGrant, RegisterSnapshot,
    RegisterTransfer, Space, WordAddr,
};
use tracing::{debug, info};

use crate::command::{self, Command, HELP};
use crate::dump::{format_dump, format_regions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Session<T, I, C, W> {
    target: T,
    input: I,
    clock: C,
    out: W,
    chip: Chip,
    map: MemoryMap,
    timeout: Duration,
    snapshot: RegisterSnapshot,
}

impl<T, I, C, W> Session<T, I, C, W>
where
    T: Bus + RegisterTransfer,
    T::Fault: std::error::Error + Send + Sync + 'static,
    T::Landing: Display,
    I: LineSource<Line = String>,
    C: Clock,
    W: Write,
{
    pub fn new(target: T, input: I, clock: C, out: W, chip: Chip, map: MemoryMap, timeout: Duration) -> Self {
        Session { target, input, clock, out, chip, map, timeout, snapshot: RegisterSnapshot::new() }
    }

    pub fn snapshot(&self) -> &RegisterSnapshot {
        &self.snapshot
    }

    /// Prompt, read and execute until `q` or end of input.
    pub fn run(&mut self) -> anyhow::Result<()> {
        loop {
            write!(self.out, "> ")?;
            self.out.flush()?;
            let line = match input::wait_line(&mut self.input, &self.clock, self.timeout) {
                Ok(line) => line,
                Err(Error::InputTimeout) if self.input.is_closed() => {
                    writeln!(self.out)?;
                    return Ok(());
                }
                Err(_) => {
                    // idle prompt; ask again
                    writeln!(self.out)?;
                    continue;
                }
            };
            debug!(line = %line, "command");
            let flow = command::parse(&line).and_then(|cmd| self.execute(cmd));
            match flow {
                Ok(Flow::Quit) => return Ok(()),
                Ok(Flow::Continue) => {}
                Err(e) => writeln!(self.out, "error: {e:#}")?,
            }
        }
    }

    pub fn execute(&mut self, cmd: Command) -> anyhow::Result<Flow> {
        match cmd {
            Command::Empty => {}
            Command::Help => writeln!(self.out, "{HELP}")?,
            Command::Quit => return Ok(Flow::Quit),
            Command::Regions => write!(self.out, "{}", format_regions(self.chip, &self.map))?,
            Command::Capture => {
                self.target.capture(&mut self.snapshot)?;
                writeln!(self.out, "{}", self.snapshot)?;
            }
            Command::Show => writeln!(self.out, "{}", self.snapshot)?,
            Command::Set { reg, value } => {
                let Some(value) = self.byte_or_prompt(value, "value")? else {
                    return Ok(Flow::Continue);
                };
                reg.set(&mut self.snapshot, value);
                writeln!(self.out, "{}", self.snapshot)?;
            }
            Command::DumpData { addr, len } => self.dump(Space::Data, addr, len)?,
            Command::DumpProgram { addr, len } => self.dump(Space::Program, addr, len)?,
            Command::Write { addr, value } => self.write(addr, value)?,
            Command::Jump { word } => self.transfer(word, false)?,
            Command::Call { word } => self.transfer(word, true)?,
        }
        Ok(Flow::Continue)
    }

    /// A missing argument is asked for. `None` means the operator gave up.
    fn number_or_prompt(&mut self, given: Option<u16>, what: &str) -> anyhow::Result<Option<u16>> {
        if given.is_some() {
            return Ok(given);
        }
        write!(self.out, "{what}: ")?;
        self.out.flush()?;
        match input::read_number(&mut self.input, &self.clock, self.timeout) {
            TIMEOUT_SENTINEL => {
                writeln!(self.out, "abandoned")?;
                Ok(None)
            }
            n => Ok(Some(n as u16)),
        }
    }

    fn byte_or_prompt(&mut self, given: Option<u8>, what: &str) -> anyhow::Result<Option<u8>> {
        match self.number_or_prompt(given.map(u16::from), what)? {
            Some(n) => Ok(Some(u8::try_from(n).context("value must fit in a byte")?)),
            None => Ok(None),
        }
    }

    /// Ask for a yes. Declining and silence both abandon the operation.
    fn confirm(&mut self, question: &str) -> anyhow::Result<bool> {
        write!(self.out, "{question} [y/N] ")?;
        self.out.flush()?;
        match input::confirm(&mut self.input, &self.clock, self.timeout) {
            Ok(yes) => Ok(yes),
            Err(e) => {
                writeln!(self.out)?;
                Err(e.into())
            }
        }
    }

    fn describe(&self, address: u16) -> String {
        match self.chip.io_name(address) {
            Some(name) => format!("0x{address:04X} ({name})"),
            None => format!("0x{address:04X}"),
        }
    }

    /// Resolve an authorization, asking the operator when needed.
    fn settle(&mut self, auth: Authorization) -> anyhow::Result<Grant> {
        match auth {
            Authorization::Granted(grant) => Ok(grant),
            Authorization::NeedsConfirmation(pending) => self.confirm_grant(pending),
        }
    }

    fn confirm_grant(&mut self, pending: PendingGrant) -> anyhow::Result<Grant> {
        let question = format!(
            "{} of {} in the {} region has side effects. Proceed?",
            pending.operation(),
            self.describe(pending.address()),
            pending.region(),
        );
        if self.confirm(&question)? {
            Ok(pending.confirm())
        } else {
            Err(pending.into_error().into())
        }
    }

    fn dump(&mut self, space: Space, addr: Option<u16>, len: u16) -> anyhow::Result<()> {
        let Some(addr) = self.number_or_prompt(addr, "address")? else {
            return Ok(());
        };
        let auth = self.map.grant(addr, len, Operation::Read(space))?;
        let grant = self.settle(auth)?;
        let bytes: Vec<u8> = GuardedAccessor::new(&mut self.target).read(grant)?.collect();
        write!(self.out, "{}", format_dump(addr, &bytes))?;
        Ok(())
    }

    fn write(&mut self, addr: Option<u16>, value: Option<u8>) -> anyhow::Result<()> {
        let Some(addr) = self.number_or_prompt(addr, "address")? else {
            return Ok(());
        };
        // validate before asking for the value
        let auth = self.map.grant(addr, 1, Operation::Write(Space::Data))?;
        let Some(value) = self.byte_or_prompt(value, "value")? else {
            return Ok(());
        };
        let grant = self.settle(auth)?;
        GuardedAccessor::new(&mut self.target).write(grant, value)?;
        writeln!(self.out, "{} = 0x{value:02X}", self.describe(addr))?;
        Ok(())
    }

    fn transfer(&mut self, word: Option<u16>, call: bool) -> anyhow::Result<()> {
        let Some(word) = self.number_or_prompt(word, "word address")? else {
            return Ok(());
        };
        let pending = self.map.jump(WordAddr(word))?;
        let question = if call {
            format!("Call {} (byte {}) with the snapshot registers?", pending.word(), pending.byte())
        } else {
            format!(
                "Jump to {} (byte {}) with the snapshot registers? This does not return.",
                pending.word(),
                pending.byte()
            )
        };
        if !self.confirm(&question)? {
            return Err(pending.into_error().into());
        }
        let target = pending.confirm();
        if call {
            info!(word, "calling");
            // SAFETY: the operator confirmed the address; the validator put
            // it on an instruction boundary inside the code region.
            unsafe { self.target.restore_and_call(&self.snapshot, target) }?;
            writeln!(self.out, "returned from {}", target.word())?;
        } else {
            info!(word, "jumping");
            // SAFETY: as above.
            let landing = unsafe { self.target.restore_and_transfer(&self.snapshot, target) }?;
            writeln!(self.out, "{landing}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avrmon_core::opcodes::Instruction;
    use avrmon_core::sim::Machine;
    use std::cell::Cell;
    use std::collections::VecDeque;

    struct Script {
        lines: VecDeque<String>,
    }

    impl LineSource for Script {
        type Line = String;

        fn poll_line(&mut self) -> Option<String> {
            self.lines.pop_front()
        }

        fn is_closed(&self) -> bool {
            self.lines.is_empty()
        }
    }

    struct FakeClock(Cell<u64>);

    impl Clock for FakeClock {
        fn now(&self) -> Duration {
            let t = self.0.get();
            self.0.set(t + 10);
            Duration::from_millis(t)
        }
    }

    fn run_with(machine: Machine, script: &[&str]) -> (String, Machine, RegisterSnapshot) {
        let chip = machine.chip();
        let map = *machine.memory_map();
        let input = Script { lines: script.iter().map(|s| s.to_string()).collect() };
        let mut session =
            Session::new(machine, input, FakeClock(Cell::new(0)), Vec::new(), chip, map, Duration::from_millis(200));
        session.run().unwrap();
        let snapshot = *session.snapshot();
        let Session { target, out, .. } = session;
        (String::from_utf8(out).unwrap(), target, snapshot)
    }

    fn run(script: &[&str]) -> (String, Machine, RegisterSnapshot) {
        run_with(Machine::new(Chip::Atmega328p).with_step_limit(10_000), script)
    }

    #[test]
    fn test_write_then_dump() {
        let (out, _, _) = run(&["w 0x200 0x41", "d 0x200 2", "q"]);
        assert!(out.contains("0x0200 = 0x41"), "{out}");
        assert!(out.contains("0200: 41 00"), "{out}");
    }

    #[test]
    fn test_io_write_declined() {
        let (out, m, _) = run(&["w 0x25 1", "n"]);
        assert!(out.contains("0x0025 (PORTB)"), "{out}");
        assert!(out.contains("requires confirmation"), "{out}");
        assert_eq!(m.mem.read_raw(0x25), 0);
    }

    #[test]
    fn test_io_write_confirmed() {
        let (out, m, _) = run(&["w 0x25 1", "y"]);
        assert!(out.contains("0x0025 (PORTB) = 0x01"), "{out}");
        assert_eq!(m.mem.read_raw(0x25), 1);
    }

    #[test]
    fn test_denied_and_out_of_range() {
        let (out, _, _) = run(&["w 0x10 1", "d 0x900 1", "p 0x7FFF 2"]);
        assert!(out.contains("not permitted in the register file region"), "{out}");
        assert_eq!(out.matches("outside the addressable space").count(), 2, "{out}");
    }

    #[test]
    fn test_missing_argument_prompt_abandons_on_silence() {
        let (out, _, _) = run(&["w"]);
        assert!(out.contains("address: abandoned"), "{out}");
    }

    #[test]
    fn test_missing_argument_prompt_accepts_number() {
        let (out, m, _) = run(&["w", "0x300", "0x7E"]);
        assert!(out.contains("0x0300 = 0x7E"), "{out}");
        assert_eq!(m.mem.read_raw(0x300), 0x7E);
    }

    #[test]
    fn test_set_and_show() {
        let (out, _, snap) = run(&["set r16 0x55", "set sreg 0x80", "show"]);
        assert_eq!(snap.r[16], 0x55);
        assert_eq!(snap.sreg, 0x80);
        assert!(out.contains("R16=55"), "{out}");
        assert!(out.contains("SREG=Ithsvnzc"), "{out}");
    }

    #[test]
    fn test_capture_shows_registers() {
        let mut m = Machine::new(Chip::Atmega328p);
        m.mem.set_reg(3, 0x33);
        let (out, _, snap) = run_with(m, &["r"]);
        assert_eq!(snap.r[3], 0x33);
        assert!(out.contains("R3 =33"), "{out}");
    }

    #[test]
    fn test_jump_runs_target_with_snapshot() {
        let mut m = Machine::new(Chip::Atmega328p).with_step_limit(10_000);
        m.place(0x0100, [Instruction::Sts { k: 0x0400, r: 20 }, Instruction::Break]);
        let (out, m, _) = run_with(m, &["set r20 0x99", "j 0x100", "y"]);
        assert!(out.contains("halted at 0x0102w"), "{out}");
        assert_eq!(m.mem.read_raw(0x0400), 0x99);
    }

    #[test]
    fn test_call_returns() {
        let mut m = Machine::new(Chip::Atmega328p).with_step_limit(10_000);
        m.place(0x0100, [Instruction::Inc { d: 20 }, Instruction::Ret]);
        let (out, _, _) = run_with(m, &["c 0x100", "yes", "r"]);
        assert!(out.contains("returned from 0x0100w"), "{out}");
        // the register file after the call is the snapshot with r20 bumped
        assert!(out.contains("R20=01"), "{out}");
    }

    #[test]
    fn test_jump_confirmation_times_out() {
        let (out, m, _) = run(&["j 0x100"]);
        assert!(out.contains("timed out waiting for input"), "{out}");
        assert!(m.interrupts().is_empty());
    }

    #[test]
    fn test_jump_fault_is_reported() {
        // erased flash
        let (out, _, _) = run(&["j 0x1000", "y"]);
        assert!(out.contains("unknown opcode 0xFFFF"), "{out}");
    }

    #[test]
    fn test_capture_works_after_faulted_jump() {
        let mut m = Machine::new(Chip::Atmega328p).with_step_limit(10_000);
        // pushes until the stack leaves SRAM
        m.place(0x0100, [Instruction::Push { r: 0 }, Instruction::Rjmp { k: -2 }]);
        let (out, m, snap) = run_with(m, &["set r7 0x77", "j 0x100", "y", "r"]);
        assert!(out.contains("stack pointer 0x00FF left SRAM"), "{out}");
        assert_eq!(out.matches("error:").count(), 1, "{out}");
        assert_eq!(snap.r[7], 0x77);
        assert_eq!(m.cpu.sp, m.memory_map().data.end);
    }

    #[test]
    fn test_bad_command_keeps_going() {
        let (out, _, _) = run(&["frob", "regions", "q", "show"]);
        assert!(out.contains("unknown command `frob`"), "{out}");
        assert!(out.contains("registers  0x0000-0x001F"), "{out}");
        assert!(!out.contains("SREG="), "{out}");
    }
}
