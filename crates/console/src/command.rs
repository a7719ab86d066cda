//! Command-line parsing for the console.
//!
//! One command per line. Arguments the operator leaves out are prompted for
//! by the session, so most of them are optional here.

use anyhow::{anyhow, bail, Context};
use avrmon_core::input::parse_number;
use avrmon_core::regs::RegName;

/// Default length of a memory dump.
pub const DEFAULT_DUMP_LEN: u16 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Capture the CPU registers into the session snapshot
    Capture,
    /// Print the snapshot
    Show,
    Set { reg: RegName, value: Option<u8> },
    DumpData { addr: Option<u16>, len: u16 },
    DumpProgram { addr: Option<u16>, len: u16 },
    Write { addr: Option<u16>, value: Option<u8> },
    /// Restore and jump to a word address
    Jump { word: Option<u16> },
    /// Restore and call a word address
    Call { word: Option<u16> },
    Regions,
    Help,
    Quit,
    Empty,
}

pub const HELP: &str = "\
commands:
  r                  capture registers and show them
  show               show the snapshot
  set <reg> <val>    change r0..r31 or sreg in the snapshot
  d <addr> [len]     dump data memory
  p <addr> [len]     dump program memory (byte address)
  w <addr> <val>     write a data byte and verify it
  j <word>           restore the snapshot and jump (does not return)
  c <word>           restore the snapshot and call (target must ret)
  regions            show the memory map
  help               this text
  q                  quit
numbers are decimal or 0x-prefixed hex";

fn number(arg: &str, what: &str) -> anyhow::Result<u32> {
    parse_number(arg).ok_or_else(|| anyhow!("{what}: `{arg}` is not a number"))
}

fn address(arg: Option<&str>) -> anyhow::Result<Option<u16>> {
    arg.map(|a| {
        let n = number(a, "address")?;
        u16::try_from(n).context("address must fit in 16 bits")
    })
    .transpose()
}

fn byte(arg: Option<&str>) -> anyhow::Result<Option<u8>> {
    arg.map(|a| {
        let n = number(a, "value")?;
        u8::try_from(n).context("value must fit in a byte")
    })
    .transpose()
}

fn length(arg: Option<&str>) -> anyhow::Result<u16> {
    match arg {
        None => Ok(DEFAULT_DUMP_LEN),
        Some(a) => {
            let n = number(a, "length")?;
            u16::try_from(n).ok().filter(|&n| n > 0).context("length must be 1..=65535")
        }
    }
}

pub fn parse(line: &str) -> anyhow::Result<Command> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(Command::Empty);
    };
    let a = words.next();
    let b = words.next();
    if let Some(extra) = words.next() {
        bail!("unexpected argument `{extra}`");
    }

    let cmd = match verb.to_ascii_lowercase().as_str() {
        "r" => Command::Capture,
        "show" => Command::Show,
        "set" => {
            let name = a.context("usage: set <reg> <val>")?;
            let reg = RegName::parse(name).ok_or_else(|| anyhow!("unknown register `{name}`"))?;
            Command::Set { reg, value: byte(b)? }
        }
        "d" => Command::DumpData { addr: address(a)?, len: length(b)? },
        "p" => Command::DumpProgram { addr: address(a)?, len: length(b)? },
        "w" => Command::Write { addr: address(a)?, value: byte(b)? },
        "j" => Command::Jump { word: address(a)? },
        "c" => Command::Call { word: address(a)? },
        "regions" => Command::Regions,
        "help" | "?" | "h" => Command::Help,
        "q" | "quit" | "exit" => Command::Quit,
        other => bail!("unknown command `{other}` (try `help`)"),
    };

    let takes = match cmd {
        Command::Capture | Command::Show | Command::Regions | Command::Help | Command::Quit => 0,
        Command::Jump { .. } | Command::Call { .. } => 1,
        _ => 2,
    };
    if (takes < 2 && b.is_some()) || (takes == 0 && a.is_some()) {
        bail!("`{verb}` takes {takes} argument(s)");
    }
    Ok(cmd)
}
