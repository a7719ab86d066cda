//! The three register transfer routines, defined once.
//!
//! Each routine exists twice: as an instruction sequence (placed in flash by
//! the host machine model) and as assembler text (emitted by the device
//! build). A listing test keeps the two identical. Placeholders in the text
//! are bound to the same named constants the sequences use:
//!
//! | Placeholder | Value                                  |
//! |-------------|----------------------------------------|
//! | `{slot}`    | [`STATUS_SLOT`], the snapshot's SREG index |
//! | `{sreg}`    | SREG, I/O address                      |
//! | `{gpior}`   | GPIOR0, I/O address                    |
//! | `{mask}`    | SREG with the I bit cleared            |
//! | `{ibit}`    | [`SREG_I`]                             |
//!
//! Calling convention (avr-gcc): the snapshot pointer arrives in r25:r24, the
//! target byte address in r23:r22.
//!
//! ## capture
//!
//! Z (r30:r31) is the only pointer register `std` with a displacement can use,
//! and Z is itself part of the register file. Z and the entry SREG are pushed
//! before Z is loaded with the buffer address, then popped into the buffer;
//! the snapshot holds the caller's Z, not the pointer. Every instruction used
//! leaves SREG alone, and Z and r0 are reloaded before returning.
//!
//! ## restore_and_transfer
//!
//! Never returns. The routine's own return address is popped and dropped, so
//! the stack at the target is the caller's stack before the call. Interrupts
//! are held off from the first instruction; SREG is restored with I clear and
//! I is raised by the `sei` directly in front of `ijmp`, and the instruction
//! after `sei` always runs before any interrupt is taken. `ijmp` consumes Z,
//! so r30:r31 arrive at the target holding its word address.
//!
//! ## restore_and_call
//!
//! For targets that return. The target address is pushed and reached through
//! `ret`; the target's own `ret` then pops the original return address. All
//! 32 registers and SREG reach the target from the snapshot.

use crate::opcodes::Instruction;
use crate::{GPIOR0_ADDR, SREG_ADDR, SREG_I, STATUS_SLOT};

const SLOT: u8 = STATUS_SLOT as u8;
const SREG: u8 = SREG_ADDR as u8;
const GPIOR0: u8 = GPIOR0_ADDR as u8;
const SREG_WITHOUT_I: u8 = !(1 << SREG_I);

/// Which routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routine {
    Capture,
    RestoreAndTransfer,
    RestoreAndCall,
}

impl Routine {
    pub const ALL: [Routine; 3] = [Routine::Capture, Routine::RestoreAndTransfer, Routine::RestoreAndCall];

    /// Feed the routine's instructions to `f`, in order.
    pub fn emit(self, f: impl FnMut(Instruction)) {
        match self {
            Routine::Capture => capture().for_each(f),
            Routine::RestoreAndTransfer => restore_and_transfer().for_each(f),
            Routine::RestoreAndCall => restore_and_call().for_each(f),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Routine::Capture => "capture",
            Routine::RestoreAndTransfer => "restore_and_transfer",
            Routine::RestoreAndCall => "restore_and_call",
        }
    }
}

/// Load SREG from the snapshot with I held clear, parking the full byte in
/// GPIOR0 for the final decision. Leaves Z pointing at the snapshot.
fn restore_prelude() -> impl Iterator<Item = Instruction> + Clone {
    [
        Instruction::Movw { d: 30, r: 24 },
        Instruction::LdZQ { d: 16, q: SLOT },
        Instruction::Out { a: GPIOR0, r: 16 },
        Instruction::Andi { d: 16, k: SREG_WITHOUT_I },
        Instruction::Out { a: SREG, r: 16 },
    ]
    .into_iter()
}

/// Convert the byte address in r23:r22 to a word address and push it.
fn push_target() -> impl Iterator<Item = Instruction> + Clone {
    [
        Instruction::Lsr { d: 23 },
        Instruction::Ror { d: 22 },
        Instruction::Push { r: 22 },
        Instruction::Push { r: 23 },
    ]
    .into_iter()
}

/// `sei` only if the snapshot had I set. The skip reads GPIOR0, so no
/// register is needed once the file is restored.
fn raise_i_if_set() -> impl Iterator<Item = Instruction> + Clone {
    [Instruction::Sbic { a: GPIOR0, b: SREG_I }, Instruction::Sei].into_iter()
}

pub fn capture() -> impl Iterator<Item = Instruction> + Clone {
    [
        Instruction::Push { r: 30 },
        Instruction::Push { r: 31 },
        Instruction::In { d: 30, a: SREG },
        Instruction::Push { r: 30 },
        Instruction::Movw { d: 30, r: 24 },
    ]
    .into_iter()
    .chain((0..30).map(|i| Instruction::StZQ { r: i, q: i }))
    .chain([
        Instruction::Pop { d: 0 },
        Instruction::StZQ { r: 0, q: SLOT },
        Instruction::Pop { d: 0 },
        Instruction::StZQ { r: 0, q: 31 },
        Instruction::Pop { d: 0 },
        Instruction::StZQ { r: 0, q: 30 },
        Instruction::LdZQ { d: 0, q: 30 },
        Instruction::Push { r: 0 },
        Instruction::LdZQ { d: 0, q: 31 },
        Instruction::Push { r: 0 },
        Instruction::LdZQ { d: 0, q: 0 },
        Instruction::Pop { d: 31 },
        Instruction::Pop { d: 30 },
        Instruction::Ret,
    ])
}

pub fn restore_and_transfer() -> impl Iterator<Item = Instruction> + Clone {
    [Instruction::Cli, Instruction::Pop { d: 0 }, Instruction::Pop { d: 0 }]
        .into_iter()
        .chain(push_target())
        .chain(restore_prelude())
        .chain((0..30).map(|i| Instruction::LdZQ { d: i, q: i }))
        .chain([Instruction::Pop { d: 31 }, Instruction::Pop { d: 30 }])
        .chain(raise_i_if_set())
        .chain([Instruction::Ijmp])
}

pub fn restore_and_call() -> impl Iterator<Item = Instruction> + Clone {
    [Instruction::Cli]
        .into_iter()
        .chain(push_target())
        .chain(restore_prelude())
        .chain((1..30).map(|i| Instruction::LdZQ { d: i, q: i }))
        .chain([
            Instruction::LdZQ { d: 0, q: 31 },
            Instruction::Push { r: 0 },
            Instruction::LdZQ { d: 0, q: 30 },
            Instruction::Push { r: 0 },
            Instruction::LdZQ { d: 0, q: 0 },
            Instruction::Pop { d: 30 },
            Instruction::Pop { d: 31 },
        ])
        .chain(raise_i_if_set())
        .chain([Instruction::Ret])
}

#[allow(unused_macros)]
macro_rules! capture_asm {
    () => {
        concat!(
            "push r30\n",
            "push r31\n",
            "in r30, {sreg}\n",
            "push r30\n",
            "movw r30, r24\n",
            "std Z+0, r0\n",
            "std Z+1, r1\n",
            "std Z+2, r2\n",
            "std Z+3, r3\n",
            "std Z+4, r4\n",
            "std Z+5, r5\n",
            "std Z+6, r6\n",
            "std Z+7, r7\n",
            "std Z+8, r8\n",
            "std Z+9, r9\n",
            "std Z+10, r10\n",
            "std Z+11, r11\n",
            "std Z+12, r12\n",
            "std Z+13, r13\n",
            "std Z+14, r14\n",
            "std Z+15, r15\n",
            "std Z+16, r16\n",
            "std Z+17, r17\n",
            "std Z+18, r18\n",
            "std Z+19, r19\n",
            "std Z+20, r20\n",
            "std Z+21, r21\n",
            "std Z+22, r22\n",
            "std Z+23, r23\n",
            "std Z+24, r24\n",
            "std Z+25, r25\n",
            "std Z+26, r26\n",
            "std Z+27, r27\n",
            "std Z+28, r28\n",
            "std Z+29, r29\n",
            "pop r0\n",
            "std Z+{slot}, r0\n",
            "pop r0\n",
            "std Z+31, r0\n",
            "pop r0\n",
            "std Z+30, r0\n",
            "ldd r0, Z+30\n",
            "push r0\n",
            "ldd r0, Z+31\n",
            "push r0\n",
            "ldd r0, Z+0\n",
            "pop r31\n",
            "pop r30\n",
            "ret\n",
        )
    };
}

#[allow(unused_macros)]
macro_rules! restore_and_transfer_asm {
    () => {
        concat!(
            "cli\n",
            "pop r0\n",
            "pop r0\n",
            "lsr r23\n",
            "ror r22\n",
            "push r22\n",
            "push r23\n",
            "movw r30, r24\n",
            "ldd r16, Z+{slot}\n",
            "out {gpior}, r16\n",
            "andi r16, {mask}\n",
            "out {sreg}, r16\n",
            "ldd r0, Z+0\n",
            "ldd r1, Z+1\n",
            "ldd r2, Z+2\n",
            "ldd r3, Z+3\n",
            "ldd r4, Z+4\n",
            "ldd r5, Z+5\n",
            "ldd r6, Z+6\n",
            "ldd r7, Z+7\n",
            "ldd r8, Z+8\n",
            "ldd r9, Z+9\n",
            "ldd r10, Z+10\n",
            "ldd r11, Z+11\n",
            "ldd r12, Z+12\n",
            "ldd r13, Z+13\n",
            "ldd r14, Z+14\n",
            "ldd r15, Z+15\n",
            "ldd r16, Z+16\n",
            "ldd r17, Z+17\n",
            "ldd r18, Z+18\n",
            "ldd r19, Z+19\n",
            "ldd r20, Z+20\n",
            "ldd r21, Z+21\n",
            "ldd r22, Z+22\n",
            "ldd r23, Z+23\n",
            "ldd r24, Z+24\n",
            "ldd r25, Z+25\n",
            "ldd r26, Z+26\n",
            "ldd r27, Z+27\n",
            "ldd r28, Z+28\n",
            "ldd r29, Z+29\n",
            "pop r31\n",
            "pop r30\n",
            "sbic {gpior}, {ibit}\n",
            "sei\n",
            "ijmp\n",
        )
    };
}

#[allow(unused_macros)]
macro_rules! restore_and_call_asm {
    () => {
        concat!(
            "cli\n",
            "lsr r23\n",
            "ror r22\n",
            "push r22\n",
            "push r23\n",
            "movw r30, r24\n",
            "ldd r16, Z+{slot}\n",
            "out {gpior}, r16\n",
            "andi r16, {mask}\n",
            "out {sreg}, r16\n",
            "ldd r1, Z+1\n",
            "ldd r2, Z+2\n",
            "ldd r3, Z+3\n",
            "ldd r4, Z+4\n",
            "ldd r5, Z+5\n",
            "ldd r6, Z+6\n",
            "ldd r7, Z+7\n",
            "ldd r8, Z+8\n",
            "ldd r9, Z+9\n",
            "ldd r10, Z+10\n",
            "ldd r11, Z+11\n",
            "ldd r12, Z+12\n",
            "ldd r13, Z+13\n",
            "ldd r14, Z+14\n",
            "ldd r15, Z+15\n",
            "ldd r16, Z+16\n",
            "ldd r17, Z+17\n",
            "ldd r18, Z+18\n",
            "ldd r19, Z+19\n",
            "ldd r20, Z+20\n",
            "ldd r21, Z+21\n",
            "ldd r22, Z+22\n",
            "ldd r23, Z+23\n",
            "ldd r24, Z+24\n",
            "ldd r25, Z+25\n",
            "ldd r26, Z+26\n",
            "ldd r27, Z+27\n",
            "ldd r28, Z+28\n",
            "ldd r29, Z+29\n",
            "ldd r0, Z+31\n",
            "push r0\n",
            "ldd r0, Z+30\n",
            "push r0\n",
            "ldd r0, Z+0\n",
            "pop r30\n",
            "pop r31\n",
            "sbic {gpior}, {ibit}\n",
            "sei\n",
            "ret\n",
        )
    };
}

#[allow(unused_imports)]
pub(crate) use {capture_asm, restore_and_call_asm, restore_and_transfer_asm};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IO_OFFSET, ROUTINE_STACK_DEPTH, SNAPSHOT_LEN};

    /// Bind the placeholders the way the device build does, in the
    /// disassembler's number format.
    fn bind(template: &str) -> Vec<String> {
        template
            .replace("{slot}", &STATUS_SLOT.to_string())
            .replace("{sreg}", &format!("0x{:02x}", SREG_ADDR - IO_OFFSET))
            .replace("{gpior}", &format!("0x{:02x}", GPIOR0_ADDR - IO_OFFSET))
            .replace("{mask}", &format!("0x{:02x}", SREG_WITHOUT_I))
            .replace("{ibit}", &SREG_I.to_string())
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect()
    }

    fn listing(seq: impl Iterator<Item = Instruction>) -> Vec<String> {
        seq.map(|i| i.to_string()).collect()
    }

    #[test]
    fn test_capture_listing_matches_sequence() {
        assert_eq!(bind(capture_asm!()), listing(capture()));
    }

    #[test]
    fn test_transfer_listing_matches_sequence() {
        assert_eq!(bind(restore_and_transfer_asm!()), listing(restore_and_transfer()));
    }

    #[test]
    fn test_call_listing_matches_sequence() {
        assert_eq!(bind(restore_and_call_asm!()), listing(restore_and_call()));
    }

    #[test]
    fn test_capture_writes_every_slot_once() {
        let mut written = [0u8; SNAPSHOT_LEN];
        for inst in capture() {
            if let Instruction::StZQ { q, .. } = inst {
                written[q as usize] += 1;
            }
        }
        assert!(written.iter().all(|&n| n == 1), "slots written: {:?}", written);
    }

    #[test]
    fn test_transfer_ends_with_sei_ijmp() {
        let seq: Vec<_> = restore_and_transfer().collect();
        let n = seq.len();
        assert_eq!(seq[0], Instruction::Cli);
        assert_eq!(&seq[n - 3..], &[
            Instruction::Sbic { a: GPIOR0, b: SREG_I },
            Instruction::Sei,
            Instruction::Ijmp,
        ]);
        // no stack return anywhere in the jump path
        assert!(!seq.iter().any(|i| matches!(i, Instruction::Ret | Instruction::Reti)));
    }

    #[test]
    fn test_restore_pushes_balance() {
        // restore_and_call: two pushes for the target survive to the final ret
        let pushes = restore_and_call().filter(|i| matches!(i, Instruction::Push { .. })).count();
        let pops = restore_and_call().filter(|i| matches!(i, Instruction::Pop { .. })).count();
        assert_eq!(pushes, pops + 2);
        // restore_and_transfer: drops the return address, pushes and pops the target
        let pushes = restore_and_transfer().filter(|i| matches!(i, Instruction::Push { .. })).count();
        let pops = restore_and_transfer().filter(|i| matches!(i, Instruction::Pop { .. })).count();
        assert_eq!(pops, pushes + 2);
    }

    #[test]
    fn test_stack_depth_fits_reserved_headroom() {
        for routine in Routine::ALL {
            let (mut depth, mut deepest) = (0i32, 0i32);
            routine.emit(|inst| {
                match inst {
                    Instruction::Push { .. } => depth += 1,
                    Instruction::Pop { .. } => depth -= 1,
                    _ => {}
                }
                deepest = deepest.max(depth);
            });
            // plus the caller's return address
            assert!(deepest + 2 <= ROUTINE_STACK_DEPTH as i32, "{}", routine.name());
        }
    }
}
