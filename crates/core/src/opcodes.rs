//! AVR instruction subset.
//!
//! The register transfer routines are written in this subset, and the host
//! machine model executes it. Three views of one [`Instruction`]:
//!
//! - [`decode`]: 16-bit (and 32-bit) instruction words to the typed enum
//! - [`encode`]: the reverse, used to place routines and test programs in flash
//! - `Display`: avr-as syntax, matching the listing the device build assembles
//!
//! Register fields `d` and `r` are 0–31, `k` is an immediate or an address,
//! and `a` is an I/O register given as its data-space address (I/O address
//! plus 0x20), as the decoder produces it.

use core::fmt;

use crate::IO_OFFSET;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Nop,
    Break,
    // Arithmetic / logic
    Eor { d: u8, r: u8 },
    Inc { d: u8 },
    Dec { d: u8 },
    Andi { d: u8, k: u8 },
    Ori { d: u8, k: u8 },
    Lsr { d: u8 },
    Ror { d: u8 },
    // Data transfer
    Mov { d: u8, r: u8 },
    Movw { d: u8, r: u8 },
    Ldi { d: u8, k: u8 },
    Lds { d: u8, k: u16 },
    Sts { k: u16, r: u8 },
    /// `ldd Rd, Z+q` (q = 0 is plain `ld Rd, Z`)
    LdZQ { d: u8, q: u8 },
    /// `std Z+q, Rr`
    StZQ { r: u8, q: u8 },
    // Stack
    Push { r: u8 },
    Pop { d: u8 },
    // Skips
    Sbrc { r: u8, b: u8 },
    Sbrs { r: u8, b: u8 },
    Sbic { a: u8, b: u8 },
    Sbis { a: u8, b: u8 },
    // Branch
    Rjmp { k: i16 },
    Rcall { k: i16 },
    Jmp { k: u16 },
    Call { k: u16 },
    Ijmp,
    Icall,
    Ret,
    Reti,
    // I/O
    In { d: u8, a: u8 },
    Out { a: u8, r: u8 },
    // Status register
    Sei,
    Cli,
    Unknown(u16),
}

impl Instruction {
    /// Size in 16-bit words.
    pub fn size(&self) -> u8 {
        match self {
            Instruction::Lds { .. }
            | Instruction::Sts { .. }
            | Instruction::Jmp { .. }
            | Instruction::Call { .. } => 2,
            _ => 1,
        }
    }
}

/// True if `word` is the first word of a two-word instruction.
#[inline]
pub fn is_two_word(word: u16) -> bool {
    (word & 0xFE0E == 0x940C) || (word & 0xFE0E == 0x940E)
        || (word & 0xFE0F == 0x9000) || (word & 0xFE0F == 0x9200)
}

/// Decode a 16-bit instruction word (with the next word for 32-bit instructions).
/// Returns (Instruction, size_in_words)
pub fn decode(word: u16, next_word: u16) -> (Instruction, u8) {
    // JMP/CALL: only the 16-bit address form exists on 32 KB parts
    if word & 0xFE0E == 0x940C {
        return (Instruction::Jmp { k: next_word }, 2);
    }
    if word & 0xFE0E == 0x940E {
        return (Instruction::Call { k: next_word }, 2);
    }
    // LDS Rd,k: 1001 000d dddd 0000 kkkk kkkk kkkk kkkk
    if word & 0xFE0F == 0x9000 {
        let d = ((word >> 4) & 0x1F) as u8;
        return (Instruction::Lds { d, k: next_word }, 2);
    }
    // STS k,Rr: 1001 001d dddd 0000 kkkk kkkk kkkk kkkk
    if word & 0xFE0F == 0x9200 {
        let r = ((word >> 4) & 0x1F) as u8;
        return (Instruction::Sts { k: next_word, r }, 2);
    }

    match word {
        0x0000 => return (Instruction::Nop, 1),
        0x9598 => return (Instruction::Break, 1),
        0x9508 => return (Instruction::Ret, 1),
        0x9518 => return (Instruction::Reti, 1),
        0x9409 => return (Instruction::Ijmp, 1),
        0x9509 => return (Instruction::Icall, 1),
        0x9478 => return (Instruction::Sei, 1),
        0x94F8 => return (Instruction::Cli, 1),
        _ => {}
    }

    let d_r = ((word >> 4) & 0x1F) as u8;
    match word >> 12 {
        0x0 if word & 0xFF00 == 0x0100 => {
            // MOVW: 0000 0001 dddd rrrr
            let d = (((word >> 4) & 0xF) * 2) as u8;
            let r = ((word & 0xF) * 2) as u8;
            (Instruction::Movw { d, r }, 1)
        }
        0x2 if word & 0xFC00 == 0x2400 => {
            let (d, r) = decode_5_5(word);
            (Instruction::Eor { d, r }, 1)
        }
        0x2 if word & 0xFC00 == 0x2C00 => {
            let (d, r) = decode_5_5(word);
            (Instruction::Mov { d, r }, 1)
        }
        0x6 => {
            let (d, k) = decode_4_8(word);
            (Instruction::Ori { d: d + 16, k }, 1)
        }
        0x7 => {
            let (d, k) = decode_4_8(word);
            (Instruction::Andi { d: d + 16, k }, 1)
        }
        // LDD/STD with displacement; only the Z forms (bit 3 clear) are in the subset
        0x8 | 0xA if word & 0x0008 == 0 => {
            let q = ((((word >> 13) & 1) << 5) | (((word >> 10) & 3) << 3) | (word & 7)) as u8;
            if word & 0x0200 == 0 {
                (Instruction::LdZQ { d: d_r, q }, 1)
            } else {
                (Instruction::StZQ { r: d_r, q }, 1)
            }
        }
        0x9 => decode_1001(word),
        0xB => {
            let a = ((((word >> 9) & 3) << 4) | (word & 0xF)) as u8 + IO_OFFSET as u8;
            if word & 0x0800 == 0 {
                (Instruction::In { d: d_r, a }, 1)
            } else {
                (Instruction::Out { a, r: d_r }, 1)
            }
        }
        0xC => (Instruction::Rjmp { k: sign_extend_12(word & 0x0FFF) }, 1),
        0xD => (Instruction::Rcall { k: sign_extend_12(word & 0x0FFF) }, 1),
        0xE => {
            let (d, k) = decode_4_8(word);
            (Instruction::Ldi { d: d + 16, k }, 1)
        }
        0xF if word & 0xFE08 == 0xFC00 => (Instruction::Sbrc { r: d_r, b: (word & 7) as u8 }, 1),
        0xF if word & 0xFE08 == 0xFE00 => (Instruction::Sbrs { r: d_r, b: (word & 7) as u8 }, 1),
        _ => (Instruction::Unknown(word), 1),
    }
}

/// Decode 1001 xxxx instructions
fn decode_1001(word: u16) -> (Instruction, u8) {
    let d_r = ((word >> 4) & 0x1F) as u8;

    // Single-register ops: 1001 010d dddd xxxx
    if word & 0xFE00 == 0x9400 {
        match word & 0x000F {
            0x3 => return (Instruction::Inc { d: d_r }, 1),
            0x6 => return (Instruction::Lsr { d: d_r }, 1),
            0x7 => return (Instruction::Ror { d: d_r }, 1),
            0xA => return (Instruction::Dec { d: d_r }, 1),
            _ => {}
        }
    }
    // POP: 1001 000d dddd 1111, PUSH: 1001 001r rrrr 1111
    if word & 0xFE0F == 0x900F {
        return (Instruction::Pop { d: d_r }, 1);
    }
    if word & 0xFE0F == 0x920F {
        return (Instruction::Push { r: d_r }, 1);
    }
    // SBIC/SBIS: 1001 10x1 AAAA Abbb
    let a = ((word >> 3) & 0x1F) as u8 + IO_OFFSET as u8;
    let b = (word & 7) as u8;
    match word & 0xFF00 {
        0x9900 => (Instruction::Sbic { a, b }, 1),
        0x9B00 => (Instruction::Sbis { a, b }, 1),
        _ => (Instruction::Unknown(word), 1),
    }
}

// --- Helper decoders ---

/// Decode 5-bit d, 5-bit r from: xxxx xxrd dddd rrrr
#[inline(always)]
fn decode_5_5(word: u16) -> (u8, u8) {
    let d = ((word >> 4) & 0x1F) as u8;
    let r = ((word & 0x0F) | ((word >> 5) & 0x10)) as u8;
    (d, r)
}

/// Decode 4-bit d (R16-R31 offset), 8-bit K from: xxxx KKKK dddd KKKK
#[inline(always)]
fn decode_4_8(word: u16) -> (u8, u8) {
    let d = ((word >> 4) & 0xF) as u8;
    let k = (((word >> 4) & 0xF0) | (word & 0x0F)) as u8;
    (d, k)
}

#[inline(always)]
fn sign_extend_12(v: u16) -> i16 {
    ((v << 4) as i16) >> 4
}

// --- Encoding ---

#[inline(always)]
fn encode_5_5(base: u16, d: u8, r: u8) -> u16 {
    base | (((r as u16) & 0x10) << 5) | ((d as u16 & 0x1F) << 4) | (r as u16 & 0x0F)
}

#[inline(always)]
fn encode_4_8(base: u16, d: u8, k: u8) -> u16 {
    base | (((k as u16) & 0xF0) << 4) | (((d as u16).wrapping_sub(16) & 0x0F) << 4) | (k as u16 & 0x0F)
}

#[inline(always)]
fn encode_zq(store: bool, reg: u8, q: u8) -> u16 {
    let q = q as u16 & 0x3F;
    0x8000 | ((q & 0x20) << 8) | ((q & 0x18) << 7) | ((store as u16) << 9) | ((reg as u16 & 0x1F) << 4) | (q & 7)
}

/// Encode an instruction into one or two words (second is `None` for 16-bit forms).
pub fn encode(inst: Instruction) -> (u16, Option<u16>) {
    let io = |a: u8| (a as u16).wrapping_sub(IO_OFFSET);
    let w = match inst {
        Instruction::Nop => 0x0000,
        Instruction::Break => 0x9598,
        Instruction::Eor { d, r } => encode_5_5(0x2400, d, r),
        Instruction::Mov { d, r } => encode_5_5(0x2C00, d, r),
        Instruction::Inc { d } => 0x9403 | ((d as u16) << 4),
        Instruction::Dec { d } => 0x940A | ((d as u16) << 4),
        Instruction::Lsr { d } => 0x9406 | ((d as u16) << 4),
        Instruction::Ror { d } => 0x9407 | ((d as u16) << 4),
        Instruction::Andi { d, k } => encode_4_8(0x7000, d, k),
        Instruction::Ori { d, k } => encode_4_8(0x6000, d, k),
        Instruction::Ldi { d, k } => encode_4_8(0xE000, d, k),
        Instruction::Movw { d, r } => 0x0100 | (((d as u16) / 2) << 4) | ((r as u16) / 2),
        Instruction::Lds { d, k } => return (0x9000 | ((d as u16) << 4), Some(k)),
        Instruction::Sts { k, r } => return (0x9200 | ((r as u16) << 4), Some(k)),
        Instruction::LdZQ { d, q } => encode_zq(false, d, q),
        Instruction::StZQ { r, q } => encode_zq(true, r, q),
        Instruction::Push { r } => 0x920F | ((r as u16) << 4),
        Instruction::Pop { d } => 0x900F | ((d as u16) << 4),
        Instruction::Sbrc { r, b } => 0xFC00 | ((r as u16) << 4) | (b as u16 & 7),
        Instruction::Sbrs { r, b } => 0xFE00 | ((r as u16) << 4) | (b as u16 & 7),
        Instruction::Sbic { a, b } => 0x9900 | ((io(a) & 0x1F) << 3) | (b as u16 & 7),
        Instruction::Sbis { a, b } => 0x9B00 | ((io(a) & 0x1F) << 3) | (b as u16 & 7),
        Instruction::Rjmp { k } => 0xC000 | (k as u16 & 0x0FFF),
        Instruction::Rcall { k } => 0xD000 | (k as u16 & 0x0FFF),
        Instruction::Jmp { k } => return (0x940C, Some(k)),
        Instruction::Call { k } => return (0x940E, Some(k)),
        Instruction::Ijmp => 0x9409,
        Instruction::Icall => 0x9509,
        Instruction::Ret => 0x9508,
        Instruction::Reti => 0x9518,
        Instruction::In { d, a } => {
            let a = io(a) & 0x3F;
            0xB000 | ((a & 0x30) << 5) | ((d as u16) << 4) | (a & 0x0F)
        }
        Instruction::Out { a, r } => {
            let a = io(a) & 0x3F;
            0xB800 | ((a & 0x30) << 5) | ((r as u16) << 4) | (a & 0x0F)
        }
        Instruction::Sei => 0x9478,
        Instruction::Cli => 0x94F8,
        Instruction::Unknown(w) => w,
    };
    (w, None)
}

impl fmt::Display for Instruction {
    /// avr-as syntax. I/O operands print as I/O-space addresses.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let io = |a: u8| a.wrapping_sub(IO_OFFSET as u8);
        match *self {
            Instruction::Nop => write!(f, "nop"),
            Instruction::Break => write!(f, "break"),
            Instruction::Eor { d, r } => write!(f, "eor r{}, r{}", d, r),
            Instruction::Inc { d } => write!(f, "inc r{}", d),
            Instruction::Dec { d } => write!(f, "dec r{}", d),
            Instruction::Andi { d, k } => write!(f, "andi r{}, 0x{:02x}", d, k),
            Instruction::Ori { d, k } => write!(f, "ori r{}, 0x{:02x}", d, k),
            Instruction::Lsr { d } => write!(f, "lsr r{}", d),
            Instruction::Ror { d } => write!(f, "ror r{}", d),
            Instruction::Mov { d, r } => write!(f, "mov r{}, r{}", d, r),
            Instruction::Movw { d, r } => write!(f, "movw r{}, r{}", d, r),
            Instruction::Ldi { d, k } => write!(f, "ldi r{}, 0x{:02x}", d, k),
            Instruction::Lds { d, k } => write!(f, "lds r{}, 0x{:04x}", d, k),
            Instruction::Sts { k, r } => write!(f, "sts 0x{:04x}, r{}", k, r),
            Instruction::LdZQ { d, q } => write!(f, "ldd r{}, Z+{}", d, q),
            Instruction::StZQ { r, q } => write!(f, "std Z+{}, r{}", q, r),
            Instruction::Push { r } => write!(f, "push r{}", r),
            Instruction::Pop { d } => write!(f, "pop r{}", d),
            Instruction::Sbrc { r, b } => write!(f, "sbrc r{}, {}", r, b),
            Instruction::Sbrs { r, b } => write!(f, "sbrs r{}, {}", r, b),
            Instruction::Sbic { a, b } => write!(f, "sbic 0x{:02x}, {}", io(a), b),
            Instruction::Sbis { a, b } => write!(f, "sbis 0x{:02x}, {}", io(a), b),
            Instruction::Rjmp { k } => write!(f, "rjmp .{:+}", k as i32 * 2),
            Instruction::Rcall { k } => write!(f, "rcall .{:+}", k as i32 * 2),
            Instruction::Jmp { k } => write!(f, "jmp 0x{:04x}", k as u32 * 2),
            Instruction::Call { k } => write!(f, "call 0x{:04x}", k as u32 * 2),
            Instruction::Ijmp => write!(f, "ijmp"),
            Instruction::Icall => write!(f, "icall"),
            Instruction::Ret => write!(f, "ret"),
            Instruction::Reti => write!(f, "reti"),
            Instruction::In { d, a } => write!(f, "in r{}, 0x{:02x}", d, io(a)),
            Instruction::Out { a, r } => write!(f, "out 0x{:02x}, r{}", io(a), r),
            Instruction::Sei => write!(f, "sei"),
            Instruction::Cli => write!(f, "cli"),
            Instruction::Unknown(w) => write!(f, ".word 0x{:04x}", w),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_one(inst: Instruction) -> Instruction {
        let (w, next) = encode(inst);
        let (out, size) = decode(w, next.unwrap_or(0));
        assert_eq!(size, inst.size());
        out
    }

    #[test]
    fn test_known_words() {
        assert_eq!(decode(0x9508, 0).0, Instruction::Ret);
        assert_eq!(decode(0x9409, 0).0, Instruction::Ijmp);
        assert_eq!(decode(0x9598, 0).0, Instruction::Break);
        // push r30 / pop r31
        assert_eq!(decode(0x93EF, 0).0, Instruction::Push { r: 30 });
        assert_eq!(decode(0x91FF, 0).0, Instruction::Pop { d: 31 });
        // in r30, 0x3f
        assert_eq!(decode(0xB7EF, 0).0, Instruction::In { d: 30, a: 0x5F });
        // movw r30, r24
        assert_eq!(decode(0x01FC, 0).0, Instruction::Movw { d: 30, r: 24 });
    }

    #[test]
    fn test_displacement_encoding() {
        // std Z+32, r0 = 10q0 qq1r rrrr 0qqq with q = 100000
        assert_eq!(encode(Instruction::StZQ { r: 0, q: 32 }).0, 0xA200);
        // ldd r29, Z+29 = q = 011101
        assert_eq!(encode(Instruction::LdZQ { d: 29, q: 29 }).0, 0x8DD5);
        for q in [0u8, 1, 7, 8, 31, 32, 63] {
            assert_eq!(decode_one(Instruction::StZQ { r: 5, q }), Instruction::StZQ { r: 5, q });
            assert_eq!(decode_one(Instruction::LdZQ { d: 17, q }), Instruction::LdZQ { d: 17, q });
        }
    }

    #[test]
    fn test_io_forms() {
        // sbic 0x1e, 7
        assert_eq!(encode(Instruction::Sbic { a: 0x3E, b: 7 }).0, 0x99F7);
        // out 0x3f, r16
        assert_eq!(encode(Instruction::Out { a: 0x5F, r: 16 }).0, 0xBF0F);
        assert_eq!(decode_one(Instruction::Out { a: 0x3E, r: 16 }), Instruction::Out { a: 0x3E, r: 16 });
        assert_eq!(decode_one(Instruction::In { d: 0, a: 0x5F }), Instruction::In { d: 0, a: 0x5F });
    }

    #[test]
    fn test_immediates_and_branches() {
        assert_eq!(encode(Instruction::Andi { d: 16, k: 0x7F }).0, 0x770F);
        assert_eq!(decode_one(Instruction::Ldi { d: 31, k: 0xA5 }), Instruction::Ldi { d: 31, k: 0xA5 });
        assert_eq!(decode_one(Instruction::Rjmp { k: -1 }), Instruction::Rjmp { k: -1 });
        assert_eq!(decode_one(Instruction::Rcall { k: 100 }), Instruction::Rcall { k: 100 });
        assert_eq!(decode_one(Instruction::Call { k: 0x3F00 }), Instruction::Call { k: 0x3F00 });
        assert_eq!(decode_one(Instruction::Sts { k: 0x0123, r: 9 }), Instruction::Sts { k: 0x0123, r: 9 });
        assert_eq!(decode_one(Instruction::Eor { d: 1, r: 1 }), Instruction::Eor { d: 1, r: 1 });
        assert_eq!(decode_one(Instruction::Mov { d: 20, r: 31 }), Instruction::Mov { d: 20, r: 31 });
    }

    #[test]
    fn test_display() {
        assert_eq!(Instruction::StZQ { r: 0, q: 32 }.to_string(), "std Z+32, r0");
        assert_eq!(Instruction::In { d: 30, a: 0x5F }.to_string(), "in r30, 0x3f");
        assert_eq!(Instruction::Sbic { a: 0x3E, b: 7 }.to_string(), "sbic 0x1e, 7");
        assert_eq!(Instruction::Andi { d: 16, k: 0x7F }.to_string(), "andi r16, 0x7f");
    }

    #[test]
    fn test_two_word_detection() {
        assert!(is_two_word(encode(Instruction::Lds { d: 1, k: 0x100 }).0));
        assert!(is_two_word(encode(Instruction::Jmp { k: 0 }).0));
        assert!(!is_two_word(encode(Instruction::Ret).0));
    }
}
