//! Hex + ASCII memory dumps.

use std::fmt::Write;

use avrmon_core::{Chip, MemoryMap};

/// Sixteen bytes per row, split in two groups of eight, with the address of
/// the first byte and an ASCII column. Rows are aligned to 16-byte
/// boundaries; bytes before `start` on the first row are left blank.
pub fn format_dump(start: u16, bytes: &[u8]) -> String {
    let mut s = String::new();
    let start = start as usize;
    let end = start + bytes.len();
    let mut row = start & !0xF;
    while row < end {
        let _ = write!(s, "{:04X}: ", row);
        for addr in row..row + 16 {
            if (start..end).contains(&addr) {
                let _ = write!(s, "{:02X} ", bytes[addr - start]);
            } else {
                s.push_str("   ");
            }
            if addr == row + 7 {
                s.push(' ');
            }
        }
        s.push(' ');
        for addr in row..row + 16 {
            s.push(match bytes.get(addr.wrapping_sub(start)) {
                Some(&c) if addr >= start && (0x20..0x7F).contains(&c) => c as char,
                Some(_) if addr >= start => '.',
                _ => ' ',
            });
        }
        s.truncate(s.trim_end().len());
        s.push('\n');
        row += 16;
    }
    s
}

/// The memory map, one region per line.
pub fn format_regions(chip: Chip, map: &MemoryMap) -> String {
    format!(
        "{chip}\n\
         registers  {}  not addressable\n\
         io         {}  read/write after confirmation\n\
         data       {}  read/write\n\
         code       {}  read; jump/call after confirmation (words 0x{:04X}-0x{:04X})\n",
        map.registers,
        map.io,
        map.data,
        map.code,
        map.code.start / 2,
        map.code.end / 2,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_row() {
        let bytes: Vec<u8> = (0x40..0x50).collect();
        let out = format_dump(0x0200, &bytes);
        assert_eq!(
            out,
            "0200: 40 41 42 43 44 45 46 47  48 49 4A 4B 4C 4D 4E 4F  @ABCDEFGHIJKLMNO\n"
        );
    }

    #[test]
    fn test_unaligned_start() {
        let out = format_dump(0x0203, &[0x00, 0x41]);
        assert_eq!(out, "0200:          00 41                                       .A\n");
    }

    #[test]
    fn test_rows() {
        let out = format_dump(0x0100, &[0u8; 40]);
        assert_eq!(out.lines().count(), 3);
        assert!(out.lines().nth(2).unwrap().starts_with("0120: 00 00"));
    }

    #[test]
    fn test_regions() {
        let out = format_regions(Chip::Atmega328p, &MemoryMap::ATMEGA328P);
        assert!(out.starts_with("atmega328p\n"));
        assert!(out.contains("data       0x0100-0x08FF"));
        assert!(out.contains("words 0x0000-0x3FFF"));
    }
}
