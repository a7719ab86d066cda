//! Intel HEX loader.
//!
//! Puts a program image (`:LLAAAATT[DD...]CC` records) into flash so the
//! operator has code to call or jump to. Record types 00 (data), 01 (EOF),
//! 02 (extended segment address) and 04 (extended linear address) are
//! honoured; start-address records (03, 05) are accepted and ignored.
//!
//! Unlike a best-effort loader, anything that would leave flash holding a
//! different image than the file describes is an error.

use tracing::debug;

use crate::error::{Error, Result};

/// Longest record: count + address (2) + type + 255 data bytes + checksum.
const MAX_RECORD: usize = 1 + 2 + 1 + 255 + 1;

/// Summary of a loaded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HexImage {
    /// One past the highest byte written
    pub end: usize,
    /// Data bytes written
    pub bytes: usize,
}

/// Parse Intel HEX text into `flash`.
pub fn load_hex(text: &str, flash: &mut [u8]) -> Result<HexImage> {
    let mut image = HexImage::default();
    let mut base: u32 = 0;
    let mut buf = [0u8; MAX_RECORD];

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let err = |reason| Error::InvalidHex { line, reason };
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let body = raw.strip_prefix(':').ok_or(err("missing ':' start code"))?;
        let rec = decode_record(body, &mut buf).map_err(err)?;
        if rec.len() < 5 {
            return Err(err("record too short"));
        }
        let count = rec[0] as usize;
        if rec.len() != count + 5 {
            return Err(err("byte count does not match record length"));
        }
        if rec.iter().fold(0u8, |acc, &b| acc.wrapping_add(b)) != 0 {
            return Err(err("checksum mismatch"));
        }
        let offset = u16::from_be_bytes([rec[1], rec[2]]) as u32;
        let data = &rec[4..4 + count];

        match rec[3] {
            0x00 => {
                // bounds checked wide first; usize is 16 bits on the device
                let start = base + offset;
                if start as u64 + count as u64 > flash.len() as u64 {
                    return Err(err("data past end of flash"));
                }
                let start = start as usize;
                let end = start + count;
                flash[start..end].copy_from_slice(data);
                image.end = image.end.max(end);
                image.bytes += count;
            }
            0x01 => break,
            0x02 | 0x04 if count != 2 => return Err(err("address record must carry two bytes")),
            0x02 => base = (u16::from_be_bytes([data[0], data[1]]) as u32) << 4,
            0x04 => base = (u16::from_be_bytes([data[0], data[1]]) as u32) << 16,
            0x03 | 0x05 => {}
            _ => return Err(err("unknown record type")),
        }
    }

    debug!(end = image.end, bytes = image.bytes, "hex image loaded");
    Ok(image)
}

/// Decode hex digit pairs into `buf`, returning the filled prefix.
fn decode_record<'a>(body: &str, buf: &'a mut [u8; MAX_RECORD]) -> core::result::Result<&'a [u8], &'static str> {
    let digits = body.as_bytes();
    if digits.len() % 2 != 0 {
        return Err("odd number of hex digits");
    }
    let n = digits.len() / 2;
    if n > MAX_RECORD {
        return Err("record too long");
    }
    for (i, pair) in digits.chunks_exact(2).enumerate() {
        buf[i] = (nibble(pair[0])? << 4) | nibble(pair[1])?;
    }
    Ok(&buf[..n])
}

fn nibble(c: u8) -> core::result::Result<u8, &'static str> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err("invalid hex digit"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VECTORS: &str = ":100000000C9434000C944E000C944E000C944E0052\n:00000001FF\n";

    #[test]
    fn test_load_simple() {
        let mut flash = vec![0u8; 32768];
        let img = load_hex(VECTORS, &mut flash).unwrap();
        assert_eq!(img, HexImage { end: 16, bytes: 16 });
        assert_eq!(&flash[..6], &[0x0C, 0x94, 0x34, 0x00, 0x0C, 0x94]);
    }

    #[test]
    fn test_checksum_error_names_line() {
        let hex = ":00000001FF\n:100000000C9434000C944E000C944E000C944E00FF\n";
        let mut flash = vec![0u8; 32768];
        // EOF on line 1 stops before the bad record
        assert!(load_hex(hex, &mut flash).is_ok());
        let hex = "\n:100000000C9434000C944E000C944E000C944E00FF\n";
        assert_eq!(
            load_hex(hex, &mut flash),
            Err(Error::InvalidHex { line: 2, reason: "checksum mismatch" })
        );
    }

    #[test]
    fn test_extended_linear_address() {
        // base 0x0001_0000 is beyond a 32 KB part
        let hex = ":020000040001F9\n:0100000055AA\n:00000001FF\n";
        let mut flash = vec![0u8; 32768];
        assert_eq!(
            load_hex(hex, &mut flash),
            Err(Error::InvalidHex { line: 2, reason: "data past end of flash" })
        );
    }

    #[test]
    fn test_bounds_checked_before_narrowing() {
        // base 0x0001_0000 would wrap to 0 if narrowed to 16 bits first
        let hex = ":020000040001F9\n:0100000055AA\n";
        let mut flash = vec![0u8; 0x100];
        assert_eq!(
            load_hex(hex, &mut flash),
            Err(Error::InvalidHex { line: 2, reason: "data past end of flash" })
        );
        assert_eq!(flash[0], 0);
    }

    #[test]
    fn test_segment_address() {
        // base 0x10 << 4 = 0x100
        let hex = ":020000020010EC\n:0100000055AA\n:00000001FF\n";
        let mut flash = vec![0u8; 32768];
        let img = load_hex(hex, &mut flash).unwrap();
        assert_eq!(flash[0x100], 0x55);
        assert_eq!(img.end, 0x101);
    }

    #[test]
    fn test_malformed_records() {
        let mut flash = vec![0u8; 64];
        assert!(matches!(load_hex("00000001FF", &mut flash), Err(Error::InvalidHex { line: 1, .. })));
        assert!(matches!(load_hex(":0000001FF", &mut flash), Err(Error::InvalidHex { .. })));
        assert!(matches!(load_hex(":0G000001FF", &mut flash), Err(Error::InvalidHex { .. })));
        // count says 2, one data byte present
        assert!(matches!(load_hex(":0200000055A9", &mut flash), Err(Error::InvalidHex { .. })));
    }

    #[test]
    fn test_empty_image() {
        let mut flash = vec![0u8; 64];
        assert_eq!(load_hex(":00000001FF\n", &mut flash).unwrap(), HexImage::default());
    }
}
