//! # Checksum Engine
//!
//! Fixed-width integrity codes. None of them correct anything; a mismatch is
//! reported to the caller, which decides whether to drop the oligo, fall back
//! on replicates or fail the chunk.
//!
//! | Code  | Polynomial | Init   | Used for                          |
//! |-------|------------|--------|-----------------------------------|
//! | CRC-8 | 0x07       | 0x00   | 68-bit oligo header field block   |
//! | CRC-16| 0x1021     | 0xFFFF | file manifest (CCITT-FALSE)       |
//! | CRC-32| 0x04C11DB7 | IEEE   | chunk payload, appended before RS |

use crate::Error;

/// Width of the chunk-level integrity code appended before FEC.
pub const CHUNK_CRC_BYTES: usize = 4;

// =============================================================================
// Table generation
// =============================================================================

/// CRC_TABLE[b] = CRC of the single byte `b` starting from zero, MSB-first.
const fn crc8_table(poly: u8) -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut byte = 0usize;
    while byte < 256 {
        let mut crc = byte as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ poly
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[byte] = crc;
        byte += 1;
    }
    table
}

const fn crc16_table(poly: u16) -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut byte = 0usize;
    while byte < 256 {
        let mut crc = (byte as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ poly
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[byte] = crc;
        byte += 1;
    }
    table
}

static CRC8_TABLE: [u8; 256] = crc8_table(0x07);
static CRC16_TABLE: [u16; 256] = crc16_table(0x1021);

// =============================================================================
// Public API
// =============================================================================

/// CRC-8 (poly 0x07, init 0x00, no reflection).
#[inline]
pub fn crc8(data: &[u8]) -> u8 {
    data.iter()
        .fold(0u8, |crc, &b| CRC8_TABLE[(crc ^ b) as usize])
}

/// CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF).
#[inline]
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    data.iter().fold(0xFFFFu16, |crc, &b| {
        (crc << 8) ^ CRC16_TABLE[((crc >> 8) as u8 ^ b) as usize]
    })
}

/// CRC-32 (IEEE 802.3, zlib-compatible).
#[inline]
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Return `payload ‖ crc32(payload)` with the code stored little-endian.
pub fn append_crc32(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + CHUNK_CRC_BYTES);
    out.extend_from_slice(payload);
    out.extend_from_slice(&crc32(payload).to_le_bytes());
    out
}

/// Split a `payload ‖ crc32` buffer and check the code.
///
/// # Errors
/// Returns `Error::ChecksumMismatch` when the stored code disagrees with the
/// payload, including when the buffer is too short to hold a code at all.
pub fn verify_crc32(buf: &[u8]) -> Result<&[u8], Error> {
    if buf.len() < CHUNK_CRC_BYTES {
        return Err(Error::ChecksumMismatch {
            expected: 0,
            actual: 0,
        });
    }
    let (payload, stored) = buf.split_at(buf.len() - CHUNK_CRC_BYTES);
    let expected = u32::from_le_bytes([stored[0], stored[1], stored[2], stored[3]]);
    let actual = crc32(payload);
    if expected != actual {
        return Err(Error::ChecksumMismatch { expected, actual });
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHECK_INPUT: &[u8] = b"123456789";

    #[test]
    fn test_reference_check_values() {
        assert_eq!(crc8(CHECK_INPUT), 0xF4);
        assert_eq!(crc16_ccitt(CHECK_INPUT), 0x29B1);
        assert_eq!(crc32(CHECK_INPUT), 0xCBF4_3926);
    }

    #[test]
    fn test_empty_input_returns_init() {
        assert_eq!(crc8(&[]), 0x00);
        assert_eq!(crc16_ccitt(&[]), 0xFFFF);
        assert_eq!(crc32(&[]), 0);
    }

    #[test]
    fn test_deterministic() {
        let data = [0xde, 0xad, 0xbe, 0xef, 0x01];
        assert_eq!(crc8(&data), crc8(&data));
        assert_eq!(crc16_ccitt(&data), crc16_ccitt(&data));
    }

    #[test]
    fn test_single_bit_flips_detected() {
        let data = [0x00u8, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x80];
        let base8 = crc8(&data);
        let base16 = crc16_ccitt(&data);

        for byte in 0..data.len() {
            for bit in 0..8 {
                let mut flipped = data;
                flipped[byte] ^= 1 << bit;
                assert_ne!(crc8(&flipped), base8, "crc8 missed flip at {byte}:{bit}");
                assert_ne!(crc16_ccitt(&flipped), base16, "crc16 missed flip at {byte}:{bit}");
            }
        }
    }

    #[test]
    fn test_crc32_append_verify() {
        let framed = append_crc32(b"chunk payload");
        assert_eq!(framed.len(), 13 + CHUNK_CRC_BYTES);
        assert_eq!(verify_crc32(&framed).unwrap(), b"chunk payload");

        let mut corrupted = framed.clone();
        corrupted[3] ^= 0x40;
        assert!(matches!(
            verify_crc32(&corrupted),
            Err(Error::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_crc32_of_empty_payload() {
        let framed = append_crc32(&[]);
        assert_eq!(framed, vec![0, 0, 0, 0]);
        assert_eq!(verify_crc32(&framed).unwrap(), &[] as &[u8]);
        assert!(verify_crc32(&[1, 2]).is_err());
    }
}
