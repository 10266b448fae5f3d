//! Integrity check of screen payloads.
//!
//! The device appends a single byte holding the sum of all payload bytes modulo 256.

use crate::error::ProtocolError;

/// Length of the trailing checksum field in bytes
pub const CHECKSUM_SIZE: usize = 1;

pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |accum, val| accum.wrapping_add(*val))
}

/// Compare the device supplied checksum field against the payload
pub fn validate(payload: &[u8], expected: &[u8]) -> Result<(), ProtocolError> {
    let computed = checksum(payload);
    match expected {
        [sent] if *sent == computed => Ok(()),
        _ => Err(ProtocolError::ChecksumMismatch {
            expected: expected.to_vec(),
            computed,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::*;

    #[test]
    fn sums_modulo_256() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[0x01, 0x02, 0x03]), 0x06);
        assert_eq!(checksum(&[0xFF, 0x02]), 0x01);
    }

    #[test]
    fn accepts_matching_field() {
        let payload = b"\x1b*\x04\x02\x00\xAA\x55";
        assert_ok!(validate(payload, &[checksum(payload)]));
    }

    #[test]
    fn rejects_wrong_field_length() {
        assert_err!(validate(&[0x10], &[]));
        assert_err!(validate(&[0x10], &[0x10, 0x00]));
    }

    #[test]
    fn any_single_byte_corruption_is_detected() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(600).collect();
        let expected = [checksum(&payload)];
        assert_ok!(validate(&payload, &expected));

        for idx in [0, 1, 255, 256, 599] {
            for delta in 1..=255u8 {
                let mut corrupted = payload.clone();
                corrupted[idx] = corrupted[idx].wrapping_add(delta);
                assert_err_eq!(
                    validate(&corrupted, &expected),
                    ProtocolError::ChecksumMismatch {
                        expected: expected.to_vec(),
                        computed: expected[0].wrapping_add(delta),
                    }
                );
            }
        }
    }
}
