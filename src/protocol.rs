//! MH-Z19C frame codec
//!
//! The sensor speaks a fixed 9-byte binary protocol over its UART:
//! start marker, address, command, five data bytes, checksum. This module
//! encodes outgoing command frames and decodes/validates incoming response
//! frames. It is pure and does no I/O, so protocol correctness is testable
//! independently of serial timing.
//!
//! # Frame layout
//!
//! | byte | outgoing          | response            |
//! |------|-------------------|---------------------|
//! | 0    | `0xFF` start      | `0xFF` start        |
//! | 1    | `0x01` address    | command echo        |
//! | 2    | command           | data[0]             |
//! | 3..8 | data[1..5], pad   | data[1..5], pad     |
//! | 8    | checksum          | checksum            |
//!
//! The checksum is the two's complement of the low byte of the sum of
//! bytes 1..=7. A frame failing the check must never be interpreted as
//! data.
//!
//! For the read-concentration response the command echo is `0x86` and the
//! concentration in ppm is `(data[0] << 8) | data[1]` (frame bytes 2 and 3).

use crate::error::{AcquireError, Result};

/// Length of every frame on the wire
pub const FRAME_LEN: usize = 9;

/// Number of data bytes in a frame (between command and checksum)
pub const DATA_LEN: usize = 5;

/// Start marker of every frame
pub const START_BYTE: u8 = 0xFF;

/// Sensor address used in outgoing frames
pub const SENSOR_ADDRESS: u8 = 0x01;

/// Read CO2 concentration
pub const CMD_READ_CONCENTRATION: u8 = 0x86;

/// Zero-point calibration (sensor must sit in ~400 ppm fresh air)
pub const CMD_ZERO_CALIBRATION: u8 = 0x87;

/// Span-point calibration with a target ppm in the data bytes
pub const CMD_SPAN_CALIBRATION: u8 = 0x88;

/// Enable/disable automatic baseline correction
pub const CMD_ABC_MODE: u8 = 0x79;

/// Data byte that switches ABC on (off is 0x00)
pub const ABC_ON: u8 = 0xA0;

/// A fixed-size frame as exchanged with the sensor
pub type Frame = [u8; FRAME_LEN];

/// Compute the checksum over bytes 1..=7 of a frame
pub fn checksum(frame: &Frame) -> u8 {
    let sum: u8 = frame[1..FRAME_LEN - 1]
        .iter()
        .fold(0u8, |acc, b| acc.wrapping_add(*b));
    (0xFFu8.wrapping_sub(sum)).wrapping_add(1)
}

/// Build an outgoing command frame
///
/// `data` must be exactly [`DATA_LEN`] bytes; callers zero-pad commands
/// that need fewer.
pub fn encode(command: u8, data: &[u8]) -> Result<Frame> {
    if data.len() != DATA_LEN {
        return Err(AcquireError::InvalidPayload {
            expected: DATA_LEN,
            actual: data.len(),
        });
    }
    let mut frame: Frame = [0; FRAME_LEN];
    frame[0] = START_BYTE;
    frame[1] = SENSOR_ADDRESS;
    frame[2] = command;
    frame[3..3 + DATA_LEN].copy_from_slice(data);
    frame[FRAME_LEN - 1] = checksum(&frame);
    Ok(frame)
}

/// A validated response frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseFrame {
    /// Command byte echoed by the sensor
    pub command: u8,
    /// The five data bytes following the command echo
    pub data: [u8; DATA_LEN],
}

impl ResponseFrame {
    /// Interpret the data bytes as a big-endian concentration value
    pub fn concentration_ppm(&self) -> u16 {
        u16::from_be_bytes([self.data[0], self.data[1]])
    }
}

/// Validate and split an incoming frame
///
/// Checks the start marker first, then the checksum. Both failures fold
/// into [`AcquireError::ChecksumMismatch`] since either means the byte
/// stream lost frame alignment.
pub fn decode(raw: &Frame) -> Result<ResponseFrame> {
    if raw[0] != START_BYTE {
        return Err(AcquireError::ChecksumMismatch);
    }
    if checksum(raw) != raw[FRAME_LEN - 1] {
        return Err(AcquireError::ChecksumMismatch);
    }
    let mut data = [0u8; DATA_LEN];
    data.copy_from_slice(&raw[2..2 + DATA_LEN]);
    Ok(ResponseFrame {
        command: raw[1],
        data,
    })
}

/// Decode a read-concentration response into a ppm value
///
/// On top of [`decode`], requires the echoed command to be
/// [`CMD_READ_CONCENTRATION`]; a different echo means the stream is
/// desynced and is reported as the same error kind.
pub fn decode_concentration(raw: &Frame) -> Result<u16> {
    let response = decode(raw)?;
    if response.command != CMD_READ_CONCENTRATION {
        return Err(AcquireError::ChecksumMismatch);
    }
    Ok(response.concentration_ppm())
}

/// The canonical read-concentration request
pub fn read_concentration_frame() -> Frame {
    // encode cannot fail for a zeroed 5-byte payload
    encode(CMD_READ_CONCENTRATION, &[0; DATA_LEN]).expect("fixed payload")
}

/// Zero-point calibration command (no data)
pub fn zero_calibration_frame() -> Frame {
    encode(CMD_ZERO_CALIBRATION, &[0; DATA_LEN]).expect("fixed payload")
}

/// Span-point calibration command with the target ppm in data bytes 0..2
pub fn span_calibration_frame(span_ppm: u16) -> Frame {
    let be = span_ppm.to_be_bytes();
    encode(CMD_SPAN_CALIBRATION, &[be[0], be[1], 0, 0, 0]).expect("fixed payload")
}

/// ABC (automatic baseline correction) on/off command
pub fn abc_frame(enabled: bool) -> Frame {
    let flag = if enabled { ABC_ON } else { 0x00 };
    encode(CMD_ABC_MODE, &[flag, 0, 0, 0, 0]).expect("fixed payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_read_command_bytes() {
        // The exact byte string the sensor datasheet documents
        assert_eq!(
            read_concentration_frame(),
            [0xFF, 0x01, 0x86, 0x00, 0x00, 0x00, 0x00, 0x00, 0x79]
        );
    }

    #[test]
    fn test_decode_concentration() {
        let raw: Frame = [0xFF, 0x86, 0x03, 0x20, 0x00, 0x00, 0x00, 0x00, 0x57];
        assert_eq!(decode_concentration(&raw).unwrap(), 800);
    }

    #[test]
    fn test_decode_rejects_bad_start_byte() {
        let mut raw = [0xFF, 0x86, 0x03, 0x20, 0x00, 0x00, 0x00, 0x00, 0x57];
        raw[0] = 0x00;
        assert!(matches!(
            decode(&raw),
            Err(AcquireError::ChecksumMismatch)
        ));
    }

    #[test]
    fn test_decode_rejects_wrong_command_echo() {
        // A valid calibration echo is not a concentration reading
        let raw = encode(CMD_ZERO_CALIBRATION, &[0; DATA_LEN]).unwrap();
        assert!(decode(&raw).is_ok());
        assert!(matches!(
            decode_concentration(&raw),
            Err(AcquireError::ChecksumMismatch)
        ));
    }

    #[test]
    fn test_encode_rejects_bad_payload_length() {
        assert!(matches!(
            encode(CMD_READ_CONCENTRATION, &[0; 3]),
            Err(AcquireError::InvalidPayload {
                expected: 5,
                actual: 3
            })
        ));
        assert!(encode(CMD_READ_CONCENTRATION, &[0; 5]).is_ok());
    }

    #[test]
    fn test_span_frame_embeds_target() {
        let frame = span_calibration_frame(2000);
        assert_eq!(frame[2], CMD_SPAN_CALIBRATION);
        assert_eq!(frame[3], (2000u16 >> 8) as u8);
        assert_eq!(frame[4], (2000u16 & 0xFF) as u8);
        assert_eq!(checksum(&frame), frame[8]);
    }

    #[test]
    fn test_abc_frames() {
        assert_eq!(abc_frame(true)[3], ABC_ON);
        assert_eq!(abc_frame(false)[3], 0x00);
    }

    /// Build a response-shaped frame (command echo at byte 1) with a
    /// valid checksum, the way the sensor would answer.
    fn response_frame(command: u8, data: &[u8; DATA_LEN]) -> Frame {
        let mut frame: Frame = [0; FRAME_LEN];
        frame[0] = START_BYTE;
        frame[1] = command;
        frame[2..2 + DATA_LEN].copy_from_slice(data);
        frame[FRAME_LEN - 1] = checksum(&frame);
        frame
    }

    proptest! {
        /// Every well-formed response decodes back to its command and data
        #[test]
        fn prop_response_roundtrip(command in any::<u8>(), data in any::<[u8; 5]>()) {
            let decoded = decode(&response_frame(command, &data)).unwrap();
            prop_assert_eq!(decoded.command, command);
            prop_assert_eq!(decoded.data, data);
        }

        /// Every frame produced by encode passes its own validation
        #[test]
        fn prop_encoded_frames_validate(command in any::<u8>(), data in any::<[u8; 5]>()) {
            let frame = encode(command, &data).unwrap();
            let decoded = decode(&frame).unwrap();
            prop_assert_eq!(decoded.command, SENSOR_ADDRESS);
            prop_assert_eq!(decoded.data[0], command);
        }

        /// Any corruption of the checksum byte is always detected
        #[test]
        fn prop_corrupted_checksum_never_decodes(
            command in any::<u8>(),
            data in any::<[u8; 5]>(),
            delta in 1u8..=255,
        ) {
            let mut frame = encode(command, &data).unwrap();
            frame[8] = frame[8].wrapping_add(delta);
            prop_assert!(matches!(
                decode(&frame),
                Err(AcquireError::ChecksumMismatch)
            ));
            prop_assert!(decode_concentration(&frame).is_err());
        }

        /// Checksum matches the reference formula 0x100 - (sum % 0x100)
        #[test]
        fn prop_checksum_reference(frame in any::<[u8; 9]>()) {
            let sum: u32 = frame[1..8].iter().map(|b| *b as u32).sum();
            let reference = ((0x100 - (sum % 0x100)) % 0x100) as u8;
            prop_assert_eq!(checksum(&frame), reference);
        }
    }
}
