//! A full on-wire datagram: header plus payload, decoded and verified together.

use crate::crc;
use crate::header::{DecodeError, Header, HEADER_LEN, MAGIC};

/// A decoded, fully-verified TRFTP datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The parsed header.
    pub header: Header,
    /// The payload bytes, `header.pl` of them.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Decodes and verifies a full datagram.
    ///
    /// Checks, in order: header presence, `magic`, datagram length against
    /// `pl`, `psn < tpn`, and the CRC32 over the datagram with `crc32` zeroed.
    ///
    /// # Errors
    ///
    /// Returns the first [`DecodeError`] variant that applies.
    pub fn decode(buf: &[u8]) -> Result<Frame, DecodeError> {
        let header = Header::read(buf)?;

        if header.magic != MAGIC {
            return Err(DecodeError::BadMagic(header.magic));
        }

        let expected_len = HEADER_LEN + header.pl as usize;
        if buf.len() != expected_len {
            return Err(DecodeError::LengthMismatch {
                expected: expected_len,
                actual: buf.len(),
            });
        }

        if header.psn >= header.tpn {
            return Err(DecodeError::PsnOutOfRange {
                psn: header.psn,
                tpn: header.tpn,
            });
        }

        let mut zeroed = buf.to_vec();
        zeroed[20..24].copy_from_slice(&0u32.to_le_bytes());
        let computed = crc::checksum(&zeroed);
        if computed != header.crc32 {
            return Err(DecodeError::CrcMismatch {
                wire: header.crc32,
                computed,
            });
        }

        Ok(Frame {
            header,
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }

    /// Encodes `header` and `payload` into a full datagram, computing and
    /// patching in the CRC32.
    ///
    /// `header.crc32` and `header.pl` are overwritten with the correct
    /// values; callers need not set them.
    #[must_use]
    pub fn encode(mut header: Header, payload: &[u8]) -> Vec<u8> {
        header.pl = payload.len() as u32;
        header.crc32 = 0;

        let mut buf = vec![0u8; HEADER_LEN + payload.len()];
        header.write(&mut buf[..HEADER_LEN]);
        buf[HEADER_LEN..].copy_from_slice(payload);

        let computed = crc::checksum(&buf);
        buf[20..24].copy_from_slice(&computed.to_le_bytes());
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::SERVER_PID;

    fn sample_header(psn: u32, tpn: u32) -> Header {
        Header {
            magic: MAGIC,
            spid: SERVER_PID,
            dpid: 0,
            tpn,
            tpl: 8,
            xid: 0x4500_000F,
            crc32: 0,
            psn,
            pl: 0,
        }
    }

    #[test]
    fn round_trips_through_encode_decode() {
        let header = sample_header(0, 2);
        let payload = b"abcd";
        let bytes = Frame::encode(header, payload);
        let frame = Frame::decode(&bytes).unwrap();
        assert_eq!(frame.payload, payload);
        assert_eq!(frame.header.psn, 0);
        assert_eq!(frame.header.tpn, 2);
    }

    #[test]
    fn rejects_bad_magic() {
        let header = sample_header(0, 1);
        let mut bytes = Frame::encode(header, &[]);
        bytes[0] ^= 0xFF;
        assert!(matches!(Frame::decode(&bytes), Err(DecodeError::BadMagic(_))));
    }

    #[test]
    fn rejects_length_mismatch() {
        let header = sample_header(0, 1);
        let mut bytes = Frame::encode(header, b"abcd");
        bytes.pop();
        assert!(matches!(
            Frame::decode(&bytes),
            Err(DecodeError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn rejects_psn_out_of_range() {
        let header = sample_header(1, 1);
        let bytes = Frame::encode(header, &[]);
        assert!(matches!(
            Frame::decode(&bytes),
            Err(DecodeError::PsnOutOfRange { psn: 1, tpn: 1 })
        ));
    }

    #[test]
    fn rejects_corrupted_payload() {
        let header = sample_header(0, 1);
        let mut bytes = Frame::encode(header, b"abcd");
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(Frame::decode(&bytes), Err(DecodeError::CrcMismatch { .. })));
    }
}
