//! The fixed 32-byte TRFTP datagram header.

use thiserror::Error;

/// Constant magic value ("ROBL") every TRFTP datagram begins with.
pub const MAGIC: u32 = 0x524F_424C;

/// Size in bytes of [`Header`] on the wire.
pub const HEADER_LEN: usize = 32;

/// Maximum payload carried by a single datagram.
pub const MAX_PAYLOAD: usize = 1408;

/// Maximum size of a full datagram (header + payload).
pub const MAX_DATAGRAM: usize = HEADER_LEN + MAX_PAYLOAD;

/// Participant id a server stamps into `spid` and a client stamps into `dpid`.
pub const SERVER_PID: u16 = 0xFD00;

/// Participant id a client stamps into `spid`.
pub const CLIENT_PID: u16 = 0x0000;

/// The bit-exact, little-endian TRFTP header (spec.md §3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Constant [`MAGIC`]; datagrams with any other value are dropped.
    pub magic: u32,
    /// Source participant id.
    pub spid: u16,
    /// Destination participant id.
    pub dpid: u16,
    /// Total packet number for the transfer.
    pub tpn: u32,
    /// Total payload length of the transfer.
    pub tpl: u32,
    /// Message kind tag.
    pub xid: u32,
    /// CRC32 over the whole datagram with this field zeroed.
    pub crc32: u32,
    /// Packet sequence number, `0..tpn`.
    pub psn: u32,
    /// This datagram's payload length.
    pub pl: u32,
}

impl Header {
    /// Parses a header from the first [`HEADER_LEN`] bytes of `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::TooShort`] if `buf` is shorter than the header.
    pub fn read(buf: &[u8]) -> Result<Header, DecodeError> {
        if buf.len() < HEADER_LEN {
            return Err(DecodeError::TooShort { len: buf.len() });
        }

        Ok(Header {
            magic: read_u32(buf, 0),
            spid: read_u16(buf, 4),
            dpid: read_u16(buf, 6),
            tpn: read_u32(buf, 8),
            tpl: read_u32(buf, 12),
            xid: read_u32(buf, 16),
            crc32: read_u32(buf, 20),
            psn: read_u32(buf, 24),
            pl: read_u32(buf, 28),
        })
    }

    /// Writes this header into the first [`HEADER_LEN`] bytes of `buf`.
    ///
    /// # Panics
    ///
    /// Panics if `buf` is shorter than [`HEADER_LEN`].
    pub fn write(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..6].copy_from_slice(&self.spid.to_le_bytes());
        buf[6..8].copy_from_slice(&self.dpid.to_le_bytes());
        buf[8..12].copy_from_slice(&self.tpn.to_le_bytes());
        buf[12..16].copy_from_slice(&self.tpl.to_le_bytes());
        buf[16..20].copy_from_slice(&self.xid.to_le_bytes());
        buf[20..24].copy_from_slice(&self.crc32.to_le_bytes());
        buf[24..28].copy_from_slice(&self.psn.to_le_bytes());
        buf[28..32].copy_from_slice(&self.pl.to_le_bytes());
    }
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(buf[offset..offset + 4].try_into().expect("4-byte slice"))
}

fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes(buf[offset..offset + 2].try_into().expect("2-byte slice"))
}

/// Structural decode failures, handled by dropping the datagram (spec.md §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The datagram is shorter than a header.
    #[error("datagram too short to contain a header: {len} bytes")]
    TooShort {
        /// Number of bytes actually received.
        len: usize,
    },

    /// The `magic` field did not match [`MAGIC`].
    #[error("bad magic: {0:#010x}")]
    BadMagic(u32),

    /// The datagram length did not equal `HEADER_LEN + pl`.
    #[error("length mismatch: header declares {expected} bytes, datagram has {actual}")]
    LengthMismatch {
        /// Length implied by the header's `pl` field.
        expected: usize,
        /// Actual number of bytes received.
        actual: usize,
    },

    /// The CRC32 recomputed over the datagram did not match the wire value.
    #[error("crc32 mismatch: wire={wire:#010x} computed={computed:#010x}")]
    CrcMismatch {
        /// CRC32 carried on the wire.
        wire: u32,
        /// CRC32 recomputed locally.
        computed: u32,
    },

    /// `psn` was not strictly less than `tpn`.
    #[error("psn {psn} is not less than tpn {tpn}")]
    PsnOutOfRange {
        /// Packet sequence number from the header.
        psn: u32,
        /// Total packet number from the header.
        tpn: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Header {
        Header {
            magic: MAGIC,
            spid: SERVER_PID,
            dpid: 0,
            tpn: 1,
            tpl: 4,
            xid: 0x4500_000F,
            crc32: 0xDEAD_BEEF,
            psn: 0,
            pl: 4,
        }
    }

    #[test]
    fn round_trips_through_bytes() {
        let header = sample();
        let mut buf = [0u8; HEADER_LEN];
        header.write(&mut buf);
        assert_eq!(Header::read(&buf).unwrap(), header);
    }

    #[test]
    fn read_rejects_short_buffer() {
        let buf = [0u8; HEADER_LEN - 1];
        assert_eq!(Header::read(&buf), Err(DecodeError::TooShort { len: HEADER_LEN - 1 }));
    }
}
