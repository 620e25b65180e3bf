//! CRC32 computation for TRFTP datagrams.
//!
//! The wire format calls for the reflected IEEE 802.3 CRC-32 polynomial with
//! both the initial register and the final XOR held at zero, rather than the
//! conventional zlib/zip parameterization (`init = xorout = 0xFFFFFFFF`).
//! [`crc::Crc`] lets us describe that variant explicitly instead of reaching
//! for a fixed-parameter crate that only implements the zlib convention.

use crc::{Algorithm, Crc, Digest};

const TRFTP_CRC32: Algorithm<u32> = Algorithm {
    width: 32,
    poly: 0x04C1_1DB7,
    init: 0x0000_0000,
    refin: true,
    refout: true,
    xorout: 0x0000_0000,
    check: 0x0000_0000,
    residue: 0x0000_0000,
};

static CRC: Crc<u32> = Crc::<u32>::new(&TRFTP_CRC32);

/// Computes the TRFTP CRC32 over `buf`.
#[must_use]
pub fn checksum(buf: &[u8]) -> u32 {
    CRC.checksum(buf)
}

/// Starts an incremental TRFTP CRC32 computation, for callers that can't
/// hold the whole input in memory at once (e.g. hashing a file in chunks).
#[must_use]
pub fn digest() -> Digest<'static, u32> {
    CRC.digest()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer_has_zero_crc() {
        assert_eq!(checksum(&[]), 0);
    }

    #[test]
    fn single_byte_changes_result() {
        assert_ne!(checksum(&[0x01]), checksum(&[0x02]));
    }

    #[test]
    fn deterministic() {
        let buf = b"trftp datagram payload bytes";
        assert_eq!(checksum(buf), checksum(buf));
    }

    #[test]
    fn digest_matches_whole_buffer_checksum() {
        let buf = b"trftp datagram payload bytes, split across chunks";
        let mut d = digest();
        for chunk in buf.chunks(7) {
            d.update(chunk);
        }
        assert_eq!(d.finalize(), checksum(buf));
    }
}
