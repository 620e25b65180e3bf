//! Whole-file size and CRC32, computed without holding the file in memory.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Reads `path` in chunks and returns its `(size, crc32)`.
pub(crate) fn size_and_crc32(path: &Path) -> io::Result<(u32, u32)> {
    let mut file = File::open(path)?;
    let mut digest = protocol::crc::digest();
    let mut buf = [0u8; 64 * 1024];
    let mut total: u64 = 0;

    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        digest.update(&buf[..read]);
        total += read as u64;
    }

    let size = u32::try_from(total)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "file exceeds 4 GiB limit"))?;
    Ok((size, digest.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn computes_size_and_crc() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello trftp").unwrap();
        let (size, crc) = size_and_crc32(file.path()).unwrap();
        assert_eq!(size, 11);
        assert_eq!(crc, protocol::crc::checksum(b"hello trftp"));
    }
}
