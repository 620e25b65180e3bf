//! The nine TRFTP message kinds and their `xid` tags (spec.md §3.2).

use thiserror::Error;

/// A TRFTP message kind, identified on the wire by the `xid` header field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Server → client: announces a new file version is available.
    Ntf,
    /// Client → server: reports the client's current version.
    Chk,
    /// Server → client: announces file metadata (version, length, CRC).
    Info,
    /// Client → server: accepts the transfer and proposes a pacing gap.
    Rdy,
    /// Server → client: a chunk of file content.
    Data,
    /// Client → server: requests retransmission from a sequence number.
    Rtx,
    /// Client → server: reports a completed, verified download.
    Done,
    /// Server → client: confirms completion.
    Fin,
    /// Either direction: universal abort.
    Cxl,
}

impl Kind {
    /// Returns the wire `xid` value for this kind.
    #[must_use]
    pub const fn xid(self) -> u32 {
        match self {
            Kind::Ntf => 0x4500_000F,
            Kind::Chk => 0x45FD_0001,
            Kind::Info => 0x45FD_0002,
            Kind::Rdy => 0x45FD_0003,
            Kind::Data => 0x45FD_000D,
            Kind::Rtx => 0x45FD_000E,
            Kind::Done => 0x45FD_000F,
            Kind::Fin => 0x45FD_000A,
            Kind::Cxl => 0x45FD_000C,
        }
    }
}

impl TryFrom<u32> for Kind {
    type Error = UnknownKind;

    fn try_from(xid: u32) -> Result<Self, Self::Error> {
        Ok(match xid {
            0x4500_000F => Kind::Ntf,
            0x45FD_0001 => Kind::Chk,
            0x45FD_0002 => Kind::Info,
            0x45FD_0003 => Kind::Rdy,
            0x45FD_000D => Kind::Data,
            0x45FD_000E => Kind::Rtx,
            0x45FD_000F => Kind::Done,
            0x45FD_000A => Kind::Fin,
            0x45FD_000C => Kind::Cxl,
            other => return Err(UnknownKind(other)),
        })
    }
}

/// An `xid` value that does not correspond to any known [`Kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown message kind xid {0:#010x}")]
pub struct UnknownKind(pub u32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xid_round_trips() {
        for kind in [
            Kind::Ntf,
            Kind::Chk,
            Kind::Info,
            Kind::Rdy,
            Kind::Data,
            Kind::Rtx,
            Kind::Done,
            Kind::Fin,
            Kind::Cxl,
        ] {
            assert_eq!(Kind::try_from(kind.xid()), Ok(kind));
        }
    }

    #[test]
    fn unknown_xid_is_rejected() {
        assert_eq!(Kind::try_from(0u32), Err(UnknownKind(0)));
    }
}
