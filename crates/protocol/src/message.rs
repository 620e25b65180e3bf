//! Kind-specific TRFTP payloads (spec.md §3.2).

use thiserror::Error;

use crate::header::MAX_PAYLOAD;
use crate::kind::Kind;

/// A decoded TRFTP payload, paired with its [`Kind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// `{new_version}`.
    Ntf {
        /// Version the server is offering.
        new_version: u32,
    },
    /// `{cur_version}`.
    Chk {
        /// Version the client currently holds.
        cur_version: u32,
    },
    /// `{new_version, file_length, crc32}`.
    Info {
        /// Version of the file being offered.
        new_version: u32,
        /// Total file length in bytes.
        file_length: u32,
        /// CRC32 of the whole file.
        crc32: u32,
    },
    /// `{new_version, file_length, ipg_us}`.
    Rdy {
        /// Version the client is accepting.
        new_version: u32,
        /// File length the client is accepting.
        file_length: u32,
        /// Proposed inter-packet gap, in microseconds (unclamped).
        ipg_us: u32,
    },
    /// Up to [`MAX_PAYLOAD`] bytes of file content.
    Data {
        /// Raw file bytes for this sequence number.
        payload: Vec<u8>,
    },
    /// `{retransmit_psn}`.
    Rtx {
        /// Sequence number the client expects next.
        retransmit_psn: u32,
    },
    /// `{new_version, file_length, crc32}`.
    Done {
        /// Version the client finished downloading.
        new_version: u32,
        /// File length the client wrote to disk.
        file_length: u32,
        /// CRC32 the client computed over the staged file.
        crc32: u32,
    },
    /// Empty: confirms transfer completion.
    Fin,
    /// Empty: universal abort.
    Cxl,
}

impl Message {
    /// Returns the [`Kind`] this payload belongs to.
    #[must_use]
    pub fn kind(&self) -> Kind {
        match self {
            Message::Ntf { .. } => Kind::Ntf,
            Message::Chk { .. } => Kind::Chk,
            Message::Info { .. } => Kind::Info,
            Message::Rdy { .. } => Kind::Rdy,
            Message::Data { .. } => Kind::Data,
            Message::Rtx { .. } => Kind::Rtx,
            Message::Done { .. } => Kind::Done,
            Message::Fin => Kind::Fin,
            Message::Cxl => Kind::Cxl,
        }
    }

    /// Returns the fixed payload length for `kind`, or `None` for `DATA`
    /// whose length depends on the transfer's geometry.
    #[must_use]
    pub const fn fixed_payload_len(kind: Kind) -> Option<usize> {
        match kind {
            Kind::Ntf | Kind::Chk | Kind::Rtx => Some(4),
            Kind::Info | Kind::Rdy | Kind::Done => Some(12),
            Kind::Fin | Kind::Cxl => Some(0),
            Kind::Data => None,
        }
    }

    /// Serializes this payload's body (not including the header).
    #[must_use]
    pub fn encode_payload(&self) -> Vec<u8> {
        match self {
            Message::Ntf { new_version } | Message::Chk {
                cur_version: new_version,
            } => new_version.to_le_bytes().to_vec(),
            Message::Info {
                new_version,
                file_length,
                crc32,
            }
            | Message::Done {
                new_version,
                file_length,
                crc32,
            } => {
                let mut buf = Vec::with_capacity(12);
                buf.extend_from_slice(&new_version.to_le_bytes());
                buf.extend_from_slice(&file_length.to_le_bytes());
                buf.extend_from_slice(&crc32.to_le_bytes());
                buf
            }
            Message::Rdy {
                new_version,
                file_length,
                ipg_us,
            } => {
                let mut buf = Vec::with_capacity(12);
                buf.extend_from_slice(&new_version.to_le_bytes());
                buf.extend_from_slice(&file_length.to_le_bytes());
                buf.extend_from_slice(&ipg_us.to_le_bytes());
                buf
            }
            Message::Data { payload } => payload.clone(),
            Message::Rtx { retransmit_psn } => retransmit_psn.to_le_bytes().to_vec(),
            Message::Fin | Message::Cxl => Vec::new(),
        }
    }

    /// Parses `bytes` as the payload body for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError`] if `bytes` is not the exact fixed size for
    /// `kind`, or if a `DATA` payload is empty or exceeds [`MAX_PAYLOAD`].
    pub fn decode_payload(kind: Kind, bytes: &[u8]) -> Result<Message, PayloadError> {
        if let Some(expected) = Self::fixed_payload_len(kind) {
            if bytes.len() != expected {
                return Err(PayloadError::UnexpectedLength {
                    kind,
                    expected,
                    actual: bytes.len(),
                });
            }
        }

        Ok(match kind {
            Kind::Ntf => Message::Ntf {
                new_version: read_u32(bytes, 0),
            },
            Kind::Chk => Message::Chk {
                cur_version: read_u32(bytes, 0),
            },
            Kind::Info => Message::Info {
                new_version: read_u32(bytes, 0),
                file_length: read_u32(bytes, 4),
                crc32: read_u32(bytes, 8),
            },
            Kind::Rdy => Message::Rdy {
                new_version: read_u32(bytes, 0),
                file_length: read_u32(bytes, 4),
                ipg_us: read_u32(bytes, 8),
            },
            Kind::Done => Message::Done {
                new_version: read_u32(bytes, 0),
                file_length: read_u32(bytes, 4),
                crc32: read_u32(bytes, 8),
            },
            Kind::Rtx => Message::Rtx {
                retransmit_psn: read_u32(bytes, 0),
            },
            Kind::Fin => Message::Fin,
            Kind::Cxl => Message::Cxl,
            Kind::Data => {
                if bytes.is_empty() {
                    return Err(PayloadError::EmptyData);
                }
                if bytes.len() > MAX_PAYLOAD {
                    return Err(PayloadError::DataTooLarge { len: bytes.len() });
                }
                Message::Data {
                    payload: bytes.to_vec(),
                }
            }
        })
    }
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(buf[offset..offset + 4].try_into().expect("4-byte slice"))
}

/// Errors from parsing or constructing a kind-specific payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PayloadError {
    /// The payload length did not match the fixed size for its kind.
    #[error("{kind:?} payload must be {expected} bytes, got {actual}")]
    UnexpectedLength {
        /// The message kind whose fixed size was violated.
        kind: Kind,
        /// Expected payload length.
        expected: usize,
        /// Actual payload length.
        actual: usize,
    },

    /// A `DATA` payload exceeded [`MAX_PAYLOAD`].
    #[error("DATA payload of {len} bytes exceeds the maximum of {max}", max = MAX_PAYLOAD)]
    DataTooLarge {
        /// Length of the oversized payload.
        len: usize,
    },

    /// A `DATA` payload was empty.
    #[error("DATA payload is empty")]
    EmptyData,
}
