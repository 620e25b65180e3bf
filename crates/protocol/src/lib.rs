//! Wire framing, CRC, and validation for the TRFTP file-push protocol.
//!
//! # Overview
//!
//! A TRFTP datagram is a fixed 32-byte [`header::Header`] followed by up to
//! [`header::MAX_PAYLOAD`] bytes of payload, whose shape depends on the
//! message [`kind::Kind`]. [`frame::Frame`] ties header and payload together
//! and performs the magic/length/psn/CRC checks every inbound datagram must
//! pass before a caller ever sees a [`message::Message`].
//!
//! # Design
//!
//! This crate is deliberately free of any I/O, threading, or timing
//! concerns; it only encodes, decodes, and validates byte buffers. Sockets
//! live in `endpoint`, state machines in `core`.
//!
//! # Errors
//!
//! Decoding failures are structural and non-fatal: a caller receiving
//! [`header::DecodeError`] or [`message::PayloadError`] should drop the
//! datagram and keep listening, per the protocol's tolerance for noise on
//! an unreliable transport.
//!
//! # Examples
//!
//! ```
//! use protocol::frame::Frame;
//! use protocol::header::{Header, MAGIC, SERVER_PID};
//!
//! let header = Header {
//!     magic: MAGIC,
//!     spid: SERVER_PID,
//!     dpid: 0,
//!     tpn: 1,
//!     tpl: 4,
//!     xid: 0x4500_000F,
//!     crc32: 0,
//!     psn: 0,
//!     pl: 0,
//! };
//! let bytes = Frame::encode(header, b"data");
//! let frame = Frame::decode(&bytes).unwrap();
//! assert_eq!(frame.payload, b"data");
//! ```

pub mod crc;
pub mod frame;
pub mod header;
pub mod kind;
pub mod message;
pub mod validate;

pub use frame::Frame;
pub use header::{DecodeError, Header};
pub use kind::{Kind, UnknownKind};
pub use message::{Message, PayloadError};

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_message() -> impl Strategy<Value = Message> {
        prop_oneof![
            any::<u32>().prop_map(|new_version| Message::Ntf { new_version }),
            any::<u32>().prop_map(|cur_version| Message::Chk { cur_version }),
            (any::<u32>(), any::<u32>(), any::<u32>()).prop_map(
                |(new_version, file_length, crc32)| Message::Info {
                    new_version,
                    file_length,
                    crc32,
                }
            ),
            (any::<u32>(), any::<u32>(), any::<u32>()).prop_map(
                |(new_version, file_length, ipg_us)| Message::Rdy {
                    new_version,
                    file_length,
                    ipg_us,
                }
            ),
            prop::collection::vec(any::<u8>(), 1..=header::MAX_PAYLOAD)
                .prop_map(|payload| Message::Data { payload }),
            any::<u32>().prop_map(|retransmit_psn| Message::Rtx { retransmit_psn }),
            (any::<u32>(), any::<u32>(), any::<u32>()).prop_map(
                |(new_version, file_length, crc32)| Message::Done {
                    new_version,
                    file_length,
                    crc32,
                }
            ),
            Just(Message::Fin),
            Just(Message::Cxl),
        ]
    }

    proptest! {
        #[test]
        fn message_payload_round_trips(message in arb_message()) {
            let encoded = message.encode_payload();
            let decoded = Message::decode_payload(message.kind(), &encoded).unwrap();
            prop_assert_eq!(decoded, message);
        }

        #[test]
        fn frame_round_trips(
            tpn in 1u32..=1000,
            psn in 0u32..1000,
            payload in prop::collection::vec(any::<u8>(), 0..=header::MAX_PAYLOAD),
        ) {
            let psn = psn % tpn;
            let header = header::Header {
                magic: header::MAGIC,
                spid: header::SERVER_PID,
                dpid: 0,
                tpn,
                tpl: payload.len() as u32,
                xid: Kind::Data.xid(),
                crc32: 0,
                psn,
                pl: 0,
            };
            let bytes = Frame::encode(header, &payload);
            let frame = Frame::decode(&bytes).unwrap();
            prop_assert_eq!(frame.payload, payload);
            prop_assert_eq!(frame.header.psn, psn);
            prop_assert_eq!(frame.header.tpn, tpn);
        }
    }
}
