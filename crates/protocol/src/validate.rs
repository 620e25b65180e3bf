//! Pure validation and geometry helpers shared by the server and client
//! transaction state machines (spec.md §5, §6).

use crate::header::MAX_PAYLOAD;

/// Lower clamp for the inter-packet gap a client may request, in microseconds.
pub const IPG_MIN_US: u32 = 100;

/// Upper clamp for the inter-packet gap a client may request, in microseconds.
pub const IPG_MAX_US: u32 = 300;

/// Clamps a client-proposed inter-packet gap into `[IPG_MIN_US, IPG_MAX_US]`.
#[must_use]
pub const fn clamp_ipg_us(ipg_us: u32) -> u32 {
    if ipg_us < IPG_MIN_US {
        IPG_MIN_US
    } else if ipg_us > IPG_MAX_US {
        IPG_MAX_US
    } else {
        ipg_us
    }
}

/// Computes the total packet number for a file of `file_length` bytes.
///
/// A zero-length file is still one packet (an empty final `DATA`).
#[must_use]
pub const fn tpn_for_size(file_length: u32) -> u32 {
    let payload_max = MAX_PAYLOAD as u32;
    if file_length == 0 {
        1
    } else {
        file_length.div_ceil(payload_max)
    }
}

/// Returns the expected `DATA` payload length for sequence number `psn` of
/// `tpn` total packets covering `file_length` bytes.
///
/// Every packet before the last carries a full [`MAX_PAYLOAD`]; the last
/// carries the remainder (or zero, for an empty file).
#[must_use]
pub const fn data_payload_len(psn: u32, tpn: u32, file_length: u32) -> u32 {
    let payload_max = MAX_PAYLOAD as u32;
    if psn + 1 < tpn {
        payload_max
    } else {
        let full = (tpn - 1) * payload_max;
        file_length.saturating_sub(full)
    }
}

/// Reports whether a received `DATA` payload has the length expected for its
/// position in the transfer.
#[must_use]
pub const fn data_payload_len_is_valid(
    psn: u32,
    tpn: u32,
    file_length: u32,
    actual_len: u32,
) -> bool {
    actual_len == data_payload_len(psn, tpn, file_length)
}

/// Reports whether a client's `DONE` metadata matches the server's `INFO`.
#[must_use]
pub const fn done_matches(
    info_version: u32,
    info_length: u32,
    info_crc32: u32,
    done_version: u32,
    done_length: u32,
    done_crc32: u32,
) -> bool {
    info_version == done_version && info_length == done_length && info_crc32 == done_crc32
}

/// Reports whether an `RTX` sequence number is a legal retransmission point.
///
/// `retransmit_psn` must name an already-sent packet: strictly less than
/// `tpn`, and no greater than the highest sequence number sent so far.
#[must_use]
pub const fn rtx_in_bounds(retransmit_psn: u32, tpn: u32, highest_sent_psn: u32) -> bool {
    retransmit_psn < tpn && retransmit_psn <= highest_sent_psn
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_respects_bounds() {
        assert_eq!(clamp_ipg_us(0), IPG_MIN_US);
        assert_eq!(clamp_ipg_us(10_000), IPG_MAX_US);
        assert_eq!(clamp_ipg_us(200), 200);
    }

    #[test]
    fn tpn_covers_exact_and_partial_final_packet() {
        assert_eq!(tpn_for_size(0), 1);
        assert_eq!(tpn_for_size(1), 1);
        assert_eq!(tpn_for_size(MAX_PAYLOAD as u32), 1);
        assert_eq!(tpn_for_size(MAX_PAYLOAD as u32 + 1), 2);
        assert_eq!(tpn_for_size(MAX_PAYLOAD as u32 * 3), 3);
    }

    #[test]
    fn data_payload_len_full_then_remainder() {
        let file_length = MAX_PAYLOAD as u32 + 10;
        let tpn = tpn_for_size(file_length);
        assert_eq!(tpn, 2);
        assert_eq!(data_payload_len(0, tpn, file_length), MAX_PAYLOAD as u32);
        assert_eq!(data_payload_len(1, tpn, file_length), 10);
    }

    #[test]
    fn data_payload_len_empty_file_is_zero() {
        assert_eq!(data_payload_len(0, 1, 0), 0);
    }

    #[test]
    fn done_matches_requires_all_three_fields() {
        assert!(done_matches(1, 100, 0xABCD, 1, 100, 0xABCD));
        assert!(!done_matches(1, 100, 0xABCD, 1, 100, 0xABCE));
        assert!(!done_matches(1, 100, 0xABCD, 2, 100, 0xABCD));
    }

    #[test]
    fn rtx_bounds_reject_future_and_overflow() {
        assert!(rtx_in_bounds(3, 10, 5));
        assert!(rtx_in_bounds(5, 10, 5));
        assert!(!rtx_in_bounds(6, 10, 5));
        assert!(!rtx_in_bounds(10, 10, 9));
    }
}
