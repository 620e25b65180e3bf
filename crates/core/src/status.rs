//! Transaction status: the last message either side sent or received that
//! advanced a conversation (spec.md §3.3, §4.3, §4.4).

use std::sync::atomic::{AtomicU32, Ordering};

/// A transaction's negotiation status.
///
/// Unlike [`protocol::Kind`], this has no `Rtx` variant: an `RTX` arms the
/// retransmission slot but never itself advances the negotiation state.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Server announced a new version; client has not yet responded.
    Ntf = 0,
    /// Client reported its current version.
    Chk = 1,
    /// Server announced file metadata.
    Info = 2,
    /// Client accepted the transfer and proposed a pacing gap.
    Rdy = 3,
    /// Server is streaming `DATA`.
    Data = 4,
    /// Client reported a verified, complete download.
    Done = 5,
    /// Transfer completed successfully; terminal.
    Fin = 6,
    /// Transfer aborted; terminal.
    Cxl = 7,
}

impl Status {
    const fn from_u32(value: u32) -> Status {
        match value {
            0 => Status::Ntf,
            1 => Status::Chk,
            2 => Status::Info,
            3 => Status::Rdy,
            4 => Status::Data,
            5 => Status::Done,
            6 => Status::Fin,
            _ => Status::Cxl,
        }
    }

    /// Reports whether this status ends a transaction's lifecycle.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Status::Fin | Status::Cxl)
    }
}

/// An [`Status`] stored behind an [`AtomicU32`], for cross-thread status
/// updates without a lock (spec.md §5 "per-transaction status ... are
/// atomics").
#[derive(Debug)]
pub struct AtomicStatus(AtomicU32);

impl AtomicStatus {
    /// Creates a new cell holding `initial`.
    #[must_use]
    pub fn new(initial: Status) -> AtomicStatus {
        AtomicStatus(AtomicU32::new(initial as u32))
    }

    /// Loads the current status.
    #[must_use]
    pub fn load(&self) -> Status {
        Status::from_u32(self.0.load(Ordering::SeqCst))
    }

    /// Stores a new status.
    pub fn store(&self, status: Status) {
        self.0.store(status as u32, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_atomic() {
        let cell = AtomicStatus::new(Status::Ntf);
        assert_eq!(cell.load(), Status::Ntf);
        cell.store(Status::Data);
        assert_eq!(cell.load(), Status::Data);
    }

    #[test]
    fn terminal_statuses() {
        assert!(Status::Fin.is_terminal());
        assert!(Status::Cxl.is_terminal());
        assert!(!Status::Data.is_terminal());
    }
}
