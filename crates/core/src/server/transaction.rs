//! The server-side transaction state machine (spec.md §4.3).

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use protocol::header::{Header, MAGIC, MAX_PAYLOAD, SERVER_PID};
use protocol::{validate, Frame, Kind, Message};

use crate::dispatch::SendDatagram;
use crate::fs_crc;
use crate::status::{AtomicStatus, Status};

/// One outbound file transfer to a single client.
///
/// Mirrors the reference's per-peer transaction object: sequence number and
/// status live in atomics so the dispatcher thread and the paced sender
/// thread can observe them without a lock (spec.md §5).
pub struct ServerTransaction {
    endpoint: Arc<dyn SendDatagram>,
    file_path: PathBuf,
    new_file_version: u32,
    new_file_size: u32,
    new_file_crc32: u32,
    device_id: u16,
    client_addr: Mutex<SocketAddr>,
    tpn: u32,
    psn: AtomicU32,
    /// Single-slot retransmission request; `u32::MAX` means empty (spec.md §5).
    retransmit_psn: AtomicU32,
    /// Inter-packet gap, clamped into `[IPG_MIN_US, IPG_MAX_US]` once `RDY` arrives.
    ipg_us: AtomicU32,
    status: AtomicStatus,
    wait_mutex: Mutex<()>,
    wait_cv: Condvar,
    sender_thread: Mutex<Option<JoinHandle<()>>>,
}

/// Sentinel value meaning "no retransmission armed".
const NO_RETRANSMIT: u32 = u32::MAX;

impl ServerTransaction {
    /// Creates a transaction for `file_path`, computing its size and CRC32
    /// up front (spec.md §3.3).
    ///
    /// # Errors
    ///
    /// Returns an [`std::io::Error`] if the file's size or contents cannot
    /// be read.
    pub(crate) fn new(
        endpoint: Arc<dyn SendDatagram>,
        client_addr: SocketAddr,
        file_path: PathBuf,
        file_version: u32,
        device_id: u16,
    ) -> std::io::Result<Arc<ServerTransaction>> {
        let (new_file_size, new_file_crc32) = fs_crc::size_and_crc32(&file_path)?;
        let tpn = validate::tpn_for_size(new_file_size);

        Ok(Arc::new(ServerTransaction {
            endpoint,
            file_path,
            new_file_version: file_version,
            new_file_size,
            new_file_crc32,
            device_id,
            client_addr: Mutex::new(client_addr),
            tpn,
            psn: AtomicU32::new(0),
            retransmit_psn: AtomicU32::new(NO_RETRANSMIT),
            ipg_us: AtomicU32::new(validate::IPG_MIN_US),
            status: AtomicStatus::new(Status::Ntf),
            wait_mutex: Mutex::new(()),
            wait_cv: Condvar::new(),
            sender_thread: Mutex::new(None),
        }))
    }

    /// Returns the transaction's current negotiation status.
    pub(crate) fn status(&self) -> Status {
        self.status.load()
    }

    fn advance(&self, status: Status) {
        self.status.store(status);
        self.wait_cv.notify_all();
    }

    /// Blocks until the status changes from its value at call time, or
    /// `timeout` elapses (spec.md §4.3, §5 "`WaitForStatus`").
    pub(crate) fn wait_for_status(&self, timeout: Duration) -> Option<Status> {
        let old = self.status.load();
        let guard = self.wait_mutex.lock().unwrap_or_else(|poison| poison.into_inner());
        let (_guard, result) = self
            .wait_cv
            .wait_timeout_while(guard, timeout, |()| self.status.load() == old)
            .unwrap_or_else(|poison| poison.into_inner());
        if result.timed_out() {
            None
        } else {
            Some(self.status.load())
        }
    }

    fn peer_addr(&self) -> SocketAddr {
        *self.client_addr.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    fn send_simple(&self, kind: Kind) {
        let payload = match kind {
            Kind::Ntf => Message::Ntf {
                new_version: self.new_file_version,
            },
            Kind::Info => Message::Info {
                new_version: self.new_file_version,
                file_length: self.new_file_size,
                crc32: self.new_file_crc32,
            },
            Kind::Fin | Kind::Cxl => {
                if kind == Kind::Fin {
                    Message::Fin
                } else {
                    Message::Cxl
                }
            }
            _ => {
                tracing::warn!(?kind, "server cannot send this kind directly");
                return;
            }
        };

        let bytes = payload.encode_payload();
        let header = Header {
            magic: MAGIC,
            spid: SERVER_PID,
            dpid: self.device_id,
            tpn: 1,
            tpl: bytes.len() as u32,
            xid: kind.xid(),
            crc32: 0,
            psn: 0,
            pl: 0,
        };
        let datagram = Frame::encode(header, &bytes);
        self.endpoint.send_to(&datagram, self.peer_addr());
    }

    /// Sends `kind`, transitioning the transaction's status and, for
    /// `DATA`, starting the paced sender thread.
    pub(crate) fn send_message(self: &Arc<Self>, kind: Kind) {
        match kind {
            Kind::Ntf => {
                self.advance(Status::Ntf);
                self.send_simple(kind);
            }
            Kind::Info => {
                self.advance(Status::Info);
                self.send_simple(kind);
            }
            Kind::Fin => {
                self.advance(Status::Fin);
                self.send_simple(kind);
            }
            Kind::Cxl => {
                self.advance(Status::Cxl);
                self.send_simple(kind);
            }
            Kind::Data => {
                self.advance(Status::Data);
                self.spawn_sender();
            }
            _ => tracing::warn!(?kind, "server cannot send this kind"),
        }
    }

    fn spawn_sender(self: &Arc<Self>) {
        let transaction = Arc::clone(self);
        let handle = std::thread::spawn(move || transaction.run_paced_sender());
        *self.sender_thread.lock().unwrap_or_else(|poison| poison.into_inner()) = Some(handle);
    }

    fn run_paced_sender(&self) {
        let mut file = match File::open(&self.file_path) {
            Ok(file) => file,
            Err(error) => {
                tracing::error!(%error, "failed to open file for paced send");
                self.advance(Status::Cxl);
                self.send_simple(Kind::Cxl);
                return;
            }
        };

        let mut psn = 0u32;
        let mut buf = vec![0u8; MAX_PAYLOAD];

        while psn < self.tpn {
            let start = Instant::now();

            if self.status.load() == Status::Cxl {
                return;
            }

            let armed = self.retransmit_psn.swap(NO_RETRANSMIT, Ordering::SeqCst);
            if armed != NO_RETRANSMIT {
                psn = armed;
            }
            self.psn.store(psn, Ordering::SeqCst);

            let payload_len = validate::data_payload_len(psn, self.tpn, self.new_file_size) as usize;
            let offset = u64::from(psn) * MAX_PAYLOAD as u64;

            if let Err(error) = file
                .seek(SeekFrom::Start(offset))
                .and_then(|_| file.read_exact(&mut buf[..payload_len]))
            {
                tracing::error!(%error, psn, "failed to read file for paced send");
                self.advance(Status::Cxl);
                self.send_simple(Kind::Cxl);
                return;
            }

            let header = Header {
                magic: MAGIC,
                spid: SERVER_PID,
                dpid: self.device_id,
                tpn: self.tpn,
                tpl: self.new_file_size,
                xid: Kind::Data.xid(),
                crc32: 0,
                psn,
                pl: 0,
            };
            let datagram = Frame::encode(header, &buf[..payload_len]);
            self.endpoint.send_to(&datagram, self.peer_addr());

            psn += 1;

            let ipg = Duration::from_micros(u64::from(self.ipg_us.load(Ordering::SeqCst)));
            let deadline = start + ipg;
            let now = Instant::now();
            if deadline > now {
                std::thread::sleep(deadline - now);
            }
        }

        self.psn.store(self.tpn, Ordering::SeqCst);
    }

    /// Handles one inbound datagram (spec.md §4.3 transitions).
    pub(crate) fn on_receive(self: &Arc<Self>, frame: &Frame, addr: SocketAddr) {
        *self.client_addr.lock().unwrap_or_else(|poison| poison.into_inner()) = addr;

        let Ok(kind) = Kind::try_from(frame.header.xid) else {
            tracing::warn!(peer = %addr, xid = frame.header.xid, "unknown message kind");
            return;
        };

        match kind {
            Kind::Chk => {
                if self.status.load() != Status::Ntf {
                    tracing::warn!(peer = %addr, "CHK received outside NTF state");
                    return;
                }
                let Ok(Message::Chk { .. }) = Message::decode_payload(kind, &frame.payload) else {
                    tracing::warn!(peer = %addr, "malformed CHK payload");
                    return;
                };
                self.advance(Status::Chk);
            }
            Kind::Rdy => {
                if self.status.load() != Status::Info {
                    tracing::warn!(peer = %addr, "RDY received outside INFO state");
                    return;
                }
                let Ok(Message::Rdy { ipg_us, .. }) = Message::decode_payload(kind, &frame.payload) else {
                    tracing::warn!(peer = %addr, "malformed RDY payload");
                    return;
                };
                self.ipg_us.store(validate::clamp_ipg_us(ipg_us), Ordering::SeqCst);
                self.advance(Status::Rdy);
            }
            Kind::Done => {
                if self.status.load() != Status::Data {
                    tracing::warn!(peer = %addr, "DONE received outside DATA state");
                    return;
                }
                if self.psn.load(Ordering::SeqCst) != self.tpn {
                    tracing::warn!(peer = %addr, "DONE received before all DATA sent");
                    return;
                }
                let Ok(Message::Done {
                    new_version,
                    file_length,
                    crc32,
                }) = Message::decode_payload(kind, &frame.payload)
                else {
                    tracing::warn!(peer = %addr, "malformed DONE payload");
                    return;
                };
                if !validate::done_matches(
                    self.new_file_version,
                    self.new_file_size,
                    self.new_file_crc32,
                    new_version,
                    file_length,
                    crc32,
                ) {
                    tracing::warn!(peer = %addr, "DONE metadata mismatch, dropping");
                    return;
                }
                self.advance(Status::Done);
            }
            Kind::Rtx => {
                if self.status.load() != Status::Data {
                    tracing::warn!(peer = %addr, "RTX received outside DATA state");
                    return;
                }
                let Ok(Message::Rtx { retransmit_psn }) = Message::decode_payload(kind, &frame.payload) else {
                    tracing::warn!(peer = %addr, "malformed RTX payload");
                    return;
                };
                let current = self.psn.load(Ordering::SeqCst);
                if !validate::rtx_in_bounds(retransmit_psn, self.tpn, current) {
                    tracing::warn!(peer = %addr, retransmit_psn, current, "RTX out of bounds");
                    return;
                }
                self.retransmit_psn.store(retransmit_psn, Ordering::SeqCst);
            }
            Kind::Cxl => {
                self.advance(Status::Cxl);
            }
            Kind::Ntf | Kind::Info | Kind::Data | Kind::Fin => {
                tracing::warn!(peer = %addr, ?kind, "unexpected server-bound kind");
            }
        }
    }

    /// Joins the paced sender thread, if one was started.
    pub(crate) fn join_sender(&self) {
        let handle = self
            .sender_thread
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

}
