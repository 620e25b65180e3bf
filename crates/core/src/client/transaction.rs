//! The client-side transaction state machine (spec.md §4.4).

use std::fs::{self, File, OpenOptions};
use std::io::Write as _;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use protocol::header::{Header, CLIENT_PID, MAGIC};
use protocol::{validate, Frame, Kind, Message};

use crate::dispatch::SendDatagram;
use crate::fs_crc;
use crate::status::Status;

/// Callback invoked once a file has been staged, verified, and confirmed
/// (spec.md §4.4 "FIN" transition).
type FileReceivedHandler = dyn Fn(&std::path::Path, u32) + Send + Sync;

/// Mutable state for the single transaction a [`ClientTransaction`] may be
/// running at a time. Held behind one mutex rather than atomics: the
/// staging file handle and the byte-accounting fields change together and
/// there is no second thread racing the dispatcher for this state.
struct ClientState {
    status: Status,
    server_addr: SocketAddr,
    tpn: u32,
    expected_psn: u32,
    file: Option<File>,
    staging_path: PathBuf,
    new_file_version: u32,
    new_file_size: u32,
    new_file_crc32: u32,
    last_activity: Instant,
}

impl ClientState {
    fn idle(staging_path: PathBuf) -> ClientState {
        ClientState {
            status: Status::Ntf,
            server_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            tpn: 0,
            expected_psn: 0,
            file: None,
            staging_path,
            new_file_version: 0,
            new_file_size: 0,
            new_file_crc32: 0,
            last_activity: Instant::now(),
        }
    }
}

/// One inbound file transfer from a single server, at most one at a time
/// (spec.md §4.4, §6 "single active transaction").
pub(crate) struct ClientTransaction {
    endpoint: Arc<dyn SendDatagram>,
    cur_file_version: u32,
    initial_ipg_us: u32,
    idle_timeout: Duration,
    staging_dir: PathBuf,
    is_active: std::sync::atomic::AtomicBool,
    state: Mutex<ClientState>,
    handler: Mutex<Option<Box<FileReceivedHandler>>>,
}

impl ClientTransaction {
    pub(crate) fn new(
        endpoint: Arc<dyn SendDatagram>,
        cur_file_version: u32,
        initial_ipg_us: u32,
        idle_timeout: Duration,
        staging_dir: PathBuf,
    ) -> ClientTransaction {
        let staging_path = staging_dir.join("trftp_staging_file");
        ClientTransaction {
            endpoint,
            cur_file_version,
            initial_ipg_us,
            idle_timeout,
            staging_dir,
            is_active: std::sync::atomic::AtomicBool::new(false),
            state: Mutex::new(ClientState::idle(staging_path)),
            handler: Mutex::new(None),
        }
    }

    /// Registers the file-received handler, replacing any previous one.
    pub(crate) fn attach_handler<F>(&self, handler: F)
    where
        F: Fn(&std::path::Path, u32) + Send + Sync + 'static,
    {
        *self.handler.lock().unwrap_or_else(|poison| poison.into_inner()) = Some(Box::new(handler));
    }

    /// Removes the file-received handler, if any.
    pub(crate) fn detach_handler(&self) {
        *self.handler.lock().unwrap_or_else(|poison| poison.into_inner()) = None;
    }

    /// Routes one inbound datagram (spec.md §4.4 dispatcher gate: a `NTF`
    /// while idle starts a transaction, any `NTF` while active is dropped).
    pub(crate) fn dispatch(&self, frame: &Frame, addr: SocketAddr) {
        let Ok(kind) = Kind::try_from(frame.header.xid) else {
            tracing::warn!(peer = %addr, xid = frame.header.xid, "unknown message kind");
            return;
        };

        let active = self.is_active.load(std::sync::atomic::Ordering::SeqCst);
        match (active, kind) {
            (false, Kind::Ntf) => self.begin(frame, addr),
            (true, _) => self.on_receive(kind, frame, addr),
            (false, _) => tracing::warn!(peer = %addr, ?kind, "no active transaction; dropping"),
        }
    }

    /// Checks whether the active transaction has gone idle past its
    /// configured window (spec.md §4.4 "On the client's own receive
    /// timeout"), called by the dispatcher loop after every receive
    /// timeout.
    pub(crate) fn check_idle(&self) {
        if !self.is_active.load(std::sync::atomic::Ordering::SeqCst) {
            return;
        }
        let stale = {
            let state = self.state.lock().unwrap_or_else(|poison| poison.into_inner());
            state.last_activity.elapsed() > self.idle_timeout
        };
        if stale {
            tracing::info!("client transaction idle timeout, cancelling");
            self.cancel(true);
        }
    }

    fn begin(&self, frame: &Frame, addr: SocketAddr) {
        let Ok(Message::Ntf { new_version }) = Message::decode_payload(Kind::Ntf, &frame.payload) else {
            tracing::warn!(peer = %addr, "malformed NTF payload");
            return;
        };

        let staging_path = self.staging_dir.join("trftp_staging_file");
        let mut state = self.state.lock().unwrap_or_else(|poison| poison.into_inner());
        *state = ClientState::idle(staging_path);
        state.server_addr = addr;
        state.new_file_version = new_version;
        state.last_activity = Instant::now();
        drop(state);

        self.is_active.store(true, std::sync::atomic::Ordering::SeqCst);
        self.send_message(Kind::Chk);
        self.advance(Status::Chk);
    }

    fn advance(&self, status: Status) {
        self.state.lock().unwrap_or_else(|poison| poison.into_inner()).status = status;
    }

    fn on_receive(&self, kind: Kind, frame: &Frame, addr: SocketAddr) {
        self.state.lock().unwrap_or_else(|poison| poison.into_inner()).last_activity = Instant::now();

        match kind {
            Kind::Info => self.handle_info(frame, addr),
            Kind::Data => self.handle_data(frame, addr),
            Kind::Fin => self.handle_fin(addr),
            Kind::Cxl => self.handle_cxl(),
            Kind::Ntf | Kind::Chk | Kind::Rdy | Kind::Rtx | Kind::Done => {
                tracing::warn!(peer = %addr, ?kind, "unexpected client-bound kind");
            }
        }
    }

    fn handle_info(&self, frame: &Frame, addr: SocketAddr) {
        let expected_version = {
            let state = self.state.lock().unwrap_or_else(|poison| poison.into_inner());
            if state.status != Status::Chk {
                tracing::warn!(peer = %addr, "INFO received outside CHK state");
                return;
            }
            state.new_file_version
        };

        let Ok(Message::Info {
            new_version,
            file_length,
            crc32,
        }) = Message::decode_payload(Kind::Info, &frame.payload)
        else {
            self.cancel(true);
            return;
        };

        if new_version != expected_version || file_length == 0 {
            tracing::warn!(peer = %addr, "INFO violates NTF agreement, cancelling");
            self.cancel(true);
            return;
        }

        let tpn = validate::tpn_for_size(file_length);
        let staging_path = {
            let state = self.state.lock().unwrap_or_else(|poison| poison.into_inner());
            state.staging_path.clone()
        };

        let file = match OpenOptions::new().create(true).write(true).truncate(true).open(&staging_path) {
            Ok(file) => file,
            Err(error) => {
                tracing::error!(%error, "failed to open staging file");
                self.cancel(true);
                return;
            }
        };

        {
            let mut state = self.state.lock().unwrap_or_else(|poison| poison.into_inner());
            state.tpn = tpn;
            state.expected_psn = 0;
            state.file = Some(file);
            state.new_file_size = file_length;
            state.new_file_crc32 = crc32;
            state.status = Status::Rdy;
        }

        self.send_message(Kind::Rdy);
    }

    fn handle_data(&self, frame: &Frame, addr: SocketAddr) {
        let psn = frame.header.psn;
        let mut state = self.state.lock().unwrap_or_else(|poison| poison.into_inner());

        let position_ok = matches!(state.status, Status::Rdy | Status::Data);
        if !position_ok {
            tracing::warn!(peer = %addr, "DATA received outside RDY/DATA state");
            drop(state);
            self.cancel(true);
            return;
        }

        let Ok(Message::Data { payload }) = Message::decode_payload(Kind::Data, &frame.payload) else {
            drop(state);
            self.cancel(true);
            return;
        };

        if psn != state.expected_psn {
            let retransmit_psn = state.expected_psn;
            drop(state);
            self.send_message_with(Kind::Rtx, |message, state| {
                *message = Message::Rtx { retransmit_psn };
                let _ = state;
            });
            return;
        }

        if !validate::data_payload_len_is_valid(psn, state.tpn, state.new_file_size, payload.len() as u32) {
            tracing::warn!(peer = %addr, psn, "DATA payload length mismatch, cancelling");
            drop(state);
            self.cancel(true);
            return;
        }

        let write_result = state.file.as_mut().expect("staging file open in DATA phase").write_all(&payload);
        if let Err(error) = write_result {
            tracing::error!(%error, "failed to write staging file");
            drop(state);
            self.cancel(true);
            return;
        }

        state.expected_psn += 1;
        let complete = state.expected_psn == state.tpn;
        state.status = Status::Data;

        if !complete {
            return;
        }

        state.file = None;
        let (expected_size, expected_crc32, expected_version, staging_path) =
            (state.new_file_size, state.new_file_crc32, state.new_file_version, state.staging_path.clone());
        drop(state);

        let (actual_size, actual_crc32) = match fs_crc::size_and_crc32(&staging_path) {
            Ok(pair) => pair,
            Err(error) => {
                tracing::error!(%error, "failed to verify staged file");
                self.cancel(true);
                return;
            }
        };

        if !validate::done_matches(expected_version, expected_size, expected_crc32, expected_version, actual_size, actual_crc32) {
            tracing::warn!(peer = %addr, "staged file failed verification, cancelling");
            self.cancel(true);
            return;
        }

        self.advance(Status::Done);
        self.send_message(Kind::Done);
    }

    fn handle_fin(&self, addr: SocketAddr) {
        let (version, staging_path) = {
            let state = self.state.lock().unwrap_or_else(|poison| poison.into_inner());
            if state.status != Status::Done {
                tracing::warn!(peer = %addr, "FIN received outside DONE state");
                return;
            }
            (state.new_file_version, state.staging_path.clone())
        };

        self.is_active.store(false, std::sync::atomic::Ordering::SeqCst);

        if let Some(handler) = self.handler.lock().unwrap_or_else(|poison| poison.into_inner()).as_ref() {
            handler(&staging_path, version);
        }
    }

    fn handle_cxl(&self) {
        self.cancel(true);
    }

    /// Aborts the active transaction: deletes the staging file, becomes
    /// idle, and optionally notifies the peer.
    fn cancel(&self, notify_peer: bool) {
        let staging_path = {
            let mut state = self.state.lock().unwrap_or_else(|poison| poison.into_inner());
            state.file = None;
            state.staging_path.clone()
        };
        let _ = fs::remove_file(&staging_path);
        self.is_active.store(false, std::sync::atomic::Ordering::SeqCst);
        if notify_peer {
            self.send_message(Kind::Cxl);
        }
    }

    fn send_message(&self, kind: Kind) {
        self.send_message_with(kind, |_, _| {});
    }

    fn send_message_with(&self, kind: Kind, customize: impl FnOnce(&mut Message, &ClientState)) {
        let (server_addr, message) = {
            let state = self.state.lock().unwrap_or_else(|poison| poison.into_inner());
            let mut message = match kind {
                Kind::Chk => Message::Chk {
                    cur_version: self.cur_file_version,
                },
                Kind::Rdy => Message::Rdy {
                    new_version: state.new_file_version,
                    file_length: state.new_file_size,
                    ipg_us: validate::clamp_ipg_us(self.initial_ipg_us),
                },
                Kind::Done => Message::Done {
                    new_version: state.new_file_version,
                    file_length: state.new_file_size,
                    crc32: state.new_file_crc32,
                },
                Kind::Rtx => Message::Rtx { retransmit_psn: 0 },
                Kind::Cxl => Message::Cxl,
                _ => {
                    tracing::warn!(?kind, "client cannot send this kind");
                    return;
                }
            };
            customize(&mut message, &state);
            (state.server_addr, message)
        };

        let bytes = message.encode_payload();
        let header = Header {
            magic: MAGIC,
            spid: CLIENT_PID,
            dpid: 0,
            tpn: 1,
            tpl: bytes.len() as u32,
            xid: kind.xid(),
            crc32: 0,
            psn: 0,
            pl: 0,
        };
        let datagram = Frame::encode(header, &bytes);
        self.endpoint.send_to(&datagram, server_addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Mutex as StdMutex;

    struct RecordingEndpoint(StdMutex<Vec<(Vec<u8>, SocketAddr)>>);

    impl SendDatagram for RecordingEndpoint {
        fn send_to(&self, buf: &[u8], addr: SocketAddr) {
            self.0.lock().unwrap().push((buf.to_vec(), addr));
        }
    }

    fn sample_addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9001)
    }

    fn frame_for(kind: Kind, message: &Message, psn: u32, tpn: u32) -> Frame {
        let bytes = message.encode_payload();
        let header = Header {
            magic: MAGIC,
            spid: 0,
            dpid: 0,
            tpn,
            tpl: bytes.len() as u32,
            xid: kind.xid(),
            crc32: 0,
            psn,
            pl: 0,
        };
        let datagram = Frame::encode(header, &bytes);
        Frame::decode(&datagram).unwrap()
    }

    #[test]
    fn ntf_while_idle_starts_transaction_and_sends_chk() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = Arc::new(RecordingEndpoint(StdMutex::new(Vec::new())));
        let tran = ClientTransaction::new(
            endpoint.clone(),
            0,
            100,
            Duration::from_secs(3),
            dir.path().to_path_buf(),
        );

        let frame = frame_for(Kind::Ntf, &Message::Ntf { new_version: 5 }, 0, 1);
        tran.dispatch(&frame, sample_addr());

        assert!(tran.is_active.load(std::sync::atomic::Ordering::SeqCst));
        let sent = endpoint.0.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let decoded = Frame::decode(&sent[0].0).unwrap();
        assert_eq!(Kind::try_from(decoded.header.xid).unwrap(), Kind::Chk);
    }

    #[test]
    fn ntf_while_active_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = Arc::new(RecordingEndpoint(StdMutex::new(Vec::new())));
        let tran = ClientTransaction::new(
            endpoint.clone(),
            0,
            100,
            Duration::from_secs(3),
            dir.path().to_path_buf(),
        );

        let first = frame_for(Kind::Ntf, &Message::Ntf { new_version: 5 }, 0, 1);
        tran.dispatch(&first, sample_addr());
        endpoint.0.lock().unwrap().clear();

        let second = frame_for(Kind::Ntf, &Message::Ntf { new_version: 6 }, 0, 1);
        tran.dispatch(&second, sample_addr());

        assert!(endpoint.0.lock().unwrap().is_empty());
        assert_eq!(
            tran.state.lock().unwrap().new_file_version,
            5,
            "second NTF must not overwrite the active transaction"
        );
    }

    #[test]
    fn info_with_mismatched_version_cancels() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = Arc::new(RecordingEndpoint(StdMutex::new(Vec::new())));
        let tran = ClientTransaction::new(
            endpoint.clone(),
            0,
            100,
            Duration::from_secs(3),
            dir.path().to_path_buf(),
        );

        let ntf = frame_for(Kind::Ntf, &Message::Ntf { new_version: 5 }, 0, 1);
        tran.dispatch(&ntf, sample_addr());

        let info = frame_for(
            Kind::Info,
            &Message::Info {
                new_version: 6,
                file_length: 10,
                crc32: 0,
            },
            0,
            1,
        );
        tran.dispatch(&info, sample_addr());

        assert!(!tran.is_active.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn data_out_of_order_requests_retransmit_without_advancing() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = Arc::new(RecordingEndpoint(StdMutex::new(Vec::new())));
        let tran = ClientTransaction::new(
            endpoint.clone(),
            0,
            100,
            Duration::from_secs(3),
            dir.path().to_path_buf(),
        );

        let file_length = protocol::header::MAX_PAYLOAD as u32 + 10;
        let ntf = frame_for(Kind::Ntf, &Message::Ntf { new_version: 1 }, 0, 1);
        tran.dispatch(&ntf, sample_addr());
        let info = frame_for(
            Kind::Info,
            &Message::Info {
                new_version: 1,
                file_length,
                crc32: 0,
            },
            0,
            1,
        );
        tran.dispatch(&info, sample_addr());
        endpoint.0.lock().unwrap().clear();

        let second_chunk = vec![0u8; 10];
        let out_of_order = frame_for(Kind::Data, &Message::Data { payload: second_chunk }, 1, 2);
        tran.dispatch(&out_of_order, sample_addr());

        let sent = endpoint.0.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let decoded = Frame::decode(&sent[0].0).unwrap();
        assert_eq!(Kind::try_from(decoded.header.xid).unwrap(), Kind::Rtx);
        assert_eq!(tran.state.lock().unwrap().expected_psn, 0);
    }

    #[test]
    fn full_transfer_verifies_and_sends_done() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = Arc::new(RecordingEndpoint(StdMutex::new(Vec::new())));
        let tran = ClientTransaction::new(
            endpoint.clone(),
            0,
            100,
            Duration::from_secs(3),
            dir.path().to_path_buf(),
        );

        let contents = b"hello trftp";
        let ntf = frame_for(Kind::Ntf, &Message::Ntf { new_version: 1 }, 0, 1);
        tran.dispatch(&ntf, sample_addr());
        let info = frame_for(
            Kind::Info,
            &Message::Info {
                new_version: 1,
                file_length: contents.len() as u32,
                crc32: protocol::crc::checksum(contents),
            },
            0,
            1,
        );
        tran.dispatch(&info, sample_addr());
        endpoint.0.lock().unwrap().clear();

        let data = frame_for(Kind::Data, &Message::Data { payload: contents.to_vec() }, 0, 1);
        tran.dispatch(&data, sample_addr());

        let sent = endpoint.0.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let decoded = Frame::decode(&sent[0].0).unwrap();
        assert_eq!(Kind::try_from(decoded.header.xid).unwrap(), Kind::Done);
        assert_eq!(tran.state.lock().unwrap().status, Status::Done);
    }
}
