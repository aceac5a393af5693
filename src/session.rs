//! Per-connection orchestration: one reader task, one writer task and a
//! single event queue in between. Every automaton-mutating event (inbound
//! frame, restart-timer expiry, pppd exit) goes through that queue, so the
//! per-connection state is only ever touched from one place.

use anyhow::Result;
use tokio::io::{split, AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::select;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::SstpError;
use crate::log::{log_frame, log_line};
use crate::ppp::PppConnection;
use crate::sstp::{
    build_connect_ack_packet, build_disconnect_ack_packet, build_echo_response_packet,
    decode_header, parse_control,
};
use crate::types::{MessageType, SessionConfig, SstpControlPacket};

/// Lifecycle of one TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Handshaking,
    Active,
    Closing,
    Closed,
}

/// Everything the session loop reacts to, serialized per connection.
#[derive(Debug)]
pub enum SessionEvent {
    Frame { is_control: bool, data: Vec<u8> },
    /// Reader finished: None is a clean client disconnect.
    Closed(Option<SstpError>),
    LcpTimeout { generation: u64 },
    PppdExited,
}

enum Flow {
    Continue,
    Disconnect,
}

struct Session {
    config: SessionConfig,
    out_tx: mpsc::Sender<Vec<u8>>,
    evt_tx: mpsc::Sender<SessionEvent>,
    cancel: CancellationToken,
    ppp: Option<PppConnection>,
}

/// Run the session loop over a hijacked connection until the client
/// disconnects, asks to disconnect, or something fatal happens.
pub async fn run_session(
    stream: TcpStream,
    config: SessionConfig,
    cancel: CancellationToken,
) -> Result<()> {
    let mut state = SessionState::Active;
    log_line(&format!("Session {state:?}"));
    let (reader, writer) = split(stream);

    let (out_tx, out_rx) = mpsc::channel::<Vec<u8>>(64);
    let (evt_tx, mut evt_rx) = mpsc::channel::<SessionEvent>(64);

    let writer_handle = tokio::spawn(write_loop(writer, out_rx, cancel.clone()));
    let reader_cancel = cancel.child_token();
    tokio::spawn(read_loop(reader, evt_tx.clone(), reader_cancel.clone()));

    let mut session = Session {
        config,
        out_tx,
        evt_tx,
        cancel: cancel.clone(),
        ppp: None,
    };

    let mut result = Ok(());
    while let Some(event) = evt_rx.recv().await {
        match event {
            SessionEvent::Frame {
                is_control: true,
                data,
            } => match parse_control(&data) {
                Ok(packet) => match session.handle_control(packet).await {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Disconnect) => break,
                    Err(e) => {
                        result = Err(e.into());
                        break;
                    }
                },
                Err(e) => {
                    result = Err(e.into());
                    break;
                }
            },
            SessionEvent::Frame {
                is_control: false,
                data,
            } => {
                if let Err(e) = session.handle_data(&data).await {
                    result = Err(e.into());
                    break;
                }
            }
            SessionEvent::LcpTimeout { generation } => {
                if let Err(e) = session.handle_lcp_timeout(generation).await {
                    result = Err(e.into());
                    break;
                }
            }
            SessionEvent::PppdExited => {
                log_line("pppd exited, closing session");
                break;
            }
            SessionEvent::Closed(None) => {
                log_line("Client disconnected");
                break;
            }
            SessionEvent::Closed(Some(e)) => {
                result = Err(e.into());
                break;
            }
        }
    }

    state = SessionState::Closing;
    log_line(&format!("Session {state:?}"));
    if let Some(mut ppp) = session.ppp.take() {
        let _ = ppp.close().await;
    }
    reader_cancel.cancel();
    // Dropping the session releases its outbound sender; the writer drains
    // whatever is queued (e.g. the disconnect ack) and exits on channel close.
    drop(session);
    let _ = writer_handle.await;
    state = SessionState::Closed;
    log_line(&format!("Session finished ({state:?})"));

    result
}

impl Session {
    async fn handle_control(&mut self, packet: SstpControlPacket) -> Result<Flow, SstpError> {
        log_line(&format!("read: {packet}"));

        match packet.message_type {
            MessageType::CallConnectRequest => {
                self.send(build_connect_ack_packet()).await?;
                // Only PPP exists as an encapsulated protocol, so there is
                // nothing to Nak a connect request over.
                if self.ppp.is_some() {
                    log_line("Duplicate CallConnectRequest, PPP already running");
                    return Ok(Flow::Continue);
                }
                let mut conn = PppConnection::new(
                    &self.config,
                    self.out_tx.clone(),
                    self.evt_tx.clone(),
                    self.cancel.clone(),
                );
                conn.start().await?;
                self.ppp = Some(conn);
                Ok(Flow::Continue)
            }
            MessageType::CallDisconnect => {
                self.send(build_disconnect_ack_packet()).await?;
                if let Some(mut ppp) = self.ppp.take() {
                    ppp.close().await?;
                }
                Ok(Flow::Disconnect)
            }
            MessageType::EchoRequest => {
                // We only answer echoes; no hello timer runs on this side.
                self.send(build_echo_response_packet()).await?;
                Ok(Flow::Continue)
            }
            MessageType::CallAbort => Err(SstpError::CallAborted),
            MessageType::CallConnected => {
                log_line("Call connected");
                Ok(Flow::Continue)
            }
            other => {
                if self.ppp.is_none() {
                    Err(SstpError::NoActivePppConnection(other.to_string()))
                } else {
                    log_line(&format!("Ignoring unexpected control message {other}"));
                    Ok(Flow::Continue)
                }
            }
        }
    }

    async fn handle_data(&mut self, data: &[u8]) -> Result<(), SstpError> {
        log_frame("read data", data);
        match self.ppp.as_mut() {
            Some(ppp) => {
                ppp.write(data).await?;
                Ok(())
            }
            None => Err(SstpError::PppNotStarted),
        }
    }

    async fn handle_lcp_timeout(&mut self, generation: u64) -> Result<(), SstpError> {
        match self.ppp.as_mut() {
            Some(PppConnection::Native(link)) => link.handle_timeout(generation).await,
            // A timer that outlived its connection is stale by definition.
            _ => Ok(()),
        }
    }

    async fn send(&self, packet: Vec<u8>) -> Result<(), SstpError> {
        log_frame("write", &packet);
        self.out_tx
            .send(packet)
            .await
            .map_err(|_| SstpError::WriteAfterClose)
    }
}

/// Read SSTP frames off the socket and feed them into the event queue.
/// Framing has no resync point, so the first bad header ends the session.
async fn read_loop(
    mut reader: ReadHalf<TcpStream>,
    evt_tx: mpsc::Sender<SessionEvent>,
    cancel: CancellationToken,
) {
    loop {
        let mut header = [0u8; 4];
        let read = select! {
            _ = cancel.cancelled() => return,
            r = reader.read_exact(&mut header) => r,
        };
        match read {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                let _ = evt_tx.send(SessionEvent::Closed(None)).await;
                return;
            }
            Err(e) => {
                let _ = evt_tx.send(SessionEvent::Closed(Some(e.into()))).await;
                return;
            }
        }

        let (is_control, to_read) = match decode_header(&header) {
            Ok(decoded) => decoded,
            Err(e) => {
                let _ = evt_tx.send(SessionEvent::Closed(Some(e))).await;
                return;
            }
        };

        let mut data = vec![0u8; to_read];
        let read = select! {
            _ = cancel.cancelled() => return,
            r = reader.read_exact(&mut data) => r,
        };
        if let Err(e) = read {
            // EOF in the middle of a frame is not a clean disconnect.
            let _ = evt_tx.send(SessionEvent::Closed(Some(e.into()))).await;
            return;
        }

        if evt_tx
            .send(SessionEvent::Frame { is_control, data })
            .await
            .is_err()
        {
            return;
        }
    }
}

/// Drain the outbound queue onto the socket in FIFO order. This is the only
/// task writing to the socket, so producers never need a lock on it.
async fn write_loop(
    mut writer: WriteHalf<TcpStream>,
    mut out_rx: mpsc::Receiver<Vec<u8>>,
    cancel: CancellationToken,
) {
    loop {
        let packet = select! {
            _ = cancel.cancelled() => break,
            p = out_rx.recv() => p,
        };
        match packet {
            Some(packet) => {
                if let Err(e) = writer.write_all(&packet).await {
                    log_line(&format!("Socket write failed: {e}"));
                    break;
                }
            }
            None => break,
        }
    }
    let _ = writer.shutdown().await;
}
