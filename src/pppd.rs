//! Bridge between SSTP data payloads and an external pppd speaking
//! async-HDLC on its stdin/stdout.

use std::process::Stdio;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tokio::select;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::SstpError;
use crate::log::log_line;
use crate::session::SessionEvent;
use crate::sstp::pack_data_packet_fast;

pub const PPPD_OPTIONS_FILE: &str = "/etc/ppp/options.sstpd";

const PPP_FLAG: u8 = 0x7E;
const PPP_ESCAPE: u8 = 0x7D;

/// Escape control characters, the flag byte and the escape byte itself
/// before handing a payload to pppd.
pub fn ppp_escape(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &byte in data {
        if byte < 0x20 || byte == PPP_FLAG || byte == PPP_ESCAPE {
            out.push(PPP_ESCAPE);
            out.push(byte ^ 0x20);
        } else {
            out.push(byte);
        }
    }
    out
}

/// Streaming unescaper for pppd's stdout. 0x7D marks a one-byte lookahead
/// escape; the escape state survives across reads so a pair split between
/// two chunks still decodes.
#[derive(Debug, Default)]
pub struct PppUnescaper {
    pending_escape: bool,
}

impl PppUnescaper {
    pub fn new() -> Self {
        PppUnescaper {
            pending_escape: false,
        }
    }

    pub fn feed(&mut self, input: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(input.len());
        for &byte in input {
            if self.pending_escape {
                out.push(byte ^ 0x20);
                self.pending_escape = false;
            } else if byte == PPP_ESCAPE {
                self.pending_escape = true;
            } else {
                out.push(byte);
            }
        }
        out
    }
}

/// One pppd process per connection. The bridge owns its stdin; stdout is
/// pumped by a background task into the session's outbound frame queue, and
/// a watcher task reports process exit.
pub struct PppdBridge {
    args: Vec<String>,
    stdin: Option<ChildStdin>,
    kill_token: CancellationToken,
    out_tx: mpsc::Sender<Vec<u8>>,
    evt_tx: mpsc::Sender<SessionEvent>,
    cancel: CancellationToken,
    pub is_started: bool,
}

impl PppdBridge {
    pub fn new(
        args: Vec<String>,
        out_tx: mpsc::Sender<Vec<u8>>,
        evt_tx: mpsc::Sender<SessionEvent>,
        cancel: CancellationToken,
    ) -> Self {
        PppdBridge {
            args,
            stdin: None,
            kill_token: CancellationToken::new(),
            out_tx,
            evt_tx,
            cancel,
            is_started: false,
        }
    }

    pub async fn start(&mut self) -> Result<(), SstpError> {
        let mut command = Command::new("pppd");
        command.arg("notty").arg("file").arg(PPPD_OPTIONS_FILE);
        command.args(&self.args);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let mut child = command
            .spawn()
            .map_err(|e| SstpError::Pppd(format!("failed to start pppd: {e}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SstpError::Pppd("pppd stdin not piped".into()))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| SstpError::Pppd("pppd stdout not piped".into()))?;
        self.stdin = Some(stdin);

        // stdout pump: unescape and wrap into SSTP data frames
        let out_tx = self.out_tx.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let mut unescaper = PppUnescaper::new();
            let mut buf = [0u8; 2048];
            loop {
                select! {
                    _ = cancel.cancelled() => break,
                    read = stdout.read(&mut buf) => match read {
                        Ok(0) => break,
                        Ok(n) => {
                            let unescaped = unescaper.feed(&buf[..n]);
                            if !unescaped.is_empty()
                                && out_tx.send(pack_data_packet_fast(&unescaped)).await.is_err()
                            {
                                break;
                            }
                        }
                        Err(e) => {
                            log_line(&format!("pppd stdout read failed: {e}"));
                            break;
                        }
                    },
                }
            }
        });

        // watcher: reports exit, or reaps the process on kill
        let evt_tx = self.evt_tx.clone();
        let kill_token = self.kill_token.clone();
        tokio::spawn(async move {
            select! {
                _ = kill_token.cancelled() => {
                    let _ = child.kill().await;
                    log_line("pppd killed");
                }
                _ = child.wait() => {
                    log_line("pppd disconnected");
                    let _ = evt_tx.send(SessionEvent::PppdExited).await;
                }
            }
        });

        self.is_started = true;
        log_line("pppd instance created");
        Ok(())
    }

    /// Escape and forward one PPP payload to pppd's stdin.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize, SstpError> {
        if !self.is_started {
            return Err(SstpError::WriteAfterClose);
        }
        let stdin = self.stdin.as_mut().ok_or(SstpError::WriteAfterClose)?;
        stdin.write_all(&ppp_escape(data)).await?;
        Ok(data.len())
    }

    /// Kill pppd. Idempotent: the EOF path and a CallDisconnect may both
    /// land here.
    pub fn kill(&mut self) {
        self.is_started = false;
        self.stdin = None;
        self.kill_token.cancel();
    }
}
