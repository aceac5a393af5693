//! The PPP connection variant behind a session: either the in-process link
//! automaton or a bridged pppd, picked once at CallConnectRequest time.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::SstpError;
use crate::link::NativeLink;
use crate::pppd::PppdBridge;
use crate::session::SessionEvent;
use crate::types::{ConnectionKind, SessionConfig};

pub enum PppConnection {
    Native(NativeLink),
    Pppd(PppdBridge),
}

impl PppConnection {
    pub fn new(
        config: &SessionConfig,
        out_tx: mpsc::Sender<Vec<u8>>,
        evt_tx: mpsc::Sender<SessionEvent>,
        cancel: CancellationToken,
    ) -> Self {
        match config.connection_kind {
            ConnectionKind::Native => PppConnection::Native(NativeLink::new(out_tx, evt_tx)),
            ConnectionKind::Pppd => {
                let mut args = config.pppd_args.clone();
                if let (Some(src), Some(dst)) = (config.src_ip, config.dst_ip) {
                    args.push(format!("{src}:{dst}"));
                }
                PppConnection::Pppd(PppdBridge::new(args, out_tx, evt_tx, cancel))
            }
        }
    }

    pub async fn start(&mut self) -> Result<(), SstpError> {
        match self {
            PppConnection::Native(link) => link.start().await,
            PppConnection::Pppd(bridge) => bridge.start().await,
        }
    }

    /// Inbound write: one SSTP data payload from the client.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize, SstpError> {
        match self {
            PppConnection::Native(link) => {
                link.handle_frame(data).await?;
                Ok(data.len())
            }
            PppConnection::Pppd(bridge) => bridge.write(data).await,
        }
    }

    pub async fn close(&mut self) -> Result<(), SstpError> {
        match self {
            PppConnection::Native(link) => link.close().await,
            PppConnection::Pppd(bridge) => {
                bridge.kill();
                Ok(())
            }
        }
    }
}
