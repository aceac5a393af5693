//! The in-process PPP link: demultiplexes inbound frames by protocol and
//! phase and drives the LCP automaton. One instance per connection, owned by
//! the session loop; nothing here is shared across tasks.

use tokio::sync::mpsc;

use crate::cp::{CpAction, CpAutomaton, CpEvent, RestartTimer, CP_RESTART_PERIOD};
use crate::error::SstpError;
use crate::lcp::{
    self, build_configure_options, build_lcp_packet, code_name, options_well_formed,
    parse_lcp_packet, LcpFrame, LcpOptions,
};
use crate::log::{log_line, log_recv_lcp, log_send_lcp};
use crate::session::SessionEvent;
use crate::sstp::pack_data_packet_fast;
use crate::types::LinkStatus;

pub const PROTO_IP: u16 = 0x0021;
pub const PROTO_IPCP: u16 = 0x8021;
pub const PROTO_CCP: u16 = 0x80FD;
pub const PROTO_LCP: u16 = 0xC021;
pub const PROTO_PAP: u16 = 0xC023;
pub const PROTO_CHAP: u16 = 0xC223;

pub struct NativeLink {
    pub status: LinkStatus,
    pub acfc_applied: bool,
    pub pfc_applied: bool,
    pub lcp: CpAutomaton,
    timer: RestartTimer,
    magic: u32,
    next_id: u8,
    out_tx: mpsc::Sender<Vec<u8>>,
    evt_tx: mpsc::Sender<SessionEvent>,
}

impl NativeLink {
    pub fn new(out_tx: mpsc::Sender<Vec<u8>>, evt_tx: mpsc::Sender<SessionEvent>) -> Self {
        NativeLink {
            status: LinkStatus::Dead,
            acfc_applied: false,
            pfc_applied: false,
            lcp: CpAutomaton::new(),
            timer: RestartTimer::new(CP_RESTART_PERIOD),
            magic: rand::random::<u32>(),
            next_id: 0,
            out_tx,
            evt_tx,
        }
    }

    /// Bring the link up. The lower layer (the SSTP tunnel) is already
    /// established when this runs, so Open is followed directly by Up.
    pub async fn start(&mut self) -> Result<(), SstpError> {
        self.status = LinkStatus::Establish;
        self.drive(CpEvent::Open, None).await?;
        self.drive(CpEvent::Up, None).await?;
        Ok(())
    }

    pub async fn close(&mut self) -> Result<(), SstpError> {
        self.status = LinkStatus::Terminate;
        self.drive(CpEvent::Close, None).await?;
        self.timer.stop();
        Ok(())
    }

    /// Restart timer expiry, routed here through the session event queue.
    /// A stale generation means the timer was reset after this one fired.
    pub async fn handle_timeout(&mut self, generation: u64) -> Result<(), SstpError> {
        if !self.timer.is_current(generation) {
            return Ok(());
        }
        self.drive(CpEvent::Timeout, None).await
    }

    /// Dispatch one inbound PPP frame per the current phase.
    pub async fn handle_frame(&mut self, frame: &[u8]) -> Result<(), SstpError> {
        let mut buf = frame;

        // Address/Control: present unless the peer negotiated ACFC.
        if !self.acfc_applied {
            if buf.len() >= 2 && buf[0] == 0xFF && buf[1] == 0x03 {
                buf = &buf[2..];
            } else {
                log_line("Dropping PPP frame without address/control field");
                return Ok(());
            }
        }

        // Protocol field: one byte when PFC is on and the low bit says so.
        let protocol;
        if self.pfc_applied && !buf.is_empty() && buf[0] & 1 == 1 {
            protocol = buf[0] as u16;
            buf = &buf[1..];
        } else {
            if buf.len() < 2 {
                log_line("Dropping short PPP frame");
                return Ok(());
            }
            protocol = u16::from_be_bytes([buf[0], buf[1]]);
            buf = &buf[2..];
        }

        // Any inbound traffic wakes a dead link.
        if self.status == LinkStatus::Dead {
            self.status = LinkStatus::Establish;
        }

        match protocol {
            PROTO_LCP => self.handle_lcp(buf).await,
            PROTO_PAP | PROTO_CHAP => {
                if self.status == LinkStatus::Authenticate {
                    log_line(&format!(
                        "Authentication protocol 0x{:04X} not implemented, dropping",
                        protocol
                    ));
                } else {
                    log_line(&format!(
                        "Discarding auth frame 0x{:04X} in {:?} phase",
                        protocol, self.status
                    ));
                }
                Ok(())
            }
            PROTO_IP => {
                if self.status != LinkStatus::Network {
                    log_line(&format!("Discarding IP frame in {:?} phase", self.status));
                }
                // Network phase: accepted; forwarding is outside this layer.
                Ok(())
            }
            PROTO_IPCP | PROTO_CCP => {
                if self.status == LinkStatus::Network {
                    log_line(&format!(
                        "Control protocol 0x{:04X} not implemented, dropping",
                        protocol
                    ));
                } else {
                    log_line(&format!(
                        "Discarding control frame 0x{:04X} in {:?} phase",
                        protocol, self.status
                    ));
                }
                Ok(())
            }
            other => {
                if self.status == LinkStatus::Network {
                    self.send_protocol_reject(other, buf).await
                } else {
                    log_line(&format!(
                        "Discarding unknown protocol 0x{:04X} in {:?} phase",
                        other, self.status
                    ));
                    Ok(())
                }
            }
        }
    }

    /// LCP frames reach the automaton in every phase.
    async fn handle_lcp(&mut self, data: &[u8]) -> Result<(), SstpError> {
        let packet = parse_lcp_packet(data)?;
        log_line(&format!(
            "Received LCP {} *{}",
            code_name(packet.code),
            packet.id
        ));

        let event = match packet.code {
            lcp::codes::CONFIGURE_REQUEST => {
                let good = options_well_formed(&packet.data);
                if good {
                    for (option_type, value) in LcpOptions::new(&packet.data) {
                        log_recv_lcp(packet.id, option_type, value);
                    }
                }
                CpEvent::RcvConfigureRequest { good }
            }
            lcp::codes::CONFIGURE_ACK => CpEvent::RcvConfigureAck,
            lcp::codes::CONFIGURE_NAK | lcp::codes::CONFIGURE_REJECT => CpEvent::RcvConfigureNak,
            lcp::codes::TERMINATE_REQUEST => CpEvent::RcvTerminateRequest,
            lcp::codes::TERMINATE_ACK => CpEvent::RcvTerminateAck,
            lcp::codes::CODE_REJECT => {
                // Rejecting a code we depend on kills the link; anything
                // past Terminate-Ack we can live without.
                let rejected = packet.data.first().copied().unwrap_or(0);
                CpEvent::RcvCodeReject {
                    catastrophic: (lcp::codes::CONFIGURE_REQUEST..=lcp::codes::TERMINATE_ACK)
                        .contains(&rejected),
                }
            }
            lcp::codes::PROTOCOL_REJECT => {
                // A Protocol-Reject naming LCP itself is unrecoverable
                // (RFC 1661 section 5.7); any other protocol we can live
                // without.
                let names_lcp = packet.data.len() >= 2
                    && u16::from_be_bytes([packet.data[0], packet.data[1]]) == PROTO_LCP;
                CpEvent::RcvCodeReject {
                    catastrophic: names_lcp,
                }
            }
            lcp::codes::ECHO_REQUEST | lcp::codes::ECHO_REPLY | lcp::codes::DISCARD_REQUEST => {
                CpEvent::RcvEchoRequest
            }
            _ => CpEvent::RcvUnknownCode,
        };

        self.drive(event, Some(&packet)).await
    }

    /// Run an event through the automaton and perform the actions it asks
    /// for. All automaton mutation for a connection funnels through here, on
    /// the session's processing context.
    pub async fn drive(
        &mut self,
        event: CpEvent,
        packet: Option<&LcpFrame>,
    ) -> Result<(), SstpError> {
        let actions = self.lcp.handle(event)?;
        for action in actions {
            self.apply(action, packet).await?;
        }
        Ok(())
    }

    async fn apply(&mut self, action: CpAction, packet: Option<&LcpFrame>) -> Result<(), SstpError> {
        match action {
            CpAction::ThisLayerUp => {
                // No authentication is negotiated natively, straight to Network.
                self.status = LinkStatus::Network;
                log_line("LCP opened, link entering Network phase");
            }
            CpAction::ThisLayerDown => {
                // A close in progress keeps the link in the Terminate phase.
                if self.status != LinkStatus::Terminate {
                    self.status = LinkStatus::Establish;
                }
                log_line("LCP left Opened state");
            }
            CpAction::ThisLayerStarted => {
                // Lower layer is the SSTP tunnel, already up.
            }
            CpAction::ThisLayerFinished => {
                self.status = LinkStatus::Dead;
                log_line("LCP finished, link dead");
            }
            CpAction::SendConfigureRequest => {
                let id = self.take_id();
                let options = build_configure_options(self.magic);
                log_line(&format!("Send LCP Configure-Request #{}", id));
                log_send_lcp(id, lcp::options::MAGIC_NUMBER, &self.magic.to_be_bytes());
                self.send_lcp(lcp::codes::CONFIGURE_REQUEST, id, &options)
                    .await?;
            }
            CpAction::SendConfigureAck => {
                if let Some(packet) = packet {
                    log_line(&format!("Send LCP Configure-Ack *{}", packet.id));
                    self.send_lcp(lcp::codes::CONFIGURE_ACK, packet.id, &packet.data)
                        .await?;
                }
            }
            CpAction::SendConfigureNak => {
                if let Some(packet) = packet {
                    log_line(&format!("Send LCP Configure-Nak *{}", packet.id));
                    self.send_lcp(lcp::codes::CONFIGURE_NAK, packet.id, &packet.data)
                        .await?;
                }
            }
            CpAction::SendConfigureReject => {
                if let Some(packet) = packet {
                    log_line(&format!("Send LCP Configure-Reject *{}", packet.id));
                    self.send_lcp(lcp::codes::CONFIGURE_REJECT, packet.id, &packet.data)
                        .await?;
                }
            }
            CpAction::SendTerminateRequest => {
                let id = self.take_id();
                log_line(&format!("Send LCP Terminate-Request #{}", id));
                self.send_lcp(lcp::codes::TERMINATE_REQUEST, id, &[]).await?;
            }
            CpAction::SendTerminateAck => {
                let id = packet.map_or_else(|| self.take_id(), |p| p.id);
                log_line(&format!("Send LCP Terminate-Ack *{}", id));
                self.send_lcp(lcp::codes::TERMINATE_ACK, id, &[]).await?;
            }
            CpAction::SendCodeReject => {
                if let Some(packet) = packet {
                    let id = self.take_id();
                    log_line(&format!(
                        "Send LCP Code-Reject #{} for code {}",
                        id, packet.code
                    ));
                    self.send_lcp(lcp::codes::CODE_REJECT, id, &packet.raw).await?;
                }
            }
            CpAction::SendEchoReply => {
                if let Some(packet) = packet {
                    if packet.code == lcp::codes::ECHO_REQUEST {
                        log_line(&format!("Send LCP Echo-Reply *{}", packet.id));
                        self.send_lcp(lcp::codes::ECHO_REPLY, packet.id, &packet.data)
                            .await?;
                    }
                }
            }
            CpAction::StartTimer => {
                self.timer.schedule(self.evt_tx.clone());
            }
            CpAction::StopTimer => {
                self.timer.stop();
            }
        }
        Ok(())
    }

    async fn send_protocol_reject(&mut self, protocol: u16, frame: &[u8]) -> Result<(), SstpError> {
        let id = self.take_id();
        log_line(&format!(
            "Send LCP Protocol-Reject #{} for 0x{:04X}",
            id, protocol
        ));
        let mut body = protocol.to_be_bytes().to_vec();
        body.extend_from_slice(frame);
        self.send_lcp(lcp::codes::PROTOCOL_REJECT, id, &body).await
    }

    async fn send_lcp(&mut self, code: u8, id: u8, payload: &[u8]) -> Result<(), SstpError> {
        let lcp = build_lcp_packet(code, id, payload);
        let frame = self.build_ppp_frame(PROTO_LCP, &lcp);
        self.out_tx
            .send(pack_data_packet_fast(&frame))
            .await
            .map_err(|_| SstpError::WriteAfterClose)
    }

    /// Outbound framing honours whatever compression has been agreed; with
    /// none negotiated this is the full FF 03 + 2-byte protocol header.
    fn build_ppp_frame(&self, protocol: u16, payload: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(payload.len() + 4);
        if !self.acfc_applied {
            frame.extend_from_slice(&[0xFF, 0x03]);
        }
        if self.pfc_applied && protocol <= 0xFF && protocol & 1 == 1 {
            frame.push(protocol as u8);
        } else {
            frame.extend_from_slice(&protocol.to_be_bytes());
        }
        frame.extend_from_slice(payload);
        frame
    }

    fn take_id(&mut self) -> u8 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }
}
