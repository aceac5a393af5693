//! The RFC 1661 section 4.1 option negotiation automaton, shared shape for
//! LCP today and IPCP/CCP once those grow bodies. The transition function is
//! pure: it mutates only the automaton's own state and counters and hands
//! every side effect back to the caller as a `CpAction`.

use tokio::select;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

use crate::error::SstpError;
use crate::session::SessionEvent;

pub const CP_MAX_TERMINATE: u32 = 2;
pub const CP_MAX_CONFIGURE: u32 = 10;
pub const CP_MAX_FAILURE: u32 = 5;
pub const CP_RESTART_PERIOD: Duration = Duration::from_secs(3);

/// Automaton state, RFC 1661 section 4.2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpState {
    Initial,
    Starting,
    Closed,
    Stopped,
    Closing,
    Stopping,
    ReqSent,
    AckReceived,
    AckSent,
    Opened,
}

impl CpState {
    /// The restart timer only runs in these states (RFC 1661 section 4.3).
    pub fn timer_runs(self) -> bool {
        matches!(
            self,
            CpState::Closing
                | CpState::Stopping
                | CpState::ReqSent
                | CpState::AckReceived
                | CpState::AckSent
        )
    }
}

/// Automaton events, RFC 1661 section 4.1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpEvent {
    Up,
    Down,
    Open,
    Close,
    /// Restart timer expiry; the counter branch is picked internally.
    Timeout,
    RcvConfigureRequest { good: bool },
    RcvConfigureAck,
    /// Covers Configure-Nak and Configure-Reject, both are RCN.
    RcvConfigureNak,
    RcvTerminateRequest,
    RcvTerminateAck,
    RcvUnknownCode,
    RcvCodeReject { catastrophic: bool },
    /// Covers Echo-Request, Echo-Reply and Discard-Request (RXR).
    RcvEchoRequest,
}

/// Side effects the caller has to perform after a transition, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpAction {
    ThisLayerUp,
    ThisLayerDown,
    ThisLayerStarted,
    ThisLayerFinished,
    SendConfigureRequest,
    SendConfigureAck,
    SendConfigureNak,
    SendConfigureReject,
    SendTerminateRequest,
    SendTerminateAck,
    SendCodeReject,
    SendEchoReply,
    StartTimer,
    StopTimer,
}

/// One automaton instance per PPP connection. Fields are public so the
/// session (and tests) can inspect counters; all mutation goes through
/// `handle`.
#[derive(Debug)]
pub struct CpAutomaton {
    pub state: CpState,
    pub configure_count: u32,
    pub terminate_count: u32,
    pub failure_count: u32,
}

impl Default for CpAutomaton {
    fn default() -> Self {
        Self::new()
    }
}

impl CpAutomaton {
    pub fn new() -> Self {
        CpAutomaton {
            state: CpState::Initial,
            configure_count: 0,
            terminate_count: 0,
            failure_count: 0,
        }
    }

    /// Initialize-Restart-Count
    fn irc(&mut self, terminate: bool, actions: &mut Vec<CpAction>) {
        if terminate {
            self.terminate_count = CP_MAX_TERMINATE;
        } else {
            self.configure_count = CP_MAX_CONFIGURE;
            self.failure_count = 0;
        }
        actions.push(CpAction::StartTimer);
    }

    /// Zero-Restart-Count: the timer keeps running so the final timeout can
    /// take the exhausted branch.
    fn zrc(&mut self, actions: &mut Vec<CpAction>) {
        self.configure_count = 0;
        self.terminate_count = 0;
        actions.push(CpAction::StartTimer);
    }

    fn scr(&mut self, actions: &mut Vec<CpAction>) {
        self.configure_count = self.configure_count.saturating_sub(1);
        actions.push(CpAction::SendConfigureRequest);
    }

    fn str(&mut self, actions: &mut Vec<CpAction>) {
        self.terminate_count = self.terminate_count.saturating_sub(1);
        actions.push(CpAction::SendTerminateRequest);
    }

    /// Send-Configure-Nak, degrading to Configure-Reject once the failure
    /// counter is spent (RFC 1661 section 4.4, Max-Failure).
    fn scn(&mut self, actions: &mut Vec<CpAction>) {
        self.failure_count += 1;
        if self.failure_count > CP_MAX_FAILURE {
            actions.push(CpAction::SendConfigureReject);
        } else {
            actions.push(CpAction::SendConfigureNak);
        }
    }

    /// Run one event through the transition table. Returns the actions to
    /// perform; a pair the table does not define is an error and means the
    /// connection has to go.
    pub fn handle(&mut self, event: CpEvent) -> Result<Vec<CpAction>, SstpError> {
        use CpAction::*;
        use CpState::*;

        let before = self.state;
        let mut actions = Vec::new();

        let next = match event {
            CpEvent::Up => match before {
                Initial => Closed,
                Starting => {
                    self.irc(false, &mut actions);
                    self.scr(&mut actions);
                    ReqSent
                }
                _ => return Err(SstpError::Automaton),
            },

            CpEvent::Down => match before {
                Closed => Initial,
                Stopped => {
                    actions.push(ThisLayerStarted);
                    Starting
                }
                Closing => Initial,
                Stopping | ReqSent | AckReceived | AckSent => Starting,
                Opened => {
                    actions.push(ThisLayerDown);
                    Starting
                }
                _ => return Err(SstpError::Automaton),
            },

            CpEvent::Open => match before {
                Initial => {
                    actions.push(ThisLayerStarted);
                    Starting
                }
                Starting => Starting,
                Closed => {
                    self.irc(false, &mut actions);
                    self.scr(&mut actions);
                    ReqSent
                }
                Stopped => Stopped, // restart option not taken
                Closing => Stopping,
                Stopping => Stopping,
                ReqSent => ReqSent,
                AckReceived => AckReceived,
                AckSent => AckSent,
                Opened => Opened, // restart option not taken
            },

            CpEvent::Close => match before {
                Initial => Initial,
                Starting => {
                    actions.push(ThisLayerFinished);
                    Initial
                }
                Closed => Closed,
                Stopped => Closed,
                Closing => Closing,
                Stopping => Closing,
                ReqSent | AckReceived | AckSent => {
                    self.irc(true, &mut actions);
                    self.str(&mut actions);
                    Closing
                }
                Opened => {
                    actions.push(ThisLayerDown);
                    self.irc(true, &mut actions);
                    self.str(&mut actions);
                    Closing
                }
            },

            CpEvent::Timeout => {
                let counter = match before {
                    Closing | Stopping => self.terminate_count,
                    ReqSent | AckReceived | AckSent => self.configure_count,
                    _ => return Err(SstpError::Automaton),
                };
                if counter > 0 {
                    // TO+: retransmit and keep waiting
                    match before {
                        Closing => {
                            self.str(&mut actions);
                            actions.push(StartTimer);
                            Closing
                        }
                        Stopping => {
                            self.str(&mut actions);
                            actions.push(StartTimer);
                            Stopping
                        }
                        ReqSent => {
                            self.scr(&mut actions);
                            actions.push(StartTimer);
                            ReqSent
                        }
                        AckReceived => {
                            self.scr(&mut actions);
                            actions.push(StartTimer);
                            ReqSent
                        }
                        AckSent => {
                            self.scr(&mut actions);
                            actions.push(StartTimer);
                            AckSent
                        }
                        _ => unreachable!(),
                    }
                } else {
                    // TO-: counter exhausted, give up
                    match before {
                        Closing => {
                            actions.push(ThisLayerFinished);
                            Closed
                        }
                        Stopping | ReqSent | AckReceived | AckSent => {
                            actions.push(ThisLayerFinished);
                            Stopped
                        }
                        _ => unreachable!(),
                    }
                }
            }

            CpEvent::RcvConfigureRequest { good: true } => match before {
                Closed => {
                    actions.push(SendTerminateAck);
                    Closed
                }
                Stopped => {
                    self.irc(false, &mut actions);
                    self.scr(&mut actions);
                    actions.push(SendConfigureAck);
                    AckSent
                }
                Closing => Closing,
                Stopping => Stopping,
                ReqSent => {
                    actions.push(SendConfigureAck);
                    AckSent
                }
                AckReceived => {
                    actions.push(SendConfigureAck);
                    actions.push(ThisLayerUp);
                    Opened
                }
                AckSent => {
                    actions.push(SendConfigureAck);
                    AckSent
                }
                Opened => {
                    actions.push(ThisLayerDown);
                    self.scr(&mut actions);
                    actions.push(SendConfigureAck);
                    AckSent
                }
                _ => return Err(SstpError::Automaton),
            },

            CpEvent::RcvConfigureRequest { good: false } => match before {
                Closed => {
                    actions.push(SendTerminateAck);
                    Closed
                }
                Stopped => {
                    self.irc(false, &mut actions);
                    self.scr(&mut actions);
                    self.scn(&mut actions);
                    ReqSent
                }
                Closing => Closing,
                Stopping => Stopping,
                ReqSent => {
                    self.scn(&mut actions);
                    ReqSent
                }
                AckReceived => {
                    self.scn(&mut actions);
                    AckReceived
                }
                AckSent => {
                    self.scn(&mut actions);
                    ReqSent
                }
                Opened => {
                    actions.push(ThisLayerDown);
                    self.scr(&mut actions);
                    self.scn(&mut actions);
                    ReqSent
                }
                _ => return Err(SstpError::Automaton),
            },

            CpEvent::RcvConfigureAck => match before {
                Closed | Stopped => {
                    actions.push(SendTerminateAck);
                    before
                }
                Closing => Closing,
                Stopping => Stopping,
                ReqSent => {
                    self.irc(false, &mut actions);
                    AckReceived
                }
                AckReceived => {
                    // crossed connection, start over
                    self.scr(&mut actions);
                    actions.push(StartTimer);
                    ReqSent
                }
                AckSent => {
                    self.irc(false, &mut actions);
                    actions.push(ThisLayerUp);
                    Opened
                }
                Opened => {
                    actions.push(ThisLayerDown);
                    self.scr(&mut actions);
                    actions.push(StartTimer);
                    ReqSent
                }
                _ => return Err(SstpError::Automaton),
            },

            CpEvent::RcvConfigureNak => match before {
                Closed | Stopped => {
                    actions.push(SendTerminateAck);
                    before
                }
                Closing => Closing,
                Stopping => Stopping,
                ReqSent => {
                    self.irc(false, &mut actions);
                    self.scr(&mut actions);
                    ReqSent
                }
                AckReceived => {
                    self.scr(&mut actions);
                    actions.push(StartTimer);
                    ReqSent
                }
                AckSent => {
                    self.irc(false, &mut actions);
                    self.scr(&mut actions);
                    AckSent
                }
                Opened => {
                    actions.push(ThisLayerDown);
                    self.scr(&mut actions);
                    actions.push(StartTimer);
                    ReqSent
                }
                _ => return Err(SstpError::Automaton),
            },

            CpEvent::RcvTerminateRequest => match before {
                Closed | Stopped | Closing | Stopping => {
                    actions.push(SendTerminateAck);
                    before
                }
                ReqSent => {
                    actions.push(SendTerminateAck);
                    ReqSent
                }
                AckReceived | AckSent => {
                    actions.push(SendTerminateAck);
                    ReqSent
                }
                Opened => {
                    actions.push(ThisLayerDown);
                    self.zrc(&mut actions);
                    actions.push(SendTerminateAck);
                    Stopping
                }
                _ => return Err(SstpError::Automaton),
            },

            CpEvent::RcvTerminateAck => match before {
                Closed | Stopped => before,
                Closing => {
                    actions.push(ThisLayerFinished);
                    Closed
                }
                Stopping => {
                    actions.push(ThisLayerFinished);
                    Stopped
                }
                ReqSent => ReqSent,
                AckReceived => ReqSent,
                AckSent => AckSent,
                Opened => {
                    actions.push(ThisLayerDown);
                    self.scr(&mut actions);
                    actions.push(StartTimer);
                    ReqSent
                }
                _ => return Err(SstpError::Automaton),
            },

            CpEvent::RcvUnknownCode => match before {
                Initial | Starting => return Err(SstpError::Automaton),
                other => {
                    actions.push(SendCodeReject);
                    other
                }
            },

            CpEvent::RcvCodeReject { catastrophic: false } => match before {
                AckReceived => ReqSent,
                Initial | Starting => return Err(SstpError::Automaton),
                other => other,
            },

            CpEvent::RcvCodeReject { catastrophic: true } => match before {
                Closed | Stopped => {
                    actions.push(ThisLayerFinished);
                    before
                }
                Closing => {
                    actions.push(ThisLayerFinished);
                    Closed
                }
                Stopping | ReqSent | AckReceived | AckSent => {
                    actions.push(ThisLayerFinished);
                    Stopped
                }
                Opened => {
                    actions.push(ThisLayerDown);
                    self.irc(true, &mut actions);
                    self.str(&mut actions);
                    Stopping
                }
                _ => return Err(SstpError::Automaton),
            },

            CpEvent::RcvEchoRequest => match before {
                Initial | Starting => return Err(SstpError::Automaton),
                Opened => {
                    actions.push(SendEchoReply);
                    Opened
                }
                other => other,
            },
        };

        if before.timer_runs() && !next.timer_runs() {
            actions.push(CpAction::StopTimer);
        }
        self.state = next;
        Ok(actions)
    }
}

/// The single-shot restart timer. Expiries are delivered through the
/// session's event queue so they never race an inbound frame; resetting
/// cancels the outstanding task and bumps the generation so a fire that
/// already made it into the queue gets discarded by `is_current`.
#[derive(Debug)]
pub struct RestartTimer {
    period: Duration,
    generation: u64,
    cancel: Option<CancellationToken>,
}

impl RestartTimer {
    pub fn new(period: Duration) -> Self {
        RestartTimer {
            period,
            generation: 0,
            cancel: None,
        }
    }

    pub fn schedule(&mut self, evt_tx: mpsc::Sender<SessionEvent>) -> u64 {
        self.stop();
        self.generation += 1;
        let generation = self.generation;
        let token = CancellationToken::new();
        self.cancel = Some(token.clone());
        let period = self.period;
        tokio::spawn(async move {
            select! {
                _ = token.cancelled() => {}
                _ = sleep(period) => {
                    let _ = evt_tx.send(SessionEvent::LcpTimeout { generation }).await;
                }
            }
        });
        generation
    }

    pub fn stop(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
    }

    /// True when the expiry belongs to the currently scheduled timer.
    pub fn is_current(&self, generation: u64) -> bool {
        self.cancel.is_some() && generation == self.generation
    }
}
