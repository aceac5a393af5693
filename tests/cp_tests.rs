use sstpd_rust::cp::{CpAction, CpAutomaton, CpEvent, CpState, CP_MAX_FAILURE};

fn automaton_in(state: CpState) -> CpAutomaton {
    let mut cp = CpAutomaton::new();
    cp.state = state;
    cp
}

#[test]
fn open_from_closed_sends_configure_request() {
    let mut cp = CpAutomaton::new();
    assert_eq!(cp.handle(CpEvent::Up).unwrap(), vec![]);
    assert_eq!(cp.state, CpState::Closed);

    let actions = cp.handle(CpEvent::Open).unwrap();
    assert_eq!(
        actions,
        vec![CpAction::StartTimer, CpAction::SendConfigureRequest]
    );
    assert_eq!(cp.state, CpState::ReqSent);
    assert_eq!(cp.configure_count, 9);
}

#[test]
fn passive_open_then_up_sends_configure_request() {
    let mut cp = CpAutomaton::new();
    let actions = cp.handle(CpEvent::Open).unwrap();
    assert_eq!(actions, vec![CpAction::ThisLayerStarted]);
    assert_eq!(cp.state, CpState::Starting);

    let actions = cp.handle(CpEvent::Up).unwrap();
    assert_eq!(
        actions,
        vec![CpAction::StartTimer, CpAction::SendConfigureRequest]
    );
    assert_eq!(cp.state, CpState::ReqSent);
}

#[test]
fn full_negotiation_reaches_opened() {
    let mut cp = CpAutomaton::new();
    cp.handle(CpEvent::Open).unwrap();
    cp.handle(CpEvent::Up).unwrap();

    let actions = cp
        .handle(CpEvent::RcvConfigureRequest { good: true })
        .unwrap();
    assert_eq!(actions, vec![CpAction::SendConfigureAck]);
    assert_eq!(cp.state, CpState::AckSent);

    let actions = cp.handle(CpEvent::RcvConfigureAck).unwrap();
    assert!(actions.contains(&CpAction::ThisLayerUp));
    assert_eq!(cp.state, CpState::Opened);
}

#[test]
fn ack_before_request_goes_through_ack_received() {
    let mut cp = automaton_in(CpState::ReqSent);
    let actions = cp.handle(CpEvent::RcvConfigureAck).unwrap();
    assert_eq!(actions, vec![CpAction::StartTimer]);
    assert_eq!(cp.state, CpState::AckReceived);

    let actions = cp
        .handle(CpEvent::RcvConfigureRequest { good: true })
        .unwrap();
    assert_eq!(
        actions,
        vec![CpAction::SendConfigureAck, CpAction::ThisLayerUp, CpAction::StopTimer]
    );
    assert_eq!(cp.state, CpState::Opened);
}

#[test]
fn opened_terminate_request_stops_the_link() {
    let mut cp = automaton_in(CpState::Opened);
    let actions = cp.handle(CpEvent::RcvTerminateRequest).unwrap();
    assert_eq!(
        actions,
        vec![
            CpAction::ThisLayerDown,
            CpAction::StartTimer,
            CpAction::SendTerminateAck
        ]
    );
    assert_eq!(cp.state, CpState::Stopping);
    assert_eq!(cp.terminate_count, 0);

    // The zeroed counter makes the next timeout the final one.
    let actions = cp.handle(CpEvent::Timeout).unwrap();
    assert!(actions.contains(&CpAction::ThisLayerFinished));
    assert_eq!(cp.state, CpState::Stopped);
}

#[test]
fn close_from_opened_retransmits_then_gives_up() {
    let mut cp = automaton_in(CpState::Opened);
    let actions = cp.handle(CpEvent::Close).unwrap();
    assert_eq!(
        actions,
        vec![
            CpAction::ThisLayerDown,
            CpAction::StartTimer,
            CpAction::SendTerminateRequest
        ]
    );
    assert_eq!(cp.state, CpState::Closing);
    assert_eq!(cp.terminate_count, 1);

    let actions = cp.handle(CpEvent::Timeout).unwrap();
    assert_eq!(
        actions,
        vec![CpAction::SendTerminateRequest, CpAction::StartTimer]
    );
    assert_eq!(cp.state, CpState::Closing);

    let actions = cp.handle(CpEvent::Timeout).unwrap();
    assert_eq!(
        actions,
        vec![CpAction::ThisLayerFinished, CpAction::StopTimer]
    );
    assert_eq!(cp.state, CpState::Closed);
}

#[test]
fn terminate_ack_finishes_closing() {
    let mut cp = automaton_in(CpState::Closing);
    let actions = cp.handle(CpEvent::RcvTerminateAck).unwrap();
    assert_eq!(
        actions,
        vec![CpAction::ThisLayerFinished, CpAction::StopTimer]
    );
    assert_eq!(cp.state, CpState::Closed);
}

#[test]
fn configure_retransmission_exhausts() {
    let mut cp = automaton_in(CpState::ReqSent);
    cp.configure_count = 10;

    for _ in 0..10 {
        let actions = cp.handle(CpEvent::Timeout).unwrap();
        assert_eq!(
            actions,
            vec![CpAction::SendConfigureRequest, CpAction::StartTimer]
        );
        assert_eq!(cp.state, CpState::ReqSent);
    }
    assert_eq!(cp.configure_count, 0);

    let actions = cp.handle(CpEvent::Timeout).unwrap();
    assert_eq!(
        actions,
        vec![CpAction::ThisLayerFinished, CpAction::StopTimer]
    );
    assert_eq!(cp.state, CpState::Stopped);
}

#[test]
fn bad_requests_degrade_from_nak_to_reject() {
    let mut cp = automaton_in(CpState::ReqSent);
    for _ in 0..CP_MAX_FAILURE {
        let actions = cp
            .handle(CpEvent::RcvConfigureRequest { good: false })
            .unwrap();
        assert_eq!(actions, vec![CpAction::SendConfigureNak]);
        assert_eq!(cp.state, CpState::ReqSent);
    }

    let actions = cp
        .handle(CpEvent::RcvConfigureRequest { good: false })
        .unwrap();
    assert_eq!(actions, vec![CpAction::SendConfigureReject]);
}

#[test]
fn catastrophic_code_reject_finishes() {
    let mut cp = automaton_in(CpState::ReqSent);
    let actions = cp
        .handle(CpEvent::RcvCodeReject { catastrophic: true })
        .unwrap();
    assert_eq!(
        actions,
        vec![CpAction::ThisLayerFinished, CpAction::StopTimer]
    );
    assert_eq!(cp.state, CpState::Stopped);

    let mut cp = automaton_in(CpState::Opened);
    let actions = cp
        .handle(CpEvent::RcvCodeReject { catastrophic: true })
        .unwrap();
    assert_eq!(
        actions,
        vec![
            CpAction::ThisLayerDown,
            CpAction::StartTimer,
            CpAction::SendTerminateRequest
        ]
    );
    assert_eq!(cp.state, CpState::Stopping);
}

#[test]
fn harmless_code_reject_is_ignored() {
    let mut cp = automaton_in(CpState::Opened);
    let actions = cp
        .handle(CpEvent::RcvCodeReject { catastrophic: false })
        .unwrap();
    assert!(actions.is_empty());
    assert_eq!(cp.state, CpState::Opened);
}

#[test]
fn echo_only_answered_when_opened() {
    let mut cp = automaton_in(CpState::Opened);
    assert_eq!(
        cp.handle(CpEvent::RcvEchoRequest).unwrap(),
        vec![CpAction::SendEchoReply]
    );

    let mut cp = automaton_in(CpState::ReqSent);
    assert!(cp.handle(CpEvent::RcvEchoRequest).unwrap().is_empty());
    assert_eq!(cp.state, CpState::ReqSent);
}

#[test]
fn unknown_code_gets_code_reject() {
    let mut cp = automaton_in(CpState::Opened);
    assert_eq!(
        cp.handle(CpEvent::RcvUnknownCode).unwrap(),
        vec![CpAction::SendCodeReject]
    );
    assert_eq!(cp.state, CpState::Opened);
}

#[test]
fn undefined_pairs_are_errors() {
    assert!(automaton_in(CpState::Opened).handle(CpEvent::Up).is_err());
    assert!(automaton_in(CpState::Initial).handle(CpEvent::Timeout).is_err());
    assert!(automaton_in(CpState::Starting)
        .handle(CpEvent::RcvConfigureAck)
        .is_err());
    assert!(automaton_in(CpState::Initial)
        .handle(CpEvent::RcvEchoRequest)
        .is_err());
}

#[test]
fn down_transitions() {
    // expected next state per starting state
    let table = [
        (CpState::Closed, CpState::Initial),
        (CpState::Stopped, CpState::Starting),
        (CpState::Closing, CpState::Initial),
        (CpState::Stopping, CpState::Starting),
        (CpState::ReqSent, CpState::Starting),
        (CpState::AckReceived, CpState::Starting),
        (CpState::AckSent, CpState::Starting),
        (CpState::Opened, CpState::Starting),
    ];
    for (from, to) in table {
        let mut cp = automaton_in(from);
        cp.handle(CpEvent::Down).unwrap();
        assert_eq!(cp.state, to, "Down from {from:?}");
    }
}

#[test]
fn every_defined_pair_follows_rfc_1661() {
    use CpAction::*;
    use CpEvent::*;
    use CpState::*;

    let rcr_good = RcvConfigureRequest { good: true };
    let rcr_bad = RcvConfigureRequest { good: false };
    let rxj_ok = RcvCodeReject {
        catastrophic: false,
    };
    let rxj_bad = RcvCodeReject { catastrophic: true };

    // Every defined (state, event) pair with its expected actions and next
    // state. Counters are preset to full before each row, so Timeout rows
    // take the retransmit branch; exhaustion is covered separately below.
    let table: Vec<(CpState, CpEvent, CpState, Vec<CpAction>)> = vec![
        (Initial, Up, Closed, vec![]),
        (Starting, Up, ReqSent, vec![StartTimer, SendConfigureRequest]),
        //
        (Closed, Down, Initial, vec![]),
        (Stopped, Down, Starting, vec![ThisLayerStarted]),
        (Closing, Down, Initial, vec![StopTimer]),
        (Stopping, Down, Starting, vec![StopTimer]),
        (ReqSent, Down, Starting, vec![StopTimer]),
        (AckReceived, Down, Starting, vec![StopTimer]),
        (AckSent, Down, Starting, vec![StopTimer]),
        (Opened, Down, Starting, vec![ThisLayerDown]),
        //
        (Initial, Open, Starting, vec![ThisLayerStarted]),
        (Starting, Open, Starting, vec![]),
        (Closed, Open, ReqSent, vec![StartTimer, SendConfigureRequest]),
        (Stopped, Open, Stopped, vec![]),
        (Closing, Open, Stopping, vec![]),
        (Stopping, Open, Stopping, vec![]),
        (ReqSent, Open, ReqSent, vec![]),
        (AckReceived, Open, AckReceived, vec![]),
        (AckSent, Open, AckSent, vec![]),
        (Opened, Open, Opened, vec![]),
        //
        (Initial, Close, Initial, vec![]),
        (Starting, Close, Initial, vec![ThisLayerFinished]),
        (Closed, Close, Closed, vec![]),
        (Stopped, Close, Closed, vec![]),
        (Closing, Close, Closing, vec![]),
        (Stopping, Close, Closing, vec![]),
        (ReqSent, Close, Closing, vec![StartTimer, SendTerminateRequest]),
        (AckReceived, Close, Closing, vec![StartTimer, SendTerminateRequest]),
        (AckSent, Close, Closing, vec![StartTimer, SendTerminateRequest]),
        (
            Opened,
            Close,
            Closing,
            vec![ThisLayerDown, StartTimer, SendTerminateRequest],
        ),
        //
        (Closing, Timeout, Closing, vec![SendTerminateRequest, StartTimer]),
        (Stopping, Timeout, Stopping, vec![SendTerminateRequest, StartTimer]),
        (ReqSent, Timeout, ReqSent, vec![SendConfigureRequest, StartTimer]),
        (AckReceived, Timeout, ReqSent, vec![SendConfigureRequest, StartTimer]),
        (AckSent, Timeout, AckSent, vec![SendConfigureRequest, StartTimer]),
        //
        (Closed, rcr_good, Closed, vec![SendTerminateAck]),
        (
            Stopped,
            rcr_good,
            AckSent,
            vec![StartTimer, SendConfigureRequest, SendConfigureAck],
        ),
        (Closing, rcr_good, Closing, vec![]),
        (Stopping, rcr_good, Stopping, vec![]),
        (ReqSent, rcr_good, AckSent, vec![SendConfigureAck]),
        (
            AckReceived,
            rcr_good,
            Opened,
            vec![SendConfigureAck, ThisLayerUp, StopTimer],
        ),
        (AckSent, rcr_good, AckSent, vec![SendConfigureAck]),
        (
            Opened,
            rcr_good,
            AckSent,
            vec![ThisLayerDown, SendConfigureRequest, SendConfigureAck],
        ),
        //
        (Closed, rcr_bad, Closed, vec![SendTerminateAck]),
        (
            Stopped,
            rcr_bad,
            ReqSent,
            vec![StartTimer, SendConfigureRequest, SendConfigureNak],
        ),
        (Closing, rcr_bad, Closing, vec![]),
        (Stopping, rcr_bad, Stopping, vec![]),
        (ReqSent, rcr_bad, ReqSent, vec![SendConfigureNak]),
        (AckReceived, rcr_bad, AckReceived, vec![SendConfigureNak]),
        (AckSent, rcr_bad, ReqSent, vec![SendConfigureNak]),
        (
            Opened,
            rcr_bad,
            ReqSent,
            vec![ThisLayerDown, SendConfigureRequest, SendConfigureNak],
        ),
        //
        (Closed, RcvConfigureAck, Closed, vec![SendTerminateAck]),
        (Stopped, RcvConfigureAck, Stopped, vec![SendTerminateAck]),
        (Closing, RcvConfigureAck, Closing, vec![]),
        (Stopping, RcvConfigureAck, Stopping, vec![]),
        (ReqSent, RcvConfigureAck, AckReceived, vec![StartTimer]),
        (
            AckReceived,
            RcvConfigureAck,
            ReqSent,
            vec![SendConfigureRequest, StartTimer],
        ),
        (
            AckSent,
            RcvConfigureAck,
            Opened,
            vec![StartTimer, ThisLayerUp, StopTimer],
        ),
        (
            Opened,
            RcvConfigureAck,
            ReqSent,
            vec![ThisLayerDown, SendConfigureRequest, StartTimer],
        ),
        //
        (Closed, RcvConfigureNak, Closed, vec![SendTerminateAck]),
        (Stopped, RcvConfigureNak, Stopped, vec![SendTerminateAck]),
        (Closing, RcvConfigureNak, Closing, vec![]),
        (Stopping, RcvConfigureNak, Stopping, vec![]),
        (
            ReqSent,
            RcvConfigureNak,
            ReqSent,
            vec![StartTimer, SendConfigureRequest],
        ),
        (
            AckReceived,
            RcvConfigureNak,
            ReqSent,
            vec![SendConfigureRequest, StartTimer],
        ),
        (
            AckSent,
            RcvConfigureNak,
            AckSent,
            vec![StartTimer, SendConfigureRequest],
        ),
        (
            Opened,
            RcvConfigureNak,
            ReqSent,
            vec![ThisLayerDown, SendConfigureRequest, StartTimer],
        ),
        //
        (Closed, RcvTerminateRequest, Closed, vec![SendTerminateAck]),
        (Stopped, RcvTerminateRequest, Stopped, vec![SendTerminateAck]),
        (Closing, RcvTerminateRequest, Closing, vec![SendTerminateAck]),
        (Stopping, RcvTerminateRequest, Stopping, vec![SendTerminateAck]),
        (ReqSent, RcvTerminateRequest, ReqSent, vec![SendTerminateAck]),
        (AckReceived, RcvTerminateRequest, ReqSent, vec![SendTerminateAck]),
        (AckSent, RcvTerminateRequest, ReqSent, vec![SendTerminateAck]),
        (
            Opened,
            RcvTerminateRequest,
            Stopping,
            vec![ThisLayerDown, StartTimer, SendTerminateAck],
        ),
        //
        (Closed, RcvTerminateAck, Closed, vec![]),
        (Stopped, RcvTerminateAck, Stopped, vec![]),
        (
            Closing,
            RcvTerminateAck,
            Closed,
            vec![ThisLayerFinished, StopTimer],
        ),
        (
            Stopping,
            RcvTerminateAck,
            Stopped,
            vec![ThisLayerFinished, StopTimer],
        ),
        (ReqSent, RcvTerminateAck, ReqSent, vec![]),
        (AckReceived, RcvTerminateAck, ReqSent, vec![]),
        (AckSent, RcvTerminateAck, AckSent, vec![]),
        (
            Opened,
            RcvTerminateAck,
            ReqSent,
            vec![ThisLayerDown, SendConfigureRequest, StartTimer],
        ),
        //
        (Closed, RcvUnknownCode, Closed, vec![SendCodeReject]),
        (Stopped, RcvUnknownCode, Stopped, vec![SendCodeReject]),
        (Closing, RcvUnknownCode, Closing, vec![SendCodeReject]),
        (Stopping, RcvUnknownCode, Stopping, vec![SendCodeReject]),
        (ReqSent, RcvUnknownCode, ReqSent, vec![SendCodeReject]),
        (AckReceived, RcvUnknownCode, AckReceived, vec![SendCodeReject]),
        (AckSent, RcvUnknownCode, AckSent, vec![SendCodeReject]),
        (Opened, RcvUnknownCode, Opened, vec![SendCodeReject]),
        //
        (Closed, rxj_ok, Closed, vec![]),
        (Stopped, rxj_ok, Stopped, vec![]),
        (Closing, rxj_ok, Closing, vec![]),
        (Stopping, rxj_ok, Stopping, vec![]),
        (ReqSent, rxj_ok, ReqSent, vec![]),
        (AckReceived, rxj_ok, ReqSent, vec![]),
        (AckSent, rxj_ok, AckSent, vec![]),
        (Opened, rxj_ok, Opened, vec![]),
        //
        (Closed, rxj_bad, Closed, vec![ThisLayerFinished]),
        (Stopped, rxj_bad, Stopped, vec![ThisLayerFinished]),
        (Closing, rxj_bad, Closed, vec![ThisLayerFinished, StopTimer]),
        (Stopping, rxj_bad, Stopped, vec![ThisLayerFinished, StopTimer]),
        (ReqSent, rxj_bad, Stopped, vec![ThisLayerFinished, StopTimer]),
        (AckReceived, rxj_bad, Stopped, vec![ThisLayerFinished, StopTimer]),
        (AckSent, rxj_bad, Stopped, vec![ThisLayerFinished, StopTimer]),
        (
            Opened,
            rxj_bad,
            Stopping,
            vec![ThisLayerDown, StartTimer, SendTerminateRequest],
        ),
        //
        (Closed, RcvEchoRequest, Closed, vec![]),
        (Stopped, RcvEchoRequest, Stopped, vec![]),
        (Closing, RcvEchoRequest, Closing, vec![]),
        (Stopping, RcvEchoRequest, Stopping, vec![]),
        (ReqSent, RcvEchoRequest, ReqSent, vec![]),
        (AckReceived, RcvEchoRequest, AckReceived, vec![]),
        (AckSent, RcvEchoRequest, AckSent, vec![]),
        (Opened, RcvEchoRequest, Opened, vec![SendEchoReply]),
    ];

    for (from, event, to, expected) in table {
        let mut cp = automaton_in(from);
        cp.configure_count = 10;
        cp.terminate_count = 2;
        let actions = cp
            .handle(event)
            .unwrap_or_else(|_| panic!("{from:?} + {event:?} must be defined"));
        assert_eq!(actions, expected, "{from:?} + {event:?} actions");
        assert_eq!(cp.state, to, "{from:?} + {event:?} next state");
    }
}

#[test]
fn exhausted_timeouts_give_up_in_every_timer_state() {
    let table = [
        (CpState::Closing, CpState::Closed),
        (CpState::Stopping, CpState::Stopped),
        (CpState::ReqSent, CpState::Stopped),
        (CpState::AckReceived, CpState::Stopped),
        (CpState::AckSent, CpState::Stopped),
    ];
    for (from, to) in table {
        // counters start at zero, so the first timeout is the final one
        let mut cp = automaton_in(from);
        let actions = cp.handle(CpEvent::Timeout).unwrap();
        assert_eq!(
            actions,
            vec![CpAction::ThisLayerFinished, CpAction::StopTimer],
            "Timeout from {from:?}"
        );
        assert_eq!(cp.state, to, "Timeout from {from:?}");
    }
}

#[test]
fn crossed_ack_restarts_negotiation() {
    let mut cp = automaton_in(CpState::AckReceived);
    cp.configure_count = 5;
    let actions = cp.handle(CpEvent::RcvConfigureAck).unwrap();
    assert_eq!(
        actions,
        vec![CpAction::SendConfigureRequest, CpAction::StartTimer]
    );
    assert_eq!(cp.state, CpState::ReqSent);
    assert_eq!(cp.configure_count, 4);
}
