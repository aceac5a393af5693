use thiserror::Error;

/// Everything that can go wrong inside a SSTP session. None of these are
/// retried: framing has no resynchronization point, so the connection is
/// torn down and the client has to reconnect.
#[derive(Debug, Error)]
pub enum SstpError {
    /// Short packet, bad version nibbles or a declared length <= 4.
    #[error("invalid SSTP packet")]
    InvalidPacket,

    /// An attribute's declared length runs past the end of the control payload.
    #[error("truncated SSTP attribute")]
    TruncatedAttribute,

    /// A (state, event) pair the RFC 1661 table does not define. Either a
    /// non-conformant peer or a bug on our side.
    #[error("invalid control protocol automaton state")]
    Automaton,

    /// Data packet arrived before a CallConnectRequest started PPP.
    #[error("PPP connection not started")]
    PppNotStarted,

    /// A control message that needs a PPP connection arrived before one exists.
    #[error("no active PPP connection for {0}")]
    NoActivePppConnection(String),

    /// The peer sent CallAbort; fatal for this connection.
    #[error("connection aborted by peer")]
    CallAborted,

    /// The connect request carried no encapsulated protocol we support.
    /// Not currently reachable, PPP is the only protocol there is.
    #[error("no usable encapsulated protocol")]
    ProtocolSupportNak,

    /// Write to the pppd bridge after it was killed.
    #[error("write after close")]
    WriteAfterClose,

    #[error("pppd: {0}")]
    Pppd(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
