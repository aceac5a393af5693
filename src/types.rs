use std::fmt;
use std::net::Ipv4Addr;

/// SSTP control message type, see MS-SSTP 2.2.2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    CallConnectRequest,
    CallConnectAck,
    CallConnectNak,
    CallConnected,
    CallAbort,
    CallDisconnect,
    CallDisconnectAck,
    EchoRequest,
    EchoResponse,
    Unknown(u16),
}

impl MessageType {
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => MessageType::CallConnectRequest,
            2 => MessageType::CallConnectAck,
            3 => MessageType::CallConnectNak,
            4 => MessageType::CallConnected,
            5 => MessageType::CallAbort,
            6 => MessageType::CallDisconnect,
            7 => MessageType::CallDisconnectAck,
            8 => MessageType::EchoRequest,
            9 => MessageType::EchoResponse,
            other => MessageType::Unknown(other),
        }
    }

    pub fn as_u16(self) -> u16 {
        match self {
            MessageType::CallConnectRequest => 1,
            MessageType::CallConnectAck => 2,
            MessageType::CallConnectNak => 3,
            MessageType::CallConnected => 4,
            MessageType::CallAbort => 5,
            MessageType::CallDisconnect => 6,
            MessageType::CallDisconnectAck => 7,
            MessageType::EchoRequest => 8,
            MessageType::EchoResponse => 9,
            MessageType::Unknown(other) => other,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::CallConnectRequest => write!(f, "CallConnectRequest"),
            MessageType::CallConnectAck => write!(f, "CallConnectAck"),
            MessageType::CallConnectNak => write!(f, "CallConnectNak"),
            MessageType::CallConnected => write!(f, "CallConnected"),
            MessageType::CallAbort => write!(f, "CallAbort"),
            MessageType::CallDisconnect => write!(f, "CallDisconnect"),
            MessageType::CallDisconnectAck => write!(f, "CallDisconnectAck"),
            MessageType::EchoRequest => write!(f, "EchoRequest"),
            MessageType::EchoResponse => write!(f, "EchoResponse"),
            MessageType::Unknown(other) => write!(f, "Unknown({})", other),
        }
    }
}

/// SSTP attribute id, see MS-SSTP 2.2.3
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeId {
    EncapsulatedProtocolId,
    StatusInfo,
    CryptoBinding,
    CryptoBindingReq,
    Unknown(u8),
}

impl AttributeId {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => AttributeId::EncapsulatedProtocolId,
            2 => AttributeId::StatusInfo,
            3 => AttributeId::CryptoBinding,
            4 => AttributeId::CryptoBindingReq,
            other => AttributeId::Unknown(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            AttributeId::EncapsulatedProtocolId => 1,
            AttributeId::StatusInfo => 2,
            AttributeId::CryptoBinding => 3,
            AttributeId::CryptoBindingReq => 4,
            AttributeId::Unknown(other) => other,
        }
    }
}

impl fmt::Display for AttributeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeId::EncapsulatedProtocolId => write!(f, "EncapsulatedProtocolID"),
            AttributeId::StatusInfo => write!(f, "StatusInfo"),
            AttributeId::CryptoBinding => write!(f, "CryptoBinding"),
            AttributeId::CryptoBindingReq => write!(f, "CryptoBindingReq"),
            AttributeId::Unknown(other) => write!(f, "Unknown({})", other),
        }
    }
}

/// The 4-byte header every SSTP packet starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SstpHeader {
    pub major_version: u8,
    pub minor_version: u8,
    pub is_control: bool,
    pub length: u16,
}

/// One attribute of a control packet. The length field on the wire is always
/// computed from `data` when encoding; it is never stored here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SstpAttribute {
    pub attribute_id: AttributeId,
    pub data: Vec<u8>,
}

/// A decoded SSTP control packet (payload after the 4-byte header).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SstpControlPacket {
    pub message_type: MessageType,
    pub attributes: Vec<SstpAttribute>,
}

impl fmt::Display for SstpControlPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message_type)?;
        for attribute in &self.attributes {
            write!(
                f,
                " [{} {}]",
                attribute.attribute_id,
                hex::encode(&attribute.data)
            )?;
        }
        Ok(())
    }
}

/// PPP link phase, RFC 1661 section 3.2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Dead,
    Establish,
    Authenticate,
    Network,
    Terminate,
}

/// How the PPP side of a session is driven: the in-process LCP automaton or
/// an external pppd process bridged over stdin/stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    Native,
    Pppd,
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionKind::Native => write!(f, "Native"),
            ConnectionKind::Pppd => write!(f, "Pppd"),
        }
    }
}

/// Per-connection PPP settings, handed from the config layer to each session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub connection_kind: ConnectionKind,
    pub pppd_args: Vec<String>,
    pub src_ip: Option<Ipv4Addr>,
    pub dst_ip: Option<Ipv4Addr>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            connection_kind: ConnectionKind::Pppd,
            pppd_args: Vec::new(),
            src_ip: None,
            dst_ip: None,
        }
    }
}
