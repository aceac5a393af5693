//! LCP packet layer: control codes, options, parse and build. The automaton
//! that consumes these lives in `cp`; the wiring is in `link`.

use crate::error::SstpError;

/// LCP/IPCP/CCP control codes.
/// See https://www.iana.org/assignments/ppp-numbers/ppp-numbers.xml
pub mod codes {
    pub const CONFIGURE_REQUEST: u8 = 1;
    pub const CONFIGURE_ACK: u8 = 2;
    pub const CONFIGURE_NAK: u8 = 3;
    pub const CONFIGURE_REJECT: u8 = 4;
    pub const TERMINATE_REQUEST: u8 = 5;
    pub const TERMINATE_ACK: u8 = 6;
    pub const CODE_REJECT: u8 = 7;
    pub const PROTOCOL_REJECT: u8 = 8;
    pub const ECHO_REQUEST: u8 = 9;
    pub const ECHO_REPLY: u8 = 10;
    pub const DISCARD_REQUEST: u8 = 11;
}

/// LCP configuration option types, RFC 1661 section 6.
pub mod options {
    pub const MRU: u8 = 1;
    pub const AUTH_PROTOCOL: u8 = 3;
    pub const MAGIC_NUMBER: u8 = 5;
    pub const PFC: u8 = 7;
    pub const ACFC: u8 = 8;
}

pub fn code_name(code: u8) -> &'static str {
    match code {
        codes::CONFIGURE_REQUEST => "Configure-Request",
        codes::CONFIGURE_ACK => "Configure-Ack",
        codes::CONFIGURE_NAK => "Configure-Nak",
        codes::CONFIGURE_REJECT => "Configure-Reject",
        codes::TERMINATE_REQUEST => "Terminate-Request",
        codes::TERMINATE_ACK => "Terminate-Ack",
        codes::CODE_REJECT => "Code-Reject",
        codes::PROTOCOL_REJECT => "Protocol-Reject",
        codes::ECHO_REQUEST => "Echo-Request",
        codes::ECHO_REPLY => "Echo-Reply",
        codes::DISCARD_REQUEST => "Discard-Request",
        _ => "Unknown",
    }
}

pub const LCP_HEADER_LEN: usize = 4;

/// One LCP packet, trimmed to its declared length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LcpFrame {
    pub code: u8,
    pub id: u8,
    /// Everything after the 4-byte header, up to the declared length.
    pub data: Vec<u8>,
    /// The whole packet including the header, for Code-Reject.
    pub raw: Vec<u8>,
}

/// Parse code, id and length, then truncate the buffer to the declared
/// length; trailing padding past it is legal and dropped.
pub fn parse_lcp_packet(input: &[u8]) -> Result<LcpFrame, SstpError> {
    if input.len() < LCP_HEADER_LEN {
        return Err(SstpError::InvalidPacket);
    }
    let length = u16::from_be_bytes([input[2], input[3]]) as usize;
    if length < LCP_HEADER_LEN || length > input.len() {
        return Err(SstpError::InvalidPacket);
    }
    Ok(LcpFrame {
        code: input[0],
        id: input[1],
        data: input[LCP_HEADER_LEN..length].to_vec(),
        raw: input[..length].to_vec(),
    })
}

pub fn build_lcp_packet(code: u8, id: u8, payload: &[u8]) -> Vec<u8> {
    let length = (payload.len() + LCP_HEADER_LEN) as u16;
    let mut out = Vec::with_capacity(length as usize);
    out.push(code);
    out.push(id);
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Iterator over the options of a Configure-* packet body.
pub struct LcpOptions<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> LcpOptions<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        LcpOptions { data, offset: 0 }
    }
}

impl<'a> Iterator for LcpOptions<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset + 2 > self.data.len() {
            return None;
        }
        let option_type = self.data[self.offset];
        let option_len = self.data[self.offset + 1] as usize;
        if option_len < 2 || self.offset + option_len > self.data.len() {
            return None;
        }
        let value = &self.data[self.offset + 2..self.offset + option_len];
        self.offset += option_len;
        Some((option_type, value))
    }
}

/// Whether the option list is self-consistent: every option header fits and
/// the lengths add up to exactly the body. Decides RCR+ vs RCR-.
pub fn options_well_formed(data: &[u8]) -> bool {
    let mut offset = 0;
    while offset < data.len() {
        if offset + 2 > data.len() {
            return false;
        }
        let option_len = data[offset + 1] as usize;
        if option_len < 2 || offset + option_len > data.len() {
            return false;
        }
        offset += option_len;
    }
    true
}

/// Our own Configure-Request body: just a Magic-Number for loopback
/// detection. MRU/PFC/ACFC negotiation is an open extension point.
pub fn build_configure_options(magic: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(6);
    out.push(options::MAGIC_NUMBER);
    out.push(6);
    out.extend_from_slice(&magic.to_be_bytes());
    out
}
