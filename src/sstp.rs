use crate::error::SstpError;
use crate::types::{AttributeId, MessageType, SstpAttribute, SstpControlPacket, SstpHeader};

pub const SSTP_HEADER_LEN: usize = 4;

/// Parse the 4-byte SSTP header. Fails on a short buffer, a version other
/// than 1.0 or a declared length that leaves no payload.
pub fn parse_header(input: &[u8]) -> Result<SstpHeader, SstpError> {
    if input.len() < SSTP_HEADER_LEN {
        return Err(SstpError::InvalidPacket);
    }

    let major_version = input[0] >> 4;
    let minor_version = input[0] & 0x0F;
    let is_control = input[1] & 0x01 == 1;
    let length = u16::from_be_bytes([input[2], input[3]]);

    if major_version != 1 || minor_version != 0 || length <= 4 {
        return Err(SstpError::InvalidPacket);
    }

    Ok(SstpHeader {
        major_version,
        minor_version,
        is_control,
        length,
    })
}

/// Header check for the read loop: returns the control flag and how many
/// payload bytes still have to be read off the socket.
pub fn decode_header(input: &[u8]) -> Result<(bool, usize), SstpError> {
    let header = parse_header(input)?;
    Ok((header.is_control, header.length as usize - SSTP_HEADER_LEN))
}

pub fn encode_header(header: &SstpHeader) -> [u8; 4] {
    let version = (header.major_version << 4) | (header.minor_version & 0x0F);
    let length = header.length.to_be_bytes();
    [version, u8::from(header.is_control), length[0], length[1]]
}

/// Decode a control packet payload (everything after the 4-byte header).
/// Attribute boundaries are self-describing, so each step checks the declared
/// length against what is actually left in the buffer.
pub fn parse_control(input: &[u8]) -> Result<SstpControlPacket, SstpError> {
    if input.len() < 4 {
        return Err(SstpError::InvalidPacket);
    }

    let message_type = MessageType::from_u16(u16::from_be_bytes([input[0], input[1]]));
    let attribute_count = u16::from_be_bytes([input[2], input[3]]);

    let mut attributes = Vec::with_capacity(attribute_count as usize);
    let mut consumed = 4;
    for _ in 0..attribute_count {
        if consumed + 4 > input.len() {
            return Err(SstpError::TruncatedAttribute);
        }
        // byte at `consumed` is Reserved
        let attribute_id = AttributeId::from_u8(input[consumed + 1]);
        let length = u16::from_be_bytes([input[consumed + 2], input[consumed + 3]]) as usize;
        if length < 4 || consumed + length > input.len() {
            return Err(SstpError::TruncatedAttribute);
        }
        attributes.push(SstpAttribute {
            attribute_id,
            data: input[consumed + 4..consumed + length].to_vec(),
        });
        consumed += length;
    }

    Ok(SstpControlPacket {
        message_type,
        attributes,
    })
}

pub fn encode_attribute(attribute: &SstpAttribute) -> Vec<u8> {
    let length = (attribute.data.len() + 4) as u16;
    let mut out = Vec::with_capacity(length as usize);
    out.push(0); // Reserved
    out.push(attribute.attribute_id.as_u8());
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(&attribute.data);
    out
}

/// Build a complete control frame, header included. All length fields are
/// computed here so an encode/decode pair always round-trips.
pub fn encode_control(message_type: MessageType, attributes: &[SstpAttribute]) -> Vec<u8> {
    let total: usize = 8 + attributes.iter().map(|a| a.data.len() + 4).sum::<usize>();
    let header = SstpHeader {
        major_version: 1,
        minor_version: 0,
        is_control: true,
        length: total as u16,
    };

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&encode_header(&header));
    out.extend_from_slice(&message_type.as_u16().to_be_bytes());
    out.extend_from_slice(&(attributes.len() as u16).to_be_bytes());
    for attribute in attributes {
        out.extend_from_slice(&encode_attribute(attribute));
    }
    out
}

/// Build a data frame going through the full header struct.
pub fn build_data_packet(payload: &[u8]) -> Vec<u8> {
    let header = SstpHeader {
        major_version: 1,
        minor_version: 0,
        is_control: false,
        length: (payload.len() + 4) as u16,
    };
    let mut out = Vec::with_capacity(payload.len() + 4);
    out.extend_from_slice(&encode_header(&header));
    out.extend_from_slice(payload);
    out
}

/// Fast path for the data plane: 4-byte header plus payload, no
/// intermediate structs. Runs for every tunneled packet.
pub fn pack_data_packet_fast(payload: &[u8]) -> Vec<u8> {
    let total = payload.len() + 4;
    let mut out = Vec::with_capacity(total);
    out.push(0x10);
    out.push(0x00); // data packet
    out.extend_from_slice(&(total as u16).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Call Connect Ack with a crypto binding request attribute. The attribute is
/// a placeholder, crypto binding is not actually implemented: the hash
/// bitmask says SHA1 and SHA256 are fine and the nonce is zero. 48 bytes.
pub fn build_connect_ack_packet() -> Vec<u8> {
    let mut data = vec![0, 0, 0, 3]; // 3 reserved bytes + hash protocol bitmask
    data.extend_from_slice(&[0u8; 32]); // nonce
    encode_control(
        MessageType::CallConnectAck,
        &[SstpAttribute {
            attribute_id: AttributeId::CryptoBindingReq,
            data,
        }],
    )
}

/// Call Disconnect Ack, no attributes, 8 bytes.
pub fn build_disconnect_ack_packet() -> Vec<u8> {
    encode_control(MessageType::CallDisconnectAck, &[])
}

/// Echo Response, no attributes, 8 bytes.
pub fn build_echo_response_packet() -> Vec<u8> {
    encode_control(MessageType::EchoResponse, &[])
}

/// Call Abort, no attributes, 8 bytes.
pub fn build_abort_packet() -> Vec<u8> {
    encode_control(MessageType::CallAbort, &[])
}
