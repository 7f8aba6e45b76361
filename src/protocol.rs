use crate::error::ProtocolError;
use crate::types::{InboundEvent, OutboundMessage};

pub fn decode_inbound(text: &str) -> Result<InboundEvent, ProtocolError> {
    let event = serde_json::from_str(text.trim())?;
    Ok(event)
}

pub fn decode_binary(bytes: &[u8]) -> Result<InboundEvent, ProtocolError> {
    let text = String::from_utf8(bytes.to_vec())?;
    decode_inbound(&text)
}

pub fn encode_outbound(message: &OutboundMessage) -> Result<String, ProtocolError> {
    let json = serde_json::to_string(message)?;
    Ok(json)
}
