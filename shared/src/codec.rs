//! Binary encoding of [`Packet`]s for UDP datagrams.

use crate::protocol::Packet;
use serde::Serialize;
use thiserror::Error;

/// Largest payload a single UDP datagram can carry.
pub const MAX_PACKET_SIZE: usize = 65_507;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("packet of {size} bytes exceeds the {} byte datagram limit", MAX_PACKET_SIZE)]
    TooLarge { size: usize },
}

pub fn encode(packet: &Packet) -> Result<Vec<u8>, CodecError> {
    let bytes = bincode::serialize(packet)?;
    if bytes.len() > MAX_PACKET_SIZE {
        return Err(CodecError::TooLarge { size: bytes.len() });
    }
    Ok(bytes)
}

/// Bytes `value` occupies inside an encoded packet.
pub fn encoded_size<T: Serialize + ?Sized>(value: &T) -> Result<usize, CodecError> {
    Ok(bincode::serialized_size(value)? as usize)
}

pub fn decode(data: &[u8]) -> Result<Packet, CodecError> {
    if data.len() > MAX_PACKET_SIZE {
        return Err(CodecError::TooLarge { size: data.len() });
    }
    Ok(bincode::deserialize(data)?)
}
