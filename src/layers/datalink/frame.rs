use super::header::{FrameHeader, FrameKind, HEADER_SIZE};
use crate::error::FrameError;

/// Largest frame the channel accepts, header included
pub const MAX_FRAME_SIZE: usize = 1600;

/// Wire image of [`FrameHeader::noise`], shared by every collision broadcast
pub static NOISE_FRAME: [u8; HEADER_SIZE] = [
    0, 0, 0, 0, 0, 0, // source
    0, 0, 0, 0, 0, 0, // destination
    0x02, 0x00, // kind
    0xFF, 0xFF, 0xFF, 0xFF, // sequence
    0x00, 0x00, // payload length
];

/// A decoded frame owning its payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    header: FrameHeader,
    payload: Vec<u8>,
}

impl Frame {
    /// Builds a frame whose header length field matches `payload`
    pub fn new(mut header: FrameHeader, payload: Vec<u8>) -> Result<Self, FrameError> {
        header.payload_len = u16::try_from(payload.len()).map_err(|_| FrameError::TooLarge {
            size: HEADER_SIZE + payload.len(),
            max: HEADER_SIZE + u16::MAX as usize,
        })?;
        Ok(Frame { header, payload })
    }

    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn encode(&self, max_frame_size: usize) -> Result<Vec<u8>, FrameError> {
        encode(&self.header, &self.payload, max_frame_size)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let (header, payload) = decode(bytes)?;
        Ok(Frame {
            header,
            payload: payload.to_vec(),
        })
    }
}

/// Serializes a header followed by its payload
pub fn encode(
    header: &FrameHeader,
    payload: &[u8],
    max_frame_size: usize,
) -> Result<Vec<u8>, FrameError> {
    let size = HEADER_SIZE + payload.len();
    if size > max_frame_size {
        return Err(FrameError::TooLarge {
            size,
            max: max_frame_size,
        });
    }
    if header.payload_len as usize != payload.len() {
        return Err(FrameError::LengthMismatch {
            expected: header.payload_len as usize,
            actual: payload.len(),
        });
    }

    let mut bytes = Vec::with_capacity(size);
    bytes.extend_from_slice(&header.to_le_bytes());
    bytes.extend_from_slice(payload);
    Ok(bytes)
}

/// Splits `bytes` into a header and the payload it announces.
///
/// The payload is clamped to the bytes actually present, so a lying length
/// field never causes a read past the end of `bytes`.
pub fn decode(bytes: &[u8]) -> Result<(FrameHeader, &[u8]), FrameError> {
    if bytes.len() < HEADER_SIZE {
        return Err(FrameError::Truncated {
            required: HEADER_SIZE,
            actual: bytes.len(),
        });
    }
    let (head, rest) = bytes.split_at(HEADER_SIZE);
    let mut raw = [0; HEADER_SIZE];
    raw.copy_from_slice(head);
    let header = FrameHeader::from_le_bytes(&raw);
    let available = rest.len().min(header.payload_len as usize);
    Ok((header, &rest[..available]))
}

pub fn is_noise(header: &FrameHeader) -> bool {
    header.kind == FrameKind::Noise
}
