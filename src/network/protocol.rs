// Data channel wire format for simulation frames
// A frame is the raw little-endian f64 values of one buffer, nothing else

use thiserror::Error;

/// Bytes per buffer value on the wire
pub const VALUE_SIZE: usize = std::mem::size_of::<f64>();

/// Reasons an inbound frame is dropped
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("unexpected data type received (text message)")]
    NotBinary,

    #[error("unexpected data size received: {got} (expected {expected})")]
    SizeMismatch { got: usize, expected: usize },
}

/// Byte length of a frame carrying `count` values
pub fn frame_len(count: usize) -> usize {
    count * VALUE_SIZE
}

/// Serialize buffer values for transmission
pub fn encode_frame(values: &[f64]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(frame_len(values.len()));
    for value in values {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Copy a frame into `values`
///
/// The frame must hold exactly `values.len()` values; on any mismatch `values`
/// is left untouched.
pub fn decode_frame_into(bytes: &[u8], values: &mut [f64]) -> Result<(), FrameError> {
    let expected = frame_len(values.len());
    if bytes.len() != expected {
        return Err(FrameError::SizeMismatch {
            got: bytes.len(),
            expected,
        });
    }

    for (value, chunk) in values.iter_mut().zip(bytes.chunks_exact(VALUE_SIZE)) {
        let mut raw = [0u8; VALUE_SIZE];
        raw.copy_from_slice(chunk);
        *value = f64::from_le_bytes(raw);
    }
    Ok(())
}
