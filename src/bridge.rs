// Buffer bridge: one inbound frame in, one reply frame out

use crate::network::protocol::{decode_frame_into, encode_frame, FrameError};
use crate::network::Payload;

/// Copy an inbound frame into `send` and build the reply from `receive`
///
/// On error `send` is unchanged and nothing should be sent back.
pub fn exchange(payload: &Payload, send: &mut [f64], receive: &[f64]) -> Result<Vec<u8>, FrameError> {
    if !payload.binary {
        return Err(FrameError::NotBinary);
    }
    decode_frame_into(&payload.data, send)?;
    Ok(encode_frame(receive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::protocol::frame_len;

    #[test]
    fn test_frame_fills_send_buffer_and_replies_once() {
        let inbound: Vec<f64> = (1..=6).map(f64::from).collect();
        let mut send = [0.0; 6];
        let receive = [0.25, 7.0, -3.5];

        let reply = exchange(&Payload::binary(encode_frame(&inbound)), &mut send, &receive).unwrap();

        assert_eq!(send.to_vec(), inbound);
        assert_eq!(reply.len(), frame_len(receive.len()));
        assert_eq!(reply, encode_frame(&receive));
    }

    #[test]
    fn test_wrong_size_frame_is_dropped() {
        let mut send = [4.0; 6];
        let result = exchange(&Payload::binary(encode_frame(&[1.0; 5])), &mut send, &[0.0]);

        assert_eq!(result, Err(FrameError::SizeMismatch { got: 40, expected: 48 }));
        assert_eq!(send, [4.0; 6]);
    }

    #[test]
    fn test_text_message_is_dropped() {
        let mut send = [0.0; 1];
        let result = exchange(&Payload::text("hello"), &mut send, &[1.0]);
        assert_eq!(result, Err(FrameError::NotBinary));
    }
}
