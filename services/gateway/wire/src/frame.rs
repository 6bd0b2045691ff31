//! Length-prefixed framing for the serial link.
//!
//! A frame is a single length byte followed by that many payload bytes. The
//! link has no checksum or sync marker; a zero length byte is the only
//! malformation the decoder can observe, so the receiver relies on timeouts
//! (enforced by the I/O layer) to recover from a stalled payload.

use crate::WireError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;

/// Largest payload a single frame can carry
pub const MAX_FRAME_PAYLOAD: usize = u8::MAX as usize;

/// Size of the receive buffer, enough for the length byte plus a full payload
pub const RX_BUFFER_CAPACITY: usize = MAX_FRAME_PAYLOAD + 1;

/// Frame a payload for transmission.
///
/// Empty payloads and payloads above [`MAX_FRAME_PAYLOAD`] are rejected; a
/// zero length byte would be read as a framing fault by the peer.
pub fn encode_frame(payload: &[u8]) -> Result<Bytes, WireError> {
    if payload.is_empty() {
        return Err(WireError::Empty);
    }
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(WireError::Size(payload.len()));
    }

    let mut buf = BytesMut::with_capacity(payload.len() + 1);
    buf.put_u8(payload.len() as u8);
    buf.put_slice(payload);

    Ok(buf.freeze())
}

/// Receive state of the frame decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RxState {
    /// Waiting for the next length byte
    AwaitingLength,
    /// Collecting payload bytes of a frame in progress
    AwaitingPayload {
        /// Payload length announced by the length byte
        total_len: u8,
        /// Payload bytes received so far
        bytes_read: u8,
    },
}

/// Incremental decoder for length-prefixed frames.
///
/// Bytes are consumed from the caller's buffer only as far as the current
/// state needs them, so several frames can sit in the same buffer and are
/// returned one per call. A completed payload is handed out and the decoder
/// immediately returns to [`RxState::AwaitingLength`] with a cleared buffer.
#[derive(Debug)]
pub struct FrameDecoder {
    state: RxState,
    rx_buf: [u8; RX_BUFFER_CAPACITY],
    consecutive_invalid: u32,
    frames_decoded: u64,
    invalid_frames: u64,
}

impl FrameDecoder {
    /// Create a new frame decoder
    pub fn new() -> Self {
        Self {
            state: RxState::AwaitingLength,
            rx_buf: [0; RX_BUFFER_CAPACITY],
            consecutive_invalid: 0,
            frames_decoded: 0,
            invalid_frames: 0,
        }
    }

    /// Current receive state
    pub fn state(&self) -> RxState {
        self.state
    }

    /// Whether a frame is partially received
    pub fn is_mid_frame(&self) -> bool {
        matches!(self.state, RxState::AwaitingPayload { .. })
    }

    /// Number of zero-length frames seen since the last valid length byte
    pub fn consecutive_invalid(&self) -> u32 {
        self.consecutive_invalid
    }

    /// Total frames decoded
    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// Total zero-length frames seen
    pub fn invalid_frames(&self) -> u64 {
        self.invalid_frames
    }

    /// Discard any partially received frame and wait for a new length byte
    pub fn reset(&mut self) {
        if let RxState::AwaitingPayload {
            total_len,
            bytes_read,
        } = self.state
        {
            tracing::debug!(
                "Discarding partial frame ({} of {} bytes)",
                bytes_read,
                total_len
            );
        }
        self.rx_buf.fill(0);
        self.state = RxState::AwaitingLength;
    }

    /// Decode one frame from a buffer.
    ///
    /// Returns `Ok(None)` when `buf` runs out before a frame completes; the
    /// partial frame is kept and decoding resumes on the next call. A zero
    /// length byte is consumed and reported as [`WireError::ZeroLength`];
    /// the caller may keep decoding the rest of the buffer afterwards.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, WireError> {
        loop {
            match self.state {
                RxState::AwaitingLength => {
                    if buf.is_empty() {
                        return Ok(None);
                    }

                    let len = buf.get_u8();
                    if len == 0 {
                        self.consecutive_invalid = self.consecutive_invalid.saturating_add(1);
                        self.invalid_frames += 1;
                        return Err(WireError::ZeroLength);
                    }

                    self.consecutive_invalid = 0;
                    self.state = RxState::AwaitingPayload {
                        total_len: len,
                        bytes_read: 0,
                    };
                }
                RxState::AwaitingPayload {
                    total_len,
                    bytes_read,
                } => {
                    let wanted = (total_len - bytes_read) as usize;
                    let available = wanted.min(buf.len());
                    if available == 0 {
                        return Ok(None);
                    }

                    let start = bytes_read as usize;
                    self.rx_buf[start..start + available].copy_from_slice(&buf[..available]);
                    buf.advance(available);

                    let bytes_read = bytes_read + available as u8;
                    if bytes_read < total_len {
                        self.state = RxState::AwaitingPayload {
                            total_len,
                            bytes_read,
                        };
                        continue;
                    }

                    let payload = Bytes::copy_from_slice(&self.rx_buf[..total_len as usize]);
                    self.rx_buf.fill(0);
                    self.state = RxState::AwaitingLength;
                    self.frames_decoded += 1;

                    return Ok(Some(payload));
                }
            }
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_frame_prefixes_length() {
        let frame = encode_frame(&[0xAA, 0xBB, 0xCC]).unwrap();
        assert_eq!(&frame[..], &[3, 0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn test_encode_frame_limits() {
        assert_eq!(encode_frame(&[]), Err(WireError::Empty));
        assert_eq!(encode_frame(&[0u8; 256]), Err(WireError::Size(256)));

        let frame = encode_frame(&[7u8; MAX_FRAME_PAYLOAD]).unwrap();
        assert_eq!(frame.len(), RX_BUFFER_CAPACITY);
        assert_eq!(frame[0], 255);
    }

    #[test]
    fn test_decode_back_to_back_frames() {
        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::from(&[2, 0x00, 0x05, 1, 0x01][..]);

        let first = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&first[..], &[0x00, 0x05]);
        let second = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&second[..], &[0x01]);

        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert_eq!(decoder.frames_decoded(), 2);
        assert_eq!(decoder.state(), RxState::AwaitingLength);
    }

    #[test]
    fn test_decode_resumes_partial_payload() {
        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::from(&[4, 0x10, 0x11][..]);

        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert_eq!(
            decoder.state(),
            RxState::AwaitingPayload {
                total_len: 4,
                bytes_read: 2
            }
        );
        assert!(buf.is_empty());

        buf.extend_from_slice(&[0x12, 0x13, 9]);
        let frame = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame[..], &[0x10, 0x11, 0x12, 0x13]);
        // Length byte of the next frame stays in the caller's buffer
        assert_eq!(&buf[..], &[9]);
    }

    #[test]
    fn test_zero_length_is_counted_and_skipped() {
        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::from(&[0, 0, 1, 0x42][..]);

        assert_eq!(decoder.decode(&mut buf), Err(WireError::ZeroLength));
        assert_eq!(decoder.decode(&mut buf), Err(WireError::ZeroLength));
        assert_eq!(decoder.consecutive_invalid(), 2);

        let frame = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame[..], &[0x42]);
        assert_eq!(decoder.consecutive_invalid(), 0);
        assert_eq!(decoder.invalid_frames(), 2);
    }

    #[test]
    fn test_reset_discards_partial_frame() {
        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::from(&[3, 0xDE][..]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert!(decoder.is_mid_frame());

        decoder.reset();
        assert_eq!(decoder.state(), RxState::AwaitingLength);

        // The stale byte is not glued onto the next frame
        buf.extend_from_slice(&[1, 0xEF]);
        let frame = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame[..], &[0xEF]);
    }

    #[test]
    fn test_full_size_frame() {
        let mut decoder = FrameDecoder::new();
        let payload: Vec<u8> = (0..=254u8).collect();
        let mut buf = BytesMut::from(&encode_frame(&payload).unwrap()[..]);

        let frame = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame[..], &payload[..]);
    }

    #[test]
    fn test_every_payload_length_decodes() {
        let mut decoder = FrameDecoder::new();

        for len in 1..=MAX_FRAME_PAYLOAD {
            let payload: Vec<u8> = (0..len).map(|i| (i as u8).wrapping_mul(31)).collect();
            let mut buf = BytesMut::from(&encode_frame(&payload).unwrap()[..]);

            let frame = decoder.decode(&mut buf).unwrap().unwrap();
            assert_eq!(&frame[..], &payload[..], "payload length {}", len);
            assert_eq!(decoder.state(), RxState::AwaitingLength);
            assert!(buf.is_empty());
        }

        assert_eq!(decoder.frames_decoded(), MAX_FRAME_PAYLOAD as u64);
    }
}
