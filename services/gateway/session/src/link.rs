//! Frame I/O over the serial link and the cancellable receive task.

use crate::TransportError;
use bytes::{Bytes, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, trace, warn};
use vaina_wire::{encode_frame, FrameDecoder, VainaMessage, RX_BUFFER_CAPACITY};

/// Events produced by the receive task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A complete frame payload
    Frame(Bytes),
    /// A valid frame arrived after the link was reported unavailable
    Available,
    /// Too many consecutive faults, or the stream ended
    Unavailable {
        /// Last fault seen
        reason: String,
    },
}

/// Writes length-prefixed frames to the serial link
#[derive(Debug)]
pub struct FrameWriter<W> {
    writer: W,
    frames_sent: u64,
    bytes_sent: u64,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Wrap the write half of the link
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            frames_sent: 0,
            bytes_sent: 0,
        }
    }

    /// Frame and write a payload, returning the number of bytes written.
    ///
    /// Empty and oversize payloads are rejected before anything reaches the
    /// device.
    pub async fn write(&mut self, payload: &[u8]) -> Result<usize, TransportError> {
        let frame = encode_frame(payload)?;

        let mut written = 0;
        while written < frame.len() {
            let n = self.writer.write(&frame[written..]).await?;
            if n == 0 {
                return Err(TransportError::ShortWrite {
                    expected: frame.len(),
                    written,
                });
            }
            written += n;
        }
        self.writer.flush().await?;

        self.frames_sent += 1;
        self.bytes_sent += written as u64;
        trace!("Wrote {} byte frame", written);

        Ok(written)
    }

    /// Serialize and write a VAINA message
    pub async fn send(&mut self, message: &VainaMessage) -> Result<usize, TransportError> {
        debug!("Sending {}", message);
        self.write(&message.serialize()).await
    }

    /// Frames written so far
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Bytes written so far, length prefixes included
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }
}

/// Reads length-prefixed frames from the serial link
#[derive(Debug)]
pub struct FrameReader<R> {
    reader: R,
    decoder: FrameDecoder,
    buffer: BytesMut,
    read_timeout: Duration,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap the read half of the link; `read_timeout` bounds mid-frame waits
    pub fn new(reader: R, read_timeout: Duration) -> Self {
        Self {
            reader,
            decoder: FrameDecoder::new(),
            buffer: BytesMut::with_capacity(RX_BUFFER_CAPACITY),
            read_timeout,
        }
    }

    /// Frame decoder state
    pub fn decoder(&self) -> &FrameDecoder {
        &self.decoder
    }

    /// Read the next frame payload.
    ///
    /// Waiting for a length byte is unbounded. Once a frame has started, each
    /// wait for more payload is bounded by the read timeout; on expiry the
    /// partial frame is discarded and [`TransportError::Timeout`] returned.
    pub async fn read_frame(&mut self) -> Result<Bytes, TransportError> {
        loop {
            if let Some(frame) = self.decoder.decode(&mut self.buffer)? {
                return Ok(frame);
            }

            let n = if self.decoder.is_mid_frame() {
                match tokio::time::timeout(self.read_timeout, self.reader.read_buf(&mut self.buffer)).await {
                    Ok(result) => result?,
                    Err(_) => {
                        self.decoder.reset();
                        return Err(TransportError::Timeout(self.read_timeout));
                    }
                }
            } else {
                self.reader.read_buf(&mut self.buffer).await?
            };

            if n == 0 {
                return Err(TransportError::LinkDown);
            }
        }
    }
}

/// Receive frames until shutdown, end of stream or an I/O error.
///
/// Recoverable faults are counted; reaching `max_consecutive_faults` reports
/// the link unavailable once, and the next valid frame reports it available
/// again. A fatal error reports the link unavailable before returning.
pub async fn run_receiver<R>(
    mut reader: FrameReader<R>,
    max_consecutive_faults: u32,
    event_tx: mpsc::Sender<LinkEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut faults = 0u32;
    let mut available = true;

    loop {
        tokio::select! {
            biased;

            _ = shutdown.changed() => {
                info!("Frame receiver shutting down");
                return Ok(());
            }

            result = reader.read_frame() => {
                match result {
                    Ok(frame) => {
                        faults = 0;
                        if !available {
                            available = true;
                            info!("Serial link available");
                            if event_tx.send(LinkEvent::Available).await.is_err() {
                                return Ok(());
                            }
                        }
                        trace!("Received {} byte frame", frame.len());
                        if event_tx.send(LinkEvent::Frame(frame)).await.is_err() {
                            debug!("Frame consumer gone, stopping receiver");
                            return Ok(());
                        }
                    }
                    Err(e) if e.is_recoverable() => {
                        faults = faults.saturating_add(1);
                        warn!("Serial link fault ({} consecutive): {}", faults, e);
                        if faults >= max_consecutive_faults && available {
                            available = false;
                            warn!("Serial link unavailable after {} faults", faults);
                            event_tx
                                .send(LinkEvent::Unavailable { reason: e.to_string() })
                                .await
                                .ok();
                        }
                    }
                    Err(e) => {
                        error!("Serial link failed: {}", e);
                        if available {
                            event_tx
                                .send(LinkEvent::Unavailable { reason: e.to_string() })
                                .await
                                .ok();
                        }
                        return Err(e);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;
    use vaina_wire::{RxState, WireError};

    #[tokio::test]
    async fn test_writer_frames_payload() {
        let (near, mut far) = duplex(64);
        let mut writer = FrameWriter::new(near);

        let written = writer.send(&VainaMessage::ack(7)).await.unwrap();
        assert_eq!(written, 3);
        assert_eq!(writer.frames_sent(), 1);

        let mut buf = [0u8; 3];
        far.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [2, 0, 7]);
    }

    #[tokio::test]
    async fn test_writer_rejects_before_writing() {
        let (near, _far) = duplex(512);
        let mut writer = FrameWriter::new(near);

        assert!(matches!(
            writer.write(&[]).await,
            Err(TransportError::Framing(WireError::Empty))
        ));
        assert!(matches!(
            writer.write(&[0u8; 300]).await,
            Err(TransportError::Framing(WireError::Size(300)))
        ));
        assert_eq!(writer.bytes_sent(), 0);
    }

    #[tokio::test]
    async fn test_reader_splits_stream() {
        let (mut near, far) = duplex(64);
        let mut reader = FrameReader::new(far, Duration::from_millis(100));

        near.write_all(&[2, 0, 1, 18]).await.unwrap();
        near.write_all(&VainaMessage::rcs_add(2, "2000::1".parse().unwrap()).serialize())
            .await
            .unwrap();

        assert_eq!(&reader.read_frame().await.unwrap()[..], &[0, 1]);
        let frame = reader.read_frame().await.unwrap();
        assert_eq!(frame.len(), 18);
        assert_eq!(frame[0], 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reader_discards_stalled_frame() {
        let (mut near, far) = duplex(64);
        let mut reader = FrameReader::new(far, Duration::from_millis(100));

        near.write_all(&[4, 0xAA]).await.unwrap();
        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)));
        assert_eq!(reader.decoder().state(), RxState::AwaitingLength);

        near.write_all(&[1, 0xBB]).await.unwrap();
        assert_eq!(&reader.read_frame().await.unwrap()[..], &[0xBB]);
    }

    #[tokio::test]
    async fn test_reader_reports_end_of_stream() {
        let (near, far) = duplex(64);
        let mut reader = FrameReader::new(far, Duration::from_millis(100));
        drop(near);

        assert!(matches!(reader.read_frame().await, Err(TransportError::LinkDown)));
    }

    #[tokio::test]
    async fn test_receiver_tracks_link_availability() {
        let (mut near, far) = duplex(64);
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let receiver = tokio::spawn(run_receiver(
            FrameReader::new(far, Duration::from_millis(100)),
            3,
            event_tx,
            shutdown_rx,
        ));

        // Three zero-length bytes then a valid frame
        near.write_all(&[0, 0, 0, 1, 0x42]).await.unwrap();

        assert!(matches!(
            event_rx.recv().await,
            Some(LinkEvent::Unavailable { .. })
        ));
        assert_eq!(event_rx.recv().await, Some(LinkEvent::Available));
        assert_eq!(
            event_rx.recv().await,
            Some(LinkEvent::Frame(Bytes::from_static(&[0x42])))
        );

        drop(near);
        assert!(matches!(
            receiver.await.unwrap(),
            Err(TransportError::LinkDown)
        ));
    }

    #[tokio::test]
    async fn test_receiver_stops_on_shutdown() {
        let (_near, far) = duplex(64);
        let (event_tx, _event_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let receiver = tokio::spawn(run_receiver(
            FrameReader::new(far, Duration::from_millis(100)),
            3,
            event_tx,
            shutdown_rx,
        ));

        shutdown_tx.send(true).unwrap();
        assert!(receiver.await.unwrap().is_ok());
    }
}
