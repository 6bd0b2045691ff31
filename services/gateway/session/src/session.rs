//! VAINA request/acknowledgement session over the serial link.
//!
//! One session runs per serial link. It owns the frame writer and the
//! in-flight request table, spawns the frame receiver, transmits outbound
//! requests with bounded retransmission, and answers inbound requests with
//! `ACK` or `NACK` after applying them through a [`VainaRouter`].

use crate::link::{run_receiver, FrameReader, FrameWriter, LinkEvent};
use crate::reliability::{PendingRequest, PendingRequests};
use crate::TransportError;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use vaina_routing::VainaRouter;
use vaina_wire::{MessageBody, MessageType, VainaMessage};

/// Configuration for a VAINA session
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Time to wait for `ACK`/`NACK` before retransmitting
    pub ack_timeout: Duration,
    /// Retransmissions after the first attempt
    pub max_retries: u32,
    /// Bound on each wait for the rest of a started frame
    pub read_timeout: Duration,
    /// Consecutive framing faults before the link is reported unavailable
    pub max_consecutive_faults: u32,
    /// Capacity of the receiver to session channel
    pub link_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_millis(500),
            max_retries: 3,
            read_timeout: Duration::from_millis(250),
            max_consecutive_faults: 3,
            link_buffer: 64,
        }
    }
}

/// Statistics for a session
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Frames received
    pub frames_received: u64,
    /// Frames sent, retransmissions and replies included
    pub frames_sent: u64,
    /// Retransmitted requests
    pub retransmissions: u64,
    /// Requests abandoned after the retry limit
    pub delivery_failures: u64,
    /// Frames that did not decode as VAINA messages
    pub undecodable: u64,
    /// Replies with no matching request in flight
    pub unsolicited_replies: u64,
}

/// Events emitted by sessions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The peer acknowledged a request
    Delivered {
        /// The request
        message: VainaMessage,
        /// Transmissions it took
        attempts: u32,
    },
    /// The peer answered a request with `NACK`
    Rejected {
        /// The request
        message: VainaMessage,
    },
    /// No reply after the retry limit
    DeliveryFailed {
        /// The request
        message: VainaMessage,
        /// Transmissions made
        attempts: u32,
    },
    /// An inbound request was applied (`ACK`) or refused (`NACK`)
    RequestHandled {
        /// The request
        message: VainaMessage,
        /// Whether it was acknowledged
        accepted: bool,
    },
    /// The serial link became usable again
    LinkAvailable,
    /// The serial link stopped delivering valid frames
    LinkUnavailable {
        /// Last fault seen
        reason: String,
    },
}

/// Session state owned by the session task
struct SessionState<W> {
    config: SessionConfig,
    writer: FrameWriter<W>,
    pending: PendingRequests,
    router: Arc<dyn VainaRouter>,
    event_tx: mpsc::Sender<SessionEvent>,
    stats: SessionStats,
}

impl<W: AsyncWrite + Unpin> SessionState<W> {
    /// Send a message; requests are tracked until answered
    async fn transmit(&mut self, message: VainaMessage) -> Result<(), TransportError> {
        self.writer.send(&message).await?;
        self.stats.frames_sent += 1;

        if message.is_reply() {
            return Ok(());
        }

        let deadline = Instant::now() + self.config.ack_timeout;
        if let Some(displaced) = self.pending.insert(PendingRequest::new(message, deadline)) {
            warn!(
                "Sequence number {} reused while {} was in flight",
                message.seqno, displaced.message
            );
            self.stats.delivery_failures += 1;
            self.event_tx
                .send(SessionEvent::DeliveryFailed {
                    message: displaced.message,
                    attempts: displaced.attempts,
                })
                .await
                .ok();
        }
        Ok(())
    }

    /// Handle one received frame
    async fn handle_frame(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        self.stats.frames_received += 1;

        let message = match VainaMessage::deserialize(frame) {
            Ok(message) => message,
            Err(e) => {
                self.stats.undecodable += 1;
                warn!("Undecodable VAINA message ({} bytes): {}", frame.len(), e);
                // A broken reply is not answered; the peer would only drop the NACK
                let is_reply = frame
                    .first()
                    .and_then(|&byte| MessageType::try_from(byte).ok())
                    .is_some_and(|msg_type| msg_type.is_reply());
                if let (false, Some(&seqno)) = (is_reply, frame.get(1)) {
                    self.transmit(VainaMessage::nack(seqno)).await?;
                }
                return Ok(());
            }
        };
        debug!("Received {}", message);

        match message.body {
            MessageBody::Ack | MessageBody::Nack => {
                let Some(request) = self.pending.complete(message.seqno) else {
                    self.stats.unsolicited_replies += 1;
                    debug!("Ignoring {} with no request in flight", message);
                    return Ok(());
                };

                let event = if message.body == MessageBody::Ack {
                    info!("{} acknowledged", request.message);
                    SessionEvent::Delivered {
                        message: request.message,
                        attempts: request.attempts,
                    }
                } else {
                    warn!("{} rejected by peer", request.message);
                    SessionEvent::Rejected {
                        message: request.message,
                    }
                };
                self.event_tx.send(event).await.ok();
            }
            _ => {
                let accepted = match self.router.apply(&message.body).await {
                    Ok(()) => true,
                    Err(e) => {
                        info!("Refusing {}: {}", message, e);
                        false
                    }
                };
                self.transmit(message.reply(accepted)).await?;
                self.event_tx
                    .send(SessionEvent::RequestHandled { message, accepted })
                    .await
                    .ok();
            }
        }
        Ok(())
    }

    /// Retransmit or abandon requests whose deadline passed
    async fn retransmit_expired(&mut self) -> Result<(), TransportError> {
        for mut request in self.pending.take_expired(Instant::now()) {
            if request.attempts > self.config.max_retries {
                error!(
                    "Giving up on {} after {} attempts",
                    request.message, request.attempts
                );
                self.stats.delivery_failures += 1;
                self.event_tx
                    .send(SessionEvent::DeliveryFailed {
                        message: request.message,
                        attempts: request.attempts,
                    })
                    .await
                    .ok();
                continue;
            }

            warn!(
                "No reply to {} within {:?}, retransmitting (attempt {})",
                request.message,
                self.config.ack_timeout,
                request.attempts + 1
            );
            self.writer.send(&request.message).await?;
            self.stats.frames_sent += 1;
            self.stats.retransmissions += 1;

            request.attempts += 1;
            request.deadline = Instant::now() + self.config.ack_timeout;
            self.pending.insert(request);
        }
        Ok(())
    }
}

/// Main session implementation
pub struct Session;

impl Session {
    /// Run a session over `stream` until shutdown or link failure.
    ///
    /// Messages received on `outbound` are transmitted; requests among them
    /// are retransmitted until answered or the retry limit is hit. Inbound
    /// requests are applied through `router`. Closing `outbound` does not end
    /// the session.
    pub async fn run<S>(
        config: SessionConfig,
        stream: S,
        router: Arc<dyn VainaRouter>,
        mut outbound: mpsc::UnboundedReceiver<VainaMessage>,
        event_tx: mpsc::Sender<SessionEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<SessionStats>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        info!(
            "Starting VAINA session (ack timeout {:?}, {} retries)",
            config.ack_timeout, config.max_retries
        );

        let (read_half, write_half) = tokio::io::split(stream);
        let (link_tx, mut link_rx) = mpsc::channel(config.link_buffer);
        let mut receiver = tokio::spawn(run_receiver(
            FrameReader::new(read_half, config.read_timeout),
            config.max_consecutive_faults,
            link_tx,
            shutdown.clone(),
        ));

        let mut state = SessionState {
            config,
            writer: FrameWriter::new(write_half),
            pending: PendingRequests::default(),
            router,
            event_tx,
            stats: SessionStats::default(),
        };
        let mut outbound_open = true;

        // Main event loop
        let result: anyhow::Result<()> = loop {
            let next_deadline = state.pending.next_deadline();

            tokio::select! {
                biased;

                _ = shutdown.changed() => {
                    info!("Session shutting down with {} requests in flight", state.pending.len());
                    break Ok(());
                }

                event = link_rx.recv() => {
                    match event {
                        Some(LinkEvent::Frame(frame)) => {
                            if let Err(e) = state.handle_frame(&frame).await {
                                break Err(e.into());
                            }
                        }
                        Some(LinkEvent::Available) => {
                            state.event_tx.send(SessionEvent::LinkAvailable).await.ok();
                        }
                        Some(LinkEvent::Unavailable { reason }) => {
                            state.event_tx.send(SessionEvent::LinkUnavailable { reason }).await.ok();
                        }
                        None => {
                            break match (&mut receiver).await {
                                Ok(Ok(())) => Ok(()),
                                Ok(Err(e)) => Err(e.into()),
                                Err(e) => Err(e.into()),
                            };
                        }
                    }
                }

                message = outbound.recv(), if outbound_open => {
                    match message {
                        Some(message) => {
                            if let Err(e) = state.transmit(message).await {
                                error!("Failed to send {}: {}", message, e);
                                break Err(e.into());
                            }
                        }
                        None => {
                            debug!("Outbound channel closed");
                            outbound_open = false;
                        }
                    }
                }

                _ = wait_until(next_deadline) => {
                    if let Err(e) = state.retransmit_expired().await {
                        break Err(e.into());
                    }
                }
            }
        };

        receiver.abort();
        info!(
            "VAINA session ended: {} frames in, {} frames out, {} retransmissions",
            state.stats.frames_received, state.stats.frames_sent, state.stats.retransmissions
        );

        result.map(|()| state.stats)
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
