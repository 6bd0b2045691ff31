//! Turpial mesh gateway daemon.
//!
//! In the `gateway` role the daemon reads Wi-Fi access point events as JSON
//! lines on stdin, correlates associations with DHCP leases, and announces
//! connected stations to the mesh radio over the VAINA serial link. In the
//! `node` role it plays the radio side, applying VAINA requests to its mesh
//! tables.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vaina_routing::{MeshTables, RejectAll, VainaRouter};
use vaina_session::{IoStream, Session, SessionEvent, SessionStats};
use vaina_station::{ChannelObserver, StationGateway, StationNotification, WifiEvent};

mod config;
mod logging;

use config::{GatewayConfig, Role};
use logging::GatewayLogFormatter;

/// Time allowed for the session task to wind down after shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Turpial mesh gateway
#[derive(Parser, Debug)]
#[command(name = "turpial-gateway", version, about = "Wi-Fi to mesh gateway over the VAINA serial link")]
struct Args {
    /// Configuration file path
    #[arg(long, default_value = "gateway.yaml")]
    config: PathBuf,

    /// Role on the serial link
    #[arg(long, value_enum)]
    role: Option<Role>,

    /// Serial character device, e.g. /dev/ttyUSB0
    #[arg(long, conflicts_with = "connect")]
    device: Option<PathBuf>,

    /// TCP serial bridge, e.g. 127.0.0.1:4001
    #[arg(long)]
    connect: Option<String>,

    /// ACK timeout, e.g. 500ms
    #[arg(long)]
    ack_timeout: Option<humantime::Duration>,

    /// Retransmissions before a request is abandoned
    #[arg(long)]
    max_retries: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    /// Command line flags take precedence over file and environment
    fn apply_to(&self, config: &mut GatewayConfig) {
        if let Some(role) = self.role {
            config.role = role;
        }
        if let Some(device) = &self.device {
            config.serial.device = Some(device.clone());
            config.serial.tcp = None;
        }
        if let Some(addr) = &self.connect {
            config.serial.tcp = Some(addr.clone());
        }
        if let Some(ack_timeout) = &self.ack_timeout {
            config.session.ack_timeout_ms = ack_timeout.as_millis() as u64;
        }
        if let Some(max_retries) = self.max_retries {
            config.session.max_retries = max_retries;
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::new("info")
        .add_directive(format!("turpial_gateway={}", args.log_level).parse()?)
        .add_directive(format!("vaina_wire={}", args.log_level).parse()?)
        .add_directive(format!("vaina_session={}", args.log_level).parse()?)
        .add_directive(format!("vaina_routing={}", args.log_level).parse()?)
        .add_directive(format!("vaina_station={}", args.log_level).parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .event_format(GatewayLogFormatter::new("turpial-gateway"))
        .init();

    info!("Starting Turpial gateway v{}", env!("CARGO_PKG_VERSION"));

    let mut config = GatewayConfig::load_from_file(&args.config)?;
    args.apply_to(&mut config);

    let endpoint = config.endpoint()?;
    info!("Opening serial link {} as {:?}", endpoint, config.role);
    let stream = IoStream::open(&endpoint)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open {}: {}", endpoint, e))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let result = match config.role {
        Role::Gateway => run_gateway(&config, stream, shutdown_tx, shutdown_rx).await,
        Role::Node => run_node(&config, stream, shutdown_tx, shutdown_rx).await,
    };

    info!("Turpial gateway shutdown complete");
    result
}

/// Wi-Fi side: station events in, RCS requests out
async fn run_gateway(
    config: &GatewayConfig,
    stream: IoStream,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (event_tx, mut event_rx) = mpsc::channel(config.session_config().link_buffer);

    let mut session = tokio::spawn(Session::run(
        config.session_config(),
        stream,
        Arc::new(RejectAll),
        outbound_rx,
        event_tx,
        shutdown_rx,
    ));

    let (observer, notifications) = ChannelObserver::new();
    let mut gateway = StationGateway::new(config.station_config(), outbound_tx);
    gateway.add_observer(Arc::new(observer));
    let notifier = tokio::spawn(log_notifications(notifications));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let (mut sigterm, mut sigint) = shutdown_signals()?;

    info!("Gateway started. Reading Wi-Fi events from stdin...");

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM signal, initiating graceful shutdown");
                break;
            }

            _ = sigint.recv() => {
                info!("Received SIGINT signal, initiating graceful shutdown");
                break;
            }

            result = &mut session => {
                log_session_result(result);
                notifier.abort();
                anyhow::bail!("VAINA session ended");
            }

            Some(event) = event_rx.recv() => {
                match event {
                    SessionEvent::LinkAvailable => gateway.link_state_changed(true),
                    SessionEvent::LinkUnavailable { reason } => {
                        component_warn!("session", "Mesh link unavailable: {}", reason);
                        gateway.link_state_changed(false);
                    }
                    other => log_session_event(&other),
                }
            }

            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => match parse_event_line(&line) {
                        Some(Ok(event)) => gateway.handle(event),
                        Some(Err(e)) => component_warn!("station", "Ignoring malformed event {:?}: {}", line, e),
                        None => {}
                    },
                    Ok(None) => {
                        info!("Event input closed, {} stations connected", gateway.connected().count());
                        stdin_open = false;
                    }
                    Err(e) => {
                        warn!("Failed to read event input: {}", e);
                        stdin_open = false;
                    }
                }
            }
        }
    }

    shutdown_tx.send(true).ok();
    finish_session(session).await;
    notifier.abort();
    Ok(())
}

/// Radio side: VAINA requests applied to the mesh tables
async fn run_node(
    config: &GatewayConfig,
    stream: IoStream,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let tables = Arc::new(MeshTables::new(
        config.routing.rcs_capacity,
        config.routing.nib_capacity,
        config.metric_limits(),
    ));

    // Nodes only answer; the outbound sender stays alive for the session's lifetime
    let (_outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (event_tx, mut event_rx) = mpsc::channel(config.session_config().link_buffer);

    let mut session = tokio::spawn(Session::run(
        config.session_config(),
        stream,
        tables.clone(),
        outbound_rx,
        event_tx,
        shutdown_rx,
    ));

    let (mut sigterm, mut sigint) = shutdown_signals()?;

    info!(
        "Mesh node started (RCS capacity {}, NIB capacity {}). Waiting for requests...",
        config.routing.rcs_capacity, config.routing.nib_capacity
    );

    let session_ended = loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM signal, initiating graceful shutdown");
                break false;
            }

            _ = sigint.recv() => {
                info!("Received SIGINT signal, initiating graceful shutdown");
                break false;
            }

            result = &mut session => {
                log_session_result(result);
                break true;
            }

            Some(event) = event_rx.recv() => log_session_event(&event),
        }
    };

    if !session_ended {
        shutdown_tx.send(true).ok();
        finish_session(session).await;
    }

    let stats = tables.get_stats().await;
    info!(
        "Mesh tables: {} requests applied, {} rejected, {} router clients, {} forwarding entries",
        stats.requests_applied, stats.requests_rejected, stats.rcs_entries, stats.nib_entries
    );

    if session_ended {
        anyhow::bail!("VAINA session ended");
    }
    Ok(())
}

fn shutdown_signals() -> anyhow::Result<(tokio::signal::unix::Signal, tokio::signal::unix::Signal)> {
    let sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to install SIGTERM handler: {}", e))?;
    let sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to install SIGINT handler: {}", e))?;
    Ok((sigterm, sigint))
}

/// Wait for the session task after shutdown was signalled
async fn finish_session(mut session: JoinHandle<anyhow::Result<SessionStats>>) {
    match tokio::time::timeout(SHUTDOWN_GRACE, &mut session).await {
        Ok(result) => log_session_result(result),
        Err(_) => {
            warn!("Session did not stop within {:?}, aborting", SHUTDOWN_GRACE);
            session.abort();
        }
    }
}

fn log_session_result(result: Result<anyhow::Result<SessionStats>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(stats)) => component_info!(
            "session",
            "Session stopped: {} frames in, {} out, {} retransmissions, {} delivery failures, {} undecodable",
            stats.frames_received,
            stats.frames_sent,
            stats.retransmissions,
            stats.delivery_failures,
            stats.undecodable
        ),
        Ok(Err(e)) => component_error!("session", "Session failed: {}", e),
        Err(e) => component_error!("session", "Session task panicked: {}", e),
    }
}

fn log_session_event(event: &SessionEvent) {
    match event {
        SessionEvent::Delivered { message, attempts } => {
            component_debug!("session", "{} delivered after {} attempt(s)", message, attempts)
        }
        SessionEvent::Rejected { message } => {
            component_warn!("session", "{} rejected by the mesh node", message)
        }
        SessionEvent::DeliveryFailed { message, attempts } => {
            component_error!("session", "{} undelivered after {} attempt(s)", message, attempts)
        }
        SessionEvent::RequestHandled { message, accepted } => {
            component_info!(
                "routing",
                "{} {}",
                message,
                if *accepted { "applied" } else { "refused" }
            )
        }
        SessionEvent::LinkAvailable => component_info!("session", "Mesh link available"),
        SessionEvent::LinkUnavailable { reason } => {
            component_warn!("session", "Mesh link unavailable: {}", reason)
        }
    }
}

async fn log_notifications(mut notifications: mpsc::UnboundedReceiver<StationNotification>) {
    while let Some(notification) = notifications.recv().await {
        match notification {
            StationNotification::Connected(record) => component_info!(
                "station",
                "Station {} (aid {}) connected as {} / {}",
                record.mac,
                record.aid,
                record.ipv4,
                record.ipv6
            ),
            StationNotification::Disconnected(record) => component_info!(
                "station",
                "Station {} (aid {}) disconnected, withdrew {}",
                record.mac,
                record.aid,
                record.ipv6
            ),
            StationNotification::LinkState(available) => component_debug!(
                "station",
                "Stations notified of mesh link {}",
                if available { "up" } else { "down" }
            ),
        }
    }
}

/// Parse one line of event input; blank lines and `#` comments yield `None`
fn parse_event_line(line: &str) -> Option<Result<WifiEvent, serde_json::Error>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    Some(serde_json::from_str(line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_parse_event_line() {
        assert!(parse_event_line("").is_none());
        assert!(parse_event_line("   # comment").is_none());

        let event = parse_event_line(r#" {"event":"lease_assigned","aid":3,"ipv4":"192.168.4.7"} "#)
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            WifiEvent::LeaseAssigned {
                aid: Some(3),
                ipv4: Ipv4Addr::new(192, 168, 4, 7),
            }
        );

        assert!(parse_event_line(r#"{"event":"roamed"}"#).unwrap().is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "turpial-gateway",
            "--role",
            "node",
            "--connect",
            "127.0.0.1:4001",
            "--ack-timeout",
            "1s",
        ]);

        let mut config = GatewayConfig::default();
        args.apply_to(&mut config);

        assert_eq!(config.role, Role::Node);
        assert_eq!(config.serial.tcp.as_deref(), Some("127.0.0.1:4001"));
        assert_eq!(config.session.ack_timeout_ms, 1000);
        assert_eq!(config.session.max_retries, 3);
    }

    #[test]
    fn test_device_conflicts_with_connect() {
        let result = Args::try_parse_from([
            "turpial-gateway",
            "--device",
            "/dev/ttyS1",
            "--connect",
            "127.0.0.1:4001",
        ]);
        assert!(result.is_err());
    }
}
