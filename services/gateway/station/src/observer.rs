//! Station change notifications for collaborators outside the gateway.

use crate::gateway::StationRecord;
use tokio::sync::mpsc;
use tracing::debug;

/// Receives station and mesh link changes from the gateway
pub trait StationObserver: Send + Sync {
    /// A station was announced to the mesh
    fn station_connected(&self, record: &StationRecord);

    /// A station was withdrawn from the mesh
    fn station_disconnected(&self, record: &StationRecord);

    /// The mesh link became available or unavailable
    fn link_state_changed(&self, available: bool);
}

/// Notification forwarded by [`ChannelObserver`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StationNotification {
    /// See [`StationObserver::station_connected`]
    Connected(StationRecord),
    /// See [`StationObserver::station_disconnected`]
    Disconnected(StationRecord),
    /// See [`StationObserver::link_state_changed`]
    LinkState(bool),
}

/// Observer forwarding notifications to a channel
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<StationNotification>,
}

impl ChannelObserver {
    /// Create an observer and the receiving end of its channel
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StationNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn notify(&self, notification: StationNotification) {
        if self.tx.send(notification).is_err() {
            debug!("Station notification dropped, receiver gone");
        }
    }
}

impl StationObserver for ChannelObserver {
    fn station_connected(&self, record: &StationRecord) {
        self.notify(StationNotification::Connected(record.clone()));
    }

    fn station_disconnected(&self, record: &StationRecord) {
        self.notify(StationNotification::Disconnected(record.clone()));
    }

    fn link_state_changed(&self, available: bool) {
        self.notify(StationNotification::LinkState(available));
    }
}
