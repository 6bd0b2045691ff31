//! In-flight request tracking for the acknowledgement contract.

use std::collections::HashMap;
use tokio::time::Instant;
use vaina_wire::VainaMessage;

/// A request awaiting `ACK` or `NACK`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    /// The request as sent
    pub message: VainaMessage,
    /// Transmissions so far, the first one included
    pub attempts: u32,
    /// When the current attempt times out
    pub deadline: Instant,
}

impl PendingRequest {
    /// Track a request after its first transmission
    pub fn new(message: VainaMessage, deadline: Instant) -> Self {
        Self {
            message,
            attempts: 1,
            deadline,
        }
    }
}

/// Requests in flight, keyed by sequence number
#[derive(Debug, Default)]
pub struct PendingRequests {
    inflight: HashMap<u8, PendingRequest>,
}

impl PendingRequests {
    /// Track a request, returning any request it displaced
    pub fn insert(&mut self, request: PendingRequest) -> Option<PendingRequest> {
        self.inflight.insert(request.message.seqno, request)
    }

    /// Stop tracking the request answered by `seqno`
    pub fn complete(&mut self, seqno: u8) -> Option<PendingRequest> {
        self.inflight.remove(&seqno)
    }

    /// Earliest deadline among requests in flight
    pub fn next_deadline(&self) -> Option<Instant> {
        self.inflight.values().map(|request| request.deadline).min()
    }

    /// Remove and return every request whose deadline has passed, oldest first
    pub fn take_expired(&mut self, now: Instant) -> Vec<PendingRequest> {
        let expired: Vec<u8> = self
            .inflight
            .iter()
            .filter(|(_, request)| request.deadline <= now)
            .map(|(&seqno, _)| seqno)
            .collect();

        let mut requests: Vec<PendingRequest> = expired
            .into_iter()
            .filter_map(|seqno| self.inflight.remove(&seqno))
            .collect();
        requests.sort_by_key(|request| request.deadline);
        requests
    }

    /// Number of requests in flight
    pub fn len(&self) -> usize {
        self.inflight.len()
    }

    /// Whether nothing is in flight
    pub fn is_empty(&self) -> bool {
        self.inflight.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_complete_by_seqno() {
        let now = Instant::now();
        let mut pending = PendingRequests::default();
        pending.insert(PendingRequest::new(VainaMessage::rcs_add(1, "2000::1".parse().unwrap()), now));

        assert!(pending.complete(2).is_none());
        let request = pending.complete(1).unwrap();
        assert_eq!(request.attempts, 1);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_take_expired_in_deadline_order() {
        let now = Instant::now();
        let mut pending = PendingRequests::default();
        let addr = "2000::1".parse().unwrap();

        pending.insert(PendingRequest::new(VainaMessage::rcs_add(1, addr), now + Duration::from_millis(30)));
        pending.insert(PendingRequest::new(VainaMessage::rcs_del(2, addr), now + Duration::from_millis(10)));
        pending.insert(PendingRequest::new(VainaMessage::rcs_add(3, addr), now + Duration::from_secs(5)));

        assert_eq!(pending.next_deadline(), Some(now + Duration::from_millis(10)));

        let expired = pending.take_expired(now + Duration::from_millis(50));
        let seqnos: Vec<u8> = expired.iter().map(|request| request.message.seqno).collect();
        assert_eq!(seqnos, vec![2, 1]);
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_insert_reports_displaced_request() {
        let now = Instant::now();
        let mut pending = PendingRequests::default();
        let addr = "2000::1".parse().unwrap();

        assert!(pending.insert(PendingRequest::new(VainaMessage::rcs_add(9, addr), now)).is_none());
        let displaced = pending.insert(PendingRequest::new(VainaMessage::rcs_del(9, addr), now));
        assert_eq!(displaced.unwrap().message, VainaMessage::rcs_add(9, addr));
    }
}
