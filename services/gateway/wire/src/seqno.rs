//! Sequence numbers for outgoing VAINA requests.

/// First sequence number handed out by a fresh generator
pub const INITIAL_SEQNO: u8 = 1;

/// Wrapping 8-bit sequence number generator.
///
/// Uniqueness only holds within a window of 256 outstanding requests; the
/// request session never keeps that many in flight.
#[derive(Debug, Clone)]
pub struct SequenceGenerator {
    next: u8,
}

impl SequenceGenerator {
    /// Create a generator starting at [`INITIAL_SEQNO`]
    pub fn new() -> Self {
        Self {
            next: INITIAL_SEQNO,
        }
    }

    /// Return the current sequence number and advance
    pub fn generate(&mut self) -> u8 {
        let seqno = self.next;
        self.next = self.next.wrapping_add(1);
        seqno
    }

    /// Sequence number the next call to [`generate`](Self::generate) returns
    pub fn peek(&self) -> u8 {
        self.next
    }
}

impl Default for SequenceGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_one() {
        let mut seq = SequenceGenerator::new();
        assert_eq!(seq.generate(), 1);
        assert_eq!(seq.generate(), 2);
        assert_eq!(seq.peek(), 3);
    }

    #[test]
    fn test_wraps_after_255() {
        let mut seq = SequenceGenerator::new();
        let issued: Vec<u8> = (0..256).map(|_| seq.generate()).collect();

        assert_eq!(issued[254], 255);
        assert_eq!(issued[255], 0);
        assert_eq!(seq.generate(), INITIAL_SEQNO);
    }
}
