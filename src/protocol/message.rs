//! Command and message types carried by the frame protocol
//!
//! A `Command` is what the host sends; a `Message` is what the decoder
//! produces from device bytes. Both carry the same (id, sequence, body)
//! triple - the distinction exists so the correlator can own sequence
//! assignment on the outgoing side.

use bytes::Bytes;

/// An outgoing request. The sequence number is assigned by the session
/// just before encoding; a command is never reused across sends.
#[derive(Debug, Clone)]
pub struct Command {
    /// Command id (see [`crate::protocol::command_id`])
    pub id: u16,
    /// Per-session sequence number, assigned at send time
    pub sequence: u32,
    /// Raw command body
    pub body: Bytes,
}

impl Command {
    /// Create a command with an unassigned (zero) sequence number
    pub fn new(id: u16, body: impl Into<Bytes>) -> Self {
        Self {
            id,
            sequence: 0,
            body: body.into(),
        }
    }
}

/// A decoded response or asynchronous notification from the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: u16,
    pub sequence: u32,
    pub body: Bytes,
}

impl Message {
    /// Whether this message answers the given (id, sequence) pair
    pub fn answers(&self, id: u16, sequence: u32) -> bool {
        self.id == id && self.sequence == sequence
    }

    /// Status byte convention: many responses lead with a single status
    /// byte where zero means success. Empty bodies count as success.
    pub fn status(&self) -> u8 {
        self.body.first().copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answers_requires_both_fields() {
        let msg = Message {
            id: 4,
            sequence: 7,
            body: Bytes::new(),
        };
        assert!(msg.answers(4, 7));
        assert!(!msg.answers(4, 8));
        assert!(!msg.answers(5, 7));
    }

    #[test]
    fn test_status_of_empty_body_is_ok() {
        let msg = Message {
            id: 7,
            sequence: 1,
            body: Bytes::new(),
        };
        assert_eq!(msg.status(), 0);

        let msg = Message {
            id: 7,
            sequence: 1,
            body: Bytes::from_static(&[3]),
        };
        assert_eq!(msg.status(), 3);
    }
}
