//! Seeded mock transport for tests
//!
//! A FIFO queue of pre-seeded receive chunks plus a record of every frame
//! sent, so tests can drive a full session without hardware. The queues
//! are shared handles: tests keep a [`MockQueues`] clone to seed responses
//! and inspect sent frames after the session has taken ownership of the
//! transport. Receiving from an empty queue waits out the full timeout and
//! then fails, which matches real bulk-read behavior under tokio's paused
//! test clock.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::{Transport, TransportError, TransportResult};
use crate::protocol::{encode, Command, DeviceModel};

/// Build a well-formed encoded response frame for seeding
pub fn encoded_frame(id: u16, sequence: u32, body: &[u8]) -> Vec<u8> {
    let command = Command {
        id,
        sequence,
        body: Bytes::copy_from_slice(body),
    };
    // Seeded bodies are tiny, far below the 24-bit limit
    encode(&command).expect("seeded frame body within limit").to_vec()
}

/// Shared seed/record queues for a [`MockTransport`]
#[derive(Clone, Default)]
pub struct MockQueues {
    incoming: Arc<Mutex<VecDeque<Vec<u8>>>>,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MockQueues {
    /// Queue one raw receive chunk. Chunks are handed out one per
    /// `receive` call, so seeding a frame split across two chunks
    /// exercises partial-frame reassembly.
    pub fn push_incoming(&self, chunk: Vec<u8>) {
        self.incoming.lock().unwrap().push_back(chunk);
    }

    /// Queue a complete encoded response frame
    pub fn push_response(&self, id: u16, sequence: u32, body: &[u8]) {
        self.push_incoming(encoded_frame(id, sequence, body));
    }

    /// Every raw frame written so far, in order
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }
}

pub struct MockTransport {
    connected: bool,
    model: DeviceModel,
    fail_connect: bool,
    queues: MockQueues,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            connected: false,
            model: DeviceModel::V1,
            fail_connect: false,
            queues: MockQueues::default(),
        }
    }

    /// Make the next `connect()` fail
    pub fn fail_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    /// Handle for seeding and inspection, valid after the transport has
    /// been moved into a session
    pub fn queues(&self) -> MockQueues {
        self.queues.clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self) -> TransportResult<()> {
        if self.fail_connect {
            return Err(TransportError::ConnectionFailed(
                "no recorder attached".to_string(),
            ));
        }
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> TransportResult<()> {
        self.connected = false;
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> TransportResult<()> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        self.queues.sent.lock().unwrap().push(data.to_vec());
        Ok(())
    }

    async fn receive(&mut self, timeout: Duration) -> TransportResult<Vec<u8>> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        let next = self.queues.incoming.lock().unwrap().pop_front();
        match next {
            Some(chunk) => Ok(chunk),
            None => {
                tokio::time::sleep(timeout).await;
                Err(TransportError::Timeout(timeout))
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn model(&self) -> DeviceModel {
        self.model
    }
}
