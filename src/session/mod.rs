//! Session module - Command/response correlation for one recorder
//!
//! A [`DeviceSession`] owns the transport, the monotonically increasing
//! sequence counter, and the streaming receive buffer. Exactly one
//! command/response exchange runs at a time: the device is half-duplex and
//! correlates by sequence number, so sequence assignment + send + the wait
//! loop form one critical section guarded by the session mutex.

mod transfer;

use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::protocol::{
    self, codec, command_id, command_name, Command, DeviceModel, Message,
};
use crate::transport::{Transport, TransportError};

/// Session errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("codec error: {0}")]
    Codec(#[from] protocol::CodecError),

    #[error("not connected")]
    NotConnected,

    #[error("already connected")]
    AlreadyConnected,

    #[error("command {id:#06x} timed out after {timeout:?}")]
    CommandTimeout { id: u16, timeout: Duration },

    #[error("device rejected command {id:#06x} with status {status}")]
    CommandRejected { id: u16, status: u8 },

    #[error("malformed response body for command {id:#06x}")]
    BadResponse { id: u16 },

    #[error("transfer failed after {received} of {expected} bytes: {reason}")]
    TransferFailed {
        received: u64,
        expected: u64,
        reason: String,
    },
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Connection lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Identity reported by the device during the connect handshake
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Raw 32-bit version code
    pub version_code: u32,
    /// `major.minor.patch` rendering of the low three version bytes
    pub firmware_version: String,
    /// ASCII serial number, NUL padding stripped
    pub serial_number: String,
}

impl DeviceInfo {
    /// Device-info body: 4-byte version code + 16-byte padded serial
    fn parse(message: &Message) -> SessionResult<Self> {
        let body = &message.body;
        if body.len() < 20 {
            return Err(SessionError::BadResponse {
                id: command_id::GET_DEVICE_INFO,
            });
        }

        let version_code = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
        let firmware_version = format!("{}.{}.{}", body[1], body[2], body[3]);
        let serial_number = String::from_utf8_lossy(&body[4..20])
            .trim_end_matches(['\0', ' '])
            .to_string();

        Ok(Self {
            version_code,
            firmware_version,
            serial_number,
        })
    }
}

/// Timeouts governing one session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Deadline for a single command/response exchange
    pub command_timeout: Duration,
    /// Per-chunk deadline during streaming transfers
    pub chunk_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(5),
            chunk_timeout: Duration::from_secs(10),
        }
    }
}

pub(crate) struct Inner<T> {
    pub(crate) transport: T,
    pub(crate) state: ConnectionState,
    pub(crate) sequence: u32,
    /// Carry-over bytes from reads that ended mid-frame
    pub(crate) read_buf: BytesMut,
    pub(crate) info: Option<DeviceInfo>,
}

/// A session with one attached recorder
pub struct DeviceSession<T: Transport> {
    pub(crate) inner: Mutex<Inner<T>>,
    pub(crate) config: SessionConfig,
}

impl<T: Transport> DeviceSession<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, SessionConfig::default())
    }

    pub fn with_config(transport: T, config: SessionConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                transport,
                state: ConnectionState::Disconnected,
                sequence: 0,
                read_buf: BytesMut::with_capacity(4096),
                info: None,
            }),
            config,
        }
    }

    /// Open the transport and run the device-info handshake.
    ///
    /// The handshake consumes the session's first sequence number. If the
    /// transport open step fails, the session state is untouched; if the
    /// handshake itself fails, the transport is released again.
    pub async fn connect(&self) -> SessionResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.state != ConnectionState::Disconnected {
            return Err(SessionError::AlreadyConnected);
        }

        inner.transport.connect().await?;
        inner.state = ConnectionState::Connecting;

        let response = match inner
            .exchange(
                command_id::GET_DEVICE_INFO,
                Bytes::new(),
                self.config.command_timeout,
            )
            .await
        {
            Ok(response) => response,
            Err(e) => {
                inner.reset().await;
                return Err(e);
            }
        };

        let info = match DeviceInfo::parse(&response) {
            Ok(info) => info,
            Err(e) => {
                inner.reset().await;
                return Err(e);
            }
        };

        tracing::info!(
            model = %inner.transport.model(),
            firmware = %info.firmware_version,
            serial = %info.serial_number,
            "recorder connected"
        );

        inner.info = Some(info);
        inner.state = ConnectionState::Connected;
        Ok(())
    }

    /// Tear down the transport and reset the session. Idempotent.
    pub async fn disconnect(&self) -> SessionResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.state == ConnectionState::Disconnected {
            return Ok(());
        }
        inner.reset().await;
        tracing::info!("recorder disconnected");
        Ok(())
    }

    /// Send one command and wait for its matching response.
    ///
    /// Uses the session's default command timeout.
    pub async fn send_command(&self, id: u16, body: impl Into<Bytes>) -> SessionResult<Message> {
        self.send_command_timeout(id, body, self.config.command_timeout)
            .await
    }

    /// Send one command and wait up to `timeout` for its response
    pub async fn send_command_timeout(
        &self,
        id: u16,
        body: impl Into<Bytes>,
        timeout: Duration,
    ) -> SessionResult<Message> {
        let mut inner = self.inner.lock().await;
        if inner.state != ConnectionState::Connected {
            return Err(SessionError::NotConnected);
        }
        inner.exchange(id, body.into(), timeout).await
    }

    /// Send a command and require a zero status byte in the response
    pub async fn send_expect_ok(&self, id: u16, body: impl Into<Bytes>) -> SessionResult<Message> {
        let response = self.send_command(id, body).await?;
        match response.status() {
            0 => Ok(response),
            status => Err(SessionError::CommandRejected { id, status }),
        }
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.state
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.lock().await.state == ConnectionState::Connected
    }

    pub async fn model(&self) -> DeviceModel {
        self.inner.lock().await.transport.model()
    }

    /// Identity from the connect handshake, if connected
    pub async fn device_info(&self) -> Option<DeviceInfo> {
        self.inner.lock().await.info.clone()
    }
}

impl<T: Transport> Inner<T> {
    async fn reset(&mut self) {
        let _ = self.transport.disconnect().await;
        self.state = ConnectionState::Disconnected;
        self.sequence = 0;
        self.read_buf.clear();
        self.info = None;
    }

    /// One full command/response exchange: assign the next sequence,
    /// transmit, then decode incoming chunks until the matching (id,
    /// sequence) pair shows up or the deadline passes. Mismatched frames
    /// are stale or unsolicited and are logged and dropped.
    pub(crate) async fn exchange(
        &mut self,
        id: u16,
        body: Bytes,
        timeout: Duration,
    ) -> SessionResult<Message> {
        let sequence = self.next_sequence();
        self.transmit(id, sequence, body).await?;

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(message) = self.match_buffered(id, sequence)? {
                return Ok(message);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(SessionError::CommandTimeout { id, timeout });
            }

            match self.transport.receive(remaining).await {
                Ok(chunk) => self.read_buf.extend_from_slice(&chunk),
                Err(TransportError::Timeout(_)) => {
                    return Err(SessionError::CommandTimeout { id, timeout });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub(crate) fn next_sequence(&mut self) -> u32 {
        let sequence = self.sequence;
        self.sequence += 1;
        sequence
    }

    pub(crate) async fn transmit(
        &mut self,
        id: u16,
        sequence: u32,
        body: Bytes,
    ) -> SessionResult<()> {
        let command = Command { id, sequence, body };
        let frame = codec::encode(&command)?;
        tracing::debug!(
            command = command_name(id),
            sequence,
            "=> {} {}",
            hex::encode(&frame[..codec::HEADER_SIZE]),
            hex::encode(&frame[codec::HEADER_SIZE..])
        );
        self.transport.send(&frame).await?;
        Ok(())
    }

    /// Decode complete frames out of the carry-over buffer, returning the
    /// first one that answers (id, sequence) and dropping the rest
    pub(crate) fn match_buffered(
        &mut self,
        id: u16,
        sequence: u32,
    ) -> SessionResult<Option<Message>> {
        loop {
            match codec::decode(&self.read_buf)? {
                codec::Decoded::Frame { message, consumed } => {
                    self.read_buf.advance(consumed);
                    if message.answers(id, sequence) {
                        tracing::debug!(
                            command = command_name(message.id),
                            sequence = message.sequence,
                            body_len = message.body.len(),
                            "<= matched response"
                        );
                        return Ok(Some(message));
                    }
                    tracing::debug!(
                        command = command_name(message.id),
                        sequence = message.sequence,
                        expected = sequence,
                        "dropping unmatched frame"
                    );
                }
                codec::Decoded::Incomplete => return Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::HEADER_SIZE;
    use crate::transport::mock::{encoded_frame, MockQueues, MockTransport};

    fn device_info_body() -> Vec<u8> {
        let mut body = vec![0x00, 0x05, 0x02, 0x01]; // version 5.2.1
        body.extend_from_slice(b"VX1-0042\0\0\0\0\0\0\0\0");
        body
    }

    fn connected_session() -> (DeviceSession<MockTransport>, MockQueues) {
        let transport = MockTransport::new();
        let queues = transport.queues();
        // Handshake response for sequence 0
        queues.push_response(command_id::GET_DEVICE_INFO, 0, &device_info_body());
        (DeviceSession::new(transport), queues)
    }

    #[tokio::test]
    async fn test_connect_populates_identity() {
        let (session, _queues) = connected_session();
        session.connect().await.unwrap();

        assert!(session.is_connected().await);
        let info = session.device_info().await.unwrap();
        assert_eq!(info.firmware_version, "5.2.1");
        assert_eq!(info.version_code, 0x00050201);
        assert_eq!(info.serial_number, "VX1-0042");
    }

    #[tokio::test]
    async fn test_connect_failure_leaves_state_untouched() {
        let session = DeviceSession::new(MockTransport::new().fail_connect());
        assert!(matches!(
            session.connect().await,
            Err(SessionError::Transport(TransportError::ConnectionFailed(_)))
        ));
        assert_eq!(session.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let session = DeviceSession::new(MockTransport::new());
        assert!(matches!(
            session.send_command(command_id::GET_FILE_COUNT, Bytes::new()).await,
            Err(SessionError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_sequence_increments_per_command() {
        let (session, queues) = connected_session();
        session.connect().await.unwrap();

        // Handshake used sequence 0; the next two commands use 1 and 2
        queues.push_response(command_id::GET_FILE_COUNT, 1, &3u32.to_be_bytes());
        queues.push_response(command_id::GET_DEVICE_TIME, 2, &[0; 7]);

        session
            .send_command(command_id::GET_FILE_COUNT, Bytes::new())
            .await
            .unwrap();
        session
            .send_command(command_id::GET_DEVICE_TIME, Bytes::new())
            .await
            .unwrap();

        let sent = queues.sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(&sent[1][4..8], &1u32.to_be_bytes());
        assert_eq!(&sent[2][4..8], &2u32.to_be_bytes());
    }

    #[tokio::test]
    async fn test_mismatched_frames_are_dropped() {
        let (session, queues) = connected_session();
        session.connect().await.unwrap();

        // A stale response with an old sequence arrives first, then an
        // unsolicited notification, then the real answer - all in one chunk
        let mut chunk = encoded_frame(command_id::GET_FILE_COUNT, 0, &[9, 9, 9, 9]);
        chunk.extend_from_slice(&encoded_frame(0x7777, 1, b"notify"));
        chunk.extend_from_slice(&encoded_frame(
            command_id::GET_FILE_COUNT,
            1,
            &7u32.to_be_bytes(),
        ));
        queues.push_incoming(chunk);

        let response = session
            .send_command(command_id::GET_FILE_COUNT, Bytes::new())
            .await
            .unwrap();
        assert_eq!(response.sequence, 1);
        assert_eq!(response.body.as_ref(), &7u32.to_be_bytes());
    }

    #[tokio::test]
    async fn test_frame_split_across_reads() {
        let (session, queues) = connected_session();
        session.connect().await.unwrap();

        let frame = encoded_frame(command_id::GET_SETTINGS, 1, &[0; 16]);
        queues.push_incoming(frame[..HEADER_SIZE + 4].to_vec());
        queues.push_incoming(frame[HEADER_SIZE + 4..].to_vec());

        let response = session
            .send_command(command_id::GET_SETTINGS, Bytes::new())
            .await
            .unwrap();
        assert_eq!(response.body.len(), 16);
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_timeout_elapses_fully() {
        let (session, _queues) = connected_session();
        session.connect().await.unwrap();

        let timeout = Duration::from_secs(3);
        let start = Instant::now();
        let result = session
            .send_command_timeout(command_id::GET_FILE_COUNT, Bytes::new(), timeout)
            .await;

        assert!(matches!(
            result,
            Err(SessionError::CommandTimeout { id, .. }) if id == command_id::GET_FILE_COUNT
        ));
        assert!(start.elapsed() >= timeout);
        // Session stays usable
        assert!(session.is_connected().await);
    }

    #[tokio::test]
    async fn test_malformed_frame_surfaces() {
        let (session, queues) = connected_session();
        session.connect().await.unwrap();

        queues.push_incoming(vec![0xde, 0xad, 0xbe, 0xef]);
        assert!(matches!(
            session.send_command(command_id::GET_FILE_COUNT, Bytes::new()).await,
            Err(SessionError::Codec(_))
        ));
    }

    #[tokio::test]
    async fn test_disconnect_resets_sequence() {
        let (session, queues) = connected_session();
        session.connect().await.unwrap();
        session.disconnect().await.unwrap();
        assert!(!session.is_connected().await);
        assert!(session.device_info().await.is_none());

        // Reconnect starts at sequence 0 again
        queues.push_response(command_id::GET_DEVICE_INFO, 0, &device_info_body());
        session.connect().await.unwrap();
        assert!(session.is_connected().await);

        // Disconnecting twice is fine
        session.disconnect().await.unwrap();
        session.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_status_byte() {
        let (session, queues) = connected_session();
        session.connect().await.unwrap();

        queues.push_response(command_id::DELETE_FILE, 1, &[4]);
        assert!(matches!(
            session.send_expect_ok(command_id::DELETE_FILE, &b"a.rec"[..]).await,
            Err(SessionError::CommandRejected { status: 4, .. })
        ));
    }
}
