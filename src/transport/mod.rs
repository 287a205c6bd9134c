//! Transport module - Abstract byte-stream link to a recorder
//!
//! The session and codec never see raw device handles; they speak to a
//! [`Transport`], which a real USB bulk-endpoint implementation and a
//! seeded mock both satisfy. Might equally be backed by a CDC/serial link.

pub mod mock;
mod usb;

pub use mock::MockTransport;
pub use usb::{DiscoveredDevice, UsbTransport};

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::protocol::DeviceModel;

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("not connected")]
    NotConnected,

    #[error("receive timed out after {0:?}")]
    Timeout(Duration),

    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type TransportResult<T> = Result<T, TransportError>;

/// A bidirectional byte-stream link to one recorder.
///
/// Half-duplex in practice: the caller sends a frame, then polls `receive`
/// until the response shows up. No framing happens at this layer - raw
/// chunks in, raw chunks out, frame boundaries may span reads.
#[async_trait]
pub trait Transport: Send {
    /// Open and claim the underlying device.
    /// Fails with [`TransportError::ConnectionFailed`] if no matching
    /// device is present or claiming it fails.
    async fn connect(&mut self) -> TransportResult<()>;

    /// Release the device. Idempotent.
    async fn disconnect(&mut self) -> TransportResult<()>;

    /// Write raw bytes. Fails with `NotConnected` when not connected.
    async fn send(&mut self, data: &[u8]) -> TransportResult<()>;

    /// Read whatever bytes arrive within `timeout`.
    /// Fails with `Timeout` when nothing arrives in time.
    async fn receive(&mut self, timeout: Duration) -> TransportResult<Vec<u8>>;

    /// Whether the link is currently open
    fn is_connected(&self) -> bool;

    /// Hardware variant on the other end
    fn model(&self) -> DeviceModel;
}
