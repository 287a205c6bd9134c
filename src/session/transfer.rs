//! Streaming transfer engine - multi-chunk downloads and firmware upload
//!
//! A transfer is one long-running conversation: the initiating command's
//! sequence number is reused by every data chunk of that transfer, with the
//! transfer id marking the frames as file data. The engine holds the
//! session lock for the whole transfer, so ordinary commands queue up
//! behind it; dropping the returned future cancels the transfer and leaves
//! the transport connected for the next command.

use bytes::{Bytes, BytesMut};
use tokio::time::Instant;

use crate::protocol::command_id;
use crate::session::{ConnectionState, DeviceSession, SessionError, SessionResult};
use crate::transport::{Transport, TransportError};

/// Firmware binaries are streamed to the device in chunks of this size
pub const UPLOAD_CHUNK_SIZE: usize = 4096;

impl<T: Transport> DeviceSession<T> {
    /// Download a recording from the device.
    ///
    /// Issues the transfer-initiation command carrying `filename`, then
    /// accumulates framed chunks until exactly `expected_size` bytes have
    /// arrived. `on_progress(bytes_so_far, expected_size)` runs after each
    /// chunk. On any failure the partial data is discarded; callers that
    /// want incremental persistence can copy out of the progress callback.
    pub async fn download<F>(
        &self,
        filename: &str,
        expected_size: u64,
        mut on_progress: F,
    ) -> SessionResult<Vec<u8>>
    where
        F: FnMut(u64, u64) + Send,
    {
        let mut inner = self.inner.lock().await;
        if inner.state != ConnectionState::Connected {
            return Err(SessionError::NotConnected);
        }

        let sequence = inner.next_sequence();
        inner
            .transmit(
                command_id::TRANSFER_FILE,
                sequence,
                Bytes::copy_from_slice(filename.as_bytes()),
            )
            .await?;

        tracing::info!(filename, expected_size, "starting download");

        let mut data = BytesMut::with_capacity(expected_size as usize);
        while (data.len() as u64) < expected_size {
            match inner.match_buffered(command_id::TRANSFER_FILE, sequence)? {
                Some(chunk) => {
                    let total = data.len() as u64 + chunk.body.len() as u64;
                    if total > expected_size {
                        return Err(SessionError::TransferFailed {
                            received: total,
                            expected: expected_size,
                            reason: "device sent more data than announced".to_string(),
                        });
                    }
                    data.extend_from_slice(&chunk.body);
                    on_progress(total, expected_size);
                }
                None => match inner.transport.receive(self.config.chunk_timeout).await {
                    Ok(chunk) => inner.read_buf.extend_from_slice(&chunk),
                    Err(TransportError::Timeout(_)) => {
                        return Err(SessionError::CommandTimeout {
                            id: command_id::TRANSFER_FILE,
                            timeout: self.config.chunk_timeout,
                        });
                    }
                    Err(e) => return Err(e.into()),
                },
            }
        }

        tracing::info!(filename, bytes = data.len(), "download complete");
        Ok(data.to_vec())
    }

    /// Stream a firmware image to the device.
    ///
    /// The caller must already have had the upgrade request accepted (see
    /// [`DeviceSession::request_firmware_upgrade`]). Every chunk frame
    /// reuses one sequence number; the device acknowledges once after the
    /// final chunk.
    pub async fn upload_firmware<F>(
        &self,
        image: &[u8],
        mut on_progress: F,
    ) -> SessionResult<()>
    where
        F: FnMut(u64, u64) + Send,
    {
        let mut inner = self.inner.lock().await;
        if inner.state != ConnectionState::Connected {
            return Err(SessionError::NotConnected);
        }

        let total = image.len() as u64;
        let sequence = inner.next_sequence();
        tracing::info!(bytes = total, "starting firmware upload");

        let mut sent: u64 = 0;
        for chunk in image.chunks(UPLOAD_CHUNK_SIZE) {
            inner
                .transmit(
                    command_id::FIRMWARE_UPLOAD,
                    sequence,
                    Bytes::copy_from_slice(chunk),
                )
                .await?;
            sent += chunk.len() as u64;
            on_progress(sent, total);
        }

        // Final acknowledgement carries the shared sequence
        let deadline = Instant::now() + self.config.command_timeout;
        let ack = loop {
            if let Some(message) =
                inner.match_buffered(command_id::FIRMWARE_UPLOAD, sequence)?
            {
                break message;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(SessionError::CommandTimeout {
                    id: command_id::FIRMWARE_UPLOAD,
                    timeout: self.config.command_timeout,
                });
            }
            match inner.transport.receive(remaining).await {
                Ok(chunk) => inner.read_buf.extend_from_slice(&chunk),
                Err(TransportError::Timeout(_)) => {
                    return Err(SessionError::CommandTimeout {
                        id: command_id::FIRMWARE_UPLOAD,
                        timeout: self.config.command_timeout,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        };

        match ack.status() {
            0 => {
                tracing::info!("firmware upload acknowledged");
                Ok(())
            }
            status => Err(SessionError::TransferFailed {
                received: sent,
                expected: total,
                reason: format!("device reported status {} after upload", status),
            }),
        }
    }
}
