//! Storage card status and formatting
//!
//! Card info comes back as three u32 big-endian words: used MiB, capacity
//! MiB, status flags. Formatting requires the fixed confirmation body
//! `01 02 03 04` so a stray empty-body command cannot wipe the card.

use bytes::Bytes;

use crate::protocol::command_id;
use crate::session::{DeviceSession, SessionError, SessionResult};
use crate::transport::Transport;

const FORMAT_CONFIRMATION: [u8; 4] = [0x01, 0x02, 0x03, 0x04];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageInfo {
    pub used_mib: u32,
    pub capacity_mib: u32,
    pub status: u32,
}

impl StorageInfo {
    pub fn free_mib(&self) -> u32 {
        self.capacity_mib.saturating_sub(self.used_mib)
    }
}

impl<T: Transport> DeviceSession<T> {
    pub async fn storage_info(&self) -> SessionResult<StorageInfo> {
        let response = self
            .send_command(command_id::GET_CARD_INFO, Bytes::new())
            .await?;
        let b = &response.body;
        if b.len() < 12 {
            return Err(SessionError::BadResponse {
                id: command_id::GET_CARD_INFO,
            });
        }
        Ok(StorageInfo {
            used_mib: u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
            capacity_mib: u32::from_be_bytes([b[4], b[5], b[6], b[7]]),
            status: u32::from_be_bytes([b[8], b[9], b[10], b[11]]),
        })
    }

    /// Erase the storage card. Destroys all recordings.
    pub async fn format_storage(&self) -> SessionResult<()> {
        self.send_expect_ok(
            command_id::FORMAT_CARD,
            Bytes::from_static(&FORMAT_CONFIRMATION),
        )
        .await?;
        tracing::warn!("storage card formatted");
        Ok(())
    }
}
