//! Behavior settings stored on the device
//!
//! The settings body is four u32 big-endian boolean cells at fixed
//! offsets: auto-record, auto-play, Bluetooth tone, notification sound.
//! Nonzero means enabled. The same layout is written back on set.

use bytes::Bytes;

use crate::protocol::command_id;
use crate::session::{DeviceSession, SessionError, SessionResult};
use crate::transport::Transport;

const SETTINGS_BODY_LEN: usize = 16;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Settings {
    pub auto_record: bool,
    pub auto_play: bool,
    pub bluetooth_tone: bool,
    pub notification_sound: bool,
}

impl Settings {
    fn parse(body: &[u8]) -> Option<Self> {
        if body.len() < SETTINGS_BODY_LEN {
            return None;
        }
        let cell = |offset: usize| {
            u32::from_be_bytes([
                body[offset],
                body[offset + 1],
                body[offset + 2],
                body[offset + 3],
            ]) != 0
        };
        Some(Self {
            auto_record: cell(0),
            auto_play: cell(4),
            bluetooth_tone: cell(8),
            notification_sound: cell(12),
        })
    }

    fn to_body(self) -> [u8; SETTINGS_BODY_LEN] {
        let mut body = [0u8; SETTINGS_BODY_LEN];
        let mut write = |offset: usize, on: bool| {
            body[offset..offset + 4].copy_from_slice(&(on as u32).to_be_bytes());
        };
        write(0, self.auto_record);
        write(4, self.auto_play);
        write(8, self.bluetooth_tone);
        write(12, self.notification_sound);
        body
    }
}

impl<T: Transport> DeviceSession<T> {
    pub async fn settings(&self) -> SessionResult<Settings> {
        let response = self
            .send_command(command_id::GET_SETTINGS, Bytes::new())
            .await?;
        Settings::parse(&response.body).ok_or(SessionError::BadResponse {
            id: command_id::GET_SETTINGS,
        })
    }

    pub async fn set_settings(&self, settings: Settings) -> SessionResult<()> {
        self.send_expect_ok(
            command_id::SET_SETTINGS,
            Bytes::copy_from_slice(&settings.to_body()),
        )
        .await?;
        tracing::info!(?settings, "settings written");
        Ok(())
    }
}
