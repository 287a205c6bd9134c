//! Device clock sync
//!
//! The recorder keeps wall-clock time as 7 BCD bytes: `YY YY MM DD hh mm
//! ss` (year split across two bytes, e.g. 2025 -> 0x20 0x25). An all-zero
//! payload means the clock was never set.

use bytes::Bytes;

use crate::protocol::command_id;
use crate::session::{DeviceSession, SessionError, SessionResult};
use crate::transport::Transport;

const TIME_BODY_LEN: usize = 7;

/// A wall-clock instant as the device represents it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

fn to_bcd(value: u8) -> u8 {
    (value / 10) << 4 | (value % 10)
}

fn from_bcd(byte: u8) -> Option<u8> {
    let high = byte >> 4;
    let low = byte & 0x0f;
    if high > 9 || low > 9 {
        return None;
    }
    Some(high * 10 + low)
}

impl DeviceTime {
    /// Sanity bounds; the device accepts years 2000-2099
    pub fn is_plausible(&self) -> bool {
        (2000..=2099).contains(&self.year)
            && (1..=12).contains(&self.month)
            && (1..=31).contains(&self.day)
            && self.hour < 24
            && self.minute < 60
            && self.second < 60
    }

    pub fn to_bcd_bytes(&self) -> [u8; TIME_BODY_LEN] {
        [
            to_bcd((self.year / 100) as u8),
            to_bcd((self.year % 100) as u8),
            to_bcd(self.month),
            to_bcd(self.day),
            to_bcd(self.hour),
            to_bcd(self.minute),
            to_bcd(self.second),
        ]
    }

    /// Returns `None` for invalid BCD or the all-zero "clock unset" payload
    pub fn from_bcd_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < TIME_BODY_LEN {
            return None;
        }
        if bytes[..TIME_BODY_LEN].iter().all(|&b| b == 0) {
            return None;
        }
        let century = from_bcd(bytes[0])?;
        let t = Self {
            year: century as u16 * 100 + from_bcd(bytes[1])? as u16,
            month: from_bcd(bytes[2])?,
            day: from_bcd(bytes[3])?,
            hour: from_bcd(bytes[4])?,
            minute: from_bcd(bytes[5])?,
            second: from_bcd(bytes[6])?,
        };
        t.is_plausible().then_some(t)
    }

    /// Civil time (UTC) from Unix seconds, for syncing the device clock
    /// to the host. Days-to-date conversion per Howard Hinnant's civil
    /// calendar algorithm.
    pub fn from_unix(secs: u64) -> Self {
        let days = secs / 86_400;
        let rem = secs % 86_400;

        let z = days as i64 + 719_468;
        let era = z.div_euclid(146_097);
        let doe = z.rem_euclid(146_097);
        let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
        let y = yoe + era * 400;
        let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
        let mp = (5 * doy + 2) / 153;
        let day = (doy - (153 * mp + 2) / 5 + 1) as u8;
        let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u8;
        let year = (if month <= 2 { y + 1 } else { y }) as u16;

        Self {
            year,
            month,
            day,
            hour: (rem / 3600) as u8,
            minute: (rem % 3600 / 60) as u8,
            second: (rem % 60) as u8,
        }
    }
}

impl std::fmt::Display for DeviceTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

impl<T: Transport> DeviceSession<T> {
    /// Read the device clock. `None` means the clock was never set.
    pub async fn device_time(&self) -> SessionResult<Option<DeviceTime>> {
        let response = self
            .send_command(command_id::GET_DEVICE_TIME, Bytes::new())
            .await?;
        if response.body.len() < TIME_BODY_LEN {
            return Err(SessionError::BadResponse {
                id: command_id::GET_DEVICE_TIME,
            });
        }
        Ok(DeviceTime::from_bcd_bytes(&response.body))
    }

    /// Set the device clock
    pub async fn set_device_time(&self, time: &DeviceTime) -> SessionResult<()> {
        self.send_expect_ok(
            command_id::SET_DEVICE_TIME,
            Bytes::copy_from_slice(&time.to_bcd_bytes()),
        )
        .await?;
        tracing::info!(%time, "device clock set");
        Ok(())
    }
}
