//! Bluetooth companion-device pairing (audio sink models only)
//!
//! Scan results come back as `[u8 count]` followed by `count` entries of
//! `[u8 name length][name bytes][6 byte MAC]`. Pair/unpair go through the
//! bluetooth-command id with an opcode byte followed by the MAC.

use bytes::{BufMut, Bytes, BytesMut};
use std::time::Duration;

use crate::protocol::command_id;
use crate::session::{DeviceSession, SessionError, SessionResult};
use crate::transport::Transport;

const OP_PAIR: u8 = 0x01;
const OP_UNPAIR: u8 = 0x02;

/// Scanning happens on the device and takes several seconds
const SCAN_TIMEOUT: Duration = Duration::from_secs(30);

/// A remote device seen during a Bluetooth scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BluetoothDevice {
    pub name: String,
    pub address: [u8; 6],
}

impl BluetoothDevice {
    pub fn address_string(&self) -> String {
        self.address
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(":")
    }
}

impl std::fmt::Display for BluetoothDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.address_string())
    }
}

/// Current pairing state of the recorder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BluetoothStatus {
    Disconnected,
    Connected { address: [u8; 6] },
}

fn parse_scan_results(body: &[u8]) -> Option<Vec<BluetoothDevice>> {
    let count = *body.first()? as usize;
    let mut offset = 1;
    let mut devices = Vec::with_capacity(count);

    for _ in 0..count {
        let name_len = *body.get(offset)? as usize;
        offset += 1;
        if body.len() < offset + name_len + 6 {
            return None;
        }
        let name = String::from_utf8_lossy(&body[offset..offset + name_len]).to_string();
        offset += name_len;
        let mut address = [0u8; 6];
        address.copy_from_slice(&body[offset..offset + 6]);
        offset += 6;
        devices.push(BluetoothDevice { name, address });
    }

    Some(devices)
}

impl<T: Transport> DeviceSession<T> {
    /// Ask the recorder to scan for nearby audio devices
    pub async fn bluetooth_scan(&self) -> SessionResult<Vec<BluetoothDevice>> {
        let response = self
            .send_command_timeout(command_id::BLUETOOTH_SCAN, Bytes::new(), SCAN_TIMEOUT)
            .await?;
        parse_scan_results(&response.body).ok_or(SessionError::BadResponse {
            id: command_id::BLUETOOTH_SCAN,
        })
    }

    /// Pair with (and connect to) a scanned device
    pub async fn bluetooth_pair(&self, address: [u8; 6]) -> SessionResult<()> {
        let mut body = BytesMut::with_capacity(7);
        body.put_u8(OP_PAIR);
        body.put_slice(&address);
        self.send_expect_ok(command_id::BLUETOOTH_COMMAND, body.freeze())
            .await?;
        tracing::info!(address = hex::encode(address), "paired");
        Ok(())
    }

    /// Drop the current pairing
    pub async fn bluetooth_unpair(&self, address: [u8; 6]) -> SessionResult<()> {
        let mut body = BytesMut::with_capacity(7);
        body.put_u8(OP_UNPAIR);
        body.put_slice(&address);
        self.send_expect_ok(command_id::BLUETOOTH_COMMAND, body.freeze())
            .await?;
        Ok(())
    }

    /// Current pairing state: a connected flag byte plus the peer MAC
    pub async fn bluetooth_status(&self) -> SessionResult<BluetoothStatus> {
        let response = self
            .send_command(command_id::BLUETOOTH_STATUS, Bytes::new())
            .await?;
        let body = &response.body;
        if body.is_empty() {
            return Err(SessionError::BadResponse {
                id: command_id::BLUETOOTH_STATUS,
            });
        }
        if body[0] == 0 {
            return Ok(BluetoothStatus::Disconnected);
        }
        if body.len() < 7 {
            return Err(SessionError::BadResponse {
                id: command_id::BLUETOOTH_STATUS,
            });
        }
        let mut address = [0u8; 6];
        address.copy_from_slice(&body[1..7]);
        Ok(BluetoothStatus::Connected { address })
    }
}
