//! Protocol module - Defines the wire protocol spoken by VoxLink recorders
//!
//! Every exchange is a frame with a 12-byte header:
//! - 2 magic bytes (0x12 0x34)
//! - 2 bytes command/message id (big-endian)
//! - 4 bytes sequence number (big-endian)
//! - 1 byte padding length + 3 bytes body length (big-endian)
//! - Variable length body, then `padding length` ignored bytes

pub mod codec;
pub mod message;

pub use codec::*;
pub use message::*;

/// Magic bytes identifying the start of a valid frame
pub const MAGIC_BYTES: [u8; 2] = [0x12, 0x34];

/// USB vendor id shared by all supported recorders
pub const VENDOR_ID: u16 = 0x10d6;

/// Known product ids
pub const PRODUCT_ID_V1: u16 = 0xaf0c;
pub const PRODUCT_ID_V1E: u16 = 0xaf0d;
pub const PRODUCT_ID_P1: u16 = 0xaf0e;

/// Command ids understood by the recorder firmware
pub mod command_id {
    pub const GET_DEVICE_INFO: u16 = 1;
    pub const GET_DEVICE_TIME: u16 = 2;
    pub const SET_DEVICE_TIME: u16 = 3;
    pub const GET_FILE_LIST: u16 = 4;
    pub const TRANSFER_FILE: u16 = 5;
    pub const GET_FILE_COUNT: u16 = 6;
    pub const DELETE_FILE: u16 = 7;
    pub const REQUEST_FIRMWARE_UPGRADE: u16 = 8;
    pub const FIRMWARE_UPLOAD: u16 = 9;
    pub const GET_SETTINGS: u16 = 11;
    pub const SET_SETTINGS: u16 = 12;
    pub const GET_CARD_INFO: u16 = 16;
    pub const FORMAT_CARD: u16 = 17;
    pub const BLUETOOTH_SCAN: u16 = 0x1001;
    pub const BLUETOOTH_COMMAND: u16 = 0x1002;
    pub const BLUETOOTH_STATUS: u16 = 0x1003;
}

/// Human-readable name for a command id, for log output
pub fn command_name(id: u16) -> &'static str {
    use command_id::*;
    match id {
        GET_DEVICE_INFO => "get-device-info",
        GET_DEVICE_TIME => "get-device-time",
        SET_DEVICE_TIME => "set-device-time",
        GET_FILE_LIST => "get-file-list",
        TRANSFER_FILE => "transfer-file",
        GET_FILE_COUNT => "get-file-count",
        DELETE_FILE => "delete-file",
        REQUEST_FIRMWARE_UPGRADE => "request-firmware-upgrade",
        FIRMWARE_UPLOAD => "firmware-upload",
        GET_SETTINGS => "get-settings",
        SET_SETTINGS => "set-settings",
        GET_CARD_INFO => "get-card-info",
        FORMAT_CARD => "format-card",
        BLUETOOTH_SCAN => "bluetooth-scan",
        BLUETOOTH_COMMAND => "bluetooth-command",
        BLUETOOTH_STATUS => "bluetooth-status",
        _ => "unknown",
    }
}

/// Recorder hardware variant, derived from the USB product id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceModel {
    V1,
    V1e,
    P1,
    Unknown(u16),
}

impl DeviceModel {
    pub fn from_product_id(pid: u16) -> Self {
        match pid {
            PRODUCT_ID_V1 => DeviceModel::V1,
            PRODUCT_ID_V1E => DeviceModel::V1e,
            PRODUCT_ID_P1 => DeviceModel::P1,
            other => DeviceModel::Unknown(other),
        }
    }
}

impl std::fmt::Display for DeviceModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceModel::V1 => write!(f, "VoxLink V1"),
            DeviceModel::V1e => write!(f, "VoxLink V1E"),
            DeviceModel::P1 => write!(f, "VoxLink P1"),
            DeviceModel::Unknown(pid) => write!(f, "unknown (pid {:04x})", pid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_from_product_id() {
        assert_eq!(DeviceModel::from_product_id(0xaf0c), DeviceModel::V1);
        assert_eq!(DeviceModel::from_product_id(0xaf0d), DeviceModel::V1e);
        assert_eq!(
            DeviceModel::from_product_id(0x1234),
            DeviceModel::Unknown(0x1234)
        );
    }

    #[test]
    fn test_command_names() {
        assert_eq!(command_name(command_id::TRANSFER_FILE), "transfer-file");
        assert_eq!(command_name(0xffff), "unknown");
    }
}
