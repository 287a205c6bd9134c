//! Device module - Typed operations on a connected recorder
//!
//! Each submodule is a thin request builder over
//! [`DeviceSession::send_command`](crate::session::DeviceSession::send_command):
//! it encodes a command body, issues the exchange through the correlator,
//! and parses the response body into a typed result.

mod bluetooth;
mod clock;
mod files;
mod firmware;
mod settings;
mod storage;

pub use bluetooth::{BluetoothDevice, BluetoothStatus};
pub use clock::DeviceTime;
pub use files::RecordingFile;
pub use settings::Settings;
pub use storage::StorageInfo;
