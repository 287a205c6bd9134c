//! VoxLink - USB voice recorder communication core
//!
//! Talks the proprietary length-prefixed binary protocol of VoxLink voice
//! recorders over USB bulk endpoints. The crate is organized bottom-up:
//!
//! - [`protocol`] - wire constants, message types, and the frame codec
//! - [`transport`] - the byte-stream transport abstraction (real USB + mock)
//! - [`session`] - the command/response correlator and transfer engine
//! - [`device`] - typed device operations built on top of the session
//! - [`config`] - TOML configuration for timeouts and USB identifiers

pub mod config;
pub mod device;
pub mod protocol;
pub mod session;
pub mod transport;

pub use protocol::{Command, DeviceModel, Message};
pub use session::{ConnectionState, DeviceInfo, DeviceSession, SessionError};
pub use transport::{Transport, TransportError};
