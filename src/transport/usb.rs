//! USB bulk-endpoint transport backed by rusb
//!
//! Recorders enumerate with the shared vendor id and a per-model product
//! id, and expose one interface with a bulk OUT and a bulk IN endpoint.
//! rusb calls block, so every bulk operation runs on the blocking thread
//! pool via `spawn_blocking`; the device handle is shared as an `Arc` for
//! that purpose.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rusb::{Context, DeviceHandle, Direction, TransferType, UsbContext};

use super::{Transport, TransportError, TransportResult};
use crate::protocol::{DeviceModel, VENDOR_ID};

const READ_CHUNK_SIZE: usize = 64 * 1024;
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// A recorder found during enumeration, before it is opened
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    pub bus_number: u8,
    pub address: u8,
    pub product_id: u16,
    pub model: DeviceModel,
}

struct Claimed {
    handle: Arc<DeviceHandle<Context>>,
    interface: u8,
    endpoint_in: u8,
    endpoint_out: u8,
}

/// USB transport for one recorder
pub struct UsbTransport {
    model: DeviceModel,
    /// Restrict connect() to one product id; None accepts any known model
    product_id: Option<u16>,
    claimed: Option<Claimed>,
}

impl UsbTransport {
    pub fn new(product_id: Option<u16>) -> Self {
        Self {
            model: DeviceModel::Unknown(0),
            product_id,
            claimed: None,
        }
    }

    /// List all recorders currently attached, without opening them
    pub fn scan_devices() -> TransportResult<Vec<DiscoveredDevice>> {
        let context = Context::new()?;
        let mut found = Vec::new();

        for device in context.devices()?.iter() {
            let Ok(desc) = device.device_descriptor() else {
                continue;
            };
            if desc.vendor_id() != VENDOR_ID {
                continue;
            }
            let discovered = DiscoveredDevice {
                bus_number: device.bus_number(),
                address: device.address(),
                product_id: desc.product_id(),
                model: DeviceModel::from_product_id(desc.product_id()),
            };
            tracing::debug!(
                bus = discovered.bus_number,
                address = discovered.address,
                "found {}",
                discovered.model
            );
            found.push(discovered);
        }

        Ok(found)
    }

    fn open_and_claim(product_id: Option<u16>) -> TransportResult<(Claimed, DeviceModel)> {
        let context = Context::new()?;

        let device = context
            .devices()?
            .iter()
            .find(|device| {
                device
                    .device_descriptor()
                    .map(|desc| {
                        desc.vendor_id() == VENDOR_ID
                            && product_id.map_or(true, |pid| desc.product_id() == pid)
                    })
                    .unwrap_or(false)
            })
            .ok_or_else(|| {
                TransportError::ConnectionFailed(format!(
                    "no recorder found (vendor id {:04x})",
                    VENDOR_ID
                ))
            })?;

        let desc = device.device_descriptor()?;
        let model = DeviceModel::from_product_id(desc.product_id());

        let mut handle = device.open().map_err(|e| {
            TransportError::ConnectionFailed(format!("failed to open {}: {}", model, e))
        })?;

        // Walk the first configuration for the bulk endpoint pair
        let config = device.config_descriptor(0)?;
        let mut claimed_endpoints: Option<(u8, u8, u8)> = None;

        'outer: for interface in config.interfaces() {
            for desc in interface.descriptors() {
                let mut ep_in = None;
                let mut ep_out = None;
                for endpoint in desc.endpoint_descriptors() {
                    if endpoint.transfer_type() != TransferType::Bulk {
                        continue;
                    }
                    match endpoint.direction() {
                        Direction::In => ep_in = Some(endpoint.address()),
                        Direction::Out => ep_out = Some(endpoint.address()),
                    }
                }
                if let (Some(ep_in), Some(ep_out)) = (ep_in, ep_out) {
                    claimed_endpoints = Some((interface.number(), ep_in, ep_out));
                    break 'outer;
                }
            }
        }

        let (interface, endpoint_in, endpoint_out) = claimed_endpoints.ok_or_else(|| {
            TransportError::ConnectionFailed("bulk endpoints not found".to_string())
        })?;

        handle.claim_interface(interface).map_err(|e| {
            TransportError::ConnectionFailed(format!(
                "failed to claim interface {}: {}",
                interface, e
            ))
        })?;

        tracing::info!(
            %model,
            interface,
            endpoint_in = format_args!("{:#04x}", endpoint_in),
            endpoint_out = format_args!("{:#04x}", endpoint_out),
            "USB device claimed"
        );

        Ok((
            Claimed {
                handle: Arc::new(handle),
                interface,
                endpoint_in,
                endpoint_out,
            },
            model,
        ))
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        // Release errors on teardown are ignored. release_interface needs
        // exclusive access, which only exists once no transfer is in flight.
        if let Some(claimed) = self.claimed.take() {
            if let Ok(mut handle) = Arc::try_unwrap(claimed.handle) {
                let _ = handle.release_interface(claimed.interface);
            }
        }
    }
}

#[async_trait]
impl Transport for UsbTransport {
    async fn connect(&mut self) -> TransportResult<()> {
        if self.claimed.is_some() {
            return Ok(());
        }

        let product_id = self.product_id;
        let (claimed, model) =
            tokio::task::spawn_blocking(move || Self::open_and_claim(product_id))
                .await
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))??;

        self.claimed = Some(claimed);
        self.model = model;
        Ok(())
    }

    async fn disconnect(&mut self) -> TransportResult<()> {
        if let Some(claimed) = self.claimed.take() {
            let interface = claimed.interface;
            let handle = claimed.handle;
            let _ = tokio::task::spawn_blocking(move || {
                if let Ok(mut handle) = Arc::try_unwrap(handle) {
                    let _ = handle.release_interface(interface);
                }
            })
            .await;
            tracing::info!("USB device released");
        }
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> TransportResult<()> {
        let claimed = self.claimed.as_ref().ok_or(TransportError::NotConnected)?;
        let handle = claimed.handle.clone();
        let endpoint = claimed.endpoint_out;
        let data = data.to_vec();

        tokio::task::spawn_blocking(move || {
            handle.write_bulk(endpoint, &data, WRITE_TIMEOUT)?;
            Ok::<_, TransportError>(())
        })
        .await
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))??;

        Ok(())
    }

    async fn receive(&mut self, timeout: Duration) -> TransportResult<Vec<u8>> {
        let claimed = self.claimed.as_ref().ok_or(TransportError::NotConnected)?;
        let handle = claimed.handle.clone();
        let endpoint = claimed.endpoint_in;

        tokio::task::spawn_blocking(move || {
            let mut buf = vec![0u8; READ_CHUNK_SIZE];
            match handle.read_bulk(endpoint, &mut buf, timeout) {
                Ok(n) => {
                    buf.truncate(n);
                    Ok(buf)
                }
                Err(rusb::Error::Timeout) => Err(TransportError::Timeout(timeout)),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?
    }

    fn is_connected(&self) -> bool {
        self.claimed.is_some()
    }

    fn model(&self) -> DeviceModel {
        self.model
    }
}
