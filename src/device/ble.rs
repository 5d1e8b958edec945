//! Bluetooth LE transport for the Timeular cube

use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, ValueNotification};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::{Stream, StreamExt};
use log::{debug, info, warn};
use std::pin::Pin;
use std::time::Duration;
use uuid::Uuid;

use super::{DeviceConnection, Transport};
use crate::config::validate_address;
use crate::error::ConnectionError;
use crate::models::Face;

/// Orientation characteristic: one byte per change, the face number
pub const ORIENTATION_UUID: Uuid = Uuid::from_u128(0xc7e70012_c847_11e6_8175_8c89a55d403c);

// Standard device information characteristics
const DEVICE_INFO: &[(&str, Uuid)] = &[
    ("Model Number", Uuid::from_u128(0x00002a24_0000_1000_8000_00805f9b34fb)),
    ("Manufacturer", Uuid::from_u128(0x00002a29_0000_1000_8000_00805f9b34fb)),
    ("Serial Number", Uuid::from_u128(0x00002a25_0000_1000_8000_00805f9b34fb)),
    ("Hardware Revision", Uuid::from_u128(0x00002a27_0000_1000_8000_00805f9b34fb)),
    ("Software Revision", Uuid::from_u128(0x00002a28_0000_1000_8000_00805f9b34fb)),
    ("Firmware Revision", Uuid::from_u128(0x00002a26_0000_1000_8000_00805f9b34fb)),
];

const SCAN_TIMEOUT: Duration = Duration::from_secs(15);
const SCAN_POLL: Duration = Duration::from_millis(500);

type Notifications = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;
type Events = Pin<Box<dyn Stream<Item = CentralEvent> + Send>>;

fn ble_error(context: &str, e: btleplug::Error) -> ConnectionError {
    ConnectionError::new(format!("{}: {}", context, e))
}

/// Transport over the first Bluetooth adapter of the host
pub struct BleTransport {
    adapter: Adapter,
}

impl BleTransport {
    pub async fn new() -> Result<Self, ConnectionError> {
        let manager = Manager::new()
            .await
            .map_err(|e| ble_error("Bluetooth unavailable", e))?;
        let adapter = manager
            .adapters()
            .await
            .map_err(|e| ble_error("Cannot list Bluetooth adapters", e))?
            .into_iter()
            .next()
            .ok_or_else(|| ConnectionError::new("No Bluetooth adapter found"))?;
        Ok(Self { adapter })
    }

    async fn find(&self, address: &str) -> Result<Peripheral, ConnectionError> {
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| ble_error("Cannot start scan", e))?;

        let deadline = tokio::time::Instant::now() + SCAN_TIMEOUT;
        let found = loop {
            let peripherals = self
                .adapter
                .peripherals()
                .await
                .map_err(|e| ble_error("Cannot list peripherals", e))?;
            if let Some(p) = peripherals.into_iter().find(|p| matches_address(p, address)) {
                break Some(p);
            }
            if tokio::time::Instant::now() >= deadline {
                break None;
            }
            tokio::time::sleep(SCAN_POLL).await;
        };

        if let Err(e) = self.adapter.stop_scan().await {
            debug!("Stopping scan failed: {}", e);
        }
        found.ok_or_else(|| ConnectionError::new(format!("Cube {} not found", address)))
    }
}

fn matches_address(peripheral: &Peripheral, address: &str) -> bool {
    // MAC on Linux/Windows; CoreBluetooth only exposes a per-host UUID
    peripheral.address().to_string().eq_ignore_ascii_case(address)
        || peripheral.id().to_string().eq_ignore_ascii_case(address)
}

async fn log_device_information(peripheral: &Peripheral, characteristics: &[Characteristic]) {
    for (label, uuid) in DEVICE_INFO {
        let Some(c) = characteristics.iter().find(|c| c.uuid == *uuid) else {
            continue;
        };
        match peripheral.read(c).await {
            Ok(value) => info!("{}: {}", label, String::from_utf8_lossy(&value)),
            Err(e) => debug!("Cannot read {}: {}", label, e),
        }
    }
}

fn face_from(value: &[u8]) -> Option<Face> {
    match value {
        [face] => Some(Face(*face)),
        _ => None,
    }
}

#[async_trait]
impl Transport for BleTransport {
    async fn connect(&self, address: &str) -> Result<Box<dyn DeviceConnection>, ConnectionError> {
        validate_address(address).map_err(ConnectionError::new)?;

        let events = self
            .adapter
            .events()
            .await
            .map_err(|e| ble_error("Cannot watch adapter events", e))?;
        let peripheral = self.find(address).await?;
        peripheral
            .connect()
            .await
            .map_err(|e| ble_error("Connect failed", e))?;
        peripheral
            .discover_services()
            .await
            .map_err(|e| ble_error("Service discovery failed", e))?;

        let characteristics: Vec<Characteristic> = peripheral.characteristics().into_iter().collect();
        log_device_information(&peripheral, &characteristics).await;

        let orientation = characteristics
            .iter()
            .find(|c| c.uuid == ORIENTATION_UUID)
            .cloned()
            .ok_or_else(|| ConnectionError::new("Device has no orientation characteristic"))?;

        // The cube only notifies on change, so start from the current side
        let initial = match peripheral.read(&orientation).await {
            Ok(value) => face_from(&value),
            Err(e) => {
                debug!("Cannot read current orientation: {}", e);
                None
            }
        };

        let notifications = peripheral
            .notifications()
            .await
            .map_err(|e| ble_error("Cannot open notification stream", e))?;
        peripheral
            .subscribe(&orientation)
            .await
            .map_err(|e| ble_error("Subscribe failed", e))?;

        Ok(Box::new(BleConnection {
            id: peripheral.id(),
            peripheral,
            notifications,
            events,
            initial,
        }))
    }
}

struct BleConnection {
    id: PeripheralId,
    peripheral: Peripheral,
    notifications: Notifications,
    events: Events,
    initial: Option<Face>,
}

#[async_trait]
impl DeviceConnection for BleConnection {
    async fn next_reading(&mut self) -> Result<Option<Face>, ConnectionError> {
        if let Some(face) = self.initial.take() {
            return Ok(Some(face));
        }

        loop {
            tokio::select! {
                notification = self.notifications.next() => match notification {
                    Some(n) if n.uuid == ORIENTATION_UUID => match face_from(&n.value) {
                        Some(face) => return Ok(Some(face)),
                        None => warn!("Ignoring orientation payload of {} bytes", n.value.len()),
                    },
                    Some(_) => {}
                    None => return Err(ConnectionError::new("notification stream closed")),
                },
                event = self.events.next() => match event {
                    Some(CentralEvent::DeviceDisconnected(id)) if id == self.id => {
                        return Err(ConnectionError::new("device disconnected"));
                    }
                    Some(_) => {}
                    None => return Err(ConnectionError::new("adapter event stream closed")),
                },
            }
        }
    }

    async fn close(&mut self) {
        // btleplug keeps the link up until told otherwise
        match self.peripheral.disconnect().await {
            Ok(()) => debug!("Disconnected from {}", self.id),
            Err(e) => debug!("Disconnect from {} failed: {}", self.id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_payload_must_be_one_byte() {
        assert_eq!(face_from(&[3]), Some(Face(3)));
        assert_eq!(face_from(&[]), None);
        assert_eq!(face_from(&[1, 2]), None);
    }

    #[test]
    fn test_orientation_uuid() {
        assert_eq!(
            ORIENTATION_UUID.to_string(),
            "c7e70012-c847-11e6-8175-8c89a55d403c"
        );
    }
}
