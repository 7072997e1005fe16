use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::device::link::{Advertisement, BleLink};
use crate::error::DeviceError;

/// [`BleLink`] backed by the platform bluetooth stack through btleplug.
pub struct BtleLink {
    manager: Manager,
    adapters: Mutex<Vec<Adapter>>,
}

impl BtleLink {
    pub async fn new() -> Result<Self, DeviceError> {
        let manager = Manager::new().await?;
        Ok(BtleLink { manager, adapters: Mutex::new(Vec::new()) })
    }

    async fn adapters(&self) -> Result<Vec<Adapter>, DeviceError> {
        let mut adapters = self.adapters.lock().await;

        if adapters.is_empty() {
            *adapters = self.manager.adapters().await?;
        }

        if adapters.is_empty() {
            return Err(DeviceError::NoAdapter);
        }

        Ok(adapters.clone())
    }
}

async fn advertisement_of(adapter: &Adapter, peripheral: Peripheral) -> Option<Result<Advertisement<Peripheral>, DeviceError>> {
    match peripheral.properties().await {
        Err(err) => Some(Err(err.into())),
        Ok(None) => {
            debug!("Peripheral {:?} has no properties", peripheral.id());
            None
        },
        Ok(Some(properties)) => {
            debug!(
                "Seen peripheral {} {} on adapter {}",
                properties.address,
                properties.local_name.as_deref().unwrap_or("NONE"),
                adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()),
            );
            Some(Ok(Advertisement { handle: peripheral, local_name: properties.local_name }))
        },
    }
}

fn find_characteristic(peripheral: &Peripheral, service_uuid: Uuid, characteristic_uuid: Uuid) -> Result<Characteristic, DeviceError> {
    for service in peripheral.services() {
        if !service.uuid.eq(&service_uuid) {
            continue;
        }

        for characteristic in &service.characteristics {
            if characteristic.uuid.eq(&characteristic_uuid) {
                return Ok(characteristic.clone());
            }
        }
    }

    Err(DeviceError::MissingCharacteristic)
}

#[async_trait]
impl BleLink for BtleLink {
    type Handle = Peripheral;

    async fn request_permission(&self) -> Result<bool, DeviceError> {
        match self.adapters().await {
            Ok(_) => Ok(true),
            Err(err) if err.is_permission_denied() => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn start_scan(&self) -> Result<BoxStream<'static, Result<Advertisement<Peripheral>, DeviceError>>, DeviceError> {
        let adapters = self.adapters().await?;
        let mut streams = Vec::with_capacity(adapters.len());

        for adapter in adapters {
            info!("Scanning using adapter {}...", adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));

            // subscribe before starting the scan so that no event is missed
            let events = adapter.events().await?;
            adapter.start_scan(ScanFilter::default()).await?;

            // peripherals the adapter already knows about do not always produce a new event
            let known = match adapter.peripherals().await {
                Ok(v) => v,
                Err(err) => {
                    warn!("Failed to query BLE adapter for peripherals: {}", err);
                    Vec::new()
                },
            };

            let known_adapter = adapter.clone();
            let known = stream::iter(known).filter_map(move |peripheral| {
                let adapter = known_adapter.clone();
                async move { advertisement_of(&adapter, peripheral).await }
            });

            let discovered = events.filter_map(move |event| {
                let adapter = adapter.clone();
                async move {
                    let id = match event {
                        CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                        _ => return None,
                    };

                    match adapter.peripheral(&id).await {
                        Ok(peripheral) => advertisement_of(&adapter, peripheral).await,
                        Err(err) => Some(Err(err.into())),
                    }
                }
            });

            streams.push(known.chain(discovered).boxed());
        }

        Ok(stream::select_all(streams).boxed())
    }

    async fn stop_scan(&self) -> Result<(), DeviceError> {
        let mut result = Ok(());

        for adapter in self.adapters().await? {
            if let Err(err) = adapter.stop_scan().await {
                warn!("Failed to stop scanning: {}", err);
                result = Err(err.into());
            }
        }

        result
    }

    async fn connect(&self, handle: &Peripheral) -> Result<(), DeviceError> {
        info!("Connecting to peripheral...");
        handle.connect().await?;
        Ok(())
    }

    async fn discover(&self, handle: &Peripheral) -> Result<(), DeviceError> {
        info!("Connected; Discovering services...");
        handle.discover_services().await?;
        Ok(())
    }

    async fn is_connected(&self, handle: &Peripheral) -> Result<bool, DeviceError> {
        Ok(handle.is_connected().await?)
    }

    async fn disconnect(&self, handle: &Peripheral) -> Result<(), DeviceError> {
        handle.disconnect().await?;
        Ok(())
    }

    async fn disconnections(&self, handle: &Peripheral) -> Result<BoxStream<'static, ()>, DeviceError> {
        let mut streams = Vec::new();

        for adapter in self.adapters().await? {
            let peripheral_id = handle.id();
            let events = adapter.events().await?;

            streams.push(events.filter_map(move |event| {
                let matched = matches!(event, CentralEvent::DeviceDisconnected(ref id) if *id == peripheral_id);
                async move { if matched { Some(()) } else { None } }
            }).boxed());
        }

        Ok(stream::select_all(streams).boxed())
    }

    async fn read(&self, handle: &Peripheral, service: Uuid, characteristic: Uuid) -> Result<Vec<u8>, DeviceError> {
        let characteristic = find_characteristic(handle, service, characteristic)?;
        Ok(handle.read(&characteristic).await?)
    }

    async fn write_with_response(&self, handle: &Peripheral, service: Uuid, characteristic: Uuid, value: &[u8]) -> Result<(), DeviceError> {
        let characteristic = find_characteristic(handle, service, characteristic)?;
        handle.write(&characteristic, value, WriteType::WithResponse).await?;
        Ok(())
    }

    async fn monitor(&self, handle: &Peripheral, service: Uuid, characteristic: Uuid) -> Result<BoxStream<'static, Vec<u8>>, DeviceError> {
        let characteristic = find_characteristic(handle, service, characteristic)?;

        info!("Subscribing to characteristic {:?} {:?}", characteristic.service_uuid, characteristic.uuid);
        let notifications = handle.notifications().await?;
        handle.subscribe(&characteristic).await?;

        let uuid = characteristic.uuid;
        Ok(notifications
            .filter_map(move |data| async move {
                if data.uuid.eq(&uuid) { Some(data.value) } else { None }
            })
            .boxed())
    }

    async fn unmonitor(&self, handle: &Peripheral, service: Uuid, characteristic: Uuid) -> Result<(), DeviceError> {
        let characteristic = find_characteristic(handle, service, characteristic)?;
        handle.unsubscribe(&characteristic).await?;
        Ok(())
    }
}
