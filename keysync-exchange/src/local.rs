use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio::time;
use tracing::{error, info, trace};

use btleplug::api::{
    Central as BtleCentral, CentralEvent, Characteristic, Manager as _,
    Peripheral as BtlePeripheral, PeripheralProperties, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use keysync_gatt::{COVID_SERVICE_UUID, CovidCharacteristic};
use uuid::Uuid;

use crate::error::ExchangeError;
use crate::{Central, KeyTransport};

/// Characteristic access on a connected btleplug peripheral.
pub struct BtleplugTransport {
    peripheral: Peripheral,
    characteristics: HashMap<Uuid, Characteristic>,
}

impl BtleplugTransport {
    /// Collects the Covid characteristics of a peripheral whose services
    /// have been discovered; every characteristic of the exchange must be
    /// present.
    pub fn new(peripheral: Peripheral) -> Result<BtleplugTransport, ExchangeError> {
        let characteristics: HashMap<Uuid, Characteristic> = peripheral
            .characteristics()
            .into_iter()
            .filter(|c| c.service_uuid == COVID_SERVICE_UUID)
            .map(|c| (c.uuid, c))
            .collect();
        if let Some(missing) =
            CovidCharacteristic::all().find(|c| !characteristics.contains_key(&c.uuid()))
        {
            return Err(ExchangeError::MissingCharacteristic(missing));
        }
        Ok(BtleplugTransport {
            peripheral,
            characteristics,
        })
    }

    fn characteristic(
        &self,
        characteristic: CovidCharacteristic,
    ) -> Result<&Characteristic, ExchangeError> {
        self.characteristics
            .get(&characteristic.uuid())
            .ok_or(ExchangeError::MissingCharacteristic(characteristic))
    }
}

#[async_trait]
impl KeyTransport for BtleplugTransport {
    async fn read(&self, characteristic: CovidCharacteristic) -> Result<Vec<u8>, ExchangeError> {
        let target = self.characteristic(characteristic)?;
        let data = self
            .peripheral
            .read(target)
            .await
            .map_err(|e| ExchangeError::TransportRead {
                characteristic,
                reason: e.to_string(),
            })?;
        trace!("[Transport] read {} bytes from {characteristic}", data.len());
        Ok(data)
    }

    async fn write(
        &self,
        characteristic: CovidCharacteristic,
        value: &[u8],
    ) -> Result<(), ExchangeError> {
        let target = self.characteristic(characteristic)?;
        self.peripheral
            .write(target, value, WriteType::WithResponse)
            .await
            .map_err(|e| ExchangeError::TransportWrite {
                characteristic,
                reason: e.to_string(),
            })?;
        trace!("[Transport] wrote {} bytes to {characteristic}", value.len());
        Ok(())
    }
}

/// The local Bluetooth adapter acting as basestation.
pub struct BtleplugCentral {
    adapter: Adapter,
}

type CentralEvents = Pin<Box<dyn Stream<Item = CentralEvent> + Send>>;

/// A Covid peripheral heard during the current scan. The platform keeps
/// properties of peripherals seen in earlier scans, but only reports an
/// RSSI for those currently advertising.
fn in_range_covid(properties: &PeripheralProperties) -> bool {
    properties.rssi.is_some() && properties.services.contains(&COVID_SERVICE_UUID)
}

fn scan_error(e: btleplug::Error) -> ExchangeError {
    ExchangeError::Scan(e.to_string())
}

impl BtleplugCentral {
    /// Opens the adapter at `index`, or the first one the platform reports.
    pub async fn new(index: Option<usize>) -> Result<BtleplugCentral, ExchangeError> {
        let manager = Manager::new().await?;
        let mut adapter_list = manager.adapters().await?;
        let position = index.unwrap_or(0);
        if position >= adapter_list.len() {
            return Err(ExchangeError::Adapter(format!(
                "no adapter at index {position} ({} available)",
                adapter_list.len()
            )));
        }
        let adapter = adapter_list.swap_remove(position);
        info!("Using adapter: {}", adapter.adapter_info().await?);
        Ok(BtleplugCentral { adapter })
    }

    async fn properties(&self, peripheral: &Peripheral) -> Option<PeripheralProperties> {
        match peripheral.properties().await {
            Ok(properties) => properties,
            Err(e) => {
                error!("[Central] failed to read peripheral properties: {e}");
                None
            }
        }
    }

    async fn covid_peripheral(&self, id: &PeripheralId) -> Option<Peripheral> {
        let peripheral = self.adapter.peripheral(id).await.ok()?;
        self.properties(&peripheral)
            .await
            .is_some_and(|p| in_range_covid(&p))
            .then_some(peripheral)
    }

    async fn wait_for_covid_device(
        &self,
        events: &mut CentralEvents,
    ) -> Result<Peripheral, ExchangeError> {
        while let Some(event) = events.next().await {
            let id = match event {
                CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                CentralEvent::ServicesAdvertisement { id, services }
                    if services.contains(&COVID_SERVICE_UUID) =>
                {
                    id
                }
                _ => continue,
            };
            if let Some(peripheral) = self.covid_peripheral(&id).await {
                return Ok(peripheral);
            }
        }
        Err(ExchangeError::Adapter("adapter event stream ended".to_string()))
    }
}

#[async_trait]
impl Central for BtleplugCentral {
    type Device = Peripheral;
    type Transport = BtleplugTransport;

    async fn disconnect_all(&mut self) -> Result<(), ExchangeError> {
        for peripheral in self.adapter.peripherals().await? {
            if !peripheral.is_connected().await.unwrap_or(false) {
                continue;
            }
            let covid = self
                .properties(&peripheral)
                .await
                .is_some_and(|p| p.services.contains(&COVID_SERVICE_UUID));
            if covid {
                trace!("[Central] disconnecting {:?}", peripheral.id());
                if let Err(e) = peripheral.disconnect().await {
                    error!("[Central] failed to disconnect {:?}: {e}", peripheral.id());
                }
            }
        }
        Ok(())
    }

    /// Waits for a Covid peripheral to advertise after the scan starts;
    /// peripherals only remembered from earlier scans are skipped.
    async fn find_device(&mut self, timeout: Duration) -> Result<Peripheral, ExchangeError> {
        let mut events = self.adapter.events().await.map_err(scan_error)?;
        trace!("[Central] starting scan for {COVID_SERVICE_UUID}");
        self.adapter
            .start_scan(ScanFilter {
                services: vec![COVID_SERVICE_UUID],
            })
            .await
            .map_err(scan_error)?;
        let found = time::timeout(timeout, self.wait_for_covid_device(&mut events)).await;
        if let Err(e) = self.stop_scan().await {
            error!("[Central] {e}");
        }
        found.map_err(|_| ExchangeError::DiscoveryFailure(timeout))?
    }

    async fn stop_scan(&mut self) -> Result<(), ExchangeError> {
        self.adapter.stop_scan().await.map_err(scan_error)
    }

    fn device_id(&self, device: &Peripheral) -> String {
        format!("{}", device.address())
    }

    async fn connect(&mut self, device: &Peripheral) -> Result<(), ExchangeError> {
        device.connect().await.map_err(|e| ExchangeError::Connect {
            peripheral: self.device_id(device),
            reason: e.to_string(),
        })
    }

    async fn discover(&mut self, device: &Peripheral) -> Result<BtleplugTransport, ExchangeError> {
        device
            .discover_services()
            .await
            .map_err(|e| ExchangeError::ServiceDiscovery {
                peripheral: self.device_id(device),
                reason: e.to_string(),
            })?;
        BtleplugTransport::new(device.clone())
    }

    async fn disconnect(&mut self, device: &Peripheral) -> Result<(), ExchangeError> {
        if device.is_connected().await.unwrap_or(true) {
            device.disconnect().await?;
        }
        Ok(())
    }
}
