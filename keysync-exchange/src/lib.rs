pub mod cancel;
pub mod check;
pub mod config;
pub mod driver;
pub mod error;
pub mod local;
pub mod session;
pub mod upload;

#[cfg(test)]
pub(crate) mod scripted;

use std::time::Duration;

use async_trait::async_trait;
use keysync_domain::wire::decode_le_uint;
use keysync_gatt::CovidCharacteristic;

use crate::error::ExchangeError;

/// Characteristic access on one connected, service-discovered peripheral.
///
/// Each call suspends until the underlying transport completes, fails or
/// times out.
#[async_trait]
pub trait KeyTransport: Send + Sync {
    async fn read(&self, characteristic: CovidCharacteristic) -> Result<Vec<u8>, ExchangeError>;

    async fn write(
        &self,
        characteristic: CovidCharacteristic,
        value: &[u8],
    ) -> Result<(), ExchangeError>;

    /// Reads a characteristic holding an unsigned little-endian integer.
    async fn read_uint(&self, characteristic: CovidCharacteristic) -> Result<u64, ExchangeError> {
        let value = self.read(characteristic).await?;
        decode_le_uint(&value).map_err(|source| ExchangeError::Wire {
            characteristic,
            source,
        })
    }
}

/// The BLE host side of a session: finding, connecting and releasing
/// peripherals that expose the Covid service.
#[async_trait]
pub trait Central: Send {
    type Device: Send + Sync;
    type Transport: KeyTransport;

    /// Disconnects any Covid peripherals left connected from earlier runs.
    async fn disconnect_all(&mut self) -> Result<(), ExchangeError>;

    /// Scans for the first peripheral advertising the Covid service.
    async fn find_device(&mut self, timeout: Duration) -> Result<Self::Device, ExchangeError>;

    /// Stops a scan left running by an abandoned `find_device`.
    async fn stop_scan(&mut self) -> Result<(), ExchangeError>;

    fn device_id(&self, device: &Self::Device) -> String;

    async fn connect(&mut self, device: &Self::Device) -> Result<(), ExchangeError>;

    async fn discover(&mut self, device: &Self::Device) -> Result<Self::Transport, ExchangeError>;

    async fn disconnect(&mut self, device: &Self::Device) -> Result<(), ExchangeError>;
}
