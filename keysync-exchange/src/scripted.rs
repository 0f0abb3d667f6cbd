//! In-memory peripheral and central used by the exchange tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use keysync_domain::period_key::{PERIOD_KEY_LEN, PeriodKey};
use keysync_gatt::{CovidCharacteristic, PeriodKeySlot};

use crate::error::ExchangeError;
use crate::{Central, KeyTransport};

pub fn key(fill: u8) -> PeriodKey {
    PeriodKey::new([fill; PERIOD_KEY_LEN])
}

#[derive(Default)]
struct State {
    infected_key_count: Vec<u8>,
    slots: HashMap<PeriodKeySlot, Vec<u8>>,
    next_indices: VecDeque<Vec<u8>>,
    fail_writes: bool,
    reads: Vec<CovidCharacteristic>,
    writes: Vec<Vec<u8>>,
}

/// A peripheral answering reads from a script and recording every write.
#[derive(Clone, Default)]
pub struct ScriptedPeripheral(Arc<Mutex<State>>);

impl ScriptedPeripheral {
    pub fn new() -> ScriptedPeripheral {
        let peripheral = ScriptedPeripheral::default();
        peripheral.set_infected_key_count(&0u32.to_le_bytes());
        peripheral
    }

    pub fn with_infected_keys(keys: &[PeriodKey]) -> ScriptedPeripheral {
        let peripheral = ScriptedPeripheral::new();
        peripheral.set_infected_key_count(&(keys.len() as u32).to_le_bytes());
        for (slot, key) in PeriodKeySlot::all().zip(keys) {
            peripheral.set_slot(slot.index(), key.as_bytes());
        }
        peripheral
    }

    pub fn set_infected_key_count(&self, value: &[u8]) {
        self.0.lock().unwrap().infected_key_count = value.to_vec();
    }

    pub fn set_slot(&self, index: usize, value: &[u8]) {
        let slot = PeriodKeySlot::new(index).unwrap();
        self.0.lock().unwrap().slots.insert(slot, value.to_vec());
    }

    /// Queues the values successive reads of the next key index return.
    pub fn request_indices(&self, indices: &[u32]) -> &Self {
        let mut state = self.0.lock().unwrap();
        state
            .next_indices
            .extend(indices.iter().map(|i| i.to_le_bytes().to_vec()));
        self
    }

    pub fn fail_writes(&self) {
        self.0.lock().unwrap().fail_writes = true;
    }

    pub fn reads(&self) -> Vec<CovidCharacteristic> {
        self.0.lock().unwrap().reads.clone()
    }

    pub fn slot_reads(&self) -> usize {
        self.reads()
            .iter()
            .filter(|c| matches!(c, CovidCharacteristic::PeriodKey(_)))
            .count()
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.0.lock().unwrap().writes.clone()
    }
}

#[async_trait]
impl KeyTransport for ScriptedPeripheral {
    async fn read(&self, characteristic: CovidCharacteristic) -> Result<Vec<u8>, ExchangeError> {
        let mut state = self.0.lock().unwrap();
        state.reads.push(characteristic);
        let value = match characteristic {
            CovidCharacteristic::InfectedKeyCount => Some(state.infected_key_count.clone()),
            CovidCharacteristic::PeriodKey(slot) => state.slots.get(&slot).cloned(),
            CovidCharacteristic::NextKeyIndex => state.next_indices.pop_front(),
            CovidCharacteristic::NewKey => None,
        };
        value.ok_or_else(|| ExchangeError::TransportRead {
            characteristic,
            reason: "nothing scripted".to_string(),
        })
    }

    async fn write(
        &self,
        characteristic: CovidCharacteristic,
        value: &[u8],
    ) -> Result<(), ExchangeError> {
        let mut state = self.0.lock().unwrap();
        if state.fail_writes || characteristic != CovidCharacteristic::NewKey {
            return Err(ExchangeError::TransportWrite {
                characteristic,
                reason: "write rejected".to_string(),
            });
        }
        state.writes.push(value.to_vec());
        Ok(())
    }
}

pub struct ScriptedDevice {
    pub id: String,
    pub peripheral: ScriptedPeripheral,
}

/// A central handing out scripted peripherals, one per scan.
#[derive(Default)]
pub struct ScriptedCentral {
    pub devices: VecDeque<ScriptedDevice>,
    pub fail_connect: bool,
    pub fail_scan: bool,
    /// Scans, connects or discoveries that never complete.
    pub pending_scan: bool,
    pub pending_connect: bool,
    pub pending_discover: bool,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedCentral {
    pub fn with_device(id: &str, peripheral: ScriptedPeripheral) -> ScriptedCentral {
        let mut central = ScriptedCentral::default();
        central.devices.push_back(ScriptedDevice {
            id: id.to_string(),
            peripheral,
        });
        central
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Central for ScriptedCentral {
    type Device = ScriptedDevice;
    type Transport = ScriptedPeripheral;

    async fn disconnect_all(&mut self) -> Result<(), ExchangeError> {
        self.record("disconnect_all".to_string());
        Ok(())
    }

    async fn find_device(&mut self, timeout: Duration) -> Result<ScriptedDevice, ExchangeError> {
        self.record("find".to_string());
        if self.fail_scan {
            return Err(ExchangeError::Scan("adapter busy".to_string()));
        }
        if self.pending_scan {
            std::future::pending::<()>().await;
        }
        self.devices
            .pop_front()
            .ok_or(ExchangeError::DiscoveryFailure(timeout))
    }

    async fn stop_scan(&mut self) -> Result<(), ExchangeError> {
        self.record("stop_scan".to_string());
        Ok(())
    }

    fn device_id(&self, device: &ScriptedDevice) -> String {
        device.id.clone()
    }

    async fn connect(&mut self, device: &ScriptedDevice) -> Result<(), ExchangeError> {
        self.record(format!("connect {}", device.id));
        if self.fail_connect {
            return Err(ExchangeError::Connect {
                peripheral: device.id.clone(),
                reason: "out of range".to_string(),
            });
        }
        if self.pending_connect {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn discover(&mut self, device: &ScriptedDevice) -> Result<ScriptedPeripheral, ExchangeError> {
        self.record(format!("discover {}", device.id));
        if self.pending_discover {
            std::future::pending::<()>().await;
        }
        Ok(device.peripheral.clone())
    }

    async fn disconnect(&mut self, device: &ScriptedDevice) -> Result<(), ExchangeError> {
        self.record(format!("disconnect {}", device.id));
        Ok(())
    }
}
