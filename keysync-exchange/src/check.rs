use chrono::Utc;
use keysync_domain::period_key::PeriodKey;
use keysync_domain::store::{InfectedKeyStore, Insertion};
use keysync_gatt::{CovidCharacteristic, PERIOD_KEY_SLOT_COUNT, PeriodKeySlot};
use tracing::{info, trace};

use crate::KeyTransport;
use crate::cancel::Cancel;
use crate::error::{ExchangeError, ProtocolViolation};

#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct CheckReport {
    /// Infected key count the peripheral reported.
    pub reported: usize,
    /// Store positions of keys that were new to us.
    pub added: Vec<usize>,
}

/// Pulls every infected period key the peripheral exposes into `store`.
///
/// The reported count is validated against the slot table before any slot
/// is read; keys already in the store are skipped.
pub async fn check_infection<T>(
    transport: &T,
    store: &mut InfectedKeyStore,
    cancel: &Cancel,
) -> Result<CheckReport, ExchangeError>
where
    T: KeyTransport + ?Sized,
{
    cancel.check()?;
    let count = transport
        .read_uint(CovidCharacteristic::InfectedKeyCount)
        .await?;
    info!("[Check] device has {count} infected keys");
    if count > PERIOD_KEY_SLOT_COUNT as u64 {
        return Err(ProtocolViolation::CountExceedsSlots {
            count,
            slots: PERIOD_KEY_SLOT_COUNT,
        }
        .into());
    }

    let mut report = CheckReport {
        reported: count as usize,
        added: vec![],
    };
    for slot in PeriodKeySlot::all().take(report.reported) {
        cancel.check()?;
        let characteristic = CovidCharacteristic::PeriodKey(slot);
        let value = transport.read(characteristic).await?;
        let key = PeriodKey::from_slice(&value).map_err(|source| ExchangeError::Wire {
            characteristic,
            source,
        })?;
        match store.insert(key, Utc::now()) {
            Insertion::Added(index) => {
                if let Some(key) = store.get(index) {
                    info!(
                        "[Check] adding new infected key {} from interval {}: {key}",
                        slot.index(),
                        key.interval_number()
                    );
                }
                report.added.push(index);
            }
            Insertion::Known(index) => {
                trace!(
                    "[Check] infected key {} already known as #{index}",
                    slot.index()
                );
            }
        }
    }
    Ok(report)
}
