use keysync_domain::store::InfectedKeyStore;
use keysync_gatt::CovidCharacteristic;
use tracing::{info, trace};

use crate::KeyTransport;
use crate::cancel::Cancel;
use crate::config::ExchangeConfig;
use crate::error::{ExchangeError, ProtocolViolation};

#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct UploadReport {
    /// Store positions written, in write order.
    pub written: Vec<usize>,
    /// The out-of-range index that ended the upload.
    pub final_index: u64,
}

/// Serves keys the peripheral has not stored yet.
///
/// Polls the next expected index and writes the store key at that position
/// until the peripheral asks for an index outside `0..store.len()`; asking
/// for exactly `store.len()` means it is caught up.
pub async fn upload_keys<T>(
    transport: &T,
    store: &InfectedKeyStore,
    config: &ExchangeConfig,
    cancel: &Cancel,
) -> Result<UploadReport, ExchangeError>
where
    T: KeyTransport + ?Sized,
{
    let limit = store
        .len()
        .saturating_mul(config.max_repeats as usize + 1);
    let mut written = vec![];
    let mut previous: Option<(usize, u32)> = None;

    loop {
        cancel.check()?;
        let requested = transport
            .read_uint(CovidCharacteristic::NextKeyIndex)
            .await?;
        trace!(
            "[Upload] device expects key index {requested}, we have up to {}",
            store.len()
        );
        let Some((index, key)) = usize::try_from(requested)
            .ok()
            .and_then(|index| store.get(index).map(|key| (index, key)))
        else {
            info!(
                "[Upload] device caught up at index {requested} after {} keys",
                written.len()
            );
            return Ok(UploadReport {
                written,
                final_index: requested,
            });
        };

        let requests = match previous {
            Some((last, n)) if last == index => n + 1,
            _ => 1,
        };
        if requests > config.max_repeats + 1 {
            return Err(ProtocolViolation::StalledIndex { index, requests }.into());
        }
        if written.len() >= limit {
            return Err(ProtocolViolation::UploadLimitExceeded {
                limit,
                store_len: store.len(),
            }
            .into());
        }
        previous = Some((index, requests));

        info!("[Upload] sending key {index} ({})", key.fingerprint());
        transport.write(CovidCharacteristic::NewKey, key.as_bytes()).await?;
        written.push(index);
        cancel.sleep(config.write_delay).await?;
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use keysync_domain::store::InfectedKeyStore;
    use keysync_gatt::CovidCharacteristic;

    use crate::cancel::{Cancel, cancellation};
    use crate::config::ExchangeConfig;
    use crate::error::{ExchangeError, ProtocolViolation};
    use crate::scripted::{ScriptedPeripheral, key};

    use super::{UploadReport, upload_keys};

    fn store_of(fills: &[u8]) -> InfectedKeyStore {
        let start = Utc.timestamp_opt(0, 0).unwrap();
        InfectedKeyStore::from_keys(fills.iter().map(|f| key(*f)), start)
    }

    #[tokio::test(start_paused = true)]
    async fn writes_requested_keys_until_out_of_range() {
        let store = store_of(&[0, 1, 2]);
        let peripheral = ScriptedPeripheral::new();
        peripheral.request_indices(&[1, 2, 3]);

        let report = upload_keys(&peripheral, &store, &ExchangeConfig::default(), &Cancel::never())
            .await
            .unwrap();

        assert_eq!(
            report,
            UploadReport {
                written: vec![1, 2],
                final_index: 3
            }
        );
        assert_eq!(
            peripheral.writes(),
            vec![key(1).as_bytes().to_vec(), key(2).as_bytes().to_vec()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn caught_up_device_stops_immediately() {
        let store = store_of(&[0, 1]);
        let peripheral = ScriptedPeripheral::new();
        peripheral.request_indices(&[2]);

        let report = upload_keys(&peripheral, &store, &ExchangeConfig::default(), &Cancel::never())
            .await
            .unwrap();

        assert!(report.written.is_empty());
        assert_eq!(report.final_index, 2);
        assert!(peripheral.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_store_writes_nothing() {
        let store = InfectedKeyStore::default();
        let peripheral = ScriptedPeripheral::new();
        peripheral.request_indices(&[0]);

        let report = upload_keys(&peripheral, &store, &ExchangeConfig::default(), &Cancel::never())
            .await
            .unwrap();

        assert!(report.written.is_empty());
        assert_eq!(peripheral.reads(), vec![CovidCharacteristic::NextKeyIndex]);
    }

    #[tokio::test(start_paused = true)]
    async fn pauses_between_writes() {
        let store = store_of(&[0, 1]);
        let peripheral = ScriptedPeripheral::new();
        peripheral.request_indices(&[0, 1, 2]);
        let config = ExchangeConfig {
            write_delay: Duration::from_millis(250),
            ..ExchangeConfig::default()
        };

        let start = tokio::time::Instant::now();
        upload_keys(&peripheral, &store, &config, &Cancel::never())
            .await
            .unwrap();

        assert_eq!(start.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn tolerates_a_few_repeats() {
        let store = store_of(&[0, 1]);
        let peripheral = ScriptedPeripheral::new();
        peripheral.request_indices(&[0, 0, 1, 2]);
        let config = ExchangeConfig {
            max_repeats: 1,
            ..ExchangeConfig::default()
        };

        let report = upload_keys(&peripheral, &store, &config, &Cancel::never())
            .await
            .unwrap();

        assert_eq!(report.written, vec![0, 0, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_index_is_a_protocol_violation() {
        let store = store_of(&[0, 1]);
        let peripheral = ScriptedPeripheral::new();
        peripheral.request_indices(&[1, 1, 1, 1, 1, 1]);
        let config = ExchangeConfig {
            max_repeats: 2,
            ..ExchangeConfig::default()
        };

        let err = upload_keys(&peripheral, &store, &config, &Cancel::never())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ExchangeError::Protocol(ProtocolViolation::StalledIndex {
                index: 1,
                requests: 4
            })
        );
        assert_eq!(peripheral.writes().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn oscillating_device_hits_write_limit() {
        let store = store_of(&[0, 1]);
        let peripheral = ScriptedPeripheral::new();
        peripheral.request_indices(&[0, 1, 0, 1, 0, 1]);
        let config = ExchangeConfig {
            max_repeats: 1,
            ..ExchangeConfig::default()
        };

        let err = upload_keys(&peripheral, &store, &config, &Cancel::never())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ExchangeError::Protocol(ProtocolViolation::UploadLimitExceeded {
                limit: 4,
                store_len: 2
            })
        );
        assert_eq!(peripheral.writes().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn write_failure_aborts() {
        let store = store_of(&[0]);
        let peripheral = ScriptedPeripheral::new();
        peripheral.request_indices(&[0, 1]);
        peripheral.fail_writes();

        let err = upload_keys(&peripheral, &store, &ExchangeConfig::default(), &Cancel::never())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ExchangeError::TransportWrite {
                characteristic: CovidCharacteristic::NewKey,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_pause() {
        let store = store_of(&[0, 1]);
        let peripheral = ScriptedPeripheral::new();
        peripheral.request_indices(&[0, 1, 2]);
        let (handle, cancel) = cancellation();
        let config = ExchangeConfig {
            write_delay: Duration::from_secs(3600),
            ..ExchangeConfig::default()
        };

        let upload = {
            let peripheral = peripheral.clone();
            tokio::spawn(async move {
                upload_keys(&peripheral, &store, &config, &cancel).await
            })
        };
        tokio::task::yield_now().await;
        handle.cancel();

        assert_eq!(upload.await.unwrap(), Err(ExchangeError::Cancelled));
        assert_eq!(peripheral.writes().len(), 1);
    }
}
