use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use keysync_domain::event::{ExchangeEvent, ExchangeEventKind};
use keysync_domain::store::InfectedKeyStore;
use tokio::time;
use tracing::{error, info, trace, warn};

use crate::Central;
use crate::cancel::Cancel;
use crate::config::DriverConfig;
use crate::error::{CycleError, ExchangeError};
use crate::session::{ExchangeSession, SessionReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Scanning,
    Connecting,
    Discovering,
    Exchanging,
    Disconnecting,
}

/// Runs scan → connect → discover → exchange → disconnect cycles against a
/// [`Central`], keeping failures of a single peripheral local to its cycle.
pub struct Driver<C: Central> {
    central: C,
    config: DriverConfig,
    state: DriverState,
}

impl<C: Central> Driver<C> {
    pub fn new(central: C, config: DriverConfig) -> Self {
        Driver {
            central,
            config,
            state: DriverState::Idle,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    fn transition(&mut self, next: DriverState) {
        trace!("[Driver] {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Starts from a clean slate by dropping stale Covid connections.
    pub async fn prepare(&mut self) -> Result<(), ExchangeError> {
        info!("[Driver] disconnecting any connected Covid devices");
        self.central.disconnect_all().await
    }

    /// Runs one full cycle.
    ///
    /// Errors of the peripheral found in this cycle are logged and turned
    /// into a `SessionFailed` event. Fatal errors (adapter loss,
    /// cancellation) are returned along with the events recorded before
    /// they struck.
    pub async fn run_once(
        &mut self,
        store: &mut InfectedKeyStore,
        cancel: &Cancel,
    ) -> Result<Vec<ExchangeEvent>, CycleError> {
        cancel.check()?;
        self.transition(DriverState::Scanning);
        info!("[Driver] searching for Covid device");
        let scan_timeout = self.config.scan_timeout;
        let found = tokio::select! {
            found = self.central.find_device(scan_timeout) => found,
            () = cancel.cancelled() => Err(ExchangeError::Cancelled),
        };
        let device = match found {
            Ok(device) => device,
            Err(e) => {
                if e == ExchangeError::Cancelled {
                    if let Err(stop_error) = self.central.stop_scan().await {
                        error!("[Driver] failed to stop scan: {stop_error}");
                    }
                }
                self.transition(DriverState::Idle);
                if e.is_session_local() {
                    warn!("[Driver] {e}");
                    return Ok(vec![]);
                }
                return Err(e.into());
            }
        };

        let peripheral = self.central.device_id(&device);
        let keys_before = store.len();
        let outcome = self.exchange(&device, &peripheral, store, cancel).await;

        self.transition(DriverState::Disconnecting);
        if let Err(e) = self.central.disconnect(&device).await {
            error!("[Driver] failed to disconnect {peripheral}: {e}");
        }
        self.transition(DriverState::Idle);

        let mut events: Vec<ExchangeEvent> = (keys_before..store.len())
            .filter_map(|index| {
                store.entry(index).map(|entry| {
                    ExchangeEvent::new(
                        entry.discovered_at,
                        peripheral.clone(),
                        ExchangeEventKind::KeyAdded {
                            index,
                            fingerprint: entry.key.fingerprint(),
                        },
                    )
                })
            })
            .collect();

        let now = Utc::now();
        match outcome {
            Ok(report) => {
                info!(
                    "[Driver] session with {peripheral} complete: {} new keys, {} uploaded",
                    report.check.added.len(),
                    report.upload.written.len()
                );
                events.extend(report.upload.written.iter().filter_map(|&index| {
                    store.get(index).map(|key| {
                        ExchangeEvent::new(
                            now,
                            peripheral.clone(),
                            ExchangeEventKind::KeyUploaded {
                                index,
                                fingerprint: key.fingerprint(),
                            },
                        )
                    })
                }));
                events.push(ExchangeEvent::new(
                    now,
                    peripheral,
                    ExchangeEventKind::SessionCompleted,
                ));
                Ok(events)
            }
            Err(e) => {
                error!("[Driver] session with {peripheral} failed: {e}");
                events.push(ExchangeEvent::new(
                    now,
                    peripheral,
                    ExchangeEventKind::SessionFailed {
                        reason: e.to_string(),
                    },
                ));
                if e.is_session_local() {
                    Ok(events)
                } else {
                    Err(CycleError { error: e, events })
                }
            }
        }
    }

    async fn exchange(
        &mut self,
        device: &C::Device,
        peripheral: &str,
        store: &mut InfectedKeyStore,
        cancel: &Cancel,
    ) -> Result<SessionReport, ExchangeError> {
        self.transition(DriverState::Connecting);
        info!("[Driver] connecting to {peripheral}");
        let connect_timeout = self.config.connect_timeout;
        bounded(cancel, "connect", connect_timeout, self.central.connect(device)).await?;

        self.transition(DriverState::Discovering);
        trace!("[Driver] discovering services on {peripheral}");
        let discover_timeout = self.config.discover_timeout;
        let transport = bounded(
            cancel,
            "service discovery",
            discover_timeout,
            self.central.discover(device),
        )
        .await?;

        self.transition(DriverState::Exchanging);
        ExchangeSession::new(&transport, &self.config.exchange)
            .run(store, cancel)
            .await
    }
}

async fn bounded<F, T>(
    cancel: &Cancel,
    operation: &'static str,
    timeout: Duration,
    operation_future: F,
) -> Result<T, ExchangeError>
where
    F: Future<Output = Result<T, ExchangeError>>,
{
    tokio::select! {
        result = time::timeout(timeout, operation_future) => {
            result.map_err(|_| ExchangeError::Timeout { operation, timeout })?
        }
        () = cancel.cancelled() => Err(ExchangeError::Cancelled),
    }
}
