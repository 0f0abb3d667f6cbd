use std::time::Duration;

use tokio::sync::watch;
use tokio::time;

use crate::error::ExchangeError;

/// Triggers every [`Cancel`] created alongside it.
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

/// Cancellation signal checked between characteristic operations.
#[derive(Clone)]
pub struct Cancel(watch::Receiver<bool>);

pub fn cancellation() -> (CancelHandle, Cancel) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(tx), Cancel(rx))
}

impl Cancel {
    /// A signal that never fires.
    pub fn never() -> Cancel {
        let (_, rx) = watch::channel(false);
        Cancel(rx)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    pub fn check(&self) -> Result<(), ExchangeError> {
        if self.is_cancelled() {
            Err(ExchangeError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once cancelled; pends forever if the handle is gone.
    pub async fn cancelled(&self) {
        let mut rx = self.0.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    pub async fn sleep(&self, duration: Duration) -> Result<(), ExchangeError> {
        tokio::select! {
            () = time::sleep(duration) => Ok(()),
            () = self.cancelled() => Err(ExchangeError::Cancelled),
        }
    }
}
