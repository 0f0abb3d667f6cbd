use keysync_domain::store::InfectedKeyStore;

use crate::KeyTransport;
use crate::cancel::Cancel;
use crate::check::{CheckReport, check_infection};
use crate::config::ExchangeConfig;
use crate::error::ExchangeError;
use crate::upload::{UploadReport, upload_keys};

#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct SessionReport {
    pub check: CheckReport,
    pub upload: UploadReport,
}

/// One key exchange with a connected peripheral: pull its infected keys,
/// then serve it the keys it is missing.
pub struct ExchangeSession<'a, T: KeyTransport + ?Sized> {
    transport: &'a T,
    config: &'a ExchangeConfig,
}

impl<'a, T: KeyTransport + ?Sized> ExchangeSession<'a, T> {
    pub fn new(transport: &'a T, config: &'a ExchangeConfig) -> Self {
        ExchangeSession { transport, config }
    }

    pub async fn run(
        &self,
        store: &mut InfectedKeyStore,
        cancel: &Cancel,
    ) -> Result<SessionReport, ExchangeError> {
        let check = check_infection(self.transport, store, cancel).await?;
        let upload = upload_keys(self.transport, store, self.config, cancel).await?;
        Ok(SessionReport { check, upload })
    }
}
