use std::fmt;

use xxhash_rust::xxh3::xxh3_64;

use crate::wire::WireError;

/// Length of a period key as exposed by a peripheral: 16 bytes of key
/// material followed by the little-endian interval number it starts at.
pub const PERIOD_KEY_LEN: usize = 20;

/// Length of the key material part of a [`PeriodKey`].
const KEY_MATERIAL_LEN: usize = 16;

/// A disclosed period key of an infected device.
///
/// Two keys are the same key iff their bytes are identical.
#[derive(Hash, Eq, PartialEq, Clone)]
pub struct PeriodKey([u8; PERIOD_KEY_LEN]);

impl PeriodKey {
    #[must_use]
    pub fn new(bytes: [u8; PERIOD_KEY_LEN]) -> PeriodKey {
        PeriodKey(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<PeriodKey, WireError> {
        let bytes: [u8; PERIOD_KEY_LEN] =
            bytes.try_into().map_err(|_| WireError::MalformedLength {
                field: "period key",
                expected: "20 bytes",
                actual: bytes.len(),
            })?;
        Ok(PeriodKey(bytes))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The `ENIntervalNumber` the key became valid at.
    #[must_use]
    pub fn interval_number(&self) -> u32 {
        let mut interval = [0u8; 4];
        interval.copy_from_slice(&self.0[KEY_MATERIAL_LEN..]);
        u32::from_le_bytes(interval)
    }

    /// Short, stable identifier for logs and history records.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        base62::encode(xxh3_64(&self.0))
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeriodKey({})", self.fingerprint())
    }
}
