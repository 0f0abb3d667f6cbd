use std::time::Duration;

/// Tuning for a single key exchange with a connected peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeConfig {
    /// Pause after each written key so the peripheral can persist it
    /// before we poll for the next index.
    pub write_delay: Duration,
    /// How many times in a row a peripheral may re-request the same index
    /// (e.g. after a failed flash write) before the upload is aborted.
    pub max_repeats: u32,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfig {
            write_delay: Duration::from_secs(1),
            max_repeats: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    pub scan_timeout: Duration,
    pub connect_timeout: Duration,
    pub discover_timeout: Duration,
    pub exchange: ExchangeConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            scan_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(60),
            discover_timeout: Duration::from_secs(60),
            exchange: ExchangeConfig::default(),
        }
    }
}
