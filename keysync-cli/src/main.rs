use std::{error::Error, path::Path, time::Duration};

use anyhow::{Context, anyhow};
use chrono::Utc;
use clap::Parser;
use humantime::format_duration;
use keysync_domain::store::InfectedKeyStore;
use keysync_exchange::{
    cancel::{Cancel, cancellation},
    config::{DriverConfig, ExchangeConfig},
    driver::Driver,
    error::{CycleError, ExchangeError},
    local::BtleplugCentral,
};
use keysync_sinks::history::{EventSink, noop::NoopEventSink};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// path to SQLite db file to record exchange events to
    #[arg(short, long)]
    db: Option<String>,

    /// index of the Bluetooth adapter to use (default: first found)
    #[arg(short, long)]
    adapter: Option<usize>,

    /// how long to scan for a Covid peripheral before starting over
    #[arg(long, default_value = "60s", value_parser = humantime::parse_duration)]
    scan_timeout: Duration,

    /// how long to wait for a connection to be established
    #[arg(long, default_value = "60s", value_parser = humantime::parse_duration)]
    connect_timeout: Duration,

    /// how long to wait for service discovery
    #[arg(long, default_value = "60s", value_parser = humantime::parse_duration)]
    discover_timeout: Duration,

    /// pause after each uploaded key so the peripheral can persist it
    #[arg(long, default_value = "1s", value_parser = humantime::parse_duration)]
    write_delay: Duration,

    /// consecutive re-requests of one key index tolerated before giving up
    #[arg(long, default_value_t = 3)]
    max_repeats: u32,

    /// run a single scan/exchange cycle and exit
    #[arg(long)]
    once: bool,
}

impl Args {
    fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            scan_timeout: self.scan_timeout,
            connect_timeout: self.connect_timeout,
            discover_timeout: self.discover_timeout,
            exchange: ExchangeConfig {
                write_delay: self.write_delay,
                max_repeats: self.max_repeats,
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing subscriber with env filter support (RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let (handle, cancel) = cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, finishing current session");
            handle.cancel();
        }
    });

    let mut sink: Box<dyn EventSink> = sink(&args).await?;
    let result = run(&mut sink, &args, &cancel).await;
    sink.close().await?;
    Ok(result?)
}

async fn sink(args: &Args) -> Result<Box<dyn EventSink>, Box<dyn Error>> {
    use keysync_sinks::history::sqllite::SQLLiteEventSink;

    match &args.db {
        Some(name) => {
            let path = Path::new(&name);
            SQLLiteEventSink::create_from_file(path).await
        }
        None => Ok(Box::<NoopEventSink>::default()),
    }
}

async fn run(sink: &mut Box<dyn EventSink>, args: &Args, cancel: &Cancel) -> anyhow::Result<()> {
    let central = BtleplugCentral::new(args.adapter)
        .await
        .context("opening bluetooth adapter failed")?;
    let mut driver = Driver::new(central, args.driver_config());
    driver
        .prepare()
        .await
        .context("clearing stale connections failed")?;

    // Keys collected from infected peripherals live as long as the process.
    let mut store = InfectedKeyStore::default();
    let start = Utc::now();
    loop {
        let (events, stopped) = match driver.run_once(&mut store, cancel).await {
            Ok(events) => (events, None),
            Err(CycleError { error, events }) => (events, Some(error)),
        };
        sink.save(&events)
            .await
            .map_err(|e| anyhow!("recording exchange events failed: {e}"))?;
        match stopped {
            Some(ExchangeError::Cancelled) => break,
            Some(e) => return Err(e).context("key exchange loop stopped"),
            None => {}
        }

        let runtime = (Utc::now() - start).to_std().unwrap_or_default();
        info!(
            "{} infected keys known after {}",
            store.len(),
            format_duration(Duration::from_secs(runtime.as_secs()))
        );
        if args.once {
            break;
        }
    }
    if cancel.is_cancelled() {
        warn!("stopped by user with {} infected keys known", store.len());
    }
    Ok(())
}
