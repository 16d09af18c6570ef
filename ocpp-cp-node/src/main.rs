//! OCPP-CP Node - CLI charge point simulator
//!
//! Runs the OCPP 1.6J engine against a CSMS with a simulated energy meter,
//! useful for exercising a backend (SteVe, CitrineOS) without hardware.
//!
//! # Usage
//!
//! ```bash
//! # Connect to a local SteVe with defaults
//! ocpp-cp-node --station CP001
//!
//! # Connect to a specific CSMS
//! ocpp-cp-node --station CP001 \
//!     --csms-url ws://localhost:8180/steve/websocket/CentralSystemService
//!
//! # Simulate a full charging session
//! ocpp-cp-node --station CP001 --id-tag ABC123 --charge-secs 60
//! ```

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use ocpp_cp::{ChargePoint, ChargePointHandler, ClientConfig, Measurand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// OCPP 1.6J charge point simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// OCPP station ID
    #[arg(short, long, default_value = "EK3-001")]
    station: String,

    /// OCPP CSMS WebSocket URL
    #[arg(long, default_value = "ws://localhost:8180/steve/websocket/CentralSystemService")]
    csms_url: String,

    /// Vendor name
    #[arg(long, default_value = "Elektrokombinacija")]
    vendor: String,

    /// Model name
    #[arg(long, default_value = "EK3-CP")]
    model: String,

    /// Number of connectors
    #[arg(long, default_value = "1")]
    connectors: u32,

    /// idTag to authorize and charge with; omit to idle after boot
    #[arg(long)]
    id_tag: Option<String>,

    /// Connector for the simulated session
    #[arg(long, default_value = "1")]
    connector: i32,

    /// Duration of the simulated charging session in seconds
    #[arg(long, default_value = "60")]
    charge_secs: u64,

    /// Simulated charging power in watts
    #[arg(long, default_value = "11000")]
    power_w: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Simulated meter: energy counter advancing at a fixed power while a
/// transaction is running.
struct SimulatedMeter {
    /// Accumulated energy in Wh
    energy_wh: AtomicI64,
    power_w: u32,
}

impl SimulatedMeter {
    fn new(power_w: u32) -> Self {
        Self {
            energy_wh: AtomicI64::new(0),
            power_w,
        }
    }

    fn advance(&self, elapsed: Duration) {
        let wh = (self.power_w as i64 * elapsed.as_secs() as i64) / 3600;
        self.energy_wh.fetch_add(wh, Ordering::Relaxed);
    }

    fn reading_wh(&self) -> i64 {
        self.energy_wh.load(Ordering::Relaxed)
    }
}

impl ChargePointHandler for SimulatedMeter {
    fn meter_reading(&self, _connector_id: i32, measurand: Measurand) -> Option<String> {
        match measurand {
            Measurand::EnergyActiveImportRegister => Some(self.reading_wh().to_string()),
            Measurand::PowerActiveImport => Some(self.power_w.to_string()),
            _ => None,
        }
    }

    fn start_charging(&self, connector_id: i32, id_tag: &str) {
        info!(connector_id, id_tag, "remote start requested");
    }

    fn stop_charging(&self, connector_id: i32) {
        info!(connector_id, "remote stop requested");
    }

    fn unlock_connector(&self, connector_id: i32) {
        info!(connector_id, "connector unlocked");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║              OCPP-CP Node - Charge Point Simulator           ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Station:    {:<48} ║", args.station);
    println!("║  CSMS URL:   {:<48} ║", truncate(&args.csms_url, 48));
    println!("║  Connectors: {:<48} ║", args.connectors);
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    let config = ClientConfig::new(&args.station, &args.csms_url)
        .with_vendor(&args.vendor, &args.model)
        .with_firmware(env!("CARGO_PKG_VERSION"))
        .with_connector_count(args.connectors);

    let meter = Arc::new(SimulatedMeter::new(args.power_w));
    let cp = ChargePoint::start(config, meter.clone());

    info!("Starting OCPP charge point engine...");

    match args.id_tag {
        Some(id_tag) => {
            run_charging_session(&cp, &meter, &id_tag, args.connector, args.charge_secs).await?
        }
        None => {
            info!("No idTag given, idling (boot + heartbeats); Ctrl-C to exit");
            tokio::signal::ctrl_c().await?;
        }
    }

    Ok(())
}

/// Authorize, charge for the requested duration with periodic meter pushes,
/// then stop.
async fn run_charging_session(
    cp: &ChargePoint,
    meter: &SimulatedMeter,
    id_tag: &str,
    connector: i32,
    charge_secs: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let timeout = Duration::from_secs(30);

    // Let the boot sequence go through before touching the session
    while cp.lifecycle() != ocpp_cp::Lifecycle::Ready {
        if cp.is_offline() {
            info!("waiting for CSMS connection...");
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    let session = cp.open_session();
    info!(%session, "authorizing {}", id_tag);
    cp.authorize(session, id_tag, timeout).await?;

    let meter_start = meter.reading_wh() as i32;
    cp.start_transaction(session, connector, meter_start, timeout)
        .await?;
    info!(%session, connector, "charging for {}s", charge_secs);

    let step = Duration::from_secs(10);
    let mut remaining = Duration::from_secs(charge_secs);
    while !remaining.is_zero() {
        let slice = remaining.min(step);
        tokio::time::sleep(slice).await;
        meter.advance(slice);
        remaining -= slice;

        if let Err(e) = cp
            .meter_values(
                session,
                Measurand::EnergyActiveImportRegister,
                meter.reading_wh().to_string(),
            )
            .await
        {
            warn!("meter push failed: {}", e);
        }
    }

    let meter_stop = meter.reading_wh() as i32;
    cp.stop_transaction(session, meter_stop, timeout).await?;
    cp.close_session(session);
    info!(
        "session complete, delivered {} Wh",
        meter_stop - meter_start
    );

    Ok(())
}

/// Truncate string with ellipsis; counts chars so a multi-byte URL never
/// splits mid-character.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
