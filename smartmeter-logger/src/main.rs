//! smartmeter-logger - log SML smart meter readings to InfluxDB
//!
//! ```text
//! smartmeter-logger [-c FILE | --influxconfig FILE] DEVICE
//! ```

use clap::Parser;
use smartmeter_logger::Result;
use smartmeter_logger::app::SmartMeterApp;
use smartmeter_logger::config::{Config, DEFAULT_CONFIG_PATH};

#[derive(Parser, Debug)]
#[command(name = "smartmeter-logger", version)]
#[command(about = "Log smart electric meter values (SML over serial) into InfluxDB")]
struct Args {
    /// Configuration file (InfluxDB connection, fields, serial settings)
    #[arg(
        short = 'c',
        long = "influxconfig",
        value_name = "FILE",
        default_value = DEFAULT_CONFIG_PATH
    )]
    config: String,

    /// Serial device the meter's reading head is attached to
    #[arg(value_name = "DEVICE")]
    device: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(&args.config)?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!(
        "smartmeter-logger v{} starting...",
        env!("CARGO_PKG_VERSION")
    );
    log::info!("Using config: {}", args.config);

    let app = SmartMeterApp::new(config, args.device)?;
    app.run()?;

    log::info!("smartmeter-logger stopped");
    Ok(())
}
