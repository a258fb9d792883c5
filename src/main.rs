use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use flockgate::{
    init_logging, list_ports, stdout_sink, Config, DeviceRole, EventFilter, Gateway,
    ManufacturerTable, SerialPortOpener, BUILD_DATE, VERSION,
};

/// FlockGate - serial ingestion gateway for GPS and detector devices
#[derive(Parser, Debug)]
#[command(name = "flockgate")]
#[command(version = VERSION)]
#[command(about = "Decode GPS and detector serial streams and print gateway events as JSON lines")]
struct Args {
    /// Configuration file path (TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// GPS receiver port, overrides the config file
    #[arg(long)]
    gps_port: Option<String>,

    /// Detector port, overrides the config file
    #[arg(long)]
    detector_port: Option<String>,

    /// Manufacturer table path, overrides the config file
    #[arg(long)]
    oui_file: Option<PathBuf>,

    /// Download a fresh manufacturer table before starting
    #[arg(long)]
    refresh_oui: bool,

    /// Also print the detector's raw terminal lines
    #[arg(long)]
    terminal: bool,

    /// Log as JSON
    #[arg(long)]
    json_logs: bool,

    /// List available serial ports and exit
    #[arg(long)]
    list_ports: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.json_logs)?;

    if args.list_ports {
        for port in list_ports()? {
            println!("{}\t{}", port.port_name, port.description);
        }
        return Ok(());
    }

    tracing::info!("FlockGate v{} (built {})", VERSION, BUILD_DATE);

    let config_path = match args.config {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let mut config = Config::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if let Some(port) = args.gps_port {
        config.gps.port = Some(port);
    }
    if let Some(port) = args.detector_port {
        config.detector.port = Some(port);
    }
    if let Some(path) = args.oui_file {
        config.manufacturers.table_path = path;
    }
    config.validate()?;

    let manufacturers = Arc::new(ManufacturerTable::new());
    match manufacturers.load_file(&config.manufacturers.table_path) {
        Ok(count) => tracing::info!("Loaded {} manufacturer prefixes", count),
        Err(e) => tracing::warn!(
            "No manufacturer table at {}: {}",
            config.manufacturers.table_path.display(),
            e
        ),
    }

    let gateway = Gateway::new(
        config.gateway_config(),
        Arc::new(SerialPortOpener),
        manufacturers,
    )?;

    if args.refresh_oui || config.manufacturers.refresh_on_start {
        match gateway
            .refresh_manufacturers(
                &config.manufacturers.refresh_url,
                Some(&config.manufacturers.table_path),
            )
            .await
        {
            Ok(count) => tracing::info!("Manufacturer table refreshed: {} prefixes", count),
            Err(e) => tracing::warn!("Manufacturer table refresh failed: {}", e),
        }
    }

    let subscriber = gateway.subscribe(EventFilter::All, stdout_sink);
    gateway.start_background();

    for (role, port) in [
        (DeviceRole::Gps, config.gps.port.clone()),
        (DeviceRole::Detector, config.detector.port.clone()),
    ] {
        let Some(port) = port else {
            tracing::info!("No port configured for {}", role);
            continue;
        };
        let gw = gateway.clone();
        let result = tokio::task::spawn_blocking(move || gw.connect(role, &port)).await?;
        if let Err(e) = result {
            tracing::error!("Could not connect {}: {}", role, e);
        }
    }

    if args.terminal {
        if let Err(e) = gateway.subscribe_terminal(subscriber, config.detector.port.as_deref()) {
            tracing::warn!("Terminal stream unavailable: {}", e);
        }
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    let gw = gateway.clone();
    tokio::task::spawn_blocking(move || gw.shutdown()).await?;
    Ok(())
}
