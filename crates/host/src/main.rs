//! usb-barcode host daemon
//!
//! Watches the USB bus for phones running the scanner app, switches them into accessory mode
//! and prints every scan to stdout.

use anyhow::{Context, Result};
use clap::Parser;
use common::{
    EventStream, Shutdown, SystemClock, UsbBus, UsbDevice, create_event_bus,
    create_notification_channel, setup_logging,
};
use host::config::{HostConfig, OutputFormat};
use host::output::format_event;
use host::service;
use host::usb::{AccessoryConfigurator, DeviceClassifier, HotplugMonitor, RusbBus, spawn_source};
use std::io::Write;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "usb-barcode-host")]
#[command(
    author,
    version,
    about = "Bridge Android barcode scanners connected over USB"
)]
#[command(long_about = "
Switches Android phones running the scanner app into accessory mode and prints every
scanned barcode to stdout, one event per line.

EXAMPLES:
    # Run with default config
    usb-barcode-host

    # Human-readable output
    usb-barcode-host --output pretty

    # Show attached USB devices and how they are classified
    usb-barcode-host --list-devices

    # Run with debug logging
    usb-barcode-host --log-level debug

CONFIGURATION:
    The host looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/usb-barcode/host.toml
    3. /etc/usb-barcode/host.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List USB devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Event output format
    #[arg(short, long, value_enum)]
    output: Option<OutputFormat>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = HostConfig::default();
        let path = HostConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let mut config = if let Some(ref path) = args.config {
        HostConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        HostConfig::load_or_default()
    };
    if let Some(level) = args.log_level {
        config.host.log_level = level;
    }
    if let Some(output) = args.output {
        config.host.output = output;
    }
    config.validate().context("Invalid configuration")?;

    setup_logging(&config.host.log_level).context("Failed to setup logging")?;

    info!("usb-barcode host v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", config.host.log_level);

    let classifier = config.classifier()?;
    let context = rusb::Context::new().context("Failed to initialize libusb")?;
    let bus = RusbBus::new(context.clone(), config.read_poll_interval());

    if args.list_devices {
        return list_devices(&bus, &classifier);
    }

    run(config, context, bus, classifier).await
}

/// Print every attached device with its classification
fn list_devices(bus: &RusbBus, classifier: &DeviceClassifier) -> Result<()> {
    let devices = bus.devices().context("Failed to enumerate USB devices")?;
    if devices.is_empty() {
        println!("No USB devices found.");
        return Ok(());
    }

    for device in devices {
        let identity = device.identity();
        println!(
            "Bus {:03} Device {:03}: ID {:04x}:{:04x} {}",
            identity.bus,
            identity.address,
            identity.vendor_id,
            identity.product_id,
            classifier.classify(identity.vendor_id, identity.product_id)
        );
    }
    Ok(())
}

async fn run(
    config: HostConfig,
    context: rusb::Context,
    bus: RusbBus,
    classifier: DeviceClassifier,
) -> Result<()> {
    let shutdown = Shutdown::new();
    let (sink, stream) = create_event_bus();
    let (notify_tx, notify_rx) = create_notification_channel();
    let notifications = notify_rx.clone();

    let source_handle = spawn_source(config.usb.hotplug, &context, notify_tx, shutdown.clone())
        .with_context(|| format!("Failed to start {} hot-plug source", config.usb.hotplug))?;
    info!("Hot-plug source: {}", config.usb.hotplug);

    let configurator = AccessoryConfigurator::new(
        bus.clone(),
        config.accessory.clone(),
        classifier.clone(),
        config.reconnect_policy(),
        SystemClock,
    );
    let monitor = Arc::new(HotplugMonitor::new(
        bus,
        classifier,
        configurator,
        sink,
        shutdown.clone(),
    ));

    let monitor_handle = std::thread::Builder::new()
        .name("hotplug-monitor".to_string())
        .spawn({
            let monitor = monitor.clone();
            move || {
                if let Err(e) = monitor.scan_existing() {
                    error!("Startup scan failed: {}", e);
                }
                monitor.run(notify_rx);
            }
        })
        .context("Failed to spawn monitor thread")?;

    if let Err(e) = service::notify_ready() {
        warn!("Failed to notify systemd: {:#}", e);
    }
    if let Err(e) = service::notify_status("Waiting for scanners") {
        warn!("Failed to send status to systemd: {:#}", e);
    }
    info!("Press Ctrl+C to shutdown");

    let result = consume_events(&stream, config.host.output).await;

    info!("Shutting down...");
    if let Err(e) = service::notify_stopping() {
        warn!("Failed to notify systemd: {:#}", e);
    }
    shutdown.trigger();
    notifications.close();

    join_worker("hot-plug source", source_handle).await;
    join_worker("monitor", monitor_handle).await;

    // Sessions stop at their next read timeout without publishing anything further
    stream.close();
    let mut stdout = std::io::stdout().lock();
    while let Some(event) = stream.try_recv() {
        if let Err(e) = print_event(&mut stdout, &event, config.host.output) {
            warn!("Dropping event during shutdown: {}", e);
            break;
        }
    }
    drop(stdout);

    info!("Shutdown complete ({} active session(s) abandoned)", monitor.registry().len());
    result
}

/// Print events until Ctrl+C
async fn consume_events(stream: &EventStream, format: OutputFormat) -> Result<()> {
    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = stream.recv() => {
                let Some(event) = event else {
                    info!("Event bus closed");
                    return Ok(());
                };
                let mut stdout = std::io::stdout().lock();
                print_event(&mut stdout, &event, format).context("Failed to write event")?;
            }
            result = &mut ctrl_c => {
                match result {
                    Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
                    Err(e) => error!("Error waiting for Ctrl+C: {}", e),
                }
                return Ok(());
            }
        }
    }
}

fn print_event<W: Write>(
    out: &mut W,
    event: &protocol::ScannerEvent,
    format: OutputFormat,
) -> Result<()> {
    let line = format_event(event, format)?;
    writeln!(out, "{}", line)?;
    out.flush()?;
    Ok(())
}

async fn join_worker(name: &'static str, handle: JoinHandle<()>) {
    match tokio::task::spawn_blocking(move || handle.join()).await {
        Ok(Ok(())) => info!("{} stopped", name),
        Ok(Err(e)) => error!("{} thread panicked: {:?}", name, e),
        Err(e) => error!("Failed to join {} thread: {}", name, e),
    }
}
