//! VoxLink - USB voice recorder management
//!
//! Command-line frontend over the device communication core.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use voxlink::config::{self, Config};
use voxlink::device::DeviceTime;
use voxlink::session::DeviceSession;
use voxlink::transport::UsbTransport;

/// VoxLink - manage USB voice recorders
#[derive(Parser)]
#[command(name = "voxlink")]
#[command(author = "VoxLink Contributors")]
#[command(version = "0.1.0")]
#[command(about = "List, download and manage recordings on VoxLink devices", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List attached recorders without connecting
    Devices,

    /// Show identity of the connected recorder
    Info,

    /// List recordings on the device
    Files,

    /// Download one recording
    Download {
        /// Recording name as shown by `files`
        name: String,

        /// Output path (defaults to the recording name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete one recording
    Delete {
        /// Recording name as shown by `files`
        name: String,
    },

    /// Set the device clock from the host clock
    SyncTime,

    /// Show or change device settings
    Settings {
        /// e.g. --set auto-record=on
        #[arg(long, value_name = "KEY=on|off")]
        set: Vec<String>,
    },

    /// Scan for nearby Bluetooth audio devices
    BtScan,

    /// Pair with a Bluetooth device by MAC address
    BtPair {
        /// Address in AA:BB:CC:DD:EE:FF form
        address: String,
    },

    /// Show storage card usage
    Storage,

    /// Format the storage card (destroys all recordings)
    Format {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Flash a firmware image
    Firmware {
        /// Path to the firmware image
        image: PathBuf,

        /// Version code of the image
        #[arg(long)]
        version_code: u32,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    match cli.command {
        Commands::Devices => {
            let devices = UsbTransport::scan_devices()?;
            if devices.is_empty() {
                println!("No recorders found.");
            }
            for device in devices {
                println!(
                    "bus {:03} addr {:03}  {}",
                    device.bus_number, device.address, device.model
                );
            }
        }
        Commands::Info => {
            let session = open_session(&config).await?;
            let info = session
                .device_info()
                .await
                .context("device info missing after connect")?;
            println!("Model:    {}", session.model().await);
            println!("Firmware: {} ({:#010x})", info.firmware_version, info.version_code);
            println!("Serial:   {}", info.serial_number);
            session.disconnect().await?;
        }
        Commands::Files => {
            let session = open_session(&config).await?;
            let files = session.list_files().await?;
            if files.is_empty() {
                println!("No recordings on device.");
            }
            for file in files {
                let created = file
                    .created
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{:>10}  {:>19}  {}", file.size, created, file.name);
            }
            session.disconnect().await?;
        }
        Commands::Download { name, output } => {
            let session = open_session(&config).await?;

            let files = session.list_files().await?;
            let file = files
                .iter()
                .find(|f| f.name == name)
                .with_context(|| format!("no recording named '{}' on device", name))?;

            let path = output
                .or_else(|| config.download.output_dir.clone().map(|d| d.join(&name)))
                .unwrap_or_else(|| PathBuf::from(&name));
            if path.exists() && !config.download.overwrite {
                anyhow::bail!("{} already exists (set download.overwrite)", path.display());
            }

            println!("Downloading {} ({} bytes)...", name, file.size);
            let data = session
                .download(&name, file.size, |done, total| {
                    let pct = if total == 0 { 100 } else { done * 100 / total };
                    print!("\r  {:>3}% ({}/{})", pct, done, total);
                })
                .await?;
            println!();

            std::fs::write(&path, &data)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Saved to {}", path.display());
            session.disconnect().await?;
        }
        Commands::Delete { name } => {
            let session = open_session(&config).await?;
            session.delete_file(&name).await?;
            println!("Deleted {}", name);
            session.disconnect().await?;
        }
        Commands::SyncTime => {
            let session = open_session(&config).await?;
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .context("system clock before Unix epoch")?;
            let time = DeviceTime::from_unix(now.as_secs());
            session.set_device_time(&time).await?;
            println!("Device clock set to {}", time);
            session.disconnect().await?;
        }
        Commands::Settings { set } => {
            let session = open_session(&config).await?;
            let mut settings = session.settings().await?;

            if set.is_empty() {
                println!("auto-record:        {}", on_off(settings.auto_record));
                println!("auto-play:          {}", on_off(settings.auto_play));
                println!("bluetooth-tone:     {}", on_off(settings.bluetooth_tone));
                println!("notification-sound: {}", on_off(settings.notification_sound));
            } else {
                for assignment in &set {
                    apply_setting(&mut settings, assignment)?;
                }
                session.set_settings(settings).await?;
                println!("Settings updated.");
            }
            session.disconnect().await?;
        }
        Commands::BtScan => {
            let session = open_session(&config).await?;
            println!("Scanning (this can take a while)...");
            let devices = session.bluetooth_scan().await?;
            if devices.is_empty() {
                println!("No devices found.");
            }
            for device in devices {
                println!("{}", device);
            }
            session.disconnect().await?;
        }
        Commands::BtPair { address } => {
            let mac = parse_mac(&address)?;
            let session = open_session(&config).await?;
            session.bluetooth_pair(mac).await?;
            println!("Paired with {}", address);
            session.disconnect().await?;
        }
        Commands::Storage => {
            let session = open_session(&config).await?;
            let info = session.storage_info().await?;
            println!(
                "Used {} MiB of {} MiB ({} MiB free)",
                info.used_mib,
                info.capacity_mib,
                info.free_mib()
            );
            session.disconnect().await?;
        }
        Commands::Format { yes } => {
            if !yes {
                anyhow::bail!("formatting destroys all recordings; pass --yes to confirm");
            }
            let session = open_session(&config).await?;
            session.format_storage().await?;
            println!("Storage card formatted.");
            session.disconnect().await?;
        }
        Commands::Firmware {
            image,
            version_code,
        } => {
            let data = std::fs::read(&image)
                .with_context(|| format!("reading {}", image.display()))?;
            let session = open_session(&config).await?;
            println!("Uploading {} bytes...", data.len());
            session
                .update_firmware(version_code, &data, |done, total| {
                    print!("\r  {}/{}", done, total);
                })
                .await?;
            println!("\nFirmware uploaded; device will reboot.");
            session.disconnect().await?;
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config();
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
    }

    Ok(())
}

/// Open the transport and run the connect handshake
async fn open_session(config: &Config) -> anyhow::Result<DeviceSession<UsbTransport>> {
    let transport = UsbTransport::new(config.usb.product_id);
    let session = DeviceSession::with_config(transport, config.session_config());
    session.connect().await.context("connecting to recorder")?;
    Ok(session)
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

/// Apply one `key=on|off` assignment
fn apply_setting(
    settings: &mut voxlink::device::Settings,
    assignment: &str,
) -> anyhow::Result<()> {
    let (key, value) = assignment
        .split_once('=')
        .with_context(|| format!("expected KEY=on|off, got '{}'", assignment))?;
    let enabled = match value {
        "on" | "true" | "1" => true,
        "off" | "false" | "0" => false,
        other => anyhow::bail!("expected on or off, got '{}'", other),
    };
    match key {
        "auto-record" => settings.auto_record = enabled,
        "auto-play" => settings.auto_play = enabled,
        "bluetooth-tone" => settings.bluetooth_tone = enabled,
        "notification-sound" => settings.notification_sound = enabled,
        other => anyhow::bail!("unknown setting '{}'", other),
    }
    Ok(())
}

/// Parse `AA:BB:CC:DD:EE:FF` into raw bytes
fn parse_mac(address: &str) -> anyhow::Result<[u8; 6]> {
    let parts: Vec<&str> = address.split(':').collect();
    anyhow::ensure!(parts.len() == 6, "expected AA:BB:CC:DD:EE:FF");
    let mut mac = [0u8; 6];
    for (slot, part) in mac.iter_mut().zip(parts) {
        *slot = u8::from_str_radix(part, 16)
            .with_context(|| format!("bad MAC octet '{}'", part))?;
    }
    Ok(mac)
}
