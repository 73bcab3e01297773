//! si4713-usb
//!
//! Command-line front end: finds the board, brings it up through the
//! emulated I2C adapter and drives the transmitter.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use driver::chip::Si4713;
use driver::config::{DriverConfig, load_config};
use driver::lifecycle::{AttachedDevice, on_attach, on_detach};
use driver::node::ModulatorNode;
use driver::setup_logging;
use driver::usb;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "si4713-usb")]
#[command(author, version, about = "Si4713 USB FM transmitter driver")]
#[command(long_about = "
Userspace driver for the Si4713 USB FM radio transmitter board.
Claims the board's HID interface, runs the start sequence and talks to the
transmitter chip through an emulated I2C adapter.

EXAMPLES:
    # List attached boards
    si4713-usb list

    # Bring the board up and print chip revision and capabilities
    si4713-usb probe

    # Transmit on 98.1 MHz at 115 dBuV
    si4713-usb tune --khz 98100 --power 115

    # Show the current tune status
    si4713-usb status --log-level debug

CONFIGURATION:
    The driver looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/si4713-usb/driver.toml
    3. /etc/si4713-usb/driver.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List matching USB boards
    List,
    /// Attach, run the start sequence and report chip revision and capabilities
    Probe,
    /// Tune the transmitter
    Tune {
        /// Frequency in kHz (76000-108000, 50 kHz steps)
        #[arg(long)]
        khz: u32,
        /// Output power in dBuV
        #[arg(long)]
        power: Option<u8>,
    },
    /// Print the transmitter tune status
    Status,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = DriverConfig::default();
        let path = DriverConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        load_config(path).context("Failed to load configuration")?
    } else {
        DriverConfig::load_or_default()
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.driver.log_level);
    setup_logging(log_level).context("Failed to setup logging")?;

    info!("si4713-usb v{}", env!("CARGO_PKG_VERSION"));

    match args.command.unwrap_or(Command::Probe) {
        Command::List => list_devices_mode(&config),
        Command::Probe => with_device(&config, probe),
        Command::Tune { khz, power } => {
            with_device(&config, |chip, node| tune(chip, node, khz, power))
        }
        Command::Status => with_device(&config, |chip, _| status(chip)),
    }
}

type Chip = Si4713<driver::I2cBridge>;

fn list_devices_mode(config: &DriverConfig) -> Result<()> {
    let context = usb::context().context("Failed to initialize libusb")?;
    let filter = config.device_match()?;
    let devices = usb::list_devices(&context, &filter).context("Failed to list devices")?;

    if devices.is_empty() {
        println!(
            "No boards found ({:04x}:{:04x}).",
            filter.vendor_id, filter.product_id
        );
    } else {
        println!("Found {} board(s):\n", devices.len());
        for device in devices {
            println!("  {}", device);
            if let Some(manufacturer) = &device.manufacturer {
                println!("      Manufacturer: {}", manufacturer);
            }
        }
    }
    Ok(())
}

/// Attach the first board, power the chip up, run `f` and detach again
fn with_device<F>(config: &DriverConfig, f: F) -> Result<()>
where
    F: FnOnce(&Chip, &ModulatorNode<&Chip>) -> Result<()>,
{
    let context = usb::context().context("Failed to initialize libusb")?;
    let filter = config.device_match()?;
    let opened = usb::open_first(&context, &filter).context("Failed to open board")?;
    let bus_info = opened.summary.bus_info();

    let device = on_attach(opened.transport, config.instance_settings()?)
        .context("Board bring-up failed")?;

    let result = run_on(&device, config, &bus_info, f);
    on_detach(device);
    result
}

fn run_on<F>(device: &AttachedDevice, config: &DriverConfig, bus_info: &str, f: F) -> Result<()>
where
    F: FnOnce(&Chip, &ModulatorNode<&Chip>) -> Result<()>,
{
    let adapter = device.adapter().context("Adapter was unregistered")?;
    let chip = Si4713::new(adapter, config.usb.slave_address);
    chip.power_up().context("Chip power-up failed")?;

    let node = ModulatorNode::new(&chip, bus_info);
    f(&chip, &node)
}

fn probe(chip: &Chip, node: &ModulatorNode<&Chip>) -> Result<()> {
    let revision = chip.revision().context("Failed to read chip revision")?;
    let caps = node.querycap();

    println!("Driver:   {}", caps.driver);
    println!("Card:     {}", caps.card);
    println!("Bus:      {}", caps.bus_info);
    println!("Caps:     {:?}", caps.flags);
    println!(
        "Chip:     Si47{:02} firmware {}.{} revision {}",
        revision.part_number,
        char::from(revision.firmware[0]),
        char::from(revision.firmware[1]),
        char::from(revision.chip_revision)
    );

    let modulator = node.g_modulator(0).context("Failed to read modulator")?;
    println!(
        "Modulator: {} ({}-{} kHz) stereo={} rds={}",
        modulator.name,
        modulator.range_low_khz,
        modulator.range_high_khz,
        modulator.txsubchans.stereo,
        modulator.txsubchans.rds
    );
    Ok(())
}

fn tune(chip: &Chip, node: &ModulatorNode<&Chip>, khz: u32, power: Option<u8>) -> Result<()> {
    if let Some(power) = power {
        chip.tune_power(power, 0).context("Failed to set output power")?;
    }
    node.s_frequency(0, khz)
        .with_context(|| format!("Failed to tune to {} kHz", khz))?;
    info!("Tuned to {} kHz", khz);
    status(chip)
}

fn status(chip: &Chip) -> Result<()> {
    let status = chip.tune_status(false).context("Failed to read tune status")?;
    println!(
        "Frequency: {}.{:02} MHz",
        status.frequency_khz / 1000,
        (status.frequency_khz % 1000) / 10
    );
    println!("Power:     {} dBuV", status.power);
    println!("Antenna:   {}", status.antenna_capacitor);
    println!("Noise:     {}", status.noise_level);
    Ok(())
}
