use std::time::Duration;

use clap::{Parser, Subcommand};

use onewire_bus::{OneWireError, RomId};
use onewire_host::{BackendAddress, BusController, BusDefinition};
use onewire_serial::{detect, SerialMaster, SerialTransport};

/// Host-side 1-Wire bus driver
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Bus definition: "<name> <backend-address> [interval=<s>]
    /// [followAlarms=on|off] [kick=on|off]"
    #[arg(short, long)]
    bus: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Query bus state
    Get {
        #[command(subcommand)]
        what: GetCommand,
    },
    /// Adjust kick cadence and alarm policy, then report the result
    Set {
        #[command(subcommand)]
        what: SetCommand,
    },
    /// Probe the transport and report the detected bus master
    Detect,
    /// Run the periodic kick/scan loop
    Watch,
}

#[derive(Subcommand, Debug)]
enum GetCommand {
    /// Printable ROM ids of currently alarmed devices
    Alarms,
    /// Tabular device listing
    Devices,
}

#[derive(Subcommand, Debug)]
enum SetCommand {
    /// Kick cadence in seconds, floored at 15
    Interval { seconds: u64 },
    /// Whether an alarming reset schedules an alarm scan
    #[command(alias = "followAlarms")]
    FollowAlarms { switch: String },
}

/// Well-known family codes, for the device listing.
fn chip_name(family: u8) -> &'static str {
    match family {
        0x01 => "DS2401",
        0x05 => "DS2405",
        0x10 => "DS18S20",
        0x12 => "DS2406",
        0x1d => "DS2423",
        0x20 => "DS2450",
        0x22 => "DS1822",
        0x26 => "DS2438",
        0x28 => "DS18B20",
        0x29 => "DS2408",
        0x3a => "DS2413",
        0x42 => "DS28EA00",
        0xff => "LCD",
        _ => "unknown",
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let definition = match BusDefinition::parse(&args.bus) {
        Ok(definition) => definition,
        Err(e) => {
            eprintln!("bus definition: {}: {}", args.bus, e.kind());
            std::process::exit(2);
        }
    };

    let master = match open_master(&definition) {
        Ok(master) => master,
        Err(e) => {
            eprintln!("bus {}: init: {}", definition.name, e.kind());
            std::process::exit(1);
        }
    };

    if matches!(args.command, Command::Detect) {
        println!("{} {}", definition.name, master.kind());
        return;
    }

    let mut bus = BusController::new_sync(definition.name, master, definition.settings);
    if let Err(line) = run(&mut bus, args.command) {
        eprintln!("{line}");
        std::process::exit(1);
    }
}

fn open_master(definition: &BusDefinition) -> Result<SerialMaster<SerialTransport>, OneWireError> {
    match &definition.address {
        BackendAddress::Serial(path) => detect(SerialTransport::open(path)?),
        BackendAddress::Network(name) => {
            // CUNO/COC transports come from the host framework; the
            // standalone binary has no way to open one.
            log::error!("network-attached interface {name} needs a host-provided transport");
            Err(OneWireError::Unsupported)
        }
        BackendAddress::FirmwarePin(pin) => {
            log::error!("firmware pin {pin} needs a host-provided coprocessor client");
            Err(OneWireError::Unsupported)
        }
    }
}

fn run(
    bus: &mut BusController<SerialMaster<SerialTransport>>,
    command: Command,
) -> Result<(), String> {
    match command {
        Command::Detect => unreachable!("handled before the controller exists"),
        Command::Get {
            what: GetCommand::Alarms,
        } => {
            let alarmed = bus.alarms().map_err(|e| bus.diagnostic("alarms", &e))?;
            for rom in alarmed {
                println!("{rom}");
            }
            Ok(())
        }
        Command::Get {
            what: GetCommand::Devices,
        } => {
            let present = bus.discover().map_err(|e| bus.diagnostic("discover", &e))?;
            for rom in present {
                println!("{rom} {} {}", chip_name(rom.family()), device_name(bus.name(), &rom));
            }
            Ok(())
        }
        Command::Set { what } => {
            let settings = bus.settings();
            match what {
                SetCommand::Interval { seconds } => {
                    bus.set(Duration::from_secs(seconds), settings.follow_alarms);
                }
                SetCommand::FollowAlarms { switch } => {
                    let follow = match switch.as_str() {
                        "on" => true,
                        "off" => false,
                        _ => return Err(format!("bus {}: set: followAlarms wants on|off", bus.name())),
                    };
                    bus.set(settings.kick_interval, follow);
                }
            }
            let settings = bus.settings();
            println!(
                "bus {}: interval {}s followAlarms {}",
                bus.name(),
                settings.kick_interval.as_secs(),
                if settings.follow_alarms { "on" } else { "off" },
            );
            Ok(())
        }
        Command::Watch => {
            bus.discover().map_err(|e| bus.diagnostic("discover", &e))?;
            log::info!("bus {}: watching {} device(s)", bus.name(), bus.devices().len());
            loop {
                if let Some(alarmed) = bus.tick() {
                    for rom in alarmed {
                        println!("{rom}");
                    }
                }
                std::thread::sleep(Duration::from_secs(1));
            }
        }
    }
}

/// The generated host-visible device name.
fn device_name(bus: &str, rom: &RomId) -> String {
    let serial: String = rom
        .serial()
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect();
    format!("{bus}_{:02X}_{serial}", rom.family())
}
