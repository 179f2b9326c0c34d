//! The textual bus definition: `<name> <backend-address> [options]`.

use std::time::Duration;

use onewire_bus::{OneWireError, OneWireResult};

use crate::controller::BusSettings;

/// Which backend a definition selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendAddress {
    /// A host serial device, auto-detected DS2480 with DS9097 fallback.
    Serial(String),
    /// A network-attached host interface speaking the active-master
    /// protocol (CUNO/COC class). The transport is opened by the host.
    Network(String),
    /// A firmware coprocessor pin.
    FirmwarePin(u8),
}

/// A parsed bus definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusDefinition {
    /// The user-visible bus name.
    pub name: String,
    /// Where the bus master lives.
    pub address: BackendAddress,
    /// Policy knobs from the trailing options.
    pub settings: BusSettings,
}

impl BusDefinition {
    /// Parses `<name> <backend-address> [key=value ...]`.
    ///
    /// The address classifies as: a filesystem-style path (or a literal
    /// containing `com`) — serial; a literal containing `CUNO` or `COC`
    /// — network-attached active master; a small integer 0–127 — a
    /// firmware coprocessor pin.
    pub fn parse(definition: &str) -> OneWireResult<Self> {
        let mut words = definition.split_whitespace();
        let name = words.next().ok_or(OneWireError::ProtocolFraming(
            "bus definition needs a name",
        ))?;
        let address = words.next().ok_or(OneWireError::ProtocolFraming(
            "bus definition needs a backend address",
        ))?;
        let mut settings = BusSettings::default();
        for option in words {
            apply_option(&mut settings, option)?;
        }
        Ok(BusDefinition {
            name: name.to_owned(),
            address: classify(address)?,
            settings,
        })
    }
}

fn classify(address: &str) -> OneWireResult<BackendAddress> {
    if address.contains("CUNO") || address.contains("COC") {
        return Ok(BackendAddress::Network(address.to_owned()));
    }
    if let Ok(pin) = address.parse::<u8>() {
        if pin <= 127 {
            return Ok(BackendAddress::FirmwarePin(pin));
        }
        return Err(OneWireError::ProtocolFraming(
            "coprocessor pin out of range",
        ));
    }
    if address.contains('/') || address.to_ascii_lowercase().contains("com") {
        return Ok(BackendAddress::Serial(address.to_owned()));
    }
    Err(OneWireError::ProtocolFraming("unrecognized backend address"))
}

fn apply_option(settings: &mut BusSettings, option: &str) -> OneWireResult<()> {
    let (key, value) = option
        .split_once('=')
        .ok_or(OneWireError::ProtocolFraming("options are key=value"))?;
    match key.to_ascii_lowercase().as_str() {
        "interval" => {
            let seconds: u64 = value
                .parse()
                .map_err(|_| OneWireError::ProtocolFraming("interval wants seconds"))?;
            settings.kick_interval = Duration::from_secs(seconds);
        }
        "followalarms" => settings.follow_alarms = parse_switch(value)?,
        "kick" => settings.kick_enabled = parse_switch(value)?,
        _ => return Err(OneWireError::ProtocolFraming("unknown option")),
    }
    Ok(())
}

fn parse_switch(value: &str) -> OneWireResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        _ => Err(OneWireError::ProtocolFraming("switch wants on|off")),
    }
}
