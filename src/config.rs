//! Gateway configuration.
//!
//! Everything the gateway needs to know about itself is read once from a YAML
//! file at startup and shared read-only afterwards. Only the station identity
//! (`callsign`, `passcode`, `latitude`, `longitude`) is mandatory; every other
//! field has a working default.
//!
//! ```yaml
//! callsign: VE3YSH-9
//! passcode: "17846"
//! latitude: 4448.72N
//! longitude: 07559.15W
//! comment: Yaesu igate
//! server:
//!   host: noam.aprs2.net
//! serial:
//!   device: /dev/ttyUSB0
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{GatewayError, Result};

/// Client identifier sent in the login line.
pub const CLIENT_ID: &str = "igate";

/// Client version sent in the login line.
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Telemetry parameter names, in report order.
pub const TELEMETRY_PARAMETERS: &str = "PARM.CPU,Load,Temp,RH";

/// Telemetry parameter units, in report order.
pub const TELEMETRY_UNITS: &str = "UNIT.degC,%,degC,%";

/// Telemetry equation coefficients `a,b,c` per channel (`a*x^2 + b*x + c`).
///
/// Temperatures are reported as `(t + 50) * 2`, load as a plain percentage and
/// humidity as `h * 2`.
pub const TELEMETRY_EQUATIONS: &str = "EQNS.0,0.5,-50,0,1,0,0,0.5,-50,0,0.5,0";

/// Top-level gateway configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Station callsign with optional SSID, e.g. `VE3YSH-9`.
    pub callsign: String,

    /// APRS-IS passcode for the callsign.
    pub passcode: String,

    /// Latitude in APRS `DDMM.mmN` form.
    pub latitude: String,

    /// Longitude in APRS `DDDMM.mmW` form.
    pub longitude: String,

    /// Symbol table identifier or overlay character.
    #[serde(default = "defaults::symbol_table")]
    pub symbol_table: char,

    /// Symbol code within the table.
    #[serde(default = "defaults::symbol")]
    pub symbol: char,

    /// Free-text beacon comment.
    #[serde(default)]
    pub comment: String,

    /// Destination field identifying this software.
    #[serde(default = "defaults::tocall")]
    pub tocall: String,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub sensors: SensorConfig,

    /// Seconds between scheduled position beacons.
    #[serde(default = "defaults::beacon_interval_secs")]
    pub beacon_interval_secs: u64,

    /// Seconds between telemetry reports.
    #[serde(default = "defaults::telemetry_interval_secs")]
    pub telemetry_interval_secs: u64,

    /// Fixed delay before reconnecting after a transport failure.
    #[serde(default = "defaults::reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,

    /// Sequence number used by the first telemetry report.
    #[serde(default)]
    pub telemetry_start_sequence: u16,

    /// Additional objects beaconed after every scheduled position beacon.
    #[serde(default)]
    pub objects: Vec<ObjectBeacon>,
}

/// APRS-IS server endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Socket send buffer size in bytes.
    pub send_buffer_size: u32,
    /// Longest wait for the banner and verdict after sending the login line.
    pub login_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "noam.aprs2.net".to_string(),
            port: 14580,
            send_buffer_size: 512,
            login_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    /// `host:port` form used for resolution and logging.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }
}

/// Serial link to the radio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub device: String,
    pub baud_rate: u32,
    /// Upper bound on a single line read.
    pub read_timeout_secs: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self { device: "/dev/ttyUSB0".to_string(), baud_rate: 9600, read_timeout_secs: 10 }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

/// Which sensors feed telemetry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    /// Linux sysfs, procfs and IIO files
    #[default]
    Host,
    /// The constant `fixed` readings, for hosts without the hardware
    Fixed,
}

/// Constant readings reported with `kind: fixed`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixedReadings {
    pub cpu_temperature: f64,
    pub cpu_load_percent: f64,
    /// Sensor temperature in degrees Celsius.
    pub temperature: f64,
    /// Relative humidity in percent.
    pub humidity: f64,
}

impl Default for FixedReadings {
    fn default() -> Self {
        Self { cpu_temperature: 20.0, cpu_load_percent: 0.0, temperature: 20.0, humidity: 50.0 }
    }
}

/// Where telemetry readings come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub kind: SensorKind,
    /// Used only with `kind: fixed`.
    pub fixed: FixedReadings,
    /// Thermal zone reporting CPU temperature in millidegrees.
    pub thermal_zone: PathBuf,
    /// Load average file.
    pub loadavg: PathBuf,
    /// IIO device directory of the humidity/temperature sensor (DHT22 via
    /// the `dht11` kernel driver).
    pub humidity_device: PathBuf,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            kind: SensorKind::Host,
            fixed: FixedReadings::default(),
            thermal_zone: PathBuf::from("/sys/class/thermal/thermal_zone0/temp"),
            loadavg: PathBuf::from("/proc/loadavg"),
            humidity_device: PathBuf::from("/sys/bus/iio/devices/iio:device0"),
        }
    }
}

/// A fixed object (repeater, club station) beaconed on the gateway's behalf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectBeacon {
    /// Source callsign the object is reported under.
    pub name: String,
    pub latitude: String,
    #[serde(default = "defaults::object_symbol_table")]
    pub symbol_table: char,
    pub longitude: String,
    #[serde(default = "defaults::symbol")]
    pub symbol: char,
    #[serde(default)]
    pub comment: String,
}

mod defaults {
    pub fn symbol_table() -> char {
        'R'
    }

    pub fn object_symbol_table() -> char {
        'D'
    }

    pub fn symbol() -> char {
        '&'
    }

    pub fn tocall() -> String {
        "APZIGT".to_string()
    }

    pub fn beacon_interval_secs() -> u64 {
        1800
    }

    pub fn telemetry_interval_secs() -> u64 {
        300
    }

    pub fn reconnect_delay_secs() -> u64 {
        5
    }
}

impl GatewayConfig {
    /// Minimal configuration with defaults for everything but identity.
    pub fn new(
        callsign: impl Into<String>,
        passcode: impl Into<String>,
        latitude: impl Into<String>,
        longitude: impl Into<String>,
    ) -> Self {
        Self {
            callsign: callsign.into(),
            passcode: passcode.into(),
            latitude: latitude.into(),
            longitude: longitude.into(),
            symbol_table: defaults::symbol_table(),
            symbol: defaults::symbol(),
            comment: String::new(),
            tocall: defaults::tocall(),
            server: ServerConfig::default(),
            serial: SerialConfig::default(),
            sensors: SensorConfig::default(),
            beacon_interval_secs: defaults::beacon_interval_secs(),
            telemetry_interval_secs: defaults::telemetry_interval_secs(),
            reconnect_delay_secs: defaults::reconnect_delay_secs(),
            telemetry_start_sequence: 0,
            objects: Vec::new(),
        }
    }

    /// Load and validate a YAML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| GatewayError::config(path, format!("cannot read file: {e}")))?;
        let config = Self::parse(&text).map_err(|e| match e {
            GatewayError::Config { details, .. } => GatewayError::config(path, details),
            other => other,
        })?;
        debug!(path = %path.display(), callsign = %config.callsign, "Loaded configuration");
        Ok(config)
    }

    /// Parse and validate configuration from YAML text.
    pub fn parse(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)
            .map_err(|e| GatewayError::config("<inline>", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the gateway cannot operate with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |details: &str| Err(GatewayError::config("<inline>", details));

        if self.callsign.trim().is_empty() {
            return invalid("callsign is empty");
        }
        if self.callsign.contains(char::is_whitespace) {
            return invalid("callsign contains whitespace");
        }
        if self.callsign.len() > 9 {
            return invalid("callsign longer than 9 characters");
        }
        if self.passcode.is_empty() || !self.passcode.chars().all(|c| c.is_ascii_digit() || c == '-')
        {
            return invalid("passcode must be numeric");
        }
        if self.latitude.is_empty() || self.longitude.is_empty() {
            return invalid("latitude and longitude are required");
        }
        if self.tocall.is_empty() {
            return invalid("tocall is empty");
        }
        if self.server.host.is_empty() {
            return invalid("server host is empty");
        }
        if self.beacon_interval_secs == 0 || self.telemetry_interval_secs == 0 {
            return invalid("beacon and telemetry intervals must be positive");
        }
        if self.serial.read_timeout_secs == 0 {
            return invalid("serial read timeout must be positive");
        }
        let fixed = &self.sensors.fixed;
        if ![fixed.cpu_temperature, fixed.cpu_load_percent, fixed.temperature, fixed.humidity]
            .iter()
            .all(|v| v.is_finite())
        {
            return invalid("fixed sensor readings must be finite numbers");
        }
        if self.server.login_timeout_secs == 0 {
            return invalid("login timeout must be positive");
        }
        if self.telemetry_start_sequence >= 1000 {
            return invalid("telemetry_start_sequence must be below 1000");
        }
        Ok(())
    }

    pub fn beacon_interval(&self) -> Duration {
        Duration::from_secs(self.beacon_interval_secs)
    }

    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_secs(self.telemetry_interval_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    /// Login line, newline terminated.
    pub fn login_line(&self) -> String {
        format!("user {} pass {} vers {} {}\n", self.callsign, self.passcode, CLIENT_ID, CLIENT_VERSION)
    }

    /// `<callsign>><tocall>,TCPIP*:` prefix used for all locally originated packets.
    pub fn routing_prefix(&self) -> String {
        format!("{}>{},TCPIP*:", self.callsign, self.tocall)
    }

    /// The station position packet.
    pub fn position_packet(&self) -> String {
        format!(
            "{}!{}{}{}{}{}",
            self.routing_prefix(),
            self.latitude,
            self.symbol_table,
            self.longitude,
            self.symbol,
            self.comment
        )
    }

    /// The three telemetry metadata packets: names, units, equations.
    pub fn telemetry_metadata_packets(&self) -> [String; 3] {
        let prefix = self.routing_prefix();
        let addressee = format!(":{:<9}:", self.callsign);
        [TELEMETRY_PARAMETERS, TELEMETRY_UNITS, TELEMETRY_EQUATIONS]
            .map(|body| format!("{prefix}{addressee}{body}"))
    }

    /// Position packets for the configured objects.
    pub fn object_packets(&self) -> Vec<String> {
        self.objects
            .iter()
            .map(|object| {
                format!(
                    "{}>{},TCPIP*:!{}{}{}{}{}",
                    object.name,
                    self.tocall,
                    object.latitude,
                    object.symbol_table,
                    object.longitude,
                    object.symbol,
                    object.comment
                )
            })
            .collect()
    }
}
