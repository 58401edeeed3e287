//! Position beacons and telemetry reports.
//!
//! Two fixed-interval timers are checked on every dispatcher iteration; there
//! is no background task. Both start out expired so a fresh gateway
//! announces itself before it gates any traffic.
//!
//! A telemetry report looks like
//!
//! ```text
//! VE3YSH-9>APZIGT,TCPIP*:T#010,147,12,147,094
//!                          │   │   │  │   └ humidity * 2
//!                          │   │   │  └ (sensor temperature + 50) * 2
//!                          │   │   └ CPU load, percent
//!                          │   └ (CPU temperature + 50) * 2
//!                          └ sequence, 000..999
//! ```
//!
//! and every scheduled position beacon is followed by the `PARM`, `UNIT` and
//! `EQNS` messages that let receivers decode those channels.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

use crate::Result;
use crate::config::GatewayConfig;
use crate::sensors::{HumidityReading, SensorSource};
use crate::session::SessionManager;

/// Telemetry sequence numbers wrap at this value.
pub const SEQUENCE_MODULUS: u16 = 1000;

/// Last time each beacon went out; `None` means never, which is always due.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BeaconTimers {
    pub last_position: Option<Instant>,
    pub last_telemetry: Option<Instant>,
}

fn elapsed(last: Option<Instant>, now: Instant, interval: Duration) -> bool {
    match last {
        None => true,
        Some(last) => now.saturating_duration_since(last) >= interval,
    }
}

/// Telemetry sequence counter in `[0, 1000)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetrySequence(u16);

impl TelemetrySequence {
    pub fn new(start: u16) -> Self {
        Self(start % SEQUENCE_MODULUS)
    }

    pub fn value(self) -> u16 {
        self.0
    }

    pub fn advance(&mut self) {
        self.0 = (self.0 + 1) % SEQUENCE_MODULUS;
    }
}

/// Encode a temperature as `(t + 50) * 2`, rounded.
pub fn encode_temperature(celsius: f64) -> u16 {
    encode((celsius + 50.0) * 2.0)
}

/// Encode relative humidity as `h * 2`, rounded.
pub fn encode_humidity(percent: f64) -> u16 {
    encode(percent * 2.0)
}

fn encode(value: f64) -> u16 {
    value.round().clamp(0.0, 999.0) as u16
}

/// One set of readings, ready to be formatted
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryReport {
    pub sequence: u16,
    pub cpu_temperature: f64,
    pub cpu_load_percent: f64,
    pub humidity: HumidityReading,
}

impl TelemetryReport {
    /// The `T#...` body without routing prefix
    pub fn body(&self) -> String {
        format!(
            "T#{:03},{:03},{},{:03},{:03}",
            self.sequence,
            encode_temperature(self.cpu_temperature),
            encode(self.cpu_load_percent),
            encode_temperature(self.humidity.temperature),
            encode_humidity(self.humidity.humidity),
        )
    }
}

/// Decides when beacons are due and sends them through the session
pub struct BeaconScheduler<S> {
    config: Arc<GatewayConfig>,
    sensors: S,
    timers: BeaconTimers,
    sequence: TelemetrySequence,
}

impl<S: SensorSource> BeaconScheduler<S> {
    pub fn new(config: Arc<GatewayConfig>, sensors: S) -> Self {
        let sequence = TelemetrySequence::new(config.telemetry_start_sequence);
        Self { config, sensors, timers: BeaconTimers::default(), sequence }
    }

    pub fn timers(&self) -> BeaconTimers {
        self.timers
    }

    /// Sequence number the next telemetry report will carry
    pub fn sequence(&self) -> u16 {
        self.sequence.value()
    }

    pub fn telemetry_due(&self, now: Instant) -> bool {
        elapsed(self.timers.last_telemetry, now, self.config.telemetry_interval())
    }

    pub fn position_due(&self, now: Instant) -> bool {
        elapsed(self.timers.last_position, now, self.config.beacon_interval())
    }

    /// Send whatever is due: telemetry first, then the position beacon.
    ///
    /// A send failure is returned as-is and the corresponding timer is left
    /// untouched, so the beacon goes out again after the session recovers.
    pub async fn run_due(&mut self, session: &mut SessionManager, now: Instant) -> Result<()> {
        if self.telemetry_due(now) {
            self.send_telemetry(session, now).await?;
        }
        if self.position_due(now) {
            self.send_position(session, now).await?;
        }
        Ok(())
    }

    /// Read the sensors and send one telemetry report.
    pub async fn send_telemetry(&mut self, session: &mut SessionManager, now: Instant) -> Result<()> {
        let cpu_temperature = self.sensors.cpu_temperature()?;
        let cpu_load_percent = self.sensors.cpu_load_percent()?;
        let humidity = self.sensors.humidity()?;
        info!(
            "CPU Temp: {:.1} degC, CPU Load: {:.0}%, Sensor: {:.1} degC {:.0}%",
            cpu_temperature, cpu_load_percent, humidity.temperature, humidity.humidity
        );

        let report = TelemetryReport {
            sequence: self.sequence.value(),
            cpu_temperature,
            cpu_load_percent,
            humidity,
        };
        let packet = format!("{}{}", self.config.routing_prefix(), report.body());

        session.send(&packet).await?;
        info!("{}", packet);

        self.sequence.advance();
        self.timers.last_telemetry = Some(now);
        Ok(())
    }

    /// Send the scheduled position beacon followed by telemetry metadata and
    /// any configured objects.
    pub async fn send_position(&mut self, session: &mut SessionManager, now: Instant) -> Result<()> {
        let position = self.config.position_packet();
        session.send(&position).await?;
        info!("{}", position);
        self.timers.last_position = Some(now);

        for packet in self.config.telemetry_metadata_packets() {
            session.send(&packet).await?;
            info!("{}", packet);
        }
        for packet in self.config.object_packets() {
            session.send(&packet).await?;
            info!("{}", packet);
        }
        Ok(())
    }

    /// Piggyback a position beacon on traffic that was just gated, if one is due.
    ///
    /// This beacon carries the live CPU temperature in its comment and no
    /// telemetry metadata.
    pub async fn after_forward(&mut self, session: &mut SessionManager, now: Instant) -> Result<()> {
        if !self.position_due(now) {
            return Ok(());
        }

        let cpu_temperature = self.sensors.cpu_temperature()?;
        let beacon = format!("{} CPUTemp:{:.1}C", self.config.position_packet(), cpu_temperature);
        session.send(&beacon).await?;
        info!("{}", beacon);

        self.timers.last_position = Some(now);
        Ok(())
    }
}
