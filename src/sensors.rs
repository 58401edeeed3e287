//! Host sensor readings used in telemetry reports.
//!
//! The gateway reports CPU temperature, CPU load and an external
//! humidity/temperature sensor. [`HostSensors`] reads them from Linux sysfs
//! and procfs; [`FixedSensors`] returns constant values for hosts without the
//! hardware and for tests. [`ConfiguredSensors`] picks one of the two from
//! the `sensors.kind` setting.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::{FixedReadings, SensorConfig, SensorKind};
use crate::{GatewayError, Result};

/// One humidity sensor sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HumidityReading {
    /// Relative humidity in percent
    pub humidity: f64,
    /// Temperature in degrees Celsius
    pub temperature: f64,
}

/// Source of the readings that go into a telemetry report
pub trait SensorSource: Send {
    /// CPU temperature in degrees Celsius
    fn cpu_temperature(&mut self) -> Result<f64>;

    /// One-minute load average as a percentage of available cores
    fn cpu_load_percent(&mut self) -> Result<f64>;

    fn humidity(&mut self) -> Result<HumidityReading>;
}

/// Sensors read from the local Linux host
#[derive(Debug, Clone)]
pub struct HostSensors {
    thermal_zone: PathBuf,
    loadavg: PathBuf,
    humidity_device: PathBuf,
    cores: usize,
}

impl HostSensors {
    pub fn new(config: &SensorConfig) -> Self {
        let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self {
            thermal_zone: config.thermal_zone.clone(),
            loadavg: config.loadavg.clone(),
            humidity_device: config.humidity_device.clone(),
            cores,
        }
    }
}

fn read_trimmed(sensor: &str, path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|e| GatewayError::sensor(format!("{sensor} ({})", path.display()), e))
}

fn parse_number(sensor: &str, text: &str) -> Result<f64> {
    text.parse::<f64>()
        .map_err(|e| GatewayError::sensor(format!("{sensor} value {text:?}"), e))
}

/// Read a sysfs value reported in thousandths.
fn read_milli(sensor: &str, path: &Path) -> Result<f64> {
    let text = read_trimmed(sensor, path)?;
    Ok(parse_number(sensor, &text)? / 1000.0)
}

/// First field of `/proc/loadavg` scaled to a percentage of `cores`.
pub fn load_percent(loadavg: &str, cores: usize) -> Result<f64> {
    let one_minute = loadavg
        .split_whitespace()
        .next()
        .ok_or_else(|| GatewayError::sensor("cpu load", "empty loadavg"))?;
    Ok(parse_number("cpu load", one_minute)? / cores.max(1) as f64 * 100.0)
}

impl SensorSource for HostSensors {
    fn cpu_temperature(&mut self) -> Result<f64> {
        read_milli("cpu temperature", &self.thermal_zone)
    }

    fn cpu_load_percent(&mut self) -> Result<f64> {
        let text = read_trimmed("cpu load", &self.loadavg)?;
        load_percent(&text, self.cores)
    }

    fn humidity(&mut self) -> Result<HumidityReading> {
        let humidity =
            read_milli("humidity", &self.humidity_device.join("in_humidityrelative_input"))?;
        let temperature =
            read_milli("humidity sensor temperature", &self.humidity_device.join("in_temp_input"))?;
        debug!("Humidity sensor: {:.1} degC, {:.0}%", temperature, humidity);
        Ok(HumidityReading { humidity, temperature })
    }
}

/// Constant readings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedSensors {
    pub cpu_temperature: f64,
    pub cpu_load_percent: f64,
    pub humidity: HumidityReading,
}

impl From<&FixedReadings> for FixedSensors {
    fn from(readings: &FixedReadings) -> Self {
        Self {
            cpu_temperature: readings.cpu_temperature,
            cpu_load_percent: readings.cpu_load_percent,
            humidity: HumidityReading {
                humidity: readings.humidity,
                temperature: readings.temperature,
            },
        }
    }
}

impl SensorSource for FixedSensors {
    fn cpu_temperature(&mut self) -> Result<f64> {
        Ok(self.cpu_temperature)
    }

    fn cpu_load_percent(&mut self) -> Result<f64> {
        Ok(self.cpu_load_percent)
    }

    fn humidity(&mut self) -> Result<HumidityReading> {
        Ok(self.humidity)
    }
}

/// Host or fixed sensors, as selected in [`SensorConfig`]
#[derive(Debug, Clone)]
pub enum ConfiguredSensors {
    Host(HostSensors),
    Fixed(FixedSensors),
}

impl ConfiguredSensors {
    pub fn from_config(config: &SensorConfig) -> Self {
        match config.kind {
            SensorKind::Host => {
                info!(
                    thermal_zone = %config.thermal_zone.display(),
                    humidity_device = %config.humidity_device.display(),
                    "Using host sensors"
                );
                Self::Host(HostSensors::new(config))
            }
            SensorKind::Fixed => {
                info!("Using fixed sensor readings: {:?}", config.fixed);
                Self::Fixed(FixedSensors::from(&config.fixed))
            }
        }
    }
}

impl SensorSource for ConfiguredSensors {
    fn cpu_temperature(&mut self) -> Result<f64> {
        match self {
            Self::Host(sensors) => sensors.cpu_temperature(),
            Self::Fixed(sensors) => sensors.cpu_temperature(),
        }
    }

    fn cpu_load_percent(&mut self) -> Result<f64> {
        match self {
            Self::Host(sensors) => sensors.cpu_load_percent(),
            Self::Fixed(sensors) => sensors.cpu_load_percent(),
        }
    }

    fn humidity(&mut self) -> Result<HumidityReading> {
        match self {
            Self::Host(sensors) => sensors.humidity(),
            Self::Fixed(sensors) => sensors.humidity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn host_sensors(dir: &Path) -> HostSensors {
        let iio = dir.join("iio:device0");
        fs::create_dir_all(&iio).unwrap();
        fs::write(dir.join("temp"), "48312\n").unwrap();
        fs::write(dir.join("loadavg"), "0.48 0.52 0.60 1/230 4242\n").unwrap();
        fs::write(iio.join("in_humidityrelative_input"), "47000\n").unwrap();
        fs::write(iio.join("in_temp_input"), "23400\n").unwrap();

        let config = SensorConfig {
            thermal_zone: dir.join("temp"),
            loadavg: dir.join("loadavg"),
            humidity_device: iio,
            ..SensorConfig::default()
        };
        let mut sensors = HostSensors::new(&config);
        sensors.cores = 4;
        sensors
    }

    #[test]
    fn reads_host_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut sensors = host_sensors(dir.path());

        assert!((sensors.cpu_temperature().unwrap() - 48.312).abs() < 1e-9);
        assert!((sensors.cpu_load_percent().unwrap() - 12.0).abs() < 1e-9);

        let reading = sensors.humidity().unwrap();
        assert!((reading.humidity - 47.0).abs() < 1e-9);
        assert!((reading.temperature - 23.4).abs() < 1e-9);
    }

    #[test]
    fn missing_sensor_is_a_sensor_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut sensors = host_sensors(dir.path());
        fs::remove_file(dir.path().join("temp")).unwrap();

        let err = sensors.cpu_temperature().unwrap_err();
        assert!(matches!(err, GatewayError::Sensor { .. }));
        assert!(err.to_string().contains("cpu temperature"));
    }

    #[test]
    fn garbage_values_are_rejected() {
        assert!(load_percent("", 4).is_err());
        assert!(load_percent("busy 1 2", 4).is_err());
        assert!((load_percent("2.00 1.00 0.50 1/1 1", 0).unwrap() - 200.0).abs() < 1e-9);
    }

    #[test]
    fn fixed_kind_needs_no_hardware() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SensorConfig {
            thermal_zone: dir.path().join("missing"),
            loadavg: dir.path().join("missing"),
            humidity_device: dir.path().join("missing"),
            ..SensorConfig::default()
        };

        let mut host = ConfiguredSensors::from_config(&config);
        assert!(matches!(host, ConfiguredSensors::Host(_)));
        let err = host.humidity().unwrap_err();
        assert!(err.is_fatal());

        config.kind = SensorKind::Fixed;
        config.fixed = FixedReadings {
            cpu_temperature: 41.0,
            cpu_load_percent: 7.0,
            temperature: -3.5,
            humidity: 81.0,
        };
        let mut fixed = ConfiguredSensors::from_config(&config);
        assert!(matches!(fixed, ConfiguredSensors::Fixed(_)));
        assert_eq!(fixed.cpu_temperature().unwrap(), 41.0);
        assert_eq!(fixed.cpu_load_percent().unwrap(), 7.0);
        assert_eq!(fixed.humidity().unwrap(), HumidityReading { humidity: 81.0, temperature: -3.5 });
    }
}
