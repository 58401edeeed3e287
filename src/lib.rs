//! Receive-only APRS internet gateway.
//!
//! Some radios (the Yaesu FT1D and FTM-400 among them) print every packet
//! they hear on their data port in a text format of their own. This crate
//! turns that output into standard APRS-IS packets and relays them to an
//! APRS-IS server, while beaconing the gateway's own position and telemetry
//! into the same session.
//!
//! # Architecture
//!
//! - [`FrameSource`] yields raw lines from the radio ([`SerialSource`],
//!   [`ReplaySource`]).
//! - [`PacketFramer`] turns a routing line and its payload into a
//!   [`CanonicalPacket`] or a [`DropDecision`].
//! - [`SessionManager`] owns the TCP session and its
//!   `Disconnected → Connected → Authenticated` state machine.
//! - [`BeaconScheduler`] sends position beacons and telemetry on fixed
//!   intervals.
//! - [`Dispatcher`] runs all of the above in one cooperative loop.
//!
//! # Example (dry run from a capture)
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use igate::{ConfiguredSensors, Dispatcher, GatewayConfig, ReplaySource};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> igate::Result<()> {
//!     let config = Arc::new(GatewayConfig::load("igate.yaml")?);
//!     let source = ReplaySource::open("capture.txt")?;
//!     let sensors = ConfiguredSensors::from_config(&config.sensors);
//!
//!     let stats = Dispatcher::new(config, source, sensors, CancellationToken::new()).run().await?;
//!     println!("forwarded {} packets", stats.forwarded);
//!     Ok(())
//! }
//! ```

pub mod beacon;
pub mod config;
pub mod dispatcher;
mod error;
pub mod framer;
pub mod sensors;
pub mod session;
pub mod source;
pub mod sources;
pub mod types;

// Core exports
pub use error::*;
pub use types::*;

// Main API exports
pub use beacon::{BeaconScheduler, BeaconTimers, TelemetryReport, TelemetrySequence};
pub use config::GatewayConfig;
pub use dispatcher::{DispatchStats, Dispatcher};
pub use framer::PacketFramer;
pub use sensors::{ConfiguredSensors, FixedSensors, HostSensors, HumidityReading, SensorSource};
pub use session::{SessionManager, SessionState};
pub use source::FrameSource;
pub use sources::{ReplaySource, SerialSource};
