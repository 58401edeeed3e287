//! Dispatcher drives the gateway loop
//!
//! One cooperative loop owns every resource: the session, the frame source
//! and the beacon scheduler. Each iteration looks at the session state and
//! performs exactly one step of work for it. Cancellation is checked at the
//! top of every iteration and raced against every wait, and all exits go
//! through [`Dispatcher::shutdown`].

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::beacon::BeaconScheduler;
use crate::config::GatewayConfig;
use crate::framer::PacketFramer;
use crate::sensors::SensorSource;
use crate::session::{SessionManager, SessionState};
use crate::source::FrameSource;
use crate::types::{FramerOutcome, RawFrame};
use crate::{GatewayError, Result};

/// Pause after closing everything, to let the socket close reach the server.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Counters kept across the life of the loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Radio packets forwarded upstream
    pub forwarded: u64,
    /// Radio packets dropped by a gating rule
    pub dropped: u64,
    /// Lines that were neither routing headers nor consumed as payloads
    pub skipped: u64,
    /// Session resets after transport failures
    pub resets: u64,
}

/// What a single iteration decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Keep looping with this state
    Continue(SessionState),
    /// Cancellation observed
    Cancelled,
}

/// Single-threaded gateway loop
pub struct Dispatcher<F, S> {
    config: Arc<GatewayConfig>,
    session: SessionManager,
    source: F,
    scheduler: BeaconScheduler<S>,
    framer: PacketFramer,
    cancel: CancellationToken,
    shutdown_grace: Duration,
    stats: DispatchStats,
}

impl<F, S> Dispatcher<F, S>
where
    F: FrameSource,
    S: SensorSource,
{
    pub fn new(config: Arc<GatewayConfig>, source: F, sensors: S, cancel: CancellationToken) -> Self {
        Self {
            session: SessionManager::new(Arc::clone(&config)),
            scheduler: BeaconScheduler::new(Arc::clone(&config), sensors),
            framer: PacketFramer::new(&config.callsign),
            config,
            source,
            cancel,
            shutdown_grace: SHUTDOWN_GRACE,
            stats: DispatchStats::default(),
        }
    }

    /// Override the pause taken after closing resources
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Run until cancelled or a fatal error occurs.
    ///
    /// Returns `Ok(stats)` after a cancellation and the fatal error otherwise.
    /// Either way the socket and the frame source are closed first.
    pub async fn run(mut self) -> Result<DispatchStats> {
        info!(
            callsign = %self.config.callsign,
            server = %self.config.server.address(),
            source = %self.source.describe(),
            "Gateway starting"
        );

        let mut state = self.session.state();
        let outcome = loop {
            match self.tick(state).await {
                Ok(Step::Continue(next)) => {
                    if next != state {
                        debug!("Session {} -> {}", state, next);
                    }
                    state = next;
                }
                Ok(Step::Cancelled) => {
                    info!(">>> Shutdown requested, exiting...");
                    break Ok(());
                }
                Err(e) => {
                    error!(">>> Fatal: {}", e);
                    break Err(e);
                }
            }
        };

        self.shutdown().await;
        info!(
            forwarded = self.stats.forwarded,
            dropped = self.stats.dropped,
            resets = self.stats.resets,
            "Gateway stopped"
        );
        outcome.map(|()| self.stats)
    }

    /// One iteration for the given state.
    ///
    /// Only fatal errors escape; transport failures are handled here by
    /// resetting the session and backing off.
    async fn tick(&mut self, state: SessionState) -> Result<Step> {
        if self.cancel.is_cancelled() {
            return Ok(Step::Cancelled);
        }

        let result = match state {
            SessionState::Disconnected => self.session.connect().await,
            SessionState::Connected => self.session.authenticate().await,
            SessionState::Authenticated => self.pump().await,
        };

        match result {
            Ok(()) => Ok(Step::Continue(self.session.state())),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(">>> {}{}", e, source_suffix(&e));
                self.recover().await
            }
        }
    }

    /// Authenticated work: beacons, then at most one radio packet.
    async fn pump(&mut self) -> Result<()> {
        self.session.drain_inbound()?;
        self.scheduler.run_due(&mut self.session, Instant::now()).await?;

        let Some(line) = self.read_line().await? else {
            return Ok(());
        };
        if !line.is_routing() {
            if !line.is_empty() {
                self.stats.skipped += 1;
                debug!("Skipping non-routing line: {}", line.text);
            }
            return Ok(());
        }

        // The payload is whatever comes next; a timeout is an empty payload.
        let payload = self.read_line().await?.map(|frame| frame.text).unwrap_or_default();
        if self.cancel.is_cancelled() {
            return Ok(());
        }

        match self.framer.frame(&line.text, &payload) {
            FramerOutcome::Drop(decision) => {
                self.stats.dropped += 1;
                info!(">>> {}", decision);
                Ok(())
            }
            FramerOutcome::Forward(packet) => {
                let text = packet.to_string();
                info!("[0.0] {}", text);
                self.session.send(&text).await?;
                self.stats.forwarded += 1;
                self.scheduler.after_forward(&mut self.session, Instant::now()).await
            }
        }
    }

    /// Read one line from the source, giving up early on cancellation.
    async fn read_line(&mut self) -> Result<Option<RawFrame>> {
        tokio::select! {
            _ = self.cancel.cancelled() => Ok(None),
            line = self.source.next_line() => line,
        }
    }

    /// Reset the session and wait out the fixed reconnect delay.
    async fn recover(&mut self) -> Result<Step> {
        self.session.reset().await;
        self.stats.resets += 1;

        let delay = self.config.reconnect_delay();
        debug!("Retrying in {:?}", delay);
        tokio::select! {
            _ = self.cancel.cancelled() => Ok(Step::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(Step::Continue(self.session.state())),
        }
    }

    /// Release the socket and the frame source, then pause briefly.
    async fn shutdown(&mut self) {
        self.session.reset().await;
        if let Err(e) = self.source.close().await {
            warn!(">>> FAILED to close {}: {}", self.source.describe(), e);
        }
        tokio::time::sleep(self.shutdown_grace).await;
    }
}

fn source_suffix(e: &GatewayError) -> String {
    match std::error::Error::source(e) {
        Some(source) => format!(": {source}"),
        None => String::new(),
    }
}
