//! Shared helpers for gateway integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use igate::{FixedSensors, GatewayConfig, HumidityReading};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

pub const CALLSIGN: &str = "VE3YSH-9";
pub const VERIFIED: &str = "# logresp VE3YSH-9 verified, server T2TEST";
pub const UNVERIFIED: &str = "# logresp VE3YSH-9 unverified, server T2TEST";

/// Something the fake server observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// A client connected and sent its login line
    Login { connection: usize, line: String },
    /// A line received after login, terminator stripped
    Line { connection: usize, line: String },
    /// The client closed, or the server hung up
    Closed { connection: usize },
}

/// In-process APRS-IS server on loopback
pub struct FakeServer {
    pub addr: SocketAddr,
    events: mpsc::UnboundedReceiver<ServerEvent>,
}

impl FakeServer {
    /// Answer every login with `verdict`. If `hangup_after` is set, the first
    /// connection is closed by the server after that many packet lines.
    pub async fn start(verdict: &'static str, hangup_after: Option<usize>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fake server");
        let addr = listener.local_addr().expect("local addr");
        let (tx, events) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut connection = 0usize;
            while let Ok((stream, _)) = listener.accept().await {
                connection += 1;
                let tx = tx.clone();
                let limit = if connection == 1 { hangup_after } else { None };
                tokio::spawn(async move {
                    let (read, mut write) = stream.into_split();
                    let mut reader = BufReader::new(read);

                    let mut login = String::new();
                    if reader.read_line(&mut login).await.unwrap_or(0) == 0 {
                        let _ = tx.send(ServerEvent::Closed { connection });
                        return;
                    }
                    let _ = tx.send(ServerEvent::Login {
                        connection,
                        line: login.trim_end().to_string(),
                    });
                    let greeting = format!("# aprsc 2.1.14-g5e22b37\r\n{verdict}\r\n");
                    let _ = write.write_all(greeting.as_bytes()).await;

                    let mut received = 0usize;
                    loop {
                        if limit == Some(received) {
                            break;
                        }
                        let mut line = String::new();
                        match reader.read_line(&mut line).await {
                            Ok(0) | Err(_) => break,
                            Ok(_) => {
                                received += 1;
                                let line = line.trim_end_matches(['\r', '\n']).to_string();
                                let _ = tx.send(ServerEvent::Line { connection, line });
                            }
                        }
                    }
                    let _ = tx.send(ServerEvent::Closed { connection });
                });
            }
        });

        Self { addr, events }
    }

    /// Next event, failing the test if none arrives in time
    pub async fn next_event(&mut self) -> ServerEvent {
        tokio::time::timeout(Duration::from_secs(10), self.events.recv())
            .await
            .expect("timed out waiting for the gateway")
            .expect("fake server stopped")
    }

    /// Next event if one arrives within `wait`
    pub async fn try_next_event(&mut self, wait: Duration) -> Option<ServerEvent> {
        tokio::time::timeout(wait, self.events.recv()).await.ok().flatten()
    }

    /// Collect packet lines (skipping logins) until `count` have arrived
    pub async fn lines(&mut self, count: usize) -> Vec<(usize, String)> {
        let mut lines = Vec::with_capacity(count);
        while lines.len() < count {
            if let ServerEvent::Line { connection, line } = self.next_event().await {
                lines.push((connection, line));
            }
        }
        lines
    }
}

pub fn config_for(server: &FakeServer) -> Arc<GatewayConfig> {
    let mut config = GatewayConfig::new(CALLSIGN, "17846", "4448.72N", "07559.15W");
    config.comment = "igate test".to_string();
    config.server.host = server.addr.ip().to_string();
    config.server.port = server.addr.port();
    config.reconnect_delay_secs = 0;
    config.telemetry_start_sequence = 10;
    Arc::new(config)
}

pub fn sensors() -> FixedSensors {
    FixedSensors {
        cpu_temperature: 23.4,
        cpu_load_percent: 12.0,
        humidity: HumidityReading { humidity: 47.0, temperature: 23.4 },
    }
}

/// Telemetry, position and the three metadata lines a fresh gateway sends first
pub fn startup_beacons(config: &GatewayConfig) -> Vec<String> {
    let mut lines = vec![
        format!("{}T#010,147,12,147,094", config.routing_prefix()),
        config.position_packet(),
    ];
    lines.extend(config.telemetry_metadata_packets());
    lines
}
