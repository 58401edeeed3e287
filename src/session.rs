//! APRS-IS session management.
//!
//! [`SessionManager`] owns the single upstream TCP connection and walks it
//! through three states:
//!
//! ```text
//!   Disconnected ──connect()──► Connected ──authenticate()──► Authenticated
//!        ▲                          │                              │
//!        └──────── reset() ─────────┴──────── reset() ─────────────┘
//! ```
//!
//! The socket lives inside the state, so [`SessionManager::send`] cannot
//! write anything before the server has verified the login. A login the
//! server does not verify is reported as
//! [`GatewayError::LoginRejected`]; everything else that goes wrong on the
//! wire is a retryable transport error and the caller resets the session.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpSocket, TcpStream, lookup_host};
use tracing::{debug, error, info, trace, warn};

use crate::config::GatewayConfig;
use crate::{GatewayError, Result};

/// Session state as seen by the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    Authenticated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "Disconnected",
            SessionState::Connected => "Connected",
            SessionState::Authenticated => "Authenticated",
        };
        f.write_str(name)
    }
}

/// An open connection to the server
struct Link {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    peer: SocketAddr,
}

impl Link {
    fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        let (read, write) = stream.into_split();
        Self { reader: BufReader::new(read), writer: write, peer }
    }

    async fn write_text(&mut self, text: &str) -> std::io::Result<()> {
        self.writer.write_all(text.as_bytes()).await?;
        self.writer.flush().await
    }

    async fn read_text_line(&mut self) -> std::io::Result<String> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "server closed the connection",
            ));
        }
        Ok(line.trim().to_string())
    }

    async fn shutdown(mut self) {
        if let Err(e) = self.writer.shutdown().await {
            warn!(">>> FAILED to close socket to {}: {}", self.peer, e);
        }
    }
}

/// Connection plus its position in the session state machine
enum Phase {
    Disconnected,
    Connected(Link),
    Authenticated(Link),
}

/// True if the login verdict line verifies the credentials.
///
/// Matches the word `verified` on its own, so `unverified` is a rejection.
pub fn verdict_accepts(verdict: &str) -> bool {
    verdict.split(|c: char| c.is_whitespace() || c == ',').any(|word| word == "verified")
}

async fn open_stream(addr: SocketAddr, send_buffer_size: u32) -> std::io::Result<TcpStream> {
    let socket = if addr.is_ipv4() { TcpSocket::new_v4()? } else { TcpSocket::new_v6()? };
    socket.set_send_buffer_size(send_buffer_size)?;
    let stream = socket.connect(addr).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Owner of the upstream APRS-IS connection
pub struct SessionManager {
    config: Arc<GatewayConfig>,
    phase: Phase,
    packets_sent: u64,
}

impl SessionManager {
    pub fn new(config: Arc<GatewayConfig>) -> Self {
        Self { config, phase: Phase::Disconnected, packets_sent: 0 }
    }

    pub fn state(&self) -> SessionState {
        match self.phase {
            Phase::Disconnected => SessionState::Disconnected,
            Phase::Connected(_) => SessionState::Connected,
            Phase::Authenticated(_) => SessionState::Authenticated,
        }
    }

    /// Address of the connected server, if any
    pub fn peer(&self) -> Option<SocketAddr> {
        match &self.phase {
            Phase::Disconnected => None,
            Phase::Connected(link) | Phase::Authenticated(link) => Some(link.peer),
        }
    }

    /// Packets written since this manager was created
    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }

    /// Open a fresh connection: `Disconnected → Connected`.
    ///
    /// Every resolved address is tried in turn. On failure the session stays
    /// `Disconnected`. Calling this in any other state does nothing.
    pub async fn connect(&mut self) -> Result<()> {
        if !matches!(self.phase, Phase::Disconnected) {
            debug!("connect() called while {}, ignoring", self.state());
            return Ok(());
        }

        let target = self.config.server.address();
        let addrs = lookup_host(&target)
            .await
            .map_err(|e| GatewayError::connection_failed_with_source(&target, e))?;

        let mut last_error = None;
        for addr in addrs {
            match open_stream(addr, self.config.server.send_buffer_size).await {
                Ok(stream) => {
                    info!(server = %target, peer = %addr, "Connected to APRS-IS");
                    self.phase = Phase::Connected(Link::new(stream, addr));
                    return Ok(());
                }
                Err(e) => {
                    debug!(peer = %addr, "Connect attempt failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        Err(GatewayError::Connection { target, source: last_error })
    }

    /// Log in: `Connected → Authenticated`.
    ///
    /// Sends the login line and reads exactly two lines back, the server
    /// banner and the login verdict. Both must arrive within
    /// `server.login_timeout_secs` so a server that accepts the connection
    /// but never answers cannot stall the gateway; set it high to rely on
    /// the OS socket timeouts instead.
    ///
    /// Transport failures and timeouts leave the session `Disconnected` and
    /// are retryable. An unverified login closes the connection and returns
    /// [`GatewayError::LoginRejected`].
    pub async fn authenticate(&mut self) -> Result<()> {
        let mut link = match std::mem::replace(&mut self.phase, Phase::Disconnected) {
            Phase::Connected(link) => link,
            Phase::Authenticated(link) => {
                self.phase = Phase::Authenticated(link);
                return Ok(());
            }
            Phase::Disconnected => {
                return Err(GatewayError::transport(
                    "login",
                    std::io::Error::new(std::io::ErrorKind::NotConnected, "no connection"),
                ));
            }
        };

        let login_timeout = self.config.server.login_timeout();
        let verdict = match tokio::time::timeout(login_timeout, Self::login(&mut link, &self.config)).await {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(e)) => {
                warn!(">>> FAILED login to {}: {}", link.peer, e);
                link.shutdown().await;
                return Err(GatewayError::transport("login", e));
            }
            Err(_) => {
                warn!(">>> FAILED login to {}: no verdict after {:?}", link.peer, login_timeout);
                link.shutdown().await;
                return Err(GatewayError::Timeout { duration: login_timeout });
            }
        };

        if verdict_accepts(&verdict) {
            info!("Login SUCCESS as {}", self.config.callsign);
            self.phase = Phase::Authenticated(link);
            Ok(())
        } else {
            error!(">>> Login FAILURE: {}", verdict);
            link.shutdown().await;
            Err(GatewayError::login_rejected(verdict))
        }
    }

    async fn login(link: &mut Link, config: &GatewayConfig) -> std::io::Result<String> {
        link.write_text(&config.login_line()).await?;

        let banner = link.read_text_line().await?;
        info!("{}", banner);
        let verdict = link.read_text_line().await?;
        info!("{}", verdict);

        Ok(verdict)
    }

    /// Write one packet line, CRLF terminated.
    ///
    /// Only allowed while `Authenticated`; any other state is refused without
    /// touching the socket. A write failure is a retryable transport error
    /// and the caller is expected to [`reset`](Self::reset).
    pub async fn send(&mut self, line: &str) -> Result<()> {
        let state = self.state();
        let Phase::Authenticated(link) = &mut self.phase else {
            return Err(GatewayError::NotAuthenticated { state: state.to_string() });
        };

        let wire = format!("{line}\r\n");
        if let Err(e) = link.write_text(&wire).await {
            warn!(">>> FAILED send {}: {}", line, e);
            return Err(GatewayError::transport("send", e));
        }

        self.packets_sent += 1;
        trace!("Sent {}", line);
        Ok(())
    }

    /// Discard whatever the server has sent since the last call.
    ///
    /// APRS-IS servers push keepalive comments to a receive-only client.
    /// Reading them keeps the receive window open and notices a server that
    /// has closed the connection.
    pub fn drain_inbound(&mut self) -> Result<()> {
        let Phase::Authenticated(link) = &mut self.phase else {
            return Ok(());
        };

        let buffered = link.reader.buffer().len();
        AsyncBufReadExt::consume(&mut link.reader, buffered);

        let mut scratch = [0u8; 1024];
        loop {
            match link.reader.get_ref().try_read(&mut scratch) {
                Ok(0) => {
                    return Err(GatewayError::transport(
                        "receive",
                        std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "server closed the connection",
                        ),
                    ));
                }
                Ok(n) => trace!("Server: {}", String::from_utf8_lossy(&scratch[..n]).trim_end()),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(GatewayError::transport("receive", e)),
            }
        }
    }

    /// Close the connection and return to `Disconnected`.
    ///
    /// Safe to call in any state. Close errors are logged, never returned.
    pub async fn reset(&mut self) {
        match std::mem::replace(&mut self.phase, Phase::Disconnected) {
            Phase::Disconnected => {}
            Phase::Connected(link) | Phase::Authenticated(link) => {
                debug!("Closing connection to {}", link.peer);
                link.shutdown().await;
            }
        }
    }
}
