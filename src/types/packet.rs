//! Framed packets and drop decisions

use std::fmt;

/// An APRS-IS packet built from a heard radio frame
///
/// `routing` already ends with the gateway's `,qAO,<callsign>:` entry and
/// `payload` is the device payload, untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalPacket {
    pub routing: String,
    pub payload: String,
}

impl CanonicalPacket {
    pub fn new(routing: impl Into<String>, payload: impl Into<String>) -> Self {
        Self { routing: routing.into(), payload: payload.into() }
    }

    /// Packet as written to the server, CRLF terminated
    pub fn to_wire(&self) -> String {
        format!("{}{}\r\n", self.routing, self.payload)
    }
}

impl fmt::Display for CanonicalPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.routing, self.payload)
    }
}

/// Why a heard packet was not forwarded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// Routing header arrived without a payload line
    EmptyPayload,
    /// Path shows the packet came from the internet side
    InternetSourced,
    /// Third-party packet whose inner path shows internet origin
    InternetSourcedEmbedded,
    /// Sender asked for RF-only distribution
    RfOnlyFlag,
    /// Sender asked not to be gated
    NoGateFlag,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DropReason::EmptyPayload => "No payload, not igated",
            DropReason::InternetSourced => "Internet packet not igated",
            DropReason::InternetSourcedEmbedded => "Internet third-party packet not igated",
            DropReason::RfOnlyFlag => "RFONLY, not igated",
            DropReason::NoGateFlag => "NOGATE, not igated",
        };
        f.write_str(text)
    }
}

/// A packet the framer refused, kept for logging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropDecision {
    pub reason: DropReason,
    /// The reframed packet text, for the log line
    pub packet: String,
}

impl DropDecision {
    pub fn new(reason: DropReason, packet: impl Into<String>) -> Self {
        Self { reason, packet: packet.into() }
    }
}

impl fmt::Display for DropDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.reason, self.packet)
    }
}

/// Result of framing one routing/payload pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramerOutcome {
    Forward(CanonicalPacket),
    Drop(DropDecision),
}

impl FramerOutcome {
    pub fn is_forward(&self) -> bool {
        matches!(self, FramerOutcome::Forward(_))
    }

    /// The drop reason, if the packet was dropped
    pub fn drop_reason(&self) -> Option<DropReason> {
        match self {
            FramerOutcome::Forward(_) => None,
            FramerOutcome::Drop(decision) => Some(decision.reason),
        }
    }
}
