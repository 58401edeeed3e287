//! Raw lines read from the radio

use std::time::SystemTime;

use crate::framer;

/// Classification of a raw line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Carries the device's `[timestamp] <UI...>:` marker
    Routing,
    /// Anything else; only meaningful directly after a routing line
    Payload,
}

/// A single line of text from a frame source
///
/// Line terminators are already stripped. Frames are transient: each one is
/// either handed to the framer or discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub text: String,
    pub kind: FrameKind,
    pub received_at: SystemTime,
}

impl RawFrame {
    /// Build a frame from a raw line, stripping CR/LF and classifying it
    pub fn new(line: impl Into<String>) -> Self {
        Self::received_at(line, SystemTime::now())
    }

    /// Same as [`RawFrame::new`] with an explicit arrival time
    pub fn received_at(line: impl Into<String>, received_at: SystemTime) -> Self {
        let mut text = line.into();
        let trimmed = text.trim_end_matches(['\r', '\n']).len();
        text.truncate(trimmed);
        let start = text.len() - text.trim_start_matches(['\r', '\n']).len();
        text.drain(..start);

        let kind = if framer::is_routing_line(&text) { FrameKind::Routing } else { FrameKind::Payload };

        Self { text, kind, received_at }
    }

    pub fn is_routing(&self) -> bool {
        self.kind == FrameKind::Routing
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}
