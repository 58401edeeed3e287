//! Replay source for captured radio output

use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info};

use super::serial::decode_line;
use crate::source::FrameSource;
use crate::types::RawFrame;
use crate::{GatewayError, Result};

/// How long an exhausted replay waits before reporting an empty read.
pub const DEFAULT_IDLE: Duration = Duration::from_secs(10);

/// Frame source that plays back previously captured radio output
///
/// Useful for dry runs against a test server and for exercising the
/// dispatcher without hardware. Once all lines are played the source behaves
/// like a quiet radio: every read waits for the idle period and returns
/// `Ok(None)`.
pub struct ReplaySource {
    name: String,
    lines: VecDeque<String>,

    /// Delay before each line
    pace: Option<Duration>,

    /// Delay for reads after the capture is exhausted
    idle: Duration,

    closed: bool,
}

impl ReplaySource {
    /// Replay lines held in memory
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: "memory".to_string(),
            lines: lines.into_iter().map(Into::into).collect(),
            pace: None,
            idle: DEFAULT_IDLE,
            closed: false,
        }
    }

    /// Replay a capture file, one line per radio line
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| GatewayError::serial(path.display().to_string(), e))?;
        let text = decode_line(&bytes);

        let mut source = Self::from_lines(text.lines());
        source.name = path.display().to_string();

        info!("Opened capture {}: {} lines", source.name, source.lines.len());
        Ok(source)
    }

    /// Wait this long before delivering each line
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = Some(pace);
        self
    }

    /// Wait this long on reads once the capture is exhausted
    pub fn with_idle(mut self, idle: Duration) -> Self {
        self.idle = idle;
        self
    }

    /// Lines not yet delivered
    pub fn remaining(&self) -> usize {
        self.lines.len()
    }
}

#[async_trait::async_trait]
impl FrameSource for ReplaySource {
    async fn next_line(&mut self) -> Result<Option<RawFrame>> {
        if self.closed {
            return Err(GatewayError::serial(&self.name, "replay source is closed"));
        }

        match self.lines.pop_front() {
            Some(line) => {
                if let Some(pace) = self.pace {
                    tokio::time::sleep(pace).await;
                }
                Ok(Some(RawFrame::new(line)))
            }
            None => {
                tokio::time::sleep(self.idle).await;
                Ok(None)
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            debug!("Closed replay {} ({} lines unread)", self.name, self.lines.len());
            self.closed = true;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("replay {}", self.name)
    }
}
