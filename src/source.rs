//! Frame source trait for radio input

use crate::Result;
use crate::types::RawFrame;

/// Trait for line-oriented radio input
///
/// Sources abstract over where the radio's text output comes from (a serial
/// port, a captured log) and handle their own read timeouts. The sequence of
/// lines is conceptually infinite and cannot be restarted.
#[async_trait::async_trait]
pub trait FrameSource: Send {
    /// Read the next line
    ///
    /// Returns:
    /// - `Ok(Some(frame))` - A line arrived (it may be empty)
    /// - `Ok(None)` - Nothing arrived within the read timeout
    /// - `Err(e)` - The source failed and cannot continue
    async fn next_line(&mut self) -> Result<Option<RawFrame>>;

    /// Release the underlying device
    ///
    /// Called once during shutdown. Reads after `close` return an error.
    async fn close(&mut self) -> Result<()>;

    /// Human-readable name for logging
    fn describe(&self) -> String;
}
