//! Serial port frame source

use std::io::{BufRead, BufReader, ErrorKind, Read};

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info, trace, warn};

use crate::config::SerialConfig;
use crate::source::FrameSource;
use crate::types::RawFrame;
use crate::{GatewayError, Result};

/// Frame source reading the radio's data port
///
/// Reads block for at most the configured timeout. They run on tokio's
/// blocking pool so the dispatcher can keep racing them against shutdown.
/// A read abandoned that way still owns the port until its timeout expires;
/// the port is released when the blocking read returns.
pub struct SerialSource<R = Box<dyn SerialPort>> {
    device: String,

    /// `None` while a read is in flight or after `close`
    reader: Option<BufReader<R>>,

    closed: bool,
}

impl SerialSource {
    /// Open the serial device, 8N1 without flow control.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let port = serialport::new(&config.device, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(config.read_timeout())
            .open()
            .map_err(|e| GatewayError::serial(&config.device, e))?;

        info!(
            device = %config.device,
            baud_rate = config.baud_rate,
            read_timeout_secs = config.read_timeout_secs,
            "Opened serial port"
        );

        Ok(Self::from_reader(config.device.clone(), port))
    }
}

impl<R: Read + Send + 'static> SerialSource<R> {
    /// Wrap an already open port. Reads must time out on their own.
    pub fn from_reader(device: impl Into<String>, port: R) -> Self {
        Self { device: device.into(), reader: Some(BufReader::new(port)), closed: false }
    }

    /// True until [`close`](FrameSource::close) is called
    pub fn is_open(&self) -> bool {
        !self.closed
    }
}

/// Read up to and including the next `\n`.
///
/// A timeout keeps whatever arrived before it, so a line cut short by the
/// radio is still returned. An empty result means nothing arrived at all.
pub(crate) fn read_line<R: BufRead>(reader: &mut R) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    match reader.read_until(b'\n', &mut buf) {
        Ok(_) => Ok(buf),
        Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(buf),
        Err(e) => Err(e),
    }
}

/// Decode radio bytes as UTF-8, discarding anything invalid.
pub(crate) fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).chars().filter(|&c| c != char::REPLACEMENT_CHARACTER).collect()
}

#[async_trait::async_trait]
impl<R: Read + Send + 'static> FrameSource for SerialSource<R> {
    async fn next_line(&mut self) -> Result<Option<RawFrame>> {
        if self.closed {
            return Err(GatewayError::serial(&self.device, "serial port is closed"));
        }
        let mut reader = self.reader.take().ok_or_else(|| {
            GatewayError::serial(&self.device, "previous read was abandoned")
        })?;

        let (reader, result) = tokio::task::spawn_blocking(move || {
            let result = read_line(&mut reader);
            (reader, result)
        })
        .await
        .map_err(|e| GatewayError::serial(&self.device, e))?;
        self.reader = Some(reader);

        let bytes = result.map_err(|e| GatewayError::serial(&self.device, e))?;
        if bytes.is_empty() {
            trace!(device = %self.device, "Serial read timed out");
            return Ok(None);
        }

        let frame = RawFrame::new(decode_line(&bytes));
        trace!(device = %self.device, routing = frame.is_routing(), "{}", frame.text);
        Ok(Some(frame))
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        match self.reader.take() {
            Some(_) => debug!(device = %self.device, "Closed serial port"),
            None => warn!(
                device = %self.device,
                ">>> Serial read still in flight, port is released when it times out"
            ),
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("serial {}", self.device)
    }
}
