//! Transport session
//!
//! Owns one open serial connection for the lifetime of an invocation and
//! performs blocking write-then-read exchanges.

use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::{Duration, Instant};

use super::{RelayError, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT_MS};

/// Gap after the last received byte that ends a response
const INTER_CHAR_TIMEOUT: Duration = Duration::from_millis(50);

/// Poll interval while waiting for bytes
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// A byte pipe to a relay board
///
/// Implemented by [`Session`] for real hardware and by test doubles.
pub trait Transport {
    /// Device path or other name for log messages
    fn port_name(&self) -> &str;

    /// Write every byte of `frame`
    fn send(&mut self, frame: &[u8]) -> Result<(), RelayError>;

    /// Read whatever arrives within `timeout`. No bytes is `Ok(vec![])`.
    fn receive(&mut self, timeout: Duration) -> Result<Vec<u8>, RelayError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn port_name(&self) -> &str {
        (**self).port_name()
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), RelayError> {
        (**self).send(frame)
    }

    fn receive(&mut self, timeout: Duration) -> Result<Vec<u8>, RelayError> {
        (**self).receive(timeout)
    }
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Serial port name
    pub port_name: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Read/write timeout
    pub timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

impl SessionConfig {
    /// Default settings for `port_name`
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..Self::default()
        }
    }
}

/// An open serial connection. The port is closed when the session is dropped.
pub struct Session {
    port: Box<dyn SerialPort>,
    port_name: String,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("port_name", &self.port_name)
            .finish()
    }
}

impl Session {
    /// Open and configure the serial device (8N1, no flow control)
    pub fn open(config: &SessionConfig) -> Result<Self, RelayError> {
        let connect_err = |source| RelayError::Connect {
            port: config.port_name.clone(),
            source,
        };

        let mut port = serialport::new(&config.port_name, config.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(config.timeout)
            .open()
            .map_err(connect_err)?;

        port.clear(serialport::ClearBuffer::All)
            .map_err(connect_err)?;

        tracing::debug!(
            "opened {} at {} baud (timeout {}ms)",
            config.port_name,
            config.baud_rate,
            config.timeout.as_millis()
        );

        Ok(Self {
            port,
            port_name: config.port_name.clone(),
        })
    }

    /// Close the port now instead of at end of scope
    pub fn close(self) {}
}

impl Transport for Session {
    fn port_name(&self) -> &str {
        &self.port_name
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), RelayError> {
        // Drop stale bytes so the next read only sees the reply to this frame
        if let Err(e) = self.port.clear(serialport::ClearBuffer::All) {
            tracing::debug!("clearing buffers on {} failed: {} (continuing)", self.port_name, e);
        }

        self.port.write_all(frame).map_err(RelayError::Write)?;
        self.port.flush().map_err(RelayError::Write)?;
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Vec<u8>, RelayError> {
        let mut response = Vec::new();
        let mut buffer = [0u8; 128];
        let start = Instant::now();
        let mut last_data_time = Instant::now();

        loop {
            if start.elapsed() > timeout {
                break;
            }

            let available = self
                .port
                .bytes_to_read()
                .map_err(|e| RelayError::Read(e.into()))?;

            if available > 0 {
                let to_read = std::cmp::min(available as usize, buffer.len());
                match self.port.read(&mut buffer[..to_read]) {
                    Ok(0) => break,
                    Ok(n) => {
                        response.extend_from_slice(&buffer[..n]);
                        last_data_time = Instant::now();
                    }
                    Err(ref e)
                        if e.kind() == std::io::ErrorKind::TimedOut
                            || e.kind() == std::io::ErrorKind::WouldBlock => {}
                    Err(e) => return Err(RelayError::Read(e)),
                }
            } else if !response.is_empty() && last_data_time.elapsed() > INTER_CHAR_TIMEOUT {
                break;
            } else {
                std::thread::sleep(POLL_INTERVAL);
            }
        }

        Ok(response)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        tracing::debug!("closing {}", self.port_name);
    }
}
