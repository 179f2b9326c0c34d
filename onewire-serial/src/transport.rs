//! The byte-transport seam between the bus masters and the platform.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use onewire_bus::{OneWireError, OneWireResult};

/// Narrow contract over a platform byte stream.
///
/// Both serial masters drive the same transport; the passive one
/// additionally flips the baud rate around every bit. Mock transports
/// in the test suites implement this directly.
pub trait ByteTransport {
    /// Writes `bytes`, returning how many were accepted. A short count
    /// is reported, not retried; the caller decides.
    fn write(&mut self, bytes: &[u8]) -> OneWireResult<usize>;

    /// Reads up to `buf.len()` bytes before `deadline`. Returns 0 when
    /// the deadline passes with nothing received.
    fn read(&mut self, buf: &mut [u8], deadline: Instant) -> OneWireResult<usize>;

    /// Switches the line rate.
    fn set_baud(&mut self, baud: u32) -> OneWireResult<()>;

    /// The current line rate.
    fn baud(&self) -> u32;

    /// Clears driver-side buffers and error latches.
    fn reset_errors(&mut self) -> OneWireResult<()>;

    /// Releases the underlying stream.
    fn close(&mut self);

    /// Writes all of `bytes` or fails with
    /// [`OneWireError::TransportLost`].
    fn write_all(&mut self, bytes: &[u8]) -> OneWireResult<()> {
        let written = self.write(bytes)?;
        if written != bytes.len() {
            log::warn!("short write: {written} of {} bytes", bytes.len());
            return Err(OneWireError::TransportLost);
        }
        Ok(())
    }
}

/// Read-loop discipline of the serial masters: a settle pause after the
/// preceding write, then bounded polling in capped chunks.
pub(crate) struct ReadBudget {
    /// Pause before the first poll.
    pub settle: Duration,
    /// Pause between polls that returned nothing.
    pub backoff: Duration,
    /// Bytes per poll at most.
    pub chunk: usize,
    /// Polls before giving up.
    pub attempts: usize,
}

impl ReadBudget {
    /// The active master's budget: 40 ms settle, 10 ms backoff, 48-byte
    /// chunks, on the order of a hundred polls.
    pub fn command_reply() -> Self {
        ReadBudget {
            settle: Duration::from_millis(40),
            backoff: Duration::from_millis(10),
            chunk: 48,
            attempts: 100,
        }
    }

    /// The passive master's budget: echoes arrive within a bit time, so
    /// poll fast and give up quickly.
    pub fn bit_echo() -> Self {
        ReadBudget {
            settle: Duration::ZERO,
            backoff: Duration::from_millis(2),
            chunk: 48,
            attempts: 50,
        }
    }
}

/// Collects exactly `want` bytes under `budget`, or fails with
/// [`OneWireError::Timeout`].
pub(crate) fn read_exact<T: ByteTransport + ?Sized>(
    transport: &mut T,
    want: usize,
    budget: &ReadBudget,
) -> OneWireResult<Vec<u8>> {
    if budget.settle > Duration::ZERO {
        std::thread::sleep(budget.settle);
    }
    let mut out = Vec::with_capacity(want);
    for _ in 0..budget.attempts {
        if out.len() == want {
            break;
        }
        let mut chunk = vec![0u8; (want - out.len()).min(budget.chunk)];
        let deadline = Instant::now() + budget.backoff;
        let n = transport.read(&mut chunk, deadline)?;
        if n == 0 {
            std::thread::sleep(budget.backoff);
            continue;
        }
        out.extend_from_slice(&chunk[..n]);
    }
    if out.len() < want {
        log::debug!("read timed out with {} of {want} bytes", out.len());
        return Err(OneWireError::Timeout);
    }
    Ok(out)
}

/// A [`ByteTransport`] over a host serial device.
pub struct SerialTransport {
    port: Option<Box<dyn serialport::SerialPort>>,
    baud: u32,
    path: String,
}

impl SerialTransport {
    /// Opens `path` at 9600 baud, 8N1, no handshake.
    pub fn open(path: &str) -> OneWireResult<Self> {
        let port = serialport::new(path, 9600)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_millis(10))
            .open()
            .map_err(serial_lost)?;
        log::debug!("opened serial transport on {path}");
        Ok(SerialTransport {
            port: Some(port),
            baud: 9600,
            path: path.to_owned(),
        })
    }

    /// The device path this transport was opened on.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn port(&mut self) -> OneWireResult<&mut Box<dyn serialport::SerialPort>> {
        self.port.as_mut().ok_or(OneWireError::TransportLost)
    }
}

fn serial_lost(err: serialport::Error) -> OneWireError {
    log::warn!("serial transport error: {err}");
    OneWireError::TransportLost
}

impl ByteTransport for SerialTransport {
    fn write(&mut self, bytes: &[u8]) -> OneWireResult<usize> {
        let port = self.port()?;
        match port.write(bytes) {
            Ok(n) => {
                let _ = port.flush();
                Ok(n)
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(OneWireError::Io(e)),
        }
    }

    fn read(&mut self, buf: &mut [u8], deadline: Instant) -> OneWireResult<usize> {
        let port = self.port()?;
        let remaining = deadline.saturating_duration_since(Instant::now());
        port.set_timeout(remaining.max(Duration::from_millis(1)))
            .map_err(serial_lost)?;
        match port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(OneWireError::Io(e)),
        }
    }

    fn set_baud(&mut self, baud: u32) -> OneWireResult<()> {
        self.port()?.set_baud_rate(baud).map_err(serial_lost)?;
        self.baud = baud;
        Ok(())
    }

    fn baud(&self) -> u32 {
        self.baud
    }

    fn reset_errors(&mut self) -> OneWireResult<()> {
        self.port()?
            .clear(serialport::ClearBuffer::All)
            .map_err(serial_lost)
    }

    fn close(&mut self) {
        self.port = None;
    }
}
