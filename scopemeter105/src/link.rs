//! Serial link to the ScopeMeter: line speed step-up and deadline bounded reads.

use crate::{
    command::{Command, TERMINATOR},
    error::{Error, Result},
    flags::BaudRate,
    io_adapter::IoAdapter,
    response::parser::{parse_ack, ACK_SIZE},
};
use std::{
    sync::mpsc,
    thread,
    time::{Duration, Instant},
};

/// Line speed after power-up
pub const INITIAL_BAUD: BaudRate = BaudRate::Baud1200;
/// Line speed used for everything after the handshake
pub const TARGET_BAUD: BaudRate = BaudRate::Baud19200;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
/// A full screen takes about 4 s at 19200 baud
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(20);

/// Back-off when the adapter returned no data, keeps in-memory adapters from spinning
pub(crate) const IDLE_BACKOFF: Duration = Duration::from_millis(1);

/// `None` means the timeout reaches past what `Instant` can hold, i.e. no deadline
pub(crate) fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

pub(crate) fn is_expired(deadline: Option<Instant>) -> bool {
    deadline.map_or(false, |deadline| Instant::now() >= deadline)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    pub path: String,
    /// Budget for acknowledgements and short ASCII replies
    pub timeout: Duration,
    /// Budget for a complete screen payload
    pub transfer_timeout: Duration,
}

impl LinkConfig {
    pub fn new(path: impl Into<String>) -> Self {
        LinkConfig {
            path: path.into(),
            timeout: DEFAULT_TIMEOUT,
            transfer_timeout: DEFAULT_TRANSFER_TIMEOUT,
        }
    }
}

/// Receives `(received, expected)` after every chunk of a long read.
/// Implementations must return quickly, the read loop waits for them.
pub trait ProgressSink {
    fn report(&mut self, received: usize, expected: usize);
}

impl<F: FnMut(usize, usize)> ProgressSink for F {
    fn report(&mut self, received: usize, expected: usize) {
        self(received, expected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadProgress {
    pub received: usize,
    pub expected: usize,
}

impl ProgressSink for mpsc::Sender<ReadProgress> {
    fn report(&mut self, received: usize, expected: usize) {
        // Nobody listening is fine
        let _ = self.send(ReadProgress { received, expected });
    }
}

pub struct Link<IO: IoAdapter> {
    io: IO,
    timeout: Duration,
    transfer_timeout: Duration,
}

#[cfg(feature = "serial")]
impl Link<crate::io_adapter::serial::SerialAdapter> {
    /// Opens the configured serial device at [`INITIAL_BAUD`]. Call [`Link::negotiate`] before
    /// anything else.
    pub fn open(config: &LinkConfig) -> Result<Self> {
        log::info!("Opening serial device {}", config.path);
        let io = crate::io_adapter::serial::SerialAdapter::open(&config.path)?;
        Ok(Link::new(io, config))
    }
}

impl<IO: IoAdapter> Link<IO> {
    pub fn new(io: IO, config: &LinkConfig) -> Self {
        Link {
            io,
            timeout: config.timeout,
            transfer_timeout: config.transfer_timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn transfer_timeout(&self) -> Duration {
        self.transfer_timeout
    }

    /// Steps the line up from [`INITIAL_BAUD`] to [`TARGET_BAUD`].
    ///
    /// A device that was already switched by an earlier session does not answer at 1200
    /// baud, so the first request is allowed to go unanswered. The local port switches
    /// regardless and, if needed, the request is repeated at the new speed.
    pub fn negotiate(&mut self) -> Result<()> {
        let step_up = Command::ProgramCommunication(TARGET_BAUD);
        let answered = match self.exchange(&step_up) {
            Ok(()) => true,
            Err(Error::ProtocolTimeout(_)) | Err(Error::LinkTimeout { .. }) => false,
            Err(err) => return Err(err),
        };
        self.io.set_baud_rate(TARGET_BAUD)?;
        if !answered {
            log::debug!("No answer at {} baud, retrying at {}", INITIAL_BAUD, TARGET_BAUD);
            self.exchange(&step_up).map_err(|err| match err {
                Error::LinkTimeout { .. } => Error::ProtocolTimeout("switching line speed"),
                other => other,
            })?;
        }
        log::info!("Switched to {} baud", TARGET_BAUD);
        Ok(())
    }

    pub fn write_command(&mut self, bytes: &[u8]) -> Result<()> {
        log::trace!("Sending {:02X?}", bytes);
        self.io.write_all(bytes)
    }

    /// Sends a command and checks the `<digit><CR>` acknowledgement
    pub(crate) fn exchange(&mut self, cmd: &Command) -> Result<()> {
        self.exchange_within(cmd, self.timeout)
    }

    /// [`Link::exchange`] with its own budget for the acknowledgement, for commands the
    /// device needs time to prepare
    pub(crate) fn exchange_within(&mut self, cmd: &Command, timeout: Duration) -> Result<()> {
        self.write_command(&cmd.encode())?;
        let ack = self
            .read_exact(ACK_SIZE, timeout, None)
            .map_err(|err| match err {
                Error::LinkTimeout { .. } => Error::ProtocolTimeout("waiting for acknowledgement"),
                other => other,
            })?;
        let code = parse_ack(&ack)?;
        if let Err(err) = code.into_result() {
            log::warn!("{:?} rejected: {}", cmd, code);
            return Err(err);
        }
        Ok(())
    }

    /// Collects exactly `n` bytes. Short reads are progress, only the overall `timeout`
    /// ends the attempt.
    pub fn read_exact(
        &mut self,
        n: usize,
        timeout: Duration,
        mut progress: Option<&mut dyn ProgressSink>,
    ) -> Result<Vec<u8>> {
        let deadline = deadline_after(timeout);
        let mut buf = vec![0u8; n];
        let mut received = 0;

        while received < n {
            let count = self.io.read(&mut buf[received..])?;
            if count > 0 {
                received += count;
                log::trace!("Received {} of {} bytes", received, n);
                if let Some(sink) = progress.as_mut() {
                    sink.report(received, n);
                }
                continue;
            }
            if is_expired(deadline) {
                return Err(Error::LinkTimeout {
                    expected: n,
                    received,
                });
            }
            thread::sleep(IDLE_BACKOFF);
        }
        Ok(buf)
    }

    /// Single poll of the adapter, `Ok(0)` when nothing arrived
    pub fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.io.read(buf)
    }

    /// Reads up to and excluding `terminator`
    pub fn read_until(&mut self, terminator: u8, timeout: Duration) -> Result<Vec<u8>> {
        let deadline = deadline_after(timeout);
        let mut line = Vec::new();
        let mut byte = [0u8; 1];

        loop {
            if self.io.read(&mut byte)? == 1 {
                if byte[0] == terminator {
                    return Ok(line);
                }
                line.push(byte[0]);
                continue;
            }
            if is_expired(deadline) {
                return Err(Error::LinkTimeout {
                    // Length of an unterminated reply is unknown
                    expected: line.len() + 1,
                    received: line.len(),
                });
            }
            thread::sleep(IDLE_BACKOFF);
        }
    }

    /// ASCII reply terminated by CR
    pub(crate) fn read_line(&mut self) -> Result<String> {
        let line = self.read_until(TERMINATOR, self.timeout)?;
        log::debug!("Reply {:?}", String::from_utf8_lossy(&line));
        String::from_utf8(line).map_err(|e| {
            crate::error::ProtocolError::UnexpectedResponse(format!(
                "non ASCII reply {:02X?}",
                e.as_bytes()
            ))
            .into()
        })
    }

    pub fn into_inner(self) -> IO {
        self.io
    }

    pub fn close(self) {
        log::debug!("Closing serial link");
        drop(self.io);
    }
}
