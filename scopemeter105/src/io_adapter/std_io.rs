use super::IoAdapter;
use crate::{error::Result, flags::BaudRate};
use std::io::{ErrorKind, Read, Write};

/// Adapter for plain `Read + Write` streams, e.g. recorded sessions or test doubles.
/// Baud rate changes are only remembered.
pub struct StdIoAdapter<IO: Read + Write> {
    io: IO,
    baud: BaudRate,
}

impl<IO: Read + Write> IoAdapter for StdIoAdapter<IO> {
    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.io.write_all(buf)?;
        self.io.flush()?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.io.read(buf) {
            Ok(count) => Ok(count),
            Err(e) if is_poll_timeout(e.kind()) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn set_baud_rate(&mut self, baud: BaudRate) -> Result<()> {
        self.baud = baud;
        Ok(())
    }
}

impl<IO: Read + Write> StdIoAdapter<IO> {
    pub fn new(io: IO) -> Self {
        StdIoAdapter {
            io,
            baud: BaudRate::default(),
        }
    }

    pub fn baud_rate(&self) -> BaudRate {
        self.baud
    }

    pub fn into_inner(self) -> IO {
        self.io
    }
}

/// Errors a port reports when nothing arrived during one poll interval
pub(crate) fn is_poll_timeout(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
    )
}
