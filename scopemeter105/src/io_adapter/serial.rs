use super::{std_io::is_poll_timeout, IoAdapter};
use crate::{
    error::{LinkError, Result},
    flags::BaudRate,
};
use serialport::SerialPort;
use std::{
    io::{Read, Write},
    time::Duration,
};

/// How long a single read may block before control returns to the caller's deadline loop
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct SerialAdapter {
    port: Box<dyn SerialPort>,
}

impl SerialAdapter {
    /// Opens `path` at the power-up line speed of the ScopeMeter
    pub fn open(path: &str) -> Result<Self> {
        let port = serialport::new(path, BaudRate::default() as u32)
            .timeout(POLL_INTERVAL)
            .open()
            .map_err(|e| LinkError::Open {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
        Ok(SerialAdapter { port })
    }
}

impl IoAdapter for SerialAdapter {
    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.port.write_all(buf)?;
        self.port.flush()?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.port.read(buf) {
            Ok(count) => Ok(count),
            Err(e) if is_poll_timeout(e.kind()) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn set_baud_rate(&mut self, baud: BaudRate) -> Result<()> {
        self.port
            .set_baud_rate(baud as u32)
            .map_err(|e| LinkError::Configure(e.to_string()).into())
    }
}
