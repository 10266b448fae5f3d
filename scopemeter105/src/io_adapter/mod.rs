#[cfg(feature = "serial")]
pub(crate) mod serial;
pub(crate) mod std_io;

use crate::{error::Result, flags::BaudRate};

#[cfg(feature = "serial")]
pub use serial::SerialAdapter;
pub use std_io::StdIoAdapter;

/// Byte level access to whatever carries the conversation with the ScopeMeter.
///
/// `read` may return fewer bytes than requested, including zero when nothing
/// arrived within the adapter's own poll interval.
pub trait IoAdapter {
    fn write_all(&mut self, buf: &[u8]) -> Result<()>;
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
    fn set_baud_rate(&mut self, baud: BaudRate) -> Result<()>;
}
