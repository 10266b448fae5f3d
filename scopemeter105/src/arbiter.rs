//! Exclusive access to the single serial link.
//!
//! Whoever holds a [`CaptureLease`] owns the port until the lease is dropped. The
//! connection itself is opened lazily and survives between leases, so only the first
//! request after start-up or after a link failure pays for the baud rate handshake.

use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use crate::{
    error::{Error, Result},
    io_adapter::IoAdapter,
    scope::ScopeMeter,
};

/// Opens a fresh, not yet negotiated connection to the device
pub trait Connector: Send {
    type Io: IoAdapter + Send;

    fn connect(&mut self) -> Result<ScopeMeter<Self::Io>>;
}

impl<IO, F> Connector for F
where
    F: FnMut() -> Result<ScopeMeter<IO>> + Send,
    IO: IoAdapter + Send,
{
    type Io = IO;

    fn connect(&mut self) -> Result<ScopeMeter<IO>> {
        self()
    }
}

#[cfg(feature = "serial")]
mod serial_connector {
    use super::*;
    use crate::{io_adapter::serial::SerialAdapter, link::{Link, LinkConfig}};

    /// Connects through the serial port named in a [`LinkConfig`]
    pub struct SerialConnector {
        config: LinkConfig,
    }

    impl SerialConnector {
        pub fn new(config: LinkConfig) -> Self {
            SerialConnector { config }
        }
    }

    impl Connector for SerialConnector {
        type Io = SerialAdapter;

        fn connect(&mut self) -> Result<ScopeMeter<SerialAdapter>> {
            Ok(ScopeMeter::new(Link::open(&self.config)?))
        }
    }
}
#[cfg(feature = "serial")]
pub use serial_connector::SerialConnector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquirePolicy {
    /// Wait for the current holder
    #[default]
    Block,
    /// Return [`Error::Busy`] instead of waiting
    FailFast,
}

struct Slot<C: Connector> {
    connector: C,
    device: Option<ScopeMeter<C::Io>>,
}

pub struct Arbiter<C: Connector> {
    slot: Mutex<Slot<C>>,
}

impl<C: Connector> Arbiter<C> {
    pub fn new(connector: C) -> Self {
        Arbiter {
            slot: Mutex::new(Slot {
                connector,
                device: None,
            }),
        }
    }

    pub fn acquire(&self, policy: AcquirePolicy) -> Result<CaptureLease<'_, C>> {
        let guard = match policy {
            AcquirePolicy::Block => self.slot.lock().unwrap_or_else(Self::recover),
            AcquirePolicy::FailFast => match self.slot.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(poisoned)) => Self::recover(poisoned),
                Err(TryLockError::WouldBlock) => {
                    log::debug!("Serial link busy, rejecting request");
                    return Err(Error::Busy);
                }
            },
        };
        log::trace!("Lease acquired");
        Ok(CaptureLease { guard })
    }

    /// Same as dropping the lease
    pub fn release(&self, lease: CaptureLease<'_, C>) {
        drop(lease)
    }

    /// A holder panicked mid conversation, the device state is unknown
    fn recover(poisoned: PoisonError<MutexGuard<'_, Slot<C>>>) -> MutexGuard<'_, Slot<C>> {
        log::warn!("Previous lease holder panicked, dropping the connection");
        let mut guard = poisoned.into_inner();
        guard.device = None;
        guard
    }
}

/// Exclusive ownership of the serial link, released on drop
pub struct CaptureLease<'a, C: Connector> {
    guard: MutexGuard<'a, Slot<C>>,
}

impl<'a, C: Connector> CaptureLease<'a, C> {
    /// The negotiated device, connecting first if there is no live connection
    pub fn device(&mut self) -> Result<&mut ScopeMeter<C::Io>> {
        let slot = &mut *self.guard;
        let device = match slot.device.take() {
            Some(device) => device,
            None => {
                let mut device = slot.connector.connect()?;
                device.negotiate()?;
                device
            }
        };
        Ok(slot.device.insert(device))
    }

    pub fn is_connected(&self) -> bool {
        self.guard.device.is_some()
    }

    /// Drops the connection, the next lease reconnects and negotiates again
    pub fn invalidate(&mut self) {
        if let Some(device) = self.guard.device.take() {
            log::debug!("Dropping serial connection");
            device.close();
        }
    }

    /// Runs `op` on the device. Errors that leave the wire in an unknown state
    /// invalidate the connection.
    pub fn with_device<T>(
        &mut self,
        op: impl FnOnce(&mut ScopeMeter<C::Io>) -> Result<T>,
    ) -> Result<T> {
        let result = self.device().and_then(op);
        if let Err(err) = &result {
            if err.breaks_link() {
                self.invalidate();
            }
        }
        result
    }
}

impl<'a, C: Connector> Drop for CaptureLease<'a, C> {
    fn drop(&mut self) {
        log::trace!("Lease released");
    }
}
