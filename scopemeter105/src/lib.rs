//! Remote control of a Fluke ScopeMeter 105 over its optical serial cable: screen
//! captures rendered to PNG, METER readouts and a small SCPI style network front-end.

pub mod arbiter;
pub mod binblock;
pub mod checksum;
mod command;
pub mod error;
pub mod flags;
pub mod hex_parser;
pub mod io_adapter;
pub mod link;
pub mod raster;
pub mod response;
pub mod scope;
#[cfg(feature = "server")]
pub mod server;
pub mod session;

#[cfg(test)]
mod tests;

#[cfg(feature = "serial")]
pub use arbiter::SerialConnector;
pub use arbiter::{AcquirePolicy, Arbiter, CaptureLease, Connector};
pub use error::{DecodeError, Error, ErrorKind, LinkError, ProtocolError, Result};
pub use flags::{AckCode, MeterField, StatusBit};
pub use link::{Link, LinkConfig, ProgressSink, ReadProgress};
pub use raster::{
    write_png, Dot, ImageText, Palette, RasterDecoder, RasterGeometry, RasterImage, Rgb,
    Screenshot,
};
pub use response::{Identity, Measurement, Status};
pub use scope::{CaptureRequest, ScopeMeter};
pub use session::{CaptureSession, CyclicCapture, InFlight, InFlightToken};

