use crate::flags::AckCode;
use core::result::Result as CoreResult;
use thiserror::Error;

pub type Result<T> = CoreResult<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error("Timed out after receiving {received} of {expected} bytes")]
    LinkTimeout { expected: usize, received: usize },
    #[error("No response from device while {0}")]
    ProtocolTimeout(&'static str),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("Could not encode image: {0}")]
    Export(#[from] png::EncodingError),
    #[error("Serial link is busy with another request")]
    Busy,
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Failures of the serial port itself, as opposed to the conversation on it
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Could not open serial device {path}: {reason}")]
    Open { path: String, reason: String },
    #[error("Could not configure serial device: {0}")]
    Configure(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Malformed length header {raw:02X?}")]
    MalformedHeader { raw: Vec<u8> },
    #[error("Checksum mismatch, device sent {expected:02X?}, computed {computed:#04X}")]
    ChecksumMismatch { expected: Vec<u8>, computed: u8 },
    #[error("Malformed acknowledgement {0:02X?}")]
    MalformedAck(Vec<u8>),
    #[error("Device rejected command: {0}")]
    Rejected(AckCode),
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Raster payload carries {actual} graphics bytes, {expected} expected")]
    UnexpectedPayloadSize { expected: usize, actual: usize },
    #[error("Strip {strip} is {actual} columns wide, {expected} expected")]
    StripWidth {
        strip: usize,
        expected: usize,
        actual: usize,
    },
    #[error("Graphics strip declares {declared} columns but only {available} bytes remain")]
    TruncatedStrip { declared: usize, available: usize },
    #[error("Invalid raster geometry {width}x{height}")]
    InvalidGeometry { width: usize, height: usize },
}

/// Coarse classification of [`Error`], used for short textual replies
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Link,
    LinkTimeout,
    ProtocolTimeout,
    MalformedHeader,
    ChecksumMismatch,
    Protocol,
    Decode,
    Export,
    Busy,
    InvalidArgument,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Link(_) => ErrorKind::Link,
            Error::LinkTimeout { .. } => ErrorKind::LinkTimeout,
            Error::ProtocolTimeout(_) => ErrorKind::ProtocolTimeout,
            Error::Protocol(ProtocolError::MalformedHeader { .. }) => ErrorKind::MalformedHeader,
            Error::Protocol(ProtocolError::ChecksumMismatch { .. }) => ErrorKind::ChecksumMismatch,
            Error::Protocol(_) => ErrorKind::Protocol,
            Error::Decode(_) => ErrorKind::Decode,
            Error::Export(_) => ErrorKind::Export,
            Error::Busy => ErrorKind::Busy,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
        }
    }

    /// Errors after which the conversation on the wire can no longer be trusted
    pub fn breaks_link(&self) -> bool {
        matches!(
            self,
            Error::Link(_)
                | Error::LinkTimeout { .. }
                | Error::ProtocolTimeout(_)
                | Error::Protocol(ProtocolError::MalformedAck(_))
                | Error::Protocol(ProtocolError::MalformedHeader { .. })
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Link(LinkError::Io(err))
    }
}
