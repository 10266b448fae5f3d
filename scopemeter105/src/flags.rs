use crate::error::{Error, ProtocolError, Result};
use core::fmt::{self, Display};
use strum::EnumIter;

/// Line speeds the ScopeMeter uses. The device always powers up at 1200 baud and
/// only accepts a step up to 19200, so this is not a user choice.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum BaudRate {
    #[default]
    Baud1200 = 1200,
    Baud19200 = 19200,
}

impl Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{}", *self as u32))
    }
}

/// Acknowledgement digit sent back after every command
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum AckCode {
    Ok,
    SyntaxError,
    ExecutionError,
    SynchronizationError,
    CommunicationError,
    Unknown(u8),
}

impl AckCode {
    pub(crate) fn from_digit(d: u8) -> Self {
        use AckCode::*;
        match d {
            0 => Ok,
            1 => SyntaxError,
            2 => ExecutionError,
            3 => SynchronizationError,
            4 => CommunicationError,
            other => Unknown(other),
        }
    }

    pub(crate) fn into_result(self) -> Result<()> {
        match self {
            AckCode::Ok => Ok(()),
            rejected => Err(ProtocolError::Rejected(rejected).into()),
        }
    }
}

impl Display for AckCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use AckCode::*;
        match self {
            Ok => f.write_str("OK"),
            SyntaxError => f.write_str("command syntax error"),
            ExecutionError => f.write_str("command execution error"),
            SynchronizationError => f.write_str("synchronization error"),
            CommunicationError => f.write_str("communication error"),
            Unknown(code) => write!(f, "unknown error code ({})", code),
        }
    }
}

/// Bits reported by the `IS` status query
#[derive(EnumIter, PartialEq, Eq, Debug, Clone, Copy)]
pub enum StatusBit {
    HardwareSettled = 0,
    AcquisitionArmed = 1,
    AcquisitionTriggered = 2,
    AcquisitionBusy = 3,
    WaveformAFilled = 4,
    WaveformBFilled = 5,
    WaveformMathFilled = 6,
    MathReady = 7,
    NumericResultsAvailable = 8,
    HoldActive = 9,
}

impl StatusBit {
    pub fn description(self) -> &'static str {
        use StatusBit::*;
        match self {
            HardwareSettled => "Hardware settled",
            AcquisitionArmed => "Acquisition armed",
            AcquisitionTriggered => "Acquisition triggered",
            AcquisitionBusy => "Acquisition busy",
            WaveformAFilled => "WAVEFORM A memory filled",
            WaveformBFilled => "WAVEFORM B memory filled",
            WaveformMathFilled => "WAVEFORM A+/-B memory filled",
            MathReady => "Math function ready",
            NumericResultsAvailable => "Numeric results available",
            HoldActive => "Hold mode active",
        }
    }
}

/// One of the 12 METER readout fields addressed by `QM<n>`
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct MeterField(u8);

impl MeterField {
    /// Main reading, which is the DC voltage in the default METER setup
    pub const PRIMARY: MeterField = MeterField(1);

    pub fn new(field: u8) -> Result<Self> {
        if (1..=12).contains(&field) {
            Ok(MeterField(field))
        } else {
            Err(Error::InvalidArgument(format!(
                "METER field {} is out of range 1..=12",
                field
            )))
        }
    }

    pub fn number(self) -> u8 {
        self.0
    }
}

impl Default for MeterField {
    fn default() -> Self {
        MeterField::PRIMARY
    }
}
