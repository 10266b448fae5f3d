pub mod parser;
mod identity;

use crate::flags::StatusBit;
use strum::IntoEnumIterator;

pub use identity::{Identity, IDENTITY_FIELD_COUNT};

/// One METER readout as returned by `QM<n>`
#[derive(PartialEq, Debug, Clone)]
pub struct Measurement {
    pub kind: String,
    pub value: f64,
    pub unit: String,
}

/// Raw bit field returned by `IS`
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct Status(u16);

impl Status {
    pub fn from_bits(bits: u16) -> Self {
        Status(bits)
    }

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn is_set(self, bit: StatusBit) -> bool {
        self.0 & (1 << bit as u16) != 0
    }

    pub fn set_bits(self) -> impl Iterator<Item = StatusBit> {
        StatusBit::iter().filter(move |bit| self.is_set(*bit))
    }
}
