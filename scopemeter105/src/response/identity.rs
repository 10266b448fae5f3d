use core::fmt::{self, Display};

/// Number of `;` separated fields a ScopeMeter 105 reports for `ID`
pub const IDENTITY_FIELD_COUNT: usize = 6;

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Identity {
    fields: Vec<String>,
}

impl Identity {
    pub(crate) fn new(fields: Vec<String>) -> Self {
        debug_assert_eq!(fields.len(), IDENTITY_FIELD_COUNT);
        Identity { fields }
    }

    pub fn model(&self) -> &str {
        &self.fields[0]
    }

    pub fn firmware(&self) -> &str {
        &self.fields[1]
    }

    pub fn firmware_date(&self) -> &str {
        &self.fields[2]
    }

    /// Language packs and remaining vendor fields
    pub fn extra(&self) -> &[String] {
        &self.fields[3..]
    }

    /// SCPI style `*IDN?` answer, serial number is not reported by the device
    pub fn idn(&self) -> String {
        format!("FLUKE,{},-,{}", self.model(), self.firmware())
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            concat!("Model: {}\n", "Firmware version: {}\n", "Firmware date: {}",),
            self.model(),
            self.firmware(),
            self.firmware_date(),
        ))?;
        for extra in self.extra().iter().filter(|e| !e.is_empty()) {
            write!(f, "\nInfo: {}", extra)?;
        }
        Ok(())
    }
}
