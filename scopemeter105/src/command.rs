use crate::flags::{BaudRate, MeterField};

/// Commands understood by the ScopeMeter, all ASCII terminated by CR
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub(crate) enum Command {
    /// Request line speed, framing is always 8N1
    ProgramCommunication(BaudRate),
    Identify,
    Status,
    QueryMeasurement { field: MeterField, value_only: bool },
    QueryPrint,
}

pub(crate) const TERMINATOR: u8 = b'\r';

impl Command {
    pub fn encode(&self) -> Vec<u8> {
        use Command::*;
        let mut cmd = match *self {
            ProgramCommunication(baud) => format!("PC{},N,8,1", baud),
            Identify => "ID".to_string(),
            Status => "IS".to_string(),
            QueryMeasurement { field, value_only } => {
                let suffix = if value_only { ",V" } else { "" };
                format!("QM{}{}", field.number(), suffix)
            }
            QueryPrint => "QP".to_string(),
        }
        .into_bytes();
        cmd.push(TERMINATOR);
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn expected_encoding() {
        assert_eq!(
            Command::ProgramCommunication(BaudRate::Baud19200).encode(),
            b"PC19200,N,8,1\r"
        );
        assert_eq!(Command::Identify.encode(), b"ID\r");
        assert_eq!(Command::QueryPrint.encode(), b"QP\r");
        assert_eq!(
            Command::QueryMeasurement {
                field: MeterField::new(12).unwrap(),
                value_only: true
            }
            .encode(),
            b"QM12,V\r"
        );
        assert_eq!(
            Command::QueryMeasurement {
                field: MeterField::PRIMARY,
                value_only: false
            }
            .encode(),
            b"QM1\r"
        );
    }
}
