use core::ops::RangeInclusive;

use nom::{
    bytes::complete::{is_not, take_while_m_n},
    character::complete::{char, digit1, space0},
    combinator::{all_consuming, map, map_res, rest},
    multi::separated_list1,
    number::complete::double,
    sequence::{delimited, terminated, tuple},
    IResult,
};

use super::{Identity, Measurement, Status, IDENTITY_FIELD_COUNT};
use crate::{
    command::TERMINATOR,
    error::{ProtocolError, Result},
    flags::AckCode,
};

/// Digits in the ASCII length that precedes a screen payload
pub const LENGTH_DIGITS: usize = 4;
pub const LENGTH_SEPARATOR: u8 = b',';
/// Digits plus separator
pub const LENGTH_HEADER_SIZE: usize = LENGTH_DIGITS + 1;
/// Payload lengths accepted while resynchronising on an unsolicited print
pub const PRINT_LENGTH_RANGE: RangeInclusive<usize> = 1024..=65535;

pub const ACK_SIZE: usize = 2;

fn ack_parser(input: &[u8]) -> IResult<&[u8], AckCode> {
    let (input, digit) = take_while_m_n(1, 1, |b: u8| b.is_ascii_digit())(input)?;
    let (input, _) = char(TERMINATOR as char)(input)?;
    Ok((input, AckCode::from_digit(digit[0] - b'0')))
}

/// `<digit><CR>` sent after every command
pub fn parse_ack(raw: &[u8]) -> Result<AckCode> {
    all_consuming(ack_parser)(raw)
        .map(|(_, code)| code)
        .map_err(|_| ProtocolError::MalformedAck(raw.to_vec()).into())
}

fn length_header_parser(input: &[u8]) -> IResult<&[u8], usize> {
    map(
        terminated(
            take_while_m_n(LENGTH_DIGITS, LENGTH_DIGITS, |b: u8| b.is_ascii_digit()),
            char(LENGTH_SEPARATOR as char),
        ),
        |digits: &[u8]| {
            digits
                .iter()
                .fold(0usize, |accum, d| accum * 10 + usize::from(d - b'0'))
        },
    )(input)
}

/// `dddd,` in front of a screen payload
pub fn parse_length_header(raw: &[u8]) -> Result<usize> {
    all_consuming(length_header_parser)(raw)
        .map(|(_, len)| len)
        .map_err(|_| ProtocolError::MalformedHeader { raw: raw.to_vec() }.into())
}

/// Finds the first plausible length header in a stream of unsolicited bytes.
/// Returns the bytes following the header together with the declared length.
pub fn align_print_header(input: &[u8]) -> IResult<&[u8], usize> {
    for i in 0..input.len() {
        if let Ok((tail, len)) = length_header_parser(&input[i..]) {
            if PRINT_LENGTH_RANGE.contains(&len) {
                return Ok((tail, len));
            }
        }
    }
    Err(nom::Err::Incomplete(nom::Needed::Unknown))
}

fn identity_parser(input: &str) -> IResult<&str, Vec<&str>> {
    all_consuming(separated_list1(
        char(';'),
        map(
            // Empty fields are legal, e.g. an unset second language
            nom::combinator::opt(is_not(";")),
            |field: Option<&str>| field.unwrap_or("").trim(),
        ),
    ))(input)
}

/// `ID` reply, six `;` separated fields
pub fn parse_identity(line: &str) -> Result<Identity> {
    match identity_parser(line) {
        Ok((_, fields)) if fields.len() == IDENTITY_FIELD_COUNT => {
            Ok(Identity::new(fields.into_iter().map(str::to_string).collect()))
        }
        _ => Err(ProtocolError::UnexpectedResponse(format!("identity {:?}", line)).into()),
    }
}

fn value_parser(input: &str) -> IResult<&str, f64> {
    delimited(space0, double, space0)(input)
}

/// `QM<n>,V` reply, a bare number
pub fn parse_value(line: &str) -> Result<f64> {
    all_consuming(value_parser)(line)
        .map(|(_, v)| v)
        .map_err(|_| ProtocolError::UnexpectedResponse(format!("measurement {:?}", line)).into())
}

/// `QM<n>` reply, `<kind>,<value>,<unit>`
pub fn parse_measurement(line: &str) -> Result<Measurement> {
    let parsed: IResult<&str, (&str, char, f64, char, &str)> =
        tuple((is_not(","), char(','), value_parser, char(','), rest))(line);
    match parsed {
        Ok((_, (kind, _, value, _, unit))) if !unit.contains(',') => Ok(Measurement {
            kind: kind.trim().to_string(),
            value,
            unit: unit.trim().to_string(),
        }),
        _ => Err(ProtocolError::UnexpectedResponse(format!("measurement {:?}", line)).into()),
    }
}

/// `IS` reply, decimal bit field
pub fn parse_status(line: &str) -> Result<Status> {
    all_consuming(map_res(delimited(space0, digit1, space0), str::parse::<u16>))(line)
        .map(|(_, bits)| Status::from_bits(bits))
        .map_err(|_: nom::Err<nom::error::Error<&str>>| {
            ProtocolError::UnexpectedResponse(format!("status {:?}", line)).into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::Error, flags::StatusBit};
    use claims::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decode_ack() {
        assert_ok_eq!(parse_ack(b"0\r"), AckCode::Ok);
        assert_ok_eq!(parse_ack(b"1\r"), AckCode::SyntaxError);
        assert_ok_eq!(parse_ack(b"9\r"), AckCode::Unknown(9));
        // No CR after the code
        assert_matches!(
            parse_ack(b"0\n"),
            Err(Error::Protocol(ProtocolError::MalformedAck(raw))) if raw == b"0\n"
        );
        assert_err!(parse_ack(b"A\r"));
        assert_err!(parse_ack(b"0"));
    }

    #[test]
    fn decode_length_header() {
        assert_ok_eq!(parse_length_header(b"7454,"), 7454);
        assert_ok_eq!(parse_length_header(b"0000,"), 0);
    }

    #[test]
    fn malformed_length_header_is_never_defaulted() {
        for raw in [
            &b"74x4,"[..],
            b"ABCD,",
            b"7454;",
            b"745,",
            b"\0\0\0\0\0",
            b"74545",
            b"",
        ] {
            assert_matches!(
                parse_length_header(raw),
                Err(Error::Protocol(ProtocolError::MalformedHeader { raw: got })) if got == raw
            );
        }
    }

    #[test]
    fn align_on_print_header() {
        assert_ok_eq!(align_print_header(b"\r\n7454,\x1b@"), (&b"\x1b@"[..], 7454));
        // Stale digits in front of the header are skipped
        assert_ok_eq!(align_print_header(b"1237454,"), (&b""[..], 7454));
        // Lengths outside of the plausible range are noise
        assert_err!(align_print_header(b"0012,"));
        assert_err!(align_print_header(b"no header"));
    }

    #[test]
    fn decode_identity() {
        let identity = parse_identity(
            "ScopeMeter 105 Series II; V7.15; 96-02-06; English V2.15; ; 0",
        )
        .unwrap();
        assert_eq!(identity.model(), "ScopeMeter 105 Series II");
        assert_eq!(identity.firmware(), "V7.15");
        assert_eq!(identity.idn(), "FLUKE,ScopeMeter 105 Series II,-,V7.15");

        assert_err!(parse_identity("ScopeMeter 105; V7.15"));
    }

    #[test]
    fn decode_measurement() {
        assert_eq!(parse_value(" 1.234E+00").unwrap(), 1.234);
        assert_eq!(parse_value("-12.5").unwrap(), -12.5);
        assert_err!(parse_value("OL"));

        let m = parse_measurement("V DC,+5.012E+00,V").unwrap();
        assert_eq!(m.kind, "V DC");
        assert_eq!(m.value, 5.012);
        assert_eq!(m.unit, "V");
        assert_err!(parse_measurement("V DC,5.0"));
        assert_err!(parse_measurement("V DC,5.0,V,extra"));
    }

    #[test]
    fn decode_status() {
        let status = parse_status("265").unwrap();
        assert_eq!(
            status.set_bits().collect::<Vec<_>>(),
            vec![
                StatusBit::HardwareSettled,
                StatusBit::AcquisitionBusy,
                StatusBit::NumericResultsAvailable,
            ]
        );
        assert!(status.is_set(StatusBit::AcquisitionBusy));
        assert!(!status.is_set(StatusBit::HoldActive));
        assert_err!(parse_status("busy"));
    }
}
