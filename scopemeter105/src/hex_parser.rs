use crate::{
    checksum::{validate, CHECKSUM_SIZE},
    error::{Error, ProtocolError, Result},
    response::parser::{parse_ack, parse_length_header, ACK_SIZE, LENGTH_HEADER_SIZE},
};
use nom::{
    bytes::complete::take_while_m_n, character::complete::multispace0,
    combinator::{all_consuming, map_res}, multi::many1, sequence::delimited, IResult,
};

/// Decodes a pair of chars formatted as hex into a byte. For example "FF" -> 255
pub(crate) fn hex_byte(input: &str) -> IResult<&str, u8> {
    map_res(
        take_while_m_n(2, 2, |c: char| c.is_ascii_hexdigit()),
        |hex| u8::from_str_radix(hex, 16),
    )(input)
}

pub(crate) fn parse_hex_str(input: &str) -> IResult<&str, Vec<u8>> {
    all_consuming(many1(delimited(multispace0, hex_byte, multispace0)))(input)
}

/// Extracts the checked print payload from a hex dump of a recorded `QP` reply
/// (acknowledgement, length header, payload, checksum)
pub fn decode_screen_dump(input: &str) -> Result<Vec<u8>> {
    let (_, data) = parse_hex_str(input)
        .map_err(|_| Error::InvalidArgument("could not parse hex dump".to_string()))?;
    if data.len() < ACK_SIZE + LENGTH_HEADER_SIZE {
        return Err(ProtocolError::UnexpectedResponse("dump too short".to_string()).into());
    }
    let (ack, data) = data.split_at(ACK_SIZE);
    parse_ack(ack)?.into_result()?;
    let (header, data) = data.split_at(LENGTH_HEADER_SIZE);
    let len = parse_length_header(header)?;
    if data.len() != len + CHECKSUM_SIZE {
        return Err(ProtocolError::UnexpectedResponse(format!(
            "dump holds {} bytes after the header, {} declared",
            data.len(),
            len + CHECKSUM_SIZE
        ))
        .into());
    }
    let (payload, sum) = data.split_at(len);
    validate(payload, sum)?;
    Ok(payload.to_vec())
}
