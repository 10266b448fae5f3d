//! IEEE 488.2 definite length arbitrary block: `#`, one digit `d`, `d` digits of
//! payload length, the payload and a newline.

use nom::{
    bytes::streaming::{tag, take, take_while_m_n},
    combinator::map_res,
    IResult,
};

use crate::error::{Error, Result};

pub const BLOCK_START: u8 = b'#';
pub const BLOCK_END: u8 = b'\n';
/// The width of the length field is a single digit
pub const MAX_PAYLOAD_LEN: usize = 999_999_999;

/// Frames `payload`, the length field uses as few digits as possible
pub fn encode(payload: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(payload.len() + 12);
    encode_into(payload, &mut out)?;
    Ok(out)
}

pub fn encode_into(payload: &[u8], out: &mut Vec<u8>) -> Result<()> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(Error::InvalidArgument(format!(
            "{} bytes do not fit into a block",
            payload.len()
        )));
    }
    let len = payload.len().to_string();
    out.push(BLOCK_START);
    out.extend_from_slice(len.len().to_string().as_bytes());
    out.extend_from_slice(len.as_bytes());
    out.extend_from_slice(payload);
    out.push(BLOCK_END);
    Ok(())
}

fn ascii_number(digits: &[u8]) -> core::result::Result<usize, core::num::ParseIntError> {
    // Only ASCII digits get here
    String::from_utf8_lossy(digits).parse()
}

fn length_field(input: &[u8]) -> IResult<&[u8], usize> {
    let (input, _) = tag(&[BLOCK_START][..])(input)?;
    let (input, width) = map_res(
        take_while_m_n(1, 1, |b: u8| (b'1'..=b'9').contains(&b)),
        ascii_number,
    )(input)?;
    map_res(
        take_while_m_n(width, width, |b: u8| b.is_ascii_digit()),
        ascii_number,
    )(input)
}

/// Extracts one block. Returns `Incomplete` while the block has not fully arrived,
/// a trailing newline is consumed when present.
pub fn parse(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, len) = length_field(input)?;
    let (input, payload) = take(len)(input)?;
    let input = input.strip_prefix(&[BLOCK_END]).unwrap_or(input);
    Ok((input, payload))
}
