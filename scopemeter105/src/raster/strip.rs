//! EPSON ESC/P print stream as emitted by the ScopeMeter's screen print.
//!
//! Only `ESC * m nL nH <columns>` bit image runs carry pixels. Every other escape
//! pair and all plain bytes (CR, LF, text) are layout noise for our purposes.

use nom::{
    bytes::complete::{tag, take},
    number::complete::{be_u8, le_u16},
    sequence::preceded,
    IResult,
};

use crate::error::DecodeError;

pub(crate) const ESC: u8 = 0x1B;
pub(crate) const BIT_IMAGE: u8 = b'*';
/// Dots per column byte
pub const STRIP_HEIGHT: usize = 8;

/// `ESC * m nL nH`, yields the declared column count
fn bit_image_header(input: &[u8]) -> IResult<&[u8], usize> {
    let (input, _) = tag(&[ESC, BIT_IMAGE][..])(input)?;
    // Dot density, the ScopeMeter always uses the same one
    let (input, _mode) = be_u8(input)?;
    let (input, columns) = le_u16(input)?;
    Ok((input, columns.into()))
}

/// Any other two byte escape
fn escape_pair(input: &[u8]) -> IResult<&[u8], u8> {
    preceded(tag(&[ESC][..]), be_u8)(input)
}

/// Splits a print stream into its bit image strips, top to bottom
pub(crate) fn parse_strips(mut input: &[u8]) -> Result<Vec<&[u8]>, DecodeError> {
    let mut strips = Vec::new();
    while !input.is_empty() {
        if let Ok((rest, declared)) = bit_image_header(input) {
            let (rest, columns) = take::<_, _, nom::error::Error<&[u8]>>(declared)(rest)
                .map_err(|_| DecodeError::TruncatedStrip {
                    declared,
                    available: rest.len(),
                })?;
            strips.push(columns);
            input = rest;
        } else if let Ok((rest, _)) = escape_pair(input) {
            input = rest;
        } else {
            input = &input[1..];
        }
    }
    Ok(strips)
}
