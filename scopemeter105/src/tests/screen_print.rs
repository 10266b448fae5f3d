use crate::{
    error::{Error, ProtocolError},
    hex_parser::{decode_screen_dump, parse_hex_str},
    raster::{Dot, Palette, RasterDecoder, RasterGeometry, RasterImage},
    response::parser::{align_print_header, parse_length_header},
};

use claims::*;
use manifest_dir_macros::exist_relative_path;
use pretty_assertions::assert_eq;

/// Synthetic `QP` reply built to draw `RasterImage::test_pattern`: 30 strips of
/// `ESC * 4` bit images, 7420 payload bytes. A real ScopeMeter 105 announces
/// 7454 bytes, so its framing around the strips is not what this stream holds.
const SCREEN_PRINT: &str =
    include_str!(exist_relative_path!("resources/test/screen_print_example.txt"));

#[test]
fn decode_synthetic_print() {
    let payload = decode_screen_dump(SCREEN_PRINT).unwrap();
    let image = RasterDecoder::decode(&payload, RasterGeometry::SCOPEMETER_105, Palette::default())
        .unwrap();
    assert_eq!(
        image,
        RasterImage::test_pattern(RasterGeometry::SCOPEMETER_105, Palette::default())
    );
    let lit = image.dots().iter().filter(|d| **d == Dot::Foreground).count();
    // Border plus two diagonals, corners shared
    assert_eq!(lit, 4 * 239 + 2 * 240 - 4);
}

#[test]
fn header_of_synthetic_print() {
    let (_, data) = parse_hex_str(SCREEN_PRINT).unwrap();
    assert_ok_eq!(parse_length_header(&data[2..7]), data.len() - 8);
    // Unsolicited print: ack and header are preceded by line noise
    let mut noisy = b"\x00\x1312".to_vec();
    noisy.extend_from_slice(&data[2..]);
    let (tail, len) = align_print_header(&noisy).unwrap();
    assert_eq!(len, data.len() - 8);
    assert_eq!(tail.len(), len + 1);
}

#[test]
fn corrupted_print_is_not_decoded() {
    let (_, mut data) = parse_hex_str(SCREEN_PRINT).unwrap();
    data[500] ^= 0x01;
    let dump: String = data.iter().map(|b| format!("{:02X} ", b)).collect();
    assert_matches!(
        decode_screen_dump(&dump),
        Err(Error::Protocol(ProtocolError::ChecksumMismatch { .. }))
    );
}
