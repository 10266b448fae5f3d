//! Monochrome bit image reconstruction of an ESC/P screen print.

mod export;
pub(crate) mod strip;

use core::{
    fmt::{self, Display},
    str::FromStr,
};

use nom::{combinator::all_consuming, sequence::tuple};

use crate::{error::DecodeError, hex_parser::hex_byte};
use strip::{parse_strips, STRIP_HEIGHT};

pub use export::{write_png, ImageText, Screenshot};

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub fn channels(self) -> [u8; 3] {
        [self.0, self.1, self.2]
    }
}

impl Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

impl FromStr for Rgb {
    type Err = String;

    /// Accepts `#rrggbb`, `0xrrggbb` or bare `rrggbb`. Three digit forms are
    /// padded per channel, `#abc` reads as `#a0b0c0`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim();
        let digits = digits
            .strip_prefix('#')
            .or_else(|| digits.strip_prefix("0x"))
            .or_else(|| digits.strip_prefix("0X"))
            .unwrap_or(digits);
        let padded: String = if digits.len() == 3 {
            digits.chars().flat_map(|c| [c, '0']).collect()
        } else {
            digits.to_string()
        };
        let parsed = all_consuming(tuple((hex_byte, hex_byte, hex_byte)))(padded.as_str())
            .map(|(_, (r, g, b))| Rgb(r, g, b))
            .map_err(|_| format!("invalid colour {:?}, expected #rrggbb", s));
        parsed
    }
}

/// Colours used to render the two dot states
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct Palette {
    pub foreground: Rgb,
    pub background: Rgb,
}

impl Palette {
    /// Dark dots on the greenish backlight of the LCD
    pub const LCD: Palette = Palette {
        foreground: Rgb(0x22, 0x22, 0x22),
        background: Rgb(0xb1, 0xe5, 0x80),
    };

    pub fn color(&self, dot: Dot) -> Rgb {
        match dot {
            Dot::Foreground => self.foreground,
            Dot::Background => self.background,
        }
    }
}

impl Default for Palette {
    fn default() -> Self {
        Palette::LCD
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Dot {
    Foreground,
    Background,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct RasterGeometry {
    width: usize,
    height: usize,
}

impl RasterGeometry {
    /// Size of the ScopeMeter 105 LCD
    pub const SCOPEMETER_105: RasterGeometry = RasterGeometry {
        width: 240,
        height: 240,
    };

    /// Height has to be a whole number of strips
    pub fn new(width: usize, height: usize) -> Result<Self, DecodeError> {
        if width == 0 || height == 0 || height % STRIP_HEIGHT != 0 {
            return Err(DecodeError::InvalidGeometry { width, height });
        }
        Ok(RasterGeometry { width, height })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn strips(&self) -> usize {
        self.height / STRIP_HEIGHT
    }

    /// Number of column bytes a complete print carries
    pub fn graphics_len(&self) -> usize {
        self.width * self.height / STRIP_HEIGHT
    }
}

impl Default for RasterGeometry {
    fn default() -> Self {
        RasterGeometry::SCOPEMETER_105
    }
}

/// Decoded screen, dots stored row by row from the top left corner
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct RasterImage {
    geometry: RasterGeometry,
    palette: Palette,
    dots: Vec<Dot>,
}

impl RasterImage {
    pub fn width(&self) -> usize {
        self.geometry.width
    }

    pub fn height(&self) -> usize {
        self.geometry.height
    }

    pub fn geometry(&self) -> RasterGeometry {
        self.geometry
    }

    pub fn palette(&self) -> Palette {
        self.palette
    }

    pub fn dots(&self) -> &[Dot] {
        &self.dots
    }

    pub fn dot(&self, x: usize, y: usize) -> Option<Dot> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        Some(self.dots[y * self.width() + x])
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<Rgb> {
        self.dot(x, y).map(|dot| self.palette.color(dot))
    }

    /// Interleaved 8 bit RGB samples, row major
    pub fn to_rgb8(&self) -> Vec<u8> {
        self.dots
            .iter()
            .flat_map(|dot| self.palette.color(*dot).channels())
            .collect()
    }

    /// Frame with crossing diagonals, for checking the output path without a device
    pub fn test_pattern(geometry: RasterGeometry, palette: Palette) -> Self {
        let (w, h) = (geometry.width, geometry.height);
        let dots = (0..h)
            .flat_map(|y| (0..w).map(move |x| (x, y)))
            .map(|(x, y)| {
                let border = x == 0 || y == 0 || x == w - 1 || y == h - 1;
                let diagonal = x * h == y * w || x * h == (h - 1 - y) * w;
                if border || diagonal {
                    Dot::Foreground
                } else {
                    Dot::Background
                }
            })
            .collect();
        RasterImage {
            geometry,
            palette,
            dots,
        }
    }
}

/// Rebuilds the LCD bitmap from the bit image strips of a screen print.
///
/// Each column byte holds eight vertically stacked dots, most significant bit
/// on top. Strips are stacked in the order they appear in the stream.
pub struct RasterDecoder;

impl RasterDecoder {
    pub fn decode(
        payload: &[u8],
        geometry: RasterGeometry,
        palette: Palette,
    ) -> Result<RasterImage, DecodeError> {
        let strips = parse_strips(payload)?;

        let actual = strips.iter().map(|s| s.len()).sum();
        if actual != geometry.graphics_len() {
            return Err(DecodeError::UnexpectedPayloadSize {
                expected: geometry.graphics_len(),
                actual,
            });
        }
        if let Some((strip, columns)) = strips
            .iter()
            .enumerate()
            .find(|(_, columns)| columns.len() != geometry.width)
        {
            return Err(DecodeError::StripWidth {
                strip,
                expected: geometry.width,
                actual: columns.len(),
            });
        }

        let width = geometry.width;
        let mut dots = vec![Dot::Background; width * geometry.height];
        for (strip, columns) in strips.iter().enumerate() {
            for (x, byte) in columns.iter().enumerate() {
                for bit in 0..STRIP_HEIGHT {
                    if byte & (0x80 >> bit) != 0 {
                        dots[(strip * STRIP_HEIGHT + bit) * width + x] = Dot::Foreground;
                    }
                }
            }
        }
        Ok(RasterImage {
            geometry,
            palette,
            dots,
        })
    }
}
