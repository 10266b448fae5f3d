use std::io::Write;

use super::RasterImage;
use crate::error::Result;

/// Free text attached to an exported image as PNG `tEXt` chunks
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct ImageText {
    pub generator: String,
    pub description: String,
    pub comment: String,
}

impl ImageText {
    fn chunks(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("Generator", self.generator.as_str()),
            ("Description", self.description.as_str()),
            ("Comment", self.comment.as_str()),
        ]
        .into_iter()
        .filter(|(_, text)| !text.is_empty())
    }
}

/// Decoded screen together with the text that goes into the exported file
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Screenshot {
    pub image: RasterImage,
    pub text: ImageText,
}

impl Screenshot {
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        write_png(self, &mut out)?;
        Ok(out)
    }
}

/// 8 bit RGB PNG with the [`ImageText`] as `tEXt` chunks
pub fn write_png<W: Write>(shot: &Screenshot, out: W) -> Result<()> {
    let Screenshot { image, text } = shot;
    let mut encoder = png::Encoder::new(out, image.width() as u32, image.height() as u32);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    for (keyword, text) in text.chunks() {
        encoder.add_text_chunk(keyword.to_string(), text.to_string())?;
    }
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&image.to_rgb8())?;
    writer.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{Palette, RasterGeometry};
    use pretty_assertions::assert_eq;

    #[test]
    fn png_round_trip_keeps_pixels_and_text() {
        let image = RasterImage::test_pattern(RasterGeometry::new(16, 8).unwrap(), Palette::LCD);
        let text = ImageText {
            generator: "scopegrab".to_string(),
            description: "FLUKE,ScopeMeter 105,-,V7.15".to_string(),
            comment: "probe A x10".to_string(),
        };
        let shot = Screenshot {
            image: image.clone(),
            text,
        };
        let bytes = shot.to_png().unwrap();

        let mut reader = png::Decoder::new(&bytes[..]).read_info().unwrap();
        let mut buf = vec![0; reader.output_buffer_size()];
        let frame = reader.next_frame(&mut buf).unwrap();
        assert_eq!((frame.width, frame.height), (16, 8));
        assert_eq!(frame.color_type, png::ColorType::Rgb);
        assert_eq!(&buf[..frame.buffer_size()], &image.to_rgb8()[..]);

        let chunks: Vec<(String, String)> = reader
            .info()
            .uncompressed_latin1_text
            .iter()
            .map(|chunk| (chunk.keyword.clone(), chunk.text.clone()))
            .collect();
        assert_eq!(
            chunks,
            vec![
                ("Generator".to_string(), "scopegrab".to_string()),
                ("Description".to_string(), "FLUKE,ScopeMeter 105,-,V7.15".to_string()),
                ("Comment".to_string(), "probe A x10".to_string()),
            ]
        );
    }

    #[test]
    fn empty_text_is_omitted() {
        let image = RasterImage::test_pattern(RasterGeometry::new(8, 8).unwrap(), Palette::LCD);
        let mut bytes = Vec::new();
        write_png(
            &Screenshot {
                image,
                text: ImageText::default(),
            },
            &mut bytes,
        )
        .unwrap();
        let reader = png::Decoder::new(&bytes[..]).read_info().unwrap();
        assert!(reader.info().uncompressed_latin1_text.is_empty());
    }
}
