use clap::Args;
use scopemeter105::{write_png, CaptureRequest, Palette, Rgb, Screenshot};
use simple_eyre::{eyre::eyre, Result};
use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};
use time::{format_description::FormatItem, macros::format_description, OffsetDateTime};

#[derive(Args)]
pub struct Render {
    /// Colour of lit LCD dots
    #[clap(long, env = "SCOPEGRAB_FG", default_value = "#222222", value_parser = parse_rgb)]
    pub foreground: Rgb,

    /// Colour of the LCD background
    #[clap(long, env = "SCOPEGRAB_BG", default_value = "#b1e580", value_parser = parse_rgb)]
    pub background: Rgb,

    /// Free text stored in the PNG, e.g. probe settings
    #[clap(long, default_value = "")]
    pub comment: String,
}

fn parse_rgb(s: &str) -> Result<Rgb, String> {
    s.parse()
}

impl Render {
    pub fn capture_request(&self) -> CaptureRequest {
        CaptureRequest {
            palette: Palette {
                foreground: self.foreground,
                background: self.background,
            },
            comment: self.comment.clone(),
            ..CaptureRequest::default()
        }
    }
}

#[derive(Args)]
pub struct Output {
    /// PNG file the screenshot is written to
    #[clap(short, long, value_parser = unique_path_parser, value_hint = clap::ValueHint::FilePath,
           required_unless_present = "auto-name")]
    pub output: Option<PathBuf>,

    /// Name the file after the current time, inside the current directory
    #[clap(long = "auto-name", name = "auto-name", conflicts_with = "output")]
    pub auto_name: bool,

    #[clap(flatten)]
    pub render: Render,
}

fn unique_path_parser(p: &str) -> Result<PathBuf> {
    let p = Path::new(p);
    if p.try_exists()? {
        Err(eyre!("Path {p:?} already exists"))
    } else {
        Ok(p.to_path_buf())
    }
}

impl Output {
    pub fn path(&self) -> Result<PathBuf> {
        match &self.output {
            Some(path) => Ok(path.clone()),
            None => timestamped_path(Path::new("."), now()),
        }
    }
}

const TIMESTAMP_FORMAT: &[FormatItem<'static>] =
    format_description!("[year][month][day]-[hour][minute][second]");

pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// `scopemeter-YYYYMMDD-HHMMSS.png` in `dir`, suffixed with a counter if taken
pub fn timestamped_path(dir: &Path, at: OffsetDateTime) -> Result<PathBuf> {
    let stamp = at.format(TIMESTAMP_FORMAT)?;
    let mut path = dir.join(format!("scopemeter-{}.png", stamp));
    let mut n = 1;
    while path.try_exists()? {
        path = dir.join(format!("scopemeter-{}-{}.png", stamp, n));
        n += 1;
    }
    Ok(path)
}

pub fn write_screenshot(path: &Path, shot: &Screenshot) -> Result<()> {
    log::debug!("Saving screenshot to {:?}", path);
    let out = BufWriter::new(File::create(path)?);
    write_png(shot, out)?;
    log::info!("Saved {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::*;
    use scopemeter105::{ImageText, RasterGeometry, RasterImage};
    use time::macros::datetime;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("scopegrab-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn timestamped_names_do_not_collide() {
        let dir = scratch_dir("names");
        let at = datetime!(2024-03-01 14:05:09 UTC);
        let first = timestamped_path(&dir, at).unwrap();
        assert_eq!(first, dir.join("scopemeter-20240301-140509.png"));
        File::create(&first).unwrap();
        let second = timestamped_path(&dir, at).unwrap();
        assert_eq!(second, dir.join("scopemeter-20240301-140509-1.png"));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn existing_output_is_refused() {
        let dir = scratch_dir("refuse");
        let taken = dir.join("taken.png");
        File::create(&taken).unwrap();
        assert_err!(unique_path_parser(taken.to_str().unwrap()));
        assert_ok!(unique_path_parser(dir.join("free.png").to_str().unwrap()));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn screenshot_is_written() {
        let dir = scratch_dir("write");
        let path = dir.join("shot.png");
        let shot = Screenshot {
            image: RasterImage::test_pattern(RasterGeometry::SCOPEMETER_105, Palette::LCD),
            text: ImageText::default(),
        };
        write_screenshot(&path, &shot).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], b"\x89PNG");
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn colours_from_flags() {
        assert_ok_eq!(parse_rgb("#abc"), Rgb(0xa0, 0xb0, 0xc0));
        assert_err!(parse_rgb("chartreuse"));
    }
}
