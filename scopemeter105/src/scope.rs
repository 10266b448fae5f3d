use crate::{
    checksum::{validate, CHECKSUM_SIZE},
    command::Command,
    error::{Error, Result},
    flags::MeterField,
    io_adapter::IoAdapter,
    link::{deadline_after, is_expired, Link, LinkConfig, ProgressSink, IDLE_BACKOFF},
    raster::{ImageText, Palette, RasterDecoder, RasterGeometry, Screenshot},
    response::{
        parser::{
            align_print_header, parse_identity, parse_length_header, parse_measurement,
            parse_status, parse_value, LENGTH_HEADER_SIZE,
        },
        Identity, Measurement, Status,
    },
};
use std::{thread, time::Duration};

/// Bytes pulled per poll while waiting for an unsolicited print
const SCAN_CHUNK: usize = 64;
/// Trailing bytes kept between polls so a header split across reads is still found
const SCAN_KEEP: usize = LENGTH_HEADER_SIZE - 1;

/// How a captured screen is rendered and annotated
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct CaptureRequest {
    pub palette: Palette,
    pub geometry: RasterGeometry,
    pub comment: String,
}

impl Default for CaptureRequest {
    fn default() -> Self {
        CaptureRequest {
            palette: Palette::default(),
            geometry: RasterGeometry::SCOPEMETER_105,
            comment: String::new(),
        }
    }
}

pub struct ScopeMeter<IO: IoAdapter> {
    link: Link<IO>,
}

impl<IO: IoAdapter> ScopeMeter<IO> {
    pub fn new(link: Link<IO>) -> Self {
        ScopeMeter { link }
    }

    /// Same as [`ScopeMeter::new`] for adapters that are not a serial port
    pub fn with_io(io: IO, config: &LinkConfig) -> Self {
        ScopeMeter::new(Link::new(io, config))
    }

    pub fn negotiate(&mut self) -> Result<()> {
        self.link.negotiate()
    }

    pub fn identify(&mut self) -> Result<Identity> {
        self.link.exchange(&Command::Identify)?;
        parse_identity(&self.link.read_line()?)
    }

    /// `*IDN?` style identification line
    pub fn idn(&mut self) -> Result<String> {
        Ok(self.identify()?.idn())
    }

    /// Numeric value of one METER readout
    pub fn query_measurement(&mut self, field: MeterField) -> Result<f64> {
        self.link.exchange(&Command::QueryMeasurement {
            field,
            value_only: true,
        })?;
        parse_value(&self.link.read_line()?)
    }

    /// Readout including its kind and unit
    pub fn query_measurement_detail(&mut self, field: MeterField) -> Result<Measurement> {
        self.link.exchange(&Command::QueryMeasurement {
            field,
            value_only: false,
        })?;
        parse_measurement(&self.link.read_line()?)
    }

    pub fn status(&mut self) -> Result<Status> {
        self.link.exchange(&Command::Status)?;
        parse_status(&self.link.read_line()?)
    }

    /// Asks for a screen print and decodes it.
    ///
    /// The device renders the print before it answers, so the acknowledgement and the
    /// length header get the transfer budget instead of the command timeout.
    pub fn capture_screen(
        &mut self,
        req: &CaptureRequest,
        progress: Option<&mut dyn ProgressSink>,
    ) -> Result<Screenshot> {
        let budget = self.link.transfer_timeout();
        self.link.exchange_within(&Command::QueryPrint, budget)?;
        let header = self.link.read_exact(LENGTH_HEADER_SIZE, budget, None)?;
        let len = parse_length_header(&header)?;
        log::info!("Downloading {} bytes of screen data", len);
        self.receive_print(len, Vec::new(), req, progress)
    }

    /// Waits up to `wait` for a print started with the PRINT button on the device.
    ///
    /// No command is sent, the incoming bytes are scanned for a plausible length header.
    pub fn await_print(
        &mut self,
        req: &CaptureRequest,
        wait: Duration,
        progress: Option<&mut dyn ProgressSink>,
    ) -> Result<Screenshot> {
        log::info!("Waiting for PRINT on the device");
        let deadline = deadline_after(wait);
        let mut window: Vec<u8> = Vec::new();
        let mut chunk = [0u8; SCAN_CHUNK];
        let mut received = 0;
        loop {
            let count = self.link.read_some(&mut chunk)?;
            if count == 0 {
                if is_expired(deadline) {
                    return Err(Error::LinkTimeout {
                        expected: LENGTH_HEADER_SIZE,
                        received,
                    });
                }
                thread::sleep(IDLE_BACKOFF);
                continue;
            }
            received += count;
            window.extend_from_slice(&chunk[..count]);
            if let Ok((tail, len)) = align_print_header(&window) {
                log::info!("Print started, {} bytes announced", len);
                let head = tail.to_vec();
                return self.receive_print(len, head, req, progress);
            }
            let keep = window.len().min(SCAN_KEEP);
            window.drain(..window.len() - keep);
        }
    }

    /// Reads the rest of a `len` byte payload plus checksum, `head` holds payload bytes
    /// that already arrived
    fn receive_print(
        &mut self,
        len: usize,
        mut head: Vec<u8>,
        req: &CaptureRequest,
        progress: Option<&mut dyn ProgressSink>,
    ) -> Result<Screenshot> {
        let total = len + CHECKSUM_SIZE;
        if head.len() < total {
            let rest = self.link.read_exact(
                total - head.len(),
                self.link.transfer_timeout(),
                progress,
            )?;
            head.extend(rest);
        }
        head.truncate(total);
        let (payload, sum) = head.split_at(len);
        if let Err(err) = validate(payload, sum) {
            log::warn!("{}", err);
            return Err(err.into());
        }
        let image = RasterDecoder::decode(payload, req.geometry, req.palette)?;
        Ok(Screenshot {
            image,
            text: ImageText {
                generator: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
                description: "Fluke ScopeMeter 105 screenshot".to_string(),
                comment: req.comment.clone(),
            },
        })
    }

    pub fn into_link(self) -> Link<IO> {
        self.link
    }

    pub fn close(self) {
        self.link.close()
    }
}
