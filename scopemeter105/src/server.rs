//! Line based SCPI style control server.
//!
//! Clients send newline terminated commands, replies are a single line or, for
//! binary data, a definite length block. Device work runs on blocking threads and
//! never waits for the link, a busy link answers `ERR:BUSY`.

use std::{future::Future, io, net::SocketAddr, sync::Arc};

use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Decoder, Encoder, Framed};

use crate::{
    arbiter::{AcquirePolicy, Arbiter, Connector},
    binblock,
    error::Result,
    flags::MeterField,
    scope::CaptureRequest,
    session::CaptureSession,
};

pub const DEFAULT_LISTEN: &str = "127.0.0.1:5025";
/// Requests are short, anything longer is not a client we speak with
const MAX_LINE_LEN: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    /// Rendering applied to `HCOPY:DATA?`
    pub capture: CaptureRequest,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen: SocketAddr::from(([127, 0, 0, 1], 5025)),
            capture: CaptureRequest::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `*IDN?`
    Identify,
    /// `MEAS:VOLT:DC?`, the primary METER readout
    MeasureVoltageDc,
    /// `HCOPY:DATA?`, screen as PNG
    HardCopy,
    Unrecognized(String),
}

impl Request {
    /// Commands are case insensitive, short and long SCPI forms are accepted
    pub fn parse(line: &str) -> Request {
        match line.trim().to_ascii_uppercase().as_str() {
            "*IDN?" => Request::Identify,
            "MEAS:VOLT:DC?" | "MEASURE:VOLTAGE:DC?" => Request::MeasureVoltageDc,
            "HCOPY:DATA?" | "HCOP:DATA?" => Request::HardCopy,
            _ => Request::Unrecognized(line.trim().to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Line(String),
    Block(Vec<u8>),
}

impl Reply {
    pub fn error(reason: impl std::fmt::Display) -> Reply {
        Reply::Line(format!("ERR:{}", reason))
    }
}

/// Newline terminated requests in, [`Reply`] frames out
#[derive(Debug, Default)]
pub struct ScpiCodec;

impl Decoder for ScpiCodec {
    type Item = Request;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<Request>> {
        loop {
            let end = match src.iter().position(|b| *b == b'\n') {
                Some(end) => end,
                None if src.len() > MAX_LINE_LEN => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "request line too long",
                    ))
                }
                None => return Ok(None),
            };
            let line = src.split_to(end + 1);
            let line = String::from_utf8_lossy(&line[..end]);
            // CR of CRLF clients and blank keep-alive lines
            let line = line.trim();
            if !line.is_empty() {
                return Ok(Some(Request::parse(line)));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> io::Result<Option<Request>> {
        if let Some(request) = self.decode(src)? {
            return Ok(Some(request));
        }
        // Last request without a newline
        let rest = src.split();
        let line = String::from_utf8_lossy(&rest);
        match line.trim() {
            "" => Ok(None),
            line => Ok(Some(Request::parse(line))),
        }
    }
}

impl Encoder<Reply> for ScpiCodec {
    type Error = io::Error;

    fn encode(&mut self, reply: Reply, dst: &mut BytesMut) -> io::Result<()> {
        match reply {
            Reply::Line(line) => {
                dst.reserve(line.len() + 1);
                dst.extend_from_slice(line.as_bytes());
                dst.extend_from_slice(b"\n");
            }
            Reply::Block(payload) => {
                let block = binblock::encode(&payload)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
                dst.extend_from_slice(&block);
            }
        }
        Ok(())
    }
}

pub struct ControlServer<C: Connector + 'static> {
    listener: TcpListener,
    arbiter: Arc<Arbiter<C>>,
    capture: CaptureRequest,
}

impl<C: Connector + 'static> ControlServer<C> {
    pub async fn bind(config: &ServerConfig, arbiter: Arc<Arbiter<C>>) -> Result<Self> {
        let listener = TcpListener::bind(config.listen).await?;
        log::info!("Control server listening on {}", listener.local_addr()?);
        Ok(ControlServer {
            listener,
            arbiter,
            capture: config.capture.clone(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts clients until the task is dropped
    pub async fn serve(self) -> Result<()> {
        self.serve_until(futures::future::pending::<()>()).await
    }

    /// Accepts clients until `shutdown` resolves. Connections already open keep
    /// being served by their own tasks.
    pub async fn serve_until(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    log::info!("Control server shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            log::warn!("Accept failed: {}", err);
                            continue;
                        }
                    };
                    log::info!("Client {} connected", peer);
                    tokio::spawn(handle_connection(
                        stream,
                        peer,
                        self.arbiter.clone(),
                        self.capture.clone(),
                    ));
                }
            }
        }
    }
}

async fn handle_connection<C: Connector + 'static>(
    stream: TcpStream,
    peer: SocketAddr,
    arbiter: Arc<Arbiter<C>>,
    capture: CaptureRequest,
) {
    let mut framed = Framed::new(stream, ScpiCodec);
    while let Some(request) = framed.next().await {
        let request = match request {
            Ok(request) => request,
            Err(err) => {
                log::warn!("Client {}: {}", peer, err);
                break;
            }
        };
        log::debug!("Client {}: {:?}", peer, request);
        let reply = respond(request, &arbiter, &capture).await;
        if let Err(err) = framed.send(reply).await {
            log::warn!("Client {}: {}", peer, err);
            break;
        }
    }
    log::info!("Client {} disconnected", peer);
}

async fn respond<C: Connector + 'static>(
    request: Request,
    arbiter: &Arc<Arbiter<C>>,
    capture: &CaptureRequest,
) -> Reply {
    if let Request::Unrecognized(line) = &request {
        log::debug!("Unrecognized request {:?}", line);
        return Reply::error("UNRECOGNIZED");
    }
    let arbiter = arbiter.clone();
    let capture = capture.clone();
    let outcome = tokio::task::spawn_blocking(move || execute(&arbiter, &capture, request)).await;
    match outcome {
        Ok(Ok(reply)) => reply,
        Ok(Err(err)) => {
            log::warn!("Request failed: {}", err);
            Reply::error(err.kind())
        }
        Err(err) => {
            log::error!("Device task failed: {}", err);
            Reply::error("INTERNAL")
        }
    }
}

fn execute<C: Connector>(
    arbiter: &Arbiter<C>,
    capture: &CaptureRequest,
    request: Request,
) -> Result<Reply> {
    let session = CaptureSession::new(arbiter, AcquirePolicy::FailFast);
    Ok(match request {
        Request::Identify => Reply::Line(session.idn()?),
        Request::MeasureVoltageDc => {
            Reply::Line(session.measure(MeterField::PRIMARY)?.to_string())
        }
        Request::HardCopy => Reply::Block(session.capture(capture, None)?.to_png()?),
        Request::Unrecognized(_) => Reply::error("UNRECOGNIZED"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_requests() {
        assert_eq!(Request::parse("*IDN?"), Request::Identify);
        assert_eq!(Request::parse("*idn?"), Request::Identify);
        assert_eq!(Request::parse(" meas:volt:dc? "), Request::MeasureVoltageDc);
        assert_eq!(Request::parse("MEASure:VOLTage:DC?"), Request::MeasureVoltageDc);
        assert_eq!(Request::parse("hcopy:data?"), Request::HardCopy);
        assert_eq!(
            Request::parse("SYST:ERR?"),
            Request::Unrecognized("SYST:ERR?".to_string())
        );
    }

    #[test]
    fn decode_lines() {
        let mut codec = ScpiCodec;
        let mut buf = BytesMut::from(&b"*IDN?\r\n\r\n\nHCOPY:DA"[..]);
        assert_ok_eq!(codec.decode(&mut buf), Some(Request::Identify));
        assert_ok_eq!(codec.decode(&mut buf), None);
        buf.extend_from_slice(b"TA?\n");
        assert_ok_eq!(codec.decode(&mut buf), Some(Request::HardCopy));
        assert!(buf.is_empty());

        buf.extend_from_slice(b"*IDN?");
        assert_ok_eq!(codec.decode_eof(&mut buf), Some(Request::Identify));
        assert_ok_eq!(codec.decode_eof(&mut buf), None);
    }

    #[test]
    fn overlong_line_is_refused() {
        let mut codec = ScpiCodec;
        let mut buf = BytesMut::from(&vec![b'A'; MAX_LINE_LEN + 1][..]);
        assert_err!(codec.decode(&mut buf));
    }

    #[test]
    fn encode_replies() {
        let mut codec = ScpiCodec;
        let mut buf = BytesMut::new();
        codec.encode(Reply::Line("FLUKE,ScopeMeter 105,-,V7.15".to_string()), &mut buf).unwrap();
        codec.encode(Reply::error("BUSY"), &mut buf).unwrap();
        codec.encode(Reply::Block(b"PNG".to_vec()), &mut buf).unwrap();
        assert_eq!(&buf[..], &b"FLUKE,ScopeMeter 105,-,V7.15\nERR:BUSY\n#13PNG\n"[..]);
    }
}
