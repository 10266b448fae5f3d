use lazy_static::lazy_static;
use manifest_dir_macros::exist_relative_path;
use mockall::mock;
use nom::{
    bytes::complete::take_while_m_n,
    character::complete::multispace0,
    combinator::{all_consuming, map_res},
    multi::many1,
    sequence::delimited,
    IResult,
};
use std::{
    collections::VecDeque,
    io::{Read, Write},
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

/// Decodes a pair of chars formatted as hex into a byte. For example "FF" -> 255
fn hex_byte(input: &str) -> IResult<&str, u8> {
    map_res(
        take_while_m_n(2, 2, |c: char| c.is_ascii_hexdigit()),
        |hex| u8::from_str_radix(hex, 16),
    )(input)
}

fn parse_hex_str(input: &str) -> IResult<&str, Vec<u8>> {
    all_consuming(many1(delimited(multispace0, hex_byte, multispace0)))(input)
}

lazy_static! {
    /// Synthetic `QP` reply of a 240x240 frame with a border and both diagonals: ack,
    /// header, ESC/P payload and checksum. Its 7420 byte payload is shorter than the
    /// 7454 bytes a real device announces.
    pub static ref SCREEN_PRINT: Vec<u8> = {
        let hex_str = include_str!(exist_relative_path!(
            "../resources/test/screen_print_example.txt"
        ));
        let (_, data) = parse_hex_str(hex_str)
            .expect("Failed to parse resources/test/screen_print_example.txt");
        data
    };
}

/// `SCREEN_PRINT` without the acknowledgement, i.e. what a PRINT button press sends
pub fn screen_print_frame() -> Vec<u8> {
    SCREEN_PRINT[2..].to_vec()
}

mock! {
    pub IO {}
    impl Read for IO {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
    }
    impl Write for IO {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize>;
        fn flush(&mut self) -> std::io::Result<()>;
    }
}

/// Hands out its data 1, 2 or 3 bytes at a time, writes are collected
pub struct ChunkedReader {
    data: Vec<u8>,
    pos: usize,
    calls: usize,
    pub written: Vec<u8>,
}

impl ChunkedReader {
    pub fn new(data: &[u8]) -> Self {
        ChunkedReader {
            data: data.to_vec(),
            pos: 0,
            calls: 0,
            written: Vec::new(),
        }
    }
}

impl Read for ChunkedReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = (1 + self.calls % 3)
            .min(self.data.len() - self.pos)
            .min(buf.len());
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        self.calls += 1;
        Ok(n)
    }
}

impl Write for ChunkedReader {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

const DEFAULT_IDENTITY: &str = "ScopeMeter 105 Series II; V7.15; 96-02-06; English V2.15; ; 0";

struct FakeState {
    commands: Vec<String>,
    output: VecDeque<u8>,
    silent: bool,
    ignore_next_step_up: bool,
    identity: String,
    status: u16,
    value: String,
    print: Option<Vec<u8>>,
    print_delay: Duration,
    /// Rendered print and when it starts going out
    pending_print: Option<(Instant, Vec<u8>)>,
}

/// Scripted ScopeMeter answering `PC`, `ID`, `IS`, `QM` and `QP`
pub struct FakeScope {
    state: Arc<Mutex<FakeState>>,
    input: Vec<u8>,
    max_chunk: usize,
}

/// Shared view on a [`FakeScope`] that was moved into a connection
#[derive(Clone)]
pub struct FakeScopeHandle(Arc<Mutex<FakeState>>);

fn lock(state: &Mutex<FakeState>) -> MutexGuard<'_, FakeState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl FakeScope {
    pub fn new() -> (FakeScope, FakeScopeHandle) {
        let state = Arc::new(Mutex::new(FakeState {
            commands: Vec::new(),
            output: VecDeque::new(),
            silent: false,
            ignore_next_step_up: false,
            identity: DEFAULT_IDENTITY.to_string(),
            status: 265,
            value: "+5.012E+00".to_string(),
            print: Some(screen_print_frame()),
            print_delay: Duration::ZERO,
            pending_print: None,
        }));
        let scope = FakeScope {
            state: state.clone(),
            input: Vec::new(),
            max_chunk: 64,
        };
        (scope, FakeScopeHandle(state))
    }

    /// Largest number of bytes a single read returns
    pub fn with_max_chunk(mut self, max_chunk: usize) -> Self {
        self.max_chunk = max_chunk.max(1);
        self
    }

    fn respond(state: &mut FakeState, command: &str) {
        state.commands.push(command.to_string());
        if state.silent {
            return;
        }
        let reply: Vec<u8> = match command {
            c if c.starts_with("PC") => {
                if state.ignore_next_step_up {
                    state.ignore_next_step_up = false;
                    return;
                }
                b"0\r".to_vec()
            }
            "ID" => format!("0\r{}\r", state.identity).into_bytes(),
            "IS" => format!("0\r{}\r", state.status).into_bytes(),
            "QP" => match &state.print {
                Some(print) if state.print_delay > Duration::ZERO => {
                    state.pending_print = Some((Instant::now() + state.print_delay, print.clone()));
                    b"0\r".to_vec()
                }
                Some(print) => [&b"0\r"[..], &print[..]].concat(),
                None => b"2\r".to_vec(),
            },
            c if c.starts_with("QM") => {
                let (field, value_only) = match c[2..].strip_suffix(",V") {
                    Some(field) => (field, true),
                    None => (&c[2..], false),
                };
                match field.parse::<u8>() {
                    Ok(1..=12) if value_only => format!("0\r{}\r", state.value).into_bytes(),
                    Ok(1..=12) => format!("0\rV DC,{},V\r", state.value).into_bytes(),
                    _ => b"1\r".to_vec(),
                }
            }
            _ => b"1\r".to_vec(),
        };
        state.output.extend(reply);
    }
}

impl Read for FakeScope {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut state = lock(&self.state);
        if matches!(&state.pending_print, Some((ready, _)) if Instant::now() >= *ready) {
            if let Some((_, print)) = state.pending_print.take() {
                state.output.extend(print);
            }
        }
        let n = buf.len().min(self.max_chunk).min(state.output.len());
        for (slot, byte) in buf.iter_mut().zip(state.output.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for FakeScope {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.input.extend_from_slice(buf);
        while let Some(end) = self.input.iter().position(|b| *b == b'\r') {
            let command: Vec<u8> = self.input.drain(..=end).collect();
            let command = String::from_utf8_lossy(&command[..end]).to_string();
            FakeScope::respond(&mut lock(&self.state), &command);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl FakeScopeHandle {
    /// New connection to the same device, e.g. after the previous one was dropped
    pub fn attach(&self) -> FakeScope {
        FakeScope {
            state: self.0.clone(),
            input: Vec::new(),
            max_chunk: 64,
        }
    }

    /// Every command received so far, without the terminator
    pub fn commands(&self) -> Vec<String> {
        lock(&self.0).commands.clone()
    }

    /// A silent device swallows commands without acknowledging them
    pub fn set_silent(&self, silent: bool) {
        lock(&self.0).silent = silent;
    }

    /// Leaves the next line speed request unanswered, like a device still at 19200
    pub fn ignore_next_step_up(&self) {
        lock(&self.0).ignore_next_step_up = true;
    }

    pub fn set_identity(&self, identity: &str) {
        lock(&self.0).identity = identity.to_string();
    }

    pub fn set_value(&self, value: &str) {
        lock(&self.0).value = value.to_string();
    }

    /// Frame returned for `QP`, `None` makes the device reject the request
    pub fn set_print(&self, print: Option<Vec<u8>>) {
        lock(&self.0).print = print;
    }

    /// Time the device spends rendering a requested print between the
    /// acknowledgement and the length header
    pub fn set_print_delay(&self, delay: Duration) {
        lock(&self.0).print_delay = delay;
    }

    /// Queues unsolicited bytes, as sent after pressing PRINT on the device
    pub fn push_output(&self, bytes: &[u8]) {
        lock(&self.0).output.extend(bytes.iter().copied());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::*;

    #[test]
    fn hex_byte_parser() {
        assert_ok_eq!(hex_byte("FF"), ("", 255));
        assert_ok_eq!(hex_byte("ff"), ("", 255));
        assert_err!(hex_byte("NH"));
    }

    #[test]
    fn screen_print_fixture() {
        assert_eq!(&SCREEN_PRINT[..7], b"0\r7420,");
        assert_eq!(SCREEN_PRINT.len(), 7 + 7420 + 1);
    }

    #[test]
    fn chunked_reads() {
        let mut reader = ChunkedReader::new(b"abcdefg");
        let mut buf = [0u8; 8];
        let sizes: Vec<usize> = (0..5).map(|_| reader.read(&mut buf).unwrap()).collect();
        assert_eq!(sizes, vec![1, 2, 3, 1, 0]);
    }

    #[test]
    fn fake_scope_answers() {
        let (scope, handle) = FakeScope::new();
        let mut scope = scope.with_max_chunk(4);
        scope.write_all(b"ID\rQM13,V\r").unwrap();
        let mut out = Vec::new();
        let mut buf = [0u8; 16];
        loop {
            let n = scope.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            assert!(n <= 4);
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!("0\r{}\r1\r", DEFAULT_IDENTITY)
        );
        assert_eq!(handle.commands(), vec!["ID".to_string(), "QM13,V".to_string()]);
    }
}
