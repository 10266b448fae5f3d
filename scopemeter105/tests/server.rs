#![cfg(feature = "server")]

use pretty_assertions::assert_eq;
use scopemeter105::{
    binblock,
    io_adapter::StdIoAdapter,
    server::{ControlServer, ServerConfig},
    AcquirePolicy, Arbiter, Connector, Error, LinkConfig, LinkError, ScopeMeter,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
};
use utilities::{FakeScope, FakeScopeHandle};

type FakeIo = StdIoAdapter<FakeScope>;

fn fake_connector(handle: FakeScopeHandle) -> impl Connector<Io = FakeIo> + 'static {
    let mut config = LinkConfig::new("fake");
    config.timeout = Duration::from_millis(100);
    move || -> scopemeter105::Result<ScopeMeter<FakeIo>> {
        Ok(ScopeMeter::with_io(StdIoAdapter::new(handle.attach()), &config))
    }
}

fn unplugged_connector() -> impl Connector<Io = FakeIo> + 'static {
    || -> scopemeter105::Result<ScopeMeter<FakeIo>> {
        Err(Error::Link(LinkError::Open {
            path: "/dev/ttyUSB0".to_string(),
            reason: "No such file or directory".to_string(),
        }))
    }
}

async fn start<C: Connector + 'static>(arbiter: Arc<Arbiter<C>>) -> SocketAddr {
    let config = ServerConfig {
        listen: "127.0.0.1:0".parse().unwrap(),
        ..ServerConfig::default()
    };
    let server = ControlServer::bind(&config, arbiter).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.serve());
    addr
}

struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Client {
        let (reader, writer) = TcpStream::connect(addr).await.unwrap().into_split();
        Client {
            reader: BufReader::new(reader),
            writer,
        }
    }

    async fn query(&mut self, request: &str) -> String {
        self.writer
            .write_all(format!("{}\n", request).as_bytes())
            .await
            .unwrap();
        let mut line = String::new();
        self.reader.read_line(&mut line).await.unwrap();
        line.trim_end().to_string()
    }

    async fn query_block(&mut self, request: &str) -> Vec<u8> {
        self.writer
            .write_all(format!("{}\n", request).as_bytes())
            .await
            .unwrap();
        let mut buf = Vec::new();
        loop {
            match binblock::parse(&buf) {
                Ok((_, payload)) => return payload.to_vec(),
                Err(nom::Err::Incomplete(_)) => {
                    let mut chunk = [0u8; 4096];
                    let n = self.reader.read(&mut chunk).await.unwrap();
                    assert!(n > 0, "connection closed mid block");
                    buf.extend_from_slice(&chunk[..n]);
                }
                Err(_) => panic!("not a block: {:?}", String::from_utf8_lossy(&buf)),
            }
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn identify_and_measure() {
    let (_, handle) = FakeScope::new();
    let addr = start(Arc::new(Arbiter::new(fake_connector(handle)))).await;
    let mut client = Client::connect(addr).await;

    assert_eq!(
        client.query("*IDN?").await,
        "FLUKE,ScopeMeter 105 Series II,-,V7.15"
    );
    assert_eq!(client.query("meas:volt:dc?").await, "5.012");
    assert_eq!(client.query("SYST:ERR?").await, "ERR:UNRECOGNIZED");
    assert_eq!(client.query("*IDN?").await, "FLUKE,ScopeMeter 105 Series II,-,V7.15");
}

#[tokio::test(flavor = "multi_thread")]
async fn hard_copy_is_a_png_block() {
    let (_, handle) = FakeScope::new();
    let addr = start(Arc::new(Arbiter::new(fake_connector(handle)))).await;
    let mut client = Client::connect(addr).await;

    let png = client.query_block("HCOPY:DATA?").await;
    let reader = png::Decoder::new(&png[..]).read_info().unwrap();
    assert_eq!((reader.info().width, reader.info().height), (240, 240));
}

#[tokio::test(flavor = "multi_thread")]
async fn errors_keep_the_connection_open() {
    let addr = start(Arc::new(Arbiter::new(unplugged_connector()))).await;
    let mut client = Client::connect(addr).await;

    assert_eq!(client.query("HCOPY:DATA?").await, "ERR:LINK");
    assert_eq!(client.query("*IDN?").await, "ERR:LINK");
    assert_eq!(client.query("bogus").await, "ERR:UNRECOGNIZED");
}

#[tokio::test(flavor = "multi_thread")]
async fn busy_link_is_reported() {
    let (_, handle) = FakeScope::new();
    let arbiter = Arc::new(Arbiter::new(fake_connector(handle)));
    let addr = start(arbiter.clone()).await;
    let mut client = Client::connect(addr).await;

    let lease = arbiter.acquire(AcquirePolicy::Block).unwrap();
    assert_eq!(client.query("*IDN?").await, "ERR:BUSY");
    drop(lease);
    assert_eq!(client.query("*IDN?").await, "FLUKE,ScopeMeter 105 Series II,-,V7.15");
}

#[tokio::test(flavor = "multi_thread")]
async fn clients_are_served_concurrently() {
    let (_, handle) = FakeScope::new();
    let addr = start(Arc::new(Arbiter::new(fake_connector(handle)))).await;
    let mut first = Client::connect(addr).await;
    let mut second = Client::connect(addr).await;

    assert_eq!(second.query("*IDN?").await, "FLUKE,ScopeMeter 105 Series II,-,V7.15");
    assert_eq!(first.query("*IDN?").await, "FLUKE,ScopeMeter 105 Series II,-,V7.15");
}
