mod cli;
mod output;
mod serial;

use clap::Parser;
use scopemeter105::{
    hex_parser::decode_screen_dump,
    server::{ControlServer, ServerConfig},
    AcquirePolicy, CaptureSession, CyclicCapture, ProgressSink, RasterDecoder, Screenshot,
};
use simple_eyre::{eyre::eyre, Result};
use std::{
    io::Write,
    sync::{mpsc, Arc},
    time::Duration,
};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use cli::*;
use output::{now, timestamped_path, write_screenshot};

fn main() -> Result<()> {
    simple_eyre::install()?;
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match &cli.command {
        Commands::List => list_serial(),
        Commands::Identify(conf) => identify(conf),
        Commands::Status(conf) => status(conf),
        Commands::Measure(conf) => measure(conf),
        Commands::Grab(conf) => grab(conf),
        Commands::Wait(conf) => wait_for_print(conf),
        Commands::Watch(conf) => watch(conf),
        Commands::Decode(conf) => decode(conf),
        Commands::Serve(conf) => serve(conf),
    }
}

/// Returns std::io::Write stream with coloring enabled if program is run interactively
fn get_stdout() -> StandardStream {
    StandardStream::stdout(if atty::is(atty::Stream::Stdout) {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    })
}

fn list_serial() -> Result<()> {
    let mut stdout = get_stdout();
    let paths = serialport::available_ports()?;
    if paths.is_empty() {
        stdout.set_color(ColorSpec::new().set_fg(Some(Color::Red)))?;
        writeln!(&mut stdout, "No connected serial ports found.")?;
    } else {
        stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
        writeln!(&mut stdout, "Connected serial ports:")?;
    }
    stdout.reset()?;
    paths.iter().for_each(|p| println!("{}", p.port_name));

    Ok(())
}

fn identify(conf: &serial::SerialConf) -> Result<()> {
    let arbiter = conf.arbiter();
    let identity = CaptureSession::new(&arbiter, AcquirePolicy::Block).identify()?;
    println!("{}", identity);
    Ok(())
}

fn status(conf: &serial::SerialConf) -> Result<()> {
    let arbiter = conf.arbiter();
    let status = CaptureSession::new(&arbiter, AcquirePolicy::Block).status()?;

    let mut stdout = get_stdout();
    writeln!(&mut stdout, "Status: {}", status.bits())?;
    stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
    for bit in status.set_bits() {
        writeln!(&mut stdout, "  {}", bit.description())?;
    }
    stdout.reset()?;
    Ok(())
}

fn measure(conf: &MeasureConf) -> Result<()> {
    let arbiter = conf.serial.arbiter();
    let session = CaptureSession::new(&arbiter, AcquirePolicy::Block);
    if conf.detail {
        let m = session.measure_detail(conf.field)?;
        println!("{}: {} {}", m.kind, m.value, m.unit);
    } else {
        println!("{}", session.measure(conf.field)?);
    }
    Ok(())
}

/// Logs every tenth of a long download
fn download_progress() -> impl FnMut(usize, usize) {
    let mut last_step = 0;
    move |received, expected| {
        let step = received * 10 / expected.max(1);
        if step > last_step {
            last_step = step;
            log::info!("Received {}%", step * 10);
        }
    }
}

fn grab(conf: &GrabConf) -> Result<()> {
    let path = conf.output.path()?;
    let arbiter = conf.serial.arbiter();
    let session = CaptureSession::new(&arbiter, AcquirePolicy::Block);
    let mut progress = download_progress();
    let shot = session.capture(
        &conf.output.render.capture_request(),
        Some(&mut progress as &mut dyn ProgressSink),
    )?;
    write_screenshot(&path, &shot)
}

fn wait_for_print(conf: &WaitConf) -> Result<()> {
    let path = conf.output.path()?;
    let arbiter = conf.serial.arbiter();
    let session = CaptureSession::new(&arbiter, AcquirePolicy::Block);
    let mut progress = download_progress();
    let shot = session.await_print(
        &conf.output.render.capture_request(),
        conf.wait,
        Some(&mut progress as &mut dyn ProgressSink),
    )?;
    write_screenshot(&path, &shot)
}

fn watch(conf: &WatchConf) -> Result<()> {
    if !conf.output.is_dir() {
        return Err(eyre!("{:?} is not a directory", conf.output));
    }
    let arbiter = conf.serial.arbiter();
    let request = conf.render.capture_request();
    let dir = conf.output.clone();
    let (done_tx, done_rx) = mpsc::channel::<bool>();

    let job = move || CaptureSession::new(&arbiter, AcquirePolicy::Block).capture(&request, None);
    let on_result = move |result: scopemeter105::Result<Screenshot>| {
        let saved = match result {
            Ok(shot) => {
                match timestamped_path(&dir, now()).and_then(|p| write_screenshot(&p, &shot)) {
                    Ok(()) => true,
                    Err(err) => {
                        log::error!("{}", err);
                        false
                    }
                }
            }
            Err(err) => {
                log::error!("Capture failed: {}", err);
                false
            }
        };
        let _ = done_tx.send(saved);
    };
    let cycle = CyclicCapture::start(conf.interval, conf.stop_on_error, job, on_result);

    let mut saved = 0;
    while conf.count.map_or(true, |count| saved < count) {
        match done_rx.recv_timeout(Duration::from_millis(200)) {
            Ok(true) => saved += 1,
            Ok(false) => {}
            Err(mpsc::RecvTimeoutError::Timeout) if cycle.is_running() => {}
            Err(_) => break,
        }
    }
    cycle.stop();
    log::info!("Saved {} screenshots", saved);
    Ok(())
}

fn decode(conf: &DecodeConf) -> Result<()> {
    let path = conf.output.path()?;
    let dump = std::fs::read_to_string(&conf.input)?;
    let payload = decode_screen_dump(&dump)?;
    let request = conf.output.render.capture_request();
    let image = RasterDecoder::decode(&payload, request.geometry, request.palette)?;
    let shot = Screenshot {
        image,
        text: scopemeter105::ImageText {
            generator: format!("scopegrab {}", env!("CARGO_PKG_VERSION")),
            description: format!("Decoded from {}", conf.input.display()),
            comment: request.comment,
        },
    };
    write_screenshot(&path, &shot)
}

fn serve(conf: &ServeConf) -> Result<()> {
    let config = ServerConfig {
        listen: conf.listen,
        capture: conf.render.capture_request(),
    };
    let arbiter = Arc::new(conf.serial.arbiter());
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let server = ControlServer::bind(&config, arbiter).await?;
        server
            .serve_until(async {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    log::error!("Could not listen for Ctrl-C: {}", err);
                    std::future::pending::<()>().await;
                }
            })
            .await?;
        Ok::<_, simple_eyre::eyre::Report>(())
    })
}

