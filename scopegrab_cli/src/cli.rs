use crate::{
    output::{Output, Render},
    serial::{parse_time, SerialConf},
};
use clap::{Args, Parser, Subcommand};
use scopemeter105::{server::DEFAULT_LISTEN, MeterField};
use std::{net::SocketAddr, path::PathBuf, time::Duration};

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Lists connected serial devices
    List,
    /// Print model and firmware of the ScopeMeter
    Identify(SerialConf),
    /// Print the status bits reported by the ScopeMeter
    Status(SerialConf),
    /// Read a METER field
    Measure(MeasureConf),
    /// Download the current screen as PNG
    Grab(GrabConf),
    /// Wait for the PRINT button on the ScopeMeter and save what it sends
    Wait(WaitConf),
    /// Save a screenshot at a fixed interval
    Watch(WatchConf),
    /// Render a hex dump of a recorded screen print
    Decode(DecodeConf),
    /// Run the network control server
    Serve(ServeConf),
}

#[derive(Args)]
pub struct MeasureConf {
    /// METER field, 1 to 12
    #[clap(short, long, default_value = "1", value_parser = parse_field)]
    pub field: MeterField,

    /// Also print the reading type and unit
    #[clap(long)]
    pub detail: bool,

    #[clap(flatten)]
    pub serial: SerialConf,
}

fn parse_field(s: &str) -> Result<MeterField, String> {
    let n: u8 = s.parse().map_err(|_| format!("{:?} is not a field number", s))?;
    MeterField::new(n).map_err(|e| e.to_string())
}

#[derive(Args)]
pub struct GrabConf {
    #[clap(flatten)]
    pub output: Output,

    #[clap(flatten)]
    pub serial: SerialConf,
}

#[derive(Args)]
pub struct WaitConf {
    /// How long to wait for the print to start
    #[clap(long, default_value = "60s", value_parser = parse_time)]
    pub wait: Duration,

    #[clap(flatten)]
    pub output: Output,

    #[clap(flatten)]
    pub serial: SerialConf,
}

#[derive(Args)]
pub struct WatchConf {
    /// Directory the screenshots are written to
    #[clap(short, long, default_value = ".", value_hint = clap::ValueHint::DirPath)]
    pub output: PathBuf,

    /// Time between two captures
    #[clap(short, long, default_value = "3s", value_parser = parse_time)]
    pub interval: Duration,

    /// Stop after this many screenshots
    #[clap(short, long, value_parser)]
    pub count: Option<usize>,

    /// End the cycle on the first failed capture
    #[clap(long)]
    pub stop_on_error: bool,

    #[clap(flatten)]
    pub render: Render,

    #[clap(flatten)]
    pub serial: SerialConf,
}

#[derive(Args)]
pub struct DecodeConf {
    /// Hex dump of a `QP` reply
    #[clap(value_parser, value_hint = clap::ValueHint::FilePath)]
    pub input: PathBuf,

    #[clap(flatten)]
    pub output: Output,
}

#[derive(Args)]
pub struct ServeConf {
    /// Address the control server listens on
    #[clap(short, long, default_value = DEFAULT_LISTEN, value_parser)]
    pub listen: SocketAddr,

    #[clap(flatten)]
    pub render: Render,

    #[clap(flatten)]
    pub serial: SerialConf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn measure_arguments() {
        let cli = Cli::try_parse_from([
            "scopegrab", "measure", "--field", "3", "--tty", "/dev/ttyS1",
        ])
        .unwrap();
        match cli.command {
            Commands::Measure(conf) => {
                assert_eq!(conf.field.number(), 3);
                assert_eq!(conf.serial.tty, "/dev/ttyS1");
                assert_eq!(conf.serial.timeout, Duration::from_secs(1));
            }
            _ => panic!("Parsed into the wrong subcommand"),
        }
        assert!(Cli::try_parse_from(["scopegrab", "measure", "--field", "13"]).is_err());
    }

    #[test]
    fn watch_arguments() {
        let cli = Cli::try_parse_from([
            "scopegrab", "watch", "-o", "/tmp", "--interval", "500ms", "--count", "4",
            "--background", "#ffffff",
        ])
        .unwrap();
        match cli.command {
            Commands::Watch(conf) => {
                assert_eq!(conf.interval, Duration::from_millis(500));
                assert_eq!(conf.count, Some(4));
                assert_eq!(conf.render.background.to_string(), "#ffffff");
            }
            _ => panic!("Parsed into the wrong subcommand"),
        }
    }

    #[test]
    fn grab_needs_a_destination() {
        assert!(Cli::try_parse_from(["scopegrab", "grab"]).is_err());
        assert!(Cli::try_parse_from(["scopegrab", "grab", "--auto-name"]).is_ok());
    }
}
