use clap::Args;
use scopemeter105::{Arbiter, LinkConfig, SerialConnector};
use simple_eyre::Result;
use std::time::Duration;

#[cfg(windows)]
const DEFAULT_TTY: &str = "COM3";
#[cfg(not(windows))]
const DEFAULT_TTY: &str = "/dev/ttyUSB0";

#[derive(Args)]
pub struct SerialConf {
    /// Serial port the ScopeMeter cable is attached to
    #[clap(short, long, env = "SCOPEGRAB_TTY", default_value = DEFAULT_TTY, value_parser)]
    pub tty: String,

    /// Time allowed for acknowledgements and short replies, e.g. "1s" or "500ms"
    #[clap(long, default_value = "1s", value_parser = parse_time)]
    pub timeout: Duration,

    /// Time allowed for downloading a complete screen
    #[clap(long, default_value = "20s", value_parser = parse_time)]
    pub transfer_timeout: Duration,
}

pub fn parse_time(s: &str) -> Result<Duration, parse_duration::parse::Error> {
    parse_duration::parse(s)
}

impl SerialConf {
    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            path: self.tty.clone(),
            timeout: self.timeout,
            transfer_timeout: self.transfer_timeout,
        }
    }

    /// The only way front-ends reach the device, every request runs under a lease
    pub fn arbiter(&self) -> Arbiter<SerialConnector> {
        Arbiter::new(SerialConnector::new(self.link_config()))
    }
}
