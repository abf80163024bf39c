use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use mirai_lib::{catalog, poll::PollInterval, protocol as proto, PointKey};
use std::path::PathBuf;
use std::time::Duration;

fn default_device_name() -> String {
    if cfg!(target_os = "windows") {
        String::from("COM1")
    } else {
        String::from("/dev/ttyUSB0") // Common default for USB-to-RS485 adapters on Linux.
    }
}

fn parse_address(s: &str) -> Result<proto::Address, String> {
    let address_val =
        clap_num::maybe_hex::<u8>(s).map_err(|e| format!("Invalid address format: {e}"))?;
    proto::Address::try_from(address_val).map_err(|e| e.to_string())
}

fn parse_baud_rate(s: &str) -> Result<proto::BaudRate, String> {
    let rate_val = s
        .parse::<u32>()
        .map_err(|e| format!("Invalid baud rate number format: {e}"))?;
    proto::BaudRate::try_from(rate_val).map_err(|e| e.to_string())
}

fn parse_poll_interval(s: &str) -> Result<PollInterval, String> {
    let seconds = s
        .trim_end_matches('s')
        .parse::<u32>()
        .map_err(|e| format!("Invalid poll interval format: {e}"))?;
    PollInterval::try_from(seconds).map_err(|e| e.to_string())
}

/// A point given either by name or by register address (decimal or hex).
fn parse_point(s: &str) -> Result<PointKey, String> {
    if s.is_empty() {
        return Err(String::from("Point name must not be empty"));
    }
    Ok(match clap_num::maybe_hex::<u16>(s) {
        Ok(address) => PointKey::Address(address),
        Err(_) => PointKey::Name(s.to_string()),
    })
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// List the points of the register catalog.
    List,

    /// Run one poll cycle and print every point.
    Read,

    /// Read and display a single point.
    ReadPoint {
        /// Point name (e.g. "TEMP_OUTLET") or register address (e.g. "8974", "0x230E").
        #[arg(value_parser = parse_point, verbatim_doc_comment)]
        point: PointKey,
    },

    /// Write a value to a writable point.
    /// The value is given in display units (°C, %) and clamped to the
    /// point's bounds before it is sent.
    #[clap(verbatim_doc_comment)]
    Write {
        /// Point name (e.g. "SP_HOTWATER") or register address (e.g. "16398").
        #[arg(value_parser = parse_point, verbatim_doc_comment)]
        point: PointKey,

        /// Value in display units.
        #[arg(allow_negative_numbers = true)]
        value: f64,

        /// Do not ask for confirmation.
        #[arg(short, long)]
        yes: bool,
    },

    /// Run in daemon mode: poll the heat pump continuously and print the points.
    /// Write commands are read from standard input, one per line: "<POINT> <VALUE>".
    #[clap(verbatim_doc_comment)]
    Daemon {
        /// Poll interval in seconds: 10, 20, 30, 60, 120 or 240.
        #[arg(short, long, default_value = "30", value_parser = parse_poll_interval, verbatim_doc_comment)]
        poll_interval: PollInterval,

        /// Log address and decoded value of every register on every cycle.
        #[arg(long)]
        debug: bool,
    },
}

const fn about_text() -> &'static str {
    "Emmeti Mirai heat pump CLI - Poll and configure the heat pump via Modbus RTU."
}

#[derive(Parser, Debug)]
#[command(name="heatpump", author, version, about=about_text(), long_about = None, propagate_version = true)]
pub struct CliArgs {
    /// Configure verbosity of logging output.
    /// -v for info, -vv for debug, -vvv for trace. Default is warnings only.
    #[command(flatten)]
    pub verbose: Verbosity<WarnLevel>,

    /// Serial port device name.
    /// Examples: "/dev/ttyUSB0" (Linux), "COM3" (Windows).
    #[arg(global = true, short, long, default_value_t = default_device_name(), verbatim_doc_comment)]
    pub device: String,

    /// Baud rate for serial communication.
    /// Supported values: 1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200.
    #[arg(global = true, long, default_value_t = proto::BaudRate::default(), value_parser = parse_baud_rate, verbatim_doc_comment)]
    pub baud_rate: proto::BaudRate,

    /// The Modbus RTU slave address of the heat pump (1 to 247).
    #[arg(global = true, short, long, default_value_t = proto::Address::default(), value_parser = parse_address)]
    pub address: proto::Address,

    /// Modbus I/O timeout of a single register transaction.
    /// Examples: "200ms", "1s".
    #[arg(global = true, long, default_value = "200ms", value_parser = humantime::parse_duration, verbatim_doc_comment)]
    pub timeout: Duration,

    /// Minimum delay between two Modbus transactions.
    /// RS485 converters need time to switch between transmitting and receiving.
    /// Examples: "50ms", "100ms".
    #[arg(global = true, long, default_value = "50ms", value_parser = humantime::parse_duration, verbatim_doc_comment)]
    pub delay: Duration,

    /// YAML register catalog to use instead of the built-in Emmeti Mirai table.
    #[arg(global = true, long)]
    pub catalog: Option<PathBuf>,

    /// Language of the point labels; falls back to English.
    #[arg(global = true, long, default_value = catalog::DEFAULT_LANGUAGE)]
    pub lang: String,

    #[command(subcommand)]
    pub command: CliCommands,
}
