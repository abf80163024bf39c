//! Synchronous `tokio-modbus` RTU client for the heat pump controller.
//!
//! [`RtuClient`] opens the serial port for every transaction and closes it
//! again once the transaction is finished, successful or not. No connection is
//! held between calls, so the line can be shared with other pollers.
//!
//! ## Example
//!
//! ```no_run
//! use mirai_lib::{
//!     protocol::{Address, BaudRate},
//!     tokio_sync_client::RtuClient,
//!     transport::Transport,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = RtuClient::new("/dev/ttyUSB0", &BaudRate::B9600, Address::default());
//!     let raw = client.read_register(8973)?;
//!     println!("External temperature register: {raw}");
//!     Ok(())
//! }
//! ```

use crate::{
    protocol as proto,
    tokio_common::{self, map_tokio_result, Result},
    transport::Transport,
};
use std::time::{Duration, Instant};
use tokio_modbus::client::sync::{rtu, Context};
use tokio_modbus::prelude::{SyncReader, SyncWriter};

/// Default budget of a single transaction.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(200);
/// Default silence between two transactions.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(50);

/// Calculates the minimum recommended delay for Modbus RTU based on baud rate.
/// This is 3.5 character times of 11 bits each.
pub fn minimum_rtu_delay(baud_rate: &proto::BaudRate) -> Duration {
    let bits_per_char = 11.0; // start + 8 data + parity + stop
    let rate = u32::from(baud_rate) as f64;
    let char_time_secs = bits_per_char / rate;
    let inter_frame_delay_secs = 3.5 * char_time_secs;
    let delay_micros = (inter_frame_delay_secs * 1_000_000.0) as u64;

    // Modbus mandates a fixed 1.75ms silence above 19200 baud.
    const PRACTICAL_MIN_INTER_FRAME_DELAY_MICROS: u64 = 1_750;
    Duration::from_micros(delay_micros.max(PRACTICAL_MIN_INTER_FRAME_DELAY_MICROS))
}

/// Returns the user delay, raised to the RTU minimum for `baud_rate` if needed.
pub fn check_rtu_delay(user_delay: Duration, baud_rate: &proto::BaudRate) -> Duration {
    let min_rtu_delay = minimum_rtu_delay(baud_rate);
    if user_delay < min_rtu_delay {
        log::warn!(
            "RTU delay of {user_delay:?} is below the recommended minimum of {min_rtu_delay:?} for {baud_rate} baud. Using minimum."
        );
        min_rtu_delay
    } else {
        user_delay
    }
}

/// Modbus RTU connection to a single heat pump controller.
pub struct RtuClient {
    builder: tokio_serial::SerialPortBuilder,
    baud_rate: proto::BaudRate,
    slave: tokio_modbus::Slave,
    timeout: Duration,
    delay: Duration,
    last_transaction: Option<Instant>,
}

impl RtuClient {
    /// Creates a client for the device at `address` on the serial port `device`.
    ///
    /// The port is not opened here; it is opened for each transaction.
    pub fn new(device: &str, baud_rate: &proto::BaudRate, address: proto::Address) -> Self {
        Self {
            builder: tokio_common::serial_port_builder(device, baud_rate),
            baud_rate: *baud_rate,
            slave: tokio_modbus::Slave(*address),
            timeout: DEFAULT_TIMEOUT,
            delay: check_rtu_delay(DEFAULT_DELAY, baud_rate),
            last_transaction: None,
        }
    }

    /// Sets the timeout of a single transaction.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Retrieves the timeout of a single transaction.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sets the minimum silence between two transactions.
    ///
    /// Values below 3.5 character times for the configured baud rate are
    /// raised to that minimum.
    pub fn set_delay(&mut self, delay: Duration) {
        self.delay = check_rtu_delay(delay, &self.baud_rate);
    }

    /// Retrieves the minimum silence between two transactions.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    fn wait_for_line(&self) {
        if let Some(last) = self.last_transaction {
            let elapsed = last.elapsed();
            if elapsed < self.delay {
                std::thread::sleep(self.delay - elapsed);
            }
        }
    }

    /// Opens the port, runs one request and closes the port again.
    fn transaction<T, F>(&mut self, request: F) -> Result<T>
    where
        F: FnOnce(&mut Context) -> tokio_modbus::Result<T>,
    {
        self.wait_for_line();
        let result = match rtu::connect_slave(&self.builder, self.slave) {
            Ok(mut ctx) => {
                ctx.set_timeout(self.timeout);
                let result = map_tokio_result(request(&mut ctx));
                // Dropping the context releases the serial handle.
                drop(ctx);
                result
            }
            Err(err) => Err(err.into()),
        };
        self.last_transaction = Some(Instant::now());
        result
    }
}

impl Transport for RtuClient {
    fn read_register(&mut self, address: u16) -> Result<u16> {
        let registers = self.transaction(|ctx| ctx.read_holding_registers(address, 1))?;
        match registers.as_slice() {
            [value] => Ok(*value),
            _ => Err(tokio_common::Error::UnexpectedResponse {
                expected: 1,
                actual: registers.len(),
            }),
        }
    }

    fn write_register(&mut self, address: u16, value: u16) -> Result<()> {
        self.transaction(|ctx| ctx.write_single_register(address, value))
    }
}
