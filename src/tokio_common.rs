//! This module provides common data structures and error types for the
//! `tokio-modbus` based transport.
//!
//! It defines the `Error` enum, which encapsulates all possible communication
//! errors of a single register transaction.

/// Represents all possible errors of a single Modbus transaction.
///
/// Every variant is recoverable: the poll engine absorbs it and the command
/// handler hands it back to its caller.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Wraps `tokio_modbus::ExceptionCode`.
    #[error(transparent)]
    TokioExceptionError(#[from] tokio_modbus::ExceptionCode),

    /// Wraps `tokio_modbus::Error` (timeouts, framing and CRC failures).
    #[error(transparent)]
    TokioError(#[from] tokio_modbus::Error),

    /// The serial port could not be opened.
    #[error("Serial port unavailable: {0}")]
    PortUnavailable(#[from] std::io::Error),

    /// The device answered with an unexpected number of registers.
    #[error("Unexpected response: expected {expected} register(s), got {actual}")]
    UnexpectedResponse { expected: usize, actual: usize },
}

/// The result type for transport operations.
pub type Result<T> = std::result::Result<T, crate::tokio_common::Error>;

/// Maps the nested `tokio-modbus` result onto our result.
pub(crate) fn map_tokio_result<T>(result: tokio_modbus::Result<T>) -> Result<T> {
    match result {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(err)) => Err(err.into()), // Modbus exception
        Err(err) => Err(err.into()),     // IO error
    }
}

#[cfg(feature = "tokio-rtu-sync")]
mod serial {
    use crate::protocol as proto;

    /// The parity used by the heat pump controller.
    pub const PARITY: &tokio_serial::Parity = &tokio_serial::Parity::Even;
    /// The number of stop bits used for serial communication.
    pub const STOP_BITS: &tokio_serial::StopBits = &tokio_serial::StopBits::One;
    /// The number of data bits used for serial communication.
    pub const DATA_BITS: &tokio_serial::DataBits = &tokio_serial::DataBits::Eight;

    /// Creates a `tokio_serial::SerialPortBuilder` with the device's line settings.
    ///
    /// # Arguments
    ///
    /// * `device` - The path to the serial port device (e.g., `/dev/ttyUSB0`).
    /// * `baud_rate` - The baud rate for the serial communication.
    pub fn serial_port_builder(
        device: &str,
        baud_rate: &proto::BaudRate,
    ) -> tokio_serial::SerialPortBuilder {
        tokio_serial::new(device, u32::from(baud_rate))
            .parity(*PARITY)
            .stop_bits(*STOP_BITS)
            .data_bits(*DATA_BITS)
            .flow_control(tokio_serial::FlowControl::None)
    }
}

#[cfg(feature = "tokio-rtu-sync")]
pub use serial::*;
