//! Protocol-level definitions for the Emmeti Mirai heat pump Modbus interface.
//!
//! This module holds the serial line parameter types, the device constants and
//! the conversions between raw 16-bit holding register values and display
//! values (degrees Celsius, percent).

use std::fmt;

/// Errors raised while validating protocol values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// The baud rate is not supported by the device.
    #[error("Unsupported baud rate {0}")]
    InvalidBaudRate(u32),

    /// The Modbus slave address is outside `1..=247`.
    #[error("Address {0} out of range ({ADDRESS_MIN}..={ADDRESS_MAX})")]
    AddressOutOfRange(u8),

    /// The value cannot be stored in a 16-bit register with the given encoding.
    #[error("Value {0} cannot be encoded in a 16-bit register")]
    ValueOutOfRange(f64),
}

/// First writable register of the Mirai family. Registers below are read-only.
pub const WRITABLE_ADDRESS_START: u16 = 16384;

/// Fixed-point divisor used by the device for temperatures and percentages.
pub const DEFAULT_SCALE: u16 = 10;

/// Supported serial baud rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BaudRate {
    B1200,
    B2400,
    B4800,
    #[default]
    B9600,
    B19200,
    B38400,
    B57600,
    B115200,
}

impl BaudRate {
    /// All supported rates in ascending order.
    pub const ALL: [BaudRate; 8] = [
        BaudRate::B1200,
        BaudRate::B2400,
        BaudRate::B4800,
        BaudRate::B9600,
        BaudRate::B19200,
        BaudRate::B38400,
        BaudRate::B57600,
        BaudRate::B115200,
    ];
}

impl From<&BaudRate> for u32 {
    fn from(baud_rate: &BaudRate) -> u32 {
        match baud_rate {
            BaudRate::B1200 => 1200,
            BaudRate::B2400 => 2400,
            BaudRate::B4800 => 4800,
            BaudRate::B9600 => 9600,
            BaudRate::B19200 => 19200,
            BaudRate::B38400 => 38400,
            BaudRate::B57600 => 57600,
            BaudRate::B115200 => 115200,
        }
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|rate| u32::from(rate) == value)
            .ok_or(Error::InvalidBaudRate(value))
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u32::from(self))
    }
}

pub const ADDRESS_MIN: u8 = 1;
pub const ADDRESS_MAX: u8 = 247;

/// Modbus RTU slave address of the heat pump controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Address(u8);

impl Address {
    /// Factory default slave address.
    pub const DEFAULT: Address = Address(0x01);
}

impl Default for Address {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl std::ops::Deref for Address {
    type Target = u8;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u8> for Address {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (ADDRESS_MIN..=ADDRESS_MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(Error::AddressOutOfRange(value))
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// Reinterprets a raw register as two's complement when `signed` is set.
pub fn raw_to_integer(raw: u16, signed: bool) -> i32 {
    if signed {
        raw as i16 as i32
    } else {
        raw as i32
    }
}

/// Decodes a raw register into display units.
///
/// Total over `0..=u16::MAX`: a signed register yields a value in
/// `-32768 / scale ..= 32767 / scale`.
pub fn decode_display_value(raw: u16, signed: bool, scale: u16) -> f64 {
    raw_to_integer(raw, signed) as f64 / scale as f64
}

/// Encodes a display value into a raw register: `round(value * scale)`.
///
/// Negative values of signed registers are stored in two's complement.
pub fn encode_display_value(value: f64, signed: bool, scale: u16) -> Result<u16, Error> {
    let scaled = (value * scale as f64).round();
    let range = if signed {
        i16::MIN as f64..=i16::MAX as f64
    } else {
        u16::MIN as f64..=u16::MAX as f64
    };
    if !scaled.is_finite() || !range.contains(&scaled) {
        return Err(Error::ValueOutOfRange(value));
    }
    if signed {
        Ok(scaled as i16 as u16)
    } else {
        Ok(scaled as u16)
    }
}

/// On/off state of a dimmer register: any non-zero level means on.
pub fn dimmer_is_on(raw: u16) -> bool {
    raw > 0
}
