//! Single-register Modbus transactions.
//!
//! [`Transport`] is the seam between the poll engine / command handler and the
//! wire. The RTU implementation lives in [`crate::tokio_sync_client`]; the
//! shared, serialized handle in [`crate::tokio_sync_safe_client`].

use crate::tokio_common::Result;

/// A connection to exactly one Modbus slave.
///
/// Implementations perform no retries and bound every call with their own
/// timeout.
pub trait Transport {
    /// Reads one holding register (function code 3).
    fn read_register(&mut self, address: u16) -> Result<u16>;

    /// Writes one holding register (function code 6).
    fn write_register(&mut self, address: u16, value: u16) -> Result<()>;
}
