//! A library for polling an Emmeti Mirai heat pump controller via Modbus RTU.
//!
//! The crate exposes the controller's holding registers as named, typed points
//! (temperatures, setpoints, compressor level) and lets the writable ones be
//! changed safely.
//!
//! ## Building blocks
//!
//! - [`catalog`]: the validated table of points with their address, decode
//!   rule, writability and labels.
//! - [`transport`]: the single-register read/write seam. [`tokio_sync_client`]
//!   implements it over Modbus RTU, opening the serial port per transaction;
//!   [`tokio_sync_safe_client`] shares one transport between threads.
//! - [`poll`]: the tick-driven poll engine with adaptive back-off.
//! - [`command`]: validated, clamped writes.
//! - [`cache`]: last-known values and the records handed to a presentation
//!   layer.
//!
//! ## Quick Start
//!
//! ```no_run
//! use mirai_lib::{
//!     catalog::Catalog,
//!     command::CommandHandler,
//!     poll::{PollEngine, PollInterval},
//!     protocol::{Address, BaudRate},
//!     tokio_sync_client::RtuClient,
//!     tokio_sync_safe_client::SafeClient,
//! };
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let catalog = Arc::new(Catalog::emmeti_mirai()?);
//!     let transport = SafeClient::new(RtuClient::new(
//!         "/dev/ttyUSB0",
//!         &BaudRate::B9600,
//!         Address::default(),
//!     ));
//!
//!     let mut engine = PollEngine::new(catalog.clone(), transport.clone(), PollInterval::S30);
//!     let mut commands = CommandHandler::new(catalog.clone(), transport, engine.cache());
//!
//!     let report = engine.run_cycle();
//!     println!("Read {} point(s), {} error(s)", report.read, report.errors);
//!
//!     let applied = commands.submit_write("SP_HOTWATER", 48.0)?;
//!     println!("Hot water setpoint is now {applied} °C");
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod catalog;
pub mod command;
pub mod poll;
pub mod protocol;
pub mod tokio_common;
pub mod transport;

mod error;
pub use error::{Error, PointKey, Result};
pub use tokio_common::Error as TransportError;

#[cfg_attr(docsrs, doc(cfg(feature = "tokio-rtu-sync")))]
#[cfg(feature = "tokio-rtu-sync")]
pub mod tokio_sync_client;

pub mod tokio_sync_safe_client;
