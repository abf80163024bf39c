use crate::{catalog::CatalogError, protocol as proto, tokio_common};
use std::fmt;

/// Identifies the point a lookup was made for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointKey {
    Name(String),
    Address(u16),
}

impl fmt::Display for PointKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PointKey::Name(name) => write!(f, "name '{name}'"),
            PointKey::Address(address) => write!(f, "address {address}"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No catalog entry matches the requested name or address.
    #[error("No point with {0}")]
    NotFound(PointKey),

    /// The point is read-only; no transaction was attempted.
    #[error("Point '{0}' is read-only")]
    NotWritable(String),

    /// The requested value cannot be encoded for the point.
    #[error("Invalid value for point '{name}': {source}")]
    InvalidValue { name: String, source: proto::Error },

    /// The register transaction failed.
    #[error("Transport error: {0}")]
    Transport(#[from] tokio_common::Error),

    /// The catalog is inconsistent.
    #[error("Invalid catalog: {0}")]
    Catalog(#[from] CatalogError),
}

pub type Result<T> = std::result::Result<T, Error>;
