//! Error taxonomy shared by the record store and the asset cache.

use thiserror::Error;

/// Failures surfaced by the public operations. `Clone` so the store can keep
/// the last error around for passive observers while the calling future also
/// receives it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
  /// The platform denied durable storage (open/create failed, or the
  /// collection name is not a usable identifier).
  #[error("Storage unavailable: {0}")]
  StorageUnavailable(String),

  /// A write transaction aborted or targeted a nonexistent record.
  #[error("Write failed: {0}")]
  WriteFailed(String),

  /// An asset in the precache manifest could not be fetched or stored at
  /// install time.
  #[error("Precache failed: {0}")]
  PrecacheFailed(String),

  /// A live network fetch failed. Never escalated by `respond`, which
  /// degrades to the stored fallback instead.
  #[error("Network error: {0}")]
  Network(String),
}

impl Error {
  pub(crate) fn storage(cause: impl std::fmt::Display) -> Self {
    Error::StorageUnavailable(cause.to_string())
  }

  pub(crate) fn write(cause: impl std::fmt::Display) -> Self {
    Error::WriteFailed(cause.to_string())
  }

  pub(crate) fn precache(cause: impl std::fmt::Display) -> Self {
    Error::PrecacheFailed(cause.to_string())
  }

  pub(crate) fn network(cause: impl std::fmt::Display) -> Self {
    Error::Network(cause.to_string())
  }
}

pub type Result<T> = std::result::Result<T, Error>;
