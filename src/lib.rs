//! linkorg: an offline-first bookmark data layer.
//!
//! Two subsystems make up the crate. The [`store`] module is a
//! transactional SQLite link collection with an in-memory projection kept
//! in write-through sync. The [`cache`] module is a versioned bucket of
//! network responses with cache-first resolution and an install/activate
//! lifecycle. Presentation is a collaborator; the bundled binary is a thin
//! CLI over the public operations.

pub mod cache;
pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use store::LinkStore;
pub use types::{Link, LinkDraft, LinkId};
