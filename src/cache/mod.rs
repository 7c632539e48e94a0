//! Versioned response cache for application assets and offline support.
//!
//! This module resolves intercepted asset requests without ever failing:
//! - Looks up the current bucket first; a hit skips the network entirely
//! - Falls through to a preloaded navigation response, then a live fetch
//! - Degrades to the stored offline page, then a synthesized 408
//! - Rolls versions over by precaching a manifest and sweeping stale buckets

pub mod bucket;
pub mod client;
pub mod lifecycle;
pub mod manager;
pub mod response;

pub use bucket::{BucketStorage, SqliteBuckets};
pub use client::{AssetClient, AssetGateway};
pub use lifecycle::{NavigationPreload, CACHE_VERSION, PRECACHE_MANIFEST};
pub use manager::ResponseCache;
pub use response::{AssetRequest, CachedResponse, PreloadedResponse};
