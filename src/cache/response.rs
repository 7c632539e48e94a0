//! Request and response value types for the asset cache.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use url::Url;

/// Identity of an asset request: uppercase method plus target identifier.
///
/// The identifier may be absolute (`https://host/x`) or origin-relative
/// (`/x`); it is stored verbatim and only resolved against the configured
/// origin when a live fetch happens, so cache keys written in one style
/// always line up with lookups written in the same style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRequest {
  method: String,
  url: String,
}

impl AssetRequest {
  pub fn new(method: &str, url: &str) -> Self {
    Self {
      method: method.to_uppercase(),
      url: url.to_string(),
    }
  }

  pub fn get(url: &str) -> Self {
    Self::new("GET", url)
  }

  pub fn method(&self) -> &str {
    &self.method
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  /// Stable storage key: sha256 over `METHOD:URL`.
  pub fn entry_key(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b":");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }

  /// Whether a response for this request may be stored.
  ///
  /// Only http(s) targets are cached. Relative identifiers count as
  /// cacheable because they resolve against the configured origin; foreign
  /// schemes (extension pages, data URLs) never enter the bucket.
  pub fn is_cacheable(&self) -> bool {
    match Url::parse(&self.url) {
      Ok(url) => matches!(url.scheme(), "http" | "https"),
      Err(url::ParseError::RelativeUrlWithoutBase) => true,
      Err(_) => false,
    }
  }
}

/// A stored (or storable) response: status, headers, body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
  pub status: u16,
  pub headers: BTreeMap<String, String>,
  pub body: Vec<u8>,
}

impl CachedResponse {
  pub fn new(status: u16, headers: BTreeMap<String, String>, body: Vec<u8>) -> Self {
    Self {
      status,
      headers,
      body,
    }
  }

  /// Last-resort reply synthesized when no cache entry, preload, network
  /// response, or fallback page is available.
  pub fn network_error() -> Self {
    let mut headers = BTreeMap::new();
    headers.insert("Content-Type".to_string(), "text/plain".to_string());
    Self {
      status: 408,
      headers,
      body: b"Network error happened".to_vec(),
    }
  }

  pub fn content_type(&self) -> Option<&str> {
    self.headers.get("Content-Type").map(String::as_str)
  }
}

/// A head-start response the platform may have begun fetching before the
/// cache was consulted. Resolves to `None` when the platform had nothing.
pub type PreloadedResponse = Pin<Box<dyn Future<Output = Option<CachedResponse>> + Send>>;
