//! Network boundary for asset fetches, and the gateway that composes the
//! client with the response cache.

use std::collections::BTreeMap;
use std::str::FromStr;

use reqwest::Method;
use url::Url;

use crate::config::Config;
use crate::error::{Error, Result};

use super::bucket::SqliteBuckets;
use super::lifecycle::{self, NavigationPreload, CACHE_VERSION};
use super::manager::ResponseCache;
use super::response::{AssetRequest, CachedResponse, PreloadedResponse};

/// HTTP fetcher for asset requests.
///
/// Scheme-relative identifiers (`/index.html`) resolve against the
/// configured origin; absolute URLs go out as-is. No timeout is imposed
/// beyond what the platform client enforces.
#[derive(Clone, Debug)]
pub struct AssetClient {
  client: reqwest::Client,
  origin: Url,
}

impl AssetClient {
  pub fn new(origin: &str) -> Result<Self> {
    let origin = Url::parse(origin)
      .map_err(|e| Error::network(format!("invalid asset origin {:?}: {}", origin, e)))?;

    Ok(Self {
      client: reqwest::Client::new(),
      origin,
    })
  }

  /// Absolute URL the request will go out to.
  fn resolve(&self, request: &AssetRequest) -> Result<Url> {
    match Url::parse(request.url()) {
      Ok(url) => Ok(url),
      Err(url::ParseError::RelativeUrlWithoutBase) => self
        .origin
        .join(request.url())
        .map_err(|e| Error::network(format!("cannot resolve {:?}: {}", request.url(), e))),
      Err(e) => Err(Error::network(format!(
        "unfetchable request target {:?}: {}",
        request.url(),
        e
      ))),
    }
  }

  /// Perform the fetch. A non-2xx status is still a response, not an
  /// error; only transport failures reject.
  pub async fn fetch(&self, request: &AssetRequest) -> Result<CachedResponse> {
    let url = self.resolve(request)?;
    let method = Method::from_str(request.method())
      .map_err(|e| Error::network(format!("bad method {:?}: {}", request.method(), e)))?;

    let response = self
      .client
      .request(method, url.clone())
      .send()
      .await
      .map_err(|e| Error::network(format!("{}: {}", url, e)))?;

    let status = response.status().as_u16();
    let headers: BTreeMap<String, String> = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (canonical_header(name.as_str()), v.to_string()))
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| Error::network(format!("{}: {}", url, e)))?
      .to_vec();

    Ok(CachedResponse::new(status, headers, body))
  }
}

/// Header names are stored in the canonical `Content-Type` spelling so the
/// synthesized 408 and real responses agree.
fn canonical_header(name: &str) -> String {
  let mut out = String::with_capacity(name.len());
  let mut upper = true;
  for c in name.chars() {
    if upper {
      out.extend(c.to_uppercase());
    } else {
      out.push(c);
    }
    upper = c == '-';
  }
  out
}

/// The collaborator-facing cache boundary: every intercepted asset request
/// goes through [`AssetGateway::handle`], which wires the fetcher into the
/// cache's resolution chain. Install and activation pass through to the
/// lifecycle functions against the same bucket.
pub struct AssetGateway {
  client: AssetClient,
  cache: ResponseCache<SqliteBuckets>,
  fallback: String,
}

impl AssetGateway {
  /// Build the gateway from configuration, opening the bucket database.
  pub fn new(config: &Config) -> Result<Self> {
    let buckets = match config.buckets_path() {
      Some(path) => SqliteBuckets::open_at(&path)?,
      None => SqliteBuckets::open()?,
    };

    Ok(Self {
      client: AssetClient::new(&config.assets.origin)?,
      cache: ResponseCache::new(buckets, CACHE_VERSION),
      fallback: config.assets.fallback.clone(),
    })
  }

  #[cfg(test)]
  fn with_buckets(config: &Config, buckets: SqliteBuckets) -> Result<Self> {
    Ok(Self {
      client: AssetClient::new(&config.assets.origin)?,
      cache: ResponseCache::new(buckets, CACHE_VERSION),
      fallback: config.assets.fallback.clone(),
    })
  }

  /// Resolve one intercepted request. Always yields a response.
  pub async fn handle(
    &self,
    request: &AssetRequest,
    preload: Option<PreloadedResponse>,
  ) -> CachedResponse {
    let client = self.client.clone();
    self
      .cache
      .respond(request, preload, &self.fallback, move |request| async move {
        client.fetch(&request).await
      })
      .await
  }

  /// Install phase: precache the fixed manifest.
  pub async fn install(&self) -> Result<()> {
    let client = self.client.clone();
    lifecycle::install(&self.cache, move |request| {
      let client = client.clone();
      async move { client.fetch(&request).await }
    })
    .await
  }

  /// Activate phase: enable preload when available, sweep stale buckets.
  pub async fn activate(&self, preload: Option<&dyn NavigationPreload>) -> Result<()> {
    lifecycle::activate(&self.cache, preload).await
  }

  /// Tag of the bucket requests are served from.
  pub fn bucket(&self) -> &str {
    self.cache.bucket()
  }

  /// Entry count of the current bucket, for diagnostics.
  pub fn bucket_len(&self) -> Result<usize> {
    self.cache.bucket_len(self.cache.bucket())
  }

  /// Timestamp of the most recent write into the current bucket.
  pub fn bucket_newest(&self) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
    self.cache.bucket_newest(self.cache.bucket())
  }
}
