//! Cache lifecycle: versioned rollover between buckets.
//!
//! A deployment installs by precaching the manifest into the current
//! bucket, then activates by sweeping every older bucket. Until activation
//! completes, the previous version's entries keep serving requests.

use futures::future::join_all;
use std::future::Future;
use tracing::{debug, info, warn};

use crate::error::Result;

use super::bucket::BucketStorage;
use super::manager::ResponseCache;
use super::response::{AssetRequest, CachedResponse};

/// Tag of the bucket the running version reads and writes.
pub const CACHE_VERSION: &str = "v1";

/// Assets stored ahead of need during install.
pub const PRECACHE_MANIFEST: &[&str] = &[
  "/",
  "/index.html",
  "/index.css",
  "/app.css",
  "/linkorg.ico",
  "/manifest.json",
  "/offline.html",
  "/linkorg.webp",
  "/main.js",
  "/app.js",
];

/// Platform hook that starts fetching a navigation response before the
/// cache decides it needs one. Absence or failure only costs the
/// head start.
pub trait NavigationPreload: Send + Sync {
  fn enable(&self) -> Result<()>;
}

/// Install phase: fetch the whole manifest and store it into the current
/// bucket in one transaction.
///
/// All-or-nothing: one failed asset aborts the install and the bucket
/// keeps whatever it held before.
pub async fn install<S, F, Fut>(cache: &ResponseCache<S>, fetch: F) -> Result<()>
where
  S: BucketStorage + 'static,
  F: Fn(AssetRequest) -> Fut,
  Fut: Future<Output = Result<CachedResponse>>,
{
  let requests: Vec<AssetRequest> = PRECACHE_MANIFEST.iter().map(|r| AssetRequest::get(r)).collect();

  cache.precache(&requests, fetch).await?;
  info!(
    "Installed {} precached assets into bucket {}",
    requests.len(),
    cache.bucket()
  );
  Ok(())
}

/// Activate phase: enable navigation preload when the platform offers it,
/// then delete every bucket whose tag is not current.
///
/// Preload enablement and individual deletions are best-effort; only a
/// failure to list the stored tags escalates.
pub async fn activate<S>(
  cache: &ResponseCache<S>,
  preload: Option<&dyn NavigationPreload>,
) -> Result<()>
where
  S: BucketStorage + 'static,
{
  match preload {
    Some(p) => {
      if let Err(e) = p.enable() {
        warn!("Navigation preload not enabled: {}", e);
      }
    }
    None => debug!("Navigation preload not supported"),
  }

  let stale: Vec<String> = cache
    .buckets()?
    .into_iter()
    .filter(|tag| tag != cache.bucket())
    .collect();

  let deletions = stale.into_iter().map(|tag| {
    let cache = cache.clone();
    async move {
      match cache.delete_bucket(&tag) {
        Ok(()) => debug!("Deleted stale bucket {}", tag),
        Err(e) => warn!("Failed to delete stale bucket {}: {}", tag, e),
      }
    }
  });
  join_all(deletions).await;

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::bucket::SqliteBuckets;
  use crate::error::Error;
  use std::collections::BTreeMap;
  use std::sync::atomic::{AtomicBool, Ordering};

  fn response(body: &str) -> CachedResponse {
    CachedResponse::new(200, BTreeMap::new(), body.as_bytes().to_vec())
  }

  struct RecordingPreload {
    enabled: AtomicBool,
  }

  impl NavigationPreload for RecordingPreload {
    fn enable(&self) -> Result<()> {
      self.enabled.store(true, Ordering::SeqCst);
      Ok(())
    }
  }

  struct BrokenPreload;

  impl NavigationPreload for BrokenPreload {
    fn enable(&self) -> Result<()> {
      Err(Error::network("preload unsupported"))
    }
  }

  #[tokio::test]
  async fn test_install_precaches_the_manifest() {
    let cache = ResponseCache::new(SqliteBuckets::open_in_memory().unwrap(), CACHE_VERSION);

    install(&cache, |request| async move { Ok(response(request.url())) })
      .await
      .unwrap();

    assert_eq!(
      cache.bucket_len(CACHE_VERSION).unwrap(),
      PRECACHE_MANIFEST.len()
    );
    assert_eq!(
      cache
        .storage()
        .get(CACHE_VERSION, &AssetRequest::get("/offline.html"))
        .unwrap(),
      Some(response("/offline.html"))
    );
  }

  #[tokio::test]
  async fn test_failed_install_stores_nothing() {
    let cache = ResponseCache::new(SqliteBuckets::open_in_memory().unwrap(), CACHE_VERSION);

    let err = install(&cache, |request| async move {
      if request.url() == "/main.js" {
        Err(Error::network("connection refused"))
      } else {
        Ok(response("ok"))
      }
    })
    .await
    .unwrap_err();

    assert!(matches!(err, Error::PrecacheFailed(_)));
    assert_eq!(cache.bucket_len(CACHE_VERSION).unwrap(), 0);
  }

  #[tokio::test]
  async fn test_activate_sweeps_stale_buckets() {
    let storage = SqliteBuckets::open_in_memory().unwrap();
    storage.put("v0", &AssetRequest::get("/a"), &response("old")).unwrap();
    storage.put(CACHE_VERSION, &AssetRequest::get("/a"), &response("current")).unwrap();
    let cache = ResponseCache::new(storage, CACHE_VERSION);

    activate(&cache, None).await.unwrap();

    assert_eq!(cache.buckets().unwrap(), vec![CACHE_VERSION.to_string()]);
    assert_eq!(cache.bucket_len(CACHE_VERSION).unwrap(), 1);
  }

  #[tokio::test]
  async fn test_activate_enables_preload() {
    let cache = ResponseCache::new(SqliteBuckets::open_in_memory().unwrap(), CACHE_VERSION);
    let preload = RecordingPreload {
      enabled: AtomicBool::new(false),
    };

    activate(&cache, Some(&preload)).await.unwrap();

    assert!(preload.enabled.load(Ordering::SeqCst));
  }

  #[tokio::test]
  async fn test_broken_preload_does_not_fail_activation() {
    let storage = SqliteBuckets::open_in_memory().unwrap();
    storage.put("v0", &AssetRequest::get("/a"), &response("old")).unwrap();
    let cache = ResponseCache::new(storage, CACHE_VERSION);

    activate(&cache, Some(&BrokenPreload)).await.unwrap();

    assert_eq!(cache.buckets().unwrap(), Vec::<String>::new());
  }
}
