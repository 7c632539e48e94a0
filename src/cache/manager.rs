//! Response cache manager: priority resolution across bucket, preload, and
//! network.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::bucket::BucketStorage;
use super::response::{AssetRequest, CachedResponse, PreloadedResponse};

/// Cache-first resolver pinned to one current bucket.
///
/// `respond` is infallible by contract: every internal failure degrades to
/// the next source in the chain, ending at a synthesized 408. Storage
/// errors along the way are logged, never surfaced.
pub struct ResponseCache<S: BucketStorage> {
  storage: Arc<S>,
  bucket: String,
}

impl<S: BucketStorage + 'static> ResponseCache<S> {
  /// Create a manager reading and writing the given bucket tag.
  pub fn new(storage: S, bucket: &str) -> Self {
    Self {
      storage: Arc::new(storage),
      bucket: bucket.to_string(),
    }
  }

  /// Tag of the current bucket.
  pub fn bucket(&self) -> &str {
    &self.bucket
  }

  /// Resolve a request with cache-first strategy.
  ///
  /// 1. Current-bucket lookup; a hit is returned without touching the
  ///    network.
  /// 2. Await the preloaded response when one is supplied.
  /// 3. Live fetch through `fetch`.
  /// 4. On fetch failure, the stored fallback page (GET `fallback`).
  /// 5. A synthesized 408.
  ///
  /// Responses from steps 2 and 3 are copied into the bucket in a
  /// background task; the caller gets the original without waiting on the
  /// write.
  pub async fn respond<F, Fut>(
    &self,
    request: &AssetRequest,
    preload: Option<PreloadedResponse>,
    fallback: &str,
    fetch: F,
  ) -> CachedResponse
  where
    F: FnOnce(AssetRequest) -> Fut,
    Fut: Future<Output = Result<CachedResponse>>,
  {
    match self.storage.get(&self.bucket, request) {
      Ok(Some(hit)) => {
        debug!("Cache hit for {} {}", request.method(), request.url());
        return hit;
      }
      Ok(None) => {}
      Err(e) => warn!("Cache lookup failed for {}: {}", request.url(), e),
    }

    if let Some(preload) = preload {
      if let Some(response) = preload.await {
        debug!("Using preloaded response for {}", request.url());
        self.store_copy(request, &response);
        return response;
      }
    }

    match fetch(request.clone()).await {
      Ok(response) => {
        self.store_copy(request, &response);
        response
      }
      Err(e) => {
        warn!("Fetch failed for {} {}: {}", request.method(), request.url(), e);

        let fallback = AssetRequest::get(fallback);
        match self.storage.get(&self.bucket, &fallback) {
          Ok(Some(page)) => page,
          Ok(None) => CachedResponse::network_error(),
          Err(e) => {
            warn!("Fallback lookup failed for {}: {}", fallback.url(), e);
            CachedResponse::network_error()
          }
        }
      }
    }
  }

  /// Fetch every given resource and store the batch in one transaction.
  ///
  /// Any failure aborts the whole operation with
  /// [`Error::PrecacheFailed`]; the bucket keeps exactly the entries it
  /// had before the call.
  pub async fn precache<F, Fut>(&self, requests: &[AssetRequest], fetch: F) -> Result<()>
  where
    F: Fn(AssetRequest) -> Fut,
    Fut: Future<Output = Result<CachedResponse>>,
  {
    let mut entries = Vec::with_capacity(requests.len());
    for request in requests {
      let response = fetch(request.clone())
        .await
        .map_err(|e| Error::precache(format!("{}: {}", request.url(), e)))?;
      entries.push((request.clone(), response));
    }

    self
      .storage
      .put_all(&self.bucket, &entries)
      .map_err(Error::precache)?;

    debug!("Precached {} entries into bucket {}", entries.len(), self.bucket);
    Ok(())
  }

  /// Tags of every stored bucket.
  pub fn buckets(&self) -> Result<Vec<String>> {
    self.storage.buckets()
  }

  /// Drop a whole bucket.
  pub fn delete_bucket(&self, tag: &str) -> Result<()> {
    self.storage.delete_bucket(tag)
  }

  /// Entries currently stored under a tag.
  pub fn bucket_len(&self, tag: &str) -> Result<usize> {
    self.storage.len(tag)
  }

  /// Timestamp of the most recent write under a tag.
  pub fn bucket_newest(&self, tag: &str) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
    self.storage.newest(tag)
  }

  /// Copy a response into the current bucket without blocking the caller.
  fn store_copy(&self, request: &AssetRequest, response: &CachedResponse) {
    if !request.is_cacheable() {
      warn!("Not caching non-http request: {}", request.url());
      return;
    }

    let storage = Arc::clone(&self.storage);
    let bucket = self.bucket.clone();
    let request = request.clone();
    let response = response.clone();
    tokio::spawn(async move {
      if let Err(e) = storage.put(&bucket, &request, &response) {
        warn!("Failed to store response for {}: {}", request.url(), e);
      }
    });
  }

  #[cfg(test)]
  pub(crate) fn storage(&self) -> &S {
    &self.storage
  }
}

impl<S: BucketStorage> Clone for ResponseCache<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      bucket: self.bucket.clone(),
    }
  }
}
