//! Bucket storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};

use super::response::{AssetRequest, CachedResponse};

/// Storage backend for versioned response buckets.
///
/// A bucket groups the entries written by one cache version; rolling out a
/// new version means precaching into a fresh tag and sweeping the rest.
pub trait BucketStorage: Send + Sync {
  /// Look up the stored response for a request.
  fn get(&self, bucket: &str, request: &AssetRequest) -> Result<Option<CachedResponse>>;

  /// Store one response, overwriting any previous entry for the same key.
  fn put(&self, bucket: &str, request: &AssetRequest, response: &CachedResponse) -> Result<()>;

  /// Store a batch in a single transaction: either every entry lands or
  /// none do.
  fn put_all(&self, bucket: &str, entries: &[(AssetRequest, CachedResponse)]) -> Result<()>;

  /// Every bucket tag present in storage.
  fn buckets(&self) -> Result<Vec<String>>;

  /// Drop a bucket and all its entries.
  fn delete_bucket(&self, bucket: &str) -> Result<()>;

  /// Number of entries under a tag.
  fn len(&self, bucket: &str) -> Result<usize>;

  /// Timestamp of the most recently written entry under a tag.
  fn newest(&self, bucket: &str) -> Result<Option<DateTime<Utc>>>;
}

/// SQLite-backed bucket storage.
pub struct SqliteBuckets {
  conn: Mutex<Connection>,
}

impl SqliteBuckets {
  /// Open or create the bucket database at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| Error::storage(format!("failed to create cache directory: {}", e)))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| Error::storage(format!("failed to open {}: {}", path.display(), e)))?;

    Self::init(conn)
  }

  /// Open or create a bucket database at an explicit path.
  pub fn open_at(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| Error::storage(format!("failed to create cache directory: {}", e)))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| Error::storage(format!("failed to open {}: {}", path.display(), e)))?;

    Self::init(conn)
  }

  /// In-memory buckets, used by tests.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory().map_err(Error::storage)?;
    Self::init(conn)
  }

  fn init(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(BUCKET_SCHEMA)
      .map_err(|e| Error::storage(format!("failed to provision bucket tables: {}", e)))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Get the default database path.
  fn default_path() -> Result<std::path::PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| Error::storage("could not determine data directory"))?;

    Ok(data_dir.join("linkorg").join("assets.db"))
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| Error::storage(format!("connection lock poisoned: {}", e)))
  }

  /// Run arbitrary SQL, for fault injection in tests.
  #[cfg(test)]
  pub(crate) fn execute_raw(&self, sql: &str) {
    let conn = self.conn.lock().unwrap();
    conn.execute_batch(sql).unwrap();
  }
}

/// Schema for response buckets.
const BUCKET_SCHEMA: &str = r#"
-- Cached network responses, grouped into versioned buckets
CREATE TABLE IF NOT EXISTS response_cache (
    bucket TEXT NOT NULL,
    entry_key TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (bucket, entry_key)
);

CREATE INDEX IF NOT EXISTS idx_response_cache_bucket ON response_cache(bucket);
"#;

const INSERT_ENTRY: &str = "INSERT OR REPLACE INTO response_cache \
   (bucket, entry_key, method, url, status, headers, body, cached_at) \
   VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))";

impl BucketStorage for SqliteBuckets {
  fn get(&self, bucket: &str, request: &AssetRequest) -> Result<Option<CachedResponse>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare(
        "SELECT status, headers, body FROM response_cache
         WHERE bucket = ? AND entry_key = ?",
      )
      .map_err(Error::storage)?;

    let row: Option<(u16, String, Vec<u8>)> = stmt
      .query_row(params![bucket, request.entry_key()], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
      })
      .ok();

    match row {
      Some((status, headers, body)) => {
        let headers: BTreeMap<String, String> = serde_json::from_str(&headers)
          .map_err(|e| Error::storage(format!("corrupt headers column: {}", e)))?;
        Ok(Some(CachedResponse::new(status, headers, body)))
      }
      None => Ok(None),
    }
  }

  fn put(&self, bucket: &str, request: &AssetRequest, response: &CachedResponse) -> Result<()> {
    let headers = encode_headers(response)?;
    let conn = self.lock()?;

    conn
      .execute(
        INSERT_ENTRY,
        params![
          bucket,
          request.entry_key(),
          request.method(),
          request.url(),
          response.status,
          headers,
          response.body,
        ],
      )
      .map_err(Error::write)?;

    Ok(())
  }

  fn put_all(&self, bucket: &str, entries: &[(AssetRequest, CachedResponse)]) -> Result<()> {
    let mut conn = self.lock()?;

    // Dropping the transaction on an early return rolls everything back
    let tx = conn.transaction().map_err(Error::write)?;
    for (request, response) in entries {
      let headers = encode_headers(response)?;
      tx.execute(
        INSERT_ENTRY,
        params![
          bucket,
          request.entry_key(),
          request.method(),
          request.url(),
          response.status,
          headers,
          response.body,
        ],
      )
      .map_err(Error::write)?;
    }
    tx.commit().map_err(Error::write)?;

    Ok(())
  }

  fn buckets(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT DISTINCT bucket FROM response_cache ORDER BY bucket")
      .map_err(Error::storage)?;

    let tags = stmt
      .query_map([], |row| row.get::<_, String>(0))
      .map_err(Error::storage)?
      .filter_map(|r| r.ok())
      .collect();

    Ok(tags)
  }

  fn delete_bucket(&self, bucket: &str) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute("DELETE FROM response_cache WHERE bucket = ?", params![bucket])
      .map_err(Error::write)?;

    Ok(())
  }

  fn len(&self, bucket: &str) -> Result<usize> {
    let conn = self.lock()?;

    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM response_cache WHERE bucket = ?",
        params![bucket],
        |row| row.get(0),
      )
      .map_err(Error::storage)?;

    Ok(count as usize)
  }

  fn newest(&self, bucket: &str) -> Result<Option<DateTime<Utc>>> {
    let conn = self.lock()?;

    let newest: Option<String> = conn
      .query_row(
        "SELECT MAX(cached_at) FROM response_cache WHERE bucket = ?",
        params![bucket],
        |row| row.get(0),
      )
      .map_err(Error::storage)?;

    newest.map(|s| parse_datetime(&s)).transpose()
  }
}

fn encode_headers(response: &CachedResponse) -> Result<String> {
  serde_json::to_string(&response.headers).map_err(Error::write)
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| Error::storage(format!("failed to parse datetime '{}': {}", s, e)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::BTreeMap;

  fn response(body: &str) -> CachedResponse {
    let mut headers = BTreeMap::new();
    headers.insert("Content-Type".to_string(), "text/html".to_string());
    CachedResponse::new(200, headers, body.as_bytes().to_vec())
  }

  #[test]
  fn test_put_get_round_trip() {
    let storage = SqliteBuckets::open_in_memory().unwrap();
    let request = AssetRequest::get("/index.html");
    let stored = response("<html>hi</html>");

    storage.put("v1", &request, &stored).unwrap();

    assert_eq!(storage.get("v1", &request).unwrap(), Some(stored));
    assert_eq!(storage.get("v0", &request).unwrap(), None);
  }

  #[test]
  fn test_put_overwrites_same_key() {
    let storage = SqliteBuckets::open_in_memory().unwrap();
    let request = AssetRequest::get("/app.css");

    storage.put("v1", &request, &response("old")).unwrap();
    storage.put("v1", &request, &response("new")).unwrap();

    assert_eq!(storage.len("v1").unwrap(), 1);
    assert_eq!(storage.get("v1", &request).unwrap().unwrap().body, b"new");
  }

  #[test]
  fn test_buckets_and_delete() {
    let storage = SqliteBuckets::open_in_memory().unwrap();
    storage.put("v0", &AssetRequest::get("/a"), &response("a")).unwrap();
    storage.put("v1", &AssetRequest::get("/a"), &response("a")).unwrap();
    storage.put("v1", &AssetRequest::get("/b"), &response("b")).unwrap();

    assert_eq!(storage.buckets().unwrap(), vec!["v0", "v1"]);

    storage.delete_bucket("v0").unwrap();
    assert_eq!(storage.buckets().unwrap(), vec!["v1"]);
    assert_eq!(storage.len("v1").unwrap(), 2);

    // Deleting an absent bucket is not an error
    storage.delete_bucket("v7").unwrap();
  }

  #[test]
  fn test_put_all_is_atomic() {
    let storage = SqliteBuckets::open_in_memory().unwrap();
    let entries = vec![
      (AssetRequest::get("/a"), response("a")),
      (AssetRequest::get("/b"), response("b")),
      (AssetRequest::get("/c"), response("c")),
    ];

    storage.put_all("v1", &entries).unwrap();

    assert_eq!(storage.len("v1").unwrap(), 3);
    for (request, stored) in &entries {
      assert_eq!(storage.get("v1", request).unwrap().as_ref(), Some(stored));
    }
  }

  #[test]
  fn test_newest_tracks_writes() {
    let storage = SqliteBuckets::open_in_memory().unwrap();
    assert_eq!(storage.newest("v1").unwrap(), None);

    storage.put("v1", &AssetRequest::get("/a"), &response("a")).unwrap();
    let newest = storage.newest("v1").unwrap().unwrap();
    assert!((Utc::now() - newest).num_seconds().abs() < 60);
  }
}
