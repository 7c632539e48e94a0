//! Durable half of the record store: a SQLite-backed link collection.

use rusqlite::{params, Connection};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::types::{Link, LinkDraft, LinkId};

/// SQLite-backed storage for one keyed link collection.
///
/// Every mutating operation runs inside its own transaction; there is no
/// cross-operation atomicity. The in-memory projection layered on top
/// (`LinkStore`) is only updated after a transaction commits.
#[derive(Debug)]
pub struct LinkStorage {
  conn: Mutex<Connection>,
  collection: String,
}

impl LinkStorage {
  /// Open or create the named database at the default location.
  ///
  /// Idempotent: the collection table is created only if absent, keyed by an
  /// auto-assigned integer identifier.
  pub fn open(database: &str, collection: &str) -> Result<Self> {
    let path = Self::default_path(database)?;
    Self::open_at(&path, collection)
  }

  /// Open or create a database at an explicit path.
  pub fn open_at(path: &Path, collection: &str) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| Error::storage(format!("failed to create data directory: {}", e)))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| Error::storage(format!("failed to open {}: {}", path.display(), e)))?;

    Self::init(conn, collection)
  }

  /// In-memory database, used by tests.
  pub fn open_in_memory(collection: &str) -> Result<Self> {
    let conn = Connection::open_in_memory().map_err(Error::storage)?;
    Self::init(conn, collection)
  }

  fn init(conn: Connection, collection: &str) -> Result<Self> {
    if !valid_collection(collection) {
      return Err(Error::storage(format!(
        "collection name {:?} is not a usable identifier",
        collection
      )));
    }

    conn
      .execute_batch(&schema_sql(collection))
      .map_err(|e| Error::storage(format!("failed to provision collection: {}", e)))?;

    Ok(Self {
      conn: Mutex::new(conn),
      collection: collection.to_string(),
    })
  }

  /// Get the default database path.
  fn default_path(database: &str) -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| Error::storage("could not determine data directory"))?;

    Ok(data_dir.join("linkorg").join(format!("{}.db", database)))
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| Error::storage(format!("connection lock poisoned: {}", e)))
  }

  /// Every persisted record, in insertion (id) order.
  pub fn list_all(&self) -> Result<Vec<Link>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare(&format!(
        r#"SELECT id, title, url, tags, position FROM "{}" ORDER BY id"#,
        self.collection
      ))
      .map_err(Error::storage)?;

    let rows = stmt
      .query_map([], |row| {
        Ok((
          row.get::<_, LinkId>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, String>(2)?,
          row.get::<_, String>(3)?,
          row.get::<_, Option<i64>>(4)?,
        ))
      })
      .map_err(Error::storage)?;

    let mut links = Vec::new();
    for row in rows {
      let (id, title, url, tags, position) = row.map_err(Error::storage)?;
      links.push(Link {
        id,
        title,
        url,
        tags: parse_tags(&tags)?,
        position,
      });
    }

    Ok(links)
  }

  /// Fetch a single record by id.
  pub fn get(&self, id: LinkId) -> Result<Option<Link>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare(&format!(
        r#"SELECT title, url, tags, position FROM "{}" WHERE id = ?1"#,
        self.collection
      ))
      .map_err(Error::storage)?;

    let row: Option<(String, String, String, Option<i64>)> = stmt
      .query_row(params![id], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
      })
      .ok();

    match row {
      Some((title, url, tags, position)) => Ok(Some(Link {
        id,
        title,
        url,
        tags: parse_tags(&tags)?,
        position,
      })),
      None => Ok(None),
    }
  }

  /// Persist a new record and return it with its assigned id.
  pub fn insert(&self, draft: &LinkDraft) -> Result<Link> {
    let tags = encode_tags(&draft.tags)?;
    let mut conn = self.lock()?;

    let tx = conn.transaction().map_err(Error::write)?;
    tx.execute(
      &format!(
        r#"INSERT INTO "{}" (title, url, tags, position) VALUES (?1, ?2, ?3, ?4)"#,
        self.collection
      ),
      params![draft.title, draft.url, tags, draft.position],
    )
    .map_err(Error::write)?;

    let id = tx.last_insert_rowid();
    tx.commit().map_err(Error::write)?;

    Ok(Link::from_draft(id, draft))
  }

  /// Replace a record under its existing id. Fails with `WriteFailed` when
  /// the id does not exist; the transaction is rolled back.
  pub fn update(&self, link: &Link) -> Result<LinkId> {
    let tags = encode_tags(&link.tags)?;
    let mut conn = self.lock()?;

    let tx = conn.transaction().map_err(Error::write)?;
    let affected = tx
      .execute(
        &format!(
          r#"UPDATE "{}" SET title = ?1, url = ?2, tags = ?3, position = ?4 WHERE id = ?5"#,
          self.collection
        ),
        params![link.title, link.url, tags, link.position, link.id],
      )
      .map_err(Error::write)?;

    if affected == 0 {
      // Dropping the transaction rolls it back
      return Err(Error::write(format!("no record with id {}", link.id)));
    }

    tx.commit().map_err(Error::write)?;
    Ok(link.id)
  }

  /// Remove a record by id. Fails with `WriteFailed` when the id does not
  /// exist.
  pub fn remove(&self, id: LinkId) -> Result<LinkId> {
    let mut conn = self.lock()?;

    let tx = conn.transaction().map_err(Error::write)?;
    let affected = tx
      .execute(
        &format!(r#"DELETE FROM "{}" WHERE id = ?1"#, self.collection),
        params![id],
      )
      .map_err(Error::write)?;

    if affected == 0 {
      return Err(Error::write(format!("no record with id {}", id)));
    }

    tx.commit().map_err(Error::write)?;
    Ok(id)
  }

  /// Run arbitrary SQL, for fault injection in tests.
  #[cfg(test)]
  pub(crate) fn execute_raw(&self, sql: &str) {
    let conn = self.conn.lock().unwrap();
    conn.execute_batch(sql).unwrap();
  }
}

/// Collection names are interpolated into SQL, so only plain identifiers are
/// accepted.
fn valid_collection(name: &str) -> bool {
  !name.is_empty()
    && !name.starts_with(|c: char| c.is_ascii_digit())
    && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn schema_sql(collection: &str) -> String {
  format!(
    r#"
CREATE TABLE IF NOT EXISTS "{c}" (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    url TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    position INTEGER
);
"#,
    c = collection
  )
}

fn parse_tags(json: &str) -> Result<BTreeSet<String>> {
  serde_json::from_str(json).map_err(|e| Error::storage(format!("corrupt tags column: {}", e)))
}

fn encode_tags(tags: &BTreeSet<String>) -> Result<String> {
  serde_json::to_string(tags).map_err(Error::write)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn storage() -> LinkStorage {
    LinkStorage::open_in_memory("links").unwrap()
  }

  #[test]
  fn test_insert_assigns_unique_ids() {
    let storage = storage();

    let a = storage.insert(&LinkDraft::new("a", "https://a.example")).unwrap();
    let b = storage.insert(&LinkDraft::new("b", "https://b.example")).unwrap();
    let c = storage.insert(&LinkDraft::new("c", "https://c.example")).unwrap();

    assert_ne!(a.id, b.id);
    assert_ne!(b.id, c.id);

    let listed = storage.list_all().unwrap();
    assert_eq!(listed, vec![a, b, c]);
  }

  #[test]
  fn test_tags_round_trip() {
    let storage = storage();

    let draft = LinkDraft::new("rust", "https://www.rust-lang.org").with_tags(["lang", "docs"]);
    let link = storage.insert(&draft).unwrap();

    let stored = storage.get(link.id).unwrap().unwrap();
    assert_eq!(stored.tags, draft.tags);
  }

  #[test]
  fn test_update_replaces_record() {
    let storage = storage();

    let link = storage.insert(&LinkDraft::new("old", "https://old.example")).unwrap();
    let edited = Link {
      title: "new".to_string(),
      url: "https://new.example".to_string(),
      position: Some(3),
      ..link
    };

    assert_eq!(storage.update(&edited).unwrap(), link.id);
    assert_eq!(storage.get(link.id).unwrap(), Some(edited));
  }

  #[test]
  fn test_update_missing_id_fails() {
    let storage = storage();
    let ghost = Link {
      id: 999,
      title: "ghost".to_string(),
      url: "https://ghost.example".to_string(),
      tags: BTreeSet::new(),
      position: None,
    };

    let err = storage.update(&ghost).unwrap_err();
    assert!(matches!(err, Error::WriteFailed(_)));
  }

  #[test]
  fn test_remove_missing_id_fails() {
    let storage = storage();

    let link = storage.insert(&LinkDraft::new("a", "https://a.example")).unwrap();
    assert_eq!(storage.remove(link.id).unwrap(), link.id);
    assert_eq!(storage.get(link.id).unwrap(), None);

    let err = storage.remove(link.id).unwrap_err();
    assert!(matches!(err, Error::WriteFailed(_)));
  }

  #[test]
  fn test_collection_names_are_validated() {
    assert!(LinkStorage::open_in_memory("links_v2").is_ok());

    for bad in ["", "links; DROP TABLE x", "1links", "li nks"] {
      let err = LinkStorage::open_in_memory(bad).unwrap_err();
      assert!(matches!(err, Error::StorageUnavailable(_)), "{:?}", bad);
    }
  }
}
