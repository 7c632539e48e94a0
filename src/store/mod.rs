//! Transactional record store with an in-memory projection.
//!
//! `LinkStore` pairs a durable SQLite collection (`LinkStorage`) with a
//! shared projection so reads never touch the database. Writes are
//! write-through: the durable transaction commits first, and only then is
//! the projection updated. A failed operation rejects the caller AND parks
//! the failure in [`StoreStatus`] for passive observers; the previously
//! projected records stay readable throughout.
//!
//! Reordering lives in [`ordering`]; it builds on `edit` and adds nothing
//! to the durable format.

pub mod ordering;
pub mod storage;

pub use ordering::{detect, ReorderPlan};
pub use storage::LinkStorage;

use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::{Link, LinkDraft, LinkId};

/// The observable state of the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreStatus {
  /// No operation has run yet
  Idle,
  /// An operation is in flight
  Loading,
  /// The last operation committed
  Success,
  /// The last operation failed
  Error(Error),
}

impl StoreStatus {
  pub fn is_idle(&self) -> bool {
    matches!(self, StoreStatus::Idle)
  }

  pub fn is_loading(&self) -> bool {
    matches!(self, StoreStatus::Loading)
  }

  pub fn is_success(&self) -> bool {
    matches!(self, StoreStatus::Success)
  }

  pub fn is_error(&self) -> bool {
    matches!(self, StoreStatus::Error(_))
  }

  pub fn error(&self) -> Option<&Error> {
    match self {
      StoreStatus::Error(e) => Some(e),
      _ => None,
    }
  }
}

struct StoreState {
  links: Vec<Link>,
  status: StoreStatus,
}

/// Persistent link collection with ordered, concurrent operations.
pub struct LinkStore {
  storage: LinkStorage,
  state: RwLock<StoreState>,
}

impl LinkStore {
  /// Open the configured collection and run the initial load.
  ///
  /// Construction fails only when durable storage cannot be provisioned at
  /// all. An initial load failure still yields a usable store: the
  /// projection starts empty and `status()` reports the error.
  pub async fn open(config: &Config) -> Result<Self> {
    let storage = match config.database_path() {
      Some(path) => LinkStorage::open_at(&path, &config.collection)?,
      None => LinkStorage::open(&config.database, &config.collection)?,
    };
    Ok(Self::bootstrap(storage).await)
  }

  /// Open a collection in a database at an explicit path.
  pub async fn open_at(path: &Path, collection: &str) -> Result<Self> {
    Ok(Self::bootstrap(LinkStorage::open_at(path, collection)?).await)
  }

  /// In-memory store, used by tests.
  pub async fn open_in_memory(collection: &str) -> Result<Self> {
    Ok(Self::bootstrap(LinkStorage::open_in_memory(collection)?).await)
  }

  async fn bootstrap(storage: LinkStorage) -> Self {
    let store = Self {
      storage,
      state: RwLock::new(StoreState {
        links: Vec::new(),
        status: StoreStatus::Idle,
      }),
    };

    if let Err(e) = store.refresh().await {
      warn!("Initial load failed: {}", e);
    }

    store
  }

  /// Read every persisted record, in insertion order. Does not touch the
  /// projection or the status.
  pub async fn list(&self) -> Result<Vec<Link>> {
    self.storage.list_all()
  }

  /// Reload the projection from durable storage.
  ///
  /// On failure the previous projection is retained and `status()` turns
  /// to error.
  pub async fn refresh(&self) -> Result<Vec<Link>> {
    self.begin();
    match self.storage.list_all() {
      Ok(links) => {
        let mut state = self.write_state();
        state.links = links.clone();
        state.status = StoreStatus::Success;
        Ok(links)
      }
      Err(e) => Err(self.fail(e)),
    }
  }

  /// Persist a new record and append it to the projection.
  pub async fn add(&self, draft: LinkDraft) -> Result<Link> {
    self.begin();
    match self.storage.insert(&draft) {
      Ok(link) => {
        let mut state = self.write_state();
        state.links.push(link.clone());
        state.status = StoreStatus::Success;
        Ok(link)
      }
      Err(e) => Err(self.fail(e)),
    }
  }

  /// Replace a record under its existing id.
  ///
  /// Editing an id that was never persisted (or has been deleted) fails
  /// with [`Error::WriteFailed`] and leaves both halves untouched.
  pub async fn edit(&self, link: &Link) -> Result<LinkId> {
    self.begin();
    match self.storage.update(link) {
      Ok(id) => {
        let mut state = self.write_state();
        if let Some(slot) = state.links.iter_mut().find(|l| l.id == id) {
          *slot = link.clone();
        }
        state.status = StoreStatus::Success;
        Ok(id)
      }
      Err(e) => Err(self.fail(e)),
    }
  }

  /// Remove a record by id.
  ///
  /// Deleting an id that does not exist fails with [`Error::WriteFailed`].
  pub async fn delete(&self, id: LinkId) -> Result<LinkId> {
    self.begin();
    match self.storage.remove(id) {
      Ok(id) => {
        let mut state = self.write_state();
        state.links.retain(|l| l.id != id);
        state.status = StoreStatus::Success;
        Ok(id)
      }
      Err(e) => Err(self.fail(e)),
    }
  }

  /// Snapshot of the projection, in the order records were committed.
  pub fn links(&self) -> Vec<Link> {
    self.read_state().links.clone()
  }

  /// Case-insensitive title filter over the projection. An empty term
  /// returns everything.
  pub fn search(&self, term: &str) -> Vec<Link> {
    let state = self.read_state();
    if term.is_empty() {
      return state.links.clone();
    }

    let term = term.to_lowercase();
    state
      .links
      .iter()
      .filter(|link| link.title.to_lowercase().contains(&term))
      .cloned()
      .collect()
  }

  pub fn status(&self) -> StoreStatus {
    self.read_state().status.clone()
  }

  pub fn is_loading(&self) -> bool {
    self.read_state().status.is_loading()
  }

  pub fn is_success(&self) -> bool {
    self.read_state().status.is_success()
  }

  pub fn is_error(&self) -> bool {
    self.read_state().status.is_error()
  }

  /// The last failure, if the most recent operation failed.
  pub fn error(&self) -> Option<Error> {
    self.read_state().status.error().cloned()
  }

  fn begin(&self) {
    self.write_state().status = StoreStatus::Loading;
  }

  fn fail(&self, error: Error) -> Error {
    self.write_state().status = StoreStatus::Error(error.clone());
    error
  }

  // Writers never leave the projection half-updated, so a poisoned lock
  // still holds a coherent snapshot.
  fn read_state(&self) -> RwLockReadGuard<'_, StoreState> {
    self.state.read().unwrap_or_else(|e| e.into_inner())
  }

  fn write_state(&self) -> RwLockWriteGuard<'_, StoreState> {
    self.state.write().unwrap_or_else(|e| e.into_inner())
  }

  #[cfg(test)]
  pub(crate) fn storage(&self) -> &LinkStorage {
    &self.storage
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::BTreeSet;

  async fn store() -> LinkStore {
    LinkStore::open_in_memory("links").await.unwrap()
  }

  #[tokio::test]
  async fn test_open_starts_empty_and_successful() {
    let store = store().await;
    assert!(store.is_success());
    assert!(store.links().is_empty());
    assert!(store.error().is_none());
  }

  #[tokio::test]
  async fn test_add_appends_to_projection() {
    let store = store().await;

    let a = store.add(LinkDraft::new("a", "https://a.example")).await.unwrap();
    let b = store.add(LinkDraft::new("b", "https://b.example")).await.unwrap();

    assert_ne!(a.id, b.id);
    assert_eq!(store.links(), vec![a, b]);
    assert_eq!(store.list().await.unwrap(), store.links());
    assert!(store.is_success());
  }

  #[tokio::test]
  async fn test_edit_replaces_projection_entry() {
    let store = store().await;

    let a = store.add(LinkDraft::new("a", "https://a.example")).await.unwrap();
    let b = store.add(LinkDraft::new("b", "https://b.example")).await.unwrap();

    let edited = Link {
      title: "a2".to_string(),
      ..a.clone()
    };
    store.edit(&edited).await.unwrap();

    assert_eq!(store.links(), vec![edited.clone(), b]);
    assert_eq!(store.storage().get(a.id).unwrap(), Some(edited));
  }

  #[tokio::test]
  async fn test_edit_missing_id_rejects_and_flags_error() {
    let store = store().await;
    let a = store.add(LinkDraft::new("a", "https://a.example")).await.unwrap();

    let ghost = Link {
      id: a.id + 40,
      title: "ghost".to_string(),
      url: "https://ghost.example".to_string(),
      tags: BTreeSet::new(),
      position: None,
    };

    let err = store.edit(&ghost).await.unwrap_err();
    assert!(matches!(err, Error::WriteFailed(_)));
    assert!(store.is_error());
    assert_eq!(store.error(), Some(err));
    assert_eq!(store.links(), vec![a]);
  }

  #[tokio::test]
  async fn test_delete_removes_from_projection() {
    let store = store().await;

    let a = store.add(LinkDraft::new("a", "https://a.example")).await.unwrap();
    let b = store.add(LinkDraft::new("b", "https://b.example")).await.unwrap();

    assert_eq!(store.delete(a.id).await.unwrap(), a.id);
    assert_eq!(store.links(), vec![b]);
    assert!(store.is_success());
  }

  #[tokio::test]
  async fn test_delete_missing_id_rejects_and_flags_error() {
    let store = store().await;
    let a = store.add(LinkDraft::new("a", "https://a.example")).await.unwrap();
    store.delete(a.id).await.unwrap();

    let err = store.delete(a.id).await.unwrap_err();
    assert!(matches!(err, Error::WriteFailed(_)));
    assert!(store.is_error());
    assert!(store.links().is_empty());
  }

  #[tokio::test]
  async fn test_failed_refresh_retains_projection() {
    let store = store().await;
    let a = store.add(LinkDraft::new("a", "https://a.example")).await.unwrap();

    store.storage().execute_raw(r#"DROP TABLE "links""#);

    let err = store.refresh().await.unwrap_err();
    assert!(matches!(err, Error::StorageUnavailable(_)));
    assert!(store.is_error());
    assert_eq!(store.links(), vec![a]);
  }

  #[tokio::test]
  async fn test_success_clears_previous_error() {
    let store = store().await;
    let a = store.add(LinkDraft::new("a", "https://a.example")).await.unwrap();

    let _ = store.delete(a.id + 40).await.unwrap_err();
    assert!(store.is_error());

    store.refresh().await.unwrap();
    assert!(store.is_success());
    assert!(store.error().is_none());
  }

  #[tokio::test]
  async fn test_search_filters_by_title() {
    let store = store().await;

    let rust = store
      .add(LinkDraft::new("The Rust Book", "https://doc.rust-lang.org/book"))
      .await
      .unwrap();
    let tokio = store
      .add(LinkDraft::new("Tokio tutorial", "https://tokio.rs/tokio/tutorial"))
      .await
      .unwrap();
    store
      .add(LinkDraft::new("serde guide", "https://serde.rs"))
      .await
      .unwrap();

    assert_eq!(store.search("rust"), vec![rust]);
    assert_eq!(store.search("TOKIO"), vec![tokio]);
    assert_eq!(store.search("nothing-matches"), vec![]);
    assert_eq!(store.search(""), store.links());
  }
}
