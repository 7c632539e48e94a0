//! Domain types for stored bookmarks.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Identifier assigned by the store on first persistence.
pub type LinkId = i64;

/// A bookmark that has not been persisted yet. It has no identifier; the
/// store assigns one when the record is first written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDraft {
  pub title: String,
  pub url: String,
  #[serde(default)]
  pub tags: BTreeSet<String>,
  /// Manual-ordering value; `None` means insertion order.
  pub position: Option<i64>,
}

/// A persisted bookmark record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
  pub id: LinkId,
  pub title: String,
  pub url: String,
  #[serde(default)]
  pub tags: BTreeSet<String>,
  /// Manual-ordering value; `None` means insertion order.
  pub position: Option<i64>,
}

impl LinkDraft {
  pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
    Self {
      title: title.into(),
      url: url.into(),
      tags: BTreeSet::new(),
      position: None,
    }
  }

  pub fn with_tags<I, T>(mut self, tags: I) -> Self
  where
    I: IntoIterator<Item = T>,
    T: Into<String>,
  {
    self.tags = tags.into_iter().map(Into::into).collect();
    self
  }
}

impl Link {
  /// The draft this record would have been created from.
  pub fn draft(&self) -> LinkDraft {
    LinkDraft {
      title: self.title.clone(),
      url: self.url.clone(),
      tags: self.tags.clone(),
      position: self.position,
    }
  }

  pub(crate) fn from_draft(id: LinkId, draft: &LinkDraft) -> Self {
    Self {
      id,
      title: draft.title.clone(),
      url: draft.url.clone(),
      tags: draft.tags.clone(),
      position: draft.position,
    }
  }
}
