//! Manual reorder detection and persistence.
//!
//! A drag handle (or the CLI `move` command) hands the store a proposed
//! record sequence. [`detect`] decides whether that sequence is actually a
//! reorder by comparing which id sits at which index; record contents never
//! enter the comparison, so an edited title in place is "no change" here.
//! The resulting [`ReorderPlan`] persists zero-based `position` values
//! through ordinary `edit` calls.

use crate::error::Result;
use crate::types::Link;

use super::LinkStore;

/// Position writes produced by [`detect`], in proposed order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderPlan {
  entries: Vec<Link>,
}

/// Compare the current and proposed sequences of one collection by id.
///
/// Returns `None` when every index holds the same id in both slices.
/// A length mismatch or any positional difference yields a plan covering
/// the whole proposed sequence.
pub fn detect(current: &[Link], proposed: &[Link]) -> Option<ReorderPlan> {
  let unchanged = current.len() == proposed.len()
    && current.iter().zip(proposed).all(|(c, p)| c.id == p.id);
  if unchanged {
    return None;
  }

  let entries = proposed
    .iter()
    .enumerate()
    .map(|(index, link)| Link {
      position: Some(index as i64),
      ..link.clone()
    })
    .collect();

  Some(ReorderPlan { entries })
}

impl ReorderPlan {
  /// Number of records the plan will write.
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Persist the plan, one `edit` per record, strictly in order.
  ///
  /// The first failure aborts the remaining edits. Positions already
  /// written stay written; the next successful reorder overwrites every
  /// position anyway.
  pub async fn commit(&self, store: &LinkStore) -> Result<usize> {
    for link in &self.entries {
      store.edit(link).await?;
    }
    Ok(self.entries.len())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::Error;
  use crate::types::LinkDraft;
  use std::collections::BTreeSet;

  fn link(id: i64) -> Link {
    Link {
      id,
      title: format!("link {}", id),
      url: format!("https://{}.example", id),
      tags: BTreeSet::new(),
      position: None,
    }
  }

  fn ids(links: &[Link]) -> Vec<i64> {
    links.iter().map(|l| l.id).collect()
  }

  #[test]
  fn test_identical_sequence_is_no_change() {
    let links = vec![link(1), link(2), link(3)];
    assert!(detect(&links, &links.clone()).is_none());
  }

  #[test]
  fn test_content_edits_are_not_reorders() {
    let current = vec![link(1), link(2)];
    let mut proposed = current.clone();
    proposed[0].title = "renamed".to_string();

    assert!(detect(&current, &proposed).is_none());
  }

  #[test]
  fn test_swapped_ids_yield_a_plan() {
    let current = vec![link(1), link(2)];
    let proposed = vec![link(2), link(1)];

    let plan = detect(&current, &proposed).unwrap();
    assert_eq!(plan.len(), 2);
  }

  #[test]
  fn test_length_change_yields_a_plan() {
    let current = vec![link(1), link(2), link(3)];
    let proposed = vec![link(1), link(3)];

    let plan = detect(&current, &proposed).unwrap();
    assert_eq!(plan.len(), 2);
  }

  #[tokio::test]
  async fn test_commit_persists_proposed_order() {
    let store = LinkStore::open_in_memory("links").await.unwrap();
    let a = store.add(LinkDraft::new("a", "https://a.example")).await.unwrap();
    let b = store.add(LinkDraft::new("b", "https://b.example")).await.unwrap();
    let c = store.add(LinkDraft::new("c", "https://c.example")).await.unwrap();

    let proposed = vec![c.clone(), a.clone(), b.clone()];
    let plan = detect(&store.links(), &proposed).unwrap();
    assert_eq!(plan.commit(&store).await.unwrap(), 3);

    let mut stored = store.list().await.unwrap();
    stored.sort_by_key(|l| l.position);
    assert_eq!(ids(&stored), vec![c.id, a.id, b.id]);

    // The projection saw the same writes
    let mut projected = store.links();
    projected.sort_by_key(|l| l.position);
    assert_eq!(ids(&projected), vec![c.id, a.id, b.id]);
  }

  #[tokio::test]
  async fn test_commit_stops_at_first_failure() {
    let store = LinkStore::open_in_memory("links").await.unwrap();
    let a = store.add(LinkDraft::new("a", "https://a.example")).await.unwrap();
    let b = store.add(LinkDraft::new("b", "https://b.example")).await.unwrap();

    let ghost = link(a.id + b.id + 100);
    let proposed = vec![b.clone(), ghost, a.clone()];

    let plan = detect(&store.links(), &proposed).unwrap();
    let err = plan.commit(&store).await.unwrap_err();
    assert!(matches!(err, Error::WriteFailed(_)));

    // The edit before the failure landed, the one after never ran
    let stored = store.list().await.unwrap();
    let stored_b = stored.iter().find(|l| l.id == b.id).unwrap();
    let stored_a = stored.iter().find(|l| l.id == a.id).unwrap();
    assert_eq!(stored_b.position, Some(0));
    assert_eq!(stored_a.position, None);
  }
}
