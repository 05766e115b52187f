//! Resumable session snapshots.
//!
//! A snapshot is versioned JSON keyed by `(quiz, topic)`. It records the
//! shuffle order rather than the items themselves, so restoring against a
//! pool that changed since (items added, deleted, mastered) still works: gone
//! ids are dropped and new ones appended in a fresh shuffle. Batch progress is
//! only trusted when the live batch still holds exactly the same items.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use super::{Phase, Session, SessionStats};
use crate::config::RECENT_WINDOW;
use crate::domain::ItemId;
use crate::error::SnapshotError;
use crate::srs::BatchState;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
  pub version: u32,
  pub quiz_id: String,
  #[serde(default)]
  pub topic_id: Option<String>,
  pub saved_at: DateTime<Utc>,
  pub order: Vec<ItemId>,
  pub batch_index: usize,
  #[serde(default)]
  pub recent: Vec<ItemId>,
  #[serde(default)]
  pub seen: BTreeMap<ItemId, u32>,
  #[serde(default)]
  pub streak: BTreeMap<ItemId, u32>,
  #[serde(default)]
  pub was_new: BTreeSet<ItemId>,
  #[serde(default)]
  pub stats: SessionStats,
  /// Items of the batch `batch` belongs to
  #[serde(default)]
  pub batch_ids: BTreeSet<ItemId>,
  #[serde(default)]
  pub batch: BatchState,
}

impl Snapshot {
  /// Decode a stored snapshot, rejecting other versions
  pub fn parse(json: &str) -> Result<Self, SnapshotError> {
    let snapshot: Self = serde_json::from_str(json)?;
    if snapshot.version != SNAPSHOT_VERSION {
      return Err(SnapshotError::Version {
        found: snapshot.version,
        expected: SNAPSHOT_VERSION,
      });
    }
    Ok(snapshot)
  }

  pub fn to_json(&self) -> Result<String, serde_json::Error> {
    serde_json::to_string(self)
  }
}

impl Session {
  pub fn snapshot(&self, now: DateTime<Utc>) -> Snapshot {
    Snapshot {
      version: SNAPSHOT_VERSION,
      quiz_id: self.key.quiz_id.clone(),
      topic_id: self.key.topic_id.clone(),
      saved_at: now,
      order: self.order.clone(),
      batch_index: self.batch_index,
      recent: self.recent.iter().cloned().collect(),
      seen: self.seen.clone(),
      streak: self.streak.clone(),
      was_new: self.was_new.clone(),
      stats: self.stats.clone(),
      batch_ids: self.batch_ids().iter().cloned().collect(),
      batch: self.batch.clone(),
    }
  }

  /// Rebuild progress from `snapshot` on top of a freshly assembled session.
  /// Returns false when nothing of the snapshot applies to the live pool.
  pub(super) fn restore(&mut self, snapshot: Snapshot) -> bool {
    let live: HashSet<&ItemId> = self.items.keys().collect();

    let mut order: Vec<ItemId> = snapshot.order.into_iter().filter(|id| live.contains(id)).collect();
    if order.is_empty() {
      return false;
    }
    let known: HashSet<ItemId> = order.iter().cloned().collect();
    let mut added: Vec<ItemId> = self.items.keys().filter(|id| !known.contains(*id)).cloned().collect();
    added.shuffle(&mut self.rng);
    if !added.is_empty() {
      tracing::debug!("Appending {} items that joined the pool since the snapshot", added.len());
    }
    order.extend(added);

    let keep = |map: BTreeMap<ItemId, u32>| -> BTreeMap<ItemId, u32> {
      map.into_iter().filter(|(id, _)| self.items.contains_key(id)).collect()
    };
    self.seen = keep(snapshot.seen);
    self.streak = keep(snapshot.streak);
    self.recent = snapshot
      .recent
      .into_iter()
      .filter(|id| self.items.contains_key(id))
      .collect();
    while self.recent.len() > RECENT_WINDOW {
      self.recent.pop_front();
    }

    // New-at-start is sticky for items the session already knew; items that
    // joined since are classified by their current state
    let snapshot_new = snapshot.was_new;
    self.was_new = self
      .items
      .keys()
      .filter(|id| {
        if known.contains(*id) {
          snapshot_new.contains(*id)
        } else {
          self.was_new.contains(*id)
        }
      })
      .cloned()
      .collect();
    self.stats = snapshot.stats;

    self.order = order;
    self.batch_index = snapshot.batch_index.min(self.batch_count().saturating_sub(1));

    let live_batch: BTreeSet<ItemId> = self.batch_ids().iter().cloned().collect();
    if self.batch_index == snapshot.batch_index && live_batch == snapshot.batch_ids {
      self.batch = snapshot.batch;
    } else {
      tracing::debug!("Batch {} changed since the snapshot, rebuilding it", self.batch_index + 1);
      self.batch = self.build_batch();
    }

    self.phase = Phase::Preview { position: 0 };
    true
  }
}
