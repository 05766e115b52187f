//! Per-batch exercise rotation.
//!
//! Every (kind, item) pair of the batch that is eligible starts pending. A
//! rotating pointer walks [`KIND_PLAN`] and picks the first kind with pending
//! work. Completing a round resolves its pair whether or not the answer was
//! right; the batch is complete once nothing is pending.

use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::catalog::{self, Entry};
use crate::config::MATCH_PAIR_COUNT;
use crate::domain::{ExerciseKind, ItemId};

/// Fixed kind priority. Image-to-text and word grid appear twice so they come
/// up more often than the rest.
pub const KIND_PLAN: [ExerciseKind; 14] = [
  ExerciseKind::McqTextToText,
  ExerciseKind::McqTextToImage,
  ExerciseKind::McqImageToText,
  ExerciseKind::McqTextToPrompt,
  ExerciseKind::Fragments,
  ExerciseKind::Spelling,
  ExerciseKind::WordGrid,
  ExerciseKind::MapName,
  ExerciseKind::McqImageToText,
  ExerciseKind::WordGrid,
  ExerciseKind::MapFlag,
  ExerciseKind::Match,
  ExerciseKind::TrueFalse,
  ExerciseKind::Speed,
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchState {
  /// Items still needing each kind; kinds with nothing eligible are absent
  pub pending: BTreeMap<ExerciseKind, BTreeSet<ItemId>>,
  /// Next index into [`KIND_PLAN`] to scan from
  pub pointer: usize,
  /// Target of the last single-item round
  pub last_shown: Option<ItemId>,
}

impl BatchState {
  /// Seed pending sets from the eligibility of every (kind, item) pair
  pub fn build(batch: &[Entry<'_>]) -> Self {
    let mut pending: BTreeMap<ExerciseKind, BTreeSet<ItemId>> = BTreeMap::new();

    for kind in ExerciseKind::ALL {
      let ids: BTreeSet<ItemId> = batch
        .iter()
        .filter(|e| catalog::eligible(kind, &e.caps))
        .map(|e| e.item.id.clone())
        .collect();

      let enough = if kind.is_group() { ids.len() >= MATCH_PAIR_COUNT } else { !ids.is_empty() };
      if enough {
        pending.insert(kind, ids);
      }
    }

    Self {
      pending,
      pointer: 0,
      last_shown: None,
    }
  }

  pub fn is_complete(&self) -> bool {
    self.pending.values().all(BTreeSet::is_empty)
  }

  pub fn has_pending(&self, kind: ExerciseKind) -> bool {
    self.pending.get(&kind).is_some_and(|ids| !ids.is_empty())
  }

  /// Scan the plan from the pointer (wrapping) for the next kind with pending
  /// items and move the pointer past it. `None` means the batch is complete.
  pub fn next_kind(&mut self) -> Option<ExerciseKind> {
    let len = KIND_PLAN.len();
    let start = self.pointer % len;
    for offset in 0..len {
      let idx = (start + offset) % len;
      let kind = KIND_PLAN[idx];
      if self.has_pending(kind) {
        self.pointer = (idx + 1) % len;
        return Some(kind);
      }
    }
    None
  }

  /// Choose a target for a single-item kind.
  ///
  /// The last shown item, then recently shown items, are skipped whenever
  /// something else is still pending.
  pub fn pick_item<R: Rng + ?Sized>(
    &self,
    kind: ExerciseKind,
    recent: &VecDeque<ItemId>,
    rng: &mut R,
  ) -> Option<ItemId> {
    let mut candidates: Vec<&ItemId> = self.pending.get(&kind)?.iter().collect();

    if let Some(last) = &self.last_shown {
      exclude_if_alternatives(&mut candidates, |id| id == last);
    }
    exclude_if_alternatives(&mut candidates, |id| recent.contains(id));

    candidates.choose(rng).map(|id| (*id).clone())
  }

  /// Items still pending for a kind, in id order
  pub fn pending_items(&self, kind: ExerciseKind) -> Vec<ItemId> {
    self.pending.get(&kind).map(|ids| ids.iter().cloned().collect()).unwrap_or_default()
  }

  /// Mark a completed (or ungeneratable) round. Group kinds clear their whole set.
  pub fn resolve(&mut self, kind: ExerciseKind, item_id: Option<&str>) {
    let Some(ids) = self.pending.get_mut(&kind) else {
      return;
    };
    match item_id {
      Some(id) if !kind.is_group() => {
        ids.remove(id);
      }
      _ => ids.clear(),
    }
  }

  pub fn mark_shown(&mut self, item_id: &str) {
    self.last_shown = Some(item_id.to_string());
  }

  /// Every item id referenced by the pending sets
  pub fn item_ids(&self) -> BTreeSet<ItemId> {
    self.pending.values().flatten().cloned().collect()
  }
}

fn exclude_if_alternatives<F: Fn(&ItemId) -> bool>(candidates: &mut Vec<&ItemId>, excluded: F) {
  if candidates.iter().any(|id| !excluded(id)) {
    candidates.retain(|id| !excluded(id));
  }
}
