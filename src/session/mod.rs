//! Practice session orchestrator.
//!
//! [`Session`] is a synchronous state machine: every external event goes
//! through [`Session::apply`], which mutates the session and returns the
//! [`Effect`]s the caller must carry out (persist items, write or delete the
//! snapshot, present a round, arm or cancel the speed countdown). Nothing in
//! here touches storage or timers; see [`handle`] for the runtime side.
//!
//! The working pool is shuffled once and cut into batches of
//! [`BATCH_SIZE`]. Each batch opens with a preview of its items, then runs
//! rounds chosen by its [`BatchState`] until every eligible (kind, item) pair
//! has been drilled.

pub mod handle;
pub mod registry;
pub mod snapshot;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::time::Duration;

use crate::catalog::{self, Entry, ExerciseCatalog};
use crate::config::{self, BATCH_SIZE, RECENT_WINDOW, SESSION_STREAK_GOAL, SPEED_WINDOW};
use crate::domain::{Exercise, Item, ItemCapabilities, ItemId, Media, Response, RoundResult};
use crate::error::SessionError;
use crate::geo::{MapData, MapProvider};
use crate::srs::{self, BatchState, ReviewOutcome};

pub use handle::{SessionHandle, SessionNotice};
pub use registry::SessionRegistry;
pub use snapshot::{SNAPSHOT_VERSION, Snapshot};

/// Identifies a session: one quiz, optionally narrowed to one topic
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
  pub quiz_id: String,
  /// `None` drills the whole quiz
  pub topic_id: Option<String>,
}

impl SessionKey {
  pub fn topic(quiz_id: impl Into<String>, topic_id: impl Into<String>) -> Self {
    Self {
      quiz_id: quiz_id.into(),
      topic_id: Some(topic_id.into()),
    }
  }

  pub fn quiz(quiz_id: impl Into<String>) -> Self {
    Self {
      quiz_id: quiz_id.into(),
      topic_id: None,
    }
  }

  /// Snapshot storage key, `quiz:topic` (empty topic for whole-quiz sessions)
  pub fn storage_key(&self) -> String {
    format!("{}:{}", self.quiz_id, self.topic_id.as_deref().unwrap_or(""))
  }
}

impl fmt::Display for SessionKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.storage_key())
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionOptions {
  /// Session length in minutes, snapped to the allowed choices. `None` is untimed.
  pub minutes: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
  /// The last batch was fully drilled
  Completed,
  /// Every item reached the in-session streak goal
  Mastered,
  /// The last batch could not produce a single round
  GenerationExhausted,
  TimeUp,
  Stopped,
}

/// Running counters. Every submitted round lands in exactly one of
/// `correct`/`wrong` and one of `new`/`reviewed`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
  pub correct: u32,
  pub wrong: u32,
  pub new: u32,
  pub reviewed: u32,
  /// Distinct items that were new when the session started
  #[serde(default)]
  pub new_items: BTreeSet<ItemId>,
  #[serde(default)]
  pub reviewed_items: BTreeSet<ItemId>,
}

impl SessionStats {
  pub fn total(&self) -> u32 {
    self.correct + self.wrong
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
  pub reason: EndReason,
  pub correct: u32,
  pub total: u32,
  pub new: u32,
  pub reviewed: u32,
  pub new_items: usize,
  pub reviewed_items: usize,
}

/// One item of a batch preview
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewCard {
  pub batch_index: usize,
  pub position: usize,
  pub total: usize,
  pub item_id: ItemId,
  pub prompt: Option<Media>,
  pub answer: Option<Media>,
}

/// The exercise on screen
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Round {
  /// Increments with every presented round; stale countdowns carry an older value
  pub seq: u64,
  /// Display name of the exercise kind
  pub label: &'static str,
  pub exercise: Exercise,
  pub presented_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
  Preview { position: usize },
  AwaitingResult(Round),
  Finished(EndReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
  /// The learner has seen the current preview card
  AcknowledgePreview,
  Submit {
    response: Response,
    /// Measured by the client; the server clock is used when absent
    elapsed: Option<Duration>,
  },
  /// The speed countdown for round `seq` ran out
  Timeout { seq: u64 },
  /// Periodic timer
  Tick,
  /// The page went to the background
  Hidden,
  Stop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
  PersistItems(Vec<Item>),
  SaveSnapshot(Box<Snapshot>),
  DeleteSnapshot,
  ShowPreview(PreviewCard),
  PresentRound(Round),
  StartCountdown { seq: u64, after: Duration },
  CancelCountdown,
  RoundGraded(RoundResult),
  Ended(SessionSummary),
}

/// Read-only picture of a session for the presentation layer
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
  pub key: SessionKey,
  pub batch_index: usize,
  pub batch_count: usize,
  pub stats: SessionStats,
  pub deadline: Option<DateTime<Utc>>,
  pub preview: Option<PreviewCard>,
  pub round: Option<Round>,
  pub summary: Option<SessionSummary>,
}

pub struct Session {
  key: SessionKey,
  items: BTreeMap<ItemId, Item>,
  caps: BTreeMap<ItemId, ItemCapabilities>,
  map: Option<MapData>,
  /// Shuffled working order; batch `i` is `order[i * BATCH_SIZE..]`
  order: Vec<ItemId>,
  batch_index: usize,
  batch: BatchState,
  recent: VecDeque<ItemId>,
  seen: BTreeMap<ItemId, u32>,
  streak: BTreeMap<ItemId, u32>,
  /// Items with no successful review before this session touched them
  was_new: BTreeSet<ItemId>,
  stats: SessionStats,
  phase: Phase,
  deadline: Option<DateTime<Utc>>,
  round_seq: u64,
  rng: StdRng,
}

/// Outcome of one generation attempt within a scan
enum Attempt {
  Generated(Exercise),
  Failed,
  BatchDone,
}

impl Session {
  /// Working pool state shared by fresh and resumed sessions
  fn assemble(
    key: SessionKey,
    pool: Vec<Item>,
    maps: &dyn MapProvider,
    options: SessionOptions,
    rng: StdRng,
    now: DateTime<Utc>,
  ) -> Result<Self, SessionError> {
    let pool: Vec<Item> = pool.into_iter().filter(|it| !srs::is_mastered(it)).collect();
    if pool.is_empty() {
      return Err(SessionError::PoolEmpty);
    }

    let map = maps.load_map_data(&pool);
    let caps = pool
      .iter()
      .map(|it| {
        let has_feature = map.as_ref().is_some_and(|m| maps.has_feature(m, it));
        (it.id.clone(), ItemCapabilities::of(it, has_feature))
      })
      .collect();
    let was_new = pool.iter().filter(|it| srs::is_new(it)).map(|it| it.id.clone()).collect();
    let items: BTreeMap<ItemId, Item> = pool.into_iter().map(|it| (it.id.clone(), it)).collect();

    let deadline = options
      .minutes
      .map(|m| now + chrono::Duration::minutes(config::session_minutes(m) as i64));

    Ok(Self {
      key,
      items,
      caps,
      map,
      order: Vec::new(),
      batch_index: 0,
      batch: BatchState::default(),
      recent: VecDeque::new(),
      seen: BTreeMap::new(),
      streak: BTreeMap::new(),
      was_new,
      stats: SessionStats::default(),
      phase: Phase::Preview { position: 0 },
      deadline,
      round_seq: 0,
      rng,
    })
  }

  /// Begin a fresh session: mastered items are dropped, the rest shuffled,
  /// and the first batch previewed.
  pub fn start(
    key: SessionKey,
    pool: Vec<Item>,
    maps: &dyn MapProvider,
    options: SessionOptions,
    rng: StdRng,
    now: DateTime<Utc>,
  ) -> Result<(Self, Vec<Effect>), SessionError> {
    let mut session = Self::assemble(key, pool, maps, options, rng, now)?;

    let mut order: Vec<ItemId> = session.items.keys().cloned().collect();
    order.shuffle(&mut session.rng);
    session.order = order;
    session.batch = session.build_batch();

    tracing::info!(
      "Session {} started: {} items in {} batches, map rounds {}",
      session.key,
      session.order.len(),
      session.batch_count(),
      if session.map.is_some() { "on" } else { "off" }
    );

    let mut effects = vec![Effect::SaveSnapshot(Box::new(session.snapshot(now)))];
    effects.extend(session.show_preview());
    Ok((session, effects))
  }

  /// Continue from a snapshot. Resumed sessions go straight to rounds.
  ///
  /// A snapshot that cannot be used yields a fresh session instead.
  pub fn resume(
    key: SessionKey,
    pool: Vec<Item>,
    snapshot: Snapshot,
    maps: &dyn MapProvider,
    options: SessionOptions,
    rng: StdRng,
    now: DateTime<Utc>,
  ) -> Result<(Self, Vec<Effect>), SessionError> {
    let mut session = Self::assemble(key.clone(), pool.clone(), maps, options, rng.clone(), now)?;
    if !session.restore(snapshot) {
      tracing::warn!("Snapshot for {} did not match the live pool, starting fresh", key);
      return Self::start(key, pool, maps, options, rng, now);
    }

    tracing::info!(
      "Session {} resumed at batch {}/{}",
      session.key,
      session.batch_index + 1,
      session.batch_count()
    );
    let effects = session.next_round(now);
    Ok((session, effects))
  }

  pub fn key(&self) -> &SessionKey {
    &self.key
  }

  pub fn phase(&self) -> &Phase {
    &self.phase
  }

  pub fn stats(&self) -> &SessionStats {
    &self.stats
  }

  pub fn is_finished(&self) -> bool {
    matches!(self.phase, Phase::Finished(_))
  }

  pub fn deadline(&self) -> Option<DateTime<Utc>> {
    self.deadline
  }

  pub fn batch_state(&self) -> &BatchState {
    &self.batch
  }

  pub fn batch_index(&self) -> usize {
    self.batch_index
  }

  pub fn batch_count(&self) -> usize {
    self.order.len().div_ceil(BATCH_SIZE)
  }

  pub fn seen_count(&self, item_id: &str) -> u32 {
    self.seen.get(item_id).copied().unwrap_or(0)
  }

  pub fn streak_count(&self, item_id: &str) -> u32 {
    self.streak.get(item_id).copied().unwrap_or(0)
  }

  pub fn recent(&self) -> &VecDeque<ItemId> {
    &self.recent
  }

  pub fn item(&self, item_id: &str) -> Option<&Item> {
    self.items.get(item_id)
  }

  pub fn current_round(&self) -> Option<&Round> {
    match &self.phase {
      Phase::AwaitingResult(round) => Some(round),
      _ => None,
    }
  }

  pub fn summary(&self) -> Option<SessionSummary> {
    match self.phase {
      Phase::Finished(reason) => Some(self.summary_for(reason)),
      _ => None,
    }
  }

  pub fn view(&self) -> SessionView {
    SessionView {
      key: self.key.clone(),
      batch_index: self.batch_index,
      batch_count: self.batch_count(),
      stats: self.stats.clone(),
      deadline: self.deadline,
      preview: match self.phase {
        Phase::Preview { position } => self.preview_card(position),
        _ => None,
      },
      round: self.current_round().cloned(),
      summary: self.summary(),
    }
  }

  /// Advance the state machine by one event.
  pub fn apply(&mut self, event: Event, now: DateTime<Utc>) -> Vec<Effect> {
    if self.is_finished() {
      tracing::debug!("Session {} ignoring {:?} after end", self.key, event);
      return Vec::new();
    }

    match event {
      Event::AcknowledgePreview => self.acknowledge_preview(now),
      Event::Submit { response, elapsed } => self.submit(response, elapsed, now),
      Event::Timeout { seq } => {
        let current =
          matches!(&self.phase, Phase::AwaitingResult(r) if r.seq == seq && r.exercise.kind().is_timed());
        if current {
          self.submit(Response::Timeout, None, now)
        } else {
          Vec::new()
        }
      }
      Event::Tick => {
        if self.time_is_up(now) {
          self.finish(EndReason::TimeUp, now)
        } else {
          vec![Effect::SaveSnapshot(Box::new(self.snapshot(now)))]
        }
      }
      Event::Hidden => vec![Effect::SaveSnapshot(Box::new(self.snapshot(now)))],
      Event::Stop => self.finish(EndReason::Stopped, now),
    }
  }

  // ==================== Batches ====================

  fn batch_ids(&self) -> &[ItemId] {
    let start = (self.batch_index * BATCH_SIZE).min(self.order.len());
    let end = (start + BATCH_SIZE).min(self.order.len());
    &self.order[start..end]
  }

  fn entry(&self, id: &str) -> Option<Entry<'_>> {
    Some(Entry::new(self.items.get(id)?, *self.caps.get(id)?))
  }

  fn build_batch(&self) -> BatchState {
    let entries: Vec<Entry<'_>> = self.batch_ids().iter().filter_map(|id| self.entry(id)).collect();
    BatchState::build(&entries)
  }

  fn preview_card(&self, position: usize) -> Option<PreviewCard> {
    let ids = self.batch_ids();
    let item = self.items.get(ids.get(position)?)?;
    Some(PreviewCard {
      batch_index: self.batch_index,
      position,
      total: ids.len(),
      item_id: item.id.clone(),
      prompt: item.prompt_media(),
      answer: item.answer_media(),
    })
  }

  fn show_preview(&mut self) -> Vec<Effect> {
    self.phase = Phase::Preview { position: 0 };
    self.preview_card(0).map(Effect::ShowPreview).into_iter().collect()
  }

  fn acknowledge_preview(&mut self, now: DateTime<Utc>) -> Vec<Effect> {
    let Phase::Preview { position } = self.phase else {
      return Vec::new();
    };
    let next = position + 1;
    match self.preview_card(next) {
      Some(card) => {
        self.phase = Phase::Preview { position: next };
        vec![Effect::ShowPreview(card)]
      }
      None => self.next_round(now),
    }
  }

  /// The current batch has nothing pending
  fn batch_complete(&mut self, now: DateTime<Utc>) -> Vec<Effect> {
    if self.batch_index + 1 < self.batch_count() {
      self.batch_index += 1;
      self.batch = self.build_batch();
      tracing::info!("Session {} advanced to batch {}/{}", self.key, self.batch_index + 1, self.batch_count());
      self.show_preview()
    } else {
      self.finish(EndReason::Completed, now)
    }
  }

  // ==================== Rounds ====================

  fn time_is_up(&self, now: DateTime<Utc>) -> bool {
    self.deadline.is_some_and(|d| now >= d)
  }

  /// Scan the plan until an exercise generates. Each failed (kind, item) pair
  /// is resolved, so the scan always terminates.
  fn next_round(&mut self, now: DateTime<Utc>) -> Vec<Effect> {
    if self.time_is_up(now) {
      return self.finish(EndReason::TimeUp, now);
    }

    let mut failures = 0usize;
    loop {
      match self.try_generate() {
        Attempt::Generated(exercise) => return self.present(exercise, now),
        Attempt::Failed => failures += 1,
        Attempt::BatchDone => break,
      }
    }

    // Nothing in this batch was ever drilled and nothing generates now
    let untouched = self.batch_ids().iter().all(|id| self.seen_count(id) == 0);
    if untouched {
      tracing::warn!(
        "Session {}: no exercise could be generated for batch {} ({} attempts)",
        self.key,
        self.batch_index + 1,
        failures
      );
      if self.batch_index + 1 >= self.batch_count() {
        return self.finish(EndReason::GenerationExhausted, now);
      }
    }
    self.batch_complete(now)
  }

  fn try_generate(&mut self) -> Attempt {
    let Self {
      items,
      caps,
      map,
      order,
      batch,
      recent,
      rng,
      ..
    } = self;

    let Some(kind) = batch.next_kind() else {
      return Attempt::BatchDone;
    };
    let catalog = ExerciseCatalog::new(map.as_ref());
    let entry = |id: &ItemId| Some(Entry::new(items.get(id)?, *caps.get(id)?));

    if kind.is_group() {
      let group: Vec<Entry<'_>> = batch.pending_items(kind).iter().filter_map(entry).collect();
      return match catalog.generate_group(kind, &group, rng) {
        Some(exercise) => {
          tracing::debug!("Generated {} over {} items", kind.as_str(), group.len());
          Attempt::Generated(exercise)
        }
        None => {
          tracing::debug!("Could not generate {}, dropping it for this batch", kind.as_str());
          batch.resolve(kind, None);
          Attempt::Failed
        }
      };
    }

    let Some(target_id) = batch.pick_item(kind, recent, rng) else {
      return Attempt::Failed;
    };
    let pool: Vec<Entry<'_>> = order.iter().filter_map(entry).collect();
    let generated = entry(&target_id).and_then(|target| catalog.generate(kind, target, &pool, rng));

    match generated {
      Some(exercise) => {
        tracing::debug!("Generated {} for {}", kind.as_str(), target_id);
        batch.mark_shown(&target_id);
        Attempt::Generated(exercise)
      }
      None => {
        tracing::debug!("Could not generate {} for {}", kind.as_str(), target_id);
        batch.resolve(kind, Some(&target_id));
        Attempt::Failed
      }
    }
  }

  fn present(&mut self, exercise: Exercise, now: DateTime<Utc>) -> Vec<Effect> {
    self.round_seq += 1;
    let round = Round {
      seq: self.round_seq,
      label: exercise.kind().label(),
      exercise,
      presented_at: now,
    };
    let timed = round.exercise.kind().is_timed();
    self.phase = Phase::AwaitingResult(round.clone());

    let mut effects = vec![Effect::PresentRound(round)];
    if timed {
      effects.push(Effect::StartCountdown {
        seq: self.round_seq,
        after: SPEED_WINDOW,
      });
    }
    effects
  }

  fn submit(&mut self, response: Response, elapsed: Option<Duration>, now: DateTime<Utc>) -> Vec<Effect> {
    let Phase::AwaitingResult(round) = &self.phase else {
      tracing::debug!("Session {} got an answer with no round on screen", self.key);
      return Vec::new();
    };

    let elapsed = elapsed.or_else(|| (now - round.presented_at).to_std().ok());
    let result = catalog::grade(&round.exercise, &response, elapsed);
    let kind = round.exercise.kind();
    let target = round.exercise.target().cloned();

    let mut effects = Vec::new();
    if kind.is_timed() {
      effects.push(Effect::CancelCountdown);
    }
    effects.push(Effect::PersistItems(self.record(&result, now)));
    effects.push(Effect::RoundGraded(result));

    self.batch.resolve(kind, target.as_deref());

    let mastered = self.order.iter().all(|id| self.streak_count(id) >= SESSION_STREAK_GOAL);
    let next = if mastered {
      self.finish(EndReason::Mastered, now)
    } else if self.batch.is_complete() {
      self.batch_complete(now)
    } else {
      self.next_round(now)
    };

    if !self.is_finished() {
      effects.push(Effect::SaveSnapshot(Box::new(self.snapshot(now))));
    }
    effects.extend(next);
    effects
  }

  /// Apply a graded round to long-term and in-session state. Returns the
  /// items whose scheduling changed.
  fn record(&mut self, result: &RoundResult, now: DateTime<Utc>) -> Vec<Item> {
    let outcome = ReviewOutcome::from_correct(result.correct);

    if result.correct {
      self.stats.correct += 1;
    } else {
      self.stats.wrong += 1;
    }
    if result.item_ids.iter().any(|id| self.was_new.contains(id)) {
      self.stats.new += 1;
    } else {
      self.stats.reviewed += 1;
    }

    let mut changed = Vec::with_capacity(result.item_ids.len());
    for id in &result.item_ids {
      let Some(item) = self.items.get_mut(id) else {
        continue;
      };
      srs::update_srs(item, outcome, now);
      changed.push(item.clone());

      if self.was_new.contains(id) {
        self.stats.new_items.insert(id.clone());
      } else {
        self.stats.reviewed_items.insert(id.clone());
      }

      *self.seen.entry(id.clone()).or_insert(0) += 1;
      let streak = self.streak.entry(id.clone()).or_insert(0);
      *streak = if result.correct { *streak + 1 } else { 0 };

      self.recent.retain(|r| r != id);
      self.recent.push_back(id.clone());
      while self.recent.len() > RECENT_WINDOW {
        self.recent.pop_front();
      }
    }
    changed
  }

  fn summary_for(&self, reason: EndReason) -> SessionSummary {
    SessionSummary {
      reason,
      correct: self.stats.correct,
      total: self.stats.total(),
      new: self.stats.new,
      reviewed: self.stats.reviewed,
      new_items: self.stats.new_items.len(),
      reviewed_items: self.stats.reviewed_items.len(),
    }
  }

  fn finish(&mut self, reason: EndReason, now: DateTime<Utc>) -> Vec<Effect> {
    let mut effects = Vec::new();
    if matches!(&self.phase, Phase::AwaitingResult(r) if r.exercise.kind().is_timed()) {
      effects.push(Effect::CancelCountdown);
    }

    // A stopped session can be resumed later; any other end is final
    if reason == EndReason::Stopped {
      effects.push(Effect::SaveSnapshot(Box::new(self.snapshot(now))));
    } else {
      effects.push(Effect::DeleteSnapshot);
    }

    self.phase = Phase::Finished(reason);
    let summary = self.summary_for(reason);
    tracing::info!(
      "Session {} ended ({:?}): {}/{} correct, {} new, {} reviewed",
      self.key,
      reason,
      summary.correct,
      summary.total,
      summary.new_items,
      summary.reviewed_items
    );
    effects.push(Effect::Ended(summary));
    effects
  }
}


#[cfg(test)]
mod tests {
  use super::fixtures::*;
  use super::*;
  use crate::domain::ExerciseKind;
  use crate::geo::NoMaps;
  use rand::SeedableRng;
  use std::collections::HashSet;

  fn ended(effects: &[Effect]) -> Option<&SessionSummary> {
    effects.iter().find_map(|e| match e {
      Effect::Ended(s) => Some(s),
      _ => None,
    })
  }

  #[test]
  fn test_empty_pool_is_rejected() {
    let result = Session::start(
      SessionKey::quiz("spain"),
      Vec::new(),
      &NoMaps,
      SessionOptions::default(),
      StdRng::seed_from_u64(1),
      Utc::now(),
    );
    assert!(matches!(result, Err(SessionError::PoolEmpty)));
  }

  #[test]
  fn test_mastered_items_are_excluded() {
    let mut pool = text_pool(3);
    for item in &mut pool {
      item.srs.mastered_hits = 10;
    }
    let result = Session::start(
      SessionKey::quiz("spain"),
      pool,
      &NoMaps,
      SessionOptions::default(),
      StdRng::seed_from_u64(1),
      Utc::now(),
    );
    assert!(matches!(result, Err(SessionError::PoolEmpty)));

    let mut pool = text_pool(6);
    pool[0].srs.mastered_hits = 12;
    let (session, _) = start(pool, 1);
    assert!(session.item("it00").is_none());
    assert_eq!(session.batch_count(), 2);
  }

  #[test]
  fn test_start_shows_first_preview() {
    let (session, effects) = start(text_pool(6), 3);
    assert!(matches!(effects[0], Effect::SaveSnapshot(_)));
    let Some(Effect::ShowPreview(card)) = effects.get(1) else { panic!("expected preview") };
    assert_eq!(card.batch_index, 0);
    assert_eq!(card.position, 0);
    assert_eq!(card.total, 4);
    assert!(matches!(card.prompt, Some(Media::Text(_))));
    assert_eq!(session.phase(), &Phase::Preview { position: 0 });
  }

  #[test]
  fn test_preview_then_round() {
    let (mut session, _) = start(text_pool(4), 5);
    for position in 1..4 {
      let effects = session.apply(Event::AcknowledgePreview, Utc::now());
      assert!(matches!(&effects[..], [Effect::ShowPreview(c)] if c.position == position));
    }
    let effects = session.apply(Event::AcknowledgePreview, Utc::now());
    let Some(Effect::PresentRound(round)) = effects.first() else { panic!("expected round") };
    assert_eq!(round.seq, 1);
    assert_eq!(round.exercise.kind(), ExerciseKind::McqTextToText);
  }

  #[test]
  fn test_submit_updates_srs_stats_and_recency() {
    let (mut session, _) = start(text_pool(4), 7);
    skip_preview(&mut session);
    let target = session.current_round().unwrap().exercise.target().cloned().unwrap();

    let effects = answer(&mut session, true);
    let persisted = effects
      .iter()
      .find_map(|e| match e {
        Effect::PersistItems(items) => Some(items.clone()),
        _ => None,
      })
      .unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].id, target);
    assert_eq!(persisted[0].srs.repetitions, 1);
    assert_eq!(persisted[0].srs.mastered_hits, 1);

    assert_eq!(session.stats().correct, 1);
    assert_eq!(session.stats().new, 1);
    assert_eq!(session.seen_count(&target), 1);
    assert_eq!(session.streak_count(&target), 1);
    assert_eq!(session.recent().back(), Some(&target));
    assert!(effects.iter().any(|e| matches!(e, Effect::SaveSnapshot(_))));
    assert!(effects.iter().any(|e| matches!(e, Effect::PresentRound(_))));
  }

  #[test]
  fn test_wrong_answer_resets_streak() {
    let (mut session, _) = start(text_pool(4), 9);
    skip_preview(&mut session);
    let target = session.current_round().unwrap().exercise.target().cloned().unwrap();
    answer(&mut session, true);
    // Find the same target again or any round and fail it
    let second = session.current_round().unwrap().exercise.clone();
    answer(&mut session, false);
    for id in second.item_ids() {
      assert_eq!(session.streak_count(&id), 0);
    }
    assert_eq!(session.stats().wrong, 1);
    assert!(session.seen_count(&target) >= 1);
  }

  #[test]
  fn test_reviewed_items_count_as_reviewed() {
    let mut pool = text_pool(4);
    for item in &mut pool {
      item.srs.repetitions = 2;
      item.srs.interval_days = 6;
    }
    let (mut session, _) = start(pool, 11);
    skip_preview(&mut session);
    answer(&mut session, true);
    answer(&mut session, false);
    let stats = session.stats();
    assert_eq!(stats.new, 0);
    assert_eq!(stats.reviewed, 2);
    assert!(stats.new_items.is_empty());
  }

  #[test]
  fn test_full_session_completes_with_consistent_stats() {
    let (mut session, _) = start(text_pool(10), 13);
    let mut rounds = 0u32;
    let mut summary = None;
    let mut batches_seen = HashSet::new();

    skip_preview(&mut session);
    while summary.is_none() {
      batches_seen.insert(session.batch_index());
      if matches!(session.phase(), Phase::Preview { .. }) {
        skip_preview(&mut session);
        continue;
      }
      let effects = answer(&mut session, rounds % 3 != 0);
      rounds += 1;
      summary = ended(&effects).cloned();
      assert!(rounds < 500, "session never ended");
    }

    let summary = summary.unwrap();
    assert_eq!(summary.reason, EndReason::Completed);
    assert_eq!(summary.total, rounds);
    assert_eq!(summary.new + summary.reviewed, rounds);
    assert_eq!(summary.new_items, 10);
    assert_eq!(batches_seen.len(), 3);
    assert!(session.is_finished());
  }

  #[test]
  fn test_session_deletes_snapshot_when_complete() {
    let (mut session, _) = start(text_pool(4), 17);
    skip_preview(&mut session);
    loop {
      let effects = answer(&mut session, true);
      if ended(&effects).is_some() {
        assert!(effects.contains(&Effect::DeleteSnapshot));
        assert!(!effects.iter().any(|e| matches!(e, Effect::SaveSnapshot(_))));
        break;
      }
    }
  }

  #[test]
  fn test_streak_goal_ends_session_as_mastered() {
    let (mut session, _) = start(text_pool(4), 19);
    skip_preview(&mut session);
    for id in session.order.clone() {
      session.streak.insert(id, SESSION_STREAK_GOAL);
    }
    let effects = answer(&mut session, true);
    assert_eq!(ended(&effects).map(|s| s.reason), Some(EndReason::Mastered));
  }

  #[test]
  fn test_recent_window_is_capped_and_distinct() {
    let (mut session, _) = start(text_pool(4), 23);
    skip_preview(&mut session);
    for _ in 0..8 {
      if session.is_finished() || session.current_round().is_none() {
        break;
      }
      answer(&mut session, true);
      assert!(session.recent().len() <= RECENT_WINDOW);
      let distinct: HashSet<_> = session.recent().iter().collect();
      assert_eq!(distinct.len(), session.recent().len());
    }
  }

  #[test]
  fn test_round_carries_kind_label() {
    let (mut session, _) = start(text_pool(4), 23);
    skip_preview(&mut session);
    let round = session.current_round().unwrap();
    assert_eq!(round.label, round.exercise.kind().label());
    let json = serde_json::to_value(session.view()).unwrap();
    assert_eq!(json["round"]["label"], round.label);
  }

  #[test]
  fn test_recent_targets_not_repeated_within_four_rounds() {
    let mut windows = 0;
    for seed in [29, 41, 53, 67] {
      let (mut session, _) = start(text_pool(10), seed);
      assert!(session.batch_count() > 1);
      // Consecutive single-item targets since the last group round
      let mut run: Vec<ItemId> = Vec::new();
      let mut guard = 0;
      while !session.is_finished() {
        if matches!(session.phase(), Phase::Preview { .. }) {
          skip_preview(&mut session);
          continue;
        }
        let round = session.current_round().unwrap().clone();
        match round.exercise.target() {
          Some(target) => {
            let previous = &run[run.len().saturating_sub(3)..];
            if previous.contains(target) {
              // Only allowed when every pending candidate was recently shown
              let pending = session.batch_state().pending_items(round.exercise.kind());
              assert!(
                pending.iter().all(|id| session.recent().contains(id)),
                "seed {}: {} repeated while {:?} pending",
                seed,
                target,
                pending
              );
            }
            if previous.len() == 3 {
              windows += 1;
            }
            run.push(target.clone());
          }
          None => run.clear(),
        }
        answer(&mut session, true);
        guard += 1;
        assert!(guard < 500);
      }
    }
    assert!(windows > 0);
  }

  #[test]
  fn test_stop_saves_snapshot_and_ignores_later_events() {
    let (mut session, _) = start(text_pool(4), 31);
    skip_preview(&mut session);
    let effects = session.apply(Event::Stop, Utc::now());
    assert!(effects.iter().any(|e| matches!(e, Effect::SaveSnapshot(_))));
    assert_eq!(ended(&effects).map(|s| s.reason), Some(EndReason::Stopped));
    assert!(session.apply(Event::Tick, Utc::now()).is_empty());
    assert!(session.apply(Event::AcknowledgePreview, Utc::now()).is_empty());
  }

  #[test]
  fn test_hidden_and_tick_flush_snapshot() {
    let (mut session, _) = start(text_pool(4), 37);
    assert!(matches!(&session.apply(Event::Hidden, Utc::now())[..], [Effect::SaveSnapshot(_)]));
    assert!(matches!(&session.apply(Event::Tick, Utc::now())[..], [Effect::SaveSnapshot(_)]));
  }

  #[test]
  fn test_timed_session_ends_when_time_is_up() {
    let now = Utc::now();
    let (mut session, _) = Session::start(
      SessionKey::topic("spain", "capitals"),
      text_pool(4),
      &NoMaps,
      SessionOptions { minutes: Some(2) },
      StdRng::seed_from_u64(41),
      now,
    )
    .unwrap();
    assert_eq!(session.deadline(), Some(now + chrono::Duration::minutes(2)));

    let effects = session.apply(Event::Tick, now + chrono::Duration::minutes(1));
    assert!(ended(&effects).is_none());
    let effects = session.apply(Event::Tick, now + chrono::Duration::minutes(2));
    assert_eq!(ended(&effects).map(|s| s.reason), Some(EndReason::TimeUp));
    assert!(effects.contains(&Effect::DeleteSnapshot));
  }

  #[test]
  fn test_odd_session_length_falls_back() {
    let now = Utc::now();
    let (session, _) = Session::start(
      SessionKey::quiz("spain"),
      text_pool(4),
      &NoMaps,
      SessionOptions { minutes: Some(7) },
      StdRng::seed_from_u64(1),
      now,
    )
    .unwrap();
    assert_eq!(session.deadline(), Some(now + chrono::Duration::minutes(5)));
  }

  #[test]
  fn test_ungeneratable_pool_ends_with_generation_exhausted() {
    // Prompt and answer agree and there are no images: only matching and
    // true/false apply, and neither can be built
    let pool: Vec<Item> = (0..2)
      .map(|i| {
        Item::new(format!("x{}", i), "q", "t")
          .with_prompt_text("Same")
          .with_answer_text("same")
      })
      .collect();
    let (mut session, _) = start(pool, 43);
    skip_preview(&mut session);
    let effects = session.apply(Event::AcknowledgePreview, Utc::now());
    assert!(effects.is_empty());
    assert_eq!(session.phase(), &Phase::Finished(EndReason::GenerationExhausted));
  }

  #[test]
  fn test_speed_round_countdown_and_timeout() {
    let pool: Vec<Item> = (0..4)
      .map(|i| {
        Item::new(format!("f{}", i), "q", "flags")
          .with_prompt_image(format!("flag{}.png", i))
          .with_answer_text(format!("Country {}", i))
      })
      .collect();
    let (mut session, _) = start(pool, 47);
    skip_preview(&mut session);

    let mut guard = 0;
    while session.current_round().map(|r| r.exercise.kind()) != Some(ExerciseKind::Speed) {
      answer(&mut session, true);
      guard += 1;
      assert!(guard < 100 && !session.is_finished(), "no speed round");
    }
    let seq = session.current_round().unwrap().seq;

    // A countdown from an older round is ignored
    assert!(session.apply(Event::Timeout { seq: seq - 1 }, Utc::now()).is_empty());

    let effects = session.apply(Event::Timeout { seq }, Utc::now());
    assert_eq!(effects[0], Effect::CancelCountdown);
    let graded = effects
      .iter()
      .find_map(|e| match e {
        Effect::RoundGraded(r) => Some(r.clone()),
        _ => None,
      })
      .unwrap();
    assert!(!graded.correct);
    assert_eq!(graded.meta["timeout"], true);
  }

  #[test]
  fn test_storage_key() {
    assert_eq!(SessionKey::topic("spain", "capitals").storage_key(), "spain:capitals");
    assert_eq!(SessionKey::quiz("spain").storage_key(), "spain:");
  }
}
