//! Runtime side of a session: carries out effects against the stores, owns
//! the snapshot tick and speed countdown timers, and broadcasts notices.

use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::{Effect, Event, PreviewCard, Round, Session, SessionKey, SessionSummary, SessionView};
use crate::config::SNAPSHOT_INTERVAL;
use crate::db::{ItemStore, LogOnError, SnapshotStore};
use crate::domain::{Response, RoundResult};
use crate::error::{SessionError, StoreError};

const NOTICE_CHANNEL_CAPACITY: usize = 64;

/// What observers of a session are told
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum SessionNotice {
  Preview(PreviewCard),
  RoundReady(Round),
  Graded(RoundResult),
  Ended(SessionSummary),
}

#[derive(Clone)]
pub struct SessionHandle {
  inner: Arc<Inner>,
}

struct Inner {
  key: SessionKey,
  session: Mutex<Session>,
  destroyed: AtomicBool,
  items: Arc<dyn ItemStore>,
  snapshots: Arc<dyn SnapshotStore>,
  notices: broadcast::Sender<SessionNotice>,
  tick: Mutex<Option<JoinHandle<()>>>,
  countdown: Mutex<Option<JoinHandle<()>>>,
}

impl SessionHandle {
  /// Take ownership of a started session, carry out its opening effects and
  /// arm the periodic tick. Must be called inside a tokio runtime.
  pub fn launch(
    session: Session,
    effects: Vec<Effect>,
    items: Arc<dyn ItemStore>,
    snapshots: Arc<dyn SnapshotStore>,
  ) -> Result<Self, SessionError> {
    let (notices, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
    let inner = Arc::new(Inner {
      key: session.key().clone(),
      session: Mutex::new(session),
      destroyed: AtomicBool::new(false),
      items,
      snapshots,
      notices,
      tick: Mutex::new(None),
      countdown: Mutex::new(None),
    });

    inner.run_effects(effects)?;
    if !inner.is_destroyed() {
      inner.spawn_tick();
    }
    Ok(Self { inner })
  }

  pub fn key(&self) -> &SessionKey {
    &self.inner.key
  }

  /// False once the session has ended, been stopped or aborted
  pub fn is_active(&self) -> bool {
    !self.inner.is_destroyed()
  }

  pub fn subscribe(&self) -> broadcast::Receiver<SessionNotice> {
    self.inner.notices.subscribe()
  }

  pub fn current_round(&self) -> Option<Round> {
    if self.inner.is_destroyed() {
      return None;
    }
    self.inner.lock_session().ok()?.current_round().cloned()
  }

  pub fn view(&self) -> Result<SessionView, SessionError> {
    Ok(self.inner.lock_session()?.view())
  }

  pub fn acknowledge_preview(&self) -> Result<SessionView, SessionError> {
    self.inner.dispatch(Event::AcknowledgePreview)?;
    self.view()
  }

  /// Grade the learner's answer to the round on screen. `None` when no
  /// round was waiting for one.
  pub fn submit(&self, response: Response, elapsed: Option<Duration>) -> Result<Option<RoundResult>, SessionError> {
    let effects = self.inner.dispatch(Event::Submit { response, elapsed })?;
    Ok(effects.into_iter().find_map(|e| match e {
      Effect::RoundGraded(result) => Some(result),
      _ => None,
    }))
  }

  /// The page went to the background
  pub fn hidden(&self) -> Result<(), SessionError> {
    self.inner.dispatch(Event::Hidden)?;
    Ok(())
  }

  /// Flush a final snapshot and cancel timers. Returns the summary, or
  /// `None` if the session had already ended.
  pub fn stop(&self) -> Option<SessionSummary> {
    let effects = self.inner.dispatch(Event::Stop).ok()?;
    effects.into_iter().find_map(|e| match e {
      Effect::Ended(summary) => Some(summary),
      _ => None,
    })
  }
}

impl Inner {
  fn is_destroyed(&self) -> bool {
    self.destroyed.load(Ordering::SeqCst)
  }

  fn lock_session(&self) -> Result<MutexGuard<'_, Session>, SessionError> {
    self.session.lock().map_err(|_| {
      tracing::error!("Session {} mutex poisoned", self.key);
      SessionError::Stopped
    })
  }

  /// Apply one event and carry out its effects while holding the session,
  /// so store writes land in event order.
  fn dispatch(self: &Arc<Self>, event: Event) -> Result<Vec<Effect>, SessionError> {
    if self.is_destroyed() {
      return Err(SessionError::Stopped);
    }
    let mut session = self.lock_session()?;
    let effects = session.apply(event, Utc::now());
    self.run_effects(effects.clone())?;
    Ok(effects)
  }

  fn run_effects(self: &Arc<Self>, effects: Vec<Effect>) -> Result<(), SessionError> {
    for effect in effects {
      match effect {
        Effect::PersistItems(changed) => {
          if let Err(e) = changed.iter().try_for_each(|item| self.items.put_item(item)) {
            self.abort(&e);
            return Err(e.into());
          }
        }
        Effect::SaveSnapshot(snapshot) => {
          let saved = snapshot
            .to_json()
            .map_err(StoreError::from)
            .and_then(|json| self.snapshots.save_snapshot(&self.key, &json, snapshot.saved_at));
          saved.log_warn("Failed to save session snapshot");
        }
        Effect::DeleteSnapshot => {
          self.snapshots.delete_snapshot(&self.key).log_warn("Failed to delete session snapshot");
        }
        Effect::ShowPreview(card) => self.notify(SessionNotice::Preview(card)),
        Effect::PresentRound(round) => self.notify(SessionNotice::RoundReady(round)),
        Effect::StartCountdown { seq, after } => self.spawn_countdown(seq, after),
        Effect::CancelCountdown => cancel(&self.countdown),
        Effect::RoundGraded(result) => self.notify(SessionNotice::Graded(result)),
        Effect::Ended(summary) => {
          self.destroy();
          self.notify(SessionNotice::Ended(summary));
        }
      }
    }
    Ok(())
  }

  fn notify(&self, notice: SessionNotice) {
    // Nobody listening is fine
    let _ = self.notices.send(notice);
  }

  fn destroy(&self) {
    self.destroyed.store(true, Ordering::SeqCst);
    cancel(&self.countdown);
    cancel(&self.tick);
  }

  /// A store write failed mid-session. Nothing written since the last good
  /// snapshot can be trusted, so the snapshot goes too.
  fn abort(&self, error: &StoreError) {
    tracing::warn!("Session {} aborted: {}", self.key, error);
    self.destroy();
    self.snapshots.delete_snapshot(&self.key).log_warn("Failed to delete session snapshot");
  }

  fn spawn_tick(self: &Arc<Self>) {
    let weak = Arc::downgrade(self);
    let task = tokio::spawn(async move {
      let mut interval = tokio::time::interval(SNAPSHOT_INTERVAL);
      // The first tick completes immediately
      interval.tick().await;
      loop {
        interval.tick().await;
        let Some(inner) = live(&weak) else { break };
        inner.dispatch(Event::Tick).log_warn("Session tick failed");
      }
    });
    replace(&self.tick, task);
  }

  fn spawn_countdown(self: &Arc<Self>, seq: u64, after: Duration) {
    let weak = Arc::downgrade(self);
    let task = tokio::spawn(async move {
      tokio::time::sleep(after).await;
      if let Some(inner) = live(&weak) {
        tracing::debug!("Speed round {} of {} timed out", seq, inner.key);
        inner.dispatch(Event::Timeout { seq }).log_warn("Speed countdown failed");
      }
    });
    replace(&self.countdown, task);
  }
}

impl Drop for Inner {
  fn drop(&mut self) {
    cancel(&self.countdown);
    cancel(&self.tick);
  }
}

/// The session behind `weak`, unless it is gone or destroyed
fn live(weak: &Weak<Inner>) -> Option<Arc<Inner>> {
  weak.upgrade().filter(|inner| !inner.is_destroyed())
}

fn replace(slot: &Mutex<Option<JoinHandle<()>>>, task: JoinHandle<()>) {
  match slot.lock() {
    Ok(mut slot) => {
      if let Some(old) = slot.replace(task) {
        old.abort();
      }
    }
    Err(_) => task.abort(),
  }
}

fn cancel(slot: &Mutex<Option<JoinHandle<()>>>) {
  if let Ok(mut slot) = slot.lock() {
    if let Some(task) = slot.take() {
      task.abort();
    }
  }
}
