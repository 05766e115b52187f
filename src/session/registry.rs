//! Live sessions keyed by (quiz, topic).
//!
//! At most one session runs per key: starting a new one first stops the old
//! one (final snapshot flush, timers cancelled). Ended sessions stay
//! readable until they expire after a period of inactivity.

use chrono::{DateTime, Duration, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{Session, SessionHandle, SessionKey, SessionOptions, SessionSummary, Snapshot};
use crate::config;
use crate::db::{ItemStore, LogOnError, SnapshotStore};
use crate::domain::Item;
use crate::error::SessionError;
use crate::geo::MapProvider;

/// Registry entry with last access time for expiration
struct RegistryEntry {
  handle: SessionHandle,
  last_access: DateTime<Utc>,
}

pub struct SessionRegistry {
  sessions: Mutex<HashMap<SessionKey, RegistryEntry>>,
  /// Held across a whole start so two starts for one key cannot interleave
  starts: Mutex<HashMap<SessionKey, Arc<Mutex<()>>>>,
  items: Arc<dyn ItemStore>,
  snapshots: Arc<dyn SnapshotStore>,
  maps: Arc<dyn MapProvider>,
}

impl SessionRegistry {
  pub fn new(items: Arc<dyn ItemStore>, snapshots: Arc<dyn SnapshotStore>, maps: Arc<dyn MapProvider>) -> Self {
    Self {
      sessions: Mutex::new(HashMap::new()),
      starts: Mutex::new(HashMap::new()),
      items,
      snapshots,
      maps,
    }
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<SessionKey, RegistryEntry>> {
    // Entries stay consistent even if a holder panicked
    self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  fn start_guard(&self, key: &SessionKey) -> Arc<Mutex<()>> {
    let mut starts = self.starts.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    starts.entry(key.clone()).or_default().clone()
  }

  /// Items the session draws from: one topic, or the whole quiz
  fn load_pool(&self, key: &SessionKey) -> Result<Vec<Item>, SessionError> {
    let pool = match key.topic_id.as_deref() {
      Some(topic_id) => self.items.list_items_by_topic(topic_id)?,
      None => self.items.list_items_by_quiz(&key.quiz_id)?,
    };
    Ok(pool)
  }

  /// A usable snapshot for `key`. Unreadable or corrupt snapshots count as absent.
  fn load_snapshot(&self, key: &SessionKey) -> Option<Snapshot> {
    let json = self.snapshots.load_snapshot(key).log_warn("Failed to read session snapshot")??;
    match Snapshot::parse(&json) {
      Ok(snapshot) => Some(snapshot),
      Err(e) => {
        tracing::warn!("Ignoring snapshot for {}: {}", key, e);
        None
      }
    }
  }

  /// Whether a resume-or-restart choice should be offered
  pub fn resume_available(&self, key: &SessionKey) -> bool {
    self.load_snapshot(key).is_some()
  }

  /// Start a session for `key`, resuming from its snapshot when asked and
  /// possible. Declining to resume discards the snapshot.
  pub fn start(&self, key: SessionKey, resume: bool, options: SessionOptions) -> Result<SessionHandle, SessionError> {
    let guard = self.start_guard(&key);
    let _starting = guard.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    let previous = self.lock().remove(&key);
    if let Some(previous) = previous {
      tracing::info!("Stopping running session {} before starting a new one", key);
      previous.handle.stop();
    }

    let pool = self.load_pool(&key)?;
    let snapshot = if resume {
      self.load_snapshot(&key)
    } else {
      self.snapshots.delete_snapshot(&key).log_warn("Failed to discard session snapshot");
      None
    };

    let rng = StdRng::from_rng(&mut rand::rng());
    let now = Utc::now();
    let (session, effects) = match snapshot {
      Some(snapshot) => Session::resume(key.clone(), pool, snapshot, self.maps.as_ref(), options, rng, now)?,
      None => Session::start(key.clone(), pool, self.maps.as_ref(), options, rng, now)?,
    };
    let handle = SessionHandle::launch(session, effects, self.items.clone(), self.snapshots.clone())?;

    let displaced = {
      let mut sessions = self.lock();
      cleanup_expired(&mut sessions, now);
      sessions.insert(
        key.clone(),
        RegistryEntry {
          handle: handle.clone(),
          last_access: now,
        },
      )
    };
    if let Some(displaced) = displaced {
      tracing::warn!("Session {} was replaced while starting, stopping the old one", key);
      displaced.handle.stop();
      // The old session's final snapshot must not shadow the new one
      handle.hidden().log_warn("Failed to flush session snapshot");
    }
    Ok(handle)
  }

  /// The session registered under `key`, running or ended
  pub fn get(&self, key: &SessionKey) -> Result<SessionHandle, SessionError> {
    let mut sessions = self.lock();
    let entry = sessions
      .get_mut(key)
      .ok_or_else(|| SessionError::NotFound(key.to_string()))?;
    entry.last_access = Utc::now();
    Ok(entry.handle.clone())
  }

  /// Stop and forget the session under `key`. `None` if it had already ended.
  pub fn stop(&self, key: &SessionKey) -> Result<Option<SessionSummary>, SessionError> {
    let entry = self
      .lock()
      .remove(key)
      .ok_or_else(|| SessionError::NotFound(key.to_string()))?;
    Ok(entry.handle.stop())
  }

  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().is_empty()
  }
}

/// Drop sessions idle past the expiry window, flushing any still running
fn cleanup_expired(sessions: &mut HashMap<SessionKey, RegistryEntry>, now: DateTime<Utc>) {
  let expiry = now - Duration::hours(config::SESSION_EXPIRY_HOURS);
  sessions.retain(|key, entry| {
    if entry.last_access > expiry {
      return true;
    }
    tracing::debug!("Expiring idle session {}", key);
    entry.handle.stop();
    false
  });
}
