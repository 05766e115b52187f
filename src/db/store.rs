//! Store interfaces the session layer depends on, and their SQLite backing.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use super::items::{self, TopicProgress};
use super::{DbPool, snapshots, try_lock};
use crate::domain::{Item, Quiz, Topic};
use crate::error::StoreError;
use crate::session::SessionKey;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Fired after every item write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum StoreChange {
  ItemPut {
    item_id: String,
    quiz_id: String,
    topic_id: String,
  },
  ItemDeleted {
    item_id: String,
  },
}

pub trait ItemStore: Send + Sync {
  fn list_items_by_topic(&self, topic_id: &str) -> Result<Vec<Item>, StoreError>;
  fn list_items_by_quiz(&self, quiz_id: &str) -> Result<Vec<Item>, StoreError>;
  fn get_item(&self, id: &str) -> Result<Option<Item>, StoreError>;
  /// Upsert; notifies subscribers
  fn put_item(&self, item: &Item) -> Result<(), StoreError>;
  fn delete_item(&self, id: &str) -> Result<bool, StoreError>;
  fn list_due_items(&self, quiz_id: &str, now: DateTime<Utc>) -> Result<Vec<Item>, StoreError>;
  fn topic_progress(&self, topic_id: &str) -> Result<TopicProgress, StoreError>;
  fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

/// Raw snapshot JSON keyed by session
pub trait SnapshotStore: Send + Sync {
  fn load_snapshot(&self, key: &SessionKey) -> Result<Option<String>, StoreError>;
  fn save_snapshot(&self, key: &SessionKey, data: &str, saved_at: DateTime<Utc>) -> Result<(), StoreError>;
  fn delete_snapshot(&self, key: &SessionKey) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct SqliteStore {
  pool: DbPool,
  changes: broadcast::Sender<StoreChange>,
}

impl SqliteStore {
  pub fn new(pool: DbPool) -> Self {
    let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
    Self { pool, changes }
  }

  pub fn pool(&self) -> &DbPool {
    &self.pool
  }

  pub fn upsert_quiz(&self, quiz: &Quiz) -> Result<(), StoreError> {
    let conn = try_lock(&self.pool)?;
    items::upsert_quiz(&conn, quiz)?;
    Ok(())
  }

  pub fn upsert_topic(&self, topic: &Topic) -> Result<(), StoreError> {
    let conn = try_lock(&self.pool)?;
    items::upsert_topic(&conn, topic)?;
    Ok(())
  }

  fn notify(&self, change: StoreChange) {
    // No receivers is fine
    let _ = self.changes.send(change);
  }
}

impl ItemStore for SqliteStore {
  fn list_items_by_topic(&self, topic_id: &str) -> Result<Vec<Item>, StoreError> {
    let conn = try_lock(&self.pool)?;
    Ok(items::list_items_by_topic(&conn, topic_id)?)
  }

  fn list_items_by_quiz(&self, quiz_id: &str) -> Result<Vec<Item>, StoreError> {
    let conn = try_lock(&self.pool)?;
    Ok(items::list_items_by_quiz(&conn, quiz_id)?)
  }

  fn get_item(&self, id: &str) -> Result<Option<Item>, StoreError> {
    let conn = try_lock(&self.pool)?;
    Ok(items::get_item(&conn, id)?)
  }

  fn put_item(&self, item: &Item) -> Result<(), StoreError> {
    {
      let conn = try_lock(&self.pool)?;
      items::put_item(&conn, item, Utc::now())?;
    }
    self.notify(StoreChange::ItemPut {
      item_id: item.id.clone(),
      quiz_id: item.quiz_id.clone(),
      topic_id: item.topic_id.clone(),
    });
    Ok(())
  }

  fn delete_item(&self, id: &str) -> Result<bool, StoreError> {
    let deleted = {
      let conn = try_lock(&self.pool)?;
      items::delete_item(&conn, id)?
    };
    if deleted {
      self.notify(StoreChange::ItemDeleted { item_id: id.to_string() });
    }
    Ok(deleted)
  }

  fn list_due_items(&self, quiz_id: &str, now: DateTime<Utc>) -> Result<Vec<Item>, StoreError> {
    let conn = try_lock(&self.pool)?;
    Ok(items::list_due_items(&conn, quiz_id, now)?)
  }

  fn topic_progress(&self, topic_id: &str) -> Result<TopicProgress, StoreError> {
    let conn = try_lock(&self.pool)?;
    Ok(items::topic_progress(&conn, topic_id)?)
  }

  fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
    self.changes.subscribe()
  }
}

impl SnapshotStore for SqliteStore {
  fn load_snapshot(&self, key: &SessionKey) -> Result<Option<String>, StoreError> {
    let conn = try_lock(&self.pool)?;
    Ok(snapshots::load_snapshot(&conn, &key.storage_key())?)
  }

  fn save_snapshot(&self, key: &SessionKey, data: &str, saved_at: DateTime<Utc>) -> Result<(), StoreError> {
    let conn = try_lock(&self.pool)?;
    snapshots::save_snapshot(
      &conn,
      &key.storage_key(),
      &key.quiz_id,
      key.topic_id.as_deref().unwrap_or(""),
      data,
      saved_at,
    )?;
    Ok(())
  }

  fn delete_snapshot(&self, key: &SessionKey) -> Result<(), StoreError> {
    let conn = try_lock(&self.pool)?;
    snapshots::delete_snapshot(&conn, &key.storage_key())?;
    Ok(())
  }
}
