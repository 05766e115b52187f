//! Session snapshot rows, one per (quiz, topic) key

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Result, params};

use super::items::timestamp;

pub fn save_snapshot(
  conn: &Connection,
  key: &str,
  quiz_id: &str,
  topic_id: &str,
  data: &str,
  saved_at: DateTime<Utc>,
) -> Result<()> {
  conn.execute(
    r#"
    INSERT INTO session_snapshots (key, quiz_id, topic_id, data, saved_at) VALUES (?1, ?2, ?3, ?4, ?5)
    ON CONFLICT(key) DO UPDATE SET data = excluded.data, saved_at = excluded.saved_at
    "#,
    params![key, quiz_id, topic_id, data, timestamp(saved_at)],
  )?;
  Ok(())
}

pub fn load_snapshot(conn: &Connection, key: &str) -> Result<Option<String>> {
  conn
    .query_row(
      "SELECT data FROM session_snapshots WHERE key = ?1",
      params![key],
      |row| row.get(0),
    )
    .optional()
}

pub fn delete_snapshot(conn: &Connection, key: &str) -> Result<bool> {
  let deleted = conn.execute("DELETE FROM session_snapshots WHERE key = ?1", params![key])?;
  Ok(deleted > 0)
}
