//! Quiz, topic and item persistence

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Result, params};
use serde::Serialize;

use crate::config::MASTERY_THRESHOLD;
use crate::domain::{Item, Quiz, SrsState, Topic};

const ITEM_COLUMNS: &str = "id, quiz_id, topic_id, prompt_text, prompt_image, answer_text, answer_image, alt_answers, \
   tags, repetitions, interval_days, ease_factor, due_at, last_reviewed_at, mastered_hits";

/// Mastery of one topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicProgress {
  pub topic_id: String,
  pub mastered: u32,
  pub total: u32,
}

/// Timestamps are stored in one fixed format so they compare as text
pub(crate) fn timestamp(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .unwrap_or_else(|_| Utc::now())
}

pub fn upsert_quiz(conn: &Connection, quiz: &Quiz) -> Result<()> {
  conn.execute(
    r#"
    INSERT INTO quizzes (id, title, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)
    ON CONFLICT(id) DO UPDATE SET title = excluded.title, updated_at = excluded.updated_at
    "#,
    params![quiz.id, quiz.title, timestamp(quiz.created_at), timestamp(quiz.updated_at)],
  )?;
  Ok(())
}

pub fn upsert_topic(conn: &Connection, topic: &Topic) -> Result<()> {
  conn.execute(
    r#"
    INSERT INTO topics (id, quiz_id, title, sort_order) VALUES (?1, ?2, ?3, ?4)
    ON CONFLICT(id) DO UPDATE SET quiz_id = excluded.quiz_id, title = excluded.title, sort_order = excluded.sort_order
    "#,
    params![topic.id, topic.quiz_id, topic.title, topic.order],
  )?;
  Ok(())
}

/// Insert or replace an item. Last write wins.
pub fn put_item(conn: &Connection, item: &Item, now: DateTime<Utc>) -> Result<()> {
  let alt_answers = serde_json::to_string(&item.alt_answers).unwrap_or_else(|_| "[]".to_string());
  let tags = serde_json::to_string(&item.tags).unwrap_or_else(|_| "{}".to_string());
  conn.execute(
    r#"
    INSERT OR REPLACE INTO items (id, quiz_id, topic_id, prompt_text, prompt_image, answer_text, answer_image,
                                  alt_answers, tags, repetitions, interval_days, ease_factor, due_at,
                                  last_reviewed_at, mastered_hits, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
    "#,
    params![
      item.id,
      item.quiz_id,
      item.topic_id,
      item.prompt_text,
      item.prompt_image,
      item.answer_text,
      item.answer_image,
      alt_answers,
      tags,
      item.srs.repetitions,
      item.srs.interval_days,
      item.srs.ease_factor,
      timestamp(item.srs.due_at),
      item.srs.last_reviewed_at.map(timestamp),
      item.srs.mastered_hits,
      timestamp(now),
    ],
  )?;
  Ok(())
}

pub fn get_item(conn: &Connection, id: &str) -> Result<Option<Item>> {
  conn
    .query_row(
      &format!("SELECT {} FROM items WHERE id = ?1", ITEM_COLUMNS),
      params![id],
      row_to_item,
    )
    .optional()
}

pub fn delete_item(conn: &Connection, id: &str) -> Result<bool> {
  let deleted = conn.execute("DELETE FROM items WHERE id = ?1", params![id])?;
  Ok(deleted > 0)
}

pub fn list_items_by_topic(conn: &Connection, topic_id: &str) -> Result<Vec<Item>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {} FROM items WHERE topic_id = ?1 ORDER BY id",
    ITEM_COLUMNS
  ))?;
  let items = stmt.query_map(params![topic_id], row_to_item)?.collect::<Result<Vec<_>>>()?;
  Ok(items)
}

pub fn list_items_by_quiz(conn: &Connection, quiz_id: &str) -> Result<Vec<Item>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {} FROM items WHERE quiz_id = ?1 ORDER BY topic_id, id",
    ITEM_COLUMNS
  ))?;
  let items = stmt.query_map(params![quiz_id], row_to_item)?.collect::<Result<Vec<_>>>()?;
  Ok(items)
}

/// Reviewed items of a quiz whose due date has passed, most overdue first
pub fn list_due_items(conn: &Connection, quiz_id: &str, now: DateTime<Utc>) -> Result<Vec<Item>> {
  let mut stmt = conn.prepare(&format!(
    r#"
    SELECT {} FROM items
    WHERE quiz_id = ?1 AND repetitions > 0 AND due_at <= ?2
    ORDER BY due_at ASC
    "#,
    ITEM_COLUMNS
  ))?;
  let items = stmt.query_map(params![quiz_id, timestamp(now)], row_to_item)?.collect::<Result<Vec<_>>>()?;
  Ok(items)
}

pub fn topic_progress(conn: &Connection, topic_id: &str) -> Result<TopicProgress> {
  let (mastered, total): (u32, u32) = conn.query_row(
    r#"
    SELECT COALESCE(SUM(CASE WHEN mastered_hits >= ?2 THEN 1 ELSE 0 END), 0), COUNT(*)
    FROM items WHERE topic_id = ?1
    "#,
    params![topic_id, MASTERY_THRESHOLD],
    |row| Ok((row.get(0)?, row.get(1)?)),
  )?;
  Ok(TopicProgress {
    topic_id: topic_id.to_string(),
    mastered,
    total,
  })
}

pub(crate) fn row_to_item(row: &rusqlite::Row) -> Result<Item> {
  let alt_answers: String = row.get(7)?;
  let tags: String = row.get(8)?;
  let due_at: String = row.get(12)?;
  let last_reviewed_at: Option<String> = row.get(13)?;

  Ok(Item {
    id: row.get(0)?,
    quiz_id: row.get(1)?,
    topic_id: row.get(2)?,
    prompt_text: row.get(3)?,
    prompt_image: row.get(4)?,
    answer_text: row.get(5)?,
    answer_image: row.get(6)?,
    alt_answers: serde_json::from_str(&alt_answers).unwrap_or_default(),
    tags: serde_json::from_str(&tags).unwrap_or_default(),
    srs: SrsState {
      repetitions: row.get(9)?,
      interval_days: row.get(10)?,
      ease_factor: row.get(11)?,
      due_at: parse_timestamp(&due_at),
      last_reviewed_at: last_reviewed_at.as_deref().map(parse_timestamp),
      mastered_hits: row.get(14)?,
    },
  })
}
