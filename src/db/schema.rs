use rusqlite::{Connection, Result};

pub fn run_migrations(conn: &Connection) -> Result<()> {
  conn.execute_batch(
    r#"
    CREATE TABLE IF NOT EXISTS quizzes (
      id TEXT PRIMARY KEY,
      title TEXT NOT NULL,
      created_at TEXT NOT NULL,
      updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS topics (
      id TEXT PRIMARY KEY,
      quiz_id TEXT NOT NULL,
      title TEXT NOT NULL,
      sort_order INTEGER NOT NULL DEFAULT 0,
      FOREIGN KEY (quiz_id) REFERENCES quizzes(id)
    );

    CREATE TABLE IF NOT EXISTS items (
      id TEXT PRIMARY KEY,
      quiz_id TEXT NOT NULL,
      topic_id TEXT NOT NULL,
      prompt_text TEXT,
      prompt_image TEXT,
      answer_text TEXT,
      answer_image TEXT,
      -- JSON array / object
      alt_answers TEXT NOT NULL DEFAULT '[]',
      tags TEXT NOT NULL DEFAULT '{}',
      repetitions INTEGER NOT NULL DEFAULT 0,
      interval_days INTEGER NOT NULL DEFAULT 0,
      ease_factor REAL NOT NULL DEFAULT 2.5,
      due_at TEXT NOT NULL,
      last_reviewed_at TEXT,
      mastered_hits INTEGER NOT NULL DEFAULT 0,
      updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS session_snapshots (
      key TEXT PRIMARY KEY,
      quiz_id TEXT NOT NULL,
      topic_id TEXT NOT NULL DEFAULT '',
      data TEXT NOT NULL,
      saved_at TEXT NOT NULL
    );

    -- Indexes
    CREATE INDEX IF NOT EXISTS idx_topics_quiz_id ON topics(quiz_id);
    CREATE INDEX IF NOT EXISTS idx_items_topic_id ON items(topic_id);
    CREATE INDEX IF NOT EXISTS idx_items_quiz_id ON items(quiz_id);
    CREATE INDEX IF NOT EXISTS idx_items_due_at ON items(quiz_id, due_at);
    "#,
  )?;

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_migrations_are_idempotent() {
    let conn = Connection::open_in_memory().unwrap();
    run_migrations(&conn).unwrap();
    run_migrations(&conn).unwrap();
    let tables: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('quizzes', 'topics', 'items', 'session_snapshots')",
        [],
        |row| row.get(0),
      )
      .unwrap();
    assert_eq!(tables, 4);
  }
}
