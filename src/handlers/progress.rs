//! Read-only study progress routes

use axum::Json;
use axum::extract::{Path, State};
use chrono::Utc;
use serde::Serialize;

use crate::db::TopicProgress;
use crate::domain::Item;
use crate::error::SessionError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct DueItems {
  pub quiz_id: String,
  pub count: usize,
  pub items: Vec<Item>,
}

/// GET /topics/{id}/progress
pub async fn topic_progress(
  State(state): State<AppState>,
  Path(topic_id): Path<String>,
) -> Result<Json<TopicProgress>, SessionError> {
  Ok(Json(state.items.topic_progress(&topic_id)?))
}

/// GET /quizzes/{id}/due
pub async fn due_items(State(state): State<AppState>, Path(quiz_id): Path<String>) -> Result<Json<DueItems>, SessionError> {
  let items = state.items.list_due_items(&quiz_id, Utc::now())?;
  Ok(Json(DueItems {
    quiz_id,
    count: items.len(),
    items,
  }))
}
