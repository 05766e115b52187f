//! Practice session routes.
//!
//! Thin JSON adapter over [`SessionRegistry`](crate::session::SessionRegistry);
//! every request names its session by `quiz_id` and optional `topic_id`.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::{Response, RoundResult};
use crate::error::SessionError;
use crate::session::{SessionKey, SessionOptions, SessionSummary, SessionView};
use crate::state::AppState;

/// Session key as sent by the client. An empty topic means the whole quiz.
#[derive(Debug, Deserialize)]
pub struct KeyParams {
  pub quiz_id: String,
  #[serde(default)]
  pub topic_id: Option<String>,
}

impl KeyParams {
  fn key(&self) -> SessionKey {
    match self.topic_id.as_deref().filter(|t| !t.is_empty()) {
      Some(topic_id) => SessionKey::topic(&self.quiz_id, topic_id),
      None => SessionKey::quiz(&self.quiz_id),
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct StartRequest {
  #[serde(flatten)]
  pub key: KeyParams,
  /// Continue from the saved snapshot; `false` discards it
  #[serde(default)]
  pub resume: bool,
  /// Session length in minutes; absent for an untimed session
  #[serde(default)]
  pub minutes: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
  #[serde(flatten)]
  pub key: KeyParams,
  pub response: Response,
  /// Client-measured answer time
  #[serde(default)]
  pub elapsed_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ResumeStatus {
  pub available: bool,
}

#[derive(Debug, Serialize)]
pub struct AnswerResponse {
  /// Absent when no round was waiting for an answer
  pub result: Option<RoundResult>,
  pub session: SessionView,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
  pub summary: Option<SessionSummary>,
}

/// GET /session/resume
pub async fn resume_status(State(state): State<AppState>, Query(params): Query<KeyParams>) -> Json<ResumeStatus> {
  Json(ResumeStatus {
    available: state.registry.resume_available(&params.key()),
  })
}

/// POST /session/start
pub async fn start_session(
  State(state): State<AppState>,
  Json(request): Json<StartRequest>,
) -> Result<Json<SessionView>, SessionError> {
  let options = SessionOptions {
    minutes: request.minutes,
  };
  let handle = state.registry.start(request.key.key(), request.resume, options)?;
  Ok(Json(handle.view()?))
}

/// GET /session
pub async fn session_view(
  State(state): State<AppState>,
  Query(params): Query<KeyParams>,
) -> Result<Json<SessionView>, SessionError> {
  let handle = state.registry.get(&params.key())?;
  Ok(Json(handle.view()?))
}

/// POST /session/preview/next
pub async fn acknowledge_preview(
  State(state): State<AppState>,
  Json(params): Json<KeyParams>,
) -> Result<Json<SessionView>, SessionError> {
  let handle = state.registry.get(&params.key())?;
  Ok(Json(handle.acknowledge_preview()?))
}

/// POST /session/answer
pub async fn submit_answer(
  State(state): State<AppState>,
  Json(request): Json<AnswerRequest>,
) -> Result<Json<AnswerResponse>, SessionError> {
  let handle = state.registry.get(&request.key.key())?;
  let elapsed = request.elapsed_ms.map(Duration::from_millis);
  let result = handle.submit(request.response, elapsed)?;
  Ok(Json(AnswerResponse {
    result,
    session: handle.view()?,
  }))
}

/// POST /session/hidden
pub async fn hidden(State(state): State<AppState>, Json(params): Json<KeyParams>) -> Result<StatusCode, SessionError> {
  state.registry.get(&params.key())?.hidden()?;
  Ok(StatusCode::NO_CONTENT)
}

/// POST /session/stop
pub async fn stop_session(
  State(state): State<AppState>,
  Json(params): Json<KeyParams>,
) -> Result<Json<StopResponse>, SessionError> {
  let summary = state.registry.stop(&params.key())?;
  Ok(Json(StopResponse { summary }))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_topic_means_whole_quiz() {
    let params: KeyParams = serde_json::from_str(r#"{"quiz_id":"spain","topic_id":""}"#).unwrap();
    assert_eq!(params.key(), SessionKey::quiz("spain"));
    let params: KeyParams = serde_json::from_str(r#"{"quiz_id":"spain","topic_id":"capitals"}"#).unwrap();
    assert_eq!(params.key(), SessionKey::topic("spain", "capitals"));
  }

  #[test]
  fn test_answer_request_shape() {
    let request: AnswerRequest = serde_json::from_str(
      r#"{"quiz_id":"spain","response":{"type":"choice","value":2},"elapsed_ms":1200}"#,
    )
    .unwrap();
    assert_eq!(request.response, Response::Choice(2));
    assert_eq!(request.elapsed_ms, Some(1200));
    assert_eq!(request.key.key(), SessionKey::quiz("spain"));
  }
}
