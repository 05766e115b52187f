use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::db::DbLockError;

/// Item or snapshot store failure. The session never retries these.
#[derive(Error, Debug)]
pub enum StoreError {
  #[error("store unavailable: {0}")]
  Unavailable(String),
  #[error("database error: {0}")]
  Sqlite(#[from] rusqlite::Error),
  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl From<DbLockError> for StoreError {
  fn from(e: DbLockError) -> Self {
    Self::Unavailable(e.to_string())
  }
}

/// Why a persisted snapshot was ignored
#[derive(Error, Debug)]
pub enum SnapshotError {
  #[error("malformed snapshot: {0}")]
  Parse(#[from] serde_json::Error),
  #[error("snapshot version {found}, expected {expected}")]
  Version { found: u32, expected: u32 },
}

#[derive(Error, Debug)]
pub enum SessionError {
  #[error("nothing to study")]
  PoolEmpty,
  #[error(transparent)]
  Storage(#[from] StoreError),
  #[error("session is no longer running")]
  Stopped,
  #[error("no session for {0}")]
  NotFound(String),
}

impl IntoResponse for SessionError {
  fn into_response(self) -> Response {
    let status = match &self {
      Self::PoolEmpty | Self::NotFound(_) => StatusCode::NOT_FOUND,
      Self::Storage(e) => {
        tracing::warn!("Session storage failure: {}", e);
        StatusCode::SERVICE_UNAVAILABLE
      }
      Self::Stopped => StatusCode::CONFLICT,
    };
    (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
  }
}
