pub mod progress;
pub mod session;

use axum::Router;
use axum::routing::{get, post};

use crate::state::AppState;

pub use progress::{due_items, topic_progress};
pub use session::{
  acknowledge_preview, hidden, resume_status, session_view, start_session, stop_session, submit_answer,
};

/// Every JSON route of the app
pub fn router(state: AppState) -> Router {
  Router::new()
    .route("/session", get(session_view))
    .route("/session/resume", get(resume_status))
    .route("/session/start", post(start_session))
    .route("/session/preview/next", post(acknowledge_preview))
    .route("/session/answer", post(submit_answer))
    .route("/session/hidden", post(hidden))
    .route("/session/stop", post(stop_session))
    .route("/topics/{id}/progress", get(topic_progress))
    .route("/quizzes/{id}/due", get(due_items))
    .with_state(state)
}
