use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;

use geodrops::db::{self, ItemStore, SqliteStore};
use geodrops::domain::{Exercise, Item, Response};
use geodrops::geo::NoMaps;
use geodrops::handlers;
use geodrops::state::AppState;

struct TestApp {
  _temp: TempDir,
  store: SqliteStore,
  server: TestServer,
}

fn app(items: usize) -> TestApp {
  let temp = TempDir::new().unwrap();
  let pool = db::init_db(&temp.path().join("geodrops.db")).unwrap();
  let store = SqliteStore::new(pool);
  for i in 0..items {
    let item = Item::new(format!("it{:02}", i), "spain", "capitals")
      .with_prompt_text(format!("Capital {}", i))
      .with_answer_text(format!("Province {}", i));
    store.put_item(&item).unwrap();
  }
  let state = AppState::new(store.clone(), Arc::new(NoMaps));
  let server = TestServer::new(handlers::router(state)).unwrap();
  TestApp {
    _temp: temp,
    store,
    server,
  }
}

fn key() -> Value {
  json!({ "quiz_id": "spain", "topic_id": "capitals" })
}

async fn start(app: &TestApp, resume: bool) -> Value {
  let response = app
    .server
    .post("/session/start")
    .json(&json!({ "quiz_id": "spain", "topic_id": "capitals", "resume": resume }))
    .await;
  response.assert_status_ok();
  response.json()
}

async fn skip_preview(app: &TestApp, mut view: Value) -> Value {
  while !view["preview"].is_null() {
    let response = app.server.post("/session/preview/next").json(&key()).await;
    response.assert_status_ok();
    view = response.json();
  }
  view
}

/// The first round of a text-only batch is always a multiple choice
fn correct_choice(view: &Value) -> Response {
  let exercise: Exercise = serde_json::from_value(view["round"]["exercise"].clone()).unwrap();
  match exercise {
    Exercise::MultipleChoice { options, .. } => Response::Choice(options.iter().position(|o| o.is_correct).unwrap()),
    other => panic!("unexpected first round {:?}", other.kind()),
  }
}

#[tokio::test]
async fn test_start_without_items_is_not_found() {
  let app = app(0);
  let response = app
    .server
    .post("/session/start")
    .json(&json!({ "quiz_id": "spain", "topic_id": "capitals" }))
    .await;
  response.assert_status(StatusCode::NOT_FOUND);
  let body: Value = response.json();
  assert_eq!(body["error"], "nothing to study");
}

#[tokio::test]
async fn test_view_of_unknown_session_is_not_found() {
  let app = app(4);
  let response = app
    .server
    .get("/session")
    .add_query_param("quiz_id", "spain")
    .add_query_param("topic_id", "capitals")
    .await;
  response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_preview_then_answer_updates_stats_and_item() {
  let app = app(4);
  let view = start(&app, false).await;
  assert_eq!(view["preview"]["position"], 0);
  assert_eq!(view["batch_count"], 1);

  let view = skip_preview(&app, view).await;
  let target = view["round"]["exercise"]["item_id"].as_str().unwrap().to_string();
  let response = app
    .server
    .post("/session/answer")
    .json(&json!({
      "quiz_id": "spain",
      "topic_id": "capitals",
      "response": correct_choice(&view),
      "elapsed_ms": 900
    }))
    .await;
  response.assert_status_ok();
  let body: Value = response.json();
  assert_eq!(body["result"]["correct"], true);
  assert_eq!(body["session"]["stats"]["correct"], 1);
  assert_eq!(body["session"]["stats"]["new"], 1);

  let stored = app.store.get_item(&target).unwrap().unwrap();
  assert_eq!(stored.srs.repetitions, 1);
  assert_eq!(stored.srs.mastered_hits, 1);
}

#[tokio::test]
async fn test_stop_offers_resume_and_resume_skips_preview() {
  let app = app(6);
  let view = skip_preview(&app, start(&app, false).await).await;
  app
    .server
    .post("/session/answer")
    .json(&json!({ "quiz_id": "spain", "topic_id": "capitals", "response": correct_choice(&view) }))
    .await
    .assert_status_ok();

  let response = app.server.post("/session/stop").json(&key()).await;
  response.assert_status_ok();
  let body: Value = response.json();
  assert_eq!(body["summary"]["reason"], "stopped");
  assert_eq!(body["summary"]["total"], 1);

  let response = app
    .server
    .get("/session/resume")
    .add_query_param("quiz_id", "spain")
    .add_query_param("topic_id", "capitals")
    .await;
  let status: Value = response.json();
  assert_eq!(status["available"], true);

  let view = start(&app, true).await;
  assert!(view["preview"].is_null());
  assert!(!view["round"].is_null());
  assert_eq!(view["stats"]["correct"], 1);
}

#[tokio::test]
async fn test_answer_after_stop_is_rejected() {
  let app = app(4);
  skip_preview(&app, start(&app, false).await).await;
  let response = app.server.post("/session/stop").json(&key()).await;
  response.assert_status_ok();

  // The stopped session is no longer registered
  let response = app
    .server
    .post("/session/answer")
    .json(&json!({ "quiz_id": "spain", "topic_id": "capitals", "response": { "type": "timeout" } }))
    .await;
  response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_hidden_flushes_snapshot() {
  let app = app(4);
  start(&app, false).await;
  let response = app.server.post("/session/hidden").json(&key()).await;
  response.assert_status(StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_progress_and_due_routes() {
  let app = app(3);
  let response = app.server.get("/topics/capitals/progress").await;
  response.assert_status_ok();
  let body: Value = response.json();
  assert_eq!(body["mastered"], 0);
  assert_eq!(body["total"], 3);

  let response = app.server.get("/quizzes/spain/due").await;
  response.assert_status_ok();
  let body: Value = response.json();
  assert_eq!(body["count"], 0);
}
