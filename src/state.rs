//! Application state passed to all handlers.

use std::sync::Arc;

use crate::db::{ItemStore, SqliteStore};
use crate::geo::MapProvider;
use crate::session::SessionRegistry;

#[derive(Clone)]
pub struct AppState {
  /// Live practice sessions
  pub registry: Arc<SessionRegistry>,
  /// Item store for the read-only progress routes
  pub items: Arc<dyn ItemStore>,
}

impl AppState {
  pub fn new(store: SqliteStore, maps: Arc<dyn MapProvider>) -> Self {
    let store = Arc::new(store);
    Self {
      registry: Arc::new(SessionRegistry::new(store.clone(), store.clone(), maps)),
      items: store,
    }
  }
}
