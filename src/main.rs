use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use geodrops::config::AppConfig;
use geodrops::db::{self, SqliteStore};
use geodrops::geo::GeoJsonMaps;
use geodrops::handlers;
use geodrops::state::AppState;

#[tokio::main]
async fn main() {
  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "geodrops=debug,tower_http=debug".into()),
    )
    .with(tracing_subscriber::fmt::layer())
    .init();

  let config = AppConfig::load();

  let pool = db::init_db(&config.database_path).expect("Failed to initialize database");
  let maps = Arc::new(GeoJsonMaps::new(&config.geojson_dir));
  let state = AppState::new(SqliteStore::new(pool), maps);

  let app = handlers::router(state).layer(TraceLayer::new_for_http());

  let bind_addr = config.bind_addr();
  let listener = tokio::net::TcpListener::bind(&bind_addr)
    .await
    .unwrap_or_else(|_| panic!("Failed to bind to {}", bind_addr));

  tracing::info!("Server running on http://localhost:{}", config.server_port);

  axum::serve(listener, app)
    .await
    .expect("Server failed to start");
}
