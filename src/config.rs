//! Application configuration.
//!
//! Runtime settings (database path, bind address, GeoJSON directory) are loaded
//! with priority `config.toml` > environment (`.env`) > defaults. Practice
//! session tunables are plain constants.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

// ==================== File Configuration ====================

/// Configuration file structure for config.toml
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
  database: Option<DatabaseSection>,
  server: Option<ServerSection>,
  maps: Option<MapsSection>,
}

#[derive(Debug, Deserialize)]
struct DatabaseSection {
  path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServerSection {
  addr: Option<String>,
  port: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct MapsSection {
  geojson_dir: Option<String>,
}

/// Resolved runtime configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
  pub database_path: PathBuf,
  pub server_addr: String,
  pub server_port: u16,
  pub geojson_dir: PathBuf,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
      server_addr: SERVER_ADDR.to_string(),
      server_port: SERVER_PORT,
      geojson_dir: PathBuf::from(DEFAULT_GEOJSON_DIR),
    }
  }
}

impl AppConfig {
  /// Load configuration with priority: config.toml > .env > default
  pub fn load() -> Self {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let file = match std::fs::read_to_string("config.toml") {
      Ok(contents) => match toml::from_str::<FileConfig>(&contents) {
        Ok(config) => config,
        Err(e) => {
          tracing::warn!("Ignoring malformed config.toml: {}", e);
          FileConfig::default()
        }
      },
      Err(_) => FileConfig::default(),
    };

    Self::resolve(file, |key| std::env::var(key).ok())
  }

  fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Self {
    let mut config = Self::default();

    if let Some(path) = file.database.and_then(|d| d.path) {
      tracing::info!("Using database from config.toml: {}", path);
      config.database_path = PathBuf::from(path);
    } else if let Some(path) = env("DATABASE_PATH") {
      tracing::info!("Using database from DATABASE_PATH env: {}", path);
      config.database_path = PathBuf::from(path);
    }

    let server = file.server;
    if let Some(addr) = server.as_ref().and_then(|s| s.addr.clone()).or_else(|| env("SERVER_ADDR")) {
      config.server_addr = addr;
    }
    if let Some(port) = server
      .as_ref()
      .and_then(|s| s.port)
      .or_else(|| env("SERVER_PORT").and_then(|p| p.parse().ok()))
    {
      config.server_port = port;
    }

    if let Some(dir) = file.maps.and_then(|m| m.geojson_dir).or_else(|| env("GEOJSON_DIR")) {
      config.geojson_dir = PathBuf::from(dir);
    }

    config
  }

  /// Get the full server bind address
  pub fn bind_addr(&self) -> String {
    format!("{}:{}", self.server_addr, self.server_port)
  }
}

// ==================== Defaults ====================

pub const DEFAULT_DATABASE_PATH: &str = "data/geodrops.db";

/// Server address to bind to
pub const SERVER_ADDR: &str = "0.0.0.0";

/// Server port
pub const SERVER_PORT: u16 = 3000;

pub const DEFAULT_GEOJSON_DIR: &str = "static/geojson";

// ==================== Scheduling ====================

/// Consecutive correct answers after which an item leaves active study
pub const MASTERY_THRESHOLD: u32 = 10;

pub const MIN_EASE_FACTOR: f64 = 1.3;
pub const MAX_EASE_FACTOR: f64 = 2.8;
pub const DEFAULT_EASE_FACTOR: f64 = 2.5;

// ==================== Practice Sessions ====================

/// Items per batch
pub const BATCH_SIZE: usize = 4;

/// Number of most recent item ids avoided as the next target
pub const RECENT_WINDOW: usize = 3;

/// In-session streak at which every item counts as drilled and the session ends
pub const SESSION_STREAK_GOAL: u32 = 10;

/// Random sampling attempts before a generator gives up
pub const GENERATION_ATTEMPTS: usize = 30;

/// True/false draws an extra coin per attempt, so it gets a larger budget
pub const TRUE_FALSE_ATTEMPTS: usize = 40;

/// Options shown in a multiple choice round (correct answer included)
pub const MCQ_OPTION_COUNT: usize = 4;

/// Map rounds need a full set of options
pub const MAP_OPTION_COUNT: usize = 4;

/// Items in a matching round
pub const MATCH_PAIR_COUNT: usize = 4;

/// Answer window for speed rounds
pub const SPEED_WINDOW: Duration = Duration::from_millis(3500);

/// Periodic snapshot interval
pub const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(5);

/// Allowed session lengths in minutes
pub const SESSION_MINUTES_CHOICES: [u32; 3] = [2, 5, 10];

pub const DEFAULT_SESSION_MINUTES: u32 = 5;

/// Clamp a requested session length to one of the allowed choices
pub fn session_minutes(requested: u32) -> u32 {
  if SESSION_MINUTES_CHOICES.contains(&requested) {
    requested
  } else {
    DEFAULT_SESSION_MINUTES
  }
}

// ==================== Session Registry ====================

/// Idle registry entries are dropped after this many hours
pub const SESSION_EXPIRY_HOURS: i64 = 1;
