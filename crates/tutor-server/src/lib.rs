//! HTTP server wiring for the tutoring student model: configuration, store
//! opening and the traced application router.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use axum::Router;
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tutor_core::{context::ContextLimits, memory::MemoryPolicy, store::TutorStore};
use tutor_store_sqlite::SqliteStore;

// ─── Configuration ────────────────────────────────────────────────────────────

fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 8080 }
fn default_store_path() -> PathBuf { PathBuf::from("tutor.sqlite") }

/// Runtime server configuration, deserialised from `config.toml` layered
/// with `TUTOR_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:       String,
  #[serde(default = "default_port")]
  pub port:       u16,
  #[serde(default = "default_store_path")]
  pub store_path: PathBuf,
  #[serde(default)]
  pub context:    ContextLimits,
  #[serde(default)]
  pub memory:     MemoryPolicyConfig,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:       default_host(),
      port:       default_port(),
      store_path: default_store_path(),
      context:    ContextLimits::default(),
      memory:     MemoryPolicyConfig::default(),
    }
  }
}

fn default_game_state_days() -> i64 { 7 }
fn default_strategy_log_days() -> i64 { 365 }

/// Default memory lifetimes per scope, in days. Personal facts never expire.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct MemoryPolicyConfig {
  #[serde(default = "default_game_state_days")]
  pub game_state_ttl_days:   i64,
  #[serde(default = "default_strategy_log_days")]
  pub strategy_log_ttl_days: i64,
}

impl Default for MemoryPolicyConfig {
  fn default() -> Self {
    Self {
      game_state_ttl_days:   default_game_state_days(),
      strategy_log_ttl_days: default_strategy_log_days(),
    }
  }
}

impl MemoryPolicyConfig {
  /// Fails when either lifetime is not a positive number of days within
  /// [`tutor_core::memory::MAX_TTL_DAYS`].
  pub fn policy(&self) -> tutor_core::Result<MemoryPolicy> {
    MemoryPolicy::from_days(self.game_state_ttl_days, self.strategy_log_ttl_days)
  }
}

impl ServerConfig {
  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

// ─── Store and router ─────────────────────────────────────────────────────────

/// Open the configured store with the configured memory policy.
pub async fn open_store(config: &ServerConfig) -> tutor_store_sqlite::Result<SqliteStore> {
  let policy = config.memory.policy()?;
  let store = SqliteStore::open(expand_tilde(&config.store_path)).await?;
  Ok(store.with_memory_policy(policy))
}

/// The API router with request tracing.
pub fn app<S>(store: Arc<S>, config: &ServerConfig) -> Router
where
  S: TutorStore + 'static,
{
  tutor_api::api_router(store, config.context).layer(TraceLayer::new_for_http())
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
