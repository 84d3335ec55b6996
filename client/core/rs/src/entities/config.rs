use std::path::PathBuf;

use serde::Deserialize;

use crate::entities::logger::LogConfig;

/// Core configuration. Loaded from an optional TOML file with
/// environment overrides applied on top, see `Env`.
#[derive(Debug, Clone, Deserialize)]
pub struct CoreConfig {
  /// Display name used in startup logs.
  #[serde(default = "default_title")]
  pub title: String,

  /// Port the HTTP server binds. Default: 9120.
  #[serde(default = "default_port")]
  pub port: u16,

  /// IP the HTTP server binds. Default: `[::]` (all interfaces).
  #[serde(default = "default_bind_ip")]
  pub bind_ip: String,

  #[serde(default)]
  pub database: DatabaseConfig,

  /// Base address of the upstream REST API.
  /// Default: `https://api.github.com`.
  #[serde(default = "default_upstream_address")]
  pub upstream_address: String,

  /// Fallback upstream token used when a request carries no
  /// requestor identity hint. Empty runs anonymous (heavily
  /// rate limited upstream).
  #[serde(default)]
  pub upstream_token: String,

  /// Connect + read timeout for upstream fetches, in seconds.
  /// Default: 30.
  #[serde(default = "default_upstream_timeout_secs")]
  pub upstream_timeout_secs: u64,

  /// Run all queued jobs inline on the enqueuing task instead of
  /// spawning them. For tests and debugging.
  #[serde(default)]
  pub eager: bool,

  /// Origins allowed on the HTTP API. Empty allows all.
  #[serde(default)]
  pub cors_allowed_origins: Vec<String>,

  #[serde(default)]
  pub logging: LogConfig,
}

impl Default for CoreConfig {
  fn default() -> CoreConfig {
    CoreConfig {
      title: default_title(),
      port: default_port(),
      bind_ip: default_bind_ip(),
      database: Default::default(),
      upstream_address: default_upstream_address(),
      upstream_token: Default::default(),
      upstream_timeout_secs: default_upstream_timeout_secs(),
      eager: false,
      cors_allowed_origins: Default::default(),
      logging: Default::default(),
    }
  }
}

fn default_title() -> String {
  String::from("HubMirror")
}

fn default_port() -> u16 {
  9120
}

fn default_bind_ip() -> String {
  String::from("[::]")
}

fn default_upstream_address() -> String {
  String::from("https://api.github.com")
}

fn default_upstream_timeout_secs() -> u64 {
  30
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
  /// Full connection uri. Takes precedence over the component
  /// fields below when set.
  #[serde(default)]
  pub uri: String,
  /// Default: `localhost:27017`.
  #[serde(default = "default_database_address")]
  pub address: String,
  #[serde(default)]
  pub username: String,
  #[serde(default)]
  pub password: String,
  /// Default: `hubmirror_core`.
  #[serde(default = "default_database_app_name")]
  pub app_name: String,
  /// Default: `hubmirror`.
  #[serde(default = "default_database_db_name")]
  pub db_name: String,
}

impl Default for DatabaseConfig {
  fn default() -> DatabaseConfig {
    DatabaseConfig {
      uri: Default::default(),
      address: default_database_address(),
      username: Default::default(),
      password: Default::default(),
      app_name: default_database_app_name(),
      db_name: default_database_db_name(),
    }
  }
}

fn default_database_address() -> String {
  String::from("localhost:27017")
}

fn default_database_app_name() -> String {
  String::from("hubmirror_core")
}

fn default_database_db_name() -> String {
  String::from("hubmirror")
}

/// Environment overrides for [CoreConfig], parsed with `envy`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Env {
  /// Path to a TOML config file to load first.
  pub hubmirror_config_path: Option<PathBuf>,

  pub hubmirror_title: Option<String>,
  pub hubmirror_port: Option<u16>,
  pub hubmirror_bind_ip: Option<String>,

  pub hubmirror_database_uri: Option<String>,
  pub hubmirror_database_address: Option<String>,
  pub hubmirror_database_username: Option<String>,
  pub hubmirror_database_password: Option<String>,
  pub hubmirror_database_app_name: Option<String>,
  pub hubmirror_database_db_name: Option<String>,

  pub hubmirror_upstream_address: Option<String>,
  pub hubmirror_upstream_token: Option<String>,
  pub hubmirror_upstream_timeout_secs: Option<u64>,

  pub hubmirror_eager: Option<bool>,
  pub hubmirror_cors_allowed_origins: Option<Vec<String>>,

  pub hubmirror_logging_level:
    Option<crate::entities::logger::LogLevel>,
  pub hubmirror_logging_stdio:
    Option<crate::entities::logger::StdioLogMode>,
  pub hubmirror_logging_pretty: Option<bool>,
  pub hubmirror_logging_otlp_endpoint: Option<String>,
}
