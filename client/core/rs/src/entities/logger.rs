use serde::{Deserialize, Serialize};
use strum::Display;
use typeshare::typeshare;

#[typeshare]
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogLevel {
  Trace,
  Debug,
  #[default]
  Info,
  Warn,
  Error,
}

impl From<LogLevel> for tracing::Level {
  fn from(value: LogLevel) -> Self {
    match value {
      LogLevel::Trace => tracing::Level::TRACE,
      LogLevel::Debug => tracing::Level::DEBUG,
      LogLevel::Info => tracing::Level::INFO,
      LogLevel::Warn => tracing::Level::WARN,
      LogLevel::Error => tracing::Level::ERROR,
    }
  }
}

#[typeshare]
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StdioLogMode {
  #[default]
  Standard,
  Json,
  None,
}

#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
  /// Minimum level emitted. Default: `info`.
  #[serde(default)]
  pub level: LogLevel,

  /// Log to stdio in this format. Default: `standard`.
  #[serde(default)]
  pub stdio: StdioLogMode,

  /// Use the pretty (multi-line) stdio formatter.
  #[serde(default)]
  pub pretty: bool,

  /// Include the emitting module in stdio logs.
  #[serde(default)]
  pub location: bool,

  /// Color stdio logs.
  #[serde(default = "default_ansi")]
  pub ansi: bool,

  /// Also ship traces to an OTLP collector at this endpoint.
  /// Empty disables the exporter.
  #[serde(default)]
  pub otlp_endpoint: String,

  #[serde(default = "default_otel_service_name")]
  pub opentelemetry_service_name: String,

  #[serde(default = "default_otel_scope_name")]
  pub opentelemetry_scope_name: String,
}

impl Default for LogConfig {
  fn default() -> LogConfig {
    LogConfig {
      level: Default::default(),
      stdio: Default::default(),
      pretty: false,
      location: false,
      ansi: default_ansi(),
      otlp_endpoint: Default::default(),
      opentelemetry_service_name: default_otel_service_name(),
      opentelemetry_scope_name: default_otel_scope_name(),
    }
  }
}

fn default_ansi() -> bool {
  true
}

fn default_otel_service_name() -> String {
  String::from("HubMirror")
}

fn default_otel_scope_name() -> String {
  String::from("hubmirror.core")
}
