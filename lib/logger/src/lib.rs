use anyhow::Context;
use hubmirror_client::entities::logger::{LogConfig, StdioLogMode};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
  Layer, layer::SubscriberExt, util::SubscriberInitExt,
};

mod otel;

pub fn init(config: &LogConfig) -> anyhow::Result<()> {
  let log_level: tracing::Level = config.level.into();

  let registry = tracing_subscriber::registry()
    .with(LevelFilter::from(log_level));

  let stdio = match (config.stdio, config.pretty) {
    (StdioLogMode::Standard, true) => Some(
      tracing_subscriber::fmt::layer()
        .pretty()
        .with_file(false)
        .with_line_number(false)
        .with_target(config.location)
        .with_ansi(config.ansi)
        .boxed(),
    ),
    (StdioLogMode::Standard, false) => Some(
      tracing_subscriber::fmt::layer()
        .with_file(false)
        .with_line_number(false)
        .with_target(config.location)
        .with_ansi(config.ansi)
        .boxed(),
    ),
    (StdioLogMode::Json, _) => {
      Some(tracing_subscriber::fmt::layer().json().boxed())
    }
    (StdioLogMode::None, _) => None,
  };

  let otel = if config.otlp_endpoint.is_empty() {
    None
  } else {
    Some(otel::layer(config)?)
  };

  registry
    .with(stdio)
    .with(otel)
    .try_init()
    .context("failed to init logger")
}
