use std::sync::OnceLock;

use axum::http::HeaderValue;
use colored::Colorize;
use hubmirror_client::entities::config::{CoreConfig, Env};
use tower_http::cors::CorsLayer;

pub fn core_config() -> &'static CoreConfig {
  static CORE_CONFIG: OnceLock<CoreConfig> = OnceLock::new();
  CORE_CONFIG.get_or_init(|| {
    let env: Env = match envy::from_env() {
      Ok(env) => env,
      Err(e) => {
        panic!("Failed to parse HubMirror Core environment | {e:?}");
      }
    };

    let config = match &env.hubmirror_config_path {
      Some(path) => {
        println!(
          "{}: {}: {path:?}",
          "INFO".green(),
          "Config File".dimmed(),
        );
        let contents = std::fs::read_to_string(path)
          .unwrap_or_else(|e| {
            panic!("Failed to read config file at {path:?} | {e:?}")
          });
        toml::from_str::<CoreConfig>(&contents).unwrap_or_else(
          |e| {
            panic!("Failed to parse config file at {path:?} | {e:?}")
          },
        )
      }
      None => {
        println!(
          "{}: No config path set, using default config",
          "INFO".green(),
        );
        CoreConfig::default()
      }
    };

    // Recreate the config here to apply all env overrides.
    let mut database = config.database;
    database.uri =
      env.hubmirror_database_uri.unwrap_or(database.uri);
    database.address =
      env.hubmirror_database_address.unwrap_or(database.address);
    database.username = env
      .hubmirror_database_username
      .unwrap_or(database.username);
    database.password = env
      .hubmirror_database_password
      .unwrap_or(database.password);
    database.app_name = env
      .hubmirror_database_app_name
      .unwrap_or(database.app_name);
    database.db_name =
      env.hubmirror_database_db_name.unwrap_or(database.db_name);

    let mut logging = config.logging;
    logging.level =
      env.hubmirror_logging_level.unwrap_or(logging.level);
    logging.stdio =
      env.hubmirror_logging_stdio.unwrap_or(logging.stdio);
    logging.pretty =
      env.hubmirror_logging_pretty.unwrap_or(logging.pretty);
    logging.otlp_endpoint = env
      .hubmirror_logging_otlp_endpoint
      .unwrap_or(logging.otlp_endpoint);

    CoreConfig {
      title: env.hubmirror_title.unwrap_or(config.title),
      port: env.hubmirror_port.unwrap_or(config.port),
      bind_ip: env.hubmirror_bind_ip.unwrap_or(config.bind_ip),
      database,
      upstream_address: env
        .hubmirror_upstream_address
        .unwrap_or(config.upstream_address),
      upstream_token: env
        .hubmirror_upstream_token
        .unwrap_or(config.upstream_token),
      upstream_timeout_secs: env
        .hubmirror_upstream_timeout_secs
        .unwrap_or(config.upstream_timeout_secs),
      eager: env.hubmirror_eager.unwrap_or(config.eager),
      cors_allowed_origins: env
        .hubmirror_cors_allowed_origins
        .unwrap_or(config.cors_allowed_origins),
      logging,
    }
  })
}

/// Allows all origins when `cors_allowed_origins` is empty,
/// otherwise only the configured ones.
pub fn cors_layer() -> CorsLayer {
  let config = core_config();
  let allowed_origins = if config.cors_allowed_origins.is_empty() {
    vec![HeaderValue::from_static("*")]
  } else {
    config
      .cors_allowed_origins
      .iter()
      .filter_map(|origin| {
        HeaderValue::from_str(origin)
          .inspect_err(|e| {
            warn!("Invalid CORS allowed origin: {origin} | {e:?}")
          })
          .ok()
      })
      .collect()
  };
  CorsLayer::new()
    .allow_origin(allowed_origins)
    .allow_methods(tower_http::cors::Any)
    .allow_headers(tower_http::cors::Any)
}
