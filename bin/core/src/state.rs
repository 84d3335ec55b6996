use std::sync::OnceLock;

use anyhow::{Context, anyhow};
use cache::CloneCache;
use rate_limit::RateLimitTracker;
use uuid::Uuid;

use crate::{
  config::core_config, schedule::TaskStatus, upstream::Upstream,
};

static DB_CLIENT: OnceLock<database::Client> = OnceLock::new();

pub fn db_client() -> &'static database::Client {
  DB_CLIENT.get().unwrap_or_else(|| {
    error!(
      "FATAL: db_client accessed before initialized | Ensure init_db_client() is called during startup | Exiting..."
    );
    std::process::exit(1)
  })
}

/// Must be called in app startup sequence.
pub async fn init_db_client() {
  let init = async {
    let client = database::Client::new(&core_config().database)
      .await
      .context("failed to initialize database client")?;
    DB_CLIENT.set(client).map_err(|_| {
      anyhow!(
        "db_client initialized more than once - this should not happen"
      )
    })?;
    anyhow::Ok(())
  }
  .await;
  if let Err(e) = init {
    error!(
      "FATAL: Failed to initialize database::Client | {e:#} | Exiting..."
    );
    std::process::exit(1)
  }
}

pub fn upstream() -> &'static Upstream {
  static UPSTREAM: OnceLock<Upstream> = OnceLock::new();
  UPSTREAM.get_or_init(|| {
    match Upstream::new(core_config()) {
      Ok(upstream) => upstream,
      Err(e) => {
        error!(
          "FATAL: Failed to initialize upstream client | {e:#} | Exiting..."
        );
        std::process::exit(1)
      }
    }
  })
}

/// Latest upstream rate limit window, recorded by the fetcher and
/// echoed by the HTTP layer.
pub fn rate_limit_tracker() -> &'static RateLimitTracker {
  static RATE_LIMIT_TRACKER: OnceLock<RateLimitTracker> =
    OnceLock::new();
  RATE_LIMIT_TRACKER.get_or_init(Default::default)
}

/// Task id => status, backing the `/tasks/status/{id}` endpoint.
pub type TaskStatusCache = CloneCache<Uuid, TaskStatus>;

pub fn task_statuses() -> &'static TaskStatusCache {
  static TASK_STATUSES: OnceLock<TaskStatusCache> = OnceLock::new();
  TASK_STATUSES.get_or_init(Default::default)
}
