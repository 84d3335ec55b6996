use std::time::Duration;

use hubmirror_client::error::ReplicationError;
use serde::Serialize;
use serde_json::Value;

use crate::{
  schedule::{self, JobCtx, Task},
  upstream::link,
};

pub mod issue;
pub mod label;
pub mod milestone;
pub mod pull_request;
pub mod pull_request_file;
pub mod repository;
pub mod repository_hook;
pub mod user;

pub const PER_PAGE_DEFAULT: i64 = 100;

/// How often a single page worker re-runs after losing an insert
/// race before giving the page up.
const PAGE_WORKER_ATTEMPTS: usize = 3;

/// Result of a single-object sync job.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
  Wrote { key: Value },
  Skipped { reason: String },
}

/// Result of a scan spawn.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScanOutcome {
  /// Another scan already holds this scope's mutex. Nothing was
  /// fetched.
  AlreadyRunning,
  Scanned { pages: i64, processed: usize },
}

/// Read the page count of a listing off its Link header, via a
/// HEAD request. Always >= 1.
pub async fn discover_last_page(
  path: &str,
  requestor_id: Option<i64>,
  ctx: JobCtx,
) -> Result<i64, ReplicationError> {
  let response = schedule::head(path, requestor_id, ctx).await?;
  let link = response
    .headers()
    .get(reqwest::header::LINK)
    .and_then(|value| value.to_str().ok());
  Ok(link::last_page(link))
}

/// Run one page worker with its bounded integrity-race retry:
/// losing an insert race re-runs the page (the winner's rows are
/// visible on the next pass), anything else propagates.
pub async fn with_page_retry<T, Fut>(
  mut page: impl FnMut() -> Fut,
) -> Result<T, ReplicationError>
where
  Fut: Future<Output = Result<T, ReplicationError>>,
{
  let mut attempt = 0;
  loop {
    match page().await {
      Err(ReplicationError::Integrity { msg })
        if attempt + 1 < PAGE_WORKER_ATTEMPTS =>
      {
        attempt += 1;
        warn!(
          "page worker lost an insert race | retry {attempt} | {msg}"
        );
        tokio::time::sleep(Duration::from_millis(
          250 * attempt as u64,
        ))
        .await;
      }
      other => return other,
    }
  }
}

/// Collect the page worker results. Failed pages are logged and
/// skipped -- the finalizer still runs so the mutex is released
/// and the scan timestamp advances; the next scan repairs whatever
/// the failed page missed.
pub fn tally_pages<T>(
  lock_name: &str,
  results: Vec<Result<Vec<T>, ReplicationError>>,
) -> usize {
  let mut processed = 0;
  for result in results {
    match result {
      Ok(items) => processed += items.len(),
      Err(e) => {
        warn!("page worker failed under {lock_name} | {e:#}")
      }
    }
  }
  processed
}

/// The dependent scans of a repository, spawned on
/// `children=true`: issues, labels, milestones, pull requests,
/// hooks. Each is guarded by its own mutex scope, so duplicates
/// collapse.
pub async fn spawn_repo_children(
  owner: &str,
  repo: &str,
  requestor_id: Option<i64>,
) {
  let children = [
    Task::PullRequestScan {
      owner: owner.to_string(),
      repo: repo.to_string(),
      state: String::from("all"),
      children: false,
      requestor_id,
      per_page: PER_PAGE_DEFAULT,
    },
    Task::IssueScan {
      owner: owner.to_string(),
      repo: repo.to_string(),
      state: String::from("all"),
      requestor_id,
      per_page: PER_PAGE_DEFAULT,
    },
    Task::LabelScan {
      owner: owner.to_string(),
      repo: repo.to_string(),
      requestor_id,
      per_page: PER_PAGE_DEFAULT,
    },
    Task::MilestoneScan {
      owner: owner.to_string(),
      repo: repo.to_string(),
      requestor_id,
      per_page: PER_PAGE_DEFAULT,
    },
    Task::HookScan {
      owner: owner.to_string(),
      repo: repo.to_string(),
      requestor_id,
      per_page: PER_PAGE_DEFAULT,
    },
  ];
  for task in children {
    schedule::enqueue(task).await;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn outcomes_serialize_with_tags() {
    let encoded =
      serde_json::to_value(ScanOutcome::AlreadyRunning).unwrap();
    assert_eq!(encoded["outcome"], "already_running");

    let encoded = serde_json::to_value(ScanOutcome::Scanned {
      pages: 3,
      processed: 120,
    })
    .unwrap();
    assert_eq!(encoded["outcome"], "scanned");
    assert_eq!(encoded["pages"], 3);
    assert_eq!(encoded["processed"], 120);

    let encoded = serde_json::to_value(SyncOutcome::Skipped {
      reason: String::from("stale data"),
    })
    .unwrap();
    assert_eq!(encoded["outcome"], "skipped");
    assert_eq!(encoded["reason"], "stale data");
  }
}
