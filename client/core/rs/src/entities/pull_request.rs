use serde::{Deserialize, Serialize};
use typeshare::typeshare;

use crate::entities::I64;

/// A mirrored pull request.
#[typeshare]
#[derive(
  Debug, Clone, Default, PartialEq, Serialize, Deserialize,
)]
pub struct PullRequest {
  /// Stable upstream id.
  #[serde(rename = "_id")]
  pub id: I64,
  pub number: Option<I64>,
  pub state: Option<String>,
  pub locked: Option<bool>,
  pub title: Option<String>,
  pub body: Option<String>,
  pub user_id: Option<I64>,
  pub user_login: Option<String>,
  pub assignee_id: Option<I64>,
  pub assignee_login: Option<String>,
  pub merged_by_id: Option<I64>,
  pub merged_by_login: Option<String>,
  pub base_repo_id: Option<I64>,
  pub base_ref: Option<String>,
  pub head_repo_id: Option<I64>,
  pub head_ref: Option<String>,
  /// Keyed against the base repo's milestones.
  pub milestone_number: Option<I64>,
  pub merged: Option<bool>,
  pub mergeable: Option<bool>,
  pub mergeable_state: Option<String>,
  pub comments_count: Option<I64>,
  pub review_comments_count: Option<I64>,
  pub commits_count: Option<I64>,
  pub additions: Option<I64>,
  pub deletions: Option<I64>,
  pub changed_files: Option<I64>,
  pub created_at: Option<I64>,
  pub updated_at: Option<I64>,
  pub closed_at: Option<I64>,
  pub merged_at: Option<I64>,
  /// Not on the upstream. Set by the file scan finalizer, used to
  /// reap files not re-seen during the latest scan.
  pub files_last_scanned_at: Option<I64>,
  pub last_replicated_via_webhook_at: Option<I64>,
  pub last_replicated_via_api_at: Option<I64>,
}

crate::entities::replicated!(PullRequest);

impl PullRequest {
  pub fn new(id: I64) -> PullRequest {
    PullRequest {
      id,
      ..Default::default()
    }
  }
}

/// A file touched by a pull request. Unique on
/// (pull_request_id, sha). Renamed files arrive from the upstream
/// with no sha at all and are deliberately skipped, not stored.
#[typeshare]
#[derive(
  Debug, Clone, Default, PartialEq, Serialize, Deserialize,
)]
pub struct PullRequestFile {
  pub pull_request_id: I64,
  pub sha: String,
  pub filename: Option<String>,
  pub status: Option<String>,
  pub additions: Option<I64>,
  pub deletions: Option<I64>,
  pub changes: Option<I64>,
  pub patch: Option<String>,
  pub last_replicated_via_webhook_at: Option<I64>,
  pub last_replicated_via_api_at: Option<I64>,
}

crate::entities::replicated!(PullRequestFile);

impl PullRequestFile {
  pub fn new(
    pull_request_id: I64,
    sha: impl Into<String>,
  ) -> PullRequestFile {
    PullRequestFile {
      pull_request_id,
      sha: sha.into(),
      ..Default::default()
    }
  }
}
