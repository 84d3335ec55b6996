use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use typeshare::typeshare;

use crate::entities::I64;

/// A mirrored repository. The owner / organization references are
/// stored as (id, denormalized login) pairs; the referenced [User]
/// rows are upserted before the pair is written, so the login always
/// agrees with the linked row when one exists.
///
/// [User]: crate::entities::user::User
#[typeshare]
#[derive(
  Debug, Clone, Default, PartialEq, Serialize, Deserialize,
)]
pub struct Repository {
  /// Stable upstream id.
  #[serde(rename = "_id")]
  pub id: I64,
  pub name: Option<String>,
  pub owner_id: Option<I64>,
  pub owner_login: Option<String>,
  pub organization_id: Option<I64>,
  pub organization_login: Option<String>,
  pub private: Option<bool>,
  pub description: Option<String>,
  pub fork: Option<bool>,
  pub created_at: Option<I64>,
  pub updated_at: Option<I64>,
  pub pushed_at: Option<I64>,
  pub homepage: Option<String>,
  pub size: Option<I64>,
  pub stargazers_count: Option<I64>,
  pub watchers_count: Option<I64>,
  pub language: Option<String>,
  pub has_issues: Option<bool>,
  pub has_downloads: Option<bool>,
  pub has_wiki: Option<bool>,
  pub has_pages: Option<bool>,
  pub forks_count: Option<I64>,
  pub open_issues_count: Option<I64>,
  pub default_branch: Option<String>,
  /// Not on the upstream. Set by the respective child scan
  /// finalizers, used to reap children not re-seen during the
  /// latest scan.
  pub hooks_last_scanned_at: Option<I64>,
  pub issues_last_scanned_at: Option<I64>,
  pub pull_requests_last_scanned_at: Option<I64>,
  pub labels_last_scanned_at: Option<I64>,
  pub milestones_last_scanned_at: Option<I64>,
  pub last_replicated_via_webhook_at: Option<I64>,
  pub last_replicated_via_api_at: Option<I64>,
}

crate::entities::replicated!(Repository);

impl Repository {
  pub fn new(id: I64) -> Repository {
    Repository {
      id,
      ..Default::default()
    }
  }

  /// `{owner_login}/{name}`, with placeholders for unknown parts.
  pub fn full_name(&self) -> String {
    format!(
      "{}/{}",
      self.owner_login.as_deref().unwrap_or("<unknown>"),
      self.name.as_deref().unwrap_or("<unknown>")
    )
  }
}

/// A webhook registered on a repository upstream.
#[derive(
  Debug, Clone, Default, PartialEq, Serialize, Deserialize,
)]
pub struct RepositoryHook {
  /// Stable upstream id.
  #[serde(rename = "_id")]
  pub id: I64,
  pub repo_id: Option<I64>,
  pub name: Option<String>,
  /// The hook's delivery url. Taken from `config.url`, NOT the
  /// payload's top level `url` (which is the API resource url).
  pub url: Option<String>,
  pub config: IndexMap<String, String>,
  pub events: Vec<String>,
  pub active: Option<bool>,
  pub last_response: IndexMap<String, serde_json::Value>,
  pub created_at: Option<I64>,
  pub updated_at: Option<I64>,
  pub last_replicated_via_webhook_at: Option<I64>,
  pub last_replicated_via_api_at: Option<I64>,
}

crate::entities::replicated!(RepositoryHook);

impl RepositoryHook {
  pub fn new(id: I64, repo_id: Option<I64>) -> RepositoryHook {
    RepositoryHook {
      id,
      repo_id,
      ..Default::default()
    }
  }
}

/// What a given user can do on a given repository. Upserted when a
/// repository payload carries a `permissions` subobject along with a
/// requestor identity hint. Unique on (user_id, repo_id).
#[typeshare]
#[derive(
  Debug, Clone, Default, PartialEq, Serialize, Deserialize,
)]
pub struct UserRepoAssociation {
  pub user_id: I64,
  pub repo_id: I64,
  pub can_pull: bool,
  pub can_push: bool,
  pub can_admin: bool,
  pub last_replicated_via_webhook_at: Option<I64>,
  pub last_replicated_via_api_at: Option<I64>,
}

crate::entities::replicated!(UserRepoAssociation);

impl UserRepoAssociation {
  pub fn new(user_id: I64, repo_id: I64) -> UserRepoAssociation {
    UserRepoAssociation {
      user_id,
      repo_id,
      // Holding a repo reference at all implies read access.
      can_pull: true,
      ..Default::default()
    }
  }
}
