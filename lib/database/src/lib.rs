#[macro_use]
extern crate tracing;

use anyhow::Context;
use hubmirror_client::entities::{
  config::DatabaseConfig, issue::Issue, label::IssueLabel,
  milestone::Milestone, mutex::Mutex, oauth::OauthToken,
  pull_request::{PullRequest, PullRequestFile},
  repository::{Repository, RepositoryHook, UserRepoAssociation},
  user::User,
};
use mungos::mongodb::{
  Collection, Database, IndexModel,
  bson::{Document, doc},
  error::{ErrorKind, WriteFailure},
  options::{ClientOptions, IndexOptions},
};

pub use mungos;

mod write;

pub use write::{StagedUpsert, UnitOfWork};

/// Collection names, shared between the [Client] and the write
/// staging in [UnitOfWork].
pub mod collections {
  pub const USERS: &str = "users";
  pub const REPOS: &str = "repos";
  pub const REPO_HOOKS: &str = "repo_hooks";
  pub const MILESTONES: &str = "milestones";
  pub const LABELS: &str = "labels";
  pub const ISSUES: &str = "issues";
  pub const PULL_REQUESTS: &str = "pull_requests";
  pub const PULL_REQUEST_FILES: &str = "pull_request_files";
  pub const USER_REPO_ASSOCIATIONS: &str = "user_repo_associations";
  pub const MUTEXES: &str = "mutexes";
  pub const OAUTH_TOKENS: &str = "oauth_tokens";
}

pub struct Client {
  pub users: Collection<User>,
  pub repos: Collection<Repository>,
  pub repo_hooks: Collection<RepositoryHook>,
  pub milestones: Collection<Milestone>,
  pub labels: Collection<IssueLabel>,
  pub issues: Collection<Issue>,
  pub pull_requests: Collection<PullRequest>,
  pub pull_request_files: Collection<PullRequestFile>,
  pub user_repo_associations: Collection<UserRepoAssociation>,
  pub mutexes: Collection<Mutex>,
  pub oauth_tokens: Collection<OauthToken>,
  pub db: Database,
}

impl Client {
  pub async fn new(
    config: &DatabaseConfig,
  ) -> anyhow::Result<Client> {
    let uri = if !config.uri.is_empty() {
      config.uri.clone()
    } else if !config.username.is_empty() {
      format!(
        "mongodb://{}:{}@{}",
        config.username, config.password, config.address
      )
    } else {
      format!("mongodb://{}", config.address)
    };
    let mut options = ClientOptions::parse(&uri)
      .await
      .context("failed to parse database address / uri")?;
    options.app_name = Some(config.app_name.clone());
    let db = mungos::mongodb::Client::with_options(options)
      .context("failed to initialize database connection")?
      .database(&config.db_name);
    let client = Client {
      users: db.collection(collections::USERS),
      repos: db.collection(collections::REPOS),
      repo_hooks: db.collection(collections::REPO_HOOKS),
      milestones: db.collection(collections::MILESTONES),
      labels: db.collection(collections::LABELS),
      issues: db.collection(collections::ISSUES),
      pull_requests: db.collection(collections::PULL_REQUESTS),
      pull_request_files: db
        .collection(collections::PULL_REQUEST_FILES),
      user_repo_associations: db
        .collection(collections::USER_REPO_ASSOCIATIONS),
      mutexes: db.collection(collections::MUTEXES),
      oauth_tokens: db.collection(collections::OAUTH_TOKENS),
      db,
    };
    client
      .init_indexes()
      .await
      .context("failed to initialize database indexes")?;
    Ok(client)
  }

  /// The unique indexes stand in for the composite primary keys of
  /// the model. Plain indexes back the common lookups. Repos are
  /// deliberately NOT unique on (owner_login, name) -- a duplicate
  /// there is an integrity bug the lookups must be able to report,
  /// not silently prevent.
  async fn init_indexes(&self) -> anyhow::Result<()> {
    index(&self.users, doc! { "login": 1 }).await?;
    index(&self.repos, doc! { "owner_login": 1, "name": 1 }).await?;
    index(&self.repo_hooks, doc! { "repo_id": 1 }).await?;
    unique_index(
      &self.milestones,
      doc! { "repo_id": 1, "number": 1 },
    )
    .await?;
    unique_index(&self.labels, doc! { "repo_id": 1, "name": 1 })
      .await?;
    index(&self.issues, doc! { "repo_id": 1 }).await?;
    index(&self.pull_requests, doc! { "base_repo_id": 1 }).await?;
    unique_index(
      &self.pull_request_files,
      doc! { "pull_request_id": 1, "sha": 1 },
    )
    .await?;
    unique_index(
      &self.user_repo_associations,
      doc! { "user_id": 1, "repo_id": 1 },
    )
    .await?;
    Ok(())
  }
}

async fn index<T: Send + Sync>(
  collection: &Collection<T>,
  keys: Document,
) -> anyhow::Result<()> {
  let name = collection.name().to_string();
  collection
    .create_index(IndexModel::builder().keys(keys).build())
    .await
    .with_context(|| format!("failed to index {name}"))?;
  Ok(())
}

async fn unique_index<T: Send + Sync>(
  collection: &Collection<T>,
  keys: Document,
) -> anyhow::Result<()> {
  let name = collection.name().to_string();
  collection
    .create_index(
      IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(true).build())
        .build(),
    )
    .await
    .with_context(|| format!("failed to unique index {name}"))?;
  Ok(())
}

/// True when the error is a duplicate key violation (E11000), ie.
/// another writer won an insert race on a unique index.
pub fn is_duplicate_key(
  error: &mungos::mongodb::error::Error,
) -> bool {
  if let ErrorKind::Write(WriteFailure::WriteError(e)) =
    &*error.kind
    && e.code == 11000
  {
    return true;
  }
  // insert_many and bulk paths wrap the write errors differently,
  // fall back on the server's error string.
  error.to_string().contains("E11000")
}

/// Filter matching rows whose `last_replicated_at` -- the greater
/// of the two provenance instants, null treated as minimum-time --
/// is strictly before `instant`. Used by scan finalizers to reap
/// children not re-seen since the previous scan.
pub fn replicated_before(instant: i64) -> Document {
  doc! {
    "$and": [
      { "$or": [
        { "last_replicated_via_webhook_at": null },
        { "last_replicated_via_webhook_at": { "$lt": instant } },
      ] },
      { "$or": [
        { "last_replicated_via_api_at": null },
        { "last_replicated_via_api_at": { "$lt": instant } },
      ] },
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn replicated_before_requires_both_channels_stale() {
    let filter = replicated_before(100);
    let clauses = filter.get_array("$and").unwrap();
    assert_eq!(clauses.len(), 2);
    // Each channel clause accepts null (never replicated that way)
    // or strictly-less than the cutoff.
    for clause in clauses {
      let ors = clause
        .as_document()
        .unwrap()
        .get_array("$or")
        .unwrap();
      assert_eq!(ors.len(), 2);
    }
  }
}
