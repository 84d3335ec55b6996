use anyhow::Context;
use database::mungos::mongodb::bson::doc;
use hubmirror_client::{
  entities::mutex::Mutex, error::ReplicationError,
};

use crate::state::db_client;

/// Lock name for a repository's child scans
/// (`pulls`, `issues`, `labels`, `milestones`, `hooks`).
pub fn repo_children_lock(
  owner: &str,
  repo: &str,
  kind: &str,
) -> String {
  format!("Repository|{owner}/{repo}|{kind}")
}

/// Lock name for a user's repository scan.
pub fn user_repos_lock(username: &str) -> String {
  format!("User|{username}|repos")
}

/// Lock name for a pull request's file scan.
pub fn pull_request_files_lock(
  owner: &str,
  repo: &str,
  number: i64,
) -> String {
  format!("PullRequest|{owner}/{repo}#{number}|files")
}

/// Try to take the named lock. A single insert under the unique
/// `_id` constraint: losing the race means another scan of the
/// same scope is already running, reported as `Ok(false)`.
pub async fn acquire(
  name: &str,
  user_id: Option<i64>,
) -> Result<bool, ReplicationError> {
  let insert = db_client()
    .mutexes
    .insert_one(Mutex::new(name, user_id))
    .await;
  match insert {
    Ok(_) => Ok(true),
    Err(e) if database::is_duplicate_key(&e) => Ok(false),
    Err(e) => Err(ReplicationError::Internal(
      anyhow::Error::from(e)
        .context(format!("failed to acquire mutex {name}")),
    )),
  }
}

/// Unconditionally drop the named lock. Only the scan finalizer
/// (or administrative cleanup) calls this.
pub async fn release(name: &str) -> anyhow::Result<()> {
  db_client()
    .mutexes
    .delete_one(doc! { "_id": name })
    .await
    .with_context(|| format!("failed to release mutex {name}"))?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn lock_names_match_scan_scopes() {
    assert_eq!(
      repo_children_lock("octocat", "Hello-World", "pulls"),
      "Repository|octocat/Hello-World|pulls"
    );
    assert_eq!(user_repos_lock("unoju"), "User|unoju|repos");
    assert_eq!(
      pull_request_files_lock("octocat", "Hello-World", 1),
      "PullRequest|octocat/Hello-World#1|files"
    );
  }
}
