use anyhow::Context;
use database::{
  UnitOfWork,
  mungos::{
    find::find_collect,
    mongodb::{
      Collection,
      bson::{Document, doc, from_document, to_document},
    },
  },
};
use hubmirror_client::{
  entities::{
    Via, parse_timestamp, repository::Repository, user::User,
  },
  error::ReplicationError,
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::state::db_client;

mod issue;
mod label;
mod milestone;
mod pull_request;
mod pull_request_file;
mod repository;
mod repository_hook;
mod user;

pub use issue::process_issue;
pub use label::process_label;
pub use milestone::process_milestone;
pub use pull_request::process_pull_request;
pub use pull_request_file::process_pull_request_file;
pub use repository::process_repository;
pub use repository_hook::process_repository_hook;
pub use user::process_user;

/// What a processor did with a payload. Skips are successful
/// no-ops, not failures -- outer callers match and translate.
#[derive(Debug, Clone)]
pub enum Processed<T> {
  Wrote(T),
  Skipped(SkipReason),
}

impl<T> Processed<T> {
  pub fn wrote(self) -> Option<T> {
    match self {
      Processed::Wrote(row) => Some(row),
      Processed::Skipped(_) => None,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
  /// The stored row is already at or ahead of the incoming fetch
  /// instant.
  Stale,
  /// A documented no-op, eg. a renamed pull request file.
  NothingToDo(&'static str),
}

impl std::fmt::Display for SkipReason {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    match self {
      SkipReason::Stale => f.write_str("stale data"),
      SkipReason::NothingToDo(reason) => f.write_str(reason),
    }
  }
}

/// The freshness guard. A stored row at or ahead of the incoming
/// instant rejects the write: only a strictly greater `fetched_at`
/// may touch the row, which serializes updates from any mix of
/// channels and collapses duplicate deliveries to no-ops.
pub fn is_stale(
  row: &impl hubmirror_client::entities::Replicated,
  fetched_at: i64,
) -> bool {
  row.last_replicated_at() >= fetched_at
}

/// Read the current row for a key: the in-flight batch first (an
/// entity mentioned twice in one payload must accumulate, not
/// re-insert), the collection second.
pub async fn locate<T>(
  collection: &'static str,
  coll: &Collection<T>,
  key: &Document,
  uow: &UnitOfWork,
) -> Result<Option<T>, ReplicationError>
where
  T: DeserializeOwned + Send + Sync,
{
  if let Some(staged) = uow.staged(collection, key) {
    let row = from_document(staged.clone())
      .context("failed to decode staged row")?;
    return Ok(Some(row));
  }
  let row = coll
    .find_one(key.clone())
    .await
    .with_context(|| format!("failed to query {collection}"))?;
  Ok(row)
}

pub fn stage<T: Serialize>(
  uow: &mut UnitOfWork,
  collection: &'static str,
  key: Document,
  row: &T,
  insert: bool,
) -> Result<(), ReplicationError> {
  let document = to_document(row)
    .with_context(|| format!("failed to encode {collection} row"))?;
  uow.stage(collection, key, document, insert);
  Ok(())
}

/// Flush the batch. Duplicate key races surface as
/// [ReplicationError::Integrity] so the retry harness can re-run
/// the processor against the winner's row.
pub async fn commit(
  uow: &mut UnitOfWork,
) -> Result<(), ReplicationError> {
  uow.commit(&db_client().db).await.map_err(|e| {
    if database::is_duplicate_key(&e) {
      ReplicationError::Integrity { msg: e.to_string() }
    } else {
      ReplicationError::Internal(
        anyhow::Error::from(e)
          .context("failed to commit replication writes"),
      )
    }
  })
}

/// Project a string field. Absent leaves the column unchanged,
/// explicit null clears it.
pub fn set_str(
  target: &mut Option<String>,
  data: &Value,
  field: &str,
) {
  match data.get(field) {
    None => {}
    Some(Value::Null) => *target = None,
    Some(value) => {
      if let Some(value) = value.as_str() {
        *target = Some(value.to_string())
      }
    }
  }
}

pub fn set_i64(
  target: &mut Option<i64>,
  data: &Value,
  field: &str,
) {
  match data.get(field) {
    None => {}
    Some(Value::Null) => *target = None,
    Some(value) => {
      if let Some(value) = value.as_i64() {
        *target = Some(value)
      }
    }
  }
}

pub fn set_bool(
  target: &mut Option<bool>,
  data: &Value,
  field: &str,
) {
  match data.get(field) {
    None => {}
    Some(Value::Null) => *target = None,
    Some(value) => {
      if let Some(value) = value.as_bool() {
        *target = Some(value)
      }
    }
  }
}

/// Project an ISO-8601 date/time field. Only present, non-null,
/// parseable values are stored.
pub fn set_timestamp(
  target: &mut Option<i64>,
  data: &Value,
  field: &str,
) {
  if let Some(value) = data.get(field).and_then(Value::as_str)
    && let Some(instant) = parse_timestamp(value)
  {
    *target = Some(instant)
  }
}

/// An (id, denormalized login) pair read off a user subobject.
pub struct UserRef {
  pub id: Option<i64>,
  pub login: Option<String>,
}

/// Handle a user reference field per the cross-entity rules:
/// absent leaves the parent untouched (None), explicit null clears
/// the pair, and a subobject upserts the [User] row first -- a
/// stale skip there still returns the pair, since the foreign key
/// columns must always follow the payload.
///
/// [User]: hubmirror_client::entities::user::User
pub async fn user_reference(
  data: &Value,
  field: &str,
  via: Via,
  fetched_at: i64,
  uow: &mut UnitOfWork,
) -> Result<Option<UserRef>, ReplicationError> {
  match data.get(field) {
    None => Ok(None),
    Some(Value::Null) => {
      Ok(Some(UserRef { id: None, login: None }))
    }
    Some(user_data) => {
      process_user(user_data, via, fetched_at, uow, false).await?;
      Ok(Some(UserRef {
        id: user_data.get("id").and_then(Value::as_i64),
        login: user_data
          .get("login")
          .and_then(Value::as_str)
          .map(str::to_string),
      }))
    }
  }
}

/// Segment a resource url path as `/repos/{owner}/{name}/...`.
pub fn parse_repo_path(url: &str) -> Option<(String, String)> {
  let parsed = url::Url::parse(url).ok()?;
  let mut segments = parsed.path_segments()?;
  if segments.next()? != "repos" {
    return None;
  }
  let owner = segments.next()?;
  let name = segments.next()?;
  if owner.is_empty() || name.is_empty() {
    return None;
  }
  Some((owner.to_string(), name.to_string()))
}

/// Look a repository up by its unique (owner login, name) pair.
/// More than one match is an integrity bug, reported as
/// [ReplicationError::Database].
pub async fn repo_by_full_name(
  owner: &str,
  name: &str,
) -> Result<Option<Repository>, ReplicationError> {
  let mut repos = find_collect(
    &db_client().repos,
    doc! { "owner_login": owner, "name": name },
    None,
  )
  .await
  .context("failed to query repos by full name")?;
  if repos.len() > 1 {
    return Err(ReplicationError::Database {
      msg: format!("Repo {owner}/{name} found multiple times!"),
    });
  }
  Ok(repos.pop())
}

/// Resolve the repository a payload belongs to from its resource
/// url, for the entities whose payloads carry no repo subobject
/// (label, milestone, repository hook).
pub async fn repo_id_from_url(
  data: &Value,
  kind: &str,
) -> Result<i64, ReplicationError> {
  let url = data
    .get("url")
    .and_then(Value::as_str)
    .ok_or_else(|| {
      ReplicationError::missing(format!("no {kind} url"), data)
    })?;
  let (owner, name) =
    parse_repo_path(url).ok_or_else(|| {
      ReplicationError::missing(
        format!("unparseable {kind} url"),
        data,
      )
    })?;
  let repo =
    repo_by_full_name(&owner, &name).await?.ok_or_else(|| {
      ReplicationError::not_found(format!(
        "Repo {owner}/{name} not loaded in the mirror"
      ))
    })?;
  Ok(repo.id)
}

/// Look a pull request up by its repo's full name and its number.
/// More than one match is an integrity bug, reported as
/// [ReplicationError::Database].
pub async fn pull_request_by_number(
  owner: &str,
  repo: &str,
  number: i64,
) -> Result<
  Option<hubmirror_client::entities::pull_request::PullRequest>,
  ReplicationError,
> {
  let Some(repo_row) = repo_by_full_name(owner, repo).await?
  else {
    return Ok(None);
  };
  let mut prs = find_collect(
    &db_client().pull_requests,
    doc! { "base_repo_id": repo_row.id, "number": number },
    None,
  )
  .await
  .context("failed to query pull requests by number")?;
  if prs.len() > 1 {
    return Err(ReplicationError::Database {
      msg: format!(
        "PR {owner}/{repo}#{number} found multiple times!"
      ),
    });
  }
  Ok(prs.pop())
}

/// Look a user up by login. More than one match is an integrity
/// bug (logins are not enforced unique, ids are).
pub async fn user_by_login(
  login: &str,
) -> Result<Option<User>, ReplicationError> {
  let mut users = find_collect(
    &db_client().users,
    doc! { "login": login },
    None,
  )
  .await
  .context("failed to query users by login")?;
  if users.len() > 1 {
    return Err(ReplicationError::Database {
      msg: format!("User @{login} found multiple times!"),
    });
  }
  Ok(users.pop())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn set_str_absent_null_present() {
    let mut target = Some(String::from("keep"));
    set_str(&mut target, &json!({}), "name");
    assert_eq!(target.as_deref(), Some("keep"));

    set_str(&mut target, &json!({ "name": "new" }), "name");
    assert_eq!(target.as_deref(), Some("new"));

    set_str(&mut target, &json!({ "name": null }), "name");
    assert_eq!(target, None);
  }

  #[test]
  fn set_i64_ignores_wrong_types() {
    let mut target = Some(3);
    set_i64(&mut target, &json!({ "size": "big" }), "size");
    assert_eq!(target, Some(3));
    set_i64(&mut target, &json!({ "size": 12 }), "size");
    assert_eq!(target, Some(12));
  }

  #[test]
  fn set_timestamp_never_clears() {
    let mut target = Some(42);
    set_timestamp(&mut target, &json!({ "closed_at": null }), "closed_at");
    assert_eq!(target, Some(42));
    set_timestamp(
      &mut target,
      &json!({ "closed_at": "2011-01-26T19:01:12Z" }),
      "closed_at",
    );
    assert_eq!(target, Some(1296068472000));
  }

  #[test]
  fn parse_repo_path_segments() {
    assert_eq!(
      parse_repo_path(
        "https://api.github.com/repos/octocat/Hello-World/labels/bug"
      ),
      Some(("octocat".to_string(), "Hello-World".to_string()))
    );
    assert_eq!(
      parse_repo_path("https://api.github.com/users/octocat"),
      None
    );
    assert_eq!(parse_repo_path("not a url"), None);
  }

  #[test]
  fn stale_guard_is_strict_greater_acceptance() {
    use hubmirror_client::entities::{Replicated, Via, user::User};
    let mut user = User::new(1);
    // Never replicated: anything goes.
    assert!(!is_stale(&user, i64::MIN + 1));
    user.stamp_replicated(Via::Webhook, 100);
    // Older and equal instants are rejected, newer accepted.
    assert!(is_stale(&user, 99));
    assert!(is_stale(&user, 100));
    assert!(!is_stale(&user, 101));
  }
}
