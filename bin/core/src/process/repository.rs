use database::{
  UnitOfWork, collections, mungos::mongodb::bson::doc,
};
use hubmirror_client::{
  entities::{
    Replicated, Via,
    repository::{Repository, UserRepoAssociation},
  },
  error::ReplicationError,
};
use serde_json::Value;

use crate::{
  process::{
    Processed, SkipReason, is_stale, locate, set_bool, set_i64,
    set_str, set_timestamp, stage, user_reference,
  },
  state::db_client,
};

/// `requestor_id` is the identity hint of whoever triggered the
/// fetch -- when the payload carries a `permissions` subobject,
/// those are the *requestor's* permissions on the repo and are
/// recorded against them.
pub async fn process_repository(
  data: &Value,
  via: Via,
  fetched_at: i64,
  uow: &mut UnitOfWork,
  commit: bool,
  requestor_id: Option<i64>,
) -> Result<Processed<Repository>, ReplicationError> {
  let repo_id = data
    .get("id")
    .and_then(Value::as_i64)
    .ok_or_else(|| ReplicationError::missing("no repo ID", data))?;

  let key = doc! { "_id": repo_id };
  let existing =
    locate(collections::REPOS, &db_client().repos, &key, uow)
      .await?;
  let insert = existing.is_none();
  let mut repo =
    existing.unwrap_or_else(|| Repository::new(repo_id));

  if is_stale(&repo, fetched_at) {
    return Ok(Processed::Skipped(SkipReason::Stale));
  }

  set_str(&mut repo.name, data, "name");
  set_bool(&mut repo.private, data, "private");
  set_str(&mut repo.description, data, "description");
  set_bool(&mut repo.fork, data, "fork");
  set_str(&mut repo.homepage, data, "homepage");
  set_i64(&mut repo.size, data, "size");
  set_i64(&mut repo.stargazers_count, data, "stargazers_count");
  set_i64(&mut repo.watchers_count, data, "watchers_count");
  set_str(&mut repo.language, data, "language");
  set_bool(&mut repo.has_issues, data, "has_issues");
  set_bool(&mut repo.has_downloads, data, "has_downloads");
  set_bool(&mut repo.has_wiki, data, "has_wiki");
  set_bool(&mut repo.has_pages, data, "has_pages");
  set_i64(&mut repo.forks_count, data, "forks_count");
  set_i64(&mut repo.open_issues_count, data, "open_issues_count");
  set_str(&mut repo.default_branch, data, "default_branch");
  set_timestamp(&mut repo.created_at, data, "created_at");
  set_timestamp(&mut repo.updated_at, data, "updated_at");
  set_timestamp(&mut repo.pushed_at, data, "pushed_at");

  if let Some(owner) =
    user_reference(data, "owner", via, fetched_at, uow).await?
  {
    repo.owner_id = owner.id;
    repo.owner_login = owner.login;
  }
  if let Some(org) =
    user_reference(data, "organization", via, fetched_at, uow)
      .await?
  {
    repo.organization_id = org.id;
    repo.organization_login = org.login;
  }

  repo.stamp_replicated(via, fetched_at);
  stage(uow, collections::REPOS, key, &repo, insert)?;

  if let (Some(requestor_id), Some(permissions)) = (
    requestor_id,
    data.get("permissions").filter(|p| p.is_object()),
  ) {
    process_permissions(
      requestor_id,
      repo_id,
      permissions,
      via,
      fetched_at,
      uow,
    )
    .await?;
  }

  if commit {
    super::commit(uow).await?;
  }

  Ok(Processed::Wrote(repo))
}

async fn process_permissions(
  user_id: i64,
  repo_id: i64,
  permissions: &Value,
  via: Via,
  fetched_at: i64,
  uow: &mut UnitOfWork,
) -> Result<(), ReplicationError> {
  let key = doc! { "user_id": user_id, "repo_id": repo_id };
  let existing = locate(
    collections::USER_REPO_ASSOCIATIONS,
    &db_client().user_repo_associations,
    &key,
    uow,
  )
  .await?;
  let insert = existing.is_none();
  let mut assoc = existing
    .unwrap_or_else(|| UserRepoAssociation::new(user_id, repo_id));

  if let Some(admin) =
    permissions.get("admin").and_then(Value::as_bool)
  {
    assoc.can_admin = admin;
  }
  if let Some(push) =
    permissions.get("push").and_then(Value::as_bool)
  {
    assoc.can_push = push;
  }
  if let Some(pull) =
    permissions.get("pull").and_then(Value::as_bool)
  {
    assoc.can_pull = pull;
  }

  assoc.stamp_replicated(via, fetched_at);
  stage(
    uow,
    collections::USER_REPO_ASSOCIATIONS,
    key,
    &assoc,
    insert,
  )?;
  Ok(())
}
