use database::{
  UnitOfWork, collections, mungos::mongodb::bson::doc,
};
use hubmirror_client::{
  entities::{Replicated, Via, milestone::Milestone},
  error::ReplicationError,
};
use serde_json::Value;

use crate::{
  process::{
    Processed, SkipReason, is_stale, locate, repo_id_from_url,
    set_i64, set_str, set_timestamp, stage, user_reference,
  },
  state::db_client,
};

pub async fn process_milestone(
  data: &Value,
  via: Via,
  fetched_at: i64,
  uow: &mut UnitOfWork,
  commit: bool,
  repo_id: Option<i64>,
) -> Result<Processed<Milestone>, ReplicationError> {
  let number = data
    .get("number")
    .and_then(Value::as_i64)
    .ok_or_else(|| {
      ReplicationError::missing("no milestone number", data)
    })?;

  let repo_id = match repo_id {
    Some(repo_id) => repo_id,
    None => repo_id_from_url(data, "milestone").await?,
  };

  let key = doc! { "repo_id": repo_id, "number": number };
  let existing = locate(
    collections::MILESTONES,
    &db_client().milestones,
    &key,
    uow,
  )
  .await?;
  let insert = existing.is_none();
  let mut milestone =
    existing.unwrap_or_else(|| Milestone::new(repo_id, number));

  if is_stale(&milestone, fetched_at) {
    return Ok(Processed::Skipped(SkipReason::Stale));
  }

  set_str(&mut milestone.state, data, "state");
  set_str(&mut milestone.title, data, "title");
  set_str(&mut milestone.description, data, "description");
  // Counters are renamed `*_count`, `due_on` becomes `due_at`.
  set_i64(&mut milestone.open_issues_count, data, "open_issues");
  set_i64(
    &mut milestone.closed_issues_count,
    data,
    "closed_issues",
  );
  set_timestamp(&mut milestone.created_at, data, "created_at");
  set_timestamp(&mut milestone.updated_at, data, "updated_at");
  set_timestamp(&mut milestone.closed_at, data, "closed_at");
  set_timestamp(&mut milestone.due_at, data, "due_on");

  if let Some(creator) =
    user_reference(data, "creator", via, fetched_at, uow).await?
  {
    milestone.creator_id = creator.id;
    milestone.creator_login = creator.login;
  }

  milestone.stamp_replicated(via, fetched_at);
  stage(uow, collections::MILESTONES, key, &milestone, insert)?;

  if commit {
    super::commit(uow).await?;
  }

  Ok(Processed::Wrote(milestone))
}
