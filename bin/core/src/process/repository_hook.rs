use database::{
  UnitOfWork, collections, mungos::mongodb::bson::doc,
};
use hubmirror_client::{
  entities::{Replicated, Via, repository::RepositoryHook},
  error::ReplicationError,
};
use serde_json::Value;

use crate::{
  process::{
    Processed, SkipReason, is_stale, locate, repo_id_from_url,
    set_bool, set_str, set_timestamp, stage,
  },
  state::db_client,
};

pub async fn process_repository_hook(
  data: &Value,
  via: Via,
  fetched_at: i64,
  uow: &mut UnitOfWork,
  commit: bool,
  repo_id: Option<i64>,
) -> Result<Processed<RepositoryHook>, ReplicationError> {
  let hook_id = data
    .get("id")
    .and_then(Value::as_i64)
    .ok_or_else(|| ReplicationError::missing("no hook ID", data))?;

  let repo_id = match repo_id {
    Some(repo_id) => repo_id,
    None => repo_id_from_url(data, "hook").await?,
  };

  let key = doc! { "_id": hook_id };
  let existing = locate(
    collections::REPO_HOOKS,
    &db_client().repo_hooks,
    &key,
    uow,
  )
  .await?;
  let insert = existing.is_none();
  let mut hook = existing
    .unwrap_or_else(|| RepositoryHook::new(hook_id, Some(repo_id)));

  if is_stale(&hook, fetched_at) {
    return Ok(Processed::Skipped(SkipReason::Stale));
  }

  set_str(&mut hook.name, data, "name");
  set_bool(&mut hook.active, data, "active");
  set_timestamp(&mut hook.created_at, data, "created_at");
  set_timestamp(&mut hook.updated_at, data, "updated_at");

  if let Some(config) =
    data.get("config").and_then(Value::as_object)
  {
    hook.config = config
      .iter()
      .filter_map(|(key, value)| {
        value.as_str().map(|v| (key.clone(), v.to_string()))
      })
      .collect();
  }
  if let Some(events) =
    data.get("events").and_then(Value::as_array)
  {
    hook.events = events
      .iter()
      .filter_map(Value::as_str)
      .map(str::to_string)
      .collect();
  }
  if let Some(last_response) =
    data.get("last_response").and_then(Value::as_object)
  {
    hook.last_response = last_response
      .iter()
      .map(|(key, value)| (key.clone(), value.clone()))
      .collect();
  }

  // The delivery url lives in the `config` subobject -- the
  // payload's top level `url` is the API resource url.
  hook.url = data
    .get("config")
    .and_then(|config| config.get("url"))
    .and_then(Value::as_str)
    .map(str::to_string);

  hook.stamp_replicated(via, fetched_at);
  stage(uow, collections::REPO_HOOKS, key, &hook, insert)?;

  if commit {
    super::commit(uow).await?;
  }

  Ok(Processed::Wrote(hook))
}
