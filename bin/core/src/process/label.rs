use database::{
  UnitOfWork, collections, mungos::mongodb::bson::doc,
};
use hubmirror_client::{
  entities::{Replicated, Via, label::IssueLabel},
  error::ReplicationError,
};
use serde_json::Value;

use crate::{
  process::{
    Processed, SkipReason, is_stale, locate, repo_id_from_url,
    stage,
  },
  state::db_client,
};

/// `repo_id` callers that already know the repo (scans, the issue
/// processor) pass it through; otherwise it is resolved from the
/// label's resource url.
pub async fn process_label(
  data: &Value,
  via: Via,
  fetched_at: i64,
  uow: &mut UnitOfWork,
  commit: bool,
  repo_id: Option<i64>,
) -> Result<Processed<IssueLabel>, ReplicationError> {
  let name = data
    .get("name")
    .and_then(Value::as_str)
    .ok_or_else(|| {
      ReplicationError::missing("no label name", data)
    })?;

  let repo_id = match repo_id {
    Some(repo_id) => repo_id,
    None => repo_id_from_url(data, "label").await?,
  };

  let key = doc! { "repo_id": repo_id, "name": name };
  let existing =
    locate(collections::LABELS, &db_client().labels, &key, uow)
      .await?;
  let insert = existing.is_none();
  let mut label =
    existing.unwrap_or_else(|| IssueLabel::new(repo_id, name));

  if is_stale(&label, fetched_at) {
    return Ok(Processed::Skipped(SkipReason::Stale));
  }

  if let Some(color) = data.get("color") {
    label.color = color
      .as_str()
      .filter(|hex| !hex.is_empty())
      .map(str::to_string);
  }

  label.stamp_replicated(via, fetched_at);
  stage(uow, collections::LABELS, key, &label, insert)?;

  if commit {
    super::commit(uow).await?;
  }

  Ok(Processed::Wrote(label))
}
