use database::{
  UnitOfWork, collections, mungos::mongodb::bson::doc,
};
use hubmirror_client::{
  entities::{Replicated, Via, pull_request::PullRequestFile},
  error::ReplicationError,
};
use serde_json::Value;

use crate::{
  process::{
    Processed, SkipReason, is_stale, locate, set_i64, set_str,
    stage,
  },
  state::db_client,
};

pub async fn process_pull_request_file(
  data: &Value,
  via: Via,
  fetched_at: i64,
  uow: &mut UnitOfWork,
  commit: bool,
  pull_request_id: Option<i64>,
) -> Result<Processed<PullRequestFile>, ReplicationError> {
  let Some(sha) = data
    .get("sha")
    .and_then(Value::as_str)
    .filter(|sha| !sha.is_empty())
  else {
    // The upstream marks renamed files by sending them with no
    // sha. Not an error, just nothing to store.
    return Ok(Processed::Skipped(SkipReason::NothingToDo(
      "no pull request file sha",
    )));
  };

  let pull_request_id = pull_request_id.ok_or_else(|| {
    ReplicationError::missing("no pull_request_id", data)
  })?;

  let key = doc! { "pull_request_id": pull_request_id, "sha": sha };
  let existing = locate(
    collections::PULL_REQUEST_FILES,
    &db_client().pull_request_files,
    &key,
    uow,
  )
  .await?;
  let insert = existing.is_none();
  let mut file = existing
    .unwrap_or_else(|| PullRequestFile::new(pull_request_id, sha));

  if is_stale(&file, fetched_at) {
    return Ok(Processed::Skipped(SkipReason::Stale));
  }

  set_str(&mut file.filename, data, "filename");
  set_str(&mut file.status, data, "status");
  set_i64(&mut file.additions, data, "additions");
  set_i64(&mut file.deletions, data, "deletions");
  set_i64(&mut file.changes, data, "changes");
  set_str(&mut file.patch, data, "patch");

  file.stamp_replicated(via, fetched_at);
  stage(uow, collections::PULL_REQUEST_FILES, key, &file, insert)?;

  if commit {
    super::commit(uow).await?;
  }

  Ok(Processed::Wrote(file))
}
