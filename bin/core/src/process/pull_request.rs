use database::{
  UnitOfWork, collections, mungos::mongodb::bson::doc,
};
use hubmirror_client::{
  entities::{Replicated, Via, pull_request::PullRequest},
  error::ReplicationError,
};
use serde_json::Value;

use crate::{
  process::{
    Processed, SkipReason, is_stale, locate, process_milestone,
    process_repository, set_bool, set_i64, set_str, set_timestamp,
    stage, user_reference,
  },
  state::db_client,
};

pub async fn process_pull_request(
  data: &Value,
  via: Via,
  fetched_at: i64,
  uow: &mut UnitOfWork,
  commit: bool,
) -> Result<Processed<PullRequest>, ReplicationError> {
  let pr_id = data
    .get("id")
    .and_then(Value::as_i64)
    .ok_or_else(|| {
      ReplicationError::missing("no pull_request ID", data)
    })?;

  let key = doc! { "_id": pr_id };
  let existing = locate(
    collections::PULL_REQUESTS,
    &db_client().pull_requests,
    &key,
    uow,
  )
  .await?;
  let insert = existing.is_none();
  let mut pr = existing.unwrap_or_else(|| PullRequest::new(pr_id));

  if is_stale(&pr, fetched_at) {
    return Ok(Processed::Skipped(SkipReason::Stale));
  }

  set_i64(&mut pr.number, data, "number");
  set_str(&mut pr.state, data, "state");
  set_bool(&mut pr.locked, data, "locked");
  set_str(&mut pr.title, data, "title");
  set_str(&mut pr.body, data, "body");
  set_bool(&mut pr.merged, data, "merged");
  set_bool(&mut pr.mergeable, data, "mergeable");
  set_str(&mut pr.mergeable_state, data, "mergeable_state");
  // Counters are renamed `*_count`.
  set_i64(&mut pr.comments_count, data, "comments");
  set_i64(&mut pr.review_comments_count, data, "review_comments");
  set_i64(&mut pr.commits_count, data, "commits");
  set_i64(&mut pr.additions, data, "additions");
  set_i64(&mut pr.deletions, data, "deletions");
  set_i64(&mut pr.changed_files, data, "changed_files");
  set_timestamp(&mut pr.created_at, data, "created_at");
  set_timestamp(&mut pr.updated_at, data, "updated_at");
  set_timestamp(&mut pr.closed_at, data, "closed_at");
  set_timestamp(&mut pr.merged_at, data, "merged_at");

  if let Some(user) =
    user_reference(data, "user", via, fetched_at, uow).await?
  {
    pr.user_id = user.id;
    pr.user_login = user.login;
  }
  if let Some(assignee) =
    user_reference(data, "assignee", via, fetched_at, uow).await?
  {
    pr.assignee_id = assignee.id;
    pr.assignee_login = assignee.login;
  }
  if let Some(merged_by) =
    user_reference(data, "merged_by", via, fetched_at, uow).await?
  {
    pr.merged_by_id = merged_by.id;
    pr.merged_by_login = merged_by.login;
  }

  if let Some(base) = data.get("base") {
    set_str(&mut pr.base_ref, base, "ref");
    if let Some(link) =
      repo_reference(base, via, fetched_at, uow).await?
    {
      pr.base_repo_id = link;
    }
  }
  if let Some(head) = data.get("head") {
    set_str(&mut pr.head_ref, head, "ref");
    if let Some(link) =
      repo_reference(head, via, fetched_at, uow).await?
    {
      pr.head_repo_id = link;
    }
  }

  if let Some(milestone_data) = data.get("milestone") {
    if milestone_data.is_null() {
      pr.milestone_number = None;
    } else {
      process_milestone(
        milestone_data,
        via,
        fetched_at,
        uow,
        false,
        pr.base_repo_id,
      )
      .await?;
      pr.milestone_number =
        milestone_data.get("number").and_then(Value::as_i64);
    }
  }

  pr.stamp_replicated(via, fetched_at);
  stage(uow, collections::PULL_REQUESTS, key, &pr, insert)?;

  if commit {
    super::commit(uow).await?;
  }

  Ok(Processed::Wrote(pr))
}

/// The repo half of a `base` / `head` ref: a present subobject is
/// upserted and linked, explicit null clears the link, an absent
/// key (outer None) leaves the link untouched.
async fn repo_reference(
  ref_data: &Value,
  via: Via,
  fetched_at: i64,
  uow: &mut UnitOfWork,
) -> Result<Option<Option<i64>>, ReplicationError> {
  match ref_data.get("repo") {
    None => Ok(None),
    Some(Value::Null) => Ok(Some(None)),
    Some(repo_data) => {
      process_repository(
        repo_data, via, fetched_at, uow, false, None,
      )
      .await?;
      Ok(Some(repo_data.get("id").and_then(Value::as_i64)))
    }
  }
}
