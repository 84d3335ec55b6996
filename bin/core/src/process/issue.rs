use database::{
  UnitOfWork, collections, mungos::mongodb::bson::doc,
};
use hubmirror_client::{
  entities::{Replicated, Via, issue::Issue},
  error::ReplicationError,
};
use serde_json::Value;

use crate::{
  process::{
    Processed, SkipReason, is_stale, locate, parse_repo_path,
    process_label, process_milestone, repo_by_full_name, set_i64,
    set_str, set_timestamp, stage, user_reference,
  },
  state::db_client,
};

pub async fn process_issue(
  data: &Value,
  via: Via,
  fetched_at: i64,
  uow: &mut UnitOfWork,
  commit: bool,
) -> Result<Processed<Issue>, ReplicationError> {
  let issue_id = data
    .get("id")
    .and_then(Value::as_i64)
    .ok_or_else(|| {
      ReplicationError::missing("no issue ID", data)
    })?;

  let key = doc! { "_id": issue_id };
  let existing =
    locate(collections::ISSUES, &db_client().issues, &key, uow)
      .await?;
  let insert = existing.is_none();
  let mut issue =
    existing.unwrap_or_else(|| Issue::new(issue_id));

  if is_stale(&issue, fetched_at) {
    return Ok(Processed::Skipped(SkipReason::Stale));
  }

  set_i64(&mut issue.number, data, "number");
  set_str(&mut issue.state, data, "state");
  set_str(&mut issue.title, data, "title");
  set_str(&mut issue.body, data, "body");
  set_i64(&mut issue.comments_count, data, "comments");
  set_timestamp(&mut issue.created_at, data, "created_at");
  set_timestamp(&mut issue.updated_at, data, "updated_at");
  set_timestamp(&mut issue.closed_at, data, "closed_at");

  if let Some(user) =
    user_reference(data, "user", via, fetched_at, uow).await?
  {
    issue.user_id = user.id;
    issue.user_login = user.login;
  }
  if let Some(assignee) =
    user_reference(data, "assignee", via, fetched_at, uow).await?
  {
    issue.assignee_id = assignee.id;
    issue.assignee_login = assignee.login;
  }
  if let Some(closed_by) =
    user_reference(data, "closed_by", via, fetched_at, uow).await?
  {
    issue.closed_by_id = closed_by.id;
    issue.closed_by_login = closed_by.login;
  }

  // The repo is learned from whichever child reference resolves
  // it first, then reused for the rest.
  let mut repo_id = issue.repo_id;

  if let Some(labels) = data.get("labels") {
    match labels.as_array() {
      Some(list) if !list.is_empty() => {
        let mut names = Vec::with_capacity(list.len());
        for label_data in list {
          let processed = process_label(
            label_data, via, fetched_at, uow, false, repo_id,
          )
          .await?;
          if let Processed::Wrote(label) = processed {
            repo_id = repo_id.or(Some(label.repo_id));
            names.push(label.name);
          } else if let Some(name) =
            label_data.get("name").and_then(Value::as_str)
          {
            // A stale label row still belongs on the issue.
            names.push(name.to_string());
          }
        }
        issue.labels = names;
      }
      // An empty (or null) list clears the whole label set.
      _ => issue.labels = Vec::new(),
    }
  }

  if let Some(milestone_data) = data.get("milestone") {
    if milestone_data.is_null() {
      issue.milestone_number = None;
    } else {
      let processed = process_milestone(
        milestone_data,
        via,
        fetched_at,
        uow,
        false,
        repo_id,
      )
      .await?;
      if let Processed::Wrote(milestone) = &processed {
        repo_id = repo_id.or(Some(milestone.repo_id));
      }
      issue.milestone_number =
        milestone_data.get("number").and_then(Value::as_i64);
    }
  }

  // Listing payloads carry a repository_url; use it when the repo
  // is still unknown so reaping can scope issues to their repo.
  if repo_id.is_none()
    && let Some(url) =
      data.get("repository_url").and_then(Value::as_str)
    && let Some((owner, name)) = parse_repo_path(url)
  {
    repo_id =
      repo_by_full_name(&owner, &name).await?.map(|repo| repo.id);
  }
  issue.repo_id = repo_id;

  issue.stamp_replicated(via, fetched_at);
  stage(uow, collections::ISSUES, key, &issue, insert)?;

  if commit {
    super::commit(uow).await?;
  }

  Ok(Processed::Wrote(issue))
}
