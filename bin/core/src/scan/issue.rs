use anyhow::Context;
use database::{UnitOfWork, mungos::mongodb::bson::doc};
use futures_util::future::join_all;
use hubmirror_client::{
  entities::{Via, mirror_timestamp},
  error::ReplicationError,
};
use serde_json::{Value, json};

use crate::{
  mutex,
  process::{Processed, process_issue, repo_by_full_name},
  scan::{
    ScanOutcome, SyncOutcome, discover_last_page, tally_pages,
    with_page_retry,
  },
  schedule::{self, JobCtx},
  state::db_client,
};

const LOCK_KIND: &str = "issues";

pub async fn sync_issue(
  owner: &str,
  repo: &str,
  number: i64,
  requestor_id: Option<i64>,
  ctx: JobCtx,
) -> Result<SyncOutcome, ReplicationError> {
  let issue_path = format!("/repos/{owner}/{repo}/issues/{number}");
  let data: Value = match schedule::fetch_json(
    &issue_path,
    requestor_id,
    ctx,
  )
  .await
  {
    Err(ReplicationError::NotFound { .. }) => {
      return Err(ReplicationError::not_found(format!(
        "Issue {owner}/{repo}#{number} not found"
      )));
    }
    other => other?,
  };

  let mut uow = UnitOfWork::default();
  let processed = process_issue(
    &data,
    Via::Api,
    mirror_timestamp(),
    &mut uow,
    true,
  )
  .await?;

  Ok(match processed {
    Processed::Wrote(issue) => SyncOutcome::Wrote {
      key: json!(issue.id),
    },
    Processed::Skipped(reason) => SyncOutcome::Skipped {
      reason: reason.to_string(),
    },
  })
}

pub async fn sync_page_of_issues(
  owner: &str,
  repo: &str,
  state: &str,
  requestor_id: Option<i64>,
  per_page: i64,
  page: i64,
  ctx: JobCtx,
) -> Result<Vec<i64>, ReplicationError> {
  let page_path = format!(
    "/repos/{owner}/{repo}/issues?state={state}&per_page={per_page}&page={page}"
  );
  let issue_data_list: Vec<Value> =
    schedule::fetch_json(&page_path, requestor_id, ctx).await?;
  let fetched_at = mirror_timestamp();
  let mut results = Vec::new();
  for issue_data in &issue_data_list {
    let mut uow = UnitOfWork::default();
    let processed = process_issue(
      issue_data,
      Via::Api,
      fetched_at,
      &mut uow,
      true,
    )
    .await?;
    if let Processed::Wrote(issue) = processed {
      results.push(issue.id);
    }
  }
  Ok(results)
}

/// Finalizer: advance the repo's scan timestamp to the scan start
/// and reap issues not re-seen since the previous scan, then
/// release the scope's mutex.
async fn issues_scanned(
  owner: &str,
  repo: &str,
  scan_started_at: i64,
  lock_name: &str,
) -> Result<(), ReplicationError> {
  let repo_row =
    repo_by_full_name(owner, repo).await?.ok_or_else(|| {
      ReplicationError::not_found(format!(
        "Repo {owner}/{repo} not loaded in the mirror"
      ))
    })?;
  let prev_scan_at = repo_row.issues_last_scanned_at;
  db_client()
    .repos
    .update_one(
      doc! { "_id": repo_row.id },
      doc! { "$set": {
        "issues_last_scanned_at": scan_started_at
      } },
    )
    .await
    .context("failed to stamp issues_last_scanned_at")?;

  if let Some(prev_scan_at) = prev_scan_at {
    let mut filter = database::replicated_before(prev_scan_at);
    filter.insert("repo_id", repo_row.id);
    db_client()
      .issues
      .delete_many(filter)
      .await
      .context("failed to reap unseen issues")?;
  }

  mutex::release(lock_name).await?;
  Ok(())
}

pub async fn spawn_page_tasks_for_issues(
  owner: &str,
  repo: &str,
  state: &str,
  requestor_id: Option<i64>,
  per_page: i64,
  ctx: JobCtx,
) -> Result<ScanOutcome, ReplicationError> {
  let lock_name =
    mutex::repo_children_lock(owner, repo, LOCK_KIND);
  if !mutex::acquire(&lock_name, requestor_id).await? {
    return Ok(ScanOutcome::AlreadyRunning);
  }
  let scan_started_at = mirror_timestamp();

  let list_path = format!(
    "/repos/{owner}/{repo}/issues?state={state}&per_page={per_page}"
  );
  let last_page =
    discover_last_page(&list_path, requestor_id, ctx).await?;

  let pages = (1..=last_page).map(|page| {
    with_page_retry(move || {
      sync_page_of_issues(
        owner,
        repo,
        state,
        requestor_id,
        per_page,
        page,
        ctx,
      )
    })
  });
  let processed = tally_pages(&lock_name, join_all(pages).await);

  issues_scanned(owner, repo, scan_started_at, &lock_name).await?;

  Ok(ScanOutcome::Scanned {
    pages: last_page,
    processed,
  })
}
