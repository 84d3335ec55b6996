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
  process::{Processed, process_milestone, repo_by_full_name},
  scan::{
    ScanOutcome, SyncOutcome, discover_last_page, tally_pages,
    with_page_retry,
  },
  schedule::{self, JobCtx},
  state::db_client,
};

const LOCK_KIND: &str = "milestones";

pub async fn sync_milestone(
  owner: &str,
  repo: &str,
  number: i64,
  requestor_id: Option<i64>,
  ctx: JobCtx,
) -> Result<SyncOutcome, ReplicationError> {
  let milestone_path =
    format!("/repos/{owner}/{repo}/milestones/{number}");
  let data: Value = match schedule::fetch_json(
    &milestone_path,
    requestor_id,
    ctx,
  )
  .await
  {
    Err(ReplicationError::NotFound { .. }) => {
      return Err(ReplicationError::not_found(format!(
        "Milestone {owner}/{repo}#{number} not found"
      )));
    }
    other => other?,
  };

  let mut uow = UnitOfWork::default();
  let processed = process_milestone(
    &data,
    Via::Api,
    mirror_timestamp(),
    &mut uow,
    true,
    None,
  )
  .await?;

  Ok(match processed {
    Processed::Wrote(milestone) => SyncOutcome::Wrote {
      key: json!({
        "repo_id": milestone.repo_id,
        "number": milestone.number,
      }),
    },
    Processed::Skipped(reason) => SyncOutcome::Skipped {
      reason: reason.to_string(),
    },
  })
}

pub async fn sync_page_of_milestones(
  owner: &str,
  repo: &str,
  requestor_id: Option<i64>,
  per_page: i64,
  page: i64,
  ctx: JobCtx,
) -> Result<Vec<i64>, ReplicationError> {
  // Milestone payloads only reference their repo by url; resolve
  // the repo once for the whole page.
  let repo_row =
    repo_by_full_name(owner, repo).await?.ok_or_else(|| {
      ReplicationError::not_found(format!(
        "Repo {owner}/{repo} not loaded in the mirror"
      ))
    })?;
  let page_path = format!(
    "/repos/{owner}/{repo}/milestones?per_page={per_page}&page={page}"
  );
  let milestone_data_list: Vec<Value> =
    schedule::fetch_json(&page_path, requestor_id, ctx).await?;
  let fetched_at = mirror_timestamp();
  let mut results = Vec::new();
  for milestone_data in &milestone_data_list {
    let mut uow = UnitOfWork::default();
    let processed = process_milestone(
      milestone_data,
      Via::Api,
      fetched_at,
      &mut uow,
      true,
      Some(repo_row.id),
    )
    .await?;
    if let Processed::Wrote(milestone) = processed {
      results.push(milestone.number);
    }
  }
  Ok(results)
}

/// Finalizer: advance the repo's scan timestamp to the scan start
/// and reap milestones not re-seen since the previous scan, then
/// release the scope's mutex.
async fn milestones_scanned(
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
  let prev_scan_at = repo_row.milestones_last_scanned_at;
  db_client()
    .repos
    .update_one(
      doc! { "_id": repo_row.id },
      doc! { "$set": {
        "milestones_last_scanned_at": scan_started_at
      } },
    )
    .await
    .context("failed to stamp milestones_last_scanned_at")?;

  if let Some(prev_scan_at) = prev_scan_at {
    let mut filter = database::replicated_before(prev_scan_at);
    filter.insert("repo_id", repo_row.id);
    db_client()
      .milestones
      .delete_many(filter)
      .await
      .context("failed to reap unseen milestones")?;
  }

  mutex::release(lock_name).await?;
  Ok(())
}

pub async fn spawn_page_tasks_for_milestones(
  owner: &str,
  repo: &str,
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
    "/repos/{owner}/{repo}/milestones?per_page={per_page}"
  );
  let last_page =
    discover_last_page(&list_path, requestor_id, ctx).await?;

  let pages = (1..=last_page).map(|page| {
    with_page_retry(move || {
      sync_page_of_milestones(
        owner,
        repo,
        requestor_id,
        per_page,
        page,
        ctx,
      )
    })
  });
  let processed = tally_pages(&lock_name, join_all(pages).await);

  milestones_scanned(owner, repo, scan_started_at, &lock_name)
    .await?;

  Ok(ScanOutcome::Scanned {
    pages: last_page,
    processed,
  })
}
