use anyhow::Context;
use database::{UnitOfWork, mungos::mongodb::bson::doc};
use futures_util::future::join_all;
use hubmirror_client::{
  entities::{Via, mirror_timestamp},
  error::ReplicationError,
};
use serde_json::Value;

use crate::{
  mutex,
  process::{
    Processed, process_pull_request_file, pull_request_by_number,
  },
  scan::{
    ScanOutcome, discover_last_page, tally_pages, with_page_retry,
  },
  schedule::{self, JobCtx},
  state::db_client,
};

pub async fn sync_page_of_pull_request_files(
  owner: &str,
  repo: &str,
  number: i64,
  pull_request_id: Option<i64>,
  requestor_id: Option<i64>,
  per_page: i64,
  page: i64,
  ctx: JobCtx,
) -> Result<Vec<String>, ReplicationError> {
  let pull_request_id = match pull_request_id {
    Some(id) => id,
    None => {
      pull_request_by_number(owner, repo, number)
        .await?
        .ok_or_else(|| {
          ReplicationError::not_found(format!(
            "PR {owner}/{repo}#{number} not loaded in the mirror"
          ))
        })?
        .id
    }
  };

  let page_path = format!(
    "/repos/{owner}/{repo}/pulls/{number}/files?per_page={per_page}&page={page}"
  );
  let file_data_list: Vec<Value> =
    schedule::fetch_json(&page_path, requestor_id, ctx).await?;
  let fetched_at = mirror_timestamp();
  let mut results = Vec::new();
  for file_data in &file_data_list {
    let mut uow = UnitOfWork::default();
    let processed = process_pull_request_file(
      file_data,
      Via::Api,
      fetched_at,
      &mut uow,
      true,
      Some(pull_request_id),
    )
    .await?;
    // Renamed files come back Skipped and are simply not recorded.
    if let Processed::Wrote(file) = processed {
      results.push(file.sha);
    }
  }
  Ok(results)
}

/// Finalizer: advance the pull request's file scan timestamp to
/// the scan start and reap files not re-seen since the previous
/// scan, then release the scope's mutex.
async fn pull_request_files_scanned(
  owner: &str,
  repo: &str,
  number: i64,
  scan_started_at: i64,
  lock_name: &str,
) -> Result<(), ReplicationError> {
  let pr = pull_request_by_number(owner, repo, number)
    .await?
    .ok_or_else(|| {
      ReplicationError::not_found(format!(
        "PR {owner}/{repo}#{number} not loaded in the mirror"
      ))
    })?;
  let prev_scan_at = pr.files_last_scanned_at;
  db_client()
    .pull_requests
    .update_one(
      doc! { "_id": pr.id },
      doc! { "$set": {
        "files_last_scanned_at": scan_started_at
      } },
    )
    .await
    .context("failed to stamp files_last_scanned_at")?;

  if let Some(prev_scan_at) = prev_scan_at {
    let mut filter = database::replicated_before(prev_scan_at);
    filter.insert("pull_request_id", pr.id);
    db_client()
      .pull_request_files
      .delete_many(filter)
      .await
      .context("failed to reap unseen pull request files")?;
  }

  mutex::release(lock_name).await?;
  Ok(())
}

pub async fn spawn_page_tasks_for_pull_request_files(
  owner: &str,
  repo: &str,
  number: i64,
  requestor_id: Option<i64>,
  per_page: i64,
  ctx: JobCtx,
) -> Result<ScanOutcome, ReplicationError> {
  let lock_name =
    mutex::pull_request_files_lock(owner, repo, number);
  if !mutex::acquire(&lock_name, requestor_id).await? {
    return Ok(ScanOutcome::AlreadyRunning);
  }
  let scan_started_at = mirror_timestamp();

  let pr = pull_request_by_number(owner, repo, number).await?;
  let pull_request_id = pr.map(|pr| pr.id);

  let list_path = format!(
    "/repos/{owner}/{repo}/pulls/{number}/files?per_page={per_page}"
  );
  let last_page =
    discover_last_page(&list_path, requestor_id, ctx).await?;

  let pages = (1..=last_page).map(|page| {
    with_page_retry(move || {
      sync_page_of_pull_request_files(
        owner,
        repo,
        number,
        pull_request_id,
        requestor_id,
        per_page,
        page,
        ctx,
      )
    })
  });
  let processed = tally_pages(&lock_name, join_all(pages).await);

  pull_request_files_scanned(
    owner,
    repo,
    number,
    scan_started_at,
    &lock_name,
  )
  .await?;

  Ok(ScanOutcome::Scanned {
    pages: last_page,
    processed,
  })
}
