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
  process::{Processed, process_pull_request, repo_by_full_name},
  scan::{
    PER_PAGE_DEFAULT, ScanOutcome, SyncOutcome,
    discover_last_page, tally_pages, with_page_retry,
  },
  schedule::{self, JobCtx, Task},
  state::db_client,
};

const LOCK_KIND: &str = "pulls";

pub async fn sync_pull_request(
  owner: &str,
  repo: &str,
  number: i64,
  children: bool,
  requestor_id: Option<i64>,
  ctx: JobCtx,
) -> Result<SyncOutcome, ReplicationError> {
  let pr_path = format!("/repos/{owner}/{repo}/pulls/{number}");
  let data: Value =
    match schedule::fetch_json(&pr_path, requestor_id, ctx).await {
      Err(ReplicationError::NotFound { .. }) => {
        return Err(ReplicationError::not_found(format!(
          "PR {owner}/{repo}#{number} not found"
        )));
      }
      other => other?,
    };

  let mut uow = UnitOfWork::default();
  let processed = process_pull_request(
    &data,
    Via::Api,
    mirror_timestamp(),
    &mut uow,
    true,
  )
  .await?;

  if children {
    schedule::enqueue(Task::FileScan {
      owner: owner.to_string(),
      repo: repo.to_string(),
      number,
      requestor_id,
      per_page: PER_PAGE_DEFAULT,
    })
    .await;
  }

  Ok(match processed {
    Processed::Wrote(pr) => SyncOutcome::Wrote {
      key: json!(pr.id),
    },
    Processed::Skipped(reason) => SyncOutcome::Skipped {
      reason: reason.to_string(),
    },
  })
}

pub async fn sync_page_of_pull_requests(
  owner: &str,
  repo: &str,
  state: &str,
  children: bool,
  requestor_id: Option<i64>,
  per_page: i64,
  page: i64,
  ctx: JobCtx,
) -> Result<Vec<i64>, ReplicationError> {
  let page_path = format!(
    "/repos/{owner}/{repo}/pulls?state={state}&per_page={per_page}&page={page}"
  );
  let pr_data_list: Vec<Value> =
    schedule::fetch_json(&page_path, requestor_id, ctx).await?;
  let fetched_at = mirror_timestamp();
  let mut results = Vec::new();
  for pr_data in &pr_data_list {
    let mut uow = UnitOfWork::default();
    let processed = process_pull_request(
      pr_data,
      Via::Api,
      fetched_at,
      &mut uow,
      true,
    )
    .await?;
    if let Processed::Wrote(pr) = processed {
      results.push(pr.id);
      if children && let Some(number) = pr.number {
        schedule::enqueue(Task::FileScan {
          owner: owner.to_string(),
          repo: repo.to_string(),
          number,
          requestor_id,
          per_page,
        })
        .await;
      }
    }
  }
  Ok(results)
}

/// Finalizer: advance the repo's scan timestamp to the scan start
/// and reap pull requests not re-seen since the previous scan,
/// then release the scope's mutex.
async fn pull_requests_scanned(
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
  let prev_scan_at = repo_row.pull_requests_last_scanned_at;
  db_client()
    .repos
    .update_one(
      doc! { "_id": repo_row.id },
      doc! { "$set": {
        "pull_requests_last_scanned_at": scan_started_at
      } },
    )
    .await
    .context("failed to stamp pull_requests_last_scanned_at")?;

  if let Some(prev_scan_at) = prev_scan_at {
    let mut filter = database::replicated_before(prev_scan_at);
    filter.insert("base_repo_id", repo_row.id);
    db_client()
      .pull_requests
      .delete_many(filter)
      .await
      .context("failed to reap unseen pull requests")?;
  }

  mutex::release(lock_name).await?;
  Ok(())
}

pub async fn spawn_page_tasks_for_pull_requests(
  owner: &str,
  repo: &str,
  state: &str,
  children: bool,
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
    "/repos/{owner}/{repo}/pulls?state={state}&per_page={per_page}"
  );
  let last_page =
    discover_last_page(&list_path, requestor_id, ctx).await?;

  let pages = (1..=last_page).map(|page| {
    with_page_retry(move || {
      sync_page_of_pull_requests(
        owner,
        repo,
        state,
        children,
        requestor_id,
        per_page,
        page,
        ctx,
      )
    })
  });
  let processed = tally_pages(&lock_name, join_all(pages).await);

  pull_requests_scanned(
    owner,
    repo,
    scan_started_at,
    &lock_name,
  )
  .await?;

  Ok(ScanOutcome::Scanned {
    pages: last_page,
    processed,
  })
}
