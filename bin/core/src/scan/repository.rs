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
  process::{Processed, process_repository, user_by_login},
  scan::{
    ScanOutcome, SyncOutcome, discover_last_page,
    spawn_repo_children, tally_pages, with_page_retry,
  },
  schedule::{self, JobCtx},
  state::db_client,
};

pub async fn sync_repository(
  owner: &str,
  repo: &str,
  children: bool,
  requestor_id: Option<i64>,
  ctx: JobCtx,
) -> Result<SyncOutcome, ReplicationError> {
  let repo_path = format!("/repos/{owner}/{repo}");
  let data: Value =
    match schedule::fetch_json(&repo_path, requestor_id, ctx).await
    {
      Err(ReplicationError::NotFound { .. }) => {
        return Err(ReplicationError::not_found(format!(
          "Repo {owner}/{repo} not found"
        )));
      }
      other => other?,
    };

  let mut uow = UnitOfWork::default();
  let processed = process_repository(
    &data,
    Via::Api,
    mirror_timestamp(),
    &mut uow,
    true,
    requestor_id,
  )
  .await?;

  if children {
    spawn_repo_children(owner, repo, requestor_id).await;
  }

  Ok(match processed {
    Processed::Wrote(repo) => SyncOutcome::Wrote {
      key: json!(repo.id),
    },
    Processed::Skipped(reason) => SyncOutcome::Skipped {
      reason: reason.to_string(),
    },
  })
}

pub async fn sync_page_of_user_repositories(
  username: &str,
  listing: &str,
  children: bool,
  requestor_id: Option<i64>,
  per_page: i64,
  page: i64,
  ctx: JobCtx,
) -> Result<Vec<i64>, ReplicationError> {
  let page_path = format!(
    "/users/{username}/repos?type={listing}&per_page={per_page}&page={page}"
  );
  let repo_data_list: Vec<Value> =
    schedule::fetch_json(&page_path, requestor_id, ctx).await?;
  let fetched_at = mirror_timestamp();
  let mut results = Vec::new();
  for repo_data in &repo_data_list {
    let mut uow = UnitOfWork::default();
    let processed = process_repository(
      repo_data,
      Via::Api,
      fetched_at,
      &mut uow,
      true,
      requestor_id,
    )
    .await?;
    if let Processed::Wrote(repo) = processed {
      results.push(repo.id);
      if children
        && let (Some(owner), Some(name)) =
          (&repo.owner_login, &repo.name)
      {
        spawn_repo_children(owner, name, requestor_id).await;
      }
    }
  }
  Ok(results)
}

/// Finalizer: advance the user's scan timestamp to the scan start
/// and reap owned repos not re-seen since the previous scan, then
/// release the scope's mutex.
async fn repositories_scanned(
  username: &str,
  scan_started_at: i64,
  lock_name: &str,
) -> Result<(), ReplicationError> {
  let user = user_by_login(username).await?.ok_or_else(|| {
    ReplicationError::not_found(format!(
      "User @{username} not loaded in the mirror"
    ))
  })?;
  let prev_scan_at = user.repos_last_scanned_at;
  db_client()
    .users
    .update_one(
      doc! { "_id": user.id },
      doc! { "$set": { "repos_last_scanned_at": scan_started_at } },
    )
    .await
    .context("failed to stamp repos_last_scanned_at")?;

  if let Some(prev_scan_at) = prev_scan_at {
    let mut filter = database::replicated_before(prev_scan_at);
    filter.insert("owner_id", user.id);
    db_client()
      .repos
      .delete_many(filter)
      .await
      .context("failed to reap unseen repos")?;
  }

  mutex::release(lock_name).await?;
  Ok(())
}

pub async fn spawn_page_tasks_for_user_repositories(
  username: &str,
  listing: &str,
  children: bool,
  requestor_id: Option<i64>,
  per_page: i64,
  ctx: JobCtx,
) -> Result<ScanOutcome, ReplicationError> {
  let lock_name = mutex::user_repos_lock(username);
  if !mutex::acquire(&lock_name, requestor_id).await? {
    return Ok(ScanOutcome::AlreadyRunning);
  }
  let scan_started_at = mirror_timestamp();

  let list_path = format!(
    "/users/{username}/repos?type={listing}&per_page={per_page}"
  );
  let last_page =
    discover_last_page(&list_path, requestor_id, ctx).await?;

  let pages = (1..=last_page).map(|page| {
    with_page_retry(move || {
      sync_page_of_user_repositories(
        username,
        listing,
        children,
        requestor_id,
        per_page,
        page,
        ctx,
      )
    })
  });
  let processed = tally_pages(&lock_name, join_all(pages).await);

  repositories_scanned(username, scan_started_at, &lock_name)
    .await?;

  Ok(ScanOutcome::Scanned {
    pages: last_page,
    processed,
  })
}
