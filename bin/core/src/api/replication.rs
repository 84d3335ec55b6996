use anyhow::Context;
use axum::{
  Json, Router,
  extract::rejection::JsonRejection,
  http::{HeaderMap, StatusCode},
  response::{IntoResponse, Response},
  routing::post,
};
use database::{UnitOfWork, mungos::mongodb::bson::doc};
use hubmirror_client::{
  entities::{
    Via, mirror_timestamp, pull_request::PullRequest,
  },
  error::ReplicationError,
};
use serde_json::{Value, json};

use crate::{
  api::error_response,
  process::{
    Processed, process_issue, process_pull_request,
    process_repository,
  },
  scan::{self, PER_PAGE_DEFAULT},
  schedule::{self, JobCtx, Task},
  state::db_client,
};

/// Webhook intake. The upstream pushes every event here with the
/// event name in the `X-Github-Event` header; the per-event paths
/// are the legacy routes older hook registrations still point at.
pub fn router() -> Router {
  Router::new()
    .route("/", post(main))
    .route("/repository", post(repository))
    .route("/issue", post(issue))
    .route("/pull_request", post(pull_request))
}

/// Below this many changed files, a pull request event refreshes
/// the file set inline; at or above it, a file scan is spawned.
const INLINE_FILE_SYNC_MAX: i64 = 100;

type Payload = Result<Json<Value>, JsonRejection>;

fn event_name(headers: &HeaderMap) -> String {
  headers
    .get("X-Github-Event")
    .and_then(|value| value.to_str().ok())
    .unwrap_or_default()
    .to_lowercase()
}

/// The ping event is answered before any payload handling.
/// Everything else must carry a JSON body.
fn ping_or_payload(
  headers: &HeaderMap,
  payload: Payload,
) -> Result<Value, Response> {
  if event_name(headers) == "ping" {
    return Err(
      Json(json!({ "message": "pong" })).into_response(),
    );
  }
  match payload {
    Ok(Json(payload)) => Ok(payload),
    Err(_) => Err(
      (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "no payload" })),
      )
        .into_response(),
    ),
  }
}

async fn main(headers: HeaderMap, payload: Payload) -> Response {
  let payload = match ping_or_payload(&headers, payload) {
    Ok(payload) => payload,
    Err(response) => return response,
  };
  let event = event_name(&headers);
  match event.as_str() {
    "issues" => issue_event(&payload).await,
    "pull_request" => pull_request_event(&payload).await,
    "repository" => repository_event(&payload).await,
    _ => (
      StatusCode::BAD_REQUEST,
      Json(json!({ "error": "unhandled event", "event": event })),
    )
      .into_response(),
  }
}

async fn repository(
  headers: HeaderMap,
  payload: Payload,
) -> Response {
  match ping_or_payload(&headers, payload) {
    Ok(payload) => repository_event(&payload).await,
    Err(response) => response,
  }
}

async fn issue(headers: HeaderMap, payload: Payload) -> Response {
  match ping_or_payload(&headers, payload) {
    Ok(payload) => issue_event(&payload).await,
    Err(response) => response,
  }
}

async fn pull_request(
  headers: HeaderMap,
  payload: Payload,
) -> Response {
  match ping_or_payload(&headers, payload) {
    Ok(payload) => pull_request_event(&payload).await,
    Err(response) => response,
  }
}

fn success() -> Response {
  Json(json!({ "message": "success" })).into_response()
}

fn stale(reason: impl std::fmt::Display) -> Response {
  Json(json!({ "message": reason.to_string() })).into_response()
}

async fn repository_event(payload: &Value) -> Response {
  let Some(repo_data) =
    payload.get("repository").filter(|data| !data.is_null())
  else {
    return (
      StatusCode::BAD_REQUEST,
      Json(json!({ "error": "no repository in payload" })),
    )
      .into_response();
  };
  let mut uow = UnitOfWork::default();
  match process_repository(
    repo_data,
    Via::Webhook,
    mirror_timestamp(),
    &mut uow,
    true,
    None,
  )
  .await
  {
    Ok(Processed::Wrote(_)) => success(),
    Ok(Processed::Skipped(reason)) => stale(reason),
    Err(e) => error_response(&e),
  }
}

async fn issue_event(payload: &Value) -> Response {
  let Some(issue_data) =
    payload.get("issue").filter(|data| !data.is_null())
  else {
    return (
      StatusCode::BAD_REQUEST,
      Json(json!({ "error": "no issue in payload" })),
    )
      .into_response();
  };
  let mut uow = UnitOfWork::default();
  match process_issue(
    issue_data,
    Via::Webhook,
    mirror_timestamp(),
    &mut uow,
    true,
  )
  .await
  {
    Ok(Processed::Wrote(_)) => success(),
    Ok(Processed::Skipped(reason)) => stale(reason),
    Err(e) => error_response(&e),
  }
}

async fn pull_request_event(payload: &Value) -> Response {
  let Some(pr_data) =
    payload.get("pull_request").filter(|data| !data.is_null())
  else {
    return (
      StatusCode::BAD_REQUEST,
      Json(json!({ "error": "no pull_request in payload" })),
    )
      .into_response();
  };
  let mut uow = UnitOfWork::default();
  let pr = match process_pull_request(
    pr_data,
    Via::Webhook,
    mirror_timestamp(),
    &mut uow,
    true,
  )
  .await
  {
    Ok(Processed::Wrote(pr)) => pr,
    Ok(Processed::Skipped(reason)) => return stale(reason),
    Err(e) => return error_response(&e),
  };

  // Refresh the file set too.
  if let Err(e) = refresh_files(&pr).await {
    return error_response(&e);
  }
  success()
}

/// Small file sets are replaced inline: the stale rows are
/// deleted first and the refill runs on this same task, so the
/// delete is ordered before any reader of the refilled set. Large
/// sets go through a spawned file scan, whose reaping handles
/// removal instead.
async fn refresh_files(
  pr: &PullRequest,
) -> Result<(), ReplicationError> {
  let (Some(number), Some(base_repo_id)) =
    (pr.number, pr.base_repo_id)
  else {
    return Ok(());
  };
  let repo = db_client()
    .repos
    .find_one(doc! { "_id": base_repo_id })
    .await
    .context("failed to query base repo for file sync")?;
  let Some(repo) = repo else {
    return Ok(());
  };
  let (Some(owner), Some(name)) = (repo.owner_login, repo.name)
  else {
    return Ok(());
  };

  if pr.changed_files.unwrap_or(0) < INLINE_FILE_SYNC_MAX {
    db_client()
      .pull_request_files
      .delete_many(doc! { "pull_request_id": pr.id })
      .await
      .context("failed to clear pull request file set")?;
    scan::pull_request_file::sync_page_of_pull_request_files(
      &owner,
      &name,
      number,
      Some(pr.id),
      None,
      PER_PAGE_DEFAULT,
      1,
      JobCtx::inline(),
    )
    .await?;
  } else {
    schedule::enqueue(Task::FileScan {
      owner,
      repo: name,
      number,
      requestor_id: None,
      per_page: PER_PAGE_DEFAULT,
    })
    .await;
  }
  Ok(())
}
