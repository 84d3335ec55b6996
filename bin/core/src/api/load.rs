use anyhow::Context;
use axum::{
  Json, Router,
  extract::{Path, Query, Request},
  http::{HeaderValue, StatusCode, header},
  middleware::{self, Next},
  response::{IntoResponse, Response},
  routing::post,
};
use database::mungos::mongodb::bson::doc;
use hubmirror_client::error::ReplicationError;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
  api::{attach_rate_limit_headers, error_response},
  process::user_by_login,
  scan::PER_PAGE_DEFAULT,
  schedule::{self, JobCtx, Task},
  state::db_client,
};

pub fn router() -> Router {
  Router::new()
    .route("/repos/{owner}/{repo}", post(repository))
    .route("/repos/{owner}/{repo}/pulls", post(pull_requests))
    .route(
      "/repos/{owner}/{repo}/pulls/{number}",
      post(pull_request),
    )
    .route(
      "/repos/{owner}/{repo}/pulls/{number}/files",
      post(pull_request_files),
    )
    .route("/repos/{owner}/{repo}/issues", post(issues))
    .route("/repos/{owner}/{repo}/issues/{number}", post(issue))
    .route("/repos/{owner}/{repo}/labels", post(labels))
    .route("/repos/{owner}/{repo}/labels/{name}", post(label))
    .route("/repos/{owner}/{repo}/milestones", post(milestones))
    .route(
      "/repos/{owner}/{repo}/milestones/{number}",
      post(milestone),
    )
    .route("/repos/{owner}/{repo}/hooks", post(hooks))
    .route("/repos/{owner}/{repo}/hooks/{hook_id}", post(hook))
    .route("/user/repos", post(own_repositories))
    .route("/user/{username}/repos", post(user_repositories))
    .layer(middleware::from_fn(rate_limit_echo))
}

/// Every load response carries the latest upstream rate limit
/// headers.
async fn rate_limit_echo(request: Request, next: Next) -> Response {
  let mut response = next.run(request).await;
  attach_rate_limit_headers(&mut response);
  response
}

#[derive(Debug, Default, Deserialize)]
struct LoadQuery {
  /// Run the job synchronously on this request.
  #[serde(default)]
  inline: bool,
  /// Cascade into dependent scans.
  #[serde(default)]
  children: bool,
  /// Listing state filter, proxied to the upstream.
  state: Option<String>,
  /// Repo listing type, proxied to the upstream.
  #[serde(rename = "type")]
  listing: Option<String>,
  per_page: Option<i64>,
  /// Requestor identity hint; stands in for the session auth the
  /// front door would normally provide.
  as_user: Option<i64>,
}

impl LoadQuery {
  fn per_page(&self) -> i64 {
    self.per_page.unwrap_or(PER_PAGE_DEFAULT)
  }
}

/// Either run the job now (`inline=true`) or queue it and point
/// the caller at the status endpoint.
async fn dispatch(inline: bool, task: Task) -> Response {
  if inline {
    match task.run(JobCtx::inline()).await {
      Ok(result) => (
        StatusCode::OK,
        Json(json!({ "message": "success", "result": result })),
      )
        .into_response(),
      Err(e) => error_response(&e),
    }
  } else {
    queued_response(schedule::enqueue(task).await)
  }
}

fn queued_response(task_id: Uuid) -> Response {
  let mut response = (
    StatusCode::ACCEPTED,
    Json(json!({ "message": "queued" })),
  )
    .into_response();
  if let Ok(location) =
    HeaderValue::from_str(&format!("/tasks/status/{task_id}"))
  {
    response
      .headers_mut()
      .insert(header::LOCATION, location);
  }
  response
}

async fn repository(
  Path((owner, repo)): Path<(String, String)>,
  Query(q): Query<LoadQuery>,
) -> Response {
  dispatch(
    q.inline,
    Task::SyncRepository {
      owner,
      repo,
      children: q.children,
      requestor_id: q.as_user,
    },
  )
  .await
}

async fn pull_requests(
  Path((owner, repo)): Path<(String, String)>,
  Query(q): Query<LoadQuery>,
) -> Response {
  let state =
    q.state.clone().unwrap_or_else(|| String::from("open"));
  dispatch(
    q.inline,
    Task::PullRequestScan {
      owner,
      repo,
      state,
      children: q.children,
      requestor_id: q.as_user,
      per_page: q.per_page(),
    },
  )
  .await
}

async fn pull_request(
  Path((owner, repo, number)): Path<(String, String, i64)>,
  Query(q): Query<LoadQuery>,
) -> Response {
  dispatch(
    q.inline,
    Task::SyncPullRequest {
      owner,
      repo,
      number,
      children: q.children,
      requestor_id: q.as_user,
    },
  )
  .await
}

async fn pull_request_files(
  Path((owner, repo, number)): Path<(String, String, i64)>,
  Query(q): Query<LoadQuery>,
) -> Response {
  dispatch(
    q.inline,
    Task::FileScan {
      owner,
      repo,
      number,
      requestor_id: q.as_user,
      per_page: q.per_page(),
    },
  )
  .await
}

async fn issues(
  Path((owner, repo)): Path<(String, String)>,
  Query(q): Query<LoadQuery>,
) -> Response {
  let state =
    q.state.clone().unwrap_or_else(|| String::from("open"));
  dispatch(
    q.inline,
    Task::IssueScan {
      owner,
      repo,
      state,
      requestor_id: q.as_user,
      per_page: q.per_page(),
    },
  )
  .await
}

async fn issue(
  Path((owner, repo, number)): Path<(String, String, i64)>,
  Query(q): Query<LoadQuery>,
) -> Response {
  dispatch(
    q.inline,
    Task::SyncIssue {
      owner,
      repo,
      number,
      requestor_id: q.as_user,
    },
  )
  .await
}

async fn labels(
  Path((owner, repo)): Path<(String, String)>,
  Query(q): Query<LoadQuery>,
) -> Response {
  dispatch(
    q.inline,
    Task::LabelScan {
      owner,
      repo,
      requestor_id: q.as_user,
      per_page: q.per_page(),
    },
  )
  .await
}

async fn label(
  Path((owner, repo, name)): Path<(String, String, String)>,
  Query(q): Query<LoadQuery>,
) -> Response {
  dispatch(
    q.inline,
    Task::SyncLabel {
      owner,
      repo,
      name,
      requestor_id: q.as_user,
    },
  )
  .await
}

async fn milestones(
  Path((owner, repo)): Path<(String, String)>,
  Query(q): Query<LoadQuery>,
) -> Response {
  dispatch(
    q.inline,
    Task::MilestoneScan {
      owner,
      repo,
      requestor_id: q.as_user,
      per_page: q.per_page(),
    },
  )
  .await
}

async fn milestone(
  Path((owner, repo, number)): Path<(String, String, i64)>,
  Query(q): Query<LoadQuery>,
) -> Response {
  dispatch(
    q.inline,
    Task::SyncMilestone {
      owner,
      repo,
      number,
      requestor_id: q.as_user,
    },
  )
  .await
}

async fn hooks(
  Path((owner, repo)): Path<(String, String)>,
  Query(q): Query<LoadQuery>,
) -> Response {
  dispatch(
    q.inline,
    Task::HookScan {
      owner,
      repo,
      requestor_id: q.as_user,
      per_page: q.per_page(),
    },
  )
  .await
}

async fn hook(
  Path((owner, repo, hook_id)): Path<(String, String, i64)>,
  Query(q): Query<LoadQuery>,
) -> Response {
  dispatch(
    q.inline,
    Task::SyncRepositoryHook {
      owner,
      repo,
      hook_id,
      requestor_id: q.as_user,
    },
  )
  .await
}

/// Scan the requestor's own repositories. The requestor identity
/// hint is required here -- it selects both the token and the
/// user whose repo set is scanned.
async fn own_repositories(
  Query(q): Query<LoadQuery>,
) -> Response {
  let Some(user_id) = q.as_user else {
    return (
      StatusCode::BAD_REQUEST,
      Json(json!({ "error": "as_user is required" })),
    )
      .into_response();
  };
  let user = match db_client()
    .users
    .find_one(doc! { "_id": user_id })
    .await
    .context("failed to query users for requestor")
  {
    Ok(user) => user,
    Err(e) => {
      return error_response(&ReplicationError::Internal(e));
    }
  };
  let Some(login) = user.and_then(|user| user.login) else {
    return error_response(&ReplicationError::not_found(format!(
      "User {user_id} not loaded in the mirror"
    )));
  };
  let listing =
    q.listing.clone().unwrap_or_else(|| String::from("all"));
  dispatch(
    q.inline,
    Task::UserReposScan {
      username: login,
      listing,
      children: q.children,
      requestor_id: q.as_user,
      per_page: q.per_page(),
    },
  )
  .await
}

async fn user_repositories(
  Path(username): Path<String>,
  Query(q): Query<LoadQuery>,
) -> Response {
  // A user the mirror has never seen gets a sync queued first, so
  // the scan finalizer has a row to stamp.
  match user_by_login(&username).await {
    Ok(Some(_)) => {}
    Ok(None) => {
      schedule::enqueue(Task::SyncUser {
        username: username.clone(),
        children: false,
        requestor_id: q.as_user,
      })
      .await;
    }
    Err(e) => return error_response(&e),
  }
  let listing =
    q.listing.clone().unwrap_or_else(|| String::from("owner"));
  dispatch(
    q.inline,
    Task::UserReposScan {
      username,
      listing,
      children: q.children,
      requestor_id: q.as_user,
      per_page: q.per_page(),
    },
  )
  .await
}
