use axum::{
  Json, Router,
  http::{HeaderName, HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
  routing::get,
};
use hubmirror_client::error::ReplicationError;
use serde_json::json;

use crate::{config::cors_layer, state::rate_limit_tracker};

mod load;
mod replication;
mod tasks;

pub fn app() -> Router {
  Router::new()
    .route("/version", get(|| async { env!("CARGO_PKG_VERSION") }))
    .nest("/replication", replication::router())
    .nest("/tasks", tasks::router())
    .merge(load::router())
    .layer(cors_layer())
}

/// Echo the most recently observed upstream rate limit window on
/// a response, so mirror clients can see the budget their loads
/// are drawing down.
pub fn attach_rate_limit_headers(response: &mut Response) {
  let window = rate_limit_tracker().current();
  let headers = response.headers_mut();
  if let Some(limit) = window.limit {
    headers.insert(
      HeaderName::from_static(rate_limit::LIMIT_HEADER),
      HeaderValue::from(limit),
    );
  }
  if let Some(remaining) = window.remaining {
    headers.insert(
      HeaderName::from_static(rate_limit::REMAINING_HEADER),
      HeaderValue::from(remaining),
    );
  }
  if let Some(reset) = window.reset {
    headers.insert(
      HeaderName::from_static(rate_limit::RESET_HEADER),
      HeaderValue::from(reset),
    );
  }
}

/// Translate a replication failure into its HTTP shape.
pub fn error_response(e: &ReplicationError) -> Response {
  match e {
    ReplicationError::MissingData { msg, payload } => (
      StatusCode::BAD_REQUEST,
      Json(json!({ "error": msg, "obj": payload })),
    )
      .into_response(),
    ReplicationError::NotFound { msg } => (
      StatusCode::NOT_FOUND,
      Json(json!({ "message": msg })),
    )
      .into_response(),
    ReplicationError::RateLimited { reset, msg } => {
      rate_limited_response(*reset, msg)
    }
    ReplicationError::Upstream { status, body } => (
      StatusCode::BAD_GATEWAY,
      Json(json!({
        "error":
          format!("upstream error | status {status} | {body}")
      })),
    )
      .into_response(),
    ReplicationError::Database { msg }
    | ReplicationError::Integrity { msg } => (
      StatusCode::INTERNAL_SERVER_ERROR,
      Json(json!({ "error": msg })),
    )
      .into_response(),
    ReplicationError::Internal(e) => (
      StatusCode::INTERNAL_SERVER_ERROR,
      Json(json!({ "error": format!("{e:#}") })),
    )
      .into_response(),
  }
}

/// 503 with the upstream's message, a human wait hint, and the
/// rate limit headers echoed.
pub fn rate_limited_response(
  reset: Option<i64>,
  upstream_msg: &str,
) -> Response {
  let now = chrono::Utc::now().timestamp();
  let wait = reset.map(|reset| (reset - now).max(0)).unwrap_or(0);
  let unit = if wait == 1 { "second" } else { "seconds" };
  let mut response = (
    StatusCode::SERVICE_UNAVAILABLE,
    Json(json!({
      "error": format!("{upstream_msg} Try again in {wait} {unit}.")
    })),
  )
    .into_response();
  response
    .headers_mut()
    .insert(header::RETRY_AFTER, HeaderValue::from(wait));
  attach_rate_limit_headers(&mut response);
  response
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn missing_data_is_400() {
    let e = ReplicationError::missing(
      "no issue ID",
      &json!({ "number": 1 }),
    );
    assert_eq!(
      error_response(&e).status(),
      StatusCode::BAD_REQUEST
    );
  }

  #[test]
  fn not_found_is_404() {
    let e = ReplicationError::not_found(
      "Repo octocat/Hello-World not found",
    );
    assert_eq!(error_response(&e).status(), StatusCode::NOT_FOUND);
  }

  #[test]
  fn rate_limited_is_503_with_wait() {
    let reset = chrono::Utc::now().timestamp() + 60;
    let e = ReplicationError::RateLimited {
      reset: Some(reset),
      msg: String::from("API rate limit exceeded."),
    };
    let response = error_response(&e);
    assert_eq!(
      response.status(),
      StatusCode::SERVICE_UNAVAILABLE
    );
    let retry_after: i64 = response
      .headers()
      .get(header::RETRY_AFTER)
      .unwrap()
      .to_str()
      .unwrap()
      .parse()
      .unwrap();
    assert!((59..=60).contains(&retry_after));
  }

  #[test]
  fn integrity_and_database_are_500() {
    let e = ReplicationError::Integrity {
      msg: String::from("E11000 duplicate key"),
    };
    assert_eq!(
      error_response(&e).status(),
      StatusCode::INTERNAL_SERVER_ERROR
    );
    let e = ReplicationError::Database {
      msg: String::from("Repo a/b found multiple times!"),
    };
    assert_eq!(
      error_response(&e).status(),
      StatusCode::INTERNAL_SERVER_ERROR
    );
  }
}
