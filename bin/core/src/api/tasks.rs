use axum::{
  Json, Router,
  extract::Path,
  http::StatusCode,
  response::{IntoResponse, Response},
  routing::get,
};
use serde_json::json;
use uuid::Uuid;

use crate::state::task_statuses;

/// Task status endpoint, pointed at by the `Location` header of
/// every 202 from the load surface.
pub fn router() -> Router {
  Router::new().route("/status/{task_id}", get(status))
}

async fn status(Path(task_id): Path<Uuid>) -> Response {
  match task_statuses().get(&task_id).await {
    Some(status) => Json(status).into_response(),
    None => (
      StatusCode::NOT_FOUND,
      Json(json!({ "error": "unknown task" })),
    )
      .into_response(),
  }
}
