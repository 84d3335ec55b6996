use serde_json::Value;
use thiserror::Error;

/// The replication error taxonomy. These are the *failures* of the
/// pipeline -- "already fresh enough" and "documented skip" are not
/// failures and travel in the processors' outcome sum instead.
#[derive(Debug, Error)]
pub enum ReplicationError {
  /// A required primary key or url field is absent from a payload.
  /// Carries the offending payload. 400 on the webhook surface,
  /// logged on scanners.
  #[error("missing data | {msg}")]
  MissingData { msg: String, payload: Value },

  /// Upstream 404, or a payload referencing a repo the mirror has
  /// never seen. 404 on inline endpoints, terminates the task when
  /// asynchronous.
  #[error("not found | {msg}")]
  NotFound { msg: String },

  /// The upstream declared the per-token window exhausted.
  /// Retry-scheduled at `reset` when asynchronous; surfaces as 503
  /// when inline.
  #[error("upstream rate limited | {msg}")]
  RateLimited {
    /// POSIX epoch seconds at which the window resets, when the
    /// upstream declared one.
    reset: Option<i64>,
    msg: String,
  },

  /// Multiple rows matched a supposedly-unique lookup. An integrity
  /// bug, fatal for the job.
  #[error("database error | {msg}")]
  Database { msg: String },

  /// Two workers inserted the same new row simultaneously. The
  /// retry harness re-attempts with the winner's row now visible.
  #[error("concurrent insert on unique key | {msg}")]
  Integrity { msg: String },

  /// Non-success upstream response that is not a 404 or a rate
  /// limit. Task failure, retried per the queue policy.
  #[error("upstream error | status {status} | {body}")]
  Upstream { status: u16, body: String },

  /// Anything else (database connectivity, serialization, ...).
  #[error(transparent)]
  Internal(#[from] anyhow::Error),
}

impl ReplicationError {
  pub fn missing(
    msg: impl Into<String>,
    payload: &Value,
  ) -> ReplicationError {
    ReplicationError::MissingData {
      msg: msg.into(),
      payload: payload.clone(),
    }
  }

  pub fn not_found(msg: impl Into<String>) -> ReplicationError {
    ReplicationError::NotFound { msg: msg.into() }
  }
}
