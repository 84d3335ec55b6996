use std::time::Duration;

use hubmirror_client::{
  entities::mirror_timestamp, error::ReplicationError,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::Display;
use uuid::Uuid;

use crate::{
  config::core_config,
  scan,
  state::{task_statuses, upstream},
};

/// Execution context handed to every job. `eager` means the job
/// runs inline on the caller's task (inline endpoints, tests, the
/// `eager` config) -- rate limit failures then propagate instead
/// of rescheduling, per the upstream client contract.
#[derive(Debug, Clone, Copy)]
pub struct JobCtx {
  pub eager: bool,
}

impl JobCtx {
  pub fn queued() -> JobCtx {
    JobCtx {
      eager: core_config().eager,
    }
  }

  pub fn inline() -> JobCtx {
    JobCtx { eager: true }
  }
}

/// Every job the queue can carry. The variant name is the task
/// name, the fields are its arguments -- together they are the
/// `Describe()` half of the bridge contract.
#[derive(
  Debug, Clone, Serialize, Deserialize, Display, PartialEq,
)]
#[serde(tag = "type", content = "params")]
pub enum Task {
  SyncUser {
    username: String,
    children: bool,
    requestor_id: Option<i64>,
  },
  SyncRepository {
    owner: String,
    repo: String,
    children: bool,
    requestor_id: Option<i64>,
  },
  SyncIssue {
    owner: String,
    repo: String,
    number: i64,
    requestor_id: Option<i64>,
  },
  SyncLabel {
    owner: String,
    repo: String,
    name: String,
    requestor_id: Option<i64>,
  },
  SyncMilestone {
    owner: String,
    repo: String,
    number: i64,
    requestor_id: Option<i64>,
  },
  SyncRepositoryHook {
    owner: String,
    repo: String,
    hook_id: i64,
    requestor_id: Option<i64>,
  },
  SyncPullRequest {
    owner: String,
    repo: String,
    number: i64,
    children: bool,
    requestor_id: Option<i64>,
  },
  UserReposScan {
    username: String,
    #[serde(rename = "type")]
    listing: String,
    children: bool,
    requestor_id: Option<i64>,
    per_page: i64,
  },
  IssueScan {
    owner: String,
    repo: String,
    state: String,
    requestor_id: Option<i64>,
    per_page: i64,
  },
  LabelScan {
    owner: String,
    repo: String,
    requestor_id: Option<i64>,
    per_page: i64,
  },
  MilestoneScan {
    owner: String,
    repo: String,
    requestor_id: Option<i64>,
    per_page: i64,
  },
  PullRequestScan {
    owner: String,
    repo: String,
    state: String,
    children: bool,
    requestor_id: Option<i64>,
    per_page: i64,
  },
  HookScan {
    owner: String,
    repo: String,
    requestor_id: Option<i64>,
    per_page: i64,
  },
  FileScan {
    owner: String,
    repo: String,
    number: i64,
    requestor_id: Option<i64>,
    per_page: i64,
  },
}

impl Task {
  pub fn describe(&self) -> (String, Value) {
    let name = self.to_string();
    let args = serde_json::to_value(self)
      .ok()
      .and_then(|mut value| value.get_mut("params").map(Value::take))
      .unwrap_or_default();
    (name, args)
  }

  /// The `Run(ctx)` half of the bridge contract.
  pub async fn run(
    &self,
    ctx: JobCtx,
  ) -> Result<Value, ReplicationError> {
    match self.clone() {
      Task::SyncUser {
        username,
        children,
        requestor_id,
      } => {
        scan::user::sync_user(
          &username,
          children,
          requestor_id,
          ctx,
        )
        .await
        .map(result_json)
      }
      Task::SyncRepository {
        owner,
        repo,
        children,
        requestor_id,
      } => scan::repository::sync_repository(
        &owner,
        &repo,
        children,
        requestor_id,
        ctx,
      )
      .await
      .map(result_json),
      Task::SyncIssue {
        owner,
        repo,
        number,
        requestor_id,
      } => {
        scan::issue::sync_issue(
          &owner,
          &repo,
          number,
          requestor_id,
          ctx,
        )
        .await
        .map(result_json)
      }
      Task::SyncLabel {
        owner,
        repo,
        name,
        requestor_id,
      } => scan::label::sync_label(
        &owner,
        &repo,
        &name,
        requestor_id,
        ctx,
      )
      .await
      .map(result_json),
      Task::SyncMilestone {
        owner,
        repo,
        number,
        requestor_id,
      } => scan::milestone::sync_milestone(
        &owner,
        &repo,
        number,
        requestor_id,
        ctx,
      )
      .await
      .map(result_json),
      Task::SyncRepositoryHook {
        owner,
        repo,
        hook_id,
        requestor_id,
      } => scan::repository_hook::sync_repository_hook(
        &owner,
        &repo,
        hook_id,
        requestor_id,
        ctx,
      )
      .await
      .map(result_json),
      Task::SyncPullRequest {
        owner,
        repo,
        number,
        children,
        requestor_id,
      } => scan::pull_request::sync_pull_request(
        &owner,
        &repo,
        number,
        children,
        requestor_id,
        ctx,
      )
      .await
      .map(result_json),
      Task::UserReposScan {
        username,
        listing,
        children,
        requestor_id,
        per_page,
      } => {
        scan::repository::spawn_page_tasks_for_user_repositories(
          &username,
          &listing,
          children,
          requestor_id,
          per_page,
          ctx,
        )
        .await
        .map(result_json)
      }
      Task::IssueScan {
        owner,
        repo,
        state,
        requestor_id,
        per_page,
      } => scan::issue::spawn_page_tasks_for_issues(
        &owner,
        &repo,
        &state,
        requestor_id,
        per_page,
        ctx,
      )
      .await
      .map(result_json),
      Task::LabelScan {
        owner,
        repo,
        requestor_id,
        per_page,
      } => scan::label::spawn_page_tasks_for_labels(
        &owner,
        &repo,
        requestor_id,
        per_page,
        ctx,
      )
      .await
      .map(result_json),
      Task::MilestoneScan {
        owner,
        repo,
        requestor_id,
        per_page,
      } => scan::milestone::spawn_page_tasks_for_milestones(
        &owner,
        &repo,
        requestor_id,
        per_page,
        ctx,
      )
      .await
      .map(result_json),
      Task::PullRequestScan {
        owner,
        repo,
        state,
        children,
        requestor_id,
        per_page,
      } => scan::pull_request::spawn_page_tasks_for_pull_requests(
        &owner,
        &repo,
        &state,
        children,
        requestor_id,
        per_page,
        ctx,
      )
      .await
      .map(result_json),
      Task::HookScan {
        owner,
        repo,
        requestor_id,
        per_page,
      } => {
        scan::repository_hook::spawn_page_tasks_for_repository_hooks(
          &owner,
          &repo,
          requestor_id,
          per_page,
          ctx,
        )
        .await
        .map(result_json)
      }
      Task::FileScan {
        owner,
        repo,
        number,
        requestor_id,
        per_page,
      } => {
        scan::pull_request_file::spawn_page_tasks_for_pull_request_files(
          &owner,
          &repo,
          number,
          requestor_id,
          per_page,
          ctx,
        )
        .await
        .map(result_json)
      }
    }
  }
}

fn result_json(result: impl Serialize) -> Value {
  serde_json::to_value(result).unwrap_or_default()
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskState {
  Pending,
  Running,
  Retrying {
    /// POSIX epoch seconds of the next attempt, when known.
    eta: Option<i64>,
  },
  Success {
    result: Value,
  },
  Failure {
    error: String,
  },
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskStatus {
  pub task: String,
  pub args: Value,
  #[serde(flatten)]
  pub state: TaskState,
  pub updated_at: i64,
}

/// Finished task statuses are kept this long for the status
/// endpoint, then aged out to bound the registry.
const KEEP_STATUS_FOR_MS: i64 = 24 * 60 * 60 * 1000;

/// Enqueue a job, immediately returning the task id the status
/// endpoint tracks. With `eager` configured the job instead runs
/// to completion on this task before returning.
// Explicitly boxed: jobs spawning child jobs make enqueue -> run ->
// enqueue a recursive future otherwise, which also defeats the
// compiler's auto-trait (Send) inference across the cycle.
pub fn enqueue(
  task: Task,
) -> std::pin::Pin<Box<dyn Future<Output = Uuid> + Send>> {
  Box::pin(async move {
    let cutoff = mirror_timestamp() - KEEP_STATUS_FOR_MS;
    task_statuses()
      .retain(|_, status| {
        !matches!(
          status.state,
          TaskState::Success { .. } | TaskState::Failure { .. }
        ) || status.updated_at >= cutoff
      })
      .await;

    let id = Uuid::new_v4();
    set_status(id, &task, TaskState::Pending).await;
    let ctx = JobCtx::queued();
    let job: std::pin::Pin<
      Box<dyn Future<Output = ()> + Send>,
    > = Box::pin(run_task(id, task, ctx));
    if ctx.eager {
      job.await;
    } else {
      tokio::spawn(job);
    }
    id
  })
}

async fn run_task(id: Uuid, task: Task, ctx: JobCtx) {
  let (name, _) = task.describe();
  set_status(id, &task, TaskState::Running).await;
  let mut attempt: u32 = 0;
  loop {
    match task.run(ctx).await {
      Ok(result) => {
        debug!("task {name} ({id}) complete");
        set_status(id, &task, TaskState::Success { result }).await;
        return;
      }
      Err(ReplicationError::RateLimited { reset, msg })
        if !ctx.eager =>
      {
        warn!(
          "task {name} ({id}) rate limited | retrying at epoch {reset:?} | {msg}"
        );
        set_status(id, &task, TaskState::Retrying { eta: reset })
          .await;
        sleep_until_reset(reset).await;
      }
      Err(ReplicationError::Integrity { msg }) if !ctx.eager => {
        attempt += 1;
        let backoff = integrity_backoff(attempt);
        warn!(
          "task {name} ({id}) lost an insert race | retrying in {backoff:?} | {msg}"
        );
        let eta = chrono::Utc::now().timestamp()
          + backoff.as_secs() as i64;
        set_status(
          id,
          &task,
          TaskState::Retrying { eta: Some(eta) },
        )
        .await;
        tokio::time::sleep(backoff).await;
      }
      Err(e) => {
        warn!("task {name} ({id}) failed | {e:#}");
        set_status(
          id,
          &task,
          TaskState::Failure {
            error: format!("{e:#}"),
          },
        )
        .await;
        return;
      }
    }
  }
}

async fn set_status(id: Uuid, task: &Task, state: TaskState) {
  let (name, args) = task.describe();
  task_statuses()
    .insert(
      id,
      TaskStatus {
        task: name,
        args,
        state,
        updated_at: mirror_timestamp(),
      },
    )
    .await;
}

/// Backed off but unbounded: an insert race always resolves once
/// the winning row is visible.
fn integrity_backoff(attempt: u32) -> Duration {
  Duration::from_secs((1u64 << attempt.min(6)).min(60))
}

/// GET a path with the queue's retry contract applied: a rate
/// limited fetch sleeps to the upstream's declared reset instant
/// and goes again, unless running inline, where it propagates for
/// the HTTP layer to translate into a 503.
pub async fn fetch_json<T: serde::de::DeserializeOwned>(
  path: &str,
  requestor_id: Option<i64>,
  ctx: JobCtx,
) -> Result<T, ReplicationError> {
  loop {
    match upstream().get_json(path, requestor_id).await {
      Err(ReplicationError::RateLimited { reset, msg })
        if !ctx.eager =>
      {
        warn!(
          "rate limited | retrying {path} at epoch {reset:?} | {msg}"
        );
        sleep_until_reset(reset).await;
      }
      other => return other,
    }
  }
}

/// HEAD with the same retry contract as [fetch_json].
pub async fn head(
  path: &str,
  requestor_id: Option<i64>,
  ctx: JobCtx,
) -> Result<reqwest::Response, ReplicationError> {
  loop {
    match upstream().head(path, requestor_id).await {
      Err(ReplicationError::RateLimited { reset, msg })
        if !ctx.eager =>
      {
        warn!(
          "rate limited | retrying HEAD {path} at epoch {reset:?} | {msg}"
        );
        sleep_until_reset(reset).await;
      }
      other => return other,
    }
  }
}

/// Sleep to the declared reset instant. An upstream that declared
/// no reset gets a flat minute.
async fn sleep_until_reset(reset: Option<i64>) {
  let now = chrono::Utc::now().timestamp();
  let wait = reset.map(|reset| (reset - now).max(0)).unwrap_or(60);
  tokio::time::sleep(Duration::from_secs(wait as u64)).await;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn describe_splits_name_and_args() {
    let task = Task::SyncPullRequest {
      owner: "octocat".into(),
      repo: "Hello-World".into(),
      number: 1,
      children: false,
      requestor_id: None,
    };
    let (name, args) = task.describe();
    assert_eq!(name, "SyncPullRequest");
    assert_eq!(args["owner"], "octocat");
    assert_eq!(args["number"], 1);
  }

  #[test]
  fn tasks_round_trip_through_json() {
    let task = Task::UserReposScan {
      username: "unoju".into(),
      listing: "owner".into(),
      children: true,
      requestor_id: Some(777449),
      per_page: 100,
    };
    let encoded = serde_json::to_value(&task).unwrap();
    assert_eq!(encoded["type"], "UserReposScan");
    assert_eq!(encoded["params"]["type"], "owner");
    let decoded: Task = serde_json::from_value(encoded).unwrap();
    assert_eq!(decoded, task);
  }

  #[test]
  fn integrity_backoff_caps_out() {
    assert_eq!(integrity_backoff(1), Duration::from_secs(2));
    assert_eq!(integrity_backoff(3), Duration::from_secs(8));
    assert_eq!(integrity_backoff(20), Duration::from_secs(60));
  }
}
