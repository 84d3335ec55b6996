use anyhow::Context;
use database::{UnitOfWork, mungos::mongodb::bson::doc};
use hubmirror_client::{
  entities::{Via, mirror_timestamp},
  error::ReplicationError,
};
use serde_json::{Value, json};

use crate::{
  process::{Processed, process_user},
  scan::{PER_PAGE_DEFAULT, SyncOutcome},
  schedule::{self, JobCtx, Task},
  state::db_client,
};

pub async fn sync_user(
  username: &str,
  children: bool,
  requestor_id: Option<i64>,
  ctx: JobCtx,
) -> Result<SyncOutcome, ReplicationError> {
  let mut user_path = format!("/users/{username}");
  if let Some(requestor_id) = requestor_id {
    let requestor = db_client()
      .users
      .find_one(doc! { "_id": requestor_id })
      .await
      .context("failed to query users for requestor")?;
    if requestor
      .is_some_and(|r| r.login.as_deref() == Some(username))
    {
      // The authenticated-user endpoint also serves private
      // profile fields.
      user_path = String::from("/user");
    }
  }

  let data: Value =
    match schedule::fetch_json(&user_path, requestor_id, ctx).await
    {
      Err(ReplicationError::NotFound { .. }) => {
        return Err(ReplicationError::not_found(format!(
          "User @{username} not found"
        )));
      }
      other => other?,
    };

  let mut uow = UnitOfWork::default();
  let processed = process_user(
    &data,
    Via::Api,
    mirror_timestamp(),
    &mut uow,
    true,
  )
  .await?;

  if children {
    schedule::enqueue(Task::UserReposScan {
      username: username.to_string(),
      listing: String::from("owner"),
      children,
      requestor_id,
      per_page: PER_PAGE_DEFAULT,
    })
    .await;
  }

  Ok(match processed {
    Processed::Wrote(user) => SyncOutcome::Wrote {
      key: json!(user.id),
    },
    Processed::Skipped(reason) => SyncOutcome::Skipped {
      reason: reason.to_string(),
    },
  })
}
