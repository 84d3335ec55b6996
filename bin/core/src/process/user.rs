use database::{
  UnitOfWork, collections, mungos::mongodb::bson::doc,
};
use hubmirror_client::{
  entities::{Replicated, Via, user::User},
  error::ReplicationError,
};
use serde_json::Value;

use crate::{
  process::{
    Processed, SkipReason, is_stale, locate, set_bool, set_i64,
    set_str, set_timestamp, stage,
  },
  state::db_client,
};

pub async fn process_user(
  data: &Value,
  via: Via,
  fetched_at: i64,
  uow: &mut UnitOfWork,
  commit: bool,
) -> Result<Processed<User>, ReplicationError> {
  let user_id = data
    .get("id")
    .and_then(Value::as_i64)
    .ok_or_else(|| ReplicationError::missing("no user ID", data))?;

  let key = doc! { "_id": user_id };
  let existing =
    locate(collections::USERS, &db_client().users, &key, uow)
      .await?;
  let insert = existing.is_none();
  let mut user = existing.unwrap_or_else(|| User::new(user_id));

  if is_stale(&user, fetched_at) {
    return Ok(Processed::Skipped(SkipReason::Stale));
  }

  set_str(&mut user.login, data, "login");
  set_bool(&mut user.site_admin, data, "site_admin");
  set_str(&mut user.name, data, "name");
  set_str(&mut user.company, data, "company");
  set_str(&mut user.blog, data, "blog");
  set_str(&mut user.location, data, "location");
  set_str(&mut user.email, data, "email");
  set_bool(&mut user.hireable, data, "hireable");
  set_str(&mut user.bio, data, "bio");
  // Bare upstream counters are stored as `*_count`.
  set_i64(&mut user.public_repos_count, data, "public_repos");
  set_i64(&mut user.public_gists_count, data, "public_gists");
  set_i64(&mut user.followers_count, data, "followers");
  set_i64(&mut user.following_count, data, "following");
  set_timestamp(&mut user.created_at, data, "created_at");
  set_timestamp(&mut user.updated_at, data, "updated_at");

  user.stamp_replicated(via, fetched_at);
  stage(uow, collections::USERS, key, &user, insert)?;

  if commit {
    super::commit(uow).await?;
  }

  Ok(Processed::Wrote(user))
}
