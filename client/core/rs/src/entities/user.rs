use serde::{Deserialize, Serialize};
use typeshare::typeshare;

use crate::entities::I64;

/// A mirrored upstream account. Rows are created lazily, on the
/// first payload that mentions the user, and filled in as richer
/// payloads arrive.
#[typeshare]
#[derive(
  Debug, Clone, Default, PartialEq, Serialize, Deserialize,
)]
pub struct User {
  /// Stable upstream id.
  #[serde(rename = "_id")]
  pub id: I64,
  pub login: Option<String>,
  pub site_admin: Option<bool>,
  pub name: Option<String>,
  pub company: Option<String>,
  pub blog: Option<String>,
  pub location: Option<String>,
  pub email: Option<String>,
  pub hireable: Option<bool>,
  pub bio: Option<String>,
  pub public_repos_count: Option<I64>,
  pub public_gists_count: Option<I64>,
  pub followers_count: Option<I64>,
  pub following_count: Option<I64>,
  pub created_at: Option<I64>,
  pub updated_at: Option<I64>,
  /// Not on the upstream. Set by the repo scan finalizer, used to
  /// reap repos not re-seen during the latest scan.
  pub repos_last_scanned_at: Option<I64>,
  pub last_replicated_via_webhook_at: Option<I64>,
  pub last_replicated_via_api_at: Option<I64>,
}

crate::entities::replicated!(User);

impl User {
  pub fn new(id: I64) -> User {
    User {
      id,
      ..Default::default()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::entities::{Replicated, Via};

  #[test]
  fn last_replicated_at_is_greater_channel() {
    let mut user = User::new(1);
    assert_eq!(user.last_replicated_at(), i64::MIN);

    user.stamp_replicated(Via::Webhook, 100);
    assert_eq!(user.last_replicated_at(), 100);

    user.stamp_replicated(Via::Api, 50);
    assert_eq!(user.last_replicated_at(), 100);

    user.stamp_replicated(Via::Api, 150);
    assert_eq!(user.last_replicated_at(), 150);
  }
}
