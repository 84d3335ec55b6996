use serde::{Deserialize, Serialize};
use typeshare::typeshare;

use crate::entities::I64;

/// A mirrored issue.
#[typeshare]
#[derive(
  Debug, Clone, Default, PartialEq, Serialize, Deserialize,
)]
pub struct Issue {
  /// Stable upstream id.
  #[serde(rename = "_id")]
  pub id: I64,
  pub repo_id: Option<I64>,
  pub number: Option<I64>,
  pub state: Option<String>,
  pub title: Option<String>,
  pub body: Option<String>,
  pub user_id: Option<I64>,
  pub user_login: Option<String>,
  pub assignee_id: Option<I64>,
  pub assignee_login: Option<String>,
  pub closed_by_id: Option<I64>,
  pub closed_by_login: Option<String>,
  /// Milestones are keyed (repo_id, number) within the same repo.
  pub milestone_number: Option<I64>,
  /// Names of the [IssueLabel] rows attached to this issue, within
  /// the same repo. Replaced as a set: an empty list in a payload
  /// clears all labels.
  ///
  /// [IssueLabel]: crate::entities::label::IssueLabel
  pub labels: Vec<String>,
  pub comments_count: Option<I64>,
  pub created_at: Option<I64>,
  pub updated_at: Option<I64>,
  pub closed_at: Option<I64>,
  pub last_replicated_via_webhook_at: Option<I64>,
  pub last_replicated_via_api_at: Option<I64>,
}

crate::entities::replicated!(Issue);

impl Issue {
  pub fn new(id: I64) -> Issue {
    Issue {
      id,
      ..Default::default()
    }
  }
}
