use serde::{Deserialize, Serialize};
use typeshare::typeshare;

use crate::entities::I64;

/// A mirrored milestone. Unique on (repo_id, number); the upstream
/// also exposes a scalar id, but numbers are how issues and pull
/// requests refer to milestones, so the composite is the key.
#[typeshare]
#[derive(
  Debug, Clone, Default, PartialEq, Serialize, Deserialize,
)]
pub struct Milestone {
  pub repo_id: I64,
  pub number: I64,
  pub state: Option<String>,
  pub title: Option<String>,
  pub description: Option<String>,
  pub creator_id: Option<I64>,
  pub creator_login: Option<String>,
  pub open_issues_count: Option<I64>,
  pub closed_issues_count: Option<I64>,
  pub created_at: Option<I64>,
  pub updated_at: Option<I64>,
  pub closed_at: Option<I64>,
  pub due_at: Option<I64>,
  pub last_replicated_via_webhook_at: Option<I64>,
  pub last_replicated_via_api_at: Option<I64>,
}

crate::entities::replicated!(Milestone);

impl Milestone {
  pub fn new(repo_id: I64, number: I64) -> Milestone {
    Milestone {
      repo_id,
      number,
      ..Default::default()
    }
  }
}
