use serde::{Deserialize, Serialize};
use typeshare::typeshare;

use crate::entities::I64;

/// A mirrored issue label. Unique on (repo_id, name) -- the
/// upstream has no stable id for labels, the name is the identity
/// within a repository.
#[typeshare]
#[derive(
  Debug, Clone, Default, PartialEq, Serialize, Deserialize,
)]
pub struct IssueLabel {
  pub repo_id: I64,
  pub name: String,
  /// Hex color without the leading `#`, as the upstream sends it.
  pub color: Option<String>,
  pub last_replicated_via_webhook_at: Option<I64>,
  pub last_replicated_via_api_at: Option<I64>,
}

crate::entities::replicated!(IssueLabel);

impl IssueLabel {
  pub fn new(repo_id: I64, name: impl Into<String>) -> IssueLabel {
    IssueLabel {
      repo_id,
      name: name.into(),
      ..Default::default()
    }
  }
}
