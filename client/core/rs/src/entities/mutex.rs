use serde::{Deserialize, Serialize};

use crate::entities::I64;

/// A named scan lock. Existence of the row is the lock: acquisition
/// is a single insert under the unique `_id` constraint, release is
/// an unconditional delete by the scan finalizer. There is no
/// automatic expiry; stuck rows are cleared administratively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutex {
  /// Scope-derived name, eg. `Repository|octocat/Hello-World|pulls`.
  #[serde(rename = "_id")]
  pub name: String,
  pub created_at: I64,
  /// The requestor the scan runs on behalf of, when known.
  pub user_id: Option<I64>,
}

impl Mutex {
  pub fn new(name: impl Into<String>, user_id: Option<I64>) -> Mutex {
    Mutex {
      name: name.into(),
      created_at: crate::entities::mirror_timestamp(),
      user_id,
    }
  }
}
