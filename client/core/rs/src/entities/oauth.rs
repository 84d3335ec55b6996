use serde::{Deserialize, Serialize};

use crate::entities::I64;

/// An upstream access token on file for a mirrored user. Token
/// acquisition (the OAuth handshake) happens outside the Core; this
/// row is the contract through which the upstream client resolves a
/// requestor identity hint to a token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OauthToken {
  #[serde(rename = "_id")]
  pub user_id: I64,
  pub access_token: String,
  pub created_at: I64,
}
