use std::time::Duration;

use anyhow::Context;
use database::mungos::mongodb::bson::doc;
use hubmirror_client::{
  entities::config::CoreConfig, error::ReplicationError,
};
use rate_limit::RateLimitWindow;
use reqwest::{Method, StatusCode, header};
use serde::de::DeserializeOwned;

use crate::state::{db_client, rate_limit_tracker};

pub mod link;

/// Authenticated, rate-limit-aware client for the upstream REST
/// API. Every response's `X-RateLimit-*` headers are recorded in
/// the shared tracker before any other handling, and an exhausted
/// window fails the call with [ReplicationError::RateLimited] --
/// call sites never inspect rate limit state themselves.
pub struct Upstream {
  address: String,
  client: reqwest::Client,
  /// HEAD discovery must see the listing's own Link header, not a
  /// redirect target's, so redirects are disabled on this one.
  head_client: reqwest::Client,
}

impl Upstream {
  pub fn new(config: &CoreConfig) -> anyhow::Result<Upstream> {
    let timeout = Duration::from_secs(config.upstream_timeout_secs);
    let user_agent =
      format!("hubmirror/{}", env!("CARGO_PKG_VERSION"));
    let client = reqwest::Client::builder()
      .user_agent(&user_agent)
      .connect_timeout(timeout)
      .timeout(timeout)
      .build()
      .context("failed to build upstream http client")?;
    let head_client = reqwest::Client::builder()
      .user_agent(&user_agent)
      .connect_timeout(timeout)
      .timeout(timeout)
      .redirect(reqwest::redirect::Policy::none())
      .build()
      .context("failed to build upstream head client")?;
    Ok(Upstream {
      address: config.upstream_address.clone(),
      client,
      head_client,
    })
  }

  /// GET a path and parse the JSON body.
  pub async fn get_json<T: DeserializeOwned>(
    &self,
    path: &str,
    requestor_id: Option<i64>,
  ) -> Result<T, ReplicationError> {
    let response =
      self.request(Method::GET, path, requestor_id).await?;
    let parsed = response
      .json()
      .await
      .context("failed to parse upstream response body")?;
    Ok(parsed)
  }

  /// HEAD a path, for Link-header pagination discovery.
  pub async fn head(
    &self,
    path: &str,
    requestor_id: Option<i64>,
  ) -> Result<reqwest::Response, ReplicationError> {
    self.request(Method::HEAD, path, requestor_id).await
  }

  async fn request(
    &self,
    method: Method,
    path: &str,
    requestor_id: Option<i64>,
  ) -> Result<reqwest::Response, ReplicationError> {
    let url = format!("{}{path}", self.address);
    debug!("{method} {url} as {requestor_id:?}");

    let client = if method == Method::HEAD {
      &self.head_client
    } else {
      &self.client
    };
    let mut request = client
      .request(method, &url)
      .header(header::ACCEPT, "application/vnd.github+json");
    if let Some(token) = self.token_for(requestor_id).await? {
      request = request
        .header(header::AUTHORIZATION, format!("token {token}"));
    }

    let response = request
      .send()
      .await
      .with_context(|| format!("request to {url} failed"))?;

    let window = RateLimitWindow::from_headers(|name| {
      response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
    });
    rate_limit_tracker().record(window.clone());

    if window.exhausted() {
      let reset = window.reset;
      let msg = upstream_message(response).await;
      return Err(ReplicationError::RateLimited { reset, msg });
    }

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
      info!("upstream not found: {url}");
      return Err(ReplicationError::not_found(url));
    }
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(ReplicationError::Upstream {
        status: status.as_u16(),
        body,
      });
    }

    Ok(response)
  }

  /// Resolve the requestor identity hint to a stored token, with
  /// the configured fallback token behind it.
  async fn token_for(
    &self,
    requestor_id: Option<i64>,
  ) -> Result<Option<String>, ReplicationError> {
    if let Some(user_id) = requestor_id {
      let stored = db_client()
        .oauth_tokens
        .find_one(doc! { "_id": user_id })
        .await
        .context("failed to query oauth tokens for requestor")?;
      match stored {
        Some(token) => return Ok(Some(token.access_token)),
        None => {
          debug!(
            "no stored token for requestor {user_id}, using default"
          );
        }
      }
    }
    let fallback = &crate::config::core_config().upstream_token;
    Ok((!fallback.is_empty()).then(|| fallback.clone()))
  }
}

/// The upstream's human message for an error response, when it
/// sent one.
async fn upstream_message(response: reqwest::Response) -> String {
  response
    .json::<serde_json::Value>()
    .await
    .ok()
    .as_ref()
    .and_then(|body| body.get("message"))
    .and_then(|msg| msg.as_str())
    .unwrap_or("Rate limited.")
    .to_string()
}
