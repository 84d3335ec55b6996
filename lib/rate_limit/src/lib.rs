//! Bookkeeping for the upstream per-token rate limit window.
//!
//! The upstream reports the window on every response via the
//! `X-RateLimit-*` headers. The fetcher records the latest window
//! here after each call; the HTTP layer echoes it back to clients
//! and uses it to build 503 responses when a fetch is refused.

use std::sync::Arc;

use arc_swap::ArcSwap;

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// One observation of the upstream rate limit window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitWindow {
  pub limit: Option<i64>,
  pub remaining: Option<i64>,
  /// POSIX epoch seconds at which the window resets.
  pub reset: Option<i64>,
}

impl RateLimitWindow {
  /// Read the window out of a response's headers. The lookup
  /// closure abstracts over the http types of the caller.
  pub fn from_headers<'a>(
    header: impl Fn(&str) -> Option<&'a str>,
  ) -> RateLimitWindow {
    let int =
      |name: &str| header(name).and_then(|v| v.parse::<i64>().ok());
    RateLimitWindow {
      limit: int(LIMIT_HEADER),
      remaining: int(REMAINING_HEADER),
      reset: int(RESET_HEADER),
    }
  }

  /// True when the upstream reported the window empty.
  pub fn exhausted(&self) -> bool {
    self.remaining == Some(0)
  }

  /// Whole seconds until the declared reset, never negative.
  /// None when the upstream never declared a reset.
  pub fn seconds_until_reset(&self, now_epoch: i64) -> Option<i64> {
    self.reset.map(|reset| (reset - now_epoch).max(0))
  }
}

/// Latest observed window, shared between the fetcher (writer) and
/// the HTTP layer (reader).
#[derive(Default)]
pub struct RateLimitTracker(ArcSwap<RateLimitWindow>);

impl RateLimitTracker {
  pub fn record(&self, window: RateLimitWindow) {
    self.0.store(Arc::new(window));
  }

  pub fn current(&self) -> Arc<RateLimitWindow> {
    self.0.load_full()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn headers(
    entries: &[(&str, &str)],
  ) -> Vec<(String, String)> {
    entries
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect()
  }

  fn window(entries: &[(&str, &str)]) -> RateLimitWindow {
    let entries = headers(entries);
    RateLimitWindow::from_headers(|name| {
      entries
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
    })
  }

  #[test]
  fn parses_headers() {
    let w = window(&[
      (LIMIT_HEADER, "5000"),
      (REMAINING_HEADER, "4999"),
      (RESET_HEADER, "1372700873"),
    ]);
    assert_eq!(w.limit, Some(5000));
    assert_eq!(w.remaining, Some(4999));
    assert_eq!(w.reset, Some(1372700873));
    assert!(!w.exhausted());
  }

  #[test]
  fn exhausted_only_at_zero() {
    assert!(window(&[(REMAINING_HEADER, "0")]).exhausted());
    assert!(!window(&[(REMAINING_HEADER, "1")]).exhausted());
    // Absent headers are not an exhausted window.
    assert!(!window(&[]).exhausted());
  }

  #[test]
  fn ignores_malformed_values() {
    let w = window(&[(REMAINING_HEADER, "soon")]);
    assert_eq!(w.remaining, None);
  }

  #[test]
  fn seconds_until_reset_clamps_to_zero() {
    let w = window(&[(RESET_HEADER, "1000")]);
    assert_eq!(w.seconds_until_reset(940), Some(60));
    assert_eq!(w.seconds_until_reset(2000), Some(0));
    assert_eq!(window(&[]).seconds_until_reset(0), None);
  }

  #[test]
  fn tracker_keeps_latest() {
    let tracker = RateLimitTracker::default();
    assert_eq!(*tracker.current(), RateLimitWindow::default());
    let w = window(&[(REMAINING_HEADER, "12")]);
    tracker.record(w.clone());
    assert_eq!(*tracker.current(), w);
  }
}
