use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use strum::Display;
use typeshare::typeshare;

pub mod config;
pub mod issue;
pub mod label;
pub mod logger;
pub mod milestone;
pub mod mutex;
pub mod oauth;
pub mod pull_request;
pub mod repository;
pub mod user;

#[typeshare(serialized_as = "number")]
pub type I64 = i64;

/// The provenance channel a replicated write arrived through.
#[typeshare]
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Via {
  #[default]
  Webhook,
  Api,
}

/// Current time as epoch milliseconds of the tz-naive local
/// wall clock. All replication instants use this representation.
pub fn mirror_timestamp() -> i64 {
  Local::now().naive_local().and_utc().timestamp_millis()
}

/// Parse an upstream ISO-8601 timestamp (eg. `2011-01-26T19:01:12Z`)
/// into epoch milliseconds of its tz-naive wall clock. The offset is
/// dropped, not converted, matching how the mirror stores all
/// date/time columns.
pub fn parse_timestamp(value: &str) -> Option<i64> {
  DateTime::parse_from_rfc3339(value)
    .ok()
    .map(|dt| dt.naive_local().and_utc().timestamp_millis())
}

/// Per-entity replication provenance. `last_replicated_at` is the
/// greater of the two channel instants, treating absence as
/// minimum-time so the first-ever update always wins.
pub trait Replicated {
  fn last_replicated_via_webhook_at(&self) -> Option<I64>;
  fn last_replicated_via_api_at(&self) -> Option<I64>;
  fn stamp_replicated(&mut self, via: Via, fetched_at: I64);

  fn last_replicated_at(&self) -> I64 {
    self
      .last_replicated_via_webhook_at()
      .unwrap_or(I64::MIN)
      .max(self.last_replicated_via_api_at().unwrap_or(I64::MIN))
  }
}

macro_rules! replicated {
  ($entity:ty) => {
    impl crate::entities::Replicated for $entity {
      fn last_replicated_via_webhook_at(
        &self,
      ) -> Option<crate::entities::I64> {
        self.last_replicated_via_webhook_at
      }
      fn last_replicated_via_api_at(
        &self,
      ) -> Option<crate::entities::I64> {
        self.last_replicated_via_api_at
      }
      fn stamp_replicated(
        &mut self,
        via: crate::entities::Via,
        fetched_at: crate::entities::I64,
      ) {
        match via {
          crate::entities::Via::Webhook => {
            self.last_replicated_via_webhook_at = Some(fetched_at)
          }
          crate::entities::Via::Api => {
            self.last_replicated_via_api_at = Some(fetched_at)
          }
        }
      }
    }
  };
}

pub(crate) use replicated;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_zulu_timestamps_as_wall_clock() {
    let ms = parse_timestamp("2011-01-26T19:01:12Z").unwrap();
    assert_eq!(ms, 1296068472000);
  }

  #[test]
  fn drops_offsets_instead_of_converting() {
    // Same wall clock, different offsets => same stored instant.
    let plus = parse_timestamp("2011-01-26T19:01:12+05:00").unwrap();
    let zulu = parse_timestamp("2011-01-26T19:01:12Z").unwrap();
    assert_eq!(plus, zulu);
  }

  #[test]
  fn rejects_garbage_timestamps() {
    assert_eq!(parse_timestamp("not a date"), None);
    assert_eq!(parse_timestamp(""), None);
  }
}
