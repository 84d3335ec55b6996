//! Shared types for HubMirror, a replication mirror for a
//! GitHub-shaped object graph.
//!
//! The [`entities`] module is the canonical model: the mirrored
//! entities themselves, plus the configuration types consumed by the
//! Core binary. [`error`] carries the replication error taxonomy
//! shared between the processors, scanners, and the HTTP layer.

pub mod entities;
pub mod error;
