//! Job tracking for long-running operations.
//!
//! Provides:
//! - `JobRegistry` — authoritative job store with a lock per job
//! - `ProgressBroadcaster` — per-owner-scope push fan-out
//! - `JobTracker` — what operation triggers call: registry write, then publish

pub mod broadcaster;
pub mod registry;
pub mod tracker;

pub use broadcaster::{ProgressBroadcaster, Subscription, DEFAULT_CHANNEL_CAPACITY};
pub use registry::{JobRegistry, Mutation, RegistryError};
pub use tracker::JobTracker;
