//! # online-linker-server
//!
//! Online count scheduling and broadcasting on a tokio runtime.
//!
//! This crate provides:
//! - [`OnlineManager`]: aggregates status sources into a cached count, either
//!   on a background schedule (with inactivity sleep) or on demand
//! - [`BroadcastingManager`]: publishes the host's count to broadcasting targets
//! - [`SharedStoreTarget`]: per-instance field in a shared store hash
//! - [`OnlineLinker`]: builds and starts everything from a [`Configuration`]
//!
//! Sources and targets perform blocking I/O; the managers run them on tokio's
//! blocking pool and never on async worker threads.

pub mod broadcasting;
pub mod error;
pub mod linker;
pub mod online;
pub mod target;

pub use broadcasting::BroadcastingManager;
pub use error::ManagerError;
pub use linker::OnlineLinker;
pub use online::{OnlineManager, SchedulerStatus};
pub use target::{build_target, build_targets, BroadcastingTarget, SharedStoreTarget};

pub use online_linker_core::{Configuration, MemoryStore, OnlineSupplier, SharedStore};
