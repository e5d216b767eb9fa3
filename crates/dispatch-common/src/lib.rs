//! Shared types for the job-dispatch fabric.
//!
//! This crate provides the runtime support types that every other crate in
//! the workspace builds on:
//!
//! - [`task`]: `TaskDescription`, the not-yet-running unit of work, and its
//!   monotonic sequence generator.
//! - [`wire`]: the bus's line-delimited JSON frame shapes.
//! - [`error`]: the error kinds raised by components that have no more
//!   specific crate of their own.
//! - [`logging`]: shared `tracing` initialization for every binary.
//! - [`signal`]: shared shutdown-signal waiting for every binary.

pub mod error;
pub mod logging;
pub mod signal;
pub mod task;
pub mod wire;

pub use error::DispatchError;
pub use task::TaskDescription;
pub use wire::{Envelope, JobPayload, RegisterKind};
