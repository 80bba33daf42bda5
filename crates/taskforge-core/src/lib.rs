//! Core types, errors, events, and identifiers shared across every taskforge
//! crate: the task store, delegation engine, hierarchy runtime, guardrail
//! detector, input validator, and state journal.
//!
//! # Main types
//!
//! - [`TaskforgeError`] / [`TaskforgeResult`] — unified error enum for all subsystems.
//! - [`Event`] / [`EventBus`] — the synchronous pub-sub surface described in spec.md §6.
//! - [`SessionId`] — process-unique author tag for optimistic-concurrency records.
//! - [`Phase`] — the closed project-phase set shared by the task store and state journal.

/// Error types shared by every component.
pub mod error;
/// The event bus and event taxonomy (spec.md §6, "Events").
pub mod events;
/// The closed project-phase enum (spec.md §3, §4.B).
pub mod phase;
/// Session id generation (spec.md §3, "Session id").
pub mod session;

pub use error::{TaskforgeError, TaskforgeResult};
pub use events::{Event, EventBus, Subscriber};
pub use phase::{Phase, UnknownPhase};
pub use session::SessionId;
