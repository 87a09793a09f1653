//! Request coalescing (single-flight).
//!
//! # Data Flow
//! ```text
//! caller A ─┐                         ┌─▶ result ─▶ A
//! caller B ─┼─▶ run(key) ─▶ leader ───┼─▶ result ─▶ B
//! caller C ─┘   (in-flight map)       └─▶ result ─▶ C
//!                     │
//!                     └─ key removed when the leader finishes,
//!                        before its result is published
//! ```
//!
//! # Design Decisions
//! - Purely in-flight deduplication; no memoization beyond the running window
//! - Leader work runs on its own task so departed callers do not cancel it
//! - Leader panics surface as the same error to every caller, never retried

pub mod group;

pub use group::{Coalescer, Flight, LeaderAborted, Role};
