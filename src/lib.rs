//! Bounded, time-windowed telemetry tables and latest-value reconciliation.
//!
//! - [`table`]: sorted row collections, the bounds protocol that moves rows
//!   between the visible window and the future buffer, and an async feed.
//! - [`latest`]: a single monotonic "latest value" per entity, merged from a
//!   historical request and a realtime subscription.
//! - [`time`]: the shared time context (bounds, time system, clock).
//! - [`telemetry`]: the provider interface, metadata and value formatters.

pub mod config;
pub mod error;
pub mod latest;
mod macros;
pub mod prelude;
pub mod table;
pub mod telemetry;
pub mod time;
