//! Event delivery for the conversion engine.
//!
//! Two channels with different semantics:
//!
//! - [`bus::EventBus`]: fan-out broadcast of every lifecycle event, for
//!   consumers that want the full stream (audit sinks, socket pushes).
//! - [`progress::ProgressHub`]: per-job last-value-wins progress
//!   snapshots; rapid updates coalesce, and a late subscriber immediately
//!   sees the current value.

pub mod bus;
pub mod progress;

pub use bus::{EngineEvent, EventBus};
pub use progress::{ProgressHub, ProgressSnapshot};
