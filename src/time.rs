pub mod context;
pub mod domain;

pub use context::TimeContext;
pub use domain::{Bounds, Clock, ClockOffsets, TimeSystem};
