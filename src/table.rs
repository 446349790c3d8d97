pub mod bounded;
pub mod event;
pub mod feed;
pub mod row;
pub mod sorted;

pub use bounded::{AddOutcome, BoundedRowCollection, BoundsOutcome, Placement};
pub use event::{RowEvent, RowEvents};
pub use feed::TelemetryTableFeed;
pub use row::TelemetryRow;
pub use sorted::{SortDirection, SortOptions, SortedCollection};
