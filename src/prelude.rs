// 1. Traits
pub use crate::telemetry::{TelemetryProvider, ValueFormatter};

// 2. Collections & Drivers
pub use crate::latest::{
    Delivery, HistoricalRequest, LatestDatum, LatestValueReconciler, LatestValueSubscription,
    RequestToken,
};
pub use crate::table::{
    AddOutcome, BoundedRowCollection, BoundsOutcome, Placement, RowEvent, SortDirection,
    SortOptions, SortedCollection, TelemetryRow, TelemetryTableFeed,
};

// 3. Time Domain
pub use crate::time::{Bounds, Clock, ClockOffsets, TimeContext, TimeSystem};

// 4. Telemetry Types
pub use crate::telemetry::{
    EntityKey, FormatMap, JsonFormatKind, JsonFormatter, RequestOptions, RequestStrategy,
    SharedFormatter, Subscription, TelemetryMetadata, ValueHints, ValueMetadata,
};

// 5. Errors
pub use crate::error::{
    CollectionError, ConfigError, RequestError, SystemError, TelemetryError, TelemetryResult,
    TimeError,
};

// 6. Configs
pub use crate::config::{TableConfig, TimeConductorConfig};
