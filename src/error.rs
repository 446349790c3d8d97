use thiserror::Error;

pub type TelemetryResult<T> = Result<T, TelemetryError>;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error(transparent)]
    Collection(#[from] CollectionError),

    #[error(transparent)]
    Time(#[from] TimeError),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    System(#[from] SystemError),
}

/// Errors raised by the sorted and bounded row collections.
#[derive(Debug, Error)]
pub enum CollectionError {
    #[error(
        "Bounds moved backwards (last: [{last_start}, {last_end}], new: [{new_start}, {new_end}]); clear and requery instead"
    )]
    BoundsRegression {
        last_start: f64,
        last_end: f64,
        new_start: f64,
        new_end: f64,
    },

    #[error("Collection is not sorted by any time system yet")]
    Unsorted,

    #[error("No formatter for sort key '{0}'")]
    MissingFormatter(String),
}

/// Errors related to the time context: bounds, time systems and clocks.
#[derive(Debug, Error)]
pub enum TimeError {
    #[error("Invalid bounds (start: {start}, end: {end}): {msg}")]
    InvalidBounds { start: f64, end: f64, msg: String },

    #[error("Invalid clock offsets (start: {start}, end: {end}): start must not exceed end")]
    InvalidClockOffsets { start: i64, end: i64 },

    #[error("Unknown time system key: '{0}'")]
    UnknownTimeSystem(String),

    #[error("Time context has been dropped")]
    ContextClosed,
}

/// Errors related to telemetry metadata, historical requests and subscriptions.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("No telemetry metadata for entity '{0}'")]
    MissingMetadata(String),

    #[error("Historical request for '{entity}' failed: {msg}")]
    Historical { entity: String, msg: String },

    #[error("Subscription to '{entity}' failed: {msg}")]
    Subscription { entity: String, msg: String },

    #[error("Request was abandoned before it resolved")]
    Abandoned,
}

/// Errors related to configuration parsing and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse enum: {0}")]
    ParseEnum(#[from] strum::ParseError),
}

/// Errors related to internal invariants and task management.
#[derive(Debug, Error)]
pub enum SystemError {
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
