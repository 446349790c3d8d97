use std::{fmt, sync::Arc};

use crate::telemetry::EntityKey;

/// One telemetry datum in a table, tagged with the entity that produced it.
///
/// The datum is shared, so moving a row between buffers or handing it to
/// several listeners never copies the payload. Rows are immutable.
pub struct TelemetryRow<D> {
    entity: EntityKey,
    datum: Arc<D>,
}

impl<D> TelemetryRow<D> {
    pub fn new(entity: EntityKey, datum: D) -> Self {
        Self {
            entity,
            datum: Arc::new(datum),
        }
    }

    pub fn from_shared(entity: EntityKey, datum: Arc<D>) -> Self {
        Self { entity, datum }
    }

    #[inline]
    pub fn entity(&self) -> &EntityKey {
        &self.entity
    }

    #[inline]
    pub fn datum(&self) -> &D {
        &self.datum
    }

    pub fn shared_datum(&self) -> Arc<D> {
        Arc::clone(&self.datum)
    }
}

impl<D> Clone for TelemetryRow<D> {
    fn clone(&self) -> Self {
        Self {
            entity: self.entity.clone(),
            datum: Arc::clone(&self.datum),
        }
    }
}

impl<D: fmt::Debug> fmt::Debug for TelemetryRow<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryRow")
            .field("entity", &self.entity)
            .field("datum", &self.datum)
            .finish()
    }
}

impl<D: PartialEq> PartialEq for TelemetryRow<D> {
    fn eq(&self, other: &Self) -> bool {
        self.entity == other.entity && self.datum == other.datum
    }
}
