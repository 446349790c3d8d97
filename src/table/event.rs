use smallvec::SmallVec;

use crate::table::row::TelemetryRow;

/// Notification emitted by a row collection.
///
/// The payload shape matters to renderers: a single `add_one` produces an
/// `Added` with one row and its index, bulk operations produce one `Added`
/// carrying the whole batch and no index.
#[derive(Debug)]
pub enum RowEvent<D> {
    Added {
        rows: Vec<TelemetryRow<D>>,
        index: Option<usize>,
    },
    Removed {
        rows: Vec<TelemetryRow<D>>,
    },
    /// The sort options changed and every row may have moved.
    Sorted,
}

impl<D> Clone for RowEvent<D> {
    fn clone(&self) -> Self {
        match self {
            Self::Added { rows, index } => Self::Added {
                rows: rows.clone(),
                index: *index,
            },
            Self::Removed { rows } => Self::Removed { rows: rows.clone() },
            Self::Sorted => Self::Sorted,
        }
    }
}

impl<D> RowEvent<D> {
    pub fn rows(&self) -> &[TelemetryRow<D>] {
        match self {
            Self::Added { rows, .. } | Self::Removed { rows } => rows,
            Self::Sorted => &[],
        }
    }

    pub fn is_added(&self) -> bool {
        matches!(self, Self::Added { .. })
    }

    pub fn is_removed(&self) -> bool {
        matches!(self, Self::Removed { .. })
    }
}

/// Fan-out of [`RowEvent`]s to any number of listeners.
///
/// Listeners detach by dropping their receiver; closed senders are pruned on
/// the next emit. Most collections have zero or one listener, hence the inline
/// storage.
#[derive(Debug)]
pub struct RowEvents<D> {
    listeners: SmallVec<[async_channel::Sender<RowEvent<D>>; 2]>,
}

impl<D> Default for RowEvents<D> {
    fn default() -> Self {
        Self {
            listeners: SmallVec::new(),
        }
    }
}

impl<D> RowEvents<D> {
    /// Adds a listener on an unbounded channel.
    ///
    /// Emitting never blocks or fails on a slow listener, so events queue up
    /// until the receiver is drained. Drop the receiver to stop listening.
    pub fn subscribe(&mut self) -> async_channel::Receiver<RowEvent<D>> {
        let (tx, rx) = async_channel::unbounded();
        self.listeners.push(tx);
        rx
    }

    #[inline]
    pub fn has_listeners(&self) -> bool {
        !self.listeners.is_empty()
    }

    /// Builds the event only if someone is listening.
    pub fn emit_with(&mut self, make: impl FnOnce() -> RowEvent<D>) {
        if self.listeners.is_empty() {
            return;
        }
        let event = make();
        self.listeners
            .retain(|tx| tx.try_send(event.clone()).is_ok());
    }
}
