//! Bounded, insertion-ordered store of observations.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::point::DataPoint;
use crate::types::ValidationError;

/// Outcome of a push, reported to the caller for notification and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushOutcome {
    /// How many points were appended.
    pub appended: usize,
    /// How many points were dropped from the front to stay within capacity.
    pub trimmed: usize,
}

/// Bounded FIFO buffer of data points.
///
/// Appends preserve arrival order; overflow drops the oldest entries, so
/// the contents are always a contiguous suffix of total ingestion history.
/// The buffer itself is not synchronized; the streaming service serializes
/// all writers (tick, inject, clear) through its own lock.
#[derive(Debug, Clone)]
pub struct StreamBuffer {
    points: VecDeque<DataPoint>,
    capacity: usize,
}

impl StreamBuffer {
    /// Creates a buffer with the given capacity.
    ///
    /// # Errors
    ///
    /// Returns an error if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, ValidationError> {
        if capacity == 0 {
            return Err(ValidationError::ZeroCapacity);
        }
        Ok(Self {
            points: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        })
    }

    /// Appends a batch in order, then trims from the front past capacity.
    ///
    /// Trimming happens after the whole batch lands, so no reader of the
    /// returned state can observe a partially-trimmed buffer.
    pub fn push(&mut self, batch: Vec<DataPoint>) -> PushOutcome {
        let appended = batch.len();
        self.points.extend(batch);
        let trimmed = self.trim();
        PushOutcome { appended, trimmed }
    }

    /// Changes the capacity, trimming immediately if it shrank.
    ///
    /// # Errors
    ///
    /// Returns an error if `capacity` is zero; the buffer is unchanged.
    pub fn set_capacity(&mut self, capacity: usize) -> Result<usize, ValidationError> {
        if capacity == 0 {
            return Err(ValidationError::ZeroCapacity);
        }
        self.capacity = capacity;
        Ok(self.trim())
    }

    fn trim(&mut self) -> usize {
        let excess = self.points.len().saturating_sub(self.capacity);
        for _ in 0..excess {
            self.points.pop_front();
        }
        excess
    }

    /// Empties the buffer.
    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Returns an owned copy of the current contents, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<DataPoint> {
        self.points.iter().cloned().collect()
    }

    /// Number of buffered points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Current capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Points matching the given category, in buffer order.
    #[must_use]
    pub fn by_category(&self, category: &str) -> Vec<DataPoint> {
        self.points
            .iter()
            .filter(|p| p.category == category)
            .cloned()
            .collect()
    }

    /// Points matching the given source, in buffer order.
    #[must_use]
    pub fn by_source(&self, source: &str) -> Vec<DataPoint> {
        self.points
            .iter()
            .filter(|p| p.source == source)
            .cloned()
            .collect()
    }

    /// Points with `start <= timestamp <= end`, in buffer order.
    #[must_use]
    pub fn by_time_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<DataPoint> {
        self.points
            .iter()
            .filter(|p| p.timestamp >= start && p.timestamp <= end)
            .cloned()
            .collect()
    }

    /// The most recent `count` points, still in buffer (arrival) order.
    #[must_use]
    pub fn latest(&self, count: usize) -> Vec<DataPoint> {
        let skip = self.points.len().saturating_sub(count);
        self.points.iter().skip(skip).cloned().collect()
    }
}
