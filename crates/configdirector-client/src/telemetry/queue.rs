use std::collections::VecDeque;
use std::sync::Arc;

use time::OffsetDateTime;

use crate::clock::{Clock, SystemClock};

pub const DEFAULT_QUEUE_CAPACITY: usize = 1_000;

/// Events drained from a queue together with the window they cover.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueSnapshot<T> {
    pub start_time: OffsetDateTime,
    pub end_time: OffsetDateTime,
    pub events: Vec<T>,
    pub dropped_count: u64,
}

/// Bounded FIFO buffer of telemetry events.
///
/// Overflow evicts the oldest events and counts them as dropped; the window
/// starts on the first push after a snapshot.
pub struct EventQueue<T> {
    capacity: usize,
    events: VecDeque<T>,
    dropped_count: u64,
    start_time: Option<OffsetDateTime>,
    clock: Arc<dyn Clock>,
}

impl<T> std::fmt::Debug for EventQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field("capacity", &self.capacity)
            .field("len", &self.events.len())
            .field("dropped_count", &self.dropped_count)
            .finish()
    }
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl<T> EventQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self::with_clock(capacity, Arc::new(SystemClock))
    }

    pub fn with_clock(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            capacity,
            events: VecDeque::with_capacity(capacity.min(DEFAULT_QUEUE_CAPACITY)),
            dropped_count: 0,
            start_time: None,
            clock,
        }
    }

    /// Appends `incoming`, evicting the oldest events beyond capacity.
    ///
    /// Returns the number of retained events.
    pub fn push(&mut self, incoming: impl IntoIterator<Item = T>) -> usize {
        if self.start_time.is_none() {
            self.start_time = Some(self.clock.now());
        }

        let mut incoming: Vec<T> = incoming.into_iter().collect();
        let excess_incoming = incoming.len().saturating_sub(self.capacity);
        if excess_incoming > 0 {
            incoming.drain(..excess_incoming);
            self.dropped_count += excess_incoming as u64;
        }

        let overflow = (self.events.len() + incoming.len()).saturating_sub(self.capacity);
        if overflow > 0 {
            self.events.drain(..overflow);
            self.dropped_count += overflow as u64;
        }

        self.events.extend(incoming);
        self.events.len()
    }

    /// Drains all events and the dropped count, starting a new window.
    pub fn take_snapshot(&mut self) -> QueueSnapshot<T> {
        let end_time = self.clock.now();
        let start_time = self.start_time.take().unwrap_or(end_time);
        QueueSnapshot {
            start_time,
            end_time,
            events: self.events.drain(..).collect(),
            dropped_count: std::mem::take(&mut self.dropped_count),
        }
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.start_time = None;
        self.dropped_count = 0;
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn reached_limit(&self) -> bool {
        self.events.len() >= self.capacity
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_count
    }

    pub fn events(&self) -> impl Iterator<Item = &T> {
        self.events.iter()
    }
}
