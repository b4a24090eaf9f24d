use std::collections::HashMap;
use std::hash::Hash;

use serde::Serialize;
use time::OffsetDateTime;

use super::queue::QueueSnapshot;

/// One group of structurally identical events observed in a window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedEvent<T> {
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_time: OffsetDateTime,
    pub count: u64,
    pub event: T,
}

/// Collapses duplicate events of a snapshot into counted groups.
#[derive(Debug, Default, Clone, Copy)]
pub struct EventAggregator;

impl EventAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Groups events by full equality; groups keep first-seen order.
    pub fn aggregate<T>(&self, snapshot: &QueueSnapshot<T>) -> Vec<AggregatedEvent<T>>
    where
        T: Eq + Hash + Clone,
    {
        let mut index: HashMap<&T, usize> = HashMap::with_capacity(snapshot.events.len());
        let mut groups: Vec<AggregatedEvent<T>> = Vec::new();
        for event in &snapshot.events {
            match index.get(event) {
                Some(&position) => groups[position].count += 1,
                None => {
                    index.insert(event, groups.len());
                    groups.push(AggregatedEvent {
                        start_time: snapshot.start_time,
                        end_time: snapshot.end_time,
                        count: 1,
                        event: event.clone(),
                    });
                }
            }
        }
        groups
    }
}
