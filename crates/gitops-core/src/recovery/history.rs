//! Bounded history of classified failures

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::errors::ErrorRecord;

/// Ring buffer of the most recent [`ErrorRecord`]s, oldest first.
#[derive(Debug)]
pub struct ErrorHistory {
    capacity: usize,
    records: Mutex<VecDeque<ErrorRecord>>,
}

impl ErrorHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    fn records(&self) -> MutexGuard<'_, VecDeque<ErrorRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, record: ErrorRecord) {
        let mut records = self.records();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// The newest `count` records, oldest first.
    pub fn recent(&self, count: usize) -> Vec<ErrorRecord> {
        let records = self.records();
        let skip = records.len().saturating_sub(count);
        records.iter().skip(skip).cloned().collect()
    }

    /// Records that occurred at or after `since`.
    pub fn since(&self, since: DateTime<Utc>) -> Vec<ErrorRecord> {
        self.records()
            .iter()
            .filter(|record| record.occurred_at >= since)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    pub fn clear(&self) {
        self.records().clear();
    }
}
