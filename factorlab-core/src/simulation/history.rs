//! Joined simulation rows and the fixed-capacity window over them.

use crate::domain::{Bar, PriceField};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// One row of the joined table: raw bar columns and flattened factor paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub open_time: i64,
    pub fields: BTreeMap<String, f64>,
}

impl Record {
    pub fn new(open_time: i64) -> Self {
        Self {
            open_time,
            fields: BTreeMap::new(),
        }
    }

    /// Record for `bar`, with the raw OHLCV columns when `join_ohlcv` is set.
    pub fn from_bar(bar: &Bar, join_ohlcv: bool) -> Self {
        let mut record = Self::new(bar.open_time);
        if join_ohlcv {
            for field in PriceField::ALL {
                record.fields.insert(field.as_str().to_string(), bar.field(field));
            }
        }
        record
    }

    pub fn get(&self, column: &str) -> Option<f64> {
        self.fields.get(column).copied()
    }
}

/// The most recent `capacity` records, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingHistory {
    capacity: usize,
    records: VecDeque<Record>,
}

impl RollingHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append a record, dropping the oldest once over capacity.
    pub fn push(&mut self, record: Record) {
        self.records.push_back(record);
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
    }

    pub fn last(&self) -> Option<&Record> {
        self.records.back()
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    /// Owned copy of the current window.
    pub fn snapshot(&self) -> Vec<Record> {
        self.records.iter().cloned().collect()
    }
}

impl Extend<Record> for RollingHistory {
    fn extend<I: IntoIterator<Item = Record>>(&mut self, iter: I) {
        for record in iter {
            self.push(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::make_bars;

    #[test]
    fn record_joins_raw_columns() {
        let bars = make_bars(&[10.0, 11.0]);
        let record = Record::from_bar(&bars[1], true);
        assert_eq!(record.open_time, bars[1].open_time);
        assert_eq!(record.get("close"), Some(11.0));
        assert_eq!(record.get("open"), Some(10.0));
        assert_eq!(record.fields.len(), 5);

        let bare = Record::from_bar(&bars[1], false);
        assert!(bare.fields.is_empty());
    }

    #[test]
    fn history_keeps_most_recent() {
        let mut history = RollingHistory::new(3);
        history.extend((0..5).map(Record::new));
        assert_eq!(history.len(), 3);
        let times: Vec<_> = history.records().map(|r| r.open_time).collect();
        assert_eq!(times, vec![2, 3, 4]);
        assert_eq!(history.last().unwrap().open_time, 4);
    }

    #[test]
    fn snapshot_is_independent() {
        let mut history = RollingHistory::new(2);
        history.push(Record::new(1));
        let snapshot = history.snapshot();
        history.push(Record::new(2));
        history.push(Record::new(3));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].open_time, 1);
    }

    #[test]
    fn short_history_is_not_padded() {
        let mut history = RollingHistory::new(10);
        history.extend((0..4).map(Record::new));
        assert_eq!(history.len(), 4);
        assert_eq!(history.capacity(), 10);
    }
}
