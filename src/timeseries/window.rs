//! Bounded, time-ordered sample buffer for one source.

use std::collections::VecDeque;

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;

/// Capacity bound of a [`MovingWindow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowCapacity {
    /// Keep at most this many samples.
    Samples(usize),
    /// Keep samples no older than this span behind the newest one.
    Duration(TimeDelta),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("sample at {ts} is older than the newest stored sample at {newest}")]
    OutOfOrder {
        ts: DateTime<Utc>,
        newest: DateTime<Utc>,
    },
}

/// Fixed-capacity ring of `(timestamp, value)` pairs in non-decreasing
/// timestamp order.
///
/// Ordering policy: a timestamp strictly newer than the stored newest is
/// appended; a timestamp equal to the newest replaces its value (last
/// write wins); anything older is rejected with
/// [`WindowError::OutOfOrder`]. Eviction pops from the front, O(1)
/// amortized per push.
#[derive(Debug, Clone)]
pub struct MovingWindow {
    capacity: WindowCapacity,
    samples: VecDeque<(DateTime<Utc>, f64)>,
}

impl MovingWindow {
    pub fn new(capacity: WindowCapacity) -> Self {
        let samples = match capacity {
            WindowCapacity::Samples(limit) => VecDeque::with_capacity(limit.min(4_096)),
            WindowCapacity::Duration(_) => VecDeque::new(),
        };
        Self { capacity, samples }
    }

    pub fn capacity(&self) -> WindowCapacity {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn newest(&self) -> Option<(DateTime<Utc>, f64)> {
        self.samples.back().copied()
    }

    pub fn oldest(&self) -> Option<(DateTime<Utc>, f64)> {
        self.samples.front().copied()
    }

    /// Store a sample, evicting the oldest entries beyond capacity.
    pub fn push(&mut self, ts: DateTime<Utc>, value: f64) -> Result<(), WindowError> {
        if let Some(back) = self.samples.back_mut() {
            let newest = back.0;
            if ts < newest {
                return Err(WindowError::OutOfOrder { ts, newest });
            }
            if ts == newest {
                back.1 = value;
                return Ok(());
            }
        }
        self.samples.push_back((ts, value));
        self.evict(ts);
        Ok(())
    }

    fn evict(&mut self, newest: DateTime<Utc>) {
        match self.capacity {
            WindowCapacity::Samples(limit) => {
                while self.samples.len() > limit {
                    self.samples.pop_front();
                }
            }
            WindowCapacity::Duration(span) => {
                let cutoff = newest - span;
                while matches!(self.samples.front(), Some(&(ts, _)) if ts < cutoff) {
                    self.samples.pop_front();
                }
            }
        }
    }

    /// Iterate over all buffered samples, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = (DateTime<Utc>, f64)> + Clone + '_ {
        self.samples.iter().copied()
    }

    /// Lazy view over the samples within the requested span, counted or
    /// measured back from the newest entry. Does not mutate the buffer
    /// and can be restarted by calling again.
    pub fn window(&self, span: WindowCapacity) -> impl Iterator<Item = (DateTime<Utc>, f64)> + Clone + '_ {
        let start = match span {
            WindowCapacity::Samples(count) => self.samples.len().saturating_sub(count),
            WindowCapacity::Duration(span) => match self.samples.back() {
                Some(&(newest, _)) => {
                    let cutoff = newest - span;
                    self.samples.partition_point(|&(ts, _)| ts < cutoff)
                }
                None => 0,
            },
        };
        self.samples.iter().copied().skip(start)
    }

    /// Samples with `after < ts <= upto`, the shape of one resample
    /// cycle's read.
    pub fn range(
        &self,
        after: DateTime<Utc>,
        upto: DateTime<Utc>,
    ) -> impl Iterator<Item = (DateTime<Utc>, f64)> + Clone + '_ {
        let start = self.samples.partition_point(|&(ts, _)| ts <= after);
        self.samples
            .iter()
            .copied()
            .skip(start)
            .take_while(move |&(ts, _)| ts <= upto)
    }
}
