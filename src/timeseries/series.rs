//! # Time Series
//!
//! A time series is a ring buffer with an interval contract: retained
//! samples are at least one interval apart in timestamp space. Samples
//! arriving early are dropped, or folded into an attached averager whose
//! output then lands in the next slot. Gaps are back-filled; a gap wider
//! than the whole buffer resets the series.
//!
//! Timestamps are caller-supplied monotonic counters (milliseconds, epoch
//! seconds, tick counts); wrap-around is handled through unsigned
//! subtraction as long as individual gaps stay below half the counter
//! range.

use crate::timeseries::average::{Averager, MeanDefault};
use crate::timeseries::ring::{RingBuff, RingIter};

const TAG: &str = "emeter::ts";

/// Interval-gated ring of samples.
pub struct TimeSeries<T> {
    ring: RingBuff<T>,
    /// Timestamp of the most recently retained sample
    tstamp: u32,
    /// Minimum timestamp distance between retained samples
    interval: u32,
    averager: Option<Box<dyn Averager<T> + Send>>,
}

impl<T: Clone> TimeSeries<T> {
    /// Creates a series of `capacity` slots spaced `interval` apart,
    /// seeded at `start_time`.
    pub fn new(capacity: usize, start_time: u32, interval: u32) -> Self {
        TimeSeries {
            ring: RingBuff::new(capacity),
            tstamp: start_time,
            interval: interval.max(1),
            averager: None,
        }
    }

    /// Same, with an averager folding sub-interval samples.
    pub fn with_averager(
        capacity: usize,
        start_time: u32,
        interval: u32,
        averager: Box<dyn Averager<T> + Send>,
    ) -> Self {
        let mut ts = TimeSeries::new(capacity, start_time, interval);
        ts.averager = Some(averager);
        ts
    }

    /// Attaches or replaces the averager.
    pub fn set_averager(&mut self, averager: Box<dyn Averager<T> + Send>) {
        self.averager = Some(averager);
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    /// Timestamp of the most recently retained sample.
    pub fn last_timestamp(&self) -> u32 {
        self.tstamp
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// True when the backing ring failed to allocate.
    pub fn is_inert(&self) -> bool {
        self.ring.is_inert()
    }

    /// Oldest-first iterator over retained samples.
    pub fn iter(&self) -> RingIter<'_, T> {
        self.ring.iter()
    }

    /// Drops all samples and reseats the series at `t`.
    pub fn reset(&mut self, t: u32) {
        self.ring.clear();
        self.tstamp = t;
        if let Some(avg) = self.averager.as_mut() {
            avg.reset();
        }
    }

    /// Changes the interval; the series is cleared and reseated at `now`.
    pub fn set_interval(&mut self, interval: u32, now: u32) {
        self.interval = interval.max(1);
        self.reset(now);
    }

    /// Offers a sample taken at timestamp `t`.
    ///
    /// Sub-interval samples are dropped, or folded into the averager when
    /// one is attached. A gap of two intervals or more is back-filled with
    /// copies of the *new* value (the best value available at that point);
    /// a gap wider than the whole buffer resets the series instead.
    pub fn push(&mut self, val: T, t: u32) {
        let dt = t.wrapping_sub(self.tstamp);

        if dt < self.interval {
            if let Some(avg) = self.averager.as_mut() {
                avg.push(&val);
            }
            return;
        }

        if dt >= 2 * self.interval {
            let missed = (dt / self.interval) as usize;
            if missed > self.ring.capacity() {
                log::debug!(target: TAG, "gap of {missed} intervals exceeds capacity, resetting");
                self.reset(t);
            } else {
                for _ in 0..missed - 1 {
                    self.ring.push(val.clone());
                }
            }
        }

        let sample = match self.averager.as_mut() {
            Some(avg) if avg.count() > 0 => {
                let out = avg.get();
                avg.reset();
                avg.push(&val);
                out
            }
            _ => val,
        };
        self.ring.push(sample);
        self.tstamp = t;
    }
}

/// One named series inside a container.
pub struct TsEntry<T> {
    pub id: u8,
    pub descr: String,
    pub series: TimeSeries<T>,
}

/// Collection of series with distinct intervals, fed from one sample
/// stream. Typically hooked to a meter callback: every push fans out to
/// all member series.
#[derive(Default)]
pub struct TsContainer<T> {
    entries: Vec<TsEntry<T>>,
}

impl<T: Clone> TsContainer<T> {
    pub fn new() -> Self {
        TsContainer {
            entries: Vec::new(),
        }
    }

    /// Creates and registers a series, returning its assigned id.
    ///
    /// `preferred_id` is honored when non-zero and free. Returns 0 when the
    /// id space is exhausted or the series storage could not be allocated.
    /// A default mean averager is attached for intervals above one unit.
    pub fn add_series(
        &mut self,
        capacity: usize,
        start_time: u32,
        period: u32,
        descr: &str,
        preferred_id: u8,
    ) -> u8
    where
        T: MeanDefault,
    {
        let mut series = TimeSeries::new(capacity, start_time, period);
        if series.is_inert() {
            return 0;
        }
        if period > 1 {
            series.set_averager(T::mean_averager());
        }

        let id = if preferred_id != 0 && !self.exist(preferred_id) {
            preferred_id
        } else {
            match (1..=u8::MAX).find(|id| !self.exist(*id)) {
                Some(id) => id,
                None => return 0,
            }
        };

        self.entries.push(TsEntry {
            id,
            descr: descr.to_string(),
            series,
        });
        id
    }

    pub fn exist(&self, id: u8) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn series(&self, id: u8) -> Option<&TimeSeries<T>> {
        self.entries.iter().find(|e| e.id == id).map(|e| &e.series)
    }

    pub fn series_mut(&mut self, id: u8) -> Option<&mut TimeSeries<T>> {
        self.entries
            .iter_mut()
            .find(|e| e.id == id)
            .map(|e| &mut e.series)
    }

    /// Drops a series; returns false when the id is unknown.
    pub fn remove_series(&mut self, id: u8) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    /// Offers one sample to every member series.
    pub fn push(&mut self, val: &T, t: u32) {
        for entry in self.entries.iter_mut() {
            entry.series.push(val.clone(), t);
        }
    }

    /// Total number of retained samples across all series.
    pub fn size(&self) -> usize {
        self.entries.iter().map(|e| e.series.len()).sum()
    }

    /// Total slot capacity across all series.
    pub fn capacity(&self) -> usize {
        self.entries.iter().map(|e| e.series.capacity()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TsEntry<T>> {
        self.entries.iter()
    }
}
