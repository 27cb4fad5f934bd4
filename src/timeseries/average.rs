//! # Sample Averaging
//!
//! Aggregation contract for samples falling between two series slots, plus
//! the mean implementations for both metrics families. Accumulators are
//! wide enough that a full interval of maxed-out registers cannot wrap.
//!
//! Energy is a cumulative counter, so its "average" is simply the latest
//! sample; alarm latches are not aggregated.

use crate::meter::ac::AcMetrics;
use crate::meter::dc::DcMetrics;

/// Aggregation of samples arriving faster than a series interval.
pub trait Averager<T>: Send {
    /// Feeds one sample into the aggregate.
    fn push(&mut self, sample: &T);

    /// Produces the aggregated value over the samples fed so far.
    fn get(&self) -> T;

    /// Drops the accumulated samples.
    fn reset(&mut self);

    /// Number of samples currently accumulated.
    fn count(&self) -> usize;
}

/// Types that can supply their default mean averager; a series container
/// attaches one automatically for multi-unit intervals.
pub trait MeanDefault: Sized {
    fn mean_averager() -> Box<dyn Averager<Self> + Send>;
}

/// Mean average over AC metrics.
#[derive(Debug, Default)]
pub struct AcMeanAverage {
    v: u64,
    c: u64,
    p: u64,
    e: u32,
    f: u64,
    pf: u64,
    cnt: usize,
}

impl AcMeanAverage {
    pub fn new() -> Self {
        AcMeanAverage::default()
    }
}

impl Averager<AcMetrics> for AcMeanAverage {
    fn push(&mut self, sample: &AcMetrics) {
        self.v += u64::from(sample.voltage);
        self.c += u64::from(sample.current);
        self.p += u64::from(sample.power);
        self.e = sample.energy;
        self.f += u64::from(sample.freq);
        self.pf += u64::from(sample.pf);
        self.cnt += 1;
    }

    fn get(&self) -> AcMetrics {
        if self.cnt == 0 {
            return AcMetrics::default();
        }
        let n = self.cnt as u64;
        AcMetrics {
            voltage: (self.v / n) as u16,
            current: (self.c / n) as u32,
            power: (self.p / n) as u32,
            energy: self.e,
            freq: (self.f / n) as u16,
            pf: (self.pf / n) as u16,
            alarm: 0,
        }
    }

    fn reset(&mut self) {
        *self = AcMeanAverage::default();
    }

    fn count(&self) -> usize {
        self.cnt
    }
}

impl MeanDefault for AcMetrics {
    fn mean_averager() -> Box<dyn Averager<Self> + Send> {
        Box::new(AcMeanAverage::new())
    }
}

/// Mean average over DC metrics.
#[derive(Debug, Default)]
pub struct DcMeanAverage {
    v: u64,
    c: u64,
    p: u64,
    e: u32,
    cnt: usize,
}

impl DcMeanAverage {
    pub fn new() -> Self {
        DcMeanAverage::default()
    }
}

impl Averager<DcMetrics> for DcMeanAverage {
    fn push(&mut self, sample: &DcMetrics) {
        self.v += u64::from(sample.voltage);
        self.c += u64::from(sample.current);
        self.p += u64::from(sample.power);
        self.e = sample.energy;
        self.cnt += 1;
    }

    fn get(&self) -> DcMetrics {
        if self.cnt == 0 {
            return DcMetrics::default();
        }
        let n = self.cnt as u64;
        DcMetrics {
            voltage: (self.v / n) as u16,
            current: (self.c / n) as u16,
            power: (self.p / n) as u32,
            energy: self.e,
            alarm_h: 0,
            alarm_l: 0,
        }
    }

    fn reset(&mut self) {
        *self = DcMeanAverage::default();
    }

    fn count(&self) -> usize {
        self.cnt
    }
}

impl MeanDefault for DcMetrics {
    fn mean_averager() -> Box<dyn Averager<Self> + Send> {
        Box::new(DcMeanAverage::new())
    }
}
