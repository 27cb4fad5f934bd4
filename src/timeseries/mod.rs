//! # Time-Series Collection
//!
//! Ring-buffered collectors for meter readings: the [`RingBuff`]
//! container, the interval-gated [`TimeSeries`] wrapper, sample
//! [`Averager`]s and the multi-series [`TsContainer`].

pub mod average;
pub mod ring;
pub mod series;

pub use average::{AcMeanAverage, Averager, DcMeanAverage, MeanDefault};
pub use ring::{RingBuff, RingIter};
pub use series::{TimeSeries, TsContainer, TsEntry};
