//! GPU timestamp statistics
//!
//! A frame writes a start and end timestamp around each timed region. After the
//! frame is submitted the collector reads those slots back, converts each pair to
//! milliseconds and folds the result into running means.

use crate::device::{Owned, QueryPoolHandle, SharedDevice, TimestampProperties};
use crate::orchestrator::StrategyEntry;
use crate::{Error, Result};

/// Slots in the query pool, enough for two timed regions
pub const QUERY_POOL_SIZE: u32 = 4;

/// Returns the mask selecting the meaningful bits of a timestamp
pub fn timestamp_mask(valid_bits: u32) -> u64 {
    match valid_bits {
        0 => 0,
        64.. => u64::MAX,
        bits => !0u64 >> (64 - bits),
    }
}

/// Converts a timestamp pair into milliseconds
///
/// The subtraction is modular within `mask`, so a counter that wrapped between the
/// two writes still yields the right interval.
///
/// # Arguments
/// * `start` - Raw timestamp written before the region
/// * `end` - Raw timestamp written after the region
/// * `mask` - Valid-bit mask from [`timestamp_mask`]
/// * `period_ns` - Nanoseconds per tick
pub fn elapsed_ms(start: u64, end: u64, mask: u64, period_ns: f32) -> f64 {
    let ticks = (end & mask).wrapping_sub(start & mask) & mask;
    ticks as f64 * f64::from(period_ns) * 1e-6
}

/// Incremental arithmetic mean
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct RunningMean {
    mean: f64,
    count: u64,
}

impl RunningMean {
    /// Folds in a value and returns the new mean
    pub fn push(&mut self, value: f64) -> f64 {
        self.mean = (value + self.mean * self.count as f64) / (self.count + 1) as f64;
        self.count += 1;
        self.mean
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

/// Elapsed time of one timed region
#[derive(Debug, Clone, PartialEq)]
pub struct RegionTiming {
    pub label: &'static str,
    pub start_slot: u32,
    pub end_slot: u32,
    pub elapsed_ms: f64,
}

/// Timings of one frame
#[derive(Debug, Clone, PartialEq)]
pub struct TimingSample {
    pub regions: Vec<RegionTiming>,
    pub total_ms: f64,
}

/// Reads back timestamps and keeps per-region running means
#[derive(Debug)]
pub struct TimingCollector {
    device: SharedDevice,
    pool: Owned<QueryPoolHandle>,
    mask: u64,
    period_ns: f32,
    region_means: Vec<RunningMean>,
    total_mean: RunningMean,
    frames: u64,
    last: Option<TimingSample>,
    pending: bool,
}

impl TimingCollector {
    /// Creates the query pool and captures the device's timestamp properties
    pub fn new(device: &SharedDevice) -> Result<Self> {
        let TimestampProperties { valid_bits, period_ns } = device.timestamp_properties();
        if valid_bits == 0 {
            return Err(Error::TimestampsUnavailable);
        }

        let pool = Owned::new(device, device.create_query_pool(QUERY_POOL_SIZE)?);
        Ok(Self {
            device: device.clone(),
            pool,
            mask: timestamp_mask(valid_bits),
            period_ns,
            region_means: Vec::new(),
            total_mean: RunningMean::default(),
            frames: 0,
            last: None,
            pending: false,
        })
    }

    pub fn query_pool(&self) -> QueryPoolHandle {
        self.pool.handle()
    }

    /// Marks that a frame has been submitted and its timestamps can be read
    pub fn mark_submitted(&mut self) {
        self.pending = true;
    }

    /// Reads the last submitted frame's timestamps and updates the statistics
    ///
    /// Returns `None` when no frame has been submitted since construction or the last reset.
    pub fn collect(&mut self, entry: &StrategyEntry) -> Result<Option<&TimingSample>> {
        if !self.pending {
            return Ok(None);
        }
        self.pending = false;

        let slots = entry.query_slots();
        let values = self.device.read_timestamps(self.pool.handle(), slots)?;
        if values.len() != slots as usize {
            return Err(Error::QuerySlotMismatch {
                written: values.len() as u32,
                expected: slots,
            });
        }

        let labels = entry.region_labels();
        if self.region_means.len() != labels.len() {
            self.region_means = vec![RunningMean::default(); labels.len()];
        }

        let mut regions = Vec::with_capacity(labels.len());
        for (index, &label) in labels.iter().enumerate() {
            let start_slot = 2 * index as u32;
            let end_slot = start_slot + 1;
            let elapsed = elapsed_ms(values[start_slot as usize], values[end_slot as usize], self.mask, self.period_ns);
            self.region_means[index].push(elapsed);
            regions.push(RegionTiming {
                label,
                start_slot,
                end_slot,
                elapsed_ms: elapsed,
            });
        }

        let total_ms = regions.iter().map(|r| r.elapsed_ms).sum();
        self.total_mean.push(total_ms);
        self.frames += 1;
        tracing::trace!("Frame {} took {total_ms:.4} ms on the GPU", self.frames);

        self.last = Some(TimingSample { regions, total_ms });
        Ok(self.last.as_ref())
    }

    /// Clears every mean, the frame count and any unread frame
    pub fn reset(&mut self) {
        self.region_means.clear();
        self.total_mean = RunningMean::default();
        self.frames = 0;
        self.last = None;
        self.pending = false;
    }

    /// Frames folded into the means since the last reset
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn last(&self) -> Option<&TimingSample> {
        self.last.as_ref()
    }

    /// Running mean of each region, in region order
    pub fn region_means(&self) -> &[RunningMean] {
        &self.region_means
    }

    pub fn total_mean(&self) -> &RunningMean {
        &self.total_mean
    }
}
