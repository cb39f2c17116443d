//! Synthetic board: a hardware-free acquisition device.
//!
//! Emits sine-wave EXG data paced by the wall clock at a fixed sample rate,
//! so the whole pipeline can be exercised without an amplifier attached.

use crate::defaults;
use crate::device::adapter::{AcquisitionDevice, ChannelLayout, DeviceBatch};
use crate::error::{EegSyncError, Result};
use std::f64::consts::TAU;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Cap on samples produced by a single poll, so a stalled caller does not
/// receive one enormous batch.
const MAX_BATCH: u64 = 4096;

pub struct SyntheticDevice {
    layout: ChannelLayout,
    sample_rate: u32,
    prepared: bool,
    stream_start: Option<(Instant, f64)>,
    emitted: u64,
}

impl SyntheticDevice {
    pub fn new(sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(EegSyncError::ConfigInvalidValue {
                key: "device.sample_rate".to_string(),
                message: "must be positive".to_string(),
            });
        }
        Ok(Self {
            layout: ChannelLayout::cyton_daisy(),
            sample_rate,
            prepared: false,
            stream_start: None,
            emitted: 0,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn generate(&self, first: u64, count: u64, epoch_start: f64) -> Result<DeviceBatch> {
        let size = count as usize;
        let mut rows = vec![vec![0.0; size]; self.layout.rows];
        let rate = self.sample_rate as f64;

        for i in 0..size {
            let n = first + i as u64;
            let t = n as f64 / rate;
            rows[0][i] = (n % 256) as f64;
            for (ch, &row) in self.layout.primary.iter().enumerate() {
                // 8-12 Hz band, one frequency per channel, tens of microvolts
                let freq = 8.0 + (ch % 5) as f64;
                let amplitude = 20.0 + ch as f64;
                rows[row][i] = amplitude * (TAU * freq * t).sin();
            }
            for (axis, &row) in self.layout.auxiliary.iter().enumerate() {
                rows[row][i] = if axis == 2 { 1.0 } else { 0.0 };
            }
            rows[self.layout.timestamp][i] = epoch_start + t;
        }

        DeviceBatch::from_rows(rows)
    }
}

impl AcquisitionDevice for SyntheticDevice {
    fn prepare(&mut self) -> Result<()> {
        self.prepared = true;
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if !self.prepared {
            return Err(EegSyncError::device("synthetic board: start before prepare"));
        }
        let epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| EegSyncError::device(format!("system clock before epoch: {}", e)))?;
        self.stream_start = Some((Instant::now(), epoch.as_secs_f64()));
        self.emitted = 0;
        Ok(())
    }

    fn poll(&mut self) -> Result<DeviceBatch> {
        let Some((started, epoch_start)) = self.stream_start else {
            return Ok(DeviceBatch::empty());
        };

        let due = (started.elapsed().as_secs_f64() * self.sample_rate as f64) as u64;
        let count = due.saturating_sub(self.emitted).min(MAX_BATCH);
        if count == 0 {
            return Ok(DeviceBatch::empty());
        }

        let batch = self.generate(self.emitted, count, epoch_start)?;
        self.emitted += count;
        Ok(batch)
    }

    fn stop(&mut self) -> Result<()> {
        self.stream_start = None;
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.stream_start = None;
        self.prepared = false;
        Ok(())
    }

    fn layout(&self) -> &ChannelLayout {
        &self.layout
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

impl Default for SyntheticDevice {
    fn default() -> Self {
        Self {
            layout: ChannelLayout::cyton_daisy(),
            sample_rate: defaults::SAMPLE_RATE,
            prepared: false,
            stream_start: None,
            emitted: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_zero_sample_rate_rejected() {
        assert!(SyntheticDevice::new(0).is_err());
    }

    #[test]
    fn test_start_requires_prepare() {
        let mut device = SyntheticDevice::new(250).unwrap();
        assert!(device.start().is_err());
        device.prepare().unwrap();
        assert!(device.start().is_ok());
    }

    #[test]
    fn test_poll_before_start_is_empty() {
        let mut device = SyntheticDevice::new(250).unwrap();
        device.prepare().unwrap();
        assert!(device.poll().unwrap().is_empty());
    }

    #[test]
    fn test_produces_samples_paced_by_rate() {
        let mut device = SyntheticDevice::new(1000).unwrap();
        device.prepare().unwrap();
        device.start().unwrap();

        thread::sleep(Duration::from_millis(50));
        let batch = device.poll().unwrap();

        assert!(batch.num_samples() >= 40, "got {}", batch.num_samples());
        assert_eq!(batch.num_rows(), device.layout().rows);
    }

    #[test]
    fn test_timestamps_increase_across_polls() {
        let mut device = SyntheticDevice::new(1000).unwrap();
        device.prepare().unwrap();
        device.start().unwrap();
        let ts_row = device.layout().timestamp;

        thread::sleep(Duration::from_millis(10));
        let first = device.poll().unwrap();
        thread::sleep(Duration::from_millis(10));
        let second = device.poll().unwrap();

        let last_first = first.value(ts_row, first.num_samples() - 1).unwrap();
        let first_second = second.value(ts_row, 0).unwrap();
        assert!(first_second > last_first);
    }

    #[test]
    fn test_stop_and_release_are_idempotent() {
        let mut device = SyntheticDevice::default();
        device.prepare().unwrap();
        device.start().unwrap();
        assert!(device.stop().is_ok());
        assert!(device.stop().is_ok());
        assert!(device.release().is_ok());
        assert!(device.release().is_ok());
        assert!(device.poll().unwrap().is_empty());
    }
}
