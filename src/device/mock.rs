use crate::device::adapter::{AcquisitionDevice, ChannelLayout, DeviceBatch};
use crate::error::{EegSyncError, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Calls observed by a [`MockDevice`], shared with the test through [`MockDeviceTracker`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockDeviceCalls {
    pub prepare: u32,
    pub start: u32,
    pub poll: u32,
    pub stop: u32,
    pub release: u32,
}

/// Read-only view on a mock device that has been moved into a session.
#[derive(Debug, Clone, Default)]
pub struct MockDeviceTracker {
    calls: Arc<Mutex<MockDeviceCalls>>,
}

impl MockDeviceTracker {
    pub fn calls(&self) -> MockDeviceCalls {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, f: impl FnOnce(&mut MockDeviceCalls)) {
        f(&mut self.calls.lock().unwrap_or_else(|e| e.into_inner()));
    }
}

/// Mock acquisition device for testing.
///
/// Hands out scripted batches one per poll, then empty batches.
#[derive(Debug)]
pub struct MockDevice {
    layout: ChannelLayout,
    batches: VecDeque<DeviceBatch>,
    tracker: MockDeviceTracker,
    should_fail_prepare: bool,
    should_fail_start: bool,
    fail_poll_after: Option<u32>,
    error_message: String,
}

impl MockDevice {
    /// Create a mock with the Cyton + Daisy layout and no batches.
    pub fn new() -> Self {
        Self {
            layout: ChannelLayout::cyton_daisy(),
            batches: VecDeque::new(),
            tracker: MockDeviceTracker::default(),
            should_fail_prepare: false,
            should_fail_start: false,
            fail_poll_after: None,
            error_message: "mock device error".to_string(),
        }
    }

    /// Use a custom channel layout.
    pub fn with_layout(mut self, layout: ChannelLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Queue a batch returned by a future poll.
    pub fn with_batch(mut self, batch: DeviceBatch) -> Self {
        self.batches.push_back(batch);
        self
    }

    /// Queue `count` batches of `batch_size` samples generated for the current layout.
    ///
    /// Sample `n` (0-based, across batches) carries `n` in every primary row and
    /// timestamp `1_700_000_000 + n / 1000`.
    pub fn with_generated_batches(mut self, count: usize, batch_size: usize) -> Self {
        let mut next = self.batches.iter().map(DeviceBatch::num_samples).sum::<usize>();
        for _ in 0..count {
            self.batches
                .push_back(generate_batch(&self.layout, next, batch_size));
            next += batch_size;
        }
        self
    }

    /// Configure the mock to fail on prepare
    pub fn with_prepare_failure(mut self) -> Self {
        self.should_fail_prepare = true;
        self
    }

    /// Configure the mock to fail on start
    pub fn with_start_failure(mut self) -> Self {
        self.should_fail_start = true;
        self
    }

    /// Fail every poll after `polls` successful ones.
    pub fn with_poll_failure_after(mut self, polls: u32) -> Self {
        self.fail_poll_after = Some(polls);
        self
    }

    /// Configure the error message for failures
    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    /// Handle for inspecting calls after the device has been moved.
    pub fn tracker(&self) -> MockDeviceTracker {
        self.tracker.clone()
    }

    fn failure(&self) -> EegSyncError {
        EegSyncError::device(self.error_message.clone())
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl AcquisitionDevice for MockDevice {
    fn prepare(&mut self) -> Result<()> {
        self.tracker.record(|c| c.prepare += 1);
        if self.should_fail_prepare {
            return Err(self.failure());
        }
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.tracker.record(|c| c.start += 1);
        if self.should_fail_start {
            return Err(self.failure());
        }
        Ok(())
    }

    fn poll(&mut self) -> Result<DeviceBatch> {
        let polls_before = self.tracker.calls().poll;
        self.tracker.record(|c| c.poll += 1);
        if let Some(limit) = self.fail_poll_after
            && polls_before >= limit
        {
            return Err(self.failure());
        }
        Ok(self.batches.pop_front().unwrap_or_default())
    }

    fn stop(&mut self) -> Result<()> {
        self.tracker.record(|c| c.stop += 1);
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.tracker.record(|c| c.release += 1);
        Ok(())
    }

    fn layout(&self) -> &ChannelLayout {
        &self.layout
    }

    fn name(&self) -> &str {
        "mock"
    }
}

fn generate_batch(layout: &ChannelLayout, first: usize, size: usize) -> DeviceBatch {
    let mut rows = vec![vec![0.0; size]; layout.rows];
    for offset in 0..size {
        let n = (first + offset) as f64;
        for &row in &layout.primary {
            rows[row][offset] = n;
        }
        for (i, &row) in layout.auxiliary.iter().enumerate() {
            rows[row][offset] = n + (i as f64) / 10.0;
        }
        rows[layout.timestamp][offset] = 1_700_000_000.0 + n / 1000.0;
    }
    // Rows are built with equal lengths above.
    DeviceBatch::from_rows(rows).unwrap_or_default()
}
