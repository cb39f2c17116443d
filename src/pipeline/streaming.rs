//! Streaming loop: device batches → tagged records → sink.

use crate::defaults::{AUXILIARY_CHANNELS, PRIMARY_CHANNELS, RESERVED_COLUMNS};
use crate::device::{AcquisitionDevice, ChannelLayout, DeviceBatch};
use crate::error::{EegSyncError, Result};
use crate::pipeline::orchestrator::SessionResources;
use crate::pipeline::session::SessionState;
use crate::pipeline::sink::RecordSink;
use crate::pipeline::types::OutputRecord;
use chrono::{DateTime, Local};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Polls the device and forwards every sample to the sink until streaming stops.
#[derive(Debug, Clone, Copy)]
pub struct StreamingLoop {
    poll_interval: Duration,
}

impl StreamingLoop {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Runs on the caller's thread until the session leaves the streaming
    /// phase or the device/sink are taken away by shutdown.
    ///
    /// The first poll or write failure ends the loop with that error.
    pub(crate) fn run(&self, state: &SessionState, resources: &Mutex<SessionResources>) -> Result<u64> {
        let mut written = 0u64;
        while state.is_streaming() {
            {
                let mut guard = resources.lock().unwrap_or_else(|e| e.into_inner());
                let SessionResources { device, sink, .. } = &mut *guard;
                let (Some(device), Some(sink)) = (device.as_deref_mut(), sink.as_deref_mut()) else {
                    break;
                };
                if !state.is_streaming() {
                    break;
                }
                written += stream_once(state, device, sink)? as u64;
            }
            thread::sleep(self.poll_interval);
        }
        Ok(written)
    }
}

/// Pulls one batch and writes every sample in it. Returns the number written.
pub fn stream_once(
    state: &SessionState,
    device: &mut dyn AcquisitionDevice,
    sink: &mut dyn RecordSink,
) -> Result<usize> {
    let batch = device.poll()?;
    let layout = device.layout();
    if !batch.is_empty() && batch.num_rows() < layout.rows {
        return Err(EegSyncError::device(format!(
            "{} returned {} rows, layout expects {}",
            device.name(),
            batch.num_rows(),
            layout.rows
        )));
    }
    for sample in 0..batch.num_samples() {
        let index = state.next_sample_index();
        let label = state.current_label();
        let record = assemble_record(&batch, layout, sample, index, label);
        sink.append(&record)?;
    }
    Ok(batch.num_samples())
}

/// Maps one column of a device batch into the fixed output layout.
///
/// Missing channels are padded with zero; extra channels are dropped.
pub fn assemble_record(
    batch: &DeviceBatch,
    layout: &ChannelLayout,
    sample: usize,
    index: u64,
    label: Arc<str>,
) -> OutputRecord {
    let mut primary = [0.0; PRIMARY_CHANNELS];
    for (slot, &row) in primary.iter_mut().zip(layout.primary.iter()) {
        *slot = batch.value(row, sample).unwrap_or(0.0);
    }

    let mut auxiliary = [0.0; AUXILIARY_CHANNELS];
    for (slot, &row) in auxiliary.iter_mut().zip(layout.auxiliary.iter()) {
        *slot = batch.value(row, sample).unwrap_or(0.0);
    }

    let device_timestamp = batch.value(layout.timestamp, sample).unwrap_or(0.0);

    OutputRecord {
        index,
        primary,
        auxiliary,
        reserved: [0.0; RESERVED_COLUMNS],
        device_timestamp,
        label,
        formatted_timestamp: format_timestamp(device_timestamp),
    }
}

/// Local time `YYYY-mm-dd HH:MM:SS.mmm` for a Unix timestamp in seconds.
///
/// The fraction is rounded to microseconds first, then truncated to
/// milliseconds. Returns an empty string for unrepresentable values.
pub fn format_timestamp(seconds: f64) -> String {
    if !seconds.is_finite() {
        return String::new();
    }
    let mut whole = seconds.floor();
    let mut micros = ((seconds - whole) * 1_000_000.0).round() as u32;
    if micros >= 1_000_000 {
        whole += 1.0;
        micros = 0;
    }
    if whole < i64::MIN as f64 || whole > i64::MAX as f64 {
        return String::new();
    }
    match DateTime::from_timestamp(whole as i64, micros * 1000) {
        Some(utc) => utc
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S%.3f")
            .to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MockDevice;
    use crate::pipeline::sink::CollectorSink;

    fn small_layout() -> ChannelLayout {
        ChannelLayout {
            primary: vec![0, 1],
            auxiliary: vec![2],
            timestamp: 3,
            rows: 4,
        }
    }

    #[test]
    fn test_assemble_pads_missing_channels_with_zero() {
        let batch =
            DeviceBatch::from_rows(vec![vec![1.0], vec![2.0], vec![9.0], vec![1700000000.0]])
                .unwrap();
        let record = assemble_record(&batch, &small_layout(), 0, 1, Arc::from("A"));

        assert_eq!(record.primary[0], 1.0);
        assert_eq!(record.primary[1], 2.0);
        assert!(record.primary[2..].iter().all(|&v| v == 0.0));
        assert_eq!(record.auxiliary, [9.0, 0.0, 0.0]);
        assert_eq!(record.reserved, [0.0; RESERVED_COLUMNS]);
        assert_eq!(record.device_timestamp, 1700000000.0);
        assert_eq!(&*record.label, "A");
    }

    #[test]
    fn test_assemble_drops_extra_channels() {
        let rows = 20;
        let layout = ChannelLayout {
            primary: (0..18).collect(),
            auxiliary: vec![],
            timestamp: 19,
            rows,
        };
        let batch = DeviceBatch::from_rows((0..rows).map(|r| vec![r as f64]).collect()).unwrap();
        let record = assemble_record(&batch, &layout, 0, 1, Arc::from(""));

        assert_eq!(record.primary[15], 15.0);
        assert_eq!(record.device_timestamp, 19.0);
    }

    #[test]
    fn test_stream_once_assigns_sequential_indices() {
        let state = SessionState::new();
        let mut device = MockDevice::new().with_generated_batches(2, 5);
        let mut sink = CollectorSink::new();
        let collected = sink.collected();

        assert_eq!(stream_once(&state, &mut device, &mut sink).unwrap(), 5);
        assert_eq!(stream_once(&state, &mut device, &mut sink).unwrap(), 5);
        assert_eq!(stream_once(&state, &mut device, &mut sink).unwrap(), 0);

        let indices: Vec<u64> = collected.records().iter().map(|r| r.index).collect();
        assert_eq!(indices, (1..=10).collect::<Vec<u64>>());
        assert_eq!(state.sample_count(), 10);
    }

    #[test]
    fn test_stream_once_reads_label_at_emission() {
        let state = SessionState::new();
        let mut device = MockDevice::new().with_generated_batches(2, 2);
        let mut sink = CollectorSink::new();
        let collected = sink.collected();

        stream_once(&state, &mut device, &mut sink).unwrap();
        state.set_label("cue");
        stream_once(&state, &mut device, &mut sink).unwrap();

        let labels: Vec<String> = collected
            .records()
            .iter()
            .map(|r| r.label.to_string())
            .collect();
        assert_eq!(labels, vec!["", "", "cue", "cue"]);
    }

    #[test]
    fn test_stream_once_propagates_poll_error() {
        let state = SessionState::new();
        let mut device = MockDevice::new().with_poll_failure_after(0);
        let mut sink = CollectorSink::new();

        assert!(stream_once(&state, &mut device, &mut sink).is_err());
        assert_eq!(state.sample_count(), 0);
    }

    #[test]
    fn test_stream_once_propagates_sink_error() {
        let state = SessionState::new();
        let mut device = MockDevice::new().with_generated_batches(1, 3);
        let mut sink = CollectorSink::new().with_failure_after(1);

        assert!(stream_once(&state, &mut device, &mut sink).is_err());
    }

    #[test]
    fn test_stream_once_rejects_short_batch() {
        let state = SessionState::new();
        let short = DeviceBatch::from_rows(vec![vec![1.0], vec![2.0]]).unwrap();
        let mut device = MockDevice::new().with_layout(small_layout()).with_batch(short);
        let mut sink = CollectorSink::new();
        let collected = sink.collected();

        let err = stream_once(&state, &mut device, &mut sink).unwrap_err();
        assert!(matches!(err, EegSyncError::Device { .. }));
        assert!(collected.is_empty());
        assert_eq!(state.sample_count(), 0);
    }

    #[test]
    fn test_loop_exits_when_not_streaming() {
        let state = SessionState::new();
        let resources = Mutex::new(SessionResources::default());
        let written = StreamingLoop::new(Duration::from_millis(1))
            .run(&state, &resources)
            .unwrap();
        assert_eq!(written, 0);
    }

    #[test]
    fn test_format_timestamp_millisecond_precision() {
        let formatted = format_timestamp(1700000000.123);
        assert_eq!(formatted.len(), "2023-11-14 22:13:20.123".len());
        assert!(formatted.ends_with(".123"), "got {}", formatted);
    }

    #[test]
    fn test_format_timestamp_truncates_to_milliseconds() {
        let formatted = format_timestamp(1700000000.9996);
        assert!(formatted.ends_with(".999"), "got {}", formatted);
    }

    #[test]
    fn test_format_timestamp_rejects_non_finite() {
        assert_eq!(format_timestamp(f64::NAN), "");
        assert_eq!(format_timestamp(f64::INFINITY), "");
    }
}
