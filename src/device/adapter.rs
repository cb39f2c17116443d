use crate::defaults;
use crate::error::{EegSyncError, Result};

/// Trait for acquisition devices (EEG boards).
///
/// This trait allows swapping implementations (hardware driver, synthetic board, mock).
/// The call order is `prepare` → `start` → `poll`* → `stop` → `release`.
pub trait AcquisitionDevice: Send {
    /// Open the device session (serial link, handshake, buffers).
    fn prepare(&mut self) -> Result<()>;

    /// Start streaming samples into the device buffer.
    fn start(&mut self) -> Result<()>;

    /// Drain every sample buffered since the last poll.
    ///
    /// Returns an empty batch when nothing new arrived. Must not block for
    /// longer than a few milliseconds.
    fn poll(&mut self) -> Result<DeviceBatch>;

    /// Stop streaming. Must tolerate being called when not streaming.
    fn stop(&mut self) -> Result<()>;

    /// Release the device session. Must tolerate being called twice.
    fn release(&mut self) -> Result<()>;

    /// Row indices of each channel group inside a batch.
    fn layout(&self) -> &ChannelLayout;

    /// Name for logging/debugging.
    fn name(&self) -> &str {
        "device"
    }
}

/// Device-defined position of each channel group in a [`DeviceBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelLayout {
    /// Rows holding primary (EXG) channels, in output order.
    pub primary: Vec<usize>,
    /// Rows holding auxiliary (accelerometer) channels, in output order.
    pub auxiliary: Vec<usize>,
    /// Row holding the device timestamp (seconds since the Unix epoch).
    pub timestamp: usize,
    /// Total number of rows in a batch.
    pub rows: usize,
}

impl ChannelLayout {
    /// Layout of a Cyton + Daisy style board: package counter, 16 EXG rows,
    /// 3 accelerometer rows, timestamp.
    pub fn cyton_daisy() -> Self {
        let primary: Vec<usize> = (1..=defaults::PRIMARY_CHANNELS).collect();
        let aux_start = defaults::PRIMARY_CHANNELS + 1;
        let auxiliary: Vec<usize> = (aux_start..aux_start + defaults::AUXILIARY_CHANNELS).collect();
        let timestamp = aux_start + defaults::AUXILIARY_CHANNELS;
        Self {
            primary,
            auxiliary,
            timestamp,
            rows: timestamp + 1,
        }
    }

    /// Checks that every referenced row exists.
    pub fn validate(&self) -> Result<()> {
        let out_of_range = self
            .primary
            .iter()
            .chain(self.auxiliary.iter())
            .chain(std::iter::once(&self.timestamp))
            .find(|&&row| row >= self.rows);
        match out_of_range {
            Some(row) => Err(EegSyncError::device(format!(
                "channel layout references row {} but batches have {} rows",
                row, self.rows
            ))),
            None => Ok(()),
        }
    }
}

/// Channel-major block of samples: `rows[channel][sample]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceBatch {
    rows: Vec<Vec<f64>>,
}

impl DeviceBatch {
    /// Builds a batch from channel-major rows.
    ///
    /// Fails if the rows do not all have the same length.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        if let Some(first) = rows.first()
            && rows.iter().any(|r| r.len() != first.len())
        {
            return Err(EegSyncError::device("batch rows have unequal sample counts"));
        }
        Ok(Self { rows })
    }

    /// A batch with no samples.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of samples (columns) in the batch.
    pub fn num_samples(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.num_samples() == 0
    }

    /// Number of rows (channels) in the batch.
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Value at `row` for sample `sample`, if present.
    pub fn value(&self, row: usize, sample: usize) -> Option<f64> {
        self.rows.get(row).and_then(|r| r.get(sample)).copied()
    }
}
