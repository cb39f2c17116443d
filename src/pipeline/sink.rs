use crate::error::{EegSyncError, Result};
use crate::pipeline::types::{OutputRecord, output_header};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Pluggable persistence for tagged samples.
/// Pairs with AcquisitionDevice for input - this handles the recorded output.
pub trait RecordSink: Send + 'static {
    /// Persist one record. Must be durable when this returns.
    fn append(&mut self, record: &OutputRecord) -> Result<()>;

    /// Flush and release the underlying artifact. Safe to call twice.
    fn close(&mut self) -> Result<()>;

    /// Where the records go, for the session summary.
    fn location(&self) -> String;

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "sink"
    }
}

/// Append-only CSV writer: header on open, one flushed row per record.
pub struct CsvSink<W: Write + Send + 'static> {
    writer: Option<W>,
    location: String,
    rows_written: u64,
    line: String,
}

impl CsvSink<BufWriter<File>> {
    /// Create (or truncate) `path` and write the header row.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| {
            EegSyncError::persistence(format!("cannot create {}: {}", path.display(), e))
        })?;
        Self::from_writer(BufWriter::new(file), path.display().to_string())
    }
}

impl<W: Write + Send + 'static> CsvSink<W> {
    /// Wrap any writer (testing/library use). Writes the header immediately.
    pub fn from_writer(writer: W, location: impl Into<String>) -> Result<Self> {
        let mut sink = Self {
            writer: Some(writer),
            location: location.into(),
            rows_written: 0,
            line: String::with_capacity(512),
        };
        let header = output_header()
            .iter()
            .map(|h| escape_field(h))
            .collect::<Vec<_>>()
            .join(",");
        sink.write_line(&header)?;
        Ok(sink)
    }

    /// Data rows written so far (header excluded).
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| EegSyncError::persistence("sink already closed"))?;
        writer
            .write_all(line.as_bytes())
            .and_then(|_| writer.write_all(b"\n"))
            .and_then(|_| writer.flush())
            .map_err(|e| EegSyncError::persistence(format!("{}: {}", self.location, e)))
    }
}

impl<W: Write + Send + 'static> RecordSink for CsvSink<W> {
    fn append(&mut self, record: &OutputRecord) -> Result<()> {
        let mut line = std::mem::take(&mut self.line);
        line.clear();
        format_row(record, &mut line);
        let result = self.write_line(&line);
        self.line = line;
        result?;
        self.rows_written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        match self.writer.take() {
            Some(mut writer) => writer
                .flush()
                .map_err(|e| EegSyncError::persistence(format!("{}: {}", self.location, e))),
            None => Ok(()),
        }
    }

    fn location(&self) -> String {
        self.location.clone()
    }

    fn name(&self) -> &'static str {
        "csv"
    }
}

/// Renders a record as one CSV line (without newline).
pub fn format_row(record: &OutputRecord, out: &mut String) {
    out.push_str(&record.index.to_string());
    for value in record
        .primary
        .iter()
        .chain(record.auxiliary.iter())
        .chain(record.reserved.iter())
        .chain(std::iter::once(&record.device_timestamp))
    {
        out.push(',');
        out.push_str(&value.to_string());
    }
    out.push(',');
    out.push_str(&escape_field(&record.label));
    out.push(',');
    out.push_str(&escape_field(&record.formatted_timestamp));
}

/// Quotes a field when it contains a separator, quote or line break.
pub fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Shared view on the records held by a [`CollectorSink`].
#[derive(Debug, Clone, Default)]
pub struct CollectedRecords {
    records: Arc<Mutex<Vec<OutputRecord>>>,
    closed: Arc<Mutex<u32>>,
}

impl CollectedRecords {
    pub fn records(&self) -> Vec<OutputRecord> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of times `close` was called on the sink.
    pub fn close_calls(&self) -> u32 {
        *self.closed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Keeps records in memory (testing/library use).
pub struct CollectorSink {
    collected: CollectedRecords,
    fail_after: Option<usize>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self {
            collected: CollectedRecords::default(),
            fail_after: None,
        }
    }

    /// Reject every append once `records` have been stored.
    pub fn with_failure_after(mut self, records: usize) -> Self {
        self.fail_after = Some(records);
        self
    }

    /// Handle for reading records after the sink has been moved.
    pub fn collected(&self) -> CollectedRecords {
        self.collected.clone()
    }
}

impl Default for CollectorSink {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordSink for CollectorSink {
    fn append(&mut self, record: &OutputRecord) -> Result<()> {
        let mut records = self
            .collected
            .records
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if self.fail_after.is_some_and(|limit| records.len() >= limit) {
            return Err(EegSyncError::persistence("collector full"));
        }
        records.push(record.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        *self.collected.closed.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}

/// Default output file name: `[Subject_<id>_]eeg_data_<YYYYmmdd_HHMMSS>.csv`.
pub fn default_output_path(dir: &Path, subject: Option<&str>) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let name = match subject {
        Some(id) if !id.trim().is_empty() => {
            format!("Subject_{}_{}_{}.csv", id.trim(), crate::defaults::OUTPUT_STEM, stamp)
        }
        _ => format!("{}_{}.csv", crate::defaults::OUTPUT_STEM, stamp),
    };
    dir.join(name)
}
