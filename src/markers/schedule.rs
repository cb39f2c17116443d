//! Marker schedule: the stimulus timeline loaded once per session.
//!
//! Source format is CSV with a header naming an offset column
//! (`time_seconds` or `offset_seconds`) and a `label` column. Headerless
//! two-column files (`offset,label`) are accepted as well. A UTF-8 byte
//! order mark, as written by spreadsheet exports, is ignored.
//!
//! Every record is a single line: a quoted field may contain commas and
//! `""` escapes but not line breaks.

use crate::error::{EegSyncError, Result};
use std::fs;
use std::io;
use std::path::Path;

const OFFSET_COLUMNS: &[&str] = &["time_seconds", "offset_seconds", "time", "offset"];
const LABEL_COLUMNS: &[&str] = &["label", "marker"];

/// One labelled point on the stimulus timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerEvent {
    /// Seconds after the recording start reference.
    pub offset_seconds: f64,
    pub label: String,
}

/// Immutable list of marker events, strictly ascending by offset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerSchedule {
    events: Vec<MarkerEvent>,
}

impl MarkerSchedule {
    /// Empty schedule: every sample is recorded without a label.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a schedule from events in any order.
    ///
    /// Events are sorted by offset; when several share an offset only the last
    /// one is kept, since the scheduler would supersede the others anyway.
    pub fn from_events(mut events: Vec<MarkerEvent>) -> Self {
        events.sort_by(|a, b| a.offset_seconds.total_cmp(&b.offset_seconds));
        let mut deduped: Vec<MarkerEvent> = Vec::with_capacity(events.len());
        for event in events {
            match deduped.last_mut() {
                Some(last) if last.offset_seconds == event.offset_seconds => *last = event,
                _ => deduped.push(event),
            }
        }
        Self { events: deduped }
    }

    /// Parses CSV text. `source` names the input in error messages.
    pub fn parse(text: &str, source: &str) -> Result<Self> {
        let malformed = |line: usize, message: String| EegSyncError::MarkerFile {
            path: source.to_string(),
            message: format!("line {}: {}", line, message),
        };

        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim_end_matches('\r')))
            .filter(|(_, l)| !l.trim().is_empty());

        let Some((first_no, first_line)) = lines.next() else {
            return Ok(Self::empty());
        };

        let first_fields = split_csv_line(first_line)
            .ok_or_else(|| malformed(first_no, "unterminated quoted field".to_string()))?;
        let headerless = first_fields
            .first()
            .is_some_and(|f| f.trim().parse::<f64>().is_ok());

        let (offset_col, label_col) = if headerless {
            (0, 1)
        } else {
            let find = |names: &[&str]| {
                first_fields
                    .iter()
                    .position(|f| names.contains(&f.trim().to_ascii_lowercase().as_str()))
            };
            let offset_col = find(OFFSET_COLUMNS).ok_or_else(|| {
                malformed(first_no, "missing offset column (time_seconds)".to_string())
            })?;
            let label_col = find(LABEL_COLUMNS)
                .ok_or_else(|| malformed(first_no, "missing label column".to_string()))?;
            (offset_col, label_col)
        };

        let data_lines: Vec<(usize, &str)> = if headerless {
            std::iter::once((first_no, first_line)).chain(lines).collect()
        } else {
            lines.collect()
        };

        let mut events = Vec::with_capacity(data_lines.len());
        for (line_no, line) in data_lines {
            let fields = split_csv_line(line)
                .ok_or_else(|| malformed(line_no, "unterminated quoted field".to_string()))?;
            let raw_offset = fields
                .get(offset_col)
                .map(|f| f.trim())
                .ok_or_else(|| malformed(line_no, "missing offset".to_string()))?;
            let offset_seconds: f64 = raw_offset
                .parse()
                .map_err(|_| malformed(line_no, format!("invalid offset '{}'", raw_offset)))?;
            if !offset_seconds.is_finite() || offset_seconds < 0.0 {
                return Err(malformed(
                    line_no,
                    format!("offset must be a non-negative number, got {}", raw_offset),
                ));
            }
            let label = fields
                .get(label_col)
                .map(|f| f.trim().to_string())
                .unwrap_or_default();
            if label.is_empty() {
                return Err(malformed(line_no, "empty label".to_string()));
            }
            events.push(MarkerEvent {
                offset_seconds,
                label,
            });
        }

        Ok(Self::from_events(events))
    }

    /// Loads a schedule file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| EegSyncError::MarkerFile {
            path: path.display().to_string(),
            message: if e.kind() == io::ErrorKind::NotFound {
                "not found".to_string()
            } else {
                e.to_string()
            },
        })?;
        Self::parse(&text, &path.display().to_string())
    }

    /// Loads a schedule file, degrading to an empty schedule on any problem.
    ///
    /// Returns the schedule and the warning that caused the fallback, if any.
    pub fn load_or_empty(path: &Path) -> (Self, Option<EegSyncError>) {
        match Self::load(path) {
            Ok(schedule) => (schedule, None),
            Err(e) => (Self::empty(), Some(e)),
        }
    }

    pub fn events(&self) -> &[MarkerEvent] {
        &self.events
    }

    pub fn get(&self, index: usize) -> Option<&MarkerEvent> {
        self.events.get(index)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Offset of the last event, or zero for an empty schedule.
    pub fn span_seconds(&self) -> f64 {
        self.events.last().map_or(0.0, |e| e.offset_seconds)
    }

    /// Human-readable listing of the first `n` events.
    pub fn preview(&self, n: usize) -> String {
        let mut out = String::new();
        for (i, event) in self.events.iter().take(n).enumerate() {
            out.push_str(&format!(
                "{:>4}  {:>9.3}s  {}\n",
                i, event.offset_seconds, event.label
            ));
        }
        if self.events.len() > n {
            out.push_str(&format!("      ... {} more\n", self.events.len() - n));
        }
        out
    }
}

/// Splits one CSV line, honouring double-quoted fields and `""` escapes.
///
/// Returns `None` if a quoted field is still open at the end of the line.
pub(crate) fn split_csv_line(line: &str) -> Option<Vec<String>> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    if in_quotes {
        return None;
    }
    fields.push(field);
    Some(fields)
}
