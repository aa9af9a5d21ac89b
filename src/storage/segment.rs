//! Segment lifecycle
//!
//! ```text
//!   add / add_batch         write(dir)            close()
//! ┌──────────┐  ───────►  ┌─────────┐  ───────►  ┌────────┐
//! │ InMemory │            │ Writing │            │ OnDisk │
//! └──────────┘  ◄───────  └─────────┘            └────────┘
//!                write failed
//! ```
//!
//! Events are validated against the index schema and appended to one
//! in-memory [`Column`] per field. `write` sorts every column by `_time`
//! and hands them to the writer; `close` releases the in-memory columns.
//! Any call outside its state fails with [`StorageError::InvalidState`].

use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};

use roaring::RoaringBitmap;
use serde::Serialize;
use uuid::Uuid;

use crate::config::Config;
use crate::encoding::EncodingKind;
use crate::storage::column::{check_range, check_value, tokenize, Column, ColumnValues};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::reader::{read_segment, SegmentReader};
use crate::storage::types::{Event, FieldInfo, FieldType, IndexInfo, Value, TIME_FIELD};
use crate::storage::writer::{self, SegmentMeta, WriteOptions, INFO_FILE};

/// Read access to one column, in memory or on disk
pub trait ColumnScan {
    fn field(&self) -> &FieldInfo;

    fn row_count(&self) -> u32;

    /// Rows holding `value`; `None` when nothing matches
    fn lookup(&self, value: &Value) -> StorageResult<Option<RoaringBitmap>>;

    /// Rows whose value lies in `[lo, hi]` (numeric fields only)
    fn range(&self, lo: &Value, hi: &Value) -> StorageResult<RoaringBitmap>;

    /// Values of rows `rows.start..rows.end`, clamped to the column
    fn scan(&self, rows: Range<u32>) -> StorageResult<ColumnValues>;
}

/// Read access to a whole segment
pub trait SegmentSource {
    fn info(&self) -> &IndexInfo;

    fn event_count(&self) -> u32;

    /// `(min, max)` of `_time`, `None` for an empty segment
    fn time_range(&self) -> Option<(i64, i64)>;

    fn column(&self, name: &str) -> Option<&dyn ColumnScan>;

    /// Rebuild events for a row range
    fn events(&self, rows: Range<u32>) -> StorageResult<Vec<Event>> {
        let mut columns = Vec::with_capacity(self.info().fields().len());
        for field in self.info().fields() {
            let column = self.column(&field.name).ok_or_else(|| {
                StorageError::InvalidState(format!("Column {} is not available", field.name))
            })?;
            columns.push((field.name.as_str(), column.scan(rows.clone())?));
        }

        let count = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        let mut events = Vec::with_capacity(count);
        for i in 0..count {
            let mut event = Event::new(0);
            for (name, values) in &columns {
                match values.get(i) {
                    Some(Value::Timestamp(ts)) if *name == TIME_FIELD => event.timestamp = ts,
                    Some(value) => {
                        event.values.insert(name.to_string(), value);
                    }
                    None => {
                        return Err(StorageError::Corruption(format!(
                            "Column {} has fewer rows than {}",
                            name, TIME_FIELD
                        )))
                    }
                }
            }
            events.push(event);
        }
        Ok(events)
    }
}

/// Lifecycle state of a [`Segment`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentState {
    /// Accepting events
    InMemory,
    /// Files written, columns still held
    Writing,
    /// Persisted and released
    OnDisk,
}

impl fmt::Display for SegmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentState::InMemory => write!(f, "in_memory"),
            SegmentState::Writing => write!(f, "writing"),
            SegmentState::OnDisk => write!(f, "on_disk"),
        }
    }
}

/// A batch of events for one index, built in memory then persisted once
#[derive(Debug)]
pub struct Segment {
    id: Uuid,
    info: IndexInfo,
    columns: Vec<Column>,
    event_count: u32,
    min_time: i64,
    max_time: i64,
    state: SegmentState,
    options: WriteOptions,
    path: Option<PathBuf>,
}

impl Segment {
    pub fn new(info: IndexInfo) -> Self {
        Self::with_options(info, WriteOptions::default())
    }

    pub fn with_config(info: IndexInfo, config: &Config) -> Self {
        Self::with_options(info, WriteOptions::from(config))
    }

    pub fn with_options(info: IndexInfo, options: WriteOptions) -> Self {
        let columns = info.fields().iter().cloned().map(Column::new).collect();
        Self {
            id: Uuid::new_v4(),
            info,
            columns,
            event_count: 0,
            min_time: i64::MAX,
            max_time: i64::MIN,
            state: SegmentState::InMemory,
            options,
            path: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SegmentState {
        self.state
    }

    pub fn options(&self) -> &WriteOptions {
        &self.options
    }

    /// Directory the segment was written to
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn expect_state(&self, expected: SegmentState, operation: &str) -> StorageResult<()> {
        if self.state == expected {
            return Ok(());
        }
        tracing::error!(
            segment = %self.id,
            state = %self.state,
            operation,
            "Segment operation in wrong state"
        );
        Err(StorageError::InvalidState(format!(
            "Cannot {} segment {} in state {}",
            operation, self.id, self.state
        )))
    }

    /// Values of `event` in field order, or the first schema violation.
    /// Undeclared names in the event are ignored.
    fn row_of(&self, event: &Event) -> StorageResult<Vec<Value>> {
        self.columns
            .iter()
            .map(|column| -> StorageResult<Value> {
                let value = event
                    .get(&column.field().name)
                    .ok_or_else(|| StorageError::MissingField(column.field().name.clone()))?;
                column.check(&value)?;
                Ok(value)
            })
            .collect()
    }

    fn ensure_capacity(&self, additional: usize) -> StorageResult<()> {
        let total = self.event_count as u64 + additional as u64;
        if total > u32::MAX as u64 {
            return Err(StorageError::InvalidState(format!(
                "Segment {} cannot hold {} events",
                self.id, total
            )));
        }
        Ok(())
    }

    fn append(&mut self, row: Vec<Value>, timestamp: i64) -> StorageResult<u32> {
        for (column, value) in self.columns.iter_mut().zip(row) {
            column.push(value)?;
        }
        self.min_time = self.min_time.min(timestamp);
        self.max_time = self.max_time.max(timestamp);
        let row_id = self.event_count;
        self.event_count += 1;
        Ok(row_id)
    }

    /// Append one event, returning its arrival row id.
    /// Row ids are renumbered in time order when the segment is written.
    pub fn add(&mut self, event: &Event) -> StorageResult<u32> {
        self.expect_state(SegmentState::InMemory, "add to")?;
        self.ensure_capacity(1)?;
        let row = self.row_of(event)?;
        self.append(row, event.timestamp)
    }

    /// Append a batch atomically: either every event is added or none
    pub fn add_batch(&mut self, events: &[Event]) -> StorageResult<Range<u32>> {
        self.expect_state(SegmentState::InMemory, "add to")?;
        self.ensure_capacity(events.len())?;
        let rows = events
            .iter()
            .map(|e| self.row_of(e))
            .collect::<StorageResult<Vec<_>>>()?;

        let start = self.event_count;
        for (row, event) in rows.into_iter().zip(events) {
            self.append(row, event.timestamp)?;
        }
        tracing::debug!(segment = %self.id, events = events.len(), "Batch added");
        Ok(start..self.event_count)
    }

    /// Persist into `dir` (created if needed). On failure the segment goes
    /// back to `InMemory` so the write can be retried elsewhere.
    pub fn write(&mut self, dir: impl AsRef<Path>) -> StorageResult<PathBuf> {
        self.expect_state(SegmentState::InMemory, "write")?;
        let dir = dir.as_ref();
        if dir.join(INFO_FILE).exists() {
            return Err(StorageError::InvalidState(format!(
                "A segment already exists at {:?}",
                dir
            )));
        }
        std::fs::create_dir_all(dir)?;

        self.state = SegmentState::Writing;
        match self.persist(dir) {
            Ok(()) => {
                self.path = Some(dir.to_path_buf());
                Ok(dir.to_path_buf())
            }
            Err(e) => {
                tracing::warn!(segment = %self.id, path = ?dir, "Segment write failed: {}", e);
                self.state = SegmentState::InMemory;
                Err(e)
            }
        }
    }

    fn persist(&mut self, dir: &Path) -> StorageResult<()> {
        if let Some(order) = self.columns[0].sort_map() {
            for column in &mut self.columns {
                column.apply_sort_map(&order)?;
            }
            tracing::debug!(segment = %self.id, events = order.len(), "Sorted events by time");
        }

        let mut encodings: Vec<EncodingKind> = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            encodings.push(writer::write_column(dir, column, &self.options)?);
        }
        writer::write_info(dir, &self.info, &encodings, &self.meta(), self.options.sync)?;

        tracing::info!(
            segment = %self.id,
            index = %self.info.name,
            events = self.event_count,
            path = ?dir,
            "Segment written"
        );
        Ok(())
    }

    fn meta(&self) -> SegmentMeta {
        let (min_time, max_time) = self.time_range().unwrap_or((0, 0));
        SegmentMeta {
            id: self.id,
            event_count: self.event_count,
            min_time,
            max_time,
        }
    }

    /// Finish a written segment and drop its in-memory columns
    pub fn close(&mut self) -> StorageResult<()> {
        self.expect_state(SegmentState::Writing, "close")?;
        self.columns = Vec::new();
        self.state = SegmentState::OnDisk;
        tracing::debug!(segment = %self.id, "Segment closed");
        Ok(())
    }

    /// Open the persisted files of an `OnDisk` segment
    pub fn open(&self) -> StorageResult<SegmentReader> {
        self.expect_state(SegmentState::OnDisk, "open")?;
        match &self.path {
            Some(path) => read_segment(path),
            None => Err(StorageError::InvalidState(format!(
                "Segment {} has no path",
                self.id
            ))),
        }
    }
}

impl SegmentSource for Segment {
    fn info(&self) -> &IndexInfo {
        &self.info
    }

    fn event_count(&self) -> u32 {
        self.event_count
    }

    fn time_range(&self) -> Option<(i64, i64)> {
        (self.event_count > 0).then_some((self.min_time, self.max_time))
    }

    /// `None` once the segment is closed
    fn column(&self, name: &str) -> Option<&dyn ColumnScan> {
        self.columns
            .iter()
            .find(|c| c.field().name == name)
            .map(|c| c as &dyn ColumnScan)
    }
}

impl ColumnScan for Column {
    fn field(&self) -> &FieldInfo {
        Column::field(self)
    }

    fn row_count(&self) -> u32 {
        self.len() as u32
    }

    fn lookup(&self, value: &Value) -> StorageResult<Option<RoaringBitmap>> {
        self.check(value)?;
        let mut rows = RoaringBitmap::new();
        self.values()
            .matching_rows(self.field().field_type, value, 0, &mut rows);
        Ok((!rows.is_empty()).then_some(rows))
    }

    fn range(&self, lo: &Value, hi: &Value) -> StorageResult<RoaringBitmap> {
        check_range(self.field(), lo, hi)?;
        let mut rows = RoaringBitmap::new();
        self.values().rows_in_range(lo, hi, 0, &mut rows);
        Ok(rows)
    }

    fn scan(&self, rows: Range<u32>) -> StorageResult<ColumnValues> {
        let mut values = self.values().clone();
        values.retain_range(rows.start as usize, rows.end as usize);
        Ok(values)
    }
}

/// Query terms of a text lookup; keywords and numbers match whole
pub(crate) fn query_terms(field: &FieldInfo, value: &Value) -> StorageResult<Vec<Vec<u8>>> {
    check_value(field, value)?;
    Ok(match (field.field_type, value) {
        (FieldType::Text, Value::Str(s)) => tokenize(s).map(String::into_bytes).collect(),
        (_, Value::Str(s)) => vec![s.as_bytes().to_vec()],
        _ => Vec::new(),
    })
}
