//! JSONL event store - append-only writer

use crate::error::EventError;
use crate::event::EventRecord;
use chrono::Utc;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Append-only JSONL event store, one file per UTC day
pub struct EventStore {
    base_path: PathBuf,
    current_file: Option<BufWriter<File>>,
    current_date: Option<String>,
    appended: u64,
}

impl EventStore {
    /// Create a new event store at the given path
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self, EventError> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;

        Ok(Self {
            base_path,
            current_file: None,
            current_date: None,
            appended: 0,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Records written through this handle
    pub fn appended(&self) -> u64 {
        self.appended
    }

    /// Append one record
    pub fn append(&mut self, record: &EventRecord) -> Result<(), EventError> {
        let date = record.recorded_at.format("%Y-%m-%d").to_string();

        if self.current_date.as_ref() != Some(&date) {
            self.rotate_file(&date)?;
        }

        if let Some(ref mut writer) = self.current_file {
            let json = serde_json::to_string(record)?;
            writeln!(writer, "{}", json)?;
            writer.flush()?;
            self.appended += 1;
        }

        Ok(())
    }

    /// Append records as one batch, in the file of the first record's day.
    ///
    /// Every record is serialized before anything is written and the batch
    /// goes out in a single write, so a commit never leaves a prefix of its
    /// records behind on a serialization error.
    pub fn append_all<'a>(
        &mut self,
        records: impl IntoIterator<Item = &'a EventRecord>,
    ) -> Result<(), EventError> {
        let mut records = records.into_iter().peekable();
        let Some(first) = records.peek() else {
            return Ok(());
        };
        let date = first.recorded_at.format("%Y-%m-%d").to_string();

        let mut batch = String::new();
        let mut count = 0u64;
        for record in records {
            batch.push_str(&serde_json::to_string(record)?);
            batch.push('\n');
            count += 1;
        }

        if self.current_date.as_ref() != Some(&date) {
            self.rotate_file(&date)?;
        }

        if let Some(ref mut writer) = self.current_file {
            writer.write_all(batch.as_bytes())?;
            writer.flush()?;
            self.appended += count;
        }

        Ok(())
    }

    fn rotate_file(&mut self, date: &str) -> Result<(), EventError> {
        if let Some(ref mut writer) = self.current_file {
            writer.flush()?;
        }

        let file_path = self.base_path.join(format!("{}.jsonl", date));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)?;
        tracing::debug!(file = %file_path.display(), "Event journal file opened");

        self.current_file = Some(BufWriter::new(file));
        self.current_date = Some(date.to_string());

        Ok(())
    }

    /// Path of today's journal file
    pub fn today_file_path(&self) -> PathBuf {
        let date = Utc::now().format("%Y-%m-%d").to_string();
        self.base_path.join(format!("{}.jsonl", date))
    }

    /// Flush and close the current file
    pub fn close(&mut self) -> Result<(), EventError> {
        if let Some(ref mut writer) = self.current_file {
            writer.flush()?;
        }
        self.current_file = None;
        self.current_date = None;
        Ok(())
    }
}

impl Drop for EventStore {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!(error = %e, "Failed to close event journal");
        }
    }
}
