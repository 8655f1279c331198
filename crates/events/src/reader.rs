//! JSONL event reader - sequential reader for replay

use crate::error::EventError;
use crate::event::EventRecord;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Sequential event reader for replay
pub struct EventReader {
    files: Vec<PathBuf>,
}

impl EventReader {
    /// Collect every `.jsonl` file under `path`, oldest first
    pub fn from_directory(path: impl AsRef<Path>) -> Result<Self, EventError> {
        let path = path.as_ref();
        let mut files = Vec::new();

        if path.exists() {
            for entry in std::fs::read_dir(path)? {
                let file_path = entry?.path();
                if file_path.extension().is_some_and(|ext| ext == "jsonl") {
                    files.push(file_path);
                }
            }
        }

        files.sort();

        Ok(Self { files })
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Read every record from every file, in order
    pub fn read_all(&self) -> Result<Vec<EventRecord>, EventError> {
        let mut records = Vec::new();
        for file_path in &self.files {
            read_file(file_path, &mut records)?;
        }
        Ok(records)
    }

    /// Read every record and check that sequences are contiguous from the
    /// first one
    pub fn replay(&self) -> Result<Vec<EventRecord>, EventError> {
        let records = self.read_all()?;
        if let Some(first) = records.first() {
            let mut expected = first.sequence;
            for record in &records {
                if record.sequence != expected {
                    return Err(EventError::SequenceGap {
                        expected,
                        found: record.sequence,
                    });
                }
                expected += 1;
            }
        }
        Ok(records)
    }

    /// Sequence number of the last record, if any
    pub fn last_sequence(&self) -> Result<Option<u64>, EventError> {
        let Some(last_file) = self.files.last() else {
            return Ok(None);
        };
        let mut records = Vec::new();
        read_file(last_file, &mut records)?;
        Ok(records.last().map(|r| r.sequence))
    }

    /// Count records across all files
    pub fn count(&self) -> Result<usize, EventError> {
        let mut count = 0;
        for file_path in &self.files {
            let reader = BufReader::new(File::open(file_path)?);
            for line in reader.lines() {
                if !line?.trim().is_empty() {
                    count += 1;
                }
            }
        }
        Ok(count)
    }
}

fn read_file(path: &Path, records: &mut Vec<EventRecord>) -> Result<(), EventError> {
    let reader = BufReader::new(File::open(path)?);
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| EventError::InvalidFile {
            file: path.display().to_string(),
            line: index + 1,
            reason: e.to_string(),
        })?;
        records.push(record);
    }
    Ok(())
}
