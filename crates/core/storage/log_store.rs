//! Append-only, file-backed cache store.
//!
//! Every write is one JSON line appended to the log before the in-memory
//! index sees it. A failed append leaves neither the index nor the file
//! changed. Opening a store replays the log into the index.

use super::memory::MemoryStore;
use super::{CacheStore, PeriodStats, StoreStats};
use crate::error::{GeobandError, Result};
use geoband_types::{AreaId, AreaRecord, ErrorLogEntry, EventRecord, FetchedEvent, Period};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum LogEntry {
    Area(AreaRecord),
    Event(EventRecord),
    Split { polygon_key: String, period: Period },
    Error(ErrorLogEntry),
}

/// Cache store persisted to an append-only JSON-lines log
pub struct LogStore {
    path: PathBuf,
    index: MemoryStore,
    file: File,
    /// Length of the fully written prefix of the log
    len: u64,
}

impl LogStore {
    /// Open or create the log at `path`, replaying any existing entries.
    ///
    /// A torn final line (a write interrupted mid-line) is discarded with a
    /// warning; a malformed line anywhere else is an error.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut index = MemoryStore::new();
        let valid_len = if path.exists() {
            Self::replay(&path, &mut index)?
        } else {
            0
        };

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        if file.metadata()?.len() > valid_len {
            file.set_len(valid_len)?;
        }

        let stats = index.stats()?;
        log::debug!(
            "Opened cache log {} with {} areas, {} events, {} errors",
            path.display(),
            stats.area_count,
            stats.event_count,
            stats.error_count
        );

        Ok(Self {
            path,
            index,
            file,
            len: valid_len,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replay the log into `index`; returns the byte length of the valid prefix.
    fn replay(path: &Path, index: &mut MemoryStore) -> Result<u64> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut line = String::new();
        let mut valid_len = 0u64;
        let mut line_no = 0usize;
        let mut torn: Option<(usize, String)> = None;

        loop {
            line.clear();
            let read = reader.read_line(&mut line)?;
            if read == 0 {
                break;
            }
            line_no += 1;

            if let Some((bad_line, reason)) = torn.take() {
                return Err(GeobandError::InvalidFormat {
                    line: bad_line,
                    reason,
                });
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                valid_len += read as u64;
                continue;
            }

            match serde_json::from_str::<LogEntry>(trimmed) {
                Ok(entry) if line.ends_with('\n') => {
                    Self::apply(index, entry).map_err(|e| GeobandError::InvalidFormat {
                        line: line_no,
                        reason: e.to_string(),
                    })?;
                    valid_len += read as u64;
                }
                Ok(_) => torn = Some((line_no, "unterminated final line".to_string())),
                Err(e) => torn = Some((line_no, e.to_string())),
            }
        }

        if let Some((bad_line, reason)) = torn {
            log::warn!(
                "Discarding torn entry at line {} of {}: {}",
                bad_line,
                path.display(),
                reason
            );
        }

        Ok(valid_len)
    }

    fn apply(index: &mut MemoryStore, entry: LogEntry) -> Result<()> {
        match entry {
            LogEntry::Area(record) => index.restore_area(record),
            LogEntry::Event(record) => index.restore_event(record),
            LogEntry::Split {
                polygon_key,
                period,
            } => {
                index.insert_split(&polygon_key, period);
                Ok(())
            }
            LogEntry::Error(entry) => {
                index.restore_error(entry);
                Ok(())
            }
        }
    }

    /// Append whole lines, or nothing: a failed write is truncated away.
    fn append(&mut self, entries: &[LogEntry]) -> Result<()> {
        let mut buf = Vec::new();
        for entry in entries {
            serde_json::to_writer(&mut buf, entry)?;
            buf.push(b'\n');
        }

        if let Err(e) = self.file.write_all(&buf) {
            if let Err(truncate) = self.file.set_len(self.len) {
                log::warn!(
                    "Failed to roll back partial write to {}: {}",
                    self.path.display(),
                    truncate
                );
            }
            return Err(e.into());
        }
        self.len += buf.len() as u64;
        Ok(())
    }
}

impl CacheStore for LogStore {
    fn find_area(&self, polygon_key: &str, period: Period) -> Result<Option<AreaRecord>> {
        self.index.find_area(polygon_key, period)
    }

    fn insert_area_if_absent(
        &mut self,
        polygon_key: &str,
        event_count: u64,
        period: Period,
    ) -> Result<AreaId> {
        match self.index.pending_area(polygon_key, event_count, period) {
            Err(id) => Ok(id),
            Ok(record) => {
                self.append(&[LogEntry::Area(record.clone())])?;
                let id = record.id;
                self.index.commit_area(record);
                Ok(id)
            }
        }
    }

    fn insert_events(&mut self, area_id: AreaId, events: &[FetchedEvent]) -> Result<usize> {
        let pending = self.index.pending_events(area_id, events)?;
        let count = pending.records.len();
        if count > 0 {
            let entries: Vec<_> = pending.records.iter().cloned().map(LogEntry::Event).collect();
            self.append(&entries)?;
        }
        self.index.commit_events(area_id, pending);
        Ok(count)
    }

    fn has_events(&self, area_id: AreaId) -> Result<bool> {
        self.index.has_events(area_id)
    }

    fn events_for_area(&self, area_id: AreaId) -> Result<Vec<EventRecord>> {
        self.index.events_for_area(area_id)
    }

    fn mark_split(&mut self, polygon_key: &str, period: Period) -> Result<()> {
        if !self.index.is_split(polygon_key, period)? {
            self.append(&[LogEntry::Split {
                polygon_key: polygon_key.to_string(),
                period,
            }])?;
            self.index.insert_split(polygon_key, period);
        }
        Ok(())
    }

    fn is_split(&self, polygon_key: &str, period: Period) -> Result<bool> {
        self.index.is_split(polygon_key, period)
    }

    fn append_error(&mut self, entry: &ErrorLogEntry) -> Result<()> {
        self.append(&[LogEntry::Error(entry.clone())])?;
        self.index.append_error(entry)
    }

    fn errors(&self) -> Result<Vec<ErrorLogEntry>> {
        self.index.errors()
    }

    fn areas(&self, period: Option<Period>) -> Result<Vec<AreaRecord>> {
        self.index.areas(period)
    }

    fn period_stats(&self, period: Period) -> Result<PeriodStats> {
        self.index.period_stats(period)
    }

    fn sync(&mut self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }

    fn stats(&self) -> Result<StoreStats> {
        self.index.stats()
    }
}
