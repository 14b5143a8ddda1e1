//! Append-only audit ledger for the continuity orchestrator.
//!
//! Every tick appends zero or more [`AuditEvent`]s to a JSONL file;
//! lines already written are never rewritten or deleted, so the ledger
//! is the authoritative history of what a project's ticks decided and
//! did, independent of the current state document.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sentinel_types::AuditEvent;

/// Default audit ledger file name within a project's data directory.
pub const EVENTS_FILE: &str = "audit.jsonl";

pub fn events_path(state_dir: &Path) -> PathBuf {
    state_dir.join(EVENTS_FILE)
}

/// In-memory buffer of events for one tick, flushed once at the end.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<AuditEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn record(&mut self, event: AuditEvent) {
        self.events.push(event);
    }

    /// Append every buffered event to `path` in JSONL format. Existing
    /// lines in the file are left untouched.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create audit ledger dir {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open audit ledger {}", path.display()))?;

        let mut writer = std::io::BufWriter::new(file);

        for event in &self.events {
            let line = event
                .to_jsonl()
                .context("failed to serialize audit event to JSON")?;
            writeln!(writer, "{line}").context("failed to write audit event line")?;
        }

        writer.flush().context("failed to flush audit ledger")?;

        Ok(())
    }

    /// Read every event ever recorded for a project's ledger.
    pub fn read_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let file = File::open(path)
            .with_context(|| format!("failed to open audit ledger {}", path.display()))?;

        let reader = BufReader::new(file);
        let mut events = Vec::new();

        for line in reader.lines() {
            let line = line.with_context(|| {
                format!("failed to read line from audit ledger {}", path.display())
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let event: AuditEvent = serde_json::from_str(&line)
                .with_context(|| format!("failed to parse audit event from line: {line}"))?;
            events.push(event);
        }

        Ok(Self { events })
    }

    pub fn events_for_tick<'a>(&'a self, tick_id: &str) -> Vec<&'a AuditEvent> {
        self.events.iter().filter(|e| e.tick_id == tick_id).collect()
    }

    pub fn all_events(&self) -> &[AuditEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sentinel_types::AuditEventPayload;
    use tempfile::tempdir;

    fn event(tick_id: &str, payload: AuditEventPayload) -> AuditEvent {
        AuditEvent::new("proj-1", tick_id, Utc::now(), payload)
    }

    #[test]
    fn write_to_file_creates_jsonl_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let mut log = EventLog::new();
        log.record(event("tick-1", AuditEventPayload::TickStarted));
        log.write_to_file(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.contains("\"type\":\"tick_started\""));
    }

    #[test]
    fn write_to_file_appends_to_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        let mut first = EventLog::new();
        first.record(event("tick-1", AuditEventPayload::TickStarted));
        first.write_to_file(&path).unwrap();

        let mut second = EventLog::new();
        second.record(event("tick-1", AuditEventPayload::TickCompleted { duration_ms: 12 }));
        second.write_to_file(&path).unwrap();

        let loaded = EventLog::read_from_file(&path).unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn read_from_missing_file_returns_empty_log() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nope.jsonl");
        let log = EventLog::read_from_file(&path).unwrap();
        assert!(log.is_empty());
    }

    #[test]
    fn events_for_tick_filters_by_tick_id() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let mut log = EventLog::new();
        log.record(event("tick-1", AuditEventPayload::TickStarted));
        log.record(event("tick-2", AuditEventPayload::TickStarted));
        log.write_to_file(&path).unwrap();

        let loaded = EventLog::read_from_file(&path).unwrap();
        assert_eq!(loaded.events_for_tick("tick-1").len(), 1);
    }
}
