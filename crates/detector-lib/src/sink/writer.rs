//! Append-only result log writer
//!
//! One line per inference:
//! `timestamp,verdict,m1,...,m10,provider`
//!
//! Every append opens the file in append mode and writes the complete line
//! with a single `write_all`, so concurrent writers never interleave partial
//! lines. The file is synced before the append returns.
//!
//! With the header enabled, a missing log is created by staging the header
//! and the first line in a scratch file and hard-linking it into place. The
//! link fails if another writer created the log first, in which case the
//! line is appended as usual. The log therefore never exists without its
//! header, and only one writer ever writes it.

use crate::error::{DetectorError, Result};
use crate::models::ResultRecord;
use chrono::{DateTime, SubsecRound, Utc};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Distinguishes scratch files staged by threads of one process
static STAGING_SEQ: AtomicU64 = AtomicU64::new(0);

/// Timestamp layout: ISO-8601, UTC, millisecond precision, `Z` suffix
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Optional header row understood by the log reader
pub const LOG_HEADER: &str = "timestamp,result,m1,m2,m3,m4,m5,m6,m7,m8,m9,m10,platform";

/// Render one record as a log line, newline included
pub fn encode_record(record: &ResultRecord) -> String {
    let metrics: Vec<String> = record.log_slots().iter().map(|v| v.to_string()).collect();
    format!(
        "{},{},{},{}\n",
        record.timestamp.format(TIMESTAMP_FORMAT),
        record.verdict.label(),
        metrics.join(","),
        record.provider.tag()
    )
}

/// Durable result log
#[derive(Debug)]
pub struct ResultLog {
    path: PathBuf,
    write_header: bool,
    last_timestamp: Option<DateTime<Utc>>,
}

impl ResultLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_header: false,
            last_timestamp: None,
        }
    }

    /// Start the log with [`LOG_HEADER`] when this writer creates it
    pub fn with_header(mut self, write_header: bool) -> Self {
        self.write_header = write_header;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write-time timestamp, never earlier than one already handed out
    pub fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now().trunc_subsecs(3);
        let stamp = match self.last_timestamp {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_timestamp = Some(stamp);
        stamp
    }

    /// Append one record. Failure means the record is lost.
    pub fn append(&mut self, record: &ResultRecord) -> Result<()> {
        let line = encode_record(record);
        let created = self.write_header && self.create_with_header(&line)?;
        if !created {
            self.append_line(&line)?;
        }

        if self.last_timestamp.map_or(true, |last| record.timestamp > last) {
            self.last_timestamp = Some(record.timestamp);
        }

        debug!(
            path = %self.path.display(),
            verdict = %record.verdict,
            provider = %record.provider,
            "Result appended"
        );
        Ok(())
    }

    fn append_line(&self, line: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| DetectorError::io(&self.path, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| DetectorError::io(&self.path, e))?;
        file.sync_data()
            .map_err(|e| DetectorError::io(&self.path, e))
    }

    /// Publish a new log holding the header and `line`.
    /// Returns `false` without writing anything when the log already exists.
    fn create_with_header(&self, line: &str) -> Result<bool> {
        if self.path.exists() {
            return Ok(false);
        }

        let mut staging = self.path.clone().into_os_string();
        staging.push(format!(
            ".{}.{}.tmp",
            std::process::id(),
            STAGING_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        let staging = PathBuf::from(staging);

        let contents = format!("{}\n{}", LOG_HEADER, line);
        if let Err(e) = write_new_file(&staging, contents.as_bytes()) {
            let _ = fs::remove_file(&staging);
            return Err(DetectorError::io(&staging, e));
        }

        let linked = fs::hard_link(&staging, &self.path);
        let _ = fs::remove_file(&staging);
        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(DetectorError::io(&self.path, e)),
        }
    }
}

fn write_new_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(contents)?;
    file.sync_data()
}
