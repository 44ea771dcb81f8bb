//! Durable result log
//!
//! The log is the single source of truth for the dashboard. The writer
//! appends one CSV-like line per inference; the reader is what the
//! dashboard side uses to load it back.

mod reader;
mod writer;


pub use reader::{is_header, parse_line, parse_log, read_log, LogEntry, LogReadReport};
pub use writer::{encode_record, ResultLog, LOG_HEADER, TIMESTAMP_FORMAT};
