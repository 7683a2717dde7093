//! Where scopes send their output: diagnostics for suppressed failures and
//! timing records for profiled blocks.

use std::cell::RefCell;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Receives human-readable diagnostic lines. Writes are best effort.
pub trait DiagnosticSink {
    fn write(&self, message: &str);
}

/// Emits each diagnostic as a `warn` event on the `scoped_core::diagnostics`
/// target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn write(&self, message: &str) {
        tracing::warn!(target: "scoped_core::diagnostics", "{message}");
    }
}

/// Keeps diagnostics in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryDiagnostics {
    lines: Rc<RefCell<Vec<String>>>,
}

impl MemoryDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.lines.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.borrow().is_empty()
    }
}

impl DiagnosticSink for MemoryDiagnostics {
    fn write(&self, message: &str) {
        self.lines.borrow_mut().push(message.to_string());
    }
}

/// Durable destination for timing records, one line per record.
pub trait TimingSink {
    fn append(&self, line: &str) -> io::Result<()>;
}

/// Appends timing records to a file, creating it when absent. Never truncates.
#[derive(Debug, Clone)]
pub struct FileTimingSink {
    path: PathBuf,
}

impl FileTimingSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TimingSink for FileTimingSink {
    fn append(&self, line: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }
}

/// Keeps timing records in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryTimingSink {
    lines: Rc<RefCell<Vec<String>>>,
}

impl MemoryTimingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }
}

impl TimingSink for MemoryTimingSink {
    fn append(&self, line: &str) -> io::Result<()> {
        self.lines.borrow_mut().push(line.to_string());
        Ok(())
    }
}
