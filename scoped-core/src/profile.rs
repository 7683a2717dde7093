//! Wall-clock profiling of nested blocks.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::Result;
use crate::scope::{Exit, Failure, Scope};
use crate::sink::TimingSink;

/// Number of profiling scopes currently active. Clones share the count.
#[derive(Debug, Clone, Default)]
pub struct NestingCounter {
    active: Rc<Cell<usize>>,
}

impl NestingCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> usize {
        self.active.get()
    }

    /// Returns the new count.
    fn push(&self) -> usize {
        let next = self.active.get() + 1;
        self.active.set(next);
        next
    }

    fn pop(&self) {
        self.active.set(self.active.get().saturating_sub(1));
    }
}

/// The running measurement bound while a [`ProfilingScope`] is active.
#[derive(Debug, Clone)]
pub struct ProfileFrame {
    label: String,
    depth: usize,
    indent: String,
    started_at: Instant,
}

impl ProfileFrame {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Zero for the outermost active scope.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn indent(&self) -> &str {
        &self.indent
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Formats one timing record: `{indent}Block '{label}' - {seconds:.3} s`.
pub fn timing_line(indent: &str, label: &str, elapsed: Duration) -> String {
    format!("{indent}Block '{label}' - {:.3} s", elapsed.as_secs_f64())
}

/// Times a block and appends one record to the timing sink on exit.
///
/// Depth comes from the shared [`NestingCounter`] at entry, so two siblings
/// inside the same parent share a depth. The scope never suppresses.
pub struct ProfilingScope {
    label: String,
    counter: NestingCounter,
    sink: Rc<dyn TimingSink>,
    indent_unit: String,
}

impl ProfilingScope {
    pub fn new(
        label: impl Into<String>,
        counter: NestingCounter,
        sink: Rc<dyn TimingSink>,
        indent_unit: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            counter,
            sink,
            indent_unit: indent_unit.into(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Scope for ProfilingScope {
    type Context = ProfileFrame;

    fn enter(&mut self) -> Result<ProfileFrame> {
        let depth = self.counter.push() - 1;
        debug!(label = %self.label, depth, "profiling started");
        Ok(ProfileFrame {
            label: self.label.clone(),
            depth,
            indent: self.indent_unit.repeat(depth),
            started_at: Instant::now(),
        })
    }

    fn exit(&mut self, frame: ProfileFrame, _failure: Option<&Failure>) -> Result<Exit> {
        let elapsed = frame.elapsed();
        let line = timing_line(&frame.indent, &frame.label, elapsed);
        if let Err(err) = self.sink.append(&line) {
            warn!(label = %frame.label, error = %err, "failed to append timing record");
        }
        self.counter.pop();
        debug!(
            label = %frame.label,
            depth = frame.depth,
            elapsed_ms = elapsed.as_millis() as u64,
            "profiling finished"
        );
        Ok(Exit::Propagate)
    }
}
