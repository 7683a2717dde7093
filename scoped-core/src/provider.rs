//! Narrow interfaces to the outside world: files, the policy signal, and the
//! guarded action.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, IntoInnerError, Write};
use std::path::Path;
use std::process::Command;
use std::rc::Rc;

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// How a resource scope opens its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Write only; create or truncate.
    WriteTruncate,
    /// Read and write; create or truncate.
    ReadWriteCreate,
}

/// A writable handle that must be closed explicitly so close errors surface.
pub trait ResourceHandle: Write {
    fn close(self) -> io::Result<()>;
}

pub trait FileSystem {
    type Handle: ResourceHandle;

    fn open(&self, path: &Path, mode: OpenMode) -> io::Result<Self::Handle>;
}

/// Local filesystem through `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFileSystem;

impl FileSystem for StdFileSystem {
    type Handle = FileHandle;

    fn open(&self, path: &Path, mode: OpenMode) -> io::Result<FileHandle> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        if mode == OpenMode::ReadWriteCreate {
            options.read(true);
        }
        let file = options.open(path)?;
        Ok(FileHandle {
            writer: BufWriter::new(file),
        })
    }
}

/// Buffered file handle; `close` flushes and reports the flush error.
#[derive(Debug)]
pub struct FileHandle {
    writer: BufWriter<File>,
}

impl Write for FileHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl ResourceHandle for FileHandle {
    fn close(self) -> io::Result<()> {
        let file = self.writer.into_inner().map_err(IntoInnerError::into_error)?;
        drop(file);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Policy signal
// ---------------------------------------------------------------------------

/// Source of named policy values (usually environment variables).
pub trait PolicySignal {
    fn read(&self, name: &str) -> Option<String>;
}

/// Reads the process environment on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvPolicySignal;

impl PolicySignal for EnvPolicySignal {
    fn read(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Fixed set of values, for hosts that resolve policy up front.
#[derive(Debug, Clone, Default)]
pub struct StaticPolicySignal {
    values: HashMap<String, String>,
}

impl StaticPolicySignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

impl PolicySignal for StaticPolicySignal {
    fn read(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

// ---------------------------------------------------------------------------
// Guarded action
// ---------------------------------------------------------------------------

/// Exit status of a guarded action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionStatus {
    pub code: Option<i32>,
}

impl ActionStatus {
    pub fn success() -> Self {
        Self { code: Some(0) }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

pub trait ActionInvoker {
    fn run(&self, command: &[String]) -> io::Result<ActionStatus>;
}

/// Spawns the command as a child process and waits for it. Output is
/// inherited from the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessInvoker;

impl ActionInvoker for ProcessInvoker {
    fn run(&self, command: &[String]) -> io::Result<ActionStatus> {
        let Some((program, args)) = command.split_first() else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "empty command",
            ));
        };
        let status = Command::new(program).args(args).status()?;
        Ok(ActionStatus {
            code: status.code(),
        })
    }
}

/// Records commands instead of running them. Clones share the record.
#[derive(Debug, Clone)]
pub struct RecordingInvoker {
    calls: Rc<RefCell<Vec<Vec<String>>>>,
    status: ActionStatus,
}

impl RecordingInvoker {
    pub fn new(status: ActionStatus) -> Self {
        Self {
            calls: Rc::new(RefCell::new(Vec::new())),
            status,
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.borrow().clone()
    }
}

impl Default for RecordingInvoker {
    fn default() -> Self {
        Self::new(ActionStatus::success())
    }
}

impl ActionInvoker for RecordingInvoker {
    fn run(&self, command: &[String]) -> io::Result<ActionStatus> {
        self.calls.borrow_mut().push(command.to_vec());
        Ok(self.status)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serial_test::serial;

    use super::*;

    #[test]
    fn test_write_truncate_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        std::fs::write(&path, "stale contents\n").unwrap();

        let mut handle = StdFileSystem.open(&path, OpenMode::WriteTruncate).unwrap();
        writeln!(handle, "fresh").unwrap();
        handle.close().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "fresh\n");
    }

    #[test]
    fn test_read_write_create_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt");
        assert!(!path.exists());

        let handle = StdFileSystem.open(&path, OpenMode::ReadWriteCreate).unwrap();
        handle.close().unwrap();

        assert!(path.exists());
    }

    #[test]
    fn test_open_in_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope").join("data.txt");
        let err = StdFileSystem.open(&path, OpenMode::WriteTruncate).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_static_policy_signal() {
        let signal = StaticPolicySignal::new().with("ALLOW_EXECUTION", "1");
        assert_eq!(signal.read("ALLOW_EXECUTION").as_deref(), Some("1"));
        assert_eq!(signal.read("OTHER"), None);
    }

    #[test]
    #[serial]
    fn test_env_policy_signal_reads_live_environment() {
        let name = "SCOPED_CORE_TEST_POLICY";
        // SAFETY: serialized with every other test touching the environment.
        unsafe { std::env::remove_var(name) };
        assert_eq!(EnvPolicySignal.read(name), None);

        unsafe { std::env::set_var(name, "1") };
        assert_eq!(EnvPolicySignal.read(name).as_deref(), Some("1"));

        unsafe { std::env::remove_var(name) };
    }

    #[test]
    fn test_process_invoker_rejects_empty_command() {
        let err = ProcessInvoker.run(&[]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_process_invoker_reports_missing_program() {
        let command = vec!["scoped-core-no-such-program".to_string()];
        assert!(ProcessInvoker.run(&command).is_err());
    }

    #[test]
    fn test_recording_invoker_records_calls() {
        let invoker = RecordingInvoker::new(ActionStatus { code: Some(2) });
        let observer = invoker.clone();
        let status = invoker
            .run(&["ls".to_string(), "-la".to_string()])
            .unwrap();
        assert!(!status.is_success());
        assert_eq!(observer.calls(), vec![vec!["ls", "-la"]]);
    }
}
