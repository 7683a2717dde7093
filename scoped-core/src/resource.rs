//! File-backed resource scopes.
//!
//! A [`ResourceScope`] opens one handle on entry and closes it on exit, on
//! every path. Log scopes publish their handle into a [`SharedSlot`] so that
//! a data scope opened later can announce itself in the log. The slot keeps
//! whatever log scope entered last and is never cleared; a data scope that
//! finds a released handle there fails to enter.

use std::cell::RefCell;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, warn};

use crate::error::{Result, ScopeError};
use crate::provider::{FileSystem, OpenMode, ResourceHandle};
use crate::scope::{Exit, Failure, Scope};

pub const LOG_OPENED_RECORD: &str = "Log opened";
pub const DATA_OPENED_RECORD: &str = "Data file opened";

/// Setup performed as part of acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceRole {
    /// No setup.
    Plain,
    /// Writes the log marker, then publishes the handle into the shared slot.
    Log,
    /// Announces itself in whatever handle the shared slot holds.
    Data,
}

/// A handle owned by exactly one scope and released exactly once.
///
/// Clones refer to the same handle; after release every write fails.
pub struct SharedHandle<H> {
    path: PathBuf,
    inner: Rc<RefCell<Option<H>>>,
}

impl<H> Clone for SharedHandle<H> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<H> std::fmt::Debug for SharedHandle<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedHandle")
            .field("path", &self.path)
            .field("released", &self.is_released())
            .finish()
    }
}

impl<H> SharedHandle<H> {
    fn new(path: PathBuf, handle: H) -> Self {
        Self {
            path,
            inner: Rc::new(RefCell::new(Some(handle))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_released(&self) -> bool {
        self.inner.borrow().is_none()
    }
}

impl<H: ResourceHandle> SharedHandle<H> {
    /// Run `f` against the open handle.
    pub fn with_handle<R>(&self, f: impl FnOnce(&mut H) -> io::Result<R>) -> io::Result<R> {
        let mut slot = self.inner.borrow_mut();
        match slot.as_mut() {
            Some(handle) => f(handle),
            None => Err(io::Error::other(format!(
                "{} was already released",
                self.path.display()
            ))),
        }
    }

    /// Write one line.
    pub fn write_record(&self, record: &str) -> io::Result<()> {
        self.with_handle(|handle| writeln!(handle, "{record}"))
    }

    /// Take the handle out and close it. `None` when already released.
    fn release(&self) -> Option<io::Result<()>> {
        let handle = self.inner.borrow_mut().take()?;
        Some(handle.close())
    }
}

/// The single cross-scope slot. Last writer wins; never cleared on exit.
pub struct SharedSlot<H> {
    current: Rc<RefCell<Option<SharedHandle<H>>>>,
}

impl<H> Default for SharedSlot<H> {
    fn default() -> Self {
        Self {
            current: Rc::new(RefCell::new(None)),
        }
    }
}

impl<H> Clone for SharedSlot<H> {
    fn clone(&self) -> Self {
        Self {
            current: Rc::clone(&self.current),
        }
    }
}

impl<H> std::fmt::Debug for SharedSlot<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SharedSlot").field(&*self.current.borrow()).finish()
    }
}

impl<H> SharedSlot<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, handle: SharedHandle<H>) {
        *self.current.borrow_mut() = Some(handle);
    }

    pub fn current(&self) -> Option<SharedHandle<H>> {
        self.current.borrow().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.current.borrow().is_none()
    }
}

/// Scope owning one file handle for the duration of a block.
pub struct ResourceScope<F: FileSystem> {
    path: PathBuf,
    mode: OpenMode,
    role: ResourceRole,
    filesystem: Rc<F>,
    slot: SharedSlot<F::Handle>,
}

impl<F: FileSystem> ResourceScope<F> {
    pub fn new(
        path: impl Into<PathBuf>,
        mode: OpenMode,
        role: ResourceRole,
        filesystem: Rc<F>,
        slot: SharedSlot<F::Handle>,
    ) -> Self {
        Self {
            path: path.into(),
            mode,
            role,
            filesystem,
            slot,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn role(&self) -> ResourceRole {
        self.role
    }

    fn acquisition(&self, source: io::Error) -> ScopeError {
        ScopeError::Acquisition {
            path: self.path.clone(),
            source,
        }
    }

    fn prepare(&self, handle: &SharedHandle<F::Handle>) -> io::Result<()> {
        match self.role {
            ResourceRole::Plain => Ok(()),
            ResourceRole::Log => {
                handle.write_record(LOG_OPENED_RECORD)?;
                self.slot.publish(handle.clone());
                Ok(())
            }
            ResourceRole::Data => match self.slot.current() {
                Some(log) => log.write_record(DATA_OPENED_RECORD),
                None => Ok(()),
            },
        }
    }
}

impl<F: FileSystem> Scope for ResourceScope<F> {
    type Context = SharedHandle<F::Handle>;

    fn enter(&mut self) -> Result<Self::Context> {
        let handle = self
            .filesystem
            .open(&self.path, self.mode)
            .map_err(|source| self.acquisition(source))?;
        let shared = SharedHandle::new(self.path.clone(), handle);

        if let Err(source) = self.prepare(&shared) {
            if let Some(Err(close_error)) = shared.release() {
                warn!(
                    path = %self.path.display(),
                    error = %close_error,
                    "failed to close handle after setup failure"
                );
            }
            return Err(self.acquisition(source));
        }

        debug!(path = %self.path.display(), role = ?self.role, "resource acquired");
        Ok(shared)
    }

    fn exit(&mut self, context: Self::Context, _failure: Option<&Failure>) -> Result<Exit> {
        match context.release() {
            Some(Err(source)) => Err(ScopeError::Release {
                path: self.path.clone(),
                source,
            }),
            Some(Ok(())) | None => {
                debug!(path = %self.path.display(), "resource released");
                Ok(Exit::Propagate)
            }
        }
    }
}
