//! The enter/exit contract shared by every scope, and the driver that runs a
//! block inside one.
//!
//! A block reports failure by returning `Err(Failure)`. Panics are caught by
//! [`with_scope`], shown to the scope as a [`BlockPanic`] failure, and resumed
//! unchanged unless the scope suppresses them. Either way the exit step runs
//! exactly once.

use std::error::Error as StdError;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use tracing::warn;

use crate::error::{BlockPanic, Result, ScopeError};

/// A failure raised by a guarded block.
pub type Failure = anyhow::Error;

/// What the exit step decided about an in-flight failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Propagate,
    Suppress,
}

/// An enter/exit pair whose exit step runs on every path out of the block.
pub trait Scope {
    /// Value bound for the duration of the block.
    type Context;

    fn enter(&mut self) -> Result<Self::Context>;

    /// Finalize the scope. `failure` is the block's failure, if it raised one.
    /// Returning an error while a failure is in flight does not replace it.
    fn exit(&mut self, context: Self::Context, failure: Option<&Failure>) -> Result<Exit>;
}

/// Enter `scope`, run `block`, and exit the scope.
///
/// Returns `Ok(Some(value))` on success and `Ok(None)` when the scope
/// suppressed the block's failure. The scope is consumed: a scope is entered
/// at most once.
pub fn with_scope<S, T, F>(mut scope: S, block: F) -> Result<Option<T>>
where
    S: Scope,
    F: FnOnce(&mut S::Context) -> std::result::Result<T, Failure>,
{
    let mut context = scope.enter()?;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| block(&mut context)));
    match outcome {
        Ok(Ok(value)) => {
            scope.exit(context, None)?;
            Ok(Some(value))
        }
        Ok(Err(failure)) => match scope.exit(context, Some(&failure)) {
            Ok(Exit::Suppress) => Ok(None),
            Ok(Exit::Propagate) => Err(propagated(failure)),
            Err(exit_error) => {
                warn!(error = %exit_error, "scope exit failed while a block failure was in flight");
                Err(propagated(failure))
            }
        },
        Err(payload) => {
            let failure = Failure::new(BlockPanic::from_payload(payload.as_ref()));
            match scope.exit(context, Some(&failure)) {
                Ok(Exit::Suppress) => Ok(None),
                Ok(Exit::Propagate) => panic::resume_unwind(payload),
                Err(exit_error) => {
                    warn!(error = %exit_error, "scope exit failed while unwinding");
                    panic::resume_unwind(payload)
                }
            }
        }
    }
}

/// A failure that is already a [`ScopeError`] (an inner scope's error passed
/// up with `?`) keeps its variant instead of being wrapped again.
fn propagated(failure: Failure) -> ScopeError {
    match failure.downcast::<ScopeError>() {
        Ok(error) => error,
        Err(failure) => ScopeError::Block(failure),
    }
}

/// Selects failures of one error type.
///
/// A failure matches when it is an `E`, when any error in its source chain
/// is an `E`, or when it is a propagated block failure that matches.
#[derive(Clone, Copy)]
pub struct FailureKind {
    name: &'static str,
    matcher: fn(&Failure) -> bool,
}

impl FailureKind {
    pub fn of<E>() -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            name: short_type_name::<E>(),
            matcher: failure_is::<E>,
        }
    }

    /// Unqualified type name, used in diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn matches(&self, failure: &Failure) -> bool {
        (self.matcher)(failure)
    }
}

impl fmt::Debug for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FailureKind").field(&self.name).finish()
    }
}

fn failure_is<E>(failure: &Failure) -> bool
where
    E: StdError + Send + Sync + 'static,
{
    if failure.is::<E>() || failure.chain().any(|cause| cause.is::<E>()) {
        return true;
    }
    // Look through a block failure that an inner scope let propagate.
    match failure.downcast_ref::<ScopeError>() {
        Some(ScopeError::Block(inner)) => failure_is::<E>(inner),
        _ => false,
    }
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let head_end = full.find('<').unwrap_or(full.len());
    match full[..head_end].rfind("::") {
        Some(index) => &full[index + 2..],
        None => full,
    }
}
