//! Policy-gated execution.
//!
//! [`GuardedScope`] checks a policy signal on entry, runs the configured
//! action when permitted, and swallows every failure raised by the guarded
//! block after reporting it. The suppression is total: programming errors and
//! panics inside the block are swallowed as well.

use std::rc::Rc;

use tracing::{debug, info, warn};

use crate::error::{Result, ScopeError};
use crate::provider::{ActionInvoker, PolicySignal};
use crate::scope::{Exit, Failure, Scope, with_scope};
use crate::sink::DiagnosticSink;

/// Name of the policy value, the value that grants permission, and the
/// action to run once permission is granted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardPolicy {
    pub variable: String,
    pub sentinel: String,
    pub command: Vec<String>,
}

/// Block scope and callable wrapper gating execution on a policy signal.
///
/// Cloning is cheap; every entry, including every call through [`wrap`],
/// uses a fresh clone.
///
/// [`wrap`]: GuardedScope::wrap
#[derive(Clone)]
pub struct GuardedScope {
    policy: GuardPolicy,
    signal: Rc<dyn PolicySignal>,
    invoker: Rc<dyn ActionInvoker>,
    diagnostics: Rc<dyn DiagnosticSink>,
}

impl GuardedScope {
    pub fn new(
        policy: GuardPolicy,
        signal: Rc<dyn PolicySignal>,
        invoker: Rc<dyn ActionInvoker>,
        diagnostics: Rc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            policy,
            signal,
            invoker,
            diagnostics,
        }
    }

    pub fn policy(&self) -> &GuardPolicy {
        &self.policy
    }

    pub fn is_permitted(&self) -> bool {
        self.signal
            .read(&self.policy.variable)
            .is_some_and(|value| value == self.policy.sentinel)
    }

    /// Run `block` under this guard.
    pub fn run<T>(
        &self,
        block: impl FnOnce() -> std::result::Result<T, Failure>,
    ) -> Result<Option<T>> {
        with_scope(self.clone(), |_| block())
    }

    /// Wrap a zero-argument callable so each call runs under a fresh guard.
    pub fn wrap<T, F>(self, f: F) -> impl Fn() -> Result<Option<T>>
    where
        F: Fn() -> std::result::Result<T, Failure>,
    {
        move || with_scope(self.clone(), |_| f())
    }

    /// Like [`GuardedScope::wrap`] for callables taking one argument; pass a
    /// tuple for more.
    pub fn wrap_with<A, T, F>(self, f: F) -> impl Fn(A) -> Result<Option<T>>
    where
        F: Fn(A) -> std::result::Result<T, Failure>,
    {
        move |args| with_scope(self.clone(), |_| f(args))
    }
}

impl Scope for GuardedScope {
    type Context = ();

    fn enter(&mut self) -> Result<()> {
        if !self.is_permitted() {
            debug!(variable = %self.policy.variable, "execution denied");
            return Err(ScopeError::PolicyDenied {
                variable: self.policy.variable.clone(),
            });
        }
        info!(variable = %self.policy.variable, "execution permitted");

        if self.policy.command.is_empty() {
            return Ok(());
        }
        let command = self.policy.command.join(" ");
        let status = self
            .invoker
            .run(&self.policy.command)
            .map_err(|source| ScopeError::Action {
                command: command.clone(),
                source,
            })?;
        if !status.is_success() {
            warn!(command = %command, code = ?status.code, "guarded action exited unsuccessfully");
        }
        Ok(())
    }

    fn exit(&mut self, _context: (), failure: Option<&Failure>) -> Result<Exit> {
        if let Some(failure) = failure {
            self.diagnostics.write(&format!("Error {failure:#}"));
        }
        Ok(Exit::Suppress)
    }
}
