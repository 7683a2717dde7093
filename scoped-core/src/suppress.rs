use std::rc::Rc;

use crate::error::{Result, ScopeError};
use crate::scope::{Exit, Failure, FailureKind, Scope};
use crate::sink::DiagnosticSink;

/// Swallows failures of the configured kinds, emitting one diagnostic each.
/// Other failures pass through untouched.
pub struct SuppressionScope {
    kinds: Vec<FailureKind>,
    diagnostics: Rc<dyn DiagnosticSink>,
}

impl SuppressionScope {
    pub fn new(
        kinds: impl IntoIterator<Item = FailureKind>,
        diagnostics: Rc<dyn DiagnosticSink>,
    ) -> Result<Self> {
        let kinds: Vec<FailureKind> = kinds.into_iter().collect();
        if kinds.is_empty() {
            return Err(ScopeError::InvalidConfig(
                "suppression scope needs at least one failure kind".into(),
            ));
        }
        Ok(Self { kinds, diagnostics })
    }

    pub fn kinds(&self) -> &[FailureKind] {
        &self.kinds
    }
}

impl Scope for SuppressionScope {
    type Context = ();

    fn enter(&mut self) -> Result<()> {
        Ok(())
    }

    fn exit(&mut self, _context: (), failure: Option<&Failure>) -> Result<Exit> {
        let Some(failure) = failure else {
            return Ok(Exit::Propagate);
        };
        match self.kinds.iter().find(|kind| kind.matches(failure)) {
            Some(kind) => {
                self.diagnostics.write(&format!(
                    "Error of type {} suppressed: {failure:#}",
                    kind.name()
                ));
                Ok(Exit::Suppress)
            }
            None => Ok(Exit::Propagate),
        }
    }
}
