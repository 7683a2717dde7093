//! Process-lifetime registry of the state and collaborators scopes share.
//!
//! A host builds one [`ScopeRuntime`] and asks it for scopes. Every profiling
//! scope it hands out shares one [`NestingCounter`]; every log and data scope
//! shares one [`SharedSlot`]. Tests build a fresh runtime instead of resetting
//! global state.

use std::path::PathBuf;
use std::rc::Rc;

use crate::config::ScopeConfig;
use crate::error::Result;
use crate::guarded::GuardedScope;
use crate::profile::{NestingCounter, ProfilingScope};
use crate::provider::{
    ActionInvoker, EnvPolicySignal, FileSystem, OpenMode, PolicySignal, ProcessInvoker,
    StdFileSystem,
};
use crate::resource::{ResourceRole, ResourceScope, SharedSlot};
use crate::scope::FailureKind;
use crate::sink::{DiagnosticSink, FileTimingSink, TimingSink, TracingDiagnostics};
use crate::suppress::SuppressionScope;

pub struct ScopeRuntime<F: FileSystem = StdFileSystem> {
    config: ScopeConfig,
    diagnostics: Rc<dyn DiagnosticSink>,
    timing: Rc<dyn TimingSink>,
    signal: Rc<dyn PolicySignal>,
    invoker: Rc<dyn ActionInvoker>,
    filesystem: Rc<F>,
    nesting: NestingCounter,
    slot: SharedSlot<F::Handle>,
}

impl ScopeRuntime<StdFileSystem> {
    /// Runtime backed by the local filesystem, the process environment,
    /// child processes, and `tracing` diagnostics.
    pub fn new(config: ScopeConfig) -> Self {
        let timing = FileTimingSink::new(config.profile_log.clone());
        Self {
            config,
            diagnostics: Rc::new(TracingDiagnostics),
            timing: Rc::new(timing),
            signal: Rc::new(EnvPolicySignal),
            invoker: Rc::new(ProcessInvoker),
            filesystem: Rc::new(StdFileSystem),
            nesting: NestingCounter::new(),
            slot: SharedSlot::new(),
        }
    }
}

impl Default for ScopeRuntime<StdFileSystem> {
    fn default() -> Self {
        Self::new(ScopeConfig::default())
    }
}

impl<F: FileSystem> ScopeRuntime<F> {
    /// Swap the filesystem. The shared slot is replaced since its handle type
    /// changes.
    pub fn with_filesystem<G: FileSystem>(self, filesystem: G) -> ScopeRuntime<G> {
        ScopeRuntime {
            config: self.config,
            diagnostics: self.diagnostics,
            timing: self.timing,
            signal: self.signal,
            invoker: self.invoker,
            filesystem: Rc::new(filesystem),
            nesting: self.nesting,
            slot: SharedSlot::new(),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: impl DiagnosticSink + 'static) -> Self {
        self.diagnostics = Rc::new(diagnostics);
        self
    }

    pub fn with_timing_sink(mut self, timing: impl TimingSink + 'static) -> Self {
        self.timing = Rc::new(timing);
        self
    }

    pub fn with_policy_signal(mut self, signal: impl PolicySignal + 'static) -> Self {
        self.signal = Rc::new(signal);
        self
    }

    pub fn with_action_invoker(mut self, invoker: impl ActionInvoker + 'static) -> Self {
        self.invoker = Rc::new(invoker);
        self
    }

    pub fn config(&self) -> &ScopeConfig {
        &self.config
    }

    pub fn nesting(&self) -> &NestingCounter {
        &self.nesting
    }

    pub fn slot(&self) -> &SharedSlot<F::Handle> {
        &self.slot
    }

    /// The invoker guarded scopes run their entry action with.
    pub fn invoker(&self) -> Rc<dyn ActionInvoker> {
        Rc::clone(&self.invoker)
    }

    pub fn suppress(
        &self,
        kinds: impl IntoIterator<Item = FailureKind>,
    ) -> Result<SuppressionScope> {
        SuppressionScope::new(kinds, Rc::clone(&self.diagnostics))
    }

    pub fn resource(&self, path: impl Into<PathBuf>, mode: OpenMode) -> ResourceScope<F> {
        self.resource_scope(path, mode, ResourceRole::Plain)
    }

    /// Write-truncate scope that marks the log and publishes it to the slot.
    pub fn log_file(&self, path: impl Into<PathBuf>) -> ResourceScope<F> {
        self.resource_scope(path, OpenMode::WriteTruncate, ResourceRole::Log)
    }

    /// Read-write scope that announces itself in the published log, if any.
    pub fn data_file(&self, path: impl Into<PathBuf>) -> ResourceScope<F> {
        self.resource_scope(path, OpenMode::ReadWriteCreate, ResourceRole::Data)
    }

    pub fn profile(&self, label: impl Into<String>) -> ProfilingScope {
        ProfilingScope::new(
            label,
            self.nesting.clone(),
            Rc::clone(&self.timing),
            self.config.indent_unit.clone(),
        )
    }

    pub fn guarded(&self) -> GuardedScope {
        GuardedScope::new(
            self.config.guard_policy(),
            Rc::clone(&self.signal),
            Rc::clone(&self.invoker),
            Rc::clone(&self.diagnostics),
        )
    }

    fn resource_scope(
        &self,
        path: impl Into<PathBuf>,
        mode: OpenMode,
        role: ResourceRole,
    ) -> ResourceScope<F> {
        ResourceScope::new(
            path,
            mode,
            role,
            Rc::clone(&self.filesystem),
            self.slot.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::provider::{RecordingInvoker, StaticPolicySignal};
    use crate::scope::{Failure, with_scope};
    use crate::sink::{MemoryDiagnostics, MemoryTimingSink};

    #[test]
    fn test_profiling_scopes_share_one_counter() {
        let sink = MemoryTimingSink::new();
        let runtime = ScopeRuntime::new(ScopeConfig::default()).with_timing_sink(sink.clone());

        with_scope(runtime.profile("outer"), |outer| {
            assert_eq!(runtime.nesting().active(), 1);
            with_scope(runtime.profile("inner"), |inner| {
                assert_eq!(outer.depth() + 1, inner.depth());
                Ok(())
            })?;
            Ok(())
        })
        .unwrap();

        assert_eq!(runtime.nesting().active(), 0);
        assert_eq!(sink.lines().len(), 2);
    }

    #[test]
    fn test_separate_runtimes_do_not_share_depth() {
        let first =
            ScopeRuntime::new(ScopeConfig::default()).with_timing_sink(MemoryTimingSink::new());
        let second =
            ScopeRuntime::new(ScopeConfig::default()).with_timing_sink(MemoryTimingSink::new());

        with_scope(first.profile("a"), |_| {
            with_scope(second.profile("b"), |b| {
                assert_eq!(b.depth(), 0);
                Ok(())
            })?;
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_log_and_data_files_share_slot() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("log.txt");
        let data_path = dir.path().join("data.txt");
        let runtime = ScopeRuntime::new(ScopeConfig::default());

        with_scope(runtime.log_file(&log_path), |_| {
            assert!(!runtime.slot().is_empty());
            with_scope(runtime.data_file(&data_path), |data| {
                data.write_record("Data recording")?;
                Ok(())
            })?;
            Ok(())
        })
        .unwrap();

        assert_eq!(
            std::fs::read_to_string(&log_path).unwrap(),
            "Log opened\nData file opened\n"
        );
        assert_eq!(
            std::fs::read_to_string(&data_path).unwrap(),
            "Data recording\n"
        );
    }

    #[test]
    fn test_plain_resource_leaves_slot_alone() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = ScopeRuntime::new(ScopeConfig::default());
        with_scope(
            runtime.resource(dir.path().join("plain.txt"), OpenMode::WriteTruncate),
            |handle| Ok(handle.write_record("x")?),
        )
        .unwrap();
        assert!(runtime.slot().is_empty());
    }

    #[test]
    fn test_guarded_and_suppress_use_injected_collaborators() {
        let diagnostics = MemoryDiagnostics::new();
        let invoker = RecordingInvoker::default();
        let runtime = ScopeRuntime::new(ScopeConfig::default())
            .with_diagnostics(diagnostics.clone())
            .with_policy_signal(StaticPolicySignal::new().with("ALLOW_EXECUTION", "1"))
            .with_action_invoker(invoker.clone());

        runtime
            .guarded()
            .run(|| -> std::result::Result<(), Failure> { anyhow::bail!("guarded failure") })
            .unwrap();
        with_scope(
            runtime.suppress([FailureKind::of::<std::num::ParseIntError>()]).unwrap(),
            |_| Ok("nope".parse::<u8>()?),
        )
        .unwrap();

        assert_eq!(invoker.calls(), vec![vec!["ls", "-la"]]);
        assert_eq!(
            diagnostics.lines(),
            vec![
                "Error guarded failure",
                "Error of type ParseIntError suppressed: invalid digit found in string",
            ]
        );
    }

    #[test]
    fn test_invoker_accessor_returns_injected_invoker() {
        let invoker = RecordingInvoker::default();
        let runtime =
            ScopeRuntime::new(ScopeConfig::default()).with_action_invoker(invoker.clone());

        let status = runtime.invoker().run(&["echo".to_string(), "hi".to_string()]).unwrap();

        assert!(status.is_success());
        assert_eq!(invoker.calls(), vec![vec!["echo", "hi"]]);
    }

    #[test]
    fn test_config_flows_into_scopes() {
        let config = ScopeConfig {
            indent_unit: "\t".into(),
            policy_variable: "RUN_IT".into(),
            guarded_command: vec!["true".into()],
            ..ScopeConfig::default()
        };
        let runtime = ScopeRuntime::new(config);
        assert_eq!(runtime.config().indent_unit, "\t");
        assert_eq!(runtime.guarded().policy().variable, "RUN_IT");
        assert_eq!(runtime.guarded().policy().command, vec!["true"]);
        assert_eq!(runtime.profile("x").label(), "x");
    }

    #[test]
    fn test_default_runtime_uses_default_config() {
        let runtime: ScopeRuntime = ScopeRuntime::default();
        assert_eq!(runtime.config(), &ScopeConfig::default());
        assert_eq!(runtime.nesting().active(), 0);
        assert!(runtime.slot().is_empty());
    }
}
