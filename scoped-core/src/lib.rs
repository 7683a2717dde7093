//! Scope guards whose exit step runs on every path out of a block.
//!
//! Four scopes share the [`Scope`] contract and the [`with_scope`] driver:
//! [`SuppressionScope`], [`ResourceScope`], [`ProfilingScope`], and
//! [`GuardedScope`]. [`ScopeRuntime`] bundles the state they share.
//!
//! Everything here is single-threaded: shared state lives in `Rc` and `Cell`.

pub mod config;
pub mod error;
pub mod guarded;
pub mod profile;
pub mod provider;
pub mod resource;
pub mod runtime;
pub mod scope;
pub mod sink;
pub mod suppress;

// Re-export key types for convenience.
pub use config::ScopeConfig;
pub use error::{BlockPanic, Result, ScopeError};
pub use guarded::{GuardPolicy, GuardedScope};
pub use profile::{NestingCounter, ProfileFrame, ProfilingScope, timing_line};
pub use provider::{
    ActionInvoker, ActionStatus, EnvPolicySignal, FileHandle, FileSystem, OpenMode, PolicySignal,
    ProcessInvoker, RecordingInvoker, ResourceHandle, StaticPolicySignal, StdFileSystem,
};
pub use resource::{
    DATA_OPENED_RECORD, LOG_OPENED_RECORD, ResourceRole, ResourceScope, SharedHandle, SharedSlot,
};
pub use runtime::ScopeRuntime;
pub use scope::{Exit, Failure, FailureKind, Scope, with_scope};
pub use sink::{
    DiagnosticSink, FileTimingSink, MemoryDiagnostics, MemoryTimingSink, TimingSink,
    TracingDiagnostics,
};
pub use suppress::SuppressionScope;
