//! Demonstration host for `scoped-core`.
//!
//! Each subcommand replays one scenario: suppressing expected failures,
//! nested log and data files, nested profiling, and policy-gated execution.

use std::num::ParseIntError;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use scoped_core::{
    ActionInvoker, Failure, FailureKind, ScopeConfig, ScopeRuntime, StaticPolicySignal, with_scope,
};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "scoped", about = "Run the scoped resource management demos")]
pub struct Cli {
    /// TOML config file; missing fields use defaults.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the file timing records are appended to.
    #[arg(long, global = true)]
    pub profile_log: Option<PathBuf>,

    /// Override the policy variable consulted by guarded scopes.
    #[arg(long, global = true)]
    pub policy_variable: Option<String>,

    #[command(subcommand)]
    pub demo: Demo,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Demo {
    /// Suppress a division by zero and an unparsable integer.
    Suppress,
    /// Write a data file inside a log file scope.
    Files {
        /// Directory receiving log.txt and data.txt.
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
    /// Profile three nested blocks.
    Profile,
    /// Run a guarded callable, then a guarded block.
    Guarded {
        /// Grant execution without consulting the environment.
        #[arg(long)]
        allow: bool,
    },
}

#[derive(Debug, thiserror::Error)]
#[error("division by zero")]
pub struct DivisionByZero;

impl Cli {
    /// Config file (or defaults) with command-line overrides applied.
    pub fn resolve_config(&self) -> anyhow::Result<ScopeConfig> {
        let mut config = match &self.config {
            Some(path) => ScopeConfig::load(path)?,
            None => ScopeConfig::default(),
        };
        if let Some(profile_log) = &self.profile_log {
            config.profile_log = profile_log.clone();
        }
        if let Some(variable) = &self.policy_variable {
            config.policy_variable = variable.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.resolve_config()?;
    info!(demo = ?cli.demo, profile_log = %config.profile_log.display(), "starting demo");
    let runtime = ScopeRuntime::new(config);
    match cli.demo {
        Demo::Suppress => suppress_demo(&runtime).map(|_| ()),
        Demo::Files { dir } => files_demo(&runtime, &dir),
        Demo::Profile => profile_demo(&runtime),
        Demo::Guarded { allow } => {
            let runtime = if allow {
                let config = runtime.config();
                let signal = StaticPolicySignal::new()
                    .with(&config.policy_variable, &config.policy_sentinel);
                runtime.with_policy_signal(signal)
            } else {
                runtime
            };
            guarded_demo(&runtime)
        }
    }
}

fn divide(a: i32, b: i32) -> Result<i32, DivisionByZero> {
    a.checked_div(b).ok_or(DivisionByZero)
}

/// Returns how many statements of the block ran before it was cut short.
pub fn suppress_demo(runtime: &ScopeRuntime) -> anyhow::Result<usize> {
    let mut completed = 0;
    let scope = runtime.suppress([
        FailureKind::of::<DivisionByZero>(),
        FailureKind::of::<ParseIntError>(),
    ])?;
    with_scope(scope, |_| -> Result<(), Failure> {
        println!("That's where all the logic could be.");
        completed += 1;
        divide(1, 0)?;
        completed += 1;
        let _: i32 = "abc".parse()?;
        completed += 1;
        println!("This will not be executed due to an error.");
        Ok(())
    })?;
    Ok(completed)
}

pub fn files_demo(runtime: &ScopeRuntime, dir: &Path) -> anyhow::Result<()> {
    let log_path = dir.join("log.txt");
    let data_path = dir.join("data.txt");
    with_scope(runtime.log_file(&log_path), |_| {
        with_scope(runtime.data_file(&data_path), |data| {
            data.write_record("Data recording")?;
            Ok(())
        })?;
        Ok(())
    })
    .with_context(|| format!("writing log and data files in {}", dir.display()))?;
    Ok(())
}

pub fn profile_demo(runtime: &ScopeRuntime) -> anyhow::Result<()> {
    with_scope(runtime.profile("outer"), |_| {
        sleep(Duration::from_millis(100));
        with_scope(runtime.profile("inner"), |_| {
            sleep(Duration::from_millis(200));
            with_scope(runtime.profile("inner_inner"), |_| {
                sleep(Duration::from_millis(100));
                Ok(())
            })?;
            Ok(())
        })?;
        Ok(())
    })?;
    Ok(())
}

pub fn guarded_demo(runtime: &ScopeRuntime) -> anyhow::Result<()> {
    let guard = runtime.guarded();
    let command = guard.policy().command.clone();
    let invoker = runtime.invoker();
    let do_sensitive_work = guard.clone().wrap(move || -> Result<(), Failure> {
        let status = invoker.run(&command)?;
        if !status.is_success() {
            anyhow::bail!("sensitive work exited with {:?}", status.code);
        }
        Ok(())
    });

    do_sensitive_work()?;
    guard.run(|| {
        do_sensitive_work()?;
        Ok(())
    })?;
    Ok(())
}
