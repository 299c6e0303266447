//! Task extensions driven by the orchestrator for each `ament_cargo` package.

mod build;

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::hook::EnvironmentHook;

pub use build::AmentCargoBuildTask;
pub use test::AmentCargoTestTask;

/// The package a task operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDescriptor {
    pub name: String,
    /// Source directory; tasks run their commands here.
    pub path: PathBuf,
}

/// Options parsed for one task invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskArgs {
    /// Installation prefix of the package.
    pub install_base: String,
    /// Arguments forwarded to cargo, in the order given.
    pub cargo_args: Option<Vec<String>>,
    /// Resolve dependencies from the workspace too.
    pub lookup_in_workspace: bool,
}

impl TaskArgs {
    /// Reads the arguments registered by [`add_common_arguments`] and the task extensions.
    ///
    /// Flags a task did not register keep their defaults.
    pub fn from_matches(matches: &ArgMatches, install_base: String) -> Self {
        let cargo_args = matches
            .try_get_many::<String>("cargo_args")
            .ok()
            .flatten()
            .map(|values| values.cloned().collect());
        let lookup_in_workspace = matches
            .try_get_one::<bool>("lookup_in_workspace")
            .ok()
            .flatten()
            .copied()
            .unwrap_or(false);

        Self {
            install_base,
            cargo_args,
            lookup_in_workspace,
        }
    }

    /// Forwarded cargo arguments; `None` when `--cargo-args` was not given.
    pub fn cargo_args(&self) -> Option<&[String]> {
        self.cargo_args.as_deref()
    }
}

/// Everything a task needs to know about the job it runs.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub pkg: PackageDescriptor,
    pub args: TaskArgs,
    /// Report what would run instead of running it.
    pub dry_run: bool,
}

/// Shared surface of build and test tasks.
pub trait TaskExtension: Send + Sync {
    /// Registers the task's command-line flags.
    fn add_arguments(&self, command: Command) -> Command;
}

/// Builds and installs a package.
#[async_trait]
pub trait BuildTask: TaskExtension {
    /// Returns the process exit code of the build; hooks for the installed package
    /// are appended to `additional_hooks`.
    async fn build(
        &self,
        context: &TaskContext,
        additional_hooks: &mut Vec<EnvironmentHook>,
    ) -> Result<i32>;
}

/// Runs a package's tests.
#[async_trait]
pub trait TestTask: TaskExtension {
    /// Returns the process exit code of the test run.
    async fn test(&self, context: &TaskContext) -> Result<i32>;
}

/// Registers `--cargo-args`, shared by every verb that invokes cargo.
pub fn add_common_arguments(command: Command) -> Command {
    command.arg(
        Arg::new("cargo_args")
            .long("cargo-args")
            .num_args(0..)
            .allow_hyphen_values(true)
            .action(ArgAction::Append)
            .value_name("ARG")
            .help("Arbitrary arguments passed to cargo"),
    )
}


#[cfg(test)]
mod tests {
    use super::*;

    fn parse(command: Command, argv: &[&str]) -> TaskArgs {
        let matches = command.try_get_matches_from(argv).unwrap();
        TaskArgs::from_matches(&matches, "/install".to_string())
    }

    #[test]
    fn test_from_matches_collects_hyphenated_cargo_args() {
        let command =
            AmentCargoBuildTask::new().add_arguments(add_common_arguments(Command::new("build")));
        let args = parse(
            command,
            &[
                "build",
                "--lookup-in-workspace",
                "--cargo-args",
                "--release",
                "--features",
                "x",
            ],
        );

        assert_eq!(
            args.cargo_args(),
            Some(["--release", "--features", "x"].map(String::from).as_slice())
        );
        assert!(args.lookup_in_workspace);
    }

    #[test]
    fn test_from_matches_defaults() {
        let command =
            AmentCargoBuildTask::new().add_arguments(add_common_arguments(Command::new("build")));
        let args = parse(command, &["build"]);
        assert_eq!(args.cargo_args(), None);
        assert!(!args.lookup_in_workspace);
        assert_eq!(args.install_base, "/install");
    }

    #[test]
    fn test_from_matches_without_lookup_flag_registered() {
        let command = AmentCargoTestTask::new().add_arguments(Command::new("test"));
        let args = parse(command, &["test", "--cargo-args", "--workspace", "--no-fail-fast"]);
        assert_eq!(
            args.cargo_args(),
            Some(["--workspace", "--no-fail-fast"].map(String::from).as_slice())
        );
        assert!(!args.lookup_in_workspace);
    }
}
