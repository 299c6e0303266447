use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use clap::{Arg, ArgAction, Command};

use super::{BuildTask, TaskContext, TaskExtension};
use crate::command::Toolchain;
use crate::hook::{EnvironmentHook, register_ament_prefix_hook};
use crate::process::{CommandRunner, ProcessRunner};

const MISSING_CARGO_ROS2: &str = "\n\nament_cargo package found but cargo-ros2 was not detected.\
\n\nPlease install it by running:\
\n $ cargo install cargo-ros2\n";

/// Builds an `ament_cargo` package with `cargo ros2 ament-build`.
///
/// Binding generation, `.cargo/config.toml` patching and installation all happen inside
/// cargo-ros2; this task checks that the tool exists, registers the package's
/// `AMENT_PREFIX_PATH` hook and relays the tool's exit code.
pub struct AmentCargoBuildTask<R = ProcessRunner> {
    toolchain: Toolchain,
    runner: R,
}

impl AmentCargoBuildTask {
    pub fn new() -> Self {
        Self::with_runner(ProcessRunner::new())
    }
}

impl Default for AmentCargoBuildTask {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: CommandRunner> AmentCargoBuildTask<R> {
    /// A build task executing its commands through `runner`, using the default `cargo`.
    pub fn with_runner(runner: R) -> Self {
        Self {
            toolchain: Toolchain::default(),
            runner,
        }
    }

    /// Replaces the cargo toolchain used for the probe and the composed commands.
    pub fn toolchain(mut self, toolchain: Toolchain) -> Self {
        self.toolchain = toolchain;
        self
    }

    /// Checks for cargo-ros2 and registers environment hooks. Returns non-zero on failure.
    async fn prepare(
        &self,
        context: &TaskContext,
        additional_hooks: &mut Vec<EnvironmentHook>,
    ) -> i32 {
        let probe = self.toolchain.probe_command();
        if self.runner.probe(&probe).await != 0 {
            tracing::error!("{MISSING_CARGO_ROS2}");
            return 1;
        }

        register_ament_prefix_hook(
            Path::new(&context.args.install_base),
            &context.pkg.name,
            additional_hooks,
        );
        0
    }
}

impl<R: CommandRunner> TaskExtension for AmentCargoBuildTask<R> {
    fn add_arguments(&self, command: Command) -> Command {
        command.arg(
            Arg::new("lookup_in_workspace")
                .long("lookup-in-workspace")
                .action(ArgAction::SetTrue)
                .help(
                    "Look up dependencies in the workspace directory. By default, dependencies \
                     are looked up only in the installation prefixes. This option is useful for \
                     setting up a .cargo/config.toml for subsequent builds with cargo.",
                ),
        )
    }
}

#[async_trait]
impl<R: CommandRunner> BuildTask for AmentCargoBuildTask<R> {
    async fn build(
        &self,
        context: &TaskContext,
        additional_hooks: &mut Vec<EnvironmentHook>,
    ) -> Result<i32> {
        let rc = self.prepare(context, additional_hooks).await;
        if rc != 0 {
            return Ok(rc);
        }

        let args = &context.args;
        let cmd = self.toolchain.build_command(
            &args.install_base,
            args.cargo_args(),
            args.lookup_in_workspace,
        );

        tracing::info!(package = %context.pkg.name, "Building with cargo-ros2");
        let code = self.runner.run(&cmd, &context.pkg.path).await?;
        Ok(code.unwrap_or(0))
    }
}
