//! Build and test ROS 2 `ament_cargo` packages by delegating to `cargo-ros2`.
//!
//! The build task checks that `cargo ros2` is installed, registers the package's
//! `AMENT_PREFIX_PATH` hook and runs `cargo ros2 ament-build`; the test task runs
//! `cargo test`. Both relay the tool's exit code unchanged.
//!
//! Optional features: `workspace` for scanning workspaces for `ament_cargo` packages.

/// Command-line front end for the `colcon-ros-cargo` binary.
pub mod cli;
/// Composition of the cargo and cargo-ros2 command lines.
pub mod command;
/// Environment hooks and their on-disk `.dsv`/`.sh` forms.
pub mod hook;
/// Tracing setup and per-package log locations.
pub mod log;
/// Subprocess execution behind the `CommandRunner` seam.
pub mod process;
/// Build and test task extensions.
pub mod task;
/// `ament_cargo` package identification and workspace discovery.
pub mod workspace;

pub use command::{CommandLine, Toolchain};
pub use hook::{EnvironmentHook, HookMode, register_ament_prefix_hook, write_hooks};
pub use process::{CommandRunner, ProcessRunner};
pub use task::{
    AmentCargoBuildTask, AmentCargoTestTask, BuildTask, PackageDescriptor, TaskArgs, TaskContext,
    TaskExtension, TestTask,
};
#[cfg(feature = "workspace")]
pub use workspace::discover;
pub use workspace::{Dependencies, IdentifyError, PackageMetadata, identify};
