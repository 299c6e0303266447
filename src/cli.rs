//! Command-line front end: resolves the package, assembles the task context and
//! runs the build or test task for it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};

use crate::command::Toolchain;
use crate::hook::write_hooks;
use crate::process::ProcessRunner;
use crate::task::{
    AmentCargoBuildTask, AmentCargoTestTask, BuildTask, PackageDescriptor, TaskArgs, TaskContext,
    TaskExtension, TestTask, add_common_arguments,
};
use crate::workspace::{PackageMetadata, identify};

/// Builds the top-level command with a subcommand per verb.
pub fn command() -> Command {
    let build = AmentCargoBuildTask::new().add_arguments(add_common_arguments(
        package_arguments(Command::new("build").about("Build the package with cargo-ros2")),
    ));
    let test = AmentCargoTestTask::new()
        .add_arguments(package_arguments(
            Command::new("test").about("Run the package's tests with cargo test"),
        ))
        .arg(
            Arg::new("dry_run")
                .long("dry-run")
                .action(ArgAction::SetTrue)
                .help("Print the test command instead of running it"),
        );

    let command = Command::new("colcon-ros-cargo")
        .about("Build and test ament_cargo packages through cargo-ros2")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Enable debug logging"),
        )
        .subcommand(build)
        .subcommand(test);

    #[cfg(feature = "workspace")]
    let command = command.subcommand(
        Command::new("list")
            .about("List ament_cargo packages in the workspace")
            .arg(
                Arg::new("base_paths")
                    .long("base-paths")
                    .num_args(1..)
                    .value_parser(value_parser!(PathBuf))
                    .help("Directories to scan (default: current directory)"),
            ),
    );

    command
}

fn package_arguments(command: Command) -> Command {
    command
        .arg(
            Arg::new("path")
                .long("path")
                .value_parser(value_parser!(PathBuf))
                .help("Package source directory (default: current directory)"),
        )
        .arg(
            Arg::new("install_base")
                .long("install-base")
                .value_parser(value_parser!(PathBuf))
                .help("Installation prefix (default: install/<package>)"),
        )
        .arg(
            Arg::new("log_base")
                .long("log-base")
                .value_parser(value_parser!(PathBuf))
                .help("Log directory (default: $COLCON_LOG_PATH or log)"),
        )
}

/// Runs the selected verb and returns its exit code.
pub async fn run(matches: &ArgMatches) -> Result<i32> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;

    match matches.subcommand() {
        Some(("build", sub)) => {
            let job = Job::resolve(sub, &cwd, "build")?;
            let context = job.context(sub, false);
            let task = AmentCargoBuildTask::with_runner(job.runner).toolchain(Toolchain::from_env());
            build_and_install_hooks(&task, &context).await
        }
        Some(("test", sub)) => {
            let job = Job::resolve(sub, &cwd, "test")?;
            let context = job.context(sub, sub.get_flag("dry_run"));
            let task = AmentCargoTestTask::with_runner(job.runner).toolchain(Toolchain::from_env());
            task.test(&context).await
        }
        #[cfg(feature = "workspace")]
        Some(("list", sub)) => {
            let roots: Vec<PathBuf> = sub
                .get_many::<PathBuf>("base_paths")
                .map(|paths| paths.cloned().collect())
                .unwrap_or_else(|| vec![cwd.clone()]);
            for pkg in crate::workspace::discover(&roots) {
                println!("{}\t{}\t({})", pkg.name, pkg.path.display(), pkg.package_type);
            }
            Ok(0)
        }
        _ => anyhow::bail!("No verb given. Run with --help for usage."),
    }
}

/// Runs the build task and persists the hooks it registered once the build exits 0.
pub async fn build_and_install_hooks<T: BuildTask + ?Sized>(
    task: &T,
    context: &TaskContext,
) -> Result<i32> {
    let mut hooks = Vec::new();
    let rc = task.build(context, &mut hooks).await?;
    if rc == 0 {
        write_hooks(&hooks)?;
    } else {
        tracing::debug!(package = %context.pkg.name, rc, "Build failed; not writing hooks");
    }
    Ok(rc)
}

struct Job {
    package: PackageMetadata,
    install_base: PathBuf,
    runner: ProcessRunner,
}

impl Job {
    fn resolve(matches: &ArgMatches, cwd: &Path, verb: &str) -> Result<Self> {
        let path = matches
            .get_one::<PathBuf>("path")
            .map(|p| cwd.join(p))
            .unwrap_or_else(|| cwd.to_path_buf());

        let package = identify(&path, None)?.with_context(|| {
            format!(
                "{} is not an ament_cargo package (needs package.xml and a non-virtual Cargo.toml)",
                path.display()
            )
        })?;

        let install_base = matches
            .get_one::<PathBuf>("install_base")
            .map(|p| cwd.join(p))
            .unwrap_or_else(|| cwd.join("install").join(&package.name));

        let log_base = matches
            .get_one::<PathBuf>("log_base")
            .map(|p| cwd.join(p))
            .unwrap_or_else(|| crate::log::log_base(cwd));
        let log_path = crate::log::package_log_path(&log_base, verb, &package.name);

        tracing::debug!(
            package = %package.name,
            install_base = %install_base.display(),
            log = %log_path.display(),
            "Resolved {verb} job"
        );

        Ok(Self {
            package,
            install_base,
            runner: ProcessRunner::new().with_log_file(log_path),
        })
    }

    fn context(&self, matches: &ArgMatches, dry_run: bool) -> TaskContext {
        TaskContext {
            pkg: PackageDescriptor {
                name: self.package.name.clone(),
                path: self.package.path.clone(),
            },
            args: TaskArgs::from_matches(matches, self.install_base.to_string_lossy().into_owned()),
            dry_run,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::task::testing::RecordingRunner;

    fn build_context(install_base: &Path) -> TaskContext {
        TaskContext {
            pkg: PackageDescriptor {
                name: "talker_rs".to_string(),
                path: install_base.to_path_buf(),
            },
            args: TaskArgs {
                install_base: install_base.to_string_lossy().into_owned(),
                ..TaskArgs::default()
            },
            dry_run: false,
        }
    }

    #[rstest]
    #[case::success(Some(0), 0, true)]
    #[case::no_run_result(None, 0, true)]
    #[case::failure(Some(101), 101, false)]
    #[tokio::test]
    async fn test_hooks_written_only_after_successful_build(
        #[case] run_code: Option<i32>,
        #[case] expected_rc: i32,
        #[case] hooks_written: bool,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let install_base = dir.path().join("install").join("talker_rs");
        let task = AmentCargoBuildTask::with_runner(RecordingRunner::new(0, run_code));

        let rc = build_and_install_hooks(&task, &build_context(&install_base))
            .await
            .unwrap();

        assert_eq!(rc, expected_rc);
        let hook_dir = install_base.join("share").join("talker_rs").join("hook");
        assert_eq!(hook_dir.join("ament_prefix_path.dsv").is_file(), hooks_written);
        assert_eq!(hook_dir.join("ament_prefix_path.sh").is_file(), hooks_written);
    }

    #[tokio::test]
    async fn test_missing_cargo_ros2_writes_no_hooks() {
        let dir = tempfile::tempdir().unwrap();
        let install_base = dir.path().join("install").join("talker_rs");
        let task = AmentCargoBuildTask::with_runner(RecordingRunner::new(127, Some(0)));

        let rc = build_and_install_hooks(&task, &build_context(&install_base))
            .await
            .unwrap();

        assert_eq!(rc, 1);
        assert!(!install_base.join("share").exists());
    }

    #[test]
    fn test_command_is_well_formed() {
        command().debug_assert();
    }

    #[test]
    fn test_build_flags_parse() {
        let matches = command()
            .try_get_matches_from([
                "colcon-ros-cargo",
                "build",
                "--path",
                "src/talker",
                "--lookup-in-workspace",
                "--cargo-args",
                "--release",
            ])
            .unwrap();
        let (verb, sub) = matches.subcommand().unwrap();
        assert_eq!(verb, "build");
        assert_eq!(
            sub.get_one::<PathBuf>("path"),
            Some(&PathBuf::from("src/talker"))
        );

        let args = TaskArgs::from_matches(sub, "/install".to_string());
        assert!(args.lookup_in_workspace);
        assert_eq!(args.cargo_args(), Some(["--release".to_string()].as_slice()));
    }

    #[test]
    fn test_dry_run_is_test_only() {
        assert!(
            command()
                .try_get_matches_from(["colcon-ros-cargo", "build", "--dry-run"])
                .is_err()
        );
        let matches = command()
            .try_get_matches_from(["colcon-ros-cargo", "test", "--dry-run"])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        assert!(sub.get_flag("dry_run"));
    }

    #[test]
    fn test_test_verb_has_no_lookup_flag() {
        let result = command().try_get_matches_from([
            "colcon-ros-cargo",
            "test",
            "--lookup-in-workspace",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_job_resolve_defaults_install_base_under_cwd() {
        let ws = tempfile::tempdir().unwrap();
        let pkg_dir = ws.path().join("src").join("talker");
        std::fs::create_dir_all(&pkg_dir).unwrap();
        std::fs::write(
            pkg_dir.join("package.xml"),
            "<package format=\"3\"><name>talker_rs</name><version>1.0.0</version></package>",
        )
        .unwrap();
        std::fs::write(
            pkg_dir.join("Cargo.toml"),
            "[package]\nname = \"talker_rs\"\nversion = \"1.0.0\"\n",
        )
        .unwrap();

        let matches = command()
            .try_get_matches_from([
                "colcon-ros-cargo",
                "build",
                "--path",
                "src/talker",
                "--log-base",
                "logs",
            ])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        let job = Job::resolve(sub, ws.path(), "build").unwrap();

        assert_eq!(job.package.name, "talker_rs");
        assert_eq!(job.install_base, ws.path().join("install").join("talker_rs"));
        assert_eq!(
            job.runner.log_path(),
            Some(
                ws.path()
                    .join("logs/latest_build/talker_rs/stdout_stderr.log")
                    .as_path()
            )
        );

        let context = job.context(sub, false);
        assert_eq!(context.pkg.path, pkg_dir);
        assert_eq!(context.args.cargo_args(), None);
    }

    #[test]
    fn test_job_resolve_rejects_non_cargo_package() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("package.xml"),
            "<package format=\"3\"><name>cmake_pkg</name></package>",
        )
        .unwrap();

        let matches = command()
            .try_get_matches_from(["colcon-ros-cargo", "test"])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        assert!(Job::resolve(sub, dir.path(), "test").is_err());
    }
}
