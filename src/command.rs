use std::fmt;
use std::path::PathBuf;

/// Pass-through token that selects a release build.
pub const RELEASE_FLAG: &str = "--release";
/// Separates `ament-build` options from arguments forwarded to `cargo build`.
pub const SEPARATOR: &str = "--";
/// Makes `cargo-ros2` resolve dependencies from the workspace as well as install prefixes.
pub const LOOKUP_IN_WORKSPACE_FLAG: &str = "--lookup-in-workspace";

/// The cargo executable every composed command starts with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    cargo: PathBuf,
}

impl Toolchain {
    /// Uses the given cargo executable.
    pub fn new(cargo: impl Into<PathBuf>) -> Self {
        Self {
            cargo: cargo.into(),
        }
    }

    /// Honours `CARGO` when set (cargo exports it to subcommands), falling back to `cargo`.
    pub fn from_env() -> Self {
        match std::env::var_os("CARGO") {
            Some(cargo) if !cargo.is_empty() => Self::new(cargo),
            _ => Self::default(),
        }
    }

    /// Returns the cargo executable as a command-line token.
    pub fn cargo(&self) -> String {
        self.cargo.to_string_lossy().into_owned()
    }

    /// `cargo ros2 --help`, used to check that `cargo-ros2` is installed.
    pub fn probe_command(&self) -> CommandLine {
        CommandLine::new([self.cargo(), "ros2".into(), "--help".into()])
    }

    /// Composes the `cargo ros2 ament-build` invocation.
    ///
    /// `--release` is lifted out of `cargo_args` into a single `--release` option; the
    /// remaining arguments keep their order and follow a `--` separator.
    pub fn build_command(
        &self,
        install_base: &str,
        cargo_args: Option<&[String]>,
        lookup_in_workspace: bool,
    ) -> CommandLine {
        let cargo_args = cargo_args.unwrap_or_default();

        let mut cmd = vec![
            self.cargo(),
            "ros2".to_string(),
            "ament-build".to_string(),
            "--install-base".to_string(),
            install_base.to_string(),
        ];

        if cargo_args.iter().any(|arg| arg == RELEASE_FLAG) {
            cmd.push(RELEASE_FLAG.to_string());
        }

        let forwarded: Vec<&String> = cargo_args
            .iter()
            .filter(|arg| *arg != RELEASE_FLAG)
            .collect();
        if !forwarded.is_empty() {
            cmd.push(SEPARATOR.to_string());
            cmd.extend(forwarded.into_iter().cloned());
        }

        if lookup_in_workspace {
            cmd.push(LOOKUP_IN_WORKSPACE_FLAG.to_string());
        }

        CommandLine(cmd)
    }

    /// Composes the `cargo test` invocation. Arguments are appended directly, without a separator.
    pub fn test_command(&self, cargo_args: Option<&[String]>) -> CommandLine {
        let mut cmd = vec![self.cargo(), "test".to_string()];
        cmd.extend(cargo_args.unwrap_or_default().iter().cloned());
        CommandLine(cmd)
    }
}

impl Default for Toolchain {
    fn default() -> Self {
        Self::new("cargo")
    }
}

/// An external process invocation: program followed by its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine(Vec<String>);

impl CommandLine {
    /// Builds a command line from its tokens.
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(tokens.into_iter().map(Into::into).collect())
    }

    /// The program to execute, or `None` for an empty command line.
    pub fn program(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// Arguments after the program.
    pub fn args(&self) -> &[String] {
        self.0.get(1..).unwrap_or_default()
    }

    /// Every token, program included.
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Whether any token equals `token` exactly.
    pub fn contains(&self, token: &str) -> bool {
        self.0.iter().any(|t| t == token)
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}
