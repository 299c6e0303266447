use std::path::{Path, PathBuf};

use tracing_subscriber::EnvFilter;

/// Returns the log base directory: `COLCON_LOG_PATH` if set, otherwise `log` under `cwd`.
pub fn log_base(cwd: &Path) -> PathBuf {
    match std::env::var_os("COLCON_LOG_PATH") {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => cwd.join("log"),
    }
}

/// Path of the combined output log for one package job,
/// `<log_base>/latest_<verb>/<package>/stdout_stderr.log`.
pub fn package_log_path(log_base: &Path, verb: &str, package: &str) -> PathBuf {
    log_base
        .join(format!("latest_{verb}"))
        .join(package)
        .join("stdout_stderr.log")
}

/// Installs the global tracing subscriber. `RUST_LOG` wins over `verbose`.
pub fn init(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .try_init();
}
