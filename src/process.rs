use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::command::CommandLine;

/// Executes external commands on behalf of a task.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `cmd` in `cwd`, streaming its output, and returns the exit code.
    ///
    /// `Ok(None)` means the command was not run at all.
    async fn run(&self, cmd: &CommandLine, cwd: &Path) -> Result<Option<i32>>;

    /// Runs `cmd` with its output captured and discarded, returning only the exit code.
    ///
    /// A command that cannot be spawned reports a non-zero code rather than an error.
    async fn probe(&self, cmd: &CommandLine) -> i32;
}

/// Runs commands as child processes of the current process.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    log_path: Option<PathBuf>,
}

impl ProcessRunner {
    /// Creates a runner that only forwards output to the tracing subscriber.
    pub fn new() -> Self {
        Self::default()
    }

    /// Also writes every output line to the given log file, replacing its previous contents
    /// on each run.
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// The log file output is written to, if any.
    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, cmd: &CommandLine, cwd: &Path) -> Result<Option<i32>> {
        let Some(program) = cmd.program() else {
            return Ok(None);
        };

        if let Some(parent) = self.log_path.as_deref().and_then(Path::parent) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
        }

        tracing::info!(cwd = %cwd.display(), "Invoking command: {cmd}");

        let mut child = Command::new(program)
            .args(cmd.args())
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn `{cmd}` in {}", cwd.display()))?;

        let (tx, rx) = mpsc::channel(1000);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, tx));
        }
        let writer = tokio::spawn(write_output(rx, self.log_path.clone()));

        let status = child
            .wait()
            .await
            .with_context(|| format!("Failed to wait for `{cmd}`"))?;
        if let Err(err) = writer.await {
            tracing::warn!(%err, "Output writer for `{cmd}` did not finish");
        }

        let code = exit_code(status);
        tracing::debug!(code, "Command finished: {cmd}");
        Ok(Some(code))
    }

    async fn probe(&self, cmd: &CommandLine) -> i32 {
        let Some(program) = cmd.program() else {
            return 1;
        };

        match Command::new(program)
            .args(cmd.args())
            .stdin(Stdio::null())
            .output()
            .await
        {
            Ok(output) => exit_code(output.status),
            Err(err) => {
                tracing::debug!(%err, "Failed to spawn probe `{cmd}`");
                127
            }
        }
    }
}

async fn forward_lines<R>(stream: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream).lines();
    while let Ok(Some(line)) = reader.next_line().await {
        if tx.send(line).await.is_err() {
            break;
        }
    }
}

async fn write_output(mut rx: mpsc::Receiver<String>, log_path: Option<PathBuf>) {
    let mut log = match log_path {
        Some(path) => tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .await
            .map_err(|err| tracing::warn!(%err, path = %path.display(), "Cannot open log file"))
            .ok()
            .map(|file| (file, path)),
        None => None,
    };

    while let Some(line) = rx.recv().await {
        if let Some((f, path)) = log.as_mut()
            && let Err(err) = write_line(f, &line).await
        {
            tracing::warn!(%err, path = %path.display(), "Cannot write log file; dropping further output");
            log = None;
        }
        tracing::info!(target: "colcon_ros_cargo::output", "{line}");
    }

    if let Some((mut f, path)) = log
        && let Err(err) = f.flush().await
    {
        tracing::warn!(%err, path = %path.display(), "Cannot flush log file");
    }
}

async fn write_line(f: &mut tokio::fs::File, line: &str) -> std::io::Result<()> {
    f.write_all(line.as_bytes()).await?;
    f.write_all(b"\n").await
}

/// Maps an exit status to an integer code; on Unix a signal `n` becomes `-n`.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }

    1
}
