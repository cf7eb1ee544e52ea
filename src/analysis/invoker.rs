//! Running external analysis tools.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tempfile::TempDir;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use super::models::SourceSpec;

/// File name used for inline sources. Tools infer the language from the
/// extension.
pub const INLINE_CONTRACT_NAME: &str = "Contract.sol";

/// Per-stream capture cap. Anything beyond is read and discarded so the child
/// never blocks on a full pipe.
const MAX_CAPTURE_BYTES: usize = 16 * 1024 * 1024;

/// How long to keep draining pipes after the child exits. A grandchild that
/// inherited the pipes can keep them open indefinitely.
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A fully resolved command line.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Duration,
}

impl Invocation {
    /// Builds an invocation from a command vector (`["myth", "analyze"]`)
    /// followed by tool arguments.
    pub fn new(command: &[String], args: Vec<String>, timeout: Duration) -> Option<Self> {
        let (program, leading) = command.split_first()?;
        let mut all_args = leading.to_vec();
        all_args.extend(args);
        Some(Self {
            program: program.clone(),
            args: all_args,
            working_dir: None,
            timeout,
        })
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// Captured output of a process that ran to completion.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ProcessOutput {
    pub fn exited_cleanly(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Spawns processes. The orchestrator only talks to this trait.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Runs the invocation to completion or until its timeout.
    ///
    /// A non-zero exit is not an error here; interpreting it is the formatter's
    /// job. Only spawn failures and timeouts are errors, and on timeout the
    /// child has already been killed.
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, InvokeError>;
}

/// [`ProcessRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessInvoker;

#[async_trait]
impl ProcessRunner for ProcessInvoker {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, InvokeError> {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // The tool leads its own process group so a timeout can take down
        // everything it spawned (solc, python workers).
        #[cfg(unix)]
        command.process_group(0);
        if let Some(dir) = &invocation.working_dir {
            command.current_dir(dir);
        }

        debug!(
            "Spawning {} {:?} (timeout {:?})",
            invocation.program, invocation.args, invocation.timeout
        );
        let started = Instant::now();
        let mut child = command.spawn().map_err(|source| InvokeError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

        let stdout_task = tokio::spawn(capture(child.stdout.take()));
        let stderr_task = tokio::spawn(capture(child.stderr.take()));

        let status = match tokio::time::timeout(invocation.timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!(
                    "{} exceeded {:?}, killing it",
                    invocation.program, invocation.timeout
                );
                // The leader is not reaped yet, so its pid still names the group.
                if let Some(pid) = child.id() {
                    if let Err(e) = kill_process_group(pid) {
                        warn!("Failed to kill process group of {}: {}", invocation.program, e);
                    }
                }
                // kill() also waits, so the child is reaped here.
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill {}: {}", invocation.program, e);
                }
                stdout_task.abort();
                stderr_task.abort();
                return Err(InvokeError::Timeout {
                    secs: whole_secs_rounded_up(invocation.timeout),
                });
            }
        };

        let stdout = drain(stdout_task).await;
        let stderr = drain(stderr_task).await;
        let duration = started.elapsed();
        debug!(
            "{} exited with {:?} after {:?}",
            invocation.program,
            status.code(),
            duration
        );

        Ok(ProcessOutput {
            exit_code: status.code(),
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
            duration,
        })
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) -> std::io::Result<()> {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let pgid = i32::try_from(pid)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "pid out of range"))?;
    killpg(Pid::from_raw(pgid), Signal::SIGKILL)
        .map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) -> std::io::Result<()> {
    Ok(())
}

/// Sub-second timeouts still report a non-zero budget.
fn whole_secs_rounded_up(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

async fn capture<R: AsyncRead + Unpin>(pipe: Option<R>) -> Vec<u8> {
    let Some(mut pipe) = pipe else {
        return Vec::new();
    };
    let mut captured = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let room = MAX_CAPTURE_BYTES.saturating_sub(captured.len());
                captured.extend_from_slice(&chunk[..n.min(room)]);
            }
            Err(e) => {
                debug!("Pipe read failed: {}", e);
                break;
            }
        }
    }
    captured
}

async fn drain(task: tokio::task::JoinHandle<Vec<u8>>) -> Vec<u8> {
    match tokio::time::timeout(PIPE_DRAIN_GRACE, task).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => {
            warn!("Output capture task failed: {}", e);
            Vec::new()
        }
        Err(_) => {
            warn!("Output pipe still open {:?} after exit", PIPE_DRAIN_GRACE);
            Vec::new()
        }
    }
}

/// The on-disk contract a tool runs against.
///
/// Inline sources are written into a private temporary directory that is
/// removed when this value is dropped, whichever way the run ends.
#[derive(Debug)]
pub struct ContractWorkspace {
    contract_path: PathBuf,
    working_dir: PathBuf,
    _scratch: Option<TempDir>,
}

impl ContractWorkspace {
    pub async fn prepare(source: &SourceSpec) -> std::io::Result<Self> {
        match source {
            SourceSpec::Inline(code) => {
                let scratch = tempfile::Builder::new()
                    .prefix("vuln-analyzer-")
                    .tempdir()?;
                let contract_path = scratch.path().join(INLINE_CONTRACT_NAME);
                tokio::fs::write(&contract_path, code).await?;
                Ok(Self {
                    working_dir: scratch.path().to_path_buf(),
                    contract_path,
                    _scratch: Some(scratch),
                })
            }
            SourceSpec::File(path) => {
                let contract_path = if path.is_absolute() {
                    path.clone()
                } else {
                    std::env::current_dir()?.join(path)
                };
                let working_dir = contract_path
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."));
                Ok(Self {
                    contract_path,
                    working_dir,
                    _scratch: None,
                })
            }
        }
    }

    pub fn contract_path(&self) -> &Path {
        &self.contract_path
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str, timeout: Duration) -> Invocation {
        Invocation::new(
            &["sh".to_string(), "-c".to_string()],
            vec![script.to_string()],
            timeout,
        )
        .unwrap()
    }

    #[test]
    fn command_vector_is_split_into_program_and_args() {
        let inv = Invocation::new(
            &["myth".to_string(), "analyze".to_string()],
            vec!["A.sol".to_string()],
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(inv.program, "myth");
        assert_eq!(inv.args, vec!["analyze", "A.sol"]);
        assert!(Invocation::new(&[], vec![], Duration::from_secs(1)).is_none());
    }

    #[tokio::test]
    async fn captures_stdout_stderr_and_exit_code() {
        let output = ProcessInvoker
            .run(&sh("echo out; echo err >&2; exit 3", Duration::from_secs(10)))
            .await
            .unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        assert!(!output.exited_cleanly());
    }

    #[tokio::test]
    async fn arguments_are_not_shell_interpreted() {
        let inv = Invocation::new(
            &["echo".to_string()],
            vec!["$(whoami); rm -rf /".to_string()],
            Duration::from_secs(10),
        )
        .unwrap();
        let output = ProcessInvoker.run(&inv).await.unwrap();
        assert_eq!(output.stdout.trim(), "$(whoami); rm -rf /");
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let inv = Invocation::new(
            &["definitely-not-a-real-analyzer".to_string()],
            vec![],
            Duration::from_secs(1),
        )
        .unwrap();
        let err = ProcessInvoker.run(&inv).await.unwrap_err();
        assert!(matches!(err, InvokeError::Spawn { .. }));
    }

    #[tokio::test]
    async fn slow_process_is_killed_on_timeout() {
        let started = Instant::now();
        let err = ProcessInvoker
            .run(&sh("sleep 30", Duration::from_millis(300)))
            .await
            .unwrap_err();
        assert!(matches!(err, InvokeError::Timeout { secs: 1 }));
        assert_eq!(err.to_string(), "timed out after 1s");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn timeouts_round_up_to_whole_seconds() {
        assert_eq!(whole_secs_rounded_up(Duration::from_millis(300)), 1);
        assert_eq!(whole_secs_rounded_up(Duration::from_secs(5)), 5);
        assert_eq!(whole_secs_rounded_up(Duration::from_millis(5001)), 6);
    }

    /// True while `pid` exists and is not a zombie.
    #[cfg(target_os = "linux")]
    fn is_alive(pid: u32) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            // The state follows the parenthesized command name.
            Ok(stat) => stat
                .rsplit_once(')')
                .map(|(_, rest)| !rest.trim_start().starts_with('Z'))
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn timeout_kills_processes_the_tool_spawned() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("helper.pid");
        let inv = Invocation::new(
            &["sh".to_string(), "-c".to_string()],
            vec![
                r#"sleep 300 & echo $! > "$1"; wait; true"#.to_string(),
                "tool".to_string(),
                pid_file.to_string_lossy().into_owned(),
            ],
            Duration::from_millis(500),
        )
        .unwrap();

        let err = ProcessInvoker.run(&inv).await.unwrap_err();
        assert!(matches!(err, InvokeError::Timeout { .. }));

        let helper: u32 = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while is_alive(helper) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!is_alive(helper), "helper process {} survived the timeout", helper);
    }

    #[tokio::test]
    async fn inline_workspace_is_removed_on_drop() {
        let workspace = ContractWorkspace::prepare(&SourceSpec::Inline("contract A {}".into()))
            .await
            .unwrap();
        let path = workspace.contract_path().to_path_buf();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "contract A {}");
        assert!(path.ends_with(INLINE_CONTRACT_NAME));
        drop(workspace);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn file_workspace_runs_next_to_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("Token.sol");
        std::fs::write(&file, "contract Token {}").unwrap();
        let workspace = ContractWorkspace::prepare(&SourceSpec::File(file.clone()))
            .await
            .unwrap();
        assert_eq!(workspace.contract_path(), file.as_path());
        assert_eq!(workspace.working_dir(), dir.path());
        drop(workspace);
        assert!(file.exists());
    }
}
