use crate::errors::TesterError;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    env, fmt,
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::Command,
    task::JoinHandle,
    time,
};
use tracing::{debug, warn};

/// Exit code reported when the process did not exit on its own.
/// Test tools only ever exit with codes in `0..=255`.
pub const SENTINEL_EXIT_CODE: i32 = -1;

/// How an external process came to an end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The process exited with its own code.
    Exited(i32),
    /// The process was terminated by a signal.
    Signaled(Option<i32>),
    /// The process exceeded its timeout and was killed.
    TimedOut(Duration),
    /// The process could not be started.
    LaunchFailed,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Termination::Exited(code) => write!(f, "exited with code {}", code),
            Termination::Signaled(Some(sig)) => {
                write!(f, "terminated by signal {}", sig)
            }
            Termination::Signaled(None) => write!(f, "terminated by a signal"),
            Termination::TimedOut(limit) => {
                write!(f, "timed out after {:?}", limit)
            }
            Termination::LaunchFailed => write!(f, "failed to launch"),
        }
    }
}

/// Captured result of one external process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// The child's exit code, or [SENTINEL_EXIT_CODE].
    pub exit_code: i32,
    /// Captured STDOUT, lossily decoded.
    pub stdout: String,
    /// Captured STDERR, lossily decoded. Carries a diagnostic when the
    /// process did not exit on its own.
    pub stderr: String,
    pub termination: Termination,
    pub elapsed: Duration,
}

impl ProcessOutput {
    fn abnormal(termination: Termination, stderr: String, start: Instant) -> Self {
        Self {
            exit_code: SENTINEL_EXIT_CODE,
            stdout: String::new(),
            stderr,
            termination,
            elapsed: start.elapsed(),
        }
    }
}

/// A single invocation of an external command.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub command: PathBuf,
    pub args: Vec<String>,
    /// Working directory of the child only.
    pub work_dir: PathBuf,
    /// Merged into the inherited environment of the child.
    pub env: HashMap<String, String>,
    pub timeout: Duration,
}

impl Invocation {
    pub fn new<P: Into<PathBuf>>(command: P, work_dir: P) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            work_dir: work_dir.into(),
            env: HashMap::new(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, env: HashMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn command_line(&self) -> String {
        let mut line = self.command.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    fn construct_command(&self) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .current_dir(&self.work_dir)
            .envs(&self.env)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    /// Run the invocation to completion or until its timeout expires.
    /// Never fails: every abnormal ending is reported through
    /// [ProcessOutput::termination] with the sentinel exit code.
    pub async fn run(&self) -> ProcessOutput {
        let start = Instant::now();
        debug!(command = %self.command_line(), work_dir = %self.work_dir.display(), "spawning");

        let mut cmd = self.construct_command();
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!(command = %self.command_line(), error = %err, "process failed to launch");
                return ProcessOutput::abnormal(
                    Termination::LaunchFailed,
                    format!("Failed to launch {}: {}", self.command_line(), err),
                    start,
                );
            }
        };
        let stdout = Capture::start(child.stdout.take());
        let stderr = Capture::start(child.stderr.take());

        // Only the child itself is bounded by the timeout. Background
        // processes it started may keep the pipes open after it exited.
        let waited = time::timeout(self.timeout, child.wait()).await;
        let status = match waited {
            Ok(status) => status,
            Err(_) => {
                warn!(command = %self.command_line(), timeout = ?self.timeout, "process timed out");
                if let Err(err) = child.kill().await {
                    warn!(error = %err, "could not kill timed out process");
                }
                let mut out = ProcessOutput::abnormal(
                    Termination::TimedOut(self.timeout),
                    String::new(),
                    start,
                );
                out.stdout = stdout.finish().await;
                out.stderr = stderr.finish().await;
                push_line(
                    &mut out.stderr,
                    &format!(
                        "Process timed out after {} seconds: {}",
                        self.timeout.as_secs_f64(),
                        self.command_line()
                    ),
                );
                out.elapsed = start.elapsed();
                return out;
            }
        };
        let stdout = stdout.finish().await;
        let mut stderr = stderr.finish().await;

        let (exit_code, termination) = match status {
            Err(err) => {
                warn!(command = %self.command_line(), error = %err, "could not wait for process");
                push_line(&mut stderr, &format!("Failed to wait for process: {}", err));
                (SENTINEL_EXIT_CODE, Termination::Signaled(None))
            }
            Ok(status) => match status.code() {
                Some(code) => (code, Termination::Exited(code)),
                None => {
                    let termination = Termination::Signaled(signal_of(&status));
                    push_line(&mut stderr, &format!("Process {}", termination));
                    (SENTINEL_EXIT_CODE, termination)
                }
            },
        };
        debug!(exit_code, elapsed = ?start.elapsed(), "process finished");
        ProcessOutput {
            exit_code,
            stdout,
            stderr,
            termination,
            elapsed: start.elapsed(),
        }
    }
}

/// How long the pipes are drained after the child is gone.
const PIPE_GRACE: Duration = Duration::from_millis(500);

/// Output of one child pipe, read on its own task.
struct Capture {
    buf: Arc<Mutex<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
}

impl Capture {
    fn start<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let task = pipe.map(|mut pipe| {
            let sink = Arc::clone(&buf);
            tokio::spawn(async move {
                let mut chunk = [0u8; 8192];
                loop {
                    match pipe.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => sink.lock().extend_from_slice(&chunk[..n]),
                    }
                }
            })
        });
        Self { buf, task }
    }

    /// Whatever was read, once the pipe closed or [PIPE_GRACE] passed.
    async fn finish(self) -> String {
        if let Some(mut task) = self.task {
            if time::timeout(PIPE_GRACE, &mut task).await.is_err() {
                debug!("pipe still open after the process ended");
                task.abort();
            }
        }
        let bytes = std::mem::take(&mut *self.buf.lock());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

fn push_line(buf: &mut String, line: &str) {
    if !buf.is_empty() && !buf.ends_with('\n') {
        buf.push('\n');
    }
    buf.push_str(line);
}

#[cfg(unix)]
fn signal_of(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn signal_of(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Resolve `command` to an executable file. Commands containing a path
/// separator are resolved against `root`, bare names are looked up on `PATH`.
pub fn resolve_executable(command: &str, root: &Path) -> Result<PathBuf, TesterError> {
    let candidate = Path::new(command);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        let path = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            root.join(candidate)
        };
        if is_executable(&path) {
            return Ok(path);
        }
        return Err(TesterError(format!(
            "Test runner {} is missing or not executable.",
            path.display()
        )));
    }

    env::var_os("PATH")
        .and_then(|paths| {
            env::split_paths(&paths)
                .map(|dir| dir.join(command))
                .find(|path| is_executable(path))
        })
        .ok_or_else(|| {
            TesterError(format!("Test runner {} was not found on PATH.", command))
        })
}
