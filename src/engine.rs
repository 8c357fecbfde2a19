//! External alignment engine.
//!
//! The engine is modelled as a capability so the pipeline can run against a
//! fake in tests. `ClustalOmega` is the process-backed implementation: it
//! spawns the executable, drains stdout and stderr on helper threads and
//! polls for exit until the deadline, killing the child when it passes. The
//! same deadline bounds the wait for the drained output, since a background
//! child can keep the pipes open after the engine itself exits.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};
use serde::Serialize;
use thiserror::Error;

/// Interval between exit checks while waiting on the engine.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Captured result of one engine run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Whether the engine can be invoked, and what version it reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub available: bool,
    pub version: Option<String>,
}

impl EngineStatus {
    pub fn unavailable() -> Self {
        Self {
            available: false,
            version: None,
        }
    }
}

/// Errors raised while running the engine process.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("executable not found at '{}'", .0.display())]
    NotFound(PathBuf),

    #[error("timed out after {} seconds", .0.as_secs())]
    TimedOut(Duration),

    #[error("{0}")]
    Io(#[from] io::Error),
}

/// An alignment engine reachable through a command line.
pub trait AlignmentEngine: Send + Sync {
    /// Runs `--version` with a short timeout.
    fn check_available(&self) -> EngineStatus;

    /// Runs the engine with `args`, killing it after `timeout`.
    fn run(&self, args: &[String], timeout: Duration) -> Result<ProcessOutput, EngineError>;
}

/// Clustal Omega invoked as a subprocess.
#[derive(Debug, Clone)]
pub struct ClustalOmega {
    path: PathBuf,
    version_timeout: Duration,
}

impl ClustalOmega {
    pub fn new(path: impl Into<PathBuf>, version_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            version_timeout,
        }
    }

}

impl AlignmentEngine for ClustalOmega {
    fn check_available(&self) -> EngineStatus {
        match run_with_timeout(&self.path, &["--version".to_string()], self.version_timeout) {
            Ok(output) if output.success() => EngineStatus {
                available: true,
                version: Some(output.stdout.trim().to_string()),
            },
            Ok(output) => {
                debug!("{} --version exited with {:?}", self.path.display(), output.exit_code);
                EngineStatus::unavailable()
            }
            Err(e) => {
                debug!("{} --version failed: {}", self.path.display(), e);
                EngineStatus::unavailable()
            }
        }
    }

    fn run(&self, args: &[String], timeout: Duration) -> Result<ProcessOutput, EngineError> {
        debug!("Running {} {}", self.path.display(), args.join(" "));
        run_with_timeout(&self.path, args, timeout)
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buffer);
        }
        let _ = tx.send(String::from_utf8_lossy(&buffer).into_owned());
    });
    rx
}

/// Waits for a drained stream until `deadline`. `None` means the pipe is
/// still open.
fn collect(stream: &Receiver<String>, deadline: Instant) -> Option<String> {
    match stream.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(text) => Some(text),
        Err(RecvTimeoutError::Disconnected) => Some(String::new()),
        Err(RecvTimeoutError::Timeout) => None,
    }
}

fn wait_until(child: &mut Child, deadline: Instant) -> io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Spawns `program` with `args`, capturing stdout and stderr separately.
pub fn run_with_timeout(program: &Path, args: &[String], timeout: Duration) -> Result<ProcessOutput, EngineError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => EngineError::NotFound(program.to_path_buf()),
            _ => EngineError::Io(e),
        })?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let status = match wait_until(&mut child, deadline) {
        Ok(Some(status)) => status,
        Ok(None) => {
            warn!("Killing {} (pid {}) after {:?}", program.display(), child.id(), timeout);
            let _ = child.kill();
            let _ = child.wait();
            return Err(EngineError::TimedOut(timeout));
        }
        Err(e) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(EngineError::Io(e));
        }
    };

    match (collect(&stdout, deadline), collect(&stderr, deadline)) {
        (Some(stdout), Some(stderr)) => Ok(ProcessOutput {
            stdout,
            stderr,
            exit_code: status.code(),
        }),
        _ => {
            warn!("{} exited but its output pipes stayed open past {:?}", program.display(), timeout);
            Err(EngineError::TimedOut(timeout))
        }
    }
}
