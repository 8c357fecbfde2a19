//! Job identifiers and result artifact lookup.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use rand::Rng;
use regex::Regex;
use thiserror::Error;

static RESULT_FILE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^result_[a-f0-9]{8}\.\w+$").expect("valid result file pattern"));

/// Attempts before giving up on finding an unused job id.
const MAX_ID_ATTEMPTS: usize = 16;

/// Eight lowercase hex characters naming one alignment job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(String);

impl JobId {
    /// Draws a fresh id from the thread-local CSPRNG.
    pub fn random() -> Self {
        JobId(format!("{:08x}", rand::rng().random::<u32>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn input_file_name(&self) -> String {
        format!("input_{}.fasta", self.0)
    }

    pub fn result_file_name(&self, extension: &str) -> String {
        format!("result_{}.{}", self.0, extension)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Writes `content` to a new `input_<id>.fasta` in `dir`, drawing ids until
/// one is unused.
pub fn create_input_file(dir: &Path, content: &str) -> io::Result<(JobId, PathBuf)> {
    for _ in 0..MAX_ID_ATTEMPTS {
        let id = JobId::random();
        let path = dir.join(id.input_file_name());
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => {
                fill(file, &path, content.as_bytes())?;
                return Ok((id, path));
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        "could not allocate an unused job id",
    ))
}

/// Writes `content` to a freshly created file, removing it if the write fails.
fn fill<W: Write>(mut file: W, path: &Path, content: &[u8]) -> io::Result<()> {
    if let Err(e) = file.write_all(content).and_then(|_| file.flush()) {
        drop(file);
        let _ = fs::remove_file(path);
        return Err(e);
    }
    Ok(())
}

/// Errors returned by artifact lookup.
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Access denied: '{0}' is not a result file name.")]
    Forbidden(String),

    #[error("Result file '{0}' not found.")]
    NotFound(String),

    #[error("Failed to open result file: {0}")]
    Io(#[from] io::Error),
}

impl DownloadError {
    /// HTTP-style status code.
    pub fn status(&self) -> u16 {
        match self {
            DownloadError::Forbidden(_) => 403,
            DownloadError::NotFound(_) => 404,
            DownloadError::Io(_) => 500,
        }
    }
}

/// Returns true if `name` has the shape of a generated result file name.
pub fn is_result_file_name(name: &str) -> bool {
    RESULT_FILE_NAME.is_match(name)
}

/// Resolves a result file name to its path in `results_dir`.
pub fn resolve_result(results_dir: &Path, name: &str) -> Result<PathBuf, DownloadError> {
    if !is_result_file_name(name) {
        return Err(DownloadError::Forbidden(name.to_string()));
    }
    let path = results_dir.join(name);
    if !path.is_file() {
        return Err(DownloadError::NotFound(name.to_string()));
    }
    Ok(path)
}

/// Opens a result artifact for download.
pub fn open_result(results_dir: &Path, name: &str) -> Result<File, DownloadError> {
    let path = resolve_result(results_dir, name)?;
    Ok(File::open(path)?)
}
