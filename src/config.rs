//! Runtime configuration.
//!
//! Built once at startup (from CLI flags and environment) and passed to the
//! orchestrator; nothing reads global state afterwards.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crate::fetch::{PDB_BASE_URL, UNIPROT_BASE_URL};

/// Maximum accepted payload size (16 MiB).
pub const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Allowed extensions for uploaded sequence files.
pub const ALLOWED_EXTENSIONS: [&str; 5] = ["fasta", "fa", "fas", "txt", "seq"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Path or name of the `clustalo` executable
    pub engine_path: PathBuf,
    /// Directory for temporary input files
    pub upload_dir: PathBuf,
    /// Directory for downloadable result files
    pub results_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub engine_timeout: Duration,
    /// Timeout for `clustalo --version`
    pub version_timeout: Duration,
    /// Timeout per remote sequence download
    pub fetch_timeout: Duration,
    pub uniprot_base: String,
    pub pdb_base: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine_path: PathBuf::from("clustalo"),
            upload_dir: PathBuf::from("uploads"),
            results_dir: PathBuf::from("results"),
            max_upload_bytes: MAX_UPLOAD_BYTES,
            engine_timeout: Duration::from_secs(120),
            version_timeout: Duration::from_secs(10),
            fetch_timeout: Duration::from_secs(15),
            uniprot_base: UNIPROT_BASE_URL.to_string(),
            pdb_base: PDB_BASE_URL.to_string(),
        }
    }
}

impl Config {
    /// Creates the artifact directories if missing.
    pub fn ensure_dirs(&self) -> io::Result<()> {
        fs::create_dir_all(&self.upload_dir)?;
        fs::create_dir_all(&self.results_dir)
    }
}

/// Returns the lower-cased extension if it is on the upload allow-list.
pub fn allowed_extension(filename: &str) -> Result<String, String> {
    let ext = match filename.rsplit_once('.') {
        Some((_, ext)) => ext.to_lowercase(),
        None => String::new(),
    };
    if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(ext)
    }
}
