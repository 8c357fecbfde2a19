//! Alignment invocation.
//!
//! Turns validated FASTA text into an engine run: checks user options,
//! writes the input artifact, builds the command line, runs the engine and
//! reads the result artifact back.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use thiserror::Error;

use crate::artifacts::{create_input_file, JobId};
use crate::engine::{AlignmentEngine, EngineError};
use crate::model::{OutputFormat, SequenceType};
use crate::shell_words::{self, SplitError};

/// Errors raised while running an alignment.
#[derive(Error, Debug)]
pub enum InvokeError {
    #[error("Extra options contain unsafe characters.")]
    UnsafeOptions,

    #[error("Invalid extra options: {0}")]
    InvalidOptions(#[from] SplitError),

    #[error("ClustalOmega error (code {}): {message}", exit_label(.code))]
    EngineFailed { code: Option<i32>, message: String },

    #[error("ClustalOmega ran but produced no output file.")]
    NoOutput,

    #[error("ClustalOmega timed out after {} seconds. Your input may be too large.", .0.as_secs())]
    TimedOut(Duration),

    #[error("ClustalOmega executable not found at '{}'. Please ensure it is installed and in PATH.", .0.display())]
    ToolNotFound(PathBuf),

    #[error("Unexpected error running ClustalOmega: {0}")]
    Io(#[from] io::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| c.to_string())
}

impl InvokeError {
    /// True for errors caused by the request rather than the engine.
    pub fn is_client_error(&self) -> bool {
        matches!(self, InvokeError::UnsafeOptions | InvokeError::InvalidOptions(_))
    }
}

/// Text and location of a finished alignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentOutput {
    pub job_id: JobId,
    pub text: String,
    pub artifact: PathBuf,
}

impl AlignmentOutput {
    /// File name of the result artifact.
    pub fn file_name(&self) -> String {
        self.artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Checks and splits user-supplied engine options.
pub fn parse_extra_options(extra: &str) -> Result<Vec<String>, InvokeError> {
    let extra = extra.trim();
    if extra.is_empty() {
        return Ok(Vec::new());
    }
    if shell_words::has_unsafe_chars(extra) {
        return Err(InvokeError::UnsafeOptions);
    }
    Ok(shell_words::split(extra)?)
}

/// Builds the engine argument list.
pub fn build_args(
    input: &Path,
    output: &Path,
    format: OutputFormat,
    seq_type: SequenceType,
    iterations: u32,
    extra: &[String],
) -> Vec<String> {
    let mut args = vec![
        "-i".to_string(),
        input.display().to_string(),
        "-o".to_string(),
        output.display().to_string(),
        "--outfmt".to_string(),
        format.key().to_string(),
        "--seqtype".to_string(),
        seq_type.engine_arg().to_string(),
        "--force".to_string(),
    ];
    if iterations > 0 {
        args.push("--iter".to_string());
        args.push(iterations.to_string());
    }
    args.extend(extra.iter().cloned());
    args
}

/// Folds multi-line engine output into a single line.
fn single_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Runs alignments through an engine, keeping artifacts in two directories.
#[derive(Clone)]
pub struct Invoker {
    engine: Arc<dyn AlignmentEngine>,
    engine_path: PathBuf,
    upload_dir: PathBuf,
    results_dir: PathBuf,
    timeout: Duration,
}

impl Invoker {
    pub fn new(
        engine: Arc<dyn AlignmentEngine>,
        engine_path: impl Into<PathBuf>,
        upload_dir: impl Into<PathBuf>,
        results_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            engine,
            engine_path: engine_path.into(),
            upload_dir: upload_dir.into(),
            results_dir: results_dir.into(),
            timeout,
        }
    }

    pub fn engine(&self) -> &Arc<dyn AlignmentEngine> {
        &self.engine
    }

    /// Aligns `fasta` and returns the result text and artifact.
    pub fn run(
        &self,
        fasta: &str,
        format: OutputFormat,
        seq_type: SequenceType,
        extra_opts: &str,
        iterations: u32,
    ) -> Result<AlignmentOutput, InvokeError> {
        // Options are checked before anything touches the disk
        let extra = parse_extra_options(extra_opts)?;

        let (job_id, input_path) = create_input_file(&self.upload_dir, fasta)?;
        let output_path = self.results_dir.join(job_id.result_file_name(format.extension()));
        let args = build_args(&input_path, &output_path, format, seq_type, iterations, &extra);

        info!("Job {}: aligning as {} into {}", job_id, seq_type.label(), format);
        let outcome = self.engine.run(&args, self.timeout);

        if let Err(e) = fs::remove_file(&input_path) {
            debug!("Could not remove {}: {}", input_path.display(), e);
        }

        let output = outcome.map_err(|e| match e {
            EngineError::NotFound(_) => InvokeError::ToolNotFound(self.engine_path.clone()),
            EngineError::TimedOut(limit) => InvokeError::TimedOut(limit),
            EngineError::Io(e) => InvokeError::Io(e),
        })?;

        if !output.success() {
            let message = match output.stderr.trim() {
                "" => single_line(&output.stdout),
                stderr => single_line(stderr),
            };
            return Err(InvokeError::EngineFailed {
                code: output.exit_code,
                message,
            });
        }

        if !output_path.is_file() {
            return Err(InvokeError::NoOutput);
        }

        let text = fs::read_to_string(&output_path)?;
        info!("Job {}: wrote {}", job_id, output_path.display());

        Ok(AlignmentOutput {
            job_id,
            text,
            artifact: output_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::engine::{EngineStatus, ProcessOutput};

    /// Scripted engine: records calls, optionally writes the `-o` file.
    struct ScriptedEngine {
        write_output: Option<&'static str>,
        result: fn() -> Result<ProcessOutput, EngineError>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedEngine {
        fn new(write_output: Option<&'static str>, result: fn() -> Result<ProcessOutput, EngineError>) -> Arc<Self> {
            Arc::new(Self {
                write_output,
                result,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    impl AlignmentEngine for ScriptedEngine {
        fn check_available(&self) -> EngineStatus {
            EngineStatus {
                available: true,
                version: Some("1.2.4".into()),
            }
        }

        fn run(&self, args: &[String], _timeout: Duration) -> Result<ProcessOutput, EngineError> {
            self.calls.lock().unwrap().push(args.to_vec());
            assert!(Path::new(&args[1]).is_file(), "input written before the run");
            if let Some(text) = self.write_output {
                fs::write(&args[3], text).unwrap();
            }
            (self.result)()
        }
    }

    fn ok() -> Result<ProcessOutput, EngineError> {
        Ok(ProcessOutput {
            exit_code: Some(0),
            ..Default::default()
        })
    }

    struct Dirs {
        uploads: tempfile::TempDir,
        results: tempfile::TempDir,
    }

    fn setup(engine: Arc<ScriptedEngine>) -> (Invoker, Dirs) {
        let dirs = Dirs {
            uploads: tempfile::tempdir().unwrap(),
            results: tempfile::tempdir().unwrap(),
        };
        let invoker = Invoker::new(
            engine,
            "/opt/clustalo",
            dirs.uploads.path(),
            dirs.results.path(),
            Duration::from_secs(120),
        );
        (invoker, dirs)
    }

    fn uploads_empty(dirs: &Dirs) -> bool {
        fs::read_dir(dirs.uploads.path()).unwrap().next().is_none()
    }

    #[test]
    fn test_successful_run() {
        let engine = ScriptedEngine::new(Some(">a\nMKV\n>b\nMK-\n"), ok);
        let (invoker, dirs) = setup(engine.clone());

        let out = invoker
            .run(">a\nMKV\n>b\nMK\n", OutputFormat::Fasta, SequenceType::Protein, "--full 'x y'", 3)
            .unwrap();

        assert_eq!(out.text, ">a\nMKV\n>b\nMK-\n");
        assert_eq!(out.file_name(), format!("result_{}.fasta", out.job_id));
        assert!(out.artifact.starts_with(dirs.results.path()));
        assert!(uploads_empty(&dirs));

        let calls = engine.calls.lock().unwrap();
        let args = &calls[0];
        assert_eq!(args[0], "-i");
        assert!(args[1].ends_with(&format!("input_{}.fasta", out.job_id)));
        assert_eq!(
            &args[4..],
            &["--outfmt", "fasta", "--seqtype", "Protein", "--force", "--iter", "3", "--full", "x y"]
        );
    }

    #[test]
    fn test_no_iteration_flag_when_zero() {
        let engine = ScriptedEngine::new(Some("CLUSTAL"), ok);
        let (invoker, _dirs) = setup(engine.clone());
        invoker
            .run(">a\nAC\n>b\nAG\n", OutputFormat::Clustal, SequenceType::Dna, "", 0)
            .unwrap();
        let calls = engine.calls.lock().unwrap();
        assert!(!calls[0].contains(&"--iter".to_string()));
        assert!(calls[0].contains(&"DNA".to_string()));
    }

    #[test]
    fn test_unsafe_options_rejected_before_spawn() {
        let engine = ScriptedEngine::new(Some("x"), ok);
        let (invoker, dirs) = setup(engine.clone());

        let err = invoker
            .run(">a\nMK\n>b\nMK\n", OutputFormat::Fasta, SequenceType::Protein, "--full; rm -rf /", 0)
            .unwrap_err();

        assert!(matches!(err, InvokeError::UnsafeOptions));
        assert!(err.is_client_error());
        assert!(engine.calls.lock().unwrap().is_empty());
        assert!(uploads_empty(&dirs));
    }

    #[test]
    fn test_malformed_options_distinct_error() {
        let engine = ScriptedEngine::new(Some("x"), ok);
        let (invoker, _dirs) = setup(engine.clone());

        let err = invoker
            .run(">a\nMK\n>b\nMK\n", OutputFormat::Fasta, SequenceType::Protein, "--log 'open", 0)
            .unwrap_err();

        assert_eq!(err.to_string(), "Invalid extra options: No closing quotation");
        assert!(err.is_client_error());
        assert!(engine.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_timeout_is_reported() {
        let engine = ScriptedEngine::new(None, || Err(EngineError::TimedOut(Duration::from_secs(120))));
        let (invoker, dirs) = setup(engine);

        let err = invoker
            .run(">a\nMK\n>b\nMK\n", OutputFormat::Fasta, SequenceType::Protein, "", 0)
            .unwrap_err();

        assert!(matches!(err, InvokeError::TimedOut(_)));
        assert!(err.to_string().contains("timed out after 120 seconds"));
        assert!(!err.is_client_error());
        assert!(uploads_empty(&dirs));
    }

    #[test]
    fn test_missing_tool_names_configured_path() {
        let engine = ScriptedEngine::new(None, || Err(EngineError::NotFound(PathBuf::from("x"))));
        let (invoker, _dirs) = setup(engine);
        let err = invoker
            .run(">a\nMK\n>b\nMK\n", OutputFormat::Fasta, SequenceType::Protein, "", 0)
            .unwrap_err();
        assert!(err.to_string().contains("'/opt/clustalo'"));
    }

    #[test]
    fn test_nonzero_exit_uses_stderr_then_stdout() {
        let engine = ScriptedEngine::new(None, || {
            Ok(ProcessOutput {
                stdout: "ignored".into(),
                stderr: "FATAL: bad input\nsecond line\n".into(),
                exit_code: Some(1),
            })
        });
        let (invoker, _dirs) = setup(engine);
        let err = invoker
            .run(">a\nMK\n>b\nMK\n", OutputFormat::Fasta, SequenceType::Protein, "", 0)
            .unwrap_err();
        assert_eq!(err.to_string(), "ClustalOmega error (code 1): FATAL: bad input; second line");

        let engine = ScriptedEngine::new(None, || {
            Ok(ProcessOutput {
                stdout: "usage: clustalo\n".into(),
                stderr: "  \n".into(),
                exit_code: Some(2),
            })
        });
        let (invoker, _dirs) = setup(engine);
        let err = invoker
            .run(">a\nMK\n>b\nMK\n", OutputFormat::Fasta, SequenceType::Protein, "", 0)
            .unwrap_err();
        assert_eq!(err.to_string(), "ClustalOmega error (code 2): usage: clustalo");
    }

    #[test]
    fn test_missing_output() {
        let engine = ScriptedEngine::new(None, ok);
        let (invoker, _dirs) = setup(engine);
        let err = invoker
            .run(">a\nMK\n>b\nMK\n", OutputFormat::Msf, SequenceType::Protein, "", 0)
            .unwrap_err();
        assert!(matches!(err, InvokeError::NoOutput));
    }
}
