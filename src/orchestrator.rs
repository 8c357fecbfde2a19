//! Request orchestration.
//!
//! One request flows through
//! `RECEIVED -> CLASSIFIED -> (FETCHED) -> VALIDATED -> ALIGNED -> RESPONDED`;
//! the first failing step becomes the response. Requests share nothing but
//! the artifact directories, so each one can run on its own worker thread.

use std::fs::File;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use std::thread::{self, JoinHandle};

use log::{info, warn};
use regex::Regex;
use thiserror::Error;

use crate::artifacts::{self, DownloadError};
use crate::classify::{classify, ClassifyError};
use crate::config::{allowed_extension, Config};
use crate::engine::{AlignmentEngine, ClustalOmega, EngineStatus};
use crate::fasta::{self, ValidationError};
use crate::fetch::{FetchError, HttpClient, IdSource, SequenceFetcher, UreqClient};
use crate::invoke::{InvokeError, Invoker};
use crate::model::{
    AlignResponse, AlignmentRequest, AlignmentStats, InputKind, InputMode, OutputFormat, SequenceType,
};

static ID_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s,;]+").expect("valid separator pattern"));

/// Errors that end a request.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("Unknown output format: '{0}'")]
    UnknownFormat(String),

    #[error("Unknown sequence type: '{0}'. Choose protein, dna, or rna.")]
    UnknownSeqType(String),

    #[error("No file was uploaded.")]
    NoFile,

    #[error("No file selected.")]
    NoFileName,

    #[error("File type '.{0}' not allowed. Use FASTA format (.fasta, .fa, .fas, .txt, .seq).")]
    BadExtension(String),

    #[error("Input is too large ({size} bytes). The limit is {} MiB.", .limit / (1024 * 1024))]
    TooLarge { size: usize, limit: usize },

    #[error("Input is empty. Please provide sequences or IDs.")]
    EmptyInput,

    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error("Expected UniProt or PDB IDs, but the input looks like FASTA.")]
    ExpectedIds,

    #[error("Need at least 2 {kind} IDs. Got {count}.")]
    TooFewIds { kind: InputKind, count: usize },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Sequence validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Invoke(#[from] InvokeError),
}

impl RequestError {
    /// HTTP-style status: 400 for bad input, 500 when the engine failed.
    pub fn status(&self) -> u16 {
        match self {
            RequestError::Invoke(e) if !e.is_client_error() => 500,
            _ => 400,
        }
    }
}

/// Outcome of a successful request.
#[derive(Debug, Clone)]
pub struct AlignmentResult {
    pub text: String,
    pub artifact: PathBuf,
    pub stats: AlignmentStats,
    pub warnings: Vec<String>,
    pub input_type: InputKind,
    pub out_format: OutputFormat,
    pub seq_type: SequenceType,
}

impl From<AlignmentResult> for AlignResponse {
    fn from(result: AlignmentResult) -> Self {
        let result_file = result.stats.result_file.clone();
        AlignResponse {
            success: true,
            result: Some(result.text),
            stats: Some(result.stats),
            warnings: Some(result.warnings),
            input_type: Some(result.input_type),
            out_format: Some(result.out_format),
            seq_type: Some(result.seq_type),
            result_file: Some(result_file),
            error: None,
            status: 200,
        }
    }
}

/// FASTA text ready for validation, with how it was obtained.
struct ResolvedInput {
    fasta: String,
    kind: InputKind,
    seq_type: SequenceType,
    warnings: Vec<String>,
}

/// Composes classification, fetching, validation and invocation.
pub struct Orchestrator {
    config: Config,
    fetcher: SequenceFetcher<Arc<dyn HttpClient>>,
    invoker: Invoker,
}

impl Orchestrator {
    /// Production wiring: `clustalo` subprocess and `ureq` downloads.
    pub fn new(config: Config) -> Self {
        let engine = Arc::new(ClustalOmega::new(config.engine_path.clone(), config.version_timeout));
        Self::with_backends(config, engine, Arc::new(UreqClient))
    }

    pub fn with_backends(config: Config, engine: Arc<dyn AlignmentEngine>, client: Arc<dyn HttpClient>) -> Self {
        let fetcher = SequenceFetcher::new(
            client,
            config.uniprot_base.clone(),
            config.pdb_base.clone(),
            config.fetch_timeout,
        );
        let invoker = Invoker::new(
            engine,
            config.engine_path.clone(),
            config.upload_dir.clone(),
            config.results_dir.clone(),
            config.engine_timeout,
        );
        Self {
            config,
            fetcher,
            invoker,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Reports whether the engine can be invoked, and its version.
    pub fn engine_status(&self) -> EngineStatus {
        self.invoker.engine().check_available()
    }

    /// Opens a result artifact by file name.
    pub fn download(&self, name: &str) -> Result<File, DownloadError> {
        artifacts::open_result(&self.config.results_dir, name)
    }

    /// Handles a request and builds its response.
    pub fn handle(&self, request: &AlignmentRequest) -> AlignResponse {
        match self.process(request) {
            Ok(result) => {
                info!(
                    "Aligned {} sequence(s) into {}",
                    result.stats.sequences, result.stats.result_file
                );
                result.into()
            }
            Err(e) => {
                warn!("Request failed ({}): {}", e.status(), e);
                AlignResponse::failure(e.status(), e.to_string())
            }
        }
    }

    /// Handles a request on a dedicated worker thread.
    pub fn submit(self: &Arc<Self>, request: AlignmentRequest) -> JoinHandle<AlignResponse> {
        let orchestrator = Arc::clone(self);
        thread::spawn(move || orchestrator.handle(&request))
    }

    /// Handles a batch of requests, one worker thread per request.
    /// Responses come back in request order.
    pub fn align_all(self: &Arc<Self>, requests: Vec<AlignmentRequest>) -> Vec<AlignResponse> {
        let handles: Vec<_> = requests.into_iter().map(|r| self.submit(r)).collect();
        handles
            .into_iter()
            .map(|h| {
                h.join()
                    .unwrap_or_else(|_| AlignResponse::failure(500, "Alignment worker panicked."))
            })
            .collect()
    }

    /// Runs every step of a request.
    pub fn process(&self, request: &AlignmentRequest) -> Result<AlignmentResult, RequestError> {
        let out_format: OutputFormat = request
            .out_format
            .parse()
            .map_err(|_| RequestError::UnknownFormat(request.out_format.clone()))?;
        let declared: SequenceType = request
            .seq_type
            .parse()
            .map_err(|_| RequestError::UnknownSeqType(request.seq_type.clone()))?;

        let input = match request.input_mode {
            InputMode::File => self.read_upload(request, declared)?,
            InputMode::Text | InputMode::Ids => self.resolve_text(request, declared)?,
        };

        let sequences = fasta::validate(&input.fasta, input.seq_type)?;

        let output = self.invoker.run(
            &input.fasta,
            out_format,
            input.seq_type,
            &request.extra_opts,
            request.iterations,
        )?;

        let stats = AlignmentStats::compute(&sequences, out_format, input.seq_type, output.file_name());

        Ok(AlignmentResult {
            text: output.text,
            artifact: output.artifact,
            stats,
            warnings: input.warnings,
            input_type: input.kind,
            out_format,
            seq_type: input.seq_type,
        })
    }

    fn check_size(&self, size: usize) -> Result<(), RequestError> {
        if size > self.config.max_upload_bytes {
            return Err(RequestError::TooLarge {
                size,
                limit: self.config.max_upload_bytes,
            });
        }
        Ok(())
    }

    fn read_upload(&self, request: &AlignmentRequest, seq_type: SequenceType) -> Result<ResolvedInput, RequestError> {
        let file = request.file.as_ref().ok_or(RequestError::NoFile)?;
        if file.filename.is_empty() {
            return Err(RequestError::NoFileName);
        }
        allowed_extension(&file.filename).map_err(RequestError::BadExtension)?;
        self.check_size(file.content.len())?;

        Ok(ResolvedInput {
            fasta: String::from_utf8_lossy(&file.content).into_owned(),
            kind: InputKind::Fasta,
            seq_type,
            warnings: Vec::new(),
        })
    }

    fn resolve_text(&self, request: &AlignmentRequest, declared: SequenceType) -> Result<ResolvedInput, RequestError> {
        self.check_size(request.sequences.len())?;
        let raw = request.sequences.trim();
        if raw.is_empty() {
            return Err(RequestError::EmptyInput);
        }

        let kind = classify(raw)?;
        let source = match kind {
            InputKind::Fasta if request.input_mode == InputMode::Ids => return Err(RequestError::ExpectedIds),
            InputKind::Fasta => {
                return Ok(ResolvedInput {
                    fasta: raw.to_string(),
                    kind,
                    seq_type: declared,
                    warnings: Vec::new(),
                })
            }
            InputKind::UniProt => IdSource::UniProt,
            InputKind::Pdb => IdSource::Pdb,
        };

        let mut warnings = Vec::new();
        // Database entries are always protein
        let seq_type = if declared != SequenceType::Protein {
            warnings.push(format!(
                "UniProt and PDB entries contain protein sequences. \
                 Sequence type has been overridden from '{}' to 'Protein'.",
                declared.label()
            ));
            SequenceType::Protein
        } else {
            declared
        };

        let ids: Vec<&str> = ID_SEPARATORS.split(raw).filter(|id| !id.is_empty()).collect();
        if ids.len() < fasta::MIN_SEQUENCES {
            return Err(RequestError::TooFewIds { kind, count: ids.len() });
        }

        info!("Fetching {} {} ID(s)", ids.len(), source);
        let fetched = self.fetcher.fetch(&ids, source)?;
        warnings.extend(fetched.warnings);

        Ok(ResolvedInput {
            fasta: fetched.fasta,
            kind,
            seq_type,
            warnings,
        })
    }
}
