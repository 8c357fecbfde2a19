//! Remote sequence retrieval.
//!
//! Downloads FASTA records for UniProt accessions or PDB entries, one GET per
//! identifier. Individual failures are collected and reported as warnings as
//! long as enough sequences arrive to align.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;

use crate::fasta::MIN_SEQUENCES;

/// Default UniProt REST endpoint (`{base}/{ACCESSION}.fasta`).
pub const UNIPROT_BASE_URL: &str = "https://rest.uniprot.org/uniprotkb";
/// Default RCSB FASTA endpoint (`{base}/{ID}`).
pub const PDB_BASE_URL: &str = "https://www.rcsb.org/fasta/entry";

/// Database an identifier list refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSource {
    UniProt,
    Pdb,
}

impl IdSource {
    fn service(&self) -> &'static str {
        match self {
            IdSource::UniProt => "UniProt",
            IdSource::Pdb => "RCSB",
        }
    }
}

impl fmt::Display for IdSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdSource::UniProt => write!(f, "UniProt"),
            IdSource::Pdb => write!(f, "PDB"),
        }
    }
}

/// Status and body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

/// Failure before any HTTP status was received.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("{0}")]
    Other(String),
}

/// Minimal blocking HTTP GET capability.
pub trait HttpClient: Send + Sync {
    fn get(&self, url: &str, timeout: Duration) -> Result<HttpReply, TransportError>;
}

impl<T: HttpClient + ?Sized> HttpClient for Arc<T> {
    fn get(&self, url: &str, timeout: Duration) -> Result<HttpReply, TransportError> {
        (**self).get(url, timeout)
    }
}

/// `HttpClient` backed by `ureq`.
#[derive(Debug, Default, Clone, Copy)]
pub struct UreqClient;

impl HttpClient for UreqClient {
    fn get(&self, url: &str, timeout: Duration) -> Result<HttpReply, TransportError> {
        let response = match ureq::get(url).timeout(timeout).call() {
            Ok(response) => response,
            // Non-2xx statuses are answers, not transport failures
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(transport)) => {
                return Err(if is_timeout(&transport) {
                    TransportError::Timeout
                } else {
                    TransportError::Other(transport.to_string())
                });
            }
        };

        let status = response.status();
        let body = response.into_string().map_err(|e| match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportError::Timeout,
            _ => TransportError::Other(e.to_string()),
        })?;
        Ok(HttpReply { status, body })
    }
}

fn is_timeout(transport: &ureq::Transport) -> bool {
    let mut source = std::error::Error::source(transport);
    while let Some(err) = source {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            if matches!(io_err.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) {
                return true;
            }
        }
        source = err.source();
    }
    false
}

/// Aggregate failure of a fetch batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Failed to fetch any sequences: {}", .errors.join("; "))]
    NoneFetched { errors: Vec<String> },

    #[error("Only {fetched} sequence(s) fetched successfully. Need at least 2.{}", format_errors(.errors))]
    TooFew { fetched: usize, errors: Vec<String> },
}

fn format_errors(errors: &[String]) -> String {
    if errors.is_empty() {
        String::new()
    } else {
        format!(" Errors: {}", errors.join("; "))
    }
}

/// Combined FASTA text and the per-id failures that did not stop the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedSequences {
    pub fasta: String,
    pub fetched: usize,
    pub warnings: Vec<String>,
}

/// Outcome of a single identifier.
enum IdOutcome {
    Fetched(String),
    Failed(String),
}

/// Fetches FASTA records from UniProt or RCSB.
pub struct SequenceFetcher<C: HttpClient> {
    client: C,
    uniprot_base: String,
    pdb_base: String,
    timeout: Duration,
}

impl<C: HttpClient> SequenceFetcher<C> {
    pub fn new(client: C, uniprot_base: impl Into<String>, pdb_base: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            uniprot_base: uniprot_base.into(),
            pdb_base: pdb_base.into(),
            timeout,
        }
    }

    fn url_for(&self, id: &str, source: IdSource) -> String {
        match source {
            IdSource::UniProt => format!("{}/{}.fasta", self.uniprot_base.trim_end_matches('/'), id),
            IdSource::Pdb => format!("{}/{}", self.pdb_base.trim_end_matches('/'), id),
        }
    }

    fn fetch_one(&self, id: &str, source: IdSource) -> IdOutcome {
        let url = self.url_for(id, source);
        debug!("GET {}", url);

        match self.client.get(&url, self.timeout) {
            Ok(reply) if reply.status == 200 && reply.body.trim_start().starts_with('>') => {
                IdOutcome::Fetched(reply.body)
            }
            Ok(reply) if reply.status == 404 => {
                IdOutcome::Failed(format!("{} ID '{}' not found.", source, id))
            }
            Ok(reply) => IdOutcome::Failed(format!(
                "{} returned an unexpected result (status {}) for '{}'.",
                source.service(),
                reply.status,
                id
            )),
            Err(TransportError::Timeout) => {
                IdOutcome::Failed(format!("Timeout fetching {} ID '{}'.", source, id))
            }
            Err(TransportError::Other(message)) => {
                IdOutcome::Failed(format!("Error fetching {} ID '{}': {}", source, id, message))
            }
        }
    }

    /// Fetches every non-blank identifier, in order.
    pub fn fetch<S: AsRef<str>>(&self, ids: &[S], source: IdSource) -> Result<FetchedSequences, FetchError> {
        let acc = ids
            .iter()
            .map(|id| id.as_ref().trim())
            .filter(|id| !id.is_empty())
            .map(|id| id.to_uppercase())
            .map(|id| self.fetch_one(&id, source))
            .fold(
                FetchedSequences {
                    fasta: String::new(),
                    fetched: 0,
                    warnings: Vec::new(),
                },
                |mut acc, outcome| {
                    match outcome {
                        IdOutcome::Fetched(body) => {
                            acc.fasta.push_str(body.trim());
                            acc.fasta.push('\n');
                            acc.fetched += 1;
                        }
                        IdOutcome::Failed(message) => {
                            warn!("{}", message);
                            acc.warnings.push(message);
                        }
                    }
                    acc
                },
            );

        info!(
            "Fetched {} {} sequence(s), {} failure(s)",
            acc.fetched,
            source,
            acc.warnings.len()
        );

        match acc.fetched {
            0 if !acc.warnings.is_empty() => Err(FetchError::NoneFetched { errors: acc.warnings }),
            n if n < MIN_SEQUENCES => Err(FetchError::TooFew {
                fetched: n,
                errors: acc.warnings,
            }),
            _ => Ok(acc),
        }
    }
}
