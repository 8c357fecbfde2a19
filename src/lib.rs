//! # seqalign - Clustal Omega front end
//!
//! Validates sequence input and runs multiple sequence alignments with an
//! external Clustal Omega executable.
//!
//! ## Architecture
//!
//! A request flows through a small pipeline:
//! - `classify`: decides whether pasted text is FASTA, UniProt or PDB ids
//! - `fetch`: downloads FASTA records for identifiers
//! - `fasta`: parses FASTA and checks residues against the sequence type
//! - `invoke`: builds a safe command line and runs the `engine`
//! - `orchestrator`: composes the steps and builds the response
//!
//! Supporting modules:
//! - `model`: requests, validated sequences, statistics, responses
//! - `config`: directories, limits and timeouts
//! - `artifacts`: job ids and result file lookup
//! - `shell_words`: splitting of user-supplied engine options

pub mod artifacts;
pub mod classify;
pub mod config;
pub mod engine;
pub mod fasta;
pub mod fetch;
pub mod invoke;
pub mod model;
pub mod orchestrator;
pub mod shell_words;

pub use config::Config;
pub use model::{AlignResponse, AlignmentRequest};
pub use orchestrator::Orchestrator;
