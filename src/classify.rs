//! Input classification.
//!
//! Decides whether pasted text is FASTA, a list of UniProt accessions or a
//! list of PDB identifiers.
//!
//! Detection rules:
//! 1. First non-blank line starting with `>` means FASTA
//! 2. Otherwise whitespace-separated tokens are matched against the UniProt
//!    accession and PDB id patterns; UniProt wins ties
//! 3. As a last resort, tokens that all look like 6-10 alphanumeric
//!    characters are taken as UniProt accessions

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::model::InputKind;

static UNIPROT_ACCESSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:[OPQ][0-9][A-Z0-9]{3}[0-9]|[A-NR-Z][0-9](?:[A-Z][A-Z0-9]{2}[0-9]){1,2})$")
        .expect("valid UniProt pattern")
});

static PDB_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[0-9][A-Z0-9]{3}$").expect("valid PDB pattern"));

static BROAD_ACCESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[A-Z0-9]{6,10}$").expect("valid accession pattern"));

/// Errors that can occur during classification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("Input is empty.")]
    Empty,

    #[error("Unrecognized input format. Could not identify as FASTA, UniProt IDs, or PDB IDs. Got: {}", .sample.join(", "))]
    Unrecognized { sample: Vec<String> },
}

/// Returns true if the token is a UniProt accession.
pub fn is_uniprot_accession(token: &str) -> bool {
    UNIPROT_ACCESSION.is_match(token)
}

/// Returns true if the token is a PDB identifier.
pub fn is_pdb_id(token: &str) -> bool {
    PDB_ID.is_match(token)
}

/// Classifies raw input text.
pub fn classify(text: &str) -> Result<InputKind, ClassifyError> {
    let first_line = text.lines().map(str::trim).find(|l| !l.is_empty());
    match first_line {
        None => return Err(ClassifyError::Empty),
        Some(line) if line.starts_with('>') => return Ok(InputKind::Fasta),
        Some(_) => {}
    }

    let tokens: Vec<&str> = text.split_whitespace().collect();

    let uniprot = tokens.iter().filter(|t| is_uniprot_accession(t)).count();
    let pdb = tokens.iter().filter(|t| is_pdb_id(t)).count();

    if uniprot > 0 && uniprot >= pdb {
        Ok(InputKind::UniProt)
    } else if pdb > 0 {
        Ok(InputKind::Pdb)
    } else if tokens.iter().all(|t| BROAD_ACCESSION.is_match(t)) {
        // Accessions with unusual shapes
        Ok(InputKind::UniProt)
    } else {
        Err(ClassifyError::Unrecognized {
            sample: tokens.iter().take(3).map(|t| t.to_string()).collect(),
        })
    }
}
