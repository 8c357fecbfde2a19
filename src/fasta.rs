//! FASTA validation.
//!
//! This module parses FASTA text and checks every residue against the
//! alphabet of the declared sequence type before anything is handed to the
//! alignment engine.
//!
//! ## FASTA Format
//!
//! ```text
//! >sequence_identifier optional description
//! MKVLAAGIVGLLLA...
//! >another_sequence
//! MKVLSAGIVA-LLA...
//! ```
//!
//! The whole header text (after `>`, trimmed) is the identifier.

use thiserror::Error;

use crate::model::{SequenceRecord, SequenceSet, SequenceType};

/// Minimum number of sequences an alignment needs.
pub const MIN_SEQUENCES: usize = 2;

/// Maximum number of distinct invalid characters reported.
const MAX_REPORTED_CHARS: usize = 10;

/// Errors that can occur during FASTA validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Found a '>' header with no sequence ID.")]
    EmptyHeader,

    #[error("Sequence data found before any FASTA header ('>...').")]
    SequenceWithoutHeader,

    #[error("Invalid {seq_type} characters in sequence '{id}': '{chars}'. Check that the correct sequence type is selected.")]
    InvalidResidues {
        id: String,
        seq_type: &'static str,
        chars: String,
    },

    #[error("Sequence '{0}' has no residues.")]
    NoResidues(String),

    #[error("Duplicate sequence ID '{0}'.")]
    DuplicateId(String),

    #[error("At least 2 sequences are required for alignment. Found: {0}.")]
    TooFewSequences(usize),
}

/// Result type for validation.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Record being accumulated while scanning lines.
struct OpenRecord<'a> {
    id: &'a str,
    residues: String,
}

/// Validates FASTA text for the given sequence type.
///
/// # Examples
///
/// ```
/// use seqalign::fasta::validate;
/// use seqalign::model::SequenceType;
///
/// let set = validate(">a\nMKV\n>b\nMK-L\n", SequenceType::Protein).unwrap();
/// assert_eq!(set.len(), 2);
/// ```
pub fn validate(content: &str, seq_type: SequenceType) -> ValidationResult<SequenceSet> {
    let mut sequences = SequenceSet::new();
    let mut current: Option<OpenRecord<'_>> = None;

    for line in content.lines() {
        let line = line.trim();

        // Skip empty lines
        if line.is_empty() {
            continue;
        }

        if let Some(header) = line.strip_prefix('>') {
            if let Some(record) = current.take() {
                close_record(&mut sequences, record)?;
            }

            let id = header.trim();
            if id.is_empty() {
                return Err(ValidationError::EmptyHeader);
            }

            current = Some(OpenRecord {
                id,
                residues: String::new(),
            });
        } else {
            let record = current
                .as_mut()
                .ok_or(ValidationError::SequenceWithoutHeader)?;

            let cleaned: String = line.chars().filter(|c| !c.is_whitespace()).collect();
            check_residues(record.id, &cleaned, seq_type)?;
            record.residues.push_str(&cleaned);
        }
    }

    // Don't forget the last sequence
    if let Some(record) = current {
        close_record(&mut sequences, record)?;
    }

    if sequences.len() < MIN_SEQUENCES {
        return Err(ValidationError::TooFewSequences(sequences.len()));
    }

    Ok(sequences)
}

fn close_record(sequences: &mut SequenceSet, record: OpenRecord<'_>) -> ValidationResult<()> {
    if record.residues.is_empty() {
        return Err(ValidationError::NoResidues(record.id.to_string()));
    }
    if !sequences.push(SequenceRecord::new(record.id, record.residues)) {
        return Err(ValidationError::DuplicateId(record.id.to_string()));
    }
    Ok(())
}

/// Rejects a line holding characters outside the alphabet, reporting up to
/// ten distinct offenders in first-seen order.
fn check_residues(id: &str, line: &str, seq_type: SequenceType) -> ValidationResult<()> {
    let mut invalid: Vec<char> = Vec::new();
    for c in line.chars().filter(|&c| !seq_type.allows(c)) {
        if !invalid.contains(&c) {
            invalid.push(c);
        }
    }

    if invalid.is_empty() {
        return Ok(());
    }

    Err(ValidationError::InvalidResidues {
        id: id.to_string(),
        seq_type: seq_type.label(),
        chars: invalid.into_iter().take(MAX_REPORTED_CHARS).collect(),
    })
}
