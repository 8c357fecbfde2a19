//! Data model for alignment requests.
//!
//! This module contains the data structures shared by the pipeline:
//! - Validated sequences (`SequenceRecord`, `SequenceSet`)
//! - The enumerated request options (`SequenceType`, `OutputFormat`, `InputMode`)
//! - Requests, statistics and the JSON response

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A single validated sequence with its identifier and residues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceRecord {
    /// The sequence identifier (full FASTA header text, without '>')
    pub id: String,
    /// The residues, case preserved, whitespace removed
    pub residues: String,
}

impl SequenceRecord {
    /// Creates a new record.
    pub fn new(id: impl Into<String>, residues: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            residues: residues.into(),
        }
    }

    /// Returns the number of residues.
    pub fn len(&self) -> usize {
        self.residues.len()
    }

    /// Returns true if the record has no residues.
    pub fn is_empty(&self) -> bool {
        self.residues.is_empty()
    }
}

/// Ordered set of validated sequences, in input order.
///
/// Only the validator builds one, so every set holds at least two records
/// with unique identifiers.
#[derive(Debug, Clone)]
pub struct SequenceSet {
    records: Vec<SequenceRecord>,
    /// Identifier -> index into `records`
    index: HashMap<String, usize>,
}

impl SequenceSet {
    pub(crate) fn new() -> Self {
        Self {
            records: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Appends a record. Returns false, leaving the set unchanged, if its
    /// identifier is already present.
    pub(crate) fn push(&mut self, record: SequenceRecord) -> bool {
        if self.index.contains_key(&record.id) {
            return false;
        }
        self.index.insert(record.id.clone(), self.records.len());
        self.records.push(record);
        true
    }

    /// Returns true if a record with this identifier is already present.
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Returns the number of sequences.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Gets a record by index.
    pub fn get(&self, index: usize) -> Option<&SequenceRecord> {
        self.records.get(index)
    }

    /// Gets a record by identifier.
    pub fn by_id(&self, id: &str) -> Option<&SequenceRecord> {
        self.index.get(id).map(|&i| &self.records[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &SequenceRecord> + '_ {
        self.records.iter()
    }

    /// Residue length of every record, in order.
    pub fn lengths(&self) -> Vec<usize> {
        self.records.iter().map(SequenceRecord::len).collect()
    }
}

/// Declared type of the input sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequenceType {
    Protein,
    Dna,
    Rna,
}

impl SequenceType {
    pub const ALL: [SequenceType; 3] = [SequenceType::Protein, SequenceType::Dna, SequenceType::Rna];

    /// Request key (`protein`, `dna`, `rna`).
    pub fn key(&self) -> &'static str {
        match self {
            SequenceType::Protein => "protein",
            SequenceType::Dna => "dna",
            SequenceType::Rna => "rna",
        }
    }

    /// Value passed to `clustalo --seqtype`. Doubles as the display label.
    pub fn engine_arg(&self) -> &'static str {
        match self {
            SequenceType::Protein => "Protein",
            SequenceType::Dna => "DNA",
            SequenceType::Rna => "RNA",
        }
    }

    pub fn label(&self) -> &'static str {
        self.engine_arg()
    }

    /// Allowed residues (upper case; lookups are case-insensitive).
    pub fn alphabet(&self) -> &'static str {
        match self {
            SequenceType::Protein => "ACDEFGHIKLMNPQRSTVWYXBZUJ*-",
            SequenceType::Dna => "ACGTURYSWKMBDHVN-",
            SequenceType::Rna => "ACGURYSWKMBDHVN-",
        }
    }

    /// Checks whether a residue belongs to this type's alphabet.
    pub fn allows(&self, residue: char) -> bool {
        residue.is_ascii() && self.alphabet().contains(residue.to_ascii_uppercase())
    }
}

impl fmt::Display for SequenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Error for an unknown enumerated option value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownOption(pub String);

impl FromStr for SequenceType {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "protein" => Ok(SequenceType::Protein),
            "dna" => Ok(SequenceType::Dna),
            "rna" => Ok(SequenceType::Rna),
            _ => Err(UnknownOption(s.to_string())),
        }
    }
}

/// Alignment output formats supported by Clustal Omega.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Clustal,
    Fasta,
    Msf,
    Phylip,
    Selex,
    Stockholm,
    Vienna,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 7] = [
        OutputFormat::Clustal,
        OutputFormat::Fasta,
        OutputFormat::Msf,
        OutputFormat::Phylip,
        OutputFormat::Selex,
        OutputFormat::Stockholm,
        OutputFormat::Vienna,
    ];

    /// Value passed to `clustalo --outfmt`.
    pub fn key(&self) -> &'static str {
        match self {
            OutputFormat::Clustal => "clustal",
            OutputFormat::Fasta => "fasta",
            OutputFormat::Msf => "msf",
            OutputFormat::Phylip => "phylip",
            OutputFormat::Selex => "selex",
            OutputFormat::Stockholm => "stockholm",
            OutputFormat::Vienna => "vienna",
        }
    }

    /// File extension of the result artifact.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Clustal => "aln",
            OutputFormat::Fasta => "fasta",
            OutputFormat::Msf => "msf",
            OutputFormat::Phylip => "phy",
            OutputFormat::Selex => "slx",
            OutputFormat::Stockholm => "sto",
            OutputFormat::Vienna => "vienna",
        }
    }

    /// Human-readable label, e.g. `Clustal (.aln)`.
    pub fn label(&self) -> String {
        let name = match self {
            OutputFormat::Clustal => "Clustal",
            OutputFormat::Fasta => "FASTA",
            OutputFormat::Msf => "MSF",
            OutputFormat::Phylip => "PHYLIP",
            OutputFormat::Selex => "SELEX",
            OutputFormat::Stockholm => "Stockholm",
            OutputFormat::Vienna => "Vienna",
        };
        format!("{} (.{})", name, self.extension())
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for OutputFormat {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OutputFormat::ALL
            .into_iter()
            .find(|f| f.key() == s)
            .ok_or_else(|| UnknownOption(s.to_string()))
    }
}

/// How the request payload should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    /// Pasted text: FASTA or a list of identifiers, auto-detected
    #[default]
    Text,
    /// Uploaded FASTA file
    File,
    /// Pasted list of UniProt or PDB identifiers
    Ids,
}

impl FromStr for InputMode {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(InputMode::Text),
            "file" => Ok(InputMode::File),
            "ids" => Ok(InputMode::Ids),
            _ => Err(UnknownOption(s.to_string())),
        }
    }
}

/// What the classifier decided the input is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Fasta,
    #[serde(rename = "uniprot")]
    UniProt,
    Pdb,
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputKind::Fasta => write!(f, "FASTA"),
            InputKind::UniProt => write!(f, "UNIPROT"),
            InputKind::Pdb => write!(f, "PDB"),
        }
    }
}

/// An uploaded file: client-side name and raw bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadedFile {
    pub filename: String,
    pub content: Vec<u8>,
}

fn default_format() -> String {
    OutputFormat::Clustal.key().to_string()
}

fn default_seq_type() -> String {
    SequenceType::Protein.key().to_string()
}

/// One alignment request, as received.
///
/// `out_format` and `seq_type` stay raw strings until the orchestrator
/// checks them, so unknown values surface as client errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentRequest {
    #[serde(default)]
    pub input_mode: InputMode,
    #[serde(default = "default_format")]
    pub out_format: String,
    #[serde(default = "default_seq_type")]
    pub seq_type: String,
    /// Extra command-line options for the engine
    #[serde(default)]
    pub extra_opts: String,
    #[serde(default)]
    pub iterations: u32,
    /// Pasted sequences or identifiers (text and ids modes)
    #[serde(default)]
    pub sequences: String,
    /// Uploaded file (file mode)
    #[serde(skip)]
    pub file: Option<UploadedFile>,
}

impl Default for AlignmentRequest {
    fn default() -> Self {
        Self {
            input_mode: InputMode::Text,
            out_format: default_format(),
            seq_type: default_seq_type(),
            extra_opts: String::new(),
            iterations: 0,
            sequences: String::new(),
            file: None,
        }
    }
}

impl AlignmentRequest {
    /// Creates a text-mode request with default options.
    pub fn text(sequences: impl Into<String>) -> Self {
        Self {
            sequences: sequences.into(),
            ..Self::default()
        }
    }

    /// Creates a file-mode request with default options.
    pub fn upload(filename: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            input_mode: InputMode::File,
            file: Some(UploadedFile {
                filename: filename.into(),
                content: content.into(),
            }),
            ..Self::default()
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.out_format = format.into();
        self
    }

    pub fn with_seq_type(mut self, seq_type: impl Into<String>) -> Self {
        self.seq_type = seq_type.into();
        self
    }
}

/// Per-request length statistics and labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentStats {
    pub sequences: usize,
    pub min_length: usize,
    pub max_length: usize,
    pub avg_length: usize,
    /// Output format label, e.g. `Clustal (.aln)`
    pub format: String,
    /// Sequence type label, e.g. `Protein`
    pub seq_type: String,
    pub result_file: String,
}

impl AlignmentStats {
    /// Computes statistics for a validated set.
    ///
    /// The mean is rounded to the nearest integer, ties to even.
    pub fn compute(
        set: &SequenceSet,
        format: OutputFormat,
        seq_type: SequenceType,
        result_file: impl Into<String>,
    ) -> Self {
        let lengths = set.lengths();
        let count = lengths.len();
        let total: usize = lengths.iter().sum();
        Self {
            sequences: count,
            min_length: lengths.iter().copied().min().unwrap_or(0),
            max_length: lengths.iter().copied().max().unwrap_or(0),
            avg_length: rounded_mean(total, count),
            format: format.label(),
            seq_type: seq_type.label().to_string(),
            result_file: result_file.into(),
        }
    }
}

fn rounded_mean(total: usize, count: usize) -> usize {
    if count == 0 {
        return 0;
    }
    let quotient = total / count;
    let twice_rem = 2 * (total % count);
    if twice_rem > count || (twice_rem == count && quotient % 2 == 1) {
        quotient + 1
    } else {
        quotient
    }
}

/// JSON response for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<AlignmentStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_type: Option<InputKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_format: Option<OutputFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq_type: Option<SequenceType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// HTTP-style status: 200, 400 (client) or 500 (server)
    pub status: u16,
}

impl AlignResponse {
    pub fn failure(status: u16, error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            stats: None,
            warnings: None,
            input_type: None,
            out_format: None,
            seq_type: None,
            result_file: None,
            error: Some(error.into()),
            status,
        }
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_of(lengths: &[usize]) -> SequenceSet {
        let mut set = SequenceSet::new();
        for (i, &len) in lengths.iter().enumerate() {
            set.push(SequenceRecord::new(format!("s{}", i), "A".repeat(len)));
        }
        set
    }

    #[test]
    fn test_set_rejects_duplicate_ids() {
        let mut set = set_of(&[3, 5]);
        assert!(!set.push(SequenceRecord::new("s1", "MKV")));
        assert_eq!(set.len(), 2);
        assert_eq!(set.by_id("s1").unwrap().len(), 5);
        assert!(set.contains("s0"));
        assert!(!set.contains("s2"));
    }

    #[test]
    fn test_option_parsing() {
        assert_eq!("protein".parse::<SequenceType>(), Ok(SequenceType::Protein));
        assert_eq!("DNA".parse::<SequenceType>(), Ok(SequenceType::Dna));
        assert!("peptide".parse::<SequenceType>().is_err());

        assert_eq!("phylip".parse::<OutputFormat>(), Ok(OutputFormat::Phylip));
        assert!("nexus".parse::<OutputFormat>().is_err());

        assert_eq!("ids".parse::<InputMode>(), Ok(InputMode::Ids));
    }

    #[test]
    fn test_format_extensions() {
        let pairs: Vec<_> = OutputFormat::ALL.iter().map(|f| (f.key(), f.extension())).collect();
        assert_eq!(
            pairs,
            vec![
                ("clustal", "aln"),
                ("fasta", "fasta"),
                ("msf", "msf"),
                ("phylip", "phy"),
                ("selex", "slx"),
                ("stockholm", "sto"),
                ("vienna", "vienna"),
            ]
        );
        assert_eq!(OutputFormat::Stockholm.label(), "Stockholm (.sto)");
    }

    #[test]
    fn test_alphabets() {
        assert!(SequenceType::Protein.allows('w'));
        assert!(SequenceType::Protein.allows('*'));
        assert!(!SequenceType::Protein.allows('O'));
        assert!(SequenceType::Dna.allows('t'));
        assert!(SequenceType::Dna.allows('U'));
        assert!(!SequenceType::Rna.allows('T'));
        for t in SequenceType::ALL {
            assert!(t.allows('-'));
            assert!(!t.allows('1'));
            assert!(!t.allows('é'));
        }
    }

    #[test]
    fn test_stats() {
        let stats = AlignmentStats::compute(&set_of(&[3, 5, 10]), OutputFormat::Fasta, SequenceType::Dna, "result_0000abcd.fasta");
        assert_eq!(stats.sequences, 3);
        assert_eq!(stats.min_length, 3);
        assert_eq!(stats.max_length, 10);
        assert_eq!(stats.avg_length, 6);
        assert_eq!(stats.format, "FASTA (.fasta)");
        assert_eq!(stats.seq_type, "DNA");
    }

    #[test]
    fn test_rounded_mean_ties_to_even() {
        assert_eq!(rounded_mean(5, 2), 2);
        assert_eq!(rounded_mean(7, 2), 4);
        assert_eq!(rounded_mean(10, 3), 3);
        assert_eq!(rounded_mean(11, 3), 4);
        assert_eq!(rounded_mean(0, 0), 0);
    }

    #[test]
    fn test_request_defaults_from_json() {
        let req: AlignmentRequest = serde_json::from_str(r#"{"sequences": ">a\nMK\n"}"#).unwrap();
        assert_eq!(req.input_mode, InputMode::Text);
        assert_eq!(req.out_format, "clustal");
        assert_eq!(req.seq_type, "protein");
        assert_eq!(req.iterations, 0);
        assert!(req.file.is_none());
    }

    #[test]
    fn test_failure_response_json() {
        let resp = AlignResponse::failure(400, "Input is empty.");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Input is empty.");
        assert_eq!(json["status"], 400);
        assert!(json.get("stats").is_none());
        assert!(resp.is_client_error());
    }
}
