//! seqalign - Clustal Omega front end
//!
//! Validates FASTA input (or fetches sequences for UniProt/PDB ids) and runs
//! Clustal Omega on it.
//!
//! ## Usage
//!
//! ```bash
//! seqalign align -i seqs.fasta -f stockholm      # pasted text, auto-detected
//! seqalign align -m file -i upload.fa -t dna     # uploaded FASTA file
//! echo "P69905 P68871" | seqalign align -i -     # UniProt accessions
//! seqalign batch requests.json                   # several jobs in parallel
//! seqalign status                                # is clustalo available?
//! seqalign download result_1a2b3c4d.aln -o out.aln
//! ```
//!
//! Responses are printed as JSON. Exit status: 0 on success, 2 for invalid
//! input, 1 when the engine or the runtime failed.

// Use jemalloc for better memory management (returns memory to OS)
#[cfg(not(windows))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;

use seqalign::model::{
    AlignResponse, AlignmentRequest, InputMode, OutputFormat, SequenceType, UploadedFile,
};
use seqalign::{Config, Orchestrator};

/// How the input file should be interpreted
#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Pasted text: FASTA or identifiers, auto-detected
    Text,
    /// Uploaded FASTA file (extension checked)
    File,
    /// UniProt or PDB identifiers only
    Ids,
}

impl From<ModeArg> for InputMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Text => InputMode::Text,
            ModeArg::File => InputMode::File,
            ModeArg::Ids => InputMode::Ids,
        }
    }
}

/// seqalign - validate sequences and align them with Clustal Omega
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the clustalo executable
    #[arg(long = "clustalo", env = "CLUSTALO_PATH", default_value = "clustalo", global = true)]
    clustalo: PathBuf,

    /// Directory for temporary input files
    #[arg(long, env = "SEQALIGN_UPLOAD_DIR", default_value = "uploads", global = true)]
    upload_dir: PathBuf,

    /// Directory for downloadable results
    #[arg(long, env = "SEQALIGN_RESULTS_DIR", default_value = "results", global = true)]
    results_dir: PathBuf,

    /// Engine timeout in seconds
    #[arg(long, default_value = "120", global = true)]
    timeout: u64,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one alignment request
    Align {
        /// Input file ("-" for stdin)
        #[arg(short = 'i', long = "input", default_value = "-")]
        input: String,

        /// Input mode
        #[arg(short = 'm', long = "mode", value_enum, default_value = "text")]
        mode: ModeArg,

        /// Output format (clustal, fasta, msf, phylip, selex, stockholm, vienna)
        #[arg(short = 'f', long = "format", default_value = "clustal")]
        format: String,

        /// Sequence type (protein, dna, rna)
        #[arg(short = 't', long = "seq-type", default_value = "protein")]
        seq_type: String,

        /// Extra clustalo options, shell-quoted
        #[arg(short = 'x', long = "extra-opts", default_value = "", allow_hyphen_values = true)]
        extra_opts: String,

        /// Number of combined guide-tree/HMM iterations
        #[arg(long = "iterations", default_value = "0")]
        iterations: u32,
    },

    /// Run a JSON array of requests, one worker thread per request
    Batch {
        /// JSON file with the requests
        requests: PathBuf,
    },

    /// Report whether clustalo is available and its version
    Status,

    /// Copy a result file to a path or stdout
    Download {
        /// Result file name (result_XXXXXXXX.ext)
        filename: String,

        /// Destination ("-" for stdout)
        #[arg(short = 'o', long = "output", default_value = "-")]
        output: String,
    },

    /// List output formats and sequence types
    Formats,
}

/// One entry of a batch file: a request plus an optional file to upload.
#[derive(Debug, Deserialize)]
struct BatchEntry {
    #[serde(flatten)]
    request: AlignmentRequest,
    #[serde(default)]
    upload: Option<PathBuf>,
}

fn read_upload(path: &Path) -> Result<UploadedFile> {
    let content = fs::read(path).with_context(|| format!("Could not read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(UploadedFile { filename, content })
}

fn read_text(input: &str) -> Result<String> {
    if input == "-" {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text)?;
        Ok(text)
    } else {
        fs::read_to_string(input).with_context(|| format!("Could not read {}", input))
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    serde_json::to_writer_pretty(&mut handle, value)?;
    writeln!(handle)?;
    Ok(())
}

fn exit_code(response: &AlignResponse) -> ExitCode {
    if response.success {
        ExitCode::SUCCESS
    } else if response.is_client_error() {
        ExitCode::from(2)
    } else {
        ExitCode::FAILURE
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config {
        engine_path: cli.clustalo,
        upload_dir: cli.upload_dir,
        results_dir: cli.results_dir,
        engine_timeout: Duration::from_secs(cli.timeout),
        ..Config::default()
    };

    match cli.command {
        Commands::Align {
            input,
            mode,
            format,
            seq_type,
            extra_opts,
            iterations,
        } => {
            config.ensure_dirs().context("Could not create artifact directories")?;
            let mut request = AlignmentRequest {
                input_mode: mode.into(),
                out_format: format,
                seq_type,
                extra_opts,
                iterations,
                ..AlignmentRequest::default()
            };
            match request.input_mode {
                InputMode::File => request.file = Some(read_upload(Path::new(&input))?),
                InputMode::Text | InputMode::Ids => request.sequences = read_text(&input)?,
            }

            let orchestrator = Arc::new(Orchestrator::new(config));
            let response = orchestrator
                .submit(request)
                .join()
                .unwrap_or_else(|_| AlignResponse::failure(500, "Alignment worker panicked."));
            print_json(&response)?;
            Ok(exit_code(&response))
        }

        Commands::Batch { requests } => {
            config.ensure_dirs().context("Could not create artifact directories")?;
            let text = fs::read_to_string(&requests)
                .with_context(|| format!("Could not read {}", requests.display()))?;
            let entries: Vec<BatchEntry> =
                serde_json::from_str(&text).context("Batch file must be a JSON array of requests")?;

            let mut batch = Vec::with_capacity(entries.len());
            for entry in entries {
                let mut request = entry.request;
                if let Some(path) = entry.upload {
                    request.file = Some(read_upload(&path)?);
                }
                batch.push(request);
            }

            let orchestrator = Arc::new(Orchestrator::new(config));
            let responses = orchestrator.align_all(batch);
            print_json(&responses)?;
            Ok(if responses.iter().all(|r| r.success) {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Commands::Status => {
            let orchestrator = Orchestrator::new(config);
            let status = orchestrator.engine_status();
            print_json(&status)?;
            Ok(if status.available {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Commands::Download { filename, output } => {
            let orchestrator = Orchestrator::new(config);
            let mut file = match orchestrator.download(&filename) {
                Ok(file) => file,
                Err(e) => {
                    eprintln!("{}", e);
                    return Ok(if e.status() < 500 {
                        ExitCode::from(2)
                    } else {
                        ExitCode::FAILURE
                    });
                }
            };
            if output == "-" {
                io::copy(&mut file, &mut io::stdout().lock())?;
            } else {
                let mut dest = fs::File::create(&output)
                    .with_context(|| format!("Could not create {}", output))?;
                io::copy(&mut file, &mut dest)?;
                eprintln!("Wrote {} to {}", filename, output);
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Formats => {
            println!("Output formats:");
            for format in OutputFormat::ALL {
                println!("  {:<10} {}", format.key(), format.label());
            }
            println!("Sequence types:");
            for seq_type in SequenceType::ALL {
                println!("  {:<10} {}", seq_type.key(), seq_type.label());
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
