//! End-to-end tests: request in, JSON response out, with a shell script
//! standing in for clustalo.

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use seqalign::engine::{run_with_timeout, AlignmentEngine, EngineError, EngineStatus, ProcessOutput};
use seqalign::fetch::{HttpClient, HttpReply, TransportError};
use seqalign::model::{AlignmentRequest, InputKind};
use seqalign::{Config, Orchestrator};

const FAKE_CLUSTALO: &str = r#"
if [ "$1" = "--version" ]; then echo "1.2.4"; exit 0; fi
out=""
while [ $# -gt 0 ]; do
    case "$1" in
        -o) out="$2"; shift ;;
        --fail) echo "FATAL: requested failure" >&2; exit 7 ;;
        --hang) sleep 30 ;;
    esac
    shift
done
printf 'CLUSTAL O(1.2.4) multiple sequence alignment\n\nseq1      MKV\nseq2      MKL\n' > "$out"
"#;

/// Runs the fake clustalo script through `/bin/sh`.
struct ScriptEngine {
    script: PathBuf,
}

impl ScriptEngine {
    fn args(&self, args: &[String]) -> Vec<String> {
        let mut all = vec![self.script.display().to_string()];
        all.extend(args.iter().cloned());
        all
    }
}

impl AlignmentEngine for ScriptEngine {
    fn check_available(&self) -> EngineStatus {
        match run_with_timeout(Path::new("/bin/sh"), &self.args(&["--version".into()]), Duration::from_secs(10)) {
            Ok(out) if out.success() => EngineStatus {
                available: true,
                version: Some(out.stdout.trim().to_string()),
            },
            _ => EngineStatus::unavailable(),
        }
    }

    fn run(&self, args: &[String], timeout: Duration) -> Result<ProcessOutput, EngineError> {
        run_with_timeout(Path::new("/bin/sh"), &self.args(args), timeout)
    }
}

/// Answers every request with a short protein record, except ids containing "404".
struct FakeUniProt;

impl HttpClient for FakeUniProt {
    fn get(&self, url: &str, _timeout: Duration) -> Result<HttpReply, TransportError> {
        let id = url.rsplit('/').next().unwrap_or_default().trim_end_matches(".fasta");
        if id.contains("404") {
            return Ok(HttpReply {
                status: 404,
                body: "Not found".into(),
            });
        }
        Ok(HttpReply {
            status: 200,
            body: format!(">sp|{}|TEST\nMKVLAAGIV\n", id),
        })
    }
}

struct Setup {
    orchestrator: Orchestrator,
    root: tempfile::TempDir,
}

fn setup(engine_timeout: Duration) -> Setup {
    let root = tempfile::tempdir().unwrap();
    let script = root.path().join("clustalo.sh");
    std::fs::write(&script, FAKE_CLUSTALO).unwrap();

    let config = Config {
        upload_dir: root.path().join("uploads"),
        results_dir: root.path().join("results"),
        engine_timeout,
        ..Config::default()
    };
    config.ensure_dirs().unwrap();

    let orchestrator = Orchestrator::with_backends(config, Arc::new(ScriptEngine { script }), Arc::new(FakeUniProt));
    Setup { orchestrator, root }
}

#[test]
fn test_fasta_text_request() {
    let s = setup(Duration::from_secs(30));
    let request = AlignmentRequest::text(">seq1\nMKV\n>seq2\nMKL\n")
        .with_format("fasta")
        .with_seq_type("protein");

    let response = s.orchestrator.handle(&request);

    assert!(response.success, "{:?}", response.error);
    let stats = response.stats.as_ref().unwrap();
    assert_eq!(stats.sequences, 2);
    assert_eq!(stats.min_length, 3);
    assert_eq!(stats.max_length, 3);
    assert_eq!(stats.avg_length, 3);
    assert_eq!(stats.format, "FASTA (.fasta)");
    assert!(response.result.as_deref().unwrap().starts_with("CLUSTAL O(1.2.4)"));

    // The response serializes with the documented fields
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["input_type"], "fasta");
    assert_eq!(json["out_format"], "fasta");
    assert_eq!(json["seq_type"], "protein");
    assert_eq!(json["stats"]["sequences"], 2);

    // Only the result artifact is left behind
    let uploads = std::fs::read_dir(s.root.path().join("uploads")).unwrap().count();
    assert_eq!(uploads, 0);
    let file = response.result_file.unwrap();
    assert!(s.root.path().join("results").join(&file).is_file());
}

#[test]
fn test_uniprot_request_with_partial_failure() {
    let s = setup(Duration::from_secs(30));
    let request = AlignmentRequest::text("P12345\nQ9Y6K9\nP40404");

    let response = s.orchestrator.handle(&request);

    assert!(response.success, "{:?}", response.error);
    assert_eq!(response.input_type, Some(InputKind::UniProt));
    assert_eq!(response.stats.unwrap().sequences, 2);
    let warnings = response.warnings.unwrap();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("not found"));
}

#[test]
fn test_engine_failure_reports_exit_code() {
    let s = setup(Duration::from_secs(30));
    let request = AlignmentRequest {
        extra_opts: "--fail".into(),
        ..AlignmentRequest::text(">a\nMK\n>b\nMK\n")
    };

    let response = s.orchestrator.handle(&request);

    assert!(!response.success);
    assert_eq!(response.status, 500);
    assert_eq!(
        response.error.as_deref(),
        Some("ClustalOmega error (code 7): FATAL: requested failure")
    );
}

#[test]
fn test_engine_timeout() {
    let s = setup(Duration::from_millis(300));
    let request = AlignmentRequest {
        extra_opts: "--hang".into(),
        ..AlignmentRequest::text(">a\nMK\n>b\nMK\n")
    };

    let response = s.orchestrator.handle(&request);

    assert_eq!(response.status, 500);
    assert!(response.error.unwrap().contains("timed out"));
}

#[test]
fn test_engine_status() {
    let s = setup(Duration::from_secs(30));
    let status = s.orchestrator.engine_status();
    assert!(status.available);
    assert_eq!(status.version.as_deref(), Some("1.2.4"));
}

#[test]
fn test_download_rejects_foreign_names() {
    let s = setup(Duration::from_secs(30));
    assert_eq!(s.orchestrator.download("../clustalo.sh").unwrap_err().status(), 403);
    assert_eq!(s.orchestrator.download("result_abcdef01.aln").unwrap_err().status(), 404);
}
