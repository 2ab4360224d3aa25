#![deny(unused_must_use)]
#![warn(clippy::dbg_macro, clippy::todo, clippy::unimplemented)]
#![forbid(unsafe_code)]

//! Library half of the `tally` command: loading program trees and rendering
//! check reports.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::Path;
use tally_ast::ast::Program;
use tally_check::{Evidence, LineIndex, Report, Signature, SignatureTable};

/// Maximum input file size in bytes (16MB)
pub const MAX_INPUT_SIZE: u64 = 16 * 1024 * 1024;

/// A program tree read from disk, with the digest of the exact bytes read.
#[derive(Debug)]
pub struct Loaded {
    pub program: Program,
    pub sha256: String,
}

pub fn load_program(path: &Path) -> Result<Loaded> {
    let size = std::fs::metadata(path)
        .with_context(|| format!("failed to read '{}'", path.display()))?
        .len();
    if size > MAX_INPUT_SIZE {
        bail!(
            "input file exceeds {}MB limit ({} bytes)",
            MAX_INPUT_SIZE / (1024 * 1024),
            size
        );
    }

    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read '{}'", path.display()))?;
    let program: Program = serde_json::from_slice(&bytes)
        .with_context(|| format!("'{}' is not a valid program tree", path.display()))?;
    log::debug!(
        "loaded '{}': {} externs, {} functions",
        path.display(),
        program.externs.len(),
        program.functions.len()
    );
    Ok(Loaded {
        program,
        sha256: sha256_hex(&bytes),
    })
}

/// SHA-256 hex digest, prefixed with "sha256:".
pub fn sha256_hex(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("sha256:{:x}", hasher.finalize())
}

/// One line per diagnostic and malformed function, in report order.
pub fn render_pretty(file: &str, report: &Report, index: Option<&LineIndex>) -> Vec<String> {
    let mut lines: Vec<String> = report
        .diagnostics
        .iter()
        .map(|d| d.render(file, index))
        .collect();
    lines.extend(report.malformed.iter().map(|m| {
        let at = m.error.at();
        let at = match index {
            Some(ix) => {
                let (line, col) = ix.position(at.start);
                format!("{}:{}:{}", file, line, col)
            }
            None => format!("{}@{}", file, at),
        };
        format!("{}: malformed input: {}", at, m)
    }));
    lines
}

pub fn summary(report: &Report) -> String {
    if report.is_pass() {
        format!(
            "linear safety: clean ({} functions checked)",
            report.audit.functions_checked
        )
    } else {
        format!(
            "linear safety: violated ({} diagnostics, {} malformed, {} functions checked)",
            report.diagnostics.len(),
            report.malformed.len(),
            report.audit.functions_checked
        )
    }
}

#[derive(Serialize)]
struct InputInfo<'a> {
    path: &'a str,
    sha256: &'a str,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    input: InputInfo<'a>,
    #[serde(flatten)]
    report: &'a Report,
    evidence: Evidence,
}

pub fn json_report(path: &str, loaded: &Loaded, report: &Report) -> Result<String> {
    let doc = JsonReport {
        input: InputInfo {
            path,
            sha256: &loaded.sha256,
        },
        report,
        evidence: report.evidence(),
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}

/// `name(Linear, Shared) -> Affine`
pub fn format_signature(sig: &Signature) -> String {
    let params: Vec<String> = sig.shape.params.iter().map(|q| q.to_string()).collect();
    format!("{}({}) -> {}", sig.name, params.join(", "), sig.shape.ret)
}

pub fn signatures_json(table: &SignatureTable) -> Result<String> {
    let sigs: Vec<&Signature> = table.iter().collect();
    Ok(serde_json::to_string_pretty(&sigs)?)
}
