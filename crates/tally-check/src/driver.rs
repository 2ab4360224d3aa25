//! Checker driver: signature collection, per-function walks and the verdict.

use crate::audit::LinearAudit;
use crate::diagnostic::{Diagnostic, Halt, MalformedFunction, Mode};
use crate::reach::Reachability;
use crate::signature::SignatureTable;
use crate::walker::FlowWalker;
use std::collections::BTreeMap;
use tally_ast::ast::{FnDecl, Program};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CheckerConfig {
    pub mode: Mode,
    /// Functions are independent once signatures are collected; more than
    /// one worker checks them on scoped threads. Output does not depend on
    /// this setting.
    pub workers: usize,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        CheckerConfig {
            mode: Mode::Batch,
            workers: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Verdict {
    Pass,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Safety {
    Clean,
    Violated,
}

/// Summary handed to the attestation stage.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Evidence {
    pub linear_safety: Safety,
    pub diagnostic_count: usize,
    pub malformed_count: usize,
    pub audit: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Report {
    pub verdict: Verdict,
    /// Sorted by offending site, then kind, binding and function.
    pub diagnostics: Vec<Diagnostic>,
    pub malformed: Vec<MalformedFunction>,
    pub audit: LinearAudit,
}

impl Report {
    pub fn is_pass(&self) -> bool {
        self.verdict == Verdict::Pass
    }

    pub fn evidence(&self) -> Evidence {
        Evidence {
            linear_safety: if self.is_pass() {
                Safety::Clean
            } else {
                Safety::Violated
            },
            diagnostic_count: self.diagnostics.len(),
            malformed_count: self.malformed.len(),
            audit: self.audit.to_map(),
        }
    }
}

struct FunctionOutcome {
    diagnostics: Vec<Diagnostic>,
    malformed: Option<MalformedFunction>,
    audit: LinearAudit,
}

#[derive(Debug, Clone, Default)]
pub struct Checker {
    config: CheckerConfig,
}

impl Checker {
    pub fn new(config: CheckerConfig) -> Self {
        Checker { config }
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    pub fn check(&self, program: &Program) -> Report {
        let (signatures, mut malformed) = SignatureTable::collect(program);
        log::debug!(
            "collected {} signatures ({} malformed declarations)",
            signatures.len(),
            malformed.len()
        );

        let jobs: Vec<&FnDecl> = program
            .functions
            .iter()
            .enumerate()
            .filter(|(i, f)| signatures.is_checkable(&f.name.text, *i))
            .map(|(_, f)| f)
            .collect();

        let outcomes = self.run(&jobs, &signatures);

        let mut diagnostics = Vec::new();
        let mut audit = LinearAudit::default();
        for outcome in outcomes {
            diagnostics.extend(outcome.diagnostics);
            malformed.extend(outcome.malformed);
            audit.absorb(outcome.audit);
        }
        diagnostics.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        malformed.sort_by_key(|m| m.error.at());
        audit.tally(&diagnostics, malformed.len());

        let verdict = if diagnostics.is_empty() && malformed.is_empty() {
            Verdict::Pass
        } else {
            Verdict::Fail
        };
        log::debug!(
            "verdict {:?}: {} diagnostics, {} malformed",
            verdict,
            diagnostics.len(),
            malformed.len()
        );
        Report {
            verdict,
            diagnostics,
            malformed,
            audit,
        }
    }

    /// Check every job, returning outcomes in job order.
    fn run(&self, jobs: &[&FnDecl], signatures: &SignatureTable) -> Vec<FunctionOutcome> {
        let mode = self.config.mode;
        let workers = self.config.workers.max(1).min(jobs.len().max(1));
        if workers == 1 {
            return jobs
                .iter()
                .map(|f| check_function(f, signatures, mode))
                .collect();
        }

        let chunk = jobs.len().div_ceil(workers);
        let scoped = crossbeam::thread::scope(|s| {
            let handles: Vec<_> = jobs
                .chunks(chunk)
                .map(|part| {
                    s.spawn(move |_| {
                        part.iter()
                            .map(|f| check_function(f, signatures, mode))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect::<Vec<_>>()
        });
        match scoped {
            Ok(parts) => parts.into_iter().flatten().collect(),
            Err(e) => std::panic::resume_unwind(e),
        }
    }
}

fn check_function(f: &FnDecl, signatures: &SignatureTable, mode: Mode) -> FunctionOutcome {
    let name = f.name.text.as_str();
    let reach = Reachability::analyze(&f.body);
    let mut walker = FlowWalker::new(name, signatures, &reach, mode);
    let result = walker.check_function(f);
    let (diagnostics, mut audit) = walker.finish();

    audit.functions_checked = 1;
    audit.warnings.extend(
        reach
            .dead()
            .iter()
            .map(|at| format!("'{}': unreachable code at {} is not checked", name, at)),
    );

    let malformed = match result {
        Ok(()) | Err(Halt::FailFast) => None,
        Err(Halt::Malformed(error)) => Some(MalformedFunction {
            function: name.to_string(),
            error,
        }),
    };
    log::debug!(
        "checked '{}': {} diagnostics{}",
        name,
        diagnostics.len(),
        if malformed.is_some() { ", malformed" } else { "" }
    );
    FunctionOutcome {
        diagnostics,
        malformed,
        audit,
    }
}

/// Check a program with the default configuration.
pub fn check_program(program: &Program) -> Report {
    Checker::default().check(program)
}
