//! Structured audit of a checking run.
//!
//! Feeds the evidence item recorded by the attestation stage, alongside the
//! verdict itself.

use crate::diagnostic::{Diagnostic, DiagnosticKind};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinearAudit {
    pub functions_checked: usize,
    /// Every binding declared, parameters and closure captures included.
    pub vars_declared: usize,
    pub linear_vars: usize,
    pub affine_vars: usize,
    /// Consumptions of linear bindings.
    pub consumed: usize,
    pub leaked: usize,
    pub double_uses: usize,
    pub inconsistencies: usize,
    pub malformed: usize,
    pub max_scope_depth: usize,
    pub warnings: Vec<String>,
}

impl LinearAudit {
    pub fn is_clean(&self) -> bool {
        self.leaked == 0 && self.double_uses == 0 && self.inconsistencies == 0 && self.malformed == 0
    }

    /// 1.0 when clean (or when nothing linear exists), decaying towards 0
    /// with every issue.
    pub fn safety_score(&self) -> f64 {
        if self.linear_vars == 0 && self.malformed == 0 {
            return 1.0;
        }
        let issues = self.leaked + self.double_uses + self.inconsistencies + self.malformed;
        1.0 / (1.0 + issues as f64)
    }

    pub(crate) fn absorb(&mut self, other: LinearAudit) {
        self.functions_checked += other.functions_checked;
        self.vars_declared += other.vars_declared;
        self.linear_vars += other.linear_vars;
        self.affine_vars += other.affine_vars;
        self.consumed += other.consumed;
        self.max_scope_depth = self.max_scope_depth.max(other.max_scope_depth);
        self.warnings.extend(other.warnings);
    }

    /// Recount the violation tallies from the final diagnostic list.
    pub(crate) fn tally(&mut self, diagnostics: &[Diagnostic], malformed: usize) {
        let count = |k: DiagnosticKind| diagnostics.iter().filter(|d| d.kind == k).count();
        self.leaked = count(DiagnosticKind::ResourceLeak);
        self.double_uses = count(DiagnosticKind::UseAfterMove);
        self.inconsistencies = count(DiagnosticKind::InconsistentBranchConsumption)
            + count(DiagnosticKind::LoopCarriedInconsistency);
        self.malformed = malformed;
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut m = BTreeMap::new();
        m.insert("functions_checked".to_string(), self.functions_checked.to_string());
        m.insert("vars_declared".to_string(), self.vars_declared.to_string());
        m.insert("linear_vars".to_string(), self.linear_vars.to_string());
        m.insert("affine_vars".to_string(), self.affine_vars.to_string());
        m.insert("consumed".to_string(), self.consumed.to_string());
        m.insert("leaked".to_string(), self.leaked.to_string());
        m.insert("double_uses".to_string(), self.double_uses.to_string());
        m.insert("inconsistencies".to_string(), self.inconsistencies.to_string());
        m.insert("malformed".to_string(), self.malformed.to_string());
        m.insert("max_scope_depth".to_string(), self.max_scope_depth.to_string());
        m.insert("is_clean".to_string(), self.is_clean().to_string());
        m.insert(
            "safety_score".to_string(),
            format!("{:.6}", self.safety_score()),
        );
        m.insert("warning_count".to_string(), self.warnings.len().to_string());
        m
    }
}
