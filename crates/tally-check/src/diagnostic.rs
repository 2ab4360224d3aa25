//! Violations, malformed-input errors and the per-function reporter.

use crate::env::{Binding, BindingId};
use crate::model::Qualifier;
use std::fmt;
use tally_ast::span::Span;

// ---------------------------------------------------------------------------
// Resource violations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DiagnosticKind {
    UseAfterMove,
    ResourceLeak,
    InconsistentBranchConsumption,
    LoopCarriedInconsistency,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiagnosticKind::UseAfterMove => "use-after-move",
            DiagnosticKind::ResourceLeak => "resource-leak",
            DiagnosticKind::InconsistentBranchConsumption => "inconsistent-branch-consumption",
            DiagnosticKind::LoopCarriedInconsistency => "loop-carried-inconsistency",
        };
        f.write_str(s)
    }
}

/// Where a live linear resource was lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeakSite {
    FunctionExit,
    Return,
    ScopeEnd,
    /// `break`/`continue` leaving the scope that owns the binding.
    LoopJump,
    Reassigned,
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// Function (or enclosing function of the closure) being checked.
    pub function: String,
    pub binding_name: String,
    pub declared_at: Span,
    pub offending_at: Span,
    pub message: String,
}

impl Diagnostic {
    pub(crate) fn use_after_move(function: &str, b: &Binding, used_at: Span, moved_at: Span) -> Self {
        Diagnostic {
            kind: DiagnosticKind::UseAfterMove,
            function: function.to_string(),
            binding_name: b.name.clone(),
            declared_at: b.declared_at,
            offending_at: used_at,
            message: format!(
                "{} resource '{}' is used at {} after it was consumed at {}; \
                 '{}' no longer holds a resource",
                b.qualifier,
                b.name,
                used_at,
                moved_at,
                b.name
            ),
        }
    }

    pub(crate) fn leak(function: &str, b: &Binding, at: Span, site: LeakSite) -> Self {
        let what = match site {
            LeakSite::FunctionExit => "is still unconsumed when the function exits",
            LeakSite::Return => "is still unconsumed at this return",
            LeakSite::ScopeEnd => "goes out of scope unconsumed",
            LeakSite::LoopJump => "is left unconsumed by this jump out of its scope",
            LeakSite::Reassigned => "is overwritten while still unconsumed",
            LeakSite::Discarded => "is discarded without being consumed",
        };
        Diagnostic {
            kind: DiagnosticKind::ResourceLeak,
            function: function.to_string(),
            binding_name: b.name.clone(),
            declared_at: b.declared_at,
            offending_at: at,
            message: format!(
                "linear resource '{}' (bound at {}) {}",
                b.name, b.origin, what
            ),
        }
    }

    /// A linear value produced by an expression and dropped on the spot.
    pub(crate) fn leaked_temporary(function: &str, what: &str, at: Span) -> Self {
        Diagnostic {
            kind: DiagnosticKind::ResourceLeak,
            function: function.to_string(),
            binding_name: what.to_string(),
            declared_at: at,
            offending_at: at,
            message: format!(
                "linear value produced by {} is discarded without being consumed",
                what
            ),
        }
    }

    pub(crate) fn inconsistent_branches(
        function: &str,
        b: &Binding,
        consumed_at: Span,
        branch_at: Span,
    ) -> Self {
        Diagnostic {
            kind: DiagnosticKind::InconsistentBranchConsumption,
            function: function.to_string(),
            binding_name: b.name.clone(),
            declared_at: b.declared_at,
            offending_at: branch_at,
            message: format!(
                "resource '{}' is consumed on only some branches of this conditional \
                 (consumed at {}); every branch must agree",
                b.name, consumed_at
            ),
        }
    }

    pub(crate) fn loop_carried(function: &str, b: &Binding, changed_at: Span, loop_at: Span) -> Self {
        Diagnostic {
            kind: DiagnosticKind::LoopCarriedInconsistency,
            function: function.to_string(),
            binding_name: b.name.clone(),
            declared_at: b.declared_at,
            offending_at: loop_at,
            message: format!(
                "resource '{}' changes state inside this loop (at {}); \
                 it would be consumed on some iterations but not others",
                b.name, changed_at
            ),
        }
    }

    pub(crate) fn sort_key(&self) -> (Span, DiagnosticKind, &str, &str) {
        (
            self.offending_at,
            self.kind,
            self.binding_name.as_str(),
            self.function.as_str(),
        )
    }

    /// `file:line:col: kind: message`, or byte offsets when no source
    /// text is available.
    pub fn render(&self, file: &str, index: Option<&LineIndex>) -> String {
        let at = match index {
            Some(ix) => {
                let (line, col) = ix.position(self.offending_at.start);
                format!("{}:{}:{}", file, line, col)
            }
            None => format!("{}@{}", file, self.offending_at),
        };
        format!("{}: {}: {} [in '{}']", at, self.kind, self.message, self.function)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.kind, self.offending_at, self.message)
    }
}

// ---------------------------------------------------------------------------
// Malformed input
// ---------------------------------------------------------------------------

/// The program tree broke its contract with the checker. Fatal for the
/// function it occurs in; other functions are still checked.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MalformedInput {
    UnknownBinding {
        name: String,
        at: Span,
    },
    UnknownFunction {
        name: String,
        at: Span,
    },
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
        at: Span,
    },
    UnsupportedAnnotation {
        detail: String,
        at: Span,
    },
    /// A value of a stricter qualifier flows into a weaker binding.
    QualifierMismatch {
        name: String,
        declared: Qualifier,
        found: Qualifier,
        at: Span,
    },
    OutsideLoop {
        keyword: String,
        at: Span,
    },
    EmptyMatch {
        at: Span,
    },
    DuplicateDefinition {
        name: String,
        at: Span,
        first_at: Span,
    },
}

impl MalformedInput {
    pub fn at(&self) -> Span {
        match self {
            MalformedInput::UnknownBinding { at, .. }
            | MalformedInput::UnknownFunction { at, .. }
            | MalformedInput::ArityMismatch { at, .. }
            | MalformedInput::UnsupportedAnnotation { at, .. }
            | MalformedInput::QualifierMismatch { at, .. }
            | MalformedInput::OutsideLoop { at, .. }
            | MalformedInput::EmptyMatch { at }
            | MalformedInput::DuplicateDefinition { at, .. } => *at,
        }
    }
}

impl fmt::Display for MalformedInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedInput::UnknownBinding { name, at } => {
                write!(f, "reference to undeclared binding '{}' at {}", name, at)
            }
            MalformedInput::UnknownFunction { name, at } => {
                write!(f, "call to unknown function '{}' at {}", name, at)
            }
            MalformedInput::ArityMismatch {
                name,
                expected,
                found,
                at,
            } => write!(
                f,
                "call to '{}' at {} passes {} arguments, signature declares {}",
                name, at, found, expected
            ),
            MalformedInput::UnsupportedAnnotation { detail, at } => {
                write!(f, "unsupported qualifier annotation at {}: {}", at, detail)
            }
            MalformedInput::QualifierMismatch {
                name,
                declared,
                found,
                at,
            } => write!(
                f,
                "'{}' is {} but receives a {} value at {}",
                name, declared, found, at
            ),
            MalformedInput::OutsideLoop { keyword, at } => {
                write!(f, "'{}' outside of a loop at {}", keyword, at)
            }
            MalformedInput::EmptyMatch { at } => write!(f, "match with no arms at {}", at),
            MalformedInput::DuplicateDefinition { name, at, first_at } => write!(
                f,
                "'{}' is defined again at {} (first defined at {})",
                name, at, first_at
            ),
        }
    }
}

impl std::error::Error for MalformedInput {}

/// A malformed-input error together with the function it stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MalformedFunction {
    pub function: String,
    pub error: MalformedInput,
}

impl fmt::Display for MalformedFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "in '{}': {}", self.function, self.error)
    }
}

// ---------------------------------------------------------------------------
// Source positions
// ---------------------------------------------------------------------------

/// Maps byte offsets to 1-based line and column numbers.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<u32>,
}

impl LineIndex {
    pub fn new(src: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            src.bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i as u32 + 1),
        );
        LineIndex { line_starts }
    }

    pub fn position(&self, offset: u32) -> (u32, u32) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        (line as u32 + 1, offset - self.line_starts[line] + 1)
    }
}

// ---------------------------------------------------------------------------
// Reporter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Mode {
    /// Collect every violation; heal and keep walking.
    #[default]
    Batch,
    /// Stop the function's walk at its first violation.
    FailFast,
}

/// Why a function's walk stopped early.
#[derive(Debug)]
pub(crate) enum Halt {
    FailFast,
    Malformed(MalformedInput),
}

impl From<MalformedInput> for Halt {
    fn from(e: MalformedInput) -> Self {
        Halt::Malformed(e)
    }
}

/// Collects the diagnostics of one function walk.
pub(crate) struct Reporter {
    mode: Mode,
    items: Vec<(Option<BindingId>, Diagnostic)>,
    muted: u32,
}

impl Reporter {
    pub(crate) fn new(mode: Mode) -> Self {
        Reporter {
            mode,
            items: Vec::new(),
            muted: 0,
        }
    }

    pub(crate) fn report(&mut self, id: Option<BindingId>, d: Diagnostic) -> Result<(), Halt> {
        if self.muted > 0 {
            return Ok(());
        }
        log::trace!("{}", d);
        self.items.push((id, d));
        match self.mode {
            Mode::Batch => Ok(()),
            Mode::FailFast => Err(Halt::FailFast),
        }
    }

    pub(crate) fn is_muted(&self) -> bool {
        self.muted > 0
    }

    pub(crate) fn mute(&mut self) {
        self.muted += 1;
    }

    pub(crate) fn unmute(&mut self) {
        self.muted = self.muted.saturating_sub(1);
    }

    /// Position to compare against with [`Reporter::reported_since`].
    pub(crate) fn mark(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn reported_since(&self, mark: usize, id: BindingId) -> bool {
        self.items[mark..].iter().any(|(i, _)| *i == Some(id))
    }

    pub(crate) fn finish(self) -> Vec<Diagnostic> {
        self.items.into_iter().map(|(_, d)| d).collect()
    }
}
