#![deny(unused_must_use)]
#![warn(clippy::dbg_macro, clippy::todo, clippy::unimplemented)]
#![forbid(unsafe_code)]

//! Static linear/affine resource checker.
//!
//! Every function body of a [`Program`](tally_ast::ast::Program) is walked
//! once along its control flow. `Linear` bindings must be consumed exactly
//! once on every path, `Affine` bindings at most once; everything else is
//! `Shared` and never tracked.

pub mod audit;
mod capture;
pub mod diagnostic;
mod driver;
pub mod env;
pub mod lattice;
pub mod model;
mod reach;
pub mod signature;
mod walker;

pub use audit::LinearAudit;
pub use diagnostic::{
    Diagnostic, DiagnosticKind, LeakSite, LineIndex, MalformedFunction, MalformedInput, Mode,
};
pub use driver::{check_program, Checker, CheckerConfig, Evidence, Report, Safety, Verdict};
pub use env::{Binding, BindingId, Env};
pub use lattice::{join, BindingState, Join};
pub use model::{argument_mode, classify, is_consuming, validate_annotation, CallShape, Qualifier, UseMode};
pub use signature::{Signature, SignatureTable};
