//! Global function-signature table.
//!
//! Built once from the whole program before any body is walked, then only
//! read. Call sites consult the callee's declared parameter qualifiers, never
//! its body, so mutual recursion needs no special handling.

use crate::diagnostic::{MalformedFunction, MalformedInput};
use crate::model::{validate_annotation, CallShape};
use std::collections::{BTreeMap, BTreeSet};
use tally_ast::ast::{Param, Program, TypeExpr};
use tally_ast::span::Span;

/// Which declaration a signature came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Origin {
    Extern(usize),
    Function(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Signature {
    pub name: String,
    pub shape: CallShape,
    pub span: Span,
    pub origin: Origin,
}

#[derive(Debug, Clone, Default)]
pub struct SignatureTable {
    entries: BTreeMap<String, Signature>,
    /// Functions whose own annotations are malformed.
    rejected: BTreeSet<String>,
}

impl SignatureTable {
    /// Collect every extern and function signature. Returns the table and the
    /// malformed declarations found on the way (duplicates, bad annotations).
    pub fn collect(program: &Program) -> (SignatureTable, Vec<MalformedFunction>) {
        let mut table = SignatureTable::default();
        let mut malformed = Vec::new();

        let externs = program.externs.iter().enumerate().map(|(i, e)| {
            (Origin::Extern(i), &e.name, &e.params, e.ret.as_ref(), e.span)
        });
        let functions = program.functions.iter().enumerate().map(|(i, f)| {
            (Origin::Function(i), &f.name, &f.params, f.ret.as_ref(), f.span)
        });

        for (origin, name, params, ret, span) in externs.chain(functions) {
            if let Some(first) = table.entries.get(&name.text) {
                malformed.push(MalformedFunction {
                    function: name.text.clone(),
                    error: MalformedInput::DuplicateDefinition {
                        name: name.text.clone(),
                        at: name.span,
                        first_at: first.span,
                    },
                });
                continue;
            }

            if let Err(e) = validate_signature(params, ret) {
                table.rejected.insert(name.text.clone());
                malformed.push(MalformedFunction {
                    function: name.text.clone(),
                    error: e,
                });
            }

            table.entries.insert(
                name.text.clone(),
                Signature {
                    name: name.text.clone(),
                    shape: CallShape::from_types(params.iter().map(|p| &p.ty), ret),
                    span,
                    origin,
                },
            );
        }

        (table, malformed)
    }

    pub fn get(&self, name: &str) -> Option<&Signature> {
        self.entries.get(name)
    }

    /// Whether the body of `functions[index]` should be walked: it owns its
    /// name and its signature is well formed.
    pub fn is_checkable(&self, name: &str, index: usize) -> bool {
        !self.rejected.contains(name)
            && self
                .entries
                .get(name)
                .is_some_and(|s| s.origin == Origin::Function(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Signature> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn validate_signature(params: &[Param], ret: Option<&TypeExpr>) -> Result<(), MalformedInput> {
    for ty in params.iter().map(|p| &p.ty).chain(ret) {
        validate_annotation(ty).map_err(|e| MalformedInput::UnsupportedAnnotation {
            detail: e.detail,
            at: e.span,
        })?;
    }
    Ok(())
}
