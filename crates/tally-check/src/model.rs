//! Resource model: ownership qualifiers and which uses consume.
//!
//! Qualifiers come from explicit annotations only. `Linear<T>` and
//! `Affine<T>` wrap the annotated type; everything else (including `&T`)
//! is `Shared`. Classification is total: a malformed annotation still
//! classifies, and [`validate_annotation`] reports the shape problem
//! separately.

use std::fmt;
use tally_ast::ast::TypeExpr;
use tally_ast::span::Span;

/// Ownership qualifier. Variant order is strictness order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Qualifier {
    /// Copy and reuse freely. Never tracked for consumption.
    #[default]
    Shared,
    /// Consumed at most once; dropping without use is allowed.
    Affine,
    /// Consumed exactly once on every path.
    Linear,
}

impl Qualifier {
    fn from_wrapper(name: &str) -> Option<Qualifier> {
        match name {
            "Linear" => Some(Qualifier::Linear),
            "Affine" => Some(Qualifier::Affine),
            "Shared" => Some(Qualifier::Shared),
            _ => None,
        }
    }

    /// Whether bindings with this qualifier have a consumption state.
    pub fn is_tracked(self) -> bool {
        self != Qualifier::Shared
    }

    /// Whether reaching an exit with the value unconsumed is a leak.
    pub fn must_consume(self) -> bool {
        self == Qualifier::Linear
    }

    pub fn strictest(self, other: Qualifier) -> Qualifier {
        self.max(other)
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Qualifier::Shared => write!(f, "Shared"),
            Qualifier::Affine => write!(f, "Affine"),
            Qualifier::Linear => write!(f, "Linear"),
        }
    }
}

/// How an operation touches a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseMode {
    /// Ownership transfers; the binding becomes consumed.
    Move,
    /// Read-only access; state is unchanged.
    Borrow,
}

/// Classify a binding or parameter type by its outermost annotation.
pub fn classify(ty: &TypeExpr) -> Qualifier {
    match ty {
        TypeExpr::Named { name, .. } => Qualifier::from_wrapper(name).unwrap_or_default(),
        TypeExpr::Ref { .. } | TypeExpr::Fn { .. } => Qualifier::Shared,
    }
}

/// A call consumes an argument iff the callee's parameter is tracked.
/// `Shared` and by-reference parameters only borrow.
pub fn is_consuming(param: Qualifier) -> bool {
    param.is_tracked()
}

/// Mode for a bare binding passed to a parameter of the given qualifier.
pub fn argument_mode(param: Qualifier) -> UseMode {
    if is_consuming(param) {
        UseMode::Move
    } else {
        UseMode::Borrow
    }
}

/// Parameter and return qualifiers of something callable.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CallShape {
    pub params: Vec<Qualifier>,
    pub ret: Qualifier,
}

impl CallShape {
    pub fn from_types<'t>(params: impl IntoIterator<Item = &'t TypeExpr>, ret: Option<&TypeExpr>) -> Self {
        CallShape {
            params: params.into_iter().map(classify).collect(),
            ret: ret.map(classify).unwrap_or_default(),
        }
    }

    /// Shape of a `fn(..) -> ..` type, if it is one.
    pub fn of_fn_type(ty: &TypeExpr) -> Option<Self> {
        match ty {
            TypeExpr::Fn { params, ret, .. } => Some(CallShape::from_types(params, Some(ret))),
            _ => None,
        }
    }
}

/// Why an annotation does not fit the qualifier grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeError {
    pub detail: String,
    pub span: Span,
}

/// Check that qualifier wrappers appear only where the model understands
/// them: outermost on a binding or parameter type (optionally under one
/// `&`, or as a component of a function type), with exactly one argument.
pub fn validate_annotation(ty: &TypeExpr) -> Result<(), ShapeError> {
    match ty {
        TypeExpr::Named { name, args, span } => {
            if Qualifier::from_wrapper(name).is_some() {
                if args.len() != 1 {
                    return Err(ShapeError {
                        detail: format!(
                            "`{}` takes exactly one type argument, found {}",
                            name,
                            args.len()
                        ),
                        span: *span,
                    });
                }
            }
            for arg in args {
                reject_nested(arg)?;
            }
            Ok(())
        }
        TypeExpr::Ref { inner, .. } => validate_annotation(inner),
        TypeExpr::Fn { params, ret, .. } => {
            for p in params {
                validate_annotation(p)?;
            }
            validate_annotation(ret)
        }
    }
}

fn reject_nested(ty: &TypeExpr) -> Result<(), ShapeError> {
    match ty {
        TypeExpr::Named { name, args, span } => {
            if Qualifier::from_wrapper(name).is_some() {
                return Err(ShapeError {
                    detail: format!("`{}` cannot appear inside another type", name),
                    span: *span,
                });
            }
            args.iter().try_for_each(reject_nested)
        }
        TypeExpr::Ref { inner, .. } => reject_nested(inner),
        // a function type nested in a container describes its own parameters
        TypeExpr::Fn { .. } => validate_annotation(ty),
    }
}
