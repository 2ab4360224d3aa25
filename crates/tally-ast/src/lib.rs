#![forbid(unsafe_code)]
#![deny(unused_must_use)]
#![warn(clippy::dbg_macro, clippy::todo, clippy::unimplemented)]

pub mod build;

pub mod span {
    use serde::{Deserialize, Serialize};
    use std::fmt;

    /// Byte range into the original source, end exclusive.
    #[derive(
        Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    )]
    pub struct Span {
        pub start: u32,
        pub end: u32,
    }

    impl Span {
        pub fn new(start: u32, end: u32) -> Self {
            Span { start, end }
        }

        /// The last position covered by this span (a block's closing brace).
        pub fn closing(self) -> Span {
            Span {
                start: self.end.saturating_sub(1).max(self.start),
                end: self.end,
            }
        }

        pub fn contains(self, other: Span) -> bool {
            self.start <= other.start && other.end <= self.end
        }
    }

    impl fmt::Display for Span {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}..{}", self.start, self.end)
        }
    }
}

pub mod ast {
    use super::span::Span;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Program {
        /// Signature-only host operations (`alloc`, `free`, ...).
        #[serde(default)]
        pub externs: Vec<ExternDecl>,
        pub functions: Vec<FnDecl>,
        pub span: Span,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ExternDecl {
        pub name: Ident,
        pub params: Vec<Param>,
        pub ret: Option<TypeExpr>,
        pub span: Span,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct FnDecl {
        pub name: Ident,
        pub params: Vec<Param>,
        pub ret: Option<TypeExpr>,
        pub body: Block,
        pub span: Span,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Param {
        pub name: Ident,
        pub ty: TypeExpr,
        pub span: Span,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Ident {
        pub text: String,
        pub span: Span,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum TypeExpr {
        /// `Int`, `Buffer`, `Linear<Buffer>`, `Map<K, V>`
        Named {
            name: String,
            #[serde(default)]
            args: Vec<TypeExpr>,
            span: Span,
        },
        /// `&T`
        Ref { inner: Box<TypeExpr>, span: Span },
        /// `fn(A, B) -> R`
        Fn {
            params: Vec<TypeExpr>,
            ret: Box<TypeExpr>,
            span: Span,
        },
    }

    impl TypeExpr {
        pub fn span(&self) -> Span {
            match self {
                TypeExpr::Named { span, .. }
                | TypeExpr::Ref { span, .. }
                | TypeExpr::Fn { span, .. } => *span,
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Block {
        pub stmts: Vec<Stmt>,
        pub span: Span,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum Stmt {
        Let {
            name: Ident,
            ty: Option<TypeExpr>,
            value: Expr,
            span: Span,
        },
        Assign {
            target: Ident,
            value: Expr,
            span: Span,
        },
        Expr {
            expr: Expr,
            span: Span,
        },
        Return {
            value: Option<Expr>,
            span: Span,
        },
        If {
            cond: Expr,
            then_block: Block,
            else_block: Option<Block>,
            span: Span,
        },
        Match {
            scrutinee: Expr,
            arms: Vec<MatchArm>,
            span: Span,
        },
        While {
            cond: Expr,
            body: Block,
            span: Span,
        },
        Loop {
            body: Block,
            span: Span,
        },
        Break {
            span: Span,
        },
        Continue {
            span: Span,
        },
        Block(Block),
    }

    impl Stmt {
        pub fn span(&self) -> Span {
            match self {
                Stmt::Let { span, .. }
                | Stmt::Assign { span, .. }
                | Stmt::Expr { span, .. }
                | Stmt::Return { span, .. }
                | Stmt::If { span, .. }
                | Stmt::Match { span, .. }
                | Stmt::While { span, .. }
                | Stmt::Loop { span, .. }
                | Stmt::Break { span }
                | Stmt::Continue { span } => *span,
                Stmt::Block(block) => block.span,
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MatchArm {
        pub pat: Pat,
        pub body: Block,
        pub span: Span,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum Pat {
        Wildcard(Span),
        Lit(Lit, Span),
        Ident(Ident),
        Variant {
            name: Ident,
            fields: Vec<Pat>,
            span: Span,
        },
    }

    impl Pat {
        pub fn span(&self) -> Span {
            match self {
                Pat::Wildcard(span) | Pat::Lit(_, span) => *span,
                Pat::Ident(ident) => ident.span,
                Pat::Variant { span, .. } => *span,
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum Expr {
        Lit(Lit, Span),
        /// Use of a binding by value.
        Var(Ident),
        /// `&name`: read-only access, never a transfer.
        Borrow {
            name: Ident,
            span: Span,
        },
        Call {
            callee: Ident,
            args: Vec<Expr>,
            span: Span,
        },
        Binary {
            lhs: Box<Expr>,
            op: BinOp,
            rhs: Box<Expr>,
            span: Span,
        },
        Unary {
            op: UnOp,
            expr: Box<Expr>,
            span: Span,
        },
        Closure {
            params: Vec<Param>,
            ret: Option<TypeExpr>,
            body: Block,
            span: Span,
        },
    }

    impl Expr {
        pub fn span(&self) -> Span {
            match self {
                Expr::Lit(_, span) => *span,
                Expr::Var(ident) => ident.span,
                Expr::Borrow { span, .. }
                | Expr::Call { span, .. }
                | Expr::Binary { span, .. }
                | Expr::Unary { span, .. }
                | Expr::Closure { span, .. } => *span,
            }
        }
    }

    #[derive(Debug, Clone, Copy, Serialize, Deserialize)]
    pub enum UnOp {
        Not,
        Neg,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum Lit {
        Int(i64),
        Float(f64),
        Str(String),
        Bool(bool),
        Unit,
    }

    #[derive(Debug, Clone, Copy, Serialize, Deserialize)]
    pub enum BinOp {
        // logical
        Or,
        And,
        // equality
        Eq,
        Ne,
        // relational
        Lt,
        Le,
        Gt,
        Ge,
        // arithmetic
        Add,
        Sub,
        Mul,
        Div,
    }
}
