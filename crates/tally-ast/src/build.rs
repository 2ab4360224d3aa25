//! Constructors for synthetic program trees.
//!
//! Front-ends hand the checker a fully spanned tree. Hosts and tests that
//! assemble trees by hand use these helpers instead, then call [`program`]
//! (or [`layout`] directly) so that every node receives a distinct span.
//! Spans are assigned in source order and nest properly: a node's span
//! covers the spans of all of its children, and its last position plays
//! the role of a closing brace.

use crate::ast::{
    BinOp, Block, Expr, ExternDecl, FnDecl, Ident, Lit, MatchArm, Param, Pat, Program, Stmt,
    TypeExpr, UnOp,
};
use crate::span::Span;

fn sp() -> Span {
    Span::default()
}

pub fn ident(text: &str) -> Ident {
    Ident {
        text: text.to_string(),
        span: sp(),
    }
}

// ======= items =======

/// Assemble a program and lay out its spans.
pub fn program(externs: Vec<ExternDecl>, functions: Vec<FnDecl>) -> Program {
    let mut program = Program {
        externs,
        functions,
        span: sp(),
    };
    layout(&mut program);
    program
}

pub fn extern_fn(name: &str, params: Vec<Param>, ret: Option<TypeExpr>) -> ExternDecl {
    ExternDecl {
        name: ident(name),
        params,
        ret,
        span: sp(),
    }
}

pub fn func(name: &str, params: Vec<Param>, ret: Option<TypeExpr>, stmts: Vec<Stmt>) -> FnDecl {
    FnDecl {
        name: ident(name),
        params,
        ret,
        body: block(stmts),
        span: sp(),
    }
}

pub fn param(name: &str, ty: TypeExpr) -> Param {
    Param {
        name: ident(name),
        ty,
        span: sp(),
    }
}

// ======= types =======

pub fn ty(name: &str) -> TypeExpr {
    TypeExpr::Named {
        name: name.to_string(),
        args: Vec::new(),
        span: sp(),
    }
}

pub fn generic(name: &str, args: Vec<TypeExpr>) -> TypeExpr {
    TypeExpr::Named {
        name: name.to_string(),
        args,
        span: sp(),
    }
}

/// `Linear<inner>`
pub fn linear(inner: &str) -> TypeExpr {
    generic("Linear", vec![ty(inner)])
}

/// `Affine<inner>`
pub fn affine(inner: &str) -> TypeExpr {
    generic("Affine", vec![ty(inner)])
}

/// `&inner`
pub fn by_ref(inner: TypeExpr) -> TypeExpr {
    TypeExpr::Ref {
        inner: Box::new(inner),
        span: sp(),
    }
}

pub fn fn_ty(params: Vec<TypeExpr>, ret: TypeExpr) -> TypeExpr {
    TypeExpr::Fn {
        params,
        ret: Box::new(ret),
        span: sp(),
    }
}

// ======= statements =======

pub fn block(stmts: Vec<Stmt>) -> Block {
    Block { stmts, span: sp() }
}

pub fn let_(name: &str, value: Expr) -> Stmt {
    Stmt::Let {
        name: ident(name),
        ty: None,
        value,
        span: sp(),
    }
}

pub fn let_typed(name: &str, ty: TypeExpr, value: Expr) -> Stmt {
    Stmt::Let {
        name: ident(name),
        ty: Some(ty),
        value,
        span: sp(),
    }
}

pub fn assign(target: &str, value: Expr) -> Stmt {
    Stmt::Assign {
        target: ident(target),
        value,
        span: sp(),
    }
}

pub fn expr(expr: Expr) -> Stmt {
    Stmt::Expr { expr, span: sp() }
}

pub fn ret(value: Option<Expr>) -> Stmt {
    Stmt::Return { value, span: sp() }
}

pub fn if_(cond: Expr, then_stmts: Vec<Stmt>, else_stmts: Option<Vec<Stmt>>) -> Stmt {
    Stmt::If {
        cond,
        then_block: block(then_stmts),
        else_block: else_stmts.map(block),
        span: sp(),
    }
}

pub fn match_(scrutinee: Expr, arms: Vec<MatchArm>) -> Stmt {
    Stmt::Match {
        scrutinee,
        arms,
        span: sp(),
    }
}

pub fn arm(pat: Pat, stmts: Vec<Stmt>) -> MatchArm {
    MatchArm {
        pat,
        body: block(stmts),
        span: sp(),
    }
}

pub fn while_(cond: Expr, body: Vec<Stmt>) -> Stmt {
    Stmt::While {
        cond,
        body: block(body),
        span: sp(),
    }
}

pub fn loop_(body: Vec<Stmt>) -> Stmt {
    Stmt::Loop {
        body: block(body),
        span: sp(),
    }
}

pub fn break_() -> Stmt {
    Stmt::Break { span: sp() }
}

pub fn continue_() -> Stmt {
    Stmt::Continue { span: sp() }
}

pub fn nested(stmts: Vec<Stmt>) -> Stmt {
    Stmt::Block(block(stmts))
}

// ======= patterns =======

pub fn pat_wild() -> Pat {
    Pat::Wildcard(sp())
}

pub fn pat_ident(name: &str) -> Pat {
    Pat::Ident(ident(name))
}

pub fn pat_int(n: i64) -> Pat {
    Pat::Lit(Lit::Int(n), sp())
}

pub fn pat_variant(name: &str, fields: Vec<Pat>) -> Pat {
    Pat::Variant {
        name: ident(name),
        fields,
        span: sp(),
    }
}

// ======= expressions =======

pub fn var(name: &str) -> Expr {
    Expr::Var(ident(name))
}

pub fn borrow(name: &str) -> Expr {
    Expr::Borrow {
        name: ident(name),
        span: sp(),
    }
}

pub fn call(callee: &str, args: Vec<Expr>) -> Expr {
    Expr::Call {
        callee: ident(callee),
        args,
        span: sp(),
    }
}

pub fn int(n: i64) -> Expr {
    Expr::Lit(Lit::Int(n), sp())
}

pub fn bool_(b: bool) -> Expr {
    Expr::Lit(Lit::Bool(b), sp())
}

pub fn unit() -> Expr {
    Expr::Lit(Lit::Unit, sp())
}

pub fn binary(lhs: Expr, op: BinOp, rhs: Expr) -> Expr {
    Expr::Binary {
        lhs: Box::new(lhs),
        op,
        rhs: Box::new(rhs),
        span: sp(),
    }
}

pub fn not(expr: Expr) -> Expr {
    Expr::Unary {
        op: UnOp::Not,
        expr: Box::new(expr),
        span: sp(),
    }
}

pub fn closure(params: Vec<Param>, ret: Option<TypeExpr>, body: Vec<Stmt>) -> Expr {
    Expr::Closure {
        params,
        ret,
        body: block(body),
        span: sp(),
    }
}

// ======= span layout =======

/// Assign nested, source-ordered spans to every node of `program`.
pub fn layout(program: &mut Program) {
    let mut l = Layout { next: 0 };
    let start = l.open();
    for ext in &mut program.externs {
        l.extern_decl(ext);
    }
    for f in &mut program.functions {
        l.fn_decl(f);
    }
    program.span = l.close(start);
}

struct Layout {
    next: u32,
}

impl Layout {
    fn open(&mut self) -> u32 {
        let start = self.next;
        self.next += 1;
        start
    }

    fn close(&mut self, start: u32) -> Span {
        let last = self.next;
        self.next += 1;
        Span {
            start,
            end: last + 1,
        }
    }

    fn leaf(&mut self) -> Span {
        let start = self.open();
        self.close(start)
    }

    fn ident(&mut self, ident: &mut Ident) {
        ident.span = self.leaf();
    }

    fn extern_decl(&mut self, ext: &mut ExternDecl) {
        let start = self.open();
        self.ident(&mut ext.name);
        for p in &mut ext.params {
            self.param(p);
        }
        if let Some(ret) = &mut ext.ret {
            self.ty(ret);
        }
        ext.span = self.close(start);
    }

    fn fn_decl(&mut self, f: &mut FnDecl) {
        let start = self.open();
        self.ident(&mut f.name);
        for p in &mut f.params {
            self.param(p);
        }
        if let Some(ret) = &mut f.ret {
            self.ty(ret);
        }
        self.block(&mut f.body);
        f.span = self.close(start);
    }

    fn param(&mut self, p: &mut Param) {
        let start = self.open();
        self.ident(&mut p.name);
        self.ty(&mut p.ty);
        p.span = self.close(start);
    }

    fn ty(&mut self, ty: &mut TypeExpr) {
        let start = self.open();
        match ty {
            TypeExpr::Named { args, span, .. } => {
                for a in args {
                    self.ty(a);
                }
                *span = self.close(start);
            }
            TypeExpr::Ref { inner, span } => {
                self.ty(inner);
                *span = self.close(start);
            }
            TypeExpr::Fn { params, ret, span } => {
                for p in params {
                    self.ty(p);
                }
                self.ty(ret);
                *span = self.close(start);
            }
        }
    }

    fn block(&mut self, block: &mut Block) {
        let start = self.open();
        for stmt in &mut block.stmts {
            self.stmt(stmt);
        }
        block.span = self.close(start);
    }

    fn stmt(&mut self, stmt: &mut Stmt) {
        if let Stmt::Block(block) = stmt {
            self.block(block);
            return;
        }
        let start = self.open();
        let span = match stmt {
            Stmt::Let {
                name,
                ty,
                value,
                span,
            } => {
                self.ident(name);
                if let Some(ty) = ty {
                    self.ty(ty);
                }
                self.expr(value);
                span
            }
            Stmt::Assign {
                target,
                value,
                span,
            } => {
                self.ident(target);
                self.expr(value);
                span
            }
            Stmt::Expr { expr, span } => {
                self.expr(expr);
                span
            }
            Stmt::Return { value, span } => {
                if let Some(value) = value {
                    self.expr(value);
                }
                span
            }
            Stmt::If {
                cond,
                then_block,
                else_block,
                span,
            } => {
                self.expr(cond);
                self.block(then_block);
                if let Some(else_block) = else_block {
                    self.block(else_block);
                }
                span
            }
            Stmt::Match {
                scrutinee,
                arms,
                span,
            } => {
                self.expr(scrutinee);
                for arm in arms {
                    let arm_start = self.open();
                    self.pat(&mut arm.pat);
                    self.block(&mut arm.body);
                    arm.span = self.close(arm_start);
                }
                span
            }
            Stmt::While { cond, body, span } => {
                self.expr(cond);
                self.block(body);
                span
            }
            Stmt::Loop { body, span } => {
                self.block(body);
                span
            }
            Stmt::Break { span } | Stmt::Continue { span } => span,
            Stmt::Block(_) => return,
        };
        *span = self.close(start);
    }

    fn pat(&mut self, pat: &mut Pat) {
        match pat {
            Pat::Wildcard(span) | Pat::Lit(_, span) => *span = self.leaf(),
            Pat::Ident(ident) => self.ident(ident),
            Pat::Variant { name, fields, span } => {
                let start = self.open();
                self.ident(name);
                for f in fields {
                    self.pat(f);
                }
                *span = self.close(start);
            }
        }
    }

    fn expr(&mut self, expr: &mut Expr) {
        match expr {
            Expr::Lit(_, span) => *span = self.leaf(),
            Expr::Var(ident) => self.ident(ident),
            Expr::Borrow { name, span } => {
                let start = self.open();
                self.ident(name);
                *span = self.close(start);
            }
            Expr::Call { callee, args, span } => {
                let start = self.open();
                self.ident(callee);
                for a in args {
                    self.expr(a);
                }
                *span = self.close(start);
            }
            Expr::Binary { lhs, rhs, span, .. } => {
                let start = self.open();
                self.expr(lhs);
                self.expr(rhs);
                *span = self.close(start);
            }
            Expr::Unary { expr, span, .. } => {
                let start = self.open();
                self.expr(expr);
                *span = self.close(start);
            }
            Expr::Closure {
                params,
                ret,
                body,
                span,
            } => {
                let start = self.open();
                for p in params {
                    self.param(p);
                }
                if let Some(ret) = ret {
                    self.ty(ret);
                }
                self.block(body);
                *span = self.close(start);
            }
        }
    }
}
