//! Free-name analysis for closure bodies.

use std::collections::HashSet;
use tally_ast::ast::{Block, Expr, Ident, Param, Pat, Stmt};

/// Names a closure refers to without declaring them, in order of first
/// occurrence. The caller decides which of them are outer bindings and which
/// are global functions.
pub(crate) fn free_names(params: &[Param], body: &Block) -> Vec<Ident> {
    let mut c = Captures::default();
    c.push_scope();
    for p in params {
        c.bind(&p.name.text);
    }
    c.block(body);
    c.found
}

#[derive(Default)]
struct Captures {
    scopes: Vec<HashSet<String>>,
    seen: HashSet<String>,
    found: Vec<Ident>,
}

impl Captures {
    fn push_scope(&mut self) {
        self.scopes.push(HashSet::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn bind(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string());
        }
    }

    fn mention(&mut self, ident: &Ident) {
        if self.scopes.iter().any(|s| s.contains(&ident.text)) {
            return;
        }
        if self.seen.insert(ident.text.clone()) {
            self.found.push(ident.clone());
        }
    }

    fn block(&mut self, block: &Block) {
        self.push_scope();
        for stmt in &block.stmts {
            self.stmt(stmt);
        }
        self.pop_scope();
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Let { name, value, .. } => {
                self.expr(value);
                self.bind(&name.text);
            }
            Stmt::Assign { target, value, .. } => {
                self.expr(value);
                self.mention(target);
            }
            Stmt::Expr { expr, .. } => self.expr(expr),
            Stmt::Return { value, .. } => {
                if let Some(v) = value {
                    self.expr(v);
                }
            }
            Stmt::If {
                cond,
                then_block,
                else_block,
                ..
            } => {
                self.expr(cond);
                self.block(then_block);
                if let Some(b) = else_block {
                    self.block(b);
                }
            }
            Stmt::Match {
                scrutinee, arms, ..
            } => {
                self.expr(scrutinee);
                for arm in arms {
                    self.push_scope();
                    self.pat(&arm.pat);
                    self.block(&arm.body);
                    self.pop_scope();
                }
            }
            Stmt::While { cond, body, .. } => {
                self.expr(cond);
                self.block(body);
            }
            Stmt::Loop { body, .. } => self.block(body),
            Stmt::Block(b) => self.block(b),
            Stmt::Break { .. } | Stmt::Continue { .. } => {}
        }
    }

    fn pat(&mut self, pat: &Pat) {
        match pat {
            Pat::Wildcard(_) | Pat::Lit(..) => {}
            Pat::Ident(ident) => self.bind(&ident.text),
            Pat::Variant { fields, .. } => fields.iter().for_each(|f| self.pat(f)),
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Lit(..) => {}
            Expr::Var(ident) | Expr::Borrow { name: ident, .. } => self.mention(ident),
            Expr::Call { callee, args, .. } => {
                self.mention(callee);
                args.iter().for_each(|a| self.expr(a));
            }
            Expr::Binary { lhs, rhs, .. } => {
                self.expr(lhs);
                self.expr(rhs);
            }
            Expr::Unary { expr, .. } => self.expr(expr),
            Expr::Closure { params, body, .. } => {
                self.push_scope();
                for p in params {
                    self.bind(&p.name.text);
                }
                self.block(body);
                self.pop_scope();
            }
        }
    }
}
