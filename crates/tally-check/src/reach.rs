//! Reachability pre-pass.
//!
//! A forward scan over each block finds the first statement after which
//! control cannot continue (`return`, `break`, `continue`, a conditional whose
//! every arm diverges, a `loop` with no `break`). Statements past that point
//! are dead: the walker never visits them, so they cannot produce spurious
//! leak or use reports.

use std::collections::HashMap;
use tally_ast::ast::{Block, Expr, Stmt};
use tally_ast::span::Span;

pub(crate) struct Reachability {
    /// Live statement count per block, keyed by block address. The tree is
    /// borrowed for the whole check, so addresses are stable.
    live: HashMap<*const Block, usize>,
    dead: Vec<Span>,
}

impl Reachability {
    pub(crate) fn analyze(body: &Block) -> Self {
        let mut r = Reachability {
            live: HashMap::new(),
            dead: Vec::new(),
        };
        r.block(body);
        r
    }

    /// The statements of `block` that can execute.
    pub(crate) fn live_prefix<'b>(&self, block: &'b Block) -> &'b [Stmt] {
        let n = self
            .live
            .get(&(block as *const Block))
            .copied()
            .unwrap_or(block.stmts.len());
        &block.stmts[..n]
    }

    /// Spans of the first dead statement in each block that has any.
    pub(crate) fn dead(&self) -> &[Span] {
        &self.dead
    }

    fn block(&mut self, block: &Block) {
        let mut live = block.stmts.len();
        for (i, stmt) in block.stmts.iter().enumerate() {
            self.stmt(stmt);
            if diverges(stmt) {
                live = i + 1;
                break;
            }
        }
        if let Some(first_dead) = block.stmts.get(live) {
            self.dead.push(first_dead.span());
        }
        self.live.insert(block as *const Block, live);
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Let { value, .. } | Stmt::Assign { value, .. } => self.expr(value),
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
                    self.block(&arm.body);
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

    /// Closure bodies are separate scopes but share this map.
    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Lit(..) | Expr::Var(_) | Expr::Borrow { .. } => {}
            Expr::Call { args, .. } => args.iter().for_each(|a| self.expr(a)),
            Expr::Binary { lhs, rhs, .. } => {
                self.expr(lhs);
                self.expr(rhs);
            }
            Expr::Unary { expr, .. } => self.expr(expr),
            Expr::Closure { body, .. } => self.block(body),
        }
    }
}

/// Control never reaches the statement after `stmt`.
fn diverges(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Return { .. } | Stmt::Break { .. } | Stmt::Continue { .. } => true,
        Stmt::If {
            then_block,
            else_block: Some(else_block),
            ..
        } => block_diverges(then_block) && block_diverges(else_block),
        Stmt::If { .. } => false,
        Stmt::Match { arms, .. } => !arms.is_empty() && arms.iter().all(|a| block_diverges(&a.body)),
        Stmt::Loop { body, .. } => !breaks_out(body),
        Stmt::While { .. } => false,
        Stmt::Block(b) => block_diverges(b),
        Stmt::Let { .. } | Stmt::Assign { .. } | Stmt::Expr { .. } => false,
    }
}

fn block_diverges(block: &Block) -> bool {
    block.stmts.iter().any(diverges)
}

/// A `break` in `body` that targets the enclosing loop. Breaks inside nested
/// loops target those loops; closure bodies are never searched.
fn breaks_out(body: &Block) -> bool {
    body.stmts.iter().any(|stmt| match stmt {
        Stmt::Break { .. } => true,
        Stmt::If {
            then_block,
            else_block,
            ..
        } => breaks_out(then_block) || else_block.as_ref().is_some_and(breaks_out),
        Stmt::Match { arms, .. } => arms.iter().any(|a| breaks_out(&a.body)),
        Stmt::Block(b) => breaks_out(b),
        _ => false,
    })
}
