//! Flow walker: threads binding environments through one function body.
//!
//! Every statement takes the environment by value and hands back a [`Flow`]:
//! the environment that falls through to the next statement (if any) plus
//! the environments leaving sideways through `return`, `break` and
//! `continue`. Branches walk each arm from a clone of the incoming
//! environment and join the results; loops iterate to a fixed point in at
//! most two passes.

use crate::audit::LinearAudit;
use crate::capture;
use crate::diagnostic::{Diagnostic, Halt, LeakSite, MalformedInput, Mode, Reporter};
use crate::env::{Binding, BindingId, Conflict, Env};
use crate::lattice::BindingState;
use crate::model::{argument_mode, classify, validate_annotation, CallShape, Qualifier, UseMode};
use crate::reach::Reachability;
use crate::signature::SignatureTable;
use tally_ast::ast::{Block, Expr, FnDecl, Ident, MatchArm, Param, Pat, Stmt, TypeExpr};
use tally_ast::span::Span;

type Walk<T> = Result<T, Halt>;

/// A path that left the function through `return`.
struct Exit {
    env: Env,
    at: Span,
    /// False once a later statement of the enclosing block was reached,
    /// i.e. this was an early return rather than the arm's final one.
    terminal: bool,
}

#[derive(Default)]
struct Flow {
    /// `None` once the path has diverged.
    env: Option<Env>,
    exits: Vec<Exit>,
    breaks: Vec<Env>,
    continues: Vec<Env>,
}

impl Flow {
    fn falls(env: Env) -> Self {
        Flow {
            env: Some(env),
            ..Flow::default()
        }
    }

    /// Take over `other`'s sideways exits; return its fall-through env.
    fn absorb(&mut self, other: Flow) -> Option<Env> {
        self.exits.extend(other.exits);
        self.breaks.extend(other.breaks);
        self.continues.extend(other.continues);
        other.env
    }
}

#[derive(Default)]
struct LoopPass {
    /// Condition-false exit plus every `break`.
    exit_envs: Vec<Env>,
    /// Body fall-through plus every `continue`.
    back_edges: Vec<Env>,
    exits: Vec<Exit>,
}

/// A binding introduced at the top of a scope: parameters, closure
/// captures, pattern bindings.
struct Seed {
    name: String,
    at: Span,
    qualifier: Qualifier,
    callable: Option<CallShape>,
}

impl Seed {
    fn param(p: &Param) -> Self {
        Seed {
            name: p.name.text.clone(),
            at: p.name.span,
            qualifier: classify(&p.ty),
            callable: CallShape::of_fn_type(&p.ty),
        }
    }

    fn shared(ident: &Ident) -> Self {
        Seed {
            name: ident.text.clone(),
            at: ident.span,
            qualifier: Qualifier::Shared,
            callable: None,
        }
    }
}

pub(crate) struct FlowWalker<'a> {
    function: &'a str,
    signatures: &'a SignatureTable,
    reach: &'a Reachability,
    reporter: Reporter,
    audit: LinearAudit,
    next_id: u32,
    depth: u32,
    /// Depth of each enclosing loop statement, innermost last.
    loops: Vec<u32>,
    /// Declared return qualifier of the innermost function or closure.
    returns: Qualifier,
}

impl<'a> FlowWalker<'a> {
    pub(crate) fn new(
        function: &'a str,
        signatures: &'a SignatureTable,
        reach: &'a Reachability,
        mode: Mode,
    ) -> Self {
        FlowWalker {
            function,
            signatures,
            reach,
            reporter: Reporter::new(mode),
            audit: LinearAudit::default(),
            next_id: 0,
            depth: 0,
            loops: Vec::new(),
            returns: Qualifier::Shared,
        }
    }

    pub(crate) fn check_function(&mut self, f: &FnDecl) -> Walk<()> {
        let seeds = f.params.iter().map(Seed::param).collect();
        let returns = f.ret.as_ref().map(classify).unwrap_or_default();
        self.check_scope(seeds, returns, &f.body)
    }

    pub(crate) fn finish(self) -> (Vec<Diagnostic>, LinearAudit) {
        (self.reporter.finish(), self.audit)
    }

    // -----------------------------------------------------------------------
    // Scopes and bindings
    // -----------------------------------------------------------------------

    /// Walk a function-like body (a function or a closure) in a fresh scope
    /// seeded with its parameters, then check every way out of it.
    fn check_scope(&mut self, seeds: Vec<Seed>, returns: Qualifier, body: &Block) -> Walk<()> {
        self.depth += 1;
        let mut env = Env::default();
        for seed in seeds {
            env = self.declare(env, seed);
        }

        let outer = std::mem::replace(&mut self.returns, returns);
        let flow = self.walk_block(env, body, Vec::new(), LeakSite::FunctionExit);
        self.returns = outer;
        let flow = flow?;
        if let Some(env) = flow.env {
            self.check_exit(&env, body.span.closing(), LeakSite::FunctionExit)?;
        }
        for exit in flow.exits {
            self.check_exit(&exit.env, exit.at, LeakSite::Return)?;
        }
        self.depth -= 1;
        Ok(())
    }

    fn declare(&mut self, env: Env, seed: Seed) -> Env {
        self.next_id += 1;
        let id = BindingId(self.next_id);
        if !self.reporter.is_muted() {
            self.audit.vars_declared += 1;
            match seed.qualifier {
                Qualifier::Linear => self.audit.linear_vars += 1,
                Qualifier::Affine => self.audit.affine_vars += 1,
                Qualifier::Shared => {}
            }
        }
        env.declare(
            id,
            Binding {
                name: seed.name,
                qualifier: seed.qualifier,
                declared_at: seed.at,
                origin: seed.at,
                state: BindingState::Unconsumed,
                depth: self.depth,
                callable: seed.callable,
            },
        )
    }

    /// Remove bindings declared at `depth` or deeper; live linear ones leak.
    fn leave_scope(&mut self, env: Env, depth: u32, at: Span, site: LeakSite) -> Walk<Env> {
        let (env, removed) = env.leave_scope(depth);
        for (id, b) in removed {
            if b.is_live_linear() {
                self.reporter
                    .report(Some(id), Diagnostic::leak(self.function, &b, at, site))?;
            }
        }
        Ok(env)
    }

    fn check_exit(&mut self, env: &Env, at: Span, site: LeakSite) -> Walk<()> {
        for (id, b) in env.iter() {
            if b.is_live_linear() {
                self.reporter
                    .report(Some(id), Diagnostic::leak(self.function, b, at, site))?;
            }
        }
        Ok(())
    }

    fn validate(&self, ty: &TypeExpr) -> Walk<()> {
        validate_annotation(ty).map_err(|e| {
            Halt::Malformed(MalformedInput::UnsupportedAnnotation {
                detail: e.detail,
                at: e.span,
            })
        })
    }

    // -----------------------------------------------------------------------
    // Blocks and statements
    // -----------------------------------------------------------------------

    fn walk_block(
        &mut self,
        env: Env,
        block: &Block,
        seeds: Vec<Seed>,
        site: LeakSite,
    ) -> Walk<Flow> {
        self.depth += 1;
        let depth = self.depth;
        if !self.reporter.is_muted() {
            self.audit.max_scope_depth = self.audit.max_scope_depth.max(depth as usize);
        }

        let mut env = env;
        for seed in seeds {
            env = self.declare(env, seed);
        }

        let mut flow = Flow::default();
        let mut current = Some(env);
        for stmt in self.reach.live_prefix(block) {
            let Some(env) = current.take() else { break };
            let mut step = self.walk_stmt(env, stmt)?;
            if step.env.is_some() {
                for exit in &mut step.exits {
                    exit.terminal = false;
                }
            }
            current = flow.absorb(step);
        }
        self.depth -= 1;

        if let Some(env) = current {
            flow.env = Some(self.leave_scope(env, depth, block.span.closing(), site)?);
        }
        Ok(flow)
    }

    fn walk_stmt(&mut self, env: Env, stmt: &Stmt) -> Walk<Flow> {
        match stmt {
            Stmt::Let {
                name,
                ty,
                value,
                span,
            } => {
                let found = self.value_qualifier(&env, value);
                let qualifier = match ty {
                    Some(ty) => {
                        self.validate(ty)?;
                        let declared = classify(ty);
                        if found > declared {
                            return Err(MalformedInput::QualifierMismatch {
                                name: name.text.clone(),
                                declared,
                                found,
                                at: *span,
                            }
                            .into());
                        }
                        declared
                    }
                    None => found,
                };
                let callable = self.callable_of(&env, ty.as_ref(), value);
                let env = self.walk_expr(env, value, UseMode::Move)?;

                if name.text == "_" {
                    self.discard(&env, value, qualifier)?;
                    return Ok(Flow::falls(env));
                }
                let seed = Seed {
                    name: name.text.clone(),
                    at: name.span,
                    qualifier,
                    callable,
                };
                Ok(Flow::falls(self.declare(env, seed)))
            }

            Stmt::Assign {
                target,
                value,
                span,
            } => {
                let Some((id, declared)) = env.lookup(&target.text).map(|(id, b)| (id, b.qualifier))
                else {
                    return Err(MalformedInput::UnknownBinding {
                        name: target.text.clone(),
                        at: target.span,
                    }
                    .into());
                };
                let found = self.value_qualifier(&env, value);
                if found > declared {
                    return Err(MalformedInput::QualifierMismatch {
                        name: target.text.clone(),
                        declared,
                        found,
                        at: *span,
                    }
                    .into());
                }

                // The value may itself consume the target (`buf = wrap(buf)`).
                let env = self.walk_expr(env, value, UseMode::Move)?;
                if let Some(b) = env.get(id).filter(|b| b.is_live_linear()) {
                    self.reporter.report(
                        Some(id),
                        Diagnostic::leak(self.function, b, *span, LeakSite::Reassigned),
                    )?;
                }
                Ok(Flow::falls(env.reassign(id, *span)))
            }

            Stmt::Expr { expr, .. } => Ok(Flow::falls(self.walk_operand(env, expr)?)),

            Stmt::Return { value, span } => {
                let env = match value {
                    Some(v) => {
                        let found = self.value_qualifier(&env, v);
                        if found > self.returns {
                            return Err(MalformedInput::QualifierMismatch {
                                name: format!("return value of {}", self.function),
                                declared: self.returns,
                                found,
                                at: *span,
                            }
                            .into());
                        }
                        self.walk_expr(env, v, UseMode::Move)?
                    }
                    None => env,
                };
                Ok(Flow {
                    exits: vec![Exit {
                        env,
                        at: *span,
                        terminal: true,
                    }],
                    ..Flow::default()
                })
            }

            Stmt::If {
                cond,
                then_block,
                else_block,
                span,
            } => {
                let env = self.walk_operand(env, cond)?;
                let then_flow =
                    self.walk_block(env.clone(), then_block, Vec::new(), LeakSite::ScopeEnd)?;
                let else_flow = match else_block {
                    Some(b) => self.walk_block(env, b, Vec::new(), LeakSite::ScopeEnd)?,
                    None => Flow::falls(env),
                };
                self.join_arms(vec![then_flow, else_flow], *span)
            }

            Stmt::Match {
                scrutinee,
                arms,
                span,
            } => self.walk_match(env, scrutinee, arms, *span),

            Stmt::While { cond, body, span } => self.walk_loop(env, Some(cond), body, *span),

            Stmt::Loop { body, span } => self.walk_loop(env, None, body, *span),

            Stmt::Break { span } => self.jump(env, "break", *span),

            Stmt::Continue { span } => self.jump(env, "continue", *span),

            Stmt::Block(block) => self.walk_block(env, block, Vec::new(), LeakSite::ScopeEnd),
        }
    }

    /// Evaluate an expression whose value is read and then dropped: an
    /// expression statement, an operand, a condition or an argument to a
    /// borrowing parameter.
    fn walk_operand(&mut self, env: Env, expr: &Expr) -> Walk<Env> {
        let found = self.value_qualifier(&env, expr);
        let env = self.walk_expr(env, expr, UseMode::Move)?;
        self.discard(&env, expr, found)?;
        Ok(env)
    }

    /// A value computed for effect only. Dropping a linear value leaks it.
    fn discard(&mut self, env: &Env, value: &Expr, qualifier: Qualifier) -> Walk<()> {
        if !qualifier.must_consume() {
            return Ok(());
        }
        match value {
            Expr::Var(ident) => {
                // only when this very use consumed it; a prior consumption
                // was already reported as a use after move
                if let Some((id, b)) = env.lookup(&ident.text) {
                    if b.state.consumed_at() == Some(ident.span) {
                        self.reporter.report(
                            Some(id),
                            Diagnostic::leak(self.function, b, ident.span, LeakSite::Discarded),
                        )?;
                    }
                }
                Ok(())
            }
            other => self.reporter.report(
                None,
                Diagnostic::leaked_temporary(self.function, &describe(other), other.span()),
            ),
        }
    }

    fn jump(&mut self, env: Env, keyword: &str, at: Span) -> Walk<Flow> {
        let Some(&loop_depth) = self.loops.last() else {
            return Err(MalformedInput::OutsideLoop {
                keyword: keyword.to_string(),
                at,
            }
            .into());
        };
        let env = self.leave_scope(env, loop_depth + 1, at, LeakSite::LoopJump)?;
        let mut flow = Flow::default();
        if keyword == "break" {
            flow.breaks.push(env);
        } else {
            flow.continues.push(env);
        }
        Ok(flow)
    }

    // -----------------------------------------------------------------------
    // Branches
    // -----------------------------------------------------------------------

    fn walk_match(
        &mut self,
        env: Env,
        scrutinee: &Expr,
        arms: &[MatchArm],
        at: Span,
    ) -> Walk<Flow> {
        if arms.is_empty() {
            return Err(MalformedInput::EmptyMatch { at }.into());
        }

        // Matching on a tracked binding inspects it; matching on any other
        // expression takes ownership of the value it produces.
        let (env, scrut_q) = match scrutinee {
            Expr::Var(ident) if env.lookup(&ident.text).is_some_and(|(_, b)| b.is_tracked()) => {
                (self.use_name(env, ident, UseMode::Borrow)?, Qualifier::Shared)
            }
            _ => {
                let q = self.value_qualifier(&env, scrutinee);
                (self.walk_expr(env, scrutinee, UseMode::Move)?, q)
            }
        };

        let mut flows = Vec::with_capacity(arms.len());
        for arm in arms {
            let mut seeds = Vec::new();
            match &arm.pat {
                Pat::Ident(ident) => seeds.push(Seed {
                    name: ident.text.clone(),
                    at: ident.span,
                    qualifier: scrut_q,
                    callable: None,
                }),
                other => {
                    if scrut_q.must_consume() {
                        self.reporter.report(
                            None,
                            Diagnostic::leaked_temporary(
                                self.function,
                                &describe(scrutinee),
                                other.span(),
                            ),
                        )?;
                    }
                    pattern_idents(other, &mut |ident| seeds.push(Seed::shared(ident)));
                }
            }
            flows.push(self.walk_block(env.clone(), &arm.body, seeds, LeakSite::ScopeEnd)?);
        }
        self.join_arms(flows, at)
    }

    /// Join sibling arms. Arms that fall through are joined; diverging arms
    /// keep their own exits. When every arm returns, the final returns of
    /// the arms must agree with each other; early returns are left to the
    /// exit check.
    fn join_arms(&mut self, mut flows: Vec<Flow>, at: Span) -> Walk<Flow> {
        let falling: Vec<Env> = flows.iter_mut().filter_map(|f| f.env.take()).collect();
        let mut out = Flow::default();

        if falling.is_empty() {
            let conflicts = {
                let exits: Vec<&Env> = flows
                    .iter()
                    .flat_map(|f| f.exits.iter().filter(|e| e.terminal).map(|e| &e.env))
                    .collect();
                Env::conflicts(&exits)
            };
            self.report_branch_conflicts(&conflicts, at)?;
            for exit in flows
                .iter_mut()
                .flat_map(|f| f.exits.iter_mut())
                .filter(|e| e.terminal)
            {
                exit.env = std::mem::take(&mut exit.env).heal(&conflicts);
            }
        } else {
            let (env, conflicts) = Env::join(&falling);
            log::trace!(
                "{}: joined {} arms at {} ({} conflicts)",
                self.function,
                falling.len(),
                at,
                conflicts.len()
            );
            self.report_branch_conflicts(&conflicts, at)?;
            out.env = Some(env);
        }

        for f in flows {
            out.absorb(f);
        }
        Ok(out)
    }

    fn report_branch_conflicts(&mut self, conflicts: &[Conflict], at: Span) -> Walk<()> {
        for c in conflicts {
            self.reporter.report(
                Some(c.id),
                Diagnostic::inconsistent_branches(self.function, &c.binding, c.consumed_at, at),
            )?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Loops
    // -----------------------------------------------------------------------

    /// Pass 1 walks the body from the loop entry and reports directly. If the
    /// state at the loop head drifts, each drifting binding is reported once
    /// and healed to `Consumed`; pass 2 then runs muted from the healed head
    /// to settle the exit environments.
    fn walk_loop(&mut self, entry: Env, cond: Option<&Expr>, body: &Block, at: Span) -> Walk<Flow> {
        let mark = self.reporter.mark();
        let first = self.loop_pass(entry.clone(), cond, body)?;
        let drift = entry.drift(&first.back_edges);

        let (settled, pass) = if drift.is_empty() {
            log::trace!("{}: loop at {} stable after one pass", self.function, at);
            (Vec::new(), first)
        } else {
            for (id, b, changed_at) in &drift {
                if !self.reporter.reported_since(mark, *id) {
                    self.reporter.report(
                        Some(*id),
                        Diagnostic::loop_carried(self.function, b, *changed_at, at),
                    )?;
                }
            }
            let healed: Vec<Conflict> = drift
                .iter()
                .map(|(id, b, changed_at)| Conflict {
                    id: *id,
                    binding: b.clone(),
                    consumed_at: b.state.consumed_at().unwrap_or(*changed_at),
                })
                .collect();
            let head = entry.heal(&healed);

            self.reporter.mute();
            let second = self.loop_pass(head.clone(), cond, body);
            self.reporter.unmute();
            let second = second?;

            let mut settled: Vec<BindingId> = drift.iter().map(|(id, ..)| *id).collect();
            for (id, b, changed_at) in head.drift(&second.back_edges) {
                if settled.contains(&id) {
                    continue;
                }
                self.reporter
                    .report(Some(id), Diagnostic::loop_carried(self.function, &b, changed_at, at))?;
                settled.push(id);
            }
            log::trace!(
                "{}: loop at {} settled after two passes ({} drifting)",
                self.function,
                at,
                settled.len()
            );
            (settled, second)
        };

        let mut flow = Flow {
            exits: pass.exits,
            ..Flow::default()
        };
        if !pass.exit_envs.is_empty() {
            let (env, conflicts) = Env::join(&pass.exit_envs);
            for c in conflicts.iter().filter(|c| !settled.contains(&c.id)) {
                self.reporter.report(
                    Some(c.id),
                    Diagnostic::loop_carried(self.function, &c.binding, c.consumed_at, at),
                )?;
            }
            flow.env = Some(env);
        }
        Ok(flow)
    }

    fn loop_pass(&mut self, head: Env, cond: Option<&Expr>, body: &Block) -> Walk<LoopPass> {
        let mut pass = LoopPass::default();
        let head = match cond {
            Some(cond) => {
                let env = self.walk_operand(head, cond)?;
                pass.exit_envs.push(env.clone());
                env
            }
            None => head,
        };

        self.loops.push(self.depth);
        let flow = self.walk_block(head, body, Vec::new(), LeakSite::ScopeEnd);
        self.loops.pop();
        let mut flow = flow?;

        if let Some(env) = flow.env.take() {
            pass.back_edges.push(env);
        }
        pass.back_edges.append(&mut flow.continues);
        pass.exit_envs.append(&mut flow.breaks);
        pass.exits = flow.exits;
        Ok(pass)
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    fn walk_expr(&mut self, env: Env, expr: &Expr, mode: UseMode) -> Walk<Env> {
        match expr {
            Expr::Lit(..) => Ok(env),
            Expr::Var(ident) => self.use_name(env, ident, mode),
            Expr::Borrow { name, .. } => self.use_name(env, name, UseMode::Borrow),
            Expr::Call { callee, args, span } => self.walk_call(env, callee, args, *span),
            Expr::Binary { lhs, rhs, .. } => {
                let env = self.walk_operand(env, lhs)?;
                self.walk_operand(env, rhs)
            }
            Expr::Unary { expr, .. } => self.walk_operand(env, expr),
            Expr::Closure {
                params,
                ret,
                body,
                span,
            } => self.walk_closure(env, params, ret.as_ref(), body, *span),
        }
    }

    /// Move or borrow a binding by name.
    fn use_name(&mut self, env: Env, ident: &Ident, mode: UseMode) -> Walk<Env> {
        let Some((id, binding)) = env.lookup(&ident.text) else {
            // a global function used as a value
            if self.signatures.get(&ident.text).is_some() {
                return Ok(env);
            }
            return Err(MalformedInput::UnknownBinding {
                name: ident.text.clone(),
                at: ident.span,
            }
            .into());
        };
        if !binding.is_tracked() {
            return Ok(env);
        }

        match (binding.state, mode) {
            (BindingState::Consumed { at }, _) => {
                // stays consumed: later uses report against the same move
                self.reporter.report(
                    Some(id),
                    Diagnostic::use_after_move(self.function, binding, ident.span, at),
                )?;
                Ok(env)
            }
            (BindingState::Unconsumed, UseMode::Borrow) => Ok(env),
            (BindingState::Unconsumed, UseMode::Move) => {
                if binding.qualifier.must_consume() && !self.reporter.is_muted() {
                    self.audit.consumed += 1;
                }
                Ok(env.with_state(id, BindingState::Consumed { at: ident.span }))
            }
        }
    }

    fn walk_call(&mut self, env: Env, callee: &Ident, args: &[Expr], at: Span) -> Walk<Env> {
        let local = env
            .lookup(&callee.text)
            .map(|(_, b)| (b.callable.clone(), b.is_tracked()));

        let (mut env, shape) = match local {
            // calling a tracked callable uses it up
            Some((shape, tracked)) => {
                let mode = if tracked { UseMode::Move } else { UseMode::Borrow };
                (self.use_name(env, callee, mode)?, shape)
            }
            None => match self.signatures.get(&callee.text) {
                Some(sig) => (env, Some(sig.shape.clone())),
                None => {
                    return Err(MalformedInput::UnknownFunction {
                        name: callee.text.clone(),
                        at: callee.span,
                    }
                    .into())
                }
            },
        };

        let Some(shape) = shape else {
            // unknown parameter qualifiers: every argument moves
            for arg in args {
                env = self.walk_expr(env, arg, UseMode::Move)?;
            }
            return Ok(env);
        };

        if shape.params.len() != args.len() {
            return Err(MalformedInput::ArityMismatch {
                name: callee.text.clone(),
                expected: shape.params.len(),
                found: args.len(),
                at,
            }
            .into());
        }
        for (arg, param) in args.iter().zip(&shape.params) {
            env = match (arg, argument_mode(*param)) {
                (Expr::Var(ident), mode) => self.use_name(env, ident, mode)?,
                // the callee only looks at a temporary; nothing owns it after
                (other, UseMode::Borrow) => self.walk_operand(env, other)?,
                (other, UseMode::Move) => self.walk_expr(env, other, UseMode::Move)?,
            };
        }
        Ok(env)
    }

    /// Tracked captures move into the closure when it is created; its body
    /// is checked as a scope of its own, seeded with them.
    fn walk_closure(
        &mut self,
        env: Env,
        params: &[Param],
        ret: Option<&TypeExpr>,
        body: &Block,
        at: Span,
    ) -> Walk<Env> {
        for ty in params.iter().map(|p| &p.ty).chain(ret) {
            self.validate(ty)?;
        }

        let mut env = env;
        let mut seeds: Vec<Seed> = params.iter().map(Seed::param).collect();
        for ident in capture::free_names(params, body) {
            let captured = env
                .lookup(&ident.text)
                .map(|(_, b)| (b.qualifier, b.declared_at, b.callable.clone()));
            match captured {
                Some((qualifier, declared_at, callable)) => {
                    let mode = if qualifier.is_tracked() {
                        UseMode::Move
                    } else {
                        UseMode::Borrow
                    };
                    let site = Ident {
                        text: ident.text.clone(),
                        span: at,
                    };
                    env = self.use_name(env, &site, mode)?;
                    seeds.push(Seed {
                        name: ident.text,
                        at: declared_at,
                        qualifier,
                        callable,
                    });
                }
                None if self.signatures.get(&ident.text).is_some() => {}
                None => {
                    return Err(MalformedInput::UnknownBinding {
                        name: ident.text,
                        at: ident.span,
                    }
                    .into())
                }
            }
        }

        let returns = ret.map(classify).unwrap_or_default();
        let loops = std::mem::take(&mut self.loops);
        let checked = self.check_scope(seeds, returns, body);
        self.loops = loops;
        checked?;
        Ok(env)
    }

    // -----------------------------------------------------------------------
    // Qualifiers of values
    // -----------------------------------------------------------------------

    /// Qualifier of the value an expression produces.
    fn value_qualifier(&self, env: &Env, expr: &Expr) -> Qualifier {
        match expr {
            Expr::Var(ident) => env
                .lookup(&ident.text)
                .map(|(_, b)| b.qualifier)
                .unwrap_or_default(),
            Expr::Call { callee, .. } => match env.lookup(&callee.text) {
                Some((_, b)) => b.callable.as_ref().map(|c| c.ret).unwrap_or_default(),
                None => self
                    .signatures
                    .get(&callee.text)
                    .map(|s| s.shape.ret)
                    .unwrap_or_default(),
            },
            // a closure is as strict as the strictest thing it captures
            Expr::Closure { params, body, .. } => capture::free_names(params, body)
                .iter()
                .filter_map(|ident| env.lookup(&ident.text))
                .map(|(_, b)| b.qualifier)
                .fold(Qualifier::Shared, Qualifier::strictest),
            Expr::Lit(..) | Expr::Borrow { .. } | Expr::Binary { .. } | Expr::Unary { .. } => {
                Qualifier::Shared
            }
        }
    }

    fn callable_of(&self, env: &Env, ty: Option<&TypeExpr>, value: &Expr) -> Option<CallShape> {
        if let Some(shape) = ty.and_then(CallShape::of_fn_type) {
            return Some(shape);
        }
        match value {
            Expr::Closure { params, ret, .. } => Some(CallShape::from_types(
                params.iter().map(|p| &p.ty),
                ret.as_ref(),
            )),
            Expr::Var(ident) => match env.lookup(&ident.text) {
                Some((_, b)) => b.callable.clone(),
                None => self.signatures.get(&ident.text).map(|s| s.shape.clone()),
            },
            _ => None,
        }
    }
}

fn pattern_idents(pat: &Pat, f: &mut impl FnMut(&Ident)) {
    match pat {
        Pat::Wildcard(_) | Pat::Lit(..) => {}
        Pat::Ident(ident) => f(ident),
        Pat::Variant { fields, .. } => {
            for field in fields {
                pattern_idents(field, f);
            }
        }
    }
}

/// Short name for a value with no binding of its own.
fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Call { callee, .. } => format!("{}(..)", callee.text),
        Expr::Var(ident) => ident.text.clone(),
        Expr::Closure { .. } => "<closure>".to_string(),
        _ => "<temporary>".to_string(),
    }
}
