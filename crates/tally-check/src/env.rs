//! Per-program-point binding environments.
//!
//! An [`Env`] is an immutable value: every update consumes the old value and
//! returns a new one. Clones share their map until one side writes, so
//! handing a copy to each branch arm is cheap and arms can never observe
//! each other's updates.

use crate::lattice::{self, BindingState, Join};
use crate::model::{CallShape, Qualifier};
use std::collections::BTreeMap;
use std::sync::Arc;
use tally_ast::span::Span;

/// Identity of one declaration. Ids grow in declaration order, so the
/// innermost (most recent) declaration of a name has the largest id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BindingId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: String,
    pub qualifier: Qualifier,
    pub declared_at: Span,
    /// Where the resource currently held was bound (declaration or the
    /// latest reassignment).
    pub origin: Span,
    pub state: BindingState,
    /// Lexical depth of the declaring block.
    pub depth: u32,
    /// Parameter and return qualifiers when the binding holds a callable.
    pub callable: Option<CallShape>,
}

impl Binding {
    pub fn is_tracked(&self) -> bool {
        self.qualifier.is_tracked()
    }

    /// A `Linear` binding that still holds its resource.
    pub fn is_live_linear(&self) -> bool {
        self.qualifier.must_consume() && !self.state.is_consumed()
    }
}

/// Paths disagreed on a binding at a join.
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub id: BindingId,
    pub binding: Binding,
    pub consumed_at: Span,
}

#[derive(Debug, Clone, Default)]
pub struct Env {
    slots: Arc<BTreeMap<BindingId, Binding>>,
}

impl Env {
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, id: BindingId) -> Option<&Binding> {
        self.slots.get(&id)
    }

    /// Resolve a name to its innermost live declaration.
    pub fn lookup(&self, name: &str) -> Option<(BindingId, &Binding)> {
        self.slots
            .iter()
            .rev()
            .find(|(_, b)| b.name == name)
            .map(|(id, b)| (*id, b))
    }

    pub fn iter(&self) -> impl Iterator<Item = (BindingId, &Binding)> {
        self.slots.iter().map(|(id, b)| (*id, b))
    }

    pub fn declare(mut self, id: BindingId, binding: Binding) -> Env {
        Arc::make_mut(&mut self.slots).insert(id, binding);
        self
    }

    pub fn with_state(mut self, id: BindingId, state: BindingState) -> Env {
        if let Some(b) = Arc::make_mut(&mut self.slots).get_mut(&id) {
            b.state = state;
        }
        self
    }

    /// A fresh resource is stored into an existing binding.
    pub fn reassign(mut self, id: BindingId, at: Span) -> Env {
        if let Some(b) = Arc::make_mut(&mut self.slots).get_mut(&id) {
            b.state = BindingState::Unconsumed;
            b.origin = at;
        }
        self
    }

    /// Drop every binding declared at `depth` or deeper, returning them in
    /// declaration order.
    pub fn leave_scope(mut self, depth: u32) -> (Env, Vec<(BindingId, Binding)>) {
        if self.slots.values().all(|b| b.depth < depth) {
            return (self, Vec::new());
        }
        let slots = Arc::make_mut(&mut self.slots);
        let gone: Vec<BindingId> = slots
            .iter()
            .filter(|(_, b)| b.depth >= depth)
            .map(|(id, _)| *id)
            .collect();
        let removed = gone
            .into_iter()
            .filter_map(|id| slots.remove(&id).map(|b| (id, b)))
            .collect();
        (self, removed)
    }

    /// Mark the given bindings consumed (used to heal after a reported
    /// inconsistency).
    pub fn heal(mut self, conflicts: &[Conflict]) -> Env {
        if conflicts.is_empty() {
            return self;
        }
        let slots = Arc::make_mut(&mut self.slots);
        for c in conflicts {
            if let Some(b) = slots.get_mut(&c.id) {
                b.state = BindingState::Consumed { at: c.consumed_at };
            }
        }
        self
    }

    /// Linear bindings present in every env whose states disagree.
    pub fn conflicts(envs: &[&Env]) -> Vec<Conflict> {
        let Some((first, rest)) = envs.split_first() else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for (id, binding) in first.iter() {
            if !binding.qualifier.must_consume() {
                continue;
            }
            let states: Option<Vec<&BindingState>> = std::iter::once(Some(&binding.state))
                .chain(rest.iter().map(|e| e.get(id).map(|b| &b.state)))
                .collect();
            // declared on only some paths: scoped to those paths
            let Some(states) = states else { continue };
            if let Some(Join::Inconsistent { consumed_at }) = lattice::join(states) {
                out.push(Conflict {
                    id,
                    binding: binding.clone(),
                    consumed_at,
                });
            }
        }
        out
    }

    /// Join the environments of paths reaching the same point. Bindings
    /// missing from any path are excluded. Disagreements heal to `Consumed`
    /// in the result; only the linear ones are returned as conflicts, since
    /// an affine value may be dropped on the paths that did not use it.
    pub fn join(envs: &[Env]) -> (Env, Vec<Conflict>) {
        let Some((first, rest)) = envs.split_first() else {
            return (Env::default(), Vec::new());
        };
        if rest.is_empty() {
            return (first.clone(), Vec::new());
        }

        let mut slots = BTreeMap::new();
        let mut conflicts = Vec::new();
        for (id, binding) in first.iter() {
            let states: Option<Vec<&BindingState>> = std::iter::once(Some(&binding.state))
                .chain(rest.iter().map(|e| e.get(id).map(|b| &b.state)))
                .collect();
            let Some(states) = states else { continue };

            let mut joined = binding.clone();
            match lattice::join(states) {
                Some(Join::Agree(state)) => joined.state = state,
                Some(Join::Inconsistent { consumed_at }) => {
                    if binding.qualifier.must_consume() {
                        conflicts.push(Conflict {
                            id,
                            binding: binding.clone(),
                            consumed_at,
                        });
                    }
                    joined.state = BindingState::Consumed { at: consumed_at };
                }
                None => {}
            }
            slots.insert(id, joined);
        }
        (
            Env {
                slots: Arc::new(slots),
            },
            conflicts,
        )
    }

    /// Tracked bindings of `self` whose consumption status differs in any
    /// of `later`, paired with the site that changed them.
    pub fn drift(&self, later: &[Env]) -> Vec<(BindingId, Binding, Span)> {
        let mut out = Vec::new();
        for (id, binding) in self.iter() {
            if !binding.is_tracked() {
                continue;
            }
            let changed = later.iter().find_map(|env| {
                let after = env.get(id)?;
                if after.state.agrees_with(&binding.state) {
                    None
                } else {
                    Some(after.state.consumed_at().unwrap_or(after.origin))
                }
            });
            if let Some(at) = changed {
                out.push((id, binding.clone(), at));
            }
        }
        out
    }
}
