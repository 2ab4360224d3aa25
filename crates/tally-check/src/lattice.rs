//! Binding state lattice and the join used where control paths reunite.
//!
//! `Unconsumed` and `Consumed` are not ordered for joining. Two paths that
//! disagree produce [`Join::Inconsistent`], which the walker reports and then
//! heals to `Consumed` so later checks do not cascade.

use tally_ast::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BindingState {
    Unconsumed,
    /// Consumed; `at` is the consuming site.
    Consumed { at: Span },
}

impl BindingState {
    pub fn is_consumed(&self) -> bool {
        matches!(self, BindingState::Consumed { .. })
    }

    pub fn consumed_at(&self) -> Option<Span> {
        match self {
            BindingState::Consumed { at } => Some(*at),
            BindingState::Unconsumed => None,
        }
    }

    /// Same consumption status, ignoring where it happened.
    pub fn agrees_with(&self, other: &BindingState) -> bool {
        self.is_consumed() == other.is_consumed()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Join {
    Agree(BindingState),
    /// Consumed on some paths only. `consumed_at` is the earliest
    /// consuming site among the paths that consumed.
    Inconsistent { consumed_at: Span },
}

/// Join the states of one binding across paths. `None` for zero paths.
///
/// Commutative and associative: agreeing consumed states keep the earliest
/// consuming site, so the result never depends on arm order.
pub fn join<'a>(states: impl IntoIterator<Item = &'a BindingState>) -> Option<Join> {
    let mut any = false;
    let mut unconsumed = false;
    let mut earliest: Option<Span> = None;

    for state in states {
        any = true;
        match state {
            BindingState::Unconsumed => unconsumed = true,
            BindingState::Consumed { at } => {
                earliest = Some(earliest.map_or(*at, |e| e.min(*at)));
            }
        }
    }

    if !any {
        return None;
    }
    Some(match (unconsumed, earliest) {
        (_, None) => Join::Agree(BindingState::Unconsumed),
        (false, Some(at)) => Join::Agree(BindingState::Consumed { at }),
        (true, Some(consumed_at)) => Join::Inconsistent { consumed_at },
    })
}
