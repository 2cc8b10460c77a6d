//! State vocabulary of interaction FSMs.
//!
//! States live in an arena owned by their [`Fsm`](crate::fsm::Fsm) and are
//! referred to by [`StateId`]. The kind of a state decides whether it can be
//! left (output capability), entered (input capability), or both.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::fsm::transition::TransitionId;

/// Index of a state inside its owning FSM.
///
/// The init state of every FSM is always `StateId::INIT`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateId(pub(crate) usize);

impl StateId {
    /// The unique initial state.
    pub const INIT: StateId = StateId(0);

    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Closed set of state kinds.
///
/// # Example
///
/// ```rust
/// use interacto::fsm::StateKind;
///
/// assert!(StateKind::Init.is_output());
/// assert!(!StateKind::Init.is_input());
/// assert!(StateKind::Std.is_output() && StateKind::Std.is_input());
/// assert!(StateKind::Terminal.is_input() && !StateKind::Terminal.is_output());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateKind {
    /// Starting state; left by transitions, re-entered only through reinit.
    Init,
    /// Intermediate state, both entered and left.
    Std,
    /// Entering it completes the interaction, then the FSM reinitialises.
    Terminal,
    /// Entering it aborts the interaction, then the FSM fully reinitialises.
    Cancelling,
}

impl StateKind {
    /// Whether transitions may start from a state of this kind.
    pub fn is_output(&self) -> bool {
        matches!(self, Self::Init | Self::Std)
    }

    /// Whether transitions may lead to a state of this kind.
    pub fn is_input(&self) -> bool {
        matches!(self, Self::Std | Self::Terminal | Self::Cancelling)
    }

    /// Terminal and cancelling states end an interaction cycle.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Terminal | Self::Cancelling)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Std => "std",
            Self::Terminal => "terminal",
            Self::Cancelling => "cancelling",
        }
    }
}

/// A state node: its name, kind and outgoing transitions in declaration order.
#[derive(Clone, Debug)]
pub struct StateNode {
    pub(crate) name: String,
    pub(crate) kind: StateKind,
    pub(crate) outgoing: Vec<TransitionId>,
}

impl StateNode {
    pub(crate) fn new(name: impl Into<String>, kind: StateKind) -> Self {
        Self {
            name: name.into(),
            kind,
            outgoing: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> StateKind {
        self.kind
    }

    /// Outgoing transitions, in the order they are tried.
    pub fn outgoing(&self) -> &[TransitionId] {
        &self.outgoing
    }
}
