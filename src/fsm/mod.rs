//! Finite-state machines recognising user interactions.
//!
//! An FSM is an arena of states indexed by [`StateId`] and of transitions
//! indexed by [`TransitionId`]. It is built with [`FsmBuilder`], validated
//! once, then fed events with [`Fsm::process`] and fired timers with
//! [`Fsm::on_timeout`]. Lifecycle handlers ([`FsmHandler`]) observe when
//! the interaction starts, updates, stops or is cancelled.

pub mod builder;
pub mod error;
pub mod guard;
pub mod handler;
pub mod machine;
pub mod state;
pub mod timer;
pub mod transition;
pub mod validation;

pub use builder::{FsmBuilder, TransitionBuilder};
pub use error::{BuildError, FsmError};
pub use guard::Guard;
pub use handler::{Flow, FsmDataHandler, FsmHandler, Lifecycle, SharedHandler};
pub use machine::{Fsm, Recognizer, StateObserver};
pub use state::{StateId, StateKind, StateNode};
pub use timer::{SharedTimers, TimerId, TimerService, VirtualTimers};
pub use transition::{Action, TimeoutDelay, Transition, TransitionId, Trigger};
pub use validation::FsmViolation;
