//! Transitions between FSM states.
//!
//! A transition is a plain record: source, target, a trigger deciding which
//! events it syntactically accepts, an optional guard for the semantic
//! match, and an optional action run when it fires.

use crate::event::{Event, EventType};
use crate::fsm::guard::Guard;
use crate::fsm::machine::Fsm;
use crate::fsm::state::StateId;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// Index of a transition inside its owning FSM.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransitionId(pub(crate) usize);

/// Side effect run when a transition fires, before the source state is left.
pub type Action = Box<dyn FnMut(&Event)>;

/// Delay of a timeout transition, evaluated each time the timer is armed.
#[derive(Clone)]
pub struct TimeoutDelay(Rc<dyn Fn() -> Duration>);

impl TimeoutDelay {
    pub fn fixed(delay: Duration) -> Self {
        Self(Rc::new(move || delay))
    }

    /// Delay computed when the state is entered, e.g. from user settings.
    pub fn dynamic<F>(delay: F) -> Self
    where
        F: Fn() -> Duration + 'static,
    {
        Self(Rc::new(delay))
    }

    pub fn current(&self) -> Duration {
        (self.0)()
    }
}

impl From<Duration> for TimeoutDelay {
    fn from(delay: Duration) -> Self {
        Self::fixed(delay)
    }
}

impl fmt::Debug for TimeoutDelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TimeoutDelay").field(&self.current()).finish()
    }
}

/// What makes a transition fire.
pub enum Trigger {
    /// Any event whose type is in the set.
    Events(BTreeSet<EventType>),
    /// Always accepts. Followed as soon as its source state is entered,
    /// without consuming an event.
    Epsilon,
    /// The state's armed timer fired. Never matched by `process`.
    Timeout(TimeoutDelay),
    /// Delegation to an embedded FSM, resolved when it stops or cancels.
    SubFsm(Box<Fsm>),
}

impl Trigger {
    /// Trigger matching the given event types.
    pub fn on<I>(types: I) -> Self
    where
        I: IntoIterator<Item = EventType>,
    {
        Self::Events(types.into_iter().collect())
    }

    fn describe(&self) -> String {
        match self {
            Self::Events(types) => types
                .iter()
                .map(EventType::name)
                .collect::<Vec<_>>()
                .join("|"),
            Self::Epsilon => "epsilon".to_string(),
            Self::Timeout(_) => "timeout".to_string(),
            Self::SubFsm(fsm) => format!("sub({})", fsm.fingerprint()),
        }
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Trigger({})", self.describe())
    }
}

/// A directed edge from an output state to an input state.
pub struct Transition {
    pub(crate) source: StateId,
    pub(crate) target: StateId,
    pub(crate) trigger: Trigger,
    pub(crate) guard: Option<Guard>,
    pub(crate) action: Option<Action>,
}

impl Transition {
    pub fn source(&self) -> StateId {
        self.source
    }

    pub fn target(&self) -> StateId {
        self.target
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    /// Type-level match: does this transition handle events of this shape.
    pub fn accept(&self, event: &Event) -> bool {
        match &self.trigger {
            Trigger::Events(types) => types.contains(&event.event_type()),
            Trigger::Epsilon => true,
            Trigger::Timeout(_) => false,
            Trigger::SubFsm(fsm) => fsm.init_accepts(event),
        }
    }

    /// Semantic match, assuming `accept` already held.
    pub fn is_guard_ok(&self, event: &Event) -> bool {
        self.guard.as_ref().is_none_or(|g| g.check(event))
    }

    /// Both the syntactic and the semantic match hold.
    pub fn matches(&self, event: &Event) -> bool {
        self.accept(event) && self.is_guard_ok(event)
    }

    /// Event types this transition may match, for listener registration.
    pub fn accepted_events(&self) -> BTreeSet<EventType> {
        match &self.trigger {
            Trigger::Events(types) => types.clone(),
            Trigger::Epsilon | Trigger::Timeout(_) => BTreeSet::new(),
            Trigger::SubFsm(fsm) => fsm.init_accepted_events(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.trigger, Trigger::Timeout(_))
    }

    pub fn is_epsilon(&self) -> bool {
        matches!(self.trigger, Trigger::Epsilon)
    }

    pub(crate) fn timeout_delay(&self) -> Option<Duration> {
        match &self.trigger {
            Trigger::Timeout(delay) => Some(delay.current()),
            _ => None,
        }
    }

    pub(crate) fn sub_fsm(&self) -> Option<&Fsm> {
        match &self.trigger {
            Trigger::SubFsm(fsm) => Some(fsm),
            _ => None,
        }
    }

    pub(crate) fn sub_fsm_mut(&mut self) -> Option<&mut Fsm> {
        match &mut self.trigger {
            Trigger::SubFsm(fsm) => Some(fsm),
            _ => None,
        }
    }

    pub(crate) fn run_action(&mut self, event: &Event) {
        if let Some(action) = self.action.as_mut() {
            action(event);
        }
    }

    pub(crate) fn describe(&self) -> String {
        let guard = self
            .guard
            .as_ref()
            .map(|g| format!("[{}]", g.describe()))
            .unwrap_or_default();
        format!(
            "{}->{}:{}{}",
            self.source,
            self.target,
            self.trigger.describe(),
            guard
        )
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("trigger", &self.trigger)
            .field("guarded", &self.guard.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn transition(trigger: Trigger, guard: Option<Guard>) -> Transition {
        Transition {
            source: StateId::INIT,
            target: StateId(1),
            trigger,
            guard,
            action: None,
        }
    }

    #[test]
    fn event_trigger_accepts_declared_types() {
        let t = transition(Trigger::on([EventType::MouseDown, EventType::MouseUp]), None);

        assert!(t.accept(&Event::mouse(EventType::MouseUp, 0, 0.0, 0.0)));
        assert!(!t.accept(&Event::key_down("KeyA")));
        assert_eq!(t.accepted_events().len(), 2);
    }

    #[test]
    fn guard_is_checked_separately() {
        let t = transition(Trigger::on([EventType::MouseDown]), Some(Guard::button(1)));
        let wrong = Event::mouse(EventType::MouseDown, 0, 0.0, 0.0);

        assert!(t.accept(&wrong));
        assert!(!t.is_guard_ok(&wrong));
        assert!(!t.matches(&wrong));
        assert!(t.matches(&Event::mouse(EventType::MouseDown, 1, 0.0, 0.0)));
    }

    #[test]
    fn epsilon_accepts_everything_but_declares_nothing() {
        let t = transition(Trigger::Epsilon, None);

        assert!(t.accept(&Event::key_up("KeyZ")));
        assert!(t.accepted_events().is_empty());
    }

    #[test]
    fn timeout_never_accepts_events() {
        let t = transition(
            Trigger::Timeout(Duration::from_millis(300).into()),
            None,
        );

        assert!(!t.accept(&Event::Timeout));
        assert!(t.is_timeout());
        assert_eq!(t.timeout_delay(), Some(Duration::from_millis(300)));
    }

    #[test]
    fn dynamic_delay_is_evaluated_on_demand() {
        let calls = Rc::new(Cell::new(0u64));
        let seen = calls.clone();
        let delay = TimeoutDelay::dynamic(move || {
            seen.set(seen.get() + 1);
            Duration::from_millis(100 * seen.get())
        });

        assert_eq!(delay.current(), Duration::from_millis(100));
        assert_eq!(delay.current(), Duration::from_millis(200));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn action_runs_with_event() {
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        let mut t = transition(Trigger::Epsilon, None);
        t.action = Some(Box::new(move |_e: &Event| counter.set(counter.get() + 1)));

        t.run_action(&Event::Timeout);
        t.run_action(&Event::Timeout);

        assert_eq!(hits.get(), 2);
    }
}
