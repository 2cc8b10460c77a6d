//! Builders for FSMs and their transitions.

use crate::event::{Event, EventType};
use crate::fsm::error::BuildError;
use crate::fsm::guard::Guard;
use crate::fsm::machine::Fsm;
use crate::fsm::state::{StateId, StateKind, StateNode};
use crate::fsm::timer::SharedTimers;
use crate::fsm::transition::{Action, TimeoutDelay, Transition, TransitionId, Trigger};
use crate::fsm::validation;

/// Builder for a single transition.
pub struct TransitionBuilder {
    from: Option<StateId>,
    to: Option<StateId>,
    trigger: Option<Trigger>,
    guard: Option<Guard>,
    action: Option<Action>,
}

impl TransitionBuilder {
    pub fn new() -> Self {
        Self {
            from: None,
            to: None,
            trigger: None,
            guard: None,
            action: None,
        }
    }

    /// Set the source state (required).
    pub fn from(mut self, state: StateId) -> Self {
        self.from = Some(state);
        self
    }

    /// Set the target state (required).
    pub fn to(mut self, state: StateId) -> Self {
        self.to = Some(state);
        self
    }

    /// Fire on any event of the given types.
    pub fn on<I>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = EventType>,
    {
        self.trigger = Some(Trigger::on(types));
        self
    }

    /// Fire on any event.
    pub fn epsilon(mut self) -> Self {
        self.trigger = Some(Trigger::Epsilon);
        self
    }

    /// Fire when the source state's timer elapses.
    pub fn timeout(mut self, delay: impl Into<TimeoutDelay>) -> Self {
        self.trigger = Some(Trigger::Timeout(delay.into()));
        self
    }

    /// Delegate to `fsm` until it stops (go to the target) or cancels.
    pub fn sub_fsm(mut self, fsm: Fsm) -> Self {
        self.trigger = Some(Trigger::SubFsm(Box::new(fsm)));
        self
    }

    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn guard(mut self, guard: Guard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Add a guard using a closure (optional).
    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Event) -> bool + 'static,
    {
        self.guard = Some(Guard::new(predicate));
        self
    }

    /// Side effect run when the transition fires (optional).
    pub fn action<F>(mut self, action: F) -> Self
    where
        F: FnMut(&Event) + 'static,
    {
        self.action = Some(Box::new(action));
        self
    }

    pub fn build(self) -> Result<Transition, BuildError> {
        let source = self.from.ok_or(BuildError::MissingSource)?;
        let target = self.to.ok_or(BuildError::MissingTarget)?;
        let trigger = self.trigger.ok_or(BuildError::MissingTrigger)?;

        Ok(Transition {
            source,
            target,
            trigger,
            guard: self.guard,
            action: self.action,
        })
    }
}

impl Default for TransitionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for an [`Fsm`].
///
/// The init state exists from the start; other states are added and
/// return their id for use in transitions. Structure is checked by
/// [`FsmBuilder::build`], which reports every violation at once.
///
/// # Example
///
/// ```rust
/// use interacto::event::{Event, EventType};
/// use interacto::fsm::{FsmBuilder, TransitionBuilder, VirtualTimers};
///
/// let mut builder = FsmBuilder::new("click", VirtualTimers::shared());
/// let clicked = builder.terminal_state("clicked");
/// builder
///     .transition(
///         TransitionBuilder::new()
///             .from(builder.init())
///             .to(clicked)
///             .on([EventType::Click]),
///     )
///     .unwrap();
/// let mut fsm = builder.build().unwrap();
///
/// assert!(fsm.process(&Event::mouse(EventType::Click, 0, 1.0, 1.0)).unwrap());
/// assert_eq!(fsm.current_state_name(), "init");
/// ```
pub struct FsmBuilder {
    name: String,
    states: Vec<StateNode>,
    transitions: Vec<Transition>,
    starting: StateId,
    timers: SharedTimers,
}

impl FsmBuilder {
    pub fn new(name: impl Into<String>, timers: SharedTimers) -> Self {
        Self {
            name: name.into(),
            states: vec![StateNode::new("init", StateKind::Init)],
            transitions: Vec::new(),
            starting: StateId::INIT,
            timers,
        }
    }

    pub fn init(&self) -> StateId {
        StateId::INIT
    }

    pub fn std_state(&mut self, name: impl Into<String>) -> StateId {
        self.add_state(name, StateKind::Std)
    }

    pub fn terminal_state(&mut self, name: impl Into<String>) -> StateId {
        self.add_state(name, StateKind::Terminal)
    }

    pub fn cancelling_state(&mut self, name: impl Into<String>) -> StateId {
        self.add_state(name, StateKind::Cancelling)
    }

    /// State whose entry (or exit, for init) starts the interaction.
    pub fn starting_state(&mut self, state: StateId) -> &mut Self {
        self.starting = state;
        self
    }

    /// Add a transition using a builder.
    ///
    /// Transitions leaving the same state are tried in the order they were
    /// added.
    pub fn transition(&mut self, builder: TransitionBuilder) -> Result<TransitionId, BuildError> {
        let transition = builder.build()?;
        Ok(self.add_transition(transition))
    }

    /// Add a pre-built transition.
    pub fn add_transition(&mut self, transition: Transition) -> TransitionId {
        let id = TransitionId(self.transitions.len());
        if let Some(source) = self.states.get_mut(transition.source.0) {
            source.outgoing.push(id);
        }
        self.transitions.push(transition);
        id
    }

    /// Validate and build the FSM.
    ///
    /// Embedded sub-FSMs switch to inner mode and share this FSM's timers.
    pub fn build(self) -> Result<Fsm, BuildError> {
        let found = validation::violations(validation::validate(
            &self.states,
            &self.transitions,
            self.starting,
        ));
        if !found.is_empty() {
            return Err(BuildError::InvalidFsm {
                fsm: self.name,
                violations: found,
            });
        }

        let mut transitions = self.transitions;
        for transition in &mut transitions {
            if let Some(sub) = transition.sub_fsm_mut() {
                sub.set_inner(true);
                sub.share_timers(self.timers.clone());
            }
        }
        Ok(Fsm::from_parts(
            self.name,
            self.states,
            transitions,
            self.starting,
            self.timers,
        ))
    }

    fn add_state(&mut self, name: impl Into<String>, kind: StateKind) -> StateId {
        let id = StateId(self.states.len());
        self.states.push(StateNode::new(name, kind));
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsm::timer::VirtualTimers;
    use crate::fsm::validation::FsmViolation;

    #[test]
    fn transition_builder_validates_required_fields() {
        let missing_target = TransitionBuilder::new().from(StateId::INIT).build();
        assert!(matches!(missing_target, Err(BuildError::MissingTarget)));

        let missing_trigger = TransitionBuilder::new()
            .from(StateId::INIT)
            .to(StateId(1))
            .build();
        assert!(matches!(missing_trigger, Err(BuildError::MissingTrigger)));

        let missing_source = TransitionBuilder::new().epsilon().build();
        assert!(matches!(missing_source, Err(BuildError::MissingSource)));
    }

    #[test]
    fn outgoing_order_follows_declaration() {
        let mut builder = FsmBuilder::new("order", VirtualTimers::shared());
        let a = builder.terminal_state("a");
        let b = builder.terminal_state("b");
        let first = builder
            .transition(TransitionBuilder::new().from(builder.init()).to(b).epsilon())
            .unwrap();
        let second = builder
            .transition(
                TransitionBuilder::new()
                    .from(builder.init())
                    .to(a)
                    .on([EventType::Click]),
            )
            .unwrap();

        let fsm = builder.build().unwrap();
        let init = fsm.state(StateId::INIT).unwrap();
        assert_eq!(init.outgoing(), &[first, second]);
    }

    #[test]
    fn build_reports_every_violation() {
        let mut builder = FsmBuilder::new("broken", VirtualTimers::shared());
        let ended = builder.terminal_state("ended");
        builder.std_state("orphan");
        builder
            .transition(
                TransitionBuilder::new()
                    .from(ended)
                    .to(builder.init())
                    .epsilon(),
            )
            .unwrap();

        match builder.build() {
            Err(BuildError::InvalidFsm { fsm, violations }) => {
                assert_eq!(fsm, "broken");
                assert!(violations.len() >= 3);
                assert!(violations.iter().any(|v| matches!(
                    v,
                    FsmViolation::UnreachableState { state } if state == "orphan"
                )));
            }
            other => panic!("expected InvalidFsm, got {other:?}"),
        }
    }

    #[test]
    fn embedded_fsm_becomes_inner() {
        let timers = VirtualTimers::shared();
        let mut sub = FsmBuilder::new("sub", timers.clone());
        let done = sub.terminal_state("done");
        sub.transition(
            TransitionBuilder::new()
                .from(sub.init())
                .to(done)
                .on([EventType::Click]),
        )
        .unwrap();
        let sub = sub.build().unwrap();
        assert!(!sub.is_inner());

        let mut parent = FsmBuilder::new("parent", timers);
        let ended = parent.terminal_state("ended");
        let id = parent
            .transition(
                TransitionBuilder::new()
                    .from(parent.init())
                    .to(ended)
                    .sub_fsm(sub),
            )
            .unwrap();
        let parent = parent.build().unwrap();

        let embedded = parent.transition(id).and_then(Transition::sub_fsm).unwrap();
        assert!(embedded.is_inner());
        assert!(parent
            .fingerprint()
            .contains("sub([init,terminal]{#0->#1:click})"));
    }
}
