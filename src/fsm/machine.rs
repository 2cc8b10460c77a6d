//! The FSM engine.
//!
//! An [`Fsm`] processes one event at a time: the current state's transitions
//! are tried in declaration order and the first one whose trigger accepts
//! the event and whose guard holds fires. Entering states drives the
//! interaction lifecycle (start, update, stop, cancel) that handlers
//! observe.

use crate::event::{Event, EventType};
use crate::fsm::error::FsmError;
use crate::fsm::handler::{Flow, FsmDataHandler, Lifecycle, Notifier, SharedHandler};
use crate::fsm::state::{StateId, StateKind, StateNode};
use crate::fsm::timer::{SharedTimers, TimerId};
use crate::fsm::transition::{Transition, TransitionId};
use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::rc::Weak;
use tracing::{debug, trace, warn};

/// Common surface of FSMs and FSM combinators.
///
/// Interactions own a `Box<dyn Recognizer>` and only talk to it through
/// this trait, so a plain FSM and a composition of FSMs are interchangeable.
pub trait Recognizer {
    fn name(&self) -> &str;

    /// Structural description, equal for FSMs built the same way.
    fn fingerprint(&self) -> String;

    /// Process one event. Returns whether some transition fired.
    fn process(&mut self, event: &Event) -> Result<bool, FsmError>;

    /// Deliver a fired timer. Stale ids are ignored and return `false`.
    fn on_timeout(&mut self, timer: TimerId) -> Result<bool, FsmError>;

    fn is_started(&self) -> bool;

    /// Back to the initial state; pending recycled events are kept.
    fn reinit(&mut self);

    /// Back to the initial state, dropping pending recycled events.
    fn full_reinit(&mut self);

    /// Event types that may currently make progress.
    fn accepted_events(&self) -> BTreeSet<EventType>;

    fn add_handler(&mut self, handler: SharedHandler);

    fn set_data_handler(&mut self, handler: Weak<RefCell<dyn FsmDataHandler>>);

    /// Embedded machines buffer their lifecycle signals for their parent
    /// instead of notifying handlers.
    fn set_inner(&mut self, inner: bool);

    fn take_signals(&mut self) -> Vec<Lifecycle>;

    /// Terminal teardown; the machine ignores every event afterwards.
    fn uninstall(&mut self);
}

/// Observer of current-state changes, called with the old and new state names.
pub type StateObserver = Box<dyn FnMut(&str, &str)>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ArmedTimeout {
    transition: TransitionId,
    timer: TimerId,
}

/// A finite-state machine recognising one interaction.
///
/// Built with [`FsmBuilder`](crate::fsm::FsmBuilder).
pub struct Fsm {
    name: String,
    states: Vec<StateNode>,
    transitions: Vec<Transition>,
    current: StateId,
    starting_state: StateId,
    started: bool,
    notifier: Notifier,
    observers: Vec<StateObserver>,
    events_to_process: VecDeque<Event>,
    current_timeout: Option<ArmedTimeout>,
    current_sub_fsm: Option<TransitionId>,
    sub_exited: bool,
    timers: SharedTimers,
    data_handler: Option<Weak<RefCell<dyn FsmDataHandler>>>,
    replaying: bool,
    epsilon_depth: usize,
    uninstalled: bool,
}

impl Fsm {
    pub(crate) fn from_parts(
        name: String,
        states: Vec<StateNode>,
        transitions: Vec<Transition>,
        starting_state: StateId,
        timers: SharedTimers,
    ) -> Self {
        Self {
            name,
            states,
            transitions,
            current: StateId::INIT,
            starting_state,
            started: false,
            notifier: Notifier::default(),
            observers: Vec::new(),
            events_to_process: VecDeque::new(),
            current_timeout: None,
            current_sub_fsm: None,
            sub_exited: false,
            timers,
            data_handler: None,
            replaying: false,
            epsilon_depth: 0,
            uninstalled: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn states(&self) -> &[StateNode] {
        &self.states
    }

    pub fn state(&self, id: StateId) -> Option<&StateNode> {
        self.states.get(id.0)
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn transition(&self, id: TransitionId) -> Option<&Transition> {
        self.transitions.get(id.0)
    }

    pub fn current_state(&self) -> StateId {
        self.current
    }

    /// Name of the current state, looking through an active sub-FSM.
    pub fn current_state_name(&self) -> &str {
        if let Some(sub) = self.delegated() {
            return sub.current_state_name();
        }
        self.states.get(self.current.0).map_or("", StateNode::name)
    }

    pub fn starting_state(&self) -> StateId {
        self.starting_state
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_inner(&self) -> bool {
        self.notifier.is_inner()
    }

    pub fn is_uninstalled(&self) -> bool {
        self.uninstalled
    }

    pub fn handler_count(&self) -> usize {
        self.notifier.handler_count()
    }

    /// Events waiting to be replayed once the current interaction stops.
    pub fn events_to_process(&self) -> impl Iterator<Item = &Event> {
        self.events_to_process.iter()
    }

    /// Queue an event for replay after the current interaction stops.
    pub fn add_remaining_event(&mut self, event: Event) {
        self.events_to_process.push_back(event);
    }

    /// The embedded FSM events are currently routed to, if any.
    pub fn current_sub_fsm(&self) -> Option<&Fsm> {
        self.delegated()
    }

    /// Id of the timer armed for the current state's timeout transition.
    pub fn armed_timer(&self) -> Option<TimerId> {
        match self.delegated().and_then(Fsm::armed_timer) {
            Some(timer) => Some(timer),
            None => self.current_timeout.map(|armed| armed.timer),
        }
    }

    pub fn observe_state<F>(&mut self, observer: F)
    where
        F: FnMut(&str, &str) + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    pub fn add_handler(&mut self, handler: SharedHandler) {
        self.notifier.add_handler(handler);
    }

    pub fn set_data_handler(&mut self, handler: Weak<RefCell<dyn FsmDataHandler>>) {
        self.data_handler = Some(handler);
    }

    pub fn set_inner(&mut self, inner: bool) {
        self.notifier.set_inner(inner);
    }

    pub fn take_signals(&mut self) -> Vec<Lifecycle> {
        self.notifier.take_signals()
    }

    /// Process one event.
    ///
    /// While a sub-FSM is active the event goes to it exclusively.
    /// Returns `Err(FsmError::Cancelled)` when a handler cancelled the
    /// interaction; the FSM is back in its initial state by then.
    pub fn process(&mut self, event: &Event) -> Result<bool, FsmError> {
        if self.uninstalled {
            return Ok(false);
        }
        if let Event::KeyUp(key) = event {
            self.remove_key_event(&key.code);
        }

        let processed = match self.current_sub_fsm {
            Some(id) => self.process_in_sub_fsm(id, event)?,
            None => self.process_in_state(event)?,
        };

        if processed && !self.is_inner() {
            if let Event::KeyDown(key) = event {
                let mid_flight = self.current_sub_fsm.is_some() || self.current != StateId::INIT;
                if mid_flight && !self.is_key_queued(&key.code) {
                    self.events_to_process.push_back(event.clone());
                }
            }
        }
        Ok(processed)
    }

    /// Fire the armed timeout transition if `timer` is the armed timer.
    pub fn on_timeout(&mut self, timer: TimerId) -> Result<bool, FsmError> {
        if self.uninstalled {
            return Ok(false);
        }
        if let Some(id) = self.current_sub_fsm {
            let fired = match self.sub_fsm_mut(id) {
                Some(sub) => sub.on_timeout(timer)?,
                None => false,
            };
            if fired {
                self.handle_sub_signals(id, &Event::Timeout)?;
                return Ok(true);
            }
        }

        let armed = match self.current_timeout {
            Some(armed) if armed.timer == timer => armed,
            _ => {
                warn!(fsm = %self.name, %timer, "ignoring stale timer");
                return Ok(false);
            }
        };
        self.current_timeout = None;

        let event = Event::Timeout;
        let Some(transition) = self.transitions.get_mut(armed.transition.0) else {
            return Ok(false);
        };
        if !transition.is_guard_ok(&event) {
            return Ok(false);
        }
        transition.run_action(&event);
        let (source, target) = (transition.source, transition.target);
        trace!(fsm = %self.name, %timer, "timeout transition fired");
        self.exit_state(source)?;
        self.enter_state(target, &event)?;
        Ok(true)
    }

    /// Back to the init state. Pending recycled events are kept.
    pub fn reinit(&mut self) {
        if let Some(id) = self.current_sub_fsm {
            if let Some(sub) = self.sub_fsm_mut(id) {
                sub.reinit();
            }
        }
        self.reset_to_init();
    }

    /// Back to the init state, dropping every pending recycled event.
    pub fn full_reinit(&mut self) {
        if let Some(id) = self.current_sub_fsm {
            if let Some(sub) = self.sub_fsm_mut(id) {
                sub.full_reinit();
            }
        }
        self.events_to_process.clear();
        self.reset_to_init();
    }

    /// Abort the running interaction, notifying handlers if it had started.
    pub fn on_cancelling(&mut self) -> Result<(), FsmError> {
        let outcome = if self.started || self.is_inner() {
            debug!(fsm = %self.name, "interaction cancelled");
            self.notifier.notify(Lifecycle::Cancels)
        } else {
            Ok(Flow::Continue)
        };
        self.full_reinit();
        match outcome? {
            Flow::Continue => Ok(()),
            Flow::Cancel => Err(self.cancelled()),
        }
    }

    /// Detach everything: handlers, observers, states, transitions.
    pub fn uninstall(&mut self) {
        self.full_reinit();
        self.observers.clear();
        self.notifier.clear_handlers();
        self.notifier.clear_signals();
        for transition in &mut self.transitions {
            if let Some(sub) = transition.sub_fsm_mut() {
                sub.uninstall();
            }
        }
        self.transitions.clear();
        self.states.clear();
        self.data_handler = None;
        self.uninstalled = true;
    }

    /// Event types the current state may consume.
    pub fn accepted_events(&self) -> BTreeSet<EventType> {
        if let Some(sub) = self.delegated() {
            return sub.accepted_events();
        }
        self.accepted_events_of(self.current)
    }

    /// Structural description: state kinds and transitions with their
    /// triggers and guards. The FSM's name is not part of it.
    pub fn fingerprint(&self) -> String {
        let kinds = self
            .states
            .iter()
            .map(|s| s.kind.name())
            .collect::<Vec<_>>()
            .join(",");
        let edges = self
            .transitions
            .iter()
            .map(Transition::describe)
            .collect::<Vec<_>>()
            .join(";");
        format!("[{kinds}]{{{edges}}}")
    }

    pub(crate) fn init_accepts(&self, event: &Event) -> bool {
        self.find_transition(StateId::INIT, event).is_some()
    }

    pub(crate) fn init_accepted_events(&self) -> BTreeSet<EventType> {
        self.accepted_events_of(StateId::INIT)
    }

    pub(crate) fn share_timers(&mut self, timers: SharedTimers) {
        for transition in &mut self.transitions {
            if let Some(sub) = transition.sub_fsm_mut() {
                sub.share_timers(timers.clone());
            }
        }
        self.timers = timers;
    }

    fn accepted_events_of(&self, state: StateId) -> BTreeSet<EventType> {
        self.states
            .get(state.0)
            .map(|s| {
                s.outgoing
                    .iter()
                    .filter_map(|id| self.transitions.get(id.0))
                    .flat_map(Transition::accepted_events)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn find_transition(&self, state: StateId, event: &Event) -> Option<TransitionId> {
        let node = self.states.get(state.0)?;
        node.outgoing.iter().copied().find(|id| {
            self.transitions
                .get(id.0)
                .is_some_and(|t| !t.is_timeout() && !t.is_epsilon() && t.matches(event))
        })
    }

    fn process_in_state(&mut self, event: &Event) -> Result<bool, FsmError> {
        match self.find_transition(self.current, event) {
            Some(id) => {
                self.fire(id, event)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn fire(&mut self, id: TransitionId, event: &Event) -> Result<(), FsmError> {
        if self.sub_fsm_mut(id).is_some() {
            return self.enter_sub_fsm(id, event);
        }
        self.stop_current_timeout();
        let Some(transition) = self.transitions.get_mut(id.0) else {
            return Ok(());
        };
        transition.run_action(event);
        let (source, target) = (transition.source, transition.target);
        trace!(fsm = %self.name, event = %event.event_type(), "transition fired");
        self.exit_state(source)?;
        self.enter_state(target, event)
    }

    fn enter_sub_fsm(&mut self, id: TransitionId, event: &Event) -> Result<(), FsmError> {
        self.stop_current_timeout();
        self.current_sub_fsm = Some(id);
        self.sub_exited = false;
        if let Some(sub) = self.sub_fsm_mut(id) {
            sub.process(event)?;
        }
        self.handle_sub_signals(id, event)
    }

    fn process_in_sub_fsm(&mut self, id: TransitionId, event: &Event) -> Result<bool, FsmError> {
        let processed = match self.sub_fsm_mut(id) {
            Some(sub) => sub.process(event)?,
            None => false,
        };
        self.handle_sub_signals(id, event)?;
        Ok(processed)
    }

    /// Mirror the sub-FSM's lifecycle onto this FSM.
    fn handle_sub_signals(&mut self, id: TransitionId, event: &Event) -> Result<(), FsmError> {
        let Some(transition) = self.transitions.get_mut(id.0) else {
            return Ok(());
        };
        let (source, target) = (transition.source, transition.target);
        let signals = transition
            .sub_fsm_mut()
            .map(Fsm::take_signals)
            .unwrap_or_default();

        for signal in signals {
            if self.current_sub_fsm != Some(id) {
                break;
            }
            match signal {
                Lifecycle::Starts => self.exit_delegating_state(source)?,
                Lifecycle::Updates => self.on_updating()?,
                Lifecycle::Stops => {
                    self.exit_delegating_state(source)?;
                    self.current_sub_fsm = None;
                    self.enter_state(target, event)?;
                }
                Lifecycle::Cancels => {
                    self.current_sub_fsm = None;
                    self.on_cancelling()?;
                }
            }
        }
        Ok(())
    }

    fn exit_delegating_state(&mut self, source: StateId) -> Result<(), FsmError> {
        if !self.sub_exited {
            self.sub_exited = true;
            self.exit_state(source)?;
        }
        Ok(())
    }

    fn exit_state(&mut self, state: StateId) -> Result<(), FsmError> {
        match self.kind_of(state) {
            Some(StateKind::Init) => self.check_starting_state(state),
            _ => Ok(()),
        }
    }

    fn enter_state(&mut self, state: StateId, event: &Event) -> Result<(), FsmError> {
        match self.kind_of(state) {
            Some(StateKind::Std) => {
                self.check_starting_state(state)?;
                self.set_current(state);
                self.check_timeout_transition();
                self.on_updating()?;
                self.follow_epsilon(state, event)
            }
            Some(StateKind::Terminal) => {
                self.check_starting_state(state)?;
                self.on_terminating()
            }
            Some(StateKind::Cancelling) => self.on_cancelling(),
            Some(StateKind::Init) | None => {
                self.reinit();
                Ok(())
            }
        }
    }

    /// Take the first epsilon transition of `state` whose guard holds.
    ///
    /// `event` is the one that led into `state`; it is passed to the
    /// epsilon's guard and action but not consumed again.
    fn follow_epsilon(&mut self, state: StateId, event: &Event) -> Result<(), FsmError> {
        let Some(id) = self.find_epsilon(state, event) else {
            return Ok(());
        };
        if self.epsilon_depth >= self.states.len() {
            warn!(fsm = %self.name, "epsilon cycle, staying in the current state");
            return Ok(());
        }
        self.epsilon_depth += 1;
        let outcome = self.fire(id, event);
        self.epsilon_depth -= 1;
        outcome
    }

    fn find_epsilon(&self, state: StateId, event: &Event) -> Option<TransitionId> {
        let node = self.states.get(state.0)?;
        node.outgoing.iter().copied().find(|id| {
            self.transitions
                .get(id.0)
                .is_some_and(|t| t.is_epsilon() && t.is_guard_ok(event))
        })
    }

    fn check_starting_state(&mut self, state: StateId) -> Result<(), FsmError> {
        if !self.started && self.starting_state == state {
            self.on_starting()
        } else {
            Ok(())
        }
    }

    fn on_starting(&mut self) -> Result<(), FsmError> {
        self.started = true;
        debug!(fsm = %self.name, "interaction starts");
        self.notify(Lifecycle::Starts)
    }

    fn on_updating(&mut self) -> Result<(), FsmError> {
        if self.started {
            self.notify(Lifecycle::Updates)
        } else {
            Ok(())
        }
    }

    fn on_terminating(&mut self) -> Result<(), FsmError> {
        let notified = if self.started || self.is_inner() {
            debug!(fsm = %self.name, "interaction stops");
            self.notify(Lifecycle::Stops)
        } else {
            Ok(())
        };
        // Reinitialise even when a handler failed.
        self.reinit();
        notified?;
        if !self.is_inner() {
            self.process_remaining_events()?;
        }
        Ok(())
    }

    fn notify(&mut self, event: Lifecycle) -> Result<(), FsmError> {
        match self.notifier.notify(event)? {
            Flow::Continue => Ok(()),
            Flow::Cancel => {
                self.on_cancelling()?;
                Err(self.cancelled())
            }
        }
    }

    fn cancelled(&self) -> FsmError {
        FsmError::Cancelled {
            fsm: self.name.clone(),
        }
    }

    /// Replay the events queued before this call, oldest first.
    ///
    /// Runs as a bounded work queue: events queued again while replaying
    /// wait for the next stop, and a stop reached during the replay does
    /// not start a nested replay.
    fn process_remaining_events(&mut self) -> Result<(), FsmError> {
        if self.replaying {
            return Ok(());
        }
        self.replaying = true;
        let mut budget = self.events_to_process.len();
        let mut outcome = Ok(());
        while budget > 0 {
            let Some(event) = self.events_to_process.pop_front() else {
                break;
            };
            budget -= 1;
            trace!(fsm = %self.name, event = %event.event_type(), "replaying event");
            if let Err(error) = self.process(&event) {
                outcome = Err(error);
                break;
            }
        }
        self.replaying = false;
        outcome
    }

    fn check_timeout_transition(&mut self) {
        let Some(node) = self.states.get(self.current.0) else {
            return;
        };
        let timeout = node.outgoing.iter().copied().find_map(|id| {
            self.transitions
                .get(id.0)
                .and_then(Transition::timeout_delay)
                .map(|delay| (id, delay))
        });
        if let Some((transition, delay)) = timeout {
            self.stop_current_timeout();
            let timer = self.timers.schedule(delay);
            trace!(fsm = %self.name, %timer, ?delay, "timeout armed");
            self.current_timeout = Some(ArmedTimeout { transition, timer });
        }
    }

    fn stop_current_timeout(&mut self) {
        if let Some(armed) = self.current_timeout.take() {
            trace!(fsm = %self.name, timer = %armed.timer, "timeout disarmed");
            self.timers.cancel(armed.timer);
        }
    }

    fn reset_to_init(&mut self) {
        self.stop_current_timeout();
        self.started = false;
        self.current_sub_fsm = None;
        self.sub_exited = false;
        self.set_current(StateId::INIT);
        if let Some(data) = self.data_handler.as_ref().and_then(Weak::upgrade) {
            match data.try_borrow_mut() {
                Ok(mut data) => data.reinit_data(),
                Err(_) => warn!(fsm = %self.name, "interaction data busy, not reinitialised"),
            }
        }
    }

    fn set_current(&mut self, state: StateId) {
        let old = self.current;
        self.current = state;
        if old == state {
            return;
        }
        if let (Some(from), Some(to)) = (self.states.get(old.0), self.states.get(state.0)) {
            trace!(fsm = %self.name, from = %from.name, to = %to.name, "state changed");
            for observer in &mut self.observers {
                observer(&from.name, &to.name);
            }
        }
    }

    fn remove_key_event(&mut self, code: &str) {
        self.events_to_process
            .retain(|e| !matches!(e, Event::KeyDown(key) if key.code == code));
    }

    fn is_key_queued(&self, code: &str) -> bool {
        self.events_to_process
            .iter()
            .any(|e| matches!(e, Event::KeyDown(key) if key.code == code))
    }

    fn kind_of(&self, state: StateId) -> Option<StateKind> {
        self.states.get(state.0).map(StateNode::kind)
    }

    fn delegated(&self) -> Option<&Fsm> {
        self.current_sub_fsm
            .and_then(|id| self.transitions.get(id.0))
            .and_then(Transition::sub_fsm)
    }

    fn sub_fsm_mut(&mut self, id: TransitionId) -> Option<&mut Fsm> {
        self.transitions
            .get_mut(id.0)
            .and_then(Transition::sub_fsm_mut)
    }
}

impl Recognizer for Fsm {
    fn name(&self) -> &str {
        Fsm::name(self)
    }

    fn fingerprint(&self) -> String {
        Fsm::fingerprint(self)
    }

    fn process(&mut self, event: &Event) -> Result<bool, FsmError> {
        Fsm::process(self, event)
    }

    fn on_timeout(&mut self, timer: TimerId) -> Result<bool, FsmError> {
        Fsm::on_timeout(self, timer)
    }

    fn is_started(&self) -> bool {
        Fsm::is_started(self)
    }

    fn reinit(&mut self) {
        Fsm::reinit(self);
    }

    fn full_reinit(&mut self) {
        Fsm::full_reinit(self);
    }

    fn accepted_events(&self) -> BTreeSet<EventType> {
        Fsm::accepted_events(self)
    }

    fn add_handler(&mut self, handler: SharedHandler) {
        Fsm::add_handler(self, handler);
    }

    fn set_data_handler(&mut self, handler: Weak<RefCell<dyn FsmDataHandler>>) {
        Fsm::set_data_handler(self, handler);
    }

    fn set_inner(&mut self, inner: bool) {
        Fsm::set_inner(self, inner);
    }

    fn take_signals(&mut self) -> Vec<Lifecycle> {
        Fsm::take_signals(self)
    }

    fn uninstall(&mut self) {
        Fsm::uninstall(self);
    }
}

impl fmt::Debug for Fsm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fsm")
            .field("name", &self.name)
            .field("current", &self.current_state_name())
            .field("started", &self.started)
            .field("states", &self.states.len())
            .field("transitions", &self.transitions.len())
            .field("pending_events", &self.events_to_process.len())
            .finish()
    }
}
