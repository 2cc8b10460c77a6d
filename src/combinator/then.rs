use super::Composite;
use crate::event::{Event, EventType};
use crate::fsm::{BuildError, FsmError, Lifecycle, Recognizer, TimerId};
use std::collections::BTreeSet;

/// Recognizers run in sequence.
///
/// Only the current member receives events. The combinator starts when the
/// first member starts; each member stopping hands over to the next one,
/// and the last member stopping stops the combinator. Any cancellation
/// cancels the whole sequence.
pub struct ThenFsm {
    core: Composite,
}

impl ThenFsm {
    pub fn new(members: Vec<Box<dyn Recognizer>>) -> Result<Self, BuildError> {
        Composite::require("THEN", &members, 2)?;
        Ok(Self {
            core: Composite::new(" > ", members),
        })
    }

    /// Index of the member currently receiving events.
    pub fn current_member(&self) -> usize {
        self.core.focus.unwrap_or(0)
    }

    fn route(&mut self, event: &Event) -> Result<bool, FsmError> {
        let current = self.current_member();
        self.core.feed(current, event, Self::on_signal)
    }

    fn route_timeout(&mut self, timer: TimerId) -> Result<bool, FsmError> {
        let current = self.current_member();
        self.core.feed_timeout(current, timer, Self::on_signal)
    }

    fn live_events(&self) -> BTreeSet<EventType> {
        self.core.events_of([self.current_member()])
    }

    fn on_signal(core: &mut Composite, index: usize, signal: Lifecycle) -> Result<(), FsmError> {
        match signal {
            Lifecycle::Starts if index == 0 => core.start(),
            Lifecycle::Starts | Lifecycle::Updates => core.update(),
            Lifecycle::Stops if index + 1 == core.len() => core.stop(),
            Lifecycle::Stops => {
                if !core.is_started() {
                    core.start()?;
                }
                core.focus = Some(index + 1);
                core.update()
            }
            Lifecycle::Cancels => core.cancel(),
        }
    }

    fn kind(&self) -> &'static str {
        "then"
    }
}

impl_recognizer!(ThenFsm);
