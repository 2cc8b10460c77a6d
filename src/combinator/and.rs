use super::Composite;
use crate::event::{Event, EventType};
use crate::fsm::{BuildError, FsmError, Lifecycle, Recognizer, TimerId};
use std::collections::BTreeSet;

/// Concurrent recognizers that must all take part.
///
/// An event goes to the members in order until one of them processes it.
/// The combinator starts once every member has started, and stops once
/// every member has stopped during the cycle. A member cancelling after
/// the start cancels the whole combinator.
pub struct AndFsm {
    core: Composite,
}

impl AndFsm {
    pub fn new(members: Vec<Box<dyn Recognizer>>) -> Result<Self, BuildError> {
        Composite::require("AND", &members, 2)?;
        Ok(Self {
            core: Composite::new(" & ", members),
        })
    }

    /// Number of members that have started in the current cycle.
    pub fn started_members(&self) -> usize {
        self.core.marks.iter().filter(|m| m.started).count()
    }

    fn route(&mut self, event: &Event) -> Result<bool, FsmError> {
        for index in 0..self.core.len() {
            if self.core.feed(index, event, Self::on_signal)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn route_timeout(&mut self, timer: TimerId) -> Result<bool, FsmError> {
        for index in 0..self.core.len() {
            if self.core.feed_timeout(index, timer, Self::on_signal)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn live_events(&self) -> BTreeSet<EventType> {
        self.core.events_of(0..self.core.len())
    }

    fn kind(&self) -> &'static str {
        "and"
    }

    fn on_signal(core: &mut Composite, index: usize, signal: Lifecycle) -> Result<(), FsmError> {
        match signal {
            Lifecycle::Starts => {
                if let Some(mark) = core.mark(index) {
                    mark.started = true;
                    mark.stopped = false;
                }
                if core.is_started() {
                    core.update()
                } else if core.all_marked(|m| m.started) {
                    core.start()
                } else {
                    Ok(())
                }
            }
            Lifecycle::Updates => core.update(),
            Lifecycle::Stops => {
                if !core.is_started() {
                    if let Some(mark) = core.mark(index) {
                        mark.started = false;
                    }
                    return Ok(());
                }
                if let Some(mark) = core.mark(index) {
                    mark.stopped = true;
                }
                if core.all_marked(|m| m.stopped) {
                    core.stop()
                } else {
                    core.update()
                }
            }
            Lifecycle::Cancels => {
                if core.is_started() {
                    core.cancel()
                } else {
                    if let Some(mark) = core.mark(index) {
                        mark.started = false;
                    }
                    Ok(())
                }
            }
        }
    }
}

impl_recognizer!(AndFsm);
