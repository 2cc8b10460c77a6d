use super::Composite;
use crate::event::{Event, EventType};
use crate::fsm::{FsmError, Lifecycle, Recognizer, TimerId};
use std::collections::BTreeSet;

const PRIMARY: usize = 0;
const NEGATED: usize = 1;

/// A primary recognizer that a second one can veto.
///
/// Events drive the primary. While it is running, each event is first
/// offered to the negated recognizer; if that one starts, the running
/// interaction is cancelled. The negated recognizer is inert while the
/// primary is idle.
pub struct NotFsm {
    core: Composite,
}

impl NotFsm {
    pub fn new(primary: Box<dyn Recognizer>, negated: Box<dyn Recognizer>) -> Self {
        Self {
            core: Composite::new(" ! ", vec![primary, negated]),
        }
    }

    fn route(&mut self, event: &Event) -> Result<bool, FsmError> {
        if self.core.is_started() {
            self.core.feed(NEGATED, event, Self::on_signal)?;
            if !self.core.is_started() {
                return Ok(true);
            }
        }
        self.core.feed(PRIMARY, event, Self::on_signal)
    }

    fn route_timeout(&mut self, timer: TimerId) -> Result<bool, FsmError> {
        if self.core.is_started() && self.core.feed_timeout(NEGATED, timer, Self::on_signal)? {
            return Ok(true);
        }
        self.core.feed_timeout(PRIMARY, timer, Self::on_signal)
    }

    fn live_events(&self) -> BTreeSet<EventType> {
        if self.core.is_started() {
            self.core.events_of([PRIMARY, NEGATED])
        } else {
            self.core.events_of([PRIMARY])
        }
    }

    fn on_signal(core: &mut Composite, index: usize, signal: Lifecycle) -> Result<(), FsmError> {
        match (index, signal) {
            (PRIMARY, Lifecycle::Starts) => core.start(),
            (PRIMARY, Lifecycle::Updates) => core.update(),
            (PRIMARY, Lifecycle::Stops) => core.stop(),
            (PRIMARY, Lifecycle::Cancels) => core.cancel(),
            (_, Lifecycle::Starts) if core.is_started() => core.cancel(),
            _ => Ok(()),
        }
    }

    fn kind(&self) -> &'static str {
        "not"
    }
}

impl_recognizer!(NotFsm);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combinator::testing::{down, key, press, recorder, up};
    use crate::fsm::VirtualTimers;

    fn press_unless_shift() -> NotFsm {
        let timers = VirtualTimers::shared();
        NotFsm::new(press("press", 1, timers.clone()), key("shift", "Shift", timers))
    }

    #[test]
    fn negated_start_cancels_running_primary() {
        let mut not = press_unless_shift();
        let log = recorder();
        not.add_handler(log.clone());

        not.process(&down(1)).unwrap();
        assert!(not.is_started());
        assert!(not.accepted_events().contains(&EventType::KeyDown));

        assert!(not.process(&Event::key_down("Shift")).unwrap());

        assert_eq!(
            log.borrow().seen,
            vec![Lifecycle::Starts, Lifecycle::Updates, Lifecycle::Cancels]
        );
        assert!(!not.is_started());
        // The primary was reset too: releasing does nothing.
        assert!(!not.process(&up(1)).unwrap());
    }

    #[test]
    fn negated_is_inert_while_primary_idle() {
        let mut not = press_unless_shift();
        let log = recorder();
        not.add_handler(log.clone());

        assert!(!not.process(&Event::key_down("Shift")).unwrap());
        not.process(&down(1)).unwrap();
        not.process(&up(1)).unwrap();

        assert_eq!(
            log.borrow().seen,
            vec![Lifecycle::Starts, Lifecycle::Updates, Lifecycle::Stops]
        );
    }
}
