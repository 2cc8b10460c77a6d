use super::Composite;
use crate::event::{Event, EventType};
use crate::fsm::{BuildError, FsmError, Lifecycle, Recognizer, TimerId};
use std::collections::{BTreeSet, HashSet};

/// Competing recognizers: the first member to start claims the interaction.
///
/// Until some member starts, events are offered to every member in order.
/// The first to start becomes the winner: the other members are reset and
/// events only reach the winner until it stops or cancels, after which any
/// member may race again.
pub struct OrFsm {
    core: Composite,
    exclusive: bool,
}

impl OrFsm {
    pub fn new(members: Vec<Box<dyn Recognizer>>) -> Result<Self, BuildError> {
        Composite::require("OR", &members, 2)?;
        Ok(Self {
            core: Composite::new(" | ", members),
            exclusive: false,
        })
    }

    /// Exclusive variant; members must be structurally distinct, otherwise
    /// which one recognised the interaction would be ambiguous.
    pub fn xor(members: Vec<Box<dyn Recognizer>>) -> Result<Self, BuildError> {
        Composite::require("XOR", &members, 2)?;
        let mut seen = HashSet::new();
        for member in &members {
            if !seen.insert(member.fingerprint()) {
                return Err(BuildError::AmbiguousXor {
                    name: member.name().to_string(),
                });
            }
        }
        Ok(Self {
            core: Composite::new(" ^ ", members),
            exclusive: true,
        })
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    /// Index of the member that claimed the running interaction.
    pub fn winner(&self) -> Option<usize> {
        self.core.focus
    }

    fn route(&mut self, event: &Event) -> Result<bool, FsmError> {
        if let Some(winner) = self.core.focus {
            return self.core.feed(winner, event, Self::on_signal);
        }
        let mut processed = false;
        for index in 0..self.core.len() {
            processed |= self.core.feed(index, event, Self::on_signal)?;
            if self.core.focus.is_some() {
                break;
            }
        }
        Ok(processed)
    }

    fn route_timeout(&mut self, timer: TimerId) -> Result<bool, FsmError> {
        if let Some(winner) = self.core.focus {
            return self.core.feed_timeout(winner, timer, Self::on_signal);
        }
        for index in 0..self.core.len() {
            if self.core.feed_timeout(index, timer, Self::on_signal)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn live_events(&self) -> BTreeSet<EventType> {
        match self.core.focus {
            Some(winner) => self.core.events_of([winner]),
            None => self.core.events_of(0..self.core.len()),
        }
    }

    fn on_signal(core: &mut Composite, index: usize, signal: Lifecycle) -> Result<(), FsmError> {
        let is_winner = core.focus == Some(index);
        match signal {
            Lifecycle::Starts if core.focus.is_none() => {
                core.focus = Some(index);
                for other in (0..core.len()).filter(|i| *i != index) {
                    core.reset_member(other);
                }
                core.start()
            }
            Lifecycle::Starts | Lifecycle::Updates if is_winner => core.update(),
            Lifecycle::Stops if is_winner => core.stop(),
            Lifecycle::Cancels if is_winner => core.cancel(),
            _ => Ok(()),
        }
    }

    fn kind(&self) -> &'static str {
        if self.exclusive {
            "xor"
        } else {
            "or"
        }
    }
}

impl_recognizer!(OrFsm);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combinator::testing::{down, key, press, recorder, up};
    use crate::fsm::VirtualTimers;

    fn either() -> OrFsm {
        let timers = VirtualTimers::shared();
        OrFsm::new(vec![
            press("press", 1, timers.clone()),
            key("enter", "Enter", timers),
        ])
        .unwrap()
    }

    #[test]
    fn first_member_to_start_wins() {
        let mut or = either();
        let log = recorder();
        or.add_handler(log.clone());

        or.process(&down(1)).unwrap();
        assert_eq!(or.winner(), Some(0));
        assert!(or.is_started());

        // The other member is ignored while the winner runs.
        assert!(!or.process(&Event::key_down("Enter")).unwrap());
        assert_eq!(log.borrow().seen, vec![Lifecycle::Starts, Lifecycle::Updates]);

        or.process(&up(1)).unwrap();
        assert_eq!(log.borrow().seen.last(), Some(&Lifecycle::Stops));
        assert_eq!(or.winner(), None);
    }

    #[test]
    fn any_member_may_race_again_after_stop() {
        let mut or = either();
        let log = recorder();
        or.add_handler(log.clone());

        or.process(&down(1)).unwrap();
        or.process(&up(1)).unwrap();
        or.process(&Event::key_down("Enter")).unwrap();

        assert_eq!(
            log.borrow().seen,
            vec![
                Lifecycle::Starts,
                Lifecycle::Updates,
                Lifecycle::Stops,
                Lifecycle::Starts,
                Lifecycle::Stops
            ]
        );
    }

    #[test]
    fn winner_cancel_resets_everything() {
        let mut or = either();
        let log = recorder();
        or.add_handler(log.clone());

        or.process(&down(1)).unwrap();
        or.process(&Event::key_down("Escape")).unwrap();

        assert_eq!(log.borrow().seen.last(), Some(&Lifecycle::Cancels));
        assert!(!or.is_started());
        assert_eq!(or.accepted_events().len(), 2);
    }

    #[test]
    fn xor_rejects_identical_members() {
        let timers = VirtualTimers::shared();
        let result = OrFsm::xor(vec![
            press("press", 1, timers.clone()),
            press("press", 1, timers.clone()),
        ]);
        assert!(matches!(result, Err(BuildError::AmbiguousXor { name }) if name == "press"));

        let renamed = OrFsm::xor(vec![
            press("left", 1, timers.clone()),
            press("other-left", 1, timers.clone()),
        ]);
        assert!(matches!(renamed, Err(BuildError::AmbiguousXor { name }) if name == "other-left"));

        let buttons = OrFsm::xor(vec![
            press("press", 1, timers.clone()),
            press("press", 2, timers.clone()),
        ]);
        assert!(buttons.is_ok());

        let distinct = OrFsm::xor(vec![
            press("press", 1, timers.clone()),
            key("enter", "Enter", timers),
        ])
        .unwrap();
        assert!(distinct.is_exclusive());
        assert!(distinct.fingerprint().starts_with("xor("));
    }
}
