//! Combinators running several recognizers over one event stream.
//!
//! Members are switched to inner mode: instead of notifying handlers they
//! buffer their lifecycle signals, which the combinator drains after each
//! routed event and maps onto its own lifecycle. Combinators are
//! [`Recognizer`]s themselves, so they nest.
//!
//! - [`AndFsm`]: starts once every member has started, stops once every
//!   member has stopped.
//! - [`OrFsm`]: the first member to start wins; the others are reset and
//!   ignored until the winner stops or cancels. [`OrFsm::xor`] rejects
//!   structurally identical members.
//! - [`NotFsm`]: a start of the negated member cancels the running primary.
//! - [`ThenFsm`]: members run one after the other.

use crate::event::{Event, EventType};
use crate::fsm::handler::{Flow, FsmDataHandler, Lifecycle, Notifier};
use crate::fsm::{BuildError, FsmError, Recognizer, TimerId};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Weak;
use tracing::{debug, warn};

/// Implements [`Recognizer`] for a combinator holding a `core: Composite`
/// and providing `kind`, `route`, `route_timeout` and `live_events`.
macro_rules! impl_recognizer {
    ($ty:ty) => {
        impl $crate::fsm::Recognizer for $ty {
            fn name(&self) -> &str {
                self.core.name()
            }

            fn fingerprint(&self) -> String {
                self.core.fingerprint(self.kind())
            }

            fn process(
                &mut self,
                event: &$crate::event::Event,
            ) -> Result<bool, $crate::fsm::FsmError> {
                if self.core.is_uninstalled() {
                    return Ok(false);
                }
                self.route(event)
            }

            fn on_timeout(
                &mut self,
                timer: $crate::fsm::TimerId,
            ) -> Result<bool, $crate::fsm::FsmError> {
                if self.core.is_uninstalled() {
                    return Ok(false);
                }
                self.route_timeout(timer)
            }

            fn is_started(&self) -> bool {
                self.core.is_started()
            }

            fn reinit(&mut self) {
                self.core.reset();
            }

            fn full_reinit(&mut self) {
                self.core.reset();
            }

            fn accepted_events(&self) -> std::collections::BTreeSet<$crate::event::EventType> {
                self.live_events()
            }

            fn add_handler(&mut self, handler: $crate::fsm::SharedHandler) {
                self.core.notifier.add_handler(handler);
            }

            fn set_data_handler(
                &mut self,
                handler: std::rc::Weak<std::cell::RefCell<dyn $crate::fsm::FsmDataHandler>>,
            ) {
                self.core.data_handler = Some(handler);
            }

            fn set_inner(&mut self, inner: bool) {
                self.core.notifier.set_inner(inner);
            }

            fn take_signals(&mut self) -> Vec<$crate::fsm::Lifecycle> {
                self.core.notifier.take_signals()
            }

            fn uninstall(&mut self) {
                self.core.uninstall();
            }
        }

        impl std::fmt::Debug for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($ty))
                    .field("name", &self.core.name)
                    .field("members", &self.core.members.len())
                    .field("started", &self.core.started)
                    .finish()
            }
        }
    };
}

mod and;
mod not;
mod or;
mod then;

pub use and::AndFsm;
pub use not::NotFsm;
pub use or::OrFsm;
pub use then::ThenFsm;

/// Per-member progress within the current combinator cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct MemberMark {
    started: bool,
    stopped: bool,
}

/// State shared by every combinator.
struct Composite {
    name: String,
    members: Vec<Box<dyn Recognizer>>,
    marks: Vec<MemberMark>,
    /// The member events are routed to, when only one is live.
    focus: Option<usize>,
    notifier: Notifier,
    started: bool,
    data_handler: Option<Weak<RefCell<dyn FsmDataHandler>>>,
    uninstalled: bool,
}

impl Composite {
    fn new(separator: &str, mut members: Vec<Box<dyn Recognizer>>) -> Self {
        for member in &mut members {
            member.set_inner(true);
        }
        let name = members
            .iter()
            .map(|m| m.name())
            .collect::<Vec<_>>()
            .join(separator);
        Self {
            name,
            marks: vec![MemberMark::default(); members.len()],
            members,
            focus: None,
            notifier: Notifier::default(),
            started: false,
            data_handler: None,
            uninstalled: false,
        }
    }

    fn require(
        combinator: &'static str,
        members: &[Box<dyn Recognizer>],
        required: usize,
    ) -> Result<(), BuildError> {
        if members.len() < required {
            return Err(BuildError::TooFewMembers {
                combinator,
                required,
                found: members.len(),
            });
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_started(&self) -> bool {
        self.started
    }

    fn is_uninstalled(&self) -> bool {
        self.uninstalled
    }

    fn len(&self) -> usize {
        self.members.len()
    }

    fn fingerprint(&self, kind: &str) -> String {
        let members = self
            .members
            .iter()
            .map(|m| m.fingerprint())
            .collect::<Vec<_>>()
            .join(",");
        format!("{kind}({members})")
    }

    fn events_of<I>(&self, indices: I) -> BTreeSet<EventType>
    where
        I: IntoIterator<Item = usize>,
    {
        indices
            .into_iter()
            .filter_map(|i| self.members.get(i))
            .flat_map(|m| m.accepted_events())
            .collect()
    }

    /// Feed one member, then hand its buffered signals to `on_signal`.
    fn feed<F>(&mut self, index: usize, event: &Event, on_signal: F) -> Result<bool, FsmError>
    where
        F: FnMut(&mut Composite, usize, Lifecycle) -> Result<(), FsmError>,
    {
        let processed = match self.members.get_mut(index) {
            Some(member) => member.process(event)?,
            None => return Ok(false),
        };
        self.dispatch(index, on_signal)?;
        Ok(processed)
    }

    fn feed_timeout<F>(&mut self, index: usize, timer: TimerId, on_signal: F) -> Result<bool, FsmError>
    where
        F: FnMut(&mut Composite, usize, Lifecycle) -> Result<(), FsmError>,
    {
        let fired = match self.members.get_mut(index) {
            Some(member) => member.on_timeout(timer)?,
            None => return Ok(false),
        };
        self.dispatch(index, on_signal)?;
        Ok(fired)
    }

    fn dispatch<F>(&mut self, index: usize, mut on_signal: F) -> Result<(), FsmError>
    where
        F: FnMut(&mut Composite, usize, Lifecycle) -> Result<(), FsmError>,
    {
        let signals = self
            .members
            .get_mut(index)
            .map(|m| m.take_signals())
            .unwrap_or_default();
        for signal in signals {
            on_signal(self, index, signal)?;
        }
        Ok(())
    }

    fn all_marked(&self, mark: impl Fn(&MemberMark) -> bool) -> bool {
        self.marks.iter().all(mark)
    }

    fn mark(&mut self, index: usize) -> Option<&mut MemberMark> {
        self.marks.get_mut(index)
    }

    fn reset_member(&mut self, index: usize) {
        if let Some(member) = self.members.get_mut(index) {
            member.full_reinit();
            member.take_signals();
        }
        if let Some(mark) = self.marks.get_mut(index) {
            *mark = MemberMark::default();
        }
    }

    fn start(&mut self) -> Result<(), FsmError> {
        self.started = true;
        debug!(combinator = %self.name, "interaction starts");
        self.notify(Lifecycle::Starts)
    }

    fn update(&mut self) -> Result<(), FsmError> {
        if self.started {
            self.notify(Lifecycle::Updates)
        } else {
            Ok(())
        }
    }

    fn stop(&mut self) -> Result<(), FsmError> {
        if self.started || self.notifier.is_inner() {
            debug!(combinator = %self.name, "interaction stops");
            self.notify(Lifecycle::Stops)?;
        }
        self.reset();
        Ok(())
    }

    fn cancel(&mut self) -> Result<(), FsmError> {
        let outcome = if self.started || self.notifier.is_inner() {
            debug!(combinator = %self.name, "interaction cancelled");
            self.notifier.notify(Lifecycle::Cancels)
        } else {
            Ok(Flow::Continue)
        };
        self.reset();
        match outcome? {
            Flow::Continue => Ok(()),
            Flow::Cancel => Err(self.cancelled()),
        }
    }

    fn notify(&mut self, event: Lifecycle) -> Result<(), FsmError> {
        match self.notifier.notify(event)? {
            Flow::Continue => Ok(()),
            Flow::Cancel => {
                self.cancel()?;
                Err(self.cancelled())
            }
        }
    }

    fn cancelled(&self) -> FsmError {
        FsmError::Cancelled {
            fsm: self.name.clone(),
        }
    }

    /// Every member back to its initial state, progress forgotten.
    fn reset(&mut self) {
        for index in 0..self.members.len() {
            self.reset_member(index);
        }
        self.focus = None;
        self.started = false;
        if let Some(data) = self.data_handler.as_ref().and_then(Weak::upgrade) {
            match data.try_borrow_mut() {
                Ok(mut data) => data.reinit_data(),
                Err(_) => warn!(combinator = %self.name, "interaction data busy, not reinitialised"),
            }
        }
    }

    fn uninstall(&mut self) {
        self.reset();
        for member in &mut self.members {
            member.uninstall();
        }
        self.members.clear();
        self.marks.clear();
        self.notifier.clear_handlers();
        self.notifier.clear_signals();
        self.data_handler = None;
        self.uninstalled = true;
    }
}
