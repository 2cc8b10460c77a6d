//! Timers backing timeout transitions.
//!
//! An FSM arms at most one timer at a time, for the timeout transition of
//! its current state. When the timer fires the host delivers its id back
//! through `on_timeout`; ids that are no longer armed are ignored.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// Identifier of a scheduled timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// Scheduling contract between FSMs and the host's event loop.
pub trait TimerService {
    fn schedule(&self, delay: Duration) -> TimerId;
    fn cancel(&self, timer: TimerId);
}

/// Timer service shared by every FSM of an interaction tree.
pub type SharedTimers = Rc<dyn TimerService>;

/// Deterministic virtual clock.
///
/// Nothing fires on its own: [`VirtualTimers::advance`] moves the clock and
/// returns the timers that became due, in deadline order.
///
/// # Example
///
/// ```rust
/// use interacto::fsm::{TimerService, VirtualTimers};
/// use std::time::Duration;
///
/// let timers = VirtualTimers::new();
/// let id = timers.schedule(Duration::from_millis(300));
///
/// assert!(timers.advance(Duration::from_millis(299)).is_empty());
/// assert_eq!(timers.advance(Duration::from_millis(1)), vec![id]);
/// ```
#[derive(Default)]
pub struct VirtualTimers {
    now: Cell<Duration>,
    next_id: Cell<u64>,
    pending: RefCell<BTreeMap<TimerId, Duration>>,
    scheduled: Cell<usize>,
    cancelled: Cell<usize>,
}

impl VirtualTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle, ready to be given to FSM builders.
    pub fn shared() -> Rc<Self> {
        Rc::new(Self::new())
    }

    /// Elapsed virtual time.
    pub fn now(&self) -> Duration {
        self.now.get()
    }

    /// Move the clock forward and return the timers that became due.
    pub fn advance(&self, by: Duration) -> Vec<TimerId> {
        let now = self.now.get() + by;
        self.now.set(now);
        let mut pending = self.pending.borrow_mut();
        let mut due: Vec<(Duration, TimerId)> = pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, deadline)| (*deadline, *id))
            .collect();
        due.sort();
        for (_, id) in &due {
            pending.remove(id);
        }
        due.into_iter().map(|(_, id)| id).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_pending(&self, timer: TimerId) -> bool {
        self.pending.borrow().contains_key(&timer)
    }

    /// Total number of timers ever scheduled.
    pub fn scheduled_count(&self) -> usize {
        self.scheduled.get()
    }

    /// Total number of pending timers that were cancelled.
    pub fn cancelled_count(&self) -> usize {
        self.cancelled.get()
    }
}

impl TimerService for VirtualTimers {
    fn schedule(&self, delay: Duration) -> TimerId {
        let id = TimerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.pending.borrow_mut().insert(id, self.now.get() + delay);
        self.scheduled.set(self.scheduled.get() + 1);
        id
    }

    fn cancel(&self, timer: TimerId) {
        if self.pending.borrow_mut().remove(&timer).is_some() {
            self.cancelled.set(self.cancelled.get() + 1);
        }
    }
}

impl fmt::Debug for VirtualTimers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualTimers")
            .field("now", &self.now.get())
            .field("pending", &self.pending.borrow().len())
            .finish()
    }
}
