//! Lifecycle observers of interaction FSMs.

use crate::fsm::error::FsmError;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

/// Outcome of a lifecycle callback.
///
/// `Cancel` asks the notifying FSM to abort the current interaction: the
/// FSM cancels itself and `process` returns [`FsmError::Cancelled`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Cancel,
}

/// The four lifecycle notifications an FSM emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lifecycle {
    Starts,
    Updates,
    Stops,
    Cancels,
}

/// Observer of an FSM's interaction lifecycle.
///
/// All methods default to `Ok(Flow::Continue)`, so implementors only write
/// the notifications they care about. Errors other than a `Flow::Cancel`
/// are propagated unchanged to the caller of `process`.
pub trait FsmHandler {
    fn fsm_starts(&mut self) -> Result<Flow, FsmError> {
        Ok(Flow::Continue)
    }

    fn fsm_updates(&mut self) -> Result<Flow, FsmError> {
        Ok(Flow::Continue)
    }

    fn fsm_stops(&mut self) -> Result<Flow, FsmError> {
        Ok(Flow::Continue)
    }

    fn fsm_cancels(&mut self) -> Result<Flow, FsmError> {
        Ok(Flow::Continue)
    }
}

/// Handler shared between an FSM and the code that owns it.
pub type SharedHandler = Rc<RefCell<dyn FsmHandler>>;

/// Capability to clear the transient payload of an interaction.
///
/// FSMs hold it weakly and call it every time they go back to their
/// initial state.
pub trait FsmDataHandler {
    fn reinit_data(&mut self);
}

impl FsmDataHandler for () {
    fn reinit_data(&mut self) {}
}

/// Dispatches lifecycle notifications to handlers, or buffers them when
/// the machine is embedded inside another one.
#[derive(Default)]
pub(crate) struct Notifier {
    handlers: Vec<SharedHandler>,
    inner: bool,
    signals: Vec<Lifecycle>,
}

impl Notifier {
    pub(crate) fn add_handler(&mut self, handler: SharedHandler) {
        self.handlers.push(handler);
    }

    pub(crate) fn clear_handlers(&mut self) {
        self.handlers.clear();
    }

    pub(crate) fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub(crate) fn is_inner(&self) -> bool {
        self.inner
    }

    pub(crate) fn set_inner(&mut self, inner: bool) {
        self.inner = inner;
    }

    pub(crate) fn take_signals(&mut self) -> Vec<Lifecycle> {
        std::mem::take(&mut self.signals)
    }

    pub(crate) fn clear_signals(&mut self) {
        self.signals.clear();
    }

    /// Notify handlers in registration order.
    ///
    /// A `Flow::Cancel` stops the notification of the remaining handlers,
    /// except for `Cancels` which always reaches every handler.
    pub(crate) fn notify(&mut self, event: Lifecycle) -> Result<Flow, FsmError> {
        if self.inner {
            self.signals.push(event);
            return Ok(Flow::Continue);
        }
        let handlers = self.handlers.clone();
        let mut outcome = Flow::Continue;
        for handler in handlers {
            let mut observer = handler.borrow_mut();
            let flow = match event {
                Lifecycle::Starts => observer.fsm_starts()?,
                Lifecycle::Updates => observer.fsm_updates()?,
                Lifecycle::Stops => observer.fsm_stops()?,
                Lifecycle::Cancels => observer.fsm_cancels()?,
            };
            if flow == Flow::Cancel {
                outcome = Flow::Cancel;
                if event != Lifecycle::Cancels {
                    break;
                }
            }
        }
        Ok(outcome)
    }
}
