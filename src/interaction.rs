//! Interactions: a recognizer plus the data it produces.

use crate::event::{Event, EventType};
use crate::fsm::{FsmDataHandler, FsmError, Recognizer, SharedHandler, TimerId};
use std::cell::{Ref, RefCell};
use std::collections::BTreeSet;
use std::rc::Rc;
use tracing::debug;

/// A user interaction: one recognizer and its typed payload.
///
/// The interaction owns the recognizer exclusively. The recognizer only
/// holds a weak reference to the payload, through which it clears the
/// payload every time it returns to its initial state.
///
/// # Example
///
/// ```rust
/// use interacto::event::{Event, EventType};
/// use interacto::fsm::{FsmBuilder, FsmDataHandler, TransitionBuilder, VirtualTimers};
/// use interacto::interaction::Interaction;
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// #[derive(Default)]
/// struct Clicks {
///     x: f64,
/// }
///
/// impl FsmDataHandler for Clicks {
///     fn reinit_data(&mut self) {
///         self.x = 0.0;
///     }
/// }
///
/// let data = Rc::new(RefCell::new(Clicks::default()));
/// let sink = data.clone();
/// let mut b = FsmBuilder::new("click", VirtualTimers::shared());
/// let pressed = b.std_state("pressed");
/// b.transition(
///     TransitionBuilder::new()
///         .from(b.init())
///         .to(pressed)
///         .on([EventType::MouseDown])
///         .action(move |e: &Event| {
///             sink.borrow_mut().x = e.as_mouse().map_or(0.0, |m| m.x);
///         }),
/// )
/// .unwrap();
///
/// let mut click = Interaction::new(Box::new(b.build().unwrap()), data);
/// click.process(&Event::mouse(EventType::MouseDown, 0, 12.0, 3.0)).unwrap();
///
/// assert!(click.is_running());
/// assert_eq!(click.data().x, 12.0);
/// ```
pub struct Interaction<D: FsmDataHandler + 'static> {
    recognizer: Box<dyn Recognizer>,
    data: Rc<RefCell<D>>,
    uninstalled: bool,
}

impl<D: FsmDataHandler + 'static> Interaction<D> {
    pub fn new(mut recognizer: Box<dyn Recognizer>, data: Rc<RefCell<D>>) -> Self {
        let shared: Rc<RefCell<dyn FsmDataHandler>> = data.clone();
        recognizer.set_data_handler(Rc::downgrade(&shared));
        Self {
            recognizer,
            data,
            uninstalled: false,
        }
    }

    pub fn name(&self) -> &str {
        self.recognizer.name()
    }

    /// Feed one event to the recognizer.
    pub fn process(&mut self, event: &Event) -> Result<bool, FsmError> {
        if self.uninstalled {
            return Err(FsmError::Uninstalled);
        }
        self.recognizer.process(event)
    }

    /// Deliver a fired timer to the recognizer.
    pub fn on_timeout(&mut self, timer: TimerId) -> Result<bool, FsmError> {
        if self.uninstalled {
            return Err(FsmError::Uninstalled);
        }
        self.recognizer.on_timeout(timer)
    }

    /// Current payload.
    pub fn data(&self) -> Ref<'_, D> {
        self.data.borrow()
    }

    /// Shared handle on the payload, for transition actions and bindings.
    pub fn shared_data(&self) -> Rc<RefCell<D>> {
        self.data.clone()
    }

    /// Event types the node-registration layer should listen to right now.
    pub fn accepted_events(&self) -> BTreeSet<EventType> {
        self.recognizer.accepted_events()
    }

    pub fn is_running(&self) -> bool {
        self.recognizer.is_started()
    }

    pub fn is_uninstalled(&self) -> bool {
        self.uninstalled
    }

    pub fn add_handler(&mut self, handler: SharedHandler) {
        self.recognizer.add_handler(handler);
    }

    pub fn recognizer(&self) -> &dyn Recognizer {
        self.recognizer.as_ref()
    }

    pub fn reinit(&mut self) {
        self.recognizer.reinit();
    }

    pub fn full_reinit(&mut self) {
        self.recognizer.full_reinit();
    }

    /// Tear down the recognizer. Later events are rejected.
    pub fn uninstall(&mut self) {
        if self.uninstalled {
            return;
        }
        debug!(interaction = %self.recognizer.name(), "uninstalling");
        self.recognizer.uninstall();
        self.uninstalled = true;
    }
}
