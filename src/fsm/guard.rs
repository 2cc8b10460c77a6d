//! Guard predicates for controlling transitions.
//!
//! A guard is evaluated only once the transition accepted the event type.
//! It encodes the semantic part of the match: which button, which key,
//! which modifiers.

use crate::event::Event;
use std::fmt;
use std::rc::Rc;

/// Predicate deciding whether an accepted event may fire a transition.
///
/// # Example
///
/// ```rust
/// use interacto::event::{Event, EventType};
/// use interacto::fsm::Guard;
///
/// let left_button = Guard::new(|e: &Event| e.as_mouse().is_some_and(|m| m.button == 0));
///
/// assert!(left_button.check(&Event::mouse(EventType::MouseDown, 0, 0.0, 0.0)));
/// assert!(!left_button.check(&Event::mouse(EventType::MouseDown, 2, 0.0, 0.0)));
/// ```
#[derive(Clone)]
pub struct Guard {
    predicate: Rc<dyn Fn(&Event) -> bool>,
    label: Option<String>,
}

impl Guard {
    /// Create a guard from a predicate.
    ///
    /// The predicate should be deterministic: the engine may evaluate it more
    /// than once for the same event (sub-FSM transitions check it both when
    /// matching and when delegating).
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&Event) -> bool + 'static,
    {
        Guard {
            predicate: Rc::new(predicate),
            label: None,
        }
    }

    /// Create a guard whose structural identity is `label`.
    ///
    /// Guards with equal labels are considered the same predicate when
    /// recognizers are compared, e.g. by [`OrFsm::xor`](crate::combinator::OrFsm::xor).
    pub fn labelled<F>(label: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Event) -> bool + 'static,
    {
        Guard {
            predicate: Rc::new(predicate),
            label: Some(label.into()),
        }
    }

    pub fn check(&self, event: &Event) -> bool {
        (self.predicate)(event)
    }

    /// Structural identity of the guard.
    ///
    /// Unlabelled predicates are opaque: only clones of the same guard
    /// describe alike.
    pub fn describe(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => format!("fn@{:p}", Rc::as_ptr(&self.predicate).cast::<()>()),
        }
    }

    /// Guard matching mouse events of the given button.
    pub fn button(button: u8) -> Self {
        Self::labelled(format!("button={button}"), move |e: &Event| {
            e.as_mouse().is_some_and(|m| m.button == button)
        })
    }

    /// Guard matching key events of the given key code.
    pub fn key(code: impl Into<String>) -> Self {
        let code = code.into();
        Self::labelled(format!("key={code}"), move |e: &Event| {
            e.as_key().is_some_and(|k| k.code == code)
        })
    }

    /// Guard matching touch events of the given touch point.
    pub fn touch(touch: u32) -> Self {
        Self::labelled(format!("touch={touch}"), move |e: &Event| {
            e.as_touch().is_some_and(|t| t.touch == touch)
        })
    }

    /// Both guards must hold.
    pub fn and(self, other: Guard) -> Self {
        let label = format!("{}&{}", self.describe(), other.describe());
        Self::labelled(label, move |e: &Event| self.check(e) && other.check(e))
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guard({})", self.describe())
    }
}
