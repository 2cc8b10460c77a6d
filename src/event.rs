//! Abstract platform events.
//!
//! The interaction engine never sees raw platform objects. The embedding
//! layer translates platform events (DOM, winit, a terminal...) into these
//! values before handing them to an interaction.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a node the platform layer registered listeners on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Event-type tag.
///
/// Transitions declare the tags they may match; interactions aggregate them
/// per state so the platform layer knows which listeners to keep registered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    MouseDown,
    MouseUp,
    Click,
    AuxClick,
    MouseMove,
    MouseEnter,
    MouseLeave,
    KeyDown,
    KeyUp,
    Wheel,
    TouchStart,
    TouchMove,
    TouchEnd,
    Input,
    Change,
    /// Synthetic event produced when an armed timer fires.
    Timeout,
}

impl EventType {
    /// Platform name of the event type.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MouseDown => "mousedown",
            Self::MouseUp => "mouseup",
            Self::Click => "click",
            Self::AuxClick => "auxclick",
            Self::MouseMove => "mousemove",
            Self::MouseEnter => "mouseenter",
            Self::MouseLeave => "mouseleave",
            Self::KeyDown => "keydown",
            Self::KeyUp => "keyup",
            Self::Wheel => "wheel",
            Self::TouchStart => "touchstart",
            Self::TouchMove => "touchmove",
            Self::TouchEnd => "touchend",
            Self::Input => "input",
            Self::Change => "change",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Modifier keys held while an input event was produced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MouseEvent {
    pub button: u8,
    pub x: f64,
    pub y: f64,
    pub modifiers: Modifiers,
    pub target: Option<NodeId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyEvent {
    /// Physical key code, e.g. `"KeyA"` or `"Escape"`.
    pub code: String,
    pub modifiers: Modifiers,
    pub target: Option<NodeId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TouchEvent {
    /// Identifier of the touch point, stable for the whole touch.
    pub touch: u32,
    pub x: f64,
    pub y: f64,
    pub target: Option<NodeId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WheelEvent {
    pub dx: f64,
    pub dy: f64,
    pub target: Option<NodeId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WidgetEvent {
    pub value: Option<String>,
    pub target: Option<NodeId>,
}

/// An abstract input event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Event {
    MouseDown(MouseEvent),
    MouseUp(MouseEvent),
    Click(MouseEvent),
    AuxClick(MouseEvent),
    MouseMove(MouseEvent),
    MouseEnter(MouseEvent),
    MouseLeave(MouseEvent),
    KeyDown(KeyEvent),
    KeyUp(KeyEvent),
    Wheel(WheelEvent),
    TouchStart(TouchEvent),
    TouchMove(TouchEvent),
    TouchEnd(TouchEvent),
    Input(WidgetEvent),
    Change(WidgetEvent),
    Timeout,
}

impl Event {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::MouseDown(_) => EventType::MouseDown,
            Self::MouseUp(_) => EventType::MouseUp,
            Self::Click(_) => EventType::Click,
            Self::AuxClick(_) => EventType::AuxClick,
            Self::MouseMove(_) => EventType::MouseMove,
            Self::MouseEnter(_) => EventType::MouseEnter,
            Self::MouseLeave(_) => EventType::MouseLeave,
            Self::KeyDown(_) => EventType::KeyDown,
            Self::KeyUp(_) => EventType::KeyUp,
            Self::Wheel(_) => EventType::Wheel,
            Self::TouchStart(_) => EventType::TouchStart,
            Self::TouchMove(_) => EventType::TouchMove,
            Self::TouchEnd(_) => EventType::TouchEnd,
            Self::Input(_) => EventType::Input,
            Self::Change(_) => EventType::Change,
            Self::Timeout => EventType::Timeout,
        }
    }

    /// Mouse payload, for any of the mouse event variants.
    pub fn as_mouse(&self) -> Option<&MouseEvent> {
        match self {
            Self::MouseDown(m)
            | Self::MouseUp(m)
            | Self::Click(m)
            | Self::AuxClick(m)
            | Self::MouseMove(m)
            | Self::MouseEnter(m)
            | Self::MouseLeave(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_key(&self) -> Option<&KeyEvent> {
        match self {
            Self::KeyDown(k) | Self::KeyUp(k) => Some(k),
            _ => None,
        }
    }

    pub fn as_touch(&self) -> Option<&TouchEvent> {
        match self {
            Self::TouchStart(t) | Self::TouchMove(t) | Self::TouchEnd(t) => Some(t),
            _ => None,
        }
    }

    /// Node the event was dispatched on, when the platform reported one.
    pub fn target(&self) -> Option<NodeId> {
        match self {
            Self::Wheel(w) => w.target,
            Self::Input(w) | Self::Change(w) => w.target,
            Self::Timeout => None,
            other => other
                .as_mouse()
                .map(|m| m.target)
                .or_else(|| other.as_key().map(|k| k.target))
                .or_else(|| other.as_touch().map(|t| t.target))
                .flatten(),
        }
    }

    /// Mouse event with the given button at the given position.
    pub fn mouse(kind: EventType, button: u8, x: f64, y: f64) -> Self {
        let payload = MouseEvent {
            button,
            x,
            y,
            modifiers: Modifiers::default(),
            target: None,
        };
        match kind {
            EventType::MouseUp => Self::MouseUp(payload),
            EventType::Click => Self::Click(payload),
            EventType::AuxClick => Self::AuxClick(payload),
            EventType::MouseMove => Self::MouseMove(payload),
            EventType::MouseEnter => Self::MouseEnter(payload),
            EventType::MouseLeave => Self::MouseLeave(payload),
            _ => Self::MouseDown(payload),
        }
    }

    pub fn key_down(code: impl Into<String>) -> Self {
        Self::KeyDown(KeyEvent {
            code: code.into(),
            modifiers: Modifiers::default(),
            target: None,
        })
    }

    pub fn key_up(code: impl Into<String>) -> Self {
        Self::KeyUp(KeyEvent {
            code: code.into(),
            modifiers: Modifiers::default(),
            target: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_matches_variant() {
        assert_eq!(
            Event::mouse(EventType::Click, 0, 1.0, 2.0).event_type(),
            EventType::Click
        );
        assert_eq!(Event::key_down("KeyA").event_type(), EventType::KeyDown);
        assert_eq!(Event::Timeout.event_type(), EventType::Timeout);
    }

    #[test]
    fn mouse_constructor_falls_back_to_mouse_down() {
        let event = Event::mouse(EventType::KeyUp, 2, 0.0, 0.0);
        assert_eq!(event.event_type(), EventType::MouseDown);
        assert_eq!(event.as_mouse().map(|m| m.button), Some(2));
    }

    #[test]
    fn target_is_read_from_payload() {
        let mut event = Event::mouse(EventType::MouseUp, 0, 0.0, 0.0);
        if let Event::MouseUp(m) = &mut event {
            m.target = Some(NodeId(7));
        }
        assert_eq!(event.target(), Some(NodeId(7)));
        assert_eq!(Event::key_up("Escape").target(), None);
    }

    #[test]
    fn event_type_serializes_lowercase() {
        let json = serde_json::to_string(&EventType::MouseDown).unwrap();
        assert_eq!(json, "\"mousedown\"");
        assert_eq!(EventType::TouchEnd.to_string(), "touchend");
    }
}
