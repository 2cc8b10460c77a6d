//! Interacto: FSM-based user interaction recognition and interaction-to-command bindings
//!
//! User interactions (clicks, drags, key strokes, multi-touch gestures) are
//! recognised by finite state machines fed with abstract platform events.
//! Bindings turn the lifecycle of an interaction into the lifecycle of a
//! command, which is then registered for undo/redo.
//!
//! # Core Concepts
//!
//! - **FSM**: an arena of states and transitions, driven by `process`
//! - **Combinators**: AND, OR, XOR, NOT and THEN compositions of recognizers
//! - **Interaction**: a recognizer plus the data it produces
//! - **Command**: a unit of work with a tracked lifecycle and optional undo
//! - **Binding**: the glue between an interaction and the commands it creates
//!
//! # Example
//!
//! ```rust
//! use interacto::event::{Event, EventType};
//! use interacto::fsm::{FsmBuilder, FsmHandler, Flow, FsmError, TransitionBuilder, VirtualTimers};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! #[derive(Default)]
//! struct Counter {
//!     stops: usize,
//! }
//!
//! impl FsmHandler for Counter {
//!     fn fsm_stops(&mut self) -> Result<Flow, FsmError> {
//!         self.stops += 1;
//!         Ok(Flow::Continue)
//!     }
//! }
//!
//! let mut b = FsmBuilder::new("click", VirtualTimers::shared());
//! let clicked = b.terminal_state("clicked");
//! b.transition(
//!     TransitionBuilder::new()
//!         .from(b.init())
//!         .to(clicked)
//!         .on([EventType::Click]),
//! )
//! .unwrap();
//! let mut fsm = b.build().unwrap();
//!
//! let counter = Rc::new(RefCell::new(Counter::default()));
//! fsm.add_handler(counter.clone());
//! fsm.process(&Event::mouse(EventType::Click, 0, 3.0, 4.0)).unwrap();
//!
//! assert_eq!(counter.borrow().stops, 1);
//! assert!(!fsm.is_started());
//! ```

pub mod binding;
pub mod combinator;
pub mod command;
pub mod config;
pub mod context;
pub mod event;
pub mod fsm;
pub mod interaction;
pub mod telemetry;

// Re-export commonly used types
pub use binding::{Binding, BindingCallbacks, BindingError, BindingOptions};
pub use combinator::{AndFsm, NotFsm, OrFsm, ThenFsm};
pub use command::{CmdStatus, Command, CommandCore, CommandError, CommandRegistry, UndoHistory};
pub use config::InteractoConfig;
pub use context::BindingsContext;
pub use event::{Event, EventType};
pub use fsm::{Fsm, FsmBuilder, FsmError, Recognizer, TransitionBuilder};
pub use interaction::Interaction;
