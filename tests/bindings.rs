//! Bindings driven end to end through real interactions.

use interacto::binding::{Binding, BindingCallbacks, BindingOptions};
use interacto::command::{CmdStatus, Command, CommandCore, CommandError, Undoable};
use interacto::config::InteractoConfig;
use interacto::context::BindingsContext;
use interacto::event::{Event, EventType};
use interacto::fsm::{FsmBuilder, FsmDataHandler, TransitionBuilder, VirtualTimers};
use interacto::interaction::Interaction;
use interacto::telemetry::RecordingUsageSink;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[derive(Default)]
struct Pointer {
    x: f64,
}

impl FsmDataHandler for Pointer {
    fn reinit_data(&mut self) {
        self.x = 0.0;
    }
}

/// mousedown, mousemove*, mouseup.
fn dnd() -> Interaction<Pointer> {
    let data = Rc::new(RefCell::new(Pointer::default()));
    let mut b = FsmBuilder::new("dnd", VirtualTimers::shared());
    let pressed = b.std_state("pressed");
    let dragged = b.std_state("dragged");
    let dropped = b.terminal_state("dropped");

    let sink = data.clone();
    b.transition(
        TransitionBuilder::new()
            .from(b.init())
            .to(pressed)
            .on([EventType::MouseDown])
            .action(move |e: &Event| sink.borrow_mut().x = e.as_mouse().map_or(0.0, |m| m.x)),
    )
    .unwrap();
    for source in [pressed, dragged] {
        let sink = data.clone();
        b.transition(
            TransitionBuilder::new()
                .from(source)
                .to(dragged)
                .on([EventType::MouseMove])
                .action(move |e: &Event| sink.borrow_mut().x = e.as_mouse().map_or(0.0, |m| m.x)),
        )
        .unwrap();
        b.transition(
            TransitionBuilder::new()
                .from(source)
                .to(dropped)
                .on([EventType::MouseUp]),
        )
        .unwrap();
    }
    Interaction::new(Box::new(b.build().unwrap()), data)
}

fn mouse(kind: EventType, x: f64) -> Event {
    Event::mouse(kind, 0, x, 0.0)
}

/// Moves a shape; `enabled` gates `can_do`.
struct MoveShape {
    core: CommandCore,
    position: Rc<Cell<f64>>,
    target: f64,
    previous: f64,
    enabled: Rc<Cell<bool>>,
    runs: Rc<Cell<u32>>,
}

impl Command for MoveShape {
    fn core(&self) -> &CommandCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CommandCore {
        &mut self.core
    }

    fn execution(&mut self) -> Result<(), CommandError> {
        self.runs.set(self.runs.get() + 1);
        self.position.set(self.target);
        Ok(())
    }

    fn can_do(&self) -> bool {
        self.enabled.get()
    }

    fn create_memento(&mut self) {
        self.previous = self.position.get();
    }

    fn as_undoable(&self) -> Option<&dyn Undoable> {
        Some(self)
    }

    fn as_undoable_mut(&mut self) -> Option<&mut dyn Undoable> {
        Some(self)
    }
}

impl Undoable for MoveShape {
    fn undo(&mut self) {
        self.position.set(self.previous);
    }

    fn redo(&mut self) {
        self.position.set(self.target);
    }

    fn undo_name(&self) -> String {
        format!("move to {}", self.target)
    }
}

struct Shape {
    position: Rc<Cell<f64>>,
    enabled: Rc<Cell<bool>>,
    runs: Rc<Cell<u32>>,
}

impl Shape {
    fn new() -> Self {
        Self {
            position: Rc::new(Cell::new(0.0)),
            enabled: Rc::new(Cell::new(true)),
            runs: Rc::new(Cell::new(0)),
        }
    }

    fn callbacks(&self) -> BindingCallbacks<MoveShape, Pointer> {
        let (position, enabled, runs) = (self.position.clone(), self.enabled.clone(), self.runs.clone());
        BindingCallbacks::new(move |p: &Pointer| MoveShape {
            core: CommandCore::new(),
            position: position.clone(),
            target: p.x,
            previous: 0.0,
            enabled: enabled.clone(),
            runs: runs.clone(),
        })
        .then(|cmd: &mut MoveShape, p: &Pointer, _: &mut ()| cmd.target = p.x)
    }
}

#[test]
fn continuous_execution_skips_updates_that_cannot_run() {
    let context = BindingsContext::new();
    let shape = Shape::new();
    let options = BindingOptions {
        continuous_execution: true,
        ..BindingOptions::default()
    };
    let mut binding = Binding::new("move", dnd(), shape.callbacks(), (), options, &context);

    binding.process(&mouse(EventType::MouseDown, 1.0)).unwrap();
    assert_eq!(shape.runs.get(), 1);

    shape.enabled.set(false);
    binding.process(&mouse(EventType::MouseMove, 2.0)).unwrap();
    assert_eq!(shape.runs.get(), 1);

    shape.enabled.set(true);
    binding.process(&mouse(EventType::MouseMove, 3.0)).unwrap();
    assert_eq!(shape.runs.get(), 2);
    assert_eq!(shape.position.get(), 3.0);
}

#[test]
fn executed_commands_can_be_undone_and_redone() {
    let context = BindingsContext::new();
    let shape = Shape::new();
    let mut binding = Binding::new(
        "move",
        dnd(),
        shape.callbacks(),
        (),
        BindingOptions::default(),
        &context,
    );

    for event in [
        mouse(EventType::MouseDown, 1.0),
        mouse(EventType::MouseMove, 8.0),
        mouse(EventType::MouseUp, 8.0),
    ] {
        binding.process(&event).unwrap();
    }
    assert_eq!(shape.position.get(), 8.0);
    assert_eq!(shape.runs.get(), 1);

    let history = context.history().clone();
    assert_eq!(history.borrow().last_undo_name().as_deref(), Some("move to 8"));
    assert!(history.borrow_mut().undo());
    assert_eq!(shape.position.get(), 0.0);
    assert!(history.borrow_mut().redo());
    assert_eq!(shape.position.get(), 8.0);

    let registry = context.registry().borrow();
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.commands()[0].borrow().status(), CmdStatus::Done);
}

#[test]
fn bindings_share_the_context_pools() {
    let config = InteractoConfig::from_json(r#"{ "registry_size": 1 }"#).unwrap();
    let context = BindingsContext::from_config(&config);
    let shape = Shape::new();
    let mut first = Binding::new("first", dnd(), shape.callbacks(), (), BindingOptions::default(), &context);
    let mut second = Binding::new("second", dnd(), shape.callbacks(), (), BindingOptions::default(), &context);

    first.process(&mouse(EventType::MouseDown, 1.0)).unwrap();
    first.process(&mouse(EventType::MouseUp, 1.0)).unwrap();
    second.process(&mouse(EventType::MouseDown, 2.0)).unwrap();
    second.process(&mouse(EventType::MouseUp, 2.0)).unwrap();

    assert_eq!(context.registry().borrow().len(), 1);
    assert_eq!(context.history().borrow().undo_len(), 2);
    assert_ne!(first.id(), second.id());
}

#[test]
fn usage_of_each_cycle_is_reported() {
    let usage = Rc::new(RecordingUsageSink::new());
    let context = BindingsContext::new().with_usage_sink(usage.clone());
    let shape = Shape::new();
    let options = BindingOptions {
        log_usage: true,
        log_binding: true,
        log_command: true,
        ..BindingOptions::default()
    };
    let mut binding = Binding::new("move", dnd(), shape.callbacks(), (), options, &context);

    for _ in 0..3 {
        binding.process(&mouse(EventType::MouseDown, 1.0)).unwrap();
        binding.process(&mouse(EventType::MouseUp, 1.0)).unwrap();
    }

    let records = usage.records();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.binding == "move" && !r.cancelled));
    assert_eq!(binding.times_ended(), 3);
}

#[test]
fn uninstalled_binding_rejects_events() {
    let context = BindingsContext::new();
    let shape = Shape::new();
    let mut binding = Binding::new(
        "move",
        dnd(),
        shape.callbacks(),
        (),
        BindingOptions::default(),
        &context,
    );

    binding.process(&mouse(EventType::MouseDown, 1.0)).unwrap();
    let cmd = binding.command().unwrap();
    binding.uninstall();

    assert!(binding.is_uninstalled());
    assert!(binding.command().is_none());
    assert_eq!(cmd.borrow().status(), CmdStatus::Flushed);
    assert!(binding.process(&mouse(EventType::MouseUp, 1.0)).is_err());
}
