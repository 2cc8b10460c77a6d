//! Bindings: an interaction's lifecycle driving a command's lifecycle.
//!
//! A [`Binding`] registers itself as a lifecycle handler of its
//! interaction. It is idle until the interaction starts, holds one
//! in-flight command while the interaction runs, and goes back to idle
//! when the interaction stops (the command is executed) or is cancelled
//! (the command is cancelled).
//!
//! # Example
//!
//! ```rust
//! use interacto::binding::{Binding, BindingCallbacks, BindingOptions};
//! use interacto::command::{Command, CommandCore, CommandError};
//! use interacto::context::BindingsContext;
//! use interacto::event::{Event, EventType};
//! use interacto::fsm::{FsmBuilder, FsmDataHandler, TransitionBuilder, VirtualTimers};
//! use interacto::interaction::Interaction;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! #[derive(Default)]
//! struct Point {
//!     x: f64,
//! }
//!
//! impl FsmDataHandler for Point {
//!     fn reinit_data(&mut self) {
//!         self.x = 0.0;
//!     }
//! }
//!
//! struct MoveTo {
//!     core: CommandCore,
//!     x: f64,
//! }
//!
//! impl Command for MoveTo {
//!     fn core(&self) -> &CommandCore {
//!         &self.core
//!     }
//!
//!     fn core_mut(&mut self) -> &mut CommandCore {
//!         &mut self.core
//!     }
//!
//!     fn execution(&mut self) -> Result<(), CommandError> {
//!         Ok(())
//!     }
//! }
//!
//! let data = Rc::new(RefCell::new(Point::default()));
//! let sink = data.clone();
//! let mut b = FsmBuilder::new("click", VirtualTimers::shared());
//! let clicked = b.terminal_state("clicked");
//! b.transition(
//!     TransitionBuilder::new()
//!         .from(b.init())
//!         .to(clicked)
//!         .on([EventType::Click])
//!         .action(move |e: &Event| sink.borrow_mut().x = e.as_mouse().map_or(0.0, |m| m.x)),
//! )
//! .unwrap();
//! let click = Interaction::new(Box::new(b.build().unwrap()), data);
//!
//! let context = BindingsContext::new();
//! let callbacks = BindingCallbacks::new(|p: &Point| MoveTo { core: CommandCore::new(), x: p.x });
//! let mut binding = Binding::new("move", click, callbacks, (), BindingOptions::default(), &context);
//!
//! binding.process(&Event::mouse(EventType::Click, 0, 42.0, 0.0)).unwrap();
//!
//! assert_eq!(binding.times_ended(), 1);
//! assert_eq!(context.registry().borrow().len(), 1);
//! ```

pub mod executor;

pub use executor::{CommandExecutor, DeferredExecutor, Job};

use crate::command::{
    CmdStatus, Command, CommandError, CommandRegistry, RegistrationPolicy, SharedCommand,
};
use crate::context::BindingsContext;
use crate::event::Event;
use crate::fsm::{Flow, FsmDataHandler, FsmError, FsmHandler, SharedHandler, TimerId};
use crate::interaction::Interaction;
use crate::telemetry::UsageRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Per-binding execution and logging flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingOptions {
    /// Execute the command on every update, not only when the interaction stops.
    pub continuous_execution: bool,
    /// Hand the final execution to the context's executor.
    pub async_execution: bool,
    /// Cancel the interaction when it starts while `when` does not hold.
    pub strict_start: bool,
    pub log_binding: bool,
    pub log_command: bool,
    pub log_usage: bool,
}

/// Errors raised by bindings through the interaction's `process`.
#[derive(Debug, Error)]
pub enum BindingError {
    #[error("command '{command}' had an effect but is not undoable, so it cannot be cancelled")]
    MustBeUndoable { command: String },

    #[error(transparent)]
    Command(#[from] CommandError),
}

type Factory<C, D> = Box<dyn FnMut(&D) -> C>;
type CommandCallback<C, D, A> = Box<dyn FnMut(&mut C, &D, &mut A)>;
type DataCallback<D, A> = Box<dyn FnMut(&D, &mut A)>;
type Predicate<D, A> = Box<dyn Fn(&D, &A) -> bool>;
type OutcomeCallback<C, D> = Box<dyn FnMut(&C, &D)>;

/// User code plugged into a binding.
///
/// Only the factory is mandatory. `C` is the command, `D` the interaction
/// data and `A` the accumulator threaded through one interaction cycle.
pub struct BindingCallbacks<C, D, A = ()> {
    factory: Factory<C, D>,
    first: Option<CommandCallback<C, D, A>>,
    then: Option<CommandCallback<C, D, A>>,
    end: Option<CommandCallback<C, D, A>>,
    when: Option<Predicate<D, A>>,
    cancel: Option<DataCallback<D, A>>,
    end_or_cancel: Option<DataCallback<D, A>>,
    feedback: Option<Box<dyn FnMut()>>,
    if_had_effects: Option<OutcomeCallback<C, D>>,
    if_had_no_effect: Option<OutcomeCallback<C, D>>,
    if_cannot_execute: Option<OutcomeCallback<C, D>>,
    catch: Option<Box<dyn FnMut(&CommandError)>>,
}

impl<C, D, A> BindingCallbacks<C, D, A> {
    pub fn new<F>(factory: F) -> Self
    where
        F: FnMut(&D) -> C + 'static,
    {
        Self {
            factory: Box::new(factory),
            first: None,
            then: None,
            end: None,
            when: None,
            cancel: None,
            end_or_cancel: None,
            feedback: None,
            if_had_effects: None,
            if_had_no_effect: None,
            if_cannot_execute: None,
            catch: None,
        }
    }

    /// Run right after the command is created.
    pub fn first<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut C, &D, &mut A) + 'static,
    {
        self.first = Some(Box::new(f));
        self
    }

    /// Run on every update, and once more at the end unless the binding
    /// executes continuously.
    pub fn then<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut C, &D, &mut A) + 'static,
    {
        self.then = Some(Box::new(f));
        self
    }

    /// Run when the interaction stops, before execution.
    pub fn end<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut C, &D, &mut A) + 'static,
    {
        self.end = Some(Box::new(f));
        self
    }

    /// Condition for creating and executing the command.
    pub fn when<F>(mut self, f: F) -> Self
    where
        F: Fn(&D, &A) -> bool + 'static,
    {
        self.when = Some(Box::new(f));
        self
    }

    pub fn cancel<F>(mut self, f: F) -> Self
    where
        F: FnMut(&D, &mut A) + 'static,
    {
        self.cancel = Some(Box::new(f));
        self
    }

    pub fn end_or_cancel<F>(mut self, f: F) -> Self
    where
        F: FnMut(&D, &mut A) + 'static,
    {
        self.end_or_cancel = Some(Box::new(f));
        self
    }

    /// Interim feedback, run after command creation and after each update.
    pub fn feedback<F>(mut self, f: F) -> Self
    where
        F: FnMut() + 'static,
    {
        self.feedback = Some(Box::new(f));
        self
    }

    pub fn if_had_effects<F>(mut self, f: F) -> Self
    where
        F: FnMut(&C, &D) + 'static,
    {
        self.if_had_effects = Some(Box::new(f));
        self
    }

    pub fn if_had_no_effect<F>(mut self, f: F) -> Self
    where
        F: FnMut(&C, &D) + 'static,
    {
        self.if_had_no_effect = Some(Box::new(f));
        self
    }

    pub fn if_cannot_execute<F>(mut self, f: F) -> Self
    where
        F: FnMut(&C, &D) + 'static,
    {
        self.if_cannot_execute = Some(Box::new(f));
        self
    }

    /// Receive command execution errors instead of propagating them.
    pub fn catch<F>(mut self, f: F) -> Self
    where
        F: FnMut(&CommandError) + 'static,
    {
        self.catch = Some(Box::new(f));
        self
    }
}

/// Glue between one interaction and the commands it produces.
pub struct Binding<C, D, A = ()>
where
    C: Command + 'static,
    D: FsmDataHandler + 'static,
    A: Clone + 'static,
{
    id: Uuid,
    name: String,
    interaction: Interaction<D>,
    core: Rc<RefCell<BindingCore<C, D, A>>>,
}

impl<C, D, A> Binding<C, D, A>
where
    C: Command + 'static,
    D: FsmDataHandler + 'static,
    A: Clone + 'static,
{
    /// Wire `callbacks` to `interaction`.
    ///
    /// `accumulator` is the initial value cloned at the start of every
    /// interaction cycle.
    pub fn new(
        name: impl Into<String>,
        mut interaction: Interaction<D>,
        callbacks: BindingCallbacks<C, D, A>,
        accumulator: A,
        options: BindingOptions,
        context: &BindingsContext,
    ) -> Self {
        let name = name.into();
        let core = Rc::new(RefCell::new(BindingCore {
            name: name.clone(),
            callbacks,
            options,
            data: interaction.shared_data(),
            context: context.clone(),
            accumulator: accumulator.clone(),
            initial: accumulator,
            cmd: None,
            activated: true,
            times_ended: 0,
            times_cancelled: 0,
            started_at: None,
        }));
        let handler: SharedHandler = core.clone();
        interaction.add_handler(handler);
        debug!(binding = %name, interaction = %interaction.name(), "binding created");

        Self {
            id: Uuid::new_v4(),
            name,
            interaction,
            core,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn process(&mut self, event: &Event) -> Result<bool, FsmError> {
        self.interaction.process(event)
    }

    pub fn on_timeout(&mut self, timer: TimerId) -> Result<bool, FsmError> {
        self.interaction.on_timeout(timer)
    }

    pub fn interaction(&self) -> &Interaction<D> {
        &self.interaction
    }

    pub fn interaction_mut(&mut self) -> &mut Interaction<D> {
        &mut self.interaction
    }

    pub fn is_running(&self) -> bool {
        self.interaction.is_running()
    }

    /// The in-flight command, if the interaction is running.
    pub fn command(&self) -> Option<Rc<RefCell<C>>> {
        self.core.borrow().cmd.clone()
    }

    /// Accumulator of the current (or last) cycle.
    pub fn accumulator(&self) -> A {
        self.core.borrow().accumulator.clone()
    }

    pub fn options(&self) -> BindingOptions {
        self.core.borrow().options
    }

    pub fn is_activated(&self) -> bool {
        self.core.borrow().activated
    }

    /// Deactivating aborts the running interaction and cancels its command.
    pub fn set_activated(&mut self, activated: bool) {
        let cmd = {
            let mut core = self.core.borrow_mut();
            core.activated = activated;
            if activated {
                None
            } else {
                core.cmd.take()
            }
        };
        if !activated {
            if let Some(cmd) = cmd {
                cmd.borrow_mut().cancel();
            }
            self.interaction.full_reinit();
        }
        debug!(binding = %self.name, activated, "activation changed");
    }

    pub fn times_ended(&self) -> u32 {
        self.core.borrow().times_ended
    }

    pub fn times_cancelled(&self) -> u32 {
        self.core.borrow().times_cancelled
    }

    pub fn is_uninstalled(&self) -> bool {
        self.interaction.is_uninstalled()
    }

    /// Uninstall the interaction and drop any in-flight command.
    pub fn uninstall(&mut self) {
        self.interaction.uninstall();
        if let Some(cmd) = self.core.borrow_mut().cmd.take() {
            cmd.borrow_mut().flush();
        }
    }
}

impl<C, D, A> std::fmt::Debug for Binding<C, D, A>
where
    C: Command + 'static,
    D: FsmDataHandler + 'static,
    A: Clone + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.core.borrow();
        f.debug_struct("Binding")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("interaction", &self.interaction.name())
            .field("command", &core.cmd.as_ref().map(|c| c.borrow().name().to_string()))
            .field("times_ended", &core.times_ended)
            .field("times_cancelled", &core.times_cancelled)
            .finish()
    }
}

/// The lifecycle handler registered on the interaction.
struct BindingCore<C, D, A> {
    name: String,
    callbacks: BindingCallbacks<C, D, A>,
    options: BindingOptions,
    data: Rc<RefCell<D>>,
    context: BindingsContext,
    initial: A,
    accumulator: A,
    cmd: Option<Rc<RefCell<C>>>,
    activated: bool,
    times_ended: u32,
    times_cancelled: u32,
    started_at: Option<DateTime<Utc>>,
}

impl<C, D, A> BindingCore<C, D, A>
where
    C: Command + 'static,
    D: FsmDataHandler + 'static,
    A: Clone + 'static,
{
    fn when_ok(&self) -> bool {
        let data = self.data.borrow();
        self.callbacks
            .when
            .as_ref()
            .map_or(true, |when| when(&data, &self.accumulator))
    }

    fn create_command(&mut self) {
        let data = self.data.borrow();
        let mut cmd = (self.callbacks.factory)(&data);
        if let Some(first) = self.callbacks.first.as_mut() {
            first(&mut cmd, &data, &mut self.accumulator);
        }
        drop(data);

        debug!(binding = %self.name, command = %cmd.name(), "command created");
        if self.options.log_command {
            info!(binding = %self.name, command = %cmd.name(), "command created");
        }
        self.cmd = Some(Rc::new(RefCell::new(cmd)));
    }

    fn run_then(&mut self, cmd: &Rc<RefCell<C>>) {
        if let Some(then) = self.callbacks.then.as_mut() {
            let data = self.data.borrow();
            then(&mut cmd.borrow_mut(), &data, &mut self.accumulator);
        }
    }

    fn run_end(&mut self, cmd: &Rc<RefCell<C>>) {
        if let Some(end) = self.callbacks.end.as_mut() {
            let data = self.data.borrow();
            end(&mut cmd.borrow_mut(), &data, &mut self.accumulator);
        }
    }

    fn run_end_or_cancel(&mut self) {
        if let Some(end_or_cancel) = self.callbacks.end_or_cancel.as_mut() {
            let data = self.data.borrow();
            end_or_cancel(&data, &mut self.accumulator);
        }
    }

    fn run_cancel(&mut self) {
        if let Some(cancel) = self.callbacks.cancel.as_mut() {
            let data = self.data.borrow();
            cancel(&data, &mut self.accumulator);
        }
    }

    fn feedback(&mut self) {
        if let Some(feedback) = self.callbacks.feedback.as_mut() {
            feedback();
        }
    }

    fn cannot_execute(&mut self, cmd: &Rc<RefCell<C>>) {
        if let Some(callback) = self.callbacks.if_cannot_execute.as_mut() {
            let data = self.data.borrow();
            callback(&cmd.borrow(), &data);
        }
    }

    fn report_outcome(&mut self, cmd: &Rc<RefCell<C>>, executed: bool) {
        if !executed {
            self.cannot_execute(cmd);
            return;
        }
        let had_effect = cmd.borrow().had_effect();
        let callback = if had_effect {
            self.callbacks.if_had_effects.as_mut()
        } else {
            self.callbacks.if_had_no_effect.as_mut()
        };
        if let Some(callback) = callback {
            let data = self.data.borrow();
            callback(&cmd.borrow(), &data);
        }
    }

    /// Route an execution error to `catch`, or escalate it.
    fn handle_failure(&mut self, error: CommandError) -> Result<(), FsmError> {
        debug!(binding = %self.name, %error, "command failed");
        match self.callbacks.catch.as_mut() {
            Some(catch) => {
                catch(&error);
                self.context.errors().report(&self.name, &error);
                Ok(())
            }
            None => Err(FsmError::handler(BindingError::Command(error))),
        }
    }

    fn execute(&mut self, cmd: Rc<RefCell<C>>) -> Result<(), FsmError> {
        if self.options.async_execution {
            let name = cmd.borrow().name().to_string();
            let context = self.context.clone();
            let binding = self.name.clone();
            let shared: SharedCommand = cmd;
            self.context.executor().submit(
                &name,
                Box::new(move || run_deferred(&context, &binding, &shared)),
            );
            return Ok(());
        }

        let result = cmd.borrow_mut().do_it();
        match result {
            Ok(executed) => {
                if self.options.log_command {
                    info!(binding = %self.name, command = %cmd.borrow().name(), executed, "command executed");
                }
                let shared: SharedCommand = cmd.clone();
                let chained = after_cmd_executed(&self.context, &shared, executed);
                self.report_outcome(&cmd, executed);
                chained.map(|_| ()).or_else(|error| self.handle_failure(error))
            }
            Err(error) => self.handle_failure(error),
        }
    }

    /// Undo what a continuously executed command already did.
    fn undo_effect(&self, cmd: &Rc<RefCell<C>>) -> Result<(), FsmError> {
        let mut cmd = cmd.borrow_mut();
        let command = cmd.name().to_string();
        match cmd.as_undoable_mut() {
            Some(undoable) => {
                debug!(binding = %self.name, %command, "undoing cancelled command");
                undoable.undo();
                Ok(())
            }
            None => Err(FsmError::handler(BindingError::MustBeUndoable { command })),
        }
    }

    fn record_usage(&mut self, cancelled: bool) {
        let Some(started_at) = self.started_at.take() else {
            return;
        };
        if self.options.log_usage {
            let record = UsageRecord::new(self.context.session(), &self.name, started_at, cancelled);
            self.context.usage().record(&record);
        }
    }
}

impl<C, D, A> FsmHandler for BindingCore<C, D, A>
where
    C: Command + 'static,
    D: FsmDataHandler + 'static,
    A: Clone + 'static,
{
    fn fsm_starts(&mut self) -> Result<Flow, FsmError> {
        if !self.activated {
            return Ok(Flow::Continue);
        }
        self.accumulator = self.initial.clone();
        self.started_at = Some(Utc::now());
        if self.options.log_binding {
            info!(binding = %self.name, "interaction starts");
        }
        if self.cmd.is_some() {
            return Ok(Flow::Continue);
        }

        if self.when_ok() {
            self.create_command();
            self.feedback();
            Ok(Flow::Continue)
        } else if self.options.strict_start {
            debug!(binding = %self.name, "start refused");
            Ok(Flow::Cancel)
        } else {
            Ok(Flow::Continue)
        }
    }

    fn fsm_updates(&mut self) -> Result<Flow, FsmError> {
        if !self.activated || !self.when_ok() {
            return Ok(Flow::Continue);
        }
        if self.options.log_binding {
            info!(binding = %self.name, "interaction updates");
        }
        if self.cmd.is_none() {
            self.create_command();
        }
        let Some(cmd) = self.cmd.clone() else {
            return Ok(Flow::Continue);
        };

        self.run_then(&cmd);
        if self.options.continuous_execution {
            let can_do = cmd.borrow().can_do();
            if can_do {
                let result = cmd.borrow_mut().do_it();
                match result {
                    Ok(_) => debug!(binding = %self.name, "command executed on update"),
                    Err(error) => self.handle_failure(error)?,
                }
            } else {
                self.cannot_execute(&cmd);
            }
        }
        self.feedback();
        Ok(Flow::Continue)
    }

    fn fsm_stops(&mut self) -> Result<Flow, FsmError> {
        if !self.activated {
            return Ok(Flow::Continue);
        }
        if self.options.log_binding {
            info!(binding = %self.name, "interaction stops");
        }

        let outcome = if self.when_ok() {
            if self.cmd.is_none() {
                self.create_command();
            }
            match self.cmd.take() {
                Some(cmd) => {
                    if !self.options.continuous_execution {
                        self.run_then(&cmd);
                    }
                    self.run_end(&cmd);
                    self.run_end_or_cancel();
                    self.times_ended += 1;
                    self.execute(cmd)
                }
                None => Ok(()),
            }
        } else {
            if let Some(cmd) = self.cmd.take() {
                debug!(binding = %self.name, command = %cmd.borrow().name(), "command discarded");
                cmd.borrow_mut().cancel();
                self.times_cancelled += 1;
            }
            Ok(())
        };

        self.record_usage(false);
        outcome.map(|()| Flow::Continue)
    }

    fn fsm_cancels(&mut self) -> Result<Flow, FsmError> {
        if self.options.log_binding {
            info!(binding = %self.name, "interaction cancelled");
        }
        let Some(cmd) = self.cmd.take() else {
            self.record_usage(true);
            return Ok(Flow::Continue);
        };

        self.run_cancel();
        self.run_end_or_cancel();
        self.times_cancelled += 1;

        let executed = {
            let live = cmd.borrow();
            live.had_effect() || live.status() == CmdStatus::Executed
        };
        let outcome = if self.options.continuous_execution && executed {
            self.undo_effect(&cmd)
        } else {
            Ok(())
        };
        cmd.borrow_mut().cancel();
        debug!(binding = %self.name, command = %cmd.borrow().name(), "command cancelled");

        self.record_usage(true);
        outcome.map(|()| Flow::Continue)
    }
}

/// Finish a command after `do_it` returned `executed`.
///
/// A command that ran is marked done. If it had an effect it is registered
/// (or unregistered when its policy is [`RegistrationPolicy::None`]) and
/// its following commands are executed synchronously, recursively.
/// Returns whether the command had an effect.
pub fn after_cmd_executed(
    context: &BindingsContext,
    cmd: &SharedCommand,
    executed: bool,
) -> Result<bool, CommandError> {
    if !executed {
        return Ok(false);
    }
    cmd.borrow_mut().done();
    if !cmd.borrow().had_effect() {
        return Ok(false);
    }

    let policy = cmd.borrow().registration_policy();
    {
        let mut registry = context.registry().borrow_mut();
        if policy == RegistrationPolicy::None {
            registry.unregister_command(cmd);
        } else {
            registry.add_command(cmd.clone());
        }
    }
    CommandRegistry::notify_pending(context.registry());

    let following = cmd.borrow().following_commands();
    for next in following {
        let ran = next.borrow_mut().do_it()?;
        after_cmd_executed(context, &next, ran)?;
    }
    Ok(true)
}

fn run_deferred(context: &BindingsContext, binding: &str, cmd: &SharedCommand) {
    let result = cmd.borrow_mut().do_it();
    let finished = result.and_then(|executed| after_cmd_executed(context, cmd, executed));
    if let Err(error) = finished {
        debug!(%binding, %error, "deferred command failed");
        context.errors().report(binding, &error);
    }
}
