//! Commands: units of application work with a tracked lifecycle.
//!
//! A command goes `Created -> Executed (-> Executed ...) -> Done`, may be
//! `Cancelled` while live, and ends `Flushed`, after which it must not be
//! reused. Execution state lives in a [`CommandCore`] that implementors
//! embed; the [`Command`] trait provides the lifecycle on top of it.

pub mod registry;
pub mod undo;

pub use registry::{CommandRegistry, RegistryEvent};
pub use undo::UndoHistory;

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// Lifecycle status of a command.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CmdStatus {
    #[default]
    Created,
    Executed,
    Done,
    Cancelled,
    Flushed,
}

impl CmdStatus {
    /// Whether `do_it` may still run the command.
    pub fn is_executable(&self) -> bool {
        matches!(self, Self::Created | Self::Executed)
    }
}

impl fmt::Display for CmdStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Executed => "executed",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
            Self::Flushed => "flushed",
        };
        f.write_str(name)
    }
}

/// How the registry retains a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationPolicy {
    /// Not kept.
    None,
    /// Kept until evicted by newer commands.
    Limited,
    /// Kept; never evicted to make room.
    Unlimited,
}

/// Error raised by a command's execution.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CommandError {
    #[error("command '{command}' failed: {reason}")]
    Execution { command: String, reason: String },
}

impl CommandError {
    pub fn execution(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Execution {
            command: command.into(),
            reason: reason.into(),
        }
    }
}

/// Lifecycle bookkeeping embedded in every command.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandCore {
    status: CmdStatus,
    memento_created: bool,
}

impl CommandCore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> CmdStatus {
        self.status
    }

    pub fn memento_created(&self) -> bool {
        self.memento_created
    }
}

/// A command shared between a binding, the registry and the undo history.
pub type SharedCommand = Rc<RefCell<dyn Command>>;

/// Wrap a command for sharing.
pub fn shared<C: Command + 'static>(command: C) -> SharedCommand {
    Rc::new(RefCell::new(command))
}

/// A unit of application work.
///
/// Implementors provide [`execution`](Command::execution) and access to
/// their [`CommandCore`]; the rest has sensible defaults.
///
/// # Example
///
/// ```rust
/// use interacto::command::{CmdStatus, Command, CommandCore, CommandError};
///
/// struct Increment {
///     core: CommandCore,
///     value: i32,
/// }
///
/// impl Command for Increment {
///     fn core(&self) -> &CommandCore {
///         &self.core
///     }
///
///     fn core_mut(&mut self) -> &mut CommandCore {
///         &mut self.core
///     }
///
///     fn execution(&mut self) -> Result<(), CommandError> {
///         self.value += 1;
///         Ok(())
///     }
/// }
///
/// let mut cmd = Increment { core: CommandCore::new(), value: 0 };
/// assert!(cmd.do_it().unwrap());
/// cmd.done();
/// assert!(!cmd.do_it().unwrap());
/// assert_eq!(cmd.value, 1);
/// assert_eq!(cmd.status(), CmdStatus::Done);
/// ```
pub trait Command {
    fn core(&self) -> &CommandCore;

    fn core_mut(&mut self) -> &mut CommandCore;

    /// The work itself.
    fn execution(&mut self) -> Result<(), CommandError>;

    /// Precondition checked before every execution.
    fn can_do(&self) -> bool {
        true
    }

    /// Hook run once, right before the first execution, to save what undo
    /// will need.
    fn create_memento(&mut self) {}

    fn had_effect(&self) -> bool {
        self.is_done()
    }

    fn registration_policy(&self) -> RegistrationPolicy {
        if self.had_effect() {
            RegistrationPolicy::Limited
        } else {
            RegistrationPolicy::None
        }
    }

    /// Whether registering this command should drop `other` from the
    /// registry.
    fn unregisters_command(&self, _other: &dyn Command) -> bool {
        false
    }

    /// Commands to execute right after this one had an effect.
    fn following_commands(&self) -> Vec<SharedCommand> {
        Vec::new()
    }

    fn name(&self) -> &str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    fn as_undoable(&self) -> Option<&dyn Undoable> {
        None
    }

    fn as_undoable_mut(&mut self) -> Option<&mut dyn Undoable> {
        None
    }

    fn status(&self) -> CmdStatus {
        self.core().status
    }

    fn is_done(&self) -> bool {
        self.status() == CmdStatus::Done
    }

    /// Execute the command if it is still executable and `can_do` holds.
    ///
    /// Returns `Ok(false)` without side effects otherwise. The memento is
    /// created before the first execution only.
    fn do_it(&mut self) -> Result<bool, CommandError> {
        if !self.status().is_executable() || !self.can_do() {
            return Ok(false);
        }
        if !self.core().memento_created {
            self.create_memento();
            self.core_mut().memento_created = true;
        }
        self.execution()?;
        self.core_mut().status = CmdStatus::Executed;
        Ok(true)
    }

    fn done(&mut self) {
        if self.status().is_executable() {
            self.core_mut().status = CmdStatus::Done;
        }
    }

    fn cancel(&mut self) {
        if self.status() != CmdStatus::Flushed {
            self.core_mut().status = CmdStatus::Cancelled;
        }
    }

    /// Deactivate the command for good.
    fn flush(&mut self) {
        self.core_mut().status = CmdStatus::Flushed;
    }
}

/// Capability of commands that can be undone and redone.
pub trait Undoable {
    fn undo(&mut self);

    fn redo(&mut self);

    /// Label shown by undo/redo menus.
    fn undo_name(&self) -> String;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Commands shared by the registry, undo and binding tests.

    use super::*;
    use std::cell::Cell;

    /// Counts executions; can be made non-executable and undoable.
    #[derive(Default)]
    pub(crate) struct Counter {
        pub(crate) core: CommandCore,
        pub(crate) runs: u32,
        pub(crate) mementos: u32,
        pub(crate) undos: u32,
        pub(crate) blocked: Rc<Cell<bool>>,
        pub(crate) fail: bool,
        pub(crate) undoable: bool,
    }

    impl Counter {
        pub(crate) fn undoable() -> Self {
            Self {
                undoable: true,
                ..Self::default()
            }
        }
    }

    impl Command for Counter {
        fn core(&self) -> &CommandCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut CommandCore {
            &mut self.core
        }

        fn execution(&mut self) -> Result<(), CommandError> {
            if self.fail {
                return Err(CommandError::execution("Counter", "refused"));
            }
            self.runs += 1;
            Ok(())
        }

        fn can_do(&self) -> bool {
            !self.blocked.get()
        }

        fn create_memento(&mut self) {
            self.mementos += 1;
        }

        fn as_undoable(&self) -> Option<&dyn Undoable> {
            if self.undoable {
                Some(self)
            } else {
                None
            }
        }

        fn as_undoable_mut(&mut self) -> Option<&mut dyn Undoable> {
            if self.undoable {
                Some(self)
            } else {
                None
            }
        }
    }

    impl Undoable for Counter {
        fn undo(&mut self) {
            self.undos += 1;
        }

        fn redo(&mut self) {
            self.runs += 1;
        }

        fn undo_name(&self) -> String {
            format!("count {}", self.runs)
        }
    }

    /// A done command with the given policy.
    pub(crate) fn done_with(policy: RegistrationPolicy) -> SharedCommand {
        let cmd = Pinned {
            core: CommandCore::new(),
            policy,
        };
        let cmd = shared(cmd);
        cmd.borrow_mut().done();
        cmd
    }

    pub(crate) struct Pinned {
        core: CommandCore,
        policy: RegistrationPolicy,
    }

    impl Command for Pinned {
        fn core(&self) -> &CommandCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut CommandCore {
            &mut self.core
        }

        fn execution(&mut self) -> Result<(), CommandError> {
            Ok(())
        }

        fn registration_policy(&self) -> RegistrationPolicy {
            self.policy
        }
    }
}
