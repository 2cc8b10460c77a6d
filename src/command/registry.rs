//! Bounded store of executed commands.

use crate::command::undo::UndoHistory;
use crate::command::{RegistrationPolicy, SharedCommand};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

/// Default number of retained commands.
pub const DEFAULT_REGISTRY_SIZE: usize = 50;

/// Change notified to registry subscribers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryEvent {
    Added,
    Removed,
    Cancelled,
}

/// Subscriber to registry changes.
pub type RegistryObserver = Box<dyn FnMut(RegistryEvent, &SharedCommand)>;

/// Ordered, bounded collection of executed commands.
///
/// When full, adding a command evicts (and flushes) the oldest command
/// whose policy is not [`RegistrationPolicy::Unlimited`]. Undoable commands
/// are forwarded to the attached [`UndoHistory`].
///
/// Changes are queued and reach subscribers on [`dispatch`](Self::dispatch)
/// or, for a shared registry, [`notify_pending`](Self::notify_pending),
/// which runs them once the registry is no longer borrowed.
pub struct CommandRegistry {
    commands: Vec<SharedCommand>,
    size_max: usize,
    observers: Vec<RegistryObserver>,
    pending: Vec<(RegistryEvent, SharedCommand)>,
    history: Option<Rc<RefCell<UndoHistory>>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::with_size_max(DEFAULT_REGISTRY_SIZE)
    }

    pub fn with_size_max(size_max: usize) -> Self {
        Self {
            commands: Vec::new(),
            size_max,
            observers: Vec::new(),
            pending: Vec::new(),
            history: None,
        }
    }

    /// Forward undoable commands to `history` from now on.
    pub fn attach_history(&mut self, history: Rc<RefCell<UndoHistory>>) {
        self.history = Some(history);
    }

    pub fn subscribe<F>(&mut self, observer: F)
    where
        F: FnMut(RegistryEvent, &SharedCommand) + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    /// Deliver queued changes to the subscribers.
    pub fn dispatch(&mut self) {
        for (event, cmd) in std::mem::take(&mut self.pending) {
            for observer in &mut self.observers {
                observer(event, &cmd);
            }
        }
    }

    /// Deliver queued changes of a shared registry without holding its
    /// borrow, so subscribers may read or modify it.
    pub fn notify_pending(registry: &RefCell<CommandRegistry>) {
        loop {
            let (mut observers, pending) = {
                let mut inner = registry.borrow_mut();
                if inner.pending.is_empty() {
                    return;
                }
                (
                    std::mem::take(&mut inner.observers),
                    std::mem::take(&mut inner.pending),
                )
            };
            for (event, cmd) in &pending {
                for observer in &mut observers {
                    observer(*event, cmd);
                }
            }
            let mut inner = registry.borrow_mut();
            // Keep subscriptions made by the observers themselves.
            observers.append(&mut inner.observers);
            inner.observers = observers;
        }
    }

    pub fn commands(&self) -> &[SharedCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn size_max(&self) -> usize {
        self.size_max
    }

    pub fn contains(&self, cmd: &SharedCommand) -> bool {
        self.position(cmd).is_some()
    }

    /// Register an executed command.
    ///
    /// Does nothing if the command is already registered, or if the
    /// registry cannot hold anything and the command is not unlimited.
    pub fn add_command(&mut self, cmd: SharedCommand) {
        if self.contains(&cmd) {
            return;
        }
        let policy = cmd.borrow().registration_policy();
        if self.size_max == 0 && policy != RegistrationPolicy::Unlimited {
            return;
        }

        self.unregister_command(&cmd);
        if self.commands.len() >= self.size_max {
            self.evict_oldest();
        }

        debug!(command = %cmd.borrow().name(), "command registered");
        self.commands.push(cmd.clone());
        self.notify(RegistryEvent::Added, &cmd);

        if let Some(history) = &self.history {
            if cmd.borrow().as_undoable().is_some() {
                history.borrow_mut().add(cmd.clone());
            }
        }
    }

    /// Remove and flush every registered command that `cmd` supersedes.
    pub fn unregister_command(&mut self, cmd: &SharedCommand) {
        let superseded: Vec<SharedCommand> = self
            .commands
            .iter()
            .filter(|old| !Rc::ptr_eq(old, cmd))
            .filter(|old| cmd.borrow().unregisters_command(&*old.borrow()))
            .cloned()
            .collect();
        for old in superseded {
            self.remove_command(&old);
        }
    }

    /// Remove a command and flush it.
    pub fn remove_command(&mut self, cmd: &SharedCommand) {
        if let Some(index) = self.position(cmd) {
            let removed = self.commands.remove(index);
            self.notify(RegistryEvent::Removed, &removed);
            removed.borrow_mut().flush();
        }
    }

    /// Explicit rejection: cancel, remove, notify, flush.
    pub fn cancel_command(&mut self, cmd: &SharedCommand) {
        cmd.borrow_mut().cancel();
        if let Some(index) = self.position(cmd) {
            self.commands.remove(index);
        }
        debug!(command = %cmd.borrow().name(), "command cancelled");
        self.notify(RegistryEvent::Cancelled, cmd);
        cmd.borrow_mut().flush();
    }

    /// Change the bound, evicting the oldest evictable commands if needed.
    pub fn set_size_max(&mut self, size_max: usize) {
        self.size_max = size_max;
        while self.commands.len() > self.size_max {
            if !self.evict_oldest() {
                break;
            }
        }
    }

    /// Flush and drop every command.
    pub fn clear(&mut self) {
        for cmd in self.commands.drain(..) {
            cmd.borrow_mut().flush();
        }
    }

    fn evict_oldest(&mut self) -> bool {
        let evictable = self
            .commands
            .iter()
            .position(|c| c.borrow().registration_policy() != RegistrationPolicy::Unlimited);
        match evictable {
            Some(index) => {
                let evicted = self.commands.remove(index);
                debug!(command = %evicted.borrow().name(), "command evicted");
                self.notify(RegistryEvent::Removed, &evicted);
                evicted.borrow_mut().flush();
                true
            }
            None => false,
        }
    }

    fn position(&self, cmd: &SharedCommand) -> Option<usize> {
        self.commands.iter().position(|c| Rc::ptr_eq(c, cmd))
    }

    fn notify(&mut self, event: RegistryEvent, cmd: &SharedCommand) {
        if !self.observers.is_empty() {
            self.pending.push((event, cmd.clone()));
        }
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.commands.len())
            .field("size_max", &self.size_max)
            .finish()
    }
}
