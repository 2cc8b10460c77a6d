//! Bounded undo/redo stacks fed by the command registry.

use crate::command::SharedCommand;
use std::collections::VecDeque;
use tracing::debug;

/// Default number of undoable commands kept.
pub const DEFAULT_UNDO_SIZE: usize = 30;

/// Undo and redo stacks of undoable commands.
///
/// Adding a command clears the redo stack. When the undo stack is full
/// the oldest command is dropped.
pub struct UndoHistory {
    undos: VecDeque<SharedCommand>,
    redos: Vec<SharedCommand>,
    size_max: usize,
}

impl UndoHistory {
    pub fn new() -> Self {
        Self::with_size_max(DEFAULT_UNDO_SIZE)
    }

    pub fn with_size_max(size_max: usize) -> Self {
        Self {
            undos: VecDeque::new(),
            redos: Vec::new(),
            size_max,
        }
    }

    /// Push an undoable command. Non-undoable commands are ignored.
    pub fn add(&mut self, cmd: SharedCommand) {
        if self.size_max == 0 || cmd.borrow().as_undoable().is_none() {
            return;
        }
        while self.undos.len() >= self.size_max {
            self.undos.pop_front();
        }
        self.undos.push_back(cmd);
        self.redos.clear();
    }

    /// Undo the most recent command. Returns whether something was undone.
    pub fn undo(&mut self) -> bool {
        let Some(cmd) = self.undos.pop_back() else {
            return false;
        };
        if let Some(undoable) = cmd.borrow_mut().as_undoable_mut() {
            debug!(command = %undoable.undo_name(), "undo");
            undoable.undo();
        }
        self.redos.push(cmd);
        true
    }

    /// Redo the most recently undone command.
    pub fn redo(&mut self) -> bool {
        let Some(cmd) = self.redos.pop() else {
            return false;
        };
        if let Some(undoable) = cmd.borrow_mut().as_undoable_mut() {
            debug!(command = %undoable.undo_name(), "redo");
            undoable.redo();
        }
        self.undos.push_back(cmd);
        true
    }

    pub fn can_undo(&self) -> bool {
        !self.undos.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redos.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undos.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redos.len()
    }

    pub fn last_undo_name(&self) -> Option<String> {
        self.undos.back().and_then(Self::label)
    }

    pub fn last_redo_name(&self) -> Option<String> {
        self.redos.last().and_then(Self::label)
    }

    pub fn size_max(&self) -> usize {
        self.size_max
    }

    /// Change the bound, dropping the oldest undoables first.
    pub fn set_size_max(&mut self, size_max: usize) {
        self.size_max = size_max;
        while self.undos.len() > size_max {
            self.undos.pop_front();
        }
        if size_max == 0 {
            self.redos.clear();
        }
    }

    pub fn clear(&mut self) {
        self.undos.clear();
        self.redos.clear();
    }

    fn label(cmd: &SharedCommand) -> Option<String> {
        cmd.borrow().as_undoable().map(|u| u.undo_name())
    }
}

impl Default for UndoHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UndoHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UndoHistory")
            .field("undos", &self.undos.len())
            .field("redos", &self.redos.len())
            .field("size_max", &self.size_max)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::testing::{done_with, Counter};
    use crate::command::{shared, Command, RegistrationPolicy};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn counter() -> (Rc<RefCell<Counter>>, SharedCommand) {
        let concrete = Rc::new(RefCell::new(Counter::undoable()));
        let erased: SharedCommand = concrete.clone();
        (concrete, erased)
    }

    #[test]
    fn undo_then_redo() {
        let mut history = UndoHistory::new();
        let (concrete, cmd) = counter();
        concrete.borrow_mut().do_it().unwrap();
        history.add(cmd);

        assert_eq!(history.last_undo_name().as_deref(), Some("count 1"));
        assert!(history.undo());
        assert_eq!(concrete.borrow().undos, 1);
        assert!(history.can_redo());
        assert!(!history.can_undo());

        assert!(history.redo());
        assert_eq!(concrete.borrow().runs, 2);
        assert_eq!(history.last_undo_name().as_deref(), Some("count 2"));
    }

    #[test]
    fn adding_clears_redo() {
        let mut history = UndoHistory::new();
        history.add(counter().1);
        history.undo();
        history.add(counter().1);

        assert!(!history.can_redo());
        assert_eq!(history.last_redo_name(), None);
    }

    #[test]
    fn bound_drops_oldest() {
        let mut history = UndoHistory::with_size_max(2);
        let (first, cmd) = counter();
        history.add(cmd);
        history.add(counter().1);
        history.add(counter().1);

        assert_eq!(history.undo_len(), 2);
        history.undo();
        history.undo();
        assert!(!history.undo());
        assert_eq!(first.borrow().undos, 0);

        history.set_size_max(0);
        assert!(!history.can_redo());
    }

    #[test]
    fn non_undoable_commands_are_ignored() {
        let mut history = UndoHistory::new();
        history.add(done_with(RegistrationPolicy::Limited));
        history.add(shared(Counter::default()));
        assert!(!history.can_undo());
    }
}
