//! Errors raised while building or running FSMs.

use crate::fsm::validation::FsmViolation;
use thiserror::Error;

/// Errors returned by `process` and `on_timeout`.
#[derive(Debug, Error)]
pub enum FsmError {
    /// A lifecycle handler asked for the interaction to be cancelled.
    ///
    /// The FSM has already cancelled itself when this is returned.
    #[error("interaction '{fsm}' cancelled by a lifecycle handler")]
    Cancelled { fsm: String },

    /// Any other failure raised by a lifecycle handler.
    #[error("lifecycle handler failed: {0}")]
    Handler(#[source] Box<dyn std::error::Error + 'static>),

    #[error("interaction has been uninstalled")]
    Uninstalled,
}

impl FsmError {
    /// Wrap a handler failure.
    pub fn handler<E>(error: E) -> Self
    where
        E: std::error::Error + 'static,
    {
        Self::Handler(Box::new(error))
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The handler failure, downcast to its concrete type.
    pub fn handler_error<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        match self {
            Self::Handler(inner) => inner.downcast_ref::<E>(),
            Self::Cancelled { .. } | Self::Uninstalled => None,
        }
    }
}

/// Errors that can occur when building FSMs and combinators.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("FSM '{fsm}' is invalid ({} violation(s)): {}", .violations.len(), list(.violations))]
    InvalidFsm {
        fsm: String,
        violations: Vec<FsmViolation>,
    },

    #[error("{combinator} requires at least {required} members, got {found}")]
    TooFewMembers {
        combinator: &'static str,
        required: usize,
        found: usize,
    },

    #[error("XOR over structurally identical interactions '{name}' is ambiguous")]
    AmbiguousXor { name: String },

    #[error("Transition source state not specified. Call .from(state)")]
    MissingSource,

    #[error("Transition target state not specified. Call .to(state)")]
    MissingTarget,

    #[error("Transition trigger not specified. Call .on(..), .epsilon(), .timeout(..) or .sub_fsm(..)")]
    MissingTrigger,
}

fn list(violations: &[FsmViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("boom")]
    struct Boom;

    #[test]
    fn handler_error_downcasts() {
        let error = FsmError::handler(Boom);
        assert!(error.handler_error::<Boom>().is_some());
        assert!(!error.is_cancellation());
        assert_eq!(error.to_string(), "lifecycle handler failed: boom");
    }

    #[test]
    fn invalid_fsm_lists_every_violation() {
        let error = BuildError::InvalidFsm {
            fsm: "drag".to_string(),
            violations: vec![
                FsmViolation::TimeoutFromInit,
                FsmViolation::DuplicateStateName {
                    name: "moved".to_string(),
                },
            ],
        };
        let message = error.to_string();
        assert!(message.contains("2 violation(s)"));
        assert!(message.contains("moved"));
    }
}
