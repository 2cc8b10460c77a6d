//! Structural validation of FSM definitions.
//!
//! Checks are run with Stillwater's `Validation` so that a malformed FSM
//! reports every violation at once instead of the first one found.

use crate::fsm::state::{StateId, StateKind, StateNode};
use crate::fsm::transition::Transition;
use std::collections::{BTreeSet, HashSet, VecDeque};
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;
use thiserror::Error;

/// A structural rule broken by an FSM definition.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FsmViolation {
    #[error("transition {transition} references unknown state #{index}")]
    UnknownState { transition: String, index: usize },

    #[error("transition {transition} leaves '{state}', which cannot be exited")]
    OutputStateRequired { transition: String, state: String },

    #[error("transition {transition} enters '{state}', which cannot be entered")]
    InputStateRequired { transition: String, state: String },

    #[error("state name '{name}' is used more than once")]
    DuplicateStateName { name: String },

    #[error("state '{state}' has {count} timeout transitions, at most one is allowed")]
    MultipleTimeouts { state: String, count: usize },

    #[error("the init state cannot carry a timeout transition")]
    TimeoutFromInit,

    #[error("state '{state}' is unreachable from the init state")]
    UnreachableState { state: String },

    #[error("starting state #{index} does not exist")]
    UnknownStartingState { index: usize },
}

type Check = Validation<(), NonEmptyVec<FsmViolation>>;

fn check(ok: bool, violation: impl FnOnce() -> FsmViolation) -> Check {
    if ok {
        Validation::success(())
    } else {
        Validation::fail(violation())
    }
}

/// Validate states and transitions, accumulating ALL violations.
pub(crate) fn validate(
    states: &[StateNode],
    transitions: &[Transition],
    starting: StateId,
) -> Validation<(), NonEmptyVec<FsmViolation>> {
    let mut checks: Vec<Check> = Vec::new();

    checks.push(check(starting.0 < states.len(), || {
        FsmViolation::UnknownStartingState { index: starting.0 }
    }));

    for transition in transitions {
        for id in [transition.source, transition.target] {
            checks.push(check(id.0 < states.len(), || FsmViolation::UnknownState {
                transition: transition.describe(),
                index: id.0,
            }));
        }
        if let Some(source) = states.get(transition.source.0) {
            checks.push(check(source.kind.is_output(), || {
                FsmViolation::OutputStateRequired {
                    transition: transition.describe(),
                    state: source.name.clone(),
                }
            }));
        }
        if let Some(target) = states.get(transition.target.0) {
            checks.push(check(target.kind.is_input(), || {
                FsmViolation::InputStateRequired {
                    transition: transition.describe(),
                    state: target.name.clone(),
                }
            }));
        }
    }

    let mut names = HashSet::new();
    let mut duplicates = BTreeSet::new();
    for state in states {
        if !names.insert(state.name.as_str()) {
            duplicates.insert(state.name.clone());
        }
    }
    for name in duplicates {
        checks.push(Validation::fail(FsmViolation::DuplicateStateName { name }));
    }

    for state in states {
        let count = state
            .outgoing
            .iter()
            .filter_map(|id| transitions.get(id.0))
            .filter(|t| t.is_timeout())
            .count();
        checks.push(check(count <= 1, || FsmViolation::MultipleTimeouts {
            state: state.name.clone(),
            count,
        }));
        if state.kind == StateKind::Init {
            checks.push(check(count == 0, || FsmViolation::TimeoutFromInit));
        }
    }

    let reachable = reachable_states(states, transitions);
    for (index, state) in states.iter().enumerate() {
        checks.push(check(reachable.contains(&index), || {
            FsmViolation::UnreachableState {
                state: state.name.clone(),
            }
        }));
    }

    Validation::all_vec(checks).map(|_| ())
}

/// Convert a validation outcome into the plain list of violations.
pub(crate) fn violations(result: Validation<(), NonEmptyVec<FsmViolation>>) -> Vec<FsmViolation> {
    match result {
        Validation::Success(_) => Vec::new(),
        Validation::Failure(errors) => errors.iter().cloned().collect(),
    }
}

fn reachable_states(states: &[StateNode], transitions: &[Transition]) -> HashSet<usize> {
    let mut seen = HashSet::new();
    if states.is_empty() {
        return seen;
    }
    let mut queue = VecDeque::from([StateId::INIT.0]);
    seen.insert(StateId::INIT.0);
    while let Some(index) = queue.pop_front() {
        let Some(state) = states.get(index) else {
            continue;
        };
        for target in state
            .outgoing
            .iter()
            .filter_map(|id| transitions.get(id.0))
            .map(|t| t.target.0)
        {
            if target < states.len() && seen.insert(target) {
                queue.push_back(target);
            }
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;
    use crate::fsm::transition::{TransitionId, Trigger};
    use std::time::Duration;

    fn wire(
        states: &mut [StateNode],
        transitions: &mut Vec<Transition>,
        source: usize,
        target: usize,
        trigger: Trigger,
    ) {
        let id = TransitionId(transitions.len());
        transitions.push(Transition {
            source: StateId(source),
            target: StateId(target),
            trigger,
            guard: None,
            action: None,
        });
        if let Some(state) = states.get_mut(source) {
            state.outgoing.push(id);
        }
    }

    #[test]
    fn valid_fsm_passes() {
        let mut states = vec![
            StateNode::new("init", StateKind::Init),
            StateNode::new("ended", StateKind::Terminal),
        ];
        let mut transitions = Vec::new();
        wire(&mut states, &mut transitions, 0, 1, Trigger::on([EventType::Click]));

        assert!(validate(&states, &transitions, StateId::INIT).is_success());
    }

    #[test]
    fn validation_accumulates_all_violations() {
        let mut states = vec![
            StateNode::new("init", StateKind::Init),
            StateNode::new("ended", StateKind::Terminal),
            StateNode::new("ended", StateKind::Std),
        ];
        let mut transitions = Vec::new();
        // Terminal source and init target.
        wire(&mut states, &mut transitions, 1, 0, Trigger::Epsilon);
        // Timeout on init.
        wire(
            &mut states,
            &mut transitions,
            0,
            1,
            Trigger::Timeout(Duration::from_millis(10).into()),
        );

        let found = violations(validate(&states, &transitions, StateId::INIT));

        assert!(found
            .iter()
            .any(|v| matches!(v, FsmViolation::OutputStateRequired { .. })));
        assert!(found
            .iter()
            .any(|v| matches!(v, FsmViolation::InputStateRequired { .. })));
        assert!(found
            .iter()
            .any(|v| matches!(v, FsmViolation::DuplicateStateName { .. })));
        assert!(found.contains(&FsmViolation::TimeoutFromInit));
        assert!(found
            .iter()
            .any(|v| matches!(v, FsmViolation::UnreachableState { state } if state == "ended")));
    }

    #[test]
    fn multiple_timeouts_are_rejected() {
        let mut states = vec![
            StateNode::new("init", StateKind::Init),
            StateNode::new("pressed", StateKind::Std),
            StateNode::new("cancelled", StateKind::Cancelling),
        ];
        let mut transitions = Vec::new();
        wire(&mut states, &mut transitions, 0, 1, Trigger::on([EventType::MouseDown]));
        for _ in 0..2 {
            wire(
                &mut states,
                &mut transitions,
                1,
                2,
                Trigger::Timeout(Duration::from_millis(10).into()),
            );
        }

        let found = violations(validate(&states, &transitions, StateId::INIT));

        assert_eq!(
            found,
            vec![FsmViolation::MultipleTimeouts {
                state: "pressed".to_string(),
                count: 2
            }]
        );
    }

    #[test]
    fn unknown_states_are_reported() {
        let mut states = vec![StateNode::new("init", StateKind::Init)];
        let mut transitions = Vec::new();
        wire(&mut states, &mut transitions, 0, 5, Trigger::Epsilon);

        let found = violations(validate(&states, &transitions, StateId(9)));

        assert!(found.contains(&FsmViolation::UnknownStartingState { index: 9 }));
        assert!(found
            .iter()
            .any(|v| matches!(v, FsmViolation::UnknownState { index: 5, .. })));
    }
}
