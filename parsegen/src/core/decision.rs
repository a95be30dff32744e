//! The conditional transition after each harness invocation.

use serde::Serialize;

use crate::core::state::AgentState;

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The harness returned success.
    Succeeded,
    /// The attempt budget ran out without a success.
    Exhausted,
}

/// What the controller does after `EXECUTE_TEST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Generate another attempt.
    Continue,
    Terminate(RunStatus),
}

/// Decide the next step from the state after the budget was decremented.
pub fn decide_next_step(state: &AgentState) -> Decision {
    if state.succeeded() {
        return Decision::Terminate(RunStatus::Succeeded);
    }
    if state.attempts_left > 0 {
        return Decision::Continue;
    }
    Decision::Terminate(RunStatus::Exhausted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::{RunContext, StateUpdate};
    use crate::core::verdict::{DefectKind, Verdict};
    use std::path::PathBuf;

    fn state(budget: u32) -> AgentState {
        AgentState::new(
            RunContext {
                target: "sbi".to_string(),
                document_path: PathBuf::from("doc.pdf"),
                reference_path: PathBuf::from("ref.csv"),
                artifact_path: PathBuf::from("sbi_parser.py"),
            },
            budget,
        )
    }

    fn failed() -> StateUpdate {
        StateUpdate::Tested(Verdict::Failure {
            kind: DefectKind::Shape,
            description: "shape mismatch".to_string(),
        })
    }

    #[test]
    fn success_terminates_even_with_budget_left() {
        let mut s = state(3);
        s.apply(StateUpdate::Tested(Verdict::Success));
        assert_eq!(
            decide_next_step(&s),
            Decision::Terminate(RunStatus::Succeeded)
        );
    }

    #[test]
    fn failure_with_budget_continues() {
        let mut s = state(2);
        s.apply(failed());
        assert_eq!(decide_next_step(&s), Decision::Continue);
    }

    #[test]
    fn failure_on_last_attempt_exhausts() {
        let mut s = state(1);
        s.apply(failed());
        assert_eq!(
            decide_next_step(&s),
            Decision::Terminate(RunStatus::Exhausted)
        );
    }

    #[test]
    fn success_on_last_attempt_still_succeeds() {
        let mut s = state(1);
        s.apply(StateUpdate::Tested(Verdict::Success));
        assert_eq!(
            decide_next_step(&s),
            Decision::Terminate(RunStatus::Succeeded)
        );
    }
}
