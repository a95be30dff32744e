//! Iteration state threaded through the agent's stages.
//!
//! Stages never mutate [`AgentState`]. Each one reads the state and returns a
//! [`StateUpdate`]; the controller is the only caller of [`AgentState::apply`].

use std::path::PathBuf;

use crate::core::verdict::Verdict;

/// Immutable inputs for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    /// Target identifier (e.g. `icici`).
    pub target: String,
    /// Source document handed to the generated parser.
    pub document_path: PathBuf,
    /// Ground-truth table the parser output must match.
    pub reference_path: PathBuf,
    /// Where each attempt's source is written (one file per target).
    pub artifact_path: PathBuf,
}

/// Inputs derived once by the context preparer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivedContext {
    pub document_text: String,
    /// Reference column names in order. Empty when the reference is unavailable.
    pub schema: Vec<String>,
}

/// Source produced by one generation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedCode {
    pub source: String,
    /// Prompt that produced `source`, kept for attempt logs.
    pub prompt: String,
    /// Set when the collaborator failed and `source` is a placeholder.
    pub diagnostic: Option<String>,
}

/// Partial update returned by a stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StateUpdate {
    Context(DerivedContext),
    Plan(String),
    Code(GeneratedCode),
    /// A completed harness invocation. Consumes one attempt.
    Tested(Verdict),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentState {
    pub run: RunContext,
    pub derived: DerivedContext,
    pub plan: String,
    /// Latest generated code only; earlier attempts live on disk.
    pub code: Option<GeneratedCode>,
    pub verdict: Option<Verdict>,
    /// Failure descriptions in chronological order, one per failed attempt.
    pub error_history: Vec<String>,
    pub attempts_left: u32,
    pub attempts_made: u32,
}

impl AgentState {
    pub fn new(run: RunContext, budget: u32) -> Self {
        Self {
            run,
            derived: DerivedContext::default(),
            plan: String::new(),
            code: None,
            verdict: None,
            error_history: Vec::new(),
            attempts_left: budget,
            attempts_made: 0,
        }
    }

    /// Merge a stage's update into the state.
    pub fn apply(&mut self, update: StateUpdate) {
        match update {
            StateUpdate::Context(derived) => self.derived = derived,
            StateUpdate::Plan(plan) => self.plan = plan,
            StateUpdate::Code(code) => self.code = Some(code),
            StateUpdate::Tested(verdict) => {
                self.attempts_left = self.attempts_left.saturating_sub(1);
                self.attempts_made += 1;
                if let Some(description) = verdict.description() {
                    self.error_history.push(description.to_string());
                }
                self.verdict = Some(verdict);
            }
        }
    }

    /// The most recent `window` failures (all of them when `window` is `None`).
    pub fn recent_errors(&self, window: Option<usize>) -> &[String] {
        let len = self.error_history.len();
        match window {
            Some(n) if n < len => &self.error_history[len - n..],
            _ => &self.error_history,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.verdict.as_ref().is_some_and(Verdict::is_success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::verdict::DefectKind;

    fn run() -> RunContext {
        RunContext {
            target: "icici".to_string(),
            document_path: PathBuf::from("data/icici/icici_sample.pdf"),
            reference_path: PathBuf::from("data/icici/icici_sample.csv"),
            artifact_path: PathBuf::from("custom_parsers/icici_parser.py"),
        }
    }

    fn failure(description: &str) -> Verdict {
        Verdict::Failure {
            kind: DefectKind::Runtime,
            description: description.to_string(),
        }
    }

    #[test]
    fn tested_update_consumes_one_attempt_and_records_failure() {
        let mut state = AgentState::new(run(), 3);
        state.apply(StateUpdate::Tested(failure("boom")));

        assert_eq!(state.attempts_left, 2);
        assert_eq!(state.attempts_made, 1);
        assert_eq!(state.error_history, vec!["boom".to_string()]);
        assert!(!state.succeeded());
    }

    #[test]
    fn success_is_not_recorded_in_history() {
        let mut state = AgentState::new(run(), 1);
        state.apply(StateUpdate::Tested(Verdict::Success));

        assert_eq!(state.attempts_left, 0);
        assert!(state.error_history.is_empty());
        assert!(state.succeeded());
    }

    #[test]
    fn recent_errors_respects_window() {
        let mut state = AgentState::new(run(), 5);
        for msg in ["one", "two", "three"] {
            state.apply(StateUpdate::Tested(failure(msg)));
        }
        assert_eq!(state.recent_errors(Some(2)), ["two", "three"]);
        assert_eq!(state.recent_errors(None).len(), 3);
        assert_eq!(state.recent_errors(Some(10)).len(), 3);
        assert_eq!(state.error_history.len(), 3);
    }
}
