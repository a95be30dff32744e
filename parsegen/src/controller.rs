//! The agent state machine.
//!
//! ```text
//! PREPARE_CONTEXT -> PLAN -> GENERATE -> EXECUTE_TEST -> GENERATE | TERMINATE
//! ```
//!
//! The controller owns [`AgentState`] and is the only place updates are
//! merged. Every `EXECUTE_TEST` consumes one attempt, so a run never invokes
//! the harness more often than its initial budget.

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use tracing::{info, info_span, warn};

use crate::agents::coder::CodeGenerator;
use crate::agents::planner::Planner;
use crate::core::decision::{Decision, RunStatus, decide_next_step};
use crate::core::state::{AgentState, GeneratedCode, RunContext, StateUpdate};
use crate::core::verdict::Verdict;
use crate::harness::Harness;
use crate::io::generator::TextGenerator;
use crate::io::prompt::PromptBuilder;
use crate::prepare::ContextPreparer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    PrepareContext,
    Plan,
    Generate,
    ExecuteTest,
    Terminate(RunStatus),
}

/// What one completed `EXECUTE_TEST` looked like.
#[derive(Debug)]
pub struct AttemptReport<'a> {
    /// 1-indexed attempt number.
    pub attempt: u32,
    pub attempts_left: u32,
    pub code: &'a GeneratedCode,
    pub verdict: &'a Verdict,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

/// Final state of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub plan: String,
    pub attempts_made: u32,
    pub attempts_left: u32,
    pub error_history: Vec<String>,
    pub artifact_path: PathBuf,
}

impl RunOutcome {
    fn from_state(status: RunStatus, state: AgentState) -> Self {
        Self {
            status,
            plan: state.plan,
            attempts_made: state.attempts_made,
            attempts_left: state.attempts_left,
            error_history: state.error_history,
            artifact_path: state.run.artifact_path,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// Description of the last failed attempt.
    pub fn final_error(&self) -> Option<&str> {
        self.error_history.last().map(String::as_str)
    }
}

pub struct Controller<G: TextGenerator, H: Harness> {
    preparer: ContextPreparer,
    generator: G,
    harness: H,
    prompts: PromptBuilder,
    comment_prefix: String,
}

impl<G: TextGenerator, H: Harness> Controller<G, H> {
    pub fn new(
        preparer: ContextPreparer,
        generator: G,
        harness: H,
        prompts: PromptBuilder,
        comment_prefix: impl Into<String>,
    ) -> Self {
        Self {
            preparer,
            generator,
            harness,
            prompts,
            comment_prefix: comment_prefix.into(),
        }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn harness(&self) -> &H {
        &self.harness
    }

    /// Drive one run to a terminal state.
    ///
    /// `on_attempt` is called after every harness invocation. `Err` means the
    /// run could not continue at all (for example the artifact could not be
    /// written); an exhausted budget is a normal [`RunStatus::Exhausted`].
    pub fn run<F>(&self, run: RunContext, budget: u32, mut on_attempt: F) -> Result<RunOutcome>
    where
        F: FnMut(&AttemptReport<'_>),
    {
        let _span = info_span!("run", target = %run.target, budget).entered();
        let planner = Planner::new(&self.generator, &self.prompts);
        let coder = CodeGenerator::new(&self.generator, &self.prompts, self.comment_prefix.as_str());
        let mut state = AgentState::new(run, budget);
        let mut stage = Stage::PrepareContext;

        loop {
            info!(?stage, attempts_left = state.attempts_left, "stage");
            stage = match stage {
                Stage::PrepareContext => {
                    state.apply(self.preparer.prepare(&state));
                    Stage::Plan
                }
                Stage::Plan => {
                    state.apply(planner.plan(&state));
                    Stage::Generate
                }
                Stage::Generate => {
                    if state.attempts_left == 0 {
                        warn!("no attempts left before generation");
                        Stage::Terminate(RunStatus::Exhausted)
                    } else {
                        state.apply(coder.generate(&state));
                        Stage::ExecuteTest
                    }
                }
                Stage::ExecuteTest => {
                    let started_at = Utc::now();
                    let code = state
                        .code
                        .as_ref()
                        .ok_or_else(|| anyhow!("no generated code to test"))?;
                    let verdict = self.harness.execute_and_test(code, &state.run)?;
                    let ended_at = Utc::now();
                    if let Some(description) = verdict.description() {
                        warn!(attempt = state.attempts_made + 1, "attempt failed:\n{description}");
                    }
                    state.apply(StateUpdate::Tested(verdict));

                    if let (Some(code), Some(verdict)) = (&state.code, &state.verdict) {
                        on_attempt(&AttemptReport {
                            attempt: state.attempts_made,
                            attempts_left: state.attempts_left,
                            code,
                            verdict,
                            started_at,
                            ended_at,
                        });
                    }

                    match decide_next_step(&state) {
                        Decision::Continue => Stage::Generate,
                        Decision::Terminate(status) => Stage::Terminate(status),
                    }
                }
                Stage::Terminate(status) => {
                    info!(
                        ?status,
                        attempts_made = state.attempts_made,
                        attempts_left = state.attempts_left,
                        "run finished"
                    );
                    return Ok(RunOutcome::from_state(status, state));
                }
            };
        }
    }
}
