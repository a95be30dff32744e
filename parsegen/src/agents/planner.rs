//! `PLAN`: ask the collaborator for a short natural-language plan.

use anyhow::{Result, anyhow};
use tracing::{info, instrument, warn};

use crate::core::state::{AgentState, StateUpdate};
use crate::io::generator::TextGenerator;
use crate::io::prompt::PromptBuilder;

/// Prefix of the plan used when the collaborator cannot produce one.
pub const FALLBACK_PLAN_PREFIX: &str = "Fallback plan due to LLM error";

pub struct Planner<'a, G: TextGenerator> {
    generator: &'a G,
    prompts: &'a PromptBuilder,
}

impl<'a, G: TextGenerator> Planner<'a, G> {
    pub fn new(generator: &'a G, prompts: &'a PromptBuilder) -> Self {
        Self { generator, prompts }
    }

    /// Always yields a non-empty plan.
    #[instrument(skip_all, fields(target = %state.run.target))]
    pub fn plan(&self, state: &AgentState) -> StateUpdate {
        let plan = match self.request(state) {
            Ok(plan) => {
                info!(bytes = plan.len(), "plan received");
                plan
            }
            Err(err) => {
                warn!(err = %format!("{err:#}"), "planning failed, using fallback plan");
                format!("{FALLBACK_PLAN_PREFIX}: {err:#}")
            }
        };
        StateUpdate::Plan(plan)
    }

    fn request(&self, state: &AgentState) -> Result<String> {
        let prompt = self.prompts.planner(state)?;
        let response = self.generator.generate(&prompt)?;
        let plan = response.trim();
        if plan.is_empty() {
            return Err(anyhow!("empty response"));
        }
        Ok(plan.to_string())
    }
}
