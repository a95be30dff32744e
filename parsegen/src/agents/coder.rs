//! `GENERATE`: turn plan, context and failures into parser source.

use anyhow::{Result, anyhow};
use tracing::{info, instrument, warn};

use crate::core::state::{AgentState, GeneratedCode, StateUpdate};
use crate::io::generator::TextGenerator;
use crate::io::prompt::{PromptBuilder, extract_code};

pub struct CodeGenerator<'a, G: TextGenerator> {
    generator: &'a G,
    prompts: &'a PromptBuilder,
    comment_prefix: String,
}

impl<'a, G: TextGenerator> CodeGenerator<'a, G> {
    pub fn new(generator: &'a G, prompts: &'a PromptBuilder, comment_prefix: impl Into<String>) -> Self {
        Self {
            generator,
            prompts,
            comment_prefix: comment_prefix.into(),
        }
    }

    /// Produce source for the next attempt.
    ///
    /// On collaborator failure the source is a comment holding the diagnostic,
    /// which the harness reports as a missing entry point.
    #[instrument(skip_all, fields(attempt = state.attempts_made + 1))]
    pub fn generate(&self, state: &AgentState) -> StateUpdate {
        let prompt = match self.prompts.coder(state) {
            Ok(prompt) => prompt,
            Err(err) => return StateUpdate::Code(self.placeholder(String::new(), &err)),
        };

        let code = match self.request(&prompt) {
            Ok(source) => {
                info!(bytes = source.len(), "code generated");
                GeneratedCode {
                    source,
                    prompt,
                    diagnostic: None,
                }
            }
            Err(err) => self.placeholder(prompt, &err),
        };
        StateUpdate::Code(code)
    }

    fn request(&self, prompt: &str) -> Result<String> {
        let response = self.generator.generate(prompt)?;
        let mut source = extract_code(&response, self.prompts.runtime());
        if source.trim().is_empty() {
            return Err(anyhow!("response contained no code"));
        }
        source.push('\n');
        Ok(source)
    }

    fn placeholder(&self, prompt: String, err: &anyhow::Error) -> GeneratedCode {
        let diagnostic = format!("{err:#}");
        warn!(err = %diagnostic, "code generation failed, writing placeholder");
        let mut source = format!("{} code generation failed\n", self.comment_prefix);
        for line in diagnostic.lines() {
            source.push_str(&format!("{} {line}\n", self.comment_prefix));
        }
        GeneratedCode {
            source,
            prompt,
            diagnostic: Some(diagnostic),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::verdict::{DefectKind, Verdict};
    use crate::io::config::RuntimeConfig;
    use crate::io::prompt::RuntimeProfile;
    use crate::test_support::{ScriptedGenerator, agent_state};

    fn prompts() -> PromptBuilder {
        PromptBuilder::new(10_000, None, RuntimeProfile::from_config(&RuntimeConfig::default()))
    }

    fn code(update: StateUpdate) -> GeneratedCode {
        match update {
            StateUpdate::Code(code) => code,
            other => panic!("expected code update, got {other:?}"),
        }
    }

    #[test]
    fn extracts_fenced_source() {
        let generator =
            ScriptedGenerator::new(vec![Ok("Sure:\n```python\nprint('hi')\n```\n".to_string())]);
        let prompts = prompts();
        let code = code(CodeGenerator::new(&generator, &prompts, "#").generate(&agent_state("icici", 3)));

        assert_eq!(code.source, "print('hi')\n");
        assert_eq!(code.diagnostic, None);
        assert!(code.prompt.contains("### Coder Contract"));
    }

    #[test]
    fn error_history_reaches_the_prompt() {
        let generator = ScriptedGenerator::new(vec![Ok("print(1)".to_string())]);
        let prompts = prompts();
        let mut state = agent_state("icici", 3);
        state.apply(StateUpdate::Tested(Verdict::Failure {
            kind: DefectKind::Runtime,
            description: "runtime fault: KeyError 'Amount'".to_string(),
        }));

        CodeGenerator::new(&generator, &prompts, "#").generate(&state);
        assert!(generator.prompts()[0].contains("KeyError 'Amount'"));
    }

    #[test]
    fn collaborator_fault_becomes_comment_placeholder() {
        let generator = ScriptedGenerator::new(vec![Err("connection reset".to_string())]);
        let prompts = prompts();
        let code = code(CodeGenerator::new(&generator, &prompts, "#").generate(&agent_state("icici", 3)));

        assert_eq!(code.diagnostic.as_deref(), Some("connection reset"));
        assert!(code.source.lines().all(|line| line.starts_with('#')));
        assert!(code.source.contains("connection reset"));
    }
}
