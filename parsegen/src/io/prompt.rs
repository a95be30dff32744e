//! Prompt builders for the planner and code generator.
//!
//! Templates mark their sections with `<!-- section:KEY required|droppable -->`.
//! After rendering, droppable sections are removed (oldest failures first)
//! until the prompt fits the byte budget; if it still does not fit, the last
//! section is truncated.

use std::sync::LazyLock;

use anyhow::Result;
use minijinja::{Environment, context};
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::core::state::AgentState;
use crate::io::config::{AgentConfig, RuntimeConfig};
use crate::io::process::display_command;

const PLANNER_TEMPLATE: &str = include_str!("prompts/planner.md");
const CODER_TEMPLATE: &str = include_str!("prompts/coder.md");

const TRUNCATION_MARKER: &str = "\n[truncated]";

/// Runtime facts rendered into prompts.
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeProfile {
    pub language: String,
    pub extension: String,
    /// Display form of the run command, placeholders intact.
    pub command: String,
}

impl RuntimeProfile {
    pub fn from_config(runtime: &RuntimeConfig) -> Self {
        Self {
            language: runtime.language.clone(),
            extension: runtime.extension.trim_start_matches('.').to_string(),
            command: display_command(&runtime.command),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct FailureContext<'a> {
    attempt: usize,
    description: &'a str,
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("planner", PLANNER_TEMPLATE)
            .expect("planner template should be valid");
        env.add_template("coder", CODER_TEMPLATE)
            .expect("coder template should be valid");
        Self { env }
    }
}

static ENGINE: LazyLock<PromptEngine> = LazyLock::new(PromptEngine::new);

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    content: String,
}

fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
            .expect("section marker regex should compile")
    });

    let markers: Vec<_> = SECTION_RE
        .captures_iter(rendered)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some((
                whole.start(),
                whole.end(),
                caps.get(1)?.as_str().to_string(),
                caps.get(2)?.as_str() == "required",
            ))
        })
        .collect();

    let mut sections = Vec::new();
    for (i, (_, body_start, key, required)) in markers.iter().enumerate() {
        let end = markers
            .get(i + 1)
            .map_or(rendered.len(), |(next_start, ..)| *next_start);
        let content = rendered[*body_start..end].trim().to_string();
        if !content.is_empty() || *required {
            sections.push(ParsedSection {
                key: key.clone(),
                required: *required,
                content,
            });
        }
    }
    sections
}

/// Drop droppable sections in `drop_order` (earliest occurrence of a key
/// first), then truncate sections from the last one backwards until the
/// prompt fits.
///
/// The result can only exceed `budget` when the budget is smaller than the
/// truncation markers and separators themselves.
fn apply_budget(sections: &mut Vec<ParsedSection>, budget: usize, drop_order: &[&str]) {
    let total_len = |secs: &[ParsedSection]| -> usize {
        let separators = secs.len().saturating_sub(1) * 2;
        secs.iter().map(|s| s.content.len()).sum::<usize>() + separators
    };

    for key in drop_order {
        while total_len(sections) > budget {
            let Some(idx) = sections.iter().position(|s| s.key == *key && !s.required) else {
                break;
            };
            let removed = sections.remove(idx);
            debug!(
                section = *key,
                bytes_dropped = removed.content.len(),
                "dropped section for budget"
            );
        }
    }

    for idx in (0..sections.len()).rev() {
        let total = total_len(sections);
        if total <= budget {
            return;
        }
        let overflow = total - budget;
        let section = &mut sections[idx];
        let before_len = section.content.len();
        if before_len <= TRUNCATION_MARKER.len() {
            continue;
        }
        let keep = before_len.saturating_sub(overflow + TRUNCATION_MARKER.len());
        truncate_at_char_boundary(&mut section.content, keep);
        section.content.push_str(TRUNCATION_MARKER);
        debug!(
            section = %section.key,
            before_len,
            after_len = section.content.len(),
            "truncated section for budget"
        );
    }
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Shorten `text` to at most `max` bytes without splitting a character.
pub fn truncate_at_char_boundary(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}

/// Builds planner and coder prompts within a byte budget.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
    history_window: Option<usize>,
    runtime: RuntimeProfile,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize, history_window: Option<usize>, runtime: RuntimeProfile) -> Self {
        Self {
            budget_bytes,
            history_window,
            runtime,
        }
    }

    pub fn from_config(cfg: &AgentConfig) -> Self {
        Self::new(
            cfg.prompt_budget_bytes,
            cfg.history_window,
            RuntimeProfile::from_config(&cfg.runtime),
        )
    }

    pub fn runtime(&self) -> &RuntimeProfile {
        &self.runtime
    }

    /// Prompt asking for a plan. Uses the target, schema and document text.
    pub fn planner(&self, state: &AgentState) -> Result<String> {
        let template = ENGINE.env.get_template("planner")?;
        let rendered = template.render(context! {
            runtime => &self.runtime,
            target => &state.run.target,
            schema => &state.derived.schema,
            document => state.derived.document_text.trim(),
        })?;
        Ok(self.fit(&rendered, &[]))
    }

    /// Prompt asking for code. Adds the plan and recent failures.
    pub fn coder(&self, state: &AgentState) -> Result<String> {
        let recent = state.recent_errors(self.history_window);
        let first_attempt = state.error_history.len() - recent.len() + 1;
        let failures: Vec<FailureContext<'_>> = recent
            .iter()
            .enumerate()
            .map(|(offset, description)| FailureContext {
                attempt: first_attempt + offset,
                description: description.trim(),
            })
            .collect();

        let template = ENGINE.env.get_template("coder")?;
        let rendered = template.render(context! {
            runtime => &self.runtime,
            target => &state.run.target,
            schema => &state.derived.schema,
            plan => state.plan.trim(),
            failures => failures,
            document => state.derived.document_text.trim(),
        })?;
        Ok(self.fit(&rendered, &["failure", "plan"]))
    }

    fn fit(&self, rendered: &str, drop_order: &[&str]) -> String {
        let mut sections = parse_sections(rendered);
        apply_budget(&mut sections, self.budget_bytes, drop_order);
        render_sections(&sections)
    }
}

/// Pull the program out of a collaborator reply.
///
/// Prefers the first fenced block tagged with the runtime language (or its
/// file extension), then the first fenced block of any kind, then the whole
/// reply.
pub fn extract_code(response: &str, runtime: &RuntimeProfile) -> String {
    static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?m)^[ \t]*```[ \t]*([\w+#.-]*)[^\n]*\n((?:.*\n)*?)^[ \t]*```[ \t]*$")
            .expect("fence regex should compile")
    });

    let blocks: Vec<(&str, &str)> = FENCE_RE
        .captures_iter(response)
        .filter_map(|caps| Some((caps.get(1)?.as_str(), caps.get(2)?.as_str())))
        .collect();

    let tagged = blocks.iter().find(|(tag, _)| {
        tag.eq_ignore_ascii_case(&runtime.language) || tag.eq_ignore_ascii_case(&runtime.extension)
    });
    match tagged.or_else(|| blocks.first()) {
        Some((_, body)) => body.trim_end().to_string(),
        None => response.trim().to_string(),
    }
}
