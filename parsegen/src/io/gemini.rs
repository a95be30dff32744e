//! Gemini REST backend (`generateContent`).

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::io::config::GeneratorConfig;
use crate::io::generator::TextGenerator;

const GENERATE_METHOD: &str = "generateContent";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelInfo>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelInfo {
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

/// Client for the Gemini API.
///
/// A missing API key is not an error here: requests fail instead, and the
/// planner and code generator turn that into their placeholder output.
#[derive(Debug, Clone)]
pub struct GeminiGenerator {
    client: Client,
    base_url: String,
    model: String,
    api_key_env: String,
    api_key: Option<String>,
}

impl GeminiGenerator {
    pub fn from_config(cfg: &GeneratorConfig) -> Result<Self> {
        let api_key = std::env::var(&cfg.gemini.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        if api_key.is_none() {
            warn!(env = %cfg.gemini.api_key_env, "gemini api key not set");
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            base_url: cfg.gemini.base_url.trim_end_matches('/').to_string(),
            model: cfg
                .gemini
                .model
                .trim_start_matches("models/")
                .to_string(),
            api_key_env: cfg.gemini.api_key_env.clone(),
            api_key,
        })
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| anyhow!("{} is not set", self.api_key_env))
    }

    /// Names of models that support content generation.
    #[instrument(skip(self))]
    pub fn list_models(&self) -> Result<Vec<String>> {
        let key = self.api_key()?;
        let url = format!("{}/models", self.base_url);
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self.client.get(&url).header("x-goog-api-key", key);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let response = request.send().context("list gemini models")?;
            let status = response.status();
            let body = response.text().context("read model list")?;
            if !status.is_success() {
                bail!("list models failed with {status}: {}", body.trim());
            }
            let page: ModelList = serde_json::from_str(&body).context("parse model list")?;
            names.extend(generation_models(&page.models));
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        debug!(count = names.len(), "listed models");
        Ok(names)
    }
}

impl TextGenerator for GeminiGenerator {
    #[instrument(skip_all, fields(model = %self.model))]
    fn generate(&self, prompt: &str) -> Result<String> {
        let key = self.api_key()?;
        info!(prompt_bytes = prompt.len(), "requesting gemini generation");
        let url = format!(
            "{}/models/{}:{GENERATE_METHOD}",
            self.base_url, self.model
        );
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }]
        });

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", key)
            .json(&body)
            .send()
            .context("send gemini request")?;
        let status = response.status();
        let text = response.text().context("read gemini response")?;
        if !status.is_success() {
            warn!(%status, "gemini request failed");
            bail!("gemini returned {status}: {}", text.trim());
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&text).context("parse gemini response")?;
        response_text(parsed)
    }
}

/// Concatenate the text parts of the first candidate.
fn response_text(response: GenerateResponse) -> Result<String> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(match response.prompt_feedback {
            Some(feedback) => anyhow!("gemini returned no candidates: {feedback}"),
            None => anyhow!("gemini returned no candidates"),
        });
    };
    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();
    if text.trim().is_empty() {
        let reason = candidate.finish_reason.as_deref().unwrap_or("unknown");
        bail!("gemini returned an empty response (finish reason: {reason})");
    }
    Ok(text)
}

fn generation_models(models: &[ModelInfo]) -> Vec<String> {
    models
        .iter()
        .filter(|m| m.supported_generation_methods.iter().any(|g| g == GENERATE_METHOD))
        .map(|m| m.name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::GeminiConfig;

    #[test]
    fn text_parts_are_concatenated() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"import sys\n"},{"text":"print(1)"}]},"finishReason":"STOP"}]}"#,
        )
        .expect("json");
        assert_eq!(response_text(response).expect("text"), "import sys\nprint(1)");
    }

    #[test]
    fn blocked_prompt_reports_feedback() {
        let response: GenerateResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).expect("json");
        let err = response_text(response).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn only_generation_models_are_listed() {
        let list: ModelList = serde_json::from_str(
            r#"{"models":[
                {"name":"models/gemini-pro-latest","supportedGenerationMethods":["generateContent","countTokens"]},
                {"name":"models/embedding-001","supportedGenerationMethods":["embedContent"]}
            ]}"#,
        )
        .expect("json");
        assert_eq!(
            generation_models(&list.models),
            vec!["models/gemini-pro-latest".to_string()]
        );
    }

    #[test]
    fn missing_key_fails_the_request_not_the_build() {
        let cfg = GeneratorConfig {
            gemini: GeminiConfig {
                api_key_env: "PARSEGEN_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
                ..GeminiConfig::default()
            },
            ..GeneratorConfig::default()
        };
        let generator = GeminiGenerator::from_config(&cfg).expect("build");
        let err = generator.generate("prompt").unwrap_err();
        assert!(err.to_string().contains("PARSEGEN_TEST_KEY_THAT_IS_NEVER_SET"));
    }
}
