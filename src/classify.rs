//! Semantic classification lane: prompt construction and the external
//! text-completion call. The reply is untrusted free text; the core only
//! checks for the distraction keyword.

use std::future::Future;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::json;

pub const DISTRACTION_KEYWORD: &str = "DISTRACTION";

/// External text-completion capability. The returned future must complete
/// within the implementation's configured timeout; a stalled backend must not
/// wedge the enforcement loop.
pub trait Classifier {
    fn classify(&self, prompt: &str) -> impl Future<Output = Result<String>> + Send;
}

/// Two-category prompt: RELEVANT vs DISTRACTION, single-word reply, with an
/// instruction to ignore sponsored content.
pub fn build_prompt(persona: &str, focus: &str, content: &str) -> String {
    format!(
        "User Persona: {persona}\n\
         User Focus: {focus}\n\
         Video Title: {content}\n\
         Ignore the Content that seems like sponsered advertisement classify apart from these\n\
         Task: Classify as RELEVANT or DISTRACTION. Reply with one word only."
    )
}

/// Keyword check on the normalized (trimmed, upper-cased) verdict.
pub fn is_distraction(verdict: &str) -> bool {
    verdict.contains(DISTRACTION_KEYWORD)
}

/// Production classifier: a local Ollama generate endpoint.
#[derive(Clone)]
pub struct OllamaClassifier {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClassifier {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build classification HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
        })
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl Classifier for OllamaClassifier {
    async fn classify(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        let resp = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .context("classification request failed")?;

        if !resp.status().is_success() {
            bail!("classification endpoint returned HTTP {}", resp.status());
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .context("classification endpoint returned malformed JSON")?;
        Ok(parsed.response)
    }
}
