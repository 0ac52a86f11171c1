//! Ordered model attempts over a [`TextGenerator`].
//!
//! Availability of some reply outranks correctness: callers always get text
//! back, and a total failure turns into a diagnostic that is shown to the
//! user as-is.

use std::sync::Arc;

use crate::llm_client::{LlmApiError, TextGenerator};

pub const PROBE_PROMPT: &str = "Say 'Success' if you can hear me.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded(String),
    Failed { model: String, error: String },
}

#[derive(Clone)]
pub struct GenerationClient {
    generator: Arc<dyn TextGenerator>,
    models: Vec<String>,
}

impl GenerationClient {
    /// `models` are tried in order: fast/primary first, then more reliable ones.
    pub fn new(generator: Arc<dyn TextGenerator>, models: Vec<String>) -> Self {
        Self { generator, models }
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub async fn attempt(&self, model: &str, prompt: &str) -> AttemptOutcome {
        match self.generator.generate(model, prompt).await {
            Ok(text) if !text.trim().is_empty() => AttemptOutcome::Succeeded(text),
            Ok(_) => AttemptOutcome::Failed {
                model: model.to_string(),
                error: "empty completion".to_string(),
            },
            Err(e) => AttemptOutcome::Failed {
                model: model.to_string(),
                error: format!("{:#}", e),
            },
        }
    }

    /// First successful completion, or a diagnostic naming the last failure.
    pub async fn generate(&self, prompt: &str) -> String {
        let mut last_error = "no generation models configured".to_string();

        for model in &self.models {
            match self.attempt(model, prompt).await {
                AttemptOutcome::Succeeded(text) => return text,
                AttemptOutcome::Failed { model, error } => {
                    tracing::warn!("Generation with model '{}' failed: {}", model, error);
                    last_error = error;
                }
            }
        }

        tracing::error!("All {} generation attempt(s) failed", self.models.len());
        diagnostic(&last_error)
    }
}

pub fn diagnostic(error: &str) -> String {
    format!("⚠️ Brain Error: {}", error)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStatus {
    Working,
    NotFound,
    PermissionDenied,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub model: String,
    pub status: ProbeStatus,
}

/// Try each candidate with a trivial prompt, stopping at the first one that
/// answers.
pub async fn probe(generator: &dyn TextGenerator, candidates: &[String]) -> Vec<ProbeResult> {
    let mut results = Vec::new();

    for model in candidates {
        tracing::info!("Probing model '{}'", model);
        let status = match generator.generate(model, PROBE_PROMPT).await {
            Ok(_) => ProbeStatus::Working,
            Err(e) => classify_failure(&e),
        };
        let working = status == ProbeStatus::Working;
        results.push(ProbeResult {
            model: model.clone(),
            status,
        });
        if working {
            break;
        }
    }

    results
}

fn classify_failure(error: &anyhow::Error) -> ProbeStatus {
    match error.downcast_ref::<LlmApiError>().map(|e| e.status) {
        Some(404) => ProbeStatus::NotFound,
        Some(401) | Some(403) => ProbeStatus::PermissionDenied,
        _ => ProbeStatus::Failed(error.to_string().chars().take(80).collect()),
    }
}
