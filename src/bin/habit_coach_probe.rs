//! Find a model the configured endpoint will actually answer with.

use anyhow::{Context, Result};
use habit_coach::config::CoachConfig;
use habit_coach::generation::{probe, ProbeStatus};
use habit_coach::http_client::build_http_client;
use habit_coach::llm_client::LlmClient;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,habit_coach=debug")),
        )
        .init();

    let config = CoachConfig::load();
    let client = LlmClient::new(
        config.llm_api_url.clone(),
        config.llm_api_key.clone(),
        build_http_client(config.request_timeout())?,
    );

    let rt = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    let results = rt.block_on(probe(&client, &config.probe_models));

    for result in &results {
        match &result.status {
            ProbeStatus::Working => tracing::info!("✅ {} works", result.model),
            ProbeStatus::NotFound => tracing::warn!("❌ {} (not found)", result.model),
            ProbeStatus::PermissionDenied => {
                tracing::warn!("🔒 {} (permission denied)", result.model)
            }
            ProbeStatus::Failed(reason) => tracing::warn!("⚠️ {} ({}...)", result.model, reason),
        }
    }

    match results.iter().find(|r| r.status == ProbeStatus::Working) {
        Some(winner) => {
            tracing::info!("Set primary_model = \"{}\" in habit_coach.toml", winner.model);
            Ok(())
        }
        None => anyhow::bail!(
            "no working model among {:?} at {}",
            config.probe_models,
            client.api_url()
        ),
    }
}
