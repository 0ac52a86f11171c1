use anyhow::{Context, Result};
use habit_coach::config::CoachConfig;
use habit_coach::runtime::CoachRuntime;
use habit_coach::server::serve_health;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,habit_coach=debug")),
        )
        .init();

    let config = CoachConfig::load();
    let rt = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;

    rt.block_on(async {
        let runtime = CoachRuntime::bootstrap(config).context("failed to bootstrap habit coach")?;
        let _background = runtime.spawn_background();
        tracing::info!("✅ ResolveAI online");
        serve_health(&runtime.config.bind_addr).await
    })
}
