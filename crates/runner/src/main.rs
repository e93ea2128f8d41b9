mod config_loader;

use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use amoeba_core::config::{LlmSettings, Settings, SimConfig};
use amoeba_core::cycle::{CycleRunner, Orchestrator, RunnerState};
use amoeba_core::llm::OpenAiChatClient;
use amoeba_core::motion::TimedMotion;

use config_loader::ConfigLoader;

const CONFIG_FILE: &str = "amoeba.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RunnerSection {
    /// Stop after this many ticks; runs until extinction or Ctrl-C when unset.
    max_cycles: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RunnerFile {
    runner: RunnerSection,
    sim: SimConfig,
    llm: LlmSettings,
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

/// Environment wins over the file.
fn apply_overrides(
    file: &mut RunnerFile,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    if let Some(key) = lookup("AMOEBA_LLM_API_KEY") {
        file.llm.api_key = key;
    }
    if let Some(model) = lookup("AMOEBA_LLM_MODEL") {
        file.llm.model = model;
    }
    if let Some(url) = lookup("AMOEBA_LLM_API_URL") {
        file.llm.api_url = url;
    }
    if let Some(seed) = lookup("AMOEBA_SEED") {
        file.sim.random_seed = seed
            .trim()
            .parse()
            .with_context(|| format!("AMOEBA_SEED must be an unsigned 32-bit integer, got {seed:?}"))?;
    }
    if let Some(ms) = lookup("AMOEBA_CYCLE_MS") {
        file.sim.cycle_interval_ms = ms
            .trim()
            .parse()
            .with_context(|| format!("AMOEBA_CYCLE_MS must be a whole number of milliseconds, got {ms:?}"))?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut file: RunnerFile = ConfigLoader::load_or_default(CONFIG_FILE)?;
    apply_overrides(&mut file, env_nonempty)?;
    let settings = Settings {
        sim: file.sim,
        llm: file.llm,
    };
    settings
        .sim
        .validate()
        .context("invalid simulation settings")?;
    if settings.llm.api_key.is_empty() {
        tracing::warn!(url = %settings.llm.api_url, "runner.no_api_key");
    }

    let llm = OpenAiChatClient::new(settings.llm.clone())?;
    let motion = TimedMotion::from_config(&settings.sim);
    let orchestrator = Orchestrator::new(settings, Arc::new(llm), Arc::new(motion))?;
    tracing::info!(
        seed = orchestrator.world().seed(),
        model = %orchestrator.settings().llm.model,
        interval_ms = orchestrator.settings().sim.cycle_interval_ms,
        "runner.ready"
    );

    let mut runner = CycleRunner::new(orchestrator).with_max_cycles(file.runner.max_cycles);
    runner.start();
    let mut state = runner.subscribe();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("runner.interrupted");
            runner.stop();
        }
        _ = state.wait_for(|s| matches!(s, RunnerState::Idle | RunnerState::Extinct)) => {}
    }
    runner.join().await?;

    let orchestrator = runner.orchestrator();
    let orchestrator = orchestrator.lock().await;
    if let Some(stats) = orchestrator.last_stats() {
        tracing::info!(
            cycle = stats.cycle,
            amoebas = stats.population.amoebas,
            tombstones = stats.population.tombstones,
            prompt_tokens = stats.tokens.prompt_tokens,
            generated_tokens = stats.tokens.generated_tokens,
            state = ?runner.state(),
            "runner.finished"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn sample_config_parses_and_validates() -> anyhow::Result<()> {
        let file: RunnerFile =
            ConfigLoader::parse_from_string(include_str!("../../../config/amoeba.toml"))?;
        file.sim.validate()?;
        assert_eq!(file.sim.cycle_interval_ms, 2_000);
        assert_eq!(file.runner.max_cycles, None);
        Ok(())
    }

    #[test]
    fn env_overrides_replace_file_values() -> anyhow::Result<()> {
        let mut file: RunnerFile = ConfigLoader::parse_from_string(
            "[runner]\nmax_cycles = 10\n[llm]\nmodel = \"from-file\"\n",
        )?;
        apply_overrides(
            &mut file,
            lookup(&[
                ("AMOEBA_LLM_MODEL", "o3-mini"),
                ("AMOEBA_SEED", "42"),
                ("AMOEBA_CYCLE_MS", " 500 "),
            ]),
        )?;
        assert_eq!(file.llm.model, "o3-mini");
        assert_eq!(file.sim.random_seed, 42);
        assert_eq!(file.sim.cycle_interval_ms, 500);
        assert_eq!(file.runner.max_cycles, Some(10));
        Ok(())
    }

    #[test]
    fn malformed_seed_is_reported() {
        let mut file = RunnerFile::default();
        let err = apply_overrides(&mut file, lookup(&[("AMOEBA_SEED", "-3")])).unwrap_err();
        assert!(err.to_string().contains("AMOEBA_SEED"));
    }
}
