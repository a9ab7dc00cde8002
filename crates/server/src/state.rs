//! Shared application state

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parlo_cache::AudioCache;
use parlo_config::Settings;
use parlo_pipeline::TurnOrchestrator;
use parlo_scenario::Scenario;
use parlo_telemetry::LatencyMonitor;

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<TurnOrchestrator>,
    pub monitor: Arc<LatencyMonitor>,
    pub cache: Arc<AudioCache>,
    pub settings: Arc<Settings>,
    /// Scenario templates loaded at startup, by scenario id
    pub scenarios: Arc<HashMap<String, Arc<Scenario>>>,
}

/// Load every `*.yaml` scenario under a directory. Missing directory is
/// fine (no scenarios offered); an invalid file is a startup error.
pub fn load_scenarios(dir: &Path) -> anyhow::Result<HashMap<String, Arc<Scenario>>> {
    let mut scenarios = HashMap::new();
    if !dir.is_dir() {
        return Ok(scenarios);
    }

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
            continue;
        }
        let raw = std::fs::read_to_string(&path)?;
        let scenario = Scenario::from_yaml(&raw)
            .map_err(|e| anyhow::anyhow!("{}: {e}", path.display()))?;
        tracing::info!(scenario = %scenario.id, file = %path.display(), "loaded scenario");
        scenarios.insert(scenario.id.clone(), Arc::new(scenario));
    }
    Ok(scenarios)
}
