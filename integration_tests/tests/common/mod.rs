#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Once;

use bevy::prelude::App;
use galaxy_sim::{
    build_headless_app_with, run_turn, SimulationConfig, SimulationMetrics, TeamAiConfig,
    UnitCatalog,
};

static INIT: Once = Once::new();

pub fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("test_simulation_config.json")
}

/// Points the environment loader at the small test galaxy.
pub fn ensure_test_config() {
    INIT.call_once(|| {
        let config_path = fixture_path();
        debug_assert!(
            config_path.exists(),
            "missing test simulation config at {}",
            config_path.display()
        );
        std::env::set_var("GALAXY_SIM_CONFIG_PATH", &config_path);
    });
}

pub fn fixture_config() -> anyhow::Result<SimulationConfig> {
    Ok(SimulationConfig::from_file(&fixture_path())?)
}

pub fn app_for(config: SimulationConfig) -> App {
    build_headless_app_with(config, TeamAiConfig::builtin(), UnitCatalog::builtin())
}

/// Runs `ticks` turns and returns the metrics digest after each one.
pub fn digests(app: &mut App, ticks: usize) -> Vec<u64> {
    (0..ticks)
        .map(|_| {
            run_turn(app);
            app.world.resource::<SimulationMetrics>().digest
        })
        .collect()
}
