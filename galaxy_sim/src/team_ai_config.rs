use std::{
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use bevy::prelude::Resource;
use serde::Deserialize;
use thiserror::Error;

use crate::{components::TeamId, math::ClampRange};

pub const BUILTIN_TEAM_AI_CONFIG: &str = include_str!("data/team_ai_config.json");

/// Consideration weights and clamps that shape one empire's planner.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TeamAiProfile {
    pub fighter_attack_planet_consideration: f32,
    pub fighter_attack_threat_level_consideration_clamp: ClampRange,
    pub fighter_attack_resource_score_consideration_clamp: ClampRange,
    pub fighter_attack_distance_from_owned_planets_consideration_clamp: ClampRange,

    pub fighter_defend_planet_consideration: f32,
    pub fighter_defend_threat_level_consideration_clamp: ClampRange,
    pub fighter_defend_resource_score_consideration_clamp: ClampRange,

    pub worker_capture_planet_consideration: f32,
    pub worker_capture_safety_level_consideration_clamp: ClampRange,
    pub worker_capture_resource_score_consideration_clamp: ClampRange,
    pub worker_capture_distance_from_owned_planets_consideration_clamp: ClampRange,

    pub worker_build_consideration: f32,
    pub worker_build_safety_level_consideration_clamp: ClampRange,
    pub worker_build_resource_score_consideration_clamp: ClampRange,

    pub trader_safety_level_consideration_clamp: ClampRange,

    pub max_ship_production_bias: f32,
    pub desired_fighters_per_other_ship: f32,
    pub desired_worker_value_per_planet: f32,
    pub desired_trader_value_per_owned_planet: f32,
}

impl Default for TeamAiProfile {
    fn default() -> Self {
        let floor = ClampRange::new(0.1, 1.0);
        Self {
            fighter_attack_planet_consideration: 1.0,
            fighter_attack_threat_level_consideration_clamp: floor,
            fighter_attack_resource_score_consideration_clamp: floor,
            fighter_attack_distance_from_owned_planets_consideration_clamp: floor,

            fighter_defend_planet_consideration: 1.0,
            fighter_defend_threat_level_consideration_clamp: floor,
            fighter_defend_resource_score_consideration_clamp: floor,

            worker_capture_planet_consideration: 1.0,
            worker_capture_safety_level_consideration_clamp: floor,
            worker_capture_resource_score_consideration_clamp: floor,
            worker_capture_distance_from_owned_planets_consideration_clamp: floor,

            worker_build_consideration: 1.0,
            worker_build_safety_level_consideration_clamp: floor,
            worker_build_resource_score_consideration_clamp: floor,

            trader_safety_level_consideration_clamp: floor,

            max_ship_production_bias: 10.0,
            desired_fighters_per_other_ship: 2.0,
            desired_worker_value_per_planet: 1.0,
            desired_trader_value_per_owned_planet: 0.5,
        }
    }
}

/// Planner profiles for every empire. `team_profiles[i]` applies to team `i`;
/// teams past the end use `default_profile`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TeamAiConfig {
    default_profile: TeamAiProfile,
    team_profiles: Vec<TeamAiProfile>,
}

impl TeamAiConfig {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            serde_json::from_str(BUILTIN_TEAM_AI_CONFIG)
                .expect("builtin team ai config should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, TeamAiConfigError> {
        let contents =
            fs::read_to_string(path).map_err(|source| TeamAiConfigError::ReadFailed {
                path: path.to_path_buf(),
                source,
            })?;
        let config = TeamAiConfig::from_json_str(&contents)?;
        Ok(config)
    }

    pub fn default_profile(&self) -> &TeamAiProfile {
        &self.default_profile
    }

    pub fn profile_for(&self, team: TeamId) -> &TeamAiProfile {
        self.team_profiles
            .get(team.index())
            .unwrap_or(&self.default_profile)
    }
}

#[derive(Debug, Error)]
pub enum TeamAiConfigError {
    #[error("failed to parse team ai config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read team ai config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Handle for accessing the team AI configuration.
#[derive(Resource, Debug, Clone)]
pub struct TeamAiConfigHandle(pub Arc<TeamAiConfig>);

impl TeamAiConfigHandle {
    pub fn new(config: Arc<TeamAiConfig>) -> Self {
        Self(config)
    }

    pub fn get(&self) -> Arc<TeamAiConfig> {
        Arc::clone(&self.0)
    }

    pub fn config(&self) -> &TeamAiConfig {
        &self.0
    }

    pub fn replace(&mut self, config: Arc<TeamAiConfig>) {
        self.0 = config;
    }
}

/// Load team AI profiles from `TEAM_AI_CONFIG_PATH`, falling back to the
/// embedded defaults.
pub fn load_team_ai_config_from_env() -> Arc<TeamAiConfig> {
    if let Some(path) = env::var("TEAM_AI_CONFIG_PATH").ok().map(PathBuf::from) {
        match TeamAiConfig::from_file(&path) {
            Ok(config) => {
                tracing::info!(
                    target: "galaxy_sim::config",
                    path = %path.display(),
                    "team_ai_config.loaded=file"
                );
                return Arc::new(config);
            }
            Err(err) => {
                tracing::warn!(
                    target: "galaxy_sim::config",
                    path = %path.display(),
                    error = %err,
                    "team_ai_config.load_failed"
                );
            }
        }
    }

    tracing::info!(target: "galaxy_sim::config", "team_ai_config.loaded=builtin");
    TeamAiConfig::builtin()
}
