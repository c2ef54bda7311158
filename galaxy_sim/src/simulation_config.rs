use std::{
    env, fs, io,
    path::{Path, PathBuf},
};

use bevy::{
    math::{IVec2, Vec2, Vec3},
    prelude::Resource,
};
use serde::Deserialize;
use thiserror::Error;

use crate::components::MAX_TEAMS;
pub use crate::uniform_grid::MAX_GRID_SUBDIVISIONS;

pub const BUILTIN_SIMULATION_CONFIG: &str = include_str!("data/simulation_config.json");

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ShipSpawnParams {
    pub ship: String,
    pub count: u32,
}

/// Galaxy layout, population caps and spatial index tuning.
#[derive(Resource, Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub seed: u64,
    pub team_names: Vec<String>,
    pub time_step: f32,

    pub home_planet_spawn_radius: f32,
    pub simulation_bounds_padding: f32,
    pub min_planet_size: f32,
    pub max_planet_size: f32,
    pub neutral_planets_count: u32,
    pub planet_capture_time: f32,
    pub planet_ships_assessment_extents: f32,
    pub planet_ship_assessments_per_update: u32,

    pub max_total_ships: u32,
    pub max_ships_per_team: u32,

    pub(crate) home_planet_resource_generation_rate: [f32; 3],
    pub(crate) resource_generation_probabilities: [f32; 3],
    pub(crate) resource_generation_rate_min: [f32; 3],
    pub(crate) resource_generation_rate_max: [f32; 3],
    pub(crate) planet_resource_max_storage: [f32; 3],

    pub moon_distance_from_surface: f32,
    pub num_moons_home_planet: u32,
    pub(crate) num_moons_range: [i32; 2],
    pub(crate) moon_size_range: [f32; 2],

    pub build_spatial_database_parallel: bool,
    pub spatial_database_workers: usize,
    pub spatial_database_subdivisions: u32,
    pub ships_spatial_database_cell_capacity: usize,
    pub planet_navigation_grid_subdivisions: u32,
    pub planets_network_capacity: usize,

    pub initial_building: Option<String>,
    pub initial_ships: Vec<ShipSpawnParams>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0x5eed,
            team_names: vec!["crimson".to_string(), "azure".to_string()],
            time_step: 1.0 / 30.0,

            home_planet_spawn_radius: 400.0,
            simulation_bounds_padding: 100.0,
            min_planet_size: 10.0,
            max_planet_size: 30.0,
            neutral_planets_count: 16,
            planet_capture_time: 10.0,
            planet_ships_assessment_extents: 50.0,
            planet_ship_assessments_per_update: 8,

            max_total_ships: 2_000,
            max_ships_per_team: 500,

            home_planet_resource_generation_rate: [1.0, 1.0, 1.0],
            resource_generation_probabilities: [0.6, 0.5, 0.3],
            resource_generation_rate_min: [0.2, 0.2, 0.2],
            resource_generation_rate_max: [1.2, 1.2, 1.2],
            planet_resource_max_storage: [100.0, 100.0, 100.0],

            moon_distance_from_surface: 6.0,
            num_moons_home_planet: 4,
            num_moons_range: [1, 4],
            moon_size_range: [2.0, 4.0],

            build_spatial_database_parallel: true,
            spatial_database_workers: 4,
            spatial_database_subdivisions: 4,
            ships_spatial_database_cell_capacity: 32,
            planet_navigation_grid_subdivisions: 3,
            planets_network_capacity: 6,

            initial_building: Some("factory".to_string()),
            initial_ships: vec![ShipSpawnParams {
                ship: "worker".to_string(),
                count: 2,
            }],
        }
    }
}

impl SimulationConfig {
    pub fn builtin() -> Self {
        Self::from_json_str(BUILTIN_SIMULATION_CONFIG).expect("builtin simulation config should parse")
    }

    pub fn from_json_str(json: &str) -> Result<Self, SimulationConfigError> {
        let config: SimulationConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, SimulationConfigError> {
        let contents =
            fs::read_to_string(path).map_err(|source| SimulationConfigError::ReadFailed {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), SimulationConfigError> {
        if self.time_step <= 0.0 || !self.time_step.is_finite() {
            return Err(SimulationConfigError::Invalid(format!(
                "time_step must be positive, got {}",
                self.time_step
            )));
        }
        if self.min_planet_size > self.max_planet_size {
            return Err(SimulationConfigError::Invalid(format!(
                "min_planet_size {} exceeds max_planet_size {}",
                self.min_planet_size, self.max_planet_size
            )));
        }
        if self.num_moons_range[0] > self.num_moons_range[1] {
            return Err(SimulationConfigError::Invalid(
                "num_moons_range must be ascending".to_string(),
            ));
        }
        for (name, level) in [
            ("spatial_database_subdivisions", self.spatial_database_subdivisions),
            (
                "planet_navigation_grid_subdivisions",
                self.planet_navigation_grid_subdivisions,
            ),
        ] {
            if level > MAX_GRID_SUBDIVISIONS {
                return Err(SimulationConfigError::Invalid(format!(
                    "{name} {level} exceeds {MAX_GRID_SUBDIVISIONS}"
                )));
            }
        }
        Ok(())
    }

    /// Team names past the supported range are reported and dropped.
    pub fn playable_team_names(&self) -> &[String] {
        if self.team_names.len() > MAX_TEAMS {
            tracing::error!(
                target: "galaxy_sim::config",
                requested = self.team_names.len(),
                max = MAX_TEAMS,
                "simulation_config.too_many_teams"
            );
            &self.team_names[..MAX_TEAMS]
        } else {
            &self.team_names
        }
    }

    pub fn simulation_half_extents(&self) -> f32 {
        self.home_planet_spawn_radius + self.simulation_bounds_padding
    }

    pub fn home_planet_resource_generation_rate(&self) -> Vec3 {
        Vec3::from_array(self.home_planet_resource_generation_rate)
    }

    pub fn resource_generation_probabilities(&self) -> Vec3 {
        Vec3::from_array(self.resource_generation_probabilities)
    }

    pub fn resource_generation_rate_min(&self) -> Vec3 {
        Vec3::from_array(self.resource_generation_rate_min)
    }

    pub fn resource_generation_rate_max(&self) -> Vec3 {
        Vec3::from_array(self.resource_generation_rate_max)
    }

    pub fn planet_resource_max_storage(&self) -> Vec3 {
        Vec3::from_array(self.planet_resource_max_storage)
    }

    pub fn num_moons_range(&self) -> IVec2 {
        IVec2::from_array(self.num_moons_range)
    }

    pub fn moon_size_range(&self) -> Vec2 {
        Vec2::from_array(self.moon_size_range)
    }
}

#[derive(Debug, Error)]
pub enum SimulationConfigError {
    #[error("failed to parse simulation config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read simulation config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid simulation config: {0}")]
    Invalid(String),
}

#[derive(Resource, Debug, Clone, Default)]
pub struct SimulationConfigMetadata {
    path: Option<PathBuf>,
}

impl SimulationConfigMetadata {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    pub fn set_path(&mut self, path: Option<PathBuf>) {
        self.path = path;
    }
}

/// Load the simulation config from `GALAXY_SIM_CONFIG_PATH`, falling back to
/// the embedded defaults when the variable is unset or the file is unusable.
pub fn load_simulation_config_from_env() -> (SimulationConfig, SimulationConfigMetadata) {
    if let Some(path) = env::var("GALAXY_SIM_CONFIG_PATH").ok().map(PathBuf::from) {
        match SimulationConfig::from_file(&path) {
            Ok(config) => {
                tracing::info!(
                    target: "galaxy_sim::config",
                    path = %path.display(),
                    "simulation_config.loaded=file"
                );
                return (config, SimulationConfigMetadata::new(Some(path)));
            }
            Err(err) => {
                tracing::warn!(
                    target: "galaxy_sim::config",
                    path = %path.display(),
                    error = %err,
                    "simulation_config.load_failed"
                );
            }
        }
    }

    tracing::info!(target: "galaxy_sim::config", "simulation_config.loaded=builtin");
    (SimulationConfig::builtin(), SimulationConfigMetadata::new(None))
}
