//! Core simulation crate for the galaxy headless prototype.
//!
//! A uniform-grid spatial database answers proximity queries, and a
//! utility-AI planner turns each empire's view of the galaxy into weighted
//! action lists that ship and building systems consume. [`run_turn`]
//! resolves one deterministic tick.

pub mod ai_processor;
pub mod building_systems;
pub mod collectors;
pub mod components;
pub mod deterministic_random;
pub mod hashing;
pub mod intel;
pub mod math;
pub mod metrics;
pub mod planet_navigation;
pub mod resources;
pub mod ship_systems;
pub mod simulation_config;
pub mod spatial_database;
pub mod systems;
pub mod team_ai;
pub mod team_ai_config;
pub mod uniform_grid;
pub mod unit_catalog;
pub mod weighted_random;
pub mod world_gen;

use std::sync::Arc;

use bevy::prelude::*;

pub use components::{ActorType, Health, Moon, Planet, Ship, Team, TeamId, TeamManager};
pub use metrics::SimulationMetrics;
pub use resources::{
    capability_enabled, ShipCensus, SimulationCapabilities, SimulationTick, TeamRoster,
};
pub use simulation_config::{
    load_simulation_config_from_env, SimulationConfig, SimulationConfigError,
    SimulationConfigMetadata,
};
pub use spatial_database::{SpatialDatabase, SpatialDatabaseElement, SpatialQueryCollector};
pub use team_ai::{plan_team, PlanningWorld, TeamManagerAi, TeamPlan};
pub use team_ai_config::{load_team_ai_config_from_env, TeamAiConfig, TeamAiConfigHandle};
pub use uniform_grid::UniformOriginGrid;
pub use unit_catalog::{load_unit_catalog_from_env, UnitCatalog, UnitCatalogHandle};

/// Construct a Bevy [`App`] with configuration loaded from the environment
/// (embedded defaults when no override is set).
pub fn build_headless_app() -> App {
    let (config, metadata) = load_simulation_config_from_env();
    let mut app = build_headless_app_with(
        config,
        load_team_ai_config_from_env(),
        load_unit_catalog_from_env(),
    );
    app.insert_resource(metadata);
    app
}

/// Construct a Bevy [`App`] from explicit configuration. The galaxy is
/// generated on the first update.
pub fn build_headless_app_with(
    config: SimulationConfig,
    team_ai: Arc<TeamAiConfig>,
    catalog: Arc<UnitCatalog>,
) -> App {
    let mut app = App::new();

    app.insert_resource(config)
        .insert_resource(SimulationConfigMetadata::default())
        .insert_resource(TeamAiConfigHandle::new(team_ai))
        .insert_resource(UnitCatalogHandle::new(catalog))
        .insert_resource(SimulationTick::default())
        .insert_resource(SimulationCapabilities::default())
        .insert_resource(SimulationMetrics::default())
        .add_plugins(MinimalPlugins)
        .add_systems(Startup, world_gen::generate_galaxy)
        .add_systems(
            Update,
            (
                (
                    systems::rebuild_spatial_database,
                    (systems::plan_teams, systems::handle_defeated_teams)
                        .chain()
                        .run_if(capability_enabled(SimulationCapabilities::TEAM_AI)),
                    ship_systems::fighter_ai,
                    ship_systems::worker_ai,
                    ship_systems::trader_ai,
                    ship_systems::navigate_ships,
                )
                    .chain(),
                (
                    ship_systems::fighter_attack
                        .run_if(capability_enabled(SimulationCapabilities::COMBAT)),
                    ship_systems::worker_capture
                        .run_if(capability_enabled(SimulationCapabilities::CAPTURE)),
                    ship_systems::worker_build
                        .run_if(capability_enabled(SimulationCapabilities::CONSTRUCTION)),
                    ship_systems::trader_trade
                        .run_if(capability_enabled(SimulationCapabilities::TRADE)),
                    (
                        building_systems::turret_acquire_targets,
                        building_systems::turret_fire,
                    )
                        .chain()
                        .run_if(capability_enabled(SimulationCapabilities::COMBAT)),
                )
                    .chain(),
                (
                    building_systems::advance_construction
                        .run_if(capability_enabled(SimulationCapabilities::CONSTRUCTION)),
                    building_systems::apply_research,
                    building_systems::run_factories
                        .run_if(capability_enabled(SimulationCapabilities::PRODUCTION)),
                    systems::assess_planet_ships,
                    systems::capture_planets
                        .run_if(capability_enabled(SimulationCapabilities::CAPTURE)),
                    systems::generate_planet_resources,
                )
                    .chain(),
                (
                    systems::despawn_dead,
                    systems::refresh_ship_census,
                    systems::advance_tick,
                    metrics::collect_metrics,
                )
                    .chain(),
            )
                .chain(),
        );

    app
}

/// Execute a single simulation tick.
///
/// Each call processes the chained systems configured in
/// [`build_headless_app_with`] (spatial rebuild → team planning → ship
/// controllers and navigation → combat, capture, construction and trade →
/// buildings → planet upkeep → death → tick increment → metrics).
pub fn run_turn(app: &mut App) {
    app.update();
}
