mod common;

use galaxy_sim::{
    build_headless_app, components::Ship, run_turn, SimulationConfigMetadata, SimulationMetrics,
    SpatialDatabase, TeamPlan, TeamRoster,
};

#[test]
fn app_initializes_from_environment_config() {
    common::ensure_test_config();
    let mut app = build_headless_app();
    run_turn(&mut app);

    let metadata = app.world.resource::<SimulationConfigMetadata>();
    assert_eq!(metadata.path(), Some(&common::fixture_path()));
    assert_eq!(app.world.resource::<TeamRoster>().len(), 3);
}

#[test]
fn galaxy_produces_ships_and_plans() -> anyhow::Result<()> {
    let config = common::fixture_config()?;
    let team_count = config.team_names.len();
    let mut app = common::app_for(config);

    run_turn(&mut app);
    let initial_ships = app.world.resource::<SimulationMetrics>().total_ships;
    assert_eq!(initial_ships, 6 * team_count as u32);

    for _ in 0..600 {
        run_turn(&mut app);
    }

    let metrics = app.world.resource::<SimulationMetrics>().clone();
    assert_eq!(metrics.turn, 601);
    assert!(metrics.teams_alive >= 1);

    let mut plans = app.world.query::<&TeamPlan>();
    let plans: Vec<&TeamPlan> = plans.iter(&app.world).collect();
    assert!(!plans.is_empty());
    assert!(plans.iter().any(|plan| !plan.factory_actions.is_empty()));
    assert!(plans.iter().any(|plan| !plan.fighter_actions.is_empty()));

    let mut ships = app.world.query::<&Ship>();
    let live_ships = ships.iter(&app.world).count() as u32;
    assert_eq!(live_ships, metrics.total_ships);

    let database = app.world.resource::<SpatialDatabase>();
    assert!(database.total_elements() > 0);
    Ok(())
}
