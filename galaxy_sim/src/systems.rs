use bevy::{ecs::system::SystemParam, prelude::*};
use rayon::prelude::*;

use crate::{
    collectors::PlanetAssessmentCollector,
    components::{
        ActorType, Building, CapturingWorkers, Health, Moon, Planet, PlanetMoons, PlanetNetwork,
        PlanetShipsAssessment, Ship, Targetable, Team, TeamId, TeamManager,
    },
    intel::{MoonSnapshot, PlanetSnapshot, TeamFleet},
    resources::{ShipCensus, SimulationTick, TeamRoster},
    simulation_config::SimulationConfig,
    spatial_database::{SpatialDatabase, SpatialDatabaseElement},
    team_ai::{plan_team, PlanningWorld, TeamManagerAi, TeamPlan},
    team_ai_config::TeamAiConfigHandle,
    unit_catalog::UnitCatalogHandle,
};

/// Health assigned to every unit of a defeated empire so the death pass
/// removes them.
pub const DEFEATED_UNIT_HEALTH: f32 = -1000.0;

/// Refills the spatial database from every targetable entity. Runs first each
/// tick so all later queries see current positions.
pub fn rebuild_spatial_database(
    config: Res<SimulationConfig>,
    mut database: ResMut<SpatialDatabase>,
    targetables: Query<(Entity, &Transform, &Team, &ActorType), With<Targetable>>,
) {
    let elements: Vec<SpatialDatabaseElement> = targetables
        .iter()
        .map(|(entity, transform, team, actor)| SpatialDatabaseElement {
            entity,
            position: transform.translation,
            team: team.as_byte(),
            actor: *actor,
        })
        .collect();

    database.clear_and_resize();
    if config.build_spatial_database_parallel {
        database.build_parallel(&elements, config.spatial_database_workers);
    } else {
        for element in elements {
            database.add_to_data_base(element);
        }
    }
}

/// Recounts nearby ships per team for a slice of the planets each tick.
pub fn assess_planet_ships(
    config: Res<SimulationConfig>,
    database: Res<SpatialDatabase>,
    mut planets: Query<(&Transform, &mut Planet, &mut PlanetShipsAssessment)>,
) {
    let total_planets = planets.iter().len() as i32;
    let step = total_planets.min(config.planet_ship_assessments_per_update as i32);
    for (transform, mut planet, mut assessment) in &mut planets {
        planet.ships_assessment_counter -= step;
        if planet.ships_assessment_counter >= 0 {
            continue;
        }
        planet.ships_assessment_counter += total_planets;
        for slot in assessment.0.iter_mut() {
            *slot = Default::default();
        }
        let extents = Vec3::splat(planet.ships_assessment_extents);
        database.query_aabb(
            transform.translation,
            extents,
            &mut PlanetAssessmentCollector::new(&mut assessment.0),
        );
    }
}

/// Team with the highest positive capture speed; ties keep the lowest id.
fn majority_capturing_team(capturing: &[f32]) -> Option<TeamId> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &speed) in capturing.iter().enumerate() {
        if speed > 0.0 && best.map_or(true, |(_, best_speed)| speed > best_speed) {
            best = Some((index, speed));
        }
    }
    best.map(|(index, _)| TeamId(index as u8))
}

#[derive(SystemParam)]
pub struct PlanetCaptureParams<'w, 's> {
    config: Res<'w, SimulationConfig>,
    planets: Query<
        'w,
        's,
        (
            Entity,
            &'static mut Planet,
            &'static mut Team,
            &'static mut CapturingWorkers,
            &'static PlanetMoons,
        ),
    >,
    moons: Query<'w, 's, (&'static Moon, &'static mut Team), Without<Planet>>,
    buildings: Query<
        'w,
        's,
        &'static mut Team,
        (With<Building>, Without<Planet>, Without<Moon>),
    >,
}

/// Advances capture progress for the team with the strongest capture effort.
/// A completed capture converts the planet, its moons and their buildings.
pub fn capture_planets(params: PlanetCaptureParams) {
    let PlanetCaptureParams {
        config,
        mut planets,
        mut moons,
        mut buildings,
    } = params;
    let dt = config.time_step;

    for (entity, mut planet, mut team, mut capturing, planet_moons) in &mut planets {
        let majority = majority_capturing_team(&capturing.0);
        if majority.is_none() || majority != planet.last_converting_team {
            planet.capture_progress = 0.0;
        }

        if let Some(capturer) = majority {
            planet.last_converting_team = Some(capturer);
            if let Some(speed) = capturing.0.get(capturer.index()) {
                planet.capture_progress += dt * speed;
            }

            if planet.capture_progress >= planet.capture_time {
                planet.capture_progress = 0.0;
                let new_team = Team::Empire(capturer);
                tracing::info!(
                    target: "galaxy_sim::planets",
                    planet = ?entity,
                    from = ?*team,
                    to = capturer.0,
                    "planet.captured"
                );
                *team = new_team;
                for &moon_entity in &planet_moons.0 {
                    let Ok((moon, mut moon_team)) = moons.get_mut(moon_entity) else {
                        continue;
                    };
                    *moon_team = new_team;
                    if let Some(building) = moon.building {
                        if let Ok(mut building_team) = buildings.get_mut(building) {
                            *building_team = new_team;
                        }
                    }
                }
            }
        }

        for slot in capturing.0.iter_mut() {
            *slot = 0.0;
        }
    }
}

/// Accumulates resources clamped to storage, then drops this tick's research
/// bonuses.
pub fn generate_planet_resources(config: Res<SimulationConfig>, mut planets: Query<&mut Planet>) {
    let dt = config.time_step;
    for mut planet in &mut planets {
        let rate = planet.resource_generation_rate
            + planet.research_bonuses.planet_resource_generation_rate_add;
        let max = planet.resource_max_storage;
        planet.resource_current_storage =
            (planet.resource_current_storage + rate * dt).clamp(Vec3::ZERO, max);
        planet.research_bonuses.reset();
    }
}

type PlanetSnapshotItem<'a> = (
    Entity,
    &'a Transform,
    &'a Planet,
    &'a Team,
    &'a PlanetShipsAssessment,
    &'a PlanetNetwork,
    &'a PlanetMoons,
);

/// Copies every planet into planner snapshots, ordered by entity.
pub fn snapshot_planets<'a>(
    planets: impl Iterator<Item = PlanetSnapshotItem<'a>>,
    moons: &Query<(&Transform, &Moon)>,
    buildings: &Query<&Building>,
) -> Vec<PlanetSnapshot> {
    let mut snapshots: Vec<PlanetSnapshot> = planets
        .map(|(entity, transform, planet, team, assessment, network, planet_moons)| {
            let moons = planet_moons
                .0
                .iter()
                .filter_map(|&moon_entity| {
                    let (moon_transform, moon) = moons.get(moon_entity).ok()?;
                    Some(MoonSnapshot {
                        entity: moon_entity,
                        position: moon_transform.translation,
                        radius: moon.radius,
                        building: moon
                            .building
                            .and_then(|building| buildings.get(building).ok())
                            .map(|building| building.data.actor_type()),
                    })
                })
                .collect();
            PlanetSnapshot {
                entity,
                position: transform.translation,
                radius: planet.radius,
                team: *team,
                resource_generation_rate: planet.resource_generation_rate,
                resource_current_storage: planet.resource_current_storage,
                resource_max_storage: planet.resource_max_storage,
                ships_assessment: assessment.0.clone(),
                network: network.links().to_vec(),
                moons,
            }
        })
        .collect();
    snapshots.sort_by_key(|snapshot| snapshot.entity);
    snapshots
}

#[derive(SystemParam)]
pub struct TeamPlanningParams<'w, 's> {
    catalog: Res<'w, UnitCatalogHandle>,
    ai_config: Res<'w, TeamAiConfigHandle>,
    roster: Res<'w, TeamRoster>,
    planets: Query<
        'w,
        's,
        (
            Entity,
            &'static Transform,
            &'static Planet,
            &'static Team,
            &'static PlanetShipsAssessment,
            &'static PlanetNetwork,
            &'static PlanetMoons,
        ),
    >,
    moons: Query<'w, 's, (&'static Transform, &'static Moon)>,
    buildings: Query<'w, 's, &'static Building>,
    ships: Query<'w, 's, (&'static Ship, &'static Team)>,
    managers: Query<
        'w,
        's,
        (
            Entity,
            &'static TeamManager,
            &'static mut TeamManagerAi,
            &'static mut TeamPlan,
        ),
    >,
}

/// Plans every empire in parallel against one shared snapshot of the galaxy.
pub fn plan_teams(params: TeamPlanningParams) {
    let TeamPlanningParams {
        catalog,
        ai_config,
        roster,
        planets,
        moons,
        buildings,
        ships,
        mut managers,
    } = params;

    let mut fleets = vec![TeamFleet::default(); roster.len()];
    for (ship, team) in &ships {
        if let Some(fleet) = team.index().and_then(|index| fleets.get_mut(index)) {
            fleet.record(ship.data.actor_type(), ship.data.value);
        }
    }
    let world = PlanningWorld::new(
        snapshot_planets(planets.iter(), &moons, &buildings),
        catalog.get(),
        fleets,
    );

    let mut jobs: Vec<(Entity, TeamId, TeamManagerAi)> = managers
        .iter()
        .map(|(entity, manager, brain, _)| (entity, manager.team, brain.clone()))
        .collect();
    jobs.sort_by_key(|(_, team, _)| *team);

    let profiles = ai_config.config();
    let results: Vec<(Entity, TeamManagerAi, TeamPlan)> = jobs
        .into_par_iter()
        .map(|(entity, team, mut brain)| {
            let plan = plan_team(team, &mut brain, profiles.profile_for(team), &world);
            tracing::debug!(
                target: "galaxy_sim::team_ai",
                team = team.0,
                fighters = plan.fighter_actions.len(),
                workers = plan.worker_actions.len(),
                traders = plan.trader_actions.len(),
                factories = plan.factory_actions.len(),
                defeated = brain.is_defeated,
                "team.planned"
            );
            (entity, brain, plan)
        })
        .collect();

    for (entity, brain, plan) in results {
        if let Ok((_, _, mut stored_brain, mut stored_plan)) = managers.get_mut(entity) {
            *stored_brain = brain;
            *stored_plan = plan;
        }
    }
}

/// Removes empires that lost their last planet: the manager is despawned and
/// every unit of that team is marked for death.
pub fn handle_defeated_teams(
    mut commands: Commands,
    mut roster: ResMut<TeamRoster>,
    managers: Query<(Entity, &TeamManager, &TeamManagerAi)>,
    mut units: Query<(&Team, &mut Health)>,
) {
    for (entity, manager, brain) in &managers {
        if !brain.is_defeated {
            continue;
        }
        let defeated = Team::Empire(manager.team);
        let mut units_lost = 0u32;
        for (team, mut health) in &mut units {
            if *team == defeated {
                health.current = DEFEATED_UNIT_HEALTH;
                units_lost += 1;
            }
        }
        roster.mark_defeated(manager.team);
        commands.entity(entity).despawn();
        tracing::info!(
            target: "galaxy_sim::team_ai",
            team = manager.team.0,
            name = %manager.name,
            units_lost,
            remaining = roster.alive_count(),
            "team.defeated"
        );
    }
}

/// Despawns every entity whose health dropped to zero or below, freeing the
/// moon slot of destroyed buildings.
pub fn despawn_dead(
    mut commands: Commands,
    dead: Query<(Entity, &Health, Option<&Building>)>,
    mut moons: Query<&mut Moon>,
) {
    for (entity, health, building) in &dead {
        if !health.is_dead() {
            continue;
        }
        if let Some(building) = building {
            if let Ok(mut moon) = moons.get_mut(building.moon) {
                if moon.building == Some(entity) {
                    moon.building = None;
                }
            }
        }
        commands.entity(entity).despawn();
    }
}

pub fn refresh_ship_census(
    roster: Res<TeamRoster>,
    mut census: ResMut<ShipCensus>,
    ships: Query<&Team, With<Ship>>,
) {
    census.total = 0;
    census.per_team.clear();
    census.per_team.resize(roster.len(), 0);
    for team in &ships {
        census.total += 1;
        if let Some(slot) = team.index().and_then(|index| census.per_team.get_mut(index)) {
            *slot += 1;
        }
    }
}

pub fn advance_tick(mut tick: ResMut<SimulationTick>) {
    tick.0 = tick.0.wrapping_add(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        components::{ResearchBonuses, ShipsAssessment},
        deterministic_random::{deterministic_rng, entity_seed},
        ship_systems::spawn_ship,
        team_ai_config::TeamAiConfig,
        unit_catalog::UnitCatalog,
    };
    use bevy::{ecs::system::CommandQueue, prelude::World};
    use bevy_ecs::system::RunSystemOnce;
    use std::sync::Arc;

    fn test_planet(counter: i32) -> Planet {
        Planet {
            radius: 5.0,
            ships_assessment_extents: 20.0,
            capture_time: 1.0,
            resource_max_storage: Vec3::splat(10.0),
            resource_generation_rate: Vec3::new(1.0, 0.0, 2.0),
            resource_current_storage: Vec3::ZERO,
            ships_assessment_counter: counter,
            capture_progress: 0.0,
            last_converting_team: None,
            research_bonuses: ResearchBonuses::default(),
        }
    }

    fn factory_building(planet: Entity, moon: Entity) -> Building {
        let catalog = UnitCatalog::builtin();
        let archetype = catalog.building_id("factory").unwrap();
        Building {
            data: Arc::clone(catalog.building(archetype).unwrap()),
            archetype,
            planet,
            moon,
            rng: deterministic_rng(&[4]),
        }
    }

    fn base_world() -> World {
        let mut world = World::default();
        world.insert_resource(SimulationConfig {
            time_step: 0.5,
            planet_ship_assessments_per_update: 1,
            ..SimulationConfig::default()
        });
        world.insert_resource(SpatialDatabase::new(100.0, 2, 8));
        world.insert_resource(UnitCatalogHandle::new(UnitCatalog::builtin()));
        world.insert_resource(TeamAiConfigHandle::new(TeamAiConfig::builtin()));
        world.insert_resource(SimulationTick::default());
        world.insert_resource(ShipCensus::default());
        world
    }

    fn spawn_test_ship(world: &mut World, name: &str, position: Vec3, team: Team) -> Entity {
        let catalog = UnitCatalog::builtin();
        let archetype = catalog.ship_id(name).unwrap();
        let mut queue = CommandQueue::default();
        let entity = {
            let mut commands = Commands::new(&mut queue, world);
            spawn_ship(&mut commands, &catalog, archetype, position, team, &ResearchBonuses::default())
                .unwrap()
        };
        queue.apply(world);
        entity
    }

    #[test]
    fn rebuild_indexes_targetables_by_team() {
        let mut world = base_world();
        let crimson = Team::Empire(TeamId(0));
        let a = spawn_test_ship(&mut world, "fighter", Vec3::new(10.0, 0.0, 0.0), crimson);
        let b = spawn_test_ship(&mut world, "worker", Vec3::new(-30.0, 5.0, 0.0), Team::Empire(TeamId(1)));
        world.spawn((Transform::default(), Team::Neutral, ActorType::Factory));

        world.run_system_once(rebuild_spatial_database);

        let database = world.resource::<SpatialDatabase>();
        assert_eq!(database.total_elements(), 2);
        let mut indexed: Vec<(Entity, u8)> = database
            .cells()
            .iter()
            .enumerate()
            .flat_map(|(index, _)| database.elements_in_cell(index).to_vec())
            .map(|element| (element.entity, element.team))
            .collect();
        indexed.sort();
        let mut expected = vec![(a, 0), (b, 1)];
        expected.sort();
        assert_eq!(indexed, expected);
    }

    #[test]
    fn planet_assessment_is_staggered() {
        let mut world = base_world();
        let crimson = Team::Empire(TeamId(0));
        spawn_test_ship(&mut world, "fighter", Vec3::new(3.0, 0.0, 0.0), crimson);
        spawn_test_ship(&mut world, "worker", Vec3::new(0.0, 3.0, 0.0), crimson);
        spawn_test_ship(&mut world, "fighter", Vec3::new(0.0, 0.0, 3.0), Team::Empire(TeamId(1)));
        world.run_system_once(rebuild_spatial_database);

        let due = world
            .spawn((
                Transform::default(),
                test_planet(0),
                PlanetShipsAssessment(vec![ShipsAssessment::default(); 2]),
            ))
            .id();
        let later = world
            .spawn((
                Transform::default(),
                test_planet(1),
                PlanetShipsAssessment(vec![ShipsAssessment::default(); 2]),
            ))
            .id();

        world.run_system_once(assess_planet_ships);

        let assessment = &world.get::<PlanetShipsAssessment>(due).unwrap().0;
        assert_eq!(assessment[0].fighters, 1);
        assert_eq!(assessment[0].workers, 1);
        assert_eq!(assessment[1].fighters, 1);
        assert_eq!(world.get::<Planet>(due).unwrap().ships_assessment_counter, 1);

        let untouched = &world.get::<PlanetShipsAssessment>(later).unwrap().0;
        assert_eq!(untouched[0].total(), 0);
        assert_eq!(world.get::<Planet>(later).unwrap().ships_assessment_counter, 0);
    }

    #[test]
    fn majority_capture_converts_planet_moons_and_buildings() {
        let mut world = base_world();
        let planet = world.spawn_empty().id();
        let moon = world.spawn((Moon::new(planet, 1.0), Team::Neutral)).id();
        let building = world.spawn((Team::Neutral, factory_building(planet, moon))).id();
        world.get_mut::<Moon>(moon).unwrap().building = Some(building);
        world.entity_mut(planet).insert((
            Transform::default(),
            test_planet(0),
            Team::Neutral,
            CapturingWorkers(vec![0.4, 1.0]),
            PlanetMoons(vec![moon]),
        ));

        world.run_system_once(capture_planets);
        {
            let state = world.get::<Planet>(planet).unwrap();
            assert_eq!(state.last_converting_team, Some(TeamId(1)));
            assert!((state.capture_progress - 0.5).abs() < 1e-6);
            assert_eq!(world.get::<CapturingWorkers>(planet).unwrap().0, vec![0.0, 0.0]);
            assert_eq!(*world.get::<Team>(planet).unwrap(), Team::Neutral);
        }

        world.get_mut::<CapturingWorkers>(planet).unwrap().0 = vec![0.0, 1.0];
        world.run_system_once(capture_planets);

        let captured = Team::Empire(TeamId(1));
        assert_eq!(*world.get::<Team>(planet).unwrap(), captured);
        assert_eq!(*world.get::<Team>(moon).unwrap(), captured);
        assert_eq!(*world.get::<Team>(building).unwrap(), captured);
        assert_eq!(world.get::<Planet>(planet).unwrap().capture_progress, 0.0);
    }

    #[test]
    fn capture_progress_resets_when_majority_changes() {
        let mut world = base_world();
        let planet = world
            .spawn((
                test_planet(0),
                Team::Neutral,
                CapturingWorkers(vec![1.0, 0.0]),
                PlanetMoons::default(),
            ))
            .id();
        world.run_system_once(capture_planets);
        assert!(world.get::<Planet>(planet).unwrap().capture_progress > 0.0);

        world.get_mut::<CapturingWorkers>(planet).unwrap().0 = vec![0.0, 0.5];
        world.run_system_once(capture_planets);
        let state = world.get::<Planet>(planet).unwrap();
        assert_eq!(state.last_converting_team, Some(TeamId(1)));
        assert!((state.capture_progress - 0.25).abs() < 1e-6);

        world.run_system_once(capture_planets);
        assert_eq!(world.get::<Planet>(planet).unwrap().capture_progress, 0.0);
    }

    #[test]
    fn resources_clamp_and_bonuses_reset() {
        let mut world = base_world();
        let mut planet = test_planet(0);
        planet.resource_current_storage = Vec3::new(9.8, 0.0, 0.0);
        planet.research_bonuses.planet_resource_generation_rate_add = Vec3::new(0.0, 2.0, 0.0);
        let entity = world.spawn(planet).id();

        world.run_system_once(generate_planet_resources);

        let planet = world.get::<Planet>(entity).unwrap();
        assert_eq!(planet.resource_current_storage, Vec3::new(10.0, 1.0, 1.0));
        assert_eq!(planet.research_bonuses, ResearchBonuses::default());
    }

    #[test]
    fn defeated_team_loses_manager_and_units() {
        let mut world = base_world();
        let mut roster = TeamRoster::default();
        let manager = world.spawn_empty().id();
        let team = roster.register("crimson", manager);
        roster.register("azure", Entity::from_raw(999));
        world.insert_resource(roster);

        let mut brain = TeamManagerAi::new(1);
        brain.is_defeated = true;
        world.entity_mut(manager).insert((
            TeamManager {
                team,
                name: "crimson".to_string(),
            },
            brain,
            TeamPlan::default(),
        ));
        let doomed = spawn_test_ship(&mut world, "fighter", Vec3::ZERO, Team::Empire(team));
        let survivor = spawn_test_ship(&mut world, "fighter", Vec3::ZERO, Team::Empire(TeamId(1)));

        world.run_system_once(handle_defeated_teams);
        world.run_system_once(despawn_dead);
        world.run_system_once(refresh_ship_census);

        assert!(world.get_entity(manager).is_none());
        assert!(world.get_entity(doomed).is_none());
        assert!(world.get_entity(survivor).is_some());
        assert!(!world.resource::<TeamRoster>().is_alive(team));
        let census = world.resource::<ShipCensus>();
        assert_eq!(census.total, 1);
        assert_eq!(census.per_team, vec![0, 1]);
    }

    #[test]
    fn dead_buildings_free_their_moon() {
        let mut world = base_world();
        let planet = world.spawn_empty().id();
        let moon = world.spawn(Moon::new(planet, 1.0)).id();
        let building = world
            .spawn((factory_building(planet, moon), Health { max: 5.0, current: 0.0 }))
            .id();
        world.get_mut::<Moon>(moon).unwrap().building = Some(building);

        world.run_system_once(despawn_dead);

        assert!(world.get_entity(building).is_none());
        assert_eq!(world.get::<Moon>(moon).unwrap().building, None);
    }

    #[test]
    fn planning_writes_plans_for_every_manager() {
        let mut world = base_world();
        let mut roster = TeamRoster::default();
        let managers: Vec<Entity> = (0..2)
            .map(|index| {
                let entity = world.spawn_empty().id();
                let team = roster.register(format!("team-{index}"), entity);
                world.entity_mut(entity).insert((
                    TeamManager {
                        team,
                        name: format!("team-{index}"),
                    },
                    TeamManagerAi::new(entity_seed(entity)),
                    TeamPlan::default(),
                ));
                entity
            })
            .collect();
        world.insert_resource(roster);

        world.spawn((
            Transform::from_translation(Vec3::new(-50.0, 0.0, 0.0)),
            test_planet(0),
            Team::Empire(TeamId(0)),
            PlanetShipsAssessment(vec![ShipsAssessment::default(); 2]),
            PlanetNetwork::default(),
            PlanetMoons::default(),
        ));
        world.spawn((
            Transform::from_translation(Vec3::new(50.0, 0.0, 0.0)),
            test_planet(0),
            Team::Neutral,
            PlanetShipsAssessment(vec![ShipsAssessment::default(); 2]),
            PlanetNetwork::default(),
            PlanetMoons::default(),
        ));

        world.run_system_once(plan_teams);

        let owner = world.get::<TeamManagerAi>(managers[0]).unwrap();
        assert!(!owner.is_defeated);
        assert!(!world.get::<TeamPlan>(managers[0]).unwrap().is_empty());
        assert!(world.get::<TeamManagerAi>(managers[1]).unwrap().is_defeated);
        assert!(world.get::<TeamPlan>(managers[1]).unwrap().is_empty());
    }

    #[test]
    fn majority_prefers_strongest_then_lowest_id() {
        assert_eq!(majority_capturing_team(&[0.0, 0.0]), None);
        assert_eq!(majority_capturing_team(&[0.5, 2.0, 1.0]), Some(TeamId(1)));
        assert_eq!(majority_capturing_team(&[1.0, 1.0]), Some(TeamId(0)));
    }
}
