//! Startup galaxy generation: empires with home planets, neutral planets,
//! moons, starting fleets and buildings, then the static navigation data.

use bevy::prelude::*;
use rand::{Rng, SeedableRng};

use crate::{
    building_systems::spawn_building,
    components::{
        CapturingWorkers, Moon, Planet, PlanetMoons, PlanetNetwork, PlanetNetworkLink,
        PlanetShipsAssessment, ResearchBonuses, ShipsAssessment, Team, TeamId, TeamManager,
    },
    deterministic_random::{entity_seed, next_f32, next_i32, GameRng},
    math::{equidistant_points_on_sphere, random_direction, random_in_sphere},
    planet_navigation::{PlanetNavigationBuildData, PlanetNavigationGrid},
    resources::{ShipCensus, TeamRoster},
    ship_systems::spawn_ship,
    simulation_config::SimulationConfig,
    spatial_database::SpatialDatabase,
    team_ai::{TeamManagerAi, TeamPlan},
    unit_catalog::{UnitCatalog, UnitCatalogHandle},
};

const HOME_PLACEMENT_ITERATIONS: usize = 50;

#[derive(Debug, Clone)]
struct SpawnedPlanet {
    entity: Entity,
    position: Vec3,
    radius: f32,
    team: Team,
    is_home: bool,
    moons: Vec<(Entity, Vec3)>,
}

pub fn generate_galaxy(
    mut commands: Commands,
    config: Res<SimulationConfig>,
    catalog: Res<UnitCatalogHandle>,
) {
    let mut rng = GameRng::seed_from_u64(config.seed);
    let catalog = catalog.catalog();
    let team_names = config.playable_team_names();
    let team_count = team_names.len();
    let half_extents = config.simulation_half_extents();

    let mut home_positions = Vec::with_capacity(team_count);
    equidistant_points_on_sphere(
        &mut home_positions,
        team_count,
        config.home_planet_spawn_radius,
        HOME_PLACEMENT_ITERATIONS,
    );

    let mut roster = TeamRoster::default();
    let mut planets = Vec::with_capacity(team_count + config.neutral_planets_count as usize);
    for (index, (name, position)) in team_names.iter().zip(home_positions).enumerate() {
        let team = Team::Empire(TeamId(index as u8));
        let manager = commands.spawn_empty().id();
        commands.entity(manager).insert((
            TeamManager {
                team: TeamId(index as u8),
                name: name.clone(),
            },
            TeamManagerAi::new(entity_seed(manager)),
            TeamPlan::default(),
            team,
        ));
        roster.register(name.clone(), manager);

        let planet = spawn_planet(&mut commands, &mut rng, &config, position, team, true, planets.len(), team_count);
        planets.push(planet);
    }

    for _ in 0..config.neutral_planets_count {
        let position = random_in_sphere(&mut rng, config.home_planet_spawn_radius);
        let planet = spawn_planet(
            &mut commands,
            &mut rng,
            &config,
            position,
            Team::Neutral,
            false,
            planets.len(),
            team_count,
        );
        planets.push(planet);
    }

    for planet in &mut planets {
        spawn_moons(&mut commands, &mut rng, &config, planet);
    }

    let mut census = ShipCensus {
        total: 0,
        per_team: vec![0; team_count],
    };
    spawn_initial_ships(&mut commands, &mut rng, &config, catalog, &planets, &mut census);
    spawn_initial_buildings(&mut commands, &config, catalog, &planets);

    let navigation_data: Vec<PlanetNavigationBuildData> = planets
        .iter()
        .map(|planet| PlanetNavigationBuildData {
            entity: planet.entity,
            position: planet.position,
            radius: planet.radius,
        })
        .collect();
    commands.insert_resource(SpatialDatabase::new(
        half_extents,
        config.spatial_database_subdivisions,
        config.ships_spatial_database_cell_capacity,
    ));
    commands.insert_resource(PlanetNavigationGrid::build(
        &navigation_data,
        half_extents,
        config.planet_navigation_grid_subdivisions,
    ));

    for (entity, network) in compute_planet_networks(&navigation_data, config.planets_network_capacity) {
        commands.entity(entity).insert(network);
    }

    tracing::info!(
        target: "galaxy_sim::world_gen",
        teams = team_count,
        planets = planets.len(),
        moons = planets.iter().map(|planet| planet.moons.len()).sum::<usize>(),
        ships = census.total,
        half_extents,
        "galaxy.generated"
    );
    commands.insert_resource(roster);
    commands.insert_resource(census);
}

#[allow(clippy::too_many_arguments)]
fn spawn_planet(
    commands: &mut Commands,
    rng: &mut GameRng,
    config: &SimulationConfig,
    position: Vec3,
    team: Team,
    is_home: bool,
    spawned_planets: usize,
    team_count: usize,
) -> SpawnedPlanet {
    let scale = next_f32(rng, config.min_planet_size, config.max_planet_size);
    let radius = scale * 0.5;

    let (rate_min, rate_max) = if is_home {
        let rate = config.home_planet_resource_generation_rate();
        (rate, rate)
    } else {
        (config.resource_generation_rate_min(), config.resource_generation_rate_max())
    };
    let mut generation_rate = Vec3::new(
        next_f32(rng, rate_min.x, rate_max.x),
        next_f32(rng, rate_min.y, rate_max.y),
        next_f32(rng, rate_min.z, rate_max.z),
    );
    if !is_home {
        let probabilities = config.resource_generation_probabilities();
        let mut enabled = [false; 3];
        for (channel, flag) in enabled.iter_mut().enumerate() {
            *flag = rng.gen::<f32>() <= probabilities[channel];
        }
        if !enabled.iter().any(|flag| *flag) {
            enabled[next_i32(rng, 0, 3) as usize] = true;
        }
        for (channel, flag) in enabled.iter().enumerate() {
            if !flag {
                generation_rate[channel] = 0.0;
            }
        }
    }

    let entity = commands
        .spawn((
            Transform::from_translation(position).with_scale(Vec3::splat(scale)),
            Planet {
                radius,
                ships_assessment_extents: config.planet_ships_assessment_extents,
                capture_time: config.planet_capture_time,
                resource_max_storage: config.planet_resource_max_storage(),
                resource_generation_rate: generation_rate,
                resource_current_storage: Vec3::ZERO,
                ships_assessment_counter: spawned_planets as i32,
                capture_progress: 0.0,
                last_converting_team: None,
                research_bonuses: ResearchBonuses::default(),
            },
            team,
            PlanetShipsAssessment(vec![ShipsAssessment::default(); team_count]),
            CapturingWorkers(vec![0.0; team_count]),
            PlanetNetwork::default(),
        ))
        .id();

    SpawnedPlanet {
        entity,
        position,
        radius,
        team,
        is_home,
        moons: Vec::new(),
    }
}

fn spawn_moons(commands: &mut Commands, rng: &mut GameRng, config: &SimulationConfig, planet: &mut SpawnedPlanet) {
    let count = if planet.is_home {
        config.num_moons_home_planet as i32
    } else {
        let range = config.num_moons_range();
        next_i32(rng, range.x, range.y + 1)
    };
    let size_range = config.moon_size_range();

    for _ in 0..count {
        let offset = random_direction(rng) * (planet.radius + config.moon_distance_from_surface);
        let position = planet.position + offset;
        let size = next_f32(rng, size_range.x, size_range.y);
        let mut moon = Moon::new(planet.entity, size * 0.5);
        moon.previous_team = planet.team;
        let entity = commands
            .spawn((
                Transform::from_translation(position).with_scale(Vec3::splat(size)),
                moon,
                planet.team,
            ))
            .id();
        planet.moons.push((entity, position));
    }
    commands
        .entity(planet.entity)
        .insert(PlanetMoons(planet.moons.iter().map(|(entity, _)| *entity).collect()));
}

fn spawn_initial_ships(
    commands: &mut Commands,
    rng: &mut GameRng,
    config: &SimulationConfig,
    catalog: &UnitCatalog,
    planets: &[SpawnedPlanet],
    census: &mut ShipCensus,
) {
    let bonuses = ResearchBonuses::default();
    for planet in planets.iter().filter(|planet| planet.is_home) {
        for spawn in &config.initial_ships {
            let Some(archetype) = catalog.ship_id(&spawn.ship) else {
                tracing::warn!(
                    target: "galaxy_sim::world_gen",
                    ship = %spawn.ship,
                    "initial_ship.unknown"
                );
                continue;
            };
            let Some(orbit_offset) = catalog.ship(archetype).map(|data| data.planet_orbit_offset) else {
                continue;
            };
            for _ in 0..spawn.count {
                let position = planet.position + random_direction(rng) * planet.radius * orbit_offset;
                if spawn_ship(commands, catalog, archetype, position, planet.team, &bonuses).is_some() {
                    if let Some(id) = planet.team.id() {
                        census.record_spawn(id);
                    }
                }
            }
        }
    }
}

fn spawn_initial_buildings(
    commands: &mut Commands,
    config: &SimulationConfig,
    catalog: &UnitCatalog,
    planets: &[SpawnedPlanet],
) {
    let Some(name) = config.initial_building.as_deref() else {
        return;
    };
    let Some(archetype) = catalog.building_id(name) else {
        tracing::warn!(target: "galaxy_sim::world_gen", building = name, "initial_building.unknown");
        return;
    };

    for planet in planets.iter().filter(|planet| planet.is_home) {
        let Some(&(moon_entity, moon_position)) = planet.moons.first() else {
            continue;
        };
        if let Some(building) = spawn_building(
            commands,
            catalog,
            archetype,
            planet.entity,
            moon_entity,
            moon_position,
            planet.team,
        ) {
            commands.add(move |world: &mut World| {
                if let Some(mut moon) = world.get_mut::<Moon>(moon_entity) {
                    moon.building = Some(building);
                }
            });
        }
    }
}

/// Every planet's closest neighbours, each pair measured once and offered to
/// both sides.
pub fn compute_planet_networks(
    planets: &[PlanetNavigationBuildData],
    capacity: usize,
) -> Vec<(Entity, PlanetNetwork)> {
    let mut networks: Vec<PlanetNetwork> = vec![PlanetNetwork::default(); planets.len()];
    for (i, source) in planets.iter().enumerate() {
        for (j, other) in planets.iter().enumerate().skip(i + 1) {
            let distance = source.position.distance(other.position);
            networks[i].add_sorted(
                PlanetNetworkLink {
                    entity: other.entity,
                    position: other.position,
                    distance,
                    radius: other.radius,
                },
                capacity,
            );
            networks[j].add_sorted(
                PlanetNetworkLink {
                    entity: source.entity,
                    position: source.position,
                    distance,
                    radius: source.radius,
                },
                capacity,
            );
        }
    }
    planets
        .iter()
        .map(|planet| planet.entity)
        .zip(networks)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Building, Ship};
    use bevy::prelude::World;
    use bevy_ecs::system::RunSystemOnce;

    fn generated_world(config: SimulationConfig) -> World {
        let mut world = World::default();
        world.insert_resource(config);
        world.insert_resource(UnitCatalogHandle::new(UnitCatalog::builtin()));
        world.run_system_once(generate_galaxy);
        world
    }

    #[test]
    fn galaxy_has_home_planets_neutrals_and_fleets() {
        let config = SimulationConfig::builtin();
        let team_count = config.team_names.len();
        let mut world = generated_world(config.clone());

        let roster = world.resource::<TeamRoster>();
        assert_eq!(roster.len(), team_count);
        assert_eq!(roster.alive_count(), team_count);

        let planets: Vec<(Team, usize, usize)> = world
            .query::<(&Team, &PlanetMoons, &PlanetShipsAssessment, &Planet)>()
            .iter(&world)
            .map(|(team, moons, assessment, _)| (*team, moons.0.len(), assessment.0.len()))
            .collect();
        assert_eq!(planets.len(), team_count + config.neutral_planets_count as usize);
        let homes: Vec<_> = planets.iter().filter(|(team, ..)| team.is_non_neutral()).collect();
        assert_eq!(homes.len(), team_count);
        assert!(homes
            .iter()
            .all(|(_, moons, _)| *moons == config.num_moons_home_planet as usize));
        assert!(planets.iter().all(|(_, _, slots)| *slots == team_count));

        let ships_per_home: u32 = config.initial_ships.iter().map(|spawn| spawn.count).sum();
        let ships = world.query::<&Ship>().iter(&world).count();
        assert_eq!(ships as u32, ships_per_home * team_count as u32);
        assert_eq!(world.resource::<ShipCensus>().total, ships as u32);

        let buildings = world.query::<&Building>().iter(&world).count();
        assert_eq!(buildings, team_count);
        let moons_with_buildings = world
            .query::<&Moon>()
            .iter(&world)
            .filter(|moon| moon.building.is_some())
            .count();
        assert_eq!(moons_with_buildings, team_count);

        assert!(world.get_resource::<SpatialDatabase>().is_some());
        assert!(world.get_resource::<PlanetNavigationGrid>().is_some());
    }

    #[test]
    fn neutral_planets_always_generate_something() {
        let config = SimulationConfig::from_json_str(
            r#"{ "team_names": ["crimson", "azure"], "neutral_planets_count": 12,
                 "resource_generation_probabilities": [0.0, 0.0, 0.0] }"#,
        )
        .unwrap();
        let mut world = generated_world(config);

        let mut neutral = 0;
        for (planet, team) in world.query::<(&Planet, &Team)>().iter(&world) {
            if team.is_non_neutral() {
                assert_eq!(planet.resource_generation_rate, Vec3::ONE);
                continue;
            }
            neutral += 1;
            let channels = planet
                .resource_generation_rate
                .to_array()
                .iter()
                .filter(|rate| **rate > 0.0)
                .count();
            assert_eq!(channels, 1);
        }
        assert_eq!(neutral, 12);
    }

    #[test]
    fn same_seed_builds_same_layout() {
        let layout = |world: &mut World| -> Vec<(Vec3, Vec3)> {
            world
                .query::<(&Transform, &Planet)>()
                .iter(world)
                .map(|(transform, planet)| (transform.translation, planet.resource_generation_rate))
                .collect()
        };
        let mut first = generated_world(SimulationConfig::builtin());
        let mut second = generated_world(SimulationConfig::builtin());
        assert_eq!(layout(&mut first), layout(&mut second));
    }

    #[test]
    fn networks_are_sorted_and_bounded() {
        let planets: Vec<PlanetNavigationBuildData> = (0..6)
            .map(|index| PlanetNavigationBuildData {
                entity: Entity::from_raw(index),
                position: Vec3::new(index as f32 * index as f32, 0.0, 0.0),
                radius: 1.0,
            })
            .collect();
        let networks = compute_planet_networks(&planets, 3);
        assert_eq!(networks.len(), 6);
        for (entity, network) in &networks {
            let links = network.links();
            assert_eq!(links.len(), 3);
            assert!(links.windows(2).all(|pair| pair[0].distance <= pair[1].distance));
            assert!(links.iter().all(|link| link.entity != *entity));
        }
        let first: Vec<u32> = networks[0].1.links().iter().map(|link| link.entity.index()).collect();
        assert_eq!(first, vec![1, 2, 3]);
    }
}
