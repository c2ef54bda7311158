use std::sync::Arc;

use bevy::{ecs::system::SystemParam, prelude::*};

use crate::{
    collectors::ShipQueryCollector,
    components::{
        Building, Factory, Health, Moon, Planet, Research, ResearchBonuses, Targetable, Team,
        Turret,
    },
    deterministic_random::{deterministic_rng, entity_seed, next_f32},
    resources::{ShipCensus, TeamRoster},
    ship_systems::spawn_ship,
    simulation_config::SimulationConfig,
    spatial_database::SpatialDatabase,
    team_ai::TeamPlan,
    unit_catalog::{BuildingArchetypeId, BuildingRole, UnitCatalog, UnitCatalogHandle},
    weighted_random::weighted_random_index,
};

/// Spawns a finished building. The caller records the returned entity on the
/// moon.
pub fn spawn_building(
    commands: &mut Commands,
    catalog: &UnitCatalog,
    archetype: BuildingArchetypeId,
    planet: Entity,
    moon: Entity,
    position: Vec3,
    team: Team,
) -> Option<Entity> {
    let data = catalog.building(archetype)?;
    let entity = commands
        .spawn((
            Transform::from_translation(position),
            team,
            Health::new(data.max_health),
            data.actor_type(),
            Targetable,
        ))
        .id();

    let mut rng = deterministic_rng(&[entity_seed(entity)]);
    let mut entity_commands = commands.entity(entity);
    match &data.role {
        BuildingRole::Factory => {
            entity_commands.insert(Factory::default());
        }
        BuildingRole::Turret(turret) => {
            entity_commands.insert(Turret {
                detection_timer: next_f32(&mut rng, 0.0, turret.ship_detection_interval),
                ..Turret::default()
            });
        }
        BuildingRole::Research(_) => {
            entity_commands.insert(Research);
        }
    }
    entity_commands.insert(Building {
        data: Arc::clone(data),
        archetype,
        planet,
        moon,
        rng,
    });

    tracing::debug!(
        target: "galaxy_sim::buildings",
        building = %data.name,
        ?team,
        "building.spawned"
    );
    Some(entity)
}

/// Advances moon construction with the build speed workers contributed this
/// tick. Progress is dropped when the planet changes hands or the moon is
/// already occupied.
pub fn advance_construction(
    mut commands: Commands,
    config: Res<SimulationConfig>,
    catalog: Res<UnitCatalogHandle>,
    planets: Query<&Team, With<Planet>>,
    mut moons: Query<(Entity, &Transform, &mut Moon)>,
) {
    let dt = config.time_step;
    for (entity, transform, mut moon) in &mut moons {
        let Ok(&team) = planets.get(moon.planet) else {
            continue;
        };
        if team != moon.previous_team {
            moon.clear_construction();
        }

        match moon.construction {
            Some(archetype) if moon.building.is_none() => {
                match catalog.catalog().building(archetype).map(|data| data.build_time) {
                    Some(build_time) => {
                        moon.build_progress += moon.cumulative_build_speed * dt;
                        if moon.build_progress >= build_time {
                            let planet = moon.planet;
                            moon.building = spawn_building(
                                &mut commands,
                                catalog.catalog(),
                                archetype,
                                planet,
                                entity,
                                transform.translation,
                                team,
                            );
                            moon.clear_construction();
                        }
                    }
                    None => moon.clear_construction(),
                }
            }
            _ => moon.clear_construction(),
        }

        moon.cumulative_build_speed = 0.0;
        moon.previous_team = team;
    }
}

/// Keeps or drops the current target and, on the detection interval, looks
/// for the closest enemy in range.
pub fn turret_acquire_targets(
    config: Res<SimulationConfig>,
    database: Res<SpatialDatabase>,
    transforms: Query<&Transform>,
    mut turrets: Query<(Entity, &Transform, &Team, &Building, &mut Turret)>,
) {
    let dt = config.time_step;
    for (entity, transform, team, building, mut turret) in &mut turrets {
        let Some(data) = building.data.turret() else {
            continue;
        };
        let position = transform.translation;

        turret.active_target = turret.active_target.and_then(|(target, _)| {
            let target_position = transforms.get(target).ok()?.translation;
            (position.distance(target_position) <= data.attack_range).then_some((target, target_position))
        });

        if team.is_non_neutral() {
            turret.detection_timer -= dt;
            if turret.detection_timer <= 0.0 {
                if turret.active_target.is_none() {
                    let mut collector = ShipQueryCollector::new(entity, position, team.as_byte());
                    database.query_aabb_cell_proximity_order(
                        position,
                        Vec3::splat(data.attack_range),
                        &mut collector,
                    );
                    turret.active_target = collector
                        .closest_enemy()
                        .map(|enemy| (enemy.entity, enemy.position));
                }
                turret.detection_timer += data.ship_detection_interval;
            }
        }

        if turret.attack_timer > 0.0 {
            turret.attack_timer -= dt;
        }
        if turret.active_target.is_some() && turret.attack_timer <= 0.0 {
            turret.must_attack = true;
        }
    }
}

/// Each shot costs the hosting planet resources; a planet that cannot pay
/// keeps the turret silent.
pub fn turret_fire(
    mut turrets: Query<(&Building, &mut Turret)>,
    mut planets: Query<&mut Planet>,
    mut health: Query<&mut Health>,
) {
    for (building, mut turret) in &mut turrets {
        if !turret.must_attack {
            continue;
        }
        turret.must_attack = false;
        let Some(data) = building.data.turret() else {
            continue;
        };

        let can_fire = match planets.get_mut(building.planet) {
            Ok(mut planet) => planet.try_consume_from_largest(data.resource_cost),
            Err(_) => true,
        };
        if !can_fire {
            continue;
        }
        if let Some((target, _)) = turret.active_target {
            if let Ok(mut target_health) = health.get_mut(target) {
                target_health.apply_damage(data.attack_damage);
            }
        }
        turret.attack_timer = data.attack_delay;
    }
}

pub fn apply_research(
    config: Res<SimulationConfig>,
    labs: Query<&Building, With<Research>>,
    mut planets: Query<&mut Planet>,
) {
    let dt = config.time_step;
    for building in &labs {
        let Some(data) = building.data.research() else {
            continue;
        };
        let Ok(mut planet) = planets.get_mut(building.planet) else {
            continue;
        };
        if planet.try_consume_resources(data.resources_consumption_rate() * dt) {
            planet.research_bonuses.add(&data.research_bonuses);
        }
    }
}

#[derive(SystemParam)]
pub struct FactoryParams<'w, 's> {
    commands: Commands<'w, 's>,
    config: Res<'w, SimulationConfig>,
    catalog: Res<'w, UnitCatalogHandle>,
    roster: Res<'w, TeamRoster>,
    census: ResMut<'w, ShipCensus>,
    plans: Query<'w, 's, &'static TeamPlan>,
    moons: Query<'w, 's, &'static Transform, With<Moon>>,
    planets: Query<'w, 's, &'static mut Planet>,
    factories: Query<'w, 's, (&'static mut Factory, &'static mut Building, &'static Team)>,
}

/// Starts, times and completes ship production. Nothing is produced once a
/// single empire remains.
pub fn run_factories(params: FactoryParams) {
    let FactoryParams {
        mut commands,
        config,
        catalog,
        roster,
        mut census,
        plans,
        moons,
        mut planets,
        mut factories,
    } = params;
    if roster.alive_count() <= 1 {
        return;
    }

    let dt = config.time_step;
    for (mut factory, mut building, &team) in &mut factories {
        let Ok(mut planet) = planets.get_mut(building.planet) else {
            continue;
        };
        let plan = team
            .id()
            .and_then(|id| roster.get(id))
            .and_then(|entry| plans.get(entry.manager).ok());

        if factory.current_production.is_none() {
            start_production(&mut factory, &mut building, &mut planet, plan, team, &census, &config);
        }
        if factory.production_timer > 0.0 {
            factory.production_timer -= dt;
        }

        while factory.production_timer <= 0.0 {
            let Some(ship) = factory.current_production.take() else {
                break;
            };
            let position = moons
                .get(building.moon)
                .map(|moon| moon.translation)
                .unwrap_or(Vec3::ZERO);
            let bonuses = factory.production_bonuses;
            if spawn_ship(&mut commands, catalog.catalog(), ship, position, team, &bonuses).is_some() {
                if let Some(id) = team.id() {
                    census.record_spawn(id);
                }
            }
            factory.production_bonuses.reset();
            start_production(&mut factory, &mut building, &mut planet, plan, team, &census, &config);
        }
    }
}

fn start_production(
    factory: &mut Factory,
    building: &mut Building,
    planet: &mut Planet,
    plan: Option<&TeamPlan>,
    team: Team,
    census: &ShipCensus,
    config: &SimulationConfig,
) {
    let Some(id) = team.id() else {
        return;
    };
    if census.total >= config.max_total_ships || census.team_total(id) >= config.max_ships_per_team {
        return;
    }
    let Some(plan) = plan else {
        return;
    };

    let weights: Vec<f32> = plan
        .factory_actions
        .iter()
        .map(|action| {
            if planet.has_enough_resources(action.resource_cost) {
                action.importance
            } else {
                0.0
            }
        })
        .collect();
    let total: f32 = weights.iter().sum();
    let Some(action) = weighted_random_index(total, &weights, &mut building.rng)
        .and_then(|index| plan.factory_actions.get(index))
    else {
        return;
    };

    if planet.try_consume_resources(action.resource_cost) {
        factory.production_bonuses = planet.research_bonuses;
        factory.current_production = Some(action.ship);
        let speed = factory.production_bonuses.factory_build_speed_multiplier.max(f32::EPSILON);
        factory.production_timer += action.build_time / speed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        components::{Ship, TeamId},
        team_ai::FactoryAction,
        unit_catalog::UnitCatalog,
    };
    use bevy::prelude::World;
    use bevy_ecs::system::RunSystemOnce;

    fn planet(storage: Vec3) -> Planet {
        Planet {
            radius: 10.0,
            ships_assessment_extents: 50.0,
            capture_time: 5.0,
            resource_max_storage: Vec3::splat(100.0),
            resource_generation_rate: Vec3::ZERO,
            resource_current_storage: storage,
            ships_assessment_counter: 0,
            capture_progress: 0.0,
            last_converting_team: None,
            research_bonuses: ResearchBonuses::default(),
        }
    }

    fn base_world() -> World {
        let mut world = World::default();
        world.insert_resource(SimulationConfig::default());
        world.insert_resource(UnitCatalogHandle::new(UnitCatalog::builtin()));
        world.insert_resource(ShipCensus::default());
        world
    }

    #[test]
    fn construction_completes_with_enough_build_speed() {
        let mut world = base_world();
        let team = Team::Empire(TeamId(0));
        let planet_entity = world.spawn((planet(Vec3::ZERO), team)).id();
        let catalog = UnitCatalog::builtin();
        let turret = catalog.building_id("turret").unwrap();
        let build_time = catalog.building(turret).unwrap().build_time;

        let mut moon = Moon::new(planet_entity, 2.0);
        moon.previous_team = team;
        moon.construction = Some(turret);
        let moon_entity = world
            .spawn((Transform::from_xyz(5.0, 0.0, 0.0), moon))
            .id();

        let dt = SimulationConfig::default().time_step;
        let ticks = (build_time / dt).ceil() as usize + 1;
        for _ in 0..ticks {
            world.get_mut::<Moon>(moon_entity).unwrap().cumulative_build_speed = 1.0;
            world.run_system_once(advance_construction);
        }

        let moon = world.get::<Moon>(moon_entity).unwrap();
        let building = moon.building.expect("turret built");
        assert!(moon.construction.is_none());
        assert_eq!(world.get::<Team>(building), Some(&team));
        assert!(world.get::<Turret>(building).is_some());
        assert_eq!(world.get::<Building>(building).unwrap().moon, moon_entity);
    }

    #[test]
    fn team_change_drops_construction() {
        let mut world = base_world();
        let planet_entity = world.spawn((planet(Vec3::ZERO), Team::Empire(TeamId(1)))).id();
        let mut moon = Moon::new(planet_entity, 2.0);
        moon.previous_team = Team::Empire(TeamId(0));
        moon.construction = Some(BuildingArchetypeId(0));
        moon.build_progress = 3.0;
        let moon_entity = world.spawn((Transform::default(), moon)).id();

        world.run_system_once(advance_construction);
        let moon = world.get::<Moon>(moon_entity).unwrap();
        assert!(moon.construction.is_none());
        assert_eq!(moon.build_progress, 0.0);
        assert_eq!(moon.previous_team, Team::Empire(TeamId(1)));
    }

    #[test]
    fn turret_shots_cost_planet_resources() {
        let mut world = base_world();
        let catalog = UnitCatalog::builtin();
        let archetype = catalog.building_id("turret").unwrap();
        let data = Arc::clone(catalog.building(archetype).unwrap());
        let damage = data.turret().unwrap().attack_damage;

        let planet_entity = world.spawn(planet(Vec3::new(0.0, 0.2, 0.0))).id();
        let victim = world.spawn(Health::new(10.0)).id();
        let turret = world
            .spawn((
                Building {
                    data,
                    archetype,
                    planet: planet_entity,
                    moon: Entity::PLACEHOLDER,
                    rng: deterministic_rng(&[1]),
                },
                Turret {
                    active_target: Some((victim, Vec3::ZERO)),
                    must_attack: true,
                    ..Turret::default()
                },
            ))
            .id();

        world.run_system_once(turret_fire);
        assert_eq!(world.get::<Health>(victim).unwrap().current, 10.0);
        assert!(!world.get::<Turret>(turret).unwrap().must_attack);

        world.get_mut::<Planet>(planet_entity).unwrap().resource_current_storage = Vec3::new(1.0, 0.0, 0.0);
        world.get_mut::<Turret>(turret).unwrap().must_attack = true;
        world.run_system_once(turret_fire);
        assert_eq!(world.get::<Health>(victim).unwrap().current, 10.0 - damage);
        assert_eq!(world.get::<Planet>(planet_entity).unwrap().resource_current_storage.x, 0.5);
    }

    #[test]
    fn research_adds_bonuses_when_affordable() {
        let mut world = base_world();
        let catalog = UnitCatalog::builtin();
        let archetype = catalog.building_id("research").unwrap();
        let planet_entity = world.spawn(planet(Vec3::splat(10.0))).id();
        world.spawn((
            Building {
                data: Arc::clone(catalog.building(archetype).unwrap()),
                archetype,
                planet: planet_entity,
                moon: Entity::PLACEHOLDER,
                rng: deterministic_rng(&[2]),
            },
            Research,
        ));

        world.run_system_once(apply_research);
        let planet = world.get::<Planet>(planet_entity).unwrap();
        assert!(planet.research_bonuses.ship_speed_multiplier > 1.0);
        assert!(planet.resource_current_storage.x < 10.0);
    }

    #[test]
    fn factories_produce_planned_ships() {
        let mut world = base_world();
        let catalog = UnitCatalog::builtin();
        let fighter = catalog.ship_id("fighter").unwrap();
        let fighter_data = catalog.ship(fighter).unwrap();

        let mut roster = TeamRoster::default();
        for name in ["crimson", "azure"] {
            let manager = world
                .spawn(TeamPlan {
                    factory_actions: vec![FactoryAction {
                        ship: fighter,
                        importance: 1.0,
                        resource_cost: fighter_data.resources_cost(),
                        build_time: fighter_data.build_time,
                    }],
                    ..TeamPlan::default()
                })
                .id();
            roster.register(name, manager);
        }
        world.insert_resource(roster);

        let team = Team::Empire(TeamId(0));
        let planet_entity = world.spawn((planet(Vec3::splat(50.0)), team)).id();
        let moon_entity = world
            .spawn((Transform::from_xyz(1.0, 2.0, 3.0), Moon::new(planet_entity, 1.0)))
            .id();
        let factory_type = catalog.factory_building().unwrap();
        world.spawn((
            Building {
                data: Arc::clone(catalog.building(factory_type).unwrap()),
                archetype: factory_type,
                planet: planet_entity,
                moon: moon_entity,
                rng: deterministic_rng(&[3]),
            },
            Factory::default(),
            team,
        ));

        let dt = SimulationConfig::default().time_step;
        let ticks = (fighter_data.build_time / dt).ceil() as usize + 2;
        for _ in 0..ticks {
            world.run_system_once(run_factories);
        }

        let ships: Vec<(Vec3, Team)> = world
            .query::<(&Transform, &Team, &Ship)>()
            .iter(&world)
            .map(|(transform, team, _)| (transform.translation, *team))
            .collect();
        assert!(!ships.is_empty());
        assert!(ships.iter().all(|(position, owner)| *position == Vec3::new(1.0, 2.0, 3.0) && *owner == team));
        assert_eq!(world.resource::<ShipCensus>().team_total(TeamId(0)), ships.len() as u32);
        let storage = world.get::<Planet>(planet_entity).unwrap().resource_current_storage;
        assert!(storage.x < 50.0);
    }
}
