//! Ship controllers and their executors.
//!
//! Controllers (`*_ai`) read the owning team's [`TeamPlan`] and raise a
//! [`ShipOrder`] on the ship; executors take that order in the same tick.

use std::sync::Arc;

use bevy::prelude::*;

use crate::{
    collectors::ShipQueryCollector,
    components::{
        CapturingWorkers, Fighter, Health, Moon, NavigationTarget, Planet,
        ResearchBonuses, Ship, ShipOrder, Targetable, Team, Trader, Worker,
    },
    deterministic_random::{deterministic_rng, entity_seed, next_f32, GameRng},
    math::{
        Vec3ElementSum,
        clamp_to_max_length, look_rotation, project_on_plane, proximity_importance,
        segment_intersects_sphere, sharpness_interpolant,
    },
    planet_navigation::PlanetNavigationGrid,
    resources::TeamRoster,
    simulation_config::SimulationConfig,
    spatial_database::SpatialDatabase,
    team_ai::{TeamPlan, TraderAction, WorkerActionKind},
    unit_catalog::{ShipArchetypeId, ShipData, ShipRole, UnitCatalog},
    weighted_random::{weighted_random_index, weighted_random_index_vec3},
};

/// Spawns a ship with the research bonuses that were active when its
/// production started.
pub fn spawn_ship(
    commands: &mut Commands,
    catalog: &UnitCatalog,
    archetype: ShipArchetypeId,
    position: Vec3,
    team: Team,
    bonuses: &ResearchBonuses,
) -> Option<Entity> {
    let data = catalog.ship(archetype)?;
    let mut ship = Ship::new(Arc::clone(data), archetype);
    ship.acceleration_multiplier = bonuses.ship_acceleration_multiplier;
    ship.max_speed_multiplier = bonuses.ship_speed_multiplier;
    let health = Health::new(data.max_health * bonuses.ship_max_health_multiplier);

    let entity = commands
        .spawn((
            Transform::from_translation(position),
            ship,
            team,
            health,
            data.actor_type(),
            Targetable,
        ))
        .id();

    match &data.role {
        ShipRole::Fighter(fighter) => {
            let mut rng = deterministic_rng(&[entity_seed(entity)]);
            commands.entity(entity).insert(Fighter {
                detection_timer: next_f32(&mut rng, 0.0, fighter.ship_detection_interval),
                damage_multiplier: bonuses.ship_damage_multiplier,
                ..Fighter::default()
            });
        }
        ShipRole::Worker(_) => {
            commands.entity(entity).insert(Worker::default());
        }
        ShipRole::Trader(_) => {
            commands.entity(entity).insert(Trader::default());
        }
    }
    Some(entity)
}

fn team_plan<'a>(roster: &TeamRoster, plans: &'a Query<&TeamPlan>, team: Team) -> Option<&'a TeamPlan> {
    let entry = roster.get(team.id()?)?;
    plans.get(entry.manager).ok()
}

/// Result of re-evaluating a ship's planet action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionChoice {
    /// Whether the current target still appears in the team's actions.
    pub current_found: bool,
    /// Action to switch to; only set when it beats twice the current
    /// action's importance.
    pub switch_to: Option<usize>,
}

/// Weighted pick over `(entity, position, importance)` scaled by proximity.
/// The stream is rebuilt from the ship entity each call so a ship keeps
/// leaning toward the same choice while the plan is stable.
pub fn choose_planet_action(
    ship: Entity,
    position: Vec3,
    data: &ShipData,
    current_target: Option<Entity>,
    actions: impl IntoIterator<Item = (Entity, Vec3, f32)>,
) -> ActionChoice {
    let mut weights = Vec::new();
    let mut total = 0.0;
    let mut current_importance: Option<f32> = None;
    for (target, target_position, importance) in actions {
        let weight = importance
            * proximity_importance(
                position,
                target_position,
                data.max_distance_sq_for_planet_proximity_importance_scaling,
                data.planet_proximity_importance_remap,
            );
        weights.push(weight);
        total += weight;
        if current_importance.is_none() && current_target == Some(target) {
            current_importance = Some(importance);
        }
    }

    let threshold = current_importance.unwrap_or(-1.0) * 2.0;
    let mut rng = deterministic_rng(&[entity_seed(ship)]);
    let switch_to = weighted_random_index(total, &weights, &mut rng)
        .filter(|&index| weights[index] > threshold);
    ActionChoice {
        current_found: current_importance.is_some(),
        switch_to,
    }
}

pub fn fighter_ai(
    config: Res<SimulationConfig>,
    database: Res<SpatialDatabase>,
    roster: Res<TeamRoster>,
    plans: Query<&TeamPlan>,
    transforms: Query<&Transform>,
    mut fighters: Query<(Entity, &Transform, &mut Ship, &mut Fighter, &Team)>,
) {
    let dt = config.time_step;
    for (entity, transform, mut ship, mut fighter, team) in &mut fighters {
        ship.pending_order = None;
        if !team.is_non_neutral() {
            continue;
        }
        let data = Arc::clone(&ship.data);
        let Some(fighter_data) = data.fighter() else {
            continue;
        };
        let position = transform.translation;

        ship.ignore_avoidance = false;
        if fighter.attack_timer > 0.0 {
            fighter.attack_timer -= dt;
        }

        if fighter.target_is_enemy_ship {
            let target_position = ship
                .navigation_target
                .and_then(|target| transforms.get(target.entity).ok())
                .map(|target| target.translation);
            match target_position {
                Some(target_position)
                    if position.distance_squared(target_position)
                        <= fighter_data.attack_range * fighter_data.attack_range =>
                {
                    ship.ignore_avoidance = true;
                    if let Some(target) = ship.navigation_target.as_mut() {
                        target.position = target_position;
                    }
                    if fighter.attack_timer <= 0.0 {
                        let forward = transform.rotation * Vec3::NEG_Z;
                        let direction = (target_position - position).normalize_or_zero();
                        if forward.dot(direction) > fighter_data.dot_prod_threshold_for_target_in_sights {
                            ship.pending_order = Some(ShipOrder::Attack);
                        }
                    }
                }
                _ => {
                    fighter.target_is_enemy_ship = false;
                    ship.navigation_target = None;
                }
            }
            continue;
        }

        fighter.detection_timer -= dt;
        if fighter_data.detection_range > 0.0 && fighter.detection_timer <= 0.0 {
            let mut collector = ShipQueryCollector::new(entity, position, team.as_byte());
            database.query_aabb_cell_proximity_order(
                position,
                Vec3::splat(fighter_data.detection_range),
                &mut collector,
            );
            if let Some(enemy) = collector.closest_enemy() {
                ship.navigation_target = Some(NavigationTarget {
                    entity: enemy.entity,
                    position: enemy.position,
                    radius: 0.0,
                });
                fighter.target_is_enemy_ship = true;
            }
            fighter.detection_timer += fighter_data.ship_detection_interval;
        }
        if fighter.target_is_enemy_ship {
            continue;
        }

        let Some(plan) = team_plan(&roster, &plans, *team) else {
            continue;
        };
        let choice = choose_planet_action(
            entity,
            position,
            &data,
            ship.navigation_target.map(|target| target.entity),
            plan.fighter_actions
                .iter()
                .map(|action| (action.entity, action.position, action.importance)),
        );
        if !choice.current_found {
            ship.navigation_target = None;
        }
        if let Some(action) = choice.switch_to.and_then(|index| plan.fighter_actions.get(index)) {
            ship.navigation_target = Some(NavigationTarget {
                entity: action.entity,
                position: action.position,
                radius: action.radius,
            });
        }
    }
}

pub fn worker_ai(
    roster: Res<TeamRoster>,
    plans: Query<&TeamPlan>,
    planet_teams: Query<&Team, With<Planet>>,
    mut workers: Query<(Entity, &Transform, &mut Ship, &mut Worker, &Team)>,
) {
    for (entity, transform, mut ship, mut worker, team) in &mut workers {
        ship.pending_order = None;
        ship.block_navigation = false;
        if !team.is_non_neutral() {
            continue;
        }
        let data = Arc::clone(&ship.data);
        let Some(worker_data) = data.worker() else {
            continue;
        };
        let position = transform.translation;

        if let Some(target) = ship.navigation_target {
            let distance_sq = position.distance_squared(target.position);
            if worker.desired_building.is_some() {
                let range = worker_data.build_range + target.radius;
                if distance_sq < range * range {
                    ship.pending_order = Some(ShipOrder::Build);
                }
            } else {
                let range = worker_data.capture_range + target.radius;
                let already_owned = planet_teams
                    .get(target.entity)
                    .map_or(true, |planet_team| planet_team == team);
                if distance_sq < range * range && !already_owned {
                    ship.pending_order = Some(ShipOrder::CapturePlanet);
                }
            }
        }

        let Some(plan) = team_plan(&roster, &plans, *team) else {
            continue;
        };
        let choice = choose_planet_action(
            entity,
            position,
            &data,
            ship.navigation_target.map(|target| target.entity),
            plan.worker_actions
                .iter()
                .map(|action| (action.entity, action.position, action.importance)),
        );
        if !choice.current_found {
            worker.desired_building = None;
            ship.navigation_target = None;
        }
        if let Some(action) = choice.switch_to.and_then(|index| plan.worker_actions.get(index)) {
            ship.navigation_target = Some(NavigationTarget {
                entity: action.entity,
                position: action.position,
                radius: action.radius,
            });
            if let WorkerActionKind::Build { building } = action.kind {
                worker.desired_building = Some(building);
            }
        }
    }
}

/// Planet pair and resource channel chosen for a trade run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeRoute {
    pub giver: NavigationTarget,
    pub receiver: NavigationTarget,
    pub resource_mask: Vec3,
}

fn action_target(action: &TraderAction) -> NavigationTarget {
    NavigationTarget {
        entity: action.entity,
        position: action.position,
        radius: action.radius,
    }
}

/// Picks the receiving planet and channel by need, then a giver that holds
/// relatively more of that channel. `None` when either pick finds nothing.
pub fn find_trade_route(actions: &[TraderAction], rng: &mut GameRng) -> Option<TradeRoute> {
    let needs: Vec<Vec3> = actions
        .iter()
        .map(|action| {
            let need = (Vec3::ONE - action.resource_storage_ratio_percentile)
                .clamp(Vec3::ZERO, Vec3::ONE);
            need * action.importance_bias
        })
        .collect();
    let total_need = needs.iter().copied().sum::<Vec3>();
    let (receiver_index, channel) = weighted_random_index_vec3(total_need, &needs, rng)?;
    let receiver = &actions[receiver_index];
    let mut resource_mask = Vec3::ZERO;
    resource_mask[channel] = 1.0;

    let receiver_ratio = (resource_mask * receiver.resource_storage_ratio_percentile).element_sum();
    let offers: Vec<f32> = actions
        .iter()
        .map(|action| {
            let giver_ratio = (resource_mask * action.resource_storage_ratio_percentile).element_sum();
            if giver_ratio > receiver_ratio {
                action.importance_bias * (giver_ratio - receiver_ratio)
            } else {
                0.0
            }
        })
        .collect();
    let total_offer: f32 = offers.iter().sum();
    let giver_index = weighted_random_index(total_offer, &offers, rng)?;

    Some(TradeRoute {
        giver: action_target(&actions[giver_index]),
        receiver: action_target(receiver),
        resource_mask,
    })
}

fn reset_trade(ship: &mut Ship, trader: &mut Trader) {
    ship.navigation_target = None;
    trader.receiving_planet = None;
    trader.find_trade_route_attempts = 0;
}

pub fn trader_ai(
    roster: Res<TeamRoster>,
    plans: Query<&TeamPlan>,
    planet_teams: Query<&Team, With<Planet>>,
    mut traders: Query<(Entity, &Transform, &mut Ship, &mut Trader, &Team)>,
) {
    for (entity, transform, mut ship, mut trader, team) in &mut traders {
        ship.pending_order = None;
        if !team.is_non_neutral() {
            continue;
        }
        let Some(trader_data) = ship.data.trader().cloned() else {
            continue;
        };
        let position = transform.translation;
        let plan = team_plan(&roster, &plans, *team);

        let Some(target) = ship.navigation_target else {
            ship.velocity = Vec3::ZERO;
            ship.block_navigation = true;
            let Some(plan) = plan else {
                continue;
            };
            let mut rng = deterministic_rng(&[entity_seed(entity), trader.find_trade_route_attempts]);
            match find_trade_route(&plan.trader_actions, &mut rng) {
                Some(route) => {
                    ship.navigation_target = Some(route.giver);
                    trader.receiving_planet = Some(route.receiver);
                    trader.chosen_resource_mask = route.resource_mask;
                }
                None => trader.find_trade_route_attempts += 1,
            }
            continue;
        };

        ship.block_navigation = false;
        let Ok(target_team) = planet_teams.get(target.entity) else {
            continue;
        };
        if target_team != team {
            let heading_to_receiver = trader
                .receiving_planet
                .is_some_and(|receiver| receiver.entity == target.entity);
            let nearest = plan.and_then(|plan| {
                plan.trader_actions.iter().min_by(|a, b| {
                    a.position
                        .distance_squared(position)
                        .total_cmp(&b.position.distance_squared(position))
                })
            });
            match nearest {
                Some(nearest) if heading_to_receiver => {
                    let nearest = action_target(nearest);
                    ship.navigation_target = Some(nearest);
                    trader.receiving_planet = Some(nearest);
                }
                _ => reset_trade(&mut ship, &mut trader),
            }
        } else {
            let range = trader_data.resource_exchange_range + target.radius;
            if position.distance_squared(target.position) <= range * range {
                ship.pending_order = Some(ShipOrder::Trade);
            }
        }
    }
}

/// Steers toward the navigation target, avoids the nearest planet and
/// integrates position.
pub fn navigate_ships(
    config: Res<SimulationConfig>,
    navigation: Res<PlanetNavigationGrid>,
    mut ships: Query<(&mut Transform, &mut Ship)>,
) {
    let dt = config.time_step;
    for (mut transform, mut ship) in &mut ships {
        let data = Arc::clone(&ship.data);
        let steering = sharpness_interpolant(data.steering_sharpness, dt);

        if !ship.block_navigation {
            if let Some(target) = ship.navigation_target {
                if let Some(desired) = look_rotation(target.position - transform.translation) {
                    transform.rotation = transform.rotation.slerp(desired, steering).normalize();
                }
                let forward = transform.rotation * Vec3::NEG_Z;
                let acceleration = data.acceleration * ship.acceleration_multiplier;
                let max_speed = data.max_speed * ship.max_speed_multiplier;
                let velocity = ship.velocity + forward * acceleration * dt;
                ship.velocity = clamp_to_max_length(velocity, max_speed);
            }
        }

        if let Some(planet) = navigation.cell_data_at_position(transform.translation).copied() {
            let ship_to_planet = planet.position - transform.translation;
            let avoidance_distance = data.planet_avoidance_distance;
            if ship_to_planet.length_squared() < avoidance_distance * avoidance_distance {
                let speed = ship.velocity.length();
                if ship_to_planet.length_squared() <= planet.radius * planet.radius {
                    let direction = ship_to_planet.normalize_or_zero();
                    ship.velocity = project_on_plane(ship.velocity, direction).normalize_or_zero() * speed;
                    transform.translation = planet.position - direction * planet.radius;
                } else if !ship.ignore_avoidance {
                    let targets_planet = ship
                        .navigation_target
                        .is_some_and(|target| target.entity == planet.entity);
                    if !targets_planet || data.should_avoid_target_planet {
                        let velocity_direction = ship.velocity.normalize_or_zero();
                        let away = -project_on_plane(ship_to_planet, velocity_direction).normalize_or_zero();
                        let tangent_point =
                            planet.position + away * planet.radius * data.planet_avoidance_relative_offset;
                        let would_collide = segment_intersects_sphere(
                            transform.translation,
                            transform.translation + velocity_direction * avoidance_distance,
                            planet.position,
                            planet.radius,
                        );
                        if would_collide {
                            let to_tangent = tangent_point - transform.translation;
                            if let Some(desired) = look_rotation(to_tangent) {
                                transform.rotation = transform.rotation.slerp(desired, steering).normalize();
                            }
                            ship.velocity = to_tangent.normalize_or_zero() * speed;
                        }
                    }
                }
            }
        }

        let displacement = ship.velocity * dt;
        transform.translation += displacement;
    }
}

pub fn fighter_attack(
    mut fighters: Query<(&mut Ship, &mut Fighter)>,
    mut health: Query<&mut Health>,
) {
    for (mut ship, mut fighter) in &mut fighters {
        if !ship.take_order(ShipOrder::Attack) {
            continue;
        }
        let Some(fighter_data) = ship.data.fighter() else {
            continue;
        };
        if let Some(target) = ship.navigation_target {
            if let Ok(mut target_health) = health.get_mut(target.entity) {
                target_health.apply_damage(fighter_data.attack_damage * fighter.damage_multiplier);
            }
        }
        fighter.attack_timer = fighter_data.attack_delay;
    }
}

pub fn worker_capture(
    mut workers: Query<(&mut Ship, &Team), With<Worker>>,
    mut planets: Query<&mut CapturingWorkers>,
) {
    for (mut ship, team) in &mut workers {
        if !ship.take_order(ShipOrder::CapturePlanet) {
            continue;
        }
        ship.block_navigation = true;
        ship.velocity = Vec3::ZERO;
        let (Some(target), Some(team_index)) = (ship.navigation_target, team.index()) else {
            continue;
        };
        let Some(capture_speed) = ship.data.worker().map(|worker| worker.capture_speed) else {
            continue;
        };
        if let Ok(mut capturing) = planets.get_mut(target.entity) {
            if let Some(slot) = capturing.0.get_mut(team_index) {
                *slot += capture_speed;
            }
        }
    }
}

pub fn worker_build(mut workers: Query<(&mut Ship, &Worker)>, mut moons: Query<&mut Moon>) {
    for (mut ship, worker) in &mut workers {
        if !ship.take_order(ShipOrder::Build) {
            continue;
        }
        ship.block_navigation = true;
        ship.velocity = Vec3::ZERO;
        let Some(target) = ship.navigation_target else {
            continue;
        };
        let Some(build_speed) = ship.data.worker().map(|worker| worker.build_speed) else {
            continue;
        };
        if let Ok(mut moon) = moons.get_mut(target.entity) {
            if moon.construction.is_none() {
                moon.construction = worker.desired_building;
            }
            moon.cumulative_build_speed += build_speed;
        }
    }
}

pub fn trader_trade(mut traders: Query<(&mut Ship, &mut Trader)>, mut planets: Query<&mut Planet>) {
    for (mut ship, mut trader) in &mut traders {
        if !ship.take_order(ShipOrder::Trade) {
            continue;
        }
        let Some(target) = ship.navigation_target else {
            continue;
        };
        let Some(capacity) = ship.data.trader().map(|trader| trader.resource_carry_capacity) else {
            continue;
        };
        let Ok(mut planet) = planets.get_mut(target.entity) else {
            continue;
        };

        let at_receiver = trader
            .receiving_planet
            .is_some_and(|receiver| receiver.entity == target.entity);
        if at_receiver {
            let delivered = planet.resource_current_storage + trader.carried_resources;
            planet.resource_current_storage = delivered.clamp(Vec3::ZERO, planet.resource_max_storage);
            trader.carried_resources = Vec3::ZERO;
            reset_trade(&mut ship, &mut trader);
        } else {
            let taken = (trader.chosen_resource_mask * capacity).min(planet.resource_current_storage);
            planet.resource_current_storage -= taken;
            trader.carried_resources += taken;
            ship.navigation_target = trader.receiving_planet;
        }
    }
}
