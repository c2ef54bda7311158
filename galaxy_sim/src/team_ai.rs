//! Utility-AI planner run once per empire per tick.
//!
//! Planning reads an immutable [`PlanningWorld`] copied out of the ECS and
//! writes only the planning team's own [`TeamManagerAi`] and [`TeamPlan`], so
//! every empire can be planned in parallel.

use std::{collections::HashMap, sync::Arc};

use bevy::{math::Vec3, prelude::*};

use crate::{
    ai_processor::{AIAction, AIProcessor},
    components::{ActorType, TeamId},
    deterministic_random::{deterministic_rng, GameRng},
    intel::{EmpireStatistics, PlanetIntel, PlanetSnapshot, PlanetStatistics, TeamFleet},
    math::{clamp_to_range, saturate},
    team_ai_config::TeamAiProfile,
    unit_catalog::{BuildingArchetypeId, ShipArchetypeId, UnitCatalog},
    weighted_random::weighted_random_index,
};

const PROCESSOR_CAPACITY: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FighterAction {
    pub entity: Entity,
    pub position: Vec3,
    pub radius: f32,
    pub importance: f32,
    pub is_owned: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerActionKind {
    Capture,
    Build { building: BuildingArchetypeId },
}

/// Capture targets a planet; build targets the free moon that will hold the
/// building.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkerAction {
    pub kind: WorkerActionKind,
    pub entity: Entity,
    pub position: Vec3,
    pub radius: f32,
    pub importance: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraderAction {
    pub entity: Entity,
    pub position: Vec3,
    pub resource_storage_ratio_percentile: Vec3,
    pub radius: f32,
    pub importance_bias: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactoryAction {
    pub ship: ShipArchetypeId,
    pub importance: f32,
    pub resource_cost: Vec3,
    pub build_time: f32,
}

/// Action lists published by an empire's planner for its ships and factories.
#[derive(Component, Debug, Clone, Default)]
pub struct TeamPlan {
    pub fighter_actions: Vec<FighterAction>,
    pub worker_actions: Vec<WorkerAction>,
    pub trader_actions: Vec<TraderAction>,
    pub factory_actions: Vec<FactoryAction>,
}

impl TeamPlan {
    pub fn is_empty(&self) -> bool {
        self.fighter_actions.is_empty()
            && self.worker_actions.is_empty()
            && self.trader_actions.is_empty()
            && self.factory_actions.is_empty()
    }
}

/// Planner state carried by an empire between ticks.
#[derive(Component, Debug, Clone)]
pub struct TeamManagerAi {
    seed: i32,
    rng: Option<GameRng>,
    pub empire: EmpireStatistics,
    pub planet_intel: Vec<PlanetIntel>,
    pub fighter_bias: f32,
    pub worker_bias: f32,
    pub trader_bias: f32,
    pub is_defeated: bool,
}

impl TeamManagerAi {
    /// `seed` is usually the manager entity's index; the random stream is
    /// created from it on the first plan.
    pub fn new(seed: i32) -> Self {
        Self {
            seed,
            rng: None,
            empire: EmpireStatistics::default(),
            planet_intel: Vec::new(),
            fighter_bias: 0.0,
            worker_bias: 0.0,
            trader_bias: 0.0,
            is_defeated: false,
        }
    }

    fn rng(&mut self) -> &mut GameRng {
        let seed = self.seed;
        self.rng.get_or_insert_with(|| deterministic_rng(&[seed]))
    }
}

/// Immutable view of the galaxy shared by every planning team in a tick.
#[derive(Debug, Clone)]
pub struct PlanningWorld {
    planets: Vec<PlanetSnapshot>,
    by_entity: HashMap<Entity, usize>,
    catalog: Arc<UnitCatalog>,
    fleets: Vec<TeamFleet>,
}

impl PlanningWorld {
    /// `fleets[i]` is the fleet of team `i`.
    pub fn new(planets: Vec<PlanetSnapshot>, catalog: Arc<UnitCatalog>, fleets: Vec<TeamFleet>) -> Self {
        let by_entity = planets
            .iter()
            .enumerate()
            .map(|(index, planet)| (planet.entity, index))
            .collect();
        Self {
            planets,
            by_entity,
            catalog,
            fleets,
        }
    }

    pub fn planets(&self) -> &[PlanetSnapshot] {
        &self.planets
    }

    pub fn planet(&self, entity: Entity) -> Option<&PlanetSnapshot> {
        self.by_entity
            .get(&entity)
            .and_then(|index| self.planets.get(*index))
    }

    pub fn catalog(&self) -> &UnitCatalog {
        &self.catalog
    }

    pub fn fleet(&self, team: TeamId) -> TeamFleet {
        self.fleets.get(team.index()).copied().unwrap_or_default()
    }
}

/// Runs the whole planning pipeline for `team` and returns its action lists.
/// A team without planets is flagged defeated and gets an empty plan.
pub fn plan_team(
    team: TeamId,
    brain: &mut TeamManagerAi,
    profile: &TeamAiProfile,
    world: &PlanningWorld,
) -> TeamPlan {
    brain.rng();
    brain.planet_intel.clear();
    let mut plan = TeamPlan::default();

    compute_empire_statistics(team, brain, world);
    if brain.empire.owned_planets == 0 {
        brain.is_defeated = true;
        return plan;
    }

    let mut fighter_processor = AIProcessor::with_capacity(PROCESSOR_CAPACITY);
    let mut worker_processor = AIProcessor::with_capacity(PROCESSOR_CAPACITY);
    let mut trader_processor = AIProcessor::with_capacity(PROCESSOR_CAPACITY);

    plan.factory_actions = factory_actions(brain, profile, world.catalog());

    let intel = std::mem::take(&mut brain.planet_intel);
    for planet in &intel {
        let stats = PlanetStatistics::compute(planet, &brain.empire);
        if planet.is_owned {
            defend_action(&mut fighter_processor, &mut plan, planet, &stats, profile);
            build_action(&mut worker_processor, &mut plan, planet, &stats, profile, world.catalog(), brain.rng());
            trade_action(&mut trader_processor, &mut plan, planet, &stats, profile);
        } else {
            attack_action(&mut fighter_processor, &mut plan, planet, &stats, profile);
            capture_action(&mut worker_processor, &mut plan, planet, &stats, profile);
        }
    }
    brain.planet_intel = intel;

    fighter_processor.compute_final_importances();
    worker_processor.compute_final_importances();
    trader_processor.compute_final_importances();

    for (index, action) in plan.fighter_actions.iter_mut().enumerate() {
        action.importance = fighter_processor.action_importance(index);
    }
    for (index, action) in plan.worker_actions.iter_mut().enumerate() {
        action.importance = worker_processor.action_importance(index);
    }
    for (index, action) in plan.trader_actions.iter_mut().enumerate() {
        action.importance_bias = trader_processor.action_importance(index);
    }

    plan
}

fn compute_empire_statistics(team: TeamId, brain: &mut TeamManagerAi, world: &PlanningWorld) {
    brain.empire = EmpireStatistics::from_fleet(world.fleet(team));

    let owned: Vec<&PlanetSnapshot> = world
        .planets()
        .iter()
        .filter(|planet| planet.team.id() == Some(team))
        .collect();
    for planet in &owned {
        brain.planet_intel.push(PlanetIntel::gather(planet, team, 0.0));
    }
    brain.empire.owned_planets = owned.len() as u32;

    // Everything not yet listed is a neighbour this team does not own.
    for planet in &owned {
        for link in &planet.network {
            if brain
                .planet_intel
                .iter()
                .any(|intel| intel.entity == link.entity)
            {
                continue;
            }
            let Some(neighbour) = world.planet(link.entity) else {
                continue;
            };
            let mut intel = PlanetIntel::gather(neighbour, team, link.distance);
            intel.position = link.position;
            intel.planet_radius = link.radius;
            brain.planet_intel.push(intel);
        }
    }

    brain.empire.total_planets = brain.planet_intel.len() as u32;
    for intel in &brain.planet_intel {
        brain.empire.accumulate(intel);
    }
}

/// Production biases steer each empire toward its desired fleet ratios.
fn factory_actions(
    brain: &mut TeamManagerAi,
    profile: &TeamAiProfile,
    catalog: &UnitCatalog,
) -> Vec<FactoryAction> {
    let empire = brain.empire;

    brain.fighter_bias = profile.max_ship_production_bias;
    if empire.fighters.value > 0.0 && empire.fighters.count > 0 {
        brain.fighter_bias = profile.desired_fighters_per_other_ship
            * empire.total_non_fighter_ships as f32
            / empire.fighters.count as f32;
    }

    brain.worker_bias = profile.max_ship_production_bias;
    if empire.workers.value > 0.0 {
        brain.worker_bias =
            profile.desired_worker_value_per_planet * empire.total_planets as f32 / empire.workers.value;
    }

    brain.trader_bias = profile.max_ship_production_bias;
    if empire.traders.value > 0.0 {
        // A trader needs two owned planets to shuttle between.
        brain.trader_bias = if empire.owned_planets >= 2 {
            profile.desired_trader_value_per_owned_planet * empire.owned_planets as f32
                / empire.traders.value
        } else {
            0.0
        };
    }

    let mut fighter_probabilities = 0.0;
    let mut worker_probabilities = 0.0;
    let mut trader_probabilities = 0.0;
    for ship in catalog.ships() {
        match ship.actor_type() {
            ActorType::Fighter => fighter_probabilities += ship.build_probability_for_ship_type,
            ActorType::Worker => worker_probabilities += ship.build_probability_for_ship_type,
            ActorType::Trader => trader_probabilities += ship.build_probability_for_ship_type,
            _ => {}
        }
    }

    catalog
        .ship_entries()
        .map(|(id, ship)| {
            let (bias, type_total) = match ship.actor_type() {
                ActorType::Fighter => (brain.fighter_bias, fighter_probabilities),
                ActorType::Worker => (brain.worker_bias, worker_probabilities),
                ActorType::Trader => (brain.trader_bias, trader_probabilities),
                _ => (0.0, 0.0),
            };
            let probability_in_type = if type_total > 0.0 {
                ship.build_probability_for_ship_type / type_total
            } else {
                0.0
            };
            FactoryAction {
                ship: id,
                importance: bias * probability_in_type,
                resource_cost: ship.resources_cost(),
                build_time: ship.build_time,
            }
        })
        .collect()
}

/// Random building weighted by build probability, replaced by a factory when
/// the planet has none yet.
pub fn pick_building_to_build(
    planet_has_factory: bool,
    catalog: &UnitCatalog,
    rng: &mut GameRng,
) -> Option<BuildingArchetypeId> {
    let weights: Vec<f32> = catalog
        .buildings()
        .iter()
        .map(|building| building.build_probability)
        .collect();
    let total: f32 = weights.iter().sum();
    let picked = weighted_random_index(total, &weights, rng).map(BuildingArchetypeId);

    if planet_has_factory {
        picked
    } else {
        catalog.factory_building().or(picked)
    }
}

fn push_action<T>(actions: &mut Vec<T>, processor: &mut AIProcessor, action: T, score: AIAction) {
    processor.add_action(score);
    actions.push(action);
}

fn defend_action(
    processor: &mut AIProcessor,
    plan: &mut TeamPlan,
    intel: &PlanetIntel,
    stats: &PlanetStatistics,
    profile: &TeamAiProfile,
) {
    let mut score = AIAction::new();
    score.apply_consideration(clamp_to_range(
        stats.threat_level,
        profile.fighter_defend_threat_level_consideration_clamp,
    ));
    score.apply_consideration(clamp_to_range(
        stats.resource_generation_score,
        profile.fighter_defend_resource_score_consideration_clamp,
    ));
    score.apply_consideration(profile.fighter_defend_planet_consideration);

    if score.has_considerations_and_importance() {
        push_action(
            &mut plan.fighter_actions,
            processor,
            FighterAction {
                entity: intel.entity,
                position: intel.position,
                radius: intel.planet_radius,
                importance: 0.0,
                is_owned: intel.is_owned,
            },
            score,
        );
    }
}

fn build_action(
    processor: &mut AIProcessor,
    plan: &mut TeamPlan,
    intel: &PlanetIntel,
    stats: &PlanetStatistics,
    profile: &TeamAiProfile,
    catalog: &UnitCatalog,
    rng: &mut GameRng,
) {
    let Some(free_moon) = intel.first_free_moon else {
        return;
    };
    if intel.free_moons == 0 {
        return;
    }
    let Some(building) = pick_building_to_build(intel.factories > 0, catalog, rng) else {
        return;
    };

    let occupancy = saturate(intel.free_moons as f32 / intel.total_moons as f32);
    let mut score = AIAction::new();
    score.apply_consideration(clamp_to_range(
        stats.safety_level,
        profile.worker_build_safety_level_consideration_clamp,
    ));
    score.apply_consideration(clamp_to_range(
        stats.resource_generation_score,
        profile.worker_build_resource_score_consideration_clamp,
    ));
    score.apply_consideration(occupancy);
    score.apply_consideration(profile.worker_build_consideration);

    if score.has_considerations_and_importance() {
        push_action(
            &mut plan.worker_actions,
            processor,
            WorkerAction {
                kind: WorkerActionKind::Build { building },
                entity: free_moon.entity,
                position: free_moon.position,
                radius: free_moon.radius,
                importance: 0.0,
            },
            score,
        );
    }
}

fn trade_action(
    processor: &mut AIProcessor,
    plan: &mut TeamPlan,
    intel: &PlanetIntel,
    stats: &PlanetStatistics,
    profile: &TeamAiProfile,
) {
    let mut score = AIAction::new();
    score.apply_consideration(clamp_to_range(
        stats.safety_level,
        profile.trader_safety_level_consideration_clamp,
    ));

    if score.has_considerations_and_importance() {
        push_action(
            &mut plan.trader_actions,
            processor,
            TraderAction {
                entity: intel.entity,
                position: intel.position,
                resource_storage_ratio_percentile: stats.resource_storage_ratio_percentile,
                radius: intel.planet_radius,
                importance_bias: 0.0,
            },
            score,
        );
    }
}

fn attack_action(
    processor: &mut AIProcessor,
    plan: &mut TeamPlan,
    intel: &PlanetIntel,
    stats: &PlanetStatistics,
    profile: &TeamAiProfile,
) {
    let mut score = AIAction::new();
    score.apply_consideration(clamp_to_range(
        stats.threat_level,
        profile.fighter_attack_threat_level_consideration_clamp,
    ));
    score.apply_consideration(clamp_to_range(
        stats.resource_generation_score,
        profile.fighter_attack_resource_score_consideration_clamp,
    ));
    score.apply_consideration(clamp_to_range(
        stats.distance_from_owned_planets_score,
        profile.fighter_attack_distance_from_owned_planets_consideration_clamp,
    ));
    score.apply_consideration(profile.fighter_attack_planet_consideration);

    if score.has_considerations_and_importance() {
        push_action(
            &mut plan.fighter_actions,
            processor,
            FighterAction {
                entity: intel.entity,
                position: intel.position,
                radius: intel.planet_radius,
                importance: 0.0,
                is_owned: intel.is_owned,
            },
            score,
        );
    }
}

fn capture_action(
    processor: &mut AIProcessor,
    plan: &mut TeamPlan,
    intel: &PlanetIntel,
    stats: &PlanetStatistics,
    profile: &TeamAiProfile,
) {
    let mut score = AIAction::new();
    score.apply_consideration(clamp_to_range(
        stats.safety_level,
        profile.worker_capture_safety_level_consideration_clamp,
    ));
    score.apply_consideration(clamp_to_range(
        stats.resource_generation_score,
        profile.worker_capture_resource_score_consideration_clamp,
    ));
    score.apply_consideration(clamp_to_range(
        stats.distance_from_owned_planets_score,
        profile.worker_capture_distance_from_owned_planets_consideration_clamp,
    ));
    score.apply_consideration(profile.worker_capture_planet_consideration);

    if score.has_considerations_and_importance() {
        push_action(
            &mut plan.worker_actions,
            processor,
            WorkerAction {
                kind: WorkerActionKind::Capture,
                entity: intel.entity,
                position: intel.position,
                radius: intel.planet_radius,
                importance: 0.0,
            },
            score,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        components::{PlanetNetworkLink, ShipsAssessment, Team},
        intel::{FleetAssessment, MoonSnapshot},
    };

    fn planet(id: u32, position: Vec3, team: Team) -> PlanetSnapshot {
        PlanetSnapshot {
            entity: Entity::from_raw(id),
            position,
            radius: 5.0,
            team,
            resource_generation_rate: Vec3::new(1.0, 1.0, 1.0),
            resource_current_storage: Vec3::splat(10.0),
            resource_max_storage: Vec3::splat(100.0),
            ships_assessment: vec![ShipsAssessment::default(); 2],
            network: Vec::new(),
            moons: Vec::new(),
        }
    }

    fn link(to: &PlanetSnapshot, from: Vec3) -> PlanetNetworkLink {
        PlanetNetworkLink {
            entity: to.entity,
            position: to.position,
            distance: to.position.distance(from),
            radius: to.radius,
        }
    }

    fn two_planet_world() -> PlanningWorld {
        let mut home = planet(1, Vec3::ZERO, Team::Empire(TeamId(0)));
        let mut rival = planet(2, Vec3::new(100.0, 0.0, 0.0), Team::Empire(TeamId(1)));
        let unconnected = planet(3, Vec3::new(-300.0, 0.0, 0.0), Team::Neutral);
        home.network.push(link(&rival, home.position));
        rival.network.push(link(&home, rival.position));
        home.ships_assessment[0].fighters = 5;
        home.moons.push(MoonSnapshot {
            entity: Entity::from_raw(10),
            position: Vec3::new(8.0, 0.0, 0.0),
            radius: 1.0,
            building: None,
        });

        PlanningWorld::new(vec![home, rival, unconnected], UnitCatalog::builtin(), Vec::new())
    }

    #[test]
    fn two_planets_yield_defend_and_attack() {
        let world = two_planet_world();
        let mut brain = TeamManagerAi::new(7);
        let plan = plan_team(TeamId(0), &mut brain, &TeamAiProfile::default(), &world);

        let defend = plan
            .fighter_actions
            .iter()
            .find(|action| action.entity == Entity::from_raw(1))
            .expect("defend action");
        assert!(defend.is_owned);
        assert!(defend.importance > 0.0);

        let attack = plan
            .fighter_actions
            .iter()
            .find(|action| action.entity == Entity::from_raw(2))
            .expect("attack action");
        assert!(!attack.is_owned);
        assert!(attack.importance > 0.0);

        assert!(plan
            .fighter_actions
            .iter()
            .all(|action| action.entity != Entity::from_raw(3)));
        assert!(plan
            .worker_actions
            .iter()
            .all(|action| action.entity != Entity::from_raw(3)));
        assert_eq!(brain.empire.owned_planets, 1);
        assert_eq!(brain.empire.total_planets, 2);
        assert!(!brain.is_defeated);
    }

    #[test]
    fn owned_planet_without_factory_builds_one() {
        let world = two_planet_world();
        let mut brain = TeamManagerAi::new(7);
        let plan = plan_team(TeamId(0), &mut brain, &TeamAiProfile::default(), &world);

        let factory = world.catalog().factory_building();
        let build = plan
            .worker_actions
            .iter()
            .find(|action| matches!(action.kind, WorkerActionKind::Build { .. }))
            .expect("build action");
        assert_eq!(build.entity, Entity::from_raw(10));
        assert_eq!(build.kind, WorkerActionKind::Build { building: factory.expect("factory") });

        let capture = plan
            .worker_actions
            .iter()
            .find(|action| action.kind == WorkerActionKind::Capture)
            .expect("capture action");
        assert_eq!(capture.entity, Entity::from_raw(2));
    }

    #[test]
    fn team_without_planets_is_defeated() {
        let world = two_planet_world();
        let mut brain = TeamManagerAi::new(3);
        let plan = plan_team(TeamId(5), &mut brain, &TeamAiProfile::default(), &world);
        assert!(brain.is_defeated);
        assert!(plan.is_empty());
    }

    #[test]
    fn factory_biases_follow_fleet_ratios() {
        let mut fleets = vec![TeamFleet::default()];
        fleets[0].fighters = FleetAssessment { count: 4, value: 8.0 };
        fleets[0].workers = FleetAssessment { count: 2, value: 2.0 };
        fleets[0].traders = FleetAssessment { count: 1, value: 1.5 };
        let base = two_planet_world();
        let world = PlanningWorld::new(base.planets().to_vec(), UnitCatalog::builtin(), fleets);

        let profile = TeamAiProfile::default();
        let mut brain = TeamManagerAi::new(1);
        plan_team(TeamId(0), &mut brain, &profile, &world);

        // 2.0 * (2 workers + 1 trader) / 4 fighters
        assert!((brain.fighter_bias - 1.5).abs() < 1e-6);
        // 1.0 * 2 known planets / 2.0 worker value
        assert!((brain.worker_bias - 1.0).abs() < 1e-6);
        // One owned planet leaves traders idle.
        assert_eq!(brain.trader_bias, 0.0);
    }

    #[test]
    fn empty_fleet_uses_max_bias_and_splits_by_probability() {
        let world = two_planet_world();
        let profile = TeamAiProfile::default();
        let mut brain = TeamManagerAi::new(1);
        let plan = plan_team(TeamId(0), &mut brain, &profile, &world);

        assert_eq!(brain.fighter_bias, profile.max_ship_production_bias);
        assert_eq!(plan.factory_actions.len(), world.catalog().ships().len());
        for action in &plan.factory_actions {
            let ship = world.catalog().ship(action.ship).expect("ship");
            assert_eq!(action.resource_cost, ship.resources_cost());
            assert!(action.importance > 0.0);
        }
    }

    #[test]
    fn planning_is_deterministic_per_seed() {
        let world = two_planet_world();
        let profile = TeamAiProfile::default();
        let mut first = TeamManagerAi::new(11);
        let mut second = TeamManagerAi::new(11);
        for _ in 0..5 {
            let a = plan_team(TeamId(0), &mut first, &profile, &world);
            let b = plan_team(TeamId(0), &mut second, &profile, &world);
            assert_eq!(a.worker_actions, b.worker_actions);
            assert_eq!(a.fighter_actions, b.fighter_actions);
        }
    }

    #[test]
    fn pick_building_respects_existing_factory() {
        let catalog = UnitCatalog::builtin();
        let factory = catalog.factory_building();
        let mut rng = deterministic_rng(&[42]);
        assert_eq!(pick_building_to_build(false, &catalog, &mut rng), factory);

        let mut seen_other = false;
        for _ in 0..64 {
            if pick_building_to_build(true, &catalog, &mut rng) != factory {
                seen_other = true;
            }
        }
        assert!(seen_other);
    }
}
