use std::{fmt, sync::Arc};

use bevy::{math::Vec3, prelude::*};

use crate::{
    deterministic_random::GameRng,
    unit_catalog::{BuildingArchetypeId, BuildingData, ResearchBonusData, ShipArchetypeId, ShipData},
};

/// Number of addressable empires; byte `255` is reserved for neutral.
pub const MAX_TEAMS: usize = u8::MAX as usize;
pub const NEUTRAL_TEAM_BYTE: u8 = u8::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TeamId(pub u8);

impl TeamId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "team-{}", self.0)
    }
}

/// Ownership of a planet, moon, ship or building.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Team {
    #[default]
    Neutral,
    Empire(TeamId),
}

impl Team {
    /// Team from a signed index; negative values are neutral. Indices past the
    /// supported range are reported and treated as neutral.
    pub fn from_index(index: i32) -> Self {
        if index < 0 {
            return Team::Neutral;
        }
        if index as usize >= MAX_TEAMS {
            tracing::error!(
                target: "galaxy_sim::team",
                index,
                max = MAX_TEAMS,
                "team.index_out_of_range"
            );
            return Team::Neutral;
        }
        Team::Empire(TeamId(index as u8))
    }

    pub fn id(self) -> Option<TeamId> {
        match self {
            Team::Neutral => None,
            Team::Empire(id) => Some(id),
        }
    }

    pub fn index(self) -> Option<usize> {
        self.id().map(TeamId::index)
    }

    pub fn is_non_neutral(self) -> bool {
        matches!(self, Team::Empire(_))
    }

    /// Byte stored in spatial database elements.
    pub fn as_byte(self) -> u8 {
        match self {
            Team::Neutral => NEUTRAL_TEAM_BYTE,
            Team::Empire(id) => id.0,
        }
    }
}

/// Type tag shared by ships and buildings.
#[repr(u8)]
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorType {
    Fighter = 1,
    Worker = 2,
    Trader = 3,
    Factory = 11,
    Turret = 12,
    Research = 13,
}

impl ActorType {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            1 => Some(ActorType::Fighter),
            2 => Some(ActorType::Worker),
            3 => Some(ActorType::Trader),
            11 => Some(ActorType::Factory),
            12 => Some(ActorType::Turret),
            13 => Some(ActorType::Research),
            _ => None,
        }
    }

    pub fn is_ship(self) -> bool {
        matches!(self, ActorType::Fighter | ActorType::Worker | ActorType::Trader)
    }

    pub fn is_building(self) -> bool {
        !self.is_ship()
    }
}

/// Marks entities that turrets and fighters may shoot at.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Targetable;

#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct Health {
    pub max: f32,
    pub current: f32,
}

impl Health {
    pub fn new(max: f32) -> Self {
        Self { max, current: max }
    }

    pub fn is_dead(&self) -> bool {
        self.current <= 0.0
    }

    pub fn apply_damage(&mut self, damage: f32) {
        self.current = (self.current - damage).clamp(0.0, self.max);
    }

    pub fn heal(&mut self, amount: f32) {
        if !self.is_dead() {
            self.apply_damage(-amount);
        }
    }
}

/// Stacked research effects. Multipliers start at one and each research
/// building adds its own increments on top.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResearchBonuses {
    pub ship_speed_multiplier: f32,
    pub ship_acceleration_multiplier: f32,
    pub ship_max_health_multiplier: f32,
    pub ship_damage_multiplier: f32,
    pub factory_build_speed_multiplier: f32,
    pub planet_resource_generation_rate_add: Vec3,
}

impl Default for ResearchBonuses {
    fn default() -> Self {
        Self {
            ship_speed_multiplier: 1.0,
            ship_acceleration_multiplier: 1.0,
            ship_max_health_multiplier: 1.0,
            ship_damage_multiplier: 1.0,
            factory_build_speed_multiplier: 1.0,
            planet_resource_generation_rate_add: Vec3::ZERO,
        }
    }
}

impl ResearchBonuses {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn add(&mut self, bonus: &ResearchBonusData) {
        self.ship_speed_multiplier += bonus.ship_speed_multiplier;
        self.ship_acceleration_multiplier += bonus.ship_acceleration_multiplier;
        self.ship_max_health_multiplier += bonus.ship_max_health_multiplier;
        self.ship_damage_multiplier += bonus.ship_damage_multiplier;
        self.factory_build_speed_multiplier += bonus.factory_build_speed_multiplier;
        self.planet_resource_generation_rate_add += bonus.planet_resource_generation_rate_add();
    }
}

#[derive(Component, Debug, Clone)]
pub struct Planet {
    pub radius: f32,
    pub ships_assessment_extents: f32,
    pub capture_time: f32,
    pub resource_max_storage: Vec3,
    pub resource_generation_rate: Vec3,
    pub resource_current_storage: Vec3,
    pub ships_assessment_counter: i32,
    pub capture_progress: f32,
    pub last_converting_team: Option<TeamId>,
    pub research_bonuses: ResearchBonuses,
}

impl Planet {
    pub fn has_enough_resources(&self, cost: Vec3) -> bool {
        self.resource_current_storage.cmpge(cost).all()
    }

    /// Spends `cost` only if every channel can cover it.
    pub fn try_consume_resources(&mut self, cost: Vec3) -> bool {
        if self.has_enough_resources(cost) {
            self.resource_current_storage -= cost;
            true
        } else {
            false
        }
    }

    /// Spends a scalar `amount` from whichever channel currently holds the most.
    pub fn try_consume_from_largest(&mut self, amount: f32) -> bool {
        let storage = self.resource_current_storage;
        let mut largest = 0;
        if storage.y > storage.x {
            largest = 1;
        }
        if storage.z > storage[largest] {
            largest = 2;
        }
        if storage[largest] >= amount {
            self.resource_current_storage[largest] -= amount;
            true
        } else {
            false
        }
    }

    /// Ratio of current to max storage, zero on channels without capacity.
    pub fn storage_ratio(&self) -> Vec3 {
        storage_ratio(self.resource_current_storage, self.resource_max_storage)
    }
}

pub fn storage_ratio(current: Vec3, max: Vec3) -> Vec3 {
    Vec3::new(
        if max.x > 0.0 { current.x / max.x } else { 0.0 },
        if max.y > 0.0 { current.y / max.y } else { 0.0 },
        if max.z > 0.0 { current.z / max.z } else { 0.0 },
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanetNetworkLink {
    pub entity: Entity,
    pub position: Vec3,
    pub distance: f32,
    pub radius: f32,
}

/// A planet's nearest neighbours, ascending by distance.
#[derive(Component, Debug, Clone, Default)]
pub struct PlanetNetwork(pub Vec<PlanetNetworkLink>);

impl PlanetNetwork {
    /// Inserts keeping ascending distance order; a full network only accepts
    /// links closer than its farthest entry, which is then evicted. Planets
    /// already linked are left alone.
    pub fn add_sorted(&mut self, link: PlanetNetworkLink, capacity: usize) {
        if capacity == 0 || self.0.iter().any(|existing| existing.entity == link.entity) {
            return;
        }
        let position = self
            .0
            .iter()
            .position(|existing| link.distance < existing.distance)
            .unwrap_or(self.0.len());
        if position >= capacity {
            return;
        }
        self.0.insert(position, link);
        self.0.truncate(capacity);
    }

    pub fn links(&self) -> &[PlanetNetworkLink] {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShipsAssessment {
    pub fighters: u32,
    pub workers: u32,
    pub traders: u32,
}

impl ShipsAssessment {
    pub fn total(&self) -> u32 {
        self.fighters + self.workers + self.traders
    }
}

/// Per-team ship counts around a planet, indexed by team id.
#[derive(Component, Debug, Clone, Default)]
pub struct PlanetShipsAssessment(pub Vec<ShipsAssessment>);

/// Capture speed contributed this tick, indexed by team id.
#[derive(Component, Debug, Clone, Default)]
pub struct CapturingWorkers(pub Vec<f32>);

#[derive(Component, Debug, Clone, Default)]
pub struct PlanetMoons(pub Vec<Entity>);

#[derive(Component, Debug, Clone)]
pub struct Moon {
    pub planet: Entity,
    pub radius: f32,
    pub cumulative_build_speed: f32,
    pub build_progress: f32,
    pub construction: Option<BuildingArchetypeId>,
    pub previous_team: Team,
    pub building: Option<Entity>,
}

impl Moon {
    pub fn new(planet: Entity, radius: f32) -> Self {
        Self {
            planet,
            radius,
            cumulative_build_speed: 0.0,
            build_progress: 0.0,
            construction: None,
            previous_team: Team::Neutral,
            building: None,
        }
    }

    pub fn clear_construction(&mut self) {
        self.cumulative_build_speed = 0.0;
        self.build_progress = 0.0;
        self.construction = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavigationTarget {
    pub entity: Entity,
    pub position: Vec3,
    pub radius: f32,
}

/// Work a controller asked its executor to perform this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShipOrder {
    Attack,
    CapturePlanet,
    Build,
    Trade,
}

#[derive(Component, Debug, Clone)]
pub struct Ship {
    pub data: Arc<ShipData>,
    pub archetype: ShipArchetypeId,
    pub velocity: Vec3,
    pub navigation_target: Option<NavigationTarget>,
    pub ignore_avoidance: bool,
    pub block_navigation: bool,
    pub acceleration_multiplier: f32,
    pub max_speed_multiplier: f32,
    pub pending_order: Option<ShipOrder>,
}

impl Ship {
    pub fn new(data: Arc<ShipData>, archetype: ShipArchetypeId) -> Self {
        Self {
            data,
            archetype,
            velocity: Vec3::ZERO,
            navigation_target: None,
            ignore_avoidance: false,
            block_navigation: false,
            acceleration_multiplier: 1.0,
            max_speed_multiplier: 1.0,
            pending_order: None,
        }
    }

    pub fn take_order(&mut self, order: ShipOrder) -> bool {
        if self.pending_order == Some(order) {
            self.pending_order = None;
            true
        } else {
            false
        }
    }
}

#[derive(Component, Debug, Clone)]
pub struct Fighter {
    pub attack_timer: f32,
    pub detection_timer: f32,
    pub target_is_enemy_ship: bool,
    pub damage_multiplier: f32,
}

impl Default for Fighter {
    fn default() -> Self {
        Self {
            attack_timer: 0.0,
            detection_timer: 0.0,
            target_is_enemy_ship: false,
            damage_multiplier: 1.0,
        }
    }
}

#[derive(Component, Debug, Clone, Default)]
pub struct Worker {
    pub desired_building: Option<BuildingArchetypeId>,
}

#[derive(Component, Debug, Clone, Default)]
pub struct Trader {
    pub receiving_planet: Option<NavigationTarget>,
    pub chosen_resource_mask: Vec3,
    pub carried_resources: Vec3,
    pub find_trade_route_attempts: i32,
}

#[derive(Component, Debug, Clone)]
pub struct Building {
    pub data: Arc<BuildingData>,
    pub archetype: BuildingArchetypeId,
    pub planet: Entity,
    pub moon: Entity,
    pub rng: GameRng,
}

#[derive(Component, Debug, Clone, Default)]
pub struct Factory {
    pub current_production: Option<ShipArchetypeId>,
    pub production_timer: f32,
    pub production_bonuses: ResearchBonuses,
}

#[derive(Component, Debug, Clone, Default)]
pub struct Turret {
    pub detection_timer: f32,
    pub attack_timer: f32,
    pub active_target: Option<(Entity, Vec3)>,
    pub must_attack: bool,
}

#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Research;

/// Root entity of an empire.
#[derive(Component, Debug, Clone)]
pub struct TeamManager {
    pub team: TeamId,
    pub name: String,
}
