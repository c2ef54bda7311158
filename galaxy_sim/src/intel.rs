//! What an empire knows about the planets it owns or borders, and the
//! normalized statistics its planner scores actions with.

use bevy::{math::Vec3, prelude::Entity};

use crate::{
    components::{storage_ratio, ActorType, PlanetNetworkLink, ShipsAssessment, Team, TeamId},
    math::{saturate, Vec3ElementSum},
};

/// Read-only copy of a moon taken before planning.
#[derive(Debug, Clone, PartialEq)]
pub struct MoonSnapshot {
    pub entity: Entity,
    pub position: Vec3,
    pub radius: f32,
    pub building: Option<ActorType>,
}

/// Read-only copy of a planet taken before planning.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanetSnapshot {
    pub entity: Entity,
    pub position: Vec3,
    pub radius: f32,
    pub team: Team,
    pub resource_generation_rate: Vec3,
    pub resource_current_storage: Vec3,
    pub resource_max_storage: Vec3,
    pub ships_assessment: Vec<ShipsAssessment>,
    pub network: Vec<PlanetNetworkLink>,
    pub moons: Vec<MoonSnapshot>,
}

impl PlanetSnapshot {
    pub fn has_factory(&self) -> bool {
        self.moons
            .iter()
            .any(|moon| moon.building == Some(ActorType::Factory))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FleetAssessment {
    pub count: u32,
    pub value: f32,
}

impl FleetAssessment {
    pub fn record(&mut self, value: f32) {
        self.count += 1;
        self.value += value;
    }
}

/// Fleet composition of one empire, by ship role.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TeamFleet {
    pub fighters: FleetAssessment,
    pub workers: FleetAssessment,
    pub traders: FleetAssessment,
}

impl TeamFleet {
    pub fn record(&mut self, actor: ActorType, value: f32) {
        match actor {
            ActorType::Fighter => self.fighters.record(value),
            ActorType::Worker => self.workers.record(value),
            ActorType::Trader => self.traders.record(value),
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FreeMoon {
    pub entity: Entity,
    pub position: Vec3,
    pub radius: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanetIntel {
    pub entity: Entity,
    pub position: Vec3,
    pub planet_radius: f32,
    pub distance: f32,
    pub is_owned: bool,

    pub resource_generation_rate: Vec3,
    pub current_resource_storage: Vec3,
    pub max_resource_storage: Vec3,

    pub allied_ships: u32,
    pub allied_fighters: u32,
    pub allied_workers: u32,
    pub allied_traders: u32,

    pub enemy_ships: u32,
    pub enemy_fighters: u32,
    pub enemy_workers: u32,
    pub enemy_traders: u32,

    pub first_free_moon: Option<FreeMoon>,
    pub total_moons: u32,
    pub free_moons: u32,

    pub factories: u32,
    pub turrets: u32,
    pub researches: u32,
}

impl PlanetIntel {
    /// Intel on `planet` as seen by `team`, at `distance` from the closest
    /// owned planet that links to it.
    pub fn gather(planet: &PlanetSnapshot, team: TeamId, distance: f32) -> Self {
        let mut intel = Self {
            entity: planet.entity,
            position: planet.position,
            planet_radius: planet.radius,
            distance,
            is_owned: planet.team == Team::Empire(team),
            resource_generation_rate: planet.resource_generation_rate,
            current_resource_storage: planet.resource_current_storage,
            max_resource_storage: planet.resource_max_storage,
            allied_ships: 0,
            allied_fighters: 0,
            allied_workers: 0,
            allied_traders: 0,
            enemy_ships: 0,
            enemy_fighters: 0,
            enemy_workers: 0,
            enemy_traders: 0,
            first_free_moon: None,
            total_moons: 0,
            free_moons: 0,
            factories: 0,
            turrets: 0,
            researches: 0,
        };

        for (index, assessment) in planet.ships_assessment.iter().enumerate() {
            if index == team.index() {
                intel.allied_ships += assessment.total();
                intel.allied_fighters += assessment.fighters;
                intel.allied_workers += assessment.workers;
                intel.allied_traders += assessment.traders;
            } else {
                intel.enemy_ships += assessment.total();
                intel.enemy_fighters += assessment.fighters;
                intel.enemy_workers += assessment.workers;
                intel.enemy_traders += assessment.traders;
            }
        }

        for moon in &planet.moons {
            intel.total_moons += 1;
            match moon.building {
                Some(ActorType::Factory) => intel.factories += 1,
                Some(ActorType::Turret) => intel.turrets += 1,
                Some(ActorType::Research) => intel.researches += 1,
                Some(_) => {}
                None => {
                    if intel.first_free_moon.is_none() {
                        intel.first_free_moon = Some(FreeMoon {
                            entity: moon.entity,
                            position: moon.position,
                            radius: moon.radius,
                        });
                    }
                    intel.free_moons += 1;
                }
            }
        }

        intel
    }

    pub fn storage_ratio(&self) -> Vec3 {
        storage_ratio(self.current_resource_storage, self.max_resource_storage)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EmpireStatistics {
    pub owned_planets: u32,
    pub total_planets: u32,

    pub max_allied_fighters_for_planet: u32,
    pub max_enemy_fighters_for_planet: u32,
    pub farthest_distance: f32,
    pub max_resource_storage_ratio: Vec3,
    pub max_resource_generation_rate: Vec3,

    pub fighters: FleetAssessment,
    pub workers: FleetAssessment,
    pub traders: FleetAssessment,
    pub total_non_fighter_ships: u32,
    pub total_ships: u32,
}

impl EmpireStatistics {
    pub fn from_fleet(fleet: TeamFleet) -> Self {
        let total_non_fighter_ships = fleet.workers.count + fleet.traders.count;
        Self {
            fighters: fleet.fighters,
            workers: fleet.workers,
            traders: fleet.traders,
            total_non_fighter_ships,
            total_ships: total_non_fighter_ships + fleet.fighters.count,
            ..Self::default()
        }
    }

    /// Folds one planet into the empire-wide maxima.
    pub fn accumulate(&mut self, intel: &PlanetIntel) {
        self.max_allied_fighters_for_planet =
            self.max_allied_fighters_for_planet.max(intel.allied_fighters);
        self.max_enemy_fighters_for_planet =
            self.max_enemy_fighters_for_planet.max(intel.enemy_fighters);
        self.farthest_distance = self.farthest_distance.max(intel.distance);
        self.max_resource_storage_ratio = self.max_resource_storage_ratio.max(intel.storage_ratio());
        self.max_resource_generation_rate = self
            .max_resource_generation_rate
            .max(intel.resource_generation_rate);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlanetStatistics {
    pub threat_level: f32,
    pub safety_level: f32,
    pub distance_from_owned_planets_score: f32,
    pub resource_storage_ratio_percentile: Vec3,
    pub resource_generation_score: f32,
}

impl PlanetStatistics {
    /// Every statistic lands in `[0, 1]` and stays zero when the empire-wide
    /// maximum it is normalized by is zero.
    pub fn compute(intel: &PlanetIntel, empire: &EmpireStatistics) -> Self {
        let mut stats = Self::default();

        if empire.max_enemy_fighters_for_planet > 0 {
            stats.threat_level =
                saturate(intel.enemy_fighters as f32 / empire.max_enemy_fighters_for_planet as f32);
        }
        if empire.max_allied_fighters_for_planet > 0 {
            stats.safety_level =
                saturate(intel.allied_fighters as f32 / empire.max_allied_fighters_for_planet as f32);
        }
        if empire.farthest_distance > 0.0 {
            stats.distance_from_owned_planets_score =
                saturate(1.0 - saturate(intel.distance / empire.farthest_distance));
        }
        if empire.max_resource_storage_ratio.length_squared() > 0.0 {
            stats.resource_storage_ratio_percentile = storage_ratio(
                intel.storage_ratio(),
                empire.max_resource_storage_ratio,
            )
            .clamp(Vec3::ZERO, Vec3::ONE);
        }
        let max_generation = empire.max_resource_generation_rate.element_sum();
        if max_generation > 0.0 {
            stats.resource_generation_score = saturate(
                1.0 - saturate(intel.resource_generation_rate.element_sum() / max_generation),
            );
        }

        stats
    }
}
