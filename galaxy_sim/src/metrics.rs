use std::hash::Hasher;

use bevy::prelude::*;

use crate::{
    components::{Building, Health, Planet, Ship, Team},
    hashing::FnvHasher,
    resources::{ShipCensus, SimulationTick, TeamRoster},
    spatial_database::SpatialDatabase,
};

/// Summary of the galaxy after the latest tick.
#[derive(Resource, Default, Debug, Clone, PartialEq)]
pub struct SimulationMetrics {
    pub turn: u64,
    pub teams_alive: usize,
    pub planets_per_team: Vec<u32>,
    pub neutral_planets: u32,
    pub ships_per_team: Vec<u32>,
    pub total_ships: u32,
    pub buildings: u32,
    pub stored_resources: Vec3,
    pub spatial_elements: usize,
    pub spatial_excess: usize,
    /// FNV-1a digest of ship and planet state; two runs with the same seed
    /// and configuration produce the same sequence of digests.
    pub digest: u64,
}

pub fn collect_metrics(
    tick: Res<SimulationTick>,
    roster: Res<TeamRoster>,
    census: Res<ShipCensus>,
    database: Res<SpatialDatabase>,
    mut metrics: ResMut<SimulationMetrics>,
    planets: Query<(Entity, &Planet, &Team)>,
    ships: Query<(Entity, &Transform, &Team, &Health), With<Ship>>,
    buildings: Query<(), With<Building>>,
) {
    metrics.turn = tick.0;
    metrics.teams_alive = roster.alive_count();
    metrics.total_ships = census.total;
    metrics.ships_per_team = census.per_team.clone();
    metrics.buildings = buildings.iter().count() as u32;
    metrics.spatial_elements = database.total_elements();
    metrics.spatial_excess = database.total_excess();

    let mut planets_per_team = vec![0u32; roster.len()];
    let mut neutral_planets = 0;
    let mut stored_resources = Vec3::ZERO;
    let mut planet_rows: Vec<(Entity, &Planet, Team)> = Vec::new();
    for (entity, planet, team) in &planets {
        match team.index().and_then(|index| planets_per_team.get_mut(index)) {
            Some(count) => *count += 1,
            None => neutral_planets += 1,
        }
        stored_resources += planet.resource_current_storage;
        planet_rows.push((entity, planet, *team));
    }
    metrics.planets_per_team = planets_per_team;
    metrics.neutral_planets = neutral_planets;
    metrics.stored_resources = stored_resources;

    let mut hasher = FnvHasher::new();
    hasher.write_u64(tick.0);
    planet_rows.sort_by_key(|(entity, ..)| *entity);
    for (entity, planet, team) in planet_rows {
        hasher.write_u64(entity.to_bits());
        hasher.write_u8(team.as_byte());
        hasher.write_vec3(planet.resource_current_storage);
        hasher.write_f32(planet.capture_progress);
    }
    let mut ship_rows: Vec<_> = ships.iter().collect();
    ship_rows.sort_by_key(|(entity, ..)| *entity);
    for (entity, transform, team, health) in ship_rows {
        hasher.write_u64(entity.to_bits());
        hasher.write_u8(team.as_byte());
        hasher.write_vec3(transform.translation);
        hasher.write_f32(health.current);
    }
    metrics.digest = hasher.finish();
}
