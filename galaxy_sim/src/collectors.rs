//! Spatial query collectors shared by the ship, building and planet systems.

use std::ops::ControlFlow;

use bevy::{math::Vec3, prelude::Entity};

use crate::{
    components::{ActorType, ShipsAssessment},
    spatial_database::{CellVisit, SpatialDatabaseElement, SpatialQueryCollector},
    uniform_grid::{distance_sq_aabb_to_point, UniformOriginGrid},
};

/// Cheap enemy search for proximity-ordered queries.
///
/// Within a visited cell the first enemy closer than the best so far wins and
/// the query stops right there, so the result is "an enemy in the nearest
/// occupied shell" rather than the exact nearest one.
#[derive(Debug, Clone)]
pub struct ShipQueryCollector {
    querier: Entity,
    querier_position: Vec3,
    querier_team: u8,
    closest_enemy: Option<SpatialDatabaseElement>,
    closest_enemy_distance_sq: f32,
}

impl ShipQueryCollector {
    pub fn new(querier: Entity, querier_position: Vec3, querier_team: u8) -> Self {
        Self {
            querier,
            querier_position,
            querier_team,
            closest_enemy: None,
            closest_enemy_distance_sq: f32::MAX,
        }
    }

    pub fn closest_enemy(&self) -> Option<&SpatialDatabaseElement> {
        self.closest_enemy.as_ref()
    }

    pub fn closest_enemy_distance_sq(&self) -> f32 {
        self.closest_enemy_distance_sq
    }
}

impl SpatialQueryCollector for ShipQueryCollector {
    fn on_visit_cell(
        &mut self,
        _visit: CellVisit,
        elements: &[SpatialDatabaseElement],
    ) -> ControlFlow<()> {
        for element in elements {
            if element.team == self.querier_team || element.entity == self.querier {
                continue;
            }
            let distance_sq = self.querier_position.distance_squared(element.position);
            if distance_sq < self.closest_enemy_distance_sq {
                self.closest_enemy = Some(*element);
                self.closest_enemy_distance_sq = distance_sq;
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }
}

/// Exact nearest enemy within `radius` of the source position.
///
/// Meant for [`crate::SpatialDatabase::query_aabb_cell_proximity_order`]:
/// every element of shell `n` lies at least `(n - 1) * cell_size` away from
/// the source, so once the best match is closer than that bound the walk
/// stops. Cells whose box is farther than the best match are skipped.
#[derive(Debug, Clone)]
pub struct NearestEnemyCollector {
    grid: UniformOriginGrid,
    querier: Entity,
    source: Vec3,
    source_coords: bevy::math::IVec3,
    querier_team: u8,
    radius_sq: f32,
    best: Option<SpatialDatabaseElement>,
    best_distance_sq: f32,
}

impl NearestEnemyCollector {
    pub fn new(grid: &UniformOriginGrid, querier: Entity, source: Vec3, querier_team: u8, radius: f32) -> Self {
        Self {
            grid: *grid,
            querier,
            source,
            source_coords: grid.cell_coords_from_position(source),
            querier_team,
            radius_sq: radius * radius,
            best: None,
            best_distance_sq: f32::MAX,
        }
    }

    pub fn nearest(&self) -> Option<&SpatialDatabaseElement> {
        self.best.as_ref()
    }

    pub fn nearest_distance_sq(&self) -> Option<f32> {
        self.best.map(|_| self.best_distance_sq)
    }
}

impl SpatialQueryCollector for NearestEnemyCollector {
    fn on_visit_cell(
        &mut self,
        visit: CellVisit,
        elements: &[SpatialDatabaseElement],
    ) -> ControlFlow<()> {
        if self.best.is_some() {
            let shell = (visit.coords - self.source_coords).abs().max_element();
            if shell >= 1 {
                let lower_bound = (shell - 1) as f32 * self.grid.cell_size();
                if self.best_distance_sq <= lower_bound * lower_bound {
                    return ControlFlow::Break(());
                }
            }

            let (cell_min, cell_max) = self.grid.cell_aabb(visit.coords);
            if distance_sq_aabb_to_point(cell_min, cell_max, self.source) > self.best_distance_sq {
                return ControlFlow::Continue(());
            }
        }

        for element in elements {
            if element.team == self.querier_team || element.entity == self.querier {
                continue;
            }
            let distance_sq = self.source.distance_squared(element.position);
            if distance_sq <= self.radius_sq && distance_sq < self.best_distance_sq {
                self.best = Some(*element);
                self.best_distance_sq = distance_sq;
            }
        }
        ControlFlow::Continue(())
    }
}

/// Tallies ships per team around a planet. Elements whose team byte has no
/// slot (neutral, or beyond the configured team count) are ignored.
#[derive(Debug)]
pub struct PlanetAssessmentCollector<'a> {
    assessments: &'a mut [ShipsAssessment],
}

impl<'a> PlanetAssessmentCollector<'a> {
    pub fn new(assessments: &'a mut [ShipsAssessment]) -> Self {
        Self { assessments }
    }
}

impl SpatialQueryCollector for PlanetAssessmentCollector<'_> {
    fn on_visit_cell(
        &mut self,
        _visit: CellVisit,
        elements: &[SpatialDatabaseElement],
    ) -> ControlFlow<()> {
        for element in elements {
            let Some(assessment) = self.assessments.get_mut(element.team as usize) else {
                continue;
            };
            match element.actor {
                ActorType::Fighter => assessment.fighters += 1,
                ActorType::Worker => assessment.workers += 1,
                ActorType::Trader => assessment.traders += 1,
                ActorType::Factory | ActorType::Turret | ActorType::Research => {}
            }
        }
        ControlFlow::Continue(())
    }
}
