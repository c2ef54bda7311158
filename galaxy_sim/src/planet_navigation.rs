use bevy::{
    math::Vec3,
    prelude::{Entity, Resource},
};

use crate::uniform_grid::UniformOriginGrid;

/// Planet a ship should steer around while it sits in a navigation cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanetNavigationCell {
    pub entity: Entity,
    pub position: Vec3,
    pub radius: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct PlanetNavigationBuildData {
    pub entity: Entity,
    pub position: Vec3,
    pub radius: f32,
}

/// Coarse static grid mapping every cell to the planet whose surface is
/// closest to the cell center. Built once when the galaxy is generated.
#[derive(Resource, Debug, Clone)]
pub struct PlanetNavigationGrid {
    grid: UniformOriginGrid,
    cells: Vec<PlanetNavigationCell>,
}

impl PlanetNavigationGrid {
    pub fn build(planets: &[PlanetNavigationBuildData], half_extents: f32, subdivisions: u32) -> Self {
        let grid = UniformOriginGrid::new(half_extents, subdivisions);
        if planets.is_empty() {
            return Self {
                grid,
                cells: Vec::new(),
            };
        }

        let cells = (0..grid.cell_count())
            .map(|index| {
                let center = grid.cell_center(grid.cell_coords_from_index(index));
                let mut closest = planets[0];
                let mut closest_distance = f32::MAX;
                for planet in planets {
                    let surface_distance = (planet.position - center).length() - planet.radius;
                    if surface_distance < closest_distance {
                        closest = *planet;
                        closest_distance = surface_distance;
                    }
                }
                PlanetNavigationCell {
                    entity: closest.entity,
                    position: closest.position,
                    radius: closest.radius,
                }
            })
            .collect();

        Self { grid, cells }
    }

    pub fn grid(&self) -> &UniformOriginGrid {
        &self.grid
    }

    pub fn cells(&self) -> &[PlanetNavigationCell] {
        &self.cells
    }

    /// `None` outside the grid bounds or when the galaxy has no planets.
    pub fn cell_data_at_position(&self, position: Vec3) -> Option<&PlanetNavigationCell> {
        let index = self.grid.try_cell_index(position)?;
        self.cells.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planet(index: u32, position: Vec3, radius: f32) -> PlanetNavigationBuildData {
        PlanetNavigationBuildData {
            entity: Entity::from_raw(index),
            position,
            radius,
        }
    }

    #[test]
    fn cells_pick_nearest_planet_surface() {
        let planets = [
            planet(1, Vec3::new(-50.0, 0.0, 0.0), 5.0),
            planet(2, Vec3::new(50.0, 0.0, 0.0), 5.0),
        ];
        let nav = PlanetNavigationGrid::build(&planets, 100.0, 2);

        let left = nav
            .cell_data_at_position(Vec3::new(-80.0, 10.0, 10.0))
            .map(|cell| cell.entity);
        let right = nav
            .cell_data_at_position(Vec3::new(80.0, -10.0, 10.0))
            .map(|cell| cell.entity);
        assert_eq!(left, Some(Entity::from_raw(1)));
        assert_eq!(right, Some(Entity::from_raw(2)));
    }

    #[test]
    fn larger_radius_wins_when_surface_is_closer() {
        // Cell center at x = -12.5 is 37.5 from the small planet's center but
        // 62.5 - 40 = 22.5 from the large planet's surface.
        let planets = [
            planet(1, Vec3::new(-50.0, 0.0, 0.0), 0.0),
            planet(2, Vec3::new(50.0, 0.0, 0.0), 40.0),
        ];
        let nav = PlanetNavigationGrid::build(&planets, 100.0, 3);
        let cell = nav
            .cell_data_at_position(Vec3::new(-12.0, 1.0, 1.0))
            .expect("inside bounds");
        assert_eq!(cell.entity, Entity::from_raw(2));
        assert_eq!(cell.radius, 40.0);
    }

    #[test]
    fn out_of_bounds_or_empty_yields_none() {
        let nav = PlanetNavigationGrid::build(&[planet(1, Vec3::ZERO, 1.0)], 10.0, 1);
        assert!(nav.cell_data_at_position(Vec3::splat(11.0)).is_none());
        assert!(nav.cell_data_at_position(Vec3::splat(1.0)).is_some());

        let empty = PlanetNavigationGrid::build(&[], 10.0, 1);
        assert!(empty.cell_data_at_position(Vec3::splat(1.0)).is_none());
        assert!(empty.cells().is_empty());
    }
}
