use bevy::math::{IVec3, Vec3};

/// Highest subdivision level a grid may use (`8^6` cells).
pub const MAX_GRID_SUBDIVISIONS: u32 = 6;

/// Uniform grid over an axis-aligned cube centered at the world origin.
///
/// A grid with subdivision level `s` splits every axis into `2^s` cells, for
/// `8^s` cells in total. Cells are flattened as `x + z * dim + y * dim²`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformOriginGrid {
    half_extents: f32,
    subdivisions: u32,
    cell_count: usize,
    cell_count_per_dimension: i32,
    cell_count_per_plane: i32,
    cell_size: f32,
    bounds_min: Vec3,
    bounds_max: Vec3,
}

impl UniformOriginGrid {
    /// Levels above [`MAX_GRID_SUBDIVISIONS`] are clamped to it.
    pub fn new(half_extents: f32, subdivisions: u32) -> Self {
        let subdivisions = subdivisions.min(MAX_GRID_SUBDIVISIONS);
        let cell_count_per_dimension = 1i32 << subdivisions;
        let cell_count_per_plane = cell_count_per_dimension * cell_count_per_dimension;
        let cell_count = (cell_count_per_plane as usize) * (cell_count_per_dimension as usize);
        let cell_size = (half_extents * 2.0) / cell_count_per_dimension as f32;

        Self {
            half_extents,
            subdivisions,
            cell_count,
            cell_count_per_dimension,
            cell_count_per_plane,
            cell_size,
            bounds_min: Vec3::splat(-half_extents),
            bounds_max: Vec3::splat(half_extents),
        }
    }

    pub fn half_extents(&self) -> f32 {
        self.half_extents
    }

    pub fn subdivisions(&self) -> u32 {
        self.subdivisions
    }

    pub fn cell_count(&self) -> usize {
        self.cell_count
    }

    pub fn cell_count_per_dimension(&self) -> i32 {
        self.cell_count_per_dimension
    }

    pub fn cell_count_per_plane(&self) -> i32 {
        self.cell_count_per_plane
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn bounds_min(&self) -> Vec3 {
        self.bounds_min
    }

    pub fn bounds_max(&self) -> Vec3 {
        self.bounds_max
    }

    /// Open-interval bounds test: a position lying exactly on a face is outside.
    pub fn is_in_bounds(&self, position: Vec3) -> bool {
        position.x > self.bounds_min.x
            && position.x < self.bounds_max.x
            && position.y > self.bounds_min.y
            && position.y < self.bounds_max.y
            && position.z > self.bounds_min.z
            && position.z < self.bounds_max.z
    }

    /// Flattened cell index for `position`, or `-1` when out of bounds.
    pub fn cell_index(&self, position: Vec3) -> i32 {
        if !self.is_in_bounds(position) {
            return -1;
        }
        self.cell_index_from_coords(self.cell_coords_from_position(position))
    }

    /// Same as [`Self::cell_index`] without the `-1` sentinel.
    pub fn try_cell_index(&self, position: Vec3) -> Option<usize> {
        match self.cell_index(position) {
            index if index >= 0 => Some(index as usize),
            _ => None,
        }
    }

    pub fn cell_coords_from_position(&self, position: Vec3) -> IVec3 {
        let local = position - self.bounds_min;
        let coords = (local / self.cell_size).floor().as_ivec3();
        coords.clamp(IVec3::ZERO, IVec3::splat(self.cell_count_per_dimension - 1))
    }

    pub fn cell_coords_from_index(&self, index: usize) -> IVec3 {
        let index = index as i32;
        IVec3::new(
            index % self.cell_count_per_dimension,
            index / self.cell_count_per_plane,
            (index % self.cell_count_per_plane) / self.cell_count_per_dimension,
        )
    }

    pub fn cell_index_from_coords(&self, coords: IVec3) -> i32 {
        coords.x
            + (coords.z * self.cell_count_per_dimension)
            + (coords.y * self.cell_count_per_plane)
    }

    pub fn cell_center(&self, coords: IVec3) -> Vec3 {
        self.bounds_min + Vec3::splat(self.cell_size * 0.5) + coords.as_vec3() * self.cell_size
    }

    pub fn cell_aabb(&self, coords: IVec3) -> (Vec3, Vec3) {
        let min = self.bounds_min + coords.as_vec3() * self.cell_size;
        (min, min + Vec3::splat(self.cell_size))
    }

    /// Coordinates of the cells covered by the AABB once clamped to the grid
    /// bounds, or `None` if the AABB misses the grid entirely.
    pub fn aabb_min_max_coords(&self, aabb_min: Vec3, aabb_max: Vec3) -> Option<(IVec3, IVec3)> {
        if !aabb_intersect_aabb(aabb_min, aabb_max, self.bounds_min, self.bounds_max) {
            return None;
        }

        let clamped_min = aabb_min.clamp(self.bounds_min, self.bounds_max);
        let clamped_max = aabb_max.clamp(self.bounds_min, self.bounds_max);
        Some((
            self.cell_coords_from_position(clamped_min),
            self.cell_coords_from_position(clamped_max),
        ))
    }

    pub fn coords_in_grid(&self, coords: IVec3) -> bool {
        coords.cmpge(IVec3::ZERO).all() && coords.cmplt(IVec3::splat(self.cell_count_per_dimension)).all()
    }
}

/// Inclusive AABB overlap test.
pub fn aabb_intersect_aabb(a_min: Vec3, a_max: Vec3, b_min: Vec3, b_max: Vec3) -> bool {
    a_min.x <= b_max.x
        && a_max.x >= b_min.x
        && a_min.y <= b_max.y
        && a_max.y >= b_min.y
        && a_min.z <= b_max.z
        && a_max.z >= b_min.z
}

/// Squared distance from `point` to the closest point of the AABB (zero inside).
pub fn distance_sq_aabb_to_point(aabb_min: Vec3, aabb_max: Vec3, point: Vec3) -> f32 {
    let closest = point.clamp(aabb_min, aabb_max);
    closest.distance_squared(point)
}

/// Smallest subdivision level in `1..=max_level` whose cells are smaller than
/// `max_cell_size`; falls back to `max_level`.
pub fn subdivision_level_for_max_cell_size(half_extents: f32, max_cell_size: f32, max_level: u32) -> u32 {
    for level in 1..=max_level {
        let cell_size = (half_extents * 2.0) / (1u32 << level) as f32;
        if cell_size < max_cell_size {
            return level;
        }
    }
    max_level
}
