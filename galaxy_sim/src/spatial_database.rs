use std::ops::ControlFlow;

use bevy::{
    math::{IVec3, Vec3},
    prelude::{Entity, Resource},
};
use rayon::prelude::*;

use crate::{components::ActorType, uniform_grid::UniformOriginGrid};

const CELL_GROWTH_FACTOR: f32 = 2.0;

/// Slice descriptor into the flat element storage of a [`SpatialDatabase`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpatialDatabaseCell {
    pub start_index: usize,
    pub elements_count: usize,
    pub elements_capacity: usize,
    pub excess_elements_count: usize,
}

/// Per-tick snapshot of a queryable entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialDatabaseElement {
    pub entity: Entity,
    pub position: Vec3,
    pub team: u8,
    pub actor: ActorType,
}

impl SpatialDatabaseElement {
    const VACANT: Self = Self {
        entity: Entity::PLACEHOLDER,
        position: Vec3::ZERO,
        team: u8::MAX,
        actor: ActorType::Fighter,
    };
}

/// Cell handed to a collector while a query walks the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellVisit {
    pub index: usize,
    pub coords: IVec3,
}

/// Receives the occupied slice of every cell a query visits.
pub trait SpatialQueryCollector {
    fn on_visit_cell(
        &mut self,
        visit: CellVisit,
        elements: &[SpatialDatabaseElement],
    ) -> ControlFlow<()>;
}

impl<F> SpatialQueryCollector for F
where
    F: FnMut(CellVisit, &[SpatialDatabaseElement]) -> ControlFlow<()>,
{
    fn on_visit_cell(
        &mut self,
        visit: CellVisit,
        elements: &[SpatialDatabaseElement],
    ) -> ControlFlow<()> {
        self(visit, elements)
    }
}

/// Grid-bucketed store of trackables, rebuilt from scratch every tick.
///
/// Each cell owns a contiguous run of `elements_capacity` slots. Inserting
/// into a full cell bumps `excess_elements_count` and drops the element;
/// the next [`SpatialDatabase::clear_and_resize`] grows that cell so the same
/// population fits.
#[derive(Resource, Debug, Clone)]
pub struct SpatialDatabase {
    grid: UniformOriginGrid,
    cells: Vec<SpatialDatabaseCell>,
    elements: Vec<SpatialDatabaseElement>,
}

impl SpatialDatabase {
    pub fn new(half_extents: f32, subdivisions: u32, cell_capacity: usize) -> Self {
        let grid = UniformOriginGrid::new(half_extents, subdivisions);
        let cells = (0..grid.cell_count())
            .map(|index| SpatialDatabaseCell {
                start_index: index * cell_capacity,
                elements_count: 0,
                elements_capacity: cell_capacity,
                excess_elements_count: 0,
            })
            .collect();
        let elements = vec![SpatialDatabaseElement::VACANT; grid.cell_count() * cell_capacity];

        Self {
            grid,
            cells,
            elements,
        }
    }

    pub fn grid(&self) -> &UniformOriginGrid {
        &self.grid
    }

    pub fn cells(&self) -> &[SpatialDatabaseCell] {
        &self.cells
    }

    pub fn cell(&self, index: usize) -> Option<&SpatialDatabaseCell> {
        self.cells.get(index)
    }

    /// Occupied elements of one cell.
    pub fn elements_in_cell(&self, index: usize) -> &[SpatialDatabaseElement] {
        match self.cells.get(index) {
            Some(cell) => &self.elements[cell.start_index..cell.start_index + cell.elements_count],
            None => &[],
        }
    }

    pub fn total_elements(&self) -> usize {
        self.cells.iter().map(|cell| cell.elements_count).sum()
    }

    pub fn total_excess(&self) -> usize {
        self.cells.iter().map(|cell| cell.excess_elements_count).sum()
    }

    pub fn total_capacity(&self) -> usize {
        self.elements.len()
    }

    /// Grows every cell that overflowed last pass, relays out start indices
    /// and empties all cells.
    pub fn clear_and_resize(&mut self) {
        let mut running_start = 0usize;
        for cell in &mut self.cells {
            if cell.excess_elements_count > 0 {
                let wanted = (cell.elements_capacity + cell.excess_elements_count) as f32;
                cell.elements_capacity = (wanted * CELL_GROWTH_FACTOR).ceil() as usize;
            }
            cell.start_index = running_start;
            cell.elements_count = 0;
            cell.excess_elements_count = 0;
            running_start += cell.elements_capacity;
        }
        self.elements
            .resize(running_start, SpatialDatabaseElement::VACANT);
    }

    /// Inserts into the cell under `element.position`. Out-of-bounds elements
    /// are ignored. Returns whether the element was stored.
    pub fn add_to_data_base(&mut self, element: SpatialDatabaseElement) -> bool {
        match self.grid.try_cell_index(element.position) {
            Some(cell_index) => self.add_to_data_base_at(element, cell_index),
            None => false,
        }
    }

    /// Inserts into a precomputed cell index.
    pub fn add_to_data_base_at(&mut self, element: SpatialDatabaseElement, cell_index: usize) -> bool {
        let Some(cell) = self.cells.get_mut(cell_index) else {
            return false;
        };
        let slots =
            &mut self.elements[cell.start_index..cell.start_index + cell.elements_capacity];
        insert_into_cell(cell, slots, element)
    }

    /// Inserts every element, splitting the work into `workers` shards where
    /// shard `w` owns the cells with `index % workers == w`. Cell contents and
    /// per-cell order match a sequential pass over `elements`.
    pub fn build_parallel(&mut self, elements: &[SpatialDatabaseElement], workers: usize) {
        let workers = workers.max(1);
        let grid = self.grid;
        let cell_indices: Vec<i32> = elements
            .par_iter()
            .map(|element| grid.cell_index(element.position))
            .collect();

        let mut shards: Vec<Vec<(&mut SpatialDatabaseCell, &mut [SpatialDatabaseElement])>> =
            (0..workers).map(|_| Vec::new()).collect();
        let mut remaining: &mut [SpatialDatabaseElement] = &mut self.elements;
        for (cell_index, cell) in self.cells.iter_mut().enumerate() {
            let (slots, tail) = std::mem::take(&mut remaining).split_at_mut(cell.elements_capacity);
            remaining = tail;
            shards[cell_index % workers].push((cell, slots));
        }

        shards
            .into_par_iter()
            .enumerate()
            .for_each(|(shard, mut owned_cells)| {
                for (element, &cell_index) in elements.iter().zip(&cell_indices) {
                    if cell_index < 0 {
                        continue;
                    }
                    let cell_index = cell_index as usize;
                    if cell_index % workers != shard {
                        continue;
                    }
                    let (cell, slots) = &mut owned_cells[cell_index / workers];
                    insert_into_cell(cell, slots, *element);
                }
            });
    }

    /// Visits every cell overlapping the AABB in y, z, x order.
    pub fn query_aabb<C: SpatialQueryCollector + ?Sized>(
        &self,
        center: Vec3,
        half_extents: Vec3,
        collector: &mut C,
    ) {
        let Some((min_coords, max_coords)) = self
            .grid
            .aabb_min_max_coords(center - half_extents, center + half_extents)
        else {
            return;
        };

        for y in min_coords.y..=max_coords.y {
            for z in min_coords.z..=max_coords.z {
                for x in min_coords.x..=max_coords.x {
                    let coords = IVec3::new(x, y, z);
                    if self.visit(coords, collector).is_break() {
                        return;
                    }
                }
            }
        }
    }

    /// Visits the cells overlapping the AABB in concentric Chebyshev shells
    /// around the cell containing `center`: shell 0 is that cell, shell `n`
    /// every cell at L∞ cell distance `n`.
    pub fn query_aabb_cell_proximity_order<C: SpatialQueryCollector + ?Sized>(
        &self,
        center: Vec3,
        half_extents: Vec3,
        collector: &mut C,
    ) {
        let Some((min_coords, max_coords)) = self
            .grid
            .aabb_min_max_coords(center - half_extents, center + half_extents)
        else {
            return;
        };

        let source = self.grid.cell_coords_from_position(center);
        let reach = (max_coords - source).max(source - min_coords).max(IVec3::ZERO);
        let shell_count = reach.max_element();

        for shell in 0..=shell_count {
            for y in (source.y - shell)..=(source.y + shell) {
                if y < min_coords.y || y > max_coords.y {
                    continue;
                }
                let y_on_face = (y - source.y).abs() == shell;

                for z in (source.z - shell)..=(source.z + shell) {
                    if z < min_coords.z || z > max_coords.z {
                        continue;
                    }
                    let yz_on_face = y_on_face || (z - source.z).abs() == shell;

                    let last_x = source.x + shell;
                    let mut x = source.x - shell;
                    while x <= last_x {
                        if x >= min_coords.x && x <= max_coords.x {
                            let coords = IVec3::new(x, y, z);
                            if self.visit(coords, collector).is_break() {
                                return;
                            }
                        }
                        // interior rows only touch the shell at both x ends
                        x = if yz_on_face || x == last_x { x + 1 } else { last_x };
                    }
                }
            }
        }
    }

    fn visit<C: SpatialQueryCollector + ?Sized>(&self, coords: IVec3, collector: &mut C) -> ControlFlow<()> {
        let index = self.grid.cell_index_from_coords(coords) as usize;
        collector.on_visit_cell(CellVisit { index, coords }, self.elements_in_cell(index))
    }
}

fn insert_into_cell(
    cell: &mut SpatialDatabaseCell,
    slots: &mut [SpatialDatabaseElement],
    element: SpatialDatabaseElement,
) -> bool {
    if cell.elements_count + 1 > cell.elements_capacity {
        cell.excess_elements_count += 1;
        return false;
    }
    slots[cell.elements_count] = element;
    cell.elements_count += 1;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn element(id: u32, position: Vec3) -> SpatialDatabaseElement {
        SpatialDatabaseElement {
            entity: Entity::from_raw(id),
            position,
            team: (id % 3) as u8,
            actor: ActorType::Fighter,
        }
    }

    fn lattice(count: u32, half_extents: f32) -> Vec<SpatialDatabaseElement> {
        (0..count)
            .map(|i| {
                let t = i as f32 / count as f32;
                let position = Vec3::new(
                    (t * 2.0 - 1.0) * half_extents * 0.95,
                    ((t * 7.3).fract() * 2.0 - 1.0) * half_extents * 0.95,
                    ((t * 3.1).fract() * 2.0 - 1.0) * half_extents * 0.95,
                );
                element(i, position)
            })
            .collect()
    }

    fn collect_all(db: &SpatialDatabase) -> Vec<Entity> {
        let half = db.grid().half_extents();
        let mut seen = Vec::new();
        db.query_aabb(Vec3::ZERO, Vec3::splat(half), &mut |_: CellVisit, elements: &[SpatialDatabaseElement]| {
            seen.extend(elements.iter().map(|e| e.entity));
            ControlFlow::Continue(())
        });
        seen
    }

    #[test]
    fn initialize_lays_out_cells_contiguously() {
        let db = SpatialDatabase::new(10.0, 2, 3);
        assert_eq!(db.cells().len(), 64);
        assert_eq!(db.total_capacity(), 192);
        for (index, cell) in db.cells().iter().enumerate() {
            assert_eq!(cell.start_index, index * 3);
            assert_eq!(cell.elements_capacity, 3);
        }
    }

    #[test]
    fn full_bounds_query_visits_every_element_once() {
        let mut db = SpatialDatabase::new(50.0, 2, 256);
        let elements = lattice(200, 50.0);
        for e in &elements {
            assert!(db.add_to_data_base(*e));
        }
        let seen = collect_all(&db);
        assert_eq!(seen.len(), elements.len());
        let unique: HashSet<_> = seen.iter().collect();
        assert_eq!(unique.len(), elements.len());
        assert_eq!(db.total_excess(), 0);
    }

    #[test]
    fn overflow_counts_drops_and_resize_absorbs_them() {
        let mut db = SpatialDatabase::new(50.0, 1, 2);
        let elements = lattice(64, 50.0);
        let stored = elements.iter().filter(|e| db.add_to_data_base(**e)).count();
        let dropped = elements.len() - stored;
        assert!(dropped > 0);
        assert_eq!(db.total_excess(), dropped);
        assert_eq!(collect_all(&db).len(), stored);

        db.clear_and_resize();
        assert_eq!(db.total_elements(), 0);
        for e in &elements {
            db.add_to_data_base(*e);
        }
        assert_eq!(db.total_excess(), 0);
        assert_eq!(collect_all(&db).len(), elements.len());
    }

    #[test]
    fn single_cell_growth_from_four_to_twelve() {
        let mut db = SpatialDatabase::new(10.0, 1, 4);
        let position = Vec3::new(-5.0, -5.0, -5.0);
        let cell_index = db.grid().cell_index(position) as usize;
        let elements: Vec<_> = (0..6).map(|i| element(i, position)).collect();

        for e in &elements {
            db.add_to_data_base(*e);
        }
        let cell = *db.cell(cell_index).unwrap();
        assert_eq!(cell.elements_count, 4);
        assert_eq!(cell.excess_elements_count, 2);

        db.clear_and_resize();
        assert_eq!(db.cell(cell_index).unwrap().elements_capacity, 12);

        for e in &elements {
            db.add_to_data_base(*e);
        }
        let cell = *db.cell(cell_index).unwrap();
        assert_eq!(cell.elements_count, 6);
        assert_eq!(cell.excess_elements_count, 0);
    }

    #[test]
    fn resize_keeps_start_indices_as_running_sum() {
        let mut db = SpatialDatabase::new(10.0, 1, 1);
        let position = Vec3::new(5.0, 5.0, 5.0);
        for i in 0..3 {
            db.add_to_data_base(element(i, position));
        }
        db.clear_and_resize();
        let mut expected_start = 0;
        for cell in db.cells() {
            assert_eq!(cell.start_index, expected_start);
            expected_start += cell.elements_capacity;
        }
        assert_eq!(db.total_capacity(), expected_start);
    }

    #[test]
    fn out_of_bounds_elements_are_ignored() {
        let mut db = SpatialDatabase::new(10.0, 1, 4);
        assert!(!db.add_to_data_base(element(1, Vec3::new(10.0, 0.0, 0.0))));
        assert!(!db.add_to_data_base_at(element(2, Vec3::ZERO), 999));
        assert_eq!(db.total_elements(), 0);
        assert_eq!(db.total_excess(), 0);
    }

    #[test]
    fn parallel_build_matches_sequential_build() {
        let elements = lattice(500, 80.0);
        let mut sequential = SpatialDatabase::new(80.0, 3, 4);
        let mut parallel = sequential.clone();

        for e in &elements {
            sequential.add_to_data_base(*e);
        }
        parallel.build_parallel(&elements, 5);

        assert_eq!(sequential.cells(), parallel.cells());
        for index in 0..sequential.cells().len() {
            assert_eq!(
                sequential.elements_in_cell(index),
                parallel.elements_in_cell(index)
            );
        }
    }

    #[test]
    fn query_aabb_can_stop_early() {
        let mut db = SpatialDatabase::new(50.0, 2, 64);
        for e in lattice(100, 50.0) {
            db.add_to_data_base(e);
        }
        let mut visited = 0;
        db.query_aabb(Vec3::ZERO, Vec3::splat(50.0), &mut |_: CellVisit, _: &[SpatialDatabaseElement]| {
            visited += 1;
            if visited == 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert_eq!(visited, 3);
    }

    #[test]
    fn proximity_order_visits_each_cell_in_range_once_by_shell() {
        let db = SpatialDatabase::new(40.0, 3, 1);
        let grid = *db.grid();
        let center = Vec3::new(3.0, -12.0, 20.0);
        let half_extents = Vec3::new(25.0, 12.0, 30.0);
        let (min_coords, max_coords) = grid
            .aabb_min_max_coords(center - half_extents, center + half_extents)
            .unwrap();
        let source = grid.cell_coords_from_position(center);

        let mut visited = Vec::new();
        db.query_aabb_cell_proximity_order(center, half_extents, &mut |visit: CellVisit, _: &[SpatialDatabaseElement]| {
            visited.push(visit.coords);
            ControlFlow::Continue(())
        });

        let expected = ((max_coords - min_coords) + IVec3::ONE).to_array().iter().product::<i32>();
        assert_eq!(visited.len() as i32, expected);
        let unique: HashSet<_> = visited.iter().map(|c| c.to_array()).collect();
        assert_eq!(unique.len(), visited.len());

        let shells: Vec<i32> = visited
            .iter()
            .map(|c| (*c - source).abs().max_element())
            .collect();
        assert!(shells.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(shells[0], 0);
    }

    #[test]
    fn proximity_order_corner_walk() {
        let db = SpatialDatabase::new(2.0, 2, 1);
        let mut order = Vec::new();
        db.query_aabb_cell_proximity_order(
            Vec3::splat(-1.5),
            Vec3::splat(1.0),
            &mut |visit: CellVisit, _: &[SpatialDatabaseElement]| {
                order.push(format!(
                    "{} ({}, {}, {})",
                    visit.index, visit.coords.x, visit.coords.y, visit.coords.z
                ));
                ControlFlow::Continue(())
            },
        );
        insta::assert_snapshot!(order.join("\n"), @r###"
        0 (0, 0, 0)
        1 (1, 0, 0)
        4 (0, 0, 1)
        5 (1, 0, 1)
        16 (0, 1, 0)
        17 (1, 1, 0)
        20 (0, 1, 1)
        21 (1, 1, 1)
        "###);
    }
}
