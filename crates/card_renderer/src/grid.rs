//! Uniform grid over the scene triangles.
//!
//! The triangle bounding box is split into `res.x * res.y * res.z` cells,
//! with the resolution chosen so each cell holds roughly
//! `cell_size_modifier` triangles:
//!
//! ```text
//! res[axis] = clamp(floor(extent[axis] * cbrt(modifier * n / volume)), 1, 128)
//! ```
//!
//! Every triangle is listed in each cell between the truncated cell
//! coordinates of its bounding-box corners. A box corner lying exactly on a
//! cell face belongs to the cell above it. Cells have a fixed capacity of
//! [`CELL_CAPACITY`]; insertions into a full cell are dropped and counted,
//! never reallocated, in triangle order. Dense scenes can therefore miss
//! triangles in grid-accelerated lookups.
//!
//! Rays walk the grid cell by cell (3D DDA) and stop as soon as the nearest
//! hit found so far lies inside the current cell.

use crate::Ray;
use card_core::Triangle;
use card_math::{Aabb, Interval, Vec3};
use glam::IVec3;

/// Maximum triangle indices stored per cell.
pub const CELL_CAPACITY: usize = 62;
/// Upper bound of the per-axis resolution.
pub const MAX_RESOLUTION: i32 = 128;
/// Default target density.
pub const DEFAULT_CELL_SIZE_MODIFIER: f32 = 3.0;

/// One grid cell: a count and a bounded index list.
#[derive(Debug, Clone, Copy)]
pub struct Cell {
    len: u32,
    indices: [u16; CELL_CAPACITY],
}

impl Cell {
    pub const EMPTY: Cell = Cell {
        len: 0,
        indices: [0; CELL_CAPACITY],
    };

    /// Triangle indices in insertion order.
    pub fn indices(&self) -> &[u16] {
        &self.indices[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len as usize == CELL_CAPACITY
    }

    /// Append `index`; returns false (and stores nothing) when full.
    fn push(&mut self, index: u16) -> bool {
        if self.is_full() {
            return false;
        }
        self.indices[self.len as usize] = index;
        self.len += 1;
        true
    }
}

/// Occupancy summary, mostly for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GridStats {
    pub cells: usize,
    pub occupied_cells: usize,
    /// Sum of all cell lengths (triangles spanning cells count repeatedly).
    pub total_occupants: usize,
    pub max_occupancy: usize,
    /// Insertions lost to full cells.
    pub dropped: usize,
}

/// Dense uniform grid of triangle indices.
#[derive(Debug, Clone)]
pub struct Grid {
    bounds: Aabb,
    resolution: IVec3,
    cell_size: Vec3,
    cells: Vec<Cell>,
    dropped: usize,
}

impl Grid {
    /// Grid with a single empty cell and no bounds; every walk is a no-op.
    pub fn empty() -> Self {
        Self {
            bounds: Aabb::EMPTY,
            resolution: IVec3::ONE,
            cell_size: Vec3::ZERO,
            cells: vec![Cell::EMPTY],
            dropped: 0,
        }
    }

    /// Build a grid over `triangles`, whose union bounding box is `bounds`.
    pub fn build(triangles: &[Triangle], bounds: Aabb, cell_size_modifier: f32) -> Self {
        if triangles.is_empty() || bounds.is_empty() {
            return Self::empty();
        }

        let bounds = bounds.padded();
        let size = bounds.extent();
        let cube_root = (cell_size_modifier * triangles.len() as f32 / bounds.volume()).cbrt();
        let resolution = IVec3::new(
            axis_resolution(size.x, cube_root),
            axis_resolution(size.y, cube_root),
            axis_resolution(size.z, cube_root),
        );
        let cell_size = size / resolution.as_vec3();
        let cell_count = (resolution.x * resolution.y * resolution.z) as usize;

        let mut grid = Self {
            bounds,
            resolution,
            cell_size,
            cells: vec![Cell::EMPTY; cell_count],
            dropped: 0,
        };

        for (index, triangle) in triangles.iter().enumerate() {
            grid.insert(index as u16, triangle.bounding_box());
        }

        let stats = grid.stats();
        log::info!(
            "Triangle grid {} x {} x {}: {} cells, {} occupied, {} occupants, max {} per cell",
            resolution.x,
            resolution.y,
            resolution.z,
            stats.cells,
            stats.occupied_cells,
            stats.total_occupants,
            stats.max_occupancy
        );
        if stats.dropped > 0 {
            log::warn!(
                "{} triangle insertions dropped: cells are limited to {} triangles",
                stats.dropped,
                CELL_CAPACITY
            );
        }
        grid
    }

    /// Add triangle `index` to every cell from the one holding the box's
    /// min corner to the one holding its max corner.
    fn insert(&mut self, index: u16, bbox: Aabb) {
        let lo = self.cell_coords(bbox.min());
        let hi = self.cell_coords(bbox.max());
        for z in lo.z..=hi.z {
            for y in lo.y..=hi.y {
                for x in lo.x..=hi.x {
                    let cell = self.cell_index(IVec3::new(x, y, z));
                    if !self.cells[cell].push(index) {
                        self.dropped += 1;
                    }
                }
            }
        }
    }

    /// Cell containing `p`, clamped to the grid.
    pub fn cell_coords(&self, p: Vec3) -> IVec3 {
        let local = (p - self.bounds.min()) / self.cell_size;
        local
            .as_ivec3()
            .clamp(IVec3::ZERO, self.resolution - IVec3::ONE)
    }

    /// Flat index `z * res.y * res.x + y * res.x + x`.
    #[inline]
    pub fn cell_index(&self, c: IVec3) -> usize {
        (c.z * self.resolution.y * self.resolution.x + c.y * self.resolution.x + c.x) as usize
    }

    pub fn cell(&self, c: IVec3) -> &Cell {
        &self.cells[self.cell_index(c)]
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Non-empty cells with their coordinates, in storage order.
    pub fn occupied_cells(&self) -> impl Iterator<Item = (IVec3, &Cell)> + '_ {
        let res = self.resolution;
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| !cell.is_empty())
            .map(move |(i, cell)| {
                let i = i as i32;
                let coords = IVec3::new(i % res.x, (i / res.x) % res.y, i / (res.x * res.y));
                (coords, cell)
            })
    }

    pub fn resolution(&self) -> IVec3 {
        self.resolution
    }

    pub fn cell_size(&self) -> Vec3 {
        self.cell_size
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    pub fn stats(&self) -> GridStats {
        GridStats {
            cells: self.cells.len(),
            occupied_cells: self.cells.iter().filter(|c| !c.is_empty()).count(),
            total_occupants: self.cells.iter().map(Cell::len).sum(),
            max_occupancy: self.cells.iter().map(Cell::len).max().unwrap_or(0),
            dropped: self.dropped,
        }
    }

    /// Walk the cells pierced by `ray` up to `t_max`, front to back.
    ///
    /// `visit` tests the triangles of a cell and returns the nearest hit
    /// distance known so far (including hits found outside the grid). The
    /// walk ends once that distance falls inside the current cell.
    pub fn walk<F>(&self, ray: &Ray, t_max: f32, mut visit: F)
    where
        F: FnMut(&[u16]) -> f32,
    {
        if self.is_empty() {
            return;
        }
        let span = match self.bounds.hit_span(ray, Interval::new(0.0, t_max)) {
            Some(span) => span,
            None => return,
        };

        let mut cell = self.cell_coords(ray.at(span.min));
        let mut step = IVec3::ZERO;
        let mut t_next = Vec3::splat(f32::INFINITY);
        let mut t_delta = Vec3::splat(f32::INFINITY);
        let vmin = self.bounds.min();

        for axis in 0..3 {
            let d = ray.direction[axis];
            if d > 0.0 {
                step[axis] = 1;
                let boundary = vmin[axis] + (cell[axis] + 1) as f32 * self.cell_size[axis];
                t_next[axis] = (boundary - ray.origin[axis]) / d;
                t_delta[axis] = self.cell_size[axis] / d;
            } else if d < 0.0 {
                step[axis] = -1;
                let boundary = vmin[axis] + cell[axis] as f32 * self.cell_size[axis];
                t_next[axis] = (boundary - ray.origin[axis]) / d;
                t_delta[axis] = -self.cell_size[axis] / d;
            }
        }

        loop {
            let nearest = visit(self.cell(cell).indices());
            let t_exit = t_next.min_element();
            if nearest <= t_exit || t_exit > span.max {
                return;
            }

            let axis = if t_next.x <= t_next.y && t_next.x <= t_next.z {
                0
            } else if t_next.y <= t_next.z {
                1
            } else {
                2
            };
            cell[axis] += step[axis];
            if cell[axis] < 0 || cell[axis] >= self.resolution[axis] {
                return;
            }
            t_next[axis] += t_delta[axis];
        }
    }
}

fn axis_resolution(extent: f32, cube_root: f32) -> i32 {
    ((extent * cube_root).floor() as i32).clamp(1, MAX_RESOLUTION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use card_math::normalize;
    use std::collections::BTreeSet;

    fn tri_at(x: f32, y: f32, z: f32, size: f32) -> Triangle {
        Triangle::new(
            Vec3::new(x, y, z),
            Vec3::new(x + size, y, z),
            Vec3::new(x, y + size, z + size),
        )
    }

    fn bounds_of(tris: &[Triangle]) -> Aabb {
        tris.iter()
            .fold(Aabb::EMPTY, |acc, t| Aabb::surrounding(&acc, &t.bounding_box()))
    }

    fn scattered_triangles(n: usize) -> Vec<Triangle> {
        (0..n)
            .map(|i| {
                let f = i as f32;
                tri_at((f * 1.7) % 10.0, (f * 3.1) % 10.0, (f * 0.7) % 5.0, 0.5 + (f % 3.0) * 0.3)
            })
            .collect()
    }

    #[test]
    fn test_empty_grid() {
        let grid = Grid::build(&[], Aabb::EMPTY, DEFAULT_CELL_SIZE_MODIFIER);
        assert!(grid.is_empty());
        assert_eq!(grid.stats().cells, 1);

        let mut visited = false;
        grid.walk(&Ray::new(Vec3::ZERO, Vec3::X), f32::INFINITY, |_| {
            visited = true;
            f32::INFINITY
        });
        assert!(!visited);
    }

    #[test]
    fn test_resolution_formula() {
        let tris = scattered_triangles(40);
        let bounds = bounds_of(&tris);
        let grid = Grid::build(&tris, bounds, 3.0);

        let size = bounds.padded().extent();
        let cube_root = (3.0 * 40.0 / bounds.padded().volume()).cbrt();
        for axis in 0..3 {
            let expected = ((size[axis] * cube_root).floor() as i32).clamp(1, MAX_RESOLUTION);
            assert_eq!(grid.resolution()[axis], expected);
            assert!((grid.cell_size()[axis] * expected as f32 - size[axis]).abs() < 1e-4);
        }
    }

    #[test]
    fn test_resolution_is_clamped() {
        // Tiny triangles spread over a huge flat box push the formula past 128.
        let tris: Vec<Triangle> = (0..512)
            .map(|i| tri_at((i % 32) as f32 * 10.0, (i / 32) as f32 * 10.0, 0.0, 0.01))
            .collect();
        let grid = Grid::build(&tris, bounds_of(&tris), 50.0);
        let res = grid.resolution();
        assert!(res.min_element() >= 1);
        assert!(res.max_element() <= MAX_RESOLUTION);
    }

    #[test]
    fn test_every_overlapping_cell_lists_triangle() {
        let tris = scattered_triangles(60);
        let grid = Grid::build(&tris, bounds_of(&tris), 3.0);
        assert_eq!(grid.stats().dropped, 0);

        for (i, tri) in tris.iter().enumerate() {
            let bbox = tri.bounding_box();
            let lo = grid.cell_coords(bbox.min());
            let hi = grid.cell_coords(bbox.max());
            for z in lo.z..=hi.z {
                for y in lo.y..=hi.y {
                    for x in lo.x..=hi.x {
                        let cell = grid.cell(IVec3::new(x, y, z));
                        assert!(
                            cell.indices().contains(&(i as u16)),
                            "triangle {i} missing from cell ({x}, {y}, {z})"
                        );
                    }
                }
            }
        }
    }

    /// 4x4x4 unit cells over `[0, 4]^3`.
    fn unit_grid() -> Grid {
        Grid {
            bounds: Aabb::from_points(Vec3::ZERO, Vec3::splat(4.0)),
            resolution: IVec3::splat(4),
            cell_size: Vec3::ONE,
            cells: vec![Cell::EMPTY; 64],
            dropped: 0,
        }
    }

    #[test]
    fn test_insert_truncates_box_corners() {
        let mut grid = unit_grid();
        // Spans x in [1, 2], y and z in [1, 1.5]: both x ends sit on faces.
        let tri = Triangle::new(
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(2.0, 1.0, 1.0),
            Vec3::new(1.0, 1.5, 1.5),
        );
        grid.insert(0, tri.bounding_box());

        let occupied: Vec<IVec3> = grid.occupied_cells().map(|(c, _)| c).collect();
        assert_eq!(occupied, vec![IVec3::new(1, 1, 1), IVec3::new(2, 1, 1)]);
        assert_eq!(grid.stats().total_occupants, 2);
    }

    #[test]
    fn test_insert_clamps_to_grid() {
        let mut grid = unit_grid();
        let tri = Triangle::new(
            Vec3::new(-1.0, 0.5, 0.5),
            Vec3::new(9.0, 0.5, 0.5),
            Vec3::new(-1.0, 0.6, 0.6),
        );
        grid.insert(3, tri.bounding_box());

        let occupied: Vec<IVec3> = grid.occupied_cells().map(|(c, _)| c).collect();
        assert_eq!(occupied, (0..4).map(|x| IVec3::new(x, 0, 0)).collect::<Vec<_>>());
    }

    #[test]
    fn test_cell_index_layout() {
        let tris = scattered_triangles(60);
        let grid = Grid::build(&tris, bounds_of(&tris), 3.0);
        let res = grid.resolution();
        let last = grid.cell_index(res - IVec3::ONE);
        assert_eq!(last, grid.cells().len() - 1);
        assert_eq!(grid.cell_index(IVec3::new(1, 0, 0)), 1);
        assert_eq!(grid.cell_index(IVec3::new(0, 1, 0)), res.x as usize);
        assert_eq!(grid.cell_index(IVec3::new(0, 0, 1)), (res.x * res.y) as usize);
    }

    #[test]
    fn test_occupied_cells_coordinates() {
        let tris = scattered_triangles(30);
        let grid = Grid::build(&tris, bounds_of(&tris), 3.0);

        let occupied: Vec<_> = grid.occupied_cells().collect();
        assert_eq!(occupied.len(), grid.stats().occupied_cells);
        for (coords, cell) in occupied {
            assert!(std::ptr::eq(grid.cell(coords), cell));
        }
    }

    #[test]
    fn test_full_cell_drops_extra_triangles() {
        // Every triangle covers the same spot, so one modifier-1 grid puts
        // them all in the same few cells.
        let n = CELL_CAPACITY + 10;
        let tris: Vec<Triangle> = (0..n).map(|_| tri_at(0.0, 0.0, 0.0, 1.0)).collect();
        let grid = Grid::build(&tris, bounds_of(&tris), 1.0);

        let stats = grid.stats();
        assert_eq!(stats.max_occupancy, CELL_CAPACITY);
        assert!(stats.dropped > 0);
        for cell in grid.cells() {
            assert!(cell.len() <= CELL_CAPACITY);
            if cell.is_full() {
                // First come, first served.
                let kept: Vec<u16> = (0..CELL_CAPACITY as u16).collect();
                assert_eq!(cell.indices(), kept.as_slice());
            }
        }
        assert_eq!(
            stats.total_occupants + stats.dropped,
            n * grid.cells().iter().filter(|c| c.is_full()).count()
        );
    }

    #[test]
    fn test_walk_visits_cells_along_ray() {
        let tris = scattered_triangles(80);
        let grid = Grid::build(&tris, bounds_of(&tris), 3.0);
        let ray = Ray::new(Vec3::new(-5.0, 5.0, 2.5), normalize(Vec3::new(1.0, 0.05, 0.02)));

        let mut seen = BTreeSet::new();
        let mut visits = 0;
        grid.walk(&ray, f32::INFINITY, |indices| {
            visits += 1;
            seen.extend(indices.iter().copied());
            f32::INFINITY
        });
        assert!(visits >= grid.resolution().x as usize);
        assert!(!seen.is_empty());
    }

    #[test]
    fn test_walk_stops_at_nearest() {
        let tris = scattered_triangles(80);
        let grid = Grid::build(&tris, bounds_of(&tris), 3.0);
        let ray = Ray::new(Vec3::new(-5.0, 5.0, 2.5), Vec3::X);

        let mut visits = 0;
        grid.walk(&ray, f32::INFINITY, |_| {
            visits += 1;
            // Pretend something was hit right at the grid entry.
            5.0
        });
        assert_eq!(visits, 1);
    }

    #[test]
    fn test_walk_misses_box() {
        let tris = scattered_triangles(20);
        let grid = Grid::build(&tris, bounds_of(&tris), 3.0);
        let ray = Ray::new(Vec3::new(-5.0, -5.0, -5.0), -Vec3::X);

        let mut visits = 0;
        grid.walk(&ray, f32::INFINITY, |_| {
            visits += 1;
            f32::INFINITY
        });
        assert_eq!(visits, 0);
    }
}
