//! Scene data model.
//!
//! A scene is a fixed, small set of primitives: unit spheres and unit
//! squares authored as bits in a 9x19 occupancy mask, a bounded triangle
//! list, and up to [`MAX_LIGHTS`] point lights. The floor (z = 0) and the
//! sky are implicit.
//!
//! Scenes are built once and never mutated; the renderer borrows them
//! immutably for the whole render.

use card_math::{cross, normalize, Aabb, Vec3};
use serde::{Deserialize, Serialize};

/// Rows in an occupancy mask.
pub const MASK_ROWS: usize = 9;
/// Usable bits per mask row.
pub const MASK_COLS: usize = 19;
/// Triangle capacity; extra triangles are dropped at load.
pub const MAX_TRIANGLES: usize = 512;
/// Point light capacity; extra lights are dropped at load.
pub const MAX_LIGHTS: usize = 5;

/// Radius of every mask sphere.
pub const SPHERE_RADIUS: f32 = 1.0;
/// Squares lie in this vertical plane, behind the sphere row.
pub const SQUARE_PLANE_Y: f32 = -1.5;
/// Half the side length of a mask square.
pub const SQUARE_HALF_SIZE: f32 = 0.5;
/// Distance under which a point counts as lying on a plane.
pub const PLANE_TOLERANCE: f32 = 1e-3;

/// The business-card sphere mask.
pub const REFERENCE_SPHERES: [u32; MASK_ROWS] =
    [247570, 280596, 280600, 249748, 18578, 18577, 231184, 16, 16];

/// A 9-row occupancy mask; bit `col` of row `row` marks a primitive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BitMask(pub [u32; MASK_ROWS]);

impl BitMask {
    pub const EMPTY: BitMask = BitMask([0; MASK_ROWS]);

    /// Whether the bit at `(row, col)` is set. Out-of-range cells are never set.
    pub fn is_set(&self, row: usize, col: usize) -> bool {
        row < MASK_ROWS && col < MASK_COLS && self.0[row] & (1u32 << col) != 0
    }

    /// Set cells, highest column first and highest row first within a column.
    ///
    /// Intersection tie-breaking follows this order, so it is kept stable.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..MASK_COLS)
            .rev()
            .flat_map(move |col| (0..MASK_ROWS).rev().map(move |row| (row, col)))
            .filter(move |&(row, col)| self.is_set(row, col))
    }

    pub fn count(&self) -> usize {
        self.cells().count()
    }
}

/// Unit sphere expanded from a mask bit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Sphere {
    /// Sphere for mask cell `(row, col)`.
    ///
    /// The tracer offsets the ray origin by `(-col, 0, -row - 4)`, which puts
    /// the center at `(col, 0, row + 4)`.
    pub fn from_cell(row: usize, col: usize) -> Self {
        Self {
            center: Vec3::new(col as f32, 0.0, row as f32 + 4.0),
            radius: SPHERE_RADIUS,
        }
    }

    /// Outward unit normal at a surface point.
    pub fn normal_at(&self, p: Vec3) -> Vec3 {
        normalize(p - self.center)
    }
}

/// Axis-aligned unit square in the plane `y = SQUARE_PLANE_Y`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Square {
    pub center: Vec3,
}

impl Square {
    /// Square for mask cell `(row, col)`: behind the sphere slot of the same cell.
    pub fn from_cell(row: usize, col: usize) -> Self {
        Self {
            center: Vec3::new(col as f32, SQUARE_PLANE_Y, row as f32 + 4.0),
        }
    }

    /// Plane normal, facing the default camera.
    pub fn normal(&self) -> Vec3 {
        Vec3::Y
    }

    /// True if `p` lies on the square (within [`PLANE_TOLERANCE`] of its plane).
    pub fn contains(&self, p: Vec3) -> bool {
        (p.y - self.center.y).abs() <= PLANE_TOLERANCE
            && (p.x - self.center.x).abs() <= SQUARE_HALF_SIZE
            && (p.z - self.center.z).abs() <= SQUARE_HALF_SIZE
    }
}

/// A triangle given by its three vertices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Triangle {
    pub v0: Vec3,
    pub v1: Vec3,
    pub v2: Vec3,
}

impl Triangle {
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3) -> Self {
        Self { v0, v1, v2 }
    }

    /// Plane normal `normalize((v1 - v0) x (v2 - v0))`.
    ///
    /// NaN for zero-area triangles.
    pub fn normal(&self) -> Vec3 {
        normalize(cross(self.v1 - self.v0, self.v2 - self.v0))
    }

    pub fn bounding_box(&self) -> Aabb {
        Aabb::from_points(self.v0, self.v1).include_point(self.v2)
    }
}

/// Point light with a scalar intensity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Light {
    pub position: Vec3,
    #[serde(default = "default_intensity")]
    pub intensity: f32,
}

fn default_intensity() -> f32 {
    1.0
}

impl Light {
    pub fn new(position: Vec3, intensity: f32) -> Self {
        Self {
            position,
            intensity,
        }
    }

    /// The light of the business-card scene.
    pub fn reference() -> Self {
        Self::new(Vec3::new(9.0, 9.0, 16.0), 1.0)
    }
}

/// Where a point lies when it is on one of the planar surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanarSurface {
    Floor,
    Square(usize),
}

/// Capacity bounds applied while building a [`Scene`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneLimits {
    pub max_triangles: usize,
    pub max_lights: usize,
}

impl Default for SceneLimits {
    fn default() -> Self {
        Self {
            max_triangles: MAX_TRIANGLES,
            max_lights: MAX_LIGHTS,
        }
    }
}

impl SceneLimits {
    /// Lower the triangle bound (never above [`MAX_TRIANGLES`]).
    pub fn with_max_triangles(mut self, max: usize) -> Self {
        self.max_triangles = max.min(MAX_TRIANGLES);
        self
    }
}

/// Serializable scene description, as produced by the loaders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDescription {
    #[serde(default)]
    pub spheres: BitMask,
    #[serde(default)]
    pub squares: BitMask,
    #[serde(default)]
    pub triangles: Vec<Triangle>,
    #[serde(default = "default_lights")]
    pub lights: Vec<Light>,
}

fn default_lights() -> Vec<Light> {
    vec![Light::reference()]
}

impl Default for SceneDescription {
    fn default() -> Self {
        Self {
            spheres: BitMask::EMPTY,
            squares: BitMask::EMPTY,
            triangles: Vec::new(),
            lights: default_lights(),
        }
    }
}

impl SceneDescription {
    /// The business-card initials mask, one light, nothing else.
    pub fn reference() -> Self {
        Self {
            spheres: BitMask(REFERENCE_SPHERES),
            ..Default::default()
        }
    }
}

/// Immutable scene consumed by the renderer.
#[derive(Debug, Clone)]
pub struct Scene {
    sphere_mask: BitMask,
    square_mask: BitMask,
    spheres: Vec<Sphere>,
    squares: Vec<Square>,
    triangles: Vec<Triangle>,
    triangle_bounds: Aabb,
    lights: Vec<Light>,
}

impl Scene {
    /// Expand a description into explicit primitives, truncating anything
    /// beyond `limits`.
    pub fn new(desc: SceneDescription, limits: &SceneLimits) -> Self {
        let SceneDescription {
            spheres: sphere_mask,
            squares: square_mask,
            mut triangles,
            mut lights,
        } = desc;

        if triangles.len() > limits.max_triangles {
            log::warn!(
                "Too many triangles: keeping {} of {}",
                limits.max_triangles,
                triangles.len()
            );
            triangles.truncate(limits.max_triangles);
        }
        if lights.len() > limits.max_lights {
            log::warn!(
                "Too many lights: keeping {} of {}",
                limits.max_lights,
                lights.len()
            );
            lights.truncate(limits.max_lights);
        }

        let spheres = sphere_mask
            .cells()
            .map(|(row, col)| Sphere::from_cell(row, col))
            .collect();
        let squares = square_mask
            .cells()
            .map(|(row, col)| Square::from_cell(row, col))
            .collect();
        let triangle_bounds = triangles
            .iter()
            .fold(Aabb::EMPTY, |acc, t| Aabb::surrounding(&acc, &t.bounding_box()));

        let scene = Self {
            sphere_mask,
            square_mask,
            spheres,
            squares,
            triangles,
            triangle_bounds,
            lights,
        };
        log::info!(
            "Scene: {} spheres, {} squares, {} triangles, {} lights",
            scene.sphere_count(),
            scene.square_count(),
            scene.triangle_count(),
            scene.light_count()
        );
        scene
    }

    /// The business-card scene.
    pub fn reference() -> Self {
        Self::new(SceneDescription::reference(), &SceneLimits::default())
    }

    pub fn sphere_mask(&self) -> BitMask {
        self.sphere_mask
    }

    pub fn square_mask(&self) -> BitMask {
        self.square_mask
    }

    pub fn sphere_count(&self) -> usize {
        self.spheres.len()
    }

    pub fn sphere(&self, i: usize) -> Sphere {
        self.spheres[i]
    }

    pub fn spheres(&self) -> &[Sphere] {
        &self.spheres
    }

    pub fn square_count(&self) -> usize {
        self.squares.len()
    }

    pub fn square(&self, i: usize) -> Square {
        self.squares[i]
    }

    pub fn squares(&self) -> &[Square] {
        &self.squares
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn triangle(&self, i: usize) -> Triangle {
        self.triangles[i]
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    /// Box around every triangle vertex; empty when there are no triangles.
    pub fn triangle_bounds(&self) -> Aabb {
        self.triangle_bounds
    }

    pub fn light_count(&self) -> usize {
        self.lights.len()
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    /// Which planar surface, if any, `point` lies on.
    ///
    /// The floor wins over squares since squares never reach z = 0.
    pub fn plane_or_square_test(&self, point: Vec3) -> Option<PlanarSurface> {
        if point.z.abs() <= PLANE_TOLERANCE {
            return Some(PlanarSurface::Floor);
        }
        self.squares
            .iter()
            .position(|sq| sq.contains(point))
            .map(PlanarSurface::Square)
    }

    /// Back to a serializable description.
    pub fn to_description(&self) -> SceneDescription {
        SceneDescription {
            spheres: self.sphere_mask,
            squares: self.square_mask,
            triangles: self.triangles.clone(),
            lights: self.lights.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tri(offset: f32) -> Triangle {
        Triangle::new(
            Vec3::new(offset, 0.0, 1.0),
            Vec3::new(offset + 1.0, 0.0, 1.0),
            Vec3::new(offset, 1.0, 1.0),
        )
    }

    #[test]
    fn test_reference_mask_has_nine_rows_of_spheres() {
        let scene = Scene::reference();
        let expected: usize = REFERENCE_SPHERES
            .iter()
            .map(|row| (*row & ((1u32 << MASK_COLS) - 1)).count_ones() as usize)
            .sum();
        assert_eq!(scene.sphere_count(), expected);
        assert_eq!(scene.light_count(), 1);
        assert_eq!(scene.triangle_count(), 0);
        assert!(scene.triangle_bounds().is_empty());
    }

    #[test]
    fn test_mask_order_is_column_major_descending() {
        let mut mask = BitMask::EMPTY;
        mask.0[0] = 0b11; // (0,0) and (0,1)
        mask.0[2] = 0b01; // (2,0)
        let cells: Vec<_> = mask.cells().collect();
        assert_eq!(cells, vec![(0, 1), (2, 0), (0, 0)]);
    }

    #[test]
    fn test_mask_ignores_bits_past_last_column() {
        let mut mask = BitMask::EMPTY;
        mask.0[0] = 1 << MASK_COLS;
        assert_eq!(mask.count(), 0);
        assert!(!mask.is_set(0, MASK_COLS));
        assert!(!mask.is_set(MASK_ROWS, 0));
    }

    #[test]
    fn test_sphere_center_from_cell() {
        let s = Sphere::from_cell(2, 5);
        assert_eq!(s.center, Vec3::new(5.0, 0.0, 6.0));
        assert_eq!(s.radius, 1.0);
        let n = s.normal_at(Vec3::new(5.0, 0.0, 7.0));
        assert!((n - Vec3::Z).length() < 1e-6);
    }

    #[test]
    fn test_triangle_normal_and_bounds() {
        let t = tri(0.0);
        assert!((t.normal() - Vec3::Z).length() < 1e-6);
        let b = t.bounding_box();
        assert_eq!(b.min(), Vec3::new(0.0, 0.0, 1.0));
        assert_eq!(b.max(), Vec3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn test_triangle_truncation() {
        let desc = SceneDescription {
            triangles: (0..10).map(|i| tri(i as f32)).collect(),
            ..Default::default()
        };
        let limits = SceneLimits::default().with_max_triangles(4);
        let scene = Scene::new(desc, &limits);
        assert_eq!(scene.triangle_count(), 4);
        assert_eq!(scene.triangle(3), tri(3.0));
        assert_eq!(scene.triangle_bounds().max().x, 4.0);
    }

    #[test]
    fn test_limits_never_exceed_capacity() {
        let limits = SceneLimits::default().with_max_triangles(10_000);
        assert_eq!(limits.max_triangles, MAX_TRIANGLES);
    }

    #[test]
    fn test_light_truncation() {
        let desc = SceneDescription {
            lights: (0..8).map(|i| Light::new(Vec3::splat(i as f32), 1.0)).collect(),
            ..Default::default()
        };
        let scene = Scene::new(desc, &SceneLimits::default());
        assert_eq!(scene.light_count(), MAX_LIGHTS);
    }

    #[test]
    fn test_plane_or_square_test() {
        let mut squares = BitMask::EMPTY;
        squares.0[1] = 1 << 3;
        let scene = Scene::new(
            SceneDescription {
                squares,
                ..Default::default()
            },
            &SceneLimits::default(),
        );

        assert_eq!(
            scene.plane_or_square_test(Vec3::new(40.0, -3.0, 0.0)),
            Some(PlanarSurface::Floor)
        );
        assert_eq!(
            scene.plane_or_square_test(Vec3::new(3.2, SQUARE_PLANE_Y, 5.4)),
            Some(PlanarSurface::Square(0))
        );
        assert_eq!(scene.plane_or_square_test(Vec3::new(3.2, SQUARE_PLANE_Y, 6.0)), None);
        assert_eq!(scene.plane_or_square_test(Vec3::new(3.0, 0.0, 5.0)), None);
    }

    #[test]
    fn test_description_json_shape() {
        let json = r#"{
            "spheres": [0, 1, 0, 0, 0, 0, 0, 0, 0],
            "triangles": [{"v0": [0, 0, 1], "v1": [1, 0, 1], "v2": [0, 1, 1]}],
            "lights": [{"position": [1, 2, 3]}]
        }"#;
        let desc: SceneDescription = serde_json::from_str(json).unwrap();
        assert!(desc.spheres.is_set(1, 0));
        assert_eq!(desc.squares, BitMask::EMPTY);
        assert_eq!(desc.triangles, vec![tri(0.0)]);
        assert_eq!(desc.lights[0].intensity, 1.0);
    }

    #[test]
    fn test_description_defaults_to_reference_light() {
        let desc: SceneDescription = serde_json::from_str("{}").unwrap();
        assert_eq!(desc.lights, vec![Light::reference()]);
    }
}
