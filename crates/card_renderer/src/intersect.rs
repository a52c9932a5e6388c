//! Nearest-hit queries against the floor, spheres, squares and triangles.

use crate::{Grid, Ray};
use card_core::{Scene, Sphere, Square, Triangle};
use card_math::{add, cross, dot, normalize, scale, Vec3};

/// Minimum accepted hit distance; keeps secondary rays off their origin surface.
pub const EPSILON: f32 = 0.01;
/// Distance used as "no hit yet".
pub const FAR: f32 = 1e9;

/// Result of a nearest-hit query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Hit {
    /// Nothing hit; the sky is visible.
    Sky,
    /// The ground plane `z = 0`.
    Floor { t: f32 },
    Sphere { t: f32, normal: Vec3, index: usize },
    Triangle { t: f32, normal: Vec3, index: usize },
    Square { t: f32, normal: Vec3, index: usize },
}

impl Hit {
    /// Hit distance, `None` for the sky.
    pub fn t(&self) -> Option<f32> {
        match *self {
            Hit::Sky => None,
            Hit::Floor { t }
            | Hit::Sphere { t, .. }
            | Hit::Triangle { t, .. }
            | Hit::Square { t, .. } => Some(t),
        }
    }

    /// Unit surface normal, `None` for the sky.
    pub fn normal(&self) -> Option<Vec3> {
        match *self {
            Hit::Sky => None,
            Hit::Floor { .. } => Some(Vec3::Z),
            Hit::Sphere { normal, .. }
            | Hit::Triangle { normal, .. }
            | Hit::Square { normal, .. } => Some(normal),
        }
    }

    pub fn is_sky(&self) -> bool {
        matches!(self, Hit::Sky)
    }
}

/// Ray intersection for a single primitive.
pub trait Intersect {
    /// Distance and unit normal of the nearest hit with `EPSILON < t < t_max`.
    fn intersect(&self, ray: &Ray, t_max: f32) -> Option<(f32, Vec3)>;
}

impl Intersect for Sphere {
    fn intersect(&self, ray: &Ray, t_max: f32) -> Option<(f32, Vec3)> {
        let p = ray.origin - self.center;
        let b = dot(p, ray.direction);
        let c = dot(p, p) - self.radius * self.radius;
        let q = b * b - c;
        if q <= 0.0 {
            return None;
        }

        let s = -b - q.sqrt();
        if s < t_max && s > EPSILON {
            let normal = normalize(scale(1.0 / self.radius, add(p, scale(s, ray.direction))));
            Some((s, normal))
        } else {
            None
        }
    }
}

impl Intersect for Triangle {
    /// Möller-Trumbore, normal flipped to face the ray.
    fn intersect(&self, ray: &Ray, t_max: f32) -> Option<(f32, Vec3)> {
        let edge1 = self.v1 - self.v0;
        let edge2 = self.v2 - self.v0;
        let h = cross(ray.direction, edge2);
        let a = dot(edge1, h);

        // Ray parallel to the triangle
        if a.abs() < 1e-8 {
            return None;
        }

        let f = 1.0 / a;
        let s = ray.origin - self.v0;
        let u = f * dot(s, h);
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = cross(s, edge1);
        let v = f * dot(ray.direction, q);
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = f * dot(edge2, q);
        if t <= EPSILON || t >= t_max {
            return None;
        }

        Some((t, facing(self.normal(), ray.direction)))
    }
}

impl Intersect for Square {
    fn intersect(&self, ray: &Ray, t_max: f32) -> Option<(f32, Vec3)> {
        if ray.direction.y == 0.0 {
            return None;
        }
        let t = (self.center.y - ray.origin.y) / ray.direction.y;
        if t <= EPSILON || t >= t_max {
            return None;
        }

        let p = ray.at(t);
        let half = card_core::scene::SQUARE_HALF_SIZE;
        if (p.x - self.center.x).abs() > half || (p.z - self.center.z).abs() > half {
            return None;
        }
        Some((t, facing(self.normal(), ray.direction)))
    }
}

/// Flip `normal` so it points against `direction`.
#[inline]
fn facing(normal: Vec3, direction: Vec3) -> Vec3 {
    if dot(normal, direction) > 0.0 {
        -normal
    } else {
        normal
    }
}

/// Distance to the floor plane, `None` when parallel or behind.
#[inline]
pub fn floor_distance(ray: &Ray) -> Option<f32> {
    if ray.direction.z == 0.0 {
        return None;
    }
    let t = -ray.origin.z / ray.direction.z;
    if t > EPSILON {
        Some(t)
    } else {
        None
    }
}

/// Intersection engine over an immutable scene, with an optional grid for
/// the triangles.
#[derive(Clone, Copy)]
pub struct Tracer<'a> {
    scene: &'a Scene,
    grid: Option<&'a Grid>,
}

impl<'a> Tracer<'a> {
    /// Tracer using `grid` for triangle lookups when it is given and non-empty.
    pub fn new(scene: &'a Scene, grid: Option<&'a Grid>) -> Self {
        let grid = grid.filter(|g| !g.is_empty());
        Self { scene, grid }
    }

    /// Tracer that tests every triangle.
    pub fn brute_force(scene: &'a Scene) -> Self {
        Self { scene, grid: None }
    }

    pub fn scene(&self) -> &'a Scene {
        self.scene
    }

    pub fn uses_grid(&self) -> bool {
        self.grid.is_some()
    }

    /// Nearest hit along `ray`.
    pub fn nearest(&self, ray: &Ray) -> Hit {
        self.nearest_within(ray, FAR)
    }

    /// Nearest hit along `ray` closer than `t_max`.
    ///
    /// Primitives are tested floor, spheres, squares, triangles; a later
    /// candidate replaces the current one only when strictly nearer.
    pub fn nearest_within(&self, ray: &Ray, t_max: f32) -> Hit {
        let mut best_t = t_max;
        let mut hit = Hit::Sky;

        if let Some(t) = floor_distance(ray) {
            if t < best_t {
                best_t = t;
                hit = Hit::Floor { t };
            }
        }

        for (index, sphere) in self.scene.spheres().iter().enumerate() {
            if let Some((t, normal)) = sphere.intersect(ray, best_t) {
                best_t = t;
                hit = Hit::Sphere { t, normal, index };
            }
        }

        for (index, square) in self.scene.squares().iter().enumerate() {
            if let Some((t, normal)) = square.intersect(ray, best_t) {
                best_t = t;
                hit = Hit::Square { t, normal, index };
            }
        }

        let triangles = self.scene.triangles();
        match self.grid {
            Some(grid) => {
                grid.walk(ray, best_t, |indices| {
                    for &i in indices {
                        let index = i as usize;
                        if let Some((t, normal)) = triangles[index].intersect(ray, best_t) {
                            best_t = t;
                            hit = Hit::Triangle { t, normal, index };
                        }
                    }
                    best_t
                });
            }
            None => {
                for (index, triangle) in triangles.iter().enumerate() {
                    if let Some((t, normal)) = triangle.intersect(ray, best_t) {
                        best_t = t;
                        hit = Hit::Triangle { t, normal, index };
                    }
                }
            }
        }

        hit
    }

    /// True if anything lies between `origin` and `origin + direction * max_t`.
    pub fn occluded(&self, origin: Vec3, direction: Vec3, max_t: f32) -> bool {
        !self
            .nearest_within(&Ray::new(origin, direction), max_t)
            .is_sky()
    }
}
