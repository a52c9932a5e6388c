//! Recursive shading of a ray.
//!
//! Surfaces fall into three materials:
//! - the floor, a diffuse two-color checkerboard,
//! - spheres, specular with a half-strength mirror bounce,
//! - triangles and squares, diffuse with a flat base color.
//!
//! Every point light is jittered per sample and shadow-tested. Diffuse
//! points can additionally gather light from a [`VplBuffer`].

use crate::intersect::Hit;
use crate::{gen_f32, Ray, Tracer, VplBuffer, EPSILON};
use card_math::{dot, normalize, reflect, Vec3};
use rand::RngCore;

/// Linear RGB radiance.
pub type Color = Vec3;

pub const SKY_COLOR: Color = Vec3::new(0.7, 0.6, 1.0);
pub const AMBIENT: f32 = 0.1;
pub const DIFFUSE_SCALE: f32 = 0.2;
pub const SPECULAR_EXPONENT: f32 = 99.0;
/// Weight of the mirror bounce off spheres.
pub const BOUNCE_ATTENUATION: f32 = 0.5;
/// Checkerboard colors for odd and even tiles.
pub const CHECKER_ODD: Color = Vec3::new(3.0, 1.0, 1.0);
pub const CHECKER_EVEN: Color = Vec3::new(3.0, 3.0, 3.0);
/// Base color of triangles and squares.
pub const DIFFUSE_BASE: Color = Vec3::new(3.0, 3.0, 3.0);
/// Floor coordinates are scaled by this before picking a tile.
const CHECKER_SCALE: f32 = 0.2;

/// Sky seen along `direction`: `SKY_COLOR * (1 - d.z)^4`.
pub fn sky_color(direction: Vec3) -> Color {
    SKY_COLOR * (1.0 - direction.z).powi(4)
}

/// Checkerboard tile color at a floor point.
pub fn checker(point: Vec3) -> Color {
    let p = point * CHECKER_SCALE;
    if ((p.x.ceil() + p.y.ceil()) as i32) & 1 != 0 {
        CHECKER_ODD
    } else {
        CHECKER_EVEN
    }
}

/// Diffuse base color of a hit, `None` for the sky and specular spheres.
pub fn diffuse_base(hit: &Hit, point: Vec3) -> Option<Color> {
    match hit {
        Hit::Floor { .. } => Some(checker(point)),
        Hit::Triangle { .. } | Hit::Square { .. } => Some(DIFFUSE_BASE),
        Hit::Sphere { .. } | Hit::Sky => None,
    }
}

/// Direct light at a point, summed over the scene lights.
#[derive(Debug, Clone, Copy, Default)]
struct DirectLight {
    lambert: f32,
    specular: f32,
}

/// Shades rays against one scene.
#[derive(Clone, Copy)]
pub struct Shader<'a> {
    tracer: Tracer<'a>,
    vpls: Option<&'a VplBuffer>,
}

impl<'a> Shader<'a> {
    pub fn new(tracer: Tracer<'a>, vpls: Option<&'a VplBuffer>) -> Self {
        let vpls = vpls.filter(|buffer| !buffer.is_empty());
        Self { tracer, vpls }
    }

    pub fn tracer(&self) -> &Tracer<'a> {
        &self.tracer
    }

    /// Radiance arriving along `ray`, following at most `depth` surfaces.
    ///
    /// Returns black once `depth` reaches zero.
    pub fn shade(&self, ray: &Ray, depth: u32, rng: &mut dyn RngCore) -> Color {
        if depth == 0 {
            return Color::ZERO;
        }

        let hit = self.tracer.nearest(ray);
        let (t, normal) = match (hit.t(), hit.normal()) {
            (Some(t), Some(normal)) => (t, normal),
            _ => return sky_color(ray.direction),
        };

        let point = ray.at(t);
        let half = reflect(ray.direction, normal);
        let direct = self.direct_light(point, normal, half, rng);

        match diffuse_base(&hit, point) {
            Some(base) => {
                let mut color = base * (direct.lambert * DIFFUSE_SCALE + AMBIENT);
                if self.vpls.is_some() {
                    color += base * DIFFUSE_SCALE * self.gather_vpls(point, normal);
                }
                color
            }
            None => {
                let bounce = self.shade(&Ray::new(point, half), depth - 1, rng);
                Color::splat(direct.specular) + bounce * BOUNCE_ATTENUATION
            }
        }
    }

    /// Lambert and specular terms of every light, each light jittered by
    /// `(R, R, 0)` and weighted by its intensity.
    fn direct_light(
        &self,
        point: Vec3,
        normal: Vec3,
        half: Vec3,
        rng: &mut dyn RngCore,
    ) -> DirectLight {
        let mut sum = DirectLight::default();

        for light in self.tracer.scene().lights() {
            let jitter = Vec3::new(gen_f32(rng), gen_f32(rng), 0.0);
            let to_light = light.position + jitter - point;
            let distance = to_light.length();
            let l = normalize(to_light);

            let mut lambert = dot(l, normal);
            if lambert < 0.0 || self.tracer.occluded(point, l, distance - EPSILON) {
                lambert = 0.0;
            }
            let specular = if lambert > 0.0 {
                dot(l, half).max(0.0).powf(SPECULAR_EXPONENT)
            } else {
                0.0
            };

            sum.lambert += lambert * light.intensity;
            sum.specular += specular * light.intensity;
        }
        sum
    }

    /// Shadow-tested light from every active VPL, averaged per light sample.
    fn gather_vpls(&self, point: Vec3, normal: Vec3) -> Color {
        let buffer = match self.vpls {
            Some(buffer) => buffer,
            None => return Color::ZERO,
        };

        let mut sum = Color::ZERO;
        for vpl in buffer.active() {
            let to_vpl = vpl.position - point;
            let distance_sq = dot(to_vpl, to_vpl);
            if distance_sq <= EPSILON * EPSILON {
                continue;
            }
            let distance = distance_sq.sqrt();
            let l = to_vpl / distance;

            let cos_receiver = dot(normal, l);
            let cos_emitter = -dot(vpl.normal, l);
            if cos_receiver <= 0.0 || cos_emitter <= 0.0 {
                continue;
            }
            if self.tracer.occluded(point, l, distance - EPSILON) {
                continue;
            }
            sum += vpl.radiance * (cos_receiver * cos_emitter / distance_sq.max(1.0));
        }
        sum / buffer.samples_per_light() as f32
    }
}
