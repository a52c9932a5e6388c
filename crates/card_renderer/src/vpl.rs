//! Virtual point lights.
//!
//! A first pass shoots `samples_per_light` rays from every point light in
//! uniformly distributed directions. Where a ray lands on a diffuse surface
//! it leaves a VPL carrying the light reflected there; rays escaping to the
//! sky or landing on a specular sphere leave an inactive entry so the buffer
//! keeps one slot per `(light, sample)` pair.
//!
//! The pass runs before shading starts and the buffer is read-only afterwards.

use std::f32::consts::TAU;

use crate::shading::{diffuse_base, Color, DIFFUSE_SCALE};
use crate::{gen_f32, Mwc64x, Ray, SeedTuple, Tracer, VPL_STREAM_BASE};
use card_math::{dot, Vec3};
use rand::RngCore;
use rayon::prelude::*;

/// Default sample count of the bidirectional render mode.
pub const DEFAULT_VPL_SAMPLES: u32 = 512;

/// A secondary point light left on a diffuse surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vpl {
    pub position: Vec3,
    /// Surface normal on the side the light came from.
    pub normal: Vec3,
    pub radiance: Color,
}

impl Vpl {
    pub const INACTIVE: Vpl = Vpl {
        position: Vec3::ZERO,
        normal: Vec3::ZERO,
        radiance: Vec3::ZERO,
    };

    pub fn is_active(&self) -> bool {
        self.radiance != Color::ZERO
    }
}

/// VPLs of one render, stored light-major.
#[derive(Debug, Clone, Default)]
pub struct VplBuffer {
    vpls: Vec<Vpl>,
    samples_per_light: u32,
}

impl VplBuffer {
    pub fn new(vpls: Vec<Vpl>, samples_per_light: u32) -> Self {
        Self {
            vpls,
            samples_per_light: samples_per_light.max(1),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn vpls(&self) -> &[Vpl] {
        &self.vpls
    }

    pub fn len(&self) -> usize {
        self.vpls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vpls.is_empty()
    }

    pub fn samples_per_light(&self) -> u32 {
        self.samples_per_light
    }

    pub fn active(&self) -> impl Iterator<Item = &Vpl> + '_ {
        self.vpls.iter().filter(|v| v.is_active())
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }
}

/// Uniform direction on the unit sphere.
fn uniform_sphere(rng: &mut dyn RngCore) -> Vec3 {
    let z = 1.0 - 2.0 * gen_f32(rng);
    let phi = TAU * gen_f32(rng);
    let r = (1.0 - z * z).max(0.0).sqrt();
    Vec3::new(r * phi.cos(), r * phi.sin(), z)
}

/// Shoot `samples_per_light` rays from every light of the traced scene.
///
/// Each `(light, sample)` pair draws from its own generator stream, so the
/// buffer does not depend on how the work is split across threads.
pub fn build_vpls(tracer: &Tracer<'_>, samples_per_light: u32, seeds: SeedTuple) -> VplBuffer {
    let lights = tracer.scene().lights();
    if samples_per_light == 0 || lights.is_empty() {
        return VplBuffer::empty();
    }

    let per_light = samples_per_light as usize;
    let total = lights.len() * per_light;

    let vpls: Vec<Vpl> = (0..total)
        .into_par_iter()
        .map(|slot| {
            let light = &lights[slot / per_light];
            let mut rng = Mwc64x::from_seeds(seeds, VPL_STREAM_BASE + slot as u64);
            let direction = uniform_sphere(&mut rng);
            let ray = Ray::new(light.position, direction);

            let hit = tracer.nearest(&ray);
            let (t, normal) = match (hit.t(), hit.normal()) {
                (Some(t), Some(normal)) => (t, normal),
                _ => return Vpl::INACTIVE,
            };
            let position = ray.at(t);
            let base = match diffuse_base(&hit, position) {
                Some(base) => base,
                None => return Vpl::INACTIVE,
            };

            // Normal on the side facing the light.
            let normal = if dot(normal, direction) > 0.0 { -normal } else { normal };
            let cos_in = -dot(normal, direction);
            Vpl {
                position,
                normal,
                radiance: base * (DIFFUSE_SCALE * light.intensity * cos_in.max(0.0)),
            }
        })
        .collect();

    let buffer = VplBuffer::new(vpls, samples_per_light);
    log::info!(
        "VPL pass: {} samples from {} lights, {} active",
        buffer.len(),
        lights.len(),
        buffer.active_count()
    );
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;
    use card_core::{BitMask, Light, Scene, SceneDescription, SceneLimits};

    fn floor_scene(lights: Vec<Light>) -> Scene {
        Scene::new(
            SceneDescription {
                spheres: BitMask::EMPTY,
                squares: BitMask::EMPTY,
                triangles: Vec::new(),
                lights,
            },
            &SceneLimits::default(),
        )
    }

    #[test]
    fn test_uniform_sphere_is_unit() {
        let mut rng = Mwc64x::from_seeds(SeedTuple::new(5, 6, 7, 8), 0);
        let mut mean = Vec3::ZERO;
        for _ in 0..4000 {
            let d = uniform_sphere(&mut rng);
            assert!((d.length() - 1.0).abs() < 1e-4);
            mean += d;
        }
        mean /= 4000.0;
        assert!(mean.length() < 0.06, "mean direction {mean}");
    }

    #[test]
    fn test_one_slot_per_light_sample() {
        let scene = floor_scene(vec![
            Light::reference(),
            Light::new(Vec3::new(2.0, 3.0, 10.0), 0.5),
        ]);
        let buffer = build_vpls(&Tracer::brute_force(&scene), 64, SeedTuple::new(1, 2, 3, 4));

        assert_eq!(buffer.len(), 128);
        assert_eq!(buffer.samples_per_light(), 64);
        // Roughly half the directions point down at the floor.
        let active = buffer.active_count();
        assert!(active > 32 && active < 96, "{active} active");
        for vpl in buffer.active() {
            assert!(vpl.position.z.abs() < 1e-3);
            assert_eq!(vpl.normal, Vec3::Z);
            assert!(vpl.radiance.min_element() > 0.0);
        }
    }

    #[test]
    fn test_deterministic() {
        let scene = Scene::reference();
        let tracer = Tracer::brute_force(&scene);
        let seeds = SeedTuple::new(9, 8, 7, 6);
        let a = build_vpls(&tracer, 32, seeds);
        let b = build_vpls(&tracer, 32, seeds);
        assert_eq!(a.vpls(), b.vpls());
    }

    #[test]
    fn test_disabled() {
        let scene = Scene::reference();
        let buffer = build_vpls(&Tracer::brute_force(&scene), 0, SeedTuple::new(1, 1, 1, 1));
        assert!(buffer.is_empty());
    }
}
