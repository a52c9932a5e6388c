//! Pinhole camera with an optional thin-lens aperture.
//!
//! The basis is built once from a look direction and an up hint:
//!
//! ```text
//! forward = normalize(look)
//! up      = normalize(world_up x forward) * PIXEL_STEP
//! right   = normalize(forward x up) * PIXEL_STEP
//! offset  = (up + right) * -half_extent + forward
//! ```
//!
//! `up` advances with the pixel column `x` and `right` with the row `y`.

use crate::{gen_f32, Ray};
use card_math::{add, cross, normalize, scale, Vec3};
use rand::RngCore;

/// World-space distance between neighbouring pixels on the image plane.
pub const PIXEL_STEP: f32 = 0.002;

/// Eye position of the business-card camera.
pub const REFERENCE_EYE: Vec3 = Vec3::new(17.0, 16.0, 8.0);
/// Look direction of the business-card camera (not normalized).
pub const REFERENCE_LOOK: Vec3 = Vec3::new(-6.0, -16.0, 0.0);
/// Half the image extent the reference basis is centered for.
pub const REFERENCE_HALF_EXTENT: f32 = 256.0;

/// Aperture scale of the thin lens, in pixel steps.
pub const APERTURE: f32 = 99.0;
/// Distance to the plane in focus.
pub const FOCUS_DISTANCE: f32 = 16.0;

/// Camera for generating primary rays.
#[derive(Debug, Clone)]
pub struct Camera {
    pub eye: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
    pub right: Vec3,
    pub eye_offset: Vec3,
    pub aperture: f32,
    pub focus_distance: f32,
    pub depth_of_field: bool,
}

impl Camera {
    /// Build a basis looking along `look` from `eye`, with the pixel grid
    /// offset by `half_extent` pixels on both axes.
    pub fn new(eye: Vec3, look: Vec3, world_up: Vec3, half_extent: f32) -> Self {
        let forward = normalize(look);
        let up = scale(PIXEL_STEP, normalize(cross(world_up, forward)));
        let right = scale(PIXEL_STEP, normalize(cross(forward, up)));
        let eye_offset = add(scale(-half_extent, add(up, right)), forward);

        Self {
            eye,
            forward,
            up,
            right,
            eye_offset,
            aperture: APERTURE,
            focus_distance: FOCUS_DISTANCE,
            depth_of_field: true,
        }
    }

    /// The business-card camera. The basis is centered for a 512x512 image
    /// regardless of the actual resolution.
    pub fn reference() -> Self {
        Self::new(REFERENCE_EYE, REFERENCE_LOOK, Vec3::Z, REFERENCE_HALF_EXTENT)
    }

    /// Reference camera re-centered on a `width` x `height` image.
    pub fn centered(width: u32, height: u32) -> Self {
        let mut camera = Self::reference();
        camera.eye_offset = add(
            add(
                scale(-(width as f32) / 2.0, camera.up),
                scale(-(height as f32) / 2.0, camera.right),
            ),
            camera.forward,
        );
        camera
    }

    /// Enable or disable the thin-lens offset.
    pub fn with_depth_of_field(mut self, enabled: bool) -> Self {
        self.depth_of_field = enabled;
        self
    }

    /// Jittered primary ray through pixel `(x, y)`.
    ///
    /// Draws two lens samples (only with depth of field) followed by the
    /// column and row jitter.
    pub fn primary_ray(&self, x: u32, y: u32, rng: &mut dyn RngCore) -> Ray {
        let delta = if self.depth_of_field {
            let du = gen_f32(rng) - 0.5;
            let dv = gen_f32(rng) - 0.5;
            add(
                scale(self.aperture, scale(du, self.up)),
                scale(self.aperture, scale(dv, self.right)),
            )
        } else {
            Vec3::ZERO
        };

        let jx = gen_f32(rng) + x as f32;
        let jy = y as f32 + gen_f32(rng);
        let target = add(add(scale(jx, self.up), scale(jy, self.right)), self.eye_offset);
        let direction = normalize(add(scale(-1.0, delta), scale(self.focus_distance, target)));

        Ray::new(add(self.eye, delta), direction)
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::reference()
    }
}
