//! Card Renderer - CPU path tracing for the business-card scenes.
//!
//! A recursive path tracer over a small fixed set of primitives: bit-packed
//! unit spheres and squares, triangles, a checkerboard floor and the sky.
//!
//! A render runs in up to three stages:
//! 1. [`Grid::build`] indexes the triangles in a uniform grid.
//! 2. [`build_vpls`] shoots rays from the lights to place virtual point lights.
//! 3. [`render`] shades every pixel in parallel buckets.
//!
//! Each stage finishes before the next begins and only reads what the
//! previous stages produced.

mod bucket;
mod camera;
pub mod grid;
pub mod intersect;
mod renderer;
mod rng;
pub mod shading;
mod vpl;

pub use bucket::{generate_buckets, render_bucket, Bucket, BucketResult, DEFAULT_BUCKET_SIZE};
pub use camera::Camera;
pub use grid::{Cell, Grid, GridStats, CELL_CAPACITY, MAX_RESOLUTION};
pub use intersect::{Hit, Intersect, Tracer, EPSILON, FAR};
pub use renderer::{
    build_grid, color_to_rgba, pixel_radiance, render, render_pixel, render_scene, render_with_grid,
    Framebuffer, RenderConfig, RenderContext,
};
pub use rng::{gen_f32, pixel_stream, Mwc64x, SeedTuple, SEED_MASK, VPL_STREAM_BASE};
pub use shading::{Color, Shader};
pub use vpl::{build_vpls, Vpl, VplBuffer, DEFAULT_VPL_SAMPLES};

/// Re-export Vec3 and common math types from card_math
pub use card_math::{Aabb, Interval, Ray, Vec3};
