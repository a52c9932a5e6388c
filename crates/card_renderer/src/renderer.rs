//! Pixel and frame rendering.
//!
//! A pixel accumulates `samples_per_pixel` jittered primary rays onto a
//! base level of 13 per channel. Each sample is weighted by
//! `3.5 * 64 / samples_per_pixel`, so 64 samples give the classic 3.5.
//! The sum is clamped to 8 bits without gamma.

use std::path::Path;
use std::time::Instant;

use crate::bucket::{generate_buckets, render_bucket, DEFAULT_BUCKET_SIZE};
use crate::{
    build_vpls, pixel_stream, Camera, Color, Grid, Mwc64x, SeedTuple, Shader, Tracer, VplBuffer,
};
use card_core::Scene;
use image::error::{ParameterError, ParameterErrorKind};
use image::{DynamicImage, ImageError, ImageResult, RgbaImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Starting value of every channel.
pub const ACCUMULATION_BASE: f32 = 13.0;
/// Per-sample weight at the reference sample count.
pub const SAMPLE_WEIGHT: f32 = 3.5;
/// Sample count `SAMPLE_WEIGHT` is calibrated for.
pub const REFERENCE_SAMPLES: u32 = 64;

/// Render configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    /// Primary rays per pixel
    pub samples_per_pixel: u32,
    /// Maximum number of surfaces a path may visit
    pub max_depth: u32,
    /// Target triangles per grid cell
    pub cell_size_modifier: f32,
    /// Walk the triangle grid instead of testing every triangle
    pub use_grid: bool,
    /// Thin-lens offset on primary rays
    pub depth_of_field: bool,
    /// Rays per light in the VPL pass; 0 disables it
    pub vpl_samples: u32,
    /// Tile edge for parallel rendering
    pub bucket_size: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
            samples_per_pixel: REFERENCE_SAMPLES,
            max_depth: 8,
            cell_size_modifier: crate::grid::DEFAULT_CELL_SIZE_MODIFIER,
            use_grid: true,
            depth_of_field: true,
            vpl_samples: 0,
            bucket_size: DEFAULT_BUCKET_SIZE,
        }
    }
}

impl RenderConfig {
    /// Weight applied to every sample.
    pub fn sample_weight(&self) -> f32 {
        SAMPLE_WEIGHT * REFERENCE_SAMPLES as f32 / self.samples_per_pixel.max(1) as f32
    }
}

/// Everything a pixel needs, shared by all render threads.
#[derive(Clone, Copy)]
pub struct RenderContext<'a> {
    pub shader: Shader<'a>,
    pub camera: &'a Camera,
    pub config: &'a RenderConfig,
    pub seeds: SeedTuple,
}

impl<'a> RenderContext<'a> {
    /// The grid is only used when `config.use_grid` is set.
    pub fn new(
        scene: &'a Scene,
        grid: Option<&'a Grid>,
        vpls: Option<&'a VplBuffer>,
        camera: &'a Camera,
        config: &'a RenderConfig,
        seeds: SeedTuple,
    ) -> Self {
        let grid = if config.use_grid { grid } else { None };
        Self {
            shader: Shader::new(Tracer::new(scene, grid), vpls),
            camera,
            config,
            seeds,
        }
    }
}

/// Accumulated, unclamped value of pixel `(x, y)`.
pub fn pixel_radiance(ctx: &RenderContext<'_>, x: u32, y: u32) -> Color {
    let mut rng = Mwc64x::from_seeds(ctx.seeds, pixel_stream(x, y, ctx.config.width));
    let weight = ctx.config.sample_weight();
    let mut color = Color::splat(ACCUMULATION_BASE);

    for _ in 0..ctx.config.samples_per_pixel {
        let ray = ctx.camera.primary_ray(x, y, &mut rng);
        color = ctx.shader.shade(&ray, ctx.config.max_depth, &mut rng) * weight + color;
    }
    color
}

/// Final 8-bit color of pixel `(x, y)`.
pub fn render_pixel(ctx: &RenderContext<'_>, x: u32, y: u32) -> [u8; 4] {
    color_to_rgba(pixel_radiance(ctx, x, y))
}

/// NaN becomes 0, everything else is clamped to [0, 255] and truncated.
#[inline]
fn channel_to_u8(v: f32) -> u8 {
    if v.is_nan() {
        0
    } else {
        v.clamp(0.0, 255.0) as u8
    }
}

/// Convert an accumulated color to opaque RGBA.
pub fn color_to_rgba(color: Color) -> [u8; 4] {
    [
        channel_to_u8(color.x),
        channel_to_u8(color.y),
        channel_to_u8(color.z),
        255,
    ]
}

/// RGBA output image.
///
/// Storage is in file order: the first stored pixel is `(width-1, height-1)`
/// and both coordinates descend from there.
#[derive(Debug, Clone, PartialEq)]
pub struct Framebuffer {
    pub width: u32,
    pub height: u32,
    pixels: Vec<[u8; 4]>,
}

impl Framebuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![[0, 0, 0, 255]; width as usize * height as usize],
        }
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        (self.height - 1 - y) as usize * self.width as usize + (self.width - 1 - x) as usize
    }

    pub fn get(&self, x: u32, y: u32) -> [u8; 4] {
        self.pixels[self.index(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let index = self.index(x, y);
        self.pixels[index] = rgba;
    }

    /// Pixels in file order.
    pub fn pixels(&self) -> &[[u8; 4]] {
        &self.pixels
    }

    /// Raw RGBA bytes in file order.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    pub fn to_image(&self) -> ImageResult<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.as_bytes().to_vec()).ok_or_else(|| {
            ImageError::Parameter(ParameterError::from_kind(
                ParameterErrorKind::DimensionMismatch,
            ))
        })
    }

    /// Write the image; the format follows the file extension.
    ///
    /// `.ppm` has no alpha channel, so it is written as RGB.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        let path = path.as_ref();
        let image = self.to_image()?;
        let is_ppm = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("ppm"));
        if is_ppm {
            DynamicImage::ImageRgba8(image).to_rgb8().save(path)
        } else {
            image.save(path)
        }
    }
}

/// Render the full frame in parallel buckets.
pub fn render(ctx: &RenderContext<'_>) -> Framebuffer {
    let config = ctx.config;
    let mut frame = Framebuffer::new(config.width, config.height);
    let bucket_size = if config.bucket_size == 0 {
        DEFAULT_BUCKET_SIZE
    } else {
        config.bucket_size
    };
    let buckets = generate_buckets(config.width, config.height, bucket_size);

    let start = Instant::now();
    let results: Vec<_> = buckets
        .par_iter()
        .map(|bucket| render_bucket(bucket, ctx))
        .collect();

    for result in &results {
        let bucket = result.bucket;
        for (i, rgba) in result.pixels.iter().enumerate() {
            let x = bucket.x + i as u32 % bucket.width;
            let y = bucket.y + i as u32 / bucket.width;
            frame.set(x, y, *rgba);
        }
    }

    log::info!(
        "Rendered {}x{} at {} spp in {} buckets, {:.2?}",
        config.width,
        config.height,
        config.samples_per_pixel,
        results.len(),
        start.elapsed()
    );
    frame
}

/// Triangle grid for `scene`, or `None` when disabled or there are no triangles.
pub fn build_grid(scene: &Scene, config: &RenderConfig) -> Option<Grid> {
    if !config.use_grid || scene.triangle_count() == 0 {
        return None;
    }
    let start = Instant::now();
    let grid = Grid::build(scene.triangles(), scene.triangle_bounds(), config.cell_size_modifier);
    log::info!("Grid built in {:.2?}", start.elapsed());
    Some(grid)
}

/// Run the VPL pass if enabled, then render with the business-card camera.
pub fn render_with_grid(
    scene: &Scene,
    grid: Option<&Grid>,
    config: &RenderConfig,
    seeds: SeedTuple,
) -> Framebuffer {
    let vpls = if config.vpl_samples > 0 {
        let start = Instant::now();
        let buffer = build_vpls(&Tracer::new(scene, grid), config.vpl_samples, seeds);
        log::info!("VPL pass finished in {:.2?}", start.elapsed());
        Some(buffer)
    } else {
        None
    };

    let camera = Camera::reference().with_depth_of_field(config.depth_of_field);
    let ctx = RenderContext::new(scene, grid, vpls.as_ref(), &camera, config, seeds);
    render(&ctx)
}

/// Build the grid and the VPL buffer for `scene`, then render it.
pub fn render_scene(scene: &Scene, config: &RenderConfig, seeds: SeedTuple) -> Framebuffer {
    let grid = build_grid(scene, config);
    render_with_grid(scene, grid.as_ref(), config, seeds)
}
