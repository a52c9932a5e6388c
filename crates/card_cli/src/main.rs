use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{ensure, Context, Result};
use card_core::{load_scene, Scene, SceneLimits};
use card_renderer::{build_grid, render_with_grid, Grid, RenderConfig, SeedTuple};
use clap::Parser;

/// Path trace a business-card scene to an image.
#[derive(Parser, Debug)]
#[command(name = "cardtracer", version)]
struct Args {
    /// Width of the rendered image
    width: Option<u32>,

    /// Height of the rendered image
    height: Option<u32>,

    /// Target triangles per grid cell
    cell_size_modifier: Option<f32>,

    /// Samples per pixel
    #[arg(short = 's', long = "samples")]
    samples: Option<u32>,

    /// Scene directory (text files) or JSON scene description
    #[arg(long)]
    scene: Option<PathBuf>,

    /// Output image; the format follows the extension
    #[arg(short = 'o', long, default_value = "render.png")]
    output: PathBuf,

    /// Seed words as x,y,z,w (drawn from entropy when omitted)
    #[arg(long)]
    seed: Option<SeedTuple>,

    /// Rays per light for the VPL pass (0 disables it)
    #[arg(long = "vpl")]
    vpl_samples: Option<u32>,

    /// Test every triangle instead of walking the grid
    #[arg(long)]
    no_grid: bool,

    /// Disable depth of field
    #[arg(long)]
    no_dof: bool,

    /// Maximum number of surfaces a path may visit
    #[arg(long)]
    max_depth: Option<u32>,

    /// Cap on loaded triangles
    #[arg(long)]
    max_triangles: Option<usize>,

    /// JSON render configuration; command-line values override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the occupants of every non-empty grid cell
    #[arg(long)]
    print_grid: bool,
}

impl Args {
    /// Defaults, then the config file, then explicit arguments.
    fn render_config(&self) -> Result<RenderConfig> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => RenderConfig::default(),
        };

        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if let Some(modifier) = self.cell_size_modifier {
            config.cell_size_modifier = modifier;
        }
        if let Some(samples) = self.samples {
            config.samples_per_pixel = samples;
        }
        if let Some(vpl_samples) = self.vpl_samples {
            config.vpl_samples = vpl_samples;
        }
        if let Some(max_depth) = self.max_depth {
            config.max_depth = max_depth;
        }
        if self.no_grid {
            config.use_grid = false;
        }
        if self.no_dof {
            config.depth_of_field = false;
        }

        ensure!(
            config.width > 0 && config.height > 0,
            "image size must be positive, got {}x{}",
            config.width,
            config.height
        );
        ensure!(
            config.cell_size_modifier > 0.0,
            "cell size modifier must be positive, got {}",
            config.cell_size_modifier
        );
        Ok(config)
    }

    fn scene_limits(&self) -> SceneLimits {
        match self.max_triangles {
            Some(max) => SceneLimits::default().with_max_triangles(max),
            None => SceneLimits::default(),
        }
    }
}

fn read_config(path: &Path) -> Result<RenderConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))
}

fn print_grid(grid: &Grid) {
    let res = grid.resolution();
    println!("grid {} x {} x {}", res.x, res.y, res.z);
    for (coords, cell) in grid.occupied_cells() {
        let indices: Vec<String> = cell.indices().iter().map(|i| i.to_string()).collect();
        println!(
            "cell ({}, {}, {}) [{}]: {}",
            coords.x,
            coords.y,
            coords.z,
            cell.len(),
            indices.join(" ")
        );
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();
    let config = args.render_config()?;
    let limits = args.scene_limits();

    let scene = match &args.scene {
        Some(path) => load_scene(path, &limits)
            .with_context(|| format!("Failed to load scene {}", path.display()))?,
        None => {
            log::info!("No scene given, rendering the business card");
            Scene::reference()
        }
    };

    let seeds = args.seed.unwrap_or_else(SeedTuple::from_entropy);
    log::info!("Seeds: {seeds}");
    log::info!(
        "Rendering {}x{}, {} spp, max depth {}, grid {}, depth of field {}, {} VPL samples",
        config.width,
        config.height,
        config.samples_per_pixel,
        config.max_depth,
        config.use_grid,
        config.depth_of_field,
        config.vpl_samples
    );

    let start = Instant::now();
    let grid = build_grid(&scene, &config);
    if args.print_grid {
        match &grid {
            Some(grid) => print_grid(grid),
            None => log::warn!("--print-grid: no grid (grid disabled or no triangles)"),
        }
    }

    let frame = render_with_grid(&scene, grid.as_ref(), &config, seeds);
    frame
        .save(&args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    log::info!("Wrote {} in {:.2?}", args.output.display(), start.elapsed());
    Ok(())
}
