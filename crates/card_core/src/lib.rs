//! Card Core - scene data for the business-card path tracer.
//!
//! This crate provides:
//!
//! - **Scene types**: `Scene`, `Sphere`, `Square`, `Triangle`, `Light`
//! - **Bit-packed masks**: the 9x19 occupancy masks spheres and squares are
//!   authored in
//! - **Loading**: the plain-text scene directory format and a JSON description
//!
//! # Example
//!
//! ```ignore
//! use card_core::{load_scene, SceneLimits};
//!
//! let scene = load_scene("scenes/card", &SceneLimits::default())?;
//! println!("{} spheres, {} triangles", scene.sphere_count(), scene.triangle_count());
//! ```

pub mod loader;
pub mod scene;

// Re-export commonly used types
pub use loader::{load_scene, load_scene_dir, load_scene_json, LoadError, LoadResult};
pub use scene::{
    BitMask, Light, PlanarSurface, Scene, SceneDescription, SceneLimits, Sphere, Square, Triangle,
    MASK_COLS, MASK_ROWS, MAX_LIGHTS, MAX_TRIANGLES,
};
