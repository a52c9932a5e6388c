//! Card Math - vector kernel and geometric helpers.
//!
//! Re-exports glam and adds the free-function vector kernel the tracer is
//! written in ([`add`], [`scale`], [`dot`], [`cross`], [`normalize`],
//! [`reflect`]), plus [`Ray`], [`Interval`] and [`Aabb`].

// Re-export glam for convenience
pub use glam::*;

mod aabb;
mod interval;
mod ray;
pub mod vector;

pub use aabb::Aabb;
pub use interval::Interval;
pub use ray::Ray;
pub use vector::{add, cross, dot, normalize, reflect, scale};
