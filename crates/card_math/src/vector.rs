//! Vector kernel used by the tracer.
//!
//! Thin free functions over `glam::Vec3`. They spell out the exact operation
//! order the shading code relies on so results stay bit-stable across glam
//! versions.

use crate::Vec3;

/// Component-wise sum.
#[inline]
pub fn add(a: Vec3, b: Vec3) -> Vec3 {
    Vec3::new(a.x + b.x, a.y + b.y, a.z + b.z)
}

/// Scalar times vector.
#[inline]
pub fn scale(s: f32, v: Vec3) -> Vec3 {
    Vec3::new(s * v.x, s * v.y, s * v.z)
}

#[inline]
pub fn dot(a: Vec3, b: Vec3) -> f32 {
    a.x * b.x + a.y * b.y + a.z * b.z
}

#[inline]
pub fn cross(a: Vec3, b: Vec3) -> Vec3 {
    Vec3::new(
        a.y * b.z - a.z * b.y,
        a.z * b.x - a.x * b.z,
        a.x * b.y - a.y * b.x,
    )
}

/// `v / |v|`, computed as `v * (1 / sqrt(v·v))`.
///
/// A zero vector yields NaN components. Callers guarantee non-degenerate
/// input; nothing here guards against it.
#[inline]
pub fn normalize(v: Vec3) -> Vec3 {
    scale(1.0 / dot(v, v).sqrt(), v)
}

/// Mirror `d` about the plane with normal `n`: `d - 2(n·d)n`.
#[inline]
pub fn reflect(d: Vec3, n: Vec3) -> Vec3 {
    add(d, n * (dot(n, d) * -2.0))
}
