//! Conversions between glTF's right-handed, bottom-left-UV conventions and the
//! engine's left-handed, top-left-UV ones.
//!
//! Every conversion here is its own inverse, so the same functions serve
//! import and export.

use glam::{Mat4, Quat, Vec2, Vec3, Vec4};

/// Per-axis scale applied to positions and normals.
pub const HANDEDNESS_FLIP: Vec3 = Vec3::new(-1.0, 1.0, 1.0);

/// Tangents also negate the bitangent sign in `w`.
pub const TANGENT_FLIP: Vec4 = Vec4::new(-1.0, 1.0, 1.0, -1.0);

/// Weight sums at or below this are left untouched.
pub const WEIGHT_EPSILON: f32 = 1e-6;

pub fn flip_vec3(v: Vec3) -> Vec3 {
    v * HANDEDNESS_FLIP
}

pub fn flip_tangent(t: Vec4) -> Vec4 {
    t * TANGENT_FLIP
}

/// Mirroring X turns a rotation about Y or Z into its opposite.
pub fn flip_quat(q: Quat) -> Quat {
    Quat::from_xyzw(q.x, -q.y, -q.z, q.w)
}

pub fn flip_mat4(m: Mat4) -> Mat4 {
    let flip = Mat4::from_scale(HANDEDNESS_FLIP);
    flip * m * flip
}

pub fn flip_uv(uv: Vec2) -> Vec2 {
    Vec2::new(uv.x, 1.0 - uv.y)
}

/// Swaps the 2nd and 3rd index of every triangle. A trailing partial
/// triangle is left as is.
pub fn rewind_triangles(indices: &mut [u32]) {
    for triangle in indices.chunks_exact_mut(3) {
        triangle.swap(1, 2);
    }
}

pub fn normalize_weights(weights: Vec4) -> Vec4 {
    let sum = weights.x + weights.y + weights.z + weights.w;
    if sum.abs() <= WEIGHT_EPSILON {
        weights
    } else {
        weights / sum
    }
}

pub fn color_from_rgb(rgb: Vec3) -> Vec4 {
    rgb.extend(1.0)
}

pub fn flip_vec3_slice(values: &mut [Vec3]) {
    for v in values {
        *v = flip_vec3(*v);
    }
}

pub fn flip_tangent_slice(values: &mut [Vec4]) {
    for t in values {
        *t = flip_tangent(*t);
    }
}

pub fn flip_uv_slice(values: &mut [Vec2]) {
    for uv in values {
        *uv = flip_uv(*uv);
    }
}

pub fn normalize_weight_slice(values: &mut [Vec4]) {
    for w in values {
        *w = normalize_weights(*w);
    }
}
