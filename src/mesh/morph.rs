use std::collections::BTreeMap;
use std::ops::Add;

use glam::{Vec3, Vec4};

use super::{BlendShape, Surface};
use crate::conventions::flip_vec3;
use crate::decoder::AttributeData;

/// `base[i] + deltas[i]` over the overlapping prefix; vertices past the end
/// of `deltas` pass through.
pub fn blend_deltas<T: Copy + Add<Output = T>>(base: &[T], deltas: &[T]) -> Vec<T> {
    base.iter()
        .enumerate()
        .map(|(i, b)| match deltas.get(i) {
            Some(d) => *b + *d,
            None => *b,
        })
        .collect()
}

fn blend_tangents(base: &[Vec4], deltas: &[Vec3]) -> Vec<Vec4> {
    base.iter()
        .enumerate()
        .map(|(i, t)| match deltas.get(i) {
            Some(d) => (t.truncate() + *d).extend(t.w),
            None => *t,
        })
        .collect()
}

fn converted_deltas(target: &BTreeMap<String, AttributeData>, name: &str) -> Vec<Vec3> {
    target
        .get(name)
        .and_then(AttributeData::as_vec3)
        .map(|deltas| deltas.iter().copied().map(flip_vec3).collect())
        .unwrap_or_default()
}

/// Builds one absolute frame per morph target of an already converted
/// surface.
pub(crate) fn blend_shapes(
    surface: &Surface,
    targets: &[BTreeMap<String, AttributeData>],
    names: &[String],
) -> Vec<BlendShape> {
    targets
        .iter()
        .enumerate()
        .map(|(t, target)| {
            let positions = blend_deltas(&surface.positions, &converted_deltas(target, "POSITION"));
            let normals = surface
                .normals
                .as_ref()
                .map(|normals| blend_deltas(normals, &converted_deltas(target, "NORMAL")));
            let tangents = surface
                .tangents
                .as_ref()
                .map(|tangents| blend_tangents(tangents, &converted_deltas(target, "TANGENT")));
            BlendShape {
                name: names.get(t).cloned().unwrap_or_else(|| format!("target{t}")),
                positions,
                normals,
                tangents,
            }
        })
        .collect()
}
