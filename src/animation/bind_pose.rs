use glam::Mat4;

use super::{Curve, Interpolation, TransformTrack};
use crate::scene::Transform;

fn key_times(track: &TransformTrack) -> Vec<f32> {
    let mut times: Vec<f32> = [
        track.translation.as_ref().map(|c| c.times.as_slice()),
        track.rotation.as_ref().map(|c| c.times.as_slice()),
        track.scale.as_ref().map(|c| c.times.as_slice()),
    ]
    .into_iter()
    .flatten()
    .flatten()
    .copied()
    .collect();
    times.sort_by(f32::total_cmp);
    times.dedup_by(|a, b| (*a - *b).abs() <= f32::EPSILON);
    times
}

fn shared_interpolation(track: &TransformTrack) -> Interpolation {
    let modes = [
        track.translation.as_ref().map(|c| c.interpolation),
        track.rotation.as_ref().map(|c| c.interpolation),
        track.scale.as_ref().map(|c| c.interpolation),
    ];
    let mut present = modes.into_iter().flatten();
    match present.next() {
        Some(first) if present.all(|m| m == first) => first,
        _ => Interpolation::Linear,
    }
}

/// Re-expresses a bone track relative to the bone's rest pose: each key is
/// recomposed into a matrix `M` and replaced by `rest⁻¹ · M`. Components the
/// track does not animate are held at rest. Every component ends up keyed
/// on the union of the original key times.
pub fn rebase_on_rest(track: &mut TransformTrack, rest: &Transform) {
    let times = key_times(track);
    if times.is_empty() {
        return;
    }
    let interpolation = shared_interpolation(track);
    let rest_inverse = rest.to_matrix().inverse();

    let mut translations = Vec::with_capacity(times.len());
    let mut rotations = Vec::with_capacity(times.len());
    let mut scales = Vec::with_capacity(times.len());
    for &t in &times {
        let translation = track
            .translation
            .as_ref()
            .and_then(|c| c.sample(t))
            .unwrap_or(rest.translation);
        let rotation = track.rotation.as_ref().and_then(|c| c.sample(t)).unwrap_or(rest.rotation);
        let scale = track.scale.as_ref().and_then(|c| c.sample(t)).unwrap_or(rest.scale);
        let local = rest_inverse * Mat4::from_scale_rotation_translation(scale, rotation, translation);
        let (s, r, t) = local.to_scale_rotation_translation();
        translations.push(t);
        rotations.push(r.normalize());
        scales.push(s);
    }

    track.translation = Some(Curve {
        times: times.clone(),
        values: translations,
        interpolation,
    });
    track.rotation = Some(Curve {
        times: times.clone(),
        values: rotations,
        interpolation,
    });
    track.scale = Some(Curve {
        times,
        values: scales,
        interpolation,
    });
}
