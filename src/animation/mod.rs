mod bind_pose;
mod builder;

use std::cmp::Ordering;
use std::sync::Arc;

use glam::{Quat, Vec3};

use crate::decoder::AttributeData;

pub use bind_pose::rebase_on_rest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Nearest,
    Linear,
    /// Keys hold values only; spline tangents are not carried.
    Cubic,
}

pub trait Keyframe: Copy {
    fn interpolate(a: Self, b: Self, t: f32) -> Self;
}

impl Keyframe for f32 {
    fn interpolate(a: Self, b: Self, t: f32) -> Self {
        a + (b - a) * t
    }
}

impl Keyframe for Vec3 {
    fn interpolate(a: Self, b: Self, t: f32) -> Self {
        a.lerp(b, t)
    }
}

impl Keyframe for Quat {
    fn interpolate(a: Self, b: Self, t: f32) -> Self {
        a.slerp(b, t)
    }
}

fn bin_search_keys(times: &[f32], val: f32) -> (usize, usize) {
    let n = times.len();
    if n < 2 {
        return (0, 0);
    }
    match times.binary_search_by(|x| x.partial_cmp(&val).unwrap_or(Ordering::Greater)) {
        Ok(i) => (i, i),
        Err(0) => (0, 0),
        Err(i) if i >= n => (n - 1, n - 1),
        Err(i) => (i - 1, i),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Curve<T> {
    pub times: Vec<f32>,
    pub values: Vec<T>,
    pub interpolation: Interpolation,
}

impl<T: Keyframe> Curve<T> {
    /// Value at `t`, clamped to the first and last key.
    pub fn sample(&self, t: f32) -> Option<T> {
        if self.values.is_empty() || self.times.is_empty() {
            return None;
        }
        let (i0, i1) = bin_search_keys(&self.times, t);
        let (v0, v1) = (*self.values.get(i0)?, *self.values.get(i1)?);
        let (t0, t1) = (self.times[i0], self.times[i1]);
        let alpha = if i0 == i1 || (t1 - t0).abs() < f32::EPSILON {
            0.0
        } else {
            (t - t0) / (t1 - t0)
        };
        Some(match self.interpolation {
            Interpolation::Nearest => v0,
            Interpolation::Linear | Interpolation::Cubic => T::interpolate(v0, v1, alpha),
        })
    }

    pub fn duration(&self) -> f32 {
        self.times.last().copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TrackTarget {
    /// Path of the node below the animated scene root.
    Node(String),
    /// A bone, addressed by name inside the skeleton at `skeleton`.
    Bone { skeleton: String, bone: String },
}

/// Translation, rotation and scale of one target, keyed together.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformTrack {
    pub target: TrackTarget,
    pub translation: Option<Curve<Vec3>>,
    pub rotation: Option<Curve<Quat>>,
    pub scale: Option<Curve<Vec3>>,
}

impl TransformTrack {
    pub fn new(target: TrackTarget) -> Self {
        Self {
            target,
            translation: None,
            rotation: None,
            scale: None,
        }
    }

    pub fn duration(&self) -> f32 {
        let t = self.translation.as_ref().map_or(0.0, Curve::duration);
        let r = self.rotation.as_ref().map_or(0.0, Curve::duration);
        let s = self.scale.as_ref().map_or(0.0, Curve::duration);
        t.max(r).max(s)
    }
}

/// One morph target weight of one node.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightTrack {
    pub target: TrackTarget,
    pub morph_target: usize,
    pub blend_shape: String,
    pub curve: Curve<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationClip {
    pub name: String,
    pub duration: f32,
    pub transform_tracks: Vec<TransformTrack>,
    pub weight_tracks: Vec<WeightTrack>,
}

impl AnimationClip {
    pub fn track(&self, target: &TrackTarget) -> Option<&TransformTrack> {
        self.transform_tracks.iter().find(|t| &t.target == target)
    }
}

/// Clips of a scene, attached to its root node.
#[derive(Debug, Clone, Default)]
pub struct AnimationPlayer {
    pub clips: Vec<Arc<AnimationClip>>,
}

impl AnimationPlayer {
    pub fn clip(&self, name: &str) -> Option<&Arc<AnimationClip>> {
        self.clips.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct SamplerData {
    pub input: Vec<f32>,
    pub output: AttributeData,
    pub interpolation: Interpolation,
    /// Output holds in-tangent, value and out-tangent per key.
    pub cubic_spline: bool,
}

/// Build progress of one document animation. A missing cache slot is the
/// unbuilt state.
#[derive(Debug, Clone)]
pub enum AnimationStage {
    SamplersResolved(Vec<Option<SamplerData>>),
    Cached(Arc<AnimationClip>),
}
