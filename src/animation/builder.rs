use std::collections::HashMap;
use std::sync::Arc;

use glam::Quat;
use serde_json::Value;

use super::{
    rebase_on_rest, AnimationClip, AnimationStage, Curve, Interpolation, SamplerData, TrackTarget, TransformTrack,
    WeightTrack,
};
use crate::context::ImportContext;
use crate::conventions::{flip_quat, flip_vec3};
use crate::decoder::{AttributeData, AttributeKind};
use crate::error::{ImportError, Result};
use crate::scene::{NodeId, Transform};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Property {
    Translation,
    Rotation,
    Scale,
    Weights,
}

impl Property {
    fn parse(path: &str) -> Option<Self> {
        match path {
            "translation" => Some(Property::Translation),
            "rotation" => Some(Property::Rotation),
            "scale" => Some(Property::Scale),
            "weights" => Some(Property::Weights),
            _ => None,
        }
    }

    fn kind(self) -> AttributeKind {
        match self {
            Property::Translation => AttributeKind::Translation,
            Property::Rotation => AttributeKind::Rotation,
            Property::Scale => AttributeKind::Scale,
            Property::Weights => AttributeKind::MorphWeights,
        }
    }
}

/// `(interpolation, cubic spline layout)` for a raw sampler mode.
fn parse_interpolation(mode: &str) -> Option<(Interpolation, bool)> {
    match mode {
        "STEP" => Some((Interpolation::Nearest, false)),
        "LINEAR" => Some((Interpolation::Linear, false)),
        "CUBICSPLINE" => Some((Interpolation::Cubic, true)),
        "CATMULLROMSPLINE" => Some((Interpolation::Cubic, false)),
        _ => None,
    }
}

/// Keeps the value of each in-tangent/value/out-tangent triple.
fn spline_values<T: Copy>(values: &[T], group: usize) -> Vec<T> {
    values
        .chunks_exact(group * 3)
        .flat_map(|key| key[group..group * 2].iter().copied())
        .collect()
}

fn channel_path(raw_channel: &Value) -> &str {
    raw_channel["target"]["path"].as_str().unwrap_or_default()
}

fn curve<T: Copy>(sampler: &SamplerData, values: &[T], group: usize) -> Curve<T> {
    let values = if sampler.cubic_spline {
        spline_values(values, group)
    } else {
        values.to_vec()
    };
    Curve {
        times: sampler.input.clone(),
        values,
        interpolation: sampler.interpolation,
    }
}

impl ImportContext<'_> {
    /// Builds an animation clip whose tracks are addressed relative to
    /// `root`. Repeated calls return the cached clip.
    pub(crate) async fn get_animation(&mut self, index: usize, root: NodeId) -> Result<Arc<AnimationClip>> {
        if let Some(AnimationStage::Cached(clip)) = self.cache.animations.get(index) {
            return Ok(clip.clone());
        }
        if !self.cache.animations.contains(index) {
            let samplers = self.resolve_samplers(index).await?;
            self.cache.animations.insert(index, AnimationStage::SamplersResolved(samplers))?;
        }
        self.check_cancelled()?;

        let clip = Arc::new(self.assemble_clip(index, root)?);
        tracing::debug!(
            animation = index,
            transform_tracks = clip.transform_tracks.len(),
            weight_tracks = clip.weight_tracks.len(),
            duration = clip.duration,
            "built animation"
        );
        if let Some(stage) = self.cache.animations.get_mut(index) {
            *stage = AnimationStage::Cached(clip.clone());
        }
        Ok(clip)
    }

    /// Decodes the samplers some channel references. Unused samplers and
    /// samplers only reached through unknown paths stay `None`.
    async fn resolve_samplers(&mut self, index: usize) -> Result<Vec<Option<SamplerData>>> {
        self.cache.animations.check_index(index)?;
        self.check_cancelled()?;
        let animation = self
            .document()
            .animations()
            .nth(index)
            .ok_or(ImportError::IndexOutOfRange { kind: "animation", index })?;
        let raw = &self.raw()["animations"][index];

        let mut properties: HashMap<usize, Property> = HashMap::new();
        for (c, channel) in animation.channels().enumerate() {
            if let Some(property) = Property::parse(channel_path(&raw["channels"][c])) {
                properties.entry(channel.sampler().index()).or_insert(property);
            }
        }

        let mut samplers = Vec::with_capacity(animation.samplers().count());
        for (s, sampler) in animation.samplers().enumerate() {
            let Some(property) = properties.get(&s).copied() else {
                samplers.push(None);
                continue;
            };
            let mode = raw["samplers"][s]["interpolation"].as_str().unwrap_or("LINEAR");
            let (interpolation, cubic_spline) = parse_interpolation(mode).ok_or_else(|| ImportError::UnsupportedInterpolation {
                animation: index,
                sampler: s,
                interpolation: mode.to_owned(),
            })?;
            if cubic_spline {
                tracing::warn!(
                    animation = index,
                    sampler = s,
                    "cubic spline tangents are discarded; keys are sampled as values only"
                );
            }

            let input = self
                .read_accessor(&sampler.input(), AttributeKind::Time, || {
                    format!("animation {index} sampler {s} input")
                })
                .await?;
            let output = self
                .read_accessor(&sampler.output(), property.kind(), || {
                    format!("animation {index} sampler {s} output")
                })
                .await?;
            samplers.push(Some(SamplerData {
                input: input.as_scalar().unwrap_or_default().to_vec(),
                output,
                interpolation,
                cubic_spline,
            }));
        }
        Ok(samplers)
    }

    fn assemble_clip(&self, index: usize, root: NodeId) -> Result<AnimationClip> {
        let Some(AnimationStage::SamplersResolved(samplers)) = self.cache.animations.get(index) else {
            return Err(ImportError::IndexOutOfRange { kind: "animation", index });
        };
        let animation = self
            .document()
            .animations()
            .nth(index)
            .ok_or(ImportError::IndexOutOfRange { kind: "animation", index })?;
        let raw = &self.raw()["animations"][index];

        let mut transform_tracks: Vec<TransformTrack> = Vec::new();
        let mut by_target: HashMap<TrackTarget, usize> = HashMap::new();
        let mut rests: HashMap<usize, Transform> = HashMap::new();
        let mut weight_tracks = Vec::new();

        for (c, channel) in animation.channels().enumerate() {
            let path = channel_path(&raw["channels"][c]);
            let Some(property) = Property::parse(path) else {
                tracing::warn!(animation = index, channel = c, path, "skipping channel with unknown target path");
                continue;
            };
            let node = channel.target().node().index();
            let Some(node_id) = self.cache.nodes.get(node).copied() else {
                tracing::debug!(animation = index, channel = c, node, "channel target is not part of the scene");
                continue;
            };
            let Some(sampler) = samplers.get(channel.sampler().index()).and_then(Option::as_ref) else {
                continue;
            };
            let Some(target) = self.track_target(root, node, node_id) else {
                tracing::debug!(animation = index, channel = c, node, "channel target is not below the scene root");
                continue;
            };

            if property == Property::Weights {
                weight_tracks.extend(self.weight_tracks(node, target, sampler));
                continue;
            }

            let slot = *by_target.entry(target.clone()).or_insert_with(|| {
                transform_tracks.push(TransformTrack::new(target));
                transform_tracks.len() - 1
            });
            if let Some(rest) = self.bone_rest(node) {
                rests.insert(slot, rest);
            }
            let track = &mut transform_tracks[slot];
            match (property, &sampler.output) {
                (Property::Translation, AttributeData::Vec3(values)) => {
                    let mut keys = curve(sampler, values, 1);
                    keys.values.iter_mut().for_each(|v| *v = flip_vec3(*v));
                    track.translation = Some(keys);
                }
                (Property::Scale, AttributeData::Vec3(values)) => {
                    track.scale = Some(curve(sampler, values, 1));
                }
                (Property::Rotation, AttributeData::Vec4(values)) => {
                    let quats: Vec<Quat> = values.iter().map(|v| flip_quat(Quat::from_vec4(*v)).normalize()).collect();
                    track.rotation = Some(curve(sampler, &quats, 1));
                }
                _ => {
                    tracing::warn!(animation = index, channel = c, path, "sampler output does not match target path");
                }
            }
        }

        for (slot, rest) in &rests {
            rebase_on_rest(&mut transform_tracks[*slot], rest);
        }

        let duration = transform_tracks
            .iter()
            .map(TransformTrack::duration)
            .chain(weight_tracks.iter().map(|t: &WeightTrack| t.curve.duration()))
            .fold(0.0f32, f32::max);
        Ok(AnimationClip {
            name: animation
                .name()
                .map(str::to_owned)
                .unwrap_or_else(|| format!("Animation{index}")),
            duration,
            transform_tracks,
            weight_tracks,
        })
    }

    fn track_target(&self, root: NodeId, node: usize, node_id: NodeId) -> Option<TrackTarget> {
        match self.bone_owners.get(&node) {
            Some((skeleton, bone)) => Some(TrackTarget::Bone {
                skeleton: self.graph.path(root, *skeleton)?,
                bone: bone.clone(),
            }),
            None => Some(TrackTarget::Node(self.graph.path(root, node_id)?)),
        }
    }

    /// Bind pose of a joint node that belongs to a skeleton.
    fn bone_rest(&self, node: usize) -> Option<Transform> {
        let (skeleton_node, bone) = self.bone_owners.get(&node)?;
        let skeleton = self.graph.get(*skeleton_node)?.skeleton.as_ref()?;
        Some(skeleton.bones.get(skeleton.find_bone(bone)?)?.rest)
    }

    /// Splits an interleaved weights output into one track per morph target.
    fn weight_tracks(&self, node: usize, target: TrackTarget, sampler: &SamplerData) -> Vec<WeightTrack> {
        let Some(values) = sampler.output.as_scalar() else {
            return Vec::new();
        };
        let keys = sampler.input.len() * if sampler.cubic_spline { 3 } else { 1 };
        if keys == 0 || values.len() % keys != 0 {
            tracing::warn!(node, values = values.len(), keys, "weights output does not divide into keys");
            return Vec::new();
        }
        let stride = values.len() / keys;
        let mesh = self.document().nodes().nth(node).and_then(|n| n.mesh()).map(|m| m.index());
        let names = match mesh {
            Some(mesh) => self.blend_shape_names(mesh, stride),
            None => (0..stride).map(|t| format!("target{t}")).collect(),
        };
        let values = if sampler.cubic_spline {
            spline_values(values, stride)
        } else {
            values.to_vec()
        };

        names
            .into_iter()
            .enumerate()
            .map(|(morph_target, blend_shape)| WeightTrack {
                target: target.clone(),
                morph_target,
                blend_shape,
                curve: Curve {
                    times: sampler.input.clone(),
                    values: values.iter().skip(morph_target).step_by(stride).copied().collect(),
                    interpolation: sampler.interpolation,
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolation_modes_map_to_engine_modes() {
        assert_eq!(parse_interpolation("STEP"), Some((Interpolation::Nearest, false)));
        assert_eq!(parse_interpolation("LINEAR"), Some((Interpolation::Linear, false)));
        assert_eq!(parse_interpolation("CUBICSPLINE"), Some((Interpolation::Cubic, true)));
        assert_eq!(parse_interpolation("CATMULLROMSPLINE"), Some((Interpolation::Cubic, false)));
        assert_eq!(parse_interpolation("BOUNCY"), None);
    }

    #[test]
    fn spline_keys_keep_the_middle_value() {
        let values = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(spline_values(&values, 1), vec![1.0, 4.0]);
        // two morph targets per key
        let values = [9.0, 9.0, 1.0, 2.0, 8.0, 8.0];
        assert_eq!(spline_values(&values, 2), vec![1.0, 2.0]);
    }

    #[test]
    fn unknown_paths_are_not_properties() {
        assert_eq!(Property::parse("rotation"), Some(Property::Rotation));
        assert_eq!(Property::parse("pointer"), None);
        assert_eq!(channel_path(&serde_json::json!({ "target": { "node": 0 } })), "");
    }
}
