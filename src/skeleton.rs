//! Skins: a skeleton built from the joint nodes plus the inverse bind
//! matrices that bind mesh vertices to it.

use std::collections::HashSet;
use std::sync::Arc;

use glam::Mat4;

use crate::cache::SkinEntry;
use crate::context::ImportContext;
use crate::conventions::flip_mat4;
use crate::decoder::AttributeKind;
use crate::error::{ImportError, Result};
use crate::scene::{NodeId, SceneNode, Transform};

#[derive(Debug, Clone)]
pub struct Bone {
    pub name: String,
    pub parent: Option<usize>,
    /// Bind pose, the joint node's local transform.
    pub rest: Transform,
    pub node: NodeId,
}

#[derive(Debug, Clone, Default)]
pub struct Skeleton {
    pub bones: Vec<Bone>,
}

impl Skeleton {
    pub fn find_bone(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    pub fn bone_of_node(&self, node: NodeId) -> Option<usize> {
        self.bones.iter().position(|b| b.node == node)
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct SkinBind {
    pub bone: usize,
    pub name: String,
    pub inverse_bind: Mat4,
}

/// Joint `i` of the document skin is `binds[i]`.
#[derive(Debug, Clone, Default)]
pub struct Skin {
    pub binds: Vec<SkinBind>,
}

/// Attached to a skinned mesh node.
#[derive(Debug, Clone)]
pub struct SkinBinding {
    pub skin: Arc<Skin>,
    pub skeleton: NodeId,
}

fn chain(parents: &[Option<usize>], node: usize) -> Vec<usize> {
    let mut out = vec![node];
    let mut current = node;
    while let Some(parent) = parents.get(current).copied().flatten() {
        if out.contains(&parent) {
            break;
        }
        out.push(parent);
        current = parent;
    }
    out
}

/// Nearest node that is an ancestor of, or equal to, every joint.
pub(crate) fn common_ancestor(parents: &[Option<usize>], joints: &[usize]) -> Option<usize> {
    let (first, rest) = joints.split_first()?;
    let chains: Vec<HashSet<usize>> = rest.iter().map(|j| chain(parents, *j).into_iter().collect()).collect();
    chain(parents, *first)
        .into_iter()
        .find(|candidate| chains.iter().all(|c| c.contains(candidate)))
}

impl ImportContext<'_> {
    pub(crate) async fn get_skin(&mut self, index: usize, scene_root: NodeId) -> Result<SkinEntry> {
        if let Some(entry) = self.cache.skins.get(index) {
            return Ok(entry.clone());
        }
        self.cache.skins.check_index(index)?;
        self.check_cancelled()?;

        let skin = self
            .document()
            .skins()
            .nth(index)
            .ok_or(ImportError::IndexOutOfRange { kind: "skin", index })?;
        let joints: Vec<usize> = skin.joints().map(|j| j.index()).collect();

        let inverse_binds = match skin.inverse_bind_matrices() {
            Some(accessor) => {
                let data = self
                    .read_accessor(&accessor, AttributeKind::InverseBindMatrix, || {
                        format!("skin {index} inverse bind matrices")
                    })
                    .await?;
                let matrices: Vec<Mat4> = data.as_mat4().unwrap_or_default().iter().copied().map(flip_mat4).collect();
                if matrices.len() != joints.len() {
                    return Err(ImportError::InverseBindMatrixCount {
                        skin: index,
                        expected: joints.len(),
                        found: matrices.len(),
                    });
                }
                matrices
            }
            None => vec![Mat4::IDENTITY; joints.len()],
        };

        let mut joint_nodes = Vec::with_capacity(joints.len());
        for &joint in &joints {
            joint_nodes.push(self.get_node(joint).await?);
        }

        let entry = match self.shared_skeleton(&joints) {
            Some(shared) => shared,
            None => self.build_skeleton(index, &skin, &joints, &joint_nodes, scene_root).await?,
        };

        let binds = joint_nodes
            .iter()
            .zip(inverse_binds)
            .enumerate()
            .map(|(joint, (node, inverse_bind))| {
                let bone = entry
                    .skeleton
                    .bone_of_node(*node)
                    .ok_or(ImportError::IndexOutOfRange { kind: "joint", index: joint })?;
                Ok(SkinBind {
                    bone,
                    name: entry.skeleton.bones[bone].name.clone(),
                    inverse_bind,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let entry = SkinEntry {
            skin: Arc::new(Skin { binds }),
            ..entry
        };
        tracing::debug!(skin = index, bones = entry.skeleton.len(), "built skin");
        self.cache.skins.insert(index, entry.clone())?;
        Ok(entry)
    }

    /// An earlier skin whose skeleton already owns every joint of this one.
    fn shared_skeleton(&self, joints: &[usize]) -> Option<SkinEntry> {
        let (first, rest) = joints.split_first()?;
        let (owner, _) = self.bone_owners.get(first)?;
        if !rest.iter().all(|j| self.bone_owners.get(j).is_some_and(|(o, _)| o == owner)) {
            return None;
        }
        (0..self.cache.skins.len())
            .filter_map(|i| self.cache.skins.get(i))
            .find(|entry| entry.skeleton_node == *owner)
            .cloned()
    }

    async fn build_skeleton(
        &mut self,
        index: usize,
        skin: &gltf::Skin<'_>,
        joints: &[usize],
        joint_nodes: &[NodeId],
        scene_root: NodeId,
    ) -> Result<SkinEntry> {
        let root = match skin.skeleton() {
            Some(node) => node.index(),
            None => common_ancestor(&self.parents, joints).ok_or(ImportError::SkinJointsShareNoRoot { skin: index })?,
        };
        let root_node = self.get_node(root).await?;

        let skeleton_parent = if self.joints.contains(root) {
            self.graph.parent(root_node).unwrap_or(scene_root)
        } else {
            root_node
        };

        let mut names = HashSet::new();
        let mut bones = Vec::with_capacity(joints.len());
        for (bone, (&joint, &node)) in joints.iter().zip(joint_nodes).enumerate() {
            let mut name = self.node_name(joint);
            if !names.insert(name.clone()) {
                name = format!("{name}_{bone}");
                names.insert(name.clone());
            }
            let parent = self.parents[joint].and_then(|p| joints.iter().position(|j| *j == p));
            bones.push(Bone {
                name,
                parent,
                rest: self.graph[node].transform,
                node,
            });
        }
        let skeleton = Arc::new(Skeleton { bones });

        let name = skin.name().map(str::to_owned).unwrap_or_else(|| format!("Skeleton{index}"));
        let mut skeleton_node = SceneNode::new(name, None, Transform::IDENTITY);
        skeleton_node.skeleton = Some(skeleton.clone());
        let skeleton_id = self.graph.insert(skeleton_node);
        self.graph.attach(skeleton_parent, skeleton_id);

        for bone in &skeleton.bones {
            self.graph[bone.node].is_joint = true;
            match bone.parent {
                Some(_) => self.graph.detach(bone.node),
                None => {
                    if !self.graph.attach(skeleton_id, bone.node) {
                        tracing::warn!(skin = index, bone = %bone.name, "root bone is an ancestor of its skeleton");
                    }
                }
            }
        }
        for (bone, &joint) in skeleton.bones.iter().zip(joints) {
            self.bone_owners.insert(joint, (skeleton_id, bone.name.clone()));
        }

        Ok(SkinEntry {
            skeleton_node: skeleton_id,
            skeleton,
            skin: Arc::new(Skin::default()),
        })
    }

    /// Binds every skinned mesh node gathered by the walker to its skin.
    pub(crate) async fn bind_skins(&mut self, scene_root: NodeId) -> Result<()> {
        // joints built while binding may queue more skinned nodes
        while !self.pending_skins.is_empty() {
            let (node, skin) = self.pending_skins.remove(0);
            self.check_cancelled()?;
            let entry = self.get_skin(skin, scene_root).await?;
            let mesh_node = self.get_cached_node(node)?;
            if !self.graph.attach(entry.skeleton_node, mesh_node) {
                tracing::warn!(node, skin, "skinned mesh node is an ancestor of its skeleton; left in place");
            }
            self.graph[mesh_node].skin = Some(SkinBinding {
                skin: entry.skin.clone(),
                skeleton: entry.skeleton_node,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_ancestor_of_siblings_is_their_parent() {
        // 0 -> 1 -> {2, 3}
        let parents = [None, Some(0), Some(1), Some(1)];
        assert_eq!(common_ancestor(&parents, &[2, 3]), Some(1));
    }

    #[test]
    fn a_joint_can_be_its_own_root() {
        let parents = [None, Some(0), Some(1)];
        assert_eq!(common_ancestor(&parents, &[1, 2]), Some(1));
        assert_eq!(common_ancestor(&parents, &[2]), Some(2));
    }

    #[test]
    fn disjoint_trees_have_no_root() {
        let parents = [None, None, Some(0), Some(1)];
        assert_eq!(common_ancestor(&parents, &[2, 3]), None);
        assert_eq!(common_ancestor(&parents, &[]), None);
    }

    #[test]
    fn bones_are_found_by_name_and_node() {
        let mut arena = generational_arena::Arena::new();
        let a = arena.insert(());
        let b = arena.insert(());
        let skeleton = Skeleton {
            bones: vec![
                Bone { name: "hip".into(), parent: None, rest: Transform::IDENTITY, node: a },
                Bone { name: "knee".into(), parent: Some(0), rest: Transform::IDENTITY, node: b },
            ],
        };
        assert_eq!(skeleton.find_bone("knee"), Some(1));
        assert_eq!(skeleton.bone_of_node(a), Some(0));
        assert_eq!(skeleton.find_bone("toe"), None);
    }
}
