use std::sync::Arc;

use generational_arena::{Arena, Index};
use glam::{Mat4, Quat, Vec3};

use crate::animation::AnimationPlayer;
use crate::mesh::{Collider, MeshInstance};
use crate::skeleton::{Skeleton, SkinBinding};

pub type NodeId = Index;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn from_matrix(matrix: Mat4) -> Self {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        Self {
            translation,
            rotation,
            scale,
        }
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Camera {
    Perspective {
        yfov: f32,
        znear: f32,
        zfar: Option<f32>,
        aspect_ratio: Option<f32>,
    },
    Orthographic {
        xmag: f32,
        ymag: f32,
        znear: f32,
        zfar: f32,
    },
}

#[derive(Debug, Default)]
pub struct SceneNode {
    pub name: String,
    /// Index of the glTF node this was built from. `None` for synthesized
    /// nodes like the scene root and skeletons.
    pub source: Option<usize>,
    pub transform: Transform,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub mesh: Option<MeshInstance>,
    pub collider: Option<Collider>,
    pub camera: Option<Camera>,
    pub skeleton: Option<Arc<Skeleton>>,
    pub skin: Option<SkinBinding>,
    pub animation_player: Option<AnimationPlayer>,
    /// Detached alternates from `MSFT_lod`, highest detail first.
    pub lods: Vec<NodeId>,
    pub is_joint: bool,
}

impl SceneNode {
    pub fn new(name: impl Into<String>, source: Option<usize>, transform: Transform) -> Self {
        Self {
            name: name.into(),
            source,
            transform,
            ..Default::default()
        }
    }
}

#[derive(Debug, Default)]
pub struct SceneGraph {
    nodes: Arena<SceneNode>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: SceneNode) -> NodeId {
        self.nodes.insert(node)
    }

    pub fn get(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &SceneNode)> {
        self.nodes.iter()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|n| n.parent)
    }

    /// Moves `child` under `parent`, detaching it from any previous parent.
    /// Refuses to create a cycle.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) -> bool {
        if parent == child || self.is_ancestor(child, parent) {
            return false;
        }
        if !self.nodes.contains(parent) || !self.nodes.contains(child) {
            return false;
        }
        self.detach(child);
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
        true
    }

    pub fn detach(&mut self, child: NodeId) {
        let Some(parent) = self.parent(child) else {
            return;
        };
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.retain(|c| *c != child);
        }
        self.nodes[child].parent = None;
    }

    /// Removes a single node. Its children stay in the graph as orphans.
    pub fn remove(&mut self, id: NodeId) -> Option<SceneNode> {
        self.detach(id);
        let node = self.nodes.remove(id)?;
        for child in &node.children {
            if let Some(c) = self.nodes.get_mut(*child) {
                c.parent = None;
            }
        }
        Some(node)
    }

    /// True when `ancestor` is `node` or one of its parents.
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Slash separated names from below `root` down to `node`, or `None`
    /// when `node` is not under `root`.
    pub fn path(&self, root: NodeId, node: NodeId) -> Option<String> {
        let mut names = Vec::new();
        let mut current = node;
        while current != root {
            let n = self.nodes.get(current)?;
            names.push(n.name.as_str());
            current = n.parent?;
        }
        names.reverse();
        Some(names.join("/"))
    }

    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().find(|(_, n)| n.name == name).map(|(id, _)| id)
    }

    pub fn world_matrix(&self, node: NodeId) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        let mut current = Some(node);
        while let Some(id) = current {
            let Some(n) = self.nodes.get(id) else { break };
            matrix = n.transform.to_matrix() * matrix;
            current = n.parent;
        }
        matrix
    }
}

impl std::ops::Index<NodeId> for SceneGraph {
    type Output = SceneNode;

    fn index(&self, id: NodeId) -> &SceneNode {
        &self.nodes[id]
    }
}

impl std::ops::IndexMut<NodeId> for SceneGraph {
    fn index_mut(&mut self, id: NodeId) -> &mut SceneNode {
        &mut self.nodes[id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(graph: &mut SceneGraph, name: &str) -> NodeId {
        graph.insert(SceneNode::new(name, None, Transform::IDENTITY))
    }

    #[test]
    fn paths_are_relative_to_root() {
        let mut graph = SceneGraph::new();
        let root = node(&mut graph, "Scene");
        let body = node(&mut graph, "Body");
        let arm = node(&mut graph, "Arm");
        graph.attach(root, body);
        graph.attach(body, arm);

        assert_eq!(graph.path(root, arm).as_deref(), Some("Body/Arm"));
        assert_eq!(graph.path(body, arm).as_deref(), Some("Arm"));
        assert_eq!(graph.path(arm, root), None);
    }

    #[test]
    fn attach_moves_between_parents_and_rejects_cycles() {
        let mut graph = SceneGraph::new();
        let a = node(&mut graph, "A");
        let b = node(&mut graph, "B");
        let c = node(&mut graph, "C");
        assert!(graph.attach(a, c));
        assert!(graph.attach(b, c));
        assert!(graph[a].children.is_empty());
        assert_eq!(graph[b].children, vec![c]);
        assert_eq!(graph.parent(c), Some(b));

        assert!(!graph.attach(c, b));
        assert!(!graph.attach(c, c));
    }

    #[test]
    fn removing_a_node_orphans_its_children() {
        let mut graph = SceneGraph::new();
        let a = node(&mut graph, "A");
        let b = node(&mut graph, "B");
        let c = node(&mut graph, "C");
        graph.attach(a, b);
        graph.attach(b, c);

        graph.remove(b).unwrap();
        assert!(graph.get(b).is_none());
        assert!(graph[a].children.is_empty());
        assert_eq!(graph.parent(c), None);
    }

    #[test]
    fn world_matrix_accumulates_parents() {
        let mut graph = SceneGraph::new();
        let a = graph.insert(SceneNode::new(
            "A",
            None,
            Transform {
                translation: Vec3::X,
                ..Transform::IDENTITY
            },
        ));
        let b = graph.insert(SceneNode::new(
            "B",
            None,
            Transform {
                translation: Vec3::Y,
                ..Transform::IDENTITY
            },
        ));
        graph.attach(a, b);
        let world = graph.world_matrix(b);
        assert!(world
            .transform_point3(Vec3::ZERO)
            .abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-6));
    }
}
