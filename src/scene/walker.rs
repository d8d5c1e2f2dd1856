use std::collections::VecDeque;
use std::sync::Arc;

use fixedbitset::FixedBitSet;
use futures::future::BoxFuture;
use glam::{Quat, Vec3};
use serde_json::Value;

use super::{Camera, NodeId, SceneNode, Transform};
use crate::animation::{AnimationClip, AnimationPlayer};
use crate::context::ImportContext;
use crate::conventions::{flip_quat, flip_vec3};
use crate::error::{ImportError, Result};
use crate::mesh::{build_collider, mesh_buffers, MeshInstance};

/// `MSFT_lod` alternates of a node, most detailed first.
fn lod_ids(raw: &Value, node: usize, node_count: usize) -> Vec<usize> {
    raw["nodes"][node]["extensions"]["MSFT_lod"]["ids"]
        .as_array()
        .map(|ids| {
            ids.iter()
                .filter_map(Value::as_u64)
                .map(|id| id as usize)
                .filter(|id| *id < node_count)
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn node_transform(node: &gltf::Node) -> Transform {
    let (translation, rotation, scale) = node.transform().decomposed();
    Transform {
        translation: flip_vec3(Vec3::from(translation)),
        rotation: flip_quat(Quat::from_array(rotation)).normalize(),
        scale: Vec3::from(scale),
    }
}

fn camera(camera: &gltf::Camera) -> Camera {
    match camera.projection() {
        gltf::camera::Projection::Perspective(p) => Camera::Perspective {
            yfov: p.yfov(),
            znear: p.znear(),
            zfar: p.zfar(),
            aspect_ratio: p.aspect_ratio(),
        },
        gltf::camera::Projection::Orthographic(o) => Camera::Orthographic {
            xmag: o.xmag(),
            ymag: o.ymag(),
            znear: o.znear(),
            zfar: o.zfar(),
        },
    }
}

impl ImportContext<'_> {
    /// Breadth-first count of the nodes a scene reaches, LOD alternates
    /// included. Runs before any construction so progress has totals.
    pub(crate) fn count_progress(&mut self, scene: &gltf::Scene) {
        let document = self.document();
        let node_count = document.nodes().len();
        let mut visited = FixedBitSet::with_capacity(node_count);
        let mut queue: VecDeque<usize> = scene.nodes().map(|n| n.index()).collect();
        let mut nodes = 0;
        while let Some(index) = queue.pop_front() {
            if index >= node_count || visited.put(index) {
                continue;
            }
            nodes += 1;
            if let Some(node) = document.nodes().nth(index) {
                queue.extend(node.children().map(|c| c.index()));
            }
            queue.extend(lod_ids(self.raw(), index, node_count));
        }
        self.progress.nodes_total = nodes;
        self.progress.textures_total = document.textures().len();
        self.progress.buffers_total = document.buffers().len();
        tracing::debug!(nodes, textures = document.textures().len(), buffers = document.buffers().len(), "counted scene");
        self.report_progress();
    }

    pub(crate) fn get_cached_node(&self, index: usize) -> Result<NodeId> {
        self.cache
            .nodes
            .get(index)
            .copied()
            .ok_or(ImportError::IndexOutOfRange { kind: "node", index })
    }

    /// Builds a node and everything below it once; later calls return the
    /// cached id.
    pub(crate) fn get_node(&mut self, index: usize) -> BoxFuture<'_, Result<NodeId>> {
        Box::pin(async move {
            if let Some(id) = self.cache.nodes.get(index) {
                return Ok(*id);
            }
            self.cache.nodes.check_index(index)?;
            if self.in_progress.contains(index) {
                return Err(ImportError::CircularChildren(index));
            }
            self.check_cancelled()?;

            self.in_progress.insert(index);
            let built = self.construct_node(index).await;
            self.in_progress.set(index, false);
            let id = built?;

            self.cache.nodes.insert(index, id)?;
            self.progress.nodes_done += 1;
            self.report_progress();
            Ok(id)
        })
    }

    async fn construct_node(&mut self, index: usize) -> Result<NodeId> {
        let document = self.document();
        let node = document
            .nodes()
            .nth(index)
            .ok_or(ImportError::IndexOutOfRange { kind: "node", index })?;
        let lods = lod_ids(self.raw(), index, document.nodes().len());

        let mut buffers = Vec::new();
        let related = std::iter::once(node.clone())
            .chain(node.children())
            .chain(lods.iter().filter_map(|lod| document.nodes().nth(*lod)));
        for n in related {
            if let Some(mesh) = n.mesh() {
                buffers.extend(mesh_buffers(&mesh));
            }
        }
        self.ensure_buffers(buffers).await?;

        let id = self
            .graph
            .insert(SceneNode::new(self.node_name(index), Some(index), node_transform(&node)));
        match self.populate_node(id, &node, &lods).await {
            Ok(()) => Ok(id),
            Err(e) => {
                tracing::debug!(node = index, error = %e, "discarding partially built node");
                self.graph.remove(id);
                Err(e)
            }
        }
    }

    async fn populate_node(&mut self, id: NodeId, node: &gltf::Node<'_>, lods: &[usize]) -> Result<()> {
        for child in node.children() {
            let child_id = self.get_node(child.index()).await?;
            self.graph.attach(id, child_id);
        }

        if let Some(c) = node.camera() {
            self.graph[id].camera = Some(camera(&c));
        }

        if let Some(mesh) = node.mesh() {
            let built = self.get_mesh(mesh.index()).await?;
            let mut materials = Vec::with_capacity(built.surfaces.len());
            for surface in &built.surfaces {
                let entry = self.get_material(surface.material).await?;
                materials.push(entry.select(surface.has_vertex_colors()).clone());
            }
            let weights = node
                .weights()
                .map(<[f32]>::to_vec)
                .unwrap_or_else(|| built.default_weights.clone());
            let collider = build_collider(self.settings.collider, &built);
            let target = &mut self.graph[id];
            target.collider = collider;
            target.mesh = Some(MeshInstance {
                mesh: built,
                materials,
                weights,
            });
        }

        for &lod in lods {
            let lod_id = self.get_node(lod).await?;
            self.graph.detach(lod_id);
            self.graph[id].lods.push(lod_id);
        }

        if let Some(skin) = node.skin() {
            self.pending_skins.push((node.index(), skin.index()));
        }
        Ok(())
    }

    /// Builds the default scene, or the first one when none is declared,
    /// under a synthesized root. Returns the root and the scene's clips.
    pub(crate) async fn build_scene(&mut self) -> Result<(NodeId, Vec<Arc<AnimationClip>>)> {
        let document = self.document();
        let scene = document
            .default_scene()
            .or_else(|| document.scenes().next())
            .ok_or(ImportError::NoDefaultScene)?;
        self.count_progress(&scene);

        let name = scene.name().map(str::to_owned).unwrap_or_else(|| format!("Scene{}", scene.index()));
        let root = self.graph.insert(SceneNode::new(name, None, Transform::IDENTITY));
        for node in scene.nodes() {
            let id = self.get_node(node.index()).await?;
            if !self.joints.contains(node.index()) {
                self.graph.attach(root, id);
            }
        }
        self.checkpoint().await?;
        self.bind_skins(root).await?;

        let mut clips = Vec::new();
        if self.settings.import_animations {
            for index in 0..document.animations().len() {
                clips.push(self.get_animation(index, root).await?);
            }
        }
        if !clips.is_empty() {
            self.graph[root].animation_player = Some(AnimationPlayer { clips: clips.clone() });
        }
        Ok((root, clips))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::context::tests::{source, NoLoader};
    use crate::runtime::{CancellationToken, ImportHooks};
    use crate::settings::ImportSettings;

    fn build(json: Value) -> Result<(crate::scene::SceneGraph, NodeId)> {
        let doc = source(json);
        let settings = ImportSettings::default();
        let hooks = ImportHooks::default();
        let cancel = CancellationToken::new();
        let mut ctx = ImportContext::new(&doc, &settings, &NoLoader, &hooks, &cancel);
        let (root, _) = pollster::block_on(ctx.build_scene())?;
        Ok((std::mem::take(&mut ctx.graph), root))
    }

    #[test]
    fn lod_ids_ignore_garbage() {
        let raw = json!({ "nodes": [{ "extensions": { "MSFT_lod": { "ids": [2, "x", 9, 1] } } }] });
        assert_eq!(lod_ids(&raw, 0, 3), vec![2, 1]);
        assert!(lod_ids(&raw, 5, 3).is_empty());
    }

    #[test]
    fn children_are_built_under_their_parent() {
        let (graph, root) = build(json!({
            "asset": { "version": "2.0" },
            "scene": 0,
            "scenes": [{ "nodes": [0] }],
            "nodes": [
                { "name": "Body", "children": [1], "translation": [1.0, 2.0, 3.0] },
                { "name": "Head", "rotation": [0.0, 0.7071068, 0.0, 0.7071068] }
            ]
        }))
        .unwrap();
        let body = graph.find_by_name("Body").unwrap();
        let head = graph.find_by_name("Head").unwrap();
        assert_eq!(graph.parent(body), Some(root));
        assert_eq!(graph.path(root, head).as_deref(), Some("Body/Head"));
        assert_eq!(graph[body].transform.translation, Vec3::new(-1.0, 2.0, 3.0));
        assert!(graph[head].transform.rotation.y < 0.0);
    }

    #[test]
    fn first_scene_stands_in_for_a_missing_default() {
        let (graph, root) = build(json!({
            "asset": { "version": "2.0" },
            "scenes": [{ "name": "Only", "nodes": [0] }],
            "nodes": [{ "name": "A" }]
        }))
        .unwrap();
        assert_eq!(graph[root].name, "Only");
        assert_eq!(graph[root].children.len(), 1);
    }

    #[test]
    fn no_scenes_is_fatal() {
        let result = build(json!({ "asset": { "version": "2.0" }, "nodes": [{}] }));
        assert!(matches!(result, Err(ImportError::NoDefaultScene)));
    }

    #[test]
    fn cyclic_children_are_rejected() {
        let result = build(json!({
            "asset": { "version": "2.0" },
            "scenes": [{ "nodes": [0] }],
            "nodes": [{ "children": [1] }, { "children": [0] }]
        }));
        assert!(matches!(result, Err(ImportError::CircularChildren(0))));
    }

    #[test]
    fn cameras_and_lods_are_attached() {
        let (graph, _) = build(json!({
            "asset": { "version": "2.0" },
            "scenes": [{ "nodes": [0] }],
            "cameras": [{ "type": "perspective", "perspective": { "yfov": 0.8, "znear": 0.1 } }],
            "nodes": [
                { "name": "High", "camera": 0, "extensions": { "MSFT_lod": { "ids": [1] } } },
                { "name": "Low" }
            ]
        }))
        .unwrap();
        let high = graph.find_by_name("High").unwrap();
        let low = graph.find_by_name("Low").unwrap();
        assert_eq!(graph[high].lods, vec![low]);
        assert_eq!(graph.parent(low), None);
        assert!(matches!(
            graph[high].camera,
            Some(Camera::Perspective { yfov, zfar: None, .. }) if yfov == 0.8
        ));
    }
}
