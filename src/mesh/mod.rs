mod builder;
mod collider;
mod morph;
mod normals;
mod tangents;

use std::collections::BTreeMap;
use std::sync::Arc;

use glam::{Vec2, Vec3, Vec4};

use crate::decoder::AttributeData;
use crate::material::Material;

pub use builder::assemble_surface;
pub(crate) use builder::mesh_buffers;
pub use collider::{build_collider, Aabb, Collider};
pub use morph::blend_deltas;
pub use normals::generate_flat_normals_for_mesh;
pub use tangents::generate_tangents_for_mesh;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    Points,
    Lines,
    LineStrip,
    Triangles,
    TriangleStrip,
}

/// Decoded, unconverted data of one primitive as read from the document.
#[derive(Debug, Clone)]
pub struct PrimitiveAttributes {
    pub index: usize,
    pub mode: gltf::mesh::Mode,
    pub material: Option<usize>,
    pub attributes: BTreeMap<String, AttributeData>,
    pub indices: Option<Vec<u32>>,
    pub targets: Vec<BTreeMap<String, AttributeData>>,
}

impl PrimitiveAttributes {
    pub fn vec2(&self, name: &str) -> Option<&[Vec2]> {
        self.attributes.get(name).and_then(AttributeData::as_vec2)
    }

    pub fn vec3(&self, name: &str) -> Option<&[Vec3]> {
        self.attributes.get(name).and_then(AttributeData::as_vec3)
    }

    pub fn vec4(&self, name: &str) -> Option<&[Vec4]> {
        self.attributes.get(name).and_then(AttributeData::as_vec4)
    }

    pub fn joints(&self, name: &str) -> Option<&[[u16; 4]]> {
        self.attributes.get(name).and_then(AttributeData::as_joints)
    }
}

/// An absolute-valued morph frame: base attributes with the target's
/// deltas already added.
#[derive(Debug, Clone, PartialEq)]
pub struct BlendShape {
    pub name: String,
    pub positions: Vec<Vec3>,
    pub normals: Option<Vec<Vec3>>,
    pub tangents: Option<Vec<Vec4>>,
}

/// One draw call worth of converted geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    pub topology: Topology,
    pub positions: Vec<Vec3>,
    pub normals: Option<Vec<Vec3>>,
    pub tangents: Option<Vec<Vec4>>,
    pub uv0: Option<Vec<Vec2>>,
    pub uv1: Option<Vec<Vec2>>,
    pub colors: Option<Vec<Vec4>>,
    pub joints: Option<Vec<[u16; 4]>>,
    pub weights: Option<Vec<Vec4>>,
    pub indices: Vec<u32>,
    pub blend_shapes: Vec<BlendShape>,
    /// Document material index, `None` for the default material.
    pub material: Option<usize>,
}

impl Surface {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        match self.topology {
            Topology::Triangles => self.indices.len() / 3,
            Topology::TriangleStrip => self.indices.len().saturating_sub(2),
            Topology::Points | Topology::Lines | Topology::LineStrip => 0,
        }
    }

    pub fn has_vertex_colors(&self) -> bool {
        self.colors.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub index: usize,
    pub name: String,
    pub surfaces: Vec<Surface>,
    pub blend_shape_names: Vec<String>,
    pub default_weights: Vec<f32>,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.surfaces.iter().map(Surface::vertex_count).sum()
    }

    pub fn triangle_count(&self) -> usize {
        self.surfaces.iter().map(Surface::triangle_count).sum()
    }

    pub fn aabb(&self) -> Option<Aabb> {
        let boxes: Vec<Aabb> = self
            .surfaces
            .iter()
            .filter_map(|s| Aabb::from_points(&s.positions))
            .collect();
        Aabb::fold(&boxes)
    }
}

/// A mesh placed on a node, with one material per surface.
#[derive(Debug, Clone)]
pub struct MeshInstance {
    pub mesh: Arc<Mesh>,
    pub materials: Vec<Arc<Material>>,
    pub weights: Vec<f32>,
}
