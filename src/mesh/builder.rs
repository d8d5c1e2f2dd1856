use std::collections::BTreeMap;
use std::sync::Arc;

use glam::{Vec2, Vec4};

use super::morph::blend_shapes;
use super::{
    generate_flat_normals_for_mesh, generate_tangents_for_mesh, Mesh, PrimitiveAttributes, Surface, Topology,
};
use crate::cache::{BufferEntry, MeshEntry, Slots};
use crate::context::ImportContext;
use crate::conventions::{
    flip_tangent_slice, flip_uv_slice, flip_vec3_slice, normalize_weight_slice, rewind_triangles,
};
use crate::decoder::{decode, AttributeData, AttributeKind};
use crate::error::{ImportError, Result};
use crate::job_system::run_jobs;
use crate::resolver::{accessor_buffers, raw_accessor};

fn semantic_kind(semantic: &gltf::Semantic) -> Option<(String, AttributeKind)> {
    use gltf::Semantic;
    Some(match semantic {
        Semantic::Positions => ("POSITION".to_owned(), AttributeKind::Position),
        Semantic::Normals => ("NORMAL".to_owned(), AttributeKind::Normal),
        Semantic::Tangents => ("TANGENT".to_owned(), AttributeKind::Tangent),
        Semantic::Colors(n) => (format!("COLOR_{n}"), AttributeKind::Color),
        Semantic::TexCoords(n) => (format!("TEXCOORD_{n}"), AttributeKind::TexCoord),
        Semantic::Joints(n) => (format!("JOINTS_{n}"), AttributeKind::Joints),
        Semantic::Weights(n) => (format!("WEIGHTS_{n}"), AttributeKind::Weights),
        #[allow(unreachable_patterns)]
        _ => return None,
    })
}

fn topology(mesh: usize, primitive: usize, mode: gltf::mesh::Mode) -> Result<Topology> {
    use gltf::mesh::Mode;
    match mode {
        Mode::Points => Ok(Topology::Points),
        Mode::Lines => Ok(Topology::Lines),
        Mode::LineStrip => Ok(Topology::LineStrip),
        Mode::Triangles => Ok(Topology::Triangles),
        Mode::TriangleStrip => Ok(Topology::TriangleStrip),
        Mode::LineLoop | Mode::TriangleFan => Err(ImportError::UnsupportedTopology { mesh, primitive, mode }),
    }
}

/// Every buffer a mesh reads, morph targets included.
pub(crate) fn mesh_buffers(mesh: &gltf::Mesh) -> Vec<usize> {
    let mut buffers = Vec::new();
    for primitive in mesh.primitives() {
        for (_, accessor) in primitive.attributes() {
            buffers.extend(accessor_buffers(&accessor));
        }
        if let Some(indices) = primitive.indices() {
            buffers.extend(accessor_buffers(&indices));
        }
        for target in primitive.morph_targets() {
            for accessor in [target.positions(), target.normals(), target.tangents()].into_iter().flatten() {
                buffers.extend(accessor_buffers(&accessor));
            }
        }
    }
    buffers
}

fn decode_accessor(
    buffers: &Slots<BufferEntry>,
    accessor: &gltf::Accessor,
    kind: AttributeKind,
    context: impl FnOnce() -> String,
) -> Result<AttributeData> {
    let raw = raw_accessor(buffers, accessor)?;
    decode(&raw, kind).map_err(|e| ImportError::decode(context(), e))
}

fn decode_primitive(
    buffers: &Slots<BufferEntry>,
    mesh: usize,
    primitive: &gltf::Primitive,
) -> Result<PrimitiveAttributes> {
    let index = primitive.index();
    let mut attributes = BTreeMap::new();
    for (semantic, accessor) in primitive.attributes() {
        let Some((name, kind)) = semantic_kind(&semantic) else {
            tracing::debug!(mesh, primitive = index, "skipping unknown attribute {semantic:?}");
            continue;
        };
        let data = decode_accessor(buffers, &accessor, kind, || {
            format!("mesh {mesh} primitive {index} attribute {name}")
        })?;
        attributes.insert(name, data);
    }

    let indices = match primitive.indices() {
        Some(accessor) => match decode_accessor(buffers, &accessor, AttributeKind::Indices, || {
            format!("mesh {mesh} primitive {index} indices")
        })? {
            AttributeData::Indices(indices) => Some(indices),
            _ => None,
        },
        None => None,
    };

    let mut targets = Vec::new();
    for (t, target) in primitive.morph_targets().enumerate() {
        let mut deltas = BTreeMap::new();
        for (name, accessor) in [
            ("POSITION", target.positions()),
            ("NORMAL", target.normals()),
            ("TANGENT", target.tangents()),
        ] {
            let Some(accessor) = accessor else { continue };
            // morph tangent deltas are vec3
            let data = decode_accessor(buffers, &accessor, AttributeKind::Normal, || {
                format!("mesh {mesh} primitive {index} target {t} {name}")
            })?;
            deltas.insert(name.to_owned(), data);
        }
        targets.push(deltas);
    }

    Ok(PrimitiveAttributes {
        index,
        mode: primitive.mode(),
        material: primitive.material().index(),
        attributes,
        indices,
        targets,
    })
}

/// Converts one decoded primitive into an engine surface: handedness and
/// UV flips, rewound triangles, normalized weights and generated normals
/// and tangents where they are missing.
pub fn assemble_surface(mesh: usize, primitive: &PrimitiveAttributes, generate_tangents: bool) -> Result<Surface> {
    let topology = topology(mesh, primitive.index, primitive.mode)?;
    let mut positions = primitive
        .vec3("POSITION")
        .ok_or(ImportError::MissingPositions { mesh, primitive: primitive.index })?
        .to_vec();
    flip_vec3_slice(&mut positions);
    let vertex_count = positions.len();

    let mut indices = match &primitive.indices {
        Some(indices) => indices.clone(),
        None => (0..vertex_count as u32).collect(),
    };
    if let Some(&bad) = indices.iter().find(|&&i| i as usize >= vertex_count) {
        return Err(ImportError::IndexOutOfRange { kind: "vertex", index: bad as usize });
    }
    if topology == Topology::Triangles {
        rewind_triangles(&mut indices);
    }

    let mut normals = primitive.vec3("NORMAL").map(<[_]>::to_vec);
    if let Some(normals) = &mut normals {
        flip_vec3_slice(normals);
    }
    let mut tangents = primitive.vec4("TANGENT").map(<[_]>::to_vec);
    if let Some(tangents) = &mut tangents {
        flip_tangent_slice(tangents);
    }
    let uv = |name: &str| {
        primitive.vec2(name).map(|uvs| {
            let mut uvs = uvs.to_vec();
            flip_uv_slice(&mut uvs);
            uvs
        })
    };
    let uv0 = uv("TEXCOORD_0");
    let uv1 = uv("TEXCOORD_1");
    let colors = primitive.vec4("COLOR_0").map(<[_]>::to_vec);
    let joints = primitive.joints("JOINTS_0").map(<[_]>::to_vec);
    let mut weights = primitive.vec4("WEIGHTS_0").map(<[_]>::to_vec);
    if let Some(weights) = &mut weights {
        normalize_weight_slice(weights);
    }

    if topology == Topology::Triangles {
        if normals.is_none() {
            tracing::debug!(mesh, primitive = primitive.index, "generating flat normals");
            normals = Some(
                generate_flat_normals_for_mesh(&positions, &indices)
                    .map_err(|message| ImportError::Tangents { mesh, message })?,
            );
        }
        if tangents.is_none() && generate_tangents {
            if let (Some(normals), Some(uv0)) = (&normals, &uv0) {
                tangents = Some(
                    generate_tangents_for_mesh(&positions, normals, uv0, &indices)
                        .map_err(|message| ImportError::Tangents { mesh, message })?,
                );
            }
        }
    }

    Ok(Surface {
        topology,
        positions,
        normals,
        tangents,
        uv0,
        uv1,
        colors,
        joints,
        weights,
        indices,
        blend_shapes: Vec::new(),
        material: primitive.material,
    })
}

/// Gives every surface the same vertex layout, filling attributes only some
/// surfaces carry with neutral values.
fn harmonize_layout(surfaces: &mut [Surface]) {
    fn fill<T: Clone>(get: impl Fn(&mut Surface) -> &mut Option<Vec<T>>, value: T, surfaces: &mut [Surface]) {
        if !surfaces.iter_mut().any(|s| get(s).is_some()) {
            return;
        }
        for surface in surfaces.iter_mut() {
            let count = surface.positions.len();
            get(surface).get_or_insert_with(|| vec![value.clone(); count]);
        }
    }
    fill(|s| &mut s.normals, glam::Vec3::Y, surfaces);
    fill(|s| &mut s.tangents, Vec4::new(1.0, 0.0, 0.0, 1.0), surfaces);
    fill(|s| &mut s.uv0, Vec2::ZERO, surfaces);
    fill(|s| &mut s.uv1, Vec2::ZERO, surfaces);
    fill(|s| &mut s.colors, Vec4::ONE, surfaces);
    fill(|s| &mut s.joints, [0u16; 4], surfaces);
    fill(|s| &mut s.weights, Vec4::X, surfaces);
}

impl ImportContext<'_> {
    pub(crate) async fn get_mesh(&mut self, index: usize) -> Result<Arc<Mesh>> {
        if let Some(mesh) = self.cache.meshes.get(index).and_then(|entry| entry.mesh.clone()) {
            return Ok(mesh);
        }
        self.construct_mesh_attributes(index).await?;
        self.build_mesh(index).await
    }

    /// Decodes every primitive of a mesh into the cache.
    pub(crate) async fn construct_mesh_attributes(&mut self, index: usize) -> Result<()> {
        if self.cache.meshes.contains(index) {
            return Ok(());
        }
        self.cache.meshes.check_index(index)?;
        self.checkpoint().await?;

        let mesh = self
            .document()
            .meshes()
            .nth(index)
            .ok_or(ImportError::IndexOutOfRange { kind: "mesh", index })?;
        self.ensure_buffers(mesh_buffers(&mesh)).await?;

        let buffers = &self.cache.buffers;
        let primitives: Vec<gltf::Primitive> = mesh.primitives().collect();
        let decoded = run_jobs(primitives, self.threaded(), |primitive| {
            decode_primitive(buffers, index, &primitive)
        })?;

        tracing::debug!(mesh = index, primitives = decoded.len(), "constructed mesh attributes");
        self.cache.meshes.insert(
            index,
            MeshEntry {
                primitives: decoded,
                mesh: None,
            },
        )?;
        Ok(())
    }

    /// Assembles the engine mesh from attributes constructed earlier.
    pub(crate) async fn build_mesh(&mut self, index: usize) -> Result<Arc<Mesh>> {
        match self.cache.meshes.get(index) {
            None => return Err(ImportError::MeshAttributesNotConstructed { mesh: index }),
            Some(MeshEntry { mesh: Some(mesh), .. }) => return Ok(mesh.clone()),
            Some(_) => {}
        }
        self.checkpoint().await?;

        let document_mesh = self
            .document()
            .meshes()
            .nth(index)
            .ok_or(ImportError::IndexOutOfRange { kind: "mesh", index })?;
        let threaded = self.threaded();
        let generate_tangents = self.settings.generate_tangents;

        let entry = self
            .cache
            .meshes
            .get(index)
            .ok_or(ImportError::MeshAttributesNotConstructed { mesh: index })?;
        let target_count = entry.primitives.iter().map(|p| p.targets.len()).max().unwrap_or(0);
        let surfaces = run_jobs(entry.primitives.iter().collect(), threaded, |primitive| {
            assemble_surface(index, primitive, generate_tangents)
        })?;

        self.checkpoint().await?;

        let names = self.blend_shape_names(index, target_count);
        let entry = self
            .cache
            .meshes
            .get(index)
            .ok_or(ImportError::MeshAttributesNotConstructed { mesh: index })?;
        let mut surfaces = run_jobs(
            surfaces.into_iter().zip(&entry.primitives).collect(),
            threaded,
            |(mut surface, primitive)| {
                surface.blend_shapes = blend_shapes(&surface, &primitive.targets, &names);
                Ok(surface)
            },
        )?;
        harmonize_layout(&mut surfaces);

        let mut default_weights = document_mesh.weights().map(<[f32]>::to_vec).unwrap_or_default();
        default_weights.resize(target_count, 0.0);
        let mesh = Arc::new(Mesh {
            index,
            name: document_mesh
                .name()
                .map(str::to_owned)
                .unwrap_or_else(|| format!("Mesh{index}")),
            surfaces,
            blend_shape_names: names,
            default_weights,
        });

        self.statistics.triangles += mesh.triangle_count();
        self.statistics.vertices += mesh.vertex_count();
        tracing::debug!(
            mesh = index,
            triangles = mesh.triangle_count(),
            vertices = mesh.vertex_count(),
            "built mesh"
        );

        if let Some(entry) = self.cache.meshes.get_mut(index) {
            entry.mesh = Some(mesh.clone());
        }
        self.report_progress();
        Ok(mesh)
    }

    /// Names from `extras.targetNames`, falling back to `target{n}`.
    pub(crate) fn blend_shape_names(&self, mesh: usize, count: usize) -> Vec<String> {
        let declared = self.raw()["meshes"][mesh]["extras"]["targetNames"].as_array();
        (0..count)
            .map(|t| {
                declared
                    .and_then(|names| names.get(t))
                    .and_then(|name| name.as_str())
                    .map(str::to_owned)
                    .unwrap_or_else(|| format!("target{t}"))
            })
            .collect()
    }
}
