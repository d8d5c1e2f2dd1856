use std::ops::Range;
use std::sync::Arc;

use crate::animation::AnimationStage;
use crate::error::{ImportError, Result};
use crate::material::Material;
use crate::mesh::{Mesh, PrimitiveAttributes};
use crate::resolver::{DecodedImage, Texture};
use crate::scene::NodeId;
use crate::skeleton::{Skeleton, Skin};

/// One slot per document index. A slot is filled once and never replaced.
#[derive(Debug)]
pub struct Slots<T> {
    kind: &'static str,
    entries: Vec<Option<T>>,
}

impl<T> Slots<T> {
    pub fn new(kind: &'static str, len: usize) -> Self {
        Self {
            kind,
            entries: std::iter::repeat_with(|| None).take(len).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.entries.get(index).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.entries.get_mut(index).and_then(Option::as_mut)
    }

    pub fn contains(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    pub fn check_index(&self, index: usize) -> Result<()> {
        if index < self.entries.len() {
            Ok(())
        } else {
            Err(ImportError::IndexOutOfRange {
                kind: self.kind,
                index,
            })
        }
    }

    pub fn insert(&mut self, index: usize, value: T) -> Result<&mut T> {
        self.check_index(index)?;
        let slot = &mut self.entries[index];
        if slot.is_some() {
            return Err(ImportError::SlotOccupied {
                kind: self.kind,
                index,
            });
        }
        Ok(slot.insert(value))
    }

    pub fn populated(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    fn clear(&mut self) {
        for entry in &mut self.entries {
            *entry = None;
        }
    }
}

/// A buffer's bytes. GLB chunks share the whole document stream and
/// record where the chunk starts.
#[derive(Debug, Clone)]
pub struct BufferEntry {
    pub stream: Arc<[u8]>,
    pub offset: usize,
    pub length: usize,
}

impl BufferEntry {
    pub fn new(stream: Arc<[u8]>) -> Self {
        let length = stream.len();
        Self {
            stream,
            offset: 0,
            length,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.stream[self.offset..self.offset + self.length]
    }
}

#[derive(Debug, Clone)]
pub struct ImageEntry {
    pub stream: Arc<[u8]>,
    pub range: Range<usize>,
    pub mime_type: Option<String>,
    pub decoded: Arc<DecodedImage>,
}

/// The two variants built for every material. Which one a surface uses
/// depends on whether its primitive carries vertex colors.
#[derive(Debug, Clone)]
pub struct MaterialEntry {
    pub plain: Arc<Material>,
    pub vertex_color: Arc<Material>,
}

impl MaterialEntry {
    pub fn select(&self, vertex_color: bool) -> &Arc<Material> {
        if vertex_color {
            &self.vertex_color
        } else {
            &self.plain
        }
    }
}

#[derive(Debug)]
pub struct MeshEntry {
    pub primitives: Vec<PrimitiveAttributes>,
    pub mesh: Option<Arc<Mesh>>,
}

#[derive(Debug, Clone)]
pub struct SkinEntry {
    pub skeleton_node: NodeId,
    pub skeleton: Arc<Skeleton>,
    pub skin: Arc<Skin>,
}

/// Memoized artifacts of one import run, indexed like the document arrays.
#[derive(Debug)]
pub struct AssetCache {
    pub buffers: Slots<BufferEntry>,
    pub images: Slots<ImageEntry>,
    pub textures: Slots<Arc<Texture>>,
    pub materials: Slots<MaterialEntry>,
    pub default_material: Option<MaterialEntry>,
    pub meshes: Slots<MeshEntry>,
    pub nodes: Slots<NodeId>,
    pub animations: Slots<AnimationStage>,
    pub skins: Slots<SkinEntry>,
}

impl AssetCache {
    pub fn new(document: &gltf::Document) -> Self {
        Self {
            buffers: Slots::new("buffer", document.buffers().len()),
            images: Slots::new("image", document.images().len()),
            textures: Slots::new("texture", document.textures().len()),
            materials: Slots::new("material", document.materials().len()),
            default_material: None,
            meshes: Slots::new("mesh", document.meshes().len()),
            nodes: Slots::new("node", document.nodes().len()),
            animations: Slots::new("animation", document.animations().len()),
            skins: Slots::new("skin", document.skins().len()),
        }
    }

    /// Drops everything the run built. Artifacts already handed out survive
    /// through their `Arc`s.
    pub fn dispose(&mut self) {
        tracing::debug!(
            buffers = self.buffers.populated(),
            images = self.images.populated(),
            meshes = self.meshes.populated(),
            "disposing asset cache"
        );
        self.buffers.clear();
        self.images.clear();
        self.textures.clear();
        self.materials.clear();
        self.default_material = None;
        self.meshes.clear();
        self.nodes.clear();
        self.animations.clear();
        self.skins.clear();
    }
}
