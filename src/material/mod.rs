mod builder;
mod uniform_map;

use std::sync::Arc;

use glam::{Vec2, Vec3, Vec4};

use crate::resolver::Texture;

pub use uniform_map::{
    create_uniform_map, MetalRoughMap, MetalRoughUniforms, SpecGlossMap, SpecGlossToMetalRoughMap, SpecGlossUniforms,
    UniformMap, FALLBACK_SHADER, METAL_ROUGH_SHADER, SPEC_GLOSS_SHADER,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlphaMode {
    #[default]
    Opaque,
    Mask,
    Blend,
}

impl From<gltf::material::AlphaMode> for AlphaMode {
    fn from(mode: gltf::material::AlphaMode) -> Self {
        match mode {
            gltf::material::AlphaMode::Opaque => AlphaMode::Opaque,
            gltf::material::AlphaMode::Mask => AlphaMode::Mask,
            gltf::material::AlphaMode::Blend => AlphaMode::Blend,
        }
    }
}

/// `KHR_texture_transform` for one texture slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvTransform {
    pub offset: Vec2,
    pub rotation: f32,
    pub scale: Vec2,
    pub tex_coord: u32,
}

impl Default for UvTransform {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            rotation: 0.0,
            scale: Vec2::ONE,
            tex_coord: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TextureSlot {
    pub texture: Arc<Texture>,
    pub transform: UvTransform,
}

#[derive(Debug, Clone)]
pub enum Workflow {
    MetallicRoughness {
        metallic: f32,
        roughness: f32,
        texture: Option<TextureSlot>,
    },
    SpecularGlossiness {
        specular: Vec3,
        glossiness: f32,
        texture: Option<TextureSlot>,
    },
}

/// Engine material produced by a [`UniformMap`].
#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub shader: String,
    /// Base color, or diffuse for specular-glossiness.
    pub base_color: Vec4,
    pub base_color_texture: Option<TextureSlot>,
    pub workflow: Workflow,
    pub normal_texture: Option<TextureSlot>,
    pub normal_scale: f32,
    pub occlusion_texture: Option<TextureSlot>,
    pub occlusion_strength: f32,
    pub emissive: Vec3,
    pub emissive_texture: Option<TextureSlot>,
    pub alpha_mode: AlphaMode,
    /// Set for [`AlphaMode::Mask`].
    pub alpha_scissor_threshold: Option<f32>,
    pub transparent: bool,
    pub depth_prepass: bool,
    pub double_sided: bool,
    pub vertex_color: bool,
}

impl Material {
    pub fn textures(&self) -> impl Iterator<Item = &TextureSlot> {
        let workflow = match &self.workflow {
            Workflow::MetallicRoughness { texture, .. } | Workflow::SpecularGlossiness { texture, .. } => texture,
        };
        [
            &self.base_color_texture,
            workflow,
            &self.normal_texture,
            &self.occlusion_texture,
            &self.emissive_texture,
        ]
        .into_iter()
        .flatten()
    }
}
