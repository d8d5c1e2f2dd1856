use glam::{Vec3, Vec4};

use super::{AlphaMode, Material, TextureSlot, Workflow};
use crate::settings::{ImportSettings, ShaderModel};

pub const METAL_ROUGH_SHADER: &str = "gltf/metallic_roughness";
pub const SPEC_GLOSS_SHADER: &str = "gltf/specular_glossiness";
pub const FALLBACK_SHADER: &str = "standard";

const DIELECTRIC_SPECULAR: f32 = 0.04;

/// Uniforms every mapper shares regardless of workflow.
#[derive(Debug, Clone)]
pub struct StandardUniforms {
    pub name: String,
    pub shader: String,
    pub base_color: Vec4,
    pub base_color_texture: Option<TextureSlot>,
    pub normal_texture: Option<TextureSlot>,
    pub normal_scale: f32,
    pub occlusion_texture: Option<TextureSlot>,
    pub occlusion_strength: f32,
    pub emissive: Vec3,
    pub emissive_texture: Option<TextureSlot>,
    pub alpha_mode: AlphaMode,
    pub alpha_cutoff: f32,
    pub double_sided: bool,
    pub vertex_color: bool,
}

impl StandardUniforms {
    fn new(shader: &str) -> Self {
        Self {
            name: String::new(),
            shader: shader.to_owned(),
            base_color: Vec4::ONE,
            base_color_texture: None,
            normal_texture: None,
            normal_scale: 1.0,
            occlusion_texture: None,
            occlusion_strength: 1.0,
            emissive: Vec3::ZERO,
            emissive_texture: None,
            alpha_mode: AlphaMode::Opaque,
            alpha_cutoff: 0.5,
            double_sided: false,
            vertex_color: false,
        }
    }
}

pub trait MetalRoughUniforms {
    fn set_metallic_roughness(&mut self, metallic: f32, roughness: f32, texture: Option<TextureSlot>);
}

pub trait SpecGlossUniforms {
    fn set_specular_glossiness(
        &mut self,
        diffuse: Vec4,
        diffuse_texture: Option<TextureSlot>,
        specular: Vec3,
        glossiness: f32,
        texture: Option<TextureSlot>,
    );
}

/// Maps document material parameters onto one engine shader. Workflow
/// specific parameters are reached through the capability queries.
pub trait UniformMap: Send + Sync + std::fmt::Debug {
    fn uniforms(&self) -> &StandardUniforms;
    fn uniforms_mut(&mut self) -> &mut StandardUniforms;
    fn workflow(&self) -> Workflow;
    fn box_clone(&self) -> Box<dyn UniformMap>;

    fn as_metal_rough(&mut self) -> Option<&mut dyn MetalRoughUniforms> {
        None
    }

    fn as_spec_gloss(&mut self) -> Option<&mut dyn SpecGlossUniforms> {
        None
    }

    fn shader(&self) -> &str {
        &self.uniforms().shader
    }

    fn set_name(&mut self, name: &str) {
        self.uniforms_mut().name = name.to_owned();
    }

    fn set_base_color(&mut self, factor: Vec4, texture: Option<TextureSlot>) {
        let u = self.uniforms_mut();
        u.base_color = factor;
        u.base_color_texture = texture;
    }

    fn set_normal(&mut self, texture: Option<TextureSlot>, scale: f32) {
        let u = self.uniforms_mut();
        u.normal_texture = texture;
        u.normal_scale = scale;
    }

    fn set_occlusion(&mut self, texture: Option<TextureSlot>, strength: f32) {
        let u = self.uniforms_mut();
        u.occlusion_texture = texture;
        u.occlusion_strength = strength;
    }

    fn set_emissive(&mut self, factor: Vec3, texture: Option<TextureSlot>) {
        let u = self.uniforms_mut();
        u.emissive = factor;
        u.emissive_texture = texture;
    }

    fn set_alpha(&mut self, mode: AlphaMode, cutoff: f32) {
        let u = self.uniforms_mut();
        u.alpha_mode = mode;
        u.alpha_cutoff = cutoff;
    }

    fn set_double_sided(&mut self, double_sided: bool) {
        self.uniforms_mut().double_sided = double_sided;
    }

    /// Copy of this mapper with only the vertex color toggle changed.
    fn with_vertex_color(&self, enabled: bool) -> Box<dyn UniformMap> {
        let mut map = self.box_clone();
        map.uniforms_mut().vertex_color = enabled;
        map
    }

    fn build(&self) -> Material {
        let u = self.uniforms();
        Material {
            name: u.name.clone(),
            shader: u.shader.clone(),
            base_color: u.base_color,
            base_color_texture: u.base_color_texture.clone(),
            workflow: self.workflow(),
            normal_texture: u.normal_texture.clone(),
            normal_scale: u.normal_scale,
            occlusion_texture: u.occlusion_texture.clone(),
            occlusion_strength: u.occlusion_strength,
            emissive: u.emissive,
            emissive_texture: u.emissive_texture.clone(),
            alpha_mode: u.alpha_mode,
            alpha_scissor_threshold: (u.alpha_mode == AlphaMode::Mask).then_some(u.alpha_cutoff),
            transparent: u.alpha_mode == AlphaMode::Blend,
            depth_prepass: u.alpha_mode == AlphaMode::Blend,
            double_sided: u.double_sided,
            vertex_color: u.vertex_color,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetalRoughMap {
    uniforms: StandardUniforms,
    metallic: f32,
    roughness: f32,
    texture: Option<TextureSlot>,
}

impl MetalRoughMap {
    pub fn new(shader: &str) -> Self {
        Self {
            uniforms: StandardUniforms::new(shader),
            metallic: 1.0,
            roughness: 1.0,
            texture: None,
        }
    }
}

impl MetalRoughUniforms for MetalRoughMap {
    fn set_metallic_roughness(&mut self, metallic: f32, roughness: f32, texture: Option<TextureSlot>) {
        self.metallic = metallic;
        self.roughness = roughness;
        self.texture = texture;
    }
}

impl UniformMap for MetalRoughMap {
    fn uniforms(&self) -> &StandardUniforms {
        &self.uniforms
    }

    fn uniforms_mut(&mut self) -> &mut StandardUniforms {
        &mut self.uniforms
    }

    fn workflow(&self) -> Workflow {
        Workflow::MetallicRoughness {
            metallic: self.metallic,
            roughness: self.roughness,
            texture: self.texture.clone(),
        }
    }

    fn box_clone(&self) -> Box<dyn UniformMap> {
        Box::new(self.clone())
    }

    fn as_metal_rough(&mut self) -> Option<&mut dyn MetalRoughUniforms> {
        Some(self)
    }
}

#[derive(Debug, Clone)]
pub struct SpecGlossMap {
    uniforms: StandardUniforms,
    specular: Vec3,
    glossiness: f32,
    texture: Option<TextureSlot>,
}

impl SpecGlossMap {
    pub fn new(shader: &str) -> Self {
        Self {
            uniforms: StandardUniforms::new(shader),
            specular: Vec3::ONE,
            glossiness: 1.0,
            texture: None,
        }
    }
}

impl SpecGlossUniforms for SpecGlossMap {
    fn set_specular_glossiness(
        &mut self,
        diffuse: Vec4,
        diffuse_texture: Option<TextureSlot>,
        specular: Vec3,
        glossiness: f32,
        texture: Option<TextureSlot>,
    ) {
        self.set_base_color(diffuse, diffuse_texture);
        self.specular = specular;
        self.glossiness = glossiness;
        self.texture = texture;
    }
}

impl UniformMap for SpecGlossMap {
    fn uniforms(&self) -> &StandardUniforms {
        &self.uniforms
    }

    fn uniforms_mut(&mut self) -> &mut StandardUniforms {
        &mut self.uniforms
    }

    fn workflow(&self) -> Workflow {
        Workflow::SpecularGlossiness {
            specular: self.specular,
            glossiness: self.glossiness,
            texture: self.texture.clone(),
        }
    }

    fn box_clone(&self) -> Box<dyn UniformMap> {
        Box::new(self.clone())
    }

    fn as_spec_gloss(&mut self) -> Option<&mut dyn SpecGlossUniforms> {
        Some(self)
    }
}

/// Takes specular-glossiness input and converts it to factors for a
/// metal-roughness shader. Per-pixel specular-glossiness maps can't be
/// converted without baking and are dropped.
#[derive(Debug, Clone)]
pub struct SpecGlossToMetalRoughMap {
    uniforms: StandardUniforms,
    metallic: f32,
    roughness: f32,
}

impl SpecGlossToMetalRoughMap {
    pub fn new(shader: &str) -> Self {
        Self {
            uniforms: StandardUniforms::new(shader),
            metallic: 0.0,
            roughness: 1.0,
        }
    }
}

fn perceived_brightness(c: Vec3) -> f32 {
    (0.299 * c.x * c.x + 0.587 * c.y * c.y + 0.114 * c.z * c.z).sqrt()
}

fn solve_metallic(diffuse: f32, specular: f32, one_minus_specular_strength: f32) -> f32 {
    if specular < DIELECTRIC_SPECULAR {
        return 0.0;
    }
    let a = DIELECTRIC_SPECULAR;
    let b = diffuse * one_minus_specular_strength / (1.0 - DIELECTRIC_SPECULAR) + specular - 2.0 * DIELECTRIC_SPECULAR;
    let c = DIELECTRIC_SPECULAR - specular;
    let d = (b * b - 4.0 * a * c).max(0.0);
    ((-b + d.sqrt()) / (2.0 * a)).clamp(0.0, 1.0)
}

/// Returns (base color, metallic) for a specular-glossiness pair.
pub(crate) fn spec_gloss_to_metal_rough(diffuse: Vec4, specular: Vec3) -> (Vec4, f32) {
    let one_minus_specular_strength = 1.0 - specular.max_element();
    let metallic = solve_metallic(
        perceived_brightness(diffuse.truncate()),
        perceived_brightness(specular),
        one_minus_specular_strength,
    );
    let from_diffuse = diffuse.truncate() * one_minus_specular_strength
        / (1.0 - DIELECTRIC_SPECULAR)
        / (1.0 - metallic).max(f32::EPSILON);
    let from_specular = (specular - Vec3::splat(DIELECTRIC_SPECULAR * (1.0 - metallic))) / metallic.max(f32::EPSILON);
    let base = from_diffuse
        .lerp(from_specular, metallic * metallic)
        .clamp(Vec3::ZERO, Vec3::ONE);
    (base.extend(diffuse.w), metallic)
}

impl SpecGlossUniforms for SpecGlossToMetalRoughMap {
    fn set_specular_glossiness(
        &mut self,
        diffuse: Vec4,
        diffuse_texture: Option<TextureSlot>,
        specular: Vec3,
        glossiness: f32,
        texture: Option<TextureSlot>,
    ) {
        let (base, metallic) = spec_gloss_to_metal_rough(diffuse, specular);
        self.set_base_color(base, diffuse_texture);
        self.metallic = metallic;
        self.roughness = 1.0 - glossiness;
        if let Some(slot) = texture {
            tracing::debug!(texture = slot.texture.index, "dropping specular-glossiness texture on fallback shader");
        }
    }
}

impl UniformMap for SpecGlossToMetalRoughMap {
    fn uniforms(&self) -> &StandardUniforms {
        &self.uniforms
    }

    fn uniforms_mut(&mut self) -> &mut StandardUniforms {
        &mut self.uniforms
    }

    fn workflow(&self) -> Workflow {
        Workflow::MetallicRoughness {
            metallic: self.metallic,
            roughness: self.roughness,
            texture: None,
        }
    }

    fn box_clone(&self) -> Box<dyn UniformMap> {
        Box::new(self.clone())
    }

    fn as_spec_gloss(&mut self) -> Option<&mut dyn SpecGlossUniforms> {
        Some(self)
    }
}

/// Picks the mapper for a material. `custom_shader` replaces the shader
/// name in every branch.
pub fn create_uniform_map(spec_gloss: bool, settings: &ImportSettings) -> Box<dyn UniformMap> {
    let mut map: Box<dyn UniformMap> = match (spec_gloss, settings.shader_model) {
        (true, ShaderModel::Native) => Box::new(SpecGlossMap::new(SPEC_GLOSS_SHADER)),
        (true, ShaderModel::Fallback) => Box::new(SpecGlossToMetalRoughMap::new(FALLBACK_SHADER)),
        (false, ShaderModel::Native) => Box::new(MetalRoughMap::new(METAL_ROUGH_SHADER)),
        (false, ShaderModel::Fallback) => Box::new(MetalRoughMap::new(FALLBACK_SHADER)),
    };
    if let Some(shader) = &settings.custom_shader {
        map.uniforms_mut().shader = shader.clone();
    }
    map
}
