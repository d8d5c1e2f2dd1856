use std::sync::Arc;

use glam::{Vec2, Vec3, Vec4};
use serde_json::Value;

use super::{create_uniform_map, AlphaMode, TextureSlot, UniformMap, UvTransform};
use crate::cache::{MaterialEntry, Slots};
use crate::context::ImportContext;
use crate::error::{ImportError, Result};
use crate::resolver::{Texture, TextureRequest};

#[derive(Debug, Clone, Copy, PartialEq)]
struct TextureRef {
    index: usize,
    transform: UvTransform,
    linear: bool,
}

impl TextureRef {
    /// `info` is the raw texture info object, read for `KHR_texture_transform`.
    fn new(index: usize, tex_coord: u32, info: &Value, linear: bool) -> Self {
        let mut transform = UvTransform {
            tex_coord,
            ..Default::default()
        };
        let ext = &info["extensions"]["KHR_texture_transform"];
        if let Some(offset) = vec2(&ext["offset"]) {
            transform.offset = offset;
        }
        if let Some(scale) = vec2(&ext["scale"]) {
            transform.scale = scale;
        }
        if let Some(rotation) = ext["rotation"].as_f64() {
            transform.rotation = rotation as f32;
        }
        if let Some(tex_coord) = ext["texCoord"].as_u64() {
            transform.tex_coord = tex_coord as u32;
        }
        Self { index, transform, linear }
    }
}

fn vec2(value: &Value) -> Option<Vec2> {
    match value.as_array()?.as_slice() {
        [x, y] => Some(Vec2::new(x.as_f64()? as f32, y.as_f64()? as f32)),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
struct SpecGlossDesc {
    diffuse: Vec4,
    diffuse_texture: Option<TextureRef>,
    specular: Vec3,
    glossiness: f32,
    texture: Option<TextureRef>,
}

/// Everything a material needs, lifted out of the document so that
/// textures can be resolved before the uniform map is filled.
#[derive(Debug, Clone, PartialEq)]
struct MaterialDesc {
    name: String,
    base_color: Vec4,
    base_color_texture: Option<TextureRef>,
    metallic: f32,
    roughness: f32,
    metal_rough_texture: Option<TextureRef>,
    spec_gloss: Option<SpecGlossDesc>,
    normal_texture: Option<TextureRef>,
    normal_scale: f32,
    occlusion_texture: Option<TextureRef>,
    occlusion_strength: f32,
    emissive: Vec3,
    emissive_texture: Option<TextureRef>,
    alpha_mode: AlphaMode,
    alpha_cutoff: f32,
    double_sided: bool,
}

impl Default for MaterialDesc {
    fn default() -> Self {
        Self {
            name: "DefaultMaterial".to_owned(),
            base_color: Vec4::ONE,
            base_color_texture: None,
            metallic: 1.0,
            roughness: 1.0,
            metal_rough_texture: None,
            spec_gloss: None,
            normal_texture: None,
            normal_scale: 1.0,
            occlusion_texture: None,
            occlusion_strength: 1.0,
            emissive: Vec3::ZERO,
            emissive_texture: None,
            alpha_mode: AlphaMode::Opaque,
            alpha_cutoff: 0.5,
            double_sided: false,
        }
    }
}

impl MaterialDesc {
    fn from_document(material: &gltf::Material, raw: &Value) -> Self {
        let pbr = material.pbr_metallic_roughness();
        let raw_pbr = &raw["pbrMetallicRoughness"];
        let info = |info: Option<gltf::texture::Info>, raw: &Value, linear: bool| {
            info.map(|info| TextureRef::new(info.texture().index(), info.tex_coord(), raw, linear))
        };

        let spec_gloss = material.pbr_specular_glossiness().map(|sg| {
            let raw_sg = &raw["extensions"]["KHR_materials_pbrSpecularGlossiness"];
            SpecGlossDesc {
                diffuse: Vec4::from(sg.diffuse_factor()),
                diffuse_texture: info(sg.diffuse_texture(), &raw_sg["diffuseTexture"], false),
                specular: Vec3::from(sg.specular_factor()),
                glossiness: sg.glossiness_factor(),
                texture: info(sg.specular_glossiness_texture(), &raw_sg["specularGlossinessTexture"], false),
            }
        });

        let normal = material.normal_texture();
        let occlusion = material.occlusion_texture();
        Self {
            name: material
                .name()
                .map(str::to_owned)
                .unwrap_or_else(|| format!("Material{}", material.index().unwrap_or_default())),
            base_color: Vec4::from(pbr.base_color_factor()),
            base_color_texture: info(pbr.base_color_texture(), &raw_pbr["baseColorTexture"], false),
            metallic: pbr.metallic_factor(),
            roughness: pbr.roughness_factor(),
            metal_rough_texture: info(pbr.metallic_roughness_texture(), &raw_pbr["metallicRoughnessTexture"], true),
            spec_gloss,
            normal_texture: normal
                .as_ref()
                .map(|t| TextureRef::new(t.texture().index(), t.tex_coord(), &raw["normalTexture"], true)),
            normal_scale: normal.as_ref().map_or(1.0, |t| t.scale()),
            occlusion_texture: occlusion
                .as_ref()
                .map(|t| TextureRef::new(t.texture().index(), t.tex_coord(), &raw["occlusionTexture"], true)),
            occlusion_strength: occlusion.as_ref().map_or(1.0, |t| t.strength()),
            emissive: Vec3::from(material.emissive_factor()),
            emissive_texture: info(material.emissive_texture(), &raw["emissiveTexture"], false),
            alpha_mode: material.alpha_mode().into(),
            alpha_cutoff: material.alpha_cutoff().unwrap_or(0.5),
            double_sided: material.double_sided(),
        }
    }

    fn texture_refs(&self) -> impl Iterator<Item = &TextureRef> {
        let spec_gloss = self
            .spec_gloss
            .iter()
            .flat_map(|sg| [sg.diffuse_texture.as_ref(), sg.texture.as_ref()]);
        [
            self.base_color_texture.as_ref(),
            self.metal_rough_texture.as_ref(),
            self.normal_texture.as_ref(),
            self.occlusion_texture.as_ref(),
            self.emissive_texture.as_ref(),
        ]
        .into_iter()
        .chain(spec_gloss)
        .flatten()
    }

    fn texture_requests(&self) -> Vec<TextureRequest> {
        self.texture_refs()
            .map(|r| TextureRequest {
                index: r.index,
                gpu_only: true,
                linear: r.linear,
            })
            .collect()
    }

    fn apply(&self, map: &mut dyn UniformMap, textures: &Slots<Arc<Texture>>) -> Result<()> {
        let slot = |r: &Option<TextureRef>| -> Result<Option<TextureSlot>> {
            r.map(|r| {
                let texture = textures
                    .get(r.index)
                    .cloned()
                    .ok_or(ImportError::IndexOutOfRange { kind: "texture", index: r.index })?;
                Ok(TextureSlot {
                    texture,
                    transform: r.transform,
                })
            })
            .transpose()
        };

        map.set_name(&self.name);
        let spec_gloss_applied = match (&self.spec_gloss, map.as_spec_gloss()) {
            (Some(sg), Some(uniforms)) => {
                uniforms.set_specular_glossiness(
                    sg.diffuse,
                    slot(&sg.diffuse_texture)?,
                    sg.specular,
                    sg.glossiness,
                    slot(&sg.texture)?,
                );
                true
            }
            _ => false,
        };
        if !spec_gloss_applied {
            map.set_base_color(self.base_color, slot(&self.base_color_texture)?);
        }
        if let Some(uniforms) = map.as_metal_rough() {
            uniforms.set_metallic_roughness(self.metallic, self.roughness, slot(&self.metal_rough_texture)?);
        }
        map.set_normal(slot(&self.normal_texture)?, self.normal_scale);
        map.set_occlusion(slot(&self.occlusion_texture)?, self.occlusion_strength);
        map.set_emissive(self.emissive, slot(&self.emissive_texture)?);
        map.set_alpha(self.alpha_mode, self.alpha_cutoff);
        map.set_double_sided(self.double_sided);
        Ok(())
    }
}

impl ImportContext<'_> {
    /// Material for a primitive's material reference; `None` is the glTF
    /// default material. Both vertex color variants are built together.
    pub(crate) async fn get_material(&mut self, index: Option<usize>) -> Result<MaterialEntry> {
        let cached = match index {
            Some(index) => self.cache.materials.get(index),
            None => self.cache.default_material.as_ref(),
        };
        if let Some(entry) = cached {
            return Ok(entry.clone());
        }
        self.check_cancelled()?;

        let desc = match index {
            Some(index) => {
                self.cache.materials.check_index(index)?;
                let material = self
                    .document()
                    .materials()
                    .nth(index)
                    .ok_or(ImportError::IndexOutOfRange { kind: "material", index })?;
                MaterialDesc::from_document(&material, &self.raw()["materials"][index])
            }
            None => MaterialDesc::default(),
        };

        self.ensure_textures(&desc.texture_requests()).await?;

        let mut map = create_uniform_map(desc.spec_gloss.is_some(), self.settings);
        desc.apply(map.as_mut(), &self.cache.textures)?;
        let entry = MaterialEntry {
            plain: Arc::new(map.build()),
            vertex_color: Arc::new(map.with_vertex_color(true).build()),
        };
        tracing::debug!(material = ?index, shader = map.shader(), "built material");

        match index {
            Some(index) => {
                self.cache.materials.insert(index, entry.clone())?;
            }
            None => self.cache.default_material = Some(entry.clone()),
        }
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use base64::Engine;
    use image::ImageFormat;
    use serde_json::json;

    use super::*;
    use crate::context::tests::{source, NoLoader};
    use crate::material::{Workflow, SPEC_GLOSS_SHADER};
    use crate::resolver::image::tests::encode;
    use crate::runtime::{CancellationToken, ImportHooks};
    use crate::settings::{ImportSettings, ShaderModel};

    fn png_uri() -> String {
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(encode(ImageFormat::Png))
        )
    }

    fn textured_document(material: Value) -> Value {
        json!({
            "asset": { "version": "2.0" },
            "images": [{ "uri": png_uri() }],
            "textures": [{ "source": 0 }],
            "materials": [material]
        })
    }

    fn build(json: Value, settings: ImportSettings, index: Option<usize>) -> MaterialEntry {
        let doc = source(json);
        let hooks = ImportHooks::default();
        let cancel = CancellationToken::new();
        let mut ctx = ImportContext::new(&doc, &settings, &NoLoader, &hooks, &cancel);
        pollster::block_on(ctx.get_material(index)).unwrap()
    }

    #[test]
    fn texture_transform_is_read_from_the_texture_info() {
        let raw = json!({
            "index": 0,
            "extensions": { "KHR_texture_transform": { "offset": [0.5, 0.25], "rotation": 1.5, "scale": [2.0, 2.0], "texCoord": 1 } }
        });
        let r = TextureRef::new(0, 0, &raw, false);
        assert_eq!(r.transform.offset, Vec2::new(0.5, 0.25));
        assert_eq!(r.transform.scale, Vec2::splat(2.0));
        assert_eq!(r.transform.rotation, 1.5);
        assert_eq!(r.transform.tex_coord, 1);

        let plain = TextureRef::new(0, 1, &json!({ "index": 0 }), false);
        assert_eq!(plain.transform, UvTransform { tex_coord: 1, ..Default::default() });
    }

    #[test]
    fn default_material_uses_gltf_defaults() {
        let entry = build(json!({ "asset": { "version": "2.0" } }), ImportSettings::default(), None);
        assert_eq!(entry.plain.base_color, Vec4::ONE);
        assert!(matches!(
            entry.plain.workflow,
            Workflow::MetallicRoughness { metallic, roughness, texture: None } if metallic == 1.0 && roughness == 1.0
        ));
        assert!(!entry.plain.vertex_color);
        assert!(entry.vertex_color.vertex_color);
    }

    #[test]
    fn textures_are_resolved_once_and_shared() {
        let json = textured_document(json!({
            "pbrMetallicRoughness": {
                "baseColorTexture": { "index": 0 },
                "metallicRoughnessTexture": { "index": 0 }
            },
            "emissiveTexture": { "index": 0 },
            "alphaMode": "MASK",
            "alphaCutoff": 0.25,
            "doubleSided": true
        }));
        let entry = build(json, ImportSettings::default(), Some(0));
        let material = &entry.plain;
        let base = &material.base_color_texture.as_ref().unwrap().texture;
        let emissive = &material.emissive_texture.as_ref().unwrap().texture;
        assert!(Arc::ptr_eq(base, emissive));
        assert!(!base.linear);
        assert!(base.gpu_only);
        assert_eq!(material.alpha_scissor_threshold, Some(0.25));
        assert!(material.double_sided);
        assert_eq!(material.textures().count(), 3);
    }

    #[test]
    fn spec_gloss_materials_pick_the_spec_gloss_mapper() {
        let json = json!({
            "asset": { "version": "2.0" },
            "extensionsUsed": ["KHR_materials_pbrSpecularGlossiness"],
            "materials": [{
                "extensions": { "KHR_materials_pbrSpecularGlossiness": {
                    "diffuseFactor": [0.5, 0.5, 0.5, 1.0],
                    "specularFactor": [0.04, 0.04, 0.04],
                    "glossinessFactor": 0.4
                } }
            }]
        });
        let native = build(json.clone(), ImportSettings::default(), Some(0));
        assert_eq!(native.plain.shader, SPEC_GLOSS_SHADER);
        assert_eq!(native.plain.base_color, Vec4::new(0.5, 0.5, 0.5, 1.0));
        assert!(matches!(native.plain.workflow, Workflow::SpecularGlossiness { glossiness, .. } if glossiness == 0.4));

        let fallback = build(
            json,
            ImportSettings {
                shader_model: ShaderModel::Fallback,
                ..Default::default()
            },
            Some(0),
        );
        assert!(matches!(
            fallback.plain.workflow,
            Workflow::MetallicRoughness { roughness, .. } if (roughness - 0.6).abs() < 1e-6
        ));
    }

    #[test]
    fn missing_material_index_is_an_error() {
        let doc = source(json!({ "asset": { "version": "2.0" } }));
        let settings = ImportSettings::default();
        let hooks = ImportHooks::default();
        let cancel = CancellationToken::new();
        let mut ctx = ImportContext::new(&doc, &settings, &NoLoader, &hooks, &cancel);
        assert!(matches!(
            pollster::block_on(ctx.get_material(Some(3))),
            Err(ImportError::IndexOutOfRange { kind: "material", index: 3 })
        ));
    }
}
