use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use super::image::DecodedImage;
use crate::context::ImportContext;
use crate::error::{ImportError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FilterMode {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MipmapFilterMode {
    None,
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WrapMode {
    Repeat,
    MirroredRepeat,
    ClampToEdge,
}

/// Sampler state carried next to the texture. Engines that bind samplers
/// with the texture object may ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SamplerInfo {
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    pub mipmap_filter: MipmapFilterMode,
    pub wrap_u: WrapMode,
    pub wrap_v: WrapMode,
}

impl Default for SamplerInfo {
    fn default() -> Self {
        Self {
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            mipmap_filter: MipmapFilterMode::None,
            wrap_u: WrapMode::Repeat,
            wrap_v: WrapMode::Repeat,
        }
    }
}

impl From<gltf::texture::Sampler<'_>> for SamplerInfo {
    fn from(sampler: gltf::texture::Sampler<'_>) -> Self {
        use gltf::texture::{MagFilter, MinFilter, WrappingMode};

        let mag_filter = match sampler.mag_filter().unwrap_or(MagFilter::Linear) {
            MagFilter::Linear => FilterMode::Linear,
            MagFilter::Nearest => FilterMode::Nearest,
        };
        let min_filter = match sampler.min_filter().unwrap_or(MinFilter::Linear) {
            MinFilter::Nearest | MinFilter::NearestMipmapNearest | MinFilter::NearestMipmapLinear => {
                FilterMode::Nearest
            }
            MinFilter::Linear | MinFilter::LinearMipmapNearest | MinFilter::LinearMipmapLinear => {
                FilterMode::Linear
            }
        };
        let mipmap_filter = match sampler.min_filter() {
            Some(MinFilter::NearestMipmapNearest | MinFilter::LinearMipmapNearest) => MipmapFilterMode::Nearest,
            Some(MinFilter::NearestMipmapLinear | MinFilter::LinearMipmapLinear) => MipmapFilterMode::Linear,
            Some(MinFilter::Nearest | MinFilter::Linear) | None => MipmapFilterMode::None,
        };
        let wrap = |mode: WrappingMode| match mode {
            WrappingMode::Repeat => WrapMode::Repeat,
            WrappingMode::MirroredRepeat => WrapMode::MirroredRepeat,
            WrappingMode::ClampToEdge => WrapMode::ClampToEdge,
        };
        Self {
            mag_filter,
            min_filter,
            mipmap_filter,
            wrap_u: wrap(sampler.wrap_s()),
            wrap_v: wrap(sampler.wrap_t()),
        }
    }
}

/// A document texture: shared decoded image plus sampling metadata.
#[derive(Debug, Clone)]
pub struct Texture {
    pub index: usize,
    pub name: Option<String>,
    pub image_index: usize,
    pub image: Arc<DecodedImage>,
    pub sampler: SamplerInfo,
    /// Only the GPU needs the pixels; the host may drop its CPU copy.
    pub gpu_only: bool,
    /// Sampled as linear data rather than sRGB color.
    pub linear: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TextureRequest {
    pub index: usize,
    pub gpu_only: bool,
    pub linear: bool,
}

impl ImportContext<'_> {
    pub(crate) async fn get_texture(&mut self, index: usize, gpu_only: bool, linear: bool) -> Result<Arc<Texture>> {
        self.ensure_textures(&[TextureRequest { index, gpu_only, linear }]).await?;
        self.cache
            .textures
            .get(index)
            .cloned()
            .ok_or(ImportError::IndexOutOfRange { kind: "texture", index })
    }

    /// Resolves a batch of textures, decoding all of their images in one
    /// fan-out before any texture entry is recorded. The first request for
    /// a texture decides its flags.
    pub(crate) async fn ensure_textures(&mut self, requests: &[TextureRequest]) -> Result<()> {
        let mut pending = BTreeMap::new();
        for request in requests {
            if !self.cache.textures.contains(request.index) {
                pending.entry(request.index).or_insert(*request);
            }
        }
        if pending.is_empty() {
            return Ok(());
        }
        self.check_cancelled()?;

        let document = self.document();
        let mut textures = Vec::with_capacity(pending.len());
        for (&index, request) in &pending {
            self.cache.textures.check_index(index)?;
            let texture = document
                .textures()
                .nth(index)
                .ok_or(ImportError::IndexOutOfRange { kind: "texture", index })?;
            textures.push((texture, *request));
        }

        self.ensure_images(textures.iter().map(|(t, _)| t.source().index())).await?;

        for (texture, request) in textures {
            let image_index = texture.source().index();
            let image = self
                .cache
                .images
                .get(image_index)
                .map(|entry| entry.decoded.clone())
                .ok_or(ImportError::IndexOutOfRange { kind: "image", index: image_index })?;
            self.cache.textures.insert(
                texture.index(),
                Arc::new(Texture {
                    index: texture.index(),
                    name: texture.name().map(str::to_owned),
                    image_index,
                    image,
                    sampler: texture.sampler().into(),
                    gpu_only: request.gpu_only,
                    linear: request.linear,
                }),
            )?;
            self.progress.textures_done += 1;
        }
        self.report_progress();
        Ok(())
    }
}
