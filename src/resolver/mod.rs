//! Turns document buffers, images and textures into cached bytes and
//! decoded pixels.

mod buffer;
mod data_uri;
pub(crate) mod image;
mod texture;

pub(crate) use buffer::{accessor_buffers, raw_accessor};
pub use self::image::{decode_image, DecodedImage};
pub(crate) use texture::TextureRequest;
pub use texture::{FilterMode, MipmapFilterMode, SamplerInfo, Texture, WrapMode};
