use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::try_join_all;
use image::ImageFormat;

use super::data_uri::DataUri;
use crate::cache::ImageEntry;
use crate::context::ImportContext;
use crate::error::{ImportError, Result};
use crate::io::resolve_relative;

/// RGBA8 pixels of one decoded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Decodes by declared mime type. Without a usable one, PNG is tried
/// before JPEG.
pub fn decode_image(bytes: &[u8], mime_type: Option<&str>) -> std::result::Result<DecodedImage, image::ImageError> {
    let img = match mime_type {
        Some("image/png") => image::load_from_memory_with_format(bytes, ImageFormat::Png)?,
        Some("image/jpeg" | "image/jpg") => image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)?,
        _ => image::load_from_memory_with_format(bytes, ImageFormat::Png)
            .or_else(|_| image::load_from_memory_with_format(bytes, ImageFormat::Jpeg))?,
    };
    let (width, height) = image::GenericImageView::dimensions(&img);
    Ok(DecodedImage {
        width,
        height,
        pixels: img.to_rgba8().into_raw(),
    })
}

struct ImageBytes {
    index: usize,
    stream: Arc<[u8]>,
    range: std::ops::Range<usize>,
    mime_type: Option<String>,
}

impl ImportContext<'_> {
    /// Resolves and decodes every listed image. View-backed images wait for
    /// their buffers; URI images are fetched together.
    pub(crate) async fn ensure_images(&mut self, indices: impl IntoIterator<Item = usize>) -> Result<()> {
        let pending: BTreeSet<usize> = indices
            .into_iter()
            .filter(|i| !self.cache.images.contains(*i))
            .collect();
        if pending.is_empty() {
            return Ok(());
        }
        self.check_cancelled()?;

        let document = self.document();
        let mut images = Vec::with_capacity(pending.len());
        for &index in &pending {
            self.cache.images.check_index(index)?;
            images.push(
                document
                    .images()
                    .nth(index)
                    .ok_or(ImportError::IndexOutOfRange { kind: "image", index })?,
            );
        }

        let view_buffers: Vec<usize> = images
            .iter()
            .filter_map(|image| match image.source() {
                gltf::image::Source::View { view, .. } => Some(view.buffer().index()),
                gltf::image::Source::Uri { .. } => None,
            })
            .collect();
        self.ensure_buffers(view_buffers).await?;

        let mut resolved = Vec::new();
        let mut external = Vec::new();
        for image in &images {
            let index = image.index();
            match image.source() {
                gltf::image::Source::View { view, mime_type } => {
                    let buffer = view.buffer().index();
                    let entry = self
                        .cache
                        .buffers
                        .get(buffer)
                        .ok_or(ImportError::BufferNotResolved(buffer))?;
                    let start = entry.offset + view.offset();
                    let end = start + view.length();
                    if end > entry.offset + entry.length {
                        return Err(ImportError::BufferTooShort {
                            buffer,
                            expected: view.offset() + view.length(),
                            found: entry.length,
                        });
                    }
                    resolved.push(ImageBytes {
                        index,
                        stream: entry.stream.clone(),
                        range: start..end,
                        mime_type: Some(mime_type.to_owned()),
                    });
                }
                gltf::image::Source::Uri { uri, mime_type } => match DataUri::parse(uri) {
                    Some(data_uri) => {
                        let bytes = data_uri.decode()?;
                        let len = bytes.len();
                        resolved.push(ImageBytes {
                            index,
                            stream: Arc::from(bytes),
                            range: 0..len,
                            mime_type: mime_type.or(data_uri.mime_type()).map(str::to_owned),
                        });
                    }
                    None => external.push((
                        index,
                        resolve_relative(&self.source.path, uri),
                        mime_type.map(str::to_owned),
                    )),
                },
            }
        }

        let loader = self.loader;
        let fetched = try_join_all(external.into_iter().map(|(index, path, mime_type)| async move {
            tracing::debug!(image = index, path = %path, "loading external image");
            match loader.load_stream(&path).await {
                Ok(bytes) => {
                    let len = bytes.len();
                    Ok(ImageBytes {
                        index,
                        stream: Arc::from(bytes),
                        range: 0..len,
                        mime_type: mime_type.or_else(|| mime_from_extension(&path)),
                    })
                }
                Err(source) => Err(ImportError::Loader { path, source }),
            }
        }))
        .await?;
        resolved.extend(fetched);
        self.checkpoint().await?;

        let decoded = crate::job_system::run_jobs(resolved, self.threaded(), |image| {
            let bytes = &image.stream[image.range.clone()];
            match decode_image(bytes, image.mime_type.as_deref()) {
                Ok(decoded) => Ok((image, decoded)),
                Err(error) => {
                    tracing::error!(image = image.index, %error, "image decode failed");
                    Err(ImportError::ImageDecode {
                        image: image.index,
                        mime_type: image.mime_type.clone().unwrap_or_else(|| "image/png, image/jpeg".to_owned()),
                    })
                }
            }
        })?;

        for (image, pixels) in decoded {
            tracing::trace!(image = image.index, width = pixels.width, height = pixels.height, "decoded image");
            self.cache.images.insert(
                image.index,
                ImageEntry {
                    stream: image.stream,
                    range: image.range,
                    mime_type: image.mime_type,
                    decoded: Arc::new(pixels),
                },
            )?;
        }
        Ok(())
    }
}

fn mime_from_extension(path: &str) -> Option<String> {
    let extension = std::path::Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "png" => Some("image/png".to_owned()),
        "jpg" | "jpeg" => Some("image/jpeg".to_owned()),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn encode(format: ImageFormat) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(2, 2, image::Rgb([200, 10, 10]));
        let mut bytes = std::io::Cursor::new(Vec::new());
        img.write_to(&mut bytes, format).unwrap();
        bytes.into_inner()
    }

    #[test]
    fn decodes_declared_png() {
        let decoded = decode_image(&encode(ImageFormat::Png), Some("image/png")).unwrap();
        assert_eq!((decoded.width, decoded.height), (2, 2));
        assert_eq!(&decoded.pixels[..4], &[200, 10, 10, 255]);
    }

    #[test]
    fn undeclared_jpeg_falls_back_after_png() {
        let decoded = decode_image(&encode(ImageFormat::Jpeg), None).unwrap();
        assert_eq!(decoded.pixels.len(), 2 * 2 * 4);
    }

    #[test]
    fn declared_type_is_not_second_guessed() {
        assert!(decode_image(&encode(ImageFormat::Jpeg), Some("image/png")).is_err());
    }

    #[test]
    fn garbage_fails_both_decoders() {
        assert!(decode_image(b"definitely not an image", None).is_err());
    }

    #[test]
    fn mime_types_come_from_extensions() {
        assert_eq!(mime_from_extension("textures/a.JPG").as_deref(), Some("image/jpeg"));
        assert_eq!(mime_from_extension("a.ktx2"), None);
    }
}
