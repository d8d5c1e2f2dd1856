use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::try_join_all;

use super::data_uri::decode_buffer_uri;
use crate::cache::{BufferEntry, Slots};
use crate::context::ImportContext;
use crate::decoder::{decode, AccessorLayout, AttributeData, AttributeKind, RawAccessor, SparseAccessor, SparseIndexType};
use crate::error::{ImportError, Result};
use crate::io::resolve_relative;

impl ImportContext<'_> {
    /// Makes sure every listed buffer is in the cache. External fetches run
    /// concurrently; each buffer is fetched at most once per run.
    pub(crate) async fn ensure_buffers(&mut self, indices: impl IntoIterator<Item = usize>) -> Result<()> {
        let pending: BTreeSet<usize> = indices
            .into_iter()
            .filter(|i| !self.cache.buffers.contains(*i))
            .collect();
        if pending.is_empty() {
            return Ok(());
        }
        self.check_cancelled()?;

        let document = self.document();
        let mut external = Vec::new();
        for index in pending {
            self.cache.buffers.check_index(index)?;
            let Some(buffer) = document.buffers().nth(index) else {
                return Err(ImportError::IndexOutOfRange { kind: "buffer", index });
            };
            let entry = match buffer.source() {
                gltf::buffer::Source::Bin => {
                    let blob = self.source.blob.clone().ok_or(ImportError::MissingBlob(index))?;
                    if blob.length < buffer.length() {
                        return Err(ImportError::BufferTooShort {
                            buffer: index,
                            expected: buffer.length(),
                            found: blob.length,
                        });
                    }
                    tracing::trace!(buffer = index, offset = blob.offset, "using binary chunk");
                    BufferEntry {
                        length: buffer.length(),
                        ..blob
                    }
                }
                gltf::buffer::Source::Uri(uri) => match decode_buffer_uri(uri)? {
                    Some(bytes) => BufferEntry::new(Arc::from(bytes)),
                    None => {
                        external.push((index, buffer.length(), resolve_relative(&self.source.path, uri)));
                        continue;
                    }
                },
            };
            self.insert_buffer(index, entry)?;
        }

        if external.is_empty() {
            return Ok(());
        }
        let loader = self.loader;
        let fetched = try_join_all(external.into_iter().map(|(index, expected, path)| async move {
            tracing::debug!(buffer = index, path = %path, "loading external buffer");
            match loader.load_stream(&path).await {
                Ok(bytes) => Ok((index, expected, bytes)),
                Err(source) => Err(ImportError::Loader { path, source }),
            }
        }))
        .await?;
        self.check_cancelled()?;

        for (index, expected, bytes) in fetched {
            if bytes.len() < expected {
                return Err(ImportError::BufferTooShort {
                    buffer: index,
                    expected,
                    found: bytes.len(),
                });
            }
            self.insert_buffer(index, BufferEntry::new(Arc::from(bytes)))?;
        }
        Ok(())
    }

    /// Loads the buffers behind one accessor and decodes it.
    pub(crate) async fn read_accessor(
        &mut self,
        accessor: &gltf::Accessor<'_>,
        kind: AttributeKind,
        context: impl FnOnce() -> String,
    ) -> Result<AttributeData> {
        self.ensure_buffers(accessor_buffers(accessor)).await?;
        let raw = raw_accessor(&self.cache.buffers, accessor)?;
        decode(&raw, kind).map_err(|e| ImportError::decode(context(), e))
    }

    fn insert_buffer(&mut self, index: usize, entry: BufferEntry) -> Result<()> {
        self.cache.buffers.insert(index, entry)?;
        self.progress.buffers_done += 1;
        self.report_progress();
        Ok(())
    }
}

/// Buffers an accessor reads from, sparse streams included.
pub(crate) fn accessor_buffers(accessor: &gltf::Accessor) -> Vec<usize> {
    let mut buffers = Vec::new();
    if let Some(view) = accessor.view() {
        buffers.push(view.buffer().index());
    }
    if let Some(sparse) = accessor.sparse() {
        buffers.push(sparse.indices().view().buffer().index());
        buffers.push(sparse.values().view().buffer().index());
    }
    buffers
}

fn view_bytes<'b>(buffers: &'b Slots<BufferEntry>, view: &gltf::buffer::View) -> Result<&'b [u8]> {
    let buffer = view.buffer().index();
    let entry = buffers.get(buffer).ok_or(ImportError::BufferNotResolved(buffer))?;
    let bytes = entry.bytes();
    let end = view.offset().saturating_add(view.length());
    if end > bytes.len() {
        return Err(ImportError::BufferTooShort {
            buffer,
            expected: end,
            found: bytes.len(),
        });
    }
    Ok(&bytes[view.offset()..end])
}

/// Binds an accessor to the cached bytes of its buffer views.
pub(crate) fn raw_accessor<'b>(buffers: &'b Slots<BufferEntry>, accessor: &gltf::Accessor) -> Result<RawAccessor<'b>> {
    let view = accessor.view();
    let stream = view.as_ref().map(|v| view_bytes(buffers, v)).transpose()?;
    let sparse = match accessor.sparse() {
        Some(sparse) => {
            let indices = sparse.indices();
            let values = sparse.values();
            let index_type = match indices.index_type() {
                gltf::accessor::sparse::IndexType::U8 => SparseIndexType::U8,
                gltf::accessor::sparse::IndexType::U16 => SparseIndexType::U16,
                gltf::accessor::sparse::IndexType::U32 => SparseIndexType::U32,
            };
            Some(SparseAccessor {
                count: sparse.count(),
                indices: view_bytes(buffers, &indices.view())?,
                indices_offset: indices.offset(),
                index_type,
                values: view_bytes(buffers, &values.view())?,
                values_offset: values.offset(),
            })
        }
        None => None,
    };
    Ok(RawAccessor {
        stream,
        layout: AccessorLayout {
            byte_offset: accessor.offset(),
            byte_stride: view.as_ref().and_then(|v| v.stride()),
            component_type: accessor.data_type().into(),
            element_type: accessor.dimensions().into(),
            count: accessor.count(),
            normalized: accessor.normalized(),
        },
        sparse,
    })
}
