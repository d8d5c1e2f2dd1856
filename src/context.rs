use std::collections::HashMap;
use std::sync::Arc;

use fixedbitset::FixedBitSet;
use gltf::json::validation::Validate;

use crate::cache::{AssetCache, BufferEntry};
use crate::error::{ImportError, Result};
use crate::io::StreamLoader;
use crate::runtime::{CancellationToken, ImportHooks};
use crate::scene::{ImportProgress, ImportStatistics, NodeId, SceneGraph};
use crate::settings::ImportSettings;

/// A parsed document plus what the importer needs next to it: the raw json
/// for extension data, the GLB binary chunk and the path used to resolve
/// relative URIs.
#[derive(Debug)]
pub struct SourceDocument {
    pub gltf: gltf::Document,
    pub raw: serde_json::Value,
    pub blob: Option<BufferEntry>,
    pub path: String,
}

impl SourceDocument {
    pub fn parse(bytes: Vec<u8>, path: impl Into<String>) -> Result<Self> {
        let stream: Arc<[u8]> = Arc::from(bytes);
        let (root, raw, blob) = if stream.starts_with(b"glTF") {
            let glb = gltf::binary::Glb::from_slice(&stream)?;
            // header, json chunk header, json, bin chunk header
            let bin_offset = 12 + 8 + glb.json.len() + 8;
            let blob = glb.bin.as_ref().map(|bin| BufferEntry {
                stream: stream.clone(),
                offset: bin_offset,
                length: bin.len(),
            });
            (parse_root(&glb.json)?, serde_json::from_slice(&glb.json)?, blob)
        } else {
            (parse_root(&stream)?, serde_json::from_slice(&stream)?, None)
        };
        validate(&root)?;
        Ok(Self {
            gltf: gltf::Document::from_json_without_validation(root),
            raw,
            blob,
            path: path.into(),
        })
    }
}

fn parse_root(json: &[u8]) -> Result<gltf::json::Root> {
    gltf::json::Root::from_slice(json).map_err(|e| ImportError::Validation(vec![e.to_string()]))
}

/// Interpolation and channel path are read from the raw json so that the
/// animation builder can reject or skip them with a precise error.
fn is_deferred(path: &str) -> bool {
    path.starts_with("animations[") && (path.ends_with(".interpolation") || path.ends_with(".target.path"))
}

fn validate(root: &gltf::json::Root) -> Result<()> {
    let mut fatal = Vec::new();
    root.validate(root, gltf::json::Path::new, &mut |path, error| {
        let path = path();
        if !is_deferred(path.as_str()) {
            fatal.push(format!("{path}: {error}"));
        }
    });
    if fatal.is_empty() {
        Ok(())
    } else {
        Err(ImportError::Validation(fatal))
    }
}

/// State of one import run. Builders add their own `impl` blocks.
pub(crate) struct ImportContext<'a> {
    pub(crate) source: &'a SourceDocument,
    pub(crate) settings: &'a ImportSettings,
    pub(crate) loader: &'a dyn StreamLoader,
    pub(crate) hooks: &'a ImportHooks,
    pub(crate) cancel: &'a CancellationToken,
    pub(crate) cache: AssetCache,
    pub(crate) graph: SceneGraph,
    /// Document-level parent of every node.
    pub(crate) parents: Vec<Option<usize>>,
    /// Nodes referenced as a joint by any skin.
    pub(crate) joints: FixedBitSet,
    pub(crate) in_progress: FixedBitSet,
    /// (mesh node, skin) pairs bound once the hierarchy exists.
    pub(crate) pending_skins: Vec<(usize, usize)>,
    /// Joint node index to its skeleton node and bone name.
    pub(crate) bone_owners: HashMap<usize, (NodeId, String)>,
    pub(crate) statistics: ImportStatistics,
    pub(crate) progress: ImportProgress,
}

impl<'a> ImportContext<'a> {
    pub(crate) fn new(
        source: &'a SourceDocument,
        settings: &'a ImportSettings,
        loader: &'a dyn StreamLoader,
        hooks: &'a ImportHooks,
        cancel: &'a CancellationToken,
    ) -> Self {
        let document = &source.gltf;
        let node_count = document.nodes().len();

        let mut parents = vec![None; node_count];
        for node in document.nodes() {
            for child in node.children() {
                parents[child.index()] = Some(node.index());
            }
        }

        let mut joints = FixedBitSet::with_capacity(node_count);
        for skin in document.skins() {
            for joint in skin.joints() {
                joints.insert(joint.index());
            }
        }

        Self {
            source,
            settings,
            loader,
            hooks,
            cancel,
            cache: AssetCache::new(document),
            graph: SceneGraph::new(),
            parents,
            joints,
            in_progress: FixedBitSet::with_capacity(node_count),
            pending_skins: Vec::new(),
            bone_owners: HashMap::new(),
            statistics: ImportStatistics::default(),
            progress: ImportProgress::default(),
        }
    }

    pub(crate) fn document(&self) -> &'a gltf::Document {
        &self.source.gltf
    }

    pub(crate) fn raw(&self) -> &'a serde_json::Value {
        &self.source.raw
    }

    pub(crate) fn threaded(&self) -> bool {
        self.settings.effective_multithreaded()
    }

    pub(crate) fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(ImportError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Placed between expensive steps. Checks cancellation and memory
    /// pressure, then gives the host a chance to run other work.
    pub(crate) async fn checkpoint(&self) -> Result<()> {
        self.check_cancelled()?;
        if let Some(monitor) = &self.hooks.memory_monitor {
            monitor.check().map_err(ImportError::OutOfMemory)?;
        }
        if let Some(yield_helper) = &self.hooks.yield_helper {
            yield_helper.yield_now().await;
            self.check_cancelled()?;
        }
        Ok(())
    }

    pub(crate) fn report_progress(&self) {
        if let Some(callback) = &self.hooks.progress {
            callback(&self.progress, &self.statistics);
        }
    }

    pub(crate) fn node_name(&self, index: usize) -> String {
        self.document()
            .nodes()
            .nth(index)
            .and_then(|n| n.name().map(str::to_owned))
            .unwrap_or_else(|| format!("Node{index}"))
    }
}
