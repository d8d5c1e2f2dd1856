//! Imports glTF 2.0 documents (`.gltf` and `.glb`) into engine-side scene
//! graphs, meshes, materials, textures, skeletons and animation clips.
//!
//! ```no_run
//! use std::sync::Arc;
//! use gltf_scene_import::{CancellationToken, DocumentSource, FsStreamLoader, GltfImporter};
//!
//! let importer = GltfImporter::new(Arc::new(FsStreamLoader::new("assets")));
//! let scene = pollster::block_on(
//!     importer.load_scene(DocumentSource::path("model.gltf"), &CancellationToken::new()),
//! )?;
//! println!("{} nodes", scene.graph.len());
//! # Ok::<(), gltf_scene_import::ImportError>(())
//! ```

pub mod animation;
pub mod conventions;
pub mod decoder;
pub mod error;
pub mod io;
pub mod material;
pub mod mesh;
pub mod resolver;
pub mod runtime;
pub mod scene;
pub mod settings;
pub mod skeleton;

mod cache;
mod context;
mod importer;
mod job_system;

pub use cache::MaterialEntry;
pub use context::SourceDocument;
pub use error::{ImportError, Result};
pub use importer::{DocumentSource, GltfImporter};
pub use io::{FsStreamLoader, LoaderError, StreamLoader};
pub use runtime::{CancellationToken, ImportHooks, MemoryMonitor, YieldHelper};
pub use scene::{ImportProgress, ImportStatistics, ImportedScene};
pub use settings::{ColliderKind, ImportSettings, ShaderModel};
