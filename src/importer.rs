use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::cache::MaterialEntry;
use crate::context::{ImportContext, SourceDocument};
use crate::error::{ImportError, Result};
use crate::io::StreamLoader;
use crate::mesh::Mesh;
use crate::resolver::Texture;
use crate::runtime::{CancellationToken, ImportHooks, MemoryMonitor, YieldHelper};
use crate::scene::{ImportProgress, ImportStatistics, ImportedScene, SceneGraph};
use crate::settings::ImportSettings;

/// Where the document comes from.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    /// Fetched through the importer's loader.
    Path(String),
    /// Already in memory. `path` is used to resolve relative URIs.
    Bytes { bytes: Vec<u8>, path: String },
}

impl DocumentSource {
    pub fn path(path: impl Into<String>) -> Self {
        DocumentSource::Path(path.into())
    }

    pub fn bytes(bytes: Vec<u8>, path: impl Into<String>) -> Self {
        DocumentSource::Bytes {
            bytes,
            path: path.into(),
        }
    }
}

/// Clears the running flag when an import ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ImportError::AlreadyRunning)?;
        Ok(Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Imports glTF documents. One import runs at a time per importer; a
/// second call while one is in flight fails with
/// [`ImportError::AlreadyRunning`].
pub struct GltfImporter {
    settings: ImportSettings,
    loader: Arc<dyn StreamLoader>,
    hooks: ImportHooks,
    running: AtomicBool,
    last_loaded_scene: ArcSwapOption<ImportedScene>,
}

impl GltfImporter {
    pub fn new(loader: Arc<dyn StreamLoader>) -> Self {
        Self {
            settings: ImportSettings::default(),
            loader,
            hooks: ImportHooks::default(),
            running: AtomicBool::new(false),
            last_loaded_scene: ArcSwapOption::empty(),
        }
    }

    pub fn with_settings(mut self, settings: ImportSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_memory_monitor(mut self, monitor: Arc<dyn MemoryMonitor>) -> Self {
        self.hooks.memory_monitor = Some(monitor);
        self
    }

    pub fn with_yield_helper(mut self, helper: Arc<dyn YieldHelper>) -> Self {
        self.hooks.yield_helper = Some(helper);
        self
    }

    pub fn with_progress_callback(
        mut self,
        callback: impl Fn(&ImportProgress, &ImportStatistics) + Send + Sync + 'static,
    ) -> Self {
        self.hooks.progress = Some(Arc::new(callback));
        self
    }

    pub fn settings(&self) -> &ImportSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// The scene of the most recent successful [`load_scene`](Self::load_scene).
    pub fn last_loaded_scene(&self) -> Option<Arc<ImportedScene>> {
        self.last_loaded_scene.load_full()
    }

    pub async fn load_scene(&self, source: DocumentSource, cancel: &CancellationToken) -> Result<Arc<ImportedScene>> {
        let (_guard, document) = self.begin(source, cancel).await?;
        let mut ctx = self.context(&document, cancel);
        let result = async {
            let (root, animations) = ctx.build_scene().await?;
            Ok(Arc::new(ImportedScene {
                graph: std::mem::replace(&mut ctx.graph, SceneGraph::new()),
                root,
                animations,
                statistics: ctx.statistics,
                progress: ctx.progress,
            }))
        }
        .await;
        finish(&mut ctx, &result);
        if let Ok(scene) = &result {
            self.last_loaded_scene.store(Some(scene.clone()));
        }
        result
    }

    pub async fn load_mesh(&self, source: DocumentSource, mesh: usize, cancel: &CancellationToken) -> Result<Arc<Mesh>> {
        let (_guard, document) = self.begin(source, cancel).await?;
        let mut ctx = self.context(&document, cancel);
        let result = async {
            ctx.construct_mesh_attributes(mesh).await?;
            ctx.build_mesh(mesh).await
        }
        .await;
        finish(&mut ctx, &result);
        result
    }

    /// Both vertex color variants of one material.
    pub async fn load_material(
        &self,
        source: DocumentSource,
        material: usize,
        cancel: &CancellationToken,
    ) -> Result<MaterialEntry> {
        let (_guard, document) = self.begin(source, cancel).await?;
        let mut ctx = self.context(&document, cancel);
        let result = ctx.get_material(Some(material)).await;
        finish(&mut ctx, &result);
        result
    }

    /// A standalone texture keeps its CPU pixels.
    pub async fn load_texture(
        &self,
        source: DocumentSource,
        texture: usize,
        cancel: &CancellationToken,
    ) -> Result<Arc<Texture>> {
        let (_guard, document) = self.begin(source, cancel).await?;
        let mut ctx = self.context(&document, cancel);
        let result = ctx.get_texture(texture, false, false).await;
        finish(&mut ctx, &result);
        result
    }

    async fn begin(&self, source: DocumentSource, cancel: &CancellationToken) -> Result<(RunGuard<'_>, SourceDocument)> {
        let guard = RunGuard::acquire(&self.running)?;
        let document = self.read_document(source, cancel).await?;
        tracing::debug!(path = %document.path, "import started");
        Ok((guard, document))
    }

    fn context<'a>(&'a self, document: &'a SourceDocument, cancel: &'a CancellationToken) -> ImportContext<'a> {
        ImportContext::new(document, &self.settings, self.loader.as_ref(), &self.hooks, cancel)
    }

    async fn read_document(&self, source: DocumentSource, cancel: &CancellationToken) -> Result<SourceDocument> {
        let (bytes, path) = match source {
            DocumentSource::Path(path) => match self.loader.load_stream(&path).await {
                Ok(bytes) => (bytes, path),
                Err(source) => return Err(ImportError::Loader { path, source }),
            },
            DocumentSource::Bytes { bytes, path } => (bytes, path),
        };
        if cancel.is_cancelled() {
            return Err(ImportError::Cancelled);
        }
        if !self.settings.parse_on_worker {
            return SourceDocument::parse(bytes, path);
        }

        let worker = std::thread::Builder::new()
            .name("gltf-parse".to_owned())
            .spawn(move || SourceDocument::parse(bytes, path))?;
        while !worker.is_finished() {
            match &self.hooks.yield_helper {
                Some(helper) => helper.yield_now().await,
                None => std::thread::yield_now(),
            }
        }
        worker.join().map_err(|_| ImportError::WorkerPanicked)?
    }
}

/// Drops the run's cache and reports the outcome.
fn finish<T>(ctx: &mut ImportContext<'_>, result: &Result<T>) {
    ctx.cache.dispose();
    let path = &ctx.source.path;
    match result {
        Ok(_) => tracing::info!(
            path = %path,
            triangles = ctx.statistics.triangles,
            vertices = ctx.statistics.vertices,
            "import finished"
        ),
        Err(e) if e.is_cancellation() => tracing::info!(path = %path, "import cancelled"),
        Err(e) => tracing::error!(path = %path, error = %e, "import failed"),
    }
}
