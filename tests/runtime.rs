mod common;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use common::{json_source, token, triangle_document, BinBuilder, MemoryLoader};
use futures::future::BoxFuture;
use gltf_scene_import::{CancellationToken, GltfImporter, ImportError, ImportSettings, MemoryMonitor, YieldHelper};

/// Returns `Pending` once before completing, like a host handing the
/// executor to other work.
struct YieldOnce(bool);

impl Future for YieldOnce {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 {
            Poll::Ready(())
        } else {
            self.0 = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

#[derive(Default)]
struct CountingYield {
    yields: AtomicUsize,
    cancel_on_first: Option<CancellationToken>,
}

impl YieldHelper for CountingYield {
    fn yield_now(&self) -> BoxFuture<'_, ()> {
        self.yields.fetch_add(1, Ordering::Relaxed);
        if let Some(cancel) = &self.cancel_on_first {
            cancel.cancel();
        }
        Box::pin(YieldOnce(false))
    }
}

fn triangle() -> serde_json::Value {
    let mut bin = BinBuilder::default();
    let doc = triangle_document(&mut bin);
    bin.finish(doc, None)
}

#[test]
fn cancelled_before_start() {
    let importer = GltfImporter::new(Arc::new(MemoryLoader::default()));
    let cancel = token();
    cancel.cancel();

    let result = pollster::block_on(importer.load_scene(json_source(&triangle(), "tri.gltf"), &cancel));

    assert!(matches!(result, Err(ImportError::Cancelled)));
    assert!(result.unwrap_err().is_cancellation());
    assert!(!importer.is_running());
}

#[test]
fn cancelled_while_yielding() {
    let cancel = token();
    let helper = Arc::new(CountingYield {
        cancel_on_first: Some(cancel.clone()),
        ..Default::default()
    });
    let importer = GltfImporter::new(Arc::new(MemoryLoader::default())).with_yield_helper(helper.clone());

    let result = pollster::block_on(importer.load_scene(json_source(&triangle(), "tri.gltf"), &cancel));

    assert!(matches!(result, Err(ImportError::Cancelled)));
    assert_eq!(helper.yields.load(Ordering::Relaxed), 1);
    assert!(importer.last_loaded_scene().is_none());
    assert!(!importer.is_running());
}

#[test]
fn second_import_while_running_is_refused() {
    let helper = Arc::new(CountingYield::default());
    let importer = GltfImporter::new(Arc::new(MemoryLoader::default())).with_yield_helper(helper.clone());
    let doc = triangle();
    let cancel = token();

    let (first, second) = pollster::block_on(async {
        futures::join!(
            importer.load_scene(json_source(&doc, "first.gltf"), &cancel),
            importer.load_scene(json_source(&doc, "second.gltf"), &cancel),
        )
    });

    assert!(first.is_ok());
    assert!(matches!(second, Err(ImportError::AlreadyRunning)));
    assert!(helper.yields.load(Ordering::Relaxed) > 0);

    // the flag is released once the first run ends
    let third = pollster::block_on(importer.load_scene(json_source(&doc, "third.gltf"), &cancel));
    assert!(third.is_ok());
}

#[test]
fn memory_pressure_aborts_the_import() {
    struct Exhausted;
    impl MemoryMonitor for Exhausted {
        fn check(&self) -> Result<(), String> {
            Err("over budget".to_owned())
        }
    }
    let importer = GltfImporter::new(Arc::new(MemoryLoader::default())).with_memory_monitor(Arc::new(Exhausted));

    let result = pollster::block_on(importer.load_scene(json_source(&triangle(), "tri.gltf"), &token()));

    assert!(matches!(result, Err(ImportError::OutOfMemory(message)) if message == "over budget"));
}

#[test]
fn threaded_and_worker_parse_settings_give_the_same_mesh() {
    let doc = triangle();
    let serial = GltfImporter::new(Arc::new(MemoryLoader::default()));
    let threaded = GltfImporter::new(Arc::new(MemoryLoader::default())).with_settings(ImportSettings {
        multithreaded: true,
        parse_on_worker: true,
        ..Default::default()
    });

    let a = pollster::block_on(serial.load_mesh(json_source(&doc, "tri.gltf"), 0, &token())).unwrap();
    let b = pollster::block_on(threaded.load_mesh(json_source(&doc, "tri.gltf"), 0, &token())).unwrap();

    assert_eq!(*a, *b);
}
