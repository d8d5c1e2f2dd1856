use std::path::{Path, PathBuf};

use futures::future::BoxFuture;

pub type LoaderError = Box<dyn std::error::Error + Send + Sync>;

/// Fetches the bytes behind a relative path. The only way external URIs
/// reach the importer; retries are the loader's business.
pub trait StreamLoader: Send + Sync {
    fn load_stream<'a>(&'a self, relative_path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, LoaderError>>;
}

/// Reads from the local filesystem below a root directory.
///
/// Reads block the polling thread. Hosts driving imports on an async reactor
/// should supply their own [`StreamLoader`].
#[derive(Debug, Clone)]
pub struct FsStreamLoader {
    root: PathBuf,
}

impl FsStreamLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl StreamLoader for FsStreamLoader {
    fn load_stream<'a>(&'a self, relative_path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, LoaderError>> {
        Box::pin(async move {
            let path = self.root.join(relative_path);
            tracing::trace!(path = %path.display(), "reading file");
            Ok(std::fs::read(path)?)
        })
    }
}

/// Resolves `uri` against the directory of the document at `document_path`.
pub fn resolve_relative(document_path: &str, uri: &str) -> String {
    let decoded = percent_encoding::percent_decode_str(uri).decode_utf8_lossy();
    match Path::new(document_path).parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            dir.join(decoded.as_ref()).to_string_lossy().into_owned()
        }
        _ => decoded.into_owned(),
    }
}
