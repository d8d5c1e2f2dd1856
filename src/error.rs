use thiserror::Error;

use crate::decoder::DecodeError;
use crate::io::LoaderError;

/// Everything that can abort an import run.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("an import is already running on this importer")]
    AlreadyRunning,
    #[error("import was cancelled")]
    Cancelled,
    #[error("out of memory: {0}")]
    OutOfMemory(String),
    #[error("failed to parse glTF document: {0}")]
    Gltf(#[from] gltf::Error),
    #[error("invalid glTF document: {}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("failed to parse json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("document declares no default scene and has no scenes")]
    NoDefaultScene,
    #[error("{kind} index {index} is out of range")]
    IndexOutOfRange { kind: &'static str, index: usize },
    #[error("{kind} slot {index} is already populated")]
    SlotOccupied { kind: &'static str, index: usize },
    #[error("mesh {mesh} primitive {primitive} uses unsupported draw mode {mode:?}")]
    UnsupportedTopology {
        mesh: usize,
        primitive: usize,
        mode: gltf::mesh::Mode,
    },
    #[error("mesh {mesh} primitive {primitive} has no POSITION attribute")]
    MissingPositions { mesh: usize, primitive: usize },
    #[error("mesh {mesh} was built before its attributes were constructed")]
    MeshAttributesNotConstructed { mesh: usize },
    #[error("animation {animation} sampler {sampler} uses unsupported interpolation {interpolation:?}")]
    UnsupportedInterpolation {
        animation: usize,
        sampler: usize,
        interpolation: String,
    },
    #[error("joints of skin {skin} share no common root")]
    SkinJointsShareNoRoot { skin: usize },
    #[error("skin {skin} has {found} inverse bind matrices for {expected} joints")]
    InverseBindMatrixCount {
        skin: usize,
        expected: usize,
        found: usize,
    },
    #[error("node {0} is part of a cycle in the node hierarchy")]
    CircularChildren(usize),
    #[error("buffer {buffer} holds {found} bytes but declares {expected}")]
    BufferTooShort {
        buffer: usize,
        expected: usize,
        found: usize,
    },
    #[error("buffer {0} was read before it was resolved")]
    BufferNotResolved(usize),
    #[error("buffer {0} refers to the binary chunk but the document has none")]
    MissingBlob(usize),
    #[error("unsupported data uri: {0}")]
    UnsupportedDataUri(String),
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("failed to decode image {image} as {mime_type}")]
    ImageDecode { image: usize, mime_type: String },
    #[error("failed to decode {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: DecodeError,
    },
    #[error("tangent generation failed for mesh {mesh}: {message}")]
    Tangents { mesh: usize, message: String },
    #[error("failed to load {path}: {source}")]
    Loader {
        path: String,
        #[source]
        source: LoaderError,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("a worker thread panicked")]
    WorkerPanicked,
}

impl ImportError {
    /// Cancellation unwinds like any other error but callers usually don't report it.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ImportError::Cancelled)
    }

    pub(crate) fn decode(context: impl Into<String>, source: DecodeError) -> Self {
        ImportError::Decode {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ImportError>;
