#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use base64::Engine as _;
use futures::future::BoxFuture;
use gltf_scene_import::{CancellationToken, DocumentSource, GltfImporter, ImportSettings, LoaderError, StreamLoader};
use serde_json::{json, Value};

pub fn data_uri(mime_type: &str, bytes: &[u8]) -> String {
    format!(
        "data:{mime_type};base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

pub fn png(rgba: [u8; 4]) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(2, 2, image::Rgba(rgba));
    let mut bytes = std::io::Cursor::new(Vec::new());
    img.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
    bytes.into_inner()
}

/// Packs accessor data into a single buffer while recording views and
/// accessors for it.
#[derive(Default)]
pub struct BinBuilder {
    pub bytes: Vec<u8>,
    views: Vec<Value>,
    accessors: Vec<Value>,
}

impl BinBuilder {
    fn push_view(&mut self, data: &[u8]) -> usize {
        while self.bytes.len() % 4 != 0 {
            self.bytes.push(0);
        }
        self.views.push(json!({
            "buffer": 0,
            "byteOffset": self.bytes.len(),
            "byteLength": data.len(),
        }));
        self.bytes.extend_from_slice(data);
        self.views.len() - 1
    }

    fn push_accessor(&mut self, accessor: Value) -> usize {
        self.accessors.push(accessor);
        self.accessors.len() - 1
    }

    fn floats(&mut self, values: &[f32], count: usize, ty: &str) -> usize {
        let data: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let view = self.push_view(&data);
        self.push_accessor(json!({ "bufferView": view, "componentType": 5126, "count": count, "type": ty }))
    }

    pub fn scalars(&mut self, values: &[f32]) -> usize {
        self.floats(values, values.len(), "SCALAR")
    }

    /// Positions carry the min/max bounds glTF requires.
    pub fn positions(&mut self, values: &[[f32; 3]]) -> usize {
        let index = self.vec3(values);
        let mut min = [f32::MAX; 3];
        let mut max = [f32::MIN; 3];
        for v in values {
            for axis in 0..3 {
                min[axis] = min[axis].min(v[axis]);
                max[axis] = max[axis].max(v[axis]);
            }
        }
        self.accessors[index]["min"] = json!(min);
        self.accessors[index]["max"] = json!(max);
        index
    }

    pub fn vec3(&mut self, values: &[[f32; 3]]) -> usize {
        let flat: Vec<f32> = values.iter().flatten().copied().collect();
        self.floats(&flat, values.len(), "VEC3")
    }

    pub fn vec4(&mut self, values: &[[f32; 4]]) -> usize {
        let flat: Vec<f32> = values.iter().flatten().copied().collect();
        self.floats(&flat, values.len(), "VEC4")
    }

    pub fn mat4(&mut self, values: &[[f32; 16]]) -> usize {
        let flat: Vec<f32> = values.iter().flatten().copied().collect();
        self.floats(&flat, values.len(), "MAT4")
    }

    pub fn joints(&mut self, values: &[[u16; 4]]) -> usize {
        let data: Vec<u8> = values.iter().flatten().flat_map(|v| v.to_le_bytes()).collect();
        let view = self.push_view(&data);
        self.push_accessor(json!({ "bufferView": view, "componentType": 5123, "count": values.len(), "type": "VEC4" }))
    }

    pub fn indices(&mut self, values: &[u16]) -> usize {
        let data: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let view = self.push_view(&data);
        self.push_accessor(json!({ "bufferView": view, "componentType": 5123, "count": values.len(), "type": "SCALAR" }))
    }

    /// Adds a view holding arbitrary bytes, e.g. an embedded image.
    pub fn raw_view(&mut self, data: &[u8]) -> usize {
        self.push_view(data)
    }

    pub fn padded(&self) -> Vec<u8> {
        let mut bytes = self.bytes.clone();
        while bytes.len() % 4 != 0 {
            bytes.push(0);
        }
        bytes
    }

    /// Completes `doc` with a single buffer, either embedded as a data URI
    /// or pointing at `uri`.
    pub fn finish(&self, mut doc: Value, uri: Option<&str>) -> Value {
        let bytes = self.padded();
        let uri = match uri {
            Some(uri) => uri.to_owned(),
            None => data_uri("application/octet-stream", &bytes),
        };
        doc["buffers"] = json!([{ "byteLength": bytes.len(), "uri": uri }]);
        doc["bufferViews"] = json!(self.views);
        doc["accessors"] = json!(self.accessors);
        doc
    }

    /// Completes `doc` as a GLB container with the buffer in the binary chunk.
    pub fn finish_glb(&self, mut doc: Value) -> Vec<u8> {
        let bin = self.padded();
        doc["buffers"] = json!([{ "byteLength": bin.len() }]);
        doc["bufferViews"] = json!(self.views);
        doc["accessors"] = json!(self.accessors);

        let mut json_chunk = serde_json::to_vec(&doc).unwrap();
        while json_chunk.len() % 4 != 0 {
            json_chunk.push(b' ');
        }
        let total = 12 + 8 + json_chunk.len() + 8 + bin.len();
        let mut glb = Vec::with_capacity(total);
        glb.extend_from_slice(b"glTF");
        glb.extend_from_slice(&2u32.to_le_bytes());
        glb.extend_from_slice(&(total as u32).to_le_bytes());
        glb.extend_from_slice(&(json_chunk.len() as u32).to_le_bytes());
        glb.extend_from_slice(b"JSON");
        glb.extend_from_slice(&json_chunk);
        glb.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        glb.extend_from_slice(b"BIN\0");
        glb.extend_from_slice(&bin);
        glb
    }
}

/// One triangle with normals and a single-primitive mesh in a one-node scene.
pub fn triangle_document(bin: &mut BinBuilder) -> Value {
    let positions = bin.positions(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
    let normals = bin.vec3(&[[0.0, 0.0, 1.0]; 3]);
    let indices = bin.indices(&[0, 1, 2]);
    json!({
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "name": "Main", "nodes": [0] }],
        "nodes": [{ "name": "Triangle", "mesh": 0 }],
        "meshes": [{
            "name": "Tri",
            "primitives": [{
                "attributes": { "POSITION": positions, "NORMAL": normals },
                "indices": indices
            }]
        }]
    })
}

/// Serves files from memory and counts how often each one is requested.
#[derive(Default)]
pub struct MemoryLoader {
    files: HashMap<String, Vec<u8>>,
    requests: Mutex<HashMap<String, usize>>,
}

impl MemoryLoader {
    pub fn with_file(mut self, path: &str, bytes: Vec<u8>) -> Self {
        self.files.insert(path.to_owned(), bytes);
        self
    }

    pub fn requests(&self, path: &str) -> usize {
        self.requests.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

impl StreamLoader for MemoryLoader {
    fn load_stream<'a>(&'a self, relative_path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, LoaderError>> {
        Box::pin(async move {
            *self.requests.lock().unwrap().entry(relative_path.to_owned()).or_default() += 1;
            self.files
                .get(relative_path)
                .cloned()
                .ok_or_else(|| format!("no such file: {relative_path}").into())
        })
    }
}

pub fn importer(loader: MemoryLoader) -> (GltfImporter, Arc<MemoryLoader>) {
    let loader = Arc::new(loader);
    (GltfImporter::new(loader.clone()), loader)
}

pub fn importer_with(settings: ImportSettings) -> GltfImporter {
    GltfImporter::new(Arc::new(MemoryLoader::default())).with_settings(settings)
}

pub fn json_source(doc: &Value, path: &str) -> DocumentSource {
    DocumentSource::bytes(serde_json::to_vec(doc).unwrap(), path)
}

pub fn token() -> CancellationToken {
    CancellationToken::new()
}
