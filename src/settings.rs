use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ColliderKind {
    #[default]
    None,
    Box,
    Concave,
    Convex,
}

/// Which family of engine shaders materials are mapped onto.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShaderModel {
    #[default]
    Native,
    Fallback,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ImportSettings {
    pub collider: ColliderKind,
    pub shader_model: ShaderModel,
    /// Replaces the shader picked by the material mapper.
    pub custom_shader: Option<String>,
    pub multithreaded: bool,
    /// Set by hosts running inside an editor. Forces `multithreaded` off.
    pub editor_context: bool,
    pub parse_on_worker: bool,
    pub generate_tangents: bool,
    pub import_animations: bool,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            collider: ColliderKind::None,
            shader_model: ShaderModel::Native,
            custom_shader: None,
            multithreaded: false,
            editor_context: false,
            parse_on_worker: false,
            generate_tangents: true,
            import_animations: true,
        }
    }
}

impl ImportSettings {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn effective_multithreaded(&self) -> bool {
        self.multithreaded && !self.editor_context
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let settings: ImportSettings =
            serde_json::from_str(r#"{ "collider": "convex", "multithreaded": true }"#).unwrap();
        assert_eq!(settings.collider, ColliderKind::Convex);
        assert!(settings.multithreaded);
        assert!(settings.generate_tangents);
        assert_eq!(settings.shader_model, ShaderModel::Native);
    }

    #[test]
    fn editor_context_disables_multithreading() {
        let settings = ImportSettings {
            multithreaded: true,
            editor_context: true,
            ..Default::default()
        };
        assert!(!settings.effective_multithreaded());

        let settings = ImportSettings {
            multithreaded: true,
            ..Default::default()
        };
        assert!(settings.effective_multithreaded());
    }

    #[test]
    fn reads_settings_from_disk() {
        let path = std::env::temp_dir().join(format!("gltf-import-settings-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "shader_model": "fallback", "custom_shader": "toon" }"#).unwrap();
        let settings = ImportSettings::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(settings.shader_model, ShaderModel::Fallback);
        assert_eq!(settings.custom_shader.as_deref(), Some("toon"));
    }
}
