//! Shader source loading
//!
//! Shaders are referenced by logical path (e.g. `gaussian_filter/gaussian_blur.wgsl`)
//! and resolved by a [`ShaderLoader`]. Specialization constants are attached to the
//! returned descriptor afterwards with [`ShaderStageDescriptor::with_constants`].

use crate::device::{ShaderStage, ShaderStageDescriptor};
use crate::{Error, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Resolves logical shader paths into loaded shader stages
pub trait ShaderLoader {
    fn load_shader(&self, path: &str, stage: ShaderStage) -> Result<ShaderStageDescriptor>;
}

/// Reads WGSL sources from a directory
///
/// Sources are cached, since pipeline variants of the same strategy share one module.
#[derive(Debug)]
pub struct FsShaderLoader {
    root: PathBuf,
    cache: Mutex<HashMap<String, Arc<str>>>,
}

impl FsShaderLoader {
    /// Creates a loader resolving paths relative to `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }
}

impl ShaderLoader for FsShaderLoader {
    fn load_shader(&self, path: &str, stage: ShaderStage) -> Result<ShaderStageDescriptor> {
        let mut cache = self.cache.lock().map_err(|_| Error::ShaderLoad {
            path: path.to_string(),
            reason: "shader cache poisoned".to_string(),
        })?;

        let source = match cache.get(path) {
            Some(source) => source.clone(),
            None => {
                let full_path = self.root.join(path);
                tracing::debug!("Loading shader {}", full_path.display());
                let source: Arc<str> = std::fs::read_to_string(&full_path)
                    .map_err(|e| Error::ShaderLoad {
                        path: path.to_string(),
                        reason: e.to_string(),
                    })?
                    .into();
                cache.insert(path.to_string(), source.clone());
                source
            }
        };

        Ok(ShaderStageDescriptor {
            path: path.to_string(),
            stage,
            source,
            constants: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_shader() {
        let loader = FsShaderLoader::new(std::env::temp_dir().join("filterlab-no-such-dir"));
        let result = loader.load_shader("missing.wgsl", ShaderStage::Fragment);
        assert!(matches!(result, Err(Error::ShaderLoad { ref path, .. }) if path == "missing.wgsl"));
    }

    #[test]
    fn test_loads_and_caches() {
        let dir = std::env::temp_dir().join(format!("filterlab-shaders-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("simple.wgsl"), "// simple").unwrap();

        let loader = FsShaderLoader::new(&dir);
        let first = loader.load_shader("simple.wgsl", ShaderStage::Fragment).unwrap();
        std::fs::remove_file(dir.join("simple.wgsl")).unwrap();
        let second = loader.load_shader("simple.wgsl", ShaderStage::Vertex).unwrap();

        assert_eq!(&*first.source, "// simple");
        assert!(Arc::ptr_eq(&first.source, &second.source));
        assert_eq!(second.stage, ShaderStage::Vertex);
        assert!(second.constants.is_empty());
    }
}
