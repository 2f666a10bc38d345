//! Module example files.
//!
//! Each tool can ship a `module-<name>.json` next to the others:
//!
//! ```json
//! {
//!   "module": {"name": "Weather", "description": "...", "argument": "<city>"},
//!   "embeddings": [{"text": "what's the weather", "embedding": [0.1, ...]}]
//! }
//! ```
//!
//! The [`ExampleIndex`] holds every file found in a directory, keyed by tool name.

use daisy_core::error::ProviderError;
use daisy_core::provider::EmbeddingProvider;
use daisy_core::tool::Tool;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const FILE_PREFIX: &str = "module-";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub name: String,
    pub description: String,
    pub argument: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleExample {
    pub text: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleFile {
    pub module: ModuleInfo,
    #[serde(default)]
    pub embeddings: Vec<ModuleExample>,
}

#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    #[error("Failed to access {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Malformed module file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

impl ModuleFile {
    pub fn file_name(tool_name: &str) -> String {
        format!("{FILE_PREFIX}{tool_name}.json")
    }

    pub fn load(path: &Path) -> Result<Self, ModuleError> {
        let content = std::fs::read_to_string(path).map_err(|e| ModuleError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| ModuleError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Write the file into `dir` (created if needed) and return its path.
    pub fn save(&self, dir: &Path) -> Result<PathBuf, ModuleError> {
        let io_err = |path: &Path, e: std::io::Error| ModuleError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        let path = dir.join(Self::file_name(&self.module.name));
        let json = serde_json::to_string_pretty(self).map_err(|e| ModuleError::Parse {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        std::fs::write(&path, json).map_err(|e| io_err(&path, e))?;
        Ok(path)
    }

    /// Embed every example phrase a tool declares.
    ///
    /// Phrases already present in `existing` are reused instead of being
    /// embedded again.
    pub async fn embed_tool(
        tool: &dyn Tool,
        embedder: &dyn EmbeddingProvider,
        existing: Option<&ModuleFile>,
    ) -> Result<Self, ProviderError> {
        let mut embeddings = Vec::with_capacity(tool.examples().len());

        for text in tool.examples() {
            let cached = existing
                .and_then(|m| m.embeddings.iter().find(|e| e.text == *text))
                .cloned();
            let example = match cached {
                Some(example) => example,
                None => {
                    debug!(tool = %tool.name(), text = %text, "Embedding example");
                    ModuleExample {
                        text: text.to_string(),
                        embedding: embedder.embed(text).await?,
                    }
                }
            };
            embeddings.push(example);
        }

        Ok(Self {
            module: ModuleInfo {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                argument: tool.argument_format().to_string(),
            },
            embeddings,
        })
    }
}

/// Every module file from one directory.
#[derive(Debug, Clone, Default)]
pub struct ExampleIndex {
    modules: HashMap<String, ModuleFile>,
}

impl ExampleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load all `module-*.json` files in `dir`.
    ///
    /// A missing directory is an empty index. Files that fail to parse are
    /// skipped with a warning so one bad file doesn't disable matching.
    pub fn load_dir(dir: &Path) -> Result<Self, ModuleError> {
        let mut index = Self::new();

        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No module directory at {}, command matching has no examples", dir.display());
                return Ok(index);
            }
            Err(e) => {
                return Err(ModuleError::Io {
                    path: dir.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(FILE_PREFIX) && n.ends_with(".json"))
            })
            .collect();
        paths.sort();

        for path in paths {
            match ModuleFile::load(&path) {
                Ok(module) => index.insert(module),
                Err(e) => warn!(error = %e, "Skipping module file"),
            }
        }

        info!(modules = index.len(), dir = %dir.display(), "Loaded command examples");
        Ok(index)
    }

    pub fn insert(&mut self, module: ModuleFile) {
        self.modules.insert(module.module.name.clone(), module);
    }

    pub fn get(&self, tool_name: &str) -> Option<&ModuleFile> {
        self.modules.get(tool_name)
    }

    /// Example embeddings for a tool, empty when none are recorded.
    pub fn embeddings_for(&self, tool_name: &str) -> Vec<Vec<f32>> {
        self.get(tool_name)
            .map(|m| m.embeddings.iter().map(|e| e.embedding.clone()).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
