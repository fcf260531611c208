use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::effects::ToolRegistry;

/// Descriptor id of Python interpreter installations.
pub const PYTHON_TOOL_DESCRIPTOR: &str = "python";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInstallation {
    pub name: String,
    pub home: String,
    #[serde(default = "default_descriptor")]
    pub descriptor: String,
}

impl ToolInstallation {
    pub fn python(name: impl Into<String>, home: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            home: home.into(),
            descriptor: default_descriptor(),
        }
    }
}

fn default_descriptor() -> String {
    PYTHON_TOOL_DESCRIPTOR.to_string()
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct RegistryDocument {
    #[serde(default)]
    installations: Vec<ToolInstallation>,
}

/// Tool registry stored as a JSON document on disk. A missing file is an empty
/// registry.
#[derive(Clone, Debug)]
pub struct FileToolRegistry {
    path: PathBuf,
}

impl FileToolRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every installation, regardless of descriptor.
    ///
    /// # Errors
    /// Returns an error when the registry exists but cannot be read or parsed.
    pub fn load(&self) -> Result<Vec<ToolInstallation>> {
        Ok(self.read_document()?.installations)
    }

    /// Adds `installation`, replacing any entry with the same name.
    ///
    /// # Errors
    /// Returns an error when the registry cannot be read or written.
    pub fn add(&self, installation: ToolInstallation) -> Result<()> {
        let mut document = self.read_document()?;
        if let Some(existing) = document
            .installations
            .iter_mut()
            .find(|entry| entry.name == installation.name)
        {
            *existing = installation;
        } else {
            document.installations.push(installation);
        }
        document.installations.sort_by(|a, b| a.name.cmp(&b.name));
        self.write_document(&document)
    }

    /// Removes the installation called `name`; returns whether one existed.
    ///
    /// # Errors
    /// Returns an error when the registry cannot be read or written.
    pub fn remove(&self, name: &str) -> Result<bool> {
        let mut document = self.read_document()?;
        let before = document.installations.len();
        document.installations.retain(|entry| entry.name != name);
        if document.installations.len() == before {
            return Ok(false);
        }
        self.write_document(&document)?;
        Ok(true)
    }

    fn read_document(&self) -> Result<RegistryDocument> {
        if !self.path.exists() {
            return Ok(RegistryDocument::default());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("reading tool registry at {}", self.path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse tool registry at {}", self.path.display()))
    }

    fn write_document(&self, document: &RegistryDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(document)?;
        fs::write(&self.path, contents + "\n")
            .with_context(|| format!("writing tool registry at {}", self.path.display()))
    }
}

impl ToolRegistry for FileToolRegistry {
    fn list_installations(&self, descriptor: &str) -> Result<Vec<ToolInstallation>> {
        let mut matching = Vec::new();
        for installation in self.load()? {
            if installation.descriptor == descriptor {
                matching.push(installation);
            } else {
                debug!(
                    name = %installation.name,
                    descriptor = %installation.descriptor,
                    "skipping tool installation"
                );
            }
        }
        Ok(matching)
    }
}
