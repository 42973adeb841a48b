//! Dependency manifest (`requirements.yaml`)

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::constraint::VersionConstraint;
use crate::error::{CoreError, Result};

/// File name of the manifest inside a bundle
pub const MANIFEST_FILE: &str = "requirements.yaml";

/// Declared dependencies of one bundle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Dependencies in declaration order
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

/// A single declared dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Chart name, unique within the manifest
    pub name: String,

    /// Version constraint (exact version or range)
    pub version: String,

    /// Repository reference: URL, `@name`, `alias:name` or `file://path`
    pub repository: String,
}

impl Dependency {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        repository: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            repository: repository.into(),
        }
    }

    /// Parse the version constraint
    pub fn constraint(&self) -> Result<VersionConstraint> {
        VersionConstraint::parse(&self.version)
    }

    /// Local chart directory, if the repository is a `file://` reference
    pub fn local_path(&self) -> Option<&str> {
        self.repository.strip_prefix("file://")
    }
}

impl Manifest {
    pub fn new(dependencies: Vec<Dependency>) -> Self {
        Self { dependencies }
    }

    /// Load `requirements.yaml` from a bundle directory
    ///
    /// A bundle without the file has no dependencies.
    pub fn load(bundle: &Path) -> Result<Self> {
        if !bundle.is_dir() {
            return Err(CoreError::ChartNotFound {
                path: bundle.display().to_string(),
            });
        }

        let path = bundle.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate a manifest document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let manifest: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        manifest.validate()?;
        Ok(manifest)
    }

    /// Serialize back to YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Write `requirements.yaml` into a bundle directory
    pub fn save(&self, bundle: &Path) -> Result<()> {
        std::fs::write(bundle.join(MANIFEST_FILE), self.to_yaml()?)?;
        Ok(())
    }

    /// Check names are present and unique and every field is filled in
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();

        for dep in &self.dependencies {
            if dep.name.trim().is_empty() {
                return Err(CoreError::InvalidManifest {
                    message: "dependency without a name".to_string(),
                });
            }
            if dep.version.trim().is_empty() {
                return Err(CoreError::InvalidManifest {
                    message: format!("dependency '{}' has no version", dep.name),
                });
            }
            if dep.repository.trim().is_empty() {
                return Err(CoreError::InvalidManifest {
                    message: format!("dependency '{}' has no repository", dep.name),
                });
            }
            if !seen.insert(dep.name.as_str()) {
                return Err(CoreError::DuplicateDependency {
                    name: dep.name.clone(),
                });
            }
        }

        Ok(())
    }

    /// Look up a dependency by name
    pub fn get(&self, name: &str) -> Option<&Dependency> {
        self.dependencies.iter().find(|d| d.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }
}
