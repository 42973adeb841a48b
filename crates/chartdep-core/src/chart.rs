//! Chart metadata (`Chart.yaml`)

use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CoreError, Result};

/// File name of the chart metadata
pub const CHART_FILE: &str = "Chart.yaml";

/// Metadata describing a chart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    /// API version of the chart format
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Chart name
    pub name: String,

    /// Chart version (semver)
    pub version: String,

    /// Human readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Version of the packaged application
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
}

fn default_api_version() -> String {
    "v1".to_string()
}

impl ChartMetadata {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            api_version: default_api_version(),
            name: name.into(),
            version: version.into(),
            description: None,
            app_version: None,
        }
    }

    /// Load `Chart.yaml` from a chart directory
    pub fn load(chart_dir: &Path) -> Result<Self> {
        let path = chart_dir.join(CHART_FILE);
        if !path.exists() {
            return Err(CoreError::ChartNotFound {
                path: chart_dir.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(&path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let metadata: Self = serde_yaml::from_str(yaml)?;
        if metadata.name.trim().is_empty() {
            return Err(CoreError::InvalidManifest {
                message: "Chart.yaml has no name".to_string(),
            });
        }
        Ok(metadata)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Parse the chart version as semver
    pub fn parsed_version(&self) -> Result<Version> {
        Ok(Version::parse(
            self.version.strip_prefix('v').unwrap_or(&self.version),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_chart_yaml() {
        let yaml = r#"
apiVersion: v1
name: reqtest
version: 0.1.0
description: A chart used in tests
"#;
        let meta = ChartMetadata::from_yaml(yaml).unwrap();
        assert_eq!(meta.name, "reqtest");
        assert_eq!(meta.parsed_version().unwrap(), Version::new(0, 1, 0));
        assert_eq!(meta.description.as_deref(), Some("A chart used in tests"));
    }

    #[test]
    fn test_missing_name_rejected() {
        assert!(ChartMetadata::from_yaml("name: ''\nversion: 1.0.0\n").is_err());
    }

    #[test]
    fn test_load_from_dir() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            ChartMetadata::load(temp.path()),
            Err(CoreError::ChartNotFound { .. })
        ));

        let meta = ChartMetadata::new("local", "1.2.3");
        std::fs::write(temp.path().join(CHART_FILE), meta.to_yaml().unwrap()).unwrap();

        let loaded = ChartMetadata::load(temp.path()).unwrap();
        assert_eq!(loaded, meta);
    }
}
