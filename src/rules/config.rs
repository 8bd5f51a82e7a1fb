//! Rule file loading.
//!
//! Accepted shapes:
//! - `.json`: `{"containers": [...]}` or a bare `[...]` of containers
//! - `.toml`: `[[containers]]` tables; JSON content in a `.toml` file is
//!   accepted too, as older deployments wrote JSON under that extension

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::RuleError;
use super::container::Container;

/// Ordered collection of watch rules.
///
/// Order only drives watcher start/stop sequencing; reactions from
/// different containers are independent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub containers: Vec<Container>,
}

impl RuleSet {
    pub fn new(containers: Vec<Container>) -> Self {
        Self { containers }
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Container> {
        self.containers.iter()
    }

    /// Load and validate a rule file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RuleError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(RuleError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let format = RuleFormat::from_path(path)?;
        let content = std::fs::read_to_string(path).map_err(|source| RuleError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let rules = match format {
            RuleFormat::Json => Self::from_json_str(&content),
            RuleFormat::Toml => Self::from_toml_str(&content).or_else(|toml_err| {
                Self::from_json_str(&content).map_err(|_| toml_err)
            }),
        }
        .map_err(|reason| RuleError::Parse {
            path: path.to_path_buf(),
            reason,
        })?;

        rules.validate()?;
        Ok(rules)
    }

    /// Decode JSON, either wrapped in `containers` or as a bare array.
    pub fn from_json_str(content: &str) -> Result<Self, String> {
        let value: serde_json::Value = serde_json::from_str(content).map_err(|e| e.to_string())?;

        if value.is_array() {
            let containers: Vec<Container> =
                serde_json::from_value(value).map_err(|e| e.to_string())?;
            Ok(Self::new(containers))
        } else {
            serde_json::from_value(value).map_err(|e| e.to_string())
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    pub fn to_json_string(&self) -> Result<String, RuleError> {
        serde_json::to_string_pretty(self).map_err(|e| RuleError::Encode {
            reason: e.to_string(),
        })
    }

    pub fn to_toml_string(&self) -> Result<String, RuleError> {
        toml::to_string_pretty(self).map_err(|e| RuleError::Encode {
            reason: e.to_string(),
        })
    }

    /// Validate every container, failing on the first invalid one.
    pub fn validate(&self) -> Result<(), RuleError> {
        self.containers
            .iter()
            .enumerate()
            .try_for_each(|(index, container)| container.validate(index))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleFormat {
    Json,
    Toml,
}

impl RuleFormat {
    fn from_path(path: &Path) -> Result<Self, RuleError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match ext.as_deref() {
            Some("json") => Ok(RuleFormat::Json),
            Some("toml") => Ok(RuleFormat::Toml),
            _ => Err(RuleError::UnsupportedExtension {
                path: path.to_path_buf(),
            }),
        }
    }
}
