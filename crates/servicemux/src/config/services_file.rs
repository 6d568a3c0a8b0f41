//! Services file schema definitions

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Root services file configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicesFile {
    /// Directory every service path is resolved against
    #[serde(default)]
    pub root_path: PathBuf,

    /// Service definitions, launched in file order
    pub services: Vec<ServiceSpec>,
}

/// A single service descriptor
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceSpec {
    /// Service name, used as the output prefix
    pub name: String,

    /// Executable to run
    pub command: String,

    /// Working directory, relative to the root path
    #[serde(default)]
    pub path: String,

    /// Argument templates (`$path` and environment references are expanded)
    #[serde(default)]
    pub args: Vec<String>,
}

impl ServiceSpec {
    /// Create a service spec with no arguments
    pub fn new(
        name: impl Into<String>,
        command: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            path: path.into(),
            args: Vec::new(),
        }
    }

    /// Append argument templates
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Resolve the working directory against a root path.
    ///
    /// An empty root and path resolve to the current directory.
    pub fn working_dir(&self, root: &Path) -> PathBuf {
        let dir = root.join(&self.path);
        if dir.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            dir
        }
    }
}

impl ServicesFile {
    /// Load a services file, picking the format from the file extension.
    ///
    /// `.yaml` and `.yml` files are parsed as YAML, everything else as JSON.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ServicesFileError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ServicesFileError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&content),
            _ => Self::from_json(&content),
        }
    }

    /// Parse a services file from a JSON string
    pub fn from_json(content: &str) -> Result<Self, ServicesFileError> {
        let file: ServicesFile = serde_json::from_str(content)?;
        file.validate()?;
        Ok(file)
    }

    /// Parse a services file from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self, ServicesFileError> {
        let file: ServicesFile = serde_yaml::from_str(content)?;
        file.validate()?;
        Ok(file)
    }

    /// Validate the services file.
    ///
    /// Names become output prefixes, so they must be non-empty and unique.
    pub fn validate(&self) -> Result<(), ServicesFileError> {
        let mut seen = HashSet::new();

        for (index, service) in self.services.iter().enumerate() {
            if service.name.trim().is_empty() {
                return Err(ServicesFileError::Validation(format!(
                    "Service #{}: 'name' must not be empty",
                    index + 1
                )));
            }

            if service.command.trim().is_empty() {
                return Err(ServicesFileError::Validation(format!(
                    "Service '{}': 'command' must not be empty",
                    service.name
                )));
            }

            if !seen.insert(service.name.as_str()) {
                return Err(ServicesFileError::Validation(format!(
                    "Service '{}' is defined more than once",
                    service.name
                )));
            }
        }

        Ok(())
    }
}

/// Errors that can occur when loading a services file
#[derive(Debug, thiserror::Error)]
pub enum ServicesFileError {
    #[error("Failed to read services file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse services file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse services file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}
