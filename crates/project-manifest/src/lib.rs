//! # project-manifest
//!
//! YAML project manifest parsing.
//!
//! The manifest declares the project, its infrastructure settings, and every
//! service the pipeline drives. Parsing never resolves `${VAR}` references;
//! expandable values stay templates until a plug-in needs them.

mod parser;

pub use parser::{convert_to_project, parse_file, parse_str};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Manifest parsing and validation errors
#[derive(Error, Debug)]
pub enum ManifestError {
    /// The YAML could not be read
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The YAML could not be deserialized
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// A service declared an unknown language
    #[error("service '{service}' declares unknown language '{language}'")]
    UnknownLanguage {
        /// The offending service
        service: String,
        /// The unrecognised language string
        language: String,
    },

    /// Structural validation failed
    #[error("invalid manifest: {0}")]
    Validation(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ManifestError>;

/// Raw top-level manifest document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Project name
    pub name: String,
    /// Project metadata
    #[serde(default)]
    pub metadata: Metadata,
    /// Resource-group expression (expandable)
    #[serde(rename = "resourceGroup", default)]
    pub resource_group: Option<String>,
    /// Infrastructure settings
    #[serde(default)]
    pub infra: Infra,
    /// Declared services, in document order
    #[serde(default)]
    pub services: IndexMap<String, ManifestService>,
}

/// Project metadata block
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    /// Source template id, if the project came from one
    #[serde(default)]
    pub template: Option<String>,
}

/// Infrastructure block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Infra {
    /// IaC provider name
    #[serde(default = "Infra::default_provider")]
    pub provider: String,
    /// Infra directory relative to the project root
    #[serde(default = "Infra::default_path")]
    pub path: String,
    /// Root module name
    #[serde(default = "Infra::default_module")]
    pub module: String,
}

impl Infra {
    fn default_provider() -> String {
        "bicep".to_string()
    }

    fn default_path() -> String {
        "infra".to_string()
    }

    fn default_module() -> String {
        "main".to_string()
    }
}

impl Default for Infra {
    fn default() -> Self {
        Self {
            provider: Self::default_provider(),
            path: Self::default_path(),
            module: Self::default_module(),
        }
    }
}

/// One service declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestService {
    /// Source path relative to the project root
    pub project: String,
    /// Language string (`dotnet|csharp|fsharp|js|ts|py|python|java|docker|none`)
    #[serde(default)]
    pub language: Option<String>,
    /// Host string; unknown values resolve to an extension target
    pub host: String,
    /// Infra module name override
    #[serde(default)]
    pub module: Option<String>,
    /// Build output subdirectory
    #[serde(default)]
    pub output_path: Option<String>,
    /// Pre-built image reference for `language: none` services
    #[serde(default)]
    pub image: Option<String>,
    /// Provider API version override
    #[serde(default)]
    pub api_version: Option<String>,
    /// Container build options
    #[serde(default)]
    pub docker: Option<ManifestDocker>,
    /// Spring-app options
    #[serde(default)]
    pub spring: Option<ManifestSpring>,
    /// Per-service key/value configuration
    #[serde(default)]
    pub config: HashMap<String, String>,
}

/// Container build options block
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDocker {
    /// Dockerfile path relative to the service directory
    #[serde(default)]
    pub path: Option<String>,
    /// Build context directory
    #[serde(default)]
    pub context: Option<String>,
    /// Target platform
    #[serde(default)]
    pub platform: Option<String>,
    /// Multi-stage build target
    #[serde(default)]
    pub target: Option<String>,
    /// `--build-arg` values
    #[serde(default)]
    pub build_args: Vec<String>,
}

/// Spring-app options block
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestSpring {
    /// Deployment name
    #[serde(default)]
    pub deployment_name: Option<String>,
}
