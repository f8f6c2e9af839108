//! Project and service configuration types

use crate::{Expandable, events::EventHandlerTable};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Source language / framework family of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceLanguage {
    /// .NET (project-file driven)
    Dotnet,
    /// C# (.NET family)
    CSharp,
    /// F# (.NET family)
    FSharp,
    /// JavaScript (node family)
    JavaScript,
    /// TypeScript (node family)
    TypeScript,
    /// Python
    Python,
    /// Java (maven driven)
    Java,
    /// Dockerfile-only service
    Docker,
    /// No language toolchain
    None,
}

impl ServiceLanguage {
    /// The framework registry key this language resolves to
    pub fn framework_key(&self) -> &'static str {
        match self {
            ServiceLanguage::Dotnet | ServiceLanguage::CSharp | ServiceLanguage::FSharp => {
                "dotnet"
            }
            ServiceLanguage::JavaScript | ServiceLanguage::TypeScript => "node",
            ServiceLanguage::Python => "python",
            ServiceLanguage::Java => "maven",
            ServiceLanguage::Docker => "docker",
            ServiceLanguage::None => "none",
        }
    }

    /// Whether host-side deployment should request a remote build
    pub fn wants_remote_build(&self) -> bool {
        matches!(
            self,
            ServiceLanguage::JavaScript | ServiceLanguage::TypeScript | ServiceLanguage::Python
        )
    }
}

/// Deployment host kind of a service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceHost {
    /// App Service web app
    AppService,
    /// Function app
    Function,
    /// Container app
    ContainerApp,
    /// Spring app service
    SpringApp,
    /// Static web app
    StaticWebApp,
    /// Kubernetes cluster
    Aks,
    /// Machine-learning online endpoint
    AiEndpoint,
    /// Bare container registry
    ContainerRegistry,
    /// Out-of-process extension target, keyed by extension name
    External(String),
}

impl ServiceHost {
    /// The target registry key this host resolves to
    pub fn key(&self) -> &str {
        match self {
            ServiceHost::AppService => "appservice",
            ServiceHost::Function => "function",
            ServiceHost::ContainerApp => "containerapp",
            ServiceHost::SpringApp => "springapp",
            ServiceHost::StaticWebApp => "staticwebapp",
            ServiceHost::Aks => "aks",
            ServiceHost::AiEndpoint => "ai.endpoint",
            ServiceHost::ContainerRegistry => "containerregistry",
            ServiceHost::External(name) => name,
        }
    }
}

/// Container build options for docker-driven services
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockerOptions {
    /// Dockerfile path relative to the service directory
    pub path: Expandable,
    /// Build context directory
    pub context: Expandable,
    /// Target platform (e.g. `linux/amd64`)
    pub platform: Option<Expandable>,
    /// Multi-stage build target
    pub target: Option<Expandable>,
    /// `--build-arg` values, each resolved at build time
    #[serde(default)]
    pub build_args: Vec<Expandable>,
}

impl Default for DockerOptions {
    fn default() -> Self {
        Self {
            path: Expandable::new("Dockerfile"),
            context: Expandable::new("."),
            platform: None,
            target: None,
            build_args: Vec::new(),
        }
    }
}

/// Spring-app specific options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpringOptions {
    /// Deployment name; defaults to `default` at deploy time
    pub deployment_name: Option<String>,
}

/// Immutable per-invocation configuration of one declared service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Unique service name within the project
    pub name: String,
    /// Name of the owning project (weak back-reference; rehydrated on load)
    pub project: String,
    /// Source path relative to the project root
    pub relative_path: PathBuf,
    /// Deployment host kind
    pub host: ServiceHost,
    /// Source language kind
    pub language: ServiceLanguage,
    /// Optional build output subdirectory
    pub output_path: Option<PathBuf>,
    /// Pre-built image reference for `language: none` services
    pub image: Option<Expandable>,
    /// Explicit project file (disambiguates multiple dotnet projects)
    pub project_file: Option<PathBuf>,
    /// Provider API version override
    pub api_version: Option<String>,
    /// Infra module name override
    pub module: Option<String>,
    /// Container build options
    pub docker: Option<DockerOptions>,
    /// Spring-app options
    pub spring: Option<SpringOptions>,
    /// Per-service key/value configuration
    #[serde(default)]
    pub config: HashMap<String, String>,
    /// Lifecycle event handlers keyed by phase-edge name
    #[serde(skip)]
    pub handlers: EventHandlerTable,
}

impl ServiceConfig {
    /// Create a minimal config for the given service
    pub fn new(
        name: impl Into<String>,
        relative_path: impl Into<PathBuf>,
        language: ServiceLanguage,
        host: ServiceHost,
    ) -> Self {
        Self {
            name: name.into(),
            project: String::new(),
            relative_path: relative_path.into(),
            host,
            language,
            output_path: None,
            image: None,
            project_file: None,
            api_version: None,
            module: None,
            docker: None,
            spring: None,
            config: HashMap::new(),
            handlers: EventHandlerTable::new(),
        }
    }

    /// A per-service config value, if set
    pub fn config_value(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }

    /// The infra module name for this service (explicit override or service
    /// name)
    pub fn infra_module(&self) -> &str {
        self.module.as_deref().unwrap_or(&self.name)
    }
}

/// Infrastructure-as-code settings for a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfraConfig {
    /// IaC provider name (e.g. `bicep`)
    pub provider: String,
    /// Path to the infra directory, relative to the project root
    pub path: PathBuf,
    /// Root module name
    pub module: String,
}

impl Default for InfraConfig {
    fn default() -> Self {
        Self {
            provider: "bicep".to_string(),
            path: PathBuf::from("infra"),
            module: "main".to_string(),
        }
    }
}

/// Top-level configuration of a deployment project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,
    /// Absolute path to the project root directory
    pub root: PathBuf,
    /// Template id recorded in project metadata, if any
    pub template: Option<String>,
    /// Resource-group expression, resolved against the environment on use
    pub resource_group: Expandable,
    /// Infrastructure settings
    pub infra: InfraConfig,
    /// Declared services, in manifest order
    pub services: IndexMap<String, ServiceConfig>,
    /// Project-level lifecycle event handlers (e.g. `preprovision`)
    #[serde(skip)]
    pub handlers: EventHandlerTable,
}

impl ProjectConfig {
    /// Create an empty project rooted at the given directory
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            template: None,
            resource_group: Expandable::new(""),
            infra: InfraConfig::default(),
            services: IndexMap::new(),
            handlers: EventHandlerTable::new(),
        }
    }

    /// Add a service, rehydrating its project back-reference
    pub fn add_service(&mut self, mut service: ServiceConfig) {
        service.project = self.name.clone();
        self.services.insert(service.name.clone(), service);
    }

    /// Absolute source directory of the given service config
    pub fn service_path(&self, service: &ServiceConfig) -> PathBuf {
        self.root.join(&service.relative_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framework_keys() {
        assert_eq!(ServiceLanguage::CSharp.framework_key(), "dotnet");
        assert_eq!(ServiceLanguage::TypeScript.framework_key(), "node");
        assert_eq!(ServiceLanguage::Java.framework_key(), "maven");
        assert_eq!(ServiceLanguage::None.framework_key(), "none");
    }

    #[test]
    fn test_remote_build_languages() {
        assert!(ServiceLanguage::TypeScript.wants_remote_build());
        assert!(ServiceLanguage::Python.wants_remote_build());
        assert!(!ServiceLanguage::Dotnet.wants_remote_build());
    }

    #[test]
    fn test_external_host_key() {
        let host = ServiceHost::External("my-extension".to_string());
        assert_eq!(host.key(), "my-extension");
        assert_eq!(ServiceHost::AiEndpoint.key(), "ai.endpoint");
    }

    #[test]
    fn test_add_service_rehydrates_back_reference() {
        let mut project = ProjectConfig::new("store", "/work/store");
        project.add_service(ServiceConfig::new(
            "api",
            "src/api",
            ServiceLanguage::TypeScript,
            ServiceHost::AppService,
        ));

        let service = &project.services["api"];
        assert_eq!(service.project, "store");
        assert_eq!(
            project.service_path(service),
            PathBuf::from("/work/store/src/api")
        );
    }
}
