//! Narrow trait seams onto the cloud provider SDK
//!
//! The orchestrator never talks to the provider directly; each target
//! plug-in is handed exactly the operations it invokes. Every operation
//! takes the caller's cancellation token: implementations race the
//! underlying RPC against it (or check it before issuing the call) and
//! return promptly once the caller's context is cancelled. Production
//! wiring implements these against the provider SDK; tests substitute
//! recording fakes.

use crate::Result;
use async_trait::async_trait;
use deploy_model::TargetResource;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use toolchain_exec::CancelToken;

/// Web-site style hosts (app-service, function-app)
#[async_trait]
pub trait SiteClient: Send + Sync {
    /// Deploy a zip archive via the provider's zip-deploy endpoint
    async fn zip_deploy(
        &self,
        target: &TargetResource,
        zip_path: &Path,
        remote_build: bool,
        cancel: &CancelToken,
    ) -> Result<serde_json::Value>;

    /// The site's public hostnames
    async fn hostnames(
        &self,
        target: &TargetResource,
        cancel: &CancelToken,
    ) -> Result<Vec<String>>;
}

/// Container-app hosts
#[async_trait]
pub trait ContainerAppClient: Send + Sync {
    /// Add a revision running the given image reference
    async fn add_revision(
        &self,
        target: &TargetResource,
        image: &str,
        cancel: &CancelToken,
    ) -> Result<()>;

    /// The app's public hostnames
    async fn hostnames(
        &self,
        target: &TargetResource,
        cancel: &CancelToken,
    ) -> Result<Vec<String>>;
}

/// Spring-app hosts
#[async_trait]
pub trait SpringClient: Send + Sync {
    /// Upload a build artifact to the app's storage; returns the storage
    /// relative path
    async fn upload_artifact(
        &self,
        target: &TargetResource,
        jar: &Path,
        cancel: &CancelToken,
    ) -> Result<String>;

    /// Activate an uploaded artifact on the named deployment
    async fn deploy_artifact(
        &self,
        target: &TargetResource,
        deployment: &str,
        relative_path: &str,
        cancel: &CancelToken,
    ) -> Result<()>;

    /// The app's public URL(s)
    async fn app_urls(
        &self,
        target: &TargetResource,
        cancel: &CancelToken,
    ) -> Result<Vec<String>>;
}

/// Static-web-app hosts
#[async_trait]
pub trait StaticSiteClient: Send + Sync {
    /// Upload and activate the site's output directory
    async fn deploy_site(
        &self,
        target: &TargetResource,
        output_dir: &Path,
        cancel: &CancelToken,
    ) -> Result<()>;

    /// The site's default hostname
    async fn default_hostname(
        &self,
        target: &TargetResource,
        cancel: &CancelToken,
    ) -> Result<String>;
}

/// A registered model version in an ML workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVersion {
    /// Model name
    pub name: String,
    /// Registered version
    pub version: String,
}

/// Machine-learning workspace hosts
#[async_trait]
pub trait ModelRegistryClient: Send + Sync {
    /// Register a model manifest with the workspace
    async fn register_model(
        &self,
        target: &TargetResource,
        manifest: &Path,
        cancel: &CancelToken,
    ) -> Result<ModelVersion>;

    /// Look up the URI of a registered model version
    async fn model_version_uri(
        &self,
        target: &TargetResource,
        model: &ModelVersion,
        cancel: &CancelToken,
    ) -> Result<String>;
}

/// Resource-group template deployments (IaC outputs)
#[async_trait]
pub trait DeploymentsClient: Send + Sync {
    /// Submit a compiled template as a resource-group deployment; returns
    /// the deployment outputs as string key/value pairs
    async fn deploy_template(
        &self,
        subscription_id: &str,
        resource_group: &str,
        deployment_name: &str,
        template: serde_json::Value,
        cancel: &CancelToken,
    ) -> Result<HashMap<String, String>>;
}

/// Infrastructure-as-code template compilation (separate subsystem; the
/// orchestrator only consumes its output)
#[async_trait]
pub trait InfraCompiler: Send + Sync {
    /// Compile a module file into a deployable template
    async fn compile(&self, module: &Path, cancel: &CancelToken) -> Result<serde_json::Value>;
}

/// Resource lookups for default target-resource resolution
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Find the cloud resource backing the named service
    async fn find_service_resource(
        &self,
        subscription_id: &str,
        resource_group: &str,
        service_name: &str,
        cancel: &CancelToken,
    ) -> Result<TargetResource>;
}

/// The full set of provider seams the default target registry needs
#[derive(Clone)]
pub struct ProviderClients {
    /// Zip-deploy capable sites
    pub sites: Arc<dyn SiteClient>,
    /// Container apps
    pub container_apps: Arc<dyn ContainerAppClient>,
    /// Spring apps
    pub spring: Arc<dyn SpringClient>,
    /// Static web apps
    pub static_sites: Arc<dyn StaticSiteClient>,
    /// ML model registry
    pub models: Arc<dyn ModelRegistryClient>,
    /// Template deployments
    pub deployments: Arc<dyn DeploymentsClient>,
    /// IaC compiler
    pub infra: Arc<dyn InfraCompiler>,
    /// Resource lookups
    pub resources: Arc<dyn ResourceClient>,
}
