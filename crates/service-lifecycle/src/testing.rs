//! Recording fakes for provider seams and plug-ins

use crate::{
    Error, OperationContext, Result,
    targets::PublishOptions,
    provider::{
        ContainerAppClient, DeploymentsClient, InfraCompiler, ModelRegistryClient, ModelVersion,
        ProviderClients, ResourceClient, SiteClient, SpringClient, StaticSiteClient,
    },
};
use async_trait::async_trait;
use deploy_model::{
    Artifact, ArtifactKind, BuildResult, DeployResult, FrameworkRequirements, PackageResult,
    Phase, ProgressSink, ProjectConfig, RestoreResult, ServiceConfig, ServiceContext,
    TargetResource, ToolRef, report,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use toolchain_exec::CancelToken;

/// Site client recording zip deploys
#[derive(Default)]
pub struct FakeSiteClient {
    zip_deploys: Mutex<Vec<(PathBuf, bool)>>,
    hostnames: Mutex<Vec<String>>,
}

impl FakeSiteClient {
    /// A client with no hostnames
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a hostname returned by `hostnames`
    pub fn with_hostname(self, hostname: &str) -> Self {
        self.hostnames.lock().unwrap().push(hostname.to_string());
        self
    }

    /// Recorded (zip path, remote build) pairs
    pub fn zip_deploys(&self) -> Vec<(PathBuf, bool)> {
        self.zip_deploys.lock().unwrap().clone()
    }
}

#[async_trait]
impl SiteClient for FakeSiteClient {
    async fn zip_deploy(
        &self,
        _target: &TargetResource,
        zip_path: &Path,
        remote_build: bool,
        cancel: &CancelToken,
    ) -> Result<serde_json::Value> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.zip_deploys
            .lock()
            .unwrap()
            .push((zip_path.to_path_buf(), remote_build));
        Ok(serde_json::json!({ "status": "succeeded" }))
    }

    async fn hostnames(
        &self,
        _target: &TargetResource,
        cancel: &CancelToken,
    ) -> Result<Vec<String>> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(self.hostnames.lock().unwrap().clone())
    }
}

/// Container-app client recording added revisions
#[derive(Default)]
pub struct FakeContainerAppClient {
    revisions: Mutex<Vec<String>>,
}

impl FakeContainerAppClient {
    /// A client with no revisions
    pub fn new() -> Self {
        Self::default()
    }

    /// Image references passed to `add_revision`
    pub fn revisions(&self) -> Vec<String> {
        self.revisions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContainerAppClient for FakeContainerAppClient {
    async fn add_revision(
        &self,
        _target: &TargetResource,
        image: &str,
        cancel: &CancelToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.revisions.lock().unwrap().push(image.to_string());
        Ok(())
    }

    async fn hostnames(
        &self,
        target: &TargetResource,
        cancel: &CancelToken,
    ) -> Result<Vec<String>> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(vec![format!("{}.example.io", target.name)])
    }
}

/// Spring client recording uploads and deployments
#[derive(Default)]
pub struct FakeSpringClient {
    uploads: Mutex<Vec<PathBuf>>,
    deployments: Mutex<Vec<(String, String)>>,
}

impl FakeSpringClient {
    /// A fresh client
    pub fn new() -> Self {
        Self::default()
    }

    /// Uploaded jar paths
    pub fn uploads(&self) -> Vec<PathBuf> {
        self.uploads.lock().unwrap().clone()
    }

    /// Recorded (deployment name, relative path) pairs
    pub fn deployments(&self) -> Vec<(String, String)> {
        self.deployments.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpringClient for FakeSpringClient {
    async fn upload_artifact(
        &self,
        _target: &TargetResource,
        jar: &Path,
        cancel: &CancelToken,
    ) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.uploads.lock().unwrap().push(jar.to_path_buf());
        Ok(format!(
            "resources/{}",
            jar.file_name().unwrap_or_default().to_string_lossy()
        ))
    }

    async fn deploy_artifact(
        &self,
        _target: &TargetResource,
        deployment: &str,
        relative_path: &str,
        cancel: &CancelToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.deployments
            .lock()
            .unwrap()
            .push((deployment.to_string(), relative_path.to_string()));
        Ok(())
    }

    async fn app_urls(
        &self,
        target: &TargetResource,
        cancel: &CancelToken,
    ) -> Result<Vec<String>> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(vec![format!("https://{}.azuremicroservices.io", target.name)])
    }
}

/// Static-site client recording deployed directories
#[derive(Default)]
pub struct FakeStaticSiteClient {
    deployed: Mutex<Vec<PathBuf>>,
}

impl FakeStaticSiteClient {
    /// A fresh client
    pub fn new() -> Self {
        Self::default()
    }

    /// Directories passed to `deploy_site`
    pub fn deployed_dirs(&self) -> Vec<PathBuf> {
        self.deployed.lock().unwrap().clone()
    }
}

#[async_trait]
impl StaticSiteClient for FakeStaticSiteClient {
    async fn deploy_site(
        &self,
        _target: &TargetResource,
        output_dir: &Path,
        cancel: &CancelToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.deployed.lock().unwrap().push(output_dir.to_path_buf());
        Ok(())
    }

    async fn default_hostname(
        &self,
        target: &TargetResource,
        cancel: &CancelToken,
    ) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(format!("{}.azurestaticapps.net", target.name))
    }
}

/// Model-registry client counting registrations
#[derive(Default)]
pub struct FakeModelRegistryClient {
    registrations: AtomicUsize,
}

impl FakeModelRegistryClient {
    /// A fresh client
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of models registered
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelRegistryClient for FakeModelRegistryClient {
    async fn register_model(
        &self,
        _target: &TargetResource,
        _manifest: &Path,
        cancel: &CancelToken,
    ) -> Result<ModelVersion> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.registrations.fetch_add(1, Ordering::SeqCst);
        Ok(ModelVersion {
            name: "model".to_string(),
            version: "1".to_string(),
        })
    }

    async fn model_version_uri(
        &self,
        target: &TargetResource,
        model: &ModelVersion,
        cancel: &CancelToken,
    ) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(format!(
            "azureml://workspaces/{}/models/{}/versions/{}",
            target.name, model.name, model.version
        ))
    }
}

/// Deployments client returning scripted outputs
#[derive(Default)]
pub struct FakeDeploymentsClient {
    outputs: Mutex<HashMap<String, String>>,
    submissions: AtomicUsize,
}

impl FakeDeploymentsClient {
    /// A client returning empty outputs
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the outputs returned by the next deployments
    pub fn respond_with(&self, outputs: impl IntoIterator<Item = (String, String)>) {
        *self.outputs.lock().unwrap() = outputs.into_iter().collect();
    }

    /// Number of submitted deployments
    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeploymentsClient for FakeDeploymentsClient {
    async fn deploy_template(
        &self,
        _subscription_id: &str,
        _resource_group: &str,
        _deployment_name: &str,
        _template: serde_json::Value,
        cancel: &CancelToken,
    ) -> Result<HashMap<String, String>> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.submissions.fetch_add(1, Ordering::SeqCst);
        Ok(self.outputs.lock().unwrap().clone())
    }
}

/// Infra compiler producing an empty template
#[derive(Default)]
pub struct FakeInfraCompiler;

impl FakeInfraCompiler {
    /// A fresh compiler
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl InfraCompiler for FakeInfraCompiler {
    async fn compile(&self, _module: &Path, cancel: &CancelToken) -> Result<serde_json::Value> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(serde_json::json!({ "resources": [] }))
    }
}

/// Resource client returning a scripted resource
#[derive(Default)]
pub struct FakeResourceClient {
    resource: Mutex<Option<TargetResource>>,
}

impl FakeResourceClient {
    /// A client that finds nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the resource returned for every lookup
    pub fn respond_with(&self, resource: TargetResource) {
        *self.resource.lock().unwrap() = Some(resource);
    }
}

#[async_trait]
impl ResourceClient for FakeResourceClient {
    async fn find_service_resource(
        &self,
        _subscription_id: &str,
        _resource_group: &str,
        service_name: &str,
        cancel: &CancelToken,
    ) -> Result<TargetResource> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.resource.lock().unwrap().clone().ok_or_else(|| {
            Error::provider(format!("no resource found for service '{}'", service_name))
        })
    }
}

/// Every provider fake, with handles for assertions
pub struct FakeProviders {
    /// Site client fake
    pub sites: Arc<FakeSiteClient>,
    /// Container-app client fake
    pub container_apps: Arc<FakeContainerAppClient>,
    /// Spring client fake
    pub spring: Arc<FakeSpringClient>,
    /// Static-site client fake
    pub static_sites: Arc<FakeStaticSiteClient>,
    /// Model-registry client fake
    pub models: Arc<FakeModelRegistryClient>,
    /// Deployments client fake
    pub deployments: Arc<FakeDeploymentsClient>,
    /// Infra compiler fake
    pub infra: Arc<FakeInfraCompiler>,
    /// Resource client fake
    pub resources: Arc<FakeResourceClient>,
}

impl FakeProviders {
    /// Create a fresh set of fakes
    pub fn new() -> Self {
        Self {
            sites: Arc::new(FakeSiteClient::new()),
            container_apps: Arc::new(FakeContainerAppClient::new()),
            spring: Arc::new(FakeSpringClient::new()),
            static_sites: Arc::new(FakeStaticSiteClient::new()),
            models: Arc::new(FakeModelRegistryClient::new()),
            deployments: Arc::new(FakeDeploymentsClient::new()),
            infra: Arc::new(FakeInfraCompiler::new()),
            resources: Arc::new(FakeResourceClient::new()),
        }
    }

    /// The trait-object view the target registry consumes
    pub fn clients(&self) -> ProviderClients {
        ProviderClients {
            sites: self.sites.clone(),
            container_apps: self.container_apps.clone(),
            spring: self.spring.clone(),
            static_sites: self.static_sites.clone(),
            models: self.models.clone(),
            deployments: self.deployments.clone(),
            infra: self.infra.clone(),
            resources: self.resources.clone(),
        }
    }
}

impl Default for FakeProviders {
    fn default() -> Self {
        Self::new()
    }
}

/// Framework spy counting phase invocations
#[derive(Default)]
pub struct SpyFramework {
    /// Restore invocation count
    pub restores: AtomicUsize,
    /// Build invocation count
    pub builds: AtomicUsize,
    /// Package invocation count
    pub packages: AtomicUsize,
    fail_in: Mutex<Option<Phase>>,
}

impl SpyFramework {
    /// A spy that succeeds in every phase
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the given phase fail
    pub fn fail_in(&self, phase: Phase) {
        *self.fail_in.lock().unwrap() = Some(phase);
    }

    fn check_failure(&self, phase: Phase) -> Result<()> {
        if *self.fail_in.lock().unwrap() == Some(phase) {
            return Err(Error::config(format!("spy framework failed in {}", phase)));
        }
        Ok(())
    }
}

#[async_trait]
impl crate::frameworks::FrameworkService for SpyFramework {
    fn requirements(&self) -> FrameworkRequirements {
        FrameworkRequirements::default()
    }

    fn required_tools(&self, _project: &ProjectConfig, _config: &ServiceConfig) -> Vec<ToolRef> {
        vec![ToolRef::new("spytool", "Spy Tool")]
    }

    async fn initialize(
        &self,
        _ctx: &OperationContext,
        _project: &ProjectConfig,
        _config: &ServiceConfig,
    ) -> Result<()> {
        Ok(())
    }

    async fn restore(
        &self,
        _ctx: &OperationContext,
        _project: &ProjectConfig,
        _config: &ServiceConfig,
        _service_ctx: &ServiceContext,
        progress: &ProgressSink,
    ) -> Result<RestoreResult> {
        self.check_failure(Phase::Restore)?;
        self.restores.fetch_add(1, Ordering::SeqCst);
        report(progress, "spy restoring").await;
        Ok(RestoreResult::default())
    }

    async fn build(
        &self,
        _ctx: &OperationContext,
        _project: &ProjectConfig,
        _config: &ServiceConfig,
        _service_ctx: &ServiceContext,
        progress: &ProgressSink,
    ) -> Result<BuildResult> {
        self.check_failure(Phase::Build)?;
        self.builds.fetch_add(1, Ordering::SeqCst);
        report(progress, "spy building").await;
        Ok(BuildResult {
            artifacts: Artifact::local(ArtifactKind::Directory, "/tmp/spy-build").unwrap().into(),
        })
    }

    async fn package(
        &self,
        _ctx: &OperationContext,
        _project: &ProjectConfig,
        _config: &ServiceConfig,
        _service_ctx: &ServiceContext,
        _progress: &ProgressSink,
    ) -> Result<PackageResult> {
        self.check_failure(Phase::Package)?;
        self.packages.fetch_add(1, Ordering::SeqCst);
        Ok(PackageResult {
            artifacts: Artifact::local(ArtifactKind::Directory, "/tmp/spy-package")
                .unwrap()
                .into(),
        })
    }
}

/// Target spy counting phase invocations
#[derive(Default)]
pub struct SpyTarget {
    /// Package invocation count
    pub packages: AtomicUsize,
    /// Publish invocation count
    pub publishes: AtomicUsize,
    /// Deploys invocation count
    pub deploys: AtomicUsize,
}

impl SpyTarget {
    /// A spy that succeeds in every phase
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl crate::targets::TargetService for SpyTarget {
    fn required_tools(&self, _project: &ProjectConfig, _config: &ServiceConfig) -> Vec<ToolRef> {
        vec![
            ToolRef::new("spytool", "Spy Tool"),
            ToolRef::new("deploytool", "Deploy Tool"),
        ]
    }

    async fn package(
        &self,
        _ctx: &OperationContext,
        _project: &ProjectConfig,
        _config: &ServiceConfig,
        _service_ctx: &ServiceContext,
        framework: &PackageResult,
        _options: Option<&PublishOptions>,
        _progress: &ProgressSink,
    ) -> Result<PackageResult> {
        self.packages.fetch_add(1, Ordering::SeqCst);
        Ok(framework.clone())
    }

    async fn publish(
        &self,
        _ctx: &OperationContext,
        _project: &ProjectConfig,
        _config: &ServiceConfig,
        _service_ctx: &ServiceContext,
        _target: &TargetResource,
        _options: Option<&crate::targets::PublishOptions>,
        _progress: &ProgressSink,
    ) -> Result<deploy_model::PublishResult> {
        self.publishes.fetch_add(1, Ordering::SeqCst);
        Ok(deploy_model::PublishResult::default())
    }

    async fn deploy(
        &self,
        _ctx: &OperationContext,
        _project: &ProjectConfig,
        config: &ServiceConfig,
        _service_ctx: &ServiceContext,
        target: &TargetResource,
        _progress: &ProgressSink,
    ) -> Result<DeployResult> {
        self.deploys.fetch_add(1, Ordering::SeqCst);
        crate::targets::deploy_result(
            target,
            config.host.key(),
            vec!["https://spy.example.com".to_string()],
            Default::default(),
            None,
        )
    }

    async fn endpoints(
        &self,
        _ctx: &OperationContext,
        _config: &ServiceConfig,
        _target: &TargetResource,
    ) -> Result<Vec<String>> {
        Ok(vec!["https://spy.example.com".to_string()])
    }

    async fn resolve_target_resource(
        &self,
        _ctx: &OperationContext,
        subscription_id: &str,
        config: &ServiceConfig,
        fallback: Result<TargetResource>,
    ) -> Result<TargetResource> {
        // The spy never needs a real resource lookup
        Ok(fallback.unwrap_or_else(|_| {
            TargetResource::new(subscription_id, "rg-spy", &config.name, "Spy.Web/sites")
        }))
    }
}
