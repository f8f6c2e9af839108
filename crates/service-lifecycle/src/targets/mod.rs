//! Target plug-ins: host-specific package/publish/deploy/endpoint discovery
//!
//! One target per deployment host, resolved through a keyed factory
//! registry. Unknown host strings resolve to the external target of that
//! name when an extension factory is registered.

mod aiendpoint;
mod aks;
mod appservice;
mod containerapp;
mod containerregistry;
mod external;
mod functionapp;
mod springapp;
mod staticwebapp;

pub use aiendpoint::AiEndpointTarget;
pub use aks::AksTarget;
pub use appservice::AppServiceTarget;
pub use containerapp::ContainerAppTarget;
pub use containerregistry::ContainerRegistryTarget;
pub use external::ExternalTarget;
pub use functionapp::FunctionAppTarget;
pub use springapp::SpringAppTarget;
pub use staticwebapp::StaticWebAppTarget;

use crate::{Error, OperationContext, Result, provider::ProviderClients};
use async_trait::async_trait;
use deploy_model::{
    Artifact, ArtifactCollection, ArtifactKind, DeployResult, PackageResult, ProgressSink,
    ProjectConfig, PublishResult, ServiceConfig, ServiceContext, ServiceHost, TargetResource,
    ToolRef,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Caller-supplied options for the publish phase
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOptions {
    /// Override for the image reference to publish
    pub image: Option<String>,
}

impl std::fmt::Debug for dyn TargetService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn TargetService")
    }
}

/// Host-side plug-in owning the target half of package, plus publish,
/// deploy, and endpoint discovery
#[async_trait]
pub trait TargetService: Send + Sync {
    /// External tools this target invokes for the given service
    fn required_tools(&self, _project: &ProjectConfig, _config: &ServiceConfig) -> Vec<ToolRef> {
        Vec::new()
    }

    /// One-time setup; may register lifecycle event handlers
    async fn initialize(
        &self,
        _ctx: &OperationContext,
        _project: &ProjectConfig,
        _config: &ServiceConfig,
    ) -> Result<()> {
        Ok(())
    }

    /// The resource type string this target deploys to, if it validates one
    fn expected_resource_type(&self) -> Option<&'static str> {
        None
    }

    /// Reject target resources whose type does not match the expected type
    /// string (case-insensitive)
    fn validate_target_resource(&self, target: &TargetResource) -> Result<()> {
        if let Some(expected) = self.expected_resource_type()
            && !target.is_kind(expected)
        {
            return Err(Error::ResourceMismatch {
                expected: expected.to_string(),
                actual: target.kind.clone(),
            });
        }
        Ok(())
    }

    /// Wrap the framework's package for this host; the default passes it
    /// through unchanged
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
        Ok(framework.clone())
    }

    /// Push the package to the host provider's intermediate store; the
    /// default is a no-op
    async fn publish(
        &self,
        _ctx: &OperationContext,
        _project: &ProjectConfig,
        _config: &ServiceConfig,
        _service_ctx: &ServiceContext,
        _target: &TargetResource,
        _options: Option<&PublishOptions>,
        _progress: &ProgressSink,
    ) -> Result<PublishResult> {
        Ok(PublishResult::default())
    }

    /// Activate the published artifact on the target resource
    async fn deploy(
        &self,
        ctx: &OperationContext,
        project: &ProjectConfig,
        config: &ServiceConfig,
        service_ctx: &ServiceContext,
        target: &TargetResource,
        progress: &ProgressSink,
    ) -> Result<DeployResult>;

    /// The service's reachable URLs, in discovery order
    async fn endpoints(
        &self,
        ctx: &OperationContext,
        config: &ServiceConfig,
        target: &TargetResource,
    ) -> Result<Vec<String>>;

    /// Refine the default target-resource resolution; the default accepts
    /// the fallback unchanged
    async fn resolve_target_resource(
        &self,
        _ctx: &OperationContext,
        _subscription_id: &str,
        _config: &ServiceConfig,
        fallback: Result<TargetResource>,
    ) -> Result<TargetResource> {
        fallback
    }
}

/// Build a deploy result carrying the resolved resource artifact and one
/// endpoint artifact per discovered URL
pub(crate) fn deploy_result(
    target: &TargetResource,
    host_kind: &str,
    endpoints: Vec<String>,
    extra: ArtifactCollection,
    details: Option<serde_json::Value>,
) -> Result<DeployResult> {
    let mut artifacts = ArtifactCollection::new();
    artifacts.push(Artifact::remote(
        ArtifactKind::Resource,
        target.resource_id(),
    )?);
    for endpoint in &endpoints {
        artifacts.push(Artifact::remote(ArtifactKind::Endpoint, endpoint.clone())?);
    }
    artifacts.extend(&extra);

    Ok(DeployResult {
        artifacts,
        target_resource_id: target.resource_id(),
        kind: host_kind.to_string(),
        endpoints,
        details,
    })
}

type TargetFactory = Arc<dyn Fn() -> Arc<dyn TargetService> + Send + Sync>;
type ExternalFactory = Arc<dyn Fn(&str) -> Result<Arc<dyn TargetService>> + Send + Sync>;

/// Keyed factory registry for target plug-ins
pub struct TargetRegistry {
    factories: HashMap<String, TargetFactory>,
    external: Option<ExternalFactory>,
}

impl TargetRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            external: None,
        }
    }

    /// A registry with every built-in target wired to the given provider
    /// clients
    pub fn with_defaults(providers: &ProviderClients) -> Self {
        let mut registry = Self::new();

        let sites = providers.sites.clone();
        registry.register("appservice", move || {
            Arc::new(AppServiceTarget::new(sites.clone()))
        });

        let sites = providers.sites.clone();
        registry.register("function", move || {
            Arc::new(FunctionAppTarget::new(sites.clone()))
        });

        let container_apps = providers.container_apps.clone();
        let deployments = providers.deployments.clone();
        let infra = providers.infra.clone();
        let resources = providers.resources.clone();
        registry.register("containerapp", move || {
            Arc::new(ContainerAppTarget::new(
                container_apps.clone(),
                deployments.clone(),
                infra.clone(),
                resources.clone(),
            ))
        });

        let spring = providers.spring.clone();
        registry.register("springapp", move || {
            Arc::new(SpringAppTarget::new(spring.clone()))
        });

        let static_sites = providers.static_sites.clone();
        registry.register("staticwebapp", move || {
            Arc::new(StaticWebAppTarget::new(static_sites.clone()))
        });

        registry.register("aks", || Arc::new(AksTarget::new()));

        let models = providers.models.clone();
        registry.register("ai.endpoint", move || {
            Arc::new(AiEndpointTarget::new(models.clone()))
        });

        registry.register("containerregistry", || {
            Arc::new(ContainerRegistryTarget::new())
        });

        registry
    }

    /// Register a target factory under the given host key
    pub fn register(
        &mut self,
        key: impl Into<String>,
        factory: impl Fn() -> Arc<dyn TargetService> + Send + Sync + 'static,
    ) {
        self.factories.insert(key.into(), Arc::new(factory));
    }

    /// Register the factory used for extension-contributed hosts
    pub fn register_external(
        &mut self,
        factory: impl Fn(&str) -> Result<Arc<dyn TargetService>> + Send + Sync + 'static,
    ) {
        self.external = Some(Arc::new(factory));
    }

    /// Resolve the target for a service by its host key
    pub fn resolve(&self, config: &ServiceConfig) -> Result<Arc<dyn TargetService>> {
        let key = config.host.key();
        if let Some(factory) = self.factories.get(key) {
            debug!("Resolved target '{}' for service '{}'", key, config.name);
            return Ok(factory());
        }

        if let ServiceHost::External(name) = &config.host
            && let Some(external) = &self.external
        {
            debug!(
                "Resolving extension target '{}' for service '{}'",
                name, config.name
            );
            return external(name);
        }

        Err(Error::config(format!(
            "unknown host '{}' for service '{}'",
            key, config.name
        )))
    }
}

impl Default for TargetRegistry {
    fn default() -> Self {
        Self::new()
    }
}
