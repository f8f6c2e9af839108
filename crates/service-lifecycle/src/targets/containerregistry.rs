//! Container-registry target: the pushed image reference is the deliverable

use super::{PublishOptions, TargetService};
use crate::{Error, OperationContext, Result, container::publish_image};
use async_trait::async_trait;
use deploy_model::{
    ArtifactKind, DeployResult, ProgressSink, ProjectConfig, PublishResult, ServiceConfig,
    ServiceContext, TargetResource, ToolRef, kind_eq,
};

/// Target for bare container registries
#[derive(Debug, Default)]
pub struct ContainerRegistryTarget;

impl ContainerRegistryTarget {
    /// Create the container-registry target
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TargetService for ContainerRegistryTarget {
    fn required_tools(&self, _project: &ProjectConfig, _config: &ServiceConfig) -> Vec<ToolRef> {
        vec![ToolRef::new("docker", "Docker").with_install_hint("https://docs.docker.com/engine/")]
    }

    fn expected_resource_type(&self) -> Option<&'static str> {
        Some("Microsoft.ContainerRegistry/registries")
    }

    async fn publish(
        &self,
        ctx: &OperationContext,
        project: &ProjectConfig,
        config: &ServiceConfig,
        service_ctx: &ServiceContext,
        _target: &TargetResource,
        options: Option<&PublishOptions>,
        progress: &ProgressSink,
    ) -> Result<PublishResult> {
        let image_override = options.and_then(|o| o.image.as_deref());
        publish_image(ctx, project, config, service_ctx, image_override, progress).await
    }

    async fn deploy(
        &self,
        _ctx: &OperationContext,
        _project: &ProjectConfig,
        config: &ServiceConfig,
        service_ctx: &ServiceContext,
        target: &TargetResource,
        _progress: &ProgressSink,
    ) -> Result<DeployResult> {
        // Nothing to activate: the pushed reference is the outcome. The
        // reference is not a URL, so it rides as the endpoint string and a
        // container-image artifact rather than an endpoint artifact.
        let image = service_ctx
            .publish
            .find_first(kind_eq(ArtifactKind::ContainerImage))
            .ok_or_else(|| {
                Error::config(format!(
                    "service '{}' has no published image",
                    config.name
                ))
            })?;

        let mut artifacts = deploy_model::ArtifactCollection::new();
        artifacts.push(deploy_model::Artifact::remote(
            ArtifactKind::Resource,
            target.resource_id(),
        )?);
        artifacts.push(image.clone());

        Ok(DeployResult {
            artifacts,
            target_resource_id: target.resource_id(),
            kind: config.host.key().to_string(),
            endpoints: vec![image.location.clone()],
            details: None,
        })
    }

    async fn endpoints(
        &self,
        _ctx: &OperationContext,
        _config: &ServiceConfig,
        _target: &TargetResource,
    ) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}
