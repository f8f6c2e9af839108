//! Kubernetes target: image push plus manifest apply

use super::{PublishOptions, TargetService, deploy_result};
use crate::{
    Error, OperationContext, Result,
    container::{publish_image, sanitize_env_service_name},
};
use async_trait::async_trait;
use deploy_model::{
    ArtifactKind, DeployResult, ProgressSink, ProjectConfig, PublishResult, ServiceConfig,
    ServiceContext, TargetResource, ToolRef, kind_eq, report,
};
use std::path::PathBuf;
use toolchain_exec::ToolCommand;
use tracing::info;

/// Target for Kubernetes clusters
#[derive(Debug, Default)]
pub struct AksTarget;

impl AksTarget {
    /// Create the kubernetes target
    pub fn new() -> Self {
        Self
    }

    /// The service's manifest directory: `manifests/` or `k8s/` under the
    /// service path
    fn manifests_dir(project: &ProjectConfig, config: &ServiceConfig) -> Result<PathBuf> {
        let service_dir = project.service_path(config);
        ["manifests", "k8s"]
            .into_iter()
            .map(|name| service_dir.join(name))
            .find(|candidate| candidate.is_dir())
            .ok_or_else(|| {
                Error::config(format!(
                    "service '{}' has no kubernetes manifests (expected manifests/ or k8s/)",
                    config.name
                ))
            })
    }
}

#[async_trait]
impl TargetService for AksTarget {
    fn required_tools(&self, _project: &ProjectConfig, _config: &ServiceConfig) -> Vec<ToolRef> {
        vec![
            ToolRef::new("docker", "Docker").with_install_hint("https://docs.docker.com/engine/"),
            ToolRef::new("kubectl", "Kubectl")
                .with_install_hint("https://kubernetes.io/docs/tasks/tools/"),
        ]
    }

    fn expected_resource_type(&self) -> Option<&'static str> {
        Some("Microsoft.ContainerService/managedClusters")
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
        ctx: &OperationContext,
        project: &ProjectConfig,
        config: &ServiceConfig,
        service_ctx: &ServiceContext,
        target: &TargetResource,
        progress: &ProgressSink,
    ) -> Result<DeployResult> {
        let manifests = Self::manifests_dir(project, config)?;

        report(progress, format!("Applying {}", manifests.display())).await;
        let mut apply = ToolCommand::new("kubectl");
        apply.args(["apply", "-f"]).arg(&manifests);
        ctx.run_streaming(apply, progress).await?;

        info!("Applied manifests for service '{}'", config.name);

        let endpoints = self.endpoints(ctx, config, target).await?;
        deploy_result(
            target,
            config.host.key(),
            endpoints,
            service_ctx
                .publish
                .filter(kind_eq(ArtifactKind::ContainerImage))
                .into_iter()
                .cloned()
                .collect(),
            None,
        )
    }

    async fn endpoints(
        &self,
        ctx: &OperationContext,
        config: &ServiceConfig,
        _target: &TargetResource,
    ) -> Result<Vec<String>> {
        // Ingress endpoints are surfaced through the environment by the
        // infra layer.
        let key = format!(
            "SERVICE_{}_ENDPOINT_URL",
            sanitize_env_service_name(&config.name)
        );
        Ok(ctx.environment.get(&key).into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deploy_model::{ServiceHost, ServiceLanguage, progress_channel};
    use std::sync::Arc;
    use toolchain_exec::CancelToken;
    use toolchain_exec::testing::RecordingRunner;

    #[smol_potat::test]
    async fn test_deploy_applies_manifests_with_kubectl() {
        let dir = tempfile::tempdir().unwrap();
        let manifests = dir.path().join("src/api/manifests");
        std::fs::create_dir_all(&manifests).unwrap();

        let mut project = ProjectConfig::new("store", dir.path());
        project.add_service(ServiceConfig::new(
            "api",
            "src/api",
            ServiceLanguage::TypeScript,
            ServiceHost::Aks,
        ));
        let config = project.services["api"].clone();

        let runner = Arc::new(RecordingRunner::new());
        let environment = crate::EnvironmentManager::ephemeral("dev");
        environment
            .set("SERVICE_API_ENDPOINT_URL", "https://api.example.com")
            .unwrap();
        let ctx = OperationContext::new(runner.clone(), environment, CancelToken::none());
        let (progress, _rx) = progress_channel();

        let target = TargetResource::new(
            "sub",
            "rg",
            "cluster",
            "Microsoft.ContainerService/managedClusters",
        );
        let result = AksTarget::new()
            .deploy(
                &ctx,
                &project,
                &config,
                &ServiceContext::new(),
                &target,
                &progress,
            )
            .await
            .unwrap();

        let calls = runner.calls();
        assert_eq!(calls[0].program, "kubectl");
        assert_eq!(calls[0].args[..2], ["apply", "-f"]);
        assert_eq!(result.endpoints, vec!["https://api.example.com"]);
    }

    #[test]
    fn test_missing_manifests_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/api")).unwrap();
        let mut project = ProjectConfig::new("store", dir.path());
        project.add_service(ServiceConfig::new(
            "api",
            "src/api",
            ServiceLanguage::TypeScript,
            ServiceHost::Aks,
        ));

        let err =
            AksTarget::manifests_dir(&project, &project.services["api"]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
