//! Container-app target: image push plus revision or IaC-module deploy

use super::{PublishOptions, TargetService, deploy_result};
use crate::{
    Error, OperationContext, Result,
    container::{publish_image, sanitize_env_service_name},
    provider::{ContainerAppClient, DeploymentsClient, InfraCompiler, ResourceClient},
};
use async_trait::async_trait;
use deploy_model::{
    ArtifactKind, DeployResult, ProgressSink, ProjectConfig, PublishResult, ServiceConfig,
    ServiceContext, TargetResource, ToolRef, kind_eq, report,
};
use std::path::PathBuf;
use std::sync::Arc;
use toolchain_exec::CancelToken;
use tracing::{debug, info, warn};

/// Target for container apps
pub struct ContainerAppTarget {
    apps: Arc<dyn ContainerAppClient>,
    deployments: Arc<dyn DeploymentsClient>,
    infra: Arc<dyn InfraCompiler>,
    resources: Arc<dyn ResourceClient>,
}

impl ContainerAppTarget {
    /// Create the container-app target
    pub fn new(
        apps: Arc<dyn ContainerAppClient>,
        deployments: Arc<dyn DeploymentsClient>,
        infra: Arc<dyn InfraCompiler>,
        resources: Arc<dyn ResourceClient>,
    ) -> Self {
        Self {
            apps,
            deployments,
            infra,
            resources,
        }
    }

    /// The service's infra module file adjacent to the project's infra path,
    /// if one exists (`<module>.bicep` or `<module>.bicepparam`)
    fn service_module_file(project: &ProjectConfig, config: &ServiceConfig) -> Option<PathBuf> {
        let infra_dir = project.root.join(&project.infra.path);
        let module = config.infra_module();
        [
            infra_dir.join(format!("{}.bicep", module)),
            infra_dir.join(format!("{}.bicepparam", module)),
        ]
        .into_iter()
        .find(|candidate| candidate.is_file())
    }
}

#[async_trait]
impl TargetService for ContainerAppTarget {
    fn required_tools(&self, _project: &ProjectConfig, _config: &ServiceConfig) -> Vec<ToolRef> {
        vec![ToolRef::new("docker", "Docker").with_install_hint("https://docs.docker.com/engine/")]
    }

    fn expected_resource_type(&self) -> Option<&'static str> {
        Some("Microsoft.App/containerApps")
    }

    async fn initialize(
        &self,
        ctx: &OperationContext,
        project: &ProjectConfig,
        config: &ServiceConfig,
    ) -> Result<()> {
        // Before provisioning, record whether the app already exists so the
        // infra layer can keep the running image on incremental deploys.
        let resources = self.resources.clone();
        let environment = ctx.environment.clone();
        let service_name = config.name.clone();

        project.handlers.register(
            "preprovision",
            Arc::new(move |_args| {
                let resources = resources.clone();
                let environment = environment.clone();
                let service_name = service_name.clone();
                Box::pin(async move {
                    let (Some(subscription), Some(resource_group)) =
                        (environment.subscription_id(), environment.resource_group())
                    else {
                        return Ok(());
                    };
                    let exists = resources
                        .find_service_resource(
                            &subscription,
                            &resource_group,
                            &service_name,
                            &CancelToken::none(),
                        )
                        .await
                        .is_ok();
                    environment
                        .set_resource_exists(&service_name, exists)
                        .map_err(|e| -> Box<dyn std::error::Error + Send + Sync> {
                            e.to_string().into()
                        })?;
                    Ok(())
                })
            }),
        )?;

        Ok(())
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
        let resolved = if let Some(module) = Self::service_module_file(project, config) {
            info!(
                "Deploying service '{}' via infra module {}",
                config.name,
                module.display()
            );
            report(progress, format!("Compiling {}", module.display())).await;
            let template = self.infra.compile(&module, &ctx.cancel).await?;

            let deployment_name =
                format!("{}-{}", config.name, chrono::Utc::now().timestamp());
            report(progress, format!("Submitting deployment {}", deployment_name)).await;
            let outputs = self
                .deployments
                .deploy_template(
                    &target.subscription_id,
                    &target.resource_group,
                    &deployment_name,
                    template,
                    &ctx.cancel,
                )
                .await?;

            // Harvest the deployment outputs back into the environment.
            let values: Vec<(String, String)> = outputs.clone().into_iter().collect();
            ctx.environment.set_and_notify(values).await?;

            let name_key = format!(
                "SERVICE_{}_NAME",
                sanitize_env_service_name(&config.name)
            );
            let app_name = match outputs.get(&name_key) {
                Some(name) => name.clone(),
                None => {
                    debug!(
                        "Deployment outputs carry no {}; keeping resource name '{}'",
                        name_key, target.name
                    );
                    target.name.clone()
                }
            };
            TargetResource {
                name: app_name,
                ..target.clone()
            }
        } else {
            let image = service_ctx
                .publish
                .primary_location_by_kind(ArtifactKind::ContainerImage)
                .or_else(|| {
                    service_ctx
                        .package
                        .primary_location_by_kind(ArtifactKind::ContainerImage)
                })
                .ok_or_else(|| {
                    Error::config(format!(
                        "service '{}' has no published image to deploy",
                        config.name
                    ))
                })?;

            report(progress, format!("Adding revision running {}", image)).await;
            self.apps.add_revision(target, image, &ctx.cancel).await?;
            target.clone()
        };

        let endpoints = self.endpoints(ctx, config, &resolved).await?;
        deploy_result(
            &resolved,
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
        _config: &ServiceConfig,
        target: &TargetResource,
    ) -> Result<Vec<String>> {
        match self.apps.hostnames(target, &ctx.cancel).await {
            Ok(hostnames) => Ok(hostnames
                .into_iter()
                .map(|hostname| format!("https://{}", hostname))
                .collect()),
            Err(e) => {
                warn!("Could not discover endpoints for {}: {}", target.name, e);
                Ok(Vec::new())
            }
        }
    }
}
