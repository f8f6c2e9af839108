//! Machine-learning endpoint target: model registration

use super::{TargetService, deploy_result};
use crate::{Error, OperationContext, Result, provider::ModelRegistryClient};
use async_trait::async_trait;
use deploy_model::{
    DeployResult, ProgressSink, ProjectConfig, ServiceConfig, ServiceContext, TargetResource,
    report,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Config key naming the model manifest file, relative to the service dir
const MODEL_MANIFEST_KEY: &str = "modelManifest";

/// Target for ML online endpoints
pub struct AiEndpointTarget {
    models: Arc<dyn ModelRegistryClient>,
}

impl AiEndpointTarget {
    /// Create the ai-endpoint target
    pub fn new(models: Arc<dyn ModelRegistryClient>) -> Self {
        Self { models }
    }

    fn manifest_path(project: &ProjectConfig, config: &ServiceConfig) -> Result<PathBuf> {
        let manifest = config
            .config_value(MODEL_MANIFEST_KEY)
            .unwrap_or("model.yaml");
        let path = project.service_path(config).join(manifest);
        if path.is_file() {
            Ok(path)
        } else {
            Err(Error::config(format!(
                "model manifest {} not found for service '{}'",
                path.display(),
                config.name
            )))
        }
    }
}

#[async_trait]
impl TargetService for AiEndpointTarget {
    fn expected_resource_type(&self) -> Option<&'static str> {
        Some("Microsoft.MachineLearningServices/workspaces/onlineEndpoints")
    }

    async fn deploy(
        &self,
        ctx: &OperationContext,
        project: &ProjectConfig,
        config: &ServiceConfig,
        _service_ctx: &ServiceContext,
        target: &TargetResource,
        progress: &ProgressSink,
    ) -> Result<DeployResult> {
        let manifest = Self::manifest_path(project, config)?;

        report(progress, format!("Registering model from {}", manifest.display())).await;
        let model = self.models.register_model(target, &manifest, &ctx.cancel).await?;
        info!(
            "Registered model {} version {} for service '{}'",
            model.name, model.version, config.name
        );

        let uri = self.models.model_version_uri(target, &model, &ctx.cancel).await?;
        deploy_result(
            target,
            config.host.key(),
            vec![uri],
            Default::default(),
            Some(serde_json::json!({
                "model": model.name,
                "version": model.version,
            })),
        )
    }

    async fn endpoints(
        &self,
        _ctx: &OperationContext,
        _config: &ServiceConfig,
        _target: &TargetResource,
    ) -> Result<Vec<String>> {
        // The endpoint URI is only known after a model version is registered.
        Ok(Vec::new())
    }
}
