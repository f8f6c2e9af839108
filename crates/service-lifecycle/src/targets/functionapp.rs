//! Function-app target: same zip-deploy shape as app-service

use super::appservice::{deploy_zip, hostnames_to_urls, package_as_zip};
use super::{PublishOptions, TargetService};
use crate::{OperationContext, Result, provider::SiteClient};
use async_trait::async_trait;
use deploy_model::{
    DeployResult, PackageResult, ProgressSink, ProjectConfig, ServiceConfig, ServiceContext,
    TargetResource,
};
use std::sync::Arc;

/// Target for function apps
pub struct FunctionAppTarget {
    sites: Arc<dyn SiteClient>,
}

impl FunctionAppTarget {
    /// Create the function-app target
    pub fn new(sites: Arc<dyn SiteClient>) -> Self {
        Self { sites }
    }
}

#[async_trait]
impl TargetService for FunctionAppTarget {
    fn expected_resource_type(&self) -> Option<&'static str> {
        Some("Microsoft.Web/sites")
    }

    async fn package(
        &self,
        _ctx: &OperationContext,
        project: &ProjectConfig,
        config: &ServiceConfig,
        _service_ctx: &ServiceContext,
        framework: &PackageResult,
        _options: Option<&PublishOptions>,
        _progress: &ProgressSink,
    ) -> Result<PackageResult> {
        package_as_zip(project, config, framework).await
    }

    async fn deploy(
        &self,
        ctx: &OperationContext,
        _project: &ProjectConfig,
        config: &ServiceConfig,
        service_ctx: &ServiceContext,
        target: &TargetResource,
        progress: &ProgressSink,
    ) -> Result<DeployResult> {
        deploy_zip(
            &self.sites,
            ctx,
            config,
            service_ctx,
            target,
            config.host.key(),
            progress,
        )
        .await
    }

    async fn endpoints(
        &self,
        ctx: &OperationContext,
        _config: &ServiceConfig,
        target: &TargetResource,
    ) -> Result<Vec<String>> {
        Ok(hostnames_to_urls(
            self.sites.hostnames(target, &ctx.cancel).await?,
        ))
    }
}
