//! Static-web-app target: output directory upload

use super::{TargetService, deploy_result};
use crate::{Error, OperationContext, Result, provider::StaticSiteClient};
use async_trait::async_trait;
use deploy_model::{
    ArtifactKind, DeployResult, ProgressSink, ProjectConfig, ServiceConfig, ServiceContext,
    TargetResource, report,
};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Target for static web apps
pub struct StaticWebAppTarget {
    sites: Arc<dyn StaticSiteClient>,
}

impl StaticWebAppTarget {
    /// Create the static-web-app target
    pub fn new(sites: Arc<dyn StaticSiteClient>) -> Self {
        Self { sites }
    }
}

#[async_trait]
impl TargetService for StaticWebAppTarget {
    fn expected_resource_type(&self) -> Option<&'static str> {
        Some("Microsoft.Web/staticSites")
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
        let output = service_ctx
            .package
            .primary_location_by_kind(ArtifactKind::Directory)
            .ok_or_else(|| {
                Error::config(format!(
                    "service '{}' produced no output directory to deploy",
                    config.name
                ))
            })?;

        report(progress, format!("Uploading {} to {}", output, target.name)).await;
        self.sites
            .deploy_site(target, Path::new(output), &ctx.cancel)
            .await?;
        info!("Deployed static site '{}'", config.name);

        let endpoints = self.endpoints(ctx, config, target).await?;
        deploy_result(
            target,
            config.host.key(),
            endpoints,
            Default::default(),
            None,
        )
    }

    async fn endpoints(
        &self,
        ctx: &OperationContext,
        _config: &ServiceConfig,
        target: &TargetResource,
    ) -> Result<Vec<String>> {
        let hostname = self.sites.default_hostname(target, &ctx.cancel).await?;
        Ok(vec![format!("https://{}", hostname)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeStaticSiteClient;
    use deploy_model::{Artifact, ServiceHost, ServiceLanguage, progress_channel};
    use toolchain_exec::CancelToken;
    use toolchain_exec::testing::RecordingRunner;

    #[test]
    fn test_static_web_app_type_validation() {
        let service = StaticWebAppTarget::new(Arc::new(FakeStaticSiteClient::new()));

        service
            .validate_target_resource(&TargetResource::new(
                "sub",
                "rg",
                "web",
                "Microsoft.Web/staticSites",
            ))
            .unwrap();

        // Case differences pass
        service
            .validate_target_resource(&TargetResource::new(
                "sub",
                "rg",
                "web",
                "microsoft.web/STATICSITES",
            ))
            .unwrap();

        let err = service
            .validate_target_resource(&TargetResource::new("sub", "rg", "web", "BadType"))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ResourceMismatch { expected, actual }
                if expected == "Microsoft.Web/staticSites" && actual == "BadType"
        ));
    }

    #[smol_potat::test]
    async fn test_deploy_uploads_package_directory() {
        let dir = tempfile::tempdir().unwrap();
        let sites = Arc::new(FakeStaticSiteClient::new());
        let service = StaticWebAppTarget::new(sites.clone());

        let project = ProjectConfig::new("store", "/work/store");
        let config = ServiceConfig::new(
            "web",
            "src/web",
            ServiceLanguage::TypeScript,
            ServiceHost::StaticWebApp,
        );
        let mut service_ctx = ServiceContext::new();
        service_ctx.package.push(
            Artifact::local(ArtifactKind::Directory, dir.path().to_string_lossy()).unwrap(),
        );

        let target = TargetResource::new("sub", "rg", "web", "Microsoft.Web/staticSites");
        let ctx = OperationContext::new(
            Arc::new(RecordingRunner::new()),
            crate::EnvironmentManager::ephemeral("dev"),
            CancelToken::none(),
        );
        let (progress, _rx) = progress_channel();

        let result = service
            .deploy(&ctx, &project, &config, &service_ctx, &target, &progress)
            .await
            .unwrap();

        assert_eq!(sites.deployed_dirs(), vec![dir.path().to_path_buf()]);
        assert_eq!(result.endpoints.len(), 1);
        assert!(result.endpoints[0].starts_with("https://"));
    }
}
