//! App-service target: zip packaging and zip deploy

use super::{PublishOptions, TargetService, deploy_result};
use crate::{
    Error, OperationContext, Result, packaging::create_deployable_zip, provider::SiteClient,
};
use async_trait::async_trait;
use deploy_model::{
    Artifact, ArtifactKind, DeployResult, PackageResult, ProgressSink, ProjectConfig,
    ServiceConfig, ServiceContext, TargetResource, kind_eq, report,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Target for app-service web apps
pub struct AppServiceTarget {
    sites: Arc<dyn SiteClient>,
}

impl AppServiceTarget {
    /// Create the app-service target
    pub fn new(sites: Arc<dyn SiteClient>) -> Self {
        Self { sites }
    }
}

/// Turn the framework's directory package into a deterministic zip; an
/// archive from the framework passes through unchanged
pub(super) async fn package_as_zip(
    project: &ProjectConfig,
    config: &ServiceConfig,
    framework: &PackageResult,
) -> Result<PackageResult> {
    if framework
        .artifacts
        .find_first(kind_eq(ArtifactKind::Archive))
        .is_some()
    {
        return Ok(framework.clone());
    }

    let directory = framework
        .artifacts
        .primary_location_by_kind(ArtifactKind::Directory)
        .ok_or_else(|| {
            Error::config(format!(
                "service '{}' produced no directory or archive to package",
                config.name
            ))
        })?;

    let zip_path =
        create_deployable_zip(&project.name, &config.name, Path::new(directory), &[]).await?;
    debug!("Packaged service '{}' as {}", config.name, zip_path.display());

    Ok(PackageResult {
        artifacts: Artifact::local(ArtifactKind::Archive, zip_path.to_string_lossy())?.into(),
    })
}

/// Zip-deploy flow shared by app-service and function-app targets
pub(super) async fn deploy_zip(
    sites: &Arc<dyn SiteClient>,
    ctx: &OperationContext,
    config: &ServiceConfig,
    service_ctx: &ServiceContext,
    target: &TargetResource,
    host_kind: &str,
    progress: &ProgressSink,
) -> Result<DeployResult> {
    let zip_location = service_ctx
        .package
        .primary_location_by_kind(ArtifactKind::Archive)
        .ok_or_else(|| {
            Error::config(format!(
                "service '{}' has no packaged archive to deploy",
                config.name
            ))
        })?;
    let zip_path = PathBuf::from(zip_location);

    let remote_build = config.language.wants_remote_build();
    report(progress, format!("Deploying {} to {}", config.name, target.name)).await;

    let outcome = sites
        .zip_deploy(target, &zip_path, remote_build, &ctx.cancel)
        .await;

    // The temp zip is removed on every exit path, cancellation included.
    let _ = std::fs::remove_file(&zip_path);
    let details = outcome?;

    info!("Deployed service '{}' to {}", config.name, target.name);

    let endpoints = hostnames_to_urls(sites.hostnames(target, &ctx.cancel).await?);
    deploy_result(target, host_kind, endpoints, Default::default(), Some(details))
}

pub(super) fn hostnames_to_urls(hostnames: Vec<String>) -> Vec<String> {
    hostnames
        .into_iter()
        .map(|hostname| format!("https://{}", hostname))
        .collect()
}

#[async_trait]
impl TargetService for AppServiceTarget {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSiteClient;
    use deploy_model::{ServiceHost, ServiceLanguage, progress_channel};
    use toolchain_exec::CancelToken;
    use toolchain_exec::testing::RecordingRunner;

    fn ctx() -> OperationContext {
        OperationContext::new(
            Arc::new(RecordingRunner::new()),
            crate::EnvironmentManager::ephemeral("dev"),
            CancelToken::none(),
        )
    }

    fn target() -> TargetResource {
        TargetResource::new("sub-1", "rg-app", "api", "Microsoft.Web/sites")
    }

    #[test]
    fn test_type_validation_is_case_insensitive() {
        let sites = Arc::new(FakeSiteClient::new());
        let target_service = AppServiceTarget::new(sites);

        target_service
            .validate_target_resource(&TargetResource::new(
                "sub",
                "rg",
                "api",
                "microsoft.web/SITES",
            ))
            .unwrap();

        let err = target_service
            .validate_target_resource(&TargetResource::new("sub", "rg", "api", "BadType"))
            .unwrap_err();
        assert!(matches!(err, Error::ResourceMismatch { .. }));
    }

    #[smol_potat::test]
    async fn test_package_zips_directory_output() {
        let source = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("index.js"), "console.log('hi')\n").unwrap();

        let project = ProjectConfig::new("store", "/work/store");
        let config = ServiceConfig::new(
            "api",
            "src/api",
            ServiceLanguage::TypeScript,
            ServiceHost::AppService,
        );
        let framework = PackageResult {
            artifacts: Artifact::local(
                ArtifactKind::Directory,
                source.path().to_string_lossy(),
            )
            .unwrap()
            .into(),
        };

        let packaged = package_as_zip(&project, &config, &framework).await.unwrap();
        let zip = packaged
            .artifacts
            .primary_location_by_kind(ArtifactKind::Archive)
            .unwrap();
        assert!(zip.contains("store-api-azddeploy-"));
        assert!(Path::new(zip).is_file());

        std::fs::remove_file(zip).unwrap();
    }

    #[smol_potat::test]
    async fn test_deploy_sets_remote_build_for_node_and_cleans_up() {
        let zip = std::env::temp_dir().join(format!("appservice-test-{}.zip", uuid::Uuid::new_v4()));
        std::fs::write(&zip, b"zipbytes").unwrap();

        let sites = Arc::new(FakeSiteClient::new().with_hostname("api.example.com"));
        let target_service = AppServiceTarget::new(sites.clone());

        let project = ProjectConfig::new("store", "/work/store");
        let config = ServiceConfig::new(
            "api",
            "src/api",
            ServiceLanguage::TypeScript,
            ServiceHost::AppService,
        );
        let mut service_ctx = ServiceContext::new();
        service_ctx.package.push(
            Artifact::local(ArtifactKind::Archive, zip.to_string_lossy()).unwrap(),
        );

        let (progress, _rx) = progress_channel();
        let result = target_service
            .deploy(&ctx(), &project, &config, &service_ctx, &target(), &progress)
            .await
            .unwrap();

        let deploys = sites.zip_deploys();
        assert_eq!(deploys.len(), 1);
        assert!(deploys[0].1, "JS/TS deployments request a remote build");
        assert!(!zip.exists(), "temp zip is deleted after deploy");
        assert_eq!(result.endpoints, vec!["https://api.example.com"]);
        assert_eq!(result.kind, "appservice");
    }

    #[smol_potat::test]
    async fn test_cancellation_reaches_the_provider_and_still_cleans_up() {
        let zip = std::env::temp_dir().join(format!("appservice-test-{}.zip", uuid::Uuid::new_v4()));
        std::fs::write(&zip, b"zipbytes").unwrap();

        let sites = Arc::new(FakeSiteClient::new());
        let target_service = AppServiceTarget::new(sites.clone());

        let project = ProjectConfig::new("store", "/work/store");
        let config = ServiceConfig::new(
            "api",
            "src/api",
            ServiceLanguage::TypeScript,
            ServiceHost::AppService,
        );
        let mut service_ctx = ServiceContext::new();
        service_ctx.package.push(
            Artifact::local(ArtifactKind::Archive, zip.to_string_lossy()).unwrap(),
        );

        let (source, cancel) = toolchain_exec::cancel_pair();
        source.cancel();
        let cancelled_ctx = OperationContext::new(
            Arc::new(RecordingRunner::new()),
            crate::EnvironmentManager::ephemeral("dev"),
            cancel,
        );

        let (progress, _rx) = progress_channel();
        let err = target_service
            .deploy(
                &cancelled_ctx,
                &project,
                &config,
                &service_ctx,
                &target(),
                &progress,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert!(sites.zip_deploys().is_empty(), "the RPC was never issued");
        assert!(!zip.exists(), "temp zip is deleted on the cancel path too");
    }
}
