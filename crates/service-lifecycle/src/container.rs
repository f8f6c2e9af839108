//! Shared container image push flow for container-based targets

use crate::{Error, OperationContext, Result, environment::KEY_CONTAINER_REGISTRY};
use deploy_model::{
    Artifact, ArtifactKind, LocationKind, ProgressSink, ProjectConfig, PublishResult,
    ServiceConfig, ServiceContext, kind_eq, report,
};
use toolchain_exec::ToolCommand;
use tracing::{debug, info};

/// Uppercase a service name for use in environment keys
/// (`web-frontend` → `WEB_FRONTEND`)
pub fn sanitize_env_service_name(service: &str) -> String {
    service
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// The registry component of an image reference, if it has one.
///
/// The first segment counts as a registry when it contains a dot or a
/// colon, or is `localhost` — the standard container reference heuristic.
pub fn image_reference_registry(reference: &str) -> Option<&str> {
    let first = reference.split('/').next()?;
    if reference.contains('/') && (first.contains('.') || first.contains(':') || first == "localhost")
    {
        Some(first)
    } else {
        None
    }
}

/// Push the packaged container image for a service.
///
/// If the package artifact is already a fully qualified remote reference the
/// push is skipped; otherwise the image is tagged into the configured
/// registry and pushed. Either way the final reference is recorded in the
/// environment under `SERVICE_<NAME>_IMAGE_NAME`.
pub async fn publish_image(
    ctx: &OperationContext,
    project: &ProjectConfig,
    config: &ServiceConfig,
    service_ctx: &ServiceContext,
    image_override: Option<&str>,
    progress: &ProgressSink,
) -> Result<PublishResult> {
    let image = service_ctx
        .package
        .find_first(kind_eq(ArtifactKind::ContainerImage))
        .ok_or_else(|| {
            Error::config(format!(
                "service '{}' has no container image to publish",
                config.name
            ))
        })?;

    let local_reference = match image_override {
        Some(reference) => reference.to_string(),
        None => image.location.clone(),
    };

    // Already qualified with a registry: nothing to push.
    if image.location_kind == LocationKind::Remote
        && image_reference_registry(&local_reference).is_some()
    {
        debug!(
            "Image {} already carries a registry component, skipping push",
            local_reference
        );
        ctx.environment
            .set_service_image(&config.name, &local_reference)?;
        return Ok(PublishResult {
            artifacts: Artifact::remote(ArtifactKind::ContainerImage, local_reference)?.into(),
        });
    }

    let registry = ctx.environment.get(KEY_CONTAINER_REGISTRY).ok_or_else(|| {
        Error::config(format!(
            "{} is not set; cannot push image for service '{}'",
            KEY_CONTAINER_REGISTRY, config.name
        ))
    })?;

    report(progress, format!("Logging into registry {}", registry)).await;
    let mut login = ToolCommand::new("docker");
    login.args(["login", &registry]);
    ctx.runner.run_checked(login, &ctx.cancel, None).await?;

    let remote_reference = format!(
        "{}/{}/{}:{}",
        registry,
        project.name,
        config.name,
        chrono::Utc::now().timestamp()
    );

    report(progress, format!("Tagging {}", remote_reference)).await;
    let mut tag = ToolCommand::new("docker");
    tag.args(["tag", &local_reference, &remote_reference]);
    ctx.runner.run_checked(tag, &ctx.cancel, None).await?;

    report(progress, format!("Pushing {}", remote_reference)).await;
    let mut push = ToolCommand::new("docker");
    push.args(["push", &remote_reference]);
    ctx.runner.run_checked(push, &ctx.cancel, None).await?;

    info!("Pushed image {}", remote_reference);
    ctx.environment
        .set_service_image(&config.name, &remote_reference)?;

    Ok(PublishResult {
        artifacts: Artifact::remote(ArtifactKind::ContainerImage, remote_reference)?.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_service_name_sanitisation() {
        assert_eq!(sanitize_env_service_name("api"), "API");
        assert_eq!(sanitize_env_service_name("web-frontend"), "WEB_FRONTEND");
        assert_eq!(sanitize_env_service_name("svc.v2"), "SVC_V2");
    }

    #[test]
    fn test_registry_component_detection() {
        assert_eq!(
            image_reference_registry("myreg.azurecr.io/store/api:1"),
            Some("myreg.azurecr.io")
        );
        assert_eq!(
            image_reference_registry("localhost:5000/api:1"),
            Some("localhost:5000")
        );
        assert_eq!(image_reference_registry("localhost/api:1"), Some("localhost"));
        assert_eq!(image_reference_registry("store/api:1"), None);
        assert_eq!(image_reference_registry("nginx:latest"), None);
    }
}
