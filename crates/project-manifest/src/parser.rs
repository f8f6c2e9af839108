//! Manifest parsing, validation, and conversion to pipeline configuration

use crate::{Manifest, ManifestError, ManifestService, Result};
use deploy_model::{
    DockerOptions, Expandable, InfraConfig, ProjectConfig, ServiceConfig, ServiceHost,
    ServiceLanguage, SpringOptions,
};
use std::path::Path;
use tracing::debug;

/// Parse a YAML manifest file; the project root is the file's directory
pub fn parse_file(path: impl AsRef<Path>) -> Result<ProjectConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let root = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| ".".into());
    let manifest = parse_str(&content)?;
    convert_to_project(&manifest, root)
}

/// Parse a YAML manifest from a string
pub fn parse_str(content: &str) -> Result<Manifest> {
    let manifest: Manifest = serde_yaml::from_str(content)?;
    validate_manifest(&manifest)?;
    Ok(manifest)
}

fn validate_manifest(manifest: &Manifest) -> Result<()> {
    if manifest.name.is_empty() {
        return Err(ManifestError::Validation(
            "project name must not be empty".to_string(),
        ));
    }

    for (name, service) in &manifest.services {
        if service.project.is_empty() {
            return Err(ManifestError::Validation(format!(
                "service '{}' has no project path",
                name
            )));
        }
        if let Some(language) = &service.language {
            parse_language(name, language)?;
        }
        if service.host.is_empty() {
            return Err(ManifestError::Validation(format!(
                "service '{}' has no host",
                name
            )));
        }
    }

    Ok(())
}

/// Convert a parsed manifest into the pipeline's project configuration,
/// rehydrating service → project back-references
pub fn convert_to_project(
    manifest: &Manifest,
    root: impl Into<std::path::PathBuf>,
) -> Result<ProjectConfig> {
    let mut project = ProjectConfig::new(&manifest.name, root);
    project.template = manifest.metadata.template.clone();
    project.resource_group = Expandable::new(manifest.resource_group.clone().unwrap_or_default());
    project.infra = InfraConfig {
        provider: manifest.infra.provider.clone(),
        path: manifest.infra.path.clone().into(),
        module: manifest.infra.module.clone(),
    };

    for (name, service) in &manifest.services {
        project.add_service(convert_service(name, service)?);
    }

    debug!(
        "Loaded project '{}' with {} services",
        project.name,
        project.services.len()
    );
    Ok(project)
}

fn convert_service(name: &str, service: &ManifestService) -> Result<ServiceConfig> {
    let language = match &service.language {
        Some(language) => parse_language(name, language)?,
        None => ServiceLanguage::None,
    };

    let mut config = ServiceConfig::new(
        name,
        service.project.clone(),
        language,
        parse_host(&service.host),
    );
    config.output_path = service.output_path.clone().map(Into::into);
    config.image = service.image.clone().map(Expandable::new);
    config.api_version = service.api_version.clone();
    config.module = service.module.clone();
    config.docker = service.docker.as_ref().map(|docker| DockerOptions {
        path: docker
            .path
            .clone()
            .map(Expandable::new)
            .unwrap_or_else(|| Expandable::new("Dockerfile")),
        context: docker
            .context
            .clone()
            .map(Expandable::new)
            .unwrap_or_else(|| Expandable::new(".")),
        platform: docker.platform.clone().map(Expandable::new),
        target: docker.target.clone().map(Expandable::new),
        build_args: docker
            .build_args
            .iter()
            .cloned()
            .map(Expandable::new)
            .collect(),
    });
    config.spring = service.spring.as_ref().map(|spring| SpringOptions {
        deployment_name: spring.deployment_name.clone(),
    });
    config.config = service.config.clone();

    Ok(config)
}

fn parse_language(service: &str, language: &str) -> Result<ServiceLanguage> {
    match language {
        "dotnet" => Ok(ServiceLanguage::Dotnet),
        "csharp" => Ok(ServiceLanguage::CSharp),
        "fsharp" => Ok(ServiceLanguage::FSharp),
        "js" => Ok(ServiceLanguage::JavaScript),
        "ts" => Ok(ServiceLanguage::TypeScript),
        "py" | "python" => Ok(ServiceLanguage::Python),
        "java" => Ok(ServiceLanguage::Java),
        "docker" => Ok(ServiceLanguage::Docker),
        "none" => Ok(ServiceLanguage::None),
        other => Err(ManifestError::UnknownLanguage {
            service: service.to_string(),
            language: other.to_string(),
        }),
    }
}

fn parse_host(host: &str) -> ServiceHost {
    match host {
        "appservice" => ServiceHost::AppService,
        "function" => ServiceHost::Function,
        "containerapp" => ServiceHost::ContainerApp,
        "springapp" => ServiceHost::SpringApp,
        "staticwebapp" => ServiceHost::StaticWebApp,
        "aks" => ServiceHost::Aks,
        "ai.endpoint" => ServiceHost::AiEndpoint,
        "containerregistry" => ServiceHost::ContainerRegistry,
        // Unknown hosts resolve to the extension target of that name
        other => ServiceHost::External(other.to_string()),
    }
}
