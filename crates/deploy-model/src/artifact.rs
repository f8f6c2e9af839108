//! Typed artifacts produced by pipeline phases

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What an artifact is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    /// A directory tree on disk
    Directory,
    /// A zip/tar archive
    Archive,
    /// A container image reference
    ContainerImage,
    /// A reachable service URL
    Endpoint,
    /// A provider deployment record
    Deployment,
    /// A concrete cloud resource
    Resource,
    /// Configuration values with no backing location
    Config,
    /// A single file
    File,
    /// An executable binary
    Executable,
    /// A library artifact
    Library,
    /// A packaged helm chart
    HelmChart,
    /// An opaque blob in remote storage
    Blob,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ArtifactKind::Directory => "directory",
            ArtifactKind::Archive => "archive",
            ArtifactKind::ContainerImage => "container-image",
            ArtifactKind::Endpoint => "endpoint",
            ArtifactKind::Deployment => "deployment",
            ArtifactKind::Resource => "resource",
            ArtifactKind::Config => "config",
            ArtifactKind::File => "file",
            ArtifactKind::Executable => "executable",
            ArtifactKind::Library => "library",
            ArtifactKind::HelmChart => "helm-chart",
            ArtifactKind::Blob => "blob",
        };
        f.write_str(name)
    }
}

/// Whether an artifact location refers to the local filesystem or a remote URI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationKind {
    /// Local filesystem path
    Local,
    /// Remote URI (or canonical container reference)
    Remote,
}

/// A tagged record describing one output of a pipeline phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// What this artifact is
    pub kind: ArtifactKind,
    /// Local path or remote URI; semantics determined by `location_kind`
    pub location: String,
    /// How to interpret `location`
    pub location_kind: LocationKind,
    /// Free-form string metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Artifact {
    /// Create a local artifact, validating the location invariant
    pub fn local(kind: ArtifactKind, location: impl Into<String>) -> Result<Self> {
        let artifact = Self {
            kind,
            location: location.into(),
            location_kind: LocationKind::Local,
            metadata: HashMap::new(),
        };
        artifact.validate()?;
        Ok(artifact)
    }

    /// Create a remote artifact, validating that the location is a URI with a
    /// scheme. `docker://registry/image:tag` is canonicalised to
    /// `registry/image:tag`.
    pub fn remote(kind: ArtifactKind, location: impl Into<String>) -> Result<Self> {
        let location: String = location.into();
        let location = canonicalize_image_ref(&location).unwrap_or(location);
        let artifact = Self {
            kind,
            location,
            location_kind: LocationKind::Remote,
            metadata: HashMap::new(),
        };
        artifact.validate()?;
        Ok(artifact)
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Check the location invariants for this artifact
    pub fn validate(&self) -> Result<()> {
        if self.location.is_empty() {
            if self.kind == ArtifactKind::Config {
                return Ok(());
            }
            return Err(Error::EmptyArtifactLocation { kind: self.kind });
        }

        // Container references use the canonical registry/image:tag form and
        // ARM resource ids carry no scheme; everything else remote must be a
        // URI with a scheme.
        if self.location_kind == LocationKind::Remote
            && !matches!(
                self.kind,
                ArtifactKind::ContainerImage | ArtifactKind::Resource
            )
            && url::Url::parse(&self.location).is_err()
        {
            return Err(Error::InvalidRemoteLocation {
                location: self.location.clone(),
            });
        }

        Ok(())
    }
}

/// Strip a `docker://` scheme from a container reference, if present
pub(crate) fn canonicalize_image_ref(location: &str) -> Option<String> {
    location
        .strip_prefix("docker://")
        .map(|stripped| stripped.to_string())
}

/// Predicate matching artifacts of the given kind
pub fn kind_eq(kind: ArtifactKind) -> impl Fn(&Artifact) -> bool {
    move |artifact| artifact.kind == kind
}

/// An ordered sequence of artifacts with predicate-based lookups
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactCollection {
    items: Vec<Artifact>,
}

impl ArtifactCollection {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one artifact
    pub fn push(&mut self, artifact: Artifact) {
        self.items.push(artifact);
    }

    /// Append every artifact from another collection
    pub fn extend(&mut self, other: &ArtifactCollection) {
        self.items.extend(other.items.iter().cloned());
    }

    /// Number of artifacts
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the collection is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.items.iter()
    }

    /// First artifact satisfying the predicate
    pub fn find_first(&self, pred: impl Fn(&Artifact) -> bool) -> Option<&Artifact> {
        self.items.iter().find(|a| pred(a))
    }

    /// All artifacts satisfying the predicate, in order
    pub fn filter(&self, pred: impl Fn(&Artifact) -> bool) -> Vec<&Artifact> {
        self.items.iter().filter(|a| pred(a)).collect()
    }

    /// Location of the first artifact, if any
    pub fn primary_location(&self) -> Option<&str> {
        self.items.first().map(|a| a.location.as_str())
    }

    /// Location of the first artifact of the given kind, if any
    pub fn primary_location_by_kind(&self, kind: ArtifactKind) -> Option<&str> {
        self.find_first(kind_eq(kind)).map(|a| a.location.as_str())
    }
}

impl FromIterator<Artifact> for ArtifactCollection {
    fn from_iter<T: IntoIterator<Item = Artifact>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl From<Artifact> for ArtifactCollection {
    fn from(artifact: Artifact) -> Self {
        Self {
            items: vec![artifact],
        }
    }
}
