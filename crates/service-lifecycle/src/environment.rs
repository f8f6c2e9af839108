//! Project-scoped environment store with persisted values

use crate::{Error, Result};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Well-known key: the target subscription id
pub const KEY_SUBSCRIPTION_ID: &str = "AZURE_SUBSCRIPTION_ID";
/// Well-known key: the target resource group
pub const KEY_RESOURCE_GROUP: &str = "AZURE_RESOURCE_GROUP";
/// Well-known key: the container registry endpoint images are pushed to
pub const KEY_CONTAINER_REGISTRY: &str = "AZURE_CONTAINER_REGISTRY_ENDPOINT";

/// A batch of environment values that changed together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvUpdate {
    /// The changed key/value pairs, in write order
    pub values: Vec<(String, String)>,
}

/// Handler invoked when environment values change (e.g. IaC outputs landing)
pub type EnvUpdateHandler = Arc<
    dyn Fn(EnvUpdate) -> BoxFuture<'static, std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>>
        + Send
        + Sync,
>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedEnvironment {
    #[serde(default)]
    values: HashMap<String, String>,
}

struct Inner {
    name: String,
    // None for ephemeral (test) environments
    file: Option<PathBuf>,
    values: HashMap<String, String>,
}

/// Shared, write-serialised access to one project environment.
///
/// Values persist under `.azure/<env>/env.json` in the project root and are
/// only ever written through this manager. Readers tolerate interleaved
/// writes: every read observes a consistent snapshot.
#[derive(Clone)]
pub struct EnvironmentManager {
    inner: Arc<Mutex<Inner>>,
    update_handlers: Arc<Mutex<Vec<EnvUpdateHandler>>>,
}

impl EnvironmentManager {
    /// Load (or create) the named environment under the project root
    pub fn load(project_root: impl Into<PathBuf>, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let dir = project_root.into().join(".azure").join(&name);
        std::fs::create_dir_all(&dir)?;
        let file = dir.join("env.json");

        let values = if file.is_file() {
            let content = std::fs::read_to_string(&file)?;
            let persisted: PersistedEnvironment =
                serde_json::from_str(&content).unwrap_or_default();
            persisted.values
        } else {
            HashMap::new()
        };

        debug!("Loaded environment '{}' ({} values)", name, values.len());
        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                name,
                file: Some(file),
                values,
            })),
            update_handlers: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Create an in-memory environment that never persists
    pub fn ephemeral(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                name: name.into(),
                file: None,
                values: HashMap::new(),
            })),
            update_handlers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The environment name
    pub fn name(&self) -> String {
        self.inner.lock().unwrap().name.clone()
    }

    /// Read one value
    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().unwrap().values.get(key).cloned()
    }

    /// Snapshot of every value at this instant
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.inner.lock().unwrap().values.clone()
    }

    /// Write one value and persist
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.values.insert(key.into(), value.into());
        persist(&inner)
    }

    /// Write a batch of values and persist once
    pub fn set_many(&self, values: &[(String, String)]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for (key, value) in values {
            inner.values.insert(key.clone(), value.clone());
        }
        persist(&inner)
    }

    /// The configured subscription id, if any
    pub fn subscription_id(&self) -> Option<String> {
        self.get(KEY_SUBSCRIPTION_ID)
    }

    /// The configured resource group, if any
    pub fn resource_group(&self) -> Option<String> {
        self.get(KEY_RESOURCE_GROUP)
    }

    /// Record the pushed image reference for a service
    /// (`SERVICE_<NAME>_IMAGE_NAME`)
    pub fn set_service_image(&self, service: &str, image: &str) -> Result<()> {
        self.set(
            format!(
                "SERVICE_{}_IMAGE_NAME",
                crate::container::sanitize_env_service_name(service)
            ),
            image,
        )
    }

    /// Record whether a service's target resource already exists
    /// (`SERVICE_<NAME>_RESOURCE_EXISTS`)
    pub fn set_resource_exists(&self, service: &str, exists: bool) -> Result<()> {
        self.set(
            format!(
                "SERVICE_{}_RESOURCE_EXISTS",
                crate::container::sanitize_env_service_name(service)
            ),
            exists.to_string(),
        )
    }

    /// Register a handler fired whenever values change via
    /// [`set_and_notify`](Self::set_and_notify)
    pub fn on_update(&self, handler: EnvUpdateHandler) {
        self.update_handlers.lock().unwrap().push(handler);
    }

    /// Write a batch of values, persist, and notify update handlers in
    /// registration order. A failing handler aborts the notification chain.
    pub async fn set_and_notify(&self, values: Vec<(String, String)>) -> Result<()> {
        self.set_many(&values)?;

        let handlers: Vec<EnvUpdateHandler> = self.update_handlers.lock().unwrap().clone();
        let update = EnvUpdate { values };
        for handler in handlers {
            handler(update.clone()).await.map_err(|e| Error::EventHandler {
                event: "environment-updated".to_string(),
                message: e.to_string(),
            })?;
        }
        Ok(())
    }
}

fn persist(inner: &Inner) -> Result<()> {
    let Some(file) = &inner.file else {
        return Ok(());
    };
    let persisted = PersistedEnvironment {
        values: inner.values.clone(),
    };
    match serde_json::to_string_pretty(&persisted) {
        Ok(json) => std::fs::write(file, json)?,
        Err(e) => warn!("Failed to serialise environment: {}", e),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let env = EnvironmentManager::load(dir.path(), "dev").unwrap();
        env.set(KEY_SUBSCRIPTION_ID, "sub-123").unwrap();
        env.set_service_image("api", "reg.io/store/api:1").unwrap();

        let reloaded = EnvironmentManager::load(dir.path(), "dev").unwrap();
        assert_eq!(reloaded.subscription_id().as_deref(), Some("sub-123"));
        assert_eq!(
            reloaded.get("SERVICE_API_IMAGE_NAME").as_deref(),
            Some("reg.io/store/api:1")
        );
    }

    #[test]
    fn test_service_name_is_sanitised_for_env_keys() {
        let env = EnvironmentManager::ephemeral("dev");
        env.set_resource_exists("web-frontend", true).unwrap();
        assert_eq!(
            env.get("SERVICE_WEB_FRONTEND_RESOURCE_EXISTS").as_deref(),
            Some("true")
        );
    }

    #[smol_potat::test]
    async fn test_update_handlers_fire_in_order() {
        let env = EnvironmentManager::ephemeral("dev");
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let seen = seen.clone();
            env.on_update(Arc::new(move |update: EnvUpdate| {
                let seen = seen.clone();
                Box::pin(async move {
                    seen.lock().unwrap().push((tag, update.values.len()));
                    Ok(())
                })
            }));
        }

        env.set_and_notify(vec![("KEY".to_string(), "value".to_string())])
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![("first", 1), ("second", 1)]);
        assert_eq!(env.get("KEY").as_deref(), Some("value"));
    }

    #[smol_potat::test]
    async fn test_failing_update_handler_surfaces() {
        let env = EnvironmentManager::ephemeral("dev");
        env.on_update(Arc::new(|_| {
            Box::pin(async { Err("secret store unavailable".into()) })
        }));

        let err = env
            .set_and_notify(vec![("KEY".to_string(), "value".to_string())])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EventHandler { .. }));
    }
}
