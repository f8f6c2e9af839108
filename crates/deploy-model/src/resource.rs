//! Target cloud resource identity

use serde::{Deserialize, Serialize};

/// A concrete cloud resource the deploy phase activates against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetResource {
    /// Subscription id
    pub subscription_id: String,
    /// Resource group name
    pub resource_group: String,
    /// Resource name
    pub name: String,
    /// Provider type string, e.g. `Microsoft.Web/sites`
    pub kind: String,
}

impl TargetResource {
    /// Create a target resource identity
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        name: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            name: name.into(),
            kind: kind.into(),
        }
    }

    /// The ARM-style resource id
    pub fn resource_id(&self) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/{}/{}",
            self.subscription_id, self.resource_group, self.kind, self.name
        )
    }

    /// Whether this resource's type matches the expected type string,
    /// compared case-insensitively
    pub fn is_kind(&self, expected: &str) -> bool {
        self.kind.eq_ignore_ascii_case(expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_format() {
        let resource = TargetResource::new("sub-1", "rg-app", "api", "Microsoft.Web/sites");
        assert_eq!(
            resource.resource_id(),
            "/subscriptions/sub-1/resourceGroups/rg-app/providers/Microsoft.Web/sites/api"
        );
    }

    #[test]
    fn test_kind_match_is_case_insensitive() {
        let resource =
            TargetResource::new("sub", "rg", "web", "microsoft.web/staticSites");
        assert!(resource.is_kind("Microsoft.Web/staticSites"));
        assert!(!resource.is_kind("Microsoft.Web/sites"));
    }
}
