//! Expandable strings resolved against an environment on demand

use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

fn var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("static pattern"))
}

/// A string template like `${VAR}` resolved at the last possible moment.
///
/// Templates are never resolved at parse time; plug-ins that need the
/// concrete value call [`resolve`](Expandable::resolve) against the current
/// environment. `${VAR:-default}` falls back when the variable is unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Expandable(String);

impl Expandable {
    /// Wrap a raw template
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    /// The unresolved template text
    pub fn template(&self) -> &str {
        &self.0
    }

    /// Whether the template contains any variable references
    pub fn has_references(&self) -> bool {
        var_pattern().is_match(&self.0)
    }

    /// Resolve every `${VAR}` reference through the given lookup
    pub fn resolve<F>(&self, lookup: F) -> Result<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut result = self.0.clone();

        for cap in var_pattern().captures_iter(&self.0) {
            let full_match = &cap[0];
            let var_expr = &cap[1];

            // Handle default values: ${VAR:-default}
            let (var_name, default_value) = match var_expr.find(":-") {
                Some(pos) => (&var_expr[..pos], Some(&var_expr[pos + 2..])),
                None => (var_expr, None),
            };

            match lookup(var_name).or_else(|| default_value.map(String::from)) {
                Some(value) => {
                    result = result.replace(full_match, &value);
                }
                None => {
                    return Err(Error::UnresolvedVariable {
                        name: var_name.to_string(),
                    });
                }
            }
        }

        Ok(result)
    }

    /// Resolve against the process environment
    pub fn resolve_env(&self) -> Result<String> {
        self.resolve(|name| std::env::var(name).ok())
    }
}

impl From<&str> for Expandable {
    fn from(template: &str) -> Self {
        Self::new(template)
    }
}

impl From<String> for Expandable {
    fn from(template: String) -> Self {
        Self(template)
    }
}

impl std::fmt::Display for Expandable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "REGISTRY" => Some("myreg.io".to_string()),
            "TAG" => Some("v2".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_literal_passes_through() {
        let expandable = Expandable::new("plain-value");
        assert!(!expandable.has_references());
        assert_eq!(expandable.resolve(lookup).unwrap(), "plain-value");
    }

    #[test]
    fn test_references_resolve_late() {
        let expandable = Expandable::new("${REGISTRY}/app:${TAG}");
        assert_eq!(expandable.template(), "${REGISTRY}/app:${TAG}");
        assert_eq!(expandable.resolve(lookup).unwrap(), "myreg.io/app:v2");
    }

    #[test]
    fn test_default_value_fallback() {
        let expandable = Expandable::new("${MISSING:-fallback}");
        assert_eq!(expandable.resolve(lookup).unwrap(), "fallback");
    }

    #[test]
    fn test_unresolved_reference_errors() {
        let expandable = Expandable::new("${MISSING}");
        let err = expandable.resolve(lookup).unwrap_err();
        assert!(matches!(err, Error::UnresolvedVariable { name } if name == "MISSING"));
    }
}
