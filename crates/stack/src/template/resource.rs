//! Template resources, outputs and retention policies.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use super::{Expr, LogicalId};

/// What happens to a physical resource when it leaves the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RemovalPolicy {
    /// Keep the resource (and its data) after stack deletion.
    Retain,
    /// Delete the resource with the stack.
    #[serde(rename = "Delete")]
    Destroy,
    /// Take a final snapshot, then delete (databases only).
    Snapshot,
}

impl RemovalPolicy {
    /// `Retain` in production, `Destroy` otherwise.
    #[must_use]
    pub fn for_mode(production: bool) -> Self {
        if production {
            Self::Retain
        } else {
            Self::Destroy
        }
    }
}

/// A single entry of the template's `Resources` section.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    #[serde(rename = "Type")]
    pub resource_type: String,
    #[serde(rename = "Properties", skip_serializing_if = "Value::is_null")]
    pub properties: Value,
    #[serde(rename = "DependsOn", skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<LogicalId>,
    #[serde(rename = "DeletionPolicy", skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<RemovalPolicy>,
    #[serde(rename = "UpdateReplacePolicy", skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<RemovalPolicy>,
    #[serde(rename = "Metadata", skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl Resource {
    /// Create a resource of the given type with a JSON object of properties.
    #[must_use]
    pub fn new(resource_type: impl Into<String>, properties: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            properties,
            depends_on: Vec::new(),
            deletion_policy: None,
            update_replace_policy: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Apply the same policy to deletion and update-replacement.
    #[must_use]
    pub fn with_removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.deletion_policy = Some(policy);
        self.update_replace_policy = Some(policy);
        self
    }

    /// Add an explicit ordering dependency.
    #[must_use]
    pub fn depends_on(mut self, id: &LogicalId) -> Self {
        if !self.depends_on.contains(id) {
            self.depends_on.push(id.clone());
        }
        self
    }

    /// Top-level property by name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Nested property by `/`-separated path (array indices allowed).
    #[must_use]
    pub fn property_at(&self, path: &str) -> Option<&Value> {
        self.properties.pointer(&format!("/{path}"))
    }
}

/// A stack output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Output {
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "Value")]
    pub value: Expr,
}

impl Output {
    /// Create an output with the given value.
    #[must_use]
    pub fn new(value: Expr) -> Self {
        Self {
            description: None,
            value,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_removal_policy_serializes_to_cloudformation_names() {
        let resource = Resource::new("AWS::S3::Bucket", json!({}))
            .with_removal_policy(RemovalPolicy::Destroy);
        let value = serde_json::to_value(&resource).unwrap();

        assert_eq!(value["DeletionPolicy"], "Delete");
        assert_eq!(value["UpdateReplacePolicy"], "Delete");
        assert_eq!(RemovalPolicy::for_mode(true), RemovalPolicy::Retain);
    }

    #[test]
    fn test_empty_sections_are_omitted() {
        let value = serde_json::to_value(Resource::new("AWS::EC2::InternetGateway", Value::Null))
            .unwrap();
        assert_eq!(value, json!({ "Type": "AWS::EC2::InternetGateway" }));
    }

    #[test]
    fn test_property_lookup() {
        let resource = Resource::new(
            "AWS::ECS::Service",
            json!({ "DeploymentConfiguration": { "DeploymentCircuitBreaker": { "Rollback": true } } }),
        );
        assert_eq!(
            resource.property_at("DeploymentConfiguration/DeploymentCircuitBreaker/Rollback"),
            Some(&json!(true))
        );
        assert!(resource.property("Missing").is_none());
    }
}
