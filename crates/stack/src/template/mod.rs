//! CloudFormation template model.
//!
//! The template is the single artifact composition produces. Resources and
//! outputs are kept in sorted maps so the rendered JSON/YAML is byte-stable
//! across runs.

mod expr;
mod logical_id;
mod resource;

use std::collections::BTreeMap;

use serde::Serialize;

pub use expr::Expr;
pub use logical_id::LogicalId;
pub use resource::{Output, RemovalPolicy, Resource};

use crate::error::SynthError;

/// Template format version CloudFormation expects.
pub const FORMAT_VERSION: &str = "2010-09-09";

/// A CloudFormation template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    format_version: String,
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(rename = "Resources")]
    resources: BTreeMap<LogicalId, Resource>,
    #[serde(rename = "Outputs", skip_serializing_if = "BTreeMap::is_empty")]
    outputs: BTreeMap<LogicalId, Output>,
}

impl Default for Template {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Template {
    /// Create an empty template.
    #[must_use]
    pub fn new(description: Option<String>) -> Self {
        Self {
            format_version: FORMAT_VERSION.to_string(),
            description,
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Insert a resource.
    ///
    /// # Errors
    /// Returns [`SynthError::DuplicateId`] if the ID is already taken.
    pub fn add_resource(&mut self, id: LogicalId, resource: Resource) -> Result<(), SynthError> {
        if self.resources.contains_key(&id) {
            return Err(SynthError::DuplicateId(id.to_string()));
        }
        self.resources.insert(id, resource);
        Ok(())
    }

    /// Insert an output.
    ///
    /// # Errors
    /// Returns [`SynthError::DuplicateId`] if the output name is already taken.
    pub fn add_output(&mut self, id: LogicalId, output: Output) -> Result<(), SynthError> {
        if self.outputs.contains_key(&id) {
            return Err(SynthError::DuplicateId(id.to_string()));
        }
        self.outputs.insert(id, output);
        Ok(())
    }

    /// All resources, sorted by logical ID.
    pub fn resources(&self) -> impl Iterator<Item = (&LogicalId, &Resource)> {
        self.resources.iter()
    }

    /// A resource by logical ID.
    #[must_use]
    pub fn resource(&self, id: &LogicalId) -> Option<&Resource> {
        self.resources.get(id)
    }

    /// All resources of one CloudFormation type.
    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = (&'a LogicalId, &'a Resource)> + 'a {
        self.resources
            .iter()
            .filter(move |(_, r)| r.resource_type == resource_type)
    }

    /// All outputs, sorted by name.
    pub fn outputs(&self) -> impl Iterator<Item = (&LogicalId, &Output)> {
        self.outputs.iter()
    }

    /// An output by name.
    #[must_use]
    pub fn output(&self, name: &str) -> Option<&Output> {
        self.outputs.iter().find(|(id, _)| id.as_str() == name).map(|(_, o)| o)
    }

    /// Render as compact JSON. Inline `CloudFormation` templates are capped at
    /// 51,200 bytes, so no whitespace is spent on indentation.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, SynthError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Render as YAML.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> Result<String, SynthError> {
        Ok(serde_yaml::to_string(self)?)
    }
}
