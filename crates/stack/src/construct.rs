//! The composition object every construct writes into.

use serde_json::{json, Value};
use tracing::debug;

use crate::error::SynthError;
use crate::template::{Expr, LogicalId, Output, Resource, Template};

/// Metadata key recording where a resource was declared.
pub const PATH_METADATA_KEY: &str = "ConstructPath";

/// Target account and region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    pub account: Option<String>,
    pub region: Option<String>,
}

impl Environment {
    /// `aws://<account>/<region>`, with `unknown-*` for unresolved parts.
    #[must_use]
    pub fn label(&self) -> String {
        format!(
            "aws://{}/{}",
            self.account.as_deref().unwrap_or("unknown-account"),
            self.region.as_deref().unwrap_or("unknown-region")
        )
    }

    /// The region as a literal when known, `AWS::Region` otherwise.
    #[must_use]
    pub fn region_expr(&self) -> Expr {
        self.region
            .as_ref()
            .map_or_else(Expr::region, |r| Expr::lit(r.clone()))
    }
}

/// A position in the construct tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    path: Vec<String>,
}

impl Scope {
    /// The stack root.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// A child scope.
    #[must_use]
    pub fn child(&self, id: &str) -> Self {
        let mut path = self.path.clone();
        path.push(id.to_string());
        Self { path }
    }

    /// Path components below the stack.
    #[must_use]
    pub fn components(&self) -> Vec<&str> {
        self.path.iter().map(String::as_str).collect()
    }
}

/// A stack under construction.
///
/// Constructs receive `&mut Stack` and add resources to it; nothing else is
/// shared between them.
#[derive(Debug)]
pub struct Stack {
    name: String,
    environment: Environment,
    template: Template,
}

impl Stack {
    /// Start an empty stack.
    #[must_use]
    pub fn new(name: impl Into<String>, environment: Environment, description: Option<String>) -> Self {
        Self {
            name: name.into(),
            environment,
            template: Template::new(description),
        }
    }

    /// Stack name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Target environment.
    #[must_use]
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Declare a resource at `scope/id` and return its logical ID.
    ///
    /// # Errors
    /// Returns [`SynthError::DuplicateId`] if the path was already used.
    pub fn add(&mut self, scope: &Scope, id: &str, mut resource: Resource) -> Result<LogicalId, SynthError> {
        let mut components = scope.components();
        components.push(id);
        let logical_id = LogicalId::from_path(&components);

        let path = format!("{}/{}", self.name, components.join("/"));
        resource
            .metadata
            .insert(PATH_METADATA_KEY.to_string(), Value::String(path));

        debug!(logical_id = %logical_id, resource_type = %resource.resource_type, "Declared resource");
        self.template.add_resource(logical_id.clone(), resource)?;
        Ok(logical_id)
    }

    /// Publish a stack output.
    ///
    /// # Errors
    /// Returns [`SynthError::DuplicateId`] if the name was already used.
    pub fn add_output(&mut self, name: &str, output: Output) -> Result<(), SynthError> {
        debug!(output = %name, "Declared output");
        self.template.add_output(LogicalId::from_path(&[name]), output)
    }

    /// `Name` tag value for a resource at `scope`: `<stack>/<path>`.
    #[must_use]
    pub fn name_tag(&self, scope: &Scope) -> Value {
        let mut path = self.name.clone();
        for component in scope.components() {
            path.push('/');
            path.push_str(component);
        }
        json!([{ "Key": "Name", "Value": path }])
    }

    /// The template built so far.
    #[must_use]
    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Finish construction.
    #[must_use]
    pub fn into_template(self) -> Template {
        self.template
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_records_construct_path() {
        let mut stack = Stack::new("TestStack", Environment::default(), None);
        let scope = Scope::root().child("Config");
        let id = stack
            .add(&scope, "LiteLLMKey", Resource::new("AWS::KMS::Key", json!({})))
            .unwrap();

        let resource = stack.template().resource(&id).unwrap();
        assert_eq!(
            resource.metadata[PATH_METADATA_KEY],
            Value::String("TestStack/Config/LiteLLMKey".to_string())
        );
        assert!(stack
            .add(&scope, "LiteLLMKey", Resource::new("AWS::KMS::Key", json!({})))
            .is_err());
    }

    #[test]
    fn test_environment_label_and_region() {
        let env = Environment {
            account: Some("123456789012".to_string()),
            region: None,
        };
        assert_eq!(env.label(), "aws://123456789012/unknown-region");
        assert_eq!(env.region_expr(), Expr::region());
    }
}
