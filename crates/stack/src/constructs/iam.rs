//! IAM roles and policy documents.
//!
//! Grants accumulate on a [`Role`] before it is declared; declaring it merges
//! statements that target the same resources so the rendered policy stays
//! small and readable.

use serde_json::{json, Value};

use crate::construct::{Scope, Stack};
use crate::error::SynthError;
use crate::template::{Expr, LogicalId, Resource};

/// Policy language version.
pub const POLICY_VERSION: &str = "2012-10-17";

/// Statement effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

/// A single policy statement.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyStatement {
    pub effect: Effect,
    pub principal: Option<Value>,
    pub actions: Vec<String>,
    pub resources: Vec<Expr>,
    pub condition: Option<Value>,
}

impl PolicyStatement {
    /// Allow `actions` on `resources`.
    #[must_use]
    pub fn allow(actions: &[&str], resources: Vec<Expr>) -> Self {
        Self {
            effect: Effect::Allow,
            principal: None,
            actions: actions.iter().map(|a| (*a).to_string()).collect(),
            resources,
            condition: None,
        }
    }

    /// Deny `actions` on `resources`.
    #[must_use]
    pub fn deny(actions: &[&str], resources: Vec<Expr>) -> Self {
        Self {
            effect: Effect::Deny,
            ..Self::allow(actions, resources)
        }
    }

    /// Set the principal (resource policies only).
    #[must_use]
    pub fn with_principal(mut self, principal: Value) -> Self {
        self.principal = Some(principal);
        self
    }

    /// Set the condition block.
    #[must_use]
    pub fn with_condition(mut self, condition: Value) -> Self {
        self.condition = Some(condition);
        self
    }

    fn to_value(&self) -> Value {
        let mut statement = serde_json::Map::new();
        statement.insert(
            "Effect".to_string(),
            json!(match self.effect {
                Effect::Allow => "Allow",
                Effect::Deny => "Deny",
            }),
        );
        if let Some(principal) = &self.principal {
            statement.insert("Principal".to_string(), principal.clone());
        }
        statement.insert("Action".to_string(), one_or_many(self.actions.iter().map(|a| json!(a))));
        statement.insert(
            "Resource".to_string(),
            one_or_many(self.resources.iter().map(Expr::to_value)),
        );
        if let Some(condition) = &self.condition {
            statement.insert("Condition".to_string(), condition.clone());
        }
        Value::Object(statement)
    }

    fn mergeable_with(&self, other: &Self) -> bool {
        self.effect == other.effect
            && self.principal == other.principal
            && self.condition == other.condition
            && self.resources == other.resources
    }
}

fn one_or_many(values: impl Iterator<Item = Value>) -> Value {
    let mut values: Vec<Value> = values.collect();
    if values.len() == 1 {
        values.remove(0)
    } else {
        Value::Array(values)
    }
}

/// An ordered list of statements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyDocument {
    statements: Vec<PolicyStatement>,
}

impl PolicyDocument {
    /// Append a statement.
    pub fn add(&mut self, statement: PolicyStatement) {
        self.statements.push(statement);
    }

    /// Whether there are no statements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Statements after merging.
    #[must_use]
    pub fn statements(&self) -> Vec<PolicyStatement> {
        let mut merged: Vec<PolicyStatement> = Vec::new();
        for statement in &self.statements {
            if let Some(existing) = merged.iter_mut().find(|m| m.mergeable_with(statement)) {
                existing.actions.extend(statement.actions.iter().cloned());
            } else {
                merged.push(statement.clone());
            }
        }
        for statement in &mut merged {
            statement.actions.sort();
            statement.actions.dedup();
        }
        merged
    }

    /// Render as a policy document.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let statements: Vec<Value> = self.statements().iter().map(PolicyStatement::to_value).collect();
        json!({ "Version": POLICY_VERSION, "Statement": statements })
    }
}

/// A role that collects grants, then gets declared.
#[derive(Debug)]
pub struct Role {
    scope: Scope,
    id: String,
    assumed_by: String,
    description: String,
    managed_policy_arns: Vec<Expr>,
    policy: PolicyDocument,
}

impl Role {
    /// A role at `scope/id` assumable by the given service principal.
    #[must_use]
    pub fn new(scope: &Scope, id: &str, assumed_by: &str, description: impl Into<String>) -> Self {
        Self {
            scope: scope.clone(),
            id: id.to_string(),
            assumed_by: assumed_by.to_string(),
            description: description.into(),
            managed_policy_arns: Vec::new(),
            policy: PolicyDocument::default(),
        }
    }

    /// Attach an AWS-managed policy by name (e.g. `service-role/AWSLambdaBasicExecutionRole`).
    #[must_use]
    pub fn with_managed_policy(mut self, name: &str) -> Self {
        self.managed_policy_arns.push(Expr::concat([
            Expr::lit("arn:"),
            Expr::partition(),
            Expr::lit(format!(":iam::aws:policy/{name}")),
        ]));
        self
    }

    /// Add a statement to the role's inline policy.
    pub fn add_to_policy(&mut self, statement: PolicyStatement) {
        self.policy.add(statement);
    }

    /// The inline policy accumulated so far.
    #[must_use]
    pub fn policy(&self) -> &PolicyDocument {
        &self.policy
    }

    /// Declare the role.
    ///
    /// # Errors
    /// Returns an error if the role's path is already used.
    pub fn declare(self, stack: &mut Stack) -> Result<LogicalId, SynthError> {
        let mut properties = json!({
            "AssumeRolePolicyDocument": {
                "Version": POLICY_VERSION,
                "Statement": [{
                    "Effect": "Allow",
                    "Principal": { "Service": self.assumed_by },
                    "Action": "sts:AssumeRole"
                }]
            },
            "Description": self.description,
        });
        if !self.managed_policy_arns.is_empty() {
            properties["ManagedPolicyArns"] = json!(self.managed_policy_arns);
        }
        if !self.policy.is_empty() {
            properties["Policies"] = json!([{
                "PolicyName": "DefaultPolicy",
                "PolicyDocument": self.policy.to_value(),
            }]);
        }

        stack.add(&self.scope, &self.id, Resource::new("AWS::IAM::Role", properties))
    }
}
