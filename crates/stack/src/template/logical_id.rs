//! Logical IDs derived from construct paths.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use super::Expr;

/// Longest logical ID CloudFormation accepts.
const MAX_LOGICAL_ID_LEN: usize = 255;

/// Length of the hash suffix appended to nested paths.
const HASH_LEN: usize = 8;

/// The name of a resource inside the template.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalId(String);

impl LogicalId {
    /// Derive the logical ID for a construct path (stack name excluded).
    ///
    /// A single-component path maps to itself (sanitized). Deeper paths get
    /// a readable prefix made of every component plus an eight-character hash
    /// of the full path, so two paths that sanitize to the same prefix still
    /// get distinct IDs.
    #[must_use]
    pub fn from_path(components: &[&str]) -> Self {
        let human: String = components.iter().map(|c| sanitize(c)).collect();
        if components.len() <= 1 {
            return Self(human);
        }

        let mut hasher = Sha1::new();
        hasher.update(components.join("/").as_bytes());
        let digest = hex::encode_upper(hasher.finalize());

        let mut id = human;
        id.truncate(MAX_LOGICAL_ID_LEN - HASH_LEN);
        id.push_str(&digest[..HASH_LEN]);
        Self(id)
    }

    /// The ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `{"Ref": id}`.
    #[must_use]
    pub fn reference(&self) -> Expr {
        Expr::Ref(self.0.clone())
    }

    /// `{"Fn::GetAtt": [id, attribute]}`.
    #[must_use]
    pub fn get_att(&self, attribute: &str) -> Expr {
        Expr::GetAtt(self.0.clone(), attribute.to_string())
    }
}

impl fmt::Display for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LogicalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn sanitize(component: &str) -> String {
    component.chars().filter(char::is_ascii_alphanumeric).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_level_id_is_not_hashed() {
        assert_eq!(LogicalId::from_path(&["LoadBalancerDNS"]).as_str(), "LoadBalancerDNS");
        assert_eq!(LogicalId::from_path(&["Api-Secrets_1"]).as_str(), "ApiSecrets1");
    }

    #[test]
    fn test_nested_ids_are_deterministic_and_distinct() {
        let a = LogicalId::from_path(&["Config", "LiteLLMKey"]);
        let again = LogicalId::from_path(&["Config", "LiteLLMKey"]);
        // Same sanitized prefix, different path.
        let b = LogicalId::from_path(&["ConfigLiteLLM", "Key"]);

        assert_eq!(a, again);
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("ConfigLiteLLMKey"));
        assert_eq!(a.as_str().len(), "ConfigLiteLLMKey".len() + HASH_LEN);
        assert!(a.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_long_paths_are_truncated() {
        let long = "Segment".repeat(60);
        let id = LogicalId::from_path(&[&long, "Resource"]);
        assert_eq!(id.as_str().len(), MAX_LOGICAL_ID_LEN);
    }
}
