//! Values that must only ever be resolved by CloudFormation.

use std::fmt;

use crate::template::{Expr, LogicalId};

/// A value whose plaintext only exists once CloudFormation resolves it
/// during deployment (it is built from `{{resolve:secretsmanager:...}}`
/// dynamic references).
///
/// It is deliberately opaque: `Debug` is redacted, it is not `Serialize`,
/// it is not `Clone`, and the only way to turn it back into a template
/// expression is crate-private. The one sink is the service's secret
/// injection path, which stores it in an encrypted secret.
pub struct DeployTimeSecret {
    value: Expr,
}

impl DeployTimeSecret {
    pub(crate) fn new(value: Expr) -> Self {
        Self { value }
    }

    /// Consume the value for storage in a Secrets Manager secret.
    pub(crate) fn into_secret_string(self) -> Expr {
        self.value
    }
}

impl fmt::Debug for DeployTimeSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DeployTimeSecret([REDACTED])")
    }
}

/// `{{resolve:secretsmanager:<arn>:SecretString:<field>::}}` for a JSON field
/// of a secret declared in this template.
pub(crate) fn dynamic_reference(secret: &LogicalId, field: &str) -> Expr {
    Expr::concat([
        Expr::lit("{{resolve:secretsmanager:"),
        secret.reference(),
        Expr::lit(format!(":SecretString:{field}::}}}}")),
    ])
}
