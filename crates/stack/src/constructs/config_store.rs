//! Secrets and configuration provider.
//!
//! Declares the stack's encryption key, the private config bucket, the UI
//! password and master key secrets, and the combined provider API key secret.
//! The config document itself is written into the bucket by
//! [`Housekeeping`](super::housekeeping::Housekeeping).

use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Map, Value};
use tracing::info;

use super::housekeeping::Housekeeping;
use super::iam::{PolicyDocument, PolicyStatement, Role};
use crate::config::{StackConfig, PLACEHOLDER_API_KEY};
use crate::construct::{Scope, Stack};
use crate::document::ConfigDocument;
use crate::error::SynthError;
use crate::template::{Expr, LogicalId, RemovalPolicy, Resource};

/// Object key the config document is written to.
pub const CONFIG_OBJECT_KEY: &str = "config/config.yaml";

/// Length of generated secret values.
pub const GENERATED_SECRET_LENGTH: u32 = 32;

/// Characters never used in generated secret values.
pub const EXCLUDED_CHARACTERS: &str = " %+~`#$&*()|[]{}:;<>?!'/@\"\\";

// =============================================================================
// Encryption key
// =============================================================================

/// The stack's customer-managed KMS key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionKey {
    pub id: LogicalId,
}

impl EncryptionKey {
    fn declare(stack: &mut Stack, scope: &Scope, removal: RemovalPolicy) -> Result<Self, SynthError> {
        let root = Expr::concat([
            Expr::lit("arn:"),
            Expr::partition(),
            Expr::lit(":iam::"),
            Expr::account_id(),
            Expr::lit(":root"),
        ]);
        let mut policy = PolicyDocument::default();
        policy.add(
            PolicyStatement::allow(&["kms:*"], vec![Expr::lit("*")]).with_principal(json!({ "AWS": root })),
        );

        let id = stack.add(
            scope,
            "LiteLLMKey",
            Resource::new(
                "AWS::KMS::Key",
                json!({
                    "Description": "KMS key for LiteLLM resources",
                    "EnableKeyRotation": true,
                    "KeyPolicy": policy.to_value(),
                }),
            )
            .with_removal_policy(removal),
        )?;
        Ok(Self { id })
    }

    /// Key ARN.
    #[must_use]
    pub fn arn(&self) -> Expr {
        self.id.get_att("Arn")
    }

    /// Allow `role` to decrypt with the key.
    pub fn grant_decrypt(&self, role: &mut Role) {
        role.add_to_policy(PolicyStatement::allow(&["kms:Decrypt"], vec![self.arn()]));
    }

    /// Allow `role` to encrypt and decrypt with the key.
    pub fn grant_encrypt_decrypt(&self, role: &mut Role) {
        role.add_to_policy(PolicyStatement::allow(
            &["kms:Decrypt", "kms:Encrypt", "kms:GenerateDataKey*", "kms:ReEncrypt*"],
            vec![self.arn()],
        ));
    }
}

// =============================================================================
// Config bucket
// =============================================================================

/// The private, SSL-only, key-encrypted config bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigBucket {
    pub id: LogicalId,
    pub policy_id: LogicalId,
    key_arn: Expr,
}

impl ConfigBucket {
    fn declare(
        stack: &mut Stack,
        scope: &Scope,
        key: &EncryptionKey,
        production: bool,
        removal: RemovalPolicy,
    ) -> Result<Self, SynthError> {
        let mut properties = json!({
            "BucketEncryption": {
                "ServerSideEncryptionConfiguration": [{
                    "ServerSideEncryptionByDefault": {
                        "SSEAlgorithm": "aws:kms",
                        "KMSMasterKeyID": key.arn(),
                    }
                }]
            },
            "PublicAccessBlockConfiguration": {
                "BlockPublicAcls": true,
                "BlockPublicPolicy": true,
                "IgnorePublicAcls": true,
                "RestrictPublicBuckets": true,
            },
        });
        if production {
            properties["VersioningConfiguration"] = json!({ "Status": "Enabled" });
        }

        let id = stack.add(
            scope,
            "LiteLLMS3Bucket",
            Resource::new("AWS::S3::Bucket", properties).with_removal_policy(removal),
        )?;

        let arn = id.get_att("Arn");
        let mut policy = PolicyDocument::default();
        policy.add(
            PolicyStatement::deny(&["s3:*"], vec![arn.clone(), objects_of(&arn)])
                .with_principal(json!({ "AWS": "*" }))
                .with_condition(json!({ "Bool": { "aws:SecureTransport": "false" } })),
        );
        let policy_id = stack.add(
            &scope.child("LiteLLMS3Bucket"),
            "Policy",
            Resource::new(
                "AWS::S3::BucketPolicy",
                json!({ "Bucket": id.reference(), "PolicyDocument": policy.to_value() }),
            ),
        )?;

        Ok(Self {
            id,
            policy_id,
            key_arn: key.arn(),
        })
    }

    /// Bucket name.
    #[must_use]
    pub fn bucket_name(&self) -> Expr {
        self.id.reference()
    }

    /// Bucket ARN.
    #[must_use]
    pub fn arn(&self) -> Expr {
        self.id.get_att("Arn")
    }

    /// ARN pattern covering every object in the bucket.
    #[must_use]
    pub fn objects_arn(&self) -> Expr {
        objects_of(&self.arn())
    }

    /// Allow `role` to read and list the bucket and decrypt its objects.
    pub fn grant_read(&self, role: &mut Role) {
        role.add_to_policy(PolicyStatement::allow(
            &["s3:GetBucket*", "s3:GetObject*", "s3:List*"],
            vec![self.arn(), self.objects_arn()],
        ));
        role.add_to_policy(PolicyStatement::allow(&["kms:Decrypt"], vec![self.key_arn.clone()]));
    }
}

fn objects_of(bucket_arn: &Expr) -> Expr {
    Expr::concat([bucket_arn.clone(), Expr::lit("/*")])
}

// =============================================================================
// Secrets
// =============================================================================

/// A Secrets Manager secret declared in this stack.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedSecret {
    pub id: LogicalId,
    key_arn: Option<Expr>,
}

/// Where a secret's value comes from.
#[derive(Debug)]
pub(crate) enum SecretValue<'a> {
    /// Operator-supplied literal.
    Literal(&'a SecretString),
    /// Generated by Secrets Manager at deploy time.
    Generated,
    /// Generated password inside a JSON object with fixed fields.
    GeneratedJson { template: Value, key: &'a str },
    /// A JSON object of literals.
    Object(Map<String, Value>),
    /// An expression only CloudFormation can resolve.
    Resolved(Expr),
}

impl ManagedSecret {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn declare(
        stack: &mut Stack,
        scope: &Scope,
        id: &str,
        description: &str,
        name: Option<&str>,
        value: SecretValue<'_>,
        key: Option<&EncryptionKey>,
        removal: RemovalPolicy,
    ) -> Result<Self, SynthError> {
        let mut properties = json!({ "Description": description });
        if let Some(name) = name {
            properties["Name"] = json!(name);
        }
        if let Some(key) = key {
            properties["KmsKeyId"] = key.arn().to_value();
        }
        match value {
            SecretValue::Literal(secret) => {
                properties["SecretString"] = json!(secret.expose_secret());
            }
            SecretValue::Generated => {
                properties["GenerateSecretString"] = generator(None);
            }
            SecretValue::GeneratedJson { template, key } => {
                properties["GenerateSecretString"] = generator(Some((&template, key)));
            }
            SecretValue::Object(object) => {
                properties["SecretString"] = json!(Value::Object(object).to_string());
            }
            SecretValue::Resolved(expr) => {
                properties["SecretString"] = expr.to_value();
            }
        }

        let id = stack.add(
            scope,
            id,
            Resource::new("AWS::SecretsManager::Secret", properties).with_removal_policy(removal),
        )?;
        Ok(Self {
            id,
            key_arn: key.map(EncryptionKey::arn),
        })
    }

    /// Secret ARN (a secret's `Ref` is its ARN).
    #[must_use]
    pub fn arn(&self) -> Expr {
        self.id.reference()
    }

    /// ECS `ValueFrom` for one JSON field of the secret.
    #[must_use]
    pub fn field_value_from(&self, field: &str) -> Expr {
        Expr::concat([self.arn(), Expr::lit(format!(":{field}::"))])
    }

    /// Allow `role` to read the secret (and decrypt it, if key-encrypted).
    pub fn grant_read(&self, role: &mut Role) {
        role.add_to_policy(PolicyStatement::allow(
            &["secretsmanager:DescribeSecret", "secretsmanager:GetSecretValue"],
            vec![self.arn()],
        ));
        if let Some(key_arn) = &self.key_arn {
            role.add_to_policy(PolicyStatement::allow(&["kms:Decrypt"], vec![key_arn.clone()]));
        }
    }
}

fn generator(json_template: Option<(&Value, &str)>) -> Value {
    let mut generator = json!({
        "PasswordLength": GENERATED_SECRET_LENGTH,
        "ExcludeCharacters": EXCLUDED_CHARACTERS,
    });
    if let Some((template, key)) = json_template {
        generator["SecretStringTemplate"] = json!(template.to_string());
        generator["GenerateStringKey"] = json!(key);
    }
    generator
}

// =============================================================================
// Config store
// =============================================================================

/// Everything [`ConfigStore::build`] declares.
#[derive(Debug)]
pub struct ConfigStore {
    pub key: EncryptionKey,
    pub bucket: ConfigBucket,
    pub config_object_key: &'static str,
    pub config_object: LogicalId,
    pub ui_password: ManagedSecret,
    pub master_key: ManagedSecret,
    pub api_secrets: ManagedSecret,
    pub removal_policy: RemovalPolicy,
}

impl ConfigStore {
    /// Declare the key, bucket, document upload and secrets.
    ///
    /// # Errors
    /// Returns an error if any resource cannot be declared.
    pub fn build(
        stack: &mut Stack,
        scope: &Scope,
        config: &StackConfig,
        document: &ConfigDocument,
    ) -> Result<Self, SynthError> {
        let removal = RemovalPolicy::for_mode(config.production);

        let key = EncryptionKey::declare(stack, scope, removal)?;
        let bucket = ConfigBucket::declare(stack, scope, &key, config.production, removal)?;

        let housekeeping = Housekeeping::build(stack, &scope.child("Housekeeping"), &bucket, &key, config.production)?;
        let config_object = housekeeping.upload_document(stack, scope, &bucket, CONFIG_OBJECT_KEY, document)?;

        let ui_value = config
            .ui_password_override
            .as_ref()
            .map_or(SecretValue::Generated, SecretValue::Literal);
        let ui_password = ManagedSecret::declare(
            stack,
            scope,
            "LiteLLMUI",
            "Secret for LiteLLM UI",
            None,
            ui_value,
            Some(&key),
            removal,
        )?;

        let master_value = config
            .master_key_override
            .as_ref()
            .map_or(SecretValue::Generated, SecretValue::Literal);
        let master_key = ManagedSecret::declare(
            stack,
            scope,
            "LiteLLMMasterKey",
            "Secret for LiteLLM Master Key",
            None,
            master_value,
            Some(&key),
            removal,
        )?;

        let mut api_keys = Map::new();
        for (name, value) in config.api_keys.entries() {
            let value = value.map_or(PLACEHOLDER_API_KEY, |v| v.expose_secret().as_str());
            api_keys.insert(name.to_string(), json!(value));
        }
        let api_secrets = ManagedSecret::declare(
            stack,
            scope,
            "LiteLLMApiSecrets",
            "Secret for LiteLLM API",
            None,
            SecretValue::Object(api_keys),
            None,
            removal,
        )?;

        info!(
            production = config.production,
            ui_password = if config.ui_password_override.is_some() { "override" } else { "generated" },
            master_key = if config.master_key_override.is_some() { "override" } else { "generated" },
            "Declared config store"
        );

        Ok(Self {
            key,
            bucket,
            config_object_key: CONFIG_OBJECT_KEY,
            config_object,
            ui_password,
            master_key,
            api_secrets,
            removal_policy: removal,
        })
    }
}
