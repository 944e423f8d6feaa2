//! Bucket housekeeping custom resources.
//!
//! A small inline Lambda backs two custom resource types:
//!
//! - `Custom::ConfigObject` writes the config document to the bucket on
//!   create/update (a new content hash forces an update) and removes it on
//!   delete unless the bucket is retained.
//! - `Custom::AutoDeleteObjects` empties the bucket (all versions) before the
//!   bucket itself is deleted. Only declared outside production.

use serde_json::json;
use tracing::debug;

use super::config_store::{ConfigBucket, EncryptionKey};
use super::iam::{PolicyStatement, Role};
use crate::construct::{Scope, Stack};
use crate::document::ConfigDocument;
use crate::error::SynthError;
use crate::template::{Expr, LogicalId, Resource};

/// Lambda runtime for the handler.
pub const HANDLER_RUNTIME: &str = "python3.12";

/// Content type of the uploaded document.
pub const CONFIG_CONTENT_TYPE: &str = "application/yaml";

const HANDLER_SOURCE: &str = r#"import json
import urllib.request

import boto3

s3 = boto3.client("s3")


def respond(event, context, status, reason=None):
    body = json.dumps({
        "Status": status,
        "Reason": reason or "See CloudWatch log stream " + context.log_stream_name,
        "PhysicalResourceId": event.get("PhysicalResourceId") or event["LogicalResourceId"],
        "StackId": event["StackId"],
        "RequestId": event["RequestId"],
        "LogicalResourceId": event["LogicalResourceId"],
    }).encode()
    request = urllib.request.Request(event["ResponseURL"], data=body, method="PUT")
    request.add_header("Content-Type", "")
    request.add_header("Content-Length", str(len(body)))
    urllib.request.urlopen(request)


def empty_bucket(bucket):
    paginator = s3.get_paginator("list_object_versions")
    for page in paginator.paginate(Bucket=bucket):
        entries = page.get("Versions", []) + page.get("DeleteMarkers", [])
        objects = [{"Key": e["Key"], "VersionId": e["VersionId"]} for e in entries]
        if objects:
            s3.delete_objects(Bucket=bucket, Delete={"Objects": objects})


def handler(event, context):
    try:
        props = event["ResourceProperties"]
        request = event["RequestType"]
        if event["ResourceType"] == "Custom::ConfigObject":
            if request in ("Create", "Update"):
                s3.put_object(
                    Bucket=props["BucketName"],
                    Key=props["ObjectKey"],
                    Body=props["Content"].encode(),
                    ContentType=props["ContentType"],
                )
            elif props.get("RetainOnDelete") != "true":
                s3.delete_object(Bucket=props["BucketName"], Key=props["ObjectKey"])
        elif event["ResourceType"] == "Custom::AutoDeleteObjects" and request == "Delete":
            try:
                empty_bucket(props["BucketName"])
            except s3.exceptions.NoSuchBucket:
                pass
        respond(event, context, "SUCCESS")
    except Exception as err:
        print(err)
        respond(event, context, "FAILED", str(err))
"#;

/// The handler function and its role.
#[derive(Debug)]
pub struct Housekeeping {
    pub function: LogicalId,
    pub role: LogicalId,
    pub auto_delete: Option<LogicalId>,
    retain_on_delete: bool,
}

impl Housekeeping {
    /// Declare the handler for `bucket`, plus auto-deletion outside production.
    ///
    /// # Errors
    /// Returns an error if any resource cannot be declared.
    pub fn build(
        stack: &mut Stack,
        scope: &Scope,
        bucket: &ConfigBucket,
        key: &EncryptionKey,
        production: bool,
    ) -> Result<Self, SynthError> {
        let mut role = Role::new(
            scope,
            "Role",
            "lambda.amazonaws.com",
            "Writes the proxy config document and empties the config bucket",
        )
        .with_managed_policy("service-role/AWSLambdaBasicExecutionRole");
        role.add_to_policy(PolicyStatement::allow(
            &["s3:DeleteObject*", "s3:GetBucket*", "s3:List*", "s3:PutObject"],
            vec![bucket.arn(), bucket.objects_arn()],
        ));
        key.grant_encrypt_decrypt(&mut role);
        let role = role.declare(stack)?;

        let function = stack.add(
            scope,
            "Handler",
            Resource::new(
                "AWS::Lambda::Function",
                json!({
                    "Code": { "ZipFile": HANDLER_SOURCE },
                    "Handler": "index.handler",
                    "Runtime": HANDLER_RUNTIME,
                    "MemorySize": 256,
                    "Timeout": 300,
                    "Role": role.get_att("Arn"),
                    "Description": "Config bucket housekeeping",
                }),
            )
            .depends_on(&role),
        )?;

        let auto_delete = if production {
            None
        } else {
            let id = stack.add(
                scope,
                "AutoDeleteObjects",
                Resource::new(
                    "Custom::AutoDeleteObjects",
                    json!({
                        "ServiceToken": function.get_att("Arn"),
                        "BucketName": bucket.bucket_name(),
                    }),
                )
                .depends_on(&bucket.policy_id),
            )?;
            debug!(bucket = %bucket.id, "Bucket contents are purged on stack delete");
            Some(id)
        };

        Ok(Self {
            function,
            role,
            auto_delete,
            retain_on_delete: production,
        })
    }

    /// Declare the upload of `document` to `object_key`.
    ///
    /// # Errors
    /// Returns an error if the resource cannot be declared.
    pub fn upload_document(
        &self,
        stack: &mut Stack,
        scope: &Scope,
        bucket: &ConfigBucket,
        object_key: &str,
        document: &ConfigDocument,
    ) -> Result<LogicalId, SynthError> {
        let mut resource = Resource::new(
            "Custom::ConfigObject",
            json!({
                "ServiceToken": self.service_token(),
                "BucketName": bucket.bucket_name(),
                "ObjectKey": object_key,
                "Content": document.content(),
                "ContentType": CONFIG_CONTENT_TYPE,
                "ContentHash": document.content_hash(),
                "RetainOnDelete": if self.retain_on_delete { "true" } else { "false" },
            }),
        )
        .depends_on(&bucket.policy_id);
        if let Some(auto_delete) = &self.auto_delete {
            resource = resource.depends_on(auto_delete);
        }

        let id = stack.add(scope, "LiteLLMS3ConfigFileDeployment", resource)?;
        debug!(
            source = %document.source().display(),
            object_key = %object_key,
            content_hash = %document.content_hash(),
            "Config document staged for upload"
        );
        Ok(id)
    }

    /// `ServiceToken` of the handler.
    #[must_use]
    pub fn service_token(&self) -> Expr {
        self.function.get_att("Arn")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::config::StackConfig;
    use crate::constructs::config_store::{ConfigStore, CONFIG_OBJECT_KEY};
    use crate::construct::Environment;

    fn build(production: bool) -> (Stack, ConfigStore) {
        let mut stack = Stack::new("S", Environment::default(), None);
        let document = ConfigDocument::parse("config.yaml", "model_list: []\n").unwrap();
        let config = StackConfig::default().with_production(production);
        let store = ConfigStore::build(&mut stack, &Scope::root().child("Config"), &config, &document).unwrap();
        (stack, store)
    }

    #[test]
    fn test_config_object_carries_document() {
        let (stack, store) = build(false);
        let object = stack.template().resource(&store.config_object).unwrap();

        assert_eq!(object.resource_type, "Custom::ConfigObject");
        assert_eq!(object.property("ObjectKey"), Some(&json!(CONFIG_OBJECT_KEY)));
        assert_eq!(object.property("Content"), Some(&json!("model_list: []\n")));
        assert_eq!(object.property("ContentType"), Some(&json!("application/yaml")));
        assert_eq!(object.property("RetainOnDelete"), Some(&json!("false")));
        assert!(object.property("ContentHash").and_then(Value::as_str).is_some());
    }

    #[test]
    fn test_auto_delete_only_outside_production() {
        let (dev, _) = build(false);
        assert_eq!(dev.template().resources_of_type("Custom::AutoDeleteObjects").count(), 1);

        let (prod, store) = build(true);
        assert_eq!(prod.template().resources_of_type("Custom::AutoDeleteObjects").count(), 0);
        let object = prod.template().resource(&store.config_object).unwrap();
        assert_eq!(object.property("RetainOnDelete"), Some(&json!("true")));
    }

    #[test]
    fn test_handler_is_inline_and_small() {
        let (stack, _) = build(false);
        let (_, function) = stack
            .template()
            .resources_of_type("AWS::Lambda::Function")
            .next()
            .unwrap();

        assert_eq!(function.property("Runtime"), Some(&json!(HANDLER_RUNTIME)));
        let code = function.property_at("Code/ZipFile").and_then(Value::as_str).unwrap();
        assert!(code.contains("def handler(event, context):"));
        assert!(code.len() < 4096);
    }
}
