//! PostgreSQL database provisioner.

use proxy_cloud::SubnetKind;
use serde_json::json;
use tracing::info;

use super::config_store::{EncryptionKey, ManagedSecret, SecretValue};
use super::network::{Network, SecurityGroup, MIN_AVAILABILITY_ZONES};
use crate::construct::{Scope, Stack};
use crate::error::SynthError;
use crate::secret::{dynamic_reference, DeployTimeSecret};
use crate::template::{Expr, LogicalId, RemovalPolicy, Resource};

pub const ENGINE_VERSION: &str = "16.8";
pub const INSTANCE_CLASS: &str = "db.t3.micro";
pub const ALLOCATED_STORAGE_GIB: u32 = 20;
pub const MAX_ALLOCATED_STORAGE_GIB: u32 = 100;
pub const BACKUP_RETENTION_DAYS: u32 = 7;
pub const BACKUP_WINDOW: &str = "03:00-04:00";
pub const DATABASE_NAME: &str = "litellm";
pub const DATABASE_PORT: u16 = 5432;
pub const MASTER_USERNAME: &str = "postgres";
pub const CREDENTIALS_SECRET_NAME: &str = "litellm-db-credentials";

/// How the service reaches the database.
///
/// Host, port and name are plain values; the full URL embeds the password
/// and is only available as a [`DeployTimeSecret`].
#[derive(Debug)]
pub struct Connection {
    pub host: Expr,
    pub port: Expr,
    pub name: &'static str,
    pub url: DeployTimeSecret,
}

/// The database instance and its credentials.
#[derive(Debug)]
pub struct Database {
    pub instance: LogicalId,
    pub secret: ManagedSecret,
    pub security_group: SecurityGroup,
    scope: Scope,
    ingress: Option<LogicalId>,
}

impl Database {
    /// Declare the instance in the network's isolated subnets.
    ///
    /// # Errors
    /// Returns [`SynthError::Placement`] if the network has fewer than two
    /// zones with isolated subnets.
    pub fn build(
        stack: &mut Stack,
        scope: &Scope,
        network: &Network,
        key: &EncryptionKey,
        production: bool,
    ) -> Result<Self, SynthError> {
        let subnets = network.placement(SubnetKind::PrivateIsolated, MIN_AVAILABILITY_ZONES, "the database")?;

        let security_group = SecurityGroup::declare(
            stack,
            scope,
            "DatabaseSecurityGroup",
            network,
            "Security group for LiteLLM database",
            false,
            Vec::new(),
        )?;

        let secret = ManagedSecret::declare(
            stack,
            scope,
            "DBSecret",
            "Credentials for the LiteLLM database",
            Some(CREDENTIALS_SECRET_NAME),
            SecretValue::GeneratedJson {
                template: json!({ "username": MASTER_USERNAME }),
                key: "password",
            },
            Some(key),
            RemovalPolicy::for_mode(production),
        )?;

        let subnet_group = stack.add(
            scope,
            "DBSubnetGroup",
            Resource::new(
                "AWS::RDS::DBSubnetGroup",
                json!({
                    "DBSubnetGroupDescription": "Isolated subnets for the LiteLLM database",
                    "SubnetIds": subnets,
                }),
            ),
        )?;

        let removal = if production {
            RemovalPolicy::Snapshot
        } else {
            RemovalPolicy::Destroy
        };
        let instance = stack.add(
            scope,
            "DB",
            Resource::new(
                "AWS::RDS::DBInstance",
                json!({
                    "Engine": "postgres",
                    "EngineVersion": ENGINE_VERSION,
                    "DBInstanceClass": INSTANCE_CLASS,
                    "AllocatedStorage": ALLOCATED_STORAGE_GIB.to_string(),
                    "MaxAllocatedStorage": MAX_ALLOCATED_STORAGE_GIB,
                    "StorageType": "gp2",
                    "StorageEncrypted": true,
                    "KmsKeyId": key.arn(),
                    "MasterUsername": dynamic_reference(&secret.id, "username"),
                    "MasterUserPassword": dynamic_reference(&secret.id, "password"),
                    "DBName": DATABASE_NAME,
                    "Port": DATABASE_PORT.to_string(),
                    "DBSubnetGroupName": subnet_group.reference(),
                    "VPCSecurityGroups": [security_group.group_id()],
                    "PubliclyAccessible": false,
                    "BackupRetentionPeriod": BACKUP_RETENTION_DAYS,
                    "PreferredBackupWindow": BACKUP_WINDOW,
                    "CopyTagsToSnapshot": true,
                    "DeletionProtection": production,
                }),
            )
            .with_removal_policy(removal),
        )?;

        stack.add(
            &scope.child("DBSecret"),
            "Attachment",
            Resource::new(
                "AWS::SecretsManager::SecretTargetAttachment",
                json!({
                    "SecretId": secret.arn(),
                    "TargetId": instance.reference(),
                    "TargetType": "AWS::RDS::DBInstance",
                }),
            ),
        )?;

        info!(
            engine_version = ENGINE_VERSION,
            instance_class = INSTANCE_CLASS,
            deletion_protection = production,
            "Declared database"
        );

        Ok(Self {
            instance,
            secret,
            security_group,
            scope: scope.clone(),
            ingress: None,
        })
    }

    /// Connection details for the service.
    #[must_use]
    pub fn connection(&self) -> Connection {
        let host = self.instance.get_att("Endpoint.Address");
        let port = self.instance.get_att("Endpoint.Port");
        let url = Expr::concat([
            Expr::lit("postgresql://"),
            dynamic_reference(&self.secret.id, "username"),
            Expr::lit(":"),
            dynamic_reference(&self.secret.id, "password"),
            Expr::lit("@"),
            host.clone(),
            Expr::lit(":"),
            port.clone(),
            Expr::lit(format!("/{DATABASE_NAME}")),
        ]);

        Connection {
            host,
            port,
            name: DATABASE_NAME,
            url: DeployTimeSecret::new(url),
        }
    }

    /// Allow TCP 5432 from `source`. The only ingress rule the database gets.
    ///
    /// # Errors
    /// Returns [`SynthError::Config`] if ingress was already granted.
    pub fn allow_connection_from(&mut self, stack: &mut Stack, source: &SecurityGroup) -> Result<LogicalId, SynthError> {
        if let Some(existing) = &self.ingress {
            return Err(SynthError::Config(format!(
                "database ingress already granted by {existing}"
            )));
        }

        let rule = self.security_group.allow_from(
            stack,
            &self.scope.child("DatabaseSecurityGroup"),
            source,
            DATABASE_PORT,
            "Allow access to database",
        )?;
        info!(source = %source.id, port = DATABASE_PORT, "Allowed database access");
        self.ingress = Some(rule.clone());
        Ok(rule)
    }
}

#[cfg(test)]
mod tests {
    use proxy_cloud::{CloudProviderError, NetworkLookup, VpcDescription};
    use serde_json::Value;

    use super::*;
    use crate::construct::Environment;
    use crate::constructs::network::{NetworkProps, DEFAULT_VPC_CIDR};
    use crate::template::LogicalId;

    struct NoLookup;

    impl NetworkLookup for NoLookup {
        fn lookup_vpc(&self, vpc_id: &str) -> Result<VpcDescription, CloudProviderError> {
            Err(CloudProviderError::NotFound(vpc_id.to_string()))
        }
    }

    fn build(production: bool) -> (Stack, Database) {
        let mut stack = Stack::new("S", Environment::default(), None);
        let network = Network::build(
            &mut stack,
            &Scope::root().child("VPC"),
            &NetworkProps {
                existing_vpc_id: None,
                availability_zones: vec![Expr::lit("us-east-1a"), Expr::lit("us-east-1b")],
                nat_gateways: 1,
                cidr: DEFAULT_VPC_CIDR,
            },
            &NoLookup,
        )
        .unwrap();
        let key = EncryptionKey {
            id: LogicalId::from_path(&["Key"]),
        };
        let database = Database::build(&mut stack, &Scope::root().child("Database"), &network, &key, production).unwrap();
        (stack, database)
    }

    #[test]
    fn test_instance_settings() {
        let (stack, database) = build(false);
        let instance = stack.template().resource(&database.instance).unwrap();

        assert_eq!(instance.property("EngineVersion"), Some(&json!("16.8")));
        assert_eq!(instance.property("DBInstanceClass"), Some(&json!("db.t3.micro")));
        assert_eq!(instance.property("MaxAllocatedStorage"), Some(&json!(100)));
        assert_eq!(instance.property("StorageEncrypted"), Some(&json!(true)));
        assert_eq!(instance.property("PubliclyAccessible"), Some(&json!(false)));
        assert_eq!(instance.property("PreferredBackupWindow"), Some(&json!("03:00-04:00")));
        assert_eq!(instance.property("DBName"), Some(&json!("litellm")));
        assert_eq!(instance.property("DeletionProtection"), Some(&json!(false)));
        assert_eq!(instance.deletion_policy, Some(RemovalPolicy::Destroy));

        let secret = stack.template().resource(&database.secret.id).unwrap();
        assert_eq!(secret.property("Name"), Some(&json!("litellm-db-credentials")));
        assert_eq!(
            secret.property_at("GenerateSecretString/SecretStringTemplate"),
            Some(&json!(r#"{"username":"postgres"}"#))
        );
    }

    #[test]
    fn test_production_protects_the_instance() {
        let (stack, database) = build(true);
        let instance = stack.template().resource(&database.instance).unwrap();
        assert_eq!(instance.property("DeletionProtection"), Some(&json!(true)));
        assert_eq!(instance.deletion_policy, Some(RemovalPolicy::Snapshot));
    }

    #[test]
    fn test_security_group_has_no_ingress_and_no_egress() {
        let (stack, database) = build(false);
        let group = stack.template().resource(&database.security_group.id).unwrap();
        assert!(group.property("SecurityGroupIngress").is_none());
        assert_eq!(
            group.property_at("SecurityGroupEgress/0/CidrIp"),
            Some(&json!("255.255.255.255/32"))
        );
        assert_eq!(stack.template().resources_of_type("AWS::EC2::SecurityGroupIngress").count(), 0);
    }

    #[test]
    fn test_single_ingress_rule() {
        let (mut stack, mut database) = build(false);
        let service = SecurityGroup {
            id: LogicalId::from_path(&["Service", "SecurityGroup"]),
        };

        let rule = database.allow_connection_from(&mut stack, &service).unwrap();
        let resource = stack.template().resource(&rule).unwrap();
        assert_eq!(resource.property("FromPort"), Some(&json!(5432)));
        assert_eq!(resource.property("ToPort"), Some(&json!(5432)));
        assert_eq!(resource.property("SourceSecurityGroupId"), Some(&service.group_id().to_value()));
        assert_eq!(resource.property("GroupId"), Some(&database.security_group.group_id().to_value()));

        assert!(database.allow_connection_from(&mut stack, &service).is_err());
        assert_eq!(stack.template().resources_of_type("AWS::EC2::SecurityGroupIngress").count(), 1);
    }

    #[test]
    fn test_connection_url_stays_opaque() {
        let (_, database) = build(false);
        let connection = database.connection();

        assert_eq!(connection.name, "litellm");
        assert_eq!(connection.host, database.instance.get_att("Endpoint.Address"));
        assert_eq!(format!("{:?}", connection.url), "DeployTimeSecret([REDACTED])");

        let rendered: Value = connection.url.into_secret_string().to_value();
        let text = rendered.to_string();
        assert!(text.starts_with(r#"{"Fn::Join":["",["postgresql://{{resolve:secretsmanager:"#));
        assert!(text.contains(":SecretString:password::}}"));
    }
}
