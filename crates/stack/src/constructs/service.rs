//! Proxy compute: a Fargate service behind a public application load balancer.

use proxy_cloud::SubnetKind;
use serde_json::{json, Value};
use tracing::info;

use super::config_store::{ConfigStore, ManagedSecret, SecretValue};
use super::database::Database;
use super::iam::{PolicyStatement, Role};
use super::network::{Network, SecurityGroup, MIN_AVAILABILITY_ZONES};
use crate::config::{ProviderApiKeys, StackConfig};
use crate::construct::{Scope, Stack};
use crate::error::SynthError;
use crate::template::{Expr, LogicalId, RemovalPolicy, Resource};

pub const CONTAINER_NAME: &str = "web";
pub const CONTAINER_PORT: u16 = 4000;
pub const LISTENER_PORT: u16 = 80;
pub const TASK_CPU: u32 = 512;
pub const TASK_MEMORY_MIB: u32 = 1024;
pub const LIVENESS_PATH: &str = "/health/liveliness";
pub const READINESS_PATH: &str = "/health/readiness";
pub const LOG_RETENTION_DAYS: u32 = 30;
pub const LOG_STREAM_PREFIX: &str = "LiteLLMProxy";

/// Container variables holding plain values.
pub const PLAIN_VARIABLES: [&str; 6] = [
    "UI_USERNAME",
    "LITELLM_CONFIG_BUCKET_NAME",
    "LITELLM_CONFIG_BUCKET_OBJECT_KEY",
    "DATABASE_HOST",
    "DATABASE_PORT",
    "DATABASE_NAME",
];

/// Container variables injected from Secrets Manager.
pub const SECRET_VARIABLES: [&str; 7] = [
    "UI_PASSWORD",
    "LITELLM_MASTER_KEY",
    ProviderApiKeys::NAMES[0],
    ProviderApiKeys::NAMES[1],
    ProviderApiKeys::NAMES[2],
    ProviderApiKeys::NAMES[3],
    "DATABASE_URL",
];

/// Every variable the container receives.
pub fn container_variables() -> impl Iterator<Item = &'static str> {
    PLAIN_VARIABLES.into_iter().chain(SECRET_VARIABLES)
}

/// Everything [`ProxyService::build`] declares.
#[derive(Debug)]
pub struct ProxyService {
    pub cluster: LogicalId,
    pub log_group: LogicalId,
    pub task_role: LogicalId,
    pub execution_role: LogicalId,
    pub task_definition: LogicalId,
    pub database_url_secret: ManagedSecret,
    pub security_group: SecurityGroup,
    pub load_balancer_security_group: SecurityGroup,
    pub load_balancer: LogicalId,
    pub target_group: LogicalId,
    pub listener: LogicalId,
    pub service: LogicalId,
}

impl ProxyService {
    /// Declare the service and wire it to the config store and database.
    ///
    /// Grants the service's security group access to the database.
    ///
    /// # Errors
    /// Returns [`SynthError::Placement`] if the network lacks public or
    /// private-egress subnets, or any declaration error.
    pub fn build(
        stack: &mut Stack,
        scope: &Scope,
        config: &StackConfig,
        network: &Network,
        store: &ConfigStore,
        database: &mut Database,
    ) -> Result<Self, SynthError> {
        let public_subnets = network.placement(SubnetKind::Public, MIN_AVAILABILITY_ZONES, "the load balancer")?;
        let task_subnets = network.placement(SubnetKind::PrivateWithEgress, 1, "the proxy service")?;

        let cluster = stack.add(scope, "Cluster", Resource::new("AWS::ECS::Cluster", json!({})))?;

        let log_group = stack.add(
            scope,
            "LogGroup",
            Resource::new("AWS::Logs::LogGroup", json!({ "RetentionInDays": LOG_RETENTION_DAYS }))
                .with_removal_policy(store.removal_policy),
        )?;

        let connection = database.connection();
        let database_url_secret = ManagedSecret::declare(
            stack,
            scope,
            "DatabaseUrlSecret",
            "Connection URL for the LiteLLM database",
            None,
            SecretValue::Resolved(connection.url.into_secret_string()),
            Some(&store.key),
            RemovalPolicy::Destroy,
        )?;

        // Task role: what the proxy itself may touch at runtime.
        let mut task_role = Role::new(scope, "TaskRole", "ecs-tasks.amazonaws.com", "LiteLLM proxy task role");
        store.bucket.grant_read(&mut task_role);
        store.key.grant_decrypt(&mut task_role);
        let task_role = task_role.declare(stack)?;

        // Execution role: what ECS needs to start the container.
        let mut execution_role = Role::new(
            scope,
            "ExecutionRole",
            "ecs-tasks.amazonaws.com",
            "LiteLLM proxy task execution role",
        );
        for secret in [
            &store.ui_password,
            &store.master_key,
            &store.api_secrets,
            &database_url_secret,
        ] {
            secret.grant_read(&mut execution_role);
        }
        execution_role.add_to_policy(PolicyStatement::allow(
            &["logs:CreateLogStream", "logs:PutLogEvents"],
            vec![log_group.get_att("Arn")],
        ));
        let execution_role = execution_role.declare(stack)?;

        let environment = [
            ("UI_USERNAME", Expr::lit(config.ui_username.clone())),
            ("LITELLM_CONFIG_BUCKET_NAME", store.bucket.bucket_name()),
            ("LITELLM_CONFIG_BUCKET_OBJECT_KEY", Expr::lit(store.config_object_key)),
            ("DATABASE_HOST", connection.host),
            ("DATABASE_PORT", connection.port),
            ("DATABASE_NAME", Expr::lit(connection.name)),
        ];
        let mut secrets = vec![
            ("UI_PASSWORD", store.ui_password.arn()),
            ("LITELLM_MASTER_KEY", store.master_key.arn()),
        ];
        for name in ProviderApiKeys::NAMES {
            secrets.push((name, store.api_secrets.field_value_from(name)));
        }
        secrets.push(("DATABASE_URL", database_url_secret.arn()));

        let task_definition = stack.add(
            scope,
            "TaskDef",
            Resource::new(
                "AWS::ECS::TaskDefinition",
                json!({
                    "Family": format!("{}-litellm", stack.name()),
                    "Cpu": TASK_CPU.to_string(),
                    "Memory": TASK_MEMORY_MIB.to_string(),
                    "NetworkMode": "awsvpc",
                    "RequiresCompatibilities": ["FARGATE"],
                    "RuntimePlatform": {
                        "CpuArchitecture": "ARM64",
                        "OperatingSystemFamily": "LINUX",
                    },
                    "TaskRoleArn": task_role.get_att("Arn"),
                    "ExecutionRoleArn": execution_role.get_att("Arn"),
                    "ContainerDefinitions": [{
                        "Name": CONTAINER_NAME,
                        "Image": config.image,
                        "Essential": true,
                        "PortMappings": [{ "ContainerPort": CONTAINER_PORT, "Protocol": "tcp" }],
                        "Environment": name_value_pairs(&environment, "Value"),
                        "Secrets": name_value_pairs(&secrets, "ValueFrom"),
                        "LogConfiguration": {
                            "LogDriver": "awslogs",
                            "Options": {
                                "awslogs-group": log_group.reference(),
                                "awslogs-stream-prefix": LOG_STREAM_PREFIX,
                                "awslogs-region": stack.environment().region_expr(),
                            }
                        },
                        "HealthCheck": {
                            "Command": ["CMD-SHELL", readiness_probe()],
                            "Interval": 30,
                            "Timeout": 5,
                            "Retries": 3,
                            "StartPeriod": 60,
                        },
                    }],
                }),
            ),
        )?;

        let load_balancer_security_group = SecurityGroup::declare(
            stack,
            &scope.child("LB"),
            "SecurityGroup",
            network,
            "Public load balancer for the LiteLLM proxy",
            false,
            vec![SecurityGroup::cidr_ingress(
                "0.0.0.0/0",
                LISTENER_PORT,
                "Allow from anyone on port 80",
            )],
        )?;
        let security_group = SecurityGroup::declare(
            stack,
            &scope.child("Service"),
            "SecurityGroup",
            network,
            "LiteLLM proxy tasks",
            true,
            Vec::new(),
        )?;
        security_group.allow_from(
            stack,
            &scope.child("Service").child("SecurityGroup"),
            &load_balancer_security_group,
            CONTAINER_PORT,
            "Load balancer to target",
        )?;
        load_balancer_security_group.allow_to(
            stack,
            &scope.child("LB").child("SecurityGroup"),
            &security_group,
            CONTAINER_PORT,
            "Load balancer to target",
        )?;

        let load_balancer = stack.add(
            scope,
            "LB",
            Resource::new(
                "AWS::ElasticLoadBalancingV2::LoadBalancer",
                json!({
                    "Type": "application",
                    "Scheme": "internet-facing",
                    "Subnets": public_subnets,
                    "SecurityGroups": [load_balancer_security_group.group_id()],
                    "LoadBalancerAttributes": [
                        { "Key": "deletion_protection.enabled", "Value": "false" }
                    ],
                }),
            ),
        )?;

        let target_group = stack.add(
            &scope.child("LB"),
            "TargetGroup",
            Resource::new(
                "AWS::ElasticLoadBalancingV2::TargetGroup",
                json!({
                    "Port": CONTAINER_PORT,
                    "Protocol": "HTTP",
                    "TargetType": "ip",
                    "VpcId": network.vpc_id(),
                    "HealthCheckPath": LIVENESS_PATH,
                    "HealthCheckIntervalSeconds": 30,
                    "HealthCheckTimeoutSeconds": 5,
                    "HealthyThresholdCount": 2,
                    "UnhealthyThresholdCount": 3,
                }),
            ),
        )?;

        let listener = stack.add(
            &scope.child("LB"),
            "PublicListener",
            Resource::new(
                "AWS::ElasticLoadBalancingV2::Listener",
                json!({
                    "LoadBalancerArn": load_balancer.reference(),
                    "Port": LISTENER_PORT,
                    "Protocol": "HTTP",
                    "DefaultActions": [{ "Type": "forward", "TargetGroupArn": target_group.reference() }],
                }),
            ),
        )?;

        let service = stack.add(
            scope,
            "Service",
            Resource::new(
                "AWS::ECS::Service",
                json!({
                    "Cluster": cluster.reference(),
                    "LaunchType": "FARGATE",
                    "PlatformVersion": "LATEST",
                    "TaskDefinition": task_definition.reference(),
                    "DesiredCount": config.desired_count,
                    "HealthCheckGracePeriodSeconds": 60,
                    "DeploymentConfiguration": {
                        "DeploymentCircuitBreaker": {
                            "Enable": config.circuit_breaker,
                            "Rollback": config.circuit_breaker,
                        },
                        "MaximumPercent": 200,
                        "MinimumHealthyPercent": 50,
                    },
                    "NetworkConfiguration": {
                        "AwsvpcConfiguration": {
                            "AssignPublicIp": "DISABLED",
                            "Subnets": task_subnets,
                            "SecurityGroups": [security_group.group_id()],
                        }
                    },
                    "LoadBalancers": [{
                        "ContainerName": CONTAINER_NAME,
                        "ContainerPort": CONTAINER_PORT,
                        "TargetGroupArn": target_group.reference(),
                    }],
                }),
            )
            .depends_on(&listener)
            .depends_on(&task_role),
        )?;

        database.allow_connection_from(stack, &security_group)?;

        info!(
            image = %config.image,
            desired_count = config.desired_count,
            circuit_breaker = config.circuit_breaker,
            container_port = CONTAINER_PORT,
            "Declared proxy service"
        );

        Ok(Self {
            cluster,
            log_group,
            task_role,
            execution_role,
            task_definition,
            database_url_secret,
            security_group,
            load_balancer_security_group,
            load_balancer,
            target_group,
            listener,
            service,
        })
    }

    /// Public DNS name of the load balancer.
    #[must_use]
    pub fn load_balancer_dns(&self) -> Expr {
        self.load_balancer.get_att("DNSName")
    }
}

fn name_value_pairs(pairs: &[(&str, Expr)], value_key: &str) -> Value {
    Value::Array(
        pairs
            .iter()
            .map(|(name, value)| {
                let mut entry = json!({ "Name": name });
                entry[value_key] = value.to_value();
                entry
            })
            .collect(),
    )
}

fn readiness_probe() -> String {
    format!(
        "python3 -c \"import urllib.request; urllib.request.urlopen('http://localhost:{CONTAINER_PORT}{READINESS_PATH}')\" || exit 1"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_variables_are_disjoint() {
        let names: Vec<&str> = container_variables().collect();
        assert_eq!(names.len(), 13);
        for secret in SECRET_VARIABLES {
            assert!(!PLAIN_VARIABLES.contains(&secret), "{secret}");
        }
        assert!(SECRET_VARIABLES.contains(&"DATABASE_URL"));
        assert!(SECRET_VARIABLES.contains(&"GROQ_API_KEY"));
    }

    #[test]
    fn test_name_value_pairs() {
        let pairs = [("A", Expr::lit("1")), ("B", Expr::Ref("X".into()))];
        assert_eq!(
            name_value_pairs(&pairs, "ValueFrom"),
            json!([
                { "Name": "A", "ValueFrom": "1" },
                { "Name": "B", "ValueFrom": { "Ref": "X" } }
            ])
        );
    }

    #[test]
    fn test_readiness_probe_targets_container_port() {
        assert!(readiness_probe().contains("http://localhost:4000/health/readiness"));
    }
}
