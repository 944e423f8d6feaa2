//! Stack composition.
//!
//! Network, config store, database and service are built in that order,
//! each receiving what the previous ones produced. The first failure aborts
//! the pass.

use proxy_cloud::NetworkLookup;
use tracing::{info, warn};

use crate::config::StackConfig;
use crate::construct::{Environment, Scope, Stack};
use crate::constructs::network::{NetworkProps, DEFAULT_VPC_CIDR};
use crate::constructs::service::container_variables;
use crate::constructs::{ConfigStore, Database, Network, ProxyService};
use crate::document::ConfigDocument;
use crate::error::SynthError;
use crate::template::{Expr, Output, Template};

/// Names of the published stack outputs.
pub mod outputs {
    pub const LOAD_BALANCER_DNS: &str = "LoadBalancerDNS";
    pub const CONFIG_BUCKET_NAME: &str = "ConfigBucketName";
    pub const DATABASE_SECRET_ARN: &str = "DatabaseSecretARN";
    pub const UI_SECRET_ARN: &str = "UISecretARN";
    pub const MASTER_KEY_SECRET_ARN: &str = "MasterKeySecretARN";
    pub const API_SECRETS_ARN: &str = "ApiSecretsARN";
}

/// The result of a successful composition.
#[derive(Debug)]
pub struct SynthesizedStack {
    pub name: String,
    pub environment: Environment,
    pub production: bool,
    pub template: Template,
    /// Non-fatal findings, e.g. config references no container variable satisfies.
    pub warnings: Vec<String>,
}

/// Compose the full stack.
///
/// # Errors
/// Returns the first [`SynthError`] raised by any construct.
pub fn compose(
    config: &StackConfig,
    document: &ConfigDocument,
    lookup: &dyn NetworkLookup,
) -> Result<SynthesizedStack, SynthError> {
    let environment = Environment {
        account: config.account.clone(),
        region: config.region.clone(),
    };
    info!(
        stack = %config.stack_name,
        environment = %environment.label(),
        mode = config.mode_label(),
        "Composing stack"
    );

    let description = format!("LiteLLM proxy on ECS Fargate ({})", config.mode_label());
    let mut stack = Stack::new(config.stack_name.clone(), environment.clone(), Some(description));
    let root = Scope::root();

    let network = Network::build(
        &mut stack,
        &root.child("VPC"),
        &NetworkProps {
            existing_vpc_id: config.vpc_id.as_deref(),
            availability_zones: availability_zones(config),
            nat_gateways: config.nat_gateways,
            cidr: DEFAULT_VPC_CIDR,
        },
        lookup,
    )?;

    let store = ConfigStore::build(&mut stack, &root.child("Config"), config, document)?;
    let mut database = Database::build(
        &mut stack,
        &root.child("Database"),
        &network,
        &store.key,
        config.production,
    )?;
    let service = ProxyService::build(
        &mut stack,
        &root.child("LiteLLMService"),
        config,
        &network,
        &store,
        &mut database,
    )?;

    let published = [
        (
            outputs::LOAD_BALANCER_DNS,
            service.load_balancer_dns(),
            "Public DNS name of the proxy load balancer",
        ),
        (
            outputs::CONFIG_BUCKET_NAME,
            store.bucket.bucket_name(),
            "Bucket holding the proxy configuration",
        ),
        (
            outputs::DATABASE_SECRET_ARN,
            database.secret.arn(),
            "Database credentials secret",
        ),
        (outputs::UI_SECRET_ARN, store.ui_password.arn(), "UI password secret"),
        (
            outputs::MASTER_KEY_SECRET_ARN,
            store.master_key.arn(),
            "Proxy master key secret",
        ),
        (
            outputs::API_SECRETS_ARN,
            store.api_secrets.arn(),
            "Provider API keys secret",
        ),
    ];
    for (name, value, description) in published {
        stack.add_output(name, Output::new(value).with_description(description))?;
    }

    let available: Vec<&str> = container_variables().collect();
    let warnings: Vec<String> = document
        .unresolved_references(&available)
        .into_iter()
        .map(|name| {
            format!(
                "{} references os.environ/{name}, which the proxy container does not receive",
                document.source().display()
            )
        })
        .collect();
    for warning in &warnings {
        warn!("{warning}");
    }

    let template = stack.into_template();
    info!(
        stack = %config.stack_name,
        resources = template.resources().count(),
        existing_vpc = network.is_imported(),
        "Composed stack"
    );

    Ok(SynthesizedStack {
        name: config.stack_name.clone(),
        environment,
        production: config.production,
        template,
        warnings,
    })
}

/// Zones for a fresh VPC: explicit, else `a`/`b` of a known region, else the
/// first two zones CloudFormation reports.
fn availability_zones(config: &StackConfig) -> Vec<Expr> {
    if !config.availability_zones.is_empty() {
        return config.availability_zones.iter().cloned().map(Expr::lit).collect();
    }
    match &config.region {
        Some(region) => vec![Expr::lit(format!("{region}a")), Expr::lit(format!("{region}b"))],
        None => vec![Expr::availability_zone(0), Expr::availability_zone(1)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zones_prefer_explicit_then_region() {
        let explicit = StackConfig::default()
            .with_region("eu-west-1")
            .with_availability_zones(["eu-west-1b", "eu-west-1c"]);
        assert_eq!(
            availability_zones(&explicit),
            vec![Expr::lit("eu-west-1b"), Expr::lit("eu-west-1c")]
        );

        let regional = StackConfig::default().with_region("eu-west-1");
        assert_eq!(
            availability_zones(&regional),
            vec![Expr::lit("eu-west-1a"), Expr::lit("eu-west-1b")]
        );

        let unknown = StackConfig::default();
        assert_eq!(
            availability_zones(&unknown),
            vec![Expr::availability_zone(0), Expr::availability_zone(1)]
        );
    }
}
