//! AWS lookup client implementation.
//!
//! This client shells out to the `aws` CLI and parses its JSON output, the
//! same way the rest of the tooling drives `kubectl` and `helm`.

use std::process::Command;

use tracing::{debug, info};

use super::models::{
    tag_value, DescribeRouteTablesResponse, DescribeSubnetsResponse, DescribeVpcsResponse,
    Ec2Subnet, RouteTable, SUBNET_TYPE_TAG,
};
use crate::providers::traits::{
    CloudProviderError, NetworkLookup, SubnetDescription, SubnetKind, VpcDescription,
};

/// Default CLI binary.
const DEFAULT_PROGRAM: &str = "aws";

/// AWS network lookup provider.
#[derive(Debug, Clone)]
pub struct Aws {
    /// CLI binary to execute.
    program: String,
    /// AWS region (falls back to the CLI's own resolution).
    region: Option<String>,
    /// Named profile.
    profile: Option<String>,
}

impl Default for Aws {
    fn default() -> Self {
        Self::new()
    }
}

impl Aws {
    /// Create a new AWS provider using the `aws` binary on `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            region: None,
            profile: None,
        }
    }

    /// Set the region passed to every command.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Set the named profile passed to every command.
    #[must_use]
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Use a different CLI binary (e.g. a wrapper script).
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Run an `aws ec2` command and return its stdout.
    fn ec2(&self, args: &[&str]) -> Result<String, CloudProviderError> {
        let mut command = Command::new(&self.program);
        command.arg("ec2").args(args).args(["--output", "json"]);
        if let Some(region) = &self.region {
            command.args(["--region", region]);
        }
        if let Some(profile) = &self.profile {
            command.args(["--profile", profile]);
        }

        let description = format!("{} ec2 {}", self.program, args.join(" "));
        debug!(command = %description, "AWS CLI request");

        let output = command.output().map_err(|source| CloudProviderError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(classify_cli_error(description, stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Combine the three describe responses into a [`VpcDescription`].
    ///
    /// # Errors
    /// Returns [`CloudProviderError::NotFound`] if `vpcs` does not contain
    /// `vpc_id`.
    pub fn describe_from_responses(
        vpc_id: &str,
        vpcs: &DescribeVpcsResponse,
        subnets: &DescribeSubnetsResponse,
        route_tables: &DescribeRouteTablesResponse,
    ) -> Result<VpcDescription, CloudProviderError> {
        let vpc = vpcs
            .vpcs
            .iter()
            .find(|v| v.vpc_id == vpc_id)
            .ok_or_else(|| CloudProviderError::NotFound(format!("VPC not found: {vpc_id}")))?;

        let subnets = subnets
            .subnets
            .iter()
            .filter(|s| s.vpc_id == vpc_id)
            .map(|s| SubnetDescription {
                subnet_id: s.subnet_id.clone(),
                availability_zone: s.availability_zone.clone(),
                cidr_block: s.cidr_block.clone(),
                route_table_id: route_table_for(&s.subnet_id, &route_tables.route_tables)
                    .map(|rt| rt.route_table_id.clone()),
                kind: classify_subnet(s, &route_tables.route_tables),
            })
            .collect();

        Ok(VpcDescription {
            vpc_id: vpc.vpc_id.clone(),
            cidr_block: vpc.cidr_block.clone(),
            subnets,
        })
    }
}

/// Map CLI stderr onto an error variant.
fn classify_cli_error(command: String, stderr: String) -> CloudProviderError {
    if stderr.contains(".NotFound") {
        CloudProviderError::NotFound(stderr)
    } else if stderr.contains("UnauthorizedOperation")
        || stderr.contains("AuthFailure")
        || stderr.contains("ExpiredToken")
        || stderr.contains("Unable to locate credentials")
    {
        CloudProviderError::Auth(stderr)
    } else {
        CloudProviderError::Cli { command, stderr }
    }
}

/// The route table serving a subnet: its explicit association, else the
/// VPC's main table.
fn route_table_for<'a>(subnet_id: &str, route_tables: &'a [RouteTable]) -> Option<&'a RouteTable> {
    route_tables
        .iter()
        .find(|rt| {
            rt.associations
                .iter()
                .any(|a| a.subnet_id.as_deref() == Some(subnet_id))
        })
        .or_else(|| route_tables.iter().find(|rt| rt.is_main()))
}

/// Classify a subnet.
///
/// An explicit `aws-cdk:subnet-type` tag wins. Otherwise the subnet's route
/// table decides: a default route through an internet gateway means public,
/// any other default route means private with egress, and no default route
/// means isolated.
#[must_use]
pub fn classify_subnet(subnet: &Ec2Subnet, route_tables: &[RouteTable]) -> SubnetKind {
    match tag_value(&subnet.tags, SUBNET_TYPE_TAG) {
        Some("Public") => return SubnetKind::Public,
        Some("Private") => return SubnetKind::PrivateWithEgress,
        Some("Isolated") => return SubnetKind::PrivateIsolated,
        _ => {}
    }

    let Some(route) = route_table_for(&subnet.subnet_id, route_tables).and_then(RouteTable::default_route)
    else {
        return SubnetKind::PrivateIsolated;
    };

    if route
        .gateway_id
        .as_deref()
        .is_some_and(|g| g.starts_with("igw-"))
    {
        SubnetKind::Public
    } else {
        SubnetKind::PrivateWithEgress
    }
}

impl NetworkLookup for Aws {
    fn lookup_vpc(&self, vpc_id: &str) -> Result<VpcDescription, CloudProviderError> {
        if !vpc_id.starts_with("vpc-") {
            return Err(CloudProviderError::Config(format!(
                "'{vpc_id}' is not a VPC identifier"
            )));
        }

        info!(vpc_id = %vpc_id, region = ?self.region, "Looking up existing VPC");

        let filter = format!("Name=vpc-id,Values={vpc_id}");
        let vpcs: DescribeVpcsResponse =
            serde_json::from_str(&self.ec2(&["describe-vpcs", "--vpc-ids", vpc_id])?)?;
        let subnets: DescribeSubnetsResponse =
            serde_json::from_str(&self.ec2(&["describe-subnets", "--filters", &filter])?)?;
        let route_tables: DescribeRouteTablesResponse =
            serde_json::from_str(&self.ec2(&["describe-route-tables", "--filters", &filter])?)?;

        let description = Self::describe_from_responses(vpc_id, &vpcs, &subnets, &route_tables)?;

        info!(
            vpc_id = %description.vpc_id,
            subnets = description.subnets.len(),
            "VPC lookup complete"
        );

        Ok(description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VPCS: &str = r#"{"Vpcs": [{"VpcId": "vpc-0abc", "CidrBlock": "10.1.0.0/16", "State": "available"}]}"#;

    const SUBNETS: &str = r#"{
        "Subnets": [
            {"SubnetId": "subnet-pub-a", "VpcId": "vpc-0abc", "AvailabilityZone": "eu-north-1a", "CidrBlock": "10.1.0.0/24", "MapPublicIpOnLaunch": true},
            {"SubnetId": "subnet-app-a", "VpcId": "vpc-0abc", "AvailabilityZone": "eu-north-1a", "CidrBlock": "10.1.2.0/24"},
            {"SubnetId": "subnet-db-a", "VpcId": "vpc-0abc", "AvailabilityZone": "eu-north-1a", "CidrBlock": "10.1.4.0/28"},
            {"SubnetId": "subnet-tagged", "VpcId": "vpc-0abc", "AvailabilityZone": "eu-north-1b",
             "Tags": [{"Key": "aws-cdk:subnet-type", "Value": "Isolated"}]}
        ]
    }"#;

    const ROUTE_TABLES: &str = r#"{
        "RouteTables": [
            {"RouteTableId": "rtb-main", "Associations": [{"Main": true}],
             "Routes": [{"DestinationCidrBlock": "10.1.0.0/16", "GatewayId": "local"}]},
            {"RouteTableId": "rtb-pub", "Associations": [{"Main": false, "SubnetId": "subnet-pub-a"}, {"Main": false, "SubnetId": "subnet-tagged"}],
             "Routes": [{"DestinationCidrBlock": "0.0.0.0/0", "GatewayId": "igw-123"}]},
            {"RouteTableId": "rtb-app", "Associations": [{"Main": false, "SubnetId": "subnet-app-a"}],
             "Routes": [{"DestinationCidrBlock": "0.0.0.0/0", "NatGatewayId": "nat-456"}]}
        ]
    }"#;

    fn describe() -> VpcDescription {
        let vpcs: DescribeVpcsResponse = serde_json::from_str(VPCS).unwrap();
        let subnets: DescribeSubnetsResponse = serde_json::from_str(SUBNETS).unwrap();
        let route_tables: DescribeRouteTablesResponse = serde_json::from_str(ROUTE_TABLES).unwrap();
        Aws::describe_from_responses("vpc-0abc", &vpcs, &subnets, &route_tables).unwrap()
    }

    fn kind_of(vpc: &VpcDescription, id: &str) -> SubnetKind {
        vpc.subnets.iter().find(|s| s.subnet_id == id).unwrap().kind
    }

    #[test]
    fn test_subnet_classification_by_route() {
        let vpc = describe();

        assert_eq!(vpc.cidr_block.as_deref(), Some("10.1.0.0/16"));
        assert_eq!(kind_of(&vpc, "subnet-pub-a"), SubnetKind::Public);
        assert_eq!(kind_of(&vpc, "subnet-app-a"), SubnetKind::PrivateWithEgress);
        // No explicit association: falls back to the main table, which has no default route.
        assert_eq!(kind_of(&vpc, "subnet-db-a"), SubnetKind::PrivateIsolated);
    }

    #[test]
    fn test_subnet_type_tag_wins_over_routes() {
        let vpc = describe();
        let tagged = vpc.subnets.iter().find(|s| s.subnet_id == "subnet-tagged").unwrap();

        assert_eq!(tagged.kind, SubnetKind::PrivateIsolated);
        assert_eq!(tagged.route_table_id.as_deref(), Some("rtb-pub"));
    }

    #[test]
    fn test_missing_vpc_is_not_found() {
        let vpcs: DescribeVpcsResponse = serde_json::from_str(r#"{"Vpcs": []}"#).unwrap();
        let subnets: DescribeSubnetsResponse = serde_json::from_str(SUBNETS).unwrap();
        let route_tables: DescribeRouteTablesResponse = serde_json::from_str(ROUTE_TABLES).unwrap();

        let err = Aws::describe_from_responses("vpc-0abc", &vpcs, &subnets, &route_tables)
            .unwrap_err();
        assert!(matches!(err, CloudProviderError::NotFound(_)));
    }

    #[test]
    fn test_cli_error_classification() {
        let not_found = classify_cli_error(
            "aws ec2 describe-vpcs".to_string(),
            "An error occurred (InvalidVpcID.NotFound) when calling the DescribeVpcs operation"
                .to_string(),
        );
        assert!(matches!(not_found, CloudProviderError::NotFound(_)));

        let auth = classify_cli_error(
            "aws ec2 describe-vpcs".to_string(),
            "Unable to locate credentials. You can configure credentials by running \"aws configure\"."
                .to_string(),
        );
        assert!(matches!(auth, CloudProviderError::Auth(_)));

        let other = classify_cli_error("aws ec2 describe-vpcs".to_string(), "boom".to_string());
        assert!(matches!(other, CloudProviderError::Cli { .. }));
    }

    #[test]
    fn test_rejects_non_vpc_identifier() {
        let err = Aws::new().with_program("/nonexistent/aws").lookup_vpc("subnet-123").unwrap_err();
        assert!(matches!(err, CloudProviderError::Config(_)));
    }

    #[test]
    fn test_missing_binary_is_spawn_error() {
        let err = Aws::new()
            .with_program("/nonexistent/aws-cli-for-tests")
            .lookup_vpc("vpc-0abc")
            .unwrap_err();
        assert!(matches!(err, CloudProviderError::Spawn { .. }));
    }
}
