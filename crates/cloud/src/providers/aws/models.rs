//! AWS CLI response models.
//!
//! Field names follow the JSON the `aws ec2` commands print with
//! `--output json`.

use serde::{Deserialize, Serialize};

/// Tag key CDK-style tooling uses to record a subnet's intended kind.
pub const SUBNET_TYPE_TAG: &str = "aws-cdk:subnet-type";

// ============================================================================
// VPC types
// ============================================================================

/// `describe-vpcs` response.
#[derive(Debug, Deserialize)]
pub struct DescribeVpcsResponse {
    /// VPCs.
    #[serde(rename = "Vpcs", default)]
    pub vpcs: Vec<Ec2Vpc>,
}

/// EC2 VPC information.
#[derive(Debug, Clone, Deserialize)]
pub struct Ec2Vpc {
    /// VPC ID.
    #[serde(rename = "VpcId")]
    pub vpc_id: String,
    /// Primary CIDR block.
    #[serde(rename = "CidrBlock")]
    pub cidr_block: Option<String>,
    /// State.
    #[serde(rename = "State")]
    pub state: Option<String>,
    /// Tags.
    #[serde(rename = "Tags", default)]
    pub tags: Vec<Tag>,
}

// ============================================================================
// Subnet types
// ============================================================================

/// `describe-subnets` response.
#[derive(Debug, Deserialize)]
pub struct DescribeSubnetsResponse {
    /// Subnets.
    #[serde(rename = "Subnets", default)]
    pub subnets: Vec<Ec2Subnet>,
}

/// EC2 subnet information.
#[derive(Debug, Clone, Deserialize)]
pub struct Ec2Subnet {
    /// Subnet ID.
    #[serde(rename = "SubnetId")]
    pub subnet_id: String,
    /// VPC ID.
    #[serde(rename = "VpcId")]
    pub vpc_id: String,
    /// Availability zone.
    #[serde(rename = "AvailabilityZone")]
    pub availability_zone: String,
    /// CIDR block.
    #[serde(rename = "CidrBlock")]
    pub cidr_block: Option<String>,
    /// Whether instances get a public IP by default.
    #[serde(rename = "MapPublicIpOnLaunch", default)]
    pub map_public_ip_on_launch: bool,
    /// Tags.
    #[serde(rename = "Tags", default)]
    pub tags: Vec<Tag>,
}

// ============================================================================
// Route table types
// ============================================================================

/// `describe-route-tables` response.
#[derive(Debug, Deserialize)]
pub struct DescribeRouteTablesResponse {
    /// Route tables.
    #[serde(rename = "RouteTables", default)]
    pub route_tables: Vec<RouteTable>,
}

/// EC2 route table.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteTable {
    /// Route table ID.
    #[serde(rename = "RouteTableId")]
    pub route_table_id: String,
    /// Subnet associations.
    #[serde(rename = "Associations", default)]
    pub associations: Vec<RouteTableAssociation>,
    /// Routes.
    #[serde(rename = "Routes", default)]
    pub routes: Vec<Route>,
}

impl RouteTable {
    /// Whether this is the VPC's main route table.
    #[must_use]
    pub fn is_main(&self) -> bool {
        self.associations.iter().any(|a| a.main)
    }

    /// The IPv4 default route, if any.
    #[must_use]
    pub fn default_route(&self) -> Option<&Route> {
        self.routes
            .iter()
            .find(|r| r.destination_cidr_block.as_deref() == Some("0.0.0.0/0"))
    }
}

/// Route table association.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteTableAssociation {
    /// Main route table flag.
    #[serde(rename = "Main", default)]
    pub main: bool,
    /// Associated subnet, absent for the main association.
    #[serde(rename = "SubnetId")]
    pub subnet_id: Option<String>,
}

/// A single route.
#[derive(Debug, Clone, Deserialize)]
pub struct Route {
    /// Destination CIDR.
    #[serde(rename = "DestinationCidrBlock")]
    pub destination_cidr_block: Option<String>,
    /// Internet gateway (or "local").
    #[serde(rename = "GatewayId")]
    pub gateway_id: Option<String>,
    /// NAT gateway.
    #[serde(rename = "NatGatewayId")]
    pub nat_gateway_id: Option<String>,
    /// Transit gateway.
    #[serde(rename = "TransitGatewayId")]
    pub transit_gateway_id: Option<String>,
    /// NAT instance.
    #[serde(rename = "InstanceId")]
    pub instance_id: Option<String>,
}

// ============================================================================
// Common AWS types
// ============================================================================

/// Tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    /// Tag key.
    #[serde(rename = "Key")]
    pub key: String,
    /// Tag value.
    #[serde(rename = "Value")]
    pub value: String,
}

/// Find a tag value by key.
#[must_use]
pub fn tag_value<'a>(tags: &'a [Tag], key: &str) -> Option<&'a str> {
    tags.iter().find(|t| t.key == key).map(|t| t.value.as_str())
}
