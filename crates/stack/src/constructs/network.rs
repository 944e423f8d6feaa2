//! Network topology provider.
//!
//! Either reuses an existing VPC (looked up through [`NetworkLookup`], no
//! network resources declared) or declares a fresh three-tier VPC:
//!
//! | group         | kind                | mask | route                 |
//! |---------------|---------------------|------|-----------------------|
//! | `ingress`     | public              | /24  | internet gateway      |
//! | `application` | private with egress | /24  | NAT gateway           |
//! | `database`    | private isolated    | /28  | none                  |
//!
//! One subnet per group per zone, allocated sequentially from the VPC CIDR.

use std::net::Ipv4Addr;

use proxy_cloud::{NetworkLookup, SubnetKind};
use serde_json::{json, Value};
use tracing::info;

use crate::construct::{Scope, Stack};
use crate::error::SynthError;
use crate::template::{Expr, LogicalId, Resource};

/// CIDR of a freshly declared VPC.
pub const DEFAULT_VPC_CIDR: &str = "10.0.0.0/16";

/// Minimum number of zones a fresh VPC spans (RDS subnet groups need two).
pub const MIN_AVAILABILITY_ZONES: usize = 2;

/// A subnet group of a fresh VPC.
#[derive(Debug, Clone, Copy)]
struct SubnetGroup {
    name: &'static str,
    kind: SubnetKind,
    mask: u8,
}

const SUBNET_GROUPS: [SubnetGroup; 3] = [
    SubnetGroup {
        name: "ingress",
        kind: SubnetKind::Public,
        mask: 24,
    },
    SubnetGroup {
        name: "application",
        kind: SubnetKind::PrivateWithEgress,
        mask: 24,
    },
    SubnetGroup {
        name: "database",
        kind: SubnetKind::PrivateIsolated,
        mask: 28,
    },
];

/// Tag value recorded on subnets so later lookups classify them the same way.
fn subnet_type_tag(kind: SubnetKind) -> &'static str {
    match kind {
        SubnetKind::Public => "Public",
        SubnetKind::PrivateWithEgress => "Private",
        SubnetKind::PrivateIsolated => "Isolated",
    }
}

/// Inputs to [`Network::build`].
#[derive(Debug, Clone)]
pub struct NetworkProps<'a> {
    /// Reuse this VPC instead of declaring one.
    pub existing_vpc_id: Option<&'a str>,
    /// Zones for a fresh VPC.
    pub availability_zones: Vec<Expr>,
    /// NAT gateways for a fresh VPC (at least one, at most one per zone).
    pub nat_gateways: usize,
    /// CIDR for a fresh VPC.
    pub cidr: &'a str,
}

/// A subnet usable for placement.
#[derive(Debug, Clone, PartialEq)]
pub struct Subnet {
    pub subnet_id: Expr,
    pub availability_zone: Expr,
    pub kind: SubnetKind,
    pub cidr_block: Option<String>,
}

/// The stack's network.
#[derive(Debug, Clone)]
pub struct Network {
    vpc_id: Expr,
    subnets: Vec<Subnet>,
    imported: bool,
}

impl Network {
    /// Look up or declare the network.
    ///
    /// # Errors
    /// Returns [`SynthError::Lookup`] if the existing VPC cannot be found, or
    /// [`SynthError::Config`] for an unusable zone/NAT layout.
    pub fn build(
        stack: &mut Stack,
        scope: &Scope,
        props: &NetworkProps<'_>,
        lookup: &dyn NetworkLookup,
    ) -> Result<Self, SynthError> {
        if let Some(vpc_id) = props.existing_vpc_id {
            let vpc = lookup.lookup_vpc(vpc_id)?;
            info!(vpc_id = %vpc.vpc_id, subnets = vpc.subnets.len(), "Reusing existing VPC");
            return Ok(Self {
                vpc_id: Expr::lit(vpc.vpc_id.clone()),
                subnets: vpc
                    .subnets
                    .iter()
                    .map(|s| Subnet {
                        subnet_id: Expr::lit(s.subnet_id.clone()),
                        availability_zone: Expr::lit(s.availability_zone.clone()),
                        kind: s.kind,
                        cidr_block: s.cidr_block.clone(),
                    })
                    .collect(),
                imported: true,
            });
        }

        Self::declare(stack, scope, props)
    }

    fn declare(stack: &mut Stack, scope: &Scope, props: &NetworkProps<'_>) -> Result<Self, SynthError> {
        let zones = &props.availability_zones;
        if distinct(zones.iter()) < MIN_AVAILABILITY_ZONES {
            return Err(SynthError::Config(format!(
                "a new VPC needs at least {MIN_AVAILABILITY_ZONES} distinct availability zones, got {}",
                distinct(zones.iter())
            )));
        }
        if props.nat_gateways == 0 || props.nat_gateways > zones.len() {
            return Err(SynthError::Config(format!(
                "NAT gateway count must be between 1 and {}, got {}",
                zones.len(),
                props.nat_gateways
            )));
        }

        let mut cidrs = CidrAllocator::parse(props.cidr)?;

        let vpc = stack.add(
            scope,
            "Resource",
            Resource::new(
                "AWS::EC2::VPC",
                json!({
                    "CidrBlock": props.cidr,
                    "EnableDnsHostnames": true,
                    "EnableDnsSupport": true,
                    "InstanceTenancy": "default",
                    "Tags": stack.name_tag(scope),
                }),
            ),
        )?;
        let igw = stack.add(
            scope,
            "IGW",
            Resource::new(
                "AWS::EC2::InternetGateway",
                json!({ "Tags": stack.name_tag(scope) }),
            ),
        )?;
        let attachment = stack.add(
            scope,
            "VPCGW",
            Resource::new(
                "AWS::EC2::VPCGatewayAttachment",
                json!({ "VpcId": vpc.reference(), "InternetGatewayId": igw.reference() }),
            ),
        )?;

        let mut subnets = Vec::new();
        let mut nat_gateways: Vec<LogicalId> = Vec::new();

        for group in SUBNET_GROUPS {
            for (index, zone) in zones.iter().enumerate() {
                let subnet_scope = scope.child(&format!("{}Subnet{}", group.name, index + 1));
                let cidr = cidrs.allocate(group.mask)?;

                let mut tags = stack.name_tag(&subnet_scope);
                if let Value::Array(entries) = &mut tags {
                    entries.push(json!({ "Key": "aws-cdk:subnet-name", "Value": group.name }));
                    entries.push(json!({ "Key": "aws-cdk:subnet-type", "Value": subnet_type_tag(group.kind) }));
                }

                let subnet = stack.add(
                    &subnet_scope,
                    "Subnet",
                    Resource::new(
                        "AWS::EC2::Subnet",
                        json!({
                            "VpcId": vpc.reference(),
                            "AvailabilityZone": zone,
                            "CidrBlock": cidr,
                            "MapPublicIpOnLaunch": group.kind == SubnetKind::Public,
                            "Tags": tags,
                        }),
                    ),
                )?;
                let route_table = stack.add(
                    &subnet_scope,
                    "RouteTable",
                    Resource::new(
                        "AWS::EC2::RouteTable",
                        json!({ "VpcId": vpc.reference(), "Tags": stack.name_tag(&subnet_scope) }),
                    ),
                )?;
                let association = stack.add(
                    &subnet_scope,
                    "RouteTableAssociation",
                    Resource::new(
                        "AWS::EC2::SubnetRouteTableAssociation",
                        json!({ "RouteTableId": route_table.reference(), "SubnetId": subnet.reference() }),
                    ),
                )?;

                match group.kind {
                    SubnetKind::Public => {
                        let route = stack.add(
                            &subnet_scope,
                            "DefaultRoute",
                            Resource::new(
                                "AWS::EC2::Route",
                                json!({
                                    "RouteTableId": route_table.reference(),
                                    "DestinationCidrBlock": "0.0.0.0/0",
                                    "GatewayId": igw.reference(),
                                }),
                            )
                            .depends_on(&attachment),
                        )?;
                        if index < props.nat_gateways {
                            let eip = stack.add(
                                &subnet_scope,
                                "EIP",
                                Resource::new(
                                    "AWS::EC2::EIP",
                                    json!({ "Domain": "vpc", "Tags": stack.name_tag(&subnet_scope) }),
                                ),
                            )?;
                            let nat = stack.add(
                                &subnet_scope,
                                "NATGateway",
                                Resource::new(
                                    "AWS::EC2::NatGateway",
                                    json!({
                                        "SubnetId": subnet.reference(),
                                        "AllocationId": eip.get_att("AllocationId"),
                                        "Tags": stack.name_tag(&subnet_scope),
                                    }),
                                )
                                .depends_on(&route)
                                .depends_on(&association),
                            )?;
                            nat_gateways.push(nat);
                        }
                    }
                    SubnetKind::PrivateWithEgress => {
                        let nat = &nat_gateways[index % nat_gateways.len()];
                        stack.add(
                            &subnet_scope,
                            "DefaultRoute",
                            Resource::new(
                                "AWS::EC2::Route",
                                json!({
                                    "RouteTableId": route_table.reference(),
                                    "DestinationCidrBlock": "0.0.0.0/0",
                                    "NatGatewayId": nat.reference(),
                                }),
                            ),
                        )?;
                    }
                    SubnetKind::PrivateIsolated => {}
                }

                subnets.push(Subnet {
                    subnet_id: subnet.reference(),
                    availability_zone: zone.clone(),
                    kind: group.kind,
                    cidr_block: Some(cidr),
                });
            }
        }

        info!(
            zones = zones.len(),
            subnets = subnets.len(),
            nat_gateways = nat_gateways.len(),
            "Declared VPC"
        );

        Ok(Self {
            vpc_id: vpc.reference(),
            subnets,
            imported: false,
        })
    }

    /// Whether the VPC was looked up rather than declared.
    #[must_use]
    pub fn is_imported(&self) -> bool {
        self.imported
    }

    /// VPC ID expression.
    #[must_use]
    pub fn vpc_id(&self) -> &Expr {
        &self.vpc_id
    }

    /// Subnets of one kind.
    pub fn subnets(&self, kind: SubnetKind) -> impl Iterator<Item = &Subnet> {
        self.subnets.iter().filter(move |s| s.kind == kind)
    }

    /// Subnet IDs of one kind, requiring coverage of at least `min_zones`
    /// distinct zones.
    ///
    /// # Errors
    /// Returns [`SynthError::Placement`] if the network cannot satisfy the
    /// requirement.
    pub fn placement(&self, kind: SubnetKind, min_zones: usize, purpose: &str) -> Result<Vec<Expr>, SynthError> {
        let zones = distinct(self.subnets(kind).map(|s| &s.availability_zone));
        if zones < min_zones {
            return Err(SynthError::Placement(format!(
                "{purpose} needs {kind} subnets in at least {min_zones} availability zone(s), found {zones}"
            )));
        }
        Ok(self.subnets(kind).map(|s| s.subnet_id.clone()).collect())
    }
}

fn distinct<'a>(values: impl Iterator<Item = &'a Expr>) -> usize {
    let mut seen: Vec<&Expr> = Vec::new();
    for value in values {
        if !seen.contains(&value) {
            seen.push(value);
        }
    }
    seen.len()
}

/// Sequential, aligned IPv4 block allocation inside a parent CIDR.
#[derive(Debug)]
struct CidrAllocator {
    end: u64,
    next: u64,
}

impl CidrAllocator {
    fn parse(cidr: &str) -> Result<Self, SynthError> {
        let invalid = || SynthError::Config(format!("invalid VPC CIDR '{cidr}'"));
        let (address, prefix) = cidr.split_once('/').ok_or_else(invalid)?;
        let address: Ipv4Addr = address.parse().map_err(|_| invalid())?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
        if !(16..=28).contains(&prefix) {
            return Err(SynthError::Config(format!(
                "VPC CIDR prefix must be between /16 and /28, got /{prefix}"
            )));
        }

        let size = 1u64 << (32 - u32::from(prefix));
        let base = u64::from(u32::from(address)) & !(size - 1);
        Ok(Self {
            end: base + size,
            next: base,
        })
    }

    fn allocate(&mut self, mask: u8) -> Result<String, SynthError> {
        let size = 1u64 << (32 - u32::from(mask));
        let start = self.next.div_ceil(size) * size;
        if start + size > self.end {
            return Err(SynthError::Config(format!(
                "VPC CIDR exhausted allocating a /{mask} block"
            )));
        }
        self.next = start + size;

        let address = Ipv4Addr::from(u32::try_from(start).map_err(|_| {
            SynthError::Config(format!("address {start} out of IPv4 range"))
        })?);
        Ok(format!("{address}/{mask}"))
    }
}

/// A VPC security group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroup {
    pub id: LogicalId,
}

impl SecurityGroup {
    /// Declare a security group. With `allow_all_outbound == false` a
    /// placeholder egress rule matching no traffic replaces the implicit
    /// allow-all.
    ///
    /// # Errors
    /// Returns an error if the path is already used.
    pub fn declare(
        stack: &mut Stack,
        scope: &Scope,
        id: &str,
        network: &Network,
        description: &str,
        allow_all_outbound: bool,
        ingress: Vec<Value>,
    ) -> Result<Self, SynthError> {
        let egress = if allow_all_outbound {
            json!([{ "CidrIp": "0.0.0.0/0", "Description": "Allow all outbound traffic by default", "IpProtocol": "-1" }])
        } else {
            json!([{
                "CidrIp": "255.255.255.255/32",
                "Description": "Disallow all traffic",
                "FromPort": 252,
                "IpProtocol": "icmp",
                "ToPort": 86
            }])
        };

        let mut properties = json!({
            "GroupDescription": description,
            "VpcId": network.vpc_id(),
            "SecurityGroupEgress": egress,
        });
        if !ingress.is_empty() {
            properties["SecurityGroupIngress"] = Value::Array(ingress);
        }

        let id = stack.add(scope, id, Resource::new("AWS::EC2::SecurityGroup", properties))?;
        Ok(Self { id })
    }

    /// `GroupId` attribute.
    #[must_use]
    pub fn group_id(&self) -> Expr {
        self.id.get_att("GroupId")
    }

    /// Inline ingress rule allowing TCP `port` from a CIDR.
    #[must_use]
    pub fn cidr_ingress(cidr: &str, port: u16, description: &str) -> Value {
        json!({
            "CidrIp": cidr,
            "Description": description,
            "FromPort": port,
            "IpProtocol": "tcp",
            "ToPort": port
        })
    }

    /// Allow TCP `port` into this group from `source`, as a standalone rule.
    ///
    /// # Errors
    /// Returns an error if an identical rule was already declared.
    pub fn allow_from(
        &self,
        stack: &mut Stack,
        scope: &Scope,
        source: &SecurityGroup,
        port: u16,
        description: &str,
    ) -> Result<LogicalId, SynthError> {
        stack.add(
            scope,
            &format!("from{}{port}", source.id),
            Resource::new(
                "AWS::EC2::SecurityGroupIngress",
                json!({
                    "IpProtocol": "tcp",
                    "Description": description,
                    "FromPort": port,
                    "ToPort": port,
                    "GroupId": self.group_id(),
                    "SourceSecurityGroupId": source.group_id(),
                }),
            ),
        )
    }

    /// Allow TCP `port` out of this group to `destination`, as a standalone rule.
    ///
    /// # Errors
    /// Returns an error if an identical rule was already declared.
    pub fn allow_to(
        &self,
        stack: &mut Stack,
        scope: &Scope,
        destination: &SecurityGroup,
        port: u16,
        description: &str,
    ) -> Result<LogicalId, SynthError> {
        stack.add(
            scope,
            &format!("to{}{port}", destination.id),
            Resource::new(
                "AWS::EC2::SecurityGroupEgress",
                json!({
                    "IpProtocol": "tcp",
                    "Description": description,
                    "FromPort": port,
                    "ToPort": port,
                    "GroupId": self.group_id(),
                    "DestinationSecurityGroupId": destination.group_id(),
                }),
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use proxy_cloud::{CloudProviderError, SubnetDescription, VpcDescription};

    use super::*;
    use crate::construct::Environment;

    struct NoLookup;

    impl NetworkLookup for NoLookup {
        fn lookup_vpc(&self, vpc_id: &str) -> Result<VpcDescription, CloudProviderError> {
            Err(CloudProviderError::NotFound(vpc_id.to_string()))
        }
    }

    struct FixedLookup;

    impl NetworkLookup for FixedLookup {
        fn lookup_vpc(&self, vpc_id: &str) -> Result<VpcDescription, CloudProviderError> {
            let subnet = |id: &str, az: &str, kind| SubnetDescription {
                subnet_id: id.to_string(),
                availability_zone: az.to_string(),
                cidr_block: None,
                route_table_id: None,
                kind,
            };
            Ok(VpcDescription {
                vpc_id: vpc_id.to_string(),
                cidr_block: None,
                subnets: vec![
                    subnet("subnet-db-a", "eu-north-1a", SubnetKind::PrivateIsolated),
                    subnet("subnet-app-a", "eu-north-1a", SubnetKind::PrivateWithEgress),
                ],
            })
        }
    }

    fn zones() -> Vec<Expr> {
        vec![Expr::lit("eu-north-1a"), Expr::lit("eu-north-1b")]
    }

    fn props(existing: Option<&str>) -> NetworkProps<'_> {
        NetworkProps {
            existing_vpc_id: existing,
            availability_zones: zones(),
            nat_gateways: 1,
            cidr: DEFAULT_VPC_CIDR,
        }
    }

    #[test]
    fn test_cidr_layout_is_sequential_and_aligned() {
        let mut alloc = CidrAllocator::parse(DEFAULT_VPC_CIDR).unwrap();
        let blocks: Vec<String> = [24, 24, 24, 24, 28, 28]
            .iter()
            .map(|m| alloc.allocate(*m).unwrap())
            .collect();
        assert_eq!(
            blocks,
            vec![
                "10.0.0.0/24",
                "10.0.1.0/24",
                "10.0.2.0/24",
                "10.0.3.0/24",
                "10.0.4.0/28",
                "10.0.4.16/28"
            ]
        );

        // Realigns after a small block.
        assert_eq!(alloc.allocate(24).unwrap(), "10.0.5.0/24");
    }

    #[test]
    fn test_cidr_exhaustion() {
        let mut alloc = CidrAllocator::parse("10.0.0.0/28").unwrap();
        assert_eq!(alloc.allocate(28).unwrap(), "10.0.0.0/28");
        assert!(alloc.allocate(28).is_err());
        assert!(CidrAllocator::parse("10.0.0.0/8").is_err());
        assert!(CidrAllocator::parse("not-a-cidr").is_err());
    }

    #[test]
    fn test_fresh_vpc_declares_three_tiers_per_zone() {
        let mut stack = Stack::new("S", Environment::default(), None);
        let network = Network::build(&mut stack, &Scope::root().child("VPC"), &props(None), &NoLookup).unwrap();

        assert!(!network.is_imported());
        let template = stack.template();
        assert_eq!(template.resources_of_type("AWS::EC2::VPC").count(), 1);
        assert_eq!(template.resources_of_type("AWS::EC2::Subnet").count(), 6);
        assert_eq!(template.resources_of_type("AWS::EC2::NatGateway").count(), 1);
        // Two public default routes + two NAT routes, none for isolated subnets.
        assert_eq!(template.resources_of_type("AWS::EC2::Route").count(), 4);

        let masks: Vec<&str> = template
            .resources_of_type("AWS::EC2::Subnet")
            .filter_map(|(_, r)| r.property("CidrBlock").and_then(Value::as_str))
            .filter(|c| c.ends_with("/28"))
            .collect();
        assert_eq!(masks.len(), 2);

        assert_eq!(network.placement(SubnetKind::PrivateIsolated, 2, "db").unwrap().len(), 2);
        assert_eq!(network.placement(SubnetKind::PrivateWithEgress, 1, "svc").unwrap().len(), 2);
    }

    #[test]
    fn test_single_zone_is_rejected() {
        let mut stack = Stack::new("S", Environment::default(), None);
        let mut single = props(None);
        single.availability_zones = vec![Expr::lit("eu-north-1a"), Expr::lit("eu-north-1a")];

        let err = Network::build(&mut stack, &Scope::root().child("VPC"), &single, &NoLookup).unwrap_err();
        assert!(matches!(err, SynthError::Config(_)));
    }

    #[test]
    fn test_existing_vpc_declares_nothing() {
        let mut stack = Stack::new("S", Environment::default(), None);
        let network = Network::build(
            &mut stack,
            &Scope::root().child("VPC"),
            &props(Some("vpc-0abc")),
            &FixedLookup,
        )
        .unwrap();

        assert!(network.is_imported());
        assert_eq!(network.vpc_id(), &Expr::lit("vpc-0abc"));
        assert_eq!(stack.template().resources().count(), 0);

        // Only one isolated zone: the database cannot be placed.
        let err = network.placement(SubnetKind::PrivateIsolated, 2, "database").unwrap_err();
        assert!(matches!(err, SynthError::Placement(_)));
    }

    #[test]
    fn test_missing_vpc_is_fatal() {
        let mut stack = Stack::new("S", Environment::default(), None);
        let err = Network::build(
            &mut stack,
            &Scope::root().child("VPC"),
            &props(Some("vpc-missing")),
            &NoLookup,
        )
        .unwrap_err();
        assert!(matches!(err, SynthError::Lookup(CloudProviderError::NotFound(_))));
    }
}
