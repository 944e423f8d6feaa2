//! Network lookup trait and common types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during cloud provider lookups.
#[derive(Error, Debug)]
pub enum CloudProviderError {
    /// The provider CLI could not be started.
    #[error("Failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The provider CLI exited with an error.
    #[error("{command} failed: {stderr}")]
    Cli { command: String, stderr: String },

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Authentication error.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Context file could not be read or written.
    #[error("Context file error: {0}")]
    Context(#[from] std::io::Error),
}

// ============================================================================
// Network types
// ============================================================================

/// How a subnet reaches (or does not reach) the internet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubnetKind {
    /// Routes 0.0.0.0/0 through an internet gateway.
    Public,
    /// Has a default route that is not an internet gateway (usually NAT).
    PrivateWithEgress,
    /// No default route at all.
    PrivateIsolated,
}

impl std::fmt::Display for SubnetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Public => write!(f, "public"),
            Self::PrivateWithEgress => write!(f, "private-with-egress"),
            Self::PrivateIsolated => write!(f, "private-isolated"),
        }
    }
}

/// A subnet of a looked-up VPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetDescription {
    /// Subnet ID (e.g., "subnet-0abc").
    pub subnet_id: String,
    /// Availability zone (e.g., "eu-north-1a").
    pub availability_zone: String,
    /// IPv4 CIDR block.
    pub cidr_block: Option<String>,
    /// Route table serving this subnet.
    pub route_table_id: Option<String>,
    /// Classified subnet kind.
    pub kind: SubnetKind,
}

/// An existing VPC and its classified subnets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpcDescription {
    /// VPC ID (e.g., "vpc-0abc").
    pub vpc_id: String,
    /// Primary IPv4 CIDR block.
    pub cidr_block: Option<String>,
    /// All subnets of the VPC.
    pub subnets: Vec<SubnetDescription>,
}

/// Resolves an existing network by identifier.
///
/// Lookups are synchronous: they run once, before composition, and their
/// result is treated as fixed input.
pub trait NetworkLookup {
    /// Describe the VPC with the given ID.
    ///
    /// # Errors
    /// Returns [`CloudProviderError::NotFound`] when no such VPC exists, or
    /// another variant when the provider cannot be queried.
    fn lookup_vpc(&self, vpc_id: &str) -> Result<VpcDescription, CloudProviderError>;
}

impl<T: NetworkLookup + ?Sized> NetworkLookup for &T {
    fn lookup_vpc(&self, vpc_id: &str) -> Result<VpcDescription, CloudProviderError> {
        (**self).lookup_vpc(vpc_id)
    }
}
