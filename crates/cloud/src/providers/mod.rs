//! Cloud provider abstractions.
//!
//! This module defines the common traits and types for network lookups.

pub mod aws;
mod traits;

pub use traits::{
    CloudProviderError, NetworkLookup, SubnetDescription, SubnetKind, VpcDescription,
};

// Re-export provider clients
pub use aws::Aws;
