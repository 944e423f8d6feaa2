//! Cloud provider lookups for the proxy stack synthesizer.
//!
//! Stack composition is a pure, synchronous pass. The only time it needs to
//! talk to a cloud provider is when the operator asks to reuse an existing
//! VPC; this crate answers that question:
//!
//! - **AWS** - describes a VPC, its subnets and route tables through the
//!   `aws` CLI and classifies every subnet as public, private-with-egress or
//!   private-isolated
//! - **Context cache** - persists lookup results to a JSON file so repeated
//!   synths are reproducible and work offline

pub mod context;
pub mod providers;

pub use context::ContextCache;
pub use providers::{
    aws, CloudProviderError, NetworkLookup, SubnetDescription, SubnetKind, VpcDescription,
};
