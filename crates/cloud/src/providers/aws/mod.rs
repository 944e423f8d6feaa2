//! AWS (Amazon Web Services) network lookups.
//!
//! Implements the [`NetworkLookup`](super::NetworkLookup) trait for AWS.
//!
//! ## Commands
//!
//! - **ec2 describe-vpcs** - confirms the VPC exists and reads its CIDR
//! - **ec2 describe-subnets** - lists the subnets and their zones
//! - **ec2 describe-route-tables** - decides which subnets can reach the
//!   internet and how
//!
//! Credentials and region resolution are left to the `aws` CLI, so the usual
//! `AWS_PROFILE` / `AWS_REGION` environment applies.

mod client;
mod models;

pub use client::{classify_subnet, Aws};
pub use models::*;
