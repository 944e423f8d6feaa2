#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! Synthesizes the CloudFormation stack that runs the LiteLLM proxy on ECS
//! Fargate.
//!
//! Composition is a single synchronous pass over a [`StackConfig`]:
//!
//! - **Network** - reuse an existing VPC (looked up through
//!   [`proxy_cloud::NetworkLookup`]) or declare a fresh three-tier one
//! - **Config store** - KMS key, private config bucket, UI/master/API secrets
//! - **Database** - PostgreSQL in isolated subnets, reachable only from the
//!   service
//! - **Service** - Fargate tasks behind a public application load balancer
//!
//! The result is a [`Template`] that [`assembly::write_assembly`] renders to
//! disk.

pub mod assembly;
pub mod compose;
pub mod config;
pub mod construct;
pub mod constructs;
pub mod document;
pub mod error;
pub mod secret;
pub mod template;

pub use assembly::{write_assembly, Manifest, TemplateFormat};
pub use compose::{compose, SynthesizedStack};
pub use config::StackConfig;
pub use construct::{Environment, Scope, Stack};
pub use document::ConfigDocument;
pub use error::SynthError;
pub use secret::DeployTimeSecret;
pub use template::{Expr, LogicalId, RemovalPolicy, Resource, Template};
