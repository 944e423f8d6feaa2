//! Building blocks of the proxy stack, in dependency order.

pub mod config_store;
pub mod database;
pub mod housekeeping;
pub mod iam;
pub mod network;
pub mod service;

pub use config_store::{ConfigBucket, ConfigStore, EncryptionKey, ManagedSecret};
pub use database::{Connection, Database};
pub use housekeeping::Housekeeping;
pub use iam::{PolicyDocument, PolicyStatement, Role};
pub use network::{Network, NetworkProps, SecurityGroup, Subnet};
pub use service::ProxyService;
