//! Errors raised while composing a stack.

use std::path::PathBuf;

use proxy_cloud::CloudProviderError;
use thiserror::Error;

/// Errors that abort stack composition.
#[derive(Error, Debug)]
pub enum SynthError {
    /// Two constructs resolved to the same logical ID.
    #[error("Duplicate logical ID: {0}")]
    DuplicateId(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A construct cannot be placed in the available network.
    #[error("Placement error: {0}")]
    Placement(String),

    /// Looking up an existing network failed.
    #[error("Network lookup failed: {0}")]
    Lookup(#[from] CloudProviderError),

    /// The proxy configuration document could not be read.
    #[error("Failed to read config document {path}: {source}")]
    ConfigDocument {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing the cloud assembly failed.
    #[error("Failed to write {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse or render error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON render error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
