//! The proxy configuration document shipped to the config bucket.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use sha1::{Digest, Sha1};

use crate::error::SynthError;

/// Default location of the document, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

/// `os.environ/NAME` references inside the document.
static ENV_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"os\.environ/([A-Za-z_][A-Za-z0-9_]*)").expect("valid env reference pattern"));

/// A loaded, validated configuration document.
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    source: PathBuf,
    content: String,
    content_hash: String,
    env_references: BTreeSet<String>,
}

impl ConfigDocument {
    /// Read and validate the document at `path`.
    ///
    /// # Errors
    /// Returns [`SynthError::ConfigDocument`] if the file cannot be read, or a
    /// YAML/config error if it is not a mapping.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SynthError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| SynthError::ConfigDocument {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, content)
    }

    /// Validate in-memory content. `source` is only used for messages.
    ///
    /// # Errors
    /// Returns [`SynthError::Yaml`] for malformed YAML and
    /// [`SynthError::Config`] if the top level is not a mapping.
    pub fn parse(source: impl Into<PathBuf>, content: impl Into<String>) -> Result<Self, SynthError> {
        let source = source.into();
        let content = content.into();

        let parsed: serde_yaml::Value = serde_yaml::from_str(&content)?;
        if !parsed.is_mapping() {
            return Err(SynthError::Config(format!(
                "{} must be a YAML mapping",
                source.display()
            )));
        }

        let env_references = ENV_REFERENCE
            .captures_iter(&content)
            .map(|c| c[1].to_string())
            .collect();
        let content_hash = hex::encode(Sha1::digest(content.as_bytes()));

        Ok(Self {
            source,
            content,
            content_hash,
            env_references,
        })
    }

    /// Where the document came from.
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Raw content, uploaded verbatim.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Hex SHA-1 of the content.
    #[must_use]
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Distinct `os.environ/NAME` names, sorted.
    pub fn env_references(&self) -> impl Iterator<Item = &str> {
        self.env_references.iter().map(String::as_str)
    }

    /// Referenced names not in `available`.
    #[must_use]
    pub fn unresolved_references(&self, available: &[&str]) -> Vec<&str> {
        self.env_references()
            .filter(|name| !available.contains(name))
            .collect()
    }
}
