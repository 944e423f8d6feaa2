//! Lookup context persistence.
//!
//! Lookups are cached in a JSON file so that a synth run against an existing
//! VPC is reproducible and does not need credentials once the VPC has been
//! described. Entries are keyed by account, region and VPC ID.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::providers::{CloudProviderError, NetworkLookup, VpcDescription};

/// A single cached lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEntry {
    /// The looked-up VPC.
    pub vpc: VpcDescription,
    /// When the lookup was performed (RFC 3339).
    pub looked_up_at: String,
}

/// Caching wrapper around any [`NetworkLookup`].
#[derive(Debug)]
pub struct ContextCache<L> {
    inner: L,
    path: PathBuf,
    account: String,
    region: String,
    entries: RefCell<BTreeMap<String, ContextEntry>>,
}

impl<L: NetworkLookup> ContextCache<L> {
    /// Open (or start) the context file at `path`.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(
        inner: L,
        path: impl Into<PathBuf>,
        account: Option<&str>,
        region: Option<&str>,
    ) -> Result<Self, CloudProviderError> {
        let path = path.into();
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let entries: BTreeMap<String, ContextEntry> = serde_json::from_str(&content)?;
            debug!(path = %path.display(), entries = entries.len(), "Loaded lookup context");
            entries
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            inner,
            path,
            account: account.unwrap_or("unknown-account").to_string(),
            region: region.unwrap_or("unknown-region").to_string(),
            entries: RefCell::new(entries),
        })
    }

    /// Path of the backing context file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cache key for a VPC lookup.
    #[must_use]
    pub fn key(&self, vpc_id: &str) -> String {
        format!(
            "vpc-provider:account={}:region={}:vpcId={vpc_id}",
            self.account, self.region
        )
    }

    /// Drop a cached entry so the next lookup goes to the provider.
    ///
    /// # Errors
    /// Returns an error if the context file cannot be rewritten.
    pub fn invalidate(&self, vpc_id: &str) -> Result<(), CloudProviderError> {
        let removed = self.entries.borrow_mut().remove(&self.key(vpc_id)).is_some();
        if removed {
            info!(vpc_id = %vpc_id, "Discarded cached VPC lookup");
            self.save()?;
        }
        Ok(())
    }

    fn save(&self) -> Result<(), CloudProviderError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&*self.entries.borrow())?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

impl<L: NetworkLookup> NetworkLookup for ContextCache<L> {
    fn lookup_vpc(&self, vpc_id: &str) -> Result<VpcDescription, CloudProviderError> {
        let key = self.key(vpc_id);
        if let Some(entry) = self.entries.borrow().get(&key) {
            debug!(vpc_id = %vpc_id, looked_up_at = %entry.looked_up_at, "Using cached VPC lookup");
            return Ok(entry.vpc.clone());
        }

        let vpc = self.inner.lookup_vpc(vpc_id)?;
        self.entries.borrow_mut().insert(
            key,
            ContextEntry {
                vpc: vpc.clone(),
                looked_up_at: chrono::Utc::now().to_rfc3339(),
            },
        );
        self.save()?;
        info!(vpc_id = %vpc_id, path = %self.path.display(), "Cached VPC lookup");

        Ok(vpc)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::providers::{SubnetDescription, SubnetKind};

    struct CountingLookup {
        calls: Cell<usize>,
    }

    impl NetworkLookup for CountingLookup {
        fn lookup_vpc(&self, vpc_id: &str) -> Result<VpcDescription, CloudProviderError> {
            self.calls.set(self.calls.get() + 1);
            if vpc_id == "vpc-missing" {
                return Err(CloudProviderError::NotFound(vpc_id.to_string()));
            }
            Ok(VpcDescription {
                vpc_id: vpc_id.to_string(),
                cidr_block: Some("10.9.0.0/16".to_string()),
                subnets: vec![SubnetDescription {
                    subnet_id: "subnet-1".to_string(),
                    availability_zone: "us-east-1a".to_string(),
                    cidr_block: None,
                    route_table_id: None,
                    kind: SubnetKind::Public,
                }],
            })
        }
    }

    #[test]
    fn test_second_lookup_is_served_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("context.json");

        let cache = ContextCache::open(
            CountingLookup { calls: Cell::new(0) },
            &path,
            Some("123456789012"),
            Some("us-east-1"),
        )
        .unwrap();
        let first = cache.lookup_vpc("vpc-1").unwrap();
        let second = cache.lookup_vpc("vpc-1").unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.inner.calls.get(), 1);

        // A fresh cache over the same file never reaches the provider.
        let reopened = ContextCache::open(
            CountingLookup { calls: Cell::new(0) },
            &path,
            Some("123456789012"),
            Some("us-east-1"),
        )
        .unwrap();
        assert_eq!(reopened.lookup_vpc("vpc-1").unwrap(), first);
        assert_eq!(reopened.inner.calls.get(), 0);
    }

    #[test]
    fn test_invalidate_forces_fresh_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ContextCache::open(
            CountingLookup { calls: Cell::new(0) },
            dir.path().join("context.json"),
            None,
            None,
        )
        .unwrap();

        cache.lookup_vpc("vpc-1").unwrap();
        cache.invalidate("vpc-1").unwrap();
        cache.lookup_vpc("vpc-1").unwrap();
        assert_eq!(cache.inner.calls.get(), 2);
        assert_eq!(
            cache.key("vpc-1"),
            "vpc-provider:account=unknown-account:region=unknown-region:vpcId=vpc-1"
        );
    }

    #[test]
    fn test_failed_lookup_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("context.json");
        let cache =
            ContextCache::open(CountingLookup { calls: Cell::new(0) }, &path, None, None).unwrap();

        assert!(matches!(
            cache.lookup_vpc("vpc-missing"),
            Err(CloudProviderError::NotFound(_))
        ));
        assert!(!path.exists());
    }
}
