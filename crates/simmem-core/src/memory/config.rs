//! Memory configuration.
//!
//! The owning agent supplies the memory's name; nothing here draws from a
//! process-wide counter.

use serde::{Deserialize, Serialize};
use simmem_store::{Capacity, PolicyKind, VersionPolicy};

use super::error::{MemoryError, MemoryResult};
use super::retention::Retention;

/// Name of a memory instance, used in logs and reports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryName(String);

impl MemoryName {
    pub fn new(name: impl Into<String>) -> Self {
        MemoryName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MemoryName {
    fn default() -> Self {
        MemoryName("memory".to_string())
    }
}

impl std::fmt::Display for MemoryName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MemoryName {
    fn from(name: &str) -> Self {
        MemoryName::new(name)
    }
}

impl From<String> for MemoryName {
    fn from(name: String) -> Self {
        MemoryName(name)
    }
}

/// Configuration for a memory instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Name supplied by the owning agent
    pub name: MemoryName,
    /// Maximum number of stored properties
    pub capacity: Capacity,
    /// Eviction policy used when full
    pub policy: PolicyKind,
    /// Retention applied by `memorize` when none is given
    pub default_retention: Retention,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig {
            name: MemoryName::default(),
            capacity: Capacity::Unlimited,
            policy: PolicyKind::Fifo,
            default_retention: Retention::Unlimited,
        }
    }
}

impl MemoryConfig {
    pub fn new(name: impl Into<MemoryName>) -> Self {
        MemoryConfig {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_capacity(mut self, capacity: impl Into<Capacity>) -> Self {
        self.capacity = capacity.into();
        self
    }

    pub fn with_policy(mut self, policy: PolicyKind) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_default_retention(mut self, retention: impl Into<Retention>) -> Self {
        self.default_retention = retention.into();
        self
    }

    /// Parse a JSON config; missing fields take their defaults.
    pub fn from_json(json: &str) -> MemoryResult<Self> {
        serde_json::from_str(json).map_err(|e| MemoryError::InvalidConfig(e.to_string()))
    }

    /// Check the config against a version policy.
    pub fn validate<P: VersionPolicy>(&self) -> MemoryResult<()> {
        if self.name.as_str().trim().is_empty() {
            return Err(MemoryError::InvalidConfig(
                "memory name must not be empty".to_string(),
            ));
        }
        if !P::KEEPS_HISTORY && !self.default_retention.is_unlimited() {
            return Err(MemoryError::NotImplemented {
                operation: "default retention",
                variant: P::NAME,
            });
        }
        Ok(())
    }
}
