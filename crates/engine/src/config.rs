//! Store configuration via `docstore.toml`
//!
//! A single flat file names the keyspace every schema lives in, the
//! replication factor used when the keyspace is created, and the topology of
//! the in-process cluster. Missing fields fall back to defaults, so an empty
//! file is a valid configuration.

use std::path::Path;

use docstore_core::validate_name;
use docstore_storage::{ClusterConfig, MemoryCluster};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Config file name
pub const CONFIG_FILE_NAME: &str = "docstore.toml";

/// Store configuration loaded from `docstore.toml`.
///
/// # Example
///
/// ```toml
/// keyspace = "docstore"
/// replication_factor = 1
///
/// [cluster]
/// nodes = 3
/// vnodes = 16
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocstoreConfig {
    /// Keyspace holding every column family
    #[serde(default = "default_keyspace")]
    pub keyspace: String,
    /// Replication factor written into `CREATE KEYSPACE`
    #[serde(default = "default_replication_factor")]
    pub replication_factor: u32,
    /// Topology of the in-process cluster
    #[serde(default)]
    pub cluster: ClusterConfig,
}

fn default_keyspace() -> String {
    "docstore".to_string()
}

fn default_replication_factor() -> u32 {
    1
}

impl Default for DocstoreConfig {
    fn default() -> Self {
        Self {
            keyspace: default_keyspace(),
            replication_factor: default_replication_factor(),
            cluster: ClusterConfig::default(),
        }
    }
}

impl DocstoreConfig {
    /// Config for the given keyspace with every other field defaulted
    pub fn with_keyspace(keyspace: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            ..Self::default()
        }
    }

    /// Check field values.
    ///
    /// # Errors
    ///
    /// Returns a config error for an unusable keyspace name, a zero
    /// replication factor or an empty cluster.
    pub fn validate(&self) -> Result<()> {
        validate_name("keyspace", &self.keyspace)
            .map_err(|e| Error::config(format!("{} in {}", e, CONFIG_FILE_NAME)))?;
        if self.replication_factor == 0 {
            return Err(Error::config(format!(
                "replication_factor must be at least 1 in {}",
                CONFIG_FILE_NAME
            )));
        }
        if self.cluster.nodes == 0 || self.cluster.vnodes == 0 {
            return Err(Error::config(format!(
                "[cluster] nodes and vnodes must be at least 1 in {}",
                CONFIG_FILE_NAME
            )));
        }
        Ok(())
    }

    /// Start an in-process cluster with the configured topology
    pub fn memory_cluster(&self) -> MemoryCluster {
        MemoryCluster::new(self.cluster.clone())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# docstore configuration
#
# Keyspace holding the databases, tables, indexes and documents column
# families, plus one view table per declared index.
keyspace = "docstore"

# Replication factor used when the keyspace is created.
replication_factor = 1

# In-process cluster topology.
[cluster]
nodes = 3
vnodes = 16
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: DocstoreConfig = toml::from_str(&content).map_err(|e| {
            Error::config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_toml_parses_to_default() {
        let config: DocstoreConfig = toml::from_str(DocstoreConfig::default_toml()).unwrap();
        assert_eq!(config, DocstoreConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "").unwrap();

        let config = DocstoreConfig::from_file(&path).unwrap();
        assert_eq!(config.keyspace, "docstore");
        assert_eq!(config.cluster.nodes, 3);
    }

    #[test]
    fn partial_cluster_section() {
        let config: DocstoreConfig = toml::from_str("[cluster]\nnodes = 5\n").unwrap();
        assert_eq!(config.cluster.nodes, 5);
        assert_eq!(config.cluster.vnodes, 16);
    }

    #[test]
    fn invalid_keyspace_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "keyspace = \"9lives\"\n").unwrap();

        let err = DocstoreConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn zero_replication_factor_rejected() {
        let config = DocstoreConfig {
            replication_factor: 0,
            ..DocstoreConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn unparseable_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "keyspace = [").unwrap();
        assert!(matches!(
            DocstoreConfig::from_file(&path),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn missing_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(
            DocstoreConfig::from_file(&path),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn write_default_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        std::fs::write(&path, "keyspace = \"custom\"\n").unwrap();
        DocstoreConfig::write_default_if_missing(&path).unwrap();

        let config = DocstoreConfig::from_file(&path).unwrap();
        assert_eq!(config.keyspace, "custom");
    }

    #[test]
    fn write_default_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        DocstoreConfig::write_default_if_missing(&path).unwrap();
        assert!(path.exists());
        assert_eq!(DocstoreConfig::from_file(&path).unwrap().replication_factor, 1);
    }

    #[test]
    fn write_to_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        let config = DocstoreConfig {
            keyspace: "orders".to_string(),
            replication_factor: 3,
            cluster: ClusterConfig {
                nodes: 6,
                vnodes: 4,
            },
        };
        config.write_to_file(&path).unwrap();
        assert_eq!(DocstoreConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn memory_cluster_uses_topology() {
        let config = DocstoreConfig {
            cluster: ClusterConfig {
                nodes: 4,
                vnodes: 2,
            },
            ..DocstoreConfig::default()
        };
        assert_eq!(config.memory_cluster().node_ids().len(), 4);
    }
}
