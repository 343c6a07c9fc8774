//! Store configuration
//!
//! Supports configuration via:
//! - Optional TOML config file (named by `S3STORAGE_CONFIG_FILE`)
//! - Environment variables, which take precedence over file values
//!
//! The configuration is read once, when the storage is constructed.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::{Result, StorageError};

const ENV_PREFIX: &str = "S3STORAGE_";

/// Credentials and location of the backing store
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub access_key_id: String,

    pub secret_access_key: String,

    /// Bucket holding every object
    pub bucket: String,

    /// AWS region, e.g. `us-east-1`
    pub region: String,

    /// Endpoint URL for S3-compatible services
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Path-style addressing; defaults to on when `endpoint` is set
    #[serde(default)]
    pub force_path_style: Option<bool>,
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("force_path_style", &self.force_path_style)
            .finish()
    }
}

impl StoreConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - S3STORAGE_ACCESS_KEY_ID
    /// - S3STORAGE_SECRET_ACCESS_KEY
    /// - S3STORAGE_BUCKET
    /// - S3STORAGE_REGION
    /// - S3STORAGE_ENDPOINT: custom endpoint URL (optional)
    /// - S3STORAGE_FORCE_PATH_STYLE: true|false (optional)
    /// - S3STORAGE_CONFIG_FILE: optional path to TOML config file
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`StoreConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        // Try to load from config file first if specified
        let mut config = match var("CONFIG_FILE") {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        if let Some(access_key_id) = var("ACCESS_KEY_ID") {
            config.access_key_id = access_key_id;
        }

        if let Some(secret_access_key) = var("SECRET_ACCESS_KEY") {
            config.secret_access_key = secret_access_key;
        }

        if let Some(bucket) = var("BUCKET") {
            config.bucket = bucket;
        }

        if let Some(region) = var("REGION") {
            config.region = region;
        }

        if let Some(endpoint) = var("ENDPOINT") {
            config.endpoint = Some(endpoint).filter(|e| !e.is_empty());
        }

        if let Some(path_style) = var("FORCE_PATH_STYLE") {
            let value = path_style.parse().map_err(|_| {
                StorageError::Config(format!(
                    "{}FORCE_PATH_STYLE must be true or false, got {:?}",
                    ENV_PREFIX, path_style
                ))
            })?;
            config.force_path_style = Some(value);
        }

        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StorageError::Config(format!("reading {}: {}", path, e)))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| StorageError::Config(e.to_string()))
    }

    /// Check the configuration before any session is built
    pub fn validate(&self) -> Result<()> {
        if self.bucket.is_empty() {
            return Err(StorageError::Config("bucket is required".to_string()));
        }
        if self.access_key_id.is_empty() || self.secret_access_key.is_empty() {
            return Err(StorageError::Config(
                "access key ID and secret access key are required".to_string(),
            ));
        }

        if !is_valid_region(&self.region) {
            return Err(StorageError::ConnectionSetup(format!(
                "malformed region {:?}",
                self.region
            )));
        }

        if let Some(endpoint) = &self.endpoint {
            let url = Url::parse(endpoint).map_err(|e| {
                StorageError::ConnectionSetup(format!("invalid endpoint {:?}: {}", endpoint, e))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(StorageError::ConnectionSetup(format!(
                    "endpoint {:?} must use http or https",
                    endpoint
                )));
            }
        }

        Ok(())
    }

    /// Whether requests use path-style addressing
    pub fn path_style(&self) -> bool {
        self.force_path_style.unwrap_or(self.endpoint.is_some())
    }
}

/// Region names are lowercase ASCII letters, digits and dashes.
fn is_valid_region(region: &str) -> bool {
    !region.is_empty()
        && !region.starts_with('-')
        && !region.ends_with('-')
        && region
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn valid() -> StoreConfig {
        StoreConfig {
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
            bucket: "media".to_string(),
            region: "eu-west-3".to_string(),
            endpoint: None,
            force_path_style: None,
        }
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<String, String> = [
            ("S3STORAGE_ACCESS_KEY_ID", "AKID"),
            ("S3STORAGE_SECRET_ACCESS_KEY", "shh"),
            ("S3STORAGE_BUCKET", "assets"),
            ("S3STORAGE_REGION", "us-west-2"),
            ("S3STORAGE_ENDPOINT", "http://localhost:9000"),
            ("S3STORAGE_FORCE_PATH_STYLE", "false"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = StoreConfig::from_lookup(|name| vars.get(name).cloned()).unwrap();
        assert_eq!(config.access_key_id, "AKID");
        assert_eq!(config.bucket, "assets");
        assert_eq!(config.region, "us-west-2");
        assert_eq!(config.endpoint.as_deref(), Some("http://localhost:9000"));
        assert!(!config.path_style());
    }

    #[test]
    fn test_bad_path_style_value() {
        let err = StoreConfig::from_lookup(|name| {
            (name == "S3STORAGE_FORCE_PATH_STYLE").then(|| "sometimes".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, StorageError::Config(_)));
    }

    #[test]
    fn test_from_toml() {
        let config = StoreConfig::from_toml(
            r#"
            access_key_id = "AKID"
            secret_access_key = "shh"
            bucket = "media"
            region = "us-east-1"
            endpoint = "https://minio.internal:9000"
            "#,
        )
        .unwrap();
        assert_eq!(config.bucket, "media");
        assert!(config.path_style());
        config.validate().unwrap();

        assert!(StoreConfig::from_toml("bucket = 3").is_err());
    }

    #[test]
    fn test_validate() {
        valid().validate().unwrap();

        let config = StoreConfig {
            region: "US East 1".to_string(),
            ..valid()
        };
        assert!(matches!(config.validate(), Err(StorageError::ConnectionSetup(_))));

        let config = StoreConfig {
            endpoint: Some("not a url".to_string()),
            ..valid()
        };
        assert!(matches!(config.validate(), Err(StorageError::ConnectionSetup(_))));

        let config = StoreConfig {
            endpoint: Some("ftp://files.example.com".to_string()),
            ..valid()
        };
        assert!(matches!(config.validate(), Err(StorageError::ConnectionSetup(_))));

        let config = StoreConfig {
            bucket: String::new(),
            ..valid()
        };
        assert!(matches!(config.validate(), Err(StorageError::Config(_))));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", valid());
        assert!(rendered.contains("AKIDEXAMPLE"));
        assert!(!rendered.contains("\"secret\""));
        assert!(rendered.contains("<redacted>"));
    }
}
