//! Centralized configuration for triapp.
//!
//! All environment variables are read once at startup and the mandatory ones
//! checked before any provider client is built.

use std::env;
use std::fmt;

use aws_s3::S3Settings;
use domain::service::DemoSettings;
use domain::ResourceName;

/// Log output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration error for {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Runner configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Object-storage endpoint (default: http://localstack:4566)
    pub aws_endpoint: String,
    /// Object-storage region (default: us-east-1)
    pub aws_region: String,
    pub s3_bucket: ResourceName,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    /// Blob-storage connection string (required)
    pub azure_connection_string: String,
    pub az_container: ResourceName,
    /// Messaging project id (default: demo)
    pub gcp_project: String,
    pub pubsub_topic: ResourceName,
    pub pubsub_subscription: ResourceName,
    /// Use the strict provisioning policy for every demo
    pub strict_provisioning: bool,
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());
        let name = |key: &'static str, default: &str| {
            ResourceName::new(or(key, default)).map_err(|e| ConfigError {
                field: key,
                message: e.to_string(),
            })
        };

        // Mandatory; checked first so nothing else runs without it
        let azure_connection_string =
            get("AZURE_STORAGE_CONNECTION_STRING").ok_or_else(|| ConfigError {
                field: "AZURE_STORAGE_CONNECTION_STRING",
                message: "Required (blob storage connection string)".into(),
            })?;

        let strict_provisioning = matches!(
            or("STRICT_PROVISIONING", "false").to_lowercase().as_str(),
            "1" | "true" | "yes"
        );

        Ok(Self {
            aws_endpoint: or("AWS_ENDPOINT", "http://localstack:4566"),
            aws_region: or("AWS_REGION", "us-east-1"),
            s3_bucket: name("S3_BUCKET", "demo-bucket")?,
            aws_access_key_id: or("AWS_ACCESS_KEY_ID", "test"),
            aws_secret_access_key: or("AWS_SECRET_ACCESS_KEY", "test"),
            azure_connection_string,
            az_container: name("AZ_CONTAINER", "demo")?,
            gcp_project: or("GOOGLE_CLOUD_PROJECT", "demo"),
            pubsub_topic: name("PUBSUB_TOPIC", "demo-topic")?,
            pubsub_subscription: name("PUBSUB_SUBSCRIPTION", "demo-sub")?,
            strict_provisioning,
            log_format: LogFormat::from_str(&or("LOG_FORMAT", "pretty")),
        })
    }

    pub fn s3_settings(&self) -> S3Settings {
        S3Settings::new(
            Some(self.aws_endpoint.clone()),
            self.aws_region.clone(),
            self.aws_access_key_id.clone(),
            self.aws_secret_access_key.clone(),
        )
    }

    pub fn demo_settings(&self) -> DemoSettings {
        let settings = DemoSettings::new(
            self.s3_bucket.clone(),
            self.az_container.clone(),
            self.pubsub_topic.clone(),
            self.pubsub_subscription.clone(),
        );
        if self.strict_provisioning {
            settings.strict()
        } else {
            settings
        }
    }

    /// Log a warning about provisioning errors that will be swallowed.
    pub fn warn_if_lenient(&self) {
        if !self.strict_provisioning {
            tracing::warn!(
                "Blob-storage and messaging provisioning swallow every error, not only \
                 \"already exists\". Set STRICT_PROVISIONING=true to fail fast instead."
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::provision::ProvisionPolicy;
    use std::collections::HashMap;

    const CONN: &str = "UseDevelopmentStorage=true";

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn missing_connection_string_fails() {
        let err = load(&[("S3_BUCKET", "b")]).unwrap_err();
        assert_eq!(err.field, "AZURE_STORAGE_CONNECTION_STRING");
        assert!(err.to_string().starts_with("Configuration error for AZURE_STORAGE_CONNECTION_STRING"));
    }

    #[test]
    fn empty_connection_string_fails() {
        assert!(load(&[("AZURE_STORAGE_CONNECTION_STRING", "  ")]).is_err());
    }

    #[test]
    fn defaults_apply() {
        let cfg = load(&[("AZURE_STORAGE_CONNECTION_STRING", CONN)]).unwrap();
        assert_eq!(cfg.aws_endpoint, "http://localstack:4566");
        assert_eq!(cfg.aws_region, "us-east-1");
        assert_eq!(cfg.s3_bucket.as_str(), "demo-bucket");
        assert_eq!(cfg.aws_access_key_id, "test");
        assert_eq!(cfg.aws_secret_access_key, "test");
        assert_eq!(cfg.az_container.as_str(), "demo");
        assert_eq!(cfg.gcp_project, "demo");
        assert_eq!(cfg.pubsub_topic.as_str(), "demo-topic");
        assert_eq!(cfg.pubsub_subscription.as_str(), "demo-sub");
        assert!(!cfg.strict_provisioning);
        assert_eq!(cfg.log_format, LogFormat::Pretty);
    }

    #[test]
    fn overrides_and_empty_fallback() {
        let cfg = load(&[
            ("AZURE_STORAGE_CONNECTION_STRING", CONN),
            ("S3_BUCKET", "other"),
            ("AZ_CONTAINER", ""),
            ("AWS_REGION", "eu-west-1"),
            ("LOG_FORMAT", "JSON"),
        ])
        .unwrap();
        assert_eq!(cfg.s3_bucket.as_str(), "other");
        assert_eq!(cfg.az_container.as_str(), "demo");
        assert_eq!(cfg.s3_settings().region, "eu-west-1");
        assert_eq!(cfg.log_format, LogFormat::Json);
    }

    #[test]
    fn default_policies_are_asymmetric() {
        let cfg = load(&[("AZURE_STORAGE_CONNECTION_STRING", CONN)]).unwrap();
        let s = cfg.demo_settings();
        assert_eq!(s.object_policy, ProvisionPolicy::Strict);
        assert_eq!(s.blob_policy, ProvisionPolicy::Lenient);
        assert_eq!(s.messaging_policy, ProvisionPolicy::Lenient);
    }

    #[test]
    fn strict_provisioning_flag() {
        for v in ["1", "true", "YES"] {
            let cfg = load(&[
                ("AZURE_STORAGE_CONNECTION_STRING", CONN),
                ("STRICT_PROVISIONING", v),
            ])
            .unwrap();
            assert!(cfg.strict_provisioning);
            assert_eq!(cfg.demo_settings().blob_policy, ProvisionPolicy::Strict);
        }
    }

    #[test]
    fn log_format_parsing() {
        assert_eq!(LogFormat::from_str("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("json"), LogFormat::Json);
        assert_eq!(LogFormat::from_str("anything"), LogFormat::Pretty);
    }
}
