//! Connection settings for a catalog instance.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a GeoServer connection.
///
/// Has no `Default`; URL and credentials always come from the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Base URL including the context path, e.g. `http://host:8080/geoserver`
    pub service_url: String,
    pub username: String,
    pub password: String,
    /// Whole-request timeout in seconds (uploads of init archives included)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Store format used in `file.{type}` / `external.{type}` paths
    #[serde(default = "default_file_type")]
    pub file_type: String,
}

fn default_request_timeout() -> u64 {
    300
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_file_type() -> String {
    "imagemosaic".to_string()
}

impl CatalogConfig {
    pub fn new(
        service_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            service_url: service_url.into(),
            username: username.into(),
            password: password.into(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            file_type: default_file_type(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Service URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.service_url.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_defaults() {
        let json = r#"{
            "service_url": "http://10.110.0.22:8080/geoserver/",
            "username": "admin",
            "password": "secret"
        }"#;
        let config: CatalogConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.base_url(), "http://10.110.0.22:8080/geoserver");
        assert_eq!(config.file_type, "imagemosaic");
        assert_eq!(config.request_timeout(), Duration::from_secs(300));
        assert_eq!(config.connect_timeout(), Duration::from_secs(30));
    }
}
