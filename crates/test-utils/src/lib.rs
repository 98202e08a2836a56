//! Shared test utilities for the sat-publisher workspace.
//!
//! This crate provides common testing infrastructure including:
//! - An in-process fake GeoServer catalog
//! - Temporary satellite storage trees
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{FakeGeoServer, SatelliteTree};
//! ```

pub mod fake_geoserver;
pub mod fixtures;

// Re-export commonly used items at the crate root
pub use fake_geoserver::{FakeGeoServer, RecordedRequest, FAKE_PASSWORD, FAKE_USERNAME};
pub use fixtures::*;

/// Macro asserting that no request in a slice changed catalog state.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_no_writes;
///
/// assert_no_writes!(server.requests());
/// ```
#[macro_export]
macro_rules! assert_no_writes {
    ($requests:expr) => {{
        let writes: Vec<_> = $requests.into_iter().filter(|r| r.is_write()).collect();
        if !writes.is_empty() {
            panic!(
                "assertion failed: expected no catalog writes, got:\n{:#?}",
                writes
            );
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assert_no_writes_passes() {
        let requests = vec![RecordedRequest {
            method: "GET".into(),
            path: "/geoserver/rest/workspaces".into(),
        }];
        assert_no_writes!(requests);
    }

    #[test]
    #[should_panic(expected = "expected no catalog writes")]
    fn test_assert_no_writes_fails() {
        let requests = vec![RecordedRequest {
            method: "POST".into(),
            path: "/geoserver/rest/workspaces".into(),
        }];
        assert_no_writes!(requests);
    }

    #[tokio::test]
    async fn test_fake_server_rejects_bad_credentials() {
        let server = FakeGeoServer::start().await;
        let url = format!("{}/rest/workspaces", server.base_url());

        let status = reqwest::Client::new()
            .get(&url)
            .basic_auth("admin", Some("wrong"))
            .send()
            .await
            .unwrap()
            .status();
        assert_eq!(status.as_u16(), 401);

        let status = reqwest::Client::new()
            .get(&url)
            .basic_auth(FAKE_USERNAME, Some(FAKE_PASSWORD))
            .send()
            .await
            .unwrap()
            .status();
        assert_eq!(status.as_u16(), 200);
        assert_eq!(server.requests().len(), 2);
    }
}
