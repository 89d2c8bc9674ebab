//! vpnapi.io reputation provider.

use super::{ProviderError, ReputationProvider, RiskFlags};
use crate::config::VpnApiConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// vpnapi.io reputation provider.
///
/// Response shape:
///
/// ```json
/// { "security": { "vpn": false, "proxy": false, "tor": false, "relay": false } }
/// ```
pub struct VpnApiProvider {
    config: VpnApiConfig,
    client: Client,
}

impl VpnApiProvider {
    /// Create a new provider. The client carries the configured timeout, so a
    /// single call never outlives it.
    pub fn new(config: VpnApiConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self { config, client })
    }

    fn lookup_url(&self, ip: &str) -> String {
        format!("{}/api/{}", self.config.base_url.trim_end_matches('/'), ip)
    }
}

/// Extract the risk flags from a response body.
///
/// A missing or non-object `security` section yields no flags. Flag values
/// that are not JSON booleans (`"yes"`, `1`) count as unset, so a malformed
/// flag resolves to allowed rather than being read as truthy.
pub fn parse_security(body: &Value) -> RiskFlags {
    let Some(security) = body.get("security").and_then(Value::as_object) else {
        return RiskFlags::default();
    };
    let flag = |name: &str| security.get(name).and_then(Value::as_bool).unwrap_or(false);

    RiskFlags {
        vpn: flag("vpn"),
        proxy: flag("proxy"),
        tor: flag("tor"),
        relay: flag("relay"),
    }
}

#[async_trait]
impl ReputationProvider for VpnApiProvider {
    async fn check(&self, ip: &str) -> Result<RiskFlags, ProviderError> {
        let Some(api_key) = self.config.api_key() else {
            return Err(ProviderError::NotConfigured);
        };

        info!(ip = %ip, "Querying vpnapi");

        let response = self
            .client
            .get(self.lookup_url(ip))
            .query(&[("key", api_key)])
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            warn!(ip = %ip, status = status.as_u16(), "vpnapi returned non-success status");
            return Err(ProviderError::Status(status.as_u16()));
        }

        let body: Value = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse response: {}", e))
        })?;

        let flags = parse_security(&body);
        if flags.any() {
            warn!(
                ip = %ip,
                vpn = flags.vpn,
                proxy = flags.proxy,
                tor = flags.tor,
                relay = flags.relay,
                "IP detected as suspicious"
            );
        } else {
            debug!(ip = %ip, "vpnapi lookup clean");
        }

        Ok(flags)
    }

    fn name(&self) -> &str {
        "vpnapi"
    }

    fn is_enabled(&self) -> bool {
        self.config.api_key().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config(base_url: &str) -> VpnApiConfig {
        VpnApiConfig {
            api_key: Some("test-key".to_string()),
            base_url: base_url.to_string(),
            timeout_ms: 500,
            ..VpnApiConfig::default()
        }
    }

    #[test]
    fn test_parse_security() {
        let clean = json!({"security": {"vpn": false, "proxy": false, "tor": false, "relay": false}});
        assert!(!parse_security(&clean).any());

        let vpn = json!({"security": {"vpn": true, "proxy": false, "tor": false, "relay": false}});
        assert!(parse_security(&vpn).vpn);

        let relay = json!({"security": {"relay": true}});
        assert!(parse_security(&relay).relay);

        assert!(!parse_security(&json!({"invalid": "structure"})).any());
        assert!(!parse_security(&json!({"security": "not-a-hash"})).any());
        assert!(!parse_security(&json!("just a string")).any());
        assert!(!parse_security(&json!({"security": {"vpn": "yes"}})).any());
        assert!(!parse_security(&json!({"security": {"proxy": 1, "tor": "true"}})).any());
    }

    #[test]
    fn test_provider_enabled() {
        let provider = VpnApiProvider::new(create_test_config("http://localhost")).unwrap();
        assert!(provider.is_enabled());
        assert_eq!(provider.name(), "vpnapi");

        let mut config = create_test_config("http://localhost");
        config.api_key = Some("   ".to_string());
        let provider = VpnApiProvider::new(config).unwrap();
        assert!(!provider.is_enabled());
    }

    #[test]
    fn test_lookup_url_trims_slash() {
        let provider = VpnApiProvider::new(create_test_config("https://vpnapi.io/")).unwrap();
        assert_eq!(provider.lookup_url("1.2.3.4"), "https://vpnapi.io/api/1.2.3.4");
    }

    #[tokio::test]
    async fn test_check_flags_vpn() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/8.8.8.8"))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "security": {"vpn": true, "proxy": false, "tor": false, "relay": false}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = VpnApiProvider::new(create_test_config(&server.uri())).unwrap();
        let flags = provider.check("8.8.8.8").await.unwrap();
        assert!(flags.vpn);
        assert!(flags.any());
    }

    #[tokio::test]
    async fn test_check_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let provider = VpnApiProvider::new(create_test_config(&server.uri())).unwrap();
        let err = provider.check("8.8.8.8").await.unwrap_err();
        assert!(matches!(err, ProviderError::Status(500)));
    }

    #[tokio::test]
    async fn test_check_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let provider = VpnApiProvider::new(create_test_config(&server.uri())).unwrap();
        let err = provider.check("8.8.8.8").await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_check_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"security": {"vpn": true}}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let provider = VpnApiProvider::new(create_test_config(&server.uri())).unwrap();
        let err = provider.check("8.8.8.8").await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout));
    }

    #[tokio::test]
    async fn test_check_without_key_makes_no_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut config = create_test_config(&server.uri());
        config.api_key = None;
        let provider = VpnApiProvider::new(config).unwrap();
        let err = provider.check("8.8.8.8").await.unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured));
    }
}
