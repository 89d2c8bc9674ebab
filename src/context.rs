//! Per-request signals fed to the risk checks and the audit trail.

use crate::config::IpExtractionConfig;
use crate::error::CheckStatusError;
use serde_json::Value;
use std::collections::HashMap;
use std::net::IpAddr;

/// Signals gathered from one inbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Resolved client IP.
    pub ip: Option<String>,
    /// Raw country header value, unnormalized.
    pub country: Option<String>,
    pub rooted_device: bool,
    pub proxy: bool,
    pub vpn: bool,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_rooted_device(mut self, rooted_device: bool) -> Self {
        self.rooted_device = rooted_device;
        self
    }
}

/// Interpret the `rooted_device` request parameter.
///
/// Absent and `null` mean not rooted. Anything other than a JSON boolean is
/// rejected.
pub fn parse_rooted_device(value: Option<&Value>) -> Result<bool, CheckStatusError> {
    match value {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(rooted)) => Ok(*rooted),
        Some(_) => Err(CheckStatusError::InvalidRootedDevice),
    }
}

/// Extract client IP from request headers (lowercased names).
pub fn extract_client_ip(
    headers: &HashMap<String, String>,
    config: &IpExtractionConfig,
) -> Option<IpAddr> {
    for header_name in &config.headers {
        let header_lower = header_name.to_lowercase();
        if let Some(value) = headers.get(&header_lower) {
            let ip_str = if config.use_first_ip {
                // X-Forwarded-For: client, proxy1, proxy2
                value.split(',').next()?.trim()
            } else {
                value.split(',').last()?.trim()
            };

            if let Ok(ip) = ip_str.parse() {
                return Some(ip);
            }
        }
    }
    None
}

/// Country for an IP address.
///
/// Geolocation is not implemented; the country signal comes only from the
/// trusted header.
pub fn detect_country_from_ip(_ip: Option<&str>) -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_rooted_device() {
        assert!(!parse_rooted_device(None).unwrap());
        assert!(!parse_rooted_device(Some(&Value::Null)).unwrap());
        assert!(parse_rooted_device(Some(&json!(true))).unwrap());
        assert!(!parse_rooted_device(Some(&json!(false))).unwrap());
    }

    #[test]
    fn test_parse_rooted_device_rejects_non_boolean() {
        for value in [json!("true"), json!(1), json!("false"), json!({}), json!([])] {
            let err = parse_rooted_device(Some(&value)).unwrap_err();
            assert!(matches!(err, CheckStatusError::InvalidRootedDevice));
        }
    }

    #[test]
    fn test_extract_client_ip_xff() {
        let config = IpExtractionConfig {
            headers: vec!["x-forwarded-for".to_string()],
            use_first_ip: true,
        };

        let mut headers = HashMap::new();
        headers.insert(
            "x-forwarded-for".to_string(),
            "1.2.3.4, 5.6.7.8, 9.10.11.12".to_string(),
        );

        let ip = extract_client_ip(&headers, &config);
        assert_eq!(ip, Some("1.2.3.4".parse().unwrap()));
    }

    #[test]
    fn test_extract_client_ip_xff_last() {
        let config = IpExtractionConfig {
            headers: vec!["x-forwarded-for".to_string()],
            use_first_ip: false,
        };

        let mut headers = HashMap::new();
        headers.insert("x-forwarded-for".to_string(), "1.2.3.4, 9.10.11.12".to_string());

        let ip = extract_client_ip(&headers, &config);
        assert_eq!(ip, Some("9.10.11.12".parse().unwrap()));
    }

    #[test]
    fn test_extract_client_ip_falls_back_to_real_ip() {
        let config = IpExtractionConfig::default();

        let mut headers = HashMap::new();
        headers.insert("x-forwarded-for".to_string(), "garbage".to_string());
        headers.insert("x-real-ip".to_string(), "192.168.1.1".to_string());

        let ip = extract_client_ip(&headers, &config);
        assert_eq!(ip, Some("192.168.1.1".parse().unwrap()));
    }

    #[test]
    fn test_extract_client_ip_none() {
        let config = IpExtractionConfig::default();
        assert!(extract_client_ip(&HashMap::new(), &config).is_none());
    }

    #[test]
    fn test_country_detection_is_stubbed() {
        assert!(detect_country_from_ip(Some("8.8.8.8")).is_none());
        assert!(detect_country_from_ip(None).is_none());
    }

    #[test]
    fn test_context_builders() {
        let ctx = RequestContext::new()
            .with_ip("1.2.3.4")
            .with_country("us")
            .with_rooted_device(true);
        assert_eq!(ctx.ip.as_deref(), Some("1.2.3.4"));
        assert_eq!(ctx.country.as_deref(), Some("us"));
        assert!(ctx.rooted_device);
        assert!(!ctx.proxy && !ctx.vpn);
    }
}
