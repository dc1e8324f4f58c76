//! WinRM option groups

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde_json::Value;

use super::{BaseOptions, OptionMap};
use crate::config::ConfigLayers;
use crate::error::{BootstrapError, Result};

/// Option names that only a WinRM bundle may carry
pub const WINRM_ONLY_KEYS: &[&str] = &[
    "self_signed",
    "winrm_transport",
    "winrm_basic_auth_only",
    "ssl",
    "ssl_peer_fingerprint",
    "ca_trust_file",
    "kerberos_service",
    "kerberos_realm",
    "operation_timeout",
];

/// Default WinRM operation timeout
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// WinRM authentication method, which is also the transport name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WinrmAuthMethod {
    Plaintext,
    Kerberos,
    Ssl,
    #[default]
    Negotiate,
}

impl WinrmAuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            WinrmAuthMethod::Plaintext => "plaintext",
            WinrmAuthMethod::Kerberos => "kerberos",
            WinrmAuthMethod::Ssl => "ssl",
            WinrmAuthMethod::Negotiate => "negotiate",
        }
    }

    /// Read `winrm_auth_method` from the layers (default: negotiate)
    pub fn from_layers(layers: &ConfigLayers) -> Result<Self> {
        layers
            .lookup(|c| c.winrm_auth_method.clone())
            .map(|method| method.parse())
            .transpose()
            .map(Option::unwrap_or_default)
    }
}

impl fmt::Display for WinrmAuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WinrmAuthMethod {
    type Err = BootstrapError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "plaintext" => Ok(WinrmAuthMethod::Plaintext),
            "kerberos" => Ok(WinrmAuthMethod::Kerberos),
            "ssl" => Ok(WinrmAuthMethod::Ssl),
            "negotiate" => Ok(WinrmAuthMethod::Negotiate),
            other => Err(BootstrapError::Config(format!(
                "Invalid winrm_auth_method '{other}': expected plaintext, kerberos, ssl or negotiate"
            ))),
        }
    }
}

/// WinRM connection bundle
#[derive(Debug, Clone, PartialEq)]
pub struct WinrmOptions {
    pub base: BaseOptions,
    /// Accept self-signed certificates
    pub self_signed: bool,
    pub transport: WinrmAuthMethod,
    pub basic_auth_only: bool,
    pub ssl: bool,
    pub ssl_peer_fingerprint: Option<String>,
    pub ca_trust_file: Option<String>,
    /// Set only with kerberos transport
    pub kerberos_service: Option<String>,
    /// Set only with kerberos transport
    pub kerberos_realm: Option<String>,
    pub operation_timeout: Duration,
}

impl WinrmOptions {
    pub(super) fn build(base: BaseOptions, layers: &ConfigLayers) -> Result<Self> {
        let transport = WinrmAuthMethod::from_layers(layers)?;
        let (kerberos_service, kerberos_realm) = match transport {
            WinrmAuthMethod::Kerberos => (
                layers.lookup(|c| c.kerberos_service.clone()),
                layers.lookup(|c| c.kerberos_realm.clone()),
            ),
            _ => (None, None),
        };

        Ok(Self {
            base,
            self_signed: host_verify_opts(layers),
            transport,
            basic_auth_only: layers.flag(|c| c.winrm_basic_auth_only, false),
            ssl: layers.flag(|c| c.winrm_ssl, false),
            ssl_peer_fingerprint: layers.lookup(|c| c.winrm_ssl_peer_fingerprint.clone()),
            ca_trust_file: layers.lookup(|c| c.ca_trust_file.clone()),
            kerberos_service,
            kerberos_realm,
            operation_timeout: layers
                .lookup(|c| c.session_timeout)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_OPERATION_TIMEOUT),
        })
    }

    pub(super) fn insert_into(&self, map: &mut OptionMap) {
        map.insert("self_signed", Value::from(self.self_signed));
        map.insert("winrm_transport", Value::from(self.transport.as_str()));
        map.insert("winrm_basic_auth_only", Value::from(self.basic_auth_only));
        map.insert("ssl", Value::from(self.ssl));
        map.insert(
            "ssl_peer_fingerprint",
            Value::from(self.ssl_peer_fingerprint.clone()),
        );
        if let Some(ca) = &self.ca_trust_file {
            map.insert("ca_trust_file", Value::from(ca.clone()));
        }
        if let Some(service) = &self.kerberos_service {
            map.insert("kerberos_service", Value::from(service.clone()));
        }
        if let Some(realm) = &self.kerberos_realm {
            map.insert("kerberos_realm", Value::from(realm.clone()));
        }
        map.insert(
            "operation_timeout",
            Value::from(self.operation_timeout.as_secs()),
        );
    }
}

/// Self-signed certificate acceptance (default: reject)
pub fn host_verify_opts(layers: &ConfigLayers) -> bool {
    layers.flag(|c| c.winrm_no_verify_cert, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn base() -> BaseOptions {
        BaseOptions {
            host: "win01".to_string(),
            user: "administrator".to_string(),
            port: 5985,
            password: None,
        }
    }

    fn build(cli: Config) -> WinrmOptions {
        WinrmOptions::build(base(), &ConfigLayers::new(cli, Config::new())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let opts = build(Config::new());
        assert!(!opts.self_signed);
        assert_eq!(opts.transport, WinrmAuthMethod::Negotiate);
        assert!(!opts.basic_auth_only);
        assert!(!opts.ssl);
        assert!(opts.ssl_peer_fingerprint.is_none());
        assert!(opts.ca_trust_file.is_none());
        assert_eq!(opts.operation_timeout, Duration::from_secs(30));

        let mut map = OptionMap::new();
        opts.insert_into(&mut map);
        assert_eq!(map["winrm_transport"], "negotiate");
        assert_eq!(map["ssl_peer_fingerprint"], Value::Null);
        assert_eq!(map["operation_timeout"], 30);
        assert!(!map.contains_key("kerberos_service"));
    }

    #[test]
    fn test_kerberos_propagates_service_and_realm() {
        let opts = build(Config {
            winrm_auth_method: Some("kerberos".to_string()),
            kerberos_service: Some("HTTP".to_string()),
            kerberos_realm: Some("CORP.EXAMPLE".to_string()),
            ..Config::new()
        });
        assert_eq!(opts.transport, WinrmAuthMethod::Kerberos);
        assert_eq!(opts.kerberos_service.as_deref(), Some("HTTP"));
        assert_eq!(opts.kerberos_realm.as_deref(), Some("CORP.EXAMPLE"));
    }

    #[test]
    fn test_kerberos_settings_ignored_for_other_transports() {
        let opts = build(Config {
            winrm_auth_method: Some("plaintext".to_string()),
            kerberos_service: Some("HTTP".to_string()),
            ..Config::new()
        });
        assert_eq!(opts.transport, WinrmAuthMethod::Plaintext);
        assert!(opts.kerberos_service.is_none());
    }

    #[test]
    fn test_overrides() {
        let opts = build(Config {
            winrm_no_verify_cert: Some(true),
            winrm_ssl: Some(true),
            winrm_basic_auth_only: Some(true),
            winrm_ssl_peer_fingerprint: Some("AB:CD".to_string()),
            ca_trust_file: Some("/etc/ca.pem".to_string()),
            session_timeout: Some(120),
            ..Config::new()
        });
        assert!(opts.self_signed);
        assert!(opts.ssl);
        assert!(opts.basic_auth_only);
        assert_eq!(opts.ssl_peer_fingerprint.as_deref(), Some("AB:CD"));
        assert_eq!(opts.ca_trust_file.as_deref(), Some("/etc/ca.pem"));
        assert_eq!(opts.operation_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_invalid_auth_method() {
        let result = WinrmOptions::build(
            base(),
            &ConfigLayers::new(
                Config {
                    winrm_auth_method: Some("digest".to_string()),
                    ..Config::new()
                },
                Config::new(),
            ),
        );
        assert!(matches!(result, Err(BootstrapError::Config(_))));
    }
}
