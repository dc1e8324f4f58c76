//! Configuration schema for chef-bootstrap
//!
//! One struct serves both layers of settings: the persisted
//! `~/.chef/bootstrap.json` file and the values given on the command line.
//! Every setting is optional so that an unset value falls through to the
//! next layer (see [`super::layers::ConfigLayers`]).

use serde::{Deserialize, Serialize};

/// Bootstrap settings
///
/// Serialized to/from `~/.chef/bootstrap.json`. Connection user and port are
/// protocol-qualified in the file (`ssh_user`, `winrm_port`, ...) and
/// unqualified on the command line (`connection_user`, `connection_port`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Config file version for migrations
    #[serde(default = "default_version")]
    pub version: u32,

    /// Default transport protocol ("ssh" or "winrm")
    #[serde(default)]
    pub connection_protocol: Option<String>,

    /// Connection user regardless of protocol (command line only in practice)
    #[serde(default)]
    pub connection_user: Option<String>,

    /// Connection port regardless of protocol
    #[serde(default)]
    pub connection_port: Option<u16>,

    /// Connection password
    #[serde(default)]
    pub connection_password: Option<String>,

    #[serde(default)]
    pub ssh_user: Option<String>,

    #[serde(default)]
    pub ssh_port: Option<u16>,

    #[serde(default)]
    pub winrm_user: Option<String>,

    #[serde(default)]
    pub winrm_port: Option<u16>,

    /// Private key used for the target host
    #[serde(default)]
    pub ssh_identity_file: Option<String>,

    /// Bastion host in `[user@]host[:port]` form
    #[serde(default)]
    pub ssh_gateway: Option<String>,

    /// Private key used for the bastion host
    #[serde(default)]
    pub ssh_gateway_identity: Option<String>,

    /// Verify the target's host key (default: true)
    #[serde(default)]
    pub ssh_verify_host_key: Option<bool>,

    /// Enable SSH agent forwarding (default: false)
    #[serde(default)]
    pub ssh_forward_agent: Option<bool>,

    /// Run the bootstrap script through sudo
    #[serde(default)]
    pub use_sudo: Option<bool>,

    /// Feed the connection password to sudo
    #[serde(default)]
    pub use_sudo_password: Option<bool>,

    /// Pass `-H` to sudo so $HOME points at the target user
    #[serde(default)]
    pub preserve_home: Option<bool>,

    /// WinRM authentication method: plaintext, kerberos, ssl or negotiate
    #[serde(default)]
    pub winrm_auth_method: Option<String>,

    #[serde(default)]
    pub winrm_ssl: Option<bool>,

    /// Accept self-signed WinRM certificates
    #[serde(default)]
    pub winrm_no_verify_cert: Option<bool>,

    #[serde(default)]
    pub winrm_ssl_peer_fingerprint: Option<String>,

    #[serde(default)]
    pub winrm_basic_auth_only: Option<bool>,

    #[serde(default)]
    pub ca_trust_file: Option<String>,

    #[serde(default)]
    pub kerberos_service: Option<String>,

    #[serde(default)]
    pub kerberos_realm: Option<String>,

    /// WinRM operation timeout in seconds (default: 30)
    #[serde(default)]
    pub session_timeout: Option<u64>,

    /// Chef Infra Server URL written into client.rb
    #[serde(default)]
    pub chef_server_url: Option<String>,

    #[serde(default)]
    pub validation_client_name: Option<String>,

    /// Local path of the validator key; absent or missing means validatorless
    #[serde(default)]
    pub validation_key: Option<String>,

    /// Local path of an already-created client key for this node
    #[serde(default)]
    pub client_key: Option<String>,

    /// Directory whose `*.crt`/`*.pem` files are copied to the node
    #[serde(default)]
    pub trusted_certs_dir: Option<String>,

    /// Directory of client.rb fragments copied to `client.d`
    #[serde(default)]
    pub client_d_dir: Option<String>,

    #[serde(default)]
    pub bootstrap_proxy: Option<String>,

    #[serde(default)]
    pub bootstrap_proxy_user: Option<String>,

    #[serde(default)]
    pub bootstrap_proxy_pass: Option<String>,

    /// Comma-separated hosts that bypass the proxy
    #[serde(default)]
    pub bootstrap_no_proxy: Option<String>,

    /// "none" or "peer"
    #[serde(default)]
    pub node_ssl_verify_mode: Option<String>,

    #[serde(default)]
    pub node_verify_api_cert: Option<bool>,

    #[serde(default)]
    pub fips: Option<bool>,

    /// Pin the Chef client version to install
    #[serde(default)]
    pub bootstrap_version: Option<String>,

    /// Replace the install step with a custom command
    #[serde(default)]
    pub bootstrap_install_command: Option<String>,

    /// URL of the install script
    #[serde(default)]
    pub bootstrap_url: Option<String>,

    #[serde(default)]
    pub bootstrap_curl_options: Option<String>,

    #[serde(default)]
    pub bootstrap_wget_options: Option<String>,

    /// Command run before the install step
    #[serde(default)]
    pub bootstrap_preinstall_command: Option<String>,

    /// Template name or path
    #[serde(default)]
    pub bootstrap_template: Option<String>,

    /// MSI download URL for Windows targets
    #[serde(default)]
    pub msi_url: Option<String>,

    #[serde(default)]
    pub config_log_level: Option<String>,

    #[serde(default)]
    pub config_log_location: Option<String>,

    /// License acceptance value passed to the client ("accept", ...)
    #[serde(default)]
    pub chef_license: Option<String>,

    /// System-wide configuration directory searched for templates
    #[serde(default)]
    pub system_config_dir: Option<String>,

    /// Roots of installed extension packages searched for templates
    #[serde(default)]
    pub plugin_paths: Vec<String>,
}

fn default_version() -> u32 {
    1
}

impl Config {
    /// Create a new Config with default values
    pub fn new() -> Self {
        Self {
            version: default_version(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::new();
        assert_eq!(config.version, 1);
        assert!(config.connection_protocol.is_none());
        assert!(config.ssh_user.is_none());
        assert!(config.plugin_paths.is_empty());
    }

    #[test]
    fn test_deserialize_minimal() {
        let json = r#"{"version": 1}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config, Config::new());
    }

    #[test]
    fn test_deserialize_protocol_qualified_fields() {
        let json = r#"{
            "version": 1,
            "connection_protocol": "winrm",
            "winrm_user": "Administrator",
            "winrm_port": 5986,
            "ssh_gateway": "jump@bastion:2222",
            "plugin_paths": ["/opt/plugins"]
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.connection_protocol.as_deref(), Some("winrm"));
        assert_eq!(config.winrm_user.as_deref(), Some("Administrator"));
        assert_eq!(config.winrm_port, Some(5986));
        assert_eq!(config.ssh_gateway.as_deref(), Some("jump@bastion:2222"));
        assert_eq!(config.plugin_paths, vec!["/opt/plugins"]);
    }

    #[test]
    fn test_reject_unknown_fields() {
        let json = r#"{"version": 1, "knife_flavor": "spicy"}"#;
        let result: Result<Config, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
