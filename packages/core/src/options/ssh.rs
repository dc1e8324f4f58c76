//! SSH option groups
//!
//! Identity, host-key verification, gateway, sudo and agent forwarding.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use super::{BaseOptions, OptionMap};
use crate::config::ConfigLayers;
use crate::error::{BootstrapError, Result};
use crate::shell;

/// Option names that only an SSH bundle may carry
pub const SSH_ONLY_KEYS: &[&str] = &[
    "key_files",
    "keys_only",
    "verify_host_key",
    "bastion_host",
    "bastion_user",
    "bastion_port",
    "sudo",
    "sudo_password",
    "sudo_options",
    "forward_agent",
];

/// SSH connection bundle
#[derive(Debug, Clone, PartialEq)]
pub struct SshOptions {
    pub base: BaseOptions,
    /// Identity files in the order they are offered
    pub key_files: Vec<String>,
    /// Offer only `key_files`, never agent or default keys
    pub keys_only: bool,
    pub verify_host_key: bool,
    pub gateway: Option<Gateway>,
    pub sudo: SudoOptions,
    pub forward_agent: bool,
}

impl SshOptions {
    pub(super) fn build(base: BaseOptions, layers: &ConfigLayers) -> Result<Self> {
        let (key_files, keys_only) = identity_opts(layers);
        let sudo = sudo_opts(layers, base.password.as_deref());
        Ok(Self {
            key_files,
            keys_only,
            verify_host_key: host_verify_opts(layers),
            gateway: gateway_opts(layers)?,
            sudo,
            forward_agent: ssh_opts(layers),
            base,
        })
    }

    pub(super) fn insert_into(&self, map: &mut OptionMap) {
        map.insert("key_files", Value::from(self.key_files.clone()));
        map.insert("keys_only", Value::from(self.keys_only));
        map.insert("verify_host_key", Value::from(self.verify_host_key));
        if let Some(gateway) = &self.gateway {
            map.insert("bastion_host", Value::from(gateway.host.clone()));
            map.insert("bastion_user", Value::from(gateway.user.clone()));
            map.insert("bastion_port", Value::from(gateway.port));
        }
        match &self.sudo {
            SudoOptions::Disabled => {
                map.insert("sudo", Value::from(false));
            }
            SudoOptions::Enabled {
                password,
                preserve_home,
            } => {
                map.insert("sudo", Value::from(true));
                if let Some(password) = password {
                    map.insert("sudo_password", Value::from(password.clone()));
                }
                if *preserve_home {
                    map.insert("sudo_options", Value::from("-H"));
                }
            }
        }
        map.insert("forward_agent", Value::from(self.forward_agent));
    }
}

/// Collect identity files and decide whether only they may be offered
///
/// The gateway identity is appended after the primary identity. `keys_only`
/// is set only by a primary identity; a gateway key alone leaves it false.
pub fn identity_opts(layers: &ConfigLayers) -> (Vec<String>, bool) {
    let identity = layers.ssh_identity_file();
    let gateway_identity = layers.lookup(|c| c.ssh_gateway_identity.clone());

    let keys_only = identity.is_some();
    let key_files = identity.into_iter().chain(gateway_identity).collect();
    (key_files, keys_only)
}

/// Host-key verification flag (default: verify)
pub fn host_verify_opts(layers: &ConfigLayers) -> bool {
    layers.flag(|c| c.ssh_verify_host_key, true)
}

/// Parse the configured gateway, if any
///
/// An unset or blank gateway yields None, so no bastion keys are emitted.
pub fn gateway_opts(layers: &ConfigLayers) -> Result<Option<Gateway>> {
    layers
        .ssh_gateway()
        .map(|gateway| gateway.parse())
        .transpose()
}

/// Sudo settings
///
/// With `use_sudo` unset the result is exactly [`SudoOptions::Disabled`] and
/// every other sudo setting is ignored.
pub fn sudo_opts(layers: &ConfigLayers, password: Option<&str>) -> SudoOptions {
    if !layers.flag(|c| c.use_sudo, false) {
        return SudoOptions::Disabled;
    }

    let password = if layers.flag(|c| c.use_sudo_password, false) {
        password.map(str::to_string)
    } else {
        None
    };

    SudoOptions::Enabled {
        password,
        preserve_home: layers.flag(|c| c.preserve_home, false),
    }
}

/// Agent forwarding flag (default: off)
pub fn ssh_opts(layers: &ConfigLayers) -> bool {
    layers.flag(|c| c.ssh_forward_agent, false)
}

/// Whether and how the bootstrap script is run through sudo
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SudoOptions {
    #[default]
    Disabled,
    Enabled {
        /// Fed to `sudo -S` on stdin
        password: Option<String>,
        /// Pass `-H`
        preserve_home: bool,
    },
}

impl SudoOptions {
    /// Prefix placed before the remote command, e.g. `sudo -H -S -p '' `
    pub fn command_prefix(&self) -> String {
        match self {
            SudoOptions::Disabled => String::new(),
            SudoOptions::Enabled {
                password,
                preserve_home,
            } => {
                let mut prefix = String::from("sudo ");
                if *preserve_home {
                    prefix.push_str("-H ");
                }
                if password.is_some() {
                    prefix.push_str("-S -p '' ");
                }
                prefix
            }
        }
    }

    /// Run `command` through sudo, piping the password when one is set
    pub fn wrap(&self, command: &str) -> String {
        match self {
            SudoOptions::Enabled {
                password: Some(password),
                ..
            } => format!(
                "printf '%s\\n' {} | {}{command}",
                shell::quote(password),
                self.command_prefix()
            ),
            _ => format!("{}{command}", self.command_prefix()),
        }
    }
}

/// A bastion host in `[user@]host[:port]` form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gateway {
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
}

impl FromStr for Gateway {
    type Err = BootstrapError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || BootstrapError::InvalidGateway(s.to_string());
        let spec = s.trim();

        let (user, rest) = match spec.split_once('@') {
            Some((user, rest)) if !user.is_empty() => (Some(user.to_string()), rest),
            Some(_) => return Err(invalid()),
            None => (None, spec),
        };

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => (host, Some(port.parse::<u16>().map_err(|_| invalid())?)),
            None => (rest, None),
        };

        if host.is_empty() || host.contains('@') {
            return Err(invalid());
        }

        Ok(Self {
            user,
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Gateway {
    /// Format as an OpenSSH `-J` argument
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(user) = &self.user {
            write!(f, "{user}@")?;
        }
        f.write_str(&self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, SshConfigMatch};

    fn layers(cli: Config) -> ConfigLayers {
        ConfigLayers::new(cli, Config::new())
    }

    #[test]
    fn test_gateway_full() {
        let gw: Gateway = "testuser@gateway:9021".parse().unwrap();
        assert_eq!(
            gw,
            Gateway {
                user: Some("testuser".to_string()),
                host: "gateway".to_string(),
                port: Some(9021),
            }
        );
    }

    #[test]
    fn test_gateway_host_only() {
        let gw: Gateway = "gateway".parse().unwrap();
        assert_eq!(gw.user, None);
        assert_eq!(gw.host, "gateway");
        assert_eq!(gw.port, None);
    }

    #[test]
    fn test_gateway_partial_forms() {
        let gw: Gateway = "ops@gateway".parse().unwrap();
        assert_eq!((gw.user.as_deref(), gw.port), (Some("ops"), None));

        let gw: Gateway = "gateway:2200".parse().unwrap();
        assert_eq!((gw.user.as_deref(), gw.port), (None, Some(2200)));
    }

    #[test]
    fn test_gateway_invalid() {
        for bad in ["@gateway", "gateway:ssh", "user@", ":22", "a@b@c"] {
            assert!(bad.parse::<Gateway>().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_gateway_display_round_trips_for_jump_flag() {
        assert_eq!(
            "jump@bastion:2222".parse::<Gateway>().unwrap().to_string(),
            "jump@bastion:2222"
        );
        assert_eq!("bastion".parse::<Gateway>().unwrap().to_string(), "bastion");
    }

    #[test]
    fn test_gateway_opts_unset_is_none() {
        assert_eq!(gateway_opts(&ConfigLayers::default()).unwrap(), None);
    }

    #[test]
    fn test_gateway_opts_from_ssh_config_proxy_jump() {
        let layers = ConfigLayers::default().with_ssh_config(SshConfigMatch {
            proxy_jump: Some("hop@jump.example".to_string()),
            ..Default::default()
        });
        let gw = gateway_opts(&layers).unwrap().unwrap();
        assert_eq!(gw.host, "jump.example");
    }

    #[test]
    fn test_identity_primary_and_gateway() {
        let (keys, keys_only) = identity_opts(&layers(Config {
            ssh_identity_file: Some("~/.ssh/node".to_string()),
            ssh_gateway_identity: Some("~/.ssh/bastion".to_string()),
            ..Config::new()
        }));
        assert_eq!(keys, vec!["~/.ssh/node", "~/.ssh/bastion"]);
        assert!(keys_only);
    }

    #[test]
    fn test_identity_gateway_only_is_not_keys_only() {
        let (keys, keys_only) = identity_opts(&layers(Config {
            ssh_gateway_identity: Some("~/.ssh/bastion".to_string()),
            ..Config::new()
        }));
        assert_eq!(keys, vec!["~/.ssh/bastion"]);
        assert!(!keys_only);
    }

    #[test]
    fn test_identity_none() {
        let (keys, keys_only) = identity_opts(&ConfigLayers::default());
        assert!(keys.is_empty());
        assert!(!keys_only);
    }

    #[test]
    fn test_sudo_disabled_ignores_other_settings() {
        let sudo = sudo_opts(
            &layers(Config {
                use_sudo: Some(false),
                use_sudo_password: Some(true),
                preserve_home: Some(true),
                ..Config::new()
            }),
            Some("pw"),
        );
        assert_eq!(sudo, SudoOptions::Disabled);

        let mut map = OptionMap::new();
        let base = BaseOptions {
            host: "h".to_string(),
            user: "u".to_string(),
            port: 22,
            password: None,
        };
        let opts = SshOptions {
            base,
            key_files: Vec::new(),
            keys_only: false,
            verify_host_key: true,
            gateway: None,
            sudo,
            forward_agent: false,
        };
        opts.insert_into(&mut map);
        assert_eq!(map["sudo"], false);
        assert!(!map.contains_key("sudo_password"));
        assert!(!map.contains_key("sudo_options"));
    }

    #[test]
    fn test_sudo_enabled_variants() {
        let plain = sudo_opts(
            &layers(Config {
                use_sudo: Some(true),
                ..Config::new()
            }),
            Some("pw"),
        );
        assert_eq!(
            plain,
            SudoOptions::Enabled {
                password: None,
                preserve_home: false
            }
        );

        let full = sudo_opts(
            &layers(Config {
                use_sudo: Some(true),
                use_sudo_password: Some(true),
                preserve_home: Some(true),
                ..Config::new()
            }),
            Some("pw"),
        );
        assert_eq!(
            full,
            SudoOptions::Enabled {
                password: Some("pw".to_string()),
                preserve_home: true
            }
        );

        // use_sudo_password without a password has nothing to pass
        let no_password = sudo_opts(
            &layers(Config {
                use_sudo: Some(true),
                use_sudo_password: Some(true),
                ..Config::new()
            }),
            None,
        );
        assert_eq!(
            no_password,
            SudoOptions::Enabled {
                password: None,
                preserve_home: false
            }
        );
    }

    #[test]
    fn test_sudo_command_prefix() {
        assert_eq!(SudoOptions::Disabled.command_prefix(), "");
        assert_eq!(
            SudoOptions::Enabled {
                password: Some("pw".to_string()),
                preserve_home: true
            }
            .command_prefix(),
            "sudo -H -S -p '' "
        );
    }

    #[test]
    fn test_sudo_wrap() {
        assert_eq!(SudoOptions::Disabled.wrap("sh /tmp/x"), "sh /tmp/x");
        assert_eq!(
            SudoOptions::Enabled {
                password: None,
                preserve_home: false
            }
            .wrap("sh /tmp/x"),
            "sudo sh /tmp/x"
        );
        assert_eq!(
            SudoOptions::Enabled {
                password: Some("p'w".to_string()),
                preserve_home: false
            }
            .wrap("sh /tmp/x"),
            r"printf '%s\n' 'p'\''w' | sudo -S -p '' sh /tmp/x"
        );
    }

    #[test]
    fn test_host_verify_and_forward_agent_defaults() {
        assert!(host_verify_opts(&ConfigLayers::default()));
        assert!(!ssh_opts(&ConfigLayers::default()));

        let l = layers(Config {
            ssh_verify_host_key: Some(false),
            ssh_forward_agent: Some(true),
            ..Config::new()
        });
        assert!(!host_verify_opts(&l));
        assert!(ssh_opts(&l));
    }
}
