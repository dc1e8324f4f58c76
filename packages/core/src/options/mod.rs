//! Connection option assembly
//!
//! Each option group is built by its own pure function over
//! [`ConfigLayers`]. The groups are combined into a [`ConnectionOptions`]
//! variant per protocol, so SSH-only settings cannot end up in a WinRM
//! bundle and vice versa.

pub mod ssh;
pub mod winrm;

use std::collections::BTreeMap;

use serde_json::Value;

use crate::config::ConfigLayers;
use crate::error::Result;
use crate::protocol::{HostTarget, Protocol};

pub use ssh::{Gateway, SshOptions, SudoOptions};
pub use winrm::{WinrmAuthMethod, WinrmOptions};

/// Option-name to value view of a bundle
pub type OptionMap = BTreeMap<&'static str, Value>;

const REDACTED: &str = "********";

/// Settings shared by every protocol
#[derive(Debug, Clone, PartialEq)]
pub struct BaseOptions {
    /// Hostname or IP address to connect to
    pub host: String,
    pub user: String,
    pub port: u16,
    /// Present only when one was supplied
    pub password: Option<String>,
}

impl BaseOptions {
    fn insert_into(&self, map: &mut OptionMap) {
        map.insert("host", Value::from(self.host.clone()));
        map.insert("user", Value::from(self.user.clone()));
        map.insert("port", Value::from(self.port));
        if let Some(password) = &self.password {
            map.insert("password", Value::from(password.clone()));
        }
    }
}

/// Build the base group: user, port and (if supplied) password
///
/// User and port come from the protocol-qualified lookup in
/// [`ConfigLayers::connection_user`]; the fallbacks are `root`:22 for ssh and
/// `administrator`:5985 (5986 with ssl) for winrm.
pub fn base_opts(protocol: Protocol, target: &HostTarget, layers: &ConfigLayers) -> BaseOptions {
    let user = layers
        .connection_user(protocol, target)
        .unwrap_or_else(|| match protocol {
            Protocol::Ssh => "root".to_string(),
            Protocol::Winrm => "administrator".to_string(),
        });

    let port = layers
        .connection_port(protocol, target)
        .unwrap_or_else(|| match protocol {
            Protocol::Ssh => 22,
            Protocol::Winrm if layers.flag(|c| c.winrm_ssl, false) => 5986,
            Protocol::Winrm => 5985,
        });

    BaseOptions {
        host: target.host().to_string(),
        user,
        port,
        password: layers.connection_password(),
    }
}

/// A complete, protocol-specific connection bundle
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionOptions {
    Ssh(SshOptions),
    Winrm(WinrmOptions),
}

impl ConnectionOptions {
    pub fn protocol(&self) -> Protocol {
        match self {
            ConnectionOptions::Ssh(_) => Protocol::Ssh,
            ConnectionOptions::Winrm(_) => Protocol::Winrm,
        }
    }

    pub fn base(&self) -> &BaseOptions {
        match self {
            ConnectionOptions::Ssh(opts) => &opts.base,
            ConnectionOptions::Winrm(opts) => &opts.base,
        }
    }

    fn base_mut(&mut self) -> &mut BaseOptions {
        match self {
            ConnectionOptions::Ssh(opts) => &mut opts.base,
            ConnectionOptions::Winrm(opts) => &mut opts.base,
        }
    }

    pub fn has_password(&self) -> bool {
        self.base().password.is_some()
    }

    /// A copy of this bundle with `password` inserted and nothing else changed
    pub fn with_password(&self, password: impl Into<String>) -> Self {
        let mut opts = self.clone();
        opts.base_mut().password = Some(password.into());
        opts
    }

    /// Flatten to an option-name to value mapping
    pub fn to_map(&self) -> OptionMap {
        let mut map = OptionMap::new();
        self.base().insert_into(&mut map);
        match self {
            ConnectionOptions::Ssh(opts) => opts.insert_into(&mut map),
            ConnectionOptions::Winrm(opts) => opts.insert_into(&mut map),
        }
        map
    }

    /// Like [`Self::to_map`] with passwords masked, for logging
    pub fn redacted_map(&self) -> OptionMap {
        let mut map = self.to_map();
        for key in ["password", "sudo_password"] {
            if let Some(value) = map.get_mut(key) {
                *value = Value::from(REDACTED);
            }
        }
        map
    }
}

/// Assemble the full bundle for a target
///
/// Merges base, identity, host verification, gateway, sudo and the
/// protocol extras. Fails only when a gateway string or WinRM auth method is
/// malformed.
pub fn connection_opts(
    protocol: Protocol,
    target: &HostTarget,
    layers: &ConfigLayers,
) -> Result<ConnectionOptions> {
    let base = base_opts(protocol, target, layers);
    let opts = match protocol {
        Protocol::Ssh => ConnectionOptions::Ssh(SshOptions::build(base, layers)?),
        Protocol::Winrm => ConnectionOptions::Winrm(WinrmOptions::build(base, layers)?),
    };

    tracing::debug!(
        "Connection options for {}: {:?}",
        target.host(),
        opts.redacted_map()
    );
    Ok(opts)
}
