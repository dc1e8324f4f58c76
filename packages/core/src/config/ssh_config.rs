//! SSH config file lookup
//!
//! Reads `~/.ssh/config` so bootstrap targets pick up the same user, port,
//! identity file and ProxyJump that a plain `ssh <host>` would use.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use ssh2_config::{HostParams, ParseRule, SshConfig};

use crate::error::BootstrapError;

/// Host settings taken from `~/.ssh/config`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SshConfigMatch {
    pub user: Option<String>,
    pub port: Option<u16>,
    /// First `IdentityFile` only
    pub identity_file: Option<String>,
    /// `ProxyJump` hops joined with commas
    pub proxy_jump: Option<String>,
}

impl SshConfigMatch {
    fn from_params(params: HostParams) -> Self {
        Self {
            user: params.user,
            port: params.port,
            identity_file: params
                .identity_file
                .and_then(|files| files.into_iter().next())
                .map(|file| file.to_string_lossy().into_owned()),
            proxy_jump: params
                .proxy_jump
                .filter(|hops| !hops.is_empty())
                .map(|hops| hops.join(",")),
        }
    }

    fn settings(&self) -> Vec<(&'static str, String)> {
        let mut settings = Vec::new();
        if let Some(user) = &self.user {
            settings.push(("User", user.clone()));
        }
        if let Some(port) = self.port {
            settings.push(("Port", port.to_string()));
        }
        if let Some(key) = &self.identity_file {
            settings.push(("IdentityFile", key.clone()));
        }
        if let Some(jump) = &self.proxy_jump {
            settings.push(("ProxyJump", jump.clone()));
        }
        settings
    }

    pub fn has_settings(&self) -> bool {
        !self.settings().is_empty()
    }

    /// `Key=value` pairs for log output
    pub fn display_settings(&self) -> String {
        self.settings()
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Path of `~/.ssh/config`
pub fn get_ssh_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".ssh").join("config"))
}

/// Settings an `ssh` client would apply to `hostname`
///
/// Host blocks are matched in file order and the first value for each key
/// wins. Keywords the parser does not know are ignored.
pub fn query_ssh_config_file(
    config_path: &Path,
    hostname: &str,
) -> Result<SshConfigMatch, BootstrapError> {
    let file = File::open(config_path).map_err(|e| {
        BootstrapError::Config(format!("Failed to open {}: {}", config_path.display(), e))
    })?;

    let config = SshConfig::default()
        .parse(&mut BufReader::new(file), ParseRule::ALLOW_UNKNOWN_FIELDS)
        .map_err(|e| {
            BootstrapError::Config(format!(
                "Failed to parse {}: {e}",
                config_path.display()
            ))
        })?;

    Ok(SshConfigMatch::from_params(config.query(hostname)))
}
