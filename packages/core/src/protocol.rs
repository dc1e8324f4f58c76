//! Connection protocol resolution
//!
//! Decides which transport governs a bootstrap target. The precedence is:
//! 1. a scheme embedded in the host descriptor (`winrm://web01`)
//! 2. the `--connection-protocol` flag
//! 3. `connection_protocol` from the config file
//! 4. `ssh`

use std::fmt;
use std::str::FromStr;

use crate::error::{BootstrapError, Result};

/// Protocol used when nothing else selects one
pub const DEFAULT_PROTOCOL: &str = "ssh";

/// Supported transport protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Unix-style secure shell
    Ssh,
    /// Windows Remote Management
    Winrm,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Ssh => "ssh",
            Protocol::Winrm => "winrm",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = BootstrapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ssh" => Ok(Protocol::Ssh),
            "winrm" => Ok(Protocol::Winrm),
            other => Err(BootstrapError::UnsupportedProtocol(other.to_string())),
        }
    }
}

/// A parsed bootstrap target descriptor
///
/// Accepts `[protocol://][user@]host[:port]`. Bracketed IPv6 literals keep
/// their brackets in `host`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTarget {
    raw: String,
    scheme: Option<String>,
    user: Option<String>,
    host: String,
    port: Option<u16>,
}

impl HostTarget {
    /// Parse a host descriptor
    ///
    /// Fails with [`BootstrapError::MissingHost`] when no hostname remains
    /// after stripping scheme, user and port.
    pub fn parse(descriptor: &str) -> Result<Self> {
        let raw = descriptor.trim().to_string();

        let (scheme, rest) = match raw.split_once("://") {
            Some((scheme, rest)) => (Some(scheme.to_lowercase()), rest),
            None => (None, raw.as_str()),
        };

        let (user, rest) = match rest.split_once('@') {
            Some((user, rest)) if !user.is_empty() => (Some(user.to_string()), rest),
            Some((_, rest)) => (None, rest),
            None => (None, rest),
        };

        let (host, port) = split_port(rest);
        if host.is_empty() {
            return Err(BootstrapError::MissingHost);
        }

        Ok(Self {
            scheme,
            user,
            host: host.to_string(),
            port,
            raw,
        })
    }

    /// The descriptor exactly as given
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Protocol scheme embedded in the descriptor, lowercased
    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Bare hostname or IP address
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }
}

impl fmt::Display for HostTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Split a trailing `:port`, leaving unbracketed IPv6 literals alone
fn split_port(rest: &str) -> (&str, Option<u16>) {
    if let Some((host, port)) = rest.rsplit_once(':') {
        let is_single_colon = !host.contains(':') || (host.starts_with('[') && host.ends_with(']'));
        if is_single_colon {
            if let Ok(port) = port.parse::<u16>() {
                return (host, Some(port));
            }
        }
    }
    (rest, None)
}

/// Pick the protocol name by precedence without validating it
pub fn resolve_protocol_name<'a>(
    target: &'a HostTarget,
    cli_protocol: Option<&'a str>,
    configured_default: Option<&'a str>,
) -> &'a str {
    target
        .scheme()
        .or(cli_protocol)
        .or(configured_default)
        .unwrap_or(DEFAULT_PROTOCOL)
}

/// Resolve the protocol for a target
///
/// The embedded scheme wins over a conflicting CLI value here; the conflict
/// itself is reported by [`validate_protocol`].
pub fn resolve(
    target: &HostTarget,
    cli_protocol: Option<&str>,
    configured_default: Option<&str>,
) -> Result<Protocol> {
    resolve_protocol_name(target, cli_protocol, configured_default).parse()
}

/// Validate the protocol selection for a target
///
/// Fails with [`BootstrapError::ProtocolConflict`] when the descriptor scheme
/// and the CLI option are both present and differ, and with
/// [`BootstrapError::UnsupportedProtocol`] when the resolved name is unknown.
pub fn validate_protocol(
    target: &HostTarget,
    cli_protocol: Option<&str>,
    configured_default: Option<&str>,
) -> Result<Protocol> {
    if let (Some(url_protocol), Some(cli_protocol)) = (target.scheme(), cli_protocol) {
        if !url_protocol.eq_ignore_ascii_case(cli_protocol) {
            return Err(BootstrapError::ProtocolConflict {
                host: target.raw().to_string(),
                url_protocol: url_protocol.to_string(),
                cli_protocol: cli_protocol.to_string(),
            });
        }
    }

    let protocol = resolve(target, cli_protocol, configured_default)?;
    tracing::debug!("Using connection protocol {} for {}", protocol, target.host());
    Ok(protocol)
}
