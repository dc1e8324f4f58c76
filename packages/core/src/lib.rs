//! chef-bootstrap-core - Core library for chef-bootstrap
//!
//! This library provides protocol negotiation, connection option assembly,
//! bootstrap template rendering and remote script execution for the
//! `chef-bootstrap` CLI.

pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod options;
pub mod orchestrator;
pub mod protocol;
pub mod registration;
pub mod request;
pub mod shell;
pub mod template;
pub mod transport;
pub mod version;

#[cfg(test)]
mod testing;

// Re-export version functions for Rust consumers
pub use version::{get_version, get_version_long};

// Re-export the types the CLI works with
pub use config::{Config, ConfigLayers, load_config};
pub use connection::{ConnectionManager, ConnectionState, NoPrompt, PasswordPrompt};
pub use error::{BootstrapError, Result};
pub use options::{ConnectionOptions, connection_opts};
pub use orchestrator::{Bootstrap, BootstrapEvent, BootstrapOutcome};
pub use protocol::{HostTarget, Protocol};
pub use request::{BootstrapRequest, Hint};
pub use template::{TemplateLocator, TemplateSource};
pub use transport::{Connector, OsFamily, OutputStream, ProtocolConnector, TargetHost};
