//! Node identity registration
//!
//! When no validator key is available, or encrypted data bag items must be
//! shared with the node, the node's client identity has to exist before the
//! script is rendered. [`ClientRegistrar`] produces it, [`VaultHandler`]
//! grants it access to vault items.

use std::path::{Path, PathBuf};

use crate::config::paths::expand_home;
use crate::error::{BootstrapError, Result};

/// Materializes the node's client identity locally
pub trait ClientRegistrar: Send {
    fn run(&mut self) -> Result<()>;

    /// Key to ship as the node's `client.pem`, once [`Self::run`] succeeded
    fn client_path(&self) -> Option<&Path>;
}

/// Shares encrypted vault items with the new client
pub trait VaultHandler: Send {
    /// Whether any vault items were requested
    fn doing_vault(&self) -> bool;

    fn run(&mut self, client_path: Option<&Path>) -> Result<()>;
}

/// Uses a client key that was created ahead of time
#[derive(Debug, Clone, Default)]
pub struct ExistingClientKey {
    configured: Option<String>,
    resolved: Option<PathBuf>,
}

impl ExistingClientKey {
    pub fn new(client_key: Option<String>) -> Self {
        Self {
            configured: client_key,
            resolved: None,
        }
    }
}

impl ClientRegistrar for ExistingClientKey {
    fn run(&mut self) -> Result<()> {
        let Some(configured) = &self.configured else {
            return Err(BootstrapError::Registration(
                "no validation key is available; pass --client-key with a key for this node"
                    .to_string(),
            ));
        };

        let path = expand_home(configured);
        if !path.is_file() {
            return Err(BootstrapError::Registration(format!(
                "client key {} does not exist",
                path.display()
            )));
        }

        tracing::info!("Using client key {}", path.display());
        self.resolved = Some(path);
        Ok(())
    }

    fn client_path(&self) -> Option<&Path> {
        self.resolved.as_deref()
    }
}

/// Vault handler for runs that request no vault items
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVault;

impl VaultHandler for NoVault {
    fn doing_vault(&self) -> bool {
        false
    }

    fn run(&mut self, _client_path: Option<&Path>) -> Result<()> {
        Ok(())
    }
}
