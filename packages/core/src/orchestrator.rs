//! The bootstrap workflow
//!
//! Order of a run:
//! 1. validate the host, protocol, first-boot attributes, WinRM transport
//!    security and policy options (no side effects before all pass)
//! 2. build the connection options
//! 3. register the node identity when validatorless or sharing vault items
//! 4. connect, with one password retry
//! 5. render, upload and execute the script, then remove it
//! 6. close the session
//!
//! Transport and execution failures still remove the script and close the
//! session before the error is returned.

use std::path::{Path, PathBuf};

use crate::config::ConfigLayers;
use crate::config::ssh_config::{get_ssh_config_path, query_ssh_config_file};
use crate::connection::{ConnectionManager, ConnectionState, PasswordPrompt};
use crate::error::{BootstrapError, Result};
use crate::executor::BootstrapExecutor;
use crate::options::{ConnectionOptions, WinrmAuthMethod, connection_opts};
use crate::protocol::{HostTarget, Protocol, validate_protocol};
use crate::registration::{ClientRegistrar, ExistingClientKey, NoVault, VaultHandler};
use crate::request::BootstrapRequest;
use crate::template::{
    BootstrapContext, TemplateLocator, TemplateRenderer, TemplateSource, default_template_name,
};
use crate::transport::{Connector, OsFamily, OutputStream, TargetHost};

/// Progress reported while a bootstrap runs
#[derive(Debug)]
pub enum BootstrapEvent<'e> {
    Validated { host: &'e str, protocol: Protocol },
    Registered { client_path: Option<&'e Path> },
    Connecting { user: &'e str, host: &'e str, port: u16 },
    Connected { host: &'e str, os: OsFamily },
    Rendered { template: &'e TemplateSource },
    Uploading { path: &'e str },
    Output { stream: OutputStream, line: &'e str },
}

/// Callback receiving [`BootstrapEvent`]s
pub type EventSink<'a> = &'a mut (dyn FnMut(BootstrapEvent<'_>) + Send);

/// Summary of a successful run
#[derive(Debug, Clone)]
pub struct BootstrapOutcome {
    pub host: String,
    pub protocol: Protocol,
    pub os: OsFamily,
    pub template: String,
    pub remote_path: String,
    pub connection_history: Vec<ConnectionState>,
}

/// Parse the host descriptor, failing when none was given
pub fn validate_name_args(request: &BootstrapRequest) -> Result<HostTarget> {
    match request.host.as_deref().map(str::trim) {
        Some(host) if !host.is_empty() => HostTarget::parse(host),
        _ => Err(BootstrapError::MissingHost),
    }
}

/// First-boot attributes must be parseable and not given twice
pub fn validate_first_boot_attributes(request: &BootstrapRequest) -> Result<()> {
    request.first_boot_attributes().map(|_| ())
}

/// Refuse to ship a node key over an unencrypted WinRM channel
pub fn validate_winrm_transport_opts(
    protocol: Protocol,
    target: &HostTarget,
    layers: &ConfigLayers,
) -> Result<()> {
    if protocol != Protocol::Winrm || !layers.is_validatorless() {
        return Ok(());
    }
    let plaintext = WinrmAuthMethod::from_layers(layers)? == WinrmAuthMethod::Plaintext;
    if plaintext && !layers.flag(|c| c.winrm_ssl, false) {
        return Err(BootstrapError::InsecureWinrmTransport {
            host: target.host().to_string(),
        });
    }
    Ok(())
}

/// Policy name and group go together and exclude a run-list
///
/// An explicitly empty run-list does not count as one.
pub fn validate_policy_options(request: &BootstrapRequest) -> Result<()> {
    match (&request.policy_name, &request.policy_group) {
        (Some(_), None) | (None, Some(_)) => {
            return Err(BootstrapError::PolicyOptionConflict(
                "--policy-name and --policy-group must be specified together".to_string(),
            ));
        }
        (Some(_), Some(_)) if !request.run_list().is_empty() => {
            return Err(BootstrapError::PolicyOptionConflict(
                "Policyfile options and --run-list are exclusive".to_string(),
            ));
        }
        _ => {}
    }
    Ok(())
}

/// One bootstrap of one target
pub struct Bootstrap<'a> {
    request: BootstrapRequest,
    layers: ConfigLayers,
    connector: &'a dyn Connector,
    prompt: &'a dyn PasswordPrompt,
    registrar: Box<dyn ClientRegistrar + 'a>,
    vault: Box<dyn VaultHandler + 'a>,
    locator: TemplateLocator,
    ssh_config_path: Option<PathBuf>,
}

impl<'a> Bootstrap<'a> {
    pub fn new(
        request: BootstrapRequest,
        layers: ConfigLayers,
        connector: &'a dyn Connector,
        prompt: &'a dyn PasswordPrompt,
    ) -> Self {
        let registrar = ExistingClientKey::new(layers.lookup(|c| c.client_key.clone()));
        let locator = TemplateLocator::from_layers(&layers);
        Self {
            request,
            layers,
            connector,
            prompt,
            registrar: Box::new(registrar),
            vault: Box::new(NoVault),
            locator,
            ssh_config_path: get_ssh_config_path(),
        }
    }

    /// Builder pattern: replace the client registrar
    pub fn with_registrar(mut self, registrar: impl ClientRegistrar + 'a) -> Self {
        self.registrar = Box::new(registrar);
        self
    }

    /// Builder pattern: replace the vault handler
    pub fn with_vault(mut self, vault: impl VaultHandler + 'a) -> Self {
        self.vault = Box::new(vault);
        self
    }

    /// Builder pattern: replace the template locator
    pub fn with_locator(mut self, locator: TemplateLocator) -> Self {
        self.locator = locator;
        self
    }

    /// Builder pattern: read SSH host settings from this file, or not at all
    pub fn with_ssh_config_path(mut self, path: Option<PathBuf>) -> Self {
        self.ssh_config_path = path;
        self
    }

    pub fn request(&self) -> &BootstrapRequest {
        &self.request
    }

    /// Run every validation in order, stopping at the first failure
    pub fn validate(&self) -> Result<(HostTarget, Protocol)> {
        let target = validate_name_args(&self.request)?;
        let protocol = validate_protocol(
            &target,
            self.layers.cli.connection_protocol.as_deref(),
            self.layers.file.connection_protocol.as_deref(),
        )?;
        validate_first_boot_attributes(&self.request)?;
        validate_winrm_transport_opts(protocol, &target, &self.layers)?;
        validate_policy_options(&self.request)?;
        Ok((target, protocol))
    }

    fn attach_ssh_config(&mut self, protocol: Protocol, target: &HostTarget) -> Result<()> {
        if protocol != Protocol::Ssh {
            return Ok(());
        }
        if let Some(path) = self.ssh_config_path.as_deref().filter(|p| p.exists()) {
            let matched = query_ssh_config_file(path, target.host())?;
            if matched.has_settings() {
                tracing::debug!(
                    "~/.ssh/config settings for {}: {}",
                    target.host(),
                    matched.display_settings()
                );
            }
            self.layers = std::mem::take(&mut self.layers).with_ssh_config(matched);
        }
        Ok(())
    }

    /// Create the node identity when the run needs one
    fn register(&mut self) -> Result<Option<PathBuf>> {
        let doing_vault = self.vault.doing_vault();
        if !self.layers.is_validatorless() && !doing_vault {
            return Ok(None);
        }

        self.registrar.run()?;
        let client_path = self.registrar.client_path().map(Path::to_path_buf);
        if doing_vault {
            self.vault.run(client_path.as_deref())?;
        }
        Ok(client_path)
    }

    /// Name of the template to render for `os`
    fn template_name(&self, os: OsFamily) -> String {
        self.layers
            .lookup(|c| c.bootstrap_template.clone())
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| default_template_name(os).to_string())
    }

    /// Render the script for `os` without connecting or registering
    pub fn preview(&self, os: OsFamily) -> Result<String> {
        validate_first_boot_attributes(&self.request)?;
        validate_policy_options(&self.request)?;
        let source = self.locator.locate(&self.template_name(os))?;
        let context = BootstrapContext::new(&self.request, &self.layers, os);
        TemplateRenderer::new().render(&source, &context)
    }

    /// Bootstrap the target
    pub async fn run(&mut self, on_event: EventSink<'_>) -> Result<BootstrapOutcome> {
        let (target, protocol) = self.validate()?;
        on_event(BootstrapEvent::Validated {
            host: target.host(),
            protocol,
        });

        self.attach_ssh_config(protocol, &target)?;
        let options = connection_opts(protocol, &target, &self.layers)?;

        let client_path = self.register()?;
        if client_path.is_some() {
            on_event(BootstrapEvent::Registered {
                client_path: client_path.as_deref(),
            });
        }

        let base = options.base();
        on_event(BootstrapEvent::Connecting {
            user: &base.user,
            host: &base.host,
            port: base.port,
        });
        let mut manager = ConnectionManager::new(self.connector, self.prompt);
        let session = manager.connect(&options).await?;
        let os = session.base_os();
        on_event(BootstrapEvent::Connected {
            host: session.hostname(),
            os,
        });

        let result = self
            .provision(session.as_ref(), &options, client_path, on_event)
            .await;

        if let Err(e) = session.close().await {
            tracing::warn!("Could not close the session to {}: {}", session.hostname(), e);
        }

        let (template, remote_path) = result?;
        tracing::info!("Bootstrapped {} over {}", target.host(), protocol);
        Ok(BootstrapOutcome {
            host: target.host().to_string(),
            protocol,
            os,
            template,
            remote_path,
            connection_history: manager.history().to_vec(),
        })
    }

    async fn provision(
        &self,
        session: &dyn TargetHost,
        options: &ConnectionOptions,
        client_path: Option<PathBuf>,
        on_event: EventSink<'_>,
    ) -> Result<(String, String)> {
        let os = session.base_os();
        let source = self.locator.locate(&self.template_name(os))?;
        let context =
            BootstrapContext::new(&self.request, &self.layers, os).with_client_key(client_path);
        let script = TemplateRenderer::new().render(&source, &context)?;
        on_event(BootstrapEvent::Rendered { template: &source });

        let executor = BootstrapExecutor::new(session, options);
        on_event(BootstrapEvent::Uploading {
            path: &executor.remote_path(),
        });
        let remote_path = executor
            .run(&script, &mut |stream, line: &str| {
                on_event(BootstrapEvent::Output { stream, line })
            })
            .await?;

        Ok((source.to_string(), remote_path))
    }
}
