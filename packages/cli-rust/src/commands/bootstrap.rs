//! Bootstrap command implementation
//!
//! Installs the Chef client on one remote host and runs it for the first
//! time.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chef_bootstrap_core::transport::ssh::SshProcessConnector;
use chef_bootstrap_core::{
    Bootstrap, BootstrapRequest, Config, ConfigLayers, Hint, ProtocolConnector,
};
use clap::Args;
use console::style;

use crate::output::{BootstrapPrinter, CommandSpinner};
use crate::prompt::TerminalPrompt;

/// Arguments for the bootstrap command
#[derive(Args, Debug, Default)]
pub struct BootstrapArgs {
    /// Target host: HOST, USER@HOST:PORT, or ssh:// or winrm:// followed by either
    pub host: Option<String>,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(flatten)]
    pub node: NodeArgs,

    #[command(flatten)]
    pub install: InstallArgs,
}

/// How to reach the target
#[derive(Args, Debug, Default)]
#[command(next_help_heading = "Connection")]
pub struct ConnectionArgs {
    /// Protocol to connect with (ssh or winrm)
    #[arg(short = 'o', long)]
    pub connection_protocol: Option<String>,

    #[arg(short = 'U', long)]
    pub connection_user: Option<String>,

    #[arg(short = 'p', long)]
    pub connection_port: Option<u16>,

    /// Password for the connection user (prompted for when key auth fails)
    #[arg(short = 'P', long)]
    pub connection_password: Option<String>,

    /// Private key for the target host
    #[arg(short = 'i', long)]
    pub ssh_identity_file: Option<String>,

    /// Bastion host as [user@]host[:port]
    #[arg(short = 'G', long)]
    pub ssh_gateway: Option<String>,

    /// Private key for the bastion host
    #[arg(long)]
    pub ssh_gateway_identity: Option<String>,

    /// Accept any host key without checking known_hosts
    #[arg(long)]
    pub no_host_key_verify: bool,

    #[arg(short = 'A', long)]
    pub ssh_forward_agent: bool,

    /// Run the bootstrap script with sudo
    #[arg(long)]
    pub sudo: bool,

    /// Pass the connection password to sudo
    #[arg(long)]
    pub use_sudo_password: bool,

    /// Preserve $HOME under sudo (sudo -H)
    #[arg(long)]
    pub sudo_preserve_home: bool,

    /// plaintext, kerberos, ssl or negotiate
    #[arg(long)]
    pub winrm_auth_method: Option<String>,

    #[arg(long)]
    pub winrm_ssl: bool,

    /// Skip WinRM certificate validation
    #[arg(long)]
    pub winrm_no_verify_cert: bool,

    #[arg(long)]
    pub winrm_ssl_peer_fingerprint: Option<String>,

    #[arg(long)]
    pub winrm_basic_auth_only: bool,

    /// CA bundle used to verify the WinRM endpoint
    #[arg(long)]
    pub ca_trust_file: Option<String>,

    #[arg(long)]
    pub kerberos_service: Option<String>,

    #[arg(long)]
    pub kerberos_realm: Option<String>,

    /// WinRM operation timeout (e.g. 30s, 2m)
    #[arg(long, value_parser = humantime::parse_duration)]
    pub session_timeout: Option<Duration>,
}

/// What the node becomes once registered
#[derive(Args, Debug, Default)]
#[command(next_help_heading = "Node")]
pub struct NodeArgs {
    #[arg(short = 'N', long)]
    pub node_name: Option<String>,

    #[arg(short = 'E', long)]
    pub environment: Option<String>,

    /// Comma-separated run-list, e.g. 'role[base],recipe[nginx]'
    #[arg(short = 'r', long, value_delimiter = ',')]
    pub run_list: Option<Vec<String>>,

    #[arg(long)]
    pub policy_name: Option<String>,

    #[arg(long)]
    pub policy_group: Option<String>,

    /// Comma-separated tags for the node
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,

    /// First-boot attributes as inline JSON
    #[arg(short = 'j', long)]
    pub json_attributes: Option<String>,

    /// First-boot attributes from a JSON file
    #[arg(long)]
    pub json_attribute_file: Option<PathBuf>,

    /// Ohai hint as NAME or NAME=JSON_OR_FILE (repeatable)
    #[arg(long = "hint", value_name = "NAME[=VALUE]")]
    pub hints: Vec<Hint>,

    /// Encrypted data bag secret
    #[arg(long, conflicts_with = "secret_file")]
    pub secret: Option<String>,

    /// File holding the encrypted data bag secret
    #[arg(long)]
    pub secret_file: Option<PathBuf>,

    /// Chef Infra Server URL
    #[arg(long)]
    pub server_url: Option<String>,

    #[arg(long)]
    pub validation_client_name: Option<String>,

    /// Validator key; without one the bootstrap is validatorless
    #[arg(long)]
    pub validation_key: Option<String>,

    /// Pre-created client key for this node
    #[arg(long)]
    pub client_key: Option<String>,

    /// Directory of certificates to trust on the node
    #[arg(long)]
    pub trusted_certs_dir: Option<String>,

    /// Directory of client.rb fragments to copy to client.d
    #[arg(long)]
    pub client_d_dir: Option<String>,

    #[arg(long)]
    pub config_log_level: Option<String>,

    #[arg(long)]
    pub config_log_location: Option<String>,

    /// License acceptance value, e.g. accept or accept-silent
    #[arg(long)]
    pub chef_license: Option<String>,

    /// none or peer
    #[arg(long)]
    pub node_ssl_verify_mode: Option<String>,

    /// Verify the Chef server certificate in client.rb
    #[arg(long, overrides_with = "no_node_verify_api_cert")]
    pub node_verify_api_cert: bool,

    /// Write `verify_api_cert false` into client.rb
    #[arg(long, overrides_with = "node_verify_api_cert")]
    pub no_node_verify_api_cert: bool,

    #[arg(long)]
    pub fips: bool,
}

/// How the client gets installed
#[derive(Args, Debug, Default)]
#[command(next_help_heading = "Install")]
pub struct InstallArgs {
    /// Template name or path
    #[arg(short = 't', long)]
    pub bootstrap_template: Option<String>,

    /// Chef client version to install
    #[arg(long)]
    pub bootstrap_version: Option<String>,

    /// Replace the install step with this command
    #[arg(long)]
    pub bootstrap_install_command: Option<String>,

    /// URL of the install script
    #[arg(long)]
    pub bootstrap_url: Option<String>,

    /// MSI download URL for Windows targets
    #[arg(long)]
    pub msi_url: Option<String>,

    #[arg(long)]
    pub bootstrap_curl_options: Option<String>,

    #[arg(long)]
    pub bootstrap_wget_options: Option<String>,

    /// Command run before installing
    #[arg(long)]
    pub bootstrap_preinstall_command: Option<String>,

    /// Proxy URL used during the bootstrap
    #[arg(long)]
    pub bootstrap_proxy: Option<String>,

    #[arg(long)]
    pub bootstrap_proxy_user: Option<String>,

    #[arg(long)]
    pub bootstrap_proxy_pass: Option<String>,

    /// Comma-separated hosts that bypass the proxy
    #[arg(long)]
    pub bootstrap_no_proxy: Option<String>,
}

impl BootstrapArgs {
    /// Command-line layer of the settings
    ///
    /// Switches map to `Some(true)` only when given so that an absent switch
    /// falls through to the settings file.
    pub fn cli_config(&self) -> Config {
        let c = &self.connection;
        let n = &self.node;
        let i = &self.install;
        Config {
            connection_protocol: c.connection_protocol.clone(),
            connection_user: c.connection_user.clone(),
            connection_port: c.connection_port,
            connection_password: c.connection_password.clone(),
            ssh_identity_file: c.ssh_identity_file.clone(),
            ssh_gateway: c.ssh_gateway.clone(),
            ssh_gateway_identity: c.ssh_gateway_identity.clone(),
            ssh_verify_host_key: c.no_host_key_verify.then_some(false),
            ssh_forward_agent: c.ssh_forward_agent.then_some(true),
            use_sudo: c.sudo.then_some(true),
            use_sudo_password: c.use_sudo_password.then_some(true),
            preserve_home: c.sudo_preserve_home.then_some(true),
            winrm_auth_method: c.winrm_auth_method.clone(),
            winrm_ssl: c.winrm_ssl.then_some(true),
            winrm_no_verify_cert: c.winrm_no_verify_cert.then_some(true),
            winrm_ssl_peer_fingerprint: c.winrm_ssl_peer_fingerprint.clone(),
            winrm_basic_auth_only: c.winrm_basic_auth_only.then_some(true),
            ca_trust_file: c.ca_trust_file.clone(),
            kerberos_service: c.kerberos_service.clone(),
            kerberos_realm: c.kerberos_realm.clone(),
            session_timeout: c.session_timeout.map(|d| d.as_secs()),
            chef_server_url: n.server_url.clone(),
            validation_client_name: n.validation_client_name.clone(),
            validation_key: n.validation_key.clone(),
            client_key: n.client_key.clone(),
            trusted_certs_dir: n.trusted_certs_dir.clone(),
            client_d_dir: n.client_d_dir.clone(),
            config_log_level: n.config_log_level.clone(),
            config_log_location: n.config_log_location.clone(),
            chef_license: n.chef_license.clone(),
            node_ssl_verify_mode: n.node_ssl_verify_mode.clone(),
            node_verify_api_cert: if n.no_node_verify_api_cert {
                Some(false)
            } else {
                n.node_verify_api_cert.then_some(true)
            },
            fips: n.fips.then_some(true),
            bootstrap_template: i.bootstrap_template.clone(),
            bootstrap_version: i.bootstrap_version.clone(),
            bootstrap_install_command: i.bootstrap_install_command.clone(),
            bootstrap_url: i.bootstrap_url.clone(),
            msi_url: i.msi_url.clone(),
            bootstrap_curl_options: i.bootstrap_curl_options.clone(),
            bootstrap_wget_options: i.bootstrap_wget_options.clone(),
            bootstrap_preinstall_command: i.bootstrap_preinstall_command.clone(),
            bootstrap_proxy: i.bootstrap_proxy.clone(),
            bootstrap_proxy_user: i.bootstrap_proxy_user.clone(),
            bootstrap_proxy_pass: i.bootstrap_proxy_pass.clone(),
            bootstrap_no_proxy: i.bootstrap_no_proxy.clone(),
            ..Config::new()
        }
    }

    /// Node settings for the run
    pub fn request(&self) -> BootstrapRequest {
        let n = &self.node;
        BootstrapRequest {
            host: self.host.clone(),
            // `-r ''` is an explicitly empty run-list
            run_list: n.run_list.as_ref().map(|items| {
                items
                    .iter()
                    .map(|item| item.trim())
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect()
            }),
            json_attributes: n.json_attributes.clone(),
            json_attribute_file: n.json_attribute_file.clone(),
            policy_name: n.policy_name.clone(),
            policy_group: n.policy_group.clone(),
            tags: n.tags.clone(),
            hints: n.hints.clone(),
            secret: n.secret.clone(),
            secret_file: n.secret_file.clone(),
            node_name: n.node_name.clone(),
            environment: n.environment.clone(),
        }
    }

    /// Settings layered over the settings file
    pub fn layers(&self, file: &Config) -> ConfigLayers {
        ConfigLayers::new(self.cli_config(), file.clone())
    }
}

/// Bootstrap one host
///
/// This command:
/// 1. Validates the host, protocol and node options
/// 2. Connects, prompting for a password if key authentication is refused
/// 3. Renders, uploads and runs the bootstrap script, streaming its output
pub async fn cmd_bootstrap(args: &BootstrapArgs, file: &Config, quiet: bool) -> Result<()> {
    let askpass = std::env::current_exe()
        .context("Could not determine the path of the chef-bootstrap executable")?;
    tracing::debug!("Using {} as the ssh askpass helper", askpass.display());
    let connector = ProtocolConnector::new()
        .with_ssh(SshProcessConnector::new().with_askpass_program(askpass));

    let spinner = CommandSpinner::new_maybe("Validating options...", quiet);
    let prompt = TerminalPrompt::new(spinner.clone());
    let mut printer = BootstrapPrinter::new(spinner, quiet);

    let mut bootstrap = Bootstrap::new(args.request(), args.layers(file), &connector, &prompt);
    let result = bootstrap.run(&mut |event| printer.handle(event)).await;

    match result {
        Ok(outcome) => {
            printer.finish();
            if !quiet {
                println!();
                println!(
                    "{} Bootstrapped {} over {} using {}",
                    style("Success!").green().bold(),
                    style(&outcome.host).cyan(),
                    outcome.protocol,
                    style(&outcome.template).dim()
                );
            }
            Ok(())
        }
        Err(e) => {
            printer.abort();
            Err(e.into())
        }
    }
}
