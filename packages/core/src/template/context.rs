//! Values a bootstrap template renders from
//!
//! [`BootstrapContext`] computes the generated agent configuration
//! (`client.rb`), the first-boot JSON, the start command and the files to
//! drop onto the node. [`TemplateVars`] is the flattened, serializable view
//! handed to the template engine.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};
use walkdir::WalkDir;

use crate::config::{Config, ConfigLayers};
use crate::config::paths::expand_home;
use crate::error::{BootstrapError, Result};
use crate::request::BootstrapRequest;
use crate::shell;
use crate::transport::OsFamily;

const DEFAULT_INSTALL_URL: &str = "https://omnitruck.chef.io/chef/install.sh";
const DEFAULT_MSI_URL: &str = "https://omnitruck.chef.io/chef/download?p=windows&m=x86_64";
const DEFAULT_VALIDATION_CLIENT_NAME: &str = "chef-validator";
const CLIENT_COMMAND: &str = "chef-client";

/// A file embedded into the script and written on the node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbeddedFile {
    /// Path relative to its target directory, in the node's separator style
    pub name: String,
    pub content: String,
}

/// Everything a template can reference
#[derive(Debug, Clone, Serialize)]
pub struct TemplateVars {
    /// Generated `client.rb`
    pub config_content: String,
    /// Generated `first-boot.json`
    pub first_boot: String,
    pub start_command: String,
    pub node_name: Option<String>,
    pub install_command: Option<String>,
    /// Installer script on Unix, MSI on Windows
    pub install_url: String,
    pub version: Option<String>,
    pub curl_options: Option<String>,
    pub wget_options: Option<String>,
    pub preinstall_command: Option<String>,
    /// `name=value` proxy environment settings for the installer download
    pub proxy_env: Vec<String>,
    pub validation_key: Option<String>,
    pub client_pem: Option<String>,
    pub encrypted_data_bag_secret: Option<String>,
    pub trusted_certs: Vec<EmbeddedFile>,
    pub client_d_dirs: Vec<String>,
    pub client_d: Vec<EmbeddedFile>,
    pub hints: Vec<EmbeddedFile>,
}

/// Inputs for rendering one target's bootstrap script
#[derive(Debug, Clone)]
pub struct BootstrapContext<'a> {
    request: &'a BootstrapRequest,
    layers: &'a ConfigLayers,
    os: OsFamily,
    client_key: Option<PathBuf>,
}

impl<'a> BootstrapContext<'a> {
    pub fn new(request: &'a BootstrapRequest, layers: &'a ConfigLayers, os: OsFamily) -> Self {
        Self {
            request,
            layers,
            os,
            client_key: None,
        }
    }

    /// Builder pattern: ship this key as the node's `client.pem`
    pub fn with_client_key(mut self, path: Option<PathBuf>) -> Self {
        self.client_key = path;
        self
    }

    pub fn os(&self) -> OsFamily {
        self.os
    }

    /// Chef directory on the node, as written inside `client.rb`
    fn chef_dir(&self) -> &'static str {
        if self.os.is_windows() {
            "C:/chef"
        } else {
            "/etc/chef"
        }
    }

    fn setting(&self, field: impl Fn(&Config) -> Option<String>) -> Option<String> {
        self.layers
            .lookup(field)
            .filter(|value| !value.trim().is_empty())
    }

    /// `ssl_verify_mode` directive value
    pub fn ssl_verify_mode(&self) -> Result<Option<&'static str>> {
        match self.setting(|c| c.node_ssl_verify_mode.clone()).as_deref() {
            None => Ok(None),
            Some("none") => Ok(Some(":verify_none")),
            Some("peer") => Ok(Some(":verify_peer")),
            Some(other) => Err(BootstrapError::InvalidSslVerifyMode(other.to_string())),
        }
    }

    /// Generate the agent configuration file
    pub fn config_content(&self) -> Result<String> {
        let dir = self.chef_dir();
        let mut lines = Vec::new();

        if let Some(url) = self.setting(|c| c.chef_server_url.clone()) {
            lines.push(format!("chef_server_url  {}", ruby_string(&url)));
        }
        let validation_client_name = self
            .setting(|c| c.validation_client_name.clone())
            .unwrap_or_else(|| DEFAULT_VALIDATION_CLIENT_NAME.to_string());
        lines.push(format!(
            "validation_client_name {}",
            ruby_string(&validation_client_name)
        ));

        if let Some(license) = self.setting(|c| c.chef_license.clone()) {
            lines.push(format!("chef_license {}", ruby_string(&license)));
        }
        if let Some(level) = self.setting(|c| c.config_log_level.clone()) {
            lines.push(format!("log_level   :{}", level.trim_start_matches(':')));
        }
        lines.push(match self.setting(|c| c.config_log_location.clone()) {
            Some(location) if location == "STDOUT" || location == "STDERR" => {
                format!("log_location   {location}")
            }
            Some(location) => format!("log_location   {}", ruby_string(&location)),
            None => "log_location   STDOUT".to_string(),
        });
        if let Some(node_name) = &self.request.node_name {
            lines.push(format!("node_name {}", ruby_string(node_name)));
        }

        if let Some(proxy) = self.setting(|c| c.bootstrap_proxy.clone()) {
            lines.push(format!("http_proxy {}", ruby_string(&proxy)));
            lines.push(format!("https_proxy {}", ruby_string(&proxy)));
            if let Some(user) = self.setting(|c| c.bootstrap_proxy_user.clone()) {
                lines.push(format!("http_proxy_user {}", ruby_string(&user)));
                lines.push(format!("https_proxy_user {}", ruby_string(&user)));
            }
            if let Some(pass) = self.setting(|c| c.bootstrap_proxy_pass.clone()) {
                lines.push(format!("http_proxy_pass {}", ruby_string(&pass)));
                lines.push(format!("https_proxy_pass {}", ruby_string(&pass)));
            }
        }
        if let Some(no_proxy) = self.setting(|c| c.bootstrap_no_proxy.clone()) {
            lines.push(format!("no_proxy {}", ruby_string(&no_proxy)));
        }

        if let Some(mode) = self.ssl_verify_mode()? {
            lines.push(format!("ssl_verify_mode {mode}"));
        }
        if let Some(verify) = self.layers.lookup(|c| c.node_verify_api_cert) {
            lines.push(format!("verify_api_cert {verify}"));
        }

        if self.request.encrypted_secret()?.is_some() {
            lines.push(format!(
                "encrypted_data_bag_secret \"{dir}/encrypted_data_bag_secret\""
            ));
        }
        if !self.trusted_cert_paths()?.is_empty() {
            lines.push(format!("trusted_certs_dir \"{dir}/trusted_certs\""));
        }
        if self.os.is_windows() {
            lines.push(format!("file_cache_path \"{dir}/cache\""));
            lines.push(format!("file_backup_path \"{dir}/backup\""));
        }
        if self.layers.flag(|c| c.fips, false) {
            lines.push("fips true".to_string());
        }

        Ok(lines.join("\n"))
    }

    /// Generate the first-boot JSON
    ///
    /// Policy mode sets `policy_name`/`policy_group` and drops `run_list`;
    /// otherwise `run_list` is always present.
    pub fn first_boot(&self) -> Result<String> {
        let mut attributes: Map<String, Value> = self.request.first_boot_attributes()?;

        match self.request.policy() {
            Some((name, group)) => {
                attributes.remove("run_list");
                attributes.insert("policy_name".to_string(), Value::from(name));
                attributes.insert("policy_group".to_string(), Value::from(group));
            }
            None => {
                attributes.insert(
                    "run_list".to_string(),
                    Value::from(self.request.run_list().to_vec()),
                );
            }
        }
        if !self.request.tags.is_empty() {
            attributes.insert("tags".to_string(), Value::from(self.request.tags.clone()));
        }

        serde_json::to_string(&attributes)
            .map_err(|e| BootstrapError::InvalidAttributes(e.to_string()))
    }

    /// Command that installs nothing and runs the agent once
    pub fn start_command(&self) -> String {
        let dir = self.chef_dir();
        let mut command = if self.os.is_windows() {
            format!("{CLIENT_COMMAND} -c {dir}/client.rb -j {dir}/first-boot.json")
        } else {
            format!("{CLIENT_COMMAND} -j {dir}/first-boot.json")
        };
        if let Some(environment) = &self.request.environment {
            command.push_str(&format!(" -E {environment}"));
        }
        command
    }

    fn trusted_cert_paths(&self) -> Result<Vec<PathBuf>> {
        let Some(dir) = self.setting(|c| c.trusted_certs_dir.clone()) else {
            return Ok(Vec::new());
        };
        let dir = expand_home(&dir);
        let mut paths = Vec::new();
        for ext in ["crt", "pem"] {
            let pattern = format!("{}/*.{ext}", glob::Pattern::escape(&dir.to_string_lossy()));
            let matches = glob::glob(&pattern)
                .map_err(|e| BootstrapError::Config(format!("trusted_certs_dir: {e}")))?;
            paths.extend(matches.filter_map(std::result::Result::ok));
        }
        paths.sort();
        Ok(paths)
    }

    /// Certificates from `trusted_certs_dir`, quote-escaped on Unix
    pub fn trusted_certs(&self) -> Result<Vec<EmbeddedFile>> {
        self.trusted_cert_paths()?
            .into_iter()
            .map(|path| -> Result<EmbeddedFile> {
                let content = std::fs::read_to_string(&path)?;
                let content = if self.os.is_windows() {
                    content
                } else {
                    shell::escape_single_quotes(&content)
                };
                Ok(EmbeddedFile {
                    name: file_name(&path),
                    content,
                })
            })
            .collect()
    }

    /// Directories and files under `client_d_dir`, nested structure kept
    pub fn client_d(&self) -> Result<(Vec<String>, Vec<EmbeddedFile>)> {
        let Some(root) = self.setting(|c| c.client_d_dir.clone()) else {
            return Ok((Vec::new(), Vec::new()));
        };
        let root = expand_home(&root);

        let mut dirs = BTreeSet::new();
        let mut files = Vec::new();
        for entry in WalkDir::new(&root).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| BootstrapError::Config(format!("client_d_dir: {e}")))?;
            let Ok(relative) = entry.path().strip_prefix(&root) else {
                continue;
            };
            let name = self.node_relative(relative);
            if entry.file_type().is_dir() {
                dirs.insert(name);
            } else if entry.file_type().is_file() {
                let content = std::fs::read_to_string(entry.path())?;
                files.push(EmbeddedFile {
                    name,
                    content: content.trim_end().to_string(),
                });
            }
        }
        Ok((dirs.into_iter().collect(), files))
    }

    fn node_relative(&self, relative: &Path) -> String {
        let separator = if self.os.is_windows() { "\\" } else { "/" };
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(separator)
    }

    /// Hint files, one `<name>.json` per hint
    pub fn hints(&self) -> Result<Vec<EmbeddedFile>> {
        self.request
            .hints
            .iter()
            .map(|hint| -> Result<EmbeddedFile> {
                Ok(EmbeddedFile {
                    name: format!("{}.json", hint.name),
                    content: hint.content()?,
                })
            })
            .collect()
    }

    fn proxy_env(&self) -> Vec<String> {
        let mut env = Vec::new();
        if let Some(proxy) = self.setting(|c| c.bootstrap_proxy.clone()) {
            env.push(format!("http_proxy={proxy}"));
            env.push(format!("https_proxy={proxy}"));
        }
        if let Some(no_proxy) = self.setting(|c| c.bootstrap_no_proxy.clone()) {
            env.push(format!("no_proxy={no_proxy}"));
        }
        env
    }

    fn install_url(&self) -> String {
        let version = self.setting(|c| c.bootstrap_version.clone());
        if self.os.is_windows() {
            self.setting(|c| c.msi_url.clone()).unwrap_or_else(|| match version {
                Some(version) => format!("{DEFAULT_MSI_URL}&v={version}"),
                None => DEFAULT_MSI_URL.to_string(),
            })
        } else {
            self.setting(|c| c.bootstrap_url.clone())
                .unwrap_or_else(|| DEFAULT_INSTALL_URL.to_string())
        }
    }

    fn read_key(path: &Path, what: &str) -> Result<String> {
        std::fs::read_to_string(path).map_err(|e| {
            BootstrapError::Config(format!("Cannot read {what} {}: {e}", path.display()))
        })
    }

    /// Compute every template variable
    pub fn template_vars(&self) -> Result<TemplateVars> {
        let (client_d_dirs, client_d) = self.client_d()?;
        let validation_key = match self.layers.validation_key_path() {
            Some(path) => Some(Self::read_key(&path, "validation key")?),
            None => None,
        };
        let client_pem = match &self.client_key {
            Some(path) => Some(Self::read_key(path, "client key")?),
            None => None,
        };

        Ok(TemplateVars {
            config_content: self.config_content()?,
            first_boot: self.first_boot()?,
            start_command: self.start_command(),
            node_name: self.request.node_name.clone(),
            install_command: self.setting(|c| c.bootstrap_install_command.clone()),
            install_url: self.install_url(),
            version: self.setting(|c| c.bootstrap_version.clone()),
            curl_options: self.setting(|c| c.bootstrap_curl_options.clone()),
            wget_options: self.setting(|c| c.bootstrap_wget_options.clone()),
            preinstall_command: self.setting(|c| c.bootstrap_preinstall_command.clone()),
            proxy_env: self.proxy_env(),
            validation_key,
            client_pem,
            encrypted_data_bag_secret: self.request.encrypted_secret()?,
            trusted_certs: self.trusted_certs()?,
            client_d_dirs,
            client_d,
            hints: self.hints()?,
        })
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Double-quoted Ruby string literal
fn ruby_string(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}
