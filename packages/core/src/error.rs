//! Bootstrap error types
//!
//! Errors that can occur while validating, connecting to, rendering for, or
//! executing on a bootstrap target.

use thiserror::Error;

/// Result type alias for bootstrap operations
pub type Result<T> = std::result::Result<T, BootstrapError>;

/// Errors that can occur during a bootstrap run
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// No host was given on the command line
    #[error("You must pass a HOST (a hostname, IP address or protocol://host) to bootstrap")]
    MissingHost,

    /// The host's embedded scheme and --connection-protocol disagree
    #[error(
        "The URL '{host}' indicates protocol is '{url_protocol}' while the --connection-protocol flag specifies '{cli_protocol}'. Please include only one or the other."
    )]
    ProtocolConflict {
        host: String,
        url_protocol: String,
        cli_protocol: String,
    },

    /// Resolved protocol is not one we can bootstrap over
    #[error("Unsupported protocol '{0}'. Supported protocols are: ssh, winrm")]
    UnsupportedProtocol(String),

    /// Inline JSON attributes and a JSON attribute file were both given
    #[error("You cannot pass both --json-attributes and --json-attribute-file.")]
    AttributeInputConflict,

    /// First-boot attributes could not be read or are not a JSON object
    #[error("Invalid first-boot attributes: {0}")]
    InvalidAttributes(String),

    /// Policy name/group mismatch, or policy options combined with a run-list
    #[error("{0}")]
    PolicyOptionConflict(String),

    /// Validatorless bootstrap over an unencrypted WinRM channel
    #[error(
        "Validatorless bootstrap over unsecure winrm channels could expose your key to network sniffing. Please use a 'winrm_auth_method' other than 'plaintext', or enable ssl on {host} then use the --winrm-ssl flag to connect."
    )]
    InsecureWinrmTransport { host: String },

    /// Gateway string did not match `[user@]host[:port]`
    #[error("Invalid gateway '{0}': expected [user@]host[:port]")]
    InvalidGateway(String),

    /// No candidate template location existed
    #[error("Can not find bootstrap template named {0}")]
    TemplateNotFound(String),

    /// Template engine failure
    #[error("Failed to render template {template}: {message}")]
    Render { template: String, message: String },

    /// `ssl_verify_mode` outside the two recognised symbols
    #[error("Invalid SSL verify mode '{0}': expected 'none' or 'peer'")]
    InvalidSslVerifyMode(String),

    /// Hint value is neither valid JSON nor a readable JSON file
    #[error("Invalid hint '{name}': {message}")]
    InvalidHint { name: String, message: String },

    /// The transport rejected our credentials
    #[error("Authentication failed for {user}@{host}: {message}")]
    AuthenticationFailure {
        user: String,
        host: String,
        message: String,
    },

    /// Any other transport failure, passed through verbatim
    #[error("{0}")]
    Transport(String),

    /// The bootstrap script exited non-zero
    #[error("The following error occurred on {host}: {stderr} (exit status {status})")]
    RemoteExecutionFailure {
        host: String,
        status: i32,
        stderr: String,
    },

    /// Local client identity could not be materialised
    #[error("Client registration failed: {0}")]
    Registration(String),

    /// Settings could not be loaded or are inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BootstrapError {
    /// Check whether this error is a credential rejection
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, BootstrapError::AuthenticationFailure { .. })
    }

    /// Remote exit status, when the error came from the bootstrap script
    pub fn exit_status(&self) -> Option<i32> {
        match self {
            BootstrapError::RemoteExecutionFailure { status, .. } => Some(*status),
            _ => None,
        }
    }
}
