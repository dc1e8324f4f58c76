//! CLI command implementations

mod bootstrap;
mod template;

pub use bootstrap::{BootstrapArgs, cmd_bootstrap};
pub use template::{TemplateArgs, cmd_template};
