//! Bootstrap templates: lookup, context and rendering

pub mod builtin;
pub mod context;
pub mod locator;
pub mod renderer;

use std::fmt;
use std::path::PathBuf;

use crate::error::Result;

pub use builtin::{BuiltinTemplate, UNIX_DEFAULT_TEMPLATE, WINDOWS_DEFAULT_TEMPLATE};
pub use context::{BootstrapContext, TemplateVars};
pub use locator::{Candidate, SearchStrategy, TemplateLocator, default_template_name};
pub use renderer::{TemplateRenderer, render};

/// File extension every template file carries
pub const TEMPLATE_EXTENSION: &str = "tera";

/// Where a located template comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    /// Compiled into the binary
    Builtin(&'static BuiltinTemplate),
    File(PathBuf),
}

impl TemplateSource {
    /// Name used when registering the template with the renderer
    pub fn name(&self) -> String {
        match self {
            TemplateSource::Builtin(template) => {
                format!("{}.{TEMPLATE_EXTENSION}", template.name)
            }
            TemplateSource::File(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        }
    }

    pub fn read(&self) -> Result<String> {
        match self {
            TemplateSource::Builtin(template) => Ok(template.content.to_string()),
            TemplateSource::File(path) => Ok(std::fs::read_to_string(path)?),
        }
    }
}

impl fmt::Display for TemplateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateSource::Builtin(template) => write!(f, "(built-in) {}", template.name),
            TemplateSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}
