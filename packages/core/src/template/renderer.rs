//! Template rendering using Tera
//!
//! Rendering is a pure function of the template source and the context.
//! Templates see every field of [`TemplateVars`] plus the `batch_echo`
//! filter for writing text from a Windows batch file.

use std::collections::HashMap;

use tera::{Context, Tera, Value};

use super::TemplateSource;
use super::context::BootstrapContext;
use crate::error::{BootstrapError, Result};

pub struct TemplateRenderer {
    tera: Tera,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer {
    pub fn new() -> Self {
        let mut tera = Tera::default();
        tera.autoescape_on(Vec::new());
        tera.register_filter("batch_echo", batch_echo);
        Self { tera }
    }

    /// Render `source` with the variables computed from `context`
    pub fn render(&mut self, source: &TemplateSource, context: &BootstrapContext<'_>) -> Result<String> {
        let name = source.name();
        let content = source.read()?;
        let vars = context.template_vars()?;

        let render_error = |e: tera::Error| BootstrapError::Render {
            template: name.clone(),
            message: describe(&e),
        };

        self.tera
            .add_raw_template(&name, &content)
            .map_err(render_error)?;
        let tera_context = Context::from_serialize(&vars).map_err(render_error)?;
        let rendered = self.tera.render(&name, &tera_context).map_err(render_error)?;

        tracing::debug!(
            "[TemplateRenderer] Rendered template {} ({} bytes)",
            source,
            rendered.len()
        );
        Ok(rendered)
    }
}

/// Render with a fresh renderer
pub fn render(source: &TemplateSource, context: &BootstrapContext<'_>) -> Result<String> {
    TemplateRenderer::new().render(source, context)
}

/// Tera only prints the outermost error, the cause is in the source chain
fn describe(err: &tera::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Turn text into `echo.` lines, escaping cmd.exe metacharacters
fn batch_echo(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let text = value
        .as_str()
        .ok_or_else(|| tera::Error::msg("batch_echo expects a string"))?;

    let lines: Vec<String> = text
        .lines()
        .map(|line| {
            let mut escaped = String::with_capacity(line.len() + 5);
            escaped.push_str("echo.");
            for ch in line.chars() {
                match ch {
                    '%' => escaped.push_str("%%"),
                    '^' | '&' | '|' | '<' | '>' | '(' | ')' => {
                        escaped.push('^');
                        escaped.push(ch);
                    }
                    _ => escaped.push(ch),
                }
            }
            escaped
        })
        .collect();
    Ok(Value::from(lines.join("\r\n")))
}
