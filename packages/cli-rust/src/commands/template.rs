//! Template subcommand implementations
//!
//! `template locate` shows where a bootstrap template is read from;
//! `template render` prints the script a bootstrap would upload.

use anyhow::Result;
use chef_bootstrap_core::template::default_template_name;
use chef_bootstrap_core::{
    Bootstrap, Config, ConfigLayers, NoPrompt, OsFamily, ProtocolConnector, TemplateLocator,
};
use clap::{Args, Subcommand};
use comfy_table::{Cell, Color, Table};
use console::style;

use super::BootstrapArgs;

/// Template command arguments
#[derive(Args)]
pub struct TemplateArgs {
    #[command(subcommand)]
    command: TemplateSubcommands,
}

#[derive(Subcommand)]
pub enum TemplateSubcommands {
    /// Show which file a template name resolves to
    Locate {
        /// Template name or path (defaults to the template for the target OS)
        name: Option<String>,

        /// Resolve the default name for Windows targets
        #[arg(long)]
        windows: bool,

        /// List every location searched, not just the match
        #[arg(long)]
        all: bool,
    },
    /// Render a bootstrap script locally without connecting
    Render {
        /// Render for a Windows target
        #[arg(long)]
        windows: bool,

        #[command(flatten)]
        args: BootstrapArgs,
    },
}

fn target_os(windows: bool) -> OsFamily {
    if windows {
        OsFamily::Windows
    } else {
        OsFamily::Linux
    }
}

/// Handle template command
pub fn cmd_template(args: TemplateArgs, file: &Config, quiet: bool) -> Result<()> {
    match args.command {
        TemplateSubcommands::Locate { name, windows, all } => {
            let name = name.unwrap_or_else(|| default_template_name(target_os(windows)).to_string());
            cmd_template_locate(&name, file, all, quiet)
        }
        TemplateSubcommands::Render { windows, args } => {
            let connector = ProtocolConnector::new();
            let bootstrap = Bootstrap::new(args.request(), args.layers(file), &connector, &NoPrompt);
            print!("{}", bootstrap.preview(target_os(windows))?);
            Ok(())
        }
    }
}

fn cmd_template_locate(name: &str, file: &Config, all: bool, quiet: bool) -> Result<()> {
    let layers = ConfigLayers::new(Config::new(), file.clone());
    let locator = TemplateLocator::from_layers(&layers);

    if !all {
        let source = locator.locate(name)?;
        println!("{source}");
        return Ok(());
    }

    let candidates = locator.candidates(name);
    if candidates.is_empty() {
        if !quiet {
            println!("No locations to search for template '{}'.", style(name).cyan());
        }
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Source", "Location", "Exists"]);
    let mut chosen = false;
    for candidate in candidates {
        let location = candidate.source.to_string();
        let location = if candidate.exists && !chosen {
            chosen = true;
            Cell::new(location).fg(Color::Green)
        } else {
            Cell::new(location)
        };
        table.add_row(vec![
            Cell::new(candidate.strategy),
            location,
            Cell::new(if candidate.exists { "yes" } else { "no" }),
        ]);
    }
    println!("{table}");
    Ok(())
}
