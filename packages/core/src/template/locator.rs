//! Template lookup
//!
//! A template name resolves to the first existing candidate across an
//! ordered list of search strategies. Candidates are produced lazily, so
//! lookup stops at the first hit.

use std::path::{Path, PathBuf};

use super::{TEMPLATE_EXTENSION, TemplateSource, builtin};
use crate::config::ConfigLayers;
use crate::config::paths::{default_system_config_dir, expand_home, get_user_template_dir};
use crate::error::{BootstrapError, Result};
use crate::transport::OsFamily;

/// Name of the template used when none is requested
pub fn default_template_name(os: OsFamily) -> &'static str {
    if os.is_windows() {
        builtin::WINDOWS_DEFAULT_TEMPLATE
    } else {
        builtin::UNIX_DEFAULT_TEMPLATE
    }
}

/// One place a template may live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchStrategy {
    /// Templates compiled into the binary
    Builtin,
    /// `<dir>/<name>.tera`
    Directory { label: &'static str, dir: PathBuf },
    /// `<root>/*/bootstrap/templates/<name>.tera` for every plugin root
    Plugins(Vec<PathBuf>),
}

/// A location checked during lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub strategy: &'static str,
    pub source: TemplateSource,
    pub exists: bool,
}

impl SearchStrategy {
    pub fn label(&self) -> &'static str {
        match self {
            SearchStrategy::Builtin => "built-in",
            SearchStrategy::Directory { label, .. } => label,
            SearchStrategy::Plugins(_) => "plugin",
        }
    }

    /// Candidate sources for `name` in search order
    fn candidates<'a>(&'a self, name: &'a str) -> Box<dyn Iterator<Item = TemplateSource> + 'a> {
        let file_name = format!("{name}.{TEMPLATE_EXTENSION}");
        match self {
            SearchStrategy::Builtin => {
                Box::new(builtin::find(name).map(TemplateSource::Builtin).into_iter())
            }
            SearchStrategy::Directory { dir, .. } => {
                Box::new(std::iter::once(TemplateSource::File(dir.join(file_name))))
            }
            SearchStrategy::Plugins(roots) => Box::new(
                roots
                    .iter()
                    .flat_map(move |root| plugin_matches(root, &file_name))
                    .map(TemplateSource::File),
            ),
        }
    }
}

fn plugin_matches(root: &Path, file_name: &str) -> Vec<PathBuf> {
    let pattern = format!(
        "{}/*/bootstrap/templates/{}",
        glob::Pattern::escape(&root.to_string_lossy()),
        glob::Pattern::escape(file_name)
    );
    match glob::glob(&pattern) {
        Ok(paths) => paths.filter_map(std::result::Result::ok).collect(),
        Err(e) => {
            tracing::warn!("Skipping plugin path {}: {}", root.display(), e);
            Vec::new()
        }
    }
}

fn source_exists(source: &TemplateSource) -> bool {
    match source {
        TemplateSource::Builtin(_) => true,
        TemplateSource::File(path) => path.is_file(),
    }
}

/// Does `name` read as a file path rather than a bare template name
fn looks_like_path(name: &str) -> bool {
    name.contains('/')
        || name.contains(std::path::MAIN_SEPARATOR)
        || name.ends_with(&format!(".{TEMPLATE_EXTENSION}"))
        || name.starts_with('~')
}

/// Resolves template names to sources
#[derive(Debug, Clone)]
pub struct TemplateLocator {
    strategies: Vec<SearchStrategy>,
}

impl TemplateLocator {
    pub fn new(strategies: Vec<SearchStrategy>) -> Self {
        Self { strategies }
    }

    /// Standard search order: built-in, system config dir, user home, plugins
    pub fn from_layers(layers: &ConfigLayers) -> Self {
        let system_dir = layers
            .lookup(|c| c.system_config_dir.clone())
            .map(|dir| expand_home(&dir))
            .unwrap_or_else(default_system_config_dir);

        let mut strategies = vec![
            SearchStrategy::Builtin,
            SearchStrategy::Directory {
                label: "system",
                dir: system_dir.join("bootstrap"),
            },
        ];
        if let Some(dir) = get_user_template_dir() {
            strategies.push(SearchStrategy::Directory { label: "user", dir });
        }
        strategies.push(SearchStrategy::Plugins(
            layers
                .plugin_paths()
                .iter()
                .map(|path| expand_home(path))
                .collect(),
        ));

        Self::new(strategies)
    }

    pub fn strategies(&self) -> &[SearchStrategy] {
        &self.strategies
    }

    /// Resolve `name` to the first existing template
    ///
    /// A name that is an existing file is used as is. A name that looks like
    /// a path but does not exist fails without searching.
    pub fn locate(&self, name: &str) -> Result<TemplateSource> {
        let direct = expand_home(name);
        if direct.is_file() {
            tracing::debug!("Using the specified bootstrap template: {}", direct.display());
            return Ok(TemplateSource::File(direct));
        }
        if looks_like_path(name) {
            return Err(BootstrapError::TemplateNotFound(name.to_string()));
        }

        self.strategies
            .iter()
            .flat_map(|strategy| strategy.candidates(name))
            .find(|source| {
                tracing::trace!("Looking for bootstrap template at {}", source);
                source_exists(source)
            })
            .inspect(|source| tracing::debug!("Found bootstrap template {}", source))
            .ok_or_else(|| BootstrapError::TemplateNotFound(name.to_string()))
    }

    /// Every location checked for `name`, in order, with whether it exists
    pub fn candidates(&self, name: &str) -> Vec<Candidate> {
        self.strategies
            .iter()
            .flat_map(|strategy| {
                strategy.candidates(name).map(move |source| Candidate {
                    strategy: strategy.label(),
                    exists: source_exists(&source),
                    source,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_template(dir: &Path, name: &str) -> PathBuf {
        fs::create_dir_all(dir).unwrap();
        let path = dir.join(format!("{name}.tera"));
        fs::write(&path, "echo {{ node_name }}").unwrap();
        path
    }

    #[test]
    fn test_default_template_name() {
        assert_eq!(default_template_name(OsFamily::Windows), "windows-chef-client-msi");
        assert_eq!(default_template_name(OsFamily::Linux), "chef-full");
        assert_eq!(default_template_name(OsFamily::Other), "chef-full");
    }

    #[test]
    fn test_builtin_wins_over_directories() {
        let tmp = TempDir::new().unwrap();
        write_template(tmp.path(), "chef-full");
        let locator = TemplateLocator::new(vec![
            SearchStrategy::Builtin,
            SearchStrategy::Directory {
                label: "user",
                dir: tmp.path().to_path_buf(),
            },
        ]);

        let source = locator.locate("chef-full").unwrap();
        assert!(matches!(source, TemplateSource::Builtin(t) if t.name == "chef-full"));
    }

    #[test]
    fn test_directory_order() {
        let system = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        let in_user = write_template(user.path(), "custom");
        let locator = TemplateLocator::new(vec![
            SearchStrategy::Builtin,
            SearchStrategy::Directory {
                label: "system",
                dir: system.path().to_path_buf(),
            },
            SearchStrategy::Directory {
                label: "user",
                dir: user.path().to_path_buf(),
            },
        ]);
        assert_eq!(locator.locate("custom").unwrap(), TemplateSource::File(in_user));

        let in_system = write_template(system.path(), "custom");
        assert_eq!(locator.locate("custom").unwrap(), TemplateSource::File(in_system));
    }

    #[test]
    fn test_plugin_glob() {
        let plugins = TempDir::new().unwrap();
        let expected = write_template(
            &plugins.path().join("knife-acme").join("bootstrap").join("templates"),
            "acme",
        );
        let locator = TemplateLocator::new(vec![SearchStrategy::Plugins(vec![
            plugins.path().to_path_buf(),
        ])]);
        assert_eq!(locator.locate("acme").unwrap(), TemplateSource::File(expected));
    }

    #[test]
    fn test_existing_path_used_directly() {
        let tmp = TempDir::new().unwrap();
        let path = write_template(tmp.path(), "mine");
        let locator = TemplateLocator::new(vec![SearchStrategy::Builtin]);
        let source = locator.locate(path.to_str().unwrap()).unwrap();
        assert_eq!(source, TemplateSource::File(path));
    }

    #[test]
    fn test_missing_path_does_not_search() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("chef-full.tera");
        let locator = TemplateLocator::new(vec![SearchStrategy::Builtin]);
        let err = locator.locate(missing.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, BootstrapError::TemplateNotFound(_)));
    }

    #[test]
    fn test_not_found_message() {
        let locator = TemplateLocator::new(vec![SearchStrategy::Builtin]);
        let err = locator.locate("nope").unwrap_err();
        assert_eq!(err.to_string(), "Can not find bootstrap template named nope");
    }

    #[test]
    fn test_candidates_report_existence() {
        let tmp = TempDir::new().unwrap();
        write_template(tmp.path(), "chef-full");
        let locator = TemplateLocator::new(vec![
            SearchStrategy::Builtin,
            SearchStrategy::Directory {
                label: "user",
                dir: tmp.path().to_path_buf(),
            },
            SearchStrategy::Directory {
                label: "system",
                dir: tmp.path().join("absent"),
            },
        ]);

        let candidates = locator.candidates("chef-full");
        let summary: Vec<(&str, bool)> = candidates.iter().map(|c| (c.strategy, c.exists)).collect();
        assert_eq!(summary, vec![("built-in", true), ("user", true), ("system", false)]);
    }

    #[test]
    fn test_from_layers_order() {
        let locator = TemplateLocator::from_layers(&ConfigLayers::default());
        let labels: Vec<&str> = locator.strategies().iter().map(SearchStrategy::label).collect();
        assert_eq!(labels.first(), Some(&"built-in"));
        assert_eq!(labels.get(1), Some(&"system"));
        assert_eq!(labels.last(), Some(&"plugin"));
    }
}
