//! Path resolution for chef-bootstrap
//!
//! Follows the layout the Chef tooling already uses on workstations:
//! - per-user settings and templates under `~/.chef/`
//! - system-wide settings under `/etc/chef/` (`C:\chef\` on Windows)

use std::path::PathBuf;

/// Get the invoking user's home directory
pub fn get_home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}

/// Get the per-user configuration directory
///
/// Returns `~/.chef/`, or None when no home directory can be resolved.
pub fn get_config_dir() -> Option<PathBuf> {
    get_home_dir().map(|home| home.join(".chef"))
}

/// Get the full path to the config file
///
/// Returns: `{config_dir}/bootstrap.json`
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|d| d.join("bootstrap.json"))
}

/// Get the per-user template directory
///
/// Returns: `{config_dir}/bootstrap`
pub fn get_user_template_dir() -> Option<PathBuf> {
    get_config_dir().map(|d| d.join("bootstrap"))
}

/// Get the default system configuration directory
pub fn default_system_config_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        PathBuf::from(r"C:\chef")
    }
    #[cfg(not(target_os = "windows"))]
    {
        PathBuf::from("/etc/chef")
    }
}

/// Expand a leading `~/` to the home directory
///
/// Paths without the prefix, or when no home directory exists, are returned
/// unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), get_home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir_ends_with_dot_chef() {
        let dir = get_config_dir();
        assert!(dir.is_some());
        assert!(dir.unwrap().ends_with(".chef"));
    }

    #[test]
    fn test_config_path_ends_with_bootstrap_json() {
        let path = get_config_path();
        assert!(path.is_some());
        assert!(path.unwrap().ends_with("bootstrap.json"));
    }

    #[test]
    fn test_user_template_dir() {
        let path = get_user_template_dir().unwrap();
        assert!(path.ends_with(".chef/bootstrap"));
    }

    #[test]
    fn test_expand_home() {
        let expanded = expand_home("~/.ssh/id_rsa");
        assert!(expanded.ends_with(".ssh/id_rsa"));
        assert!(!expanded.to_string_lossy().starts_with('~'));

        assert_eq!(expand_home("/etc/chef/key.pem"), PathBuf::from("/etc/chef/key.pem"));
    }
}
