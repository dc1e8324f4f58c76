//! Version information for chef-bootstrap

/// Get the current version string
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Get the long version string with build information
///
/// Returns version plus build metadata when available (git commit, build date).
pub fn get_version_long() -> String {
    // Set by CI when building release artifacts
    let git_hash = option_env!("CHEF_BOOTSTRAP_GIT_HASH").unwrap_or("unknown");
    let build_date = option_env!("CHEF_BOOTSTRAP_BUILD_DATE").unwrap_or("unknown");

    format!("{} (git: {git_hash}, built: {build_date})", get_version())
}
