//! Templates compiled into the binary

/// A template shipped with the tool
#[derive(Debug, PartialEq, Eq)]
pub struct BuiltinTemplate {
    pub name: &'static str,
    pub content: &'static str,
}

/// Default for Unix-like targets
pub const UNIX_DEFAULT_TEMPLATE: &str = "chef-full";

/// Default for Windows targets
pub const WINDOWS_DEFAULT_TEMPLATE: &str = "windows-chef-client-msi";

pub static BUILTIN_TEMPLATES: &[BuiltinTemplate] = &[
    BuiltinTemplate {
        name: UNIX_DEFAULT_TEMPLATE,
        content: include_str!("../../templates/chef-full.tera"),
    },
    BuiltinTemplate {
        name: WINDOWS_DEFAULT_TEMPLATE,
        content: include_str!("../../templates/windows-chef-client-msi.tera"),
    },
];

pub fn find(name: &str) -> Option<&'static BuiltinTemplate> {
    BUILTIN_TEMPLATES.iter().find(|template| template.name == name)
}
