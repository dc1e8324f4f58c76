//! Per-run node inputs
//!
//! Everything about the node being bootstrapped that does not come from the
//! layered settings: host, run-list or policy, first-boot attributes, tags,
//! hints and the encrypted data bag secret.

use std::path::PathBuf;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::error::{BootstrapError, Result};

/// An Ohai hint: a name and an optional inline JSON value or file path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hint {
    pub name: String,
    pub value: Option<String>,
}

impl FromStr for Hint {
    type Err = BootstrapError;

    /// Parse `NAME` or `NAME=VALUE`
    fn from_str(s: &str) -> Result<Self> {
        let (name, value) = match s.split_once('=') {
            Some((name, value)) => (name, Some(value.to_string())),
            None => (s, None),
        };
        if name.trim().is_empty() {
            return Err(BootstrapError::InvalidHint {
                name: s.to_string(),
                message: "hint name is empty".to_string(),
            });
        }
        Ok(Self {
            name: name.trim().to_string(),
            value,
        })
    }
}

impl Hint {
    /// JSON text written to `<name>.json` on the node
    ///
    /// No value gives `{}`. Inline JSON is used as given; any other value is
    /// read as a file and must contain JSON.
    pub fn content(&self) -> Result<String> {
        let Some(value) = &self.value else {
            return Ok("{}".to_string());
        };

        if let Ok(json) = serde_json::from_str::<Value>(value) {
            return Ok(json.to_string());
        }

        let text = std::fs::read_to_string(value).map_err(|e| BootstrapError::InvalidHint {
            name: self.name.clone(),
            message: format!("{value} is neither JSON nor a readable file: {e}"),
        })?;
        serde_json::from_str::<Value>(&text).map_err(|e| BootstrapError::InvalidHint {
            name: self.name.clone(),
            message: format!("{value} does not contain valid JSON: {e}"),
        })?;
        Ok(text)
    }
}

/// Node settings for one bootstrap run
#[derive(Debug, Clone, Default)]
pub struct BootstrapRequest {
    /// Host descriptor: `[scheme://][user@]host[:port]`
    pub host: Option<String>,
    /// None when not given; an explicitly empty run-list is `Some(vec![])`
    pub run_list: Option<Vec<String>>,
    pub json_attributes: Option<String>,
    pub json_attribute_file: Option<PathBuf>,
    pub policy_name: Option<String>,
    pub policy_group: Option<String>,
    pub tags: Vec<String>,
    pub hints: Vec<Hint>,
    pub secret: Option<String>,
    pub secret_file: Option<PathBuf>,
    pub node_name: Option<String>,
    pub environment: Option<String>,
}

impl BootstrapRequest {
    pub fn run_list(&self) -> &[String] {
        self.run_list.as_deref().unwrap_or_default()
    }

    /// Policy name and group, when both are set
    pub fn policy(&self) -> Option<(&str, &str)> {
        match (&self.policy_name, &self.policy_group) {
            (Some(name), Some(group)) => Some((name, group)),
            _ => None,
        }
    }

    /// Parse the user-supplied first-boot attributes
    ///
    /// Inline JSON and an attribute file are mutually exclusive. With
    /// neither the result is an empty object.
    pub fn first_boot_attributes(&self) -> Result<Map<String, Value>> {
        let (text, origin) = match (&self.json_attributes, &self.json_attribute_file) {
            (Some(_), Some(_)) => return Err(BootstrapError::AttributeInputConflict),
            (Some(inline), None) => (inline.clone(), "--json-attributes".to_string()),
            (None, Some(path)) => (
                std::fs::read_to_string(path).map_err(|e| {
                    BootstrapError::InvalidAttributes(format!("{}: {e}", path.display()))
                })?,
                path.display().to_string(),
            ),
            (None, None) => return Ok(Map::new()),
        };

        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(BootstrapError::InvalidAttributes(format!(
                "{origin} must be a JSON object"
            ))),
            Err(e) => Err(BootstrapError::InvalidAttributes(format!("{origin}: {e}"))),
        }
    }

    /// Encrypted data bag secret from the inline value or the secret file
    pub fn encrypted_secret(&self) -> Result<Option<String>> {
        if let Some(secret) = &self.secret {
            return Ok(Some(secret.clone()));
        }
        match &self.secret_file {
            Some(path) => Ok(Some(std::fs::read_to_string(path)?.trim().to_string())),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_hint_parse() {
        let hint: Hint = "ec2".parse().unwrap();
        assert_eq!(hint.name, "ec2");
        assert_eq!(hint.value, None);

        let hint: Hint = "azure=/tmp/azure.json".parse().unwrap();
        assert_eq!(hint.name, "azure");
        assert_eq!(hint.value.as_deref(), Some("/tmp/azure.json"));

        assert!("=value".parse::<Hint>().is_err());
    }

    #[test]
    fn test_hint_content() {
        let hint: Hint = "ec2".parse().unwrap();
        assert_eq!(hint.content().unwrap(), "{}");

        let hint = Hint {
            name: "gce".to_string(),
            value: Some(r#"{"project": "acme"}"#.to_string()),
        };
        assert_eq!(hint.content().unwrap(), r#"{"project":"acme"}"#);

        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("azure.json");
        fs::write(&file, "{\n  \"vm\": \"a1\"\n}\n").unwrap();
        let hint = Hint {
            name: "azure".to_string(),
            value: Some(file.to_string_lossy().to_string()),
        };
        assert_eq!(hint.content().unwrap(), "{\n  \"vm\": \"a1\"\n}\n");
    }

    #[test]
    fn test_hint_content_invalid() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("bad.json");
        fs::write(&file, "not json").unwrap();
        let hint = Hint {
            name: "bad".to_string(),
            value: Some(file.to_string_lossy().to_string()),
        };
        assert!(matches!(
            hint.content(),
            Err(BootstrapError::InvalidHint { .. })
        ));

        let hint = Hint {
            name: "gone".to_string(),
            value: Some(tmp.path().join("missing.json").to_string_lossy().to_string()),
        };
        assert!(hint.content().is_err());
    }

    #[test]
    fn test_first_boot_attributes_sources() {
        assert!(BootstrapRequest::default().first_boot_attributes().unwrap().is_empty());

        let request = BootstrapRequest {
            json_attributes: Some(r#"{"nginx": {"port": 8080}}"#.to_string()),
            ..Default::default()
        };
        let attrs = request.first_boot_attributes().unwrap();
        assert_eq!(attrs["nginx"]["port"], 8080);

        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("attrs.json");
        fs::write(&file, r#"{"role": "web"}"#).unwrap();
        let request = BootstrapRequest {
            json_attribute_file: Some(file),
            ..Default::default()
        };
        assert_eq!(request.first_boot_attributes().unwrap()["role"], "web");
    }

    #[test]
    fn test_first_boot_attributes_conflict() {
        let request = BootstrapRequest {
            json_attributes: Some("{}".to_string()),
            json_attribute_file: Some(PathBuf::from("/tmp/attrs.json")),
            ..Default::default()
        };
        assert!(matches!(
            request.first_boot_attributes(),
            Err(BootstrapError::AttributeInputConflict)
        ));
    }

    #[test]
    fn test_first_boot_attributes_must_be_object() {
        for bad in ["[1, 2]", "{nope", "\"text\""] {
            let request = BootstrapRequest {
                json_attributes: Some(bad.to_string()),
                ..Default::default()
            };
            assert!(
                matches!(
                    request.first_boot_attributes(),
                    Err(BootstrapError::InvalidAttributes(_))
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_encrypted_secret() {
        assert_eq!(BootstrapRequest::default().encrypted_secret().unwrap(), None);

        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("secret");
        fs::write(&file, "s3cr3t\n").unwrap();
        let request = BootstrapRequest {
            secret_file: Some(file),
            ..Default::default()
        };
        assert_eq!(request.encrypted_secret().unwrap().as_deref(), Some("s3cr3t"));
    }

    #[test]
    fn test_policy_requires_both() {
        let request = BootstrapRequest {
            policy_name: Some("web".to_string()),
            ..Default::default()
        };
        assert_eq!(request.policy(), None);

        let request = BootstrapRequest {
            policy_name: Some("web".to_string()),
            policy_group: Some("prod".to_string()),
            ..Default::default()
        };
        assert_eq!(request.policy(), Some(("web", "prod")));
    }
}
