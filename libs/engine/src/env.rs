//! The application's environment file on each host.

use std::collections::BTreeMap;

use upfleet_provider::RemoteCommand;

use crate::error::EngineError;
use crate::provision::APP_DIR;
use crate::remote::Remote;

/// Parsed `KEY=value` pairs, kept sorted by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvFile {
    entries: BTreeMap<String, String>,
}

impl EnvFile {
    pub fn parse(contents: &str) -> Result<Self, EngineError> {
        let entries = dotenvy::from_read_iter(contents.as_bytes())
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map_err(|e| EngineError::Inconsistency(format!("malformed environment file: {e}")))?;
        Ok(Self { entries })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sets `key`, returning the previous value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<Option<String>, EngineError> {
        validate_key(key)?;
        if value.contains(['\n', '\r']) {
            return Err(EngineError::config(format!(
                "value of {key} must be a single line"
            )));
        }
        Ok(self.entries.insert(key.to_string(), value.to_string()))
    }

    pub fn unset(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    /// Renders the file, quoting values that need it.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!("{k}={}\n", quote(v)))
            .collect()
    }

    /// Reads the file from a host; a missing file is empty.
    pub(crate) async fn read(remote: &mut Remote) -> Result<Self, EngineError> {
        let output = remote
            .exec(&RemoteCommand::new(format!(
                "cat ~/{APP_DIR}/.env 2>/dev/null || true"
            )))
            .await?;
        Self::parse(&output.stdout)
    }

    pub(crate) async fn write(&self, remote: &mut Remote) -> Result<(), EngineError> {
        remote
            .write(&format!("{APP_DIR}/.env"), self.render().as_bytes())
            .await
    }
}

/// A single edit applied to every host's file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvChange {
    Set { key: String, value: String },
    Unset { key: String },
}

impl EnvChange {
    pub(crate) fn apply(&self, file: &mut EnvFile) -> Result<(), EngineError> {
        match self {
            Self::Set { key, value } => file.set(key, value).map(|_| ()),
            Self::Unset { key } => {
                file.unset(key);
                Ok(())
            }
        }
    }
}

fn validate_key(key: &str) -> Result<(), EngineError> {
    let mut chars = key.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(EngineError::config(format!(
            "invalid environment variable name {key:?}"
        )))
    }
}

/// Double-quoted values escape `\\`, `"` and `$`; an unescaped `$` would be
/// read back as a substitution. `assets/bootstrap.js` undoes the same set.
fn quote(value: &str) -> String {
    let plain = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "_-./:@,+".contains(c));
    if plain {
        value.to_string()
    } else if !value.contains('\'') {
        format!("'{value}'")
    } else {
        let escaped = value
            .replace('\\', "\\\\")
            .replace('"', "\\\"")
            .replace('$', "\\$");
        format!("\"{escaped}\"")
    }
}
