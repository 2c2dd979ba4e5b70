//! Device access tokens.

use std::collections::HashMap;
use std::path::Path;

use tracing::info;

use crate::SinkError;

/// Tokens presented to the remote platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// One token shared by every device.
    Single(String),
    /// One token per device id.
    PerDevice(HashMap<String, String>),
}

impl Credentials {
    /// Reads a JSON object `{ "<device_id>": "<token>", ... }`.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SinkError::Credentials(format!("{}: {e}", path.display())))?;
        let tokens: HashMap<String, String> = serde_json::from_str(&raw)
            .map_err(|e| SinkError::Credentials(format!("{}: {e}", path.display())))?;
        info!("Loaded {} device tokens from {}", tokens.len(), path.display());
        Ok(Credentials::PerDevice(tokens))
    }

    pub fn for_device(&self, device_id: &str) -> Result<&str, SinkError> {
        match self {
            Credentials::Single(token) => Ok(token),
            Credentials::PerDevice(tokens) => tokens
                .get(device_id)
                .map(String::as_str)
                .ok_or_else(|| SinkError::MissingCredential(device_id.to_string())),
        }
    }

    pub fn is_per_device(&self) -> bool {
        matches!(self, Credentials::PerDevice(_))
    }

    /// Device ids with a token, sorted. Empty for a shared token.
    pub fn device_ids(&self) -> Vec<&str> {
        match self {
            Credentials::Single(_) => Vec::new(),
            Credentials::PerDevice(tokens) => {
                let mut ids: Vec<_> = tokens.keys().map(String::as_str).collect();
                ids.sort_unstable();
                ids
            }
        }
    }
}
