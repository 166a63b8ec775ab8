use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use url::Url;

pub const API_KEY_VAR: &str = "DOCUGENERATE_API_KEY";
pub const BASE_URL_VAR: &str = "DOCUGENERATE_BASE_URL";
pub const DEFINITION_VAR: &str = "DOCUGENERATE_DEFINITION";

/// Runtime settings for the connector.
#[derive(Debug, Clone, Default)]
pub struct DocuGenConfig {
    /// Replaces the definition's base URL (e.g. a proxy or a mock server).
    pub base_url: Option<Url>,
    /// YAML definition to load instead of the embedded one.
    pub definition_path: Option<PathBuf>,
}

impl DocuGenConfig {
    /// Reads `DOCUGENERATE_BASE_URL` and `DOCUGENERATE_DEFINITION`.
    ///
    /// Empty variables are treated as unset. The API key is read by
    /// [`crate::credentials::EnvCredentialStore`], not here.
    pub fn from_env() -> Result<Self> {
        let base_url = match non_empty_var(BASE_URL_VAR) {
            Some(raw) => Some(
                Url::parse(&raw).with_context(|| format!("{} is not a valid URL: {}", BASE_URL_VAR, raw))?,
            ),
            None => None,
        };

        Ok(Self {
            base_url,
            definition_path: non_empty_var(DEFINITION_VAR).map(PathBuf::from),
        })
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    pub fn with_definition_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.definition_path = Some(path.into());
        self
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
