use crate::config::API_KEY_VAR;
use crate::error::{DocuGenError, Result};
use crate::integrations::registry::FieldType;
use crate::request::{RequestPlan, resolve_url};
use crate::transport::HttpTransport;
use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::env;
use std::fmt;
use url::Url;

/// Input of the credential form.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CredentialProperty {
    pub name: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Mask in UI.
    #[serde(default)]
    pub password: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub description: String,
}

/// How a stored credential is injected into outgoing requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum AuthDef {
    /// Raw credential property in a header, optionally behind a scheme.
    #[serde(rename = "api_key")]
    ApiKey {
        header: String,
        property: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prefix: Option<String>,
    },
}

/// Request used to check that a credential is accepted.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CredentialTestDef {
    pub method: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CredentialDef {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub documentation_url: Option<String>,
    pub properties: Vec<CredentialProperty>,
    pub auth: AuthDef,
    pub test: CredentialTestDef,
}

impl CredentialDef {
    /// Checks the parts of the definition that are only used at send time.
    pub fn validate(&self) -> Result<()> {
        self.test_method()?;
        if self.test.url.contains('?') {
            return Err(DocuGenError::configuration(format!(
                "credential test url '{}' must not carry a query",
                self.test.url
            )));
        }
        match &self.auth {
            AuthDef::ApiKey {
                header, property, ..
            } => {
                auth_header_name(header)?;
                if !self.properties.iter().any(|p| &p.name == property) {
                    return Err(DocuGenError::configuration(format!(
                        "auth property '{}' is not a property of credential '{}'",
                        property, self.name
                    )));
                }
            }
        }
        Ok(())
    }

    fn test_method(&self) -> Result<Method> {
        Method::from_bytes(self.test.method.to_ascii_uppercase().as_bytes()).map_err(|_| {
            DocuGenError::configuration(format!(
                "credential test method '{}' is invalid",
                self.test.method
            ))
        })
    }

    /// Headers carrying the credential.
    pub fn resolve_auth_headers(&self, data: &CredentialData) -> Result<Vec<(HeaderName, HeaderValue)>> {
        let mut headers = Vec::new();
        match &self.auth {
            AuthDef::ApiKey {
                header,
                property,
                prefix,
            } => {
                let key = data
                    .get(property)
                    .filter(|k| !k.is_empty())
                    .ok_or_else(|| {
                        DocuGenError::Credential(format!(
                            "credential '{}' has no '{}'",
                            self.name, property
                        ))
                    })?;
                let raw = match prefix {
                    Some(scheme) => format!("{} {}", scheme, key),
                    None => key.to_string(),
                };
                let name = auth_header_name(header)?;
                let mut value = HeaderValue::from_str(&raw).map_err(|_| {
                    DocuGenError::Credential(format!(
                        "credential '{}' cannot be sent as a header",
                        self.name
                    ))
                })?;
                value.set_sensitive(true);
                headers.push((name, value));
            }
        }
        Ok(headers)
    }

    /// Injects the credential into a built plan.
    pub fn authenticate(&self, data: &CredentialData, plan: &mut RequestPlan) -> Result<()> {
        for (name, value) in self.resolve_auth_headers(data)? {
            plan.headers.insert(name, value);
        }
        Ok(())
    }

    /// The unauthenticated liveness request.
    pub fn test_plan(&self, base_url: &Url) -> Result<RequestPlan> {
        let method = self.test_method()?;
        let url = resolve_url(base_url, &self.test.url, &HashMap::new())?;
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        Ok(RequestPlan {
            method,
            url,
            headers,
            body: None,
        })
    }
}

fn auth_header_name(header: &str) -> Result<HeaderName> {
    HeaderName::from_bytes(header.as_bytes())
        .map_err(|_| DocuGenError::configuration(format!("invalid auth header '{}'", header)))
}

/// Resolved credential values keyed by property name.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialData {
    values: HashMap<String, String>,
}

impl CredentialData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credential holding only an `apiKey` property.
    pub fn api_key(key: impl Into<String>) -> Self {
        Self::new().with("apiKey", key)
    }

    pub fn with(mut self, property: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(property.into(), value.into());
        self
    }

    pub fn get(&self, property: &str) -> Option<&str> {
        self.values.get(property).map(String::as_str)
    }
}

impl fmt::Debug for CredentialData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("CredentialData")
            .field("properties", &keys)
            .finish_non_exhaustive()
    }
}

/// Source of stored credentials, abstracting where they live (env, vault, host).
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Retrieve the credential registered under `name` (e.g. "docugenerateApi").
    async fn get_credentials(&self, name: &str) -> anyhow::Result<CredentialData>;
}

/// Reads credential properties from environment variables.
#[derive(Debug, Clone)]
pub struct EnvCredentialStore {
    /// Property name -> environment variable.
    vars: HashMap<String, String>,
}

impl EnvCredentialStore {
    pub fn new(vars: HashMap<String, String>) -> Self {
        Self { vars }
    }

    /// Maps `apiKey` to `DOCUGENERATE_API_KEY`.
    pub fn docugenerate() -> Self {
        let mut vars = HashMap::new();
        vars.insert("apiKey".to_string(), API_KEY_VAR.to_string());
        Self::new(vars)
    }
}

#[async_trait]
impl CredentialStore for EnvCredentialStore {
    async fn get_credentials(&self, name: &str) -> anyhow::Result<CredentialData> {
        let mut data = CredentialData::new();
        for (property, var) in &self.vars {
            let value = env::var(var).map_err(|_| {
                anyhow!("Credential '{}' needs environment variable '{}'", name, var)
            })?;
            data = data.with(property.clone(), value);
        }
        Ok(data)
    }
}

/// In-memory credentials, keyed by credential name.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialStore {
    credentials: HashMap<String, CredentialData>,
}

impl StaticCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, data: CredentialData) -> Self {
        self.credentials.insert(name.into(), data);
        self
    }
}

#[async_trait]
impl CredentialStore for StaticCredentialStore {
    async fn get_credentials(&self, name: &str) -> anyhow::Result<CredentialData> {
        self.credentials
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("Credential '{}' not found", name))
    }
}

/// Outcome of a credential test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialStatus {
    Valid,
    Invalid {
        /// Remote HTTP status, absent for transport failures.
        status: Option<u16>,
        /// Remote error body verbatim, or the transport error text.
        message: String,
    },
}

impl CredentialStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, CredentialStatus::Valid)
    }
}

/// Sends the credential's test request once and reports whether the remote
/// service accepted the key.
#[tracing::instrument(skip(transport, def, data), fields(credential = %def.name))]
pub async fn verify_credential(
    transport: &HttpTransport,
    def: &CredentialDef,
    base_url: &Url,
    data: &CredentialData,
) -> CredentialStatus {
    let mut plan = match def.test_plan(base_url) {
        Ok(plan) => plan,
        Err(e) => {
            return CredentialStatus::Invalid {
                status: None,
                message: e.to_string(),
            };
        }
    };
    if let Err(e) = def.authenticate(data, &mut plan) {
        return CredentialStatus::Invalid {
            status: None,
            message: e.to_string(),
        };
    }

    match transport.send(plan).await {
        Ok(response) => {
            tracing::info!(status = response.status, "Credential accepted");
            CredentialStatus::Valid
        }
        Err(DocuGenError::RemoteRequest { status, body }) => {
            tracing::warn!(status, "Credential rejected");
            CredentialStatus::Invalid {
                status: Some(status),
                message: body,
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Credential test failed");
            CredentialStatus::Invalid {
                status: e.status(),
                message: e.to_string(),
            }
        }
    }
}
