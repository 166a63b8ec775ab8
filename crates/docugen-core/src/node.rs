use crate::config::DocuGenConfig;
use crate::credentials::{CredentialData, CredentialStatus, CredentialStore, verify_credential};
use crate::error::{DocuGenError, Result};
use crate::integrations::registry::{Registry, ResourceKind};
use crate::loaders::{LoaderContext, LoaderRegistry, TemplateOption, register_core_loaders};
use crate::request::{RequestInput, RequestPlan, build_request};
use crate::transport::{HttpTransport, OperationResponse};
use serde_json::Value;
use std::sync::Arc;
use url::Url;

/// Host-facing entry point: one connector instance bound to a registry, a
/// credential store and a transport.
pub struct DocuGenerateNode {
    registry: Arc<Registry>,
    base_url: Url,
    transport: HttpTransport,
    credentials: Arc<dyn CredentialStore>,
    loaders: LoaderRegistry,
}

impl DocuGenerateNode {
    pub fn new(registry: Arc<Registry>, credentials: Arc<dyn CredentialStore>) -> Self {
        let base_url = registry.base_url().clone();
        let mut loaders = LoaderRegistry::default();
        register_core_loaders(&mut loaders);
        Self {
            registry,
            base_url,
            transport: HttpTransport::new(),
            credentials,
            loaders,
        }
    }

    /// Node over the embedded DocuGenerate definition.
    pub fn builtin(credentials: Arc<dyn CredentialStore>) -> Result<Self> {
        let registry = Registry::builtin()?.clone();
        Ok(Self::new(Arc::new(registry), credentials))
    }

    /// Applies the definition path and base URL overrides of `config`.
    pub fn from_config(
        config: &DocuGenConfig,
        credentials: Arc<dyn CredentialStore>,
    ) -> anyhow::Result<Self> {
        let registry = match &config.definition_path {
            Some(path) => Registry::load_from_path(path)?,
            None => Registry::builtin()?.clone(),
        };
        let mut node = Self::new(Arc::new(registry), credentials);
        if let Some(base_url) = &config.base_url {
            node = node.with_base_url(base_url.clone());
        }
        Ok(node)
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_transport(mut self, transport: HttpTransport) -> Self {
        self.transport = transport;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn loaders(&self) -> &LoaderRegistry {
        &self.loaders
    }

    /// Pure request construction; see [`build_request`].
    pub fn build_request(
        &self,
        resource: ResourceKind,
        operation: &str,
        input: &RequestInput,
    ) -> Result<RequestPlan> {
        build_request(&self.registry, &self.base_url, resource, operation, input)
    }

    /// Builds, authenticates and sends one operation.
    ///
    /// Input errors surface before any network traffic. Remote failures are
    /// returned unchanged.
    #[tracing::instrument(skip(self, input), fields(integration = %self.registry.definition().name))]
    pub async fn execute(
        &self,
        resource: ResourceKind,
        operation: &str,
        input: &RequestInput,
    ) -> Result<OperationResponse> {
        let mut plan = self.build_request(resource, operation, input)?;

        let credential = self.registry.credential();
        let data = self
            .credentials
            .get_credentials(&credential.name)
            .await
            .map_err(|e| DocuGenError::Credential(e.to_string()))?;
        credential.authenticate(&data, &mut plan)?;

        let response = self.transport.send(plan).await?;
        tracing::info!(
            subtitle = %self.registry.subtitle(resource, operation),
            status = response.status,
            "Operation completed"
        );
        Ok(response)
    }

    /// Runs the option loader registered under `method`.
    ///
    /// Only an unknown loader name is an error; the loaders themselves
    /// degrade to an empty list.
    pub async fn load_options(&self, method: &str) -> Result<Vec<TemplateOption>> {
        let loader = self.loaders.get(method).ok_or_else(|| {
            DocuGenError::Configuration(format!("unknown option loader '{}'", method))
        })?;
        let ctx = LoaderContext {
            registry: &self.registry,
            base_url: &self.base_url,
            transport: &self.transport,
            credentials: self.credentials.as_ref(),
        };
        Ok(loader.load(&ctx).await)
    }

    /// Checks a candidate credential against the remote service.
    pub async fn test_credential(&self, data: &CredentialData) -> CredentialStatus {
        verify_credential(
            &self.transport,
            self.registry.credential(),
            &self.base_url,
            data,
        )
        .await
    }

    /// The full definition as JSON, for hosts that render their own forms.
    pub fn describe(&self) -> Result<Value> {
        serde_json::to_value(self.registry.definition())
            .map_err(|e| DocuGenError::Configuration(format!("cannot render definition: {}", e)))
    }
}
