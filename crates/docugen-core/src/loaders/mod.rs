use crate::credentials::CredentialStore;
use crate::integrations::registry::Registry;
use crate::transport::HttpTransport;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

pub mod templates;

pub use templates::TemplatesLoader;

/// One selectable entry produced by a loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateOption {
    pub label: String,
    pub id: String,
}

/// Everything a loader may touch during one call.
pub struct LoaderContext<'a> {
    pub registry: &'a Registry,
    pub base_url: &'a Url,
    pub transport: &'a HttpTransport,
    pub credentials: &'a dyn CredentialStore,
}

/// Populates a selector field from a live remote call.
///
/// Loaders never fail: any problem degrades to an empty list.
#[async_trait]
pub trait OptionLoader: Send + Sync {
    /// The name fields refer to in `load_options_method` (e.g. "getTemplates").
    fn name(&self) -> &'static str;

    async fn load(&self, ctx: &LoaderContext<'_>) -> Vec<TemplateOption>;
}

/// Holds the available option loaders.
#[derive(Default, Clone)]
pub struct LoaderRegistry {
    loaders: HashMap<String, Arc<dyn OptionLoader>>,
}

impl LoaderRegistry {
    pub fn register<L: OptionLoader + 'static>(&mut self, loader: L) {
        let name = loader.name().to_string();
        self.loaders.insert(name.clone(), Arc::new(loader));
        tracing::debug!("Registered option loader: {}", name);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn OptionLoader>> {
        self.loaders.get(name).cloned()
    }

    pub fn list_loaders(&self) -> Vec<String> {
        let mut names: Vec<String> = self.loaders.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Registers the loaders the bundled definition refers to.
pub fn register_core_loaders(registry: &mut LoaderRegistry) {
    registry.register(TemplatesLoader);
}
