//! # DocuGen Inspector
//!
//! Headless form model for a connector operation. It decides which fields a
//! UI should render for the current values, without any rendering concern.

pub mod schema;

use docugen_core::integrations::visibility::visible_fields;
use docugen_core::loaders::TemplateOption;
use docugen_core::{FieldValues, Registry, ResourceKind, Result};
use schema::VisualField;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// The state of the inspector for one resource/operation selection.
#[derive(Debug)]
pub struct InspectorState {
    registry: Arc<Registry>,
    resource: ResourceKind,
    operation: String,
    /// The fields to display in the UI, in declaration order.
    pub fields: Vec<VisualField>,
    /// The current values of each field, visible or not.
    pub values: FieldValues,
    /// Validation errors for each visible field.
    pub errors: HashMap<String, String>,
    /// Loader results kept so that fields appearing later can be filled.
    loaded: HashMap<String, Vec<TemplateOption>>,
}

impl InspectorState {
    pub fn new(
        registry: Arc<Registry>,
        resource: ResourceKind,
        operation: &str,
        initial_values: FieldValues,
    ) -> Result<Self> {
        registry.operation(resource, operation)?;
        let mut state = Self {
            registry,
            resource,
            operation: operation.to_string(),
            fields: Vec::new(),
            values: initial_values,
            errors: HashMap::new(),
            loaded: HashMap::new(),
        };
        state.refresh();
        Ok(state)
    }

    /// Starts on the resource's default operation.
    pub fn for_resource(registry: Arc<Registry>, resource: ResourceKind) -> Result<Self> {
        let operation = registry
            .default_operation(resource)
            .unwrap_or_default()
            .to_string();
        Self::new(registry, resource, &operation, FieldValues::new())
    }

    pub fn resource(&self) -> ResourceKind {
        self.resource
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Switches operation, keeping values the user already entered.
    pub fn select_operation(&mut self, operation: &str) -> Result<()> {
        self.registry.operation(self.resource, operation)?;
        self.operation = operation.to_string();
        self.refresh();
        Ok(())
    }

    /// Updates the value of a field, recomputes visibility and validates.
    pub fn update_value(&mut self, field_id: &str, value: Value) {
        self.values.insert(field_id.to_string(), value);
        self.refresh();
    }

    /// Stores loader output and fills every selector bound to `method`.
    pub fn apply_options(&mut self, method: &str, options: Vec<TemplateOption>) {
        for field in &mut self.fields {
            field.apply_options(method, &options);
        }
        self.loaded.insert(method.to_string(), options);
    }

    /// Loader names required by the currently visible fields.
    pub fn pending_loaders(&self) -> Vec<String> {
        let mut methods: Vec<String> = self
            .fields
            .iter()
            .filter_map(|f| match &f.field_type {
                schema::FieldType::DynamicSelect { method, .. } => Some(method.clone()),
                _ => None,
            })
            .filter(|m| !self.loaded.contains_key(m))
            .collect();
        methods.dedup();
        methods
    }

    fn refresh(&mut self) {
        let specs = self
            .registry
            .fields(self.resource, &self.operation)
            .unwrap_or(&[]);
        let mut fields: Vec<VisualField> =
            visible_fields(specs, self.resource, &self.operation, &self.values)
                .into_iter()
                .map(VisualField::from_field_spec)
                .collect();
        for (method, options) in &self.loaded {
            for field in &mut fields {
                field.apply_options(method, options);
            }
        }
        self.fields = fields;

        self.errors.clear();
        let ids: Vec<String> = self.fields.iter().map(|f| f.id.clone()).collect();
        for id in ids {
            self.validate_field(&id);
        }
        tracing::debug!(
            operation = %self.operation,
            visible = self.fields.len(),
            errors = self.errors.len(),
            "Inspector refreshed"
        );
    }

    /// Validates a specific field.
    pub fn validate_field(&mut self, field_id: &str) {
        if let Some(field) = self.fields.iter().find(|f| f.id == field_id) {
            let missing = self.values.get(field_id).map_or(true, |v| {
                v.is_null() || v.as_str().is_some_and(str::is_empty)
            });
            if field.required && missing {
                self.errors
                    .insert(field_id.to_string(), "Required".to_string());
            } else {
                self.errors.remove(field_id);
            }
        }
    }

    /// Returns true if all visible fields are valid.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Values of the visible fields only, ready for a request.
    pub fn visible_values(&self) -> FieldValues {
        self.fields
            .iter()
            .filter_map(|f| self.values.get(&f.id).map(|v| (f.id.clone(), v.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> Arc<Registry> {
        Arc::new(Registry::builtin().unwrap().clone())
    }

    fn ids(state: &InspectorState) -> Vec<&str> {
        state.fields.iter().map(|f| f.id.as_str()).collect()
    }

    #[test]
    fn test_default_operation_fields() {
        let state = InspectorState::for_resource(registry(), ResourceKind::Document).unwrap();
        assert_eq!(state.operation(), "generate");
        assert_eq!(
            ids(&state),
            vec!["templateId", "name", "outputFormat", "data", "singleFile"]
        );
        assert!(!state.is_valid());
        assert_eq!(state.errors.get("templateId").unwrap(), "Required");
    }

    #[test]
    fn test_sibling_values_reveal_fields() {
        let mut state = InspectorState::for_resource(registry(), ResourceKind::Document).unwrap();
        state.update_value("singleFile", json!(true));
        assert!(ids(&state).contains(&"pageBreak"));

        state.update_value("outputFormat", json!(".pdf"));
        assert!(ids(&state).contains(&"outputQuality"));
        assert!(ids(&state).contains(&"mergeWith"));

        state.update_value("singleFile", json!(false));
        assert!(!ids(&state).contains(&"pageBreak"));
    }

    #[test]
    fn test_required_field_clears_error() {
        let mut state =
            InspectorState::new(registry(), ResourceKind::Document, "get", FieldValues::new())
                .unwrap();
        assert!(!state.is_valid());
        state.update_value("documentId", json!("d1"));
        assert!(state.is_valid());
    }

    #[test]
    fn test_visible_values_drop_hidden_entries() {
        let mut state = InspectorState::for_resource(registry(), ResourceKind::Document).unwrap();
        state.update_value("templateId", json!("t1"));
        state.update_value("pageBreak", json!(true));
        state.update_value("singleFile", json!(false));

        let values = state.visible_values();
        assert_eq!(values.get("templateId"), Some(&json!("t1")));
        assert!(values.get("pageBreak").is_none());
    }

    #[test]
    fn test_loaded_options_survive_refresh() {
        let mut state = InspectorState::for_resource(registry(), ResourceKind::Template).unwrap();
        assert!(state.pending_loaders().is_empty());

        state.select_operation("get").unwrap();
        assert_eq!(state.pending_loaders(), vec!["getTemplates".to_string()]);

        state.apply_options(
            "getTemplates",
            vec![TemplateOption {
                label: "Invoice".to_string(),
                id: "t1".to_string(),
            }],
        );
        assert!(state.pending_loaders().is_empty());

        state.update_value("templateId", json!("t1"));
        match &state.fields[0].field_type {
            schema::FieldType::DynamicSelect { options, .. } => assert_eq!(options.len(), 1),
            other => panic!("Expected DynamicSelect, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_operation_rejected() {
        let err = InspectorState::new(registry(), ResourceKind::Template, "generate", FieldValues::new());
        assert!(err.is_err());
    }
}
