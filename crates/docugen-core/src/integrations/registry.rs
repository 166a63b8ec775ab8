use crate::credentials::CredentialDef;
use crate::error::{DocuGenError, Result};
use crate::integrations::DOCUGENERATE_DEFINITION;
use crate::integrations::visibility::ShowWhen;
use anyhow::Context;
use once_cell::sync::OnceCell;
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use url::Url;

/// The remote entity type an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Template,
    Document,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Template => "template",
            ResourceKind::Document => "document",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = DocuGenError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "template" => Ok(ResourceKind::Template),
            "document" => Ok(ResourceKind::Document),
            other => Err(DocuGenError::configuration(format!(
                "unknown resource '{}'",
                other
            ))),
        }
    }
}

/// Data type of an input field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Json,
    /// A selector: static `options`, or a dynamic list from `load_options_method`.
    Options,
}

/// One entry of a static selector.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OptionDef {
    pub name: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Where a field's value lands in the outgoing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingTarget {
    Body,
    Query,
    Path,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Routing {
    pub target: RoutingTarget,
    /// Body key (dot-qualified for nested objects), query parameter name,
    /// or URL placeholder name.
    pub key: String,
}

/// Definition of an input field of one or more operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FieldSpec {
    pub name: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Form default. Never copied into a request.
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<OptionDef>,
    /// Name of the option loader that populates this selector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_options_method: Option<String>,
    pub show: ShowWhen,
    /// Fields without routing only gate the visibility of others.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<Routing>,
}

impl FieldSpec {
    pub fn routes_to(&self, target: RoutingTarget) -> bool {
        self.routing.as_ref().is_some_and(|r| r.target == target)
    }
}

/// Declared HTTP shape of an operation, as written in the definition file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OperationDef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub action: String,
    pub method: String,
    pub url: String,
    /// Headers forced onto every request of this operation.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResourceDef {
    pub kind: ResourceKind,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    pub default_operation: String,
    pub operations: Vec<OperationDef>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NodeDefaults {
    pub name: String,
}

/// Top-level definition of the connector.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IntegrationDef {
    /// Unique identifier (e.g. "docuGenerate").
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub group: Vec<String>,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub defaults: NodeDefaults,
    /// Base URL for API requests.
    pub base_url: String,
    #[serde(default)]
    pub documentation_url: Option<String>,
    pub default_resource: ResourceKind,
    pub credential: CredentialDef,
    pub resources: Vec<ResourceDef>,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

fn default_version() -> u32 {
    1
}

/// Validated, immutable form of an [`OperationDef`].
#[derive(Debug, Clone)]
pub struct OperationSpec {
    pub resource: ResourceKind,
    pub id: String,
    pub name: String,
    pub description: String,
    pub action: String,
    pub method: Method,
    pub url_template: String,
    pub extra_headers: HeaderMap,
}

type OperationKey = (ResourceKind, String);

/// Lookup tables built once from an [`IntegrationDef`].
#[derive(Debug, Clone)]
pub struct Registry {
    definition: IntegrationDef,
    base_url: Url,
    operations: HashMap<OperationKey, OperationSpec>,
    fields: HashMap<OperationKey, Vec<FieldSpec>>,
}

static BUILTIN: OnceCell<Registry> = OnceCell::new();

impl Registry {
    /// The embedded DocuGenerate definition, parsed on first use.
    pub fn builtin() -> Result<&'static Registry> {
        BUILTIN.get_or_try_init(|| Registry::from_yaml_str(DOCUGENERATE_DEFINITION))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let def: IntegrationDef = serde_yaml::from_str(content)
            .map_err(|e| DocuGenError::configuration(format!("invalid definition: {}", e)))?;
        Self::from_definition(def)
    }

    #[tracing::instrument]
    pub fn load_from_path(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read integration file: {:?}", path))?;
        let registry = Self::from_yaml_str(&content)
            .with_context(|| format!("Failed to load integration: {:?}", path))?;
        Ok(registry)
    }

    pub fn from_definition(definition: IntegrationDef) -> Result<Self> {
        let base_url = Url::parse(&definition.base_url).map_err(|e| {
            DocuGenError::configuration(format!(
                "invalid base URL '{}': {}",
                definition.base_url, e
            ))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(DocuGenError::configuration(format!(
                "base URL '{}' cannot carry a path",
                definition.base_url
            )));
        }

        definition.credential.validate()?;

        let mut operations = HashMap::new();
        for resource in &definition.resources {
            for op in &resource.operations {
                let spec = compile_operation(resource.kind, op)?;
                if operations
                    .insert((resource.kind, op.id.clone()), spec)
                    .is_some()
                {
                    return Err(DocuGenError::configuration(format!(
                        "operation '{}:{}' is declared twice",
                        resource.kind, op.id
                    )));
                }
            }
            if !resource
                .operations
                .iter()
                .any(|o| o.id == resource.default_operation)
            {
                return Err(DocuGenError::configuration(format!(
                    "default operation '{}' of resource '{}' is not declared",
                    resource.default_operation, resource.kind
                )));
            }
        }

        let mut fields: HashMap<OperationKey, Vec<FieldSpec>> = HashMap::new();
        for field in &definition.fields {
            for resource in &field.show.resource {
                for op in &field.show.operation {
                    let key = (*resource, op.clone());
                    if !operations.contains_key(&key) {
                        return Err(DocuGenError::configuration(format!(
                            "field '{}' is shown for unknown operation '{}:{}'",
                            field.name, resource, op
                        )));
                    }
                    fields.entry(key).or_default().push(field.clone());
                }
            }
        }

        for (key, spec) in &operations {
            validate_operation_fields(spec, fields.get(key).map(Vec::as_slice).unwrap_or(&[]))?;
        }

        tracing::info!(
            integration = %definition.name,
            operations = operations.len(),
            fields = definition.fields.len(),
            "Loaded integration"
        );

        Ok(Self {
            definition,
            base_url,
            operations,
            fields,
        })
    }

    pub fn definition(&self) -> &IntegrationDef {
        &self.definition
    }

    pub fn credential(&self) -> &CredentialDef {
        &self.definition.credential
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Looks up the operation for a (resource, operation) pair.
    pub fn operation(&self, resource: ResourceKind, operation: &str) -> Result<&OperationSpec> {
        self.operations
            .get(&(resource, operation.to_string()))
            .ok_or_else(|| {
                DocuGenError::configuration(format!(
                    "unknown operation '{}' for resource '{}'",
                    operation, resource
                ))
            })
    }

    /// Fields of an operation, in declaration order.
    pub fn fields(&self, resource: ResourceKind, operation: &str) -> Result<&[FieldSpec]> {
        self.operation(resource, operation)?;
        Ok(self
            .fields
            .get(&(resource, operation.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[]))
    }

    /// Operations of a resource, in declaration order.
    pub fn operations_for(&self, resource: ResourceKind) -> Vec<&OperationSpec> {
        self.definition
            .resources
            .iter()
            .filter(|r| r.kind == resource)
            .flat_map(|r| r.operations.iter())
            .filter_map(|op| self.operations.get(&(resource, op.id.clone())))
            .collect()
    }

    pub fn default_operation(&self, resource: ResourceKind) -> Option<&str> {
        self.definition
            .resources
            .iter()
            .find(|r| r.kind == resource)
            .map(|r| r.default_operation.as_str())
    }

    /// Node subtitle, e.g. `"get: template"`.
    pub fn subtitle(&self, resource: ResourceKind, operation: &str) -> String {
        format!("{}: {}", operation, resource)
    }
}

fn compile_operation(resource: ResourceKind, op: &OperationDef) -> Result<OperationSpec> {
    let method = Method::from_bytes(op.method.to_ascii_uppercase().as_bytes()).map_err(|_| {
        DocuGenError::configuration(format!(
            "operation '{}:{}' has invalid method '{}'",
            resource, op.id, op.method
        ))
    })?;

    if op.url.contains('?') {
        return Err(DocuGenError::configuration(format!(
            "operation '{}:{}' must route query parameters through fields",
            resource, op.id
        )));
    }

    let mut extra_headers = HeaderMap::new();
    for (name, value) in &op.headers {
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
            DocuGenError::configuration(format!("operation '{}:{}' header '{}'", resource, op.id, name))
        })?;
        let header_value = HeaderValue::from_str(value).map_err(|_| {
            DocuGenError::configuration(format!(
                "operation '{}:{}' header '{}' has an invalid value",
                resource, op.id, name
            ))
        })?;
        extra_headers.insert(header_name, header_value);
    }

    Ok(OperationSpec {
        resource,
        id: op.id.clone(),
        name: op.name.clone(),
        description: op.description.clone(),
        action: op.action.clone(),
        method,
        url_template: op.url.clone(),
        extra_headers,
    })
}

fn validate_operation_fields(spec: &OperationSpec, fields: &[FieldSpec]) -> Result<()> {
    let label = format!("{}:{}", spec.resource, spec.id);

    let mut names = HashSet::new();
    for field in fields {
        if !names.insert(field.name.as_str()) {
            return Err(DocuGenError::configuration(format!(
                "field '{}' is declared twice for '{}'",
                field.name, label
            )));
        }
    }

    let mut body_keys: Vec<&str> = Vec::new();
    for field in fields.iter().filter(|f| f.routes_to(RoutingTarget::Body)) {
        let Some(routing) = &field.routing else {
            continue;
        };
        if routing.key.is_empty() || routing.key.split('.').any(str::is_empty) {
            return Err(DocuGenError::configuration(format!(
                "field '{}' of '{}' has a malformed body key '{}'",
                field.name, label, routing.key
            )));
        }
        if let Some(clash) = body_keys.iter().find(|k| keys_collide(k, &routing.key)) {
            return Err(DocuGenError::configuration(format!(
                "body key '{}' of '{}' collides with '{}'",
                routing.key, label, clash
            )));
        }
        body_keys.push(&routing.key);
    }

    for placeholder in placeholders(&spec.url_template) {
        let supplied = fields.iter().any(|f| {
            f.routing
                .as_ref()
                .is_some_and(|r| r.target == RoutingTarget::Path && r.key == placeholder)
        });
        if !supplied {
            return Err(DocuGenError::configuration(format!(
                "placeholder '{{{}}}' of '{}' has no path field",
                placeholder, label
            )));
        }
    }

    Ok(())
}

/// True when two dot-paths would write to the same slot or one nests under the other.
fn keys_collide(a: &str, b: &str) -> bool {
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    long == short || long.starts_with(&format!("{}.", short))
}

/// Placeholder names of a URL template, in order of appearance.
pub(crate) fn placeholders(template: &str) -> Vec<&str> {
    let mut found = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                found.push(&after[..end]);
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
name: sample
display_name: Sample
base_url: https://example.test
default_resource: template
credential:
  name: sampleApi
  display_name: Sample API
  properties:
    - name: apiKey
      display_name: API Key
      type: string
  auth:
    type: api_key
    header: Authorization
    property: apiKey
  test:
    method: GET
    url: /v1/template
resources:
  - kind: template
    display_name: Template
    default_operation: get
    operations:
      - id: get
        name: Get
        method: GET
        url: /v1/template/{templateId}
"#;

    fn with_fields(fields: &str) -> String {
        format!("{}fields:\n{}", MINIMAL, fields)
    }

    #[test]
    fn test_builtin_registry_loads() {
        let registry = Registry::builtin().unwrap();
        assert_eq!(registry.definition().name, "docuGenerate");
        assert_eq!(registry.operations_for(ResourceKind::Template).len(), 5);
        assert_eq!(registry.operations_for(ResourceKind::Document).len(), 5);
        assert_eq!(registry.default_operation(ResourceKind::Template), Some("list"));
        assert_eq!(registry.default_operation(ResourceKind::Document), Some("generate"));
    }

    #[test]
    fn test_operations_keep_declaration_order() {
        let registry = Registry::builtin().unwrap();
        let ids: Vec<&str> = registry
            .operations_for(ResourceKind::Document)
            .iter()
            .map(|o| o.id.as_str())
            .collect();
        assert_eq!(ids, vec!["delete", "generate", "get", "list", "update"]);
    }

    #[test]
    fn test_unknown_pair_is_configuration_error() {
        let registry = Registry::builtin().unwrap();
        let err = registry.operation(ResourceKind::Document, "create").unwrap_err();
        assert!(matches!(err, DocuGenError::Configuration(_)));
    }

    #[test]
    fn test_template_create_carries_multipart_header() {
        let registry = Registry::builtin().unwrap();
        let op = registry.operation(ResourceKind::Template, "create").unwrap();
        assert_eq!(op.method, Method::POST);
        assert_eq!(
            op.extra_headers.get("content-type").unwrap(),
            "multipart/form-data"
        );
    }

    #[test]
    fn test_subtitle() {
        let registry = Registry::builtin().unwrap();
        assert_eq!(
            registry.subtitle(ResourceKind::Template, "get"),
            "get: template"
        );
    }

    #[test]
    fn test_dangling_predicate_rejected() {
        let yaml = with_fields(
            r#"
  - name: templateId
    display_name: Template
    type: string
    show:
      resource: [template]
      operation: [get]
    routing: { target: path, key: templateId }
  - name: orphan
    display_name: Orphan
    type: string
    show:
      resource: [document]
      operation: [get]
"#,
        );
        let err = Registry::from_yaml_str(&yaml).unwrap_err();
        assert!(err.to_string().contains("orphan"));
    }

    #[test]
    fn test_duplicate_body_key_rejected() {
        let yaml = with_fields(
            r#"
  - name: templateId
    display_name: Template
    type: string
    show: { resource: [template], operation: [get] }
    routing: { target: path, key: templateId }
  - name: first
    display_name: First
    type: string
    show: { resource: [template], operation: [get] }
    routing: { target: body, key: delimiters }
  - name: second
    display_name: Second
    type: string
    show: { resource: [template], operation: [get] }
    routing: { target: body, key: delimiters.left }
"#,
        );
        let err = Registry::from_yaml_str(&yaml).unwrap_err();
        assert!(matches!(err, DocuGenError::Configuration(ref m) if m.contains("collides")));
    }

    const TEMPLATE_ID: &str = r#"
  - name: templateId
    display_name: Template
    type: string
    show: { resource: [template], operation: [get] }
    routing: { target: path, key: templateId }
"#;

    #[test]
    fn test_duplicate_field_name_rejected() {
        let yaml = with_fields(&format!("{}{}", TEMPLATE_ID, TEMPLATE_ID));
        let err = Registry::from_yaml_str(&yaml).unwrap_err();
        assert!(matches!(err, DocuGenError::Configuration(ref m) if m.contains("declared twice")));
    }

    #[test]
    fn test_invalid_method_rejected() {
        let yaml = with_fields(TEMPLATE_ID)
            .replace("method: GET\n        url", "method: \"GE T\"\n        url");
        let err = Registry::from_yaml_str(&yaml).unwrap_err();
        assert!(matches!(err, DocuGenError::Configuration(ref m) if m.contains("invalid method")));
    }

    #[test]
    fn test_invalid_header_rejected() {
        let yaml = with_fields(TEMPLATE_ID).replace(
            "url: /v1/template/{templateId}\n",
            "url: /v1/template/{templateId}\n        headers:\n          \"Bad Header\": x\n",
        );
        let err = Registry::from_yaml_str(&yaml).unwrap_err();
        assert!(matches!(err, DocuGenError::Configuration(ref m) if m.contains("Bad Header")));
    }

    #[test]
    fn test_invalid_header_value_rejected() {
        let yaml = with_fields(TEMPLATE_ID).replace(
            "url: /v1/template/{templateId}\n",
            "url: /v1/template/{templateId}\n        headers:\n          X-Trace: \"a\\nb\"\n",
        );
        let err = Registry::from_yaml_str(&yaml).unwrap_err();
        assert!(matches!(err, DocuGenError::Configuration(ref m) if m.contains("invalid value")));
    }

    #[test]
    fn test_invalid_credential_test_method_rejected() {
        let yaml = with_fields(TEMPLATE_ID).replace(
            "method: GET\n    url: /v1/template\n",
            "method: \"GE T\"\n    url: /v1/template\n",
        );
        let err = Registry::from_yaml_str(&yaml).unwrap_err();
        assert!(
            matches!(err, DocuGenError::Configuration(ref m) if m.contains("credential test method"))
        );
    }

    #[test]
    fn test_invalid_auth_header_rejected() {
        let yaml = with_fields(TEMPLATE_ID)
            .replace("header: Authorization", "header: \"Auth orization\"");
        let err = Registry::from_yaml_str(&yaml).unwrap_err();
        assert!(matches!(err, DocuGenError::Configuration(ref m) if m.contains("invalid auth header")));
    }

    #[test]
    fn test_unknown_auth_property_rejected() {
        let yaml = with_fields(TEMPLATE_ID).replace("property: apiKey", "property: token");
        let err = Registry::from_yaml_str(&yaml).unwrap_err();
        assert!(matches!(err, DocuGenError::Configuration(ref m) if m.contains("token")));
    }

    #[test]
    fn test_placeholder_without_path_field_rejected() {
        let err = Registry::from_yaml_str(MINIMAL).unwrap_err();
        assert!(err.to_string().contains("templateId"));
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.yaml");
        let yaml = with_fields(
            r#"
  - name: templateId
    display_name: Template
    type: string
    show: { resource: [template], operation: [get] }
    routing: { target: path, key: templateId }
"#,
        );
        fs::write(&path, yaml).unwrap();

        let registry = Registry::load_from_path(&path).unwrap();
        assert_eq!(registry.definition().name, "sample");
        assert_eq!(registry.fields(ResourceKind::Template, "get").unwrap().len(), 1);
    }

    #[test]
    fn test_keys_collide() {
        assert!(keys_collide("delimiters", "delimiters.left"));
        assert!(keys_collide("name", "name"));
        assert!(!keys_collide("delimiters.left", "delimiters.right"));
        assert!(!keys_collide("name", "name_suffix"));
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders("/v1/template/{templateId}"), vec!["templateId"]);
        assert!(placeholders("/v1/template").is_empty());
    }
}
