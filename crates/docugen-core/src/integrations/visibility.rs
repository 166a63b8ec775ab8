use crate::FieldValues;
use crate::integrations::registry::{FieldSpec, ResourceKind};
use crate::request::is_present;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Condition under which a field is active.
///
/// Every listed constraint must hold: the active resource and operation must
/// be members of their sets, and each sibling field named in `siblings` must
/// currently hold one of the listed values.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ShowWhen {
    #[serde(default)]
    pub resource: Vec<ResourceKind>,
    #[serde(default)]
    pub operation: Vec<String>,
    #[serde(flatten)]
    pub siblings: BTreeMap<String, Vec<Value>>,
}

impl ShowWhen {
    pub fn matches(&self, resource: ResourceKind, operation: &str, snapshot: &FieldValues) -> bool {
        if !self.resource.contains(&resource) {
            return false;
        }
        if !self.operation.iter().any(|o| o == operation) {
            return false;
        }
        self.siblings.iter().all(|(name, allowed)| {
            snapshot
                .get(name)
                .filter(|v| is_present(v))
                .is_some_and(|current| allowed.iter().any(|a| loosely_equal(a, current)))
        })
    }
}

/// Compares a declared value with a supplied one, accepting the text form of
/// scalars (hosts often hand booleans and numbers over as strings).
pub(crate) fn loosely_equal(allowed: &Value, current: &Value) -> bool {
    if allowed == current {
        return true;
    }
    match (allowed, current) {
        (Value::Bool(b), Value::String(s)) => s.trim().eq_ignore_ascii_case(&b.to_string()),
        (Value::Number(n), Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .zip(n.as_f64())
            .is_some_and(|(a, b)| a == b),
        (Value::String(s), Value::Bool(b)) => s.eq_ignore_ascii_case(&b.to_string()),
        (Value::String(s), Value::Number(n)) => s == &n.to_string(),
        _ => false,
    }
}

/// Filters `fields` down to those visible for the given snapshot.
pub fn visible_fields<'a>(
    fields: &'a [FieldSpec],
    resource: ResourceKind,
    operation: &str,
    snapshot: &FieldValues,
) -> Vec<&'a FieldSpec> {
    fields
        .iter()
        .filter(|f| f.show.matches(resource, operation, snapshot))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::registry::Registry;
    use serde_json::json;

    fn snapshot(value: Value) -> FieldValues {
        value.as_object().cloned().unwrap_or_default()
    }

    fn names(fields: &[&FieldSpec]) -> Vec<String> {
        fields.iter().map(|f| f.name.clone()).collect()
    }

    #[test]
    fn test_resource_and_operation_must_match() {
        let show = ShowWhen {
            resource: vec![ResourceKind::Document],
            operation: vec!["get".to_string(), "delete".to_string()],
            siblings: BTreeMap::new(),
        };
        let empty = FieldValues::new();
        assert!(show.matches(ResourceKind::Document, "get", &empty));
        assert!(show.matches(ResourceKind::Document, "delete", &empty));
        assert!(!show.matches(ResourceKind::Document, "update", &empty));
        assert!(!show.matches(ResourceKind::Template, "get", &empty));
    }

    #[test]
    fn test_unset_sibling_hides_field() {
        let mut siblings = BTreeMap::new();
        siblings.insert("singleFile".to_string(), vec![json!(true)]);
        let show = ShowWhen {
            resource: vec![ResourceKind::Document],
            operation: vec!["generate".to_string()],
            siblings,
        };

        assert!(!show.matches(ResourceKind::Document, "generate", &FieldValues::new()));
        assert!(!show.matches(
            ResourceKind::Document,
            "generate",
            &snapshot(json!({"singleFile": null}))
        ));
        assert!(!show.matches(
            ResourceKind::Document,
            "generate",
            &snapshot(json!({"singleFile": false}))
        ));
        assert!(show.matches(
            ResourceKind::Document,
            "generate",
            &snapshot(json!({"singleFile": true}))
        ));
        assert!(show.matches(
            ResourceKind::Document,
            "generate",
            &snapshot(json!({"singleFile": "true"}))
        ));
    }

    #[test]
    fn test_empty_string_sibling_counts_as_unset() {
        let mut siblings = BTreeMap::new();
        siblings.insert("name".to_string(), vec![json!(""), json!("invoice")]);
        let show = ShowWhen {
            resource: vec![ResourceKind::Document],
            operation: vec!["generate".to_string()],
            siblings,
        };

        assert!(!show.matches(
            ResourceKind::Document,
            "generate",
            &snapshot(json!({"name": ""}))
        ));
        assert!(show.matches(
            ResourceKind::Document,
            "generate",
            &snapshot(json!({"name": "invoice"}))
        ));
    }

    #[test]
    fn test_output_quality_tracks_output_format() {
        let registry = Registry::builtin().unwrap();
        let fields = registry.fields(ResourceKind::Document, "generate").unwrap();

        let docx = visible_fields(
            fields,
            ResourceKind::Document,
            "generate",
            &snapshot(json!({"outputFormat": ".docx"})),
        );
        assert!(!names(&docx).contains(&"outputQuality".to_string()));

        let pdf = visible_fields(
            fields,
            ResourceKind::Document,
            "generate",
            &snapshot(json!({"outputFormat": ".pdf"})),
        );
        let pdf_names = names(&pdf);
        assert!(pdf_names.contains(&"outputQuality".to_string()));
        assert!(pdf_names.contains(&"mergeWith".to_string()));

        let png = visible_fields(
            fields,
            ResourceKind::Document,
            "generate",
            &snapshot(json!({"outputFormat": ".png"})),
        );
        let png_names = names(&png);
        assert!(png_names.contains(&"outputQuality".to_string()));
        assert!(!png_names.contains(&"mergeWith".to_string()));
    }

    #[test]
    fn test_show_parses_sibling_constraints() {
        let show: ShowWhen = serde_yaml::from_str(
            "resource: [document]\noperation: [generate]\noutputFormat: [.pdf, .png]\n",
        )
        .unwrap();
        assert_eq!(
            show.siblings.get("outputFormat"),
            Some(&vec![json!(".pdf"), json!(".png")])
        );
    }

    #[test]
    fn test_loose_number_match() {
        assert!(loosely_equal(&json!(100), &json!("100")));
        assert!(!loosely_equal(&json!(100), &json!("ten")));
    }
}
