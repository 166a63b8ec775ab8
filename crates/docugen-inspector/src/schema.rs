use docugen_core::FieldSpec;
use docugen_core::credentials::CredentialProperty;
use docugen_core::integrations::registry::FieldType as SpecFieldType;
use docugen_core::loaders::TemplateOption;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    pub label: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldType {
    Text,
    Password,
    Number,
    Boolean,
    Select {
        options: Vec<SelectOption>,
    },
    /// Selector filled by an option loader; `options` stays empty until loaded.
    DynamicSelect {
        method: String,
        options: Vec<SelectOption>,
    },
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualField {
    pub id: String,
    pub label: String,
    pub description: String,
    pub field_type: FieldType,
    pub required: bool,
    pub default_value: Option<Value>,
}

impl VisualField {
    pub fn from_field_spec(spec: &FieldSpec) -> Self {
        let field_type = match spec.field_type {
            SpecFieldType::String => FieldType::Text,
            SpecFieldType::Number => FieldType::Number,
            SpecFieldType::Boolean => FieldType::Boolean,
            SpecFieldType::Json => FieldType::Json,
            SpecFieldType::Options => match &spec.load_options_method {
                Some(method) => FieldType::DynamicSelect {
                    method: method.clone(),
                    options: Vec::new(),
                },
                None => FieldType::Select {
                    options: spec
                        .options
                        .iter()
                        .map(|o| SelectOption {
                            label: o.name.clone(),
                            value: o.value.clone(),
                        })
                        .collect(),
                },
            },
        };

        Self {
            id: spec.name.clone(),
            label: spec.display_name.clone(),
            description: spec.description.clone(),
            field_type,
            required: spec.required,
            default_value: spec.default.clone(),
        }
    }

    pub fn from_credential_property(property: &CredentialProperty) -> Self {
        let field_type = match property.field_type {
            _ if property.password => FieldType::Password,
            SpecFieldType::Number => FieldType::Number,
            SpecFieldType::Boolean => FieldType::Boolean,
            SpecFieldType::Json => FieldType::Json,
            SpecFieldType::String | SpecFieldType::Options => FieldType::Text,
        };

        Self {
            id: property.name.clone(),
            label: property.display_name.clone(),
            description: property.description.clone(),
            field_type,
            required: property.required,
            default_value: property.default.clone(),
        }
    }

    /// Fills a dynamic selector produced by `method`. Other fields are untouched.
    pub fn apply_options(&mut self, method: &str, loaded: &[TemplateOption]) -> bool {
        let FieldType::DynamicSelect {
            method: own,
            options,
        } = &mut self.field_type
        else {
            return false;
        };
        if own.as_str() != method {
            return false;
        }
        *options = loaded
            .iter()
            .map(|o| SelectOption {
                label: o.label.clone(),
                value: Value::String(o.id.clone()),
            })
            .collect();
        true
    }
}
